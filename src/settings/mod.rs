use crate::rendering::state::{Algorithm, AntialiasingMode, State, SurfaceInfo};
use clap::builder::BoolishValueParser;
use clap::{Parser, value_parser};
use itertools::Itertools;
use oitlab_gpu::DeviceCapabilities;
use oitlab_gpu::types::Extent2D;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "oitlab")]
#[command(version = concat!(env!("VERGEN_GIT_BRANCH"), "/",env!("VERGEN_GIT_SHA")))]
#[command(about = "Renders a field of transparent spheres with interchangeable order independent transparency algorithms")]
pub struct CliArgs {
    #[command(flatten)]
    pub state: StateOverrides,

    #[arg(long, default_value = "1024x768", value_parser = value_parser!(WindowSize))]
    pub window_size: WindowSize,

    #[arg(long, default_value_t = 3, value_parser = value_parser!(u32).range(1..=8))]
    pub frame_slots: u32,

    /// Frames to render per configuration (per sequence when running sequences).
    #[arg(long, default_value_t = 1)]
    pub frames: u64,

    /// Without a shader directory, synthetic modules stand in for the compiled shaders.
    #[arg(long, env = "OITLAB_SHADER_DIR")]
    pub shader_dir: Option<PathBuf>,

    #[arg(long, env = "OITLAB_SHADER_CACHE_DIR")]
    pub shader_cache_dir: Option<PathBuf>,

    #[arg(long, env = "OITLAB_SEQUENCE_FILE")]
    pub sequence_file: Option<PathBuf>,

    /// Runs the built-in matrix of every algorithm and antialiasing mode.
    #[arg(long, conflicts_with = "sequence_file")]
    pub test_matrix: bool,

    /// Pretend the device lacks 64-bit buffer atomics.
    #[arg(long)]
    pub no_int64_atomics: bool,

    /// Pretend the device lacks fragment shader interlock.
    #[arg(long)]
    pub no_fragment_interlock: bool,

    /// Lists the algorithms the device supports and exits.
    #[arg(long)]
    pub list_algorithms: bool,
}

impl CliArgs {
    pub fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            shader_buffer_int64_atomics: !self.no_int64_atomics,
            fragment_shader_interlock: !self.no_fragment_interlock,
            ..Default::default()
        }
    }

    pub fn surface(&self) -> SurfaceInfo {
        SurfaceInfo {
            extent: Extent2D::new(self.window_size.width, self.window_size.height),
            frame_slots: self.frame_slots,
        }
    }

    pub fn initial_state(&self) -> State {
        let mut state = State::default();
        self.state.apply(&mut state);
        state
    }
}

/// Every field of the configuration state. Unset flags keep whatever the state they are applied
/// to already has, which is how sequences layer on top of the command line.
#[derive(Parser, Debug, Clone, Default, PartialEq)]
pub struct StateOverrides {
    /// By name (`spinlock`) or id (`4`).
    #[arg(long, value_parser = value_parser!(Algorithm))]
    pub algorithm: Option<Algorithm>,

    #[arg(long, value_parser = value_parser!(u32).range(1..=64))]
    pub oit_layers: Option<u32>,

    #[arg(long, value_parser = value_parser!(u32).range(1..=128))]
    pub linked_list_allocated_per_element: Option<u32>,

    #[arg(long, value_parser = value_parser!(u32).range(0..=100))]
    pub percent_transparent: Option<u32>,

    #[arg(long, value_parser = BoolishValueParser::new())]
    pub tail_blend: Option<bool>,

    #[arg(long, value_parser = BoolishValueParser::new())]
    pub interlock_is_ordered: Option<bool>,

    #[arg(long, value_parser = value_parser!(u32).range(1..=65536))]
    pub num_objects: Option<u32>,

    #[arg(long, value_parser = value_parser!(u32).range(2..=32))]
    pub subdiv: Option<u32>,

    #[arg(long)]
    pub scale_min: Option<f32>,

    #[arg(long)]
    pub scale_width: Option<f32>,

    /// By name (`msaa4x`) or id (`1`).
    #[arg(long, value_parser = value_parser!(AntialiasingMode))]
    pub aa_type: Option<AntialiasingMode>,

    #[arg(long, value_parser = BoolishValueParser::new())]
    pub draw_ui: Option<bool>,

    #[arg(long)]
    pub alpha_min: Option<f32>,

    #[arg(long)]
    pub alpha_width: Option<f32>,
}

impl StateOverrides {
    pub fn apply(&self, state: &mut State) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }

        set(&mut state.algorithm, &self.algorithm);
        set(&mut state.oit_layers, &self.oit_layers);
        set(&mut state.linked_list_allocated_per_element, &self.linked_list_allocated_per_element);
        set(&mut state.percent_transparent, &self.percent_transparent);
        set(&mut state.tail_blend, &self.tail_blend);
        set(&mut state.interlock_is_ordered, &self.interlock_is_ordered);
        set(&mut state.num_objects, &self.num_objects);
        set(&mut state.subdiv, &self.subdiv);
        set(&mut state.scale_min, &self.scale_min);
        set(&mut state.scale_width, &self.scale_width);
        set(&mut state.aa_type, &self.aa_type);
        set(&mut state.draw_ui, &self.draw_ui);
        set(&mut state.alpha_min, &self.alpha_min);
        set(&mut state.alpha_width, &self.alpha_width);
        state.recompute_antialiasing_settings();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl FromStr for WindowSize {
    type Err = String;

    // 1024x768
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let splits = s.trim().split(['x', 'X']).collect_vec();
        if splits.len() != 2 {
            return Err(format!("Expected WIDTHxHEIGHT, got \"{s}\""));
        }

        let parse = |component: &str| {
            component
                .trim()
                .parse::<u32>()
                .map_err(|e| format!("Invalid window dimension \"{component}\": {e}"))
        };
        let (width, height) = (parse(splits[0])?, parse(splits[1])?);
        if width == 0 || height == 0 {
            return Err("Window dimensions must not be zero".to_string());
        }

        Ok(WindowSize { width, height })
    }
}
