use oitlab_gpu::types::Extent2D;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Simple = 0,
    LinkedList = 1,
    Loop = 2,
    Loop64 = 3,
    Spinlock = 4,
    Interlock = 5,
    Weighted = 6,
}

impl Algorithm {
    pub const ALL: [Algorithm; 7] = [
        Algorithm::Simple,
        Algorithm::LinkedList,
        Algorithm::Loop,
        Algorithm::Loop64,
        Algorithm::Spinlock,
        Algorithm::Interlock,
        Algorithm::Weighted,
    ];

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Simple => "simple",
            Algorithm::LinkedList => "linkedlist",
            Algorithm::Loop => "loop",
            Algorithm::Loop64 => "loop64",
            Algorithm::Spinlock => "spinlock",
            Algorithm::Interlock => "interlock",
            Algorithm::Weighted => "weighted",
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    // Either the name or the numeric id, so old scripts using `--algorithm 5` keep working.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Algorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.name().eq_ignore_ascii_case(s) || algorithm.id().to_string() == s)
            .ok_or_else(|| format!("Unknown algorithm \"{s}\""))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AntialiasingMode {
    None = 0,
    Msaa4x = 1,
    Ssaa4x = 2,
    Super4x = 3,
    Msaa8x = 4,
    Ssaa8x = 5,
}

/// What an [`AntialiasingMode`] means for the GPU resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AntialiasingSettings {
    pub msaa: u32,
    pub sample_shading: bool,
    pub supersample: u32,
}

impl AntialiasingMode {
    pub const ALL: [AntialiasingMode; 6] = [
        AntialiasingMode::None,
        AntialiasingMode::Msaa4x,
        AntialiasingMode::Ssaa4x,
        AntialiasingMode::Super4x,
        AntialiasingMode::Msaa8x,
        AntialiasingMode::Ssaa8x,
    ];

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            AntialiasingMode::None => "none",
            AntialiasingMode::Msaa4x => "msaa4x",
            AntialiasingMode::Ssaa4x => "ssaa4x",
            AntialiasingMode::Super4x => "super4x",
            AntialiasingMode::Msaa8x => "msaa8x",
            AntialiasingMode::Ssaa8x => "ssaa8x",
        }
    }

    pub fn settings(self) -> AntialiasingSettings {
        let (msaa, sample_shading, supersample) = match self {
            AntialiasingMode::None => (1, false, 1),
            AntialiasingMode::Msaa4x => (4, false, 1),
            AntialiasingMode::Ssaa4x => (4, true, 1),
            AntialiasingMode::Super4x => (1, false, 2),
            AntialiasingMode::Msaa8x => (8, false, 1),
            AntialiasingMode::Ssaa8x => (8, true, 1),
        };

        AntialiasingSettings {
            msaa,
            sample_shading,
            supersample,
        }
    }
}

impl Display for AntialiasingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AntialiasingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        AntialiasingMode::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s) || mode.id().to_string() == s)
            .ok_or_else(|| format!("Unknown antialiasing mode \"{s}\""))
    }
}

/// Everything the user can change. The renderer keeps two of these: the requested one, mutated by
/// input, and the applied one, which is what the GPU resources currently reflect.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub algorithm: Algorithm,
    pub oit_layers: u32,
    pub linked_list_allocated_per_element: u32,
    pub percent_transparent: u32,
    pub tail_blend: bool,
    pub interlock_is_ordered: bool,
    pub num_objects: u32,
    pub subdiv: u32,
    pub scale_min: f32,
    pub scale_width: f32,
    pub aa_type: AntialiasingMode,
    pub draw_ui: bool,
    // Only written into the uniform block, never trigger a rebuild.
    pub alpha_min: f32,
    pub alpha_width: f32,
    // Derived from aa_type by recompute_antialiasing_settings.
    msaa: u32,
    sample_shading: bool,
    supersample: u32,
}

impl Default for State {
    fn default() -> Self {
        let mut state = State {
            algorithm: Algorithm::Spinlock,
            oit_layers: 8,
            linked_list_allocated_per_element: 10,
            percent_transparent: 100,
            tail_blend: true,
            interlock_is_ordered: true,
            num_objects: 1024,
            subdiv: 16,
            scale_min: 0.1,
            scale_width: 0.9,
            aa_type: AntialiasingMode::None,
            draw_ui: true,
            alpha_min: 0.2,
            alpha_width: 0.3,
            msaa: 1,
            sample_shading: false,
            supersample: 1,
        };
        state.recompute_antialiasing_settings();
        state
    }
}

impl State {
    /// Has to run whenever `aa_type` changed, before the state is compared or used.
    pub fn recompute_antialiasing_settings(&mut self) {
        let settings = self.aa_type.settings();
        self.msaa = settings.msaa;
        self.sample_shading = settings.sample_shading;
        self.supersample = settings.supersample;
    }

    pub fn msaa(&self) -> u32 {
        self.msaa
    }

    pub fn sample_shading(&self) -> bool {
        self.sample_shading
    }

    pub fn supersample(&self) -> u32 {
        self.supersample
    }

    /// Multisampling where the fragment shader runs once per pixel and sees a coverage mask.
    pub fn coverage_shading(&self) -> bool {
        self.msaa > 1 && !self.sample_shading
    }

    /// How often per pixel the fragment shader stores data: per sample with sample shading.
    pub fn storage_samples(&self) -> u32 {
        if self.sample_shading { self.msaa } else { 1 }
    }

    /// Transparent objects come first: `(num_transparent, num_opaque)`.
    pub fn partition(&self) -> (u32, u32) {
        let wanted = self.num_objects as u64 * self.percent_transparent as u64 / 100;
        let num_transparent = wanted.min(self.num_objects as u64) as u32;
        (num_transparent, self.num_objects - num_transparent)
    }
}

/// The presentation surface the frame resources are sized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub extent: Extent2D,
    /// Frames that may be in flight at once; one uniform buffer and descriptor set each.
    pub frame_slots: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn antialiasing_derivation_is_total() {
        let expected = [
            (AntialiasingMode::None, 1, false, 1),
            (AntialiasingMode::Msaa4x, 4, false, 1),
            (AntialiasingMode::Ssaa4x, 4, true, 1),
            (AntialiasingMode::Super4x, 1, false, 2),
            (AntialiasingMode::Msaa8x, 8, false, 1),
            (AntialiasingMode::Ssaa8x, 8, true, 1),
        ];

        for (mode, msaa, sample_shading, supersample) in expected {
            let mut state = State {
                aa_type: mode,
                ..State::default()
            };
            state.recompute_antialiasing_settings();
            assert_eq!(
                (state.msaa(), state.sample_shading(), state.supersample()),
                (msaa, sample_shading, supersample),
                "{mode}"
            );
            assert_eq!(state.coverage_shading(), msaa > 1 && !sample_shading);
        }
    }

    #[test]
    pub fn stale_derived_fields_break_equality() {
        let mut requested = State::default();
        requested.aa_type = AntialiasingMode::Msaa4x;
        let applied = State::default();
        // only aa_type differs until the recompute, afterwards msaa differs too.
        requested.recompute_antialiasing_settings();
        assert_ne!(requested.msaa(), applied.msaa());
    }

    #[test]
    pub fn partition_is_a_prefix() {
        let mut state = State {
            num_objects: 1024,
            percent_transparent: 30,
            ..State::default()
        };
        assert_eq!(state.partition(), (307, 717));

        state.percent_transparent = 100;
        assert_eq!(state.partition(), (1024, 0));

        state.percent_transparent = 0;
        assert_eq!(state.partition(), (0, 1024));

        state.num_objects = 0;
        assert_eq!(state.partition(), (0, 0));
    }

    #[test]
    pub fn algorithms_parse_from_name_and_id() {
        assert_eq!("loop64".parse::<Algorithm>(), Ok(Algorithm::Loop64));
        assert_eq!("5".parse::<Algorithm>(), Ok(Algorithm::Interlock));
        assert_eq!("Weighted".parse::<Algorithm>(), Ok(Algorithm::Weighted));
        assert!("7".parse::<Algorithm>().is_err());
        assert_eq!("super4x".parse::<AntialiasingMode>(), Ok(AntialiasingMode::Super4x));
        assert_eq!("1".parse::<AntialiasingMode>(), Ok(AntialiasingMode::Msaa4x));
    }
}
