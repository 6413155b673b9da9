use crate::rendering::algorithm::supported_algorithms;
use crate::rendering::camera::OrbitCamera;
use crate::rendering::orchestrator::{FrameOrchestrator, HeadlessPresenter};
use crate::rendering::reconciler::Reconciler;
use crate::rendering::scene::UvSphereGenerator;
use crate::rendering::state::State;
use crate::sequence::{self, Sequence};
use crate::settings::{CliArgs, StateOverrides};
use anyhow::{Context, bail};
use itertools::Itertools;
use log::{info, warn};
use oitlab_gpu::GpuDevice;
use oitlab_gpu::headless::HeadlessDevice;
use oitlab_gpu::shader::cache::CachedCompiler;
use oitlab_gpu::shader::preprocessor::GlslPreprocessor;
use oitlab_gpu::shader::{ShaderCompiler, SyntheticCompiler};

/// Runs the renderer against the headless device: either the configuration from the command
/// line, or every sequence of a script one after the other in the same process.
pub struct HeadlessApplication {
    args: CliArgs,
    device: HeadlessDevice,
}

fn create_compiler(args: &CliArgs) -> anyhow::Result<Box<dyn ShaderCompiler>> {
    let Some(shader_dir) = &args.shader_dir else {
        info!("No shader directory configured, using synthetic shader modules");
        return Ok(Box::new(SyntheticCompiler::default()));
    };

    let preprocessor = GlslPreprocessor::new([shader_dir.clone()]);
    match &args.shader_cache_dir {
        Some(cache_dir) => {
            let cached = CachedCompiler::open(preprocessor, cache_dir.clone())
                .with_context(|| format!("Opening the shader cache at {}", cache_dir.display()))?;
            Ok(Box::new(cached))
        }
        None => Ok(Box::new(preprocessor)),
    }
}

impl HeadlessApplication {
    pub fn new(args: CliArgs) -> Self {
        let device = HeadlessDevice::new(args.capabilities());
        Self { args, device }
    }

    pub fn device(&self) -> &HeadlessDevice {
        &self.device
    }

    pub fn list_algorithms(&self) {
        for algorithm in supported_algorithms(self.device.capabilities()) {
            println!("{:>2} {:<12} {}", algorithm.id(), algorithm.name(), algorithm.profile().description);
        }
    }

    fn sequences(&self) -> anyhow::Result<Vec<Sequence>> {
        if self.args.test_matrix {
            return Ok(sequence::default_matrix());
        }

        match &self.args.sequence_file {
            Some(path) => {
                let script = std::fs::read_to_string(path)
                    .with_context(|| format!("Reading the sequence file {}", path.display()))?;
                sequence::parse(&script).with_context(|| format!("Parsing {}", path.display()))
            }
            None => Ok(vec![Sequence {
                name: "command line".into(),
                overrides: StateOverrides::default(),
            }]),
        }
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        let initial = self.args.initial_state();
        if !initial.algorithm.is_supported(self.device.capabilities()) {
            bail!(
                "{} is not supported by this device, pick one of: {}",
                initial.algorithm,
                supported_algorithms(self.device.capabilities()).iter().join(", ")
            );
        }

        let sequences = self.sequences()?;
        let reconciler = Reconciler::new(create_compiler(&self.args)?, Box::new(UvSphereGenerator));
        let mut orchestrator = FrameOrchestrator::new(
            reconciler,
            Box::new(OrbitCamera::default()),
            Box::new(HeadlessPresenter::default()),
            initial.clone(),
            self.args.surface(),
        );

        let mut failed = Vec::new();
        for sequence in &sequences {
            let mut state: State = initial.clone();
            sequence.overrides.apply(&mut state);
            if !state.algorithm.is_supported(self.device.capabilities()) {
                warn!("Skipping \"{}\": {} is not supported", sequence.name, state.algorithm);
                continue;
            }

            info!("Running \"{}\"", sequence.name);
            orchestrator.request(state);
            for _ in 0..self.args.frames {
                let report = orchestrator
                    .render_frame(&mut self.device)
                    .with_context(|| format!("Rendering \"{}\"", sequence.name))?;
                if report.reverted {
                    failed.push(sequence.name.clone());
                    break;
                }
            }
        }

        let stats = orchestrator.reconciler().stats();
        info!(
            "Rendered {} frames, {} reconciliations ({} without changes), rebuilds: {}",
            orchestrator.frames_rendered(),
            stats.calls,
            stats.clean,
            stats
                .rebuilds
                .iter()
                .map(|(category, count)| format!("{category} {count}"))
                .join(", ")
        );

        orchestrator
            .destroy(&mut self.device)
            .context("Tearing down the renderer")?;
        if self.device.live_count() > 0 {
            warn!("{} GPU objects leaked", self.device.live_count());
        }

        if !failed.is_empty() {
            bail!("{} sequences failed to apply: {}", failed.len(), failed.join(", "));
        }
        Ok(())
    }
}
