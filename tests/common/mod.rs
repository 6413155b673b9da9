#![allow(dead_code)]

use oitlab::rendering::camera::OrbitCamera;
use oitlab::rendering::orchestrator::{FrameOrchestrator, HeadlessPresenter};
use oitlab::rendering::reconciler::Reconciler;
use oitlab::rendering::scene::UvSphereGenerator;
use oitlab::rendering::state::{State, SurfaceInfo};
use oitlab_gpu::shader::{ShaderCompiler, ShaderError, ShaderRequest, SyntheticCompiler};
use oitlab_gpu::types::Extent2D;
use std::cell::Cell;
use std::rc::Rc;

/// Synthetic modules until told to fail, then every request fails like a syntax error would.
#[derive(Default)]
pub struct SwitchableCompiler {
    inner: SyntheticCompiler,
    failing: Rc<Cell<bool>>,
}

impl SwitchableCompiler {
    pub fn failure_switch(&self) -> Rc<Cell<bool>> {
        self.failing.clone()
    }
}

impl ShaderCompiler for SwitchableCompiler {
    fn compile(&mut self, request: &ShaderRequest) -> Result<Vec<u8>, ShaderError> {
        if self.failing.get() {
            return Err(ShaderError::Compilation {
                file: request.file.clone(),
                log: "ERROR: 0:1: '' : syntax error".into(),
            });
        }
        self.inner.compile(request)
    }
}

pub fn surface() -> SurfaceInfo {
    SurfaceInfo {
        extent: Extent2D::new(64, 32),
        frame_slots: 2,
    }
}

/// A small scene, so the per-algorithm storage stays tiny.
pub fn small_state() -> State {
    let mut state = State::default();
    state.num_objects = 16;
    state.subdiv = 4;
    state
}

pub fn reconciler() -> (Reconciler, Rc<Cell<bool>>) {
    let compiler = SwitchableCompiler::default();
    let failing = compiler.failure_switch();
    (Reconciler::new(Box::new(compiler), Box::new(UvSphereGenerator)), failing)
}

pub fn orchestrator(state: State) -> (FrameOrchestrator, Rc<Cell<bool>>) {
    let (reconciler, failing) = reconciler();
    let orchestrator = FrameOrchestrator::new(
        reconciler,
        Box::new(OrbitCamera::default()),
        Box::new(HeadlessPresenter::default()),
        state,
        surface(),
    );
    (orchestrator, failing)
}
