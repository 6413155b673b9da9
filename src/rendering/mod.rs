use oitlab_gpu::GpuError;
use oitlab_gpu::shader::ShaderError;
use std::time::Duration;
use thiserror::Error;

pub mod algorithm;
pub mod camera;
pub mod descriptors;
pub mod engine;
pub mod frame_images;
pub mod framebuffers;
pub mod orchestrator;
pub mod pipelines;
pub mod reconciler;
pub mod render_passes;
pub mod scene;
pub mod shaders;
pub mod state;
pub mod uniforms;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error("Failed to encode the scene uniforms: {0}")]
    Uniforms(#[from] encase::internal::Error),

    #[error("Frame slot {slot} was not released within {timeout:?}")]
    FrameTimeout { slot: usize, timeout: Duration },

    #[error("The {0} has not been created")]
    MissingResource(&'static str),
}
