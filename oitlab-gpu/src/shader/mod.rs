//! The shader compiler service: requests are a source file, a stage and a list of defines.
//!
//! Compilers return opaque module code which is handed to
//! [`crate::GpuDevice::create_shader_module`]. [`cache::CachedCompiler`] puts an on-disk cache in
//! front of any compiler that reads its sources from disk.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

pub mod cache;
pub mod preprocessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("Shader source {file} not found in {searched:?}")]
    NotFound { file: String, searched: Vec<PathBuf> },

    #[error("Failed to compile {file}:\n{log}")]
    Compilation { file: String, log: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Shader cache index is corrupt: {0}")]
    CacheIndex(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderRequest {
    pub stage: ShaderStage,
    pub file: String,
    pub defines: Vec<(String, String)>,
}

impl ShaderRequest {
    pub fn new(stage: ShaderStage, file: impl Into<String>) -> Self {
        Self {
            stage,
            file: file.into(),
            defines: vec![],
        }
    }

    pub fn define(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.defines.push((name.into(), value.to_string()));
        self
    }

    pub fn with_defines(mut self, defines: &[(String, String)]) -> Self {
        self.defines.extend_from_slice(defines);
        self
    }

    /// The `#define` block that goes right after the `#version` directive.
    pub fn preamble(&self) -> String {
        self.defines
            .iter()
            .map(|(name, value)| format!("#define {name} {value}\n"))
            .join("")
    }

    pub fn cache_key(&self) -> String {
        format!("{:?}|{}|{}", self.stage, self.file, self.preamble().trim_end())
    }

    pub fn label(&self) -> String {
        if self.defines.is_empty() {
            return self.file.clone();
        }

        let defines = self
            .defines
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .join(",");
        format!("{} [{defines}]", self.file)
    }
}

pub trait ShaderCompiler {
    fn compile(&mut self, request: &ShaderRequest) -> Result<Vec<u8>, ShaderError>;

    /// Where the source of `file` lives, for compilers that read from disk.
    fn resolve(&self, _file: &str) -> Option<PathBuf> {
        None
    }

    /// Every file the module for `file` is built from, includes too. Caching keys on their
    /// modification times.
    fn sources(&self, file: &str) -> Option<Vec<PathBuf>> {
        self.resolve(file).map(|path| vec![path])
    }
}

impl<C: ShaderCompiler + ?Sized> ShaderCompiler for Box<C> {
    fn compile(&mut self, request: &ShaderRequest) -> Result<Vec<u8>, ShaderError> {
        (**self).compile(request)
    }

    fn resolve(&self, file: &str) -> Option<PathBuf> {
        (**self).resolve(file)
    }

    fn sources(&self, file: &str) -> Option<Vec<PathBuf>> {
        (**self).sources(file)
    }
}

/// Produces a module blob describing the request without reading any source. Used for dry runs
/// on the headless device, which never executes shader code.
#[derive(Debug, Default)]
pub struct SyntheticCompiler {
    requests: Vec<ShaderRequest>,
}

impl SyntheticCompiler {
    pub fn requests(&self) -> &[ShaderRequest] {
        &self.requests
    }
}

impl ShaderCompiler for SyntheticCompiler {
    fn compile(&mut self, request: &ShaderRequest) -> Result<Vec<u8>, ShaderError> {
        self.requests.push(request.clone());
        Ok(request.cache_key().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn preamble_lists_defines_in_order() {
        let request = ShaderRequest::new(ShaderStage::Fragment, "oitSimple.frag.glsl")
            .define("OIT_LAYERS", 8)
            .define("PASS", "PASS_COLOR");
        assert_eq!(request.preamble(), "#define OIT_LAYERS 8\n#define PASS PASS_COLOR\n");
        assert_eq!(request.label(), "oitSimple.frag.glsl [OIT_LAYERS=8,PASS=PASS_COLOR]");
    }

    #[test]
    pub fn cache_key_distinguishes_stage_and_defines() {
        let vert = ShaderRequest::new(ShaderStage::Vertex, "object.vert.glsl");
        let frag = ShaderRequest::new(ShaderStage::Fragment, "object.vert.glsl");
        let defined = vert.clone().define("OIT_MSAA", 4);
        assert_ne!(vert.cache_key(), frag.cache_key());
        assert_ne!(vert.cache_key(), defined.cache_key());
    }
}
