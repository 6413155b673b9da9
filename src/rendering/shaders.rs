//! Shader variants for the active algorithm.
//!
//! Compilation and module creation are two steps: [`compile_shaders`] only talks to the
//! compiler and can fail without any GPU object having been touched, [`CompiledShaders::create`]
//! turns the blobs into modules once the old ones are gone.

use crate::rendering::algorithm::PassKind;
use crate::rendering::state::State;
use log::debug;
use oitlab_gpu::shader::{ShaderCompiler, ShaderError, ShaderRequest, ShaderStage};
use oitlab_gpu::types::ShaderModuleDesc;
use oitlab_gpu::{GpuDevice, GpuError, ShaderModuleHandle};
use std::collections::BTreeMap;

pub const OBJECT_VERTEX_SHADER: &str = "object.vert.glsl";
pub const FULLSCREEN_VERTEX_SHADER: &str = "fullScreenTriangle.vert.glsl";
pub const OPAQUE_FRAGMENT_SHADER: &str = "opaque.frag.glsl";

fn flag(value: bool) -> u32 {
    value as u32
}

/// Defines every shader of a configuration is compiled with.
pub fn shader_defines(state: &State) -> Vec<(String, String)> {
    [
        ("OIT_LAYERS", state.oit_layers),
        ("OIT_TAILBLEND", flag(state.tail_blend)),
        ("OIT_INTERLOCK_IS_ORDERED", flag(state.interlock_is_ordered)),
        ("OIT_MSAA", state.msaa()),
        ("OIT_SAMPLE_SHADING", flag(state.sample_shading())),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

#[derive(Debug)]
struct CompiledModule {
    label: String,
    stage: ShaderStage,
    code: Vec<u8>,
}

fn compile(compiler: &mut dyn ShaderCompiler, request: ShaderRequest) -> Result<CompiledModule, ShaderError> {
    let code = compiler.compile(&request)?;
    Ok(CompiledModule {
        label: request.label(),
        stage: request.stage,
        code,
    })
}

/// Blobs of every module the active algorithm needs, not yet on the device.
#[derive(Debug)]
pub struct CompiledShaders {
    object_vertex: CompiledModule,
    fullscreen_vertex: CompiledModule,
    opaque_fragment: CompiledModule,
    pass_fragments: BTreeMap<PassKind, CompiledModule>,
}

pub fn compile_shaders(compiler: &mut dyn ShaderCompiler, state: &State) -> Result<CompiledShaders, ShaderError> {
    profiling::scope!("compile_shaders");
    let defines = shader_defines(state);
    let profile = state.algorithm.profile();

    let object_vertex = compile(
        compiler,
        ShaderRequest::new(ShaderStage::Vertex, OBJECT_VERTEX_SHADER).with_defines(&defines),
    )?;
    let fullscreen_vertex = compile(
        compiler,
        ShaderRequest::new(ShaderStage::Vertex, FULLSCREEN_VERTEX_SHADER).with_defines(&defines),
    )?;
    let opaque_fragment = compile(
        compiler,
        ShaderRequest::new(ShaderStage::Fragment, OPAQUE_FRAGMENT_SHADER).with_defines(&defines),
    )?;

    let mut pass_fragments = BTreeMap::new();
    for pass in profile.passes() {
        let request = ShaderRequest::new(ShaderStage::Fragment, profile.shader_file)
            .with_defines(&defines)
            .define("PASS", pass.define());
        pass_fragments.insert(pass, compile(compiler, request)?);
    }

    debug!(
        "Compiled {} shader variants for {}",
        pass_fragments.len() + 3,
        state.algorithm
    );
    Ok(CompiledShaders {
        object_vertex,
        fullscreen_vertex,
        opaque_fragment,
        pass_fragments,
    })
}

fn create_module(device: &mut dyn GpuDevice, module: CompiledModule) -> Result<ShaderModuleHandle, GpuError> {
    device.create_shader_module(&ShaderModuleDesc {
        label: module.label,
        stage: module.stage,
        code: module.code,
    })
}

impl CompiledShaders {
    pub fn create(self, device: &mut dyn GpuDevice) -> Result<ShaderModules, GpuError> {
        let object_vertex = create_module(device, self.object_vertex)?;
        let fullscreen_vertex = create_module(device, self.fullscreen_vertex)?;
        let opaque_fragment = create_module(device, self.opaque_fragment)?;
        let mut pass_fragments = BTreeMap::new();
        for (pass, module) in self.pass_fragments {
            pass_fragments.insert(pass, create_module(device, module)?);
        }

        Ok(ShaderModules {
            object_vertex,
            fullscreen_vertex,
            opaque_fragment,
            pass_fragments,
        })
    }
}

#[derive(Debug)]
pub struct ShaderModules {
    pub object_vertex: ShaderModuleHandle,
    pub fullscreen_vertex: ShaderModuleHandle,
    pub opaque_fragment: ShaderModuleHandle,
    pub pass_fragments: BTreeMap<PassKind, ShaderModuleHandle>,
}

impl ShaderModules {
    /// Vertex and fragment module of one algorithm pass.
    pub fn pass_modules(&self, pass: PassKind) -> Option<(ShaderModuleHandle, ShaderModuleHandle)> {
        let vertex = match pass {
            PassKind::Composite => self.fullscreen_vertex,
            PassKind::Depth | PassKind::Color => self.object_vertex,
        };
        self.pass_fragments.get(&pass).map(|&fragment| (vertex, fragment))
    }

    pub fn destroy(self, device: &mut dyn GpuDevice) -> Result<(), GpuError> {
        for module in self.pass_fragments.into_values() {
            device.destroy_shader_module(module)?;
        }
        device.destroy_shader_module(self.opaque_fragment)?;
        device.destroy_shader_module(self.fullscreen_vertex)?;
        device.destroy_shader_module(self.object_vertex)
    }
}
