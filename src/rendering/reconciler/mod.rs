//! Keeps the GPU resources in sync with the configuration.
//!
//! The [`Reconciler`] owns every resource whose shape depends on [`State`]. Each call compares
//! the requested configuration against the applied one, and only the categories the
//! [`dirty::RULES`] mark get torn down (dependents first) and rebuilt (dependencies first). The
//! device is idled before the first destruction, so nothing in flight ever loses a resource.

use crate::rendering::RenderError;
use crate::rendering::descriptors::DescriptorSets;
use crate::rendering::frame_images::FrameImages;
use crate::rendering::framebuffers::Framebuffers;
use crate::rendering::pipelines::Pipelines;
use crate::rendering::render_passes::RenderPasses;
use crate::rendering::scene::{GeometryGenerator, SceneBuffers, generate_scene};
use crate::rendering::shaders::{CompiledShaders, ShaderModules, compile_shaders};
use crate::rendering::state::{State, SurfaceInfo};
use crate::rendering::uniforms::UniformBuffers;
use dirty::{Category, Change, DirtySet, evaluate};
use log::{debug, error, info};
use oitlab_gpu::GpuDevice;
use oitlab_gpu::shader::ShaderCompiler;
use std::collections::BTreeMap;

pub mod dirty;

/// Everything the reconciler owns, one slot per category.
#[derive(Debug, Default)]
pub struct ResourceSet {
    pub uniforms: Option<UniformBuffers>,
    pub scene: Option<SceneBuffers>,
    pub images: Option<FrameImages>,
    pub descriptors: Option<DescriptorSets>,
    pub render_passes: Option<RenderPasses>,
    pub framebuffers: Option<Framebuffers>,
    pub shaders: Option<ShaderModules>,
    pub pipelines: Option<Pipelines>,
}

/// Borrowed view of a complete [`ResourceSet`] for recording a frame. The images are mutable
/// because recording tracks their layouts.
#[derive(Debug)]
pub struct FrameResources<'a> {
    pub uniforms: &'a UniformBuffers,
    pub scene: &'a SceneBuffers,
    pub images: &'a mut FrameImages,
    pub descriptors: &'a DescriptorSets,
    pub render_passes: &'a RenderPasses,
    pub framebuffers: &'a Framebuffers,
    pub pipelines: &'a Pipelines,
}

fn missing(category: Category) -> RenderError {
    RenderError::MissingResource(category.name())
}

impl ResourceSet {
    pub fn is_built(&self, category: Category) -> bool {
        match category {
            Category::UniformBuffers => self.uniforms.is_some(),
            Category::Scene => self.scene.is_some(),
            Category::FrameImages => self.images.is_some(),
            Category::DescriptorSets => self.descriptors.is_some(),
            Category::RenderPasses => self.render_passes.is_some(),
            Category::Framebuffers => self.framebuffers.is_some(),
            Category::Shaders => self.shaders.is_some(),
            Category::Pipelines => self.pipelines.is_some(),
        }
    }

    pub fn frame(&mut self) -> Result<FrameResources<'_>, RenderError> {
        Ok(FrameResources {
            uniforms: self.uniforms.as_ref().ok_or(missing(Category::UniformBuffers))?,
            scene: self.scene.as_ref().ok_or(missing(Category::Scene))?,
            images: self.images.as_mut().ok_or(missing(Category::FrameImages))?,
            descriptors: self.descriptors.as_ref().ok_or(missing(Category::DescriptorSets))?,
            render_passes: self.render_passes.as_ref().ok_or(missing(Category::RenderPasses))?,
            framebuffers: self.framebuffers.as_ref().ok_or(missing(Category::Framebuffers))?,
            pipelines: self.pipelines.as_ref().ok_or(missing(Category::Pipelines))?,
        })
    }

    fn destroy(&mut self, device: &mut dyn GpuDevice, category: Category) -> Result<(), RenderError> {
        match category {
            Category::UniformBuffers => self.uniforms.take().map(|r| r.destroy(device)),
            Category::Scene => self.scene.take().map(|r| r.destroy(device)),
            Category::FrameImages => self.images.take().map(|r| r.destroy(device)),
            Category::DescriptorSets => self.descriptors.take().map(|r| r.destroy(device)),
            Category::RenderPasses => self.render_passes.take().map(|r| r.destroy(device)),
            Category::Framebuffers => self.framebuffers.take().map(|r| r.destroy(device)),
            Category::Shaders => self.shaders.take().map(|r| r.destroy(device)),
            Category::Pipelines => self.pipelines.take().map(|r| r.destroy(device)),
        }
        .transpose()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileStats {
    pub calls: usize,
    /// Calls that found nothing to do.
    pub clean: usize,
    pub rebuilds: BTreeMap<Category, usize>,
    pub shader_failures: usize,
}

pub struct Reconciler {
    compiler: Box<dyn ShaderCompiler>,
    geometry: Box<dyn GeometryGenerator>,
    resources: ResourceSet,
    applied: Option<(State, SurfaceInfo)>,
    stats: ReconcileStats,
}

impl Reconciler {
    pub fn new(compiler: Box<dyn ShaderCompiler>, geometry: Box<dyn GeometryGenerator>) -> Self {
        Self {
            compiler,
            geometry,
            resources: ResourceSet::default(),
            applied: None,
            stats: ReconcileStats::default(),
        }
    }

    /// The configuration the resources currently reflect. `None` before the first successful
    /// reconciliation.
    pub fn applied(&self) -> Option<&State> {
        self.applied.as_ref().map(|(state, _)| state)
    }

    pub fn applied_surface(&self) -> Option<&SurfaceInfo> {
        self.applied.as_ref().map(|(_, surface)| surface)
    }

    pub fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceSet {
        &mut self.resources
    }

    pub fn stats(&self) -> &ReconcileStats {
        &self.stats
    }

    /// Which categories reconciling `requested` would rebuild.
    pub fn dirty_categories(&self, requested: &State, surface: &SurfaceInfo, force: bool) -> DirtySet {
        let (applied, applied_surface) = match &self.applied {
            Some((state, applied_surface)) => (state, applied_surface),
            None => return DirtySet::all(),
        };
        evaluate(&Change {
            requested,
            applied,
            surface,
            applied_surface,
            forced: force,
        })
    }

    /// Brings the resources in line with `requested` and returns what has been rebuilt.
    ///
    /// A shader compilation failure is reported before any resource is touched: the applied
    /// configuration and all resources stay as they were. Any other error leaves the resource
    /// set incomplete and is not meant to be recovered from.
    pub fn reconcile(
        &mut self,
        device: &mut dyn GpuDevice,
        requested: &State,
        surface: &SurfaceInfo,
        force: bool,
    ) -> Result<DirtySet, RenderError> {
        profiling::scope!("reconcile");
        assert!(
            requested.algorithm.is_supported(device.capabilities()),
            "{} is not supported by this device and should never have been selected",
            requested.algorithm
        );

        let mut requested = requested.clone();
        requested.recompute_antialiasing_settings();

        self.stats.calls += 1;
        let dirty = self.dirty_categories(&requested, surface, force);
        if dirty.is_empty() {
            // uniform-only fields may still differ
            self.stats.clean += 1;
            self.applied = Some((requested, *surface));
            return Ok(dirty);
        }

        let mut compiled = if dirty.contains(Category::Shaders) {
            match compile_shaders(self.compiler.as_mut(), &requested) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    error!("Shader compilation for {} failed, keeping the previous state: {e}", requested.algorithm);
                    self.stats.shader_failures += 1;
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        device.wait_idle()?;

        for category in dirty.iter().rev() {
            if self.resources.is_built(category) {
                debug!("Destroying {category}");
                self.resources.destroy(device, category)?;
            }
        }

        for category in dirty.iter() {
            debug!("Creating {category}");
            self.create(device, category, &requested, surface, &mut compiled)?;
            *self.stats.rebuilds.entry(category).or_default() += 1;
        }

        info!(
            "Applied {} ({}, {} layers, {} objects): rebuilt {dirty}",
            requested.algorithm, requested.aa_type, requested.oit_layers, requested.num_objects
        );
        self.applied = Some((requested, *surface));
        Ok(dirty)
    }

    fn create(
        &mut self,
        device: &mut dyn GpuDevice,
        category: Category,
        state: &State,
        surface: &SurfaceInfo,
        compiled: &mut Option<CompiledShaders>,
    ) -> Result<(), RenderError> {
        let resources = &mut self.resources;
        match category {
            Category::UniformBuffers => {
                resources.uniforms = Some(UniformBuffers::create(device, surface.frame_slots)?);
            }
            Category::Scene => {
                let geometry = generate_scene(state, self.geometry.as_ref());
                resources.scene = Some(SceneBuffers::create(device, &geometry)?);
            }
            Category::FrameImages => {
                resources.images = Some(FrameImages::create(device, state, surface)?);
            }
            Category::DescriptorSets => {
                resources.descriptors = Some(DescriptorSets::create(device, state, surface.frame_slots)?);
            }
            Category::RenderPasses => {
                resources.render_passes = Some(RenderPasses::create(device, state.msaa())?);
            }
            Category::Framebuffers => {
                let passes = resources.render_passes.as_ref().ok_or(missing(Category::RenderPasses))?;
                let images = resources.images.as_ref().ok_or(missing(Category::FrameImages))?;
                let descriptors = resources.descriptors.as_ref().ok_or(missing(Category::DescriptorSets))?;
                let uniforms = resources.uniforms.as_ref().ok_or(missing(Category::UniformBuffers))?;

                let framebuffers = Framebuffers::create(device, passes, images)?;
                device.update_descriptor_sets(&descriptors.writes(uniforms, images))?;
                resources.framebuffers = Some(framebuffers);
            }
            Category::Shaders => {
                let compiled = compiled.take().ok_or(missing(Category::Shaders))?;
                resources.shaders = Some(compiled.create(device)?);
            }
            Category::Pipelines => {
                let shaders = resources.shaders.as_ref().ok_or(missing(Category::Shaders))?;
                let passes = resources.render_passes.as_ref().ok_or(missing(Category::RenderPasses))?;
                let descriptors = resources.descriptors.as_ref().ok_or(missing(Category::DescriptorSets))?;
                let images = resources.images.as_ref().ok_or(missing(Category::FrameImages))?;

                resources.pipelines = Some(Pipelines::create(
                    device,
                    state,
                    shaders,
                    passes,
                    descriptors,
                    images.buffer_extent,
                )?);
            }
        }
        Ok(())
    }

    /// Destroys every resource. The next reconciliation starts from scratch.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) -> Result<(), RenderError> {
        device.wait_idle()?;
        for category in Category::REBUILD_ORDER.into_iter().rev() {
            self.resources.destroy(device, category)?;
        }
        self.applied = None;
        Ok(())
    }
}
