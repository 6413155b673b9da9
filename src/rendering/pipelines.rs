use crate::rendering::algorithm::PassKind;
use crate::rendering::descriptors::DescriptorSets;
use crate::rendering::render_passes::RenderPasses;
use crate::rendering::scene::vertex_layout;
use crate::rendering::shaders::ShaderModules;
use crate::rendering::state::State;
use log::trace;
use oitlab_gpu::types::{BlendAttachment, BlendFactor, CompareOp, CullMode, Extent2D, GraphicsPipelineDesc};
use oitlab_gpu::{GpuDevice, GpuError, PipelineHandle, RenderPassHandle, ShaderModuleHandle};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Opaque: no blending, depth writes.
    None,
    /// Premultiplied alpha over, depth test only.
    Premultiplied,
    /// Additive accumulation into the first target, multiplicative reveal into the second.
    WeightedColor,
    /// Resolves the accumulated weighted color onto the opaque image.
    WeightedComposite,
}

const fn blend(src: BlendFactor, dst: BlendFactor, src_alpha: BlendFactor, dst_alpha: BlendFactor) -> BlendAttachment {
    BlendAttachment {
        enabled: true,
        src_color: src,
        dst_color: dst,
        src_alpha,
        dst_alpha,
    }
}

impl BlendMode {
    pub fn attachments(self) -> Vec<BlendAttachment> {
        use BlendFactor::*;

        match self {
            BlendMode::None => vec![BlendAttachment::DISABLED],
            BlendMode::Premultiplied => vec![blend(One, OneMinusSrcAlpha, One, OneMinusSrcAlpha)],
            BlendMode::WeightedColor => vec![
                blend(One, One, One, One),
                blend(Zero, OneMinusSrcColor, Zero, OneMinusSrcAlpha),
            ],
            BlendMode::WeightedComposite => vec![blend(OneMinusSrcAlpha, SrcAlpha, OneMinusSrcAlpha, SrcAlpha)],
        }
    }

    pub fn writes_depth(self) -> bool {
        self == BlendMode::None
    }
}

/// Where and how a pipeline draws.
#[derive(Debug, Clone, Copy)]
struct PipelineTarget {
    render_pass: RenderPassHandle,
    subpass: u32,
    blend: BlendMode,
    uses_vertex_input: bool,
    double_sided: bool,
    /// The weighted composite subpass has no depth attachment.
    depth_test: bool,
}

struct PipelineFactory<'a> {
    state: &'a State,
    descriptors: &'a DescriptorSets,
    viewport: Extent2D,
}

impl PipelineFactory<'_> {
    fn create(
        &self,
        device: &mut dyn GpuDevice,
        label: String,
        (vertex, fragment): (ShaderModuleHandle, ShaderModuleHandle),
        target: PipelineTarget,
    ) -> Result<PipelineHandle, GpuError> {
        trace!("Creating pipeline {label} ({:?})", target.blend);
        device.create_graphics_pipeline(&GraphicsPipelineDesc {
            label,
            layout: self.descriptors.pipeline_layout,
            render_pass: target.render_pass,
            subpass: target.subpass,
            vertex,
            fragment,
            vertex_layout: target.uses_vertex_input.then(vertex_layout),
            cull_mode: if target.double_sided { CullMode::None } else { CullMode::Back },
            front_face_ccw: true,
            depth_test: target.depth_test,
            depth_write: target.blend.writes_depth(),
            depth_compare: CompareOp::Less,
            samples: self.state.msaa(),
            sample_shading: self.state.sample_shading(),
            blend: target.blend.attachments(),
            viewport: self.viewport,
        })
    }
}

/// The opaque pipeline plus one pipeline per pass of the active algorithm.
#[derive(Debug)]
pub struct Pipelines {
    pub opaque: PipelineHandle,
    pub passes: BTreeMap<PassKind, PipelineHandle>,
}

impl Pipelines {
    pub fn create(
        device: &mut dyn GpuDevice,
        state: &State,
        shaders: &ShaderModules,
        render_passes: &RenderPasses,
        descriptors: &DescriptorSets,
        viewport: Extent2D,
    ) -> Result<Self, GpuError> {
        let profile = state.algorithm.profile();
        let factory = PipelineFactory {
            state,
            descriptors,
            viewport,
        };

        let opaque = factory.create(
            device,
            "opaque".into(),
            (shaders.object_vertex, shaders.opaque_fragment),
            PipelineTarget {
                render_pass: render_passes.main,
                subpass: 0,
                blend: BlendMode::None,
                uses_vertex_input: true,
                double_sided: false,
                depth_test: true,
            },
        )?;

        let mut passes = BTreeMap::new();
        for pass in profile.passes() {
            let Some(modules) = shaders.pass_modules(pass) else {
                // modules are compiled from the same profile
                unreachable!("no shader modules for the {pass:?} pass of {}", state.algorithm);
            };

            let uses_vertex_input = pass != PassKind::Composite;
            let target = match (profile.weighted_targets, pass) {
                (true, PassKind::Composite) => PipelineTarget {
                    render_pass: render_passes.weighted,
                    subpass: 1,
                    blend: BlendMode::WeightedComposite,
                    uses_vertex_input,
                    double_sided: true,
                    depth_test: false,
                },
                (true, _) => PipelineTarget {
                    render_pass: render_passes.weighted,
                    subpass: 0,
                    blend: BlendMode::WeightedColor,
                    uses_vertex_input,
                    double_sided: true,
                    depth_test: true,
                },
                (false, _) => PipelineTarget {
                    render_pass: render_passes.main,
                    subpass: 0,
                    blend: BlendMode::Premultiplied,
                    uses_vertex_input,
                    double_sided: true,
                    depth_test: true,
                },
            };

            let label = format!("{} {}", state.algorithm, pass.label());
            passes.insert(pass, factory.create(device, label, modules, target)?);
        }

        Ok(Self { opaque, passes })
    }

    pub fn pass(&self, pass: PassKind) -> Option<PipelineHandle> {
        self.passes.get(&pass).copied()
    }

    pub fn destroy(self, device: &mut dyn GpuDevice) -> Result<(), GpuError> {
        for pipeline in self.passes.into_values() {
            device.destroy_pipeline(pipeline)?;
        }
        device.destroy_pipeline(self.opaque)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn weighted_color_writes_two_targets() {
        let attachments = BlendMode::WeightedColor.attachments();
        assert_eq!(attachments.len(), 2);
        assert_eq!(
            (attachments[1].src_color, attachments[1].dst_color),
            (BlendFactor::Zero, BlendFactor::OneMinusSrcColor)
        );
    }

    #[test]
    pub fn only_opaque_writes_depth() {
        assert!(BlendMode::None.writes_depth());
        for mode in [BlendMode::Premultiplied, BlendMode::WeightedColor, BlendMode::WeightedComposite] {
            assert!(!mode.writes_depth());
            assert!(mode.attachments().iter().all(|attachment| attachment.enabled));
        }
    }
}
