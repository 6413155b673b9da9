use crate::rendering::frame_images::{COLOR_FORMAT, DEPTH_FORMAT, WEIGHTED_COLOR_FORMAT, WEIGHTED_REVEAL_FORMAT};
use oitlab_gpu::types::{
    Access, AttachmentDesc, Format, ImageLayout, LoadOp, PipelineStage, RenderPassDesc, SUBPASS_EXTERNAL,
    StoreOp, SubpassDependency, SubpassDesc,
};
use oitlab_gpu::{GpuDevice, GpuError, RenderPassHandle};

/// Attachment order of the weighted render pass.
pub mod weighted_attachment {
    pub const ACCUMULATION: u32 = 0;
    pub const REVEAL: u32 = 1;
    pub const COLOR: u32 = 2;
    pub const DEPTH: u32 = 3;
}

fn attachment(format: Format, samples: u32, load: LoadOp, initial: ImageLayout, final_layout: ImageLayout) -> AttachmentDesc {
    AttachmentDesc {
        format,
        samples,
        load,
        store: StoreOp::Store,
        initial_layout: initial,
        final_layout,
    }
}

/// Color and depth, cleared. Storage writes of one draw have to be visible to the next one inside
/// the same subpass, hence the self dependency.
pub fn main_pass_desc(samples: u32) -> RenderPassDesc {
    let fragment_storage = Access::SHADER_READ | Access::SHADER_WRITE;
    RenderPassDesc {
        label: "mainRenderPass".into(),
        attachments: vec![
            attachment(
                COLOR_FORMAT,
                samples,
                LoadOp::Clear,
                ImageLayout::ColorAttachment,
                ImageLayout::ColorAttachment,
            ),
            attachment(
                DEPTH_FORMAT,
                samples,
                LoadOp::Clear,
                ImageLayout::Undefined,
                ImageLayout::DepthStencilAttachment,
            ),
        ],
        subpasses: vec![SubpassDesc {
            color: vec![0],
            input: vec![],
            depth: Some(1),
        }],
        dependencies: vec![SubpassDependency {
            src_subpass: 0,
            dst_subpass: 0,
            src_stage: PipelineStage::FRAGMENT_SHADER,
            dst_stage: PipelineStage::FRAGMENT_SHADER,
            src_access: fragment_storage,
            dst_access: fragment_storage,
            by_region: true,
        }],
    }
}

/// Subpass 0 accumulates into the two float targets, subpass 1 reads them back as input
/// attachments and composites onto the color image the main pass left behind.
pub fn weighted_pass_desc(samples: u32) -> RenderPassDesc {
    use weighted_attachment::*;

    RenderPassDesc {
        label: "weightedRenderPass".into(),
        attachments: vec![
            attachment(
                WEIGHTED_COLOR_FORMAT,
                samples,
                LoadOp::Clear,
                ImageLayout::Undefined,
                ImageLayout::ShaderReadOnly,
            ),
            attachment(
                WEIGHTED_REVEAL_FORMAT,
                samples,
                LoadOp::Clear,
                ImageLayout::Undefined,
                ImageLayout::ShaderReadOnly,
            ),
            attachment(
                COLOR_FORMAT,
                samples,
                LoadOp::Load,
                ImageLayout::ColorAttachment,
                ImageLayout::ColorAttachment,
            ),
            attachment(
                DEPTH_FORMAT,
                samples,
                LoadOp::Load,
                ImageLayout::DepthStencilAttachment,
                ImageLayout::DepthStencilAttachment,
            ),
        ],
        subpasses: vec![
            SubpassDesc {
                color: vec![ACCUMULATION, REVEAL],
                input: vec![],
                depth: Some(DEPTH),
            },
            SubpassDesc {
                color: vec![COLOR],
                input: vec![ACCUMULATION, REVEAL],
                depth: None,
            },
        ],
        dependencies: vec![
            SubpassDependency {
                src_subpass: SUBPASS_EXTERNAL,
                dst_subpass: 0,
                src_stage: PipelineStage::COLOR_ATTACHMENT_OUTPUT | PipelineStage::LATE_FRAGMENT_TESTS,
                dst_stage: PipelineStage::COLOR_ATTACHMENT_OUTPUT | PipelineStage::EARLY_FRAGMENT_TESTS,
                src_access: Access::COLOR_ATTACHMENT_WRITE | Access::DEPTH_STENCIL_ATTACHMENT_WRITE,
                dst_access: Access::COLOR_ATTACHMENT_READ
                    | Access::COLOR_ATTACHMENT_WRITE
                    | Access::DEPTH_STENCIL_ATTACHMENT_READ,
                by_region: false,
            },
            SubpassDependency {
                src_subpass: 0,
                dst_subpass: 1,
                src_stage: PipelineStage::COLOR_ATTACHMENT_OUTPUT,
                dst_stage: PipelineStage::FRAGMENT_SHADER,
                src_access: Access::COLOR_ATTACHMENT_WRITE,
                dst_access: Access::INPUT_ATTACHMENT_READ,
                by_region: true,
            },
            SubpassDependency {
                src_subpass: 1,
                dst_subpass: SUBPASS_EXTERNAL,
                src_stage: PipelineStage::COLOR_ATTACHMENT_OUTPUT,
                dst_stage: PipelineStage::TRANSFER,
                src_access: Access::COLOR_ATTACHMENT_WRITE,
                dst_access: Access::TRANSFER_READ,
                by_region: false,
            },
        ],
    }
}

#[derive(Debug)]
pub struct RenderPasses {
    pub main: RenderPassHandle,
    pub weighted: RenderPassHandle,
    pub samples: u32,
}

impl RenderPasses {
    pub fn create(device: &mut dyn GpuDevice, samples: u32) -> Result<Self, GpuError> {
        let main = device.create_render_pass(&main_pass_desc(samples))?;
        let weighted = device.create_render_pass(&weighted_pass_desc(samples))?;
        Ok(Self {
            main,
            weighted,
            samples,
        })
    }

    pub fn destroy(self, device: &mut dyn GpuDevice) -> Result<(), GpuError> {
        device.destroy_render_pass(self.weighted)?;
        device.destroy_render_pass(self.main)
    }
}
