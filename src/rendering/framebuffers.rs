use crate::rendering::frame_images::FrameImages;
use crate::rendering::render_passes::RenderPasses;
use oitlab_gpu::types::FramebufferDesc;
use oitlab_gpu::{FramebufferHandle, GpuDevice, GpuError};

#[derive(Debug)]
pub struct Framebuffers {
    pub main: FramebufferHandle,
    /// Only while the weighted targets exist.
    pub weighted: Option<FramebufferHandle>,
}

impl Framebuffers {
    pub fn create(device: &mut dyn GpuDevice, passes: &RenderPasses, images: &FrameImages) -> Result<Self, GpuError> {
        let main = device.create_framebuffer(&FramebufferDesc {
            label: "mainColorDepthFramebuffer".into(),
            render_pass: passes.main,
            attachments: vec![images.color.view, images.depth.view],
            extent: images.buffer_extent,
        })?;

        let weighted = match (&images.weighted_color, &images.weighted_reveal) {
            (Some(accumulation), Some(reveal)) => Some(device.create_framebuffer(&FramebufferDesc {
                label: "weightedFramebuffer".into(),
                render_pass: passes.weighted,
                attachments: vec![accumulation.view, reveal.view, images.color.view, images.depth.view],
                extent: images.buffer_extent,
            })?),
            _ => None,
        };

        Ok(Self { main, weighted })
    }

    pub fn destroy(self, device: &mut dyn GpuDevice) -> Result<(), GpuError> {
        if let Some(weighted) = self.weighted {
            device.destroy_framebuffer(weighted)?;
        }
        device.destroy_framebuffer(self.main)
    }
}
