use crate::GpuError;
use crate::command::{Command, CommandList};
use crate::device::GpuDevice;
use crate::handles::{ImageHandle, ImageViewHandle};
use crate::types::{Access, ImageDesc, ImageLayout, PipelineStage};

/// An image with its default view, remembering the layout the last recorded barrier left it in.
#[derive(Debug)]
pub struct ImageAndView {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
    desc: ImageDesc,
    layout: ImageLayout,
}

impl ImageAndView {
    pub fn create(device: &mut dyn GpuDevice, desc: ImageDesc) -> Result<Self, GpuError> {
        let image = device.create_image(&desc)?;
        let view = match device.create_image_view(image, &desc.label) {
            Ok(view) => view,
            Err(e) => {
                // don't leak the image if only the view failed.
                device.destroy_image(image)?;
                return Err(e);
            }
        };

        Ok(Self {
            image,
            view,
            desc,
            layout: ImageLayout::Undefined,
        })
    }

    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    /// Records a layout transition if the image isn't already in `layout`. Returns whether a
    /// barrier has been recorded.
    pub fn transition_to(&mut self, cmd: &mut CommandList, layout: ImageLayout) -> bool {
        if self.layout == layout {
            return false;
        }

        let (src_stage, src_access) = layout_usage(self.layout);
        let (dst_stage, dst_access) = layout_usage(layout);
        cmd.push(Command::ImageBarrier {
            image: self.image,
            old_layout: self.layout,
            new_layout: layout,
            src_stage,
            dst_stage,
            src_access,
            dst_access,
        });
        self.layout = layout;
        true
    }

    /// Render passes transition their attachments on their own, this keeps the tracked
    /// state in sync with the final layout of such a pass.
    pub fn assume_layout(&mut self, layout: ImageLayout) {
        self.layout = layout;
    }

    pub fn destroy(self, device: &mut dyn GpuDevice) -> Result<(), GpuError> {
        device.destroy_image_view(self.view)?;
        device.destroy_image(self.image)
    }
}

fn layout_usage(layout: ImageLayout) -> (PipelineStage, Access) {
    match layout {
        ImageLayout::Undefined => (PipelineStage::TOP_OF_PIPE, Access::empty()),
        ImageLayout::General => (
            PipelineStage::TRANSFER | PipelineStage::FRAGMENT_SHADER,
            Access::TRANSFER_WRITE | Access::SHADER_READ | Access::SHADER_WRITE,
        ),
        ImageLayout::ColorAttachment => (
            PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            Access::COLOR_ATTACHMENT_READ | Access::COLOR_ATTACHMENT_WRITE,
        ),
        ImageLayout::DepthStencilAttachment => (
            PipelineStage::EARLY_FRAGMENT_TESTS | PipelineStage::LATE_FRAGMENT_TESTS,
            Access::DEPTH_STENCIL_ATTACHMENT_READ | Access::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        ImageLayout::ShaderReadOnly => (PipelineStage::FRAGMENT_SHADER, Access::SHADER_READ),
        ImageLayout::TransferSrc => (PipelineStage::TRANSFER, Access::TRANSFER_READ),
        ImageLayout::TransferDst => (PipelineStage::TRANSFER, Access::TRANSFER_WRITE),
        ImageLayout::PresentSrc => (PipelineStage::BOTTOM_OF_PIPE, Access::empty()),
    }
}
