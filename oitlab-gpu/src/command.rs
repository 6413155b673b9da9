use crate::handles::*;
use crate::types::{Access, Extent2D, ImageLayout, PipelineStage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ImageBarrier {
        image: ImageHandle,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
        src_access: Access,
        dst_access: Access,
    },
    MemoryBarrier {
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
        src_access: Access,
        dst_access: Access,
    },
    ClearColorImage {
        image: ImageHandle,
        value: [u32; 4],
    },
    FillBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
        value: u32,
    },
    BeginRenderPass {
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent2D,
        clear_values: Vec<ClearValue>,
    },
    NextSubpass,
    EndRenderPass,
    BindPipeline(PipelineHandle),
    BindDescriptorSet {
        layout: PipelineLayoutHandle,
        set: DescriptorSetHandle,
    },
    BindVertexBuffer {
        buffer: BufferHandle,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: BufferHandle,
        offset: u64,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    ResolveImage {
        src: ImageHandle,
        dst: ImageHandle,
        extent: Extent2D,
    },
    BlitImage {
        src: ImageHandle,
        dst: ImageHandle,
        src_extent: Extent2D,
        dst_extent: Extent2D,
    },
}

impl Command {
    /// Objects the command touches directly. Indirect references (framebuffer attachments,
    /// descriptor set contents) are resolved by the device.
    pub fn referenced(&self) -> Vec<AnyHandle> {
        match self {
            Command::ImageBarrier { image, .. } | Command::ClearColorImage { image, .. } => vec![image.erased()],
            Command::FillBuffer { buffer, .. }
            | Command::BindVertexBuffer { buffer, .. }
            | Command::BindIndexBuffer { buffer, .. } => vec![buffer.erased()],
            Command::BeginRenderPass {
                render_pass,
                framebuffer,
                ..
            } => vec![render_pass.erased(), framebuffer.erased()],
            Command::BindPipeline(pipeline) => vec![pipeline.erased()],
            Command::BindDescriptorSet { layout, set } => vec![layout.erased(), set.erased()],
            Command::ResolveImage { src, dst, .. } | Command::BlitImage { src, dst, .. } => {
                vec![src.erased(), dst.erased()]
            }
            Command::MemoryBarrier { .. }
            | Command::NextSubpass
            | Command::EndRenderPass
            | Command::Draw { .. }
            | Command::DrawIndexed { .. } => vec![],
        }
    }
}

/// A linear sequence of recorded GPU commands, the equivalent of a primary command buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    label: String,
    commands: Vec<Command>,
}

impl CommandList {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: vec![],
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn memory_barrier(&mut self, src_stage: PipelineStage, dst_stage: PipelineStage, src_access: Access, dst_access: Access) {
        self.push(Command::MemoryBarrier {
            src_stage,
            dst_stage,
            src_access,
            dst_access,
        });
    }

    /// Makes transfer writes (clears, fills) visible to fragment shader reads and writes.
    pub fn transfer_to_fragment_barrier(&mut self) {
        self.memory_barrier(
            PipelineStage::TRANSFER,
            PipelineStage::FRAGMENT_SHADER,
            Access::TRANSFER_WRITE,
            Access::SHADER_READ | Access::SHADER_WRITE,
        );
    }

    /// Orders fragment shader storage writes of one draw before reads of the next one.
    pub fn fragment_to_fragment_barrier(&mut self) {
        self.memory_barrier(
            PipelineStage::FRAGMENT_SHADER,
            PipelineStage::FRAGMENT_SHADER,
            Access::SHADER_READ | Access::SHADER_WRITE,
            Access::SHADER_READ | Access::SHADER_WRITE,
        );
    }

    pub fn clear_color_image(&mut self, image: ImageHandle, value: u32) {
        self.push(Command::ClearColorImage {
            image,
            value: [value; 4],
        });
    }

    pub fn fill_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64, value: u32) {
        self.push(Command::FillBuffer {
            buffer,
            offset,
            size,
            value,
        });
    }

    pub fn begin_render_pass(
        &mut self,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent2D,
        clear_values: Vec<ClearValue>,
    ) {
        self.push(Command::BeginRenderPass {
            render_pass,
            framebuffer,
            extent,
            clear_values,
        });
    }

    pub fn next_subpass(&mut self) {
        self.push(Command::NextSubpass);
    }

    pub fn end_render_pass(&mut self) {
        self.push(Command::EndRenderPass);
    }

    pub fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        self.push(Command::BindPipeline(pipeline));
    }

    pub fn bind_descriptor_set(&mut self, layout: PipelineLayoutHandle, set: DescriptorSetHandle) {
        self.push(Command::BindDescriptorSet { layout, set });
    }

    pub fn bind_vertex_buffer(&mut self, buffer: BufferHandle) {
        self.push(Command::BindVertexBuffer { buffer, offset: 0 });
    }

    pub fn bind_index_buffer(&mut self, buffer: BufferHandle) {
        self.push(Command::BindIndexBuffer { buffer, offset: 0 });
    }

    pub fn draw(&mut self, vertex_count: u32) {
        self.push(Command::Draw {
            vertex_count,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        });
    }

    pub fn draw_indexed(&mut self, index_count: u32, first_index: u32) {
        self.push(Command::DrawIndexed {
            index_count,
            instance_count: 1,
            first_index,
            vertex_offset: 0,
            first_instance: 0,
        });
    }

    pub fn resolve_image(&mut self, src: ImageHandle, dst: ImageHandle, extent: Extent2D) {
        self.push(Command::ResolveImage { src, dst, extent });
    }

    pub fn blit_image(&mut self, src: ImageHandle, dst: ImageHandle, src_extent: Extent2D, dst_extent: Extent2D) {
        self.push(Command::BlitImage {
            src,
            dst,
            src_extent,
            dst_extent,
        });
    }
}
