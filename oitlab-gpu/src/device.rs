use crate::GpuError;
use crate::command::CommandList;
use crate::handles::*;
use crate::types::*;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// 64-bit integer atomics on storage buffers.
    pub shader_buffer_int64_atomics: bool,
    /// Pixel/sample ordered fragment shader interlock.
    pub fragment_shader_interlock: bool,
    pub sample_rate_shading: bool,
    pub max_color_samples: u32,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            shader_buffer_int64_atomics: true,
            fragment_shader_interlock: true,
            sample_rate_shading: true,
            max_color_samples: 8,
        }
    }
}

#[derive(Debug, Default)]
pub struct SubmitInfo {
    pub commands: CommandList,
    pub wait_semaphores: Vec<SemaphoreHandle>,
    pub signal_semaphores: Vec<SemaphoreHandle>,
    pub fence: Option<FenceHandle>,
}

impl SubmitInfo {
    pub fn new(commands: CommandList) -> Self {
        Self {
            commands,
            ..Default::default()
        }
    }

    pub fn with_fence(mut self, fence: FenceHandle) -> Self {
        self.fence = Some(fence);
        self
    }
}

/// The primitive operations the renderer core depends on. Creation failures are reported as
/// [`GpuError`] and are not expected to be recoverable by the caller.
pub trait GpuDevice {
    fn capabilities(&self) -> &DeviceCapabilities;

    fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageHandle, GpuError>;
    fn destroy_image(&mut self, image: ImageHandle) -> Result<(), GpuError>;
    fn create_image_view(&mut self, image: ImageHandle, label: &str) -> Result<ImageViewHandle, GpuError>;
    fn destroy_image_view(&mut self, view: ImageViewHandle) -> Result<(), GpuError>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, GpuError>;
    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<(), GpuError>;
    fn create_buffer_view(&mut self, buffer: BufferHandle, format: Format) -> Result<BufferViewHandle, GpuError>;
    fn destroy_buffer_view(&mut self, view: BufferViewHandle) -> Result<(), GpuError>;
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<(), GpuError>;

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<RenderPassHandle, GpuError>;
    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle) -> Result<(), GpuError>;
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferHandle, GpuError>;
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) -> Result<(), GpuError>;

    fn create_descriptor_set_layout(
        &mut self,
        desc: &DescriptorSetLayoutDesc,
    ) -> Result<DescriptorSetLayoutHandle, GpuError>;
    fn destroy_descriptor_set_layout(&mut self, layout: DescriptorSetLayoutHandle) -> Result<(), GpuError>;
    fn create_descriptor_pool(
        &mut self,
        layout: DescriptorSetLayoutHandle,
        max_sets: u32,
    ) -> Result<DescriptorPoolHandle, GpuError>;
    /// Destroying a pool implicitly frees every set allocated from it.
    fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle) -> Result<(), GpuError>;
    fn allocate_descriptor_sets(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
        count: u32,
    ) -> Result<Vec<DescriptorSetHandle>, GpuError>;
    fn update_descriptor_sets(&mut self, writes: &[DescriptorWrite]) -> Result<(), GpuError>;

    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle, GpuError>;
    fn destroy_pipeline_layout(&mut self, layout: PipelineLayoutHandle) -> Result<(), GpuError>;
    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle, GpuError>;
    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) -> Result<(), GpuError>;

    fn create_shader_module(&mut self, desc: &ShaderModuleDesc) -> Result<ShaderModuleHandle, GpuError>;
    fn destroy_shader_module(&mut self, module: ShaderModuleHandle) -> Result<(), GpuError>;

    fn create_fence(&mut self, signaled: bool) -> Result<FenceHandle, GpuError>;
    fn destroy_fence(&mut self, fence: FenceHandle) -> Result<(), GpuError>;
    fn create_semaphore(&mut self) -> Result<SemaphoreHandle, GpuError>;
    fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle) -> Result<(), GpuError>;

    fn submit(&mut self, submit: SubmitInfo) -> Result<(), GpuError>;
    /// Returns `false` if the fence did not signal within `timeout`.
    fn wait_for_fence(&mut self, fence: FenceHandle, timeout: Duration) -> Result<bool, GpuError>;
    fn reset_fence(&mut self, fence: FenceHandle) -> Result<(), GpuError>;
    fn wait_idle(&mut self) -> Result<(), GpuError>;
}
