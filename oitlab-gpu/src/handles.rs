use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Image,
    ImageView,
    Buffer,
    BufferView,
    RenderPass,
    Framebuffer,
    DescriptorSetLayout,
    DescriptorPool,
    DescriptorSet,
    PipelineLayout,
    Pipeline,
    ShaderModule,
    Fence,
    Semaphore,
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ObjectKind::Image => "image",
            ObjectKind::ImageView => "image view",
            ObjectKind::Buffer => "buffer",
            ObjectKind::BufferView => "buffer view",
            ObjectKind::RenderPass => "render pass",
            ObjectKind::Framebuffer => "framebuffer",
            ObjectKind::DescriptorSetLayout => "descriptor set layout",
            ObjectKind::DescriptorPool => "descriptor pool",
            ObjectKind::DescriptorSet => "descriptor set",
            ObjectKind::PipelineLayout => "pipeline layout",
            ObjectKind::Pipeline => "pipeline",
            ObjectKind::ShaderModule => "shader module",
            ObjectKind::Fence => "fence",
            ObjectKind::Semaphore => "semaphore",
        };
        f.write_str(name)
    }
}

/// Common view on all typed handles, mostly used by device implementations for bookkeeping.
pub trait Handle: Copy {
    const KIND: ObjectKind;

    fn raw(self) -> u64;
    fn from_raw(raw: u64) -> Self;

    fn erased(self) -> AnyHandle {
        AnyHandle {
            kind: Self::KIND,
            raw: self.raw(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnyHandle {
    pub kind: ObjectKind,
    pub raw: u64,
}

macro_rules! define_handles {
    ($($name:ident => $kind:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u64);

            impl Handle for $name {
                const KIND: ObjectKind = ObjectKind::$kind;

                fn raw(self) -> u64 {
                    self.0
                }

                fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }
            }
        )*
    };
}

define_handles! {
    ImageHandle => Image,
    ImageViewHandle => ImageView,
    BufferHandle => Buffer,
    BufferViewHandle => BufferView,
    RenderPassHandle => RenderPass,
    FramebufferHandle => Framebuffer,
    DescriptorSetLayoutHandle => DescriptorSetLayout,
    DescriptorPoolHandle => DescriptorPool,
    DescriptorSetHandle => DescriptorSet,
    PipelineLayoutHandle => PipelineLayout,
    PipelineHandle => Pipeline,
    ShaderModuleHandle => ShaderModule,
    FenceHandle => Fence,
    SemaphoreHandle => Semaphore,
}
