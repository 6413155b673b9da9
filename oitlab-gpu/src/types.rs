use crate::handles::*;
use crate::shader::ShaderStage;
use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    B8G8R8A8Srgb,
    B8G8R8A8Unorm,
    D32Sfloat,
    D24UnormS8Uint,
    R32Uint,
    R32G32Uint,
    R32G32B32A32Uint,
    R16G16B16A16Sfloat,
    R16Sfloat,
}

impl Format {
    pub fn bytes_per_texel(self) -> u64 {
        match self {
            Format::R16Sfloat => 2,
            Format::B8G8R8A8Srgb
            | Format::B8G8R8A8Unorm
            | Format::D32Sfloat
            | Format::D24UnormS8Uint
            | Format::R32Uint => 4,
            Format::R32G32Uint | Format::R16G16B16A16Sfloat => 8,
            Format::R32G32B32A32Uint => 16,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Format::D32Sfloat | Format::D24UnormS8Uint)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn scaled(self, factor: u32) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }

    pub fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
        const INPUT_ATTACHMENT = 1 << 7;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM_TEXEL_BUFFER = 1 << 2;
        const STORAGE_TEXEL_BUFFER = 1 << 3;
        const UNIFORM_BUFFER = 1 << 4;
        const STORAGE_BUFFER = 1 << 5;
        const INDEX_BUFFER = 1 << 6;
        const VERTEX_BUFFER = 1 << 7;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStage: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const VERTEX_SHADER = 1 << 3;
        const FRAGMENT_SHADER = 1 << 7;
        const EARLY_FRAGMENT_TESTS = 1 << 8;
        const LATE_FRAGMENT_TESTS = 1 << 9;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 10;
        const TRANSFER = 1 << 12;
        const BOTTOM_OF_PIPE = 1 << 13;
        const ALL_COMMANDS = 1 << 16;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        const INPUT_ATTACHMENT_READ = 1 << 4;
        const SHADER_READ = 1 << 5;
        const SHADER_WRITE = 1 << 6;
        const COLOR_ATTACHMENT_READ = 1 << 7;
        const COLOR_ATTACHMENT_WRITE = 1 << 8;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 9;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 10;
        const TRANSFER_READ = 1 << 11;
        const TRANSFER_WRITE = 1 << 12;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageDesc {
    pub label: String,
    pub format: Format,
    pub extent: Extent2D,
    pub samples: u32,
    pub layers: u32,
    pub usage: ImageUsage,
}

impl ImageDesc {
    pub fn size_in_bytes(&self) -> u64 {
        self.extent.area() * self.format.bytes_per_texel() * self.samples as u64 * self.layers as u64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentDesc {
    pub format: Format,
    pub samples: u32,
    pub load: LoadOp,
    pub store: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubpassDesc {
    pub color: Vec<u32>,
    pub input: Vec<u32>,
    pub depth: Option<u32>,
}

pub const SUBPASS_EXTERNAL: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq)]
pub struct SubpassDependency {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stage: PipelineStage,
    pub dst_stage: PipelineStage,
    pub src_access: Access,
    pub dst_access: Access,
    pub by_region: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDesc {
    pub label: String,
    pub attachments: Vec<AttachmentDesc>,
    pub subpasses: Vec<SubpassDesc>,
    pub dependencies: Vec<SubpassDependency>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferDesc {
    pub label: String,
    pub render_pass: RenderPassHandle,
    pub attachments: Vec<ImageViewHandle>,
    pub extent: Extent2D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    StorageTexelBuffer,
    StorageImage,
    InputAttachment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub ty: DescriptorType,
    pub stages: ShaderStages,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorSetLayoutDesc {
    pub label: String,
    pub bindings: Vec<DescriptorBinding>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DescriptorResource {
    Buffer { buffer: BufferHandle, offset: u64, range: u64 },
    TexelBuffer(BufferViewHandle),
    Image { view: ImageViewHandle, layout: ImageLayout },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorWrite {
    pub set: DescriptorSetHandle,
    pub binding: u32,
    pub resource: DescriptorResource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineLayoutDesc {
    pub label: String,
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    OneMinusSrcColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendAttachment {
    pub enabled: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl BlendAttachment {
    pub const DISABLED: BlendAttachment = BlendAttachment {
        enabled: false,
        src_color: BlendFactor::One,
        dst_color: BlendFactor::Zero,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::Zero,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    LessOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x3,
    Float32x4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineDesc {
    pub label: String,
    pub layout: PipelineLayoutHandle,
    pub render_pass: RenderPassHandle,
    pub subpass: u32,
    pub vertex: ShaderModuleHandle,
    pub fragment: ShaderModuleHandle,
    /// `None` for pipelines that generate their vertices in the shader (full screen triangle).
    pub vertex_layout: Option<VertexLayout>,
    pub cull_mode: CullMode,
    pub front_face_ccw: bool,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareOp,
    pub samples: u32,
    pub sample_shading: bool,
    pub blend: Vec<BlendAttachment>,
    pub viewport: Extent2D,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderModuleDesc {
    pub label: String,
    pub stage: ShaderStage,
    pub code: Vec<u8>,
}
