//! Everything that differs between the OIT algorithms, in one table.
//!
//! Resource creation, descriptor binding, shader selection and command recording all read the
//! [`AlgorithmProfile`] of the active [`Algorithm`] instead of switching over it themselves.

use crate::rendering::state::{Algorithm, State};
use oitlab_gpu::DeviceCapabilities;
use oitlab_gpu::types::{BufferUsage, Extent2D, Format};

/// Auxiliary images, named after what they hold per pixel (or per sample).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuxImage {
    /// Coverage/fragment count, or the lock-free insertion head.
    Aux,
    /// Spinlock state.
    AuxSpin,
    /// Furthest stored depth.
    AuxDepth,
    /// 1x1 atomic bump allocator of the linked list pool.
    Counter,
}

impl AuxImage {
    pub fn label(self) -> &'static str {
        match self {
            AuxImage::Aux => "aux",
            AuxImage::AuxSpin => "auxSpin",
            AuxImage::AuxDepth => "auxDepth",
            AuxImage::Counter => "counter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ABufferBinding {
    StorageBuffer,
    TexelBuffer,
}

/// How many A-buffer elements a pixel gets and how they are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ABufferLayout {
    /// OIT_LAYERS (depth, color) pairs, plus the coverage mask with coverage shading.
    Layers,
    /// A shared pool, sized by the allocation factor.
    Pool,
    /// OIT_LAYERS depths followed by OIT_LAYERS colors.
    SplitDepthColor,
    /// OIT_LAYERS packed 64-bit (depth, color) values.
    Packed64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ABufferPlan {
    pub size: u64,
    pub usage: BufferUsage,
    /// Texel format of the view, `None` when bound as a storage buffer.
    pub view_format: Option<Format>,
    pub elements_per_pixel: u64,
    pub stride: u64,
    /// What the shaders read as `linkedListAllocatedPerElement`: the layer count of a pixel's
    /// storage, or the element count of the whole pool for the linked list.
    pub shader_elements: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassKind {
    Depth,
    Color,
    Composite,
}

impl PassKind {
    /// Value of the `PASS` define.
    pub fn define(self) -> u32 {
        match self {
            PassKind::Depth => 0,
            PassKind::Color => 1,
            PassKind::Composite => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PassKind::Depth => "depth",
            PassKind::Color => "color",
            PassKind::Composite => "composite",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOp {
    Image { image: AuxImage, value: u32 },
    /// Only the depth half of every per-sample slice of a split A-buffer.
    ABufferDepths { value: u32 },
    ABuffer { value: u32 },
}

/// The transparency part of a frame, recorded after the opaque draws inside the main pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStep {
    Draw(PassKind),
    /// Fragment shader storage writes of the previous draw become visible to the next.
    FragmentBarrier,
    /// Ends the main pass and begins the weighted pass.
    BeginWeightedPass,
    NextSubpass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFeature {
    Int64Atomics,
    FragmentShaderInterlock,
}

impl DeviceFeature {
    pub fn is_available(self, capabilities: &DeviceCapabilities) -> bool {
        match self {
            DeviceFeature::Int64Atomics => capabilities.shader_buffer_int64_atomics,
            DeviceFeature::FragmentShaderInterlock => capabilities.fragment_shader_interlock,
        }
    }
}

#[derive(Debug)]
pub struct AlgorithmProfile {
    pub algorithm: Algorithm,
    pub description: &'static str,
    pub shader_file: &'static str,
    pub aux_images: &'static [AuxImage],
    pub abuffer: Option<ABufferLayout>,
    pub abuffer_binding: ABufferBinding,
    /// The two float targets and the weighted render pass.
    pub weighted_targets: bool,
    pub clears: &'static [ClearOp],
    pub steps: &'static [PassStep],
    pub requires: Option<DeviceFeature>,
}

const CLEAR_DEPTH: u32 = 0xFFFF_FFFF;

const COLOR_THEN_COMPOSITE: &[PassStep] = &[
    PassStep::Draw(PassKind::Color),
    PassStep::FragmentBarrier,
    PassStep::Draw(PassKind::Composite),
];

static PROFILES: [AlgorithmProfile; 7] = [
    AlgorithmProfile {
        algorithm: Algorithm::Simple,
        description: "Stores up to OIT_LAYERS fragments per pixel and sorts them in the composite pass. \
                      Overflowing fragments are tail blended.",
        shader_file: "oitSimple.frag.glsl",
        aux_images: &[AuxImage::Aux],
        abuffer: Some(ABufferLayout::Layers),
        abuffer_binding: ABufferBinding::TexelBuffer,
        weighted_targets: false,
        clears: &[ClearOp::Image {
            image: AuxImage::Aux,
            value: 0,
        }],
        steps: COLOR_THEN_COMPOSITE,
        requires: None,
    },
    AlgorithmProfile {
        algorithm: Algorithm::LinkedList,
        description: "Appends every fragment to a per-pixel linked list in a shared pool, allocated \
                      through an atomic counter. Sorts the first OIT_LAYERS in the composite pass.",
        shader_file: "oitLinkedList.frag.glsl",
        aux_images: &[AuxImage::Aux, AuxImage::Counter],
        abuffer: Some(ABufferLayout::Pool),
        abuffer_binding: ABufferBinding::TexelBuffer,
        weighted_targets: false,
        clears: &[
            ClearOp::Image {
                image: AuxImage::Aux,
                value: 0,
            },
            ClearOp::Image {
                image: AuxImage::Counter,
                value: 0,
            },
        ],
        steps: COLOR_THEN_COMPOSITE,
        requires: None,
    },
    AlgorithmProfile {
        algorithm: Algorithm::Loop,
        description: "Finds the OIT_LAYERS nearest depths with 32-bit atomics in a depth pass, stores \
                      the matching colors in a second pass and blends them in the composite pass.",
        shader_file: "oitLoop.frag.glsl",
        aux_images: &[AuxImage::Aux],
        abuffer: Some(ABufferLayout::SplitDepthColor),
        abuffer_binding: ABufferBinding::TexelBuffer,
        weighted_targets: false,
        clears: &[ClearOp::ABufferDepths { value: CLEAR_DEPTH }],
        steps: &[
            PassStep::Draw(PassKind::Depth),
            PassStep::FragmentBarrier,
            PassStep::Draw(PassKind::Color),
            PassStep::FragmentBarrier,
            PassStep::Draw(PassKind::Composite),
        ],
        requires: None,
    },
    AlgorithmProfile {
        algorithm: Algorithm::Loop64,
        description: "Keeps the OIT_LAYERS nearest fragments as packed 64-bit (depth, color) values, \
                      inserted with 64-bit atomic min/max in a single pass.",
        shader_file: "oitLoop64.frag.glsl",
        aux_images: &[AuxImage::Aux],
        abuffer: Some(ABufferLayout::Packed64),
        abuffer_binding: ABufferBinding::StorageBuffer,
        weighted_targets: false,
        clears: &[ClearOp::ABuffer { value: CLEAR_DEPTH }],
        steps: COLOR_THEN_COMPOSITE,
        requires: Some(DeviceFeature::Int64Atomics),
    },
    AlgorithmProfile {
        algorithm: Algorithm::Spinlock,
        description: "Insertion-sorts fragments into OIT_LAYERS slots inside a per-pixel critical \
                      section guarded by a spinlock.",
        shader_file: "oitSpinlock.frag.glsl",
        aux_images: &[AuxImage::Aux, AuxImage::AuxSpin, AuxImage::AuxDepth],
        abuffer: Some(ABufferLayout::Layers),
        abuffer_binding: ABufferBinding::TexelBuffer,
        weighted_targets: false,
        clears: &[
            ClearOp::Image {
                image: AuxImage::AuxDepth,
                value: CLEAR_DEPTH,
            },
            ClearOp::Image {
                image: AuxImage::Aux,
                value: 0,
            },
            ClearOp::Image {
                image: AuxImage::AuxSpin,
                value: 0,
            },
        ],
        steps: COLOR_THEN_COMPOSITE,
        requires: None,
    },
    AlgorithmProfile {
        algorithm: Algorithm::Interlock,
        description: "Same insertion sort as the spinlock variant, but the critical section is a \
                      hardware fragment shader interlock, optionally in primitive order.",
        shader_file: "oitInterlock.frag.glsl",
        aux_images: &[AuxImage::Aux, AuxImage::AuxDepth],
        abuffer: Some(ABufferLayout::Layers),
        abuffer_binding: ABufferBinding::TexelBuffer,
        weighted_targets: false,
        clears: &[
            ClearOp::Image {
                image: AuxImage::AuxDepth,
                value: CLEAR_DEPTH,
            },
            ClearOp::Image {
                image: AuxImage::Aux,
                value: 0,
            },
        ],
        steps: COLOR_THEN_COMPOSITE,
        requires: Some(DeviceFeature::FragmentShaderInterlock),
    },
    AlgorithmProfile {
        algorithm: Algorithm::Weighted,
        description: "Weighted blended OIT: accumulates weighted colors and a reveal product in two \
                      float targets and resolves them in a second subpass. Approximate, but needs no \
                      per-pixel storage.",
        shader_file: "oitWeighted.frag.glsl",
        aux_images: &[],
        abuffer: None,
        abuffer_binding: ABufferBinding::TexelBuffer,
        weighted_targets: true,
        clears: &[],
        steps: &[
            PassStep::BeginWeightedPass,
            PassStep::Draw(PassKind::Color),
            PassStep::NextSubpass,
            PassStep::Draw(PassKind::Composite),
        ],
        requires: None,
    },
];

impl Algorithm {
    pub fn profile(self) -> &'static AlgorithmProfile {
        &PROFILES[self as usize]
    }

    pub fn is_supported(self, capabilities: &DeviceCapabilities) -> bool {
        self.profile()
            .requires
            .is_none_or(|feature| feature.is_available(capabilities))
    }
}

/// The algorithms that may be offered for selection on a device.
pub fn supported_algorithms(capabilities: &DeviceCapabilities) -> Vec<Algorithm> {
    Algorithm::ALL
        .into_iter()
        .filter(|algorithm| algorithm.is_supported(capabilities))
        .collect()
}

impl AlgorithmProfile {
    /// Passes that need a pipeline, in recording order.
    pub fn passes(&self) -> impl Iterator<Item = PassKind> + '_ {
        self.steps.iter().filter_map(|step| match step {
            PassStep::Draw(pass) => Some(*pass),
            _ => None,
        })
    }

    pub fn has_aux_image(&self, image: AuxImage) -> bool {
        self.aux_images.contains(&image)
    }

    /// Size and format of the A-buffer for `state` at the buffer extent (surface times
    /// supersample factor).
    pub fn abuffer_plan(&self, state: &State, extent: Extent2D) -> Option<ABufferPlan> {
        let layout = self.abuffer?;
        let layers = state.oit_layers as u64;

        let (elements, stride, format) = match layout {
            ABufferLayout::Layers if state.coverage_shading() => (layers, 16, Format::R32G32B32A32Uint),
            ABufferLayout::Layers => (layers, 8, Format::R32G32Uint),
            ABufferLayout::Pool => (
                state.linked_list_allocated_per_element as u64,
                16,
                Format::R32G32B32A32Uint,
            ),
            ABufferLayout::SplitDepthColor => (layers * 2, 4, Format::R32Uint),
            ABufferLayout::Packed64 => (layers, 8, Format::R32G32Uint),
        };
        let samples = state.storage_samples() as u64;
        let elements_per_pixel = elements * samples;
        let shader_elements = match layout {
            ABufferLayout::Pool => elements_per_pixel * extent.area(),
            _ => layers * samples,
        };

        let (usage, view_format) = match self.abuffer_binding {
            ABufferBinding::StorageBuffer => (BufferUsage::STORAGE_BUFFER, None),
            ABufferBinding::TexelBuffer => (BufferUsage::STORAGE_TEXEL_BUFFER, Some(format)),
        };

        Some(ABufferPlan {
            size: extent.area() * elements_per_pixel * stride,
            usage: usage | BufferUsage::TRANSFER_DST,
            view_format,
            elements_per_pixel,
            stride,
            shader_elements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::state::AntialiasingMode;

    #[test]
    pub fn profiles_are_indexed_by_algorithm() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.profile().algorithm, algorithm);
        }
    }

    #[test]
    pub fn every_sequence_ends_in_a_composite() {
        for algorithm in Algorithm::ALL {
            let passes = algorithm.profile().passes().collect::<Vec<_>>();
            assert_eq!(passes.last(), Some(&PassKind::Composite), "{algorithm}");
            assert_eq!(
                passes.contains(&PassKind::Depth),
                algorithm == Algorithm::Loop,
                "{algorithm}"
            );
        }
    }

    #[test]
    pub fn clears_only_touch_owned_images() {
        for algorithm in Algorithm::ALL {
            let profile = algorithm.profile();
            for clear in profile.clears {
                match clear {
                    ClearOp::Image { image, .. } => assert!(profile.has_aux_image(*image), "{algorithm}"),
                    ClearOp::ABuffer { .. } | ClearOp::ABufferDepths { .. } => {
                        assert!(profile.abuffer.is_some(), "{algorithm}")
                    }
                }
            }
        }
    }

    #[test]
    pub fn abuffer_sizes() {
        let extent = Extent2D::new(10, 10);
        let mut state = State::default();
        state.oit_layers = 4;

        let simple = Algorithm::Simple.profile().abuffer_plan(&state, extent).unwrap();
        assert_eq!((simple.size, simple.view_format), (100 * 4 * 8, Some(Format::R32G32Uint)));

        state.aa_type = AntialiasingMode::Msaa4x;
        state.recompute_antialiasing_settings();
        let coverage = Algorithm::Simple.profile().abuffer_plan(&state, extent).unwrap();
        assert_eq!((coverage.size, coverage.stride), (100 * 4 * 16, 16));

        state.aa_type = AntialiasingMode::Ssaa4x;
        state.recompute_antialiasing_settings();
        let per_sample = Algorithm::Loop.profile().abuffer_plan(&state, extent).unwrap();
        assert_eq!(per_sample.size, 100 * (4 * 2) * 4 * 4);

        let loop64 = Algorithm::Loop64.profile().abuffer_plan(&state, extent).unwrap();
        assert!(loop64.usage.contains(BufferUsage::STORAGE_BUFFER));
        assert_eq!(loop64.view_format, None);

        state.linked_list_allocated_per_element = 3;
        let pool = Algorithm::LinkedList.profile().abuffer_plan(&state, extent).unwrap();
        assert_eq!(pool.elements_per_pixel, 3 * 4);

        assert_eq!(Algorithm::Weighted.profile().abuffer_plan(&state, extent), None);
    }

    #[test]
    pub fn shaders_see_layers_or_the_whole_pool() {
        let extent = Extent2D::new(100, 100);
        let mut state = State::default();
        state.oit_layers = 8;

        for aa_type in [AntialiasingMode::None, AntialiasingMode::Msaa4x, AntialiasingMode::Ssaa4x] {
            state.aa_type = aa_type;
            state.recompute_antialiasing_settings();
            let samples = state.storage_samples() as u64;

            for algorithm in [
                Algorithm::Simple,
                Algorithm::Loop,
                Algorithm::Loop64,
                Algorithm::Spinlock,
                Algorithm::Interlock,
            ] {
                let plan = algorithm.profile().abuffer_plan(&state, extent).unwrap();
                assert_eq!(plan.shader_elements, 8 * samples, "{algorithm} {aa_type}");
            }

            let pool = Algorithm::LinkedList.profile().abuffer_plan(&state, extent).unwrap();
            assert_eq!(pool.shader_elements, pool.size / pool.stride, "{aa_type}");
            assert_eq!(pool.shader_elements, 10 * 10_000 * samples);
        }
    }

    #[test]
    pub fn unsupported_features_are_filtered() {
        let capabilities = DeviceCapabilities {
            shader_buffer_int64_atomics: false,
            fragment_shader_interlock: false,
            ..DeviceCapabilities::default()
        };
        let supported = supported_algorithms(&capabilities);
        assert!(!supported.contains(&Algorithm::Loop64));
        assert!(!supported.contains(&Algorithm::Interlock));
        assert_eq!(supported.len(), 5);
        assert_eq!(supported_algorithms(&DeviceCapabilities::default()).len(), 7);
    }
}
