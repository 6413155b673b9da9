use crate::rendering::algorithm::{ABufferBinding, AuxImage};
use crate::rendering::frame_images::FrameImages;
use crate::rendering::state::State;
use crate::rendering::uniforms::UniformBuffers;
use itertools::Itertools;
use oitlab_gpu::types::{
    DescriptorBinding, DescriptorResource, DescriptorSetLayoutDesc, DescriptorType, DescriptorWrite, ImageLayout,
    PipelineLayoutDesc, ShaderStages,
};
use oitlab_gpu::{
    DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle, GpuDevice, GpuError, PipelineLayoutHandle,
};

/// Binding slots of the single descriptor set, shared with the shaders.
pub mod binding {
    pub const SCENE: u32 = 0;
    pub const ABUFFER: u32 = 1;
    pub const AUX: u32 = 2;
    pub const AUX_SPIN: u32 = 3;
    pub const AUX_DEPTH: u32 = 4;
    pub const COUNTER: u32 = 5;
    pub const WEIGHTED_COLOR: u32 = 7;
    pub const WEIGHTED_REVEAL: u32 = 8;
}

fn aux_binding(kind: AuxImage) -> u32 {
    match kind {
        AuxImage::Aux => binding::AUX,
        AuxImage::AuxSpin => binding::AUX_SPIN,
        AuxImage::AuxDepth => binding::AUX_DEPTH,
        AuxImage::Counter => binding::COUNTER,
    }
}

pub fn layout_bindings(abuffer_binding: ABufferBinding) -> Vec<DescriptorBinding> {
    let abuffer_type = match abuffer_binding {
        ABufferBinding::StorageBuffer => DescriptorType::StorageBuffer,
        ABufferBinding::TexelBuffer => DescriptorType::StorageTexelBuffer,
    };

    let fragment = |binding, ty| DescriptorBinding {
        binding,
        ty,
        stages: ShaderStages::FRAGMENT,
    };

    vec![
        DescriptorBinding {
            binding: binding::SCENE,
            ty: DescriptorType::UniformBuffer,
            stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
        },
        fragment(binding::ABUFFER, abuffer_type),
        fragment(binding::AUX, DescriptorType::StorageImage),
        fragment(binding::AUX_SPIN, DescriptorType::StorageImage),
        fragment(binding::AUX_DEPTH, DescriptorType::StorageImage),
        fragment(binding::COUNTER, DescriptorType::StorageImage),
        fragment(binding::WEIGHTED_COLOR, DescriptorType::InputAttachment),
        fragment(binding::WEIGHTED_REVEAL, DescriptorType::InputAttachment),
    ]
}

/// The descriptor set layout, one set per frame slot, and the pipeline layout built on top.
/// The layout only changes with the type of the A-buffer binding.
#[derive(Debug)]
pub struct DescriptorSets {
    pub set_layout: DescriptorSetLayoutHandle,
    pub pipeline_layout: PipelineLayoutHandle,
    pool: DescriptorPoolHandle,
    sets: Vec<DescriptorSetHandle>,
    abuffer_binding: ABufferBinding,
}

impl DescriptorSets {
    pub fn create(device: &mut dyn GpuDevice, state: &State, frame_slots: u32) -> Result<Self, GpuError> {
        let abuffer_binding = state.algorithm.profile().abuffer_binding;
        let set_layout = device.create_descriptor_set_layout(&DescriptorSetLayoutDesc {
            label: "sceneDescriptorSetLayout".into(),
            bindings: layout_bindings(abuffer_binding),
        })?;
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDesc {
            label: "pipelineLayout".into(),
            set_layouts: vec![set_layout],
        })?;
        let pool = device.create_descriptor_pool(set_layout, frame_slots)?;
        let sets = device.allocate_descriptor_sets(pool, set_layout, frame_slots)?;

        Ok(Self {
            set_layout,
            pipeline_layout,
            pool,
            sets,
            abuffer_binding,
        })
    }

    pub fn abuffer_binding(&self) -> ABufferBinding {
        self.abuffer_binding
    }

    pub fn set(&self, slot: usize) -> Option<DescriptorSetHandle> {
        self.sets.get(slot).copied()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Points every set at its slot's uniform buffer and at the current frame images. Bindings
    /// the active algorithm has no resource for are left unwritten.
    pub fn writes(&self, uniforms: &UniformBuffers, images: &FrameImages) -> Vec<DescriptorWrite> {
        let mut shared = vec![];

        if let Some(abuffer) = &images.abuffer {
            let resource = match (self.abuffer_binding, abuffer.view) {
                (ABufferBinding::TexelBuffer, Some(view)) => DescriptorResource::TexelBuffer(view),
                _ => DescriptorResource::Buffer {
                    buffer: abuffer.buffer,
                    offset: 0,
                    range: abuffer.size(),
                },
            };
            shared.push((binding::ABUFFER, resource));
        }

        for (&kind, image) in &images.aux {
            shared.push((
                aux_binding(kind),
                DescriptorResource::Image {
                    view: image.view,
                    layout: ImageLayout::General,
                },
            ));
        }

        for (binding, image) in [
            (binding::WEIGHTED_COLOR, &images.weighted_color),
            (binding::WEIGHTED_REVEAL, &images.weighted_reveal),
        ] {
            if let Some(image) = image {
                shared.push((
                    binding,
                    DescriptorResource::Image {
                        view: image.view,
                        layout: ImageLayout::ShaderReadOnly,
                    },
                ));
            }
        }

        self.sets
            .iter()
            .zip(uniforms.handles())
            .flat_map(|(&set, uniform)| {
                let scene = DescriptorResource::Buffer {
                    buffer: uniform,
                    offset: 0,
                    range: uniforms.size(),
                };
                std::iter::once((binding::SCENE, scene))
                    .chain(shared.iter().copied())
                    .map(move |(binding, resource)| DescriptorWrite {
                        set,
                        binding,
                        resource,
                    })
            })
            .collect_vec()
    }

    pub fn destroy(self, device: &mut dyn GpuDevice) -> Result<(), GpuError> {
        device.destroy_descriptor_pool(self.pool)?;
        device.destroy_pipeline_layout(self.pipeline_layout)?;
        device.destroy_descriptor_set_layout(self.set_layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::state::{Algorithm, SurfaceInfo};
    use oitlab_gpu::headless::HeadlessDevice;
    use oitlab_gpu::types::Extent2D;

    #[test]
    pub fn writes_skip_absent_resources() {
        let mut device = HeadlessDevice::default();
        let mut state = State::default();
        state.algorithm = Algorithm::LinkedList;
        let surface = SurfaceInfo {
            extent: Extent2D::new(16, 16),
            frame_slots: 2,
        };

        let uniforms = UniformBuffers::create(&mut device, surface.frame_slots).unwrap();
        let images = FrameImages::create(&mut device, &state, &surface).unwrap();
        let sets = DescriptorSets::create(&mut device, &state, surface.frame_slots).unwrap();

        let writes = sets.writes(&uniforms, &images);
        // scene, A-buffer, aux, counter for each slot
        assert_eq!(writes.len(), 2 * 4);
        assert!(writes.iter().all(|write| write.binding != binding::AUX_SPIN));
        device.update_descriptor_sets(&writes).unwrap();

        let set = sets.set(1).unwrap();
        assert!(matches!(
            device.descriptor_binding(set, binding::ABUFFER),
            Some(DescriptorResource::TexelBuffer(_))
        ));
        assert_eq!(
            device.descriptor_binding(set, binding::SCENE),
            Some(DescriptorResource::Buffer {
                buffer: uniforms.handle(1).unwrap(),
                offset: 0,
                range: 224,
            })
        );
    }

    #[test]
    pub fn loop64_binds_a_storage_buffer() {
        let bindings = layout_bindings(Algorithm::Loop64.profile().abuffer_binding);
        let abuffer = bindings.iter().find(|b| b.binding == binding::ABUFFER).unwrap();
        assert_eq!(abuffer.ty, DescriptorType::StorageBuffer);
        assert!(bindings.iter().all(|b| b.binding != 6));
    }
}
