use crate::rendering::RenderError;
use crate::rendering::state::State;
use encase::ShaderType;
use glam::{IVec3, Mat4};
use itertools::Itertools;
use log::trace;
use oitlab_gpu::buffer::BufferAndView;
use oitlab_gpu::types::{BufferDesc, BufferUsage, Extent2D};
use oitlab_gpu::{BufferHandle, GpuDevice, GpuError};

pub const FOV_Y_DEGREES: f32 = 45.0;
pub const Z_NEAR: f32 = 0.01;
pub const Z_FAR: f32 = 50.0;

/// The `sceneBuffer` uniform block shared by every shader, std140.
#[derive(Debug, Default, Copy, Clone, PartialEq, ShaderType)]
pub struct SceneData {
    pub proj_view: Mat4,
    pub view: Mat4,
    pub view_inverse_transpose: Mat4,
    /// width, height, width * height of the buffer extent.
    pub viewport: IVec3,
    pub linked_list_allocated_per_element: u32,
    pub alpha_min: f32,
    pub alpha_width: f32,
}

impl SceneData {
    pub fn new(state: &State, buffer_extent: Extent2D, view: Mat4) -> Self {
        let aspect = buffer_extent.width as f32 / buffer_extent.height.max(1) as f32;
        let mut projection = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
        // y points down in clip space
        projection.y_axis.y *= -1.0;

        let pixels = buffer_extent.area() as u32;
        let shader_elements = state
            .algorithm
            .profile()
            .abuffer_plan(state, buffer_extent)
            .map_or(0, |plan| plan.shader_elements);
        Self {
            proj_view: projection * view,
            view,
            view_inverse_transpose: view.inverse().transpose(),
            viewport: IVec3::new(buffer_extent.width as i32, buffer_extent.height as i32, pixels as i32),
            linked_list_allocated_per_element: u32::try_from(shader_elements).unwrap_or(u32::MAX),
            alpha_min: state.alpha_min,
            alpha_width: state.alpha_width,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, encase::internal::Error> {
        let mut buffer = encase::UniformBuffer::new(Vec::<u8>::new());
        buffer.write(self)?;
        Ok(buffer.into_inner())
    }
}

/// One uniform buffer per frame slot, so the CPU can update the next frame's while the GPU still
/// reads the previous one.
#[derive(Debug)]
pub struct UniformBuffers {
    buffers: Vec<BufferAndView>,
}

impl UniformBuffers {
    pub fn create(device: &mut dyn GpuDevice, frame_slots: u32) -> Result<Self, GpuError> {
        let size = SceneData::min_size().get();
        let mut buffers = Vec::with_capacity(frame_slots as usize);
        for slot in 0..frame_slots {
            let desc = BufferDesc {
                label: format!("sceneBuffer[{slot}]"),
                size,
                usage: BufferUsage::UNIFORM_BUFFER | BufferUsage::TRANSFER_DST,
            };
            buffers.push(BufferAndView::create(device, desc)?);
        }
        trace!("Created {frame_slots} uniform buffers of {size} bytes");
        Ok(Self { buffers })
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn handle(&self, slot: usize) -> Option<BufferHandle> {
        self.buffers.get(slot).map(|buffer| buffer.buffer)
    }

    pub fn handles(&self) -> Vec<BufferHandle> {
        self.buffers.iter().map(|buffer| buffer.buffer).collect_vec()
    }

    pub fn size(&self) -> u64 {
        SceneData::min_size().get()
    }

    /// The slot must not be in use by the GPU anymore.
    pub fn write(&self, device: &mut dyn GpuDevice, slot: usize, data: &SceneData) -> Result<(), RenderError> {
        let buffer = self
            .buffers
            .get(slot)
            .ok_or(RenderError::MissingResource("uniform buffer"))?;
        device.write_buffer(buffer.buffer, 0, &data.to_bytes()?)?;
        Ok(())
    }

    pub fn destroy(self, device: &mut dyn GpuDevice) -> Result<(), GpuError> {
        for buffer in self.buffers {
            buffer.destroy(device)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::state::{Algorithm, AntialiasingMode};
    use glam::Vec3;

    #[test]
    pub fn std140_layout() {
        assert_eq!(SceneData::min_size().get(), 224);

        let data = SceneData {
            viewport: IVec3::new(4, 2, 8),
            linked_list_allocated_per_element: 80,
            alpha_min: 0.5,
            ..Default::default()
        };
        let bytes = data.to_bytes().unwrap();
        assert_eq!(bytes.len(), 224);
        assert_eq!(&bytes[192..196], &4i32.to_le_bytes());
        assert_eq!(&bytes[200..204], &8i32.to_le_bytes());
        assert_eq!(&bytes[204..208], &80u32.to_le_bytes());
        assert_eq!(&bytes[208..212], &0.5f32.to_le_bytes());
    }

    #[test]
    pub fn scene_data_uses_the_buffer_extent() {
        let state = State::default();
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 12.0), Vec3::ZERO, Vec3::Y);
        let data = SceneData::new(&state, Extent2D::new(200, 100), view);

        assert_eq!(data.viewport, IVec3::new(200, 100, 20_000));
        // spinlock stores oit_layers fragments per pixel
        assert_eq!(data.linked_list_allocated_per_element, 8);
        assert_eq!((data.alpha_min, data.alpha_width), (0.2, 0.3));
        assert!(data.view_inverse_transpose.abs_diff_eq(view.inverse().transpose(), 1e-6));
    }

    #[test]
    pub fn linked_list_sees_the_whole_pool() {
        let mut state = State::default();
        state.algorithm = Algorithm::LinkedList;
        state.aa_type = AntialiasingMode::Ssaa4x;
        state.recompute_antialiasing_settings();
        let extent = Extent2D::new(100, 100);

        let data = SceneData::new(&state, extent, Mat4::IDENTITY);
        let plan = state.algorithm.profile().abuffer_plan(&state, extent).unwrap();
        assert_eq!(data.linked_list_allocated_per_element as u64, plan.size / plan.stride);
        assert_eq!(data.linked_list_allocated_per_element, 10 * 10_000 * 4);

        state.algorithm = Algorithm::Weighted;
        assert_eq!(SceneData::new(&state, extent, Mat4::IDENTITY).linked_list_allocated_per_element, 0);
    }
}
