use crate::rendering::state::State;
use glam::{Vec3, Vec4};
use itertools::Itertools;
use oitlab_gpu::buffer::BufferAndView;
use oitlab_gpu::types::{BufferDesc, BufferUsage, VertexAttribute, VertexFormat, VertexLayout};
use oitlab_gpu::{GpuDevice, GpuError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

pub const SCENE_SEED: u64 = 3625;
pub const GRID_SIZE: u32 = 16;
pub const GLOBAL_SCALE: f32 = 8.0;

/// position (vec3), normal (vec3), color (vec4).
pub const VERTEX_STRIDE: u32 = 40;

pub fn vertex_layout() -> VertexLayout {
    VertexLayout {
        stride: VERTEX_STRIDE,
        attributes: vec![
            VertexAttribute {
                location: 0,
                format: VertexFormat::Float32x3,
                offset: 0,
            },
            VertexAttribute {
                location: 1,
                format: VertexFormat::Float32x3,
                offset: 12,
            },
            VertexAttribute {
                location: 2,
                format: VertexFormat::Float32x4,
                offset: 24,
            },
        ],
    }
}

/// A unit mesh centered at the origin.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
}

pub trait GeometryGenerator {
    /// Has to be deterministic for a given `subdivision`.
    fn generate_sphere(&self, subdivision: u32) -> MeshData;
}

/// Latitude/longitude sphere with `subdivision * 2` slices and `subdivision` stacks,
/// counter-clockwise when seen from outside.
#[derive(Debug, Default, Clone, Copy)]
pub struct UvSphereGenerator;

impl GeometryGenerator for UvSphereGenerator {
    fn generate_sphere(&self, subdivision: u32) -> MeshData {
        let stacks = subdivision.max(2);
        let slices = stacks * 2;
        let mut mesh = MeshData::default();

        for stack in 0..=stacks {
            let theta = stack as f32 / stacks as f32 * PI;
            for slice in 0..=slices {
                let phi = slice as f32 / slices as f32 * 2.0 * PI;
                let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
                mesh.positions.push(normal);
                mesh.normals.push(normal);
            }
        }

        let row = slices + 1;
        for stack in 0..stacks {
            for slice in 0..slices {
                let top_left = stack * row + slice;
                let bottom_left = top_left + row;
                mesh.indices.extend_from_slice(&[
                    top_left,
                    top_left + 1,
                    bottom_left,
                    top_left + 1,
                    bottom_left + 1,
                    bottom_left,
                ]);
            }
        }

        mesh
    }
}

/// All objects of the scene in one interleaved vertex buffer and one index buffer. Object `i`
/// owns the index range `[i * indices_per_object, (i + 1) * indices_per_object)`.
#[derive(Debug, Clone)]
pub struct SceneGeometry {
    pub vertex_data: Vec<u8>,
    pub index_data: Vec<u8>,
    pub num_objects: u32,
    pub vertices_per_object: u32,
    pub indices_per_object: u32,
}

impl SceneGeometry {
    pub fn index_count(&self) -> u32 {
        self.num_objects * self.indices_per_object
    }

    pub fn vertex_count(&self) -> u32 {
        self.num_objects * self.vertices_per_object
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedSphere {
    pub center: Vec3,
    pub radius: f32,
    /// Unpremultiplied, linear.
    pub color: Vec4,
}

/// Random sphere placement in a cube of [`GLOBAL_SCALE`] around the origin, always the same for
/// the same seed and state.
pub fn place_spheres(state: &State) -> Vec<PlacedSphere> {
    let mut rng = StdRng::seed_from_u64(SCENE_SEED);

    (0..state.num_objects)
        .map(|_| {
            let center = (Vec3::new(rng.random(), rng.random(), rng.random()) - Vec3::splat(0.5)) * GLOBAL_SCALE;
            let radius =
                GLOBAL_SCALE * 0.9 / GRID_SIZE as f32 * (rng.random::<f32>() * state.scale_width + state.scale_min);
            let color = Vec4::new(rng.random(), rng.random(), rng.random(), rng.random());

            PlacedSphere {
                center,
                radius,
                color: (color.truncate() * color.truncate()).extend(color.w),
            }
        })
        .collect_vec()
}

pub fn generate_scene(state: &State, generator: &dyn GeometryGenerator) -> SceneGeometry {
    profiling::scope!("generate_scene");
    let sphere = generator.generate_sphere(state.subdiv);
    let vertices_per_object = sphere.positions.len() as u32;
    let spheres = place_spheres(state);

    let mut vertex_data = Vec::with_capacity(spheres.len() * sphere.positions.len() * VERTEX_STRIDE as usize);
    let mut index_data = Vec::with_capacity(spheres.len() * sphere.indices.len() * 4);

    for (object, placed) in spheres.iter().enumerate() {
        for (position, normal) in sphere.positions.iter().zip(&sphere.normals) {
            let position = *position * placed.radius + placed.center;
            for component in position
                .to_array()
                .into_iter()
                .chain(normal.to_array())
                .chain(placed.color.to_array())
            {
                vertex_data.extend_from_slice(&component.to_le_bytes());
            }
        }

        let base = object as u32 * vertices_per_object;
        for index in &sphere.indices {
            index_data.extend_from_slice(&(base + index).to_le_bytes());
        }
    }

    SceneGeometry {
        vertex_data,
        index_data,
        num_objects: state.num_objects,
        vertices_per_object,
        indices_per_object: sphere.indices.len() as u32,
    }
}

/// The uploaded scene. Immutable until the next rebuild.
#[derive(Debug)]
pub struct SceneBuffers {
    pub vertices: BufferAndView,
    pub indices: BufferAndView,
    pub num_objects: u32,
    pub indices_per_object: u32,
}

fn upload(device: &mut dyn GpuDevice, label: &str, usage: BufferUsage, data: &[u8]) -> Result<BufferAndView, GpuError> {
    // an empty scene still gets a buffer to bind
    let desc = BufferDesc {
        label: label.to_string(),
        size: data.len().max(4) as u64,
        usage: usage | BufferUsage::TRANSFER_DST,
    };
    let buffer = BufferAndView::create(device, desc)?;
    if !data.is_empty() {
        device.write_buffer(buffer.buffer, 0, data)?;
    }
    Ok(buffer)
}

impl SceneBuffers {
    pub fn create(device: &mut dyn GpuDevice, geometry: &SceneGeometry) -> Result<Self, GpuError> {
        let vertices = upload(device, "vertexBuffer", BufferUsage::VERTEX_BUFFER, &geometry.vertex_data)?;
        let indices = upload(device, "indexBuffer", BufferUsage::INDEX_BUFFER, &geometry.index_data)?;
        Ok(Self {
            vertices,
            indices,
            num_objects: geometry.num_objects,
            indices_per_object: geometry.indices_per_object,
        })
    }

    /// `(first_index, index_count)` of `count` objects starting at `first_object`.
    pub fn index_range(&self, first_object: u32, count: u32) -> (u32, u32) {
        (first_object * self.indices_per_object, count * self.indices_per_object)
    }

    pub fn destroy(self, device: &mut dyn GpuDevice) -> Result<(), GpuError> {
        self.indices.destroy(device)?;
        self.vertices.destroy(device)
    }
}
