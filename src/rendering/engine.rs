//! Records the transparency part of a frame for the active algorithm.
//!
//! The frame is split around the opaque draws: [`OitEngine::record_clears`] runs before the main
//! render pass begins, [`OitEngine::record_transparent`] after the opaque objects have been drawn
//! inside it. Whatever pass is active at the end is left for the caller to end.

use crate::rendering::RenderError;
use crate::rendering::algorithm::{AlgorithmProfile, ClearOp, PassKind, PassStep};
use crate::rendering::frame_images::FrameImages;
use crate::rendering::reconciler::FrameResources;
use crate::rendering::state::{Algorithm, State};
use log::trace;
use oitlab_gpu::command::{ClearValue, CommandList};
use oitlab_gpu::types::ImageLayout;
use oitlab_gpu::{DescriptorSetHandle, DeviceCapabilities};

/// Clear values of the weighted pass, in attachment order: accumulation, reveal, color, depth.
/// Only the two float targets are cleared, the others load what the main pass left behind.
pub const WEIGHTED_CLEAR_VALUES: [ClearValue; 4] = [
    ClearValue::Color([0.0; 4]),
    ClearValue::Color([1.0; 4]),
    ClearValue::Color([0.0; 4]),
    ClearValue::DepthStencil { depth: 1.0, stencil: 0 },
];

#[derive(Debug, Clone, Copy)]
pub struct OitEngine {
    profile: &'static AlgorithmProfile,
}

impl OitEngine {
    /// Panics if `algorithm` needs a feature the device lacks; such an algorithm is never
    /// selectable.
    pub fn new(algorithm: Algorithm, capabilities: &DeviceCapabilities) -> Self {
        assert!(
            algorithm.is_supported(capabilities),
            "{algorithm} needs a device feature that isn't available"
        );
        Self {
            profile: algorithm.profile(),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.profile.algorithm
    }

    pub fn profile(&self) -> &'static AlgorithmProfile {
        self.profile
    }

    /// Resets the per-pixel storage of the algorithm. Has to be recorded outside of any render
    /// pass. Leaves every auxiliary image in the general layout the fragment shaders expect, with
    /// a single barrier making all clears visible to them.
    pub fn record_clears(&self, cmd: &mut CommandList, images: &mut FrameImages, state: &State) -> Result<(), RenderError> {
        profiling::scope!("record_clears");
        for image in images.aux.values_mut() {
            image.transition_to(cmd, ImageLayout::General);
        }

        for clear in self.profile.clears {
            match *clear {
                ClearOp::Image { image, value } => {
                    let aux = images.aux_image(image).ok_or(RenderError::MissingResource(image.label()))?;
                    cmd.clear_color_image(aux.image, value);
                }
                ClearOp::ABufferDepths { value } => {
                    let abuffer = images.abuffer.as_ref().ok_or(RenderError::MissingResource("A-buffer"))?;
                    // every per-sample slice holds the depths first, then as many colors
                    let depths_size = images.buffer_extent.area() * 4 * state.oit_layers as u64;
                    for sample in 0..state.storage_samples() as u64 {
                        cmd.fill_buffer(abuffer.buffer, sample * depths_size * 2, depths_size, value);
                    }
                }
                ClearOp::ABuffer { value } => {
                    let abuffer = images.abuffer.as_ref().ok_or(RenderError::MissingResource("A-buffer"))?;
                    cmd.fill_buffer(abuffer.buffer, 0, abuffer.size(), value);
                }
            }
        }
        if !self.profile.clears.is_empty() {
            cmd.transfer_to_fragment_barrier();
        }
        Ok(())
    }

    /// Draws the first `num_transparent` objects with the algorithm's passes. Expects the main
    /// render pass to be active with `set` and the scene buffers bound.
    pub fn record_transparent(
        &self,
        cmd: &mut CommandList,
        frame: &FrameResources<'_>,
        set: DescriptorSetHandle,
        num_transparent: u32,
    ) -> Result<(), RenderError> {
        profiling::scope!("record_transparent");
        for step in self.profile.steps {
            trace!("{}: {step:?}", self.profile.algorithm);
            match *step {
                PassStep::Draw(pass) => {
                    let pipeline = frame
                        .pipelines
                        .pass(pass)
                        .ok_or(RenderError::MissingResource("pass pipeline"))?;
                    match pass {
                        PassKind::Composite => {
                            cmd.bind_pipeline(pipeline);
                            cmd.draw(3);
                        }
                        PassKind::Depth | PassKind::Color => {
                            let (first_index, index_count) = frame.scene.index_range(0, num_transparent);
                            if index_count > 0 {
                                cmd.bind_pipeline(pipeline);
                                cmd.draw_indexed(index_count, first_index);
                            }
                        }
                    }
                }
                PassStep::FragmentBarrier => cmd.fragment_to_fragment_barrier(),
                PassStep::BeginWeightedPass => {
                    let framebuffer = frame
                        .framebuffers
                        .weighted
                        .ok_or(RenderError::MissingResource("weighted framebuffer"))?;
                    cmd.end_render_pass();
                    cmd.begin_render_pass(
                        frame.render_passes.weighted,
                        framebuffer,
                        frame.images.buffer_extent,
                        WEIGHTED_CLEAR_VALUES.to_vec(),
                    );
                    cmd.bind_descriptor_set(frame.descriptors.pipeline_layout, set);
                    cmd.bind_vertex_buffer(frame.scene.vertices.buffer);
                    cmd.bind_index_buffer(frame.scene.indices.buffer);
                }
                PassStep::NextSubpass => cmd.next_subpass(),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::algorithm::AuxImage;
    use crate::rendering::state::{AntialiasingMode, SurfaceInfo};
    use oitlab_gpu::command::Command;
    use oitlab_gpu::headless::HeadlessDevice;
    use oitlab_gpu::GpuDevice;
    use oitlab_gpu::types::Extent2D;

    fn images_for(device: &mut HeadlessDevice, state: &State) -> FrameImages {
        let surface = SurfaceInfo {
            extent: Extent2D::new(8, 4),
            frame_slots: 1,
        };
        FrameImages::create(device, state, &surface).unwrap()
    }

    #[test]
    pub fn spinlock_clears_every_aux_image() {
        let mut device = HeadlessDevice::default();
        let state = State::default();
        let mut images = images_for(&mut device, &state);
        let engine = OitEngine::new(state.algorithm, device.capabilities());

        let mut cmd = CommandList::new("clears");
        engine.record_clears(&mut cmd, &mut images, &state).unwrap();

        let cleared = cmd
            .commands()
            .iter()
            .filter_map(|command| match command {
                Command::ClearColorImage { image, .. } => Some(*image),
                _ => None,
            })
            .collect::<Vec<_>>();
        let expected = [AuxImage::AuxDepth, AuxImage::Aux, AuxImage::AuxSpin]
            .map(|kind| images.aux_image(kind).unwrap().image);
        assert_eq!(cleared, expected);
        assert!(images.aux.values().all(|image| image.layout() == ImageLayout::General));

        let barriers = cmd
            .commands()
            .iter()
            .enumerate()
            .filter(|(_, command)| matches!(command, Command::MemoryBarrier { .. }))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        assert_eq!(barriers, [cmd.len() - 1]);
    }

    #[test]
    pub fn loop_clears_only_the_depth_halves() {
        let mut device = HeadlessDevice::default();
        let mut state = State::default();
        state.algorithm = Algorithm::Loop;
        state.oit_layers = 4;
        state.aa_type = AntialiasingMode::Ssaa4x;
        state.recompute_antialiasing_settings();
        let mut images = images_for(&mut device, &state);
        let engine = OitEngine::new(state.algorithm, device.capabilities());

        let mut cmd = CommandList::new("clears");
        engine.record_clears(&mut cmd, &mut images, &state).unwrap();

        let fills = cmd
            .commands()
            .iter()
            .filter_map(|command| match command {
                Command::FillBuffer { offset, size, .. } => Some((*offset, *size)),
                _ => None,
            })
            .collect::<Vec<_>>();
        let depths_size = 8 * 4 * 4 * 4;
        assert_eq!(
            fills,
            (0..4).map(|sample| (sample * depths_size * 2, depths_size)).collect::<Vec<_>>()
        );
        let abuffer_size = images.abuffer.as_ref().unwrap().size();
        assert_eq!(abuffer_size, depths_size * 2 * 4);
    }

    #[test]
    pub fn weighted_records_no_clears() {
        let mut device = HeadlessDevice::default();
        let mut state = State::default();
        state.algorithm = Algorithm::Weighted;
        let mut images = images_for(&mut device, &state);

        let mut cmd = CommandList::new("clears");
        OitEngine::new(state.algorithm, device.capabilities())
            .record_clears(&mut cmd, &mut images, &state)
            .unwrap();
        assert!(cmd.is_empty());
    }

    #[test]
    #[should_panic]
    pub fn unsupported_algorithms_are_rejected() {
        let capabilities = DeviceCapabilities {
            fragment_shader_interlock: false,
            ..Default::default()
        };
        OitEngine::new(Algorithm::Interlock, &capabilities);
    }
}
