//! Drives one frame at a time: reconcile, wait for the frame slot, record, present, submit.

use crate::rendering::RenderError;
use crate::rendering::camera::CameraSource;
use crate::rendering::engine::OitEngine;
use crate::rendering::reconciler::Reconciler;
use crate::rendering::reconciler::dirty::DirtySet;
use crate::rendering::state::{Algorithm, State, SurfaceInfo};
use crate::rendering::uniforms::SceneData;
use log::{debug, error, trace, warn};
use oitlab_gpu::command::{ClearValue, CommandList};
use oitlab_gpu::types::{Extent2D, ImageLayout};
use oitlab_gpu::{FenceHandle, GpuDevice, Handle, ImageHandle, SubmitInfo};
use std::time::Duration;

/// How long a frame waits for its slot before the GPU is considered lost.
pub const FENCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Clear values of the main pass: color, depth.
pub const MAIN_CLEAR_VALUES: [ClearValue; 2] = [
    ClearValue::Color([0.2, 0.2, 0.2, 0.2]),
    ClearValue::DepthStencil { depth: 1.0, stencil: 0 },
];

/// The single sampled, surface sized image a frame ends up in, left in the transfer source
/// layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayImage {
    pub image: ImageHandle,
    pub extent: Extent2D,
}

/// Whatever turns the finished frame into pixels somewhere. Recorded into the frame's command
/// list, right before submission.
pub trait Presenter {
    fn present(&mut self, cmd: &mut CommandList, image: DisplayImage) -> Result<(), RenderError>;
}

/// Presents nowhere, but remembers what it has been handed.
#[derive(Debug, Default)]
pub struct HeadlessPresenter {
    presented: Vec<DisplayImage>,
}

impl HeadlessPresenter {
    pub fn presented(&self) -> &[DisplayImage] {
        &self.presented
    }
}

impl Presenter for HeadlessPresenter {
    fn present(&mut self, _cmd: &mut CommandList, image: DisplayImage) -> Result<(), RenderError> {
        trace!("Presenting image {} ({:?})", image.image.raw(), image.extent);
        self.presented.push(image);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame: u64,
    pub slot: usize,
    pub algorithm: Algorithm,
    pub rebuilt: DirtySet,
    pub num_transparent: u32,
    pub num_opaque: u32,
    pub display: DisplayImage,
    /// Set when a requested configuration failed to apply and the frame fell back.
    pub reverted: bool,
}

pub struct FrameOrchestrator {
    reconciler: Reconciler,
    camera: Box<dyn CameraSource>,
    presenter: Box<dyn Presenter>,
    requested: State,
    surface: SurfaceInfo,
    force_rebuild: bool,
    fences: Vec<FenceHandle>,
    slot: usize,
    frame: u64,
}

impl FrameOrchestrator {
    pub fn new(
        reconciler: Reconciler,
        camera: Box<dyn CameraSource>,
        presenter: Box<dyn Presenter>,
        state: State,
        surface: SurfaceInfo,
    ) -> Self {
        Self {
            reconciler,
            camera,
            presenter,
            requested: state,
            surface,
            force_rebuild: false,
            fences: Vec::new(),
            slot: 0,
            frame: 0,
        }
    }

    pub fn requested(&self) -> &State {
        &self.requested
    }

    /// Takes effect at the start of the next frame.
    pub fn request(&mut self, state: State) {
        self.requested = state;
    }

    pub fn resize(&mut self, surface: SurfaceInfo) {
        self.surface = surface;
    }

    /// Rebuilds every resource on the next frame, even if nothing changed.
    pub fn request_rebuild(&mut self) {
        self.force_rebuild = true;
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }

    fn sync_fences(&mut self, device: &mut dyn GpuDevice, frame_slots: u32) -> Result<(), RenderError> {
        if self.fences.len() == frame_slots as usize {
            return Ok(());
        }

        device.wait_idle()?;
        for fence in self.fences.drain(..) {
            device.destroy_fence(fence)?;
        }
        for _ in 0..frame_slots {
            // signaled, so the first wait of every slot returns right away
            self.fences.push(device.create_fence(true)?);
        }
        self.slot = 0;
        debug!("Using {frame_slots} frame slots");
        Ok(())
    }

    fn reconcile(&mut self, device: &mut dyn GpuDevice) -> Result<(DirtySet, bool), RenderError> {
        let force = std::mem::take(&mut self.force_rebuild);
        match self.reconciler.reconcile(device, &self.requested, &self.surface, force) {
            Ok(dirty) => Ok((dirty, false)),
            Err(RenderError::Shader(e)) if self.reconciler.applied().is_some() => {
                let Some(applied) = self.reconciler.applied().cloned() else {
                    unreachable!("checked by the match guard");
                };
                warn!(
                    "Keeping {} because the requested configuration failed to apply: {e}",
                    applied.algorithm
                );
                self.requested = applied;
                Ok((DirtySet::default(), true))
            }
            Err(e) => Err(e),
        }
    }

    pub fn render_frame(&mut self, device: &mut dyn GpuDevice) -> Result<FrameReport, RenderError> {
        profiling::scope!("render_frame");
        let (rebuilt, reverted) = self.reconcile(device)?;
        let Some(state) = self.reconciler.applied().cloned() else {
            return Err(RenderError::MissingResource("applied configuration"));
        };
        let frame_slots = self
            .reconciler
            .applied_surface()
            .map_or(self.surface.frame_slots, |surface| surface.frame_slots);
        self.sync_fences(device, frame_slots)?;

        let slot = self.slot;
        let fence = self.fences[slot];
        if !device.wait_for_fence(fence, FENCE_TIMEOUT)? {
            error!("Frame slot {slot} did not become available within {FENCE_TIMEOUT:?}");
            return Err(RenderError::FrameTimeout {
                slot,
                timeout: FENCE_TIMEOUT,
            });
        }
        device.reset_fence(fence)?;

        let engine = OitEngine::new(state.algorithm, device.capabilities());
        let frame = self.reconciler.resources_mut().frame()?;
        let view = self.camera.view_matrix(self.frame);
        frame
            .uniforms
            .write(device, slot, &SceneData::new(&state, frame.images.buffer_extent, view))?;
        let set = frame
            .descriptors
            .set(slot)
            .ok_or(RenderError::MissingResource("descriptor set"))?;

        let mut cmd = CommandList::new(format!("frame {}", self.frame));
        engine.record_clears(&mut cmd, frame.images, &state)?;

        frame.images.color.transition_to(&mut cmd, ImageLayout::ColorAttachment);
        cmd.begin_render_pass(
            frame.render_passes.main,
            frame.framebuffers.main,
            frame.images.buffer_extent,
            MAIN_CLEAR_VALUES.to_vec(),
        );
        cmd.bind_descriptor_set(frame.descriptors.pipeline_layout, set);
        cmd.bind_vertex_buffer(frame.scene.vertices.buffer);
        cmd.bind_index_buffer(frame.scene.indices.buffer);

        let (num_transparent, num_opaque) = state.partition();
        if num_opaque > 0 {
            let (first_index, index_count) = frame.scene.index_range(num_transparent, num_opaque);
            cmd.bind_pipeline(frame.pipelines.opaque);
            cmd.draw_indexed(index_count, first_index);
        }
        engine.record_transparent(&mut cmd, &frame, set, num_transparent)?;
        cmd.end_render_pass();

        let images = frame.images;
        images.color.assume_layout(ImageLayout::ColorAttachment);
        images.depth.assume_layout(ImageLayout::DepthStencilAttachment);
        for target in [&mut images.weighted_color, &mut images.weighted_reveal].into_iter().flatten() {
            target.assume_layout(ImageLayout::ShaderReadOnly);
        }

        images.color.transition_to(&mut cmd, ImageLayout::TransferSrc);
        let display = if state.msaa() > 1 || state.supersample() > 1 {
            images.downsample.transition_to(&mut cmd, ImageLayout::TransferDst);
            if state.msaa() > 1 {
                cmd.resolve_image(images.color.image, images.downsample.image, images.surface_extent);
            } else {
                cmd.blit_image(
                    images.color.image,
                    images.downsample.image,
                    images.buffer_extent,
                    images.surface_extent,
                );
            }
            images.downsample.transition_to(&mut cmd, ImageLayout::TransferSrc);
            DisplayImage {
                image: images.downsample.image,
                extent: images.surface_extent,
            }
        } else {
            DisplayImage {
                image: images.color.image,
                extent: images.surface_extent,
            }
        };
        self.presenter.present(&mut cmd, display)?;

        trace!("Submitting {} commands for frame {}", cmd.len(), self.frame);
        device.submit(SubmitInfo::new(cmd).with_fence(fence))?;

        let report = FrameReport {
            frame: self.frame,
            slot,
            algorithm: state.algorithm,
            rebuilt,
            num_transparent,
            num_opaque,
            display,
            reverted,
        };
        self.slot = (self.slot + 1) % self.fences.len();
        self.frame += 1;
        Ok(report)
    }

    /// Waits for the GPU and releases every resource, including the frame fences.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) -> Result<(), RenderError> {
        self.reconciler.destroy(device)?;
        for fence in self.fences.drain(..) {
            device.destroy_fence(fence)?;
        }
        Ok(())
    }
}
