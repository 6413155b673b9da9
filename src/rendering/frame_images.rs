use crate::rendering::algorithm::AuxImage;
use crate::rendering::state::{State, SurfaceInfo};
use itertools::Itertools;
use log::debug;
use oitlab_gpu::GpuDevice;
use oitlab_gpu::GpuError;
use oitlab_gpu::buffer::BufferAndView;
use oitlab_gpu::image::ImageAndView;
use oitlab_gpu::types::{BufferDesc, Extent2D, Format, ImageDesc, ImageUsage};
use std::collections::BTreeMap;

pub const COLOR_FORMAT: Format = Format::B8G8R8A8Srgb;
pub const DEPTH_FORMAT: Format = Format::D32Sfloat;
pub const AUX_FORMAT: Format = Format::R32Uint;
pub const WEIGHTED_COLOR_FORMAT: Format = Format::R16G16B16A16Sfloat;
pub const WEIGHTED_REVEAL_FORMAT: Format = Format::R16Sfloat;

/// The images and buffers whose existence, size or format depend on the configuration: render
/// targets at the buffer extent plus whatever the active algorithm stores per pixel.
#[derive(Debug)]
pub struct FrameImages {
    pub color: ImageAndView,
    pub depth: ImageAndView,
    /// Single sampled, at the surface extent. Target of the msaa resolve and the supersample blit.
    pub downsample: ImageAndView,
    pub aux: BTreeMap<AuxImage, ImageAndView>,
    pub abuffer: Option<BufferAndView>,
    pub weighted_color: Option<ImageAndView>,
    pub weighted_reveal: Option<ImageAndView>,
    pub surface_extent: Extent2D,
    pub buffer_extent: Extent2D,
}

fn image_desc(label: &str, format: Format, extent: Extent2D, samples: u32, usage: ImageUsage) -> ImageDesc {
    ImageDesc {
        label: label.to_string(),
        format,
        extent,
        samples,
        layers: 1,
        usage,
    }
}

impl FrameImages {
    pub fn create(device: &mut dyn GpuDevice, state: &State, surface: &SurfaceInfo) -> Result<Self, GpuError> {
        let profile = state.algorithm.profile();
        let surface_extent = surface.extent;
        let buffer_extent = surface_extent.scaled(state.supersample());
        let samples = state.msaa();

        let color = ImageAndView::create(
            device,
            image_desc(
                "colorImage",
                COLOR_FORMAT,
                buffer_extent,
                samples,
                ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_SRC,
            ),
        )?;
        let depth = ImageAndView::create(
            device,
            image_desc(
                "depthImage",
                DEPTH_FORMAT,
                buffer_extent,
                samples,
                ImageUsage::DEPTH_STENCIL_ATTACHMENT,
            ),
        )?;
        let downsample = ImageAndView::create(
            device,
            image_desc(
                "downsampleImage",
                COLOR_FORMAT,
                surface_extent,
                1,
                ImageUsage::TRANSFER_DST | ImageUsage::TRANSFER_SRC,
            ),
        )?;

        let mut aux = BTreeMap::new();
        for &kind in profile.aux_images {
            let (extent, layers) = match kind {
                AuxImage::Counter => (Extent2D::new(1, 1), 1),
                _ => (buffer_extent, state.storage_samples()),
            };
            let desc = ImageDesc {
                label: kind.label().to_string(),
                format: AUX_FORMAT,
                extent,
                samples: 1,
                layers,
                usage: ImageUsage::STORAGE | ImageUsage::TRANSFER_DST,
            };
            aux.insert(kind, ImageAndView::create(device, desc)?);
        }

        let abuffer = match profile.abuffer_plan(state, buffer_extent) {
            Some(plan) => {
                let desc = BufferDesc {
                    label: "aBuffer".into(),
                    size: plan.size,
                    usage: plan.usage,
                };
                debug!(
                    "A-buffer for {}: {} elements of {} bytes per pixel, {} bytes",
                    state.algorithm, plan.elements_per_pixel, plan.stride, plan.size
                );
                Some(match plan.view_format {
                    Some(format) => BufferAndView::create_with_view(device, desc, format)?,
                    None => BufferAndView::create(device, desc)?,
                })
            }
            None => None,
        };

        let (weighted_color, weighted_reveal) = if profile.weighted_targets {
            let usage = ImageUsage::COLOR_ATTACHMENT | ImageUsage::INPUT_ATTACHMENT;
            (
                Some(ImageAndView::create(
                    device,
                    image_desc("weightedColor", WEIGHTED_COLOR_FORMAT, buffer_extent, samples, usage),
                )?),
                Some(ImageAndView::create(
                    device,
                    image_desc("weightedReveal", WEIGHTED_REVEAL_FORMAT, buffer_extent, samples, usage),
                )?),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            color,
            depth,
            downsample,
            aux,
            abuffer,
            weighted_color,
            weighted_reveal,
            surface_extent,
            buffer_extent,
        })
    }

    pub fn aux_image(&self, kind: AuxImage) -> Option<&ImageAndView> {
        self.aux.get(&kind)
    }

    /// Labels of everything that only exists for some algorithms.
    pub fn algorithm_resources(&self) -> Vec<&str> {
        self.aux
            .values()
            .chain(self.weighted_color.iter())
            .chain(self.weighted_reveal.iter())
            .map(|image| image.desc().label.as_str())
            .chain(self.abuffer.iter().map(|buffer| buffer.desc().label.as_str()))
            .sorted()
            .collect_vec()
    }

    pub fn destroy(self, device: &mut dyn GpuDevice) -> Result<(), GpuError> {
        for image in self.aux.into_values() {
            image.destroy(device)?;
        }
        if let Some(abuffer) = self.abuffer {
            abuffer.destroy(device)?;
        }
        for image in [self.weighted_color, self.weighted_reveal].into_iter().flatten() {
            image.destroy(device)?;
        }
        self.downsample.destroy(device)?;
        self.depth.destroy(device)?;
        self.color.destroy(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::state::{Algorithm, AntialiasingMode};
    use oitlab_gpu::headless::HeadlessDevice;

    fn surface() -> SurfaceInfo {
        SurfaceInfo {
            extent: Extent2D::new(64, 32),
            frame_slots: 2,
        }
    }

    #[test]
    pub fn supersampling_scales_the_buffer_extent() {
        let mut device = HeadlessDevice::default();
        let mut state = State::default();
        state.aa_type = AntialiasingMode::Super4x;
        state.recompute_antialiasing_settings();

        let images = FrameImages::create(&mut device, &state, &surface()).unwrap();
        assert_eq!(images.buffer_extent, Extent2D::new(128, 64));
        assert_eq!(images.color.desc().extent, images.buffer_extent);
        assert_eq!(images.downsample.desc().extent, images.surface_extent);
        assert_eq!(
            images.aux_image(AuxImage::Aux).map(|aux| aux.desc().extent),
            Some(images.buffer_extent)
        );
        images.destroy(&mut device).unwrap();
        assert_eq!(device.live_count(), 0);
    }

    #[test]
    pub fn sample_shading_stores_per_sample() {
        let mut device = HeadlessDevice::default();
        let mut state = State::default();
        state.algorithm = Algorithm::LinkedList;
        state.aa_type = AntialiasingMode::Ssaa8x;
        state.recompute_antialiasing_settings();

        let images = FrameImages::create(&mut device, &state, &surface()).unwrap();
        assert_eq!(images.color.desc().samples, 8);
        let aux = images.aux_image(AuxImage::Aux).unwrap();
        assert_eq!((aux.desc().samples, aux.desc().layers), (1, 8));
        let counter = images.aux_image(AuxImage::Counter).unwrap();
        assert_eq!((counter.desc().extent, counter.desc().layers), (Extent2D::new(1, 1), 1));
        assert_eq!(images.algorithm_resources(), vec!["aBuffer", "aux", "counter"]);
    }

    #[test]
    pub fn weighted_has_no_per_pixel_storage() {
        let mut device = HeadlessDevice::default();
        let mut state = State::default();
        state.algorithm = Algorithm::Weighted;
        state.aa_type = AntialiasingMode::Msaa4x;
        state.recompute_antialiasing_settings();

        let images = FrameImages::create(&mut device, &state, &surface()).unwrap();
        assert!(images.abuffer.is_none());
        assert_eq!(images.algorithm_resources(), vec!["weightedColor", "weightedReveal"]);
        assert_eq!(images.weighted_reveal.as_ref().map(|image| image.desc().samples), Some(4));
    }
}
