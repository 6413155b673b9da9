use crate::GpuError;
use crate::device::GpuDevice;
use crate::handles::{BufferHandle, BufferViewHandle};
use crate::types::{BufferDesc, Format};

/// A buffer and, for texel buffers, the typed view the shaders access it through.
#[derive(Debug)]
pub struct BufferAndView {
    pub buffer: BufferHandle,
    pub view: Option<BufferViewHandle>,
    desc: BufferDesc,
}

impl BufferAndView {
    pub fn create(device: &mut dyn GpuDevice, desc: BufferDesc) -> Result<Self, GpuError> {
        let buffer = device.create_buffer(&desc)?;
        Ok(Self {
            buffer,
            view: None,
            desc,
        })
    }

    pub fn create_with_view(device: &mut dyn GpuDevice, desc: BufferDesc, format: Format) -> Result<Self, GpuError> {
        let mut buffer = Self::create(device, desc)?;
        match device.create_buffer_view(buffer.buffer, format) {
            Ok(view) => buffer.view = Some(view),
            Err(e) => {
                device.destroy_buffer(buffer.buffer)?;
                return Err(e);
            }
        }
        Ok(buffer)
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn destroy(self, device: &mut dyn GpuDevice) -> Result<(), GpuError> {
        if let Some(view) = self.view {
            device.destroy_buffer_view(view)?;
        }
        device.destroy_buffer(self.buffer)
    }
}
