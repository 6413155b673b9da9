//! Vulkan-shaped GPU primitives consumed by the OIT renderer.
//!
//! The renderer never talks to a graphics API directly. It creates objects through
//! [`GpuDevice`], records work into [`command::CommandList`]s and submits them. The
//! [`headless::HeadlessDevice`] implements the trait without a GPU: it keeps track of every
//! live object, validates command streams and refuses to destroy anything that unfinished
//! work still references, which is what the tests and the headless runner rely on.

use thiserror::Error;

pub mod buffer;
pub mod command;
pub mod device;
pub mod handles;
pub mod headless;
pub mod image;
pub mod shader;
pub mod types;

pub use device::{DeviceCapabilities, GpuDevice, SubmitInfo};
pub use handles::*;

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("Failed to create {kind}: {reason}")]
    CreationFailed { kind: ObjectKind, reason: String },

    #[error("Out of device memory while allocating {requested} bytes for {label}")]
    OutOfMemory { label: String, requested: u64 },

    #[error("Unknown or destroyed {kind} handle {raw}")]
    InvalidHandle { kind: ObjectKind, raw: u64 },

    #[error("{kind} \"{label}\" is still referenced by in-flight GPU work")]
    InUse { kind: ObjectKind, label: String },

    #[error("{kind} \"{label}\" still has dependent objects alive")]
    DependentsAlive { kind: ObjectKind, label: String },

    #[error("Invalid command {index} in \"{list}\": {reason}")]
    InvalidCommand { list: String, index: usize, reason: String },

    #[error("Invalid descriptor write: {reason}")]
    InvalidDescriptorWrite { reason: String },

    #[error("Invalid submission: {reason}")]
    InvalidSubmission { reason: String },

    #[error("Timed out after {0:?} waiting for a fence")]
    Timeout(std::time::Duration),
}
