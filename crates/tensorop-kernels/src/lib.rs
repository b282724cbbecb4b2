//! Operator descriptors, backend dispatch and CPU kernels for tensorop
//!
//! An operator descriptor validates tensor metadata once, then dispatches
//! every execution to the [`KernelProvider`] registered for the handle's
//! device type.

use std::any::Any;
use std::ffi::c_void;
use tensorop_common::{DeviceType, Handle, Result};

pub mod awq;
#[cfg(feature = "cpu")]
pub mod cpu;
pub mod element;
pub mod registry;

pub use awq::{AwqDequantizeArgs, AwqDequantizeDescriptor, AwqDequantizeInfo};
#[cfg(feature = "cpu")]
pub use cpu::CpuReferenceKernel;
pub use element::{FloatSlice, FloatSliceMut, OutputElement, ScaleElement};
pub use registry::{KernelRegistry, default_registry};

/// Opaque per-descriptor state owned by a backend.
pub type BackendState = Box<dyn Any + Send + Sync>;

/// What a backend hands back when a descriptor is created.
pub struct PreparedState {
    pub state: BackendState,
    /// Scratch bytes every execution needs.
    pub workspace_size: usize,
}

/// Execution queue token. Never dereferenced on the Rust side; backends
/// without queues ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stream(*mut c_void);

// SAFETY: the pointer is an opaque token owned by the caller's runtime and
// is only passed back to it.
unsafe impl Send for Stream {}
unsafe impl Sync for Stream {}

impl Stream {
    pub const NULL: Stream = Stream(std::ptr::null_mut());

    pub fn from_raw(ptr: *mut c_void) -> Self {
        Stream(ptr)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for Stream {
    fn default() -> Self {
        Stream::NULL
    }
}

/// Kernel provider trait
///
/// One implementation per device family. The dispatch layer never looks
/// inside [`BackendState`]; it only hands it back on execute and release.
pub trait KernelProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Device family this provider executes on.
    fn device(&self) -> DeviceType;

    fn is_available(&self) -> bool;

    /// Build backend state for a validated configuration.
    fn prepare_awq_dequantize(&self, handle: &Handle, info: &AwqDequantizeInfo) -> Result<PreparedState>;

    /// Run one dequantization. Buffers are already checked against `info`.
    fn awq_dequantize(
        &self,
        state: &BackendState,
        info: &AwqDequantizeInfo,
        args: AwqDequantizeArgs<'_>,
    ) -> Result<()>;

    /// Tear down state created by `prepare_awq_dequantize`.
    fn release(&self, state: BackendState) {
        drop(state);
    }
}
