//! Common types for the tensorop operator runtime
//!
//! This crate provides the foundational types shared by the kernels, the C
//! API and the CLI: element and device types, tensor descriptors, the error
//! taxonomy with its status codes, runtime configuration and the backend
//! capability snapshot.

pub mod config;
pub mod error;
pub mod kernel_registry;
pub mod tensor;
pub mod types;

pub use config::{PackingPolicy, RuntimeConfig};
pub use error::{OpError, Result, Status, TensorRole};
pub use kernel_registry::{BackendEntry, KernelCapabilities, SimdLevel};
pub use tensor::{TensorDesc, contiguous_strides};
pub use types::{DType, DeviceType, Handle};
