//! CPU kernel implementations

pub mod reference;

pub use reference::CpuReferenceKernel;
