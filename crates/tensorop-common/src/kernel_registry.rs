//! Backend capability snapshot
//!
//! Describes what a build (compile-time backends) and a registry (runtime
//! registrations) provide. The dispatch registry in `tensorop-kernels` fills
//! this in; the CLI and C API report it.

use crate::types::DeviceType;
use std::fmt;

/// SIMD instruction set level available at compile time.
///
/// Reported by `tensorop info` and in the capability summary only. Kernel
/// selection is per device and never consults this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum SimdLevel {
    /// No SIMD; scalar only.
    Scalar,
    /// ARM NEON (128-bit).
    Neon,
    /// x86 SSE4.2 (128-bit).
    Sse42,
    /// x86 AVX2 (256-bit).
    Avx2,
    /// x86 AVX-512 (512-bit).
    Avx512,
}

impl fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimdLevel::Scalar => write!(f, "scalar"),
            SimdLevel::Neon => write!(f, "neon"),
            SimdLevel::Sse42 => write!(f, "sse4.2"),
            SimdLevel::Avx2 => write!(f, "avx2"),
            SimdLevel::Avx512 => write!(f, "avx512"),
        }
    }
}

/// One registered backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEntry {
    pub device: DeviceType,
    pub name: &'static str,
    pub available: bool,
}

/// Snapshot of the backends a build and registry provide.
#[derive(Debug, Clone)]
pub struct KernelCapabilities {
    /// Backends linked into this build, by cargo feature.
    pub compiled: Vec<DeviceType>,
    /// Backends currently registered for dispatch.
    pub registered: Vec<BackendEntry>,
    pub simd_level: SimdLevel,
}

impl KernelCapabilities {
    /// Compile-time view with nothing registered yet.
    pub fn from_compile_time() -> Self {
        Self { compiled: compiled_devices(), registered: Vec::new(), simd_level: compile_time_simd_level() }
    }

    pub fn with_registered(mut self, registered: Vec<BackendEntry>) -> Self {
        self.registered = registered;
        self
    }

    /// Returns true if `device` has a registered, available backend.
    pub fn supports(&self, device: DeviceType) -> bool {
        self.registered.iter().any(|b| b.device == device && b.available)
    }

    /// One-line summary for logs, e.g. `simd=avx2 backends=[cpu:cpu-reference]`.
    pub fn summary(&self) -> String {
        let backends: Vec<String> =
            self.registered.iter().map(|b| format!("{}:{}", b.device, b.name)).collect();
        format!("simd={} backends=[{}]", self.simd_level, backends.join(","))
    }
}

/// Device families whose backends are compiled into this build.
pub fn compiled_devices() -> Vec<DeviceType> {
    let mut devices = Vec::new();
    if cfg!(feature = "cpu") {
        devices.push(DeviceType::Cpu);
    }
    devices
}

/// Best SIMD level available at compile time.
pub const fn compile_time_simd_level() -> SimdLevel {
    #[cfg(target_feature = "avx512f")]
    return SimdLevel::Avx512;
    #[cfg(all(target_feature = "avx2", not(target_feature = "avx512f")))]
    return SimdLevel::Avx2;
    #[cfg(all(target_feature = "sse4.2", not(target_feature = "avx2")))]
    return SimdLevel::Sse42;
    #[cfg(all(target_arch = "aarch64", not(target_feature = "sse4.2")))]
    return SimdLevel::Neon;
    #[cfg(not(any(
        target_feature = "avx512f",
        target_feature = "avx2",
        target_feature = "sse4.2",
        target_arch = "aarch64",
    )))]
    SimdLevel::Scalar
}
