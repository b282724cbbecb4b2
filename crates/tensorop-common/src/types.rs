//! Element types, device families and the device handle

use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a tensor.
///
/// Discriminants are part of the C ABI and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum DType {
    U8 = 0,
    I8 = 1,
    I16 = 2,
    I32 = 3,
    I64 = 4,
    F16 = 5,
    BF16 = 6,
    F32 = 7,
    F64 = 8,
}

impl DType {
    /// Every dtype, in discriminant order.
    pub const ALL: [DType; 9] = [
        DType::U8,
        DType::I8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::F16,
        DType::BF16,
        DType::F32,
        DType::F64,
    ];

    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DType::U8 | DType::I8 => 1,
            DType::I16 | DType::F16 | DType::BF16 => 2,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }

    /// Decode a raw C discriminant.
    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|d| *d as i32 == raw)
    }

    pub const fn name(self) -> &'static str {
        match self {
            DType::U8 => "u8",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.name() == lower)
            .ok_or_else(|| format!("unknown dtype '{s}'"))
    }
}

/// Device family a handle targets.
///
/// Discriminants are part of the C ABI and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum DeviceType {
    Cpu = 0,
    Nvidia = 1,
    Cambricon = 2,
    Ascend = 3,
    Metax = 4,
    Moore = 5,
    Iluvatar = 6,
    Kunlun = 7,
}

impl DeviceType {
    pub const ALL: [DeviceType; 8] = [
        DeviceType::Cpu,
        DeviceType::Nvidia,
        DeviceType::Cambricon,
        DeviceType::Ascend,
        DeviceType::Metax,
        DeviceType::Moore,
        DeviceType::Iluvatar,
        DeviceType::Kunlun,
    ];

    /// Decode a raw C discriminant.
    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|d| *d as i32 == raw)
    }

    /// Returns true if the device executes on a separate accelerator.
    pub fn is_accelerator(self) -> bool {
        !matches!(self, DeviceType::Cpu)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceType::Cpu => "cpu",
            DeviceType::Nvidia => "nvidia",
            DeviceType::Cambricon => "cambricon",
            DeviceType::Ascend => "ascend",
            DeviceType::Metax => "metax",
            DeviceType::Moore => "moore",
            DeviceType::Iluvatar => "iluvatar",
            DeviceType::Kunlun => "kunlun",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.to_string() == lower)
            .ok_or_else(|| format!("unknown device '{s}'"))
    }
}

/// Device context identifying which physical backend a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub device: DeviceType,
    pub device_id: i32,
}

impl Handle {
    pub fn new(device: DeviceType, device_id: i32) -> Self {
        Self { device, device_id }
    }

    pub fn cpu() -> Self {
        Self::new(DeviceType::Cpu, 0)
    }
}
