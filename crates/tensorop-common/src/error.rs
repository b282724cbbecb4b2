//! Error taxonomy and status codes shared by every layer
//!
//! `OpError` is what the Rust API returns. `Status` is the flat code that
//! crosses the C boundary; every error maps to exactly one status.

use crate::types::{DType, DeviceType};
use std::fmt;
use thiserror::Error;

/// Result type used throughout tensorop
pub type Result<T> = std::result::Result<T, OpError>;

/// Which tensor of an operator an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorRole {
    Y,
    QWeight,
    Zeros,
    Scales,
    Workspace,
}

impl fmt::Display for TensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TensorRole::Y => "y",
            TensorRole::QWeight => "qweight",
            TensorRole::Zeros => "zeros",
            TensorRole::Scales => "scales",
            TensorRole::Workspace => "workspace",
        };
        f.write_str(s)
    }
}

/// Operator errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpError {
    #[error("bad tensor dtype for {tensor}: got {got}, expected {expected}")]
    BadTensorDtype { tensor: TensorRole, got: DType, expected: &'static str },

    #[error("unsupported dtype combination: data={data}, scale={scale}")]
    UnsupportedDtypePair { data: DType, scale: DType },

    #[error("bad tensor shape: {reason}")]
    BadTensorShape { reason: String },

    #[error("bad tensor strides for {tensor}: {reason}")]
    BadTensorStrides { tensor: TensorRole, reason: String },

    #[error("device type {device} has no registered backend")]
    DeviceTypeNotSupported { device: DeviceType },

    #[error("workspace too small: need {required} bytes, got {provided}")]
    InsufficientWorkspace { required: usize, provided: usize },

    #[error("invalid argument '{arg}': {reason}")]
    BadParam { arg: &'static str, reason: String },

    #[error("null pointer passed for '{arg}'")]
    NullPointer { arg: &'static str },

    #[error("out of memory: {reason}")]
    OutOfMemory { reason: String },

    #[error("backend execution failed: {reason}")]
    ExecutionFailed { reason: String },
}

impl OpError {
    pub fn shape(reason: impl Into<String>) -> Self {
        OpError::BadTensorShape { reason: reason.into() }
    }

    pub fn strides(tensor: TensorRole, reason: impl Into<String>) -> Self {
        OpError::BadTensorStrides { tensor, reason: reason.into() }
    }

    pub fn param(arg: &'static str, reason: impl Into<String>) -> Self {
        OpError::BadParam { arg, reason: reason.into() }
    }

    /// Status code this error is reported as.
    pub fn status(&self) -> Status {
        Status::from(self)
    }
}

/// Flat status codes. Values are part of the C ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    InternalError = -1,
    BadParam = -2,
    NullPointer = -3,
    DeviceTypeNotSupported = -4,
    BadTensorDtype = -5,
    BadTensorShape = -6,
    BadTensorStrides = -7,
    InsufficientWorkspace = -8,
    OutOfMemory = -9,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl From<&OpError> for Status {
    fn from(err: &OpError) -> Self {
        match err {
            OpError::BadTensorDtype { .. } | OpError::UnsupportedDtypePair { .. } => {
                Status::BadTensorDtype
            }
            OpError::BadTensorShape { .. } => Status::BadTensorShape,
            OpError::BadTensorStrides { .. } => Status::BadTensorStrides,
            OpError::DeviceTypeNotSupported { .. } => Status::DeviceTypeNotSupported,
            OpError::InsufficientWorkspace { .. } => Status::InsufficientWorkspace,
            OpError::BadParam { .. } => Status::BadParam,
            OpError::NullPointer { .. } => Status::NullPointer,
            OpError::OutOfMemory { .. } => Status::OutOfMemory,
            OpError::ExecutionFailed { .. } => Status::InternalError,
        }
    }
}

impl From<OpError> for Status {
    fn from(err: OpError) -> Self {
        Status::from(&err)
    }
}

impl<T> From<&Result<T>> for Status {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::Success,
            Err(e) => Status::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_maps_to_a_failure_status() {
        let errors = [
            OpError::BadTensorDtype { tensor: TensorRole::Y, got: DType::I8, expected: "f16|f32" },
            OpError::UnsupportedDtypePair { data: DType::F64, scale: DType::F16 },
            OpError::shape("rank"),
            OpError::strides(TensorRole::Zeros, "inner stride 2"),
            OpError::DeviceTypeNotSupported { device: DeviceType::Kunlun },
            OpError::InsufficientWorkspace { required: 8, provided: 4 },
            OpError::param("group_size", "must be positive"),
            OpError::NullPointer { arg: "desc" },
            OpError::OutOfMemory { reason: "layout".into() },
            OpError::ExecutionFailed { reason: "boom".into() },
        ];
        for e in &errors {
            let status = e.status();
            assert!(!status.is_success(), "{e} mapped to success");
            assert!(status.code() < 0);
        }
    }

    #[test]
    fn dtype_errors_share_a_status() {
        let a = OpError::BadTensorDtype { tensor: TensorRole::Scales, got: DType::I32, expected: "f16|f32" };
        let b = OpError::UnsupportedDtypePair { data: DType::BF16, scale: DType::F32 };
        assert_eq!(a.status(), Status::BadTensorDtype);
        assert_eq!(b.status(), Status::BadTensorDtype);
    }

    #[test]
    fn result_to_status() {
        let ok: Result<()> = Ok(());
        let err: Result<()> = Err(OpError::shape("n % group_size != 0"));
        assert_eq!(Status::from(&ok), Status::Success);
        assert_eq!(Status::from(&err), Status::BadTensorShape);
    }

    #[test]
    fn display_messages() {
        let e = OpError::InsufficientWorkspace { required: 64, provided: 32 };
        insta::assert_snapshot!(e.to_string(), @"workspace too small: need 64 bytes, got 32");
        let e = OpError::DeviceTypeNotSupported { device: DeviceType::Ascend };
        insta::assert_snapshot!(e.to_string(), @"device type ascend has no registered backend");
    }
}
