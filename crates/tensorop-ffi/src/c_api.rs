//! C entry points
//!
//! Every function returns a `c_int` status (0 on success, negative on
//! failure) and records a message retrievable with
//! `tensorop_get_last_error`. Objects are handed out as opaque pointers and
//! must be released with the matching `destroy` call exactly once.

use crate::error::{clear_last_error, guarded, last_error_ptr};
use half::f16;
use std::ffi::{c_char, c_int, c_uint, c_void};
use tensorop_common::{DType, DeviceType, Handle, OpError, Result, Status, TensorDesc};
use tensorop_kernels::{AwqDequantizeDescriptor, FloatSlice, FloatSliceMut, Stream, default_registry};

/// ABI version for compatibility checking
pub const TENSOROP_ABI_VERSION: u32 = 1;

pub const TENSOROP_STATUS_SUCCESS: c_int = Status::Success as c_int;
pub const TENSOROP_STATUS_INTERNAL_ERROR: c_int = Status::InternalError as c_int;
pub const TENSOROP_STATUS_BAD_PARAM: c_int = Status::BadParam as c_int;
pub const TENSOROP_STATUS_NULL_POINTER: c_int = Status::NullPointer as c_int;
pub const TENSOROP_STATUS_DEVICE_TYPE_NOT_SUPPORTED: c_int = Status::DeviceTypeNotSupported as c_int;
pub const TENSOROP_STATUS_BAD_TENSOR_DTYPE: c_int = Status::BadTensorDtype as c_int;
pub const TENSOROP_STATUS_BAD_TENSOR_SHAPE: c_int = Status::BadTensorShape as c_int;
pub const TENSOROP_STATUS_BAD_TENSOR_STRIDES: c_int = Status::BadTensorStrides as c_int;
pub const TENSOROP_STATUS_INSUFFICIENT_WORKSPACE: c_int = Status::InsufficientWorkspace as c_int;
pub const TENSOROP_STATUS_OUT_OF_MEMORY: c_int = Status::OutOfMemory as c_int;

/// Opaque handle types as seen from C.
pub type TensorOpHandle = Handle;
pub type TensorOpTensorDescriptor = TensorDesc;
pub type TensorOpAwqDequantizeDescriptor = AwqDequantizeDescriptor;

#[unsafe(no_mangle)]
pub extern "C" fn tensorop_abi_version() -> c_uint {
    TENSOROP_ABI_VERSION
}

/// Null-terminated library version, valid for the lifetime of the program.
#[unsafe(no_mangle)]
pub extern "C" fn tensorop_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr().cast()
}

/// Message of the last failed call on this thread, or null.
#[unsafe(no_mangle)]
pub extern "C" fn tensorop_get_last_error() -> *const c_char {
    last_error_ptr()
}

#[unsafe(no_mangle)]
pub extern "C" fn tensorop_clear_last_error() {
    clear_last_error();
}

/// Returns 1 if a backend for `device` is registered and available.
#[unsafe(no_mangle)]
pub extern "C" fn tensorop_is_device_supported(device: c_int) -> c_int {
    DeviceType::from_raw(device).is_some_and(|d| default_registry().is_supported(d)) as c_int
}

// ---------------------------------------------------------------------------
// Handles and tensor descriptors
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn tensorop_create_handle(
    handle_out: *mut *mut TensorOpHandle,
    device: c_int,
    device_id: c_int,
) -> c_int {
    guarded("tensorop_create_handle", || {
        let out = non_null_mut(handle_out, "handle_out")?;
        let device = DeviceType::from_raw(device)
            .ok_or_else(|| OpError::param("device", format!("unknown device type {device}")))?;
        let handle = Box::new(Handle::new(device, device_id));
        // SAFETY: `out` is non-null and writable per the caller contract.
        unsafe { *out = Box::into_raw(handle) };
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tensorop_destroy_handle(handle: *mut TensorOpHandle) -> c_int {
    guarded("tensorop_destroy_handle", || {
        let handle = non_null_mut(handle, "handle")?;
        // SAFETY: created by `tensorop_create_handle`, destroyed once.
        drop(unsafe { Box::from_raw(handle) });
        Ok(())
    })
}

/// Describe a tensor. `strides` may be null for row-major contiguous layout;
/// otherwise it holds `ndim` element strides.
#[unsafe(no_mangle)]
pub extern "C" fn tensorop_create_tensor_descriptor(
    desc_out: *mut *mut TensorOpTensorDescriptor,
    ndim: usize,
    shape: *const usize,
    strides: *const isize,
    dtype: c_int,
) -> c_int {
    guarded("tensorop_create_tensor_descriptor", || {
        let out = non_null_mut(desc_out, "desc_out")?;
        let dtype =
            DType::from_raw(dtype).ok_or_else(|| OpError::param("dtype", format!("unknown dtype {dtype}")))?;
        // SAFETY: caller provides `ndim` readable elements when non-null.
        let shape = unsafe { raw_array(shape, ndim, "shape") }?;
        let desc = if strides.is_null() {
            TensorDesc::contiguous(dtype, shape)
        } else {
            // SAFETY: as above.
            let strides = unsafe { raw_array(strides, ndim, "strides") }?;
            TensorDesc::new(dtype, shape, strides)?
        };
        // SAFETY: `out` is non-null and writable.
        unsafe { *out = Box::into_raw(Box::new(desc)) };
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tensorop_destroy_tensor_descriptor(desc: *mut TensorOpTensorDescriptor) -> c_int {
    guarded("tensorop_destroy_tensor_descriptor", || {
        let desc = non_null_mut(desc, "desc")?;
        // SAFETY: created by `tensorop_create_tensor_descriptor`, destroyed once.
        drop(unsafe { Box::from_raw(desc) });
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// AWQ dequantization
// ---------------------------------------------------------------------------

/// Validate the four tensor descriptors and bind them to the backend for
/// `handle`'s device. Nothing is allocated on failure.
#[unsafe(no_mangle)]
pub extern "C" fn tensorop_create_awq_dequantize_descriptor(
    handle: *const TensorOpHandle,
    desc_out: *mut *mut TensorOpAwqDequantizeDescriptor,
    y: *const TensorOpTensorDescriptor,
    qweight: *const TensorOpTensorDescriptor,
    zeros: *const TensorOpTensorDescriptor,
    scales: *const TensorOpTensorDescriptor,
    group_size: c_int,
) -> c_int {
    guarded("tensorop_create_awq_dequantize_descriptor", || {
        let out = non_null_mut(desc_out, "desc_out")?;
        // SAFETY: non-null pointers are live objects created by this library.
        let (handle, y, qweight, zeros, scales) = unsafe {
            (
                deref(handle, "handle")?,
                deref(y, "y")?,
                deref(qweight, "qweight")?,
                deref(zeros, "zeros")?,
                deref(scales, "scales")?,
            )
        };
        let group_size = usize::try_from(group_size)
            .map_err(|_| OpError::param("group_size", format!("must be positive, got {group_size}")))?;
        let desc = AwqDequantizeDescriptor::create(handle, y, qweight, zeros, scales, group_size)?;
        // SAFETY: `out` is non-null and writable.
        unsafe { *out = Box::into_raw(Box::new(desc)) };
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tensorop_get_awq_dequantize_workspace_size(
    desc: *const TensorOpAwqDequantizeDescriptor,
    size_out: *mut usize,
) -> c_int {
    guarded("tensorop_get_awq_dequantize_workspace_size", || {
        let out = non_null_mut(size_out, "size_out")?;
        // SAFETY: live descriptor.
        let desc = unsafe { deref(desc, "desc") }?;
        // SAFETY: `out` is non-null and writable.
        unsafe { *out = desc.workspace_size() };
        Ok(())
    })
}

/// Dequantize into `y`. Buffer element counts are taken from the
/// descriptor; `y` and `scales` hold the dtypes the descriptor was created
/// with, `qweight` and `zeros` hold `int32_t`.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn tensorop_awq_dequantize(
    desc: *const TensorOpAwqDequantizeDescriptor,
    workspace: *mut c_void,
    workspace_size: usize,
    y: *mut c_void,
    qweight: *const c_void,
    zeros: *const c_void,
    scales: *const c_void,
    stream: *mut c_void,
) -> c_int {
    guarded("tensorop_awq_dequantize", || {
        // SAFETY: live descriptor.
        let desc = unsafe { deref(desc, "desc") }?;
        let info = desc.info();

        // SAFETY: each buffer is valid for the byte count derived from the
        // descriptor, per the caller contract.
        unsafe {
            let workspace = bytes_mut(workspace, workspace_size, "workspace")?;
            let qweight: &[i32] = typed(qweight, info.qweight_len(), "qweight")?;
            let zeros: &[i32] = typed(zeros, info.zeros_len(), "zeros")?;
            let y = match info.data_type {
                DType::F16 => FloatSliceMut::F16(typed_mut::<f16>(y, info.y_len(), "y")?),
                DType::F32 => FloatSliceMut::F32(typed_mut::<f32>(y, info.y_len(), "y")?),
                data => return Err(OpError::UnsupportedDtypePair { data, scale: info.scale_type }),
            };
            let scales = match info.scale_type {
                DType::F16 => FloatSlice::F16(typed::<f16>(scales, info.scales_len(), "scales")?),
                DType::F32 => FloatSlice::F32(typed::<f32>(scales, info.scales_len(), "scales")?),
                scale => return Err(OpError::UnsupportedDtypePair { data: info.data_type, scale }),
            };
            desc.calculate(workspace, y, qweight, zeros, scales, Stream::from_raw(stream))
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tensorop_destroy_awq_dequantize_descriptor(desc: *mut TensorOpAwqDequantizeDescriptor) -> c_int {
    guarded("tensorop_destroy_awq_dequantize_descriptor", || {
        let desc = non_null_mut(desc, "desc")?;
        // SAFETY: created by `tensorop_create_awq_dequantize_descriptor`, destroyed once.
        drop(unsafe { Box::from_raw(desc) });
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Pointer helpers
// ---------------------------------------------------------------------------

fn non_null_mut<T>(ptr: *mut T, arg: &'static str) -> Result<*mut T> {
    if ptr.is_null() { Err(OpError::NullPointer { arg }) } else { Ok(ptr) }
}

unsafe fn deref<'a, T>(ptr: *const T, arg: &'static str) -> Result<&'a T> {
    // SAFETY: forwarded to the caller.
    unsafe { ptr.as_ref() }.ok_or(OpError::NullPointer { arg })
}

unsafe fn raw_array<'a, T>(ptr: *const T, len: usize, arg: &'static str) -> Result<&'a [T]> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(OpError::NullPointer { arg });
    }
    // SAFETY: forwarded to the caller.
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}

unsafe fn bytes_mut<'a>(ptr: *mut c_void, len: usize, arg: &'static str) -> Result<&'a mut [u8]> {
    if len == 0 {
        return Ok(&mut []);
    }
    if ptr.is_null() {
        return Err(OpError::NullPointer { arg });
    }
    // SAFETY: forwarded to the caller.
    Ok(unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), len) })
}

// A slice may not cover more than `isize::MAX` bytes.
fn byte_len<T>(len: usize, arg: &'static str) -> Result<usize> {
    len.checked_mul(size_of::<T>())
        .filter(|&bytes| bytes <= isize::MAX as usize)
        .ok_or_else(|| OpError::param(arg, format!("{len} elements exceed the addressable byte range")))
}

/// Reinterpret `len` elements at `ptr`, rejecting misaligned buffers.
unsafe fn typed<'a, T: bytemuck::Pod>(ptr: *const c_void, len: usize, arg: &'static str) -> Result<&'a [T]> {
    if len == 0 {
        return Ok(&[]);
    }
    // SAFETY: forwarded to the caller.
    let bytes = unsafe { raw_array(ptr.cast::<u8>(), byte_len::<T>(len, arg)?, arg) }?;
    bytemuck::try_cast_slice(bytes).map_err(|e| OpError::param(arg, format!("buffer is not usable as {len} elements: {e}")))
}

unsafe fn typed_mut<'a, T: bytemuck::Pod>(ptr: *mut c_void, len: usize, arg: &'static str) -> Result<&'a mut [T]> {
    if len == 0 {
        return Ok(&mut []);
    }
    // SAFETY: forwarded to the caller.
    let bytes = unsafe { bytes_mut(ptr, byte_len::<T>(len, arg)?, arg) }?;
    bytemuck::try_cast_slice_mut(bytes)
        .map_err(|e| OpError::param(arg, format!("buffer is not usable as {len} elements: {e}")))
}
