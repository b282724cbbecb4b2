//! Host workspace allocation for C callers

use crate::error::guarded;
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ffi::{c_int, c_void};
use std::ptr::NonNull;
use tensorop_common::{OpError, Result};

/// Alignment of every workspace handed out by `tensorop_workspace_alloc`.
pub const WORKSPACE_ALIGN: usize = 64;

/// Zeroed, 64-byte aligned host buffer.
pub struct AlignedWorkspace {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the buffer is uniquely owned.
unsafe impl Send for AlignedWorkspace {}

impl AlignedWorkspace {
    pub fn allocate(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(Self { ptr: NonNull::dangling(), len: 0 });
        }
        let layout = layout(len)?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| OpError::OutOfMemory { reason: format!("{len} byte workspace") })?;
        Ok(Self { ptr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for len bytes (or dangling with len 0).
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Give up ownership; null for an empty buffer.
    pub fn into_raw(self) -> *mut u8 {
        let ptr = if self.len == 0 { std::ptr::null_mut() } else { self.ptr.as_ptr() };
        std::mem::forget(self);
        ptr
    }

    /// # Safety
    /// `ptr` and `len` must come from one earlier `into_raw` call.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> Self {
        match NonNull::new(ptr) {
            Some(ptr) if len > 0 => Self { ptr, len },
            _ => Self { ptr: NonNull::dangling(), len: 0 },
        }
    }
}

impl Drop for AlignedWorkspace {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        if let Ok(layout) = layout(self.len) {
            // SAFETY: allocated in `allocate` with this exact layout.
            unsafe { dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

fn layout(len: usize) -> Result<Layout> {
    Layout::from_size_align(len, WORKSPACE_ALIGN)
        .map_err(|_| OpError::OutOfMemory { reason: format!("invalid layout for {len} bytes") })
}

/// Allocate `size` zeroed bytes aligned to 64. A zero size yields null.
#[unsafe(no_mangle)]
pub extern "C" fn tensorop_workspace_alloc(ptr_out: *mut *mut c_void, size: usize) -> c_int {
    guarded("tensorop_workspace_alloc", || {
        if ptr_out.is_null() {
            return Err(OpError::NullPointer { arg: "ptr_out" });
        }
        let raw = AlignedWorkspace::allocate(size)?.into_raw();
        // SAFETY: checked non-null above; caller provides a writable slot.
        unsafe { *ptr_out = raw.cast() };
        Ok(())
    })
}

/// Free a workspace from `tensorop_workspace_alloc`. `size` must match.
#[unsafe(no_mangle)]
pub extern "C" fn tensorop_workspace_free(ptr: *mut c_void, size: usize) -> c_int {
    guarded("tensorop_workspace_free", || {
        // SAFETY: caller contract; null is a no-op.
        drop(unsafe { AlignedWorkspace::from_raw(ptr.cast(), size) });
        Ok(())
    })
}
