//! Thread-local last-error storage and the call guard used by every entry point

use std::cell::RefCell;
use std::ffi::{CString, c_int};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tensorop_common::{OpError, Status};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

pub fn set_last_error(message: impl Into<String>) {
    let message = message.into();
    let cstring = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(cstring));
}

pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Message of the most recent failure on this thread.
pub fn last_error_message() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map(|s| s.to_string_lossy().into_owned()))
}

/// Pointer to the last message, valid until the next failing call on this
/// thread. Null when the last call succeeded.
pub(crate) fn last_error_ptr() -> *const std::ffi::c_char {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(std::ptr::null(), |s| s.as_ptr()))
}

/// Run `body`, translating its error (or a panic) into a status code and
/// recording the message for `tensorop_get_last_error`.
pub(crate) fn guarded(entry: &'static str, body: impl FnOnce() -> Result<(), OpError>) -> c_int {
    clear_last_error();
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => Status::Success.code(),
        Ok(Err(err)) => {
            log::warn!("{entry} rejected: {err}");
            set_last_error(err.to_string());
            err.status().code()
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::warn!("{entry} panicked: {reason}");
            set_last_error(format!("internal error in {entry}: {reason}"));
            Status::InternalError.code()
        }
    }
}
