//! C API bindings for tensorop
//!
//! Exposes handles, tensor descriptors and the AWQ dequantization operator
//! through a C ABI. The matching header lives in `include/tensorop.h`.

pub mod c_api;
pub mod error;
pub mod memory;

pub use c_api::*;
pub use error::{clear_last_error, last_error_message, set_last_error};
pub use memory::*;
