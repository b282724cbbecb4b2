//! AWQ 4-bit dequantization operator
//!
//! Weights are stored eight 4-bit values per `i32`, in the nibble order given
//! by [`REVERSE_ORDER`]. Zero points share that packing; scales are stored
//! unpacked. Each `group_size` consecutive output rows share one row of zero
//! points and scales.

pub mod dequant;
pub mod descriptor;
pub mod info;
pub mod reference;
pub mod unpack;

pub use descriptor::{AwqDequantizeArgs, AwqDequantizeDescriptor};
pub use info::AwqDequantizeInfo;
pub use unpack::{PACK_FACTOR, REVERSE_ORDER, unpack_and_reorder, unpack_nibble};
