//! Reference CPU backend
//!
//! Portable, rayon-parallel implementations that run on any architecture.
//! The AWQ path unpacks zero points into the workspace, then dequantizes
//! output rows in parallel.

use crate::awq::dequant::dequantize;
use crate::awq::unpack::unpack_and_reorder;
use crate::awq::{AwqDequantizeArgs, AwqDequantizeInfo};
use crate::element::{FloatSlice, FloatSliceMut};
use crate::{BackendState, KernelProvider, PreparedState};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tensorop_common::{DeviceType, Handle, OpError, Result, RuntimeConfig};

/// CPU backend that is always available.
///
/// Runs on a dedicated rayon pool when a worker count is configured and on
/// rayon's global pool otherwise. Descriptor state is empty.
#[derive(Default)]
pub struct CpuReferenceKernel {
    pool: Option<ThreadPool>,
}

impl CpuReferenceKernel {
    pub fn new(config: &RuntimeConfig) -> Self {
        let pool = config.num_threads.and_then(|threads| {
            match ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("tensorop-cpu-{i}"))
                .build()
            {
                Ok(pool) => {
                    log::debug!("cpu backend using a dedicated pool of {threads} threads");
                    Some(pool)
                }
                Err(e) => {
                    log::warn!("failed to build a {threads}-thread pool, using the global pool: {e}");
                    None
                }
            }
        });
        Self { pool }
    }

    /// Worker threads executions run on.
    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl KernelProvider for CpuReferenceKernel {
    fn name(&self) -> &'static str {
        "cpu-reference"
    }

    fn device(&self) -> DeviceType {
        DeviceType::Cpu
    }

    fn is_available(&self) -> bool {
        true
    }

    fn prepare_awq_dequantize(&self, _handle: &Handle, info: &AwqDequantizeInfo) -> Result<PreparedState> {
        Ok(PreparedState { state: Box::new(()), workspace_size: info.unpacked_zeros_len() })
    }

    fn awq_dequantize(
        &self,
        _state: &BackendState,
        info: &AwqDequantizeInfo,
        args: AwqDequantizeArgs<'_>,
    ) -> Result<()> {
        // The stream token has no meaning on the host.
        let AwqDequantizeArgs { workspace, y, qweight, zeros, scales, stream: _ } = args;

        let (required, provided) = (info.unpacked_zeros_len(), workspace.len());
        let workspace = workspace
            .get_mut(..required)
            .ok_or(OpError::InsufficientWorkspace { required, provided })?;
        let unpacked: &mut [i8] = bytemuck::cast_slice_mut(workspace);

        self.install(|| {
            unpack_and_reorder(
                zeros,
                info.zeros_n,
                info.zeros_m_packed,
                info.zeros_row_stride,
                unpacked,
                info.zeros_m,
            );
            let unpacked: &[i8] = unpacked;
            match (y, scales) {
                (FloatSliceMut::F16(y), FloatSlice::F16(s)) => dequantize(info, y, qweight, unpacked, s),
                (FloatSliceMut::F16(y), FloatSlice::F32(s)) => dequantize(info, y, qweight, unpacked, s),
                (FloatSliceMut::F32(y), FloatSlice::F16(s)) => dequantize(info, y, qweight, unpacked, s),
                (FloatSliceMut::F32(y), FloatSlice::F32(s)) => dequantize(info, y, qweight, unpacked, s),
            }
        });
        Ok(())
    }
}
