//! AWQ dequantization descriptor: create once, execute many times

use super::info::AwqDequantizeInfo;
use crate::element::{FloatSlice, FloatSliceMut};
use crate::registry::{KernelRegistry, default_registry};
use crate::{BackendState, KernelProvider, Stream};
use std::fmt;
use std::sync::Arc;
use tensorop_common::{DeviceType, Handle, OpError, Result, TensorDesc, TensorRole};

/// Buffers for one execution, already checked against the descriptor.
pub struct AwqDequantizeArgs<'a> {
    pub workspace: &'a mut [u8],
    pub y: FloatSliceMut<'a>,
    pub qweight: &'a [i32],
    pub zeros: &'a [i32],
    pub scales: FloatSlice<'a>,
    pub stream: Stream,
}

/// A validated AWQ dequantization configuration bound to one backend.
pub struct AwqDequantizeDescriptor {
    info: AwqDequantizeInfo,
    device: DeviceType,
    device_id: i32,
    workspace_size: usize,
    backend: Arc<dyn KernelProvider>,
    state: Option<BackendState>,
}

impl AwqDequantizeDescriptor {
    /// Create against the process-wide registry.
    pub fn create(
        handle: &Handle,
        y: &TensorDesc,
        qweight: &TensorDesc,
        zeros: &TensorDesc,
        scales: &TensorDesc,
        group_size: usize,
    ) -> Result<Self> {
        Self::create_in(default_registry(), handle, y, qweight, zeros, scales, group_size)
    }

    /// Create against an explicit registry. Nothing is allocated when any
    /// check fails.
    pub fn create_in(
        registry: &KernelRegistry,
        handle: &Handle,
        y: &TensorDesc,
        qweight: &TensorDesc,
        zeros: &TensorDesc,
        scales: &TensorDesc,
        group_size: usize,
    ) -> Result<Self> {
        let backend = registry.lookup(handle.device)?;
        let info =
            AwqDequantizeInfo::create_with_policy(y, qweight, zeros, scales, group_size, registry.config().packing)?;
        let prepared = backend.prepare_awq_dequantize(handle, &info)?;

        log::debug!(
            "created awq dequantize descriptor on {}:{} via {} (n={}, m={}, group_size={}, {}<-{}, workspace={}B)",
            handle.device,
            handle.device_id,
            backend.name(),
            info.n,
            info.m,
            info.group_size,
            info.data_type,
            info.scale_type,
            prepared.workspace_size
        );

        Ok(Self {
            info,
            device: handle.device,
            device_id: handle.device_id,
            workspace_size: prepared.workspace_size,
            backend,
            state: Some(prepared.state),
        })
    }

    pub fn info(&self) -> &AwqDequantizeInfo {
        &self.info
    }

    /// Scratch bytes `calculate` requires.
    pub fn workspace_size(&self) -> usize {
        self.workspace_size
    }

    pub fn device(&self) -> DeviceType {
        self.device
    }

    pub fn device_id(&self) -> i32 {
        self.device_id
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Dequantize into `y`. The workspace is overwritten; `qweight`, `zeros`
    /// and `scales` are only read.
    pub fn calculate(
        &self,
        workspace: &mut [u8],
        y: FloatSliceMut<'_>,
        qweight: &[i32],
        zeros: &[i32],
        scales: FloatSlice<'_>,
        stream: Stream,
    ) -> Result<()> {
        if workspace.len() < self.workspace_size {
            return Err(OpError::InsufficientWorkspace { required: self.workspace_size, provided: workspace.len() });
        }
        if y.dtype() != self.info.data_type {
            return Err(OpError::BadTensorDtype {
                tensor: TensorRole::Y,
                got: y.dtype(),
                expected: self.info.data_type.name(),
            });
        }
        if scales.dtype() != self.info.scale_type {
            return Err(OpError::BadTensorDtype {
                tensor: TensorRole::Scales,
                got: scales.dtype(),
                expected: self.info.scale_type.name(),
            });
        }
        check_len("y", y.len(), self.info.y_len())?;
        check_len("qweight", qweight.len(), self.info.qweight_len())?;
        check_len("zeros", zeros.len(), self.info.zeros_len())?;
        check_len("scales", scales.len(), self.info.scales_len())?;

        let state = self
            .state
            .as_ref()
            .ok_or_else(|| OpError::ExecutionFailed { reason: "descriptor state already released".into() })?;
        self.backend.awq_dequantize(
            state,
            &self.info,
            AwqDequantizeArgs { workspace, y, qweight, zeros, scales, stream },
        )
    }
}

fn check_len(arg: &'static str, got: usize, need: usize) -> Result<()> {
    if got < need {
        return Err(OpError::param(arg, format!("buffer holds {got} elements, need {need}")));
    }
    Ok(())
}

impl Drop for AwqDequantizeDescriptor {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.backend.release(state);
        }
        log::debug!("destroyed awq dequantize descriptor on {}:{}", self.device, self.device_id);
    }
}

impl fmt::Debug for AwqDequantizeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwqDequantizeDescriptor")
            .field("info", &self.info)
            .field("device", &self.device)
            .field("device_id", &self.device_id)
            .field("backend", &self.backend.name())
            .field("workspace_size", &self.workspace_size)
            .finish()
    }
}
