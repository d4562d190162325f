use std::ffi::CStr;

use ash::vk;
use thiserror::Error;

use crate::Scope;

/// Faults the layer can run into while servicing a call.
///
/// Only [`LayerError::MissingLinkInfo`] and [`LayerError::MissingEntryPoint`] can be reported back to
/// the application. Everything else means the application broke the API contract (called through a
/// destroyed handle, freed memory twice, ...) and the layer's bookkeeping can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    #[error("no loader link info in the {0} create info chain")]
    MissingLinkInfo(Scope),
    #[error("next link in the chain does not provide {0:?}")]
    MissingEntryPoint(&'static CStr),
    #[error("no {scope} dispatch table registered for key {key:#x}")]
    MissingDispatchTable { scope: Scope, key: usize },
    #[error("no memory statistics registered for device {0:#x}")]
    MissingDeviceStats(u64),
    #[error("memory {0:#x} has no live allocation record")]
    UnknownAllocation(u64),
    #[error("memory type index {index} is out of range ({count} memory types)")]
    MemoryTypeOutOfRange { index: u32, count: usize },
    #[error("memory heap index {index} is out of range ({count} memory heaps)")]
    MemoryHeapOutOfRange { index: u32, count: usize },
}

impl LayerError {
    /// The result code to hand back to the application, or `None` if the fault is not recoverable.
    pub fn to_vk_result(&self) -> Option<vk::Result> {
        match self {
            LayerError::MissingLinkInfo(_) | LayerError::MissingEntryPoint(_) => {
                Some(vk::Result::ERROR_INITIALIZATION_FAILED)
            }
            _ => None,
        }
    }
}
