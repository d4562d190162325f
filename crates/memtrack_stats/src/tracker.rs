use std::collections::HashMap;

use ash::vk::{self, Handle};
use log::{trace, warn};
use memtrack_shared::LayerError;

use crate::{DeviceStats, MemoryReport};

/// What a live allocation was created with. `vkFreeMemory` only receives the handle, so the size
/// has to be remembered until then.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRecord {
    pub size: vk::DeviceSize,
    pub memory_type_index: u32,
}

/// Memory statistics and live allocations of one device
#[derive(Debug, Clone)]
pub struct DeviceTracker {
    stats: DeviceStats,
    allocations: HashMap<vk::DeviceMemory, AllocationRecord>,
}

impl DeviceTracker {
    pub fn new(stats: DeviceStats) -> Self {
        Self {
            stats,
            allocations: HashMap::new(),
        }
    }

    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    /// Number of allocations that were not freed yet
    pub fn live_allocations(&self) -> usize {
        self.allocations.len()
    }

    /// Accounts a successful allocation of `memory`.
    pub fn allocated(
        &mut self,
        memory: vk::DeviceMemory,
        record: AllocationRecord,
    ) -> Result<(), LayerError> {
        self.stats.validate(record.memory_type_index)?;

        if let Some(stale) = self.allocations.insert(memory, record) {
            // The driver handed out a handle that is still live. Drop the old allocation, so the
            // counters stay in line with the records.
            warn!(
                "Memory {:#x} was returned again while still allocated",
                memory.as_raw()
            );
            self.stats.free(stale.memory_type_index, stale.size)?;
        }
        self.stats
            .allocate(record.memory_type_index, record.size)?;
        trace!(
            "Allocated {} bytes of memory type {} as {:#x}",
            record.size,
            record.memory_type_index,
            memory.as_raw()
        );

        Ok(())
    }

    /// Accounts the release of `memory` and returns the record it was allocated with.
    pub fn freed(&mut self, memory: vk::DeviceMemory) -> Result<AllocationRecord, LayerError> {
        let record = self
            .allocations
            .remove(&memory)
            .ok_or(LayerError::UnknownAllocation(memory.as_raw()))?;
        self.stats.free(record.memory_type_index, record.size)?;
        trace!(
            "Freed {} bytes of memory type {} from {:#x}",
            record.size,
            record.memory_type_index,
            memory.as_raw()
        );

        Ok(record)
    }

    /// Summarizes the peak usage of the device.
    pub fn report(&self) -> MemoryReport {
        self.stats.report()
    }
}
