use std::fmt;

use ash::vk;

/// Peak usage of one memory type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeReport {
    pub index: usize,
    pub heap_index: u32,
    pub maximum_usage: vk::DeviceSize,
}

/// Peak usage of one memory heap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapReport {
    pub index: usize,
    pub device_local: bool,
    pub maximum_usage: vk::DeviceSize,
}

/// Peak memory usage of a device, produced when the device is destroyed.
///
/// The [`Display`](fmt::Display) implementation renders the line oriented report:
///
/// ```text
/// Maximum usage by memory type index:
///    0: 67108864 bytes (heap 0)
/// Maximum usage by memory heap:
///    0: 67108864 bytes
/// Maximum device memory: 67108864 bytes
/// Maximum host memory: 0 bytes
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryReport {
    pub types: Vec<TypeReport>,
    pub heaps: Vec<HeapReport>,
    /// Sum of the peak usage of all device local heaps
    pub device_local_total: vk::DeviceSize,
    /// Sum of the peak usage of all other heaps
    pub host_total: vk::DeviceSize,
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Maximum usage by memory type index:")?;
        for memory_type in &self.types {
            writeln!(
                f,
                " {:>3}: {} bytes (heap {})",
                memory_type.index, memory_type.maximum_usage, memory_type.heap_index
            )?;
        }

        writeln!(f, "Maximum usage by memory heap:")?;
        for heap in &self.heaps {
            writeln!(f, " {:>3}: {} bytes", heap.index, heap.maximum_usage)?;
        }

        writeln!(f, "Maximum device memory: {} bytes", self.device_local_total)?;
        writeln!(f, "Maximum host memory: {} bytes", self.host_total)
    }
}
