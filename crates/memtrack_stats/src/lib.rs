//! Device memory accounting for the memtrack layer
//!
//! Tracks current and peak usage per memory type and per memory heap of a device from the stream of
//! `vkAllocateMemory` and `vkFreeMemory` calls, and renders the report printed when the device is
//! destroyed.

mod report;
mod stats;
mod tracker;

pub use report::{HeapReport, MemoryReport, TypeReport};
pub use stats::{DeviceStats, MemoryHeapInfo, MemoryTypeInfo, Usage};
pub use tracker::{AllocationRecord, DeviceTracker};
