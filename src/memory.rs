use ash::vk;
use log::debug;
use memtrack_dispatch::HandleIdentity;
use memtrack_stats::AllocationRecord;

use crate::{OrFatal, layer};

/// `vkAllocateMemory` of the layer
///
/// Only allocations the next link reports as successful are accounted.
pub unsafe extern "system" fn allocate_memory(
    device: vk::Device,
    p_allocate_info: *const vk::MemoryAllocateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_memory: *mut vk::DeviceMemory,
) -> vk::Result {
    // SAFETY: The application passes a live device
    let key = unsafe { HandleIdentity::of(device) };
    let table = layer().device_dispatch(key).or_fatal(c"vkAllocateMemory");

    // SAFETY: Arguments are passed on unchanged
    let result = unsafe { (table.allocate_memory)(device, p_allocate_info, p_allocator, p_memory) };
    if result != vk::Result::SUCCESS {
        debug!("Allocation on {device:?} failed: {result}");
        return result;
    }

    // SAFETY: The allocation succeeded, so the allocate info was valid and the memory was written
    let (allocate_info, memory) = unsafe { (&*p_allocate_info, p_memory.read()) };
    let record = AllocationRecord {
        size: allocate_info.allocation_size,
        memory_type_index: allocate_info.memory_type_index,
    };
    layer()
        .record_allocation(device, memory, record)
        .or_fatal(c"vkAllocateMemory");

    result
}

/// `vkFreeMemory` of the layer
pub unsafe extern "system" fn free_memory(
    device: vk::Device,
    memory: vk::DeviceMemory,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    // SAFETY: The application passes a live device
    let key = unsafe { HandleIdentity::of(device) };
    let table = if memory == vk::DeviceMemory::null() {
        layer().device_dispatch(key)
    } else {
        layer().release_allocation(device, key, memory)
    }
    .or_fatal(c"vkFreeMemory");

    // SAFETY: Arguments are passed on unchanged
    unsafe { (table.free_memory)(device, memory, p_allocator) };
}
