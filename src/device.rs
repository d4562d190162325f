use ash::vk;
use log::{debug, info, warn};
use memtrack_dispatch::{DeviceDispatch, HandleIdentity, NextDeviceLink, next_device_link};
use memtrack_shared::{LayerError, Scope};
use memtrack_stats::DeviceStats;

use crate::{OrFatal, layer, report, setup_failure};

/// `vkCreateDevice` of the layer
///
/// Creates the device through the next link, captures its dispatch table and sets up zeroed memory
/// statistics sized to the physical device's memory topology.
pub unsafe extern "system" fn create_device(
    physical_device: vk::PhysicalDevice,
    p_create_info: *const vk::DeviceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_device: *mut vk::Device,
) -> vk::Result {
    // SAFETY: The create info is valid or null
    let Some(create_info) = (unsafe { p_create_info.as_ref() }) else {
        return setup_failure(
            c"vkCreateDevice",
            &LayerError::MissingLinkInfo(Scope::Device),
        );
    };
    // SAFETY: The loader passes its own create info
    let next = match unsafe { next_device_link(create_info) } {
        Ok(next) => next,
        Err(err) => return setup_failure(c"vkCreateDevice", &err),
    };
    let create = match next.create_device() {
        Ok(create) => create,
        Err(err) => return setup_failure(c"vkCreateDevice", &err),
    };

    // SAFETY: Arguments are passed on unchanged, with our link taken out of the chain
    let result = unsafe { create(physical_device, p_create_info, p_allocator, p_device) };
    if result != vk::Result::SUCCESS {
        debug!("Next link failed to create a device: {result}");
        return result;
    }
    // SAFETY: The next link wrote the new device
    let device = unsafe { p_device.read() };

    // SAFETY: The device was just created on `physical_device` by `next`
    match unsafe { install(physical_device, device, &next) } {
        Ok(()) => {
            info!("Created device {device:?} on {physical_device:?}");
            vk::Result::SUCCESS
        }
        Err(err) => {
            // SAFETY: The device was created by the next link and is unknown to the application
            match unsafe { next.destroy_device(device) } {
                // SAFETY: Same allocator as the creation
                Ok(destroy) => unsafe { destroy(device, p_allocator) },
                Err(destroy_err) => warn!("Leaking device {device:?}: {destroy_err}"),
            }
            // SAFETY: The application must not see the destroyed handle
            unsafe { p_device.write(vk::Device::null()) };
            setup_failure(c"vkCreateDevice", &err)
        }
    }
}

/// Captures the dispatch table and the memory topology of a new device and registers both.
///
/// # Safety
///
/// `device` must have just been created on `physical_device` by the next link behind `next`.
unsafe fn install(
    physical_device: vk::PhysicalDevice,
    device: vk::Device,
    next: &NextDeviceLink,
) -> Result<(), LayerError> {
    // SAFETY: Guaranteed by the caller
    let table = unsafe { DeviceDispatch::load(device, next.get_device_proc_addr) }?;
    // SAFETY: Guaranteed by the caller
    let properties = unsafe { memory_properties(physical_device, next) }?;
    let stats = DeviceStats::new(&properties);
    debug!(
        "Device {device:?} has {} memory types on {} heaps",
        stats.memory_types().len(),
        stats.memory_heaps().len()
    );

    // SAFETY: The device is a live dispatchable handle
    let key = unsafe { HandleIdentity::of(device) };
    layer().install_device(device, key, table, stats);
    Ok(())
}

/// Queries the memory topology of `physical_device`.
///
/// Goes through the dispatch table of the instance owning the physical device, or through the
/// device link if that instance was created without the layer.
///
/// # Safety
///
/// `physical_device` must be a live physical device of the chain behind `next`.
unsafe fn memory_properties(
    physical_device: vk::PhysicalDevice,
    next: &NextDeviceLink,
) -> Result<vk::PhysicalDeviceMemoryProperties, LayerError> {
    // SAFETY: Guaranteed by the caller
    let instance_key = unsafe { HandleIdentity::of(physical_device) };
    let get_memory_properties = match layer().instance_dispatch(instance_key) {
        Ok(table) => table.get_physical_device_memory_properties,
        Err(err) => {
            debug!("{err}, querying the memory topology through the device link");
            next.get_physical_device_memory_properties()?
        }
    };

    let mut properties = vk::PhysicalDeviceMemoryProperties::default();
    // SAFETY: `properties` is a valid output structure
    unsafe { get_memory_properties(physical_device, &mut properties) };
    Ok(properties)
}

/// `vkDestroyDevice` of the layer
///
/// Reports the peak memory usage of the device before the device goes away.
pub unsafe extern "system" fn destroy_device(
    device: vk::Device,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if device == vk::Device::null() {
        return;
    }

    // SAFETY: The application passes a live device
    let key = unsafe { HandleIdentity::of(device) };
    let (table, memory_report) = layer()
        .remove_device(device, key)
        .or_fatal(c"vkDestroyDevice");
    report::emit(device, &memory_report);

    // SAFETY: Arguments are passed on unchanged
    unsafe { (table.destroy_device)(device, p_allocator) };
    info!("Destroyed device {device:?}");
}
