//! memtrack: a Vulkan layer that records the peak memory usage of every device
//!
//! The layer sits between the application and the driver. Every call is forwarded unchanged, while
//! `vkAllocateMemory` and `vkFreeMemory` are accounted per memory type and heap. When a device is
//! destroyed, its peak usage is reported.
//!
//! The loader finds the layer through `manifest/VkLayer_memtrack.json`, which points it at the two
//! exported resolvers below.

use std::ffi::{CStr, c_char};

use ash::vk;
use log::{error, warn};
use memtrack_shared::LayerError;

/// Casts one of the layer's entry points to the untyped function pointer handed to the loader.
/// The signature is checked against `$pfn`.
macro_rules! void_function {
    ($function:expr, $pfn:ty) => {{
        let function: $pfn = $function;
        // SAFETY: The caller casts the pointer back to `$pfn` before calling it
        Some(unsafe { std::mem::transmute::<$pfn, unsafe extern "system" fn()>(function) })
    }};
}

mod device;
mod enumerate;
#[cfg(test)]
mod fake_driver;
mod instance;
mod layer;
mod logging;
mod memory;
mod proc_addr;
mod report;

pub use layer::{Layer, layer};

/// `vkGetInstanceProcAddr` of the layer
///
/// # Safety
///
/// Must be called by the loader or application as specified for `vkGetInstanceProcAddr`.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "system" fn MemTrack_GetInstanceProcAddr(
    instance: vk::Instance,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    // SAFETY: Forwarded from the caller
    unsafe { proc_addr::get_instance_proc_addr(instance, p_name) }
}

/// `vkGetDeviceProcAddr` of the layer
///
/// # Safety
///
/// Must be called by the loader or application as specified for `vkGetDeviceProcAddr`.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "system" fn MemTrack_GetDeviceProcAddr(
    device: vk::Device,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    // SAFETY: Forwarded from the caller
    unsafe { proc_addr::get_device_proc_addr(device, p_name) }
}

/// `vkEnumerateInstanceLayerProperties` of the layer
///
/// # Safety
///
/// Must be called as specified for `vkEnumerateInstanceLayerProperties`.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "system" fn MemTrack_EnumerateInstanceLayerProperties(
    p_property_count: *mut u32,
    p_properties: *mut vk::LayerProperties,
) -> vk::Result {
    // SAFETY: Forwarded from the caller
    unsafe { enumerate::enumerate_instance_layer_properties(p_property_count, p_properties) }
}

/// `vkEnumerateInstanceExtensionProperties` of the layer
///
/// # Safety
///
/// Must be called as specified for `vkEnumerateInstanceExtensionProperties`.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "system" fn MemTrack_EnumerateInstanceExtensionProperties(
    p_layer_name: *const c_char,
    p_property_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    // SAFETY: Forwarded from the caller
    unsafe {
        enumerate::enumerate_instance_extension_properties(
            p_layer_name,
            p_property_count,
            p_properties,
        )
    }
}

/// `vkEnumerateDeviceLayerProperties` of the layer
///
/// # Safety
///
/// Must be called as specified for `vkEnumerateDeviceLayerProperties`.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "system" fn MemTrack_EnumerateDeviceLayerProperties(
    physical_device: vk::PhysicalDevice,
    p_property_count: *mut u32,
    p_properties: *mut vk::LayerProperties,
) -> vk::Result {
    // SAFETY: Forwarded from the caller
    unsafe {
        enumerate::enumerate_device_layer_properties(physical_device, p_property_count, p_properties)
    }
}

/// `vkEnumerateDeviceExtensionProperties` of the layer
///
/// # Safety
///
/// Must be called as specified for `vkEnumerateDeviceExtensionProperties`.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "system" fn MemTrack_EnumerateDeviceExtensionProperties(
    physical_device: vk::PhysicalDevice,
    p_layer_name: *const c_char,
    p_property_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    // SAFETY: Forwarded from the caller
    unsafe {
        enumerate::enumerate_device_extension_properties(
            physical_device,
            p_layer_name,
            p_property_count,
            p_properties,
        )
    }
}

/// Turns layer faults inside an entry point into the behavior the Vulkan ABI allows.
trait OrFatal<T> {
    /// Returns the value, or aborts the process if the layer's bookkeeping is broken.
    fn or_fatal(self, entry_point: &CStr) -> T;
}

impl<T> OrFatal<T> for Result<T, LayerError> {
    fn or_fatal(self, entry_point: &CStr) -> T {
        match self {
            Ok(value) => value,
            Err(err) => fatal(entry_point, &err),
        }
    }
}

/// Aborts after an internal consistency fault. Unwinding through the C ABI is not an option, and
/// carrying on would forward calls through the wrong tables.
#[cold]
fn fatal(entry_point: &CStr, err: &LayerError) -> ! {
    error!("Fatal error in {entry_point:?}: {err}");
    eprintln!("memtrack: fatal error in {entry_point:?}: {err}");
    std::process::abort()
}

/// Result code for a failed chain setup, aborting if the fault can't be reported.
fn setup_failure(entry_point: &CStr, err: &LayerError) -> vk::Result {
    match err.to_vk_result() {
        Some(result) => {
            warn!("{entry_point:?} failed: {err}");
            result
        }
        None => fatal(entry_point, err),
    }
}
