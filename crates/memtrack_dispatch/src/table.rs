//! Dispatch tables: the entry points of the next link the layer forwards to

use std::ffi::{CStr, c_char};
use std::mem;

use ash::vk;
use log::debug;
use memtrack_shared::LayerError;

/// Casts a resolved entry point to its typed function pointer.
///
/// # Safety
///
/// `F` must be the function pointer type matching `name`.
pub(crate) unsafe fn cast_function<F: Copy>(
    function: vk::PFN_vkVoidFunction,
    name: &'static CStr,
) -> Result<F, LayerError> {
    debug_assert_eq!(
        mem::size_of::<F>(),
        mem::size_of::<unsafe extern "system" fn()>()
    );
    let Some(function) = function else {
        return Err(LayerError::MissingEntryPoint(name));
    };
    // SAFETY: All Vulkan entry points are function pointers of the same size, and the caller
    // guarantees `F` is the right signature
    Ok(unsafe { mem::transmute_copy::<unsafe extern "system" fn(), F>(&function) })
}

/// Resolves `name` through `resolve`.
///
/// # Safety
///
/// `F` must be the function pointer type matching `name`.
unsafe fn load<F: Copy>(
    resolve: impl Fn(*const c_char) -> vk::PFN_vkVoidFunction,
    name: &'static CStr,
) -> Result<F, LayerError> {
    // SAFETY: Forwarded from the caller
    unsafe { cast_function(resolve(name.as_ptr()), name) }
}

/// Instance level entry points of the next link, captured when the instance is created
#[derive(Clone, Copy)]
pub struct InstanceDispatch {
    pub get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub destroy_instance: vk::PFN_vkDestroyInstance,
    pub enumerate_device_extension_properties: vk::PFN_vkEnumerateDeviceExtensionProperties,
    pub get_physical_device_memory_properties: vk::PFN_vkGetPhysicalDeviceMemoryProperties,
}

impl InstanceDispatch {
    /// Resolves the table for `instance` through the next link's `vkGetInstanceProcAddr`.
    ///
    /// # Safety
    ///
    /// `instance` must have just been created by the next link behind `get_instance_proc_addr`.
    pub unsafe fn load(
        instance: vk::Instance,
        get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    ) -> Result<Self, LayerError> {
        // SAFETY: The name pointer comes from a C string literal
        let resolve = |name| unsafe { get_instance_proc_addr(instance, name) };

        // SAFETY: Every field type matches the entry point it is resolved for
        let table = unsafe {
            Self {
                get_instance_proc_addr: load(resolve, c"vkGetInstanceProcAddr")?,
                destroy_instance: load(resolve, c"vkDestroyInstance")?,
                enumerate_device_extension_properties: load(
                    resolve,
                    c"vkEnumerateDeviceExtensionProperties",
                )?,
                get_physical_device_memory_properties: load(
                    resolve,
                    c"vkGetPhysicalDeviceMemoryProperties",
                )?,
            }
        };
        debug!("Resolved instance dispatch table for {instance:?}");

        Ok(table)
    }
}

/// Device level entry points of the next link, captured when the device is created
#[derive(Clone, Copy)]
pub struct DeviceDispatch {
    pub get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    pub destroy_device: vk::PFN_vkDestroyDevice,
    pub allocate_memory: vk::PFN_vkAllocateMemory,
    pub free_memory: vk::PFN_vkFreeMemory,
}

impl DeviceDispatch {
    /// Resolves the table for `device` through the next link's `vkGetDeviceProcAddr`.
    ///
    /// # Safety
    ///
    /// `device` must have just been created by the next link behind `get_device_proc_addr`.
    pub unsafe fn load(
        device: vk::Device,
        get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    ) -> Result<Self, LayerError> {
        // SAFETY: The name pointer comes from a C string literal
        let resolve = |name| unsafe { get_device_proc_addr(device, name) };

        // SAFETY: Every field type matches the entry point it is resolved for
        let table = unsafe {
            Self {
                get_device_proc_addr: load(resolve, c"vkGetDeviceProcAddr")?,
                destroy_device: load(resolve, c"vkDestroyDevice")?,
                allocate_memory: load(resolve, c"vkAllocateMemory")?,
                free_memory: load(resolve, c"vkFreeMemory")?,
            }
        };
        debug!("Resolved device dispatch table for {device:?}");

        Ok(table)
    }
}
