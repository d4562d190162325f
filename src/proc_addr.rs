//! Entry point resolution
//!
//! Names the layer intercepts resolve to the layer's own functions. Everything else is resolved by
//! the next link, through the dispatch table of the handle the query was made for.

use std::ffi::{CStr, c_char};

use ash::vk;
use log::trace;
use memtrack_dispatch::HandleIdentity;

use crate::{
    MemTrack_EnumerateDeviceExtensionProperties, MemTrack_EnumerateDeviceLayerProperties,
    MemTrack_EnumerateInstanceExtensionProperties, MemTrack_EnumerateInstanceLayerProperties,
    MemTrack_GetDeviceProcAddr, MemTrack_GetInstanceProcAddr, OrFatal, device, instance, layer,
    memory,
};

/// The layer's function for a device level `name`, if the layer intercepts it
fn device_function(name: &CStr) -> vk::PFN_vkVoidFunction {
    match name.to_bytes() {
        b"vkGetDeviceProcAddr" => {
            void_function!(MemTrack_GetDeviceProcAddr, vk::PFN_vkGetDeviceProcAddr)
        }
        b"vkEnumerateDeviceLayerProperties" => void_function!(
            MemTrack_EnumerateDeviceLayerProperties,
            vk::PFN_vkEnumerateDeviceLayerProperties
        ),
        b"vkEnumerateDeviceExtensionProperties" => void_function!(
            MemTrack_EnumerateDeviceExtensionProperties,
            vk::PFN_vkEnumerateDeviceExtensionProperties
        ),
        b"vkCreateDevice" => void_function!(device::create_device, vk::PFN_vkCreateDevice),
        b"vkDestroyDevice" => void_function!(device::destroy_device, vk::PFN_vkDestroyDevice),
        b"vkAllocateMemory" => void_function!(memory::allocate_memory, vk::PFN_vkAllocateMemory),
        b"vkFreeMemory" => void_function!(memory::free_memory, vk::PFN_vkFreeMemory),
        _ => None,
    }
}

/// The layer's function for an instance level `name`, if the layer intercepts it
fn instance_function(name: &CStr) -> vk::PFN_vkVoidFunction {
    match name.to_bytes() {
        b"vkGetInstanceProcAddr" => {
            void_function!(MemTrack_GetInstanceProcAddr, vk::PFN_vkGetInstanceProcAddr)
        }
        b"vkEnumerateInstanceLayerProperties" => void_function!(
            MemTrack_EnumerateInstanceLayerProperties,
            vk::PFN_vkEnumerateInstanceLayerProperties
        ),
        b"vkEnumerateInstanceExtensionProperties" => void_function!(
            MemTrack_EnumerateInstanceExtensionProperties,
            vk::PFN_vkEnumerateInstanceExtensionProperties
        ),
        b"vkCreateInstance" => void_function!(instance::create_instance, vk::PFN_vkCreateInstance),
        b"vkDestroyInstance" => {
            void_function!(instance::destroy_instance, vk::PFN_vkDestroyInstance)
        }
        _ => device_function(name),
    }
}

pub unsafe fn get_instance_proc_addr(
    instance: vk::Instance,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    if p_name.is_null() {
        return None;
    }
    // SAFETY: The name is a valid C string per the API
    let name = unsafe { CStr::from_ptr(p_name) };
    if let function @ Some(_) = instance_function(name) {
        return function;
    }
    if instance == vk::Instance::null() {
        return None;
    }

    trace!("Forwarding {name:?} for {instance:?}");
    // SAFETY: The application passes a live instance
    let key = unsafe { HandleIdentity::of(instance) };
    let table = layer()
        .instance_dispatch(key)
        .or_fatal(c"vkGetInstanceProcAddr");
    // SAFETY: Arguments are passed on unchanged
    unsafe { (table.get_instance_proc_addr)(instance, p_name) }
}

pub unsafe fn get_device_proc_addr(
    device: vk::Device,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    if p_name.is_null() {
        return None;
    }
    // SAFETY: The name is a valid C string per the API
    let name = unsafe { CStr::from_ptr(p_name) };
    if let function @ Some(_) = device_function(name) {
        return function;
    }
    if device == vk::Device::null() {
        return None;
    }

    trace!("Forwarding {name:?} for {device:?}");
    // SAFETY: The application passes a live device
    let key = unsafe { HandleIdentity::of(device) };
    let table = layer().device_dispatch(key).or_fatal(c"vkGetDeviceProcAddr");
    // SAFETY: Arguments are passed on unchanged
    unsafe { (table.get_device_proc_addr)(device, p_name) }
}
