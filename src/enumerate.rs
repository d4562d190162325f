//! Layer and extension enumeration
//!
//! The layer exposes itself as a single layer without extensions. Queries about other layers are
//! answered the way the loader expects from a layer in the chain.

use std::ffi::{CStr, c_char};
use std::ptr;

use ash::vk;
use memtrack_dispatch::HandleIdentity;
use memtrack_shared::{
    LAYER_DESCRIPTION, LAYER_IMPLEMENTATION_VERSION, LAYER_NAME, LAYER_SPEC_VERSION,
    is_own_layer_name,
};

use crate::{OrFatal, layer};

fn copy_c_str(dst: &mut [c_char], src: &CStr) {
    let bytes = src.to_bytes_with_nul();
    debug_assert!(bytes.len() <= dst.len());
    for (dst, &src) in dst.iter_mut().zip(bytes) {
        *dst = src as c_char;
    }
}

fn layer_properties() -> vk::LayerProperties {
    let mut properties = vk::LayerProperties::default();
    copy_c_str(&mut properties.layer_name, LAYER_NAME);
    properties.spec_version = LAYER_SPEC_VERSION;
    properties.implementation_version = LAYER_IMPLEMENTATION_VERSION;
    copy_c_str(&mut properties.description, LAYER_DESCRIPTION);
    properties
}

/// Answers an enumeration query with `available`, following the Vulkan two call idiom.
///
/// # Safety
///
/// `p_count` must be valid, and `p_properties` null or valid for `*p_count` elements.
unsafe fn write_properties<T: Copy>(
    available: &[T],
    p_count: *mut u32,
    p_properties: *mut T,
) -> vk::Result {
    // SAFETY: Guaranteed by the caller
    let count = unsafe { &mut *p_count };
    if p_properties.is_null() {
        *count = available.len() as u32;
        return vk::Result::SUCCESS;
    }

    let written = (*count as usize).min(available.len());
    // SAFETY: The caller's array holds at least `*count` elements
    unsafe { ptr::copy_nonoverlapping(available.as_ptr(), p_properties, written) };
    *count = written as u32;
    if written < available.len() {
        vk::Result::INCOMPLETE
    } else {
        vk::Result::SUCCESS
    }
}

/// # Safety
///
/// `p_layer_name` must be null or a valid C string.
unsafe fn layer_name<'a>(p_layer_name: *const c_char) -> Option<&'a CStr> {
    // SAFETY: Guaranteed by the caller
    (!p_layer_name.is_null()).then(|| unsafe { CStr::from_ptr(p_layer_name) })
}

pub unsafe fn enumerate_instance_layer_properties(
    p_property_count: *mut u32,
    p_properties: *mut vk::LayerProperties,
) -> vk::Result {
    // SAFETY: Forwarded from the caller
    unsafe { write_properties(&[layer_properties()], p_property_count, p_properties) }
}

pub unsafe fn enumerate_device_layer_properties(
    _physical_device: vk::PhysicalDevice,
    p_property_count: *mut u32,
    p_properties: *mut vk::LayerProperties,
) -> vk::Result {
    // SAFETY: Forwarded from the caller
    unsafe { write_properties(&[layer_properties()], p_property_count, p_properties) }
}

pub unsafe fn enumerate_instance_extension_properties(
    p_layer_name: *const c_char,
    p_property_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    // SAFETY: Forwarded from the caller
    if !is_own_layer_name(unsafe { layer_name(p_layer_name) }) {
        return vk::Result::ERROR_LAYER_NOT_PRESENT;
    }
    // SAFETY: Forwarded from the caller
    unsafe { write_properties(&[], p_property_count, p_properties) }
}

/// Reports no extensions for this layer and forwards queries about anything else to the next
/// link.
pub unsafe fn enumerate_device_extension_properties(
    physical_device: vk::PhysicalDevice,
    p_layer_name: *const c_char,
    p_property_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    // SAFETY: Forwarded from the caller
    if is_own_layer_name(unsafe { layer_name(p_layer_name) }) {
        // SAFETY: Forwarded from the caller
        return unsafe { write_properties(&[], p_property_count, p_properties) };
    }

    if physical_device == vk::PhysicalDevice::null() {
        // SAFETY: The count is valid per the API
        if let Some(count) = unsafe { p_property_count.as_mut() } {
            *count = 0;
        }
        return vk::Result::SUCCESS;
    }

    // SAFETY: The application passes a live physical device
    let key = unsafe { HandleIdentity::of(physical_device) };
    let table = layer()
        .instance_dispatch(key)
        .or_fatal(c"vkEnumerateDeviceExtensionProperties");
    // SAFETY: Arguments are passed on unchanged
    unsafe {
        (table.enumerate_device_extension_properties)(
            physical_device,
            p_layer_name,
            p_property_count,
            p_properties,
        )
    }
}
