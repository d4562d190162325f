//! Loader link structures and the search for the next link in the chain
//!
//! When the loader creates an instance or device through a layer, it appends a loader specific
//! structure to the create info's `pNext` chain. That structure points to a singly linked list with
//! one element per remaining layer (the driver being the last one). Each layer takes the head of
//! the list for itself and advances the list before calling down the chain.

use std::ffi::{CStr, c_char, c_void};
use std::ptr::{self, NonNull};

use ash::vk;
use log::{debug, warn};
use memtrack_shared::{LayerError, Scope};

/// Upper bound of `pNext` entries inspected before giving up on a chain
pub const MAX_CHAIN_LENGTH: usize = 64;

/// `VK_STRUCTURE_TYPE_LOADER_INSTANCE_CREATE_INFO`
pub const LOADER_INSTANCE_CREATE_INFO: vk::StructureType = vk::StructureType::from_raw(47);
/// `VK_STRUCTURE_TYPE_LOADER_DEVICE_CREATE_INFO`
pub const LOADER_DEVICE_CREATE_INFO: vk::StructureType = vk::StructureType::from_raw(48);

/// What a loader create info structure carries
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerFunction(i32);

impl LayerFunction {
    pub const LAYER_LINK_INFO: Self = Self(0);
    pub const LOADER_DATA_CALLBACK: Self = Self(1);
    pub const LOADER_LAYER_CREATE_DEVICE_CALLBACK: Self = Self(2);
    pub const LOADER_FEATURES: Self = Self(3);
}

pub type PfnGetPhysicalDeviceProcAddr =
    Option<unsafe extern "system" fn(vk::Instance, *const c_char) -> vk::PFN_vkVoidFunction>;

/// One element of the instance chain
#[repr(C)]
pub struct LayerInstanceLink {
    pub p_next: *mut LayerInstanceLink,
    pub pfn_next_get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub pfn_next_get_physical_device_proc_addr: PfnGetPhysicalDeviceProcAddr,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union LayerInstanceCreateInfoPayload {
    pub layer_info: *mut LayerInstanceLink,
    pub set_instance_loader_data: *const c_void,
    pub layer_device: [*const c_void; 2],
    pub loader_features: u32,
}

/// Loader structure found in the `pNext` chain of `VkInstanceCreateInfo`
#[repr(C)]
pub struct LayerInstanceCreateInfo {
    pub s_type: vk::StructureType,
    pub p_next: *const c_void,
    pub function: LayerFunction,
    pub u: LayerInstanceCreateInfoPayload,
}

/// One element of the device chain
#[repr(C)]
pub struct LayerDeviceLink {
    pub p_next: *mut LayerDeviceLink,
    pub pfn_next_get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub pfn_next_get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union LayerDeviceCreateInfoPayload {
    pub layer_info: *mut LayerDeviceLink,
    pub set_device_loader_data: *const c_void,
}

/// Loader structure found in the `pNext` chain of `VkDeviceCreateInfo`
#[repr(C)]
pub struct LayerDeviceCreateInfo {
    pub s_type: vk::StructureType,
    pub p_next: *const c_void,
    pub function: LayerFunction,
    pub u: LayerDeviceCreateInfoPayload,
}

/// A loader create info structure that can carry link info
pub trait LinkInfo {
    /// Structure type identifying this structure in a `pNext` chain
    const STRUCTURE_TYPE: vk::StructureType;

    /// What this instance of the structure carries
    fn function(&self) -> LayerFunction;
}

impl LinkInfo for LayerInstanceCreateInfo {
    const STRUCTURE_TYPE: vk::StructureType = LOADER_INSTANCE_CREATE_INFO;

    fn function(&self) -> LayerFunction {
        self.function
    }
}

impl LinkInfo for LayerDeviceCreateInfo {
    const STRUCTURE_TYPE: vk::StructureType = LOADER_DEVICE_CREATE_INFO;

    fn function(&self) -> LayerFunction {
        self.function
    }
}

/// Iterator over the entries of a `pNext` chain, bounded by [`MAX_CHAIN_LENGTH`].
pub struct PNextChain {
    next: *const vk::BaseInStructure<'static>,
    remaining: usize,
}

impl PNextChain {
    /// Starts iterating at `p_next`.
    ///
    /// # Safety
    ///
    /// `p_next` must be null or point to a valid chain of Vulkan structures that outlives the
    /// iterator.
    pub unsafe fn new(p_next: *const c_void) -> Self {
        Self {
            next: p_next.cast(),
            remaining: MAX_CHAIN_LENGTH,
        }
    }
}

impl Iterator for PNextChain {
    type Item = NonNull<vk::BaseInStructure<'static>>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = NonNull::new(self.next.cast_mut())?;
        if self.remaining == 0 {
            warn!("pNext chain longer than {MAX_CHAIN_LENGTH} entries, ignoring the rest");
            return None;
        }
        self.remaining -= 1;
        // SAFETY: Guaranteed by the contract of `PNextChain::new`
        self.next = unsafe { current.as_ref() }.p_next;
        Some(current)
    }
}

/// Finds the link info structure of type `T` in the `pNext` chain starting at `p_next`.
///
/// # Safety
///
/// `p_next` must be null or point to a valid chain of Vulkan structures.
pub unsafe fn find_link_info<T: LinkInfo>(p_next: *const c_void) -> Option<NonNull<T>> {
    // SAFETY: Forwarded from the caller
    unsafe { PNextChain::new(p_next) }
        .find(|entry| {
            // SAFETY: Every entry starts with `sType`, and once it matches the entry is a `T`
            unsafe {
                entry.as_ref().s_type == T::STRUCTURE_TYPE
                    && entry.cast::<T>().as_ref().function() == LayerFunction::LAYER_LINK_INFO
            }
        })
        .map(NonNull::cast)
}

/// Entry point resolver of the next link in the instance chain
#[derive(Clone, Copy)]
pub struct NextInstanceLink {
    pub get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
}

impl NextInstanceLink {
    /// Resolves `vkCreateInstance` of the next link.
    pub fn create_instance(&self) -> Result<vk::PFN_vkCreateInstance, LayerError> {
        // SAFETY: Global commands are resolved with a null instance
        unsafe { resolve_global(self.get_instance_proc_addr, c"vkCreateInstance") }
    }

    /// Resolves `vkDestroyInstance` of the next link for `instance`. Used to undo a creation the
    /// layer can't complete.
    ///
    /// # Safety
    ///
    /// `instance` must have been created by the next link.
    pub unsafe fn destroy_instance(
        &self,
        instance: vk::Instance,
    ) -> Result<vk::PFN_vkDestroyInstance, LayerError> {
        let name = c"vkDestroyInstance";
        // SAFETY: Guaranteed by the caller
        let function = unsafe { (self.get_instance_proc_addr)(instance, name.as_ptr()) };
        // SAFETY: The function type matches the name
        unsafe { crate::table::cast_function(function, name) }
    }
}

/// Entry point resolvers of the next link in the device chain
#[derive(Clone, Copy)]
pub struct NextDeviceLink {
    pub get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
}

impl NextDeviceLink {
    /// Resolves `vkCreateDevice` of the next link.
    pub fn create_device(&self) -> Result<vk::PFN_vkCreateDevice, LayerError> {
        // SAFETY: The loader resolves `vkCreateDevice` for a null instance during layer chaining
        unsafe { resolve_global(self.get_instance_proc_addr, c"vkCreateDevice") }
    }

    /// Resolves `vkGetPhysicalDeviceMemoryProperties` of the next link without an instance.
    ///
    /// Only used when the instance owning the physical device is unknown to the layer.
    pub fn get_physical_device_memory_properties(
        &self,
    ) -> Result<vk::PFN_vkGetPhysicalDeviceMemoryProperties, LayerError> {
        // SAFETY: The function type matches the name
        unsafe {
            resolve_global(
                self.get_instance_proc_addr,
                c"vkGetPhysicalDeviceMemoryProperties",
            )
        }
    }

    /// Resolves `vkDestroyDevice` of the next link for `device`. Used to undo a creation the layer
    /// can't complete.
    ///
    /// # Safety
    ///
    /// `device` must have been created by the next link.
    pub unsafe fn destroy_device(
        &self,
        device: vk::Device,
    ) -> Result<vk::PFN_vkDestroyDevice, LayerError> {
        let name = c"vkDestroyDevice";
        // SAFETY: Guaranteed by the caller
        let function = unsafe { (self.get_device_proc_addr)(device, name.as_ptr()) };
        // SAFETY: The function type matches the name
        unsafe { crate::table::cast_function(function, name) }
    }
}

/// Resolves `name` through `get_instance_proc_addr` with a null instance.
///
/// # Safety
///
/// `F` must be the function pointer type matching `name`.
pub(crate) unsafe fn resolve_global<F: Copy>(
    get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    name: &'static CStr,
) -> Result<F, LayerError> {
    // SAFETY: `name` is a valid C string
    let function = unsafe { get_instance_proc_addr(vk::Instance::null(), name.as_ptr()) };
    // SAFETY: Forwarded from the caller
    unsafe { crate::table::cast_function(function, name) }
}

/// Takes this layer's link out of the instance create info and advances the chain.
///
/// The chain is mutated exactly once per call, so the next link sees the remaining links only.
///
/// # Safety
///
/// `create_info` must be a valid instance create info as passed to `vkCreateInstance` by the loader.
pub unsafe fn next_instance_link(
    create_info: &vk::InstanceCreateInfo<'_>,
) -> Result<NextInstanceLink, LayerError> {
    // SAFETY: Forwarded from the caller
    let Some(mut link_info) =
        (unsafe { find_link_info::<LayerInstanceCreateInfo>(create_info.p_next) })
    else {
        return Err(LayerError::MissingLinkInfo(Scope::Instance));
    };
    // SAFETY: The loader owns the link info and expects layers to advance it in place
    let link_info = unsafe { link_info.as_mut() };
    // SAFETY: `function` is `LAYER_LINK_INFO`, so the payload is `layer_info`
    let Some(link) = NonNull::new(unsafe { link_info.u.layer_info }) else {
        return Err(LayerError::MissingLinkInfo(Scope::Instance));
    };
    // SAFETY: Non-null links handed out by the loader are valid
    let link = unsafe { link.as_ref() };
    link_info.u.layer_info = link.p_next;
    debug!(
        "Advanced instance chain, next link is {}",
        if link.p_next.is_null() { "the driver" } else { "a layer" }
    );

    Ok(NextInstanceLink {
        get_instance_proc_addr: link.pfn_next_get_instance_proc_addr,
    })
}

/// Takes this layer's link out of the device create info and advances the chain.
///
/// # Safety
///
/// `create_info` must be a valid device create info as passed to `vkCreateDevice` by the loader.
pub unsafe fn next_device_link(
    create_info: &vk::DeviceCreateInfo<'_>,
) -> Result<NextDeviceLink, LayerError> {
    // SAFETY: Forwarded from the caller
    let Some(mut link_info) =
        (unsafe { find_link_info::<LayerDeviceCreateInfo>(create_info.p_next) })
    else {
        return Err(LayerError::MissingLinkInfo(Scope::Device));
    };
    // SAFETY: The loader owns the link info and expects layers to advance it in place
    let link_info = unsafe { link_info.as_mut() };
    // SAFETY: `function` is `LAYER_LINK_INFO`, so the payload is `layer_info`
    let Some(link) = NonNull::new(unsafe { link_info.u.layer_info }) else {
        return Err(LayerError::MissingLinkInfo(Scope::Device));
    };
    // SAFETY: Non-null links handed out by the loader are valid
    let link = unsafe { link.as_ref() };
    link_info.u.layer_info = link.p_next;

    Ok(NextDeviceLink {
        get_instance_proc_addr: link.pfn_next_get_instance_proc_addr,
        get_device_proc_addr: link.pfn_next_get_device_proc_addr,
    })
}

impl Default for LayerInstanceCreateInfo {
    fn default() -> Self {
        Self {
            s_type: LOADER_INSTANCE_CREATE_INFO,
            p_next: ptr::null(),
            function: LayerFunction::LAYER_LINK_INFO,
            u: LayerInstanceCreateInfoPayload {
                layer_info: ptr::null_mut(),
            },
        }
    }
}

impl Default for LayerDeviceCreateInfo {
    fn default() -> Self {
        Self {
            s_type: LOADER_DEVICE_CREATE_INFO,
            p_next: ptr::null(),
            function: LayerFunction::LAYER_LINK_INFO,
            u: LayerDeviceCreateInfoPayload {
                layer_info: ptr::null_mut(),
            },
        }
    }
}
