//! A driver stand-in for the tests
//!
//! The fake driver is the last link of a chain with the layer in front of it. Its dispatchable
//! objects are laid out like loader objects, so the layer derives their identities as it would in
//! a real process. Tests reach the layer through the exported resolvers only, the same way the
//! loader does.

use std::cell::RefCell;
use std::ffi::{CStr, c_char, c_void};
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use ash::vk::{self, Handle};
use memtrack_dispatch::{
    LayerDeviceCreateInfo, LayerDeviceLink, LayerInstanceCreateInfo, LayerInstanceLink,
};

use crate::{MemTrack_GetDeviceProcAddr, MemTrack_GetInstanceProcAddr};

pub const MIB: vk::DeviceSize = 1024 * 1024;

/// Extensions the fake driver reports for every physical device
pub const DEVICE_EXTENSIONS: [(&CStr, u32); 3] = [
    (c"VK_KHR_swapchain", 70),
    (c"VK_KHR_maintenance1", 2),
    (c"VK_EXT_memory_budget", 1),
];

static NEXT_LOADER_DISPATCH: AtomicUsize = AtomicUsize::new(0x10_0000);
static NEXT_MEMORY: AtomicU64 = AtomicU64::new(0x1000);

/// Something the driver was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCall {
    CreateInstance,
    DestroyInstance(vk::Instance),
    CreateDevice,
    DestroyDevice(vk::Device),
    AllocateMemory(vk::DeviceSize),
    FreeMemory(vk::DeviceMemory),
    EnumerateDeviceExtensionProperties,
    EnumeratePhysicalDevices,
    DeviceWaitIdle,
}

/// How the driver behaves on the current thread
pub struct DriverBehavior {
    pub create_instance: vk::Result,
    pub create_device: vk::Result,
    pub allocate_memory: vk::Result,
    /// Entry points the driver pretends not to have
    pub missing: Vec<&'static CStr>,
    /// Answers `vkGetPhysicalDeviceMemoryProperties` for a null instance
    pub global_memory_properties: bool,
}

impl Default for DriverBehavior {
    fn default() -> Self {
        Self {
            create_instance: vk::Result::SUCCESS,
            create_device: vk::Result::SUCCESS,
            allocate_memory: vk::Result::SUCCESS,
            missing: Vec::new(),
            global_memory_properties: true,
        }
    }
}

thread_local! {
    static BEHAVIOR: RefCell<DriverBehavior> = RefCell::new(DriverBehavior::default());
    static CALLS: RefCell<Vec<DriverCall>> = const { RefCell::new(Vec::new()) };
}

/// Changes how the driver behaves on the current thread.
pub fn configure(configure: impl FnOnce(&mut DriverBehavior)) {
    BEHAVIOR.with_borrow_mut(configure);
}

/// Calls the driver received on the current thread, oldest first.
pub fn calls() -> Vec<DriverCall> {
    CALLS.with_borrow(Clone::clone)
}

fn record(call: DriverCall) {
    CALLS.with_borrow_mut(|calls| calls.push(call));
}

fn is_missing(name: &CStr) -> bool {
    BEHAVIOR.with_borrow(|behavior| behavior.missing.iter().any(|missing| *missing == name))
}

/// Type 0 on a device local heap of 256 MiB, type 1 on a host heap of 512 MiB
pub fn memory_properties() -> vk::PhysicalDeviceMemoryProperties {
    let mut properties = vk::PhysicalDeviceMemoryProperties {
        memory_type_count: 2,
        memory_heap_count: 2,
        ..Default::default()
    };
    properties.memory_types[0] = vk::MemoryType {
        property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        heap_index: 0,
    };
    properties.memory_types[1] = vk::MemoryType {
        property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT,
        heap_index: 1,
    };
    properties.memory_heaps[0] = vk::MemoryHeap {
        size: 256 * MIB,
        flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
    };
    properties.memory_heaps[1] = vk::MemoryHeap {
        size: 512 * MIB,
        flags: vk::MemoryHeapFlags::empty(),
    };
    properties
}

/// A dispatchable object as the loader lays it out
#[repr(C)]
struct DispatchableObject {
    loader_dispatch: usize,
}

/// The driver's instance, carrying the single physical device it exposes
#[repr(C)]
struct InstanceObject {
    loader_dispatch: usize,
    physical_device: vk::PhysicalDevice,
}

fn next_loader_dispatch() -> usize {
    NEXT_LOADER_DISPATCH.fetch_add(0x100, Ordering::Relaxed)
}

/// Objects are leaked, handles of destroyed objects must stay readable for identity lookups
fn leak<T>(object: T) -> u64 {
    Box::leak(Box::new(object)) as *mut T as u64
}

/// Casts a resolved entry point to its signature.
///
/// # Safety
///
/// `F` must be the signature of the resolved entry point.
pub unsafe fn cast<F: Copy>(function: vk::PFN_vkVoidFunction) -> F {
    let function = function.unwrap();
    unsafe { mem::transmute_copy::<unsafe extern "system" fn(), F>(&function) }
}

unsafe extern "system" fn create_instance(
    _create_info: *const vk::InstanceCreateInfo<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    instance: *mut vk::Instance,
) -> vk::Result {
    record(DriverCall::CreateInstance);
    let result = BEHAVIOR.with_borrow(|behavior| behavior.create_instance);
    if result != vk::Result::SUCCESS {
        return result;
    }

    let loader_dispatch = next_loader_dispatch();
    let physical_device = vk::PhysicalDevice::from_raw(leak(DispatchableObject { loader_dispatch }));
    let object = leak(InstanceObject {
        loader_dispatch,
        physical_device,
    });
    unsafe { instance.write(vk::Instance::from_raw(object)) };
    vk::Result::SUCCESS
}

unsafe extern "system" fn destroy_instance(
    instance: vk::Instance,
    _allocator: *const vk::AllocationCallbacks<'_>,
) {
    record(DriverCall::DestroyInstance(instance));
}

unsafe extern "system" fn enumerate_physical_devices(
    instance: vk::Instance,
    count: *mut u32,
    physical_devices: *mut vk::PhysicalDevice,
) -> vk::Result {
    record(DriverCall::EnumeratePhysicalDevices);
    unsafe {
        if !physical_devices.is_null() && *count > 0 {
            physical_devices.write(physical_device(instance));
        }
        count.write(1);
    }
    vk::Result::SUCCESS
}

unsafe extern "system" fn enumerate_device_extension_properties(
    _physical_device: vk::PhysicalDevice,
    layer_name: *const c_char,
    count: *mut u32,
    properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    record(DriverCall::EnumerateDeviceExtensionProperties);
    if !layer_name.is_null() {
        return vk::Result::ERROR_LAYER_NOT_PRESENT;
    }

    unsafe {
        if properties.is_null() {
            count.write(DEVICE_EXTENSIONS.len() as u32);
            return vk::Result::SUCCESS;
        }
        let written = (*count as usize).min(DEVICE_EXTENSIONS.len());
        for (index, (name, spec_version)) in DEVICE_EXTENSIONS[..written].iter().enumerate() {
            let mut extension = vk::ExtensionProperties::default();
            extension.spec_version = *spec_version;
            for (dst, &src) in extension.extension_name.iter_mut().zip(name.to_bytes()) {
                *dst = src as c_char;
            }
            properties.add(index).write(extension);
        }
        count.write(written as u32);
        if written < DEVICE_EXTENSIONS.len() {
            vk::Result::INCOMPLETE
        } else {
            vk::Result::SUCCESS
        }
    }
}

unsafe extern "system" fn get_physical_device_memory_properties(
    _physical_device: vk::PhysicalDevice,
    properties: *mut vk::PhysicalDeviceMemoryProperties,
) {
    unsafe { properties.write(memory_properties()) };
}

unsafe extern "system" fn create_device(
    _physical_device: vk::PhysicalDevice,
    _create_info: *const vk::DeviceCreateInfo<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    device: *mut vk::Device,
) -> vk::Result {
    record(DriverCall::CreateDevice);
    let result = BEHAVIOR.with_borrow(|behavior| behavior.create_device);
    if result != vk::Result::SUCCESS {
        return result;
    }

    let object = leak(DispatchableObject {
        loader_dispatch: next_loader_dispatch(),
    });
    unsafe { device.write(vk::Device::from_raw(object)) };
    vk::Result::SUCCESS
}

unsafe extern "system" fn destroy_device(
    device: vk::Device,
    _allocator: *const vk::AllocationCallbacks<'_>,
) {
    record(DriverCall::DestroyDevice(device));
}

unsafe extern "system" fn allocate_memory(
    _device: vk::Device,
    allocate_info: *const vk::MemoryAllocateInfo<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    memory: *mut vk::DeviceMemory,
) -> vk::Result {
    let size = unsafe { (*allocate_info).allocation_size };
    record(DriverCall::AllocateMemory(size));
    let result = BEHAVIOR.with_borrow(|behavior| behavior.allocate_memory);
    if result != vk::Result::SUCCESS {
        return result;
    }

    let handle = NEXT_MEMORY.fetch_add(1, Ordering::Relaxed);
    unsafe { memory.write(vk::DeviceMemory::from_raw(handle)) };
    vk::Result::SUCCESS
}

unsafe extern "system" fn free_memory(
    _device: vk::Device,
    memory: vk::DeviceMemory,
    _allocator: *const vk::AllocationCallbacks<'_>,
) {
    record(DriverCall::FreeMemory(memory));
}

unsafe extern "system" fn device_wait_idle(_device: vk::Device) -> vk::Result {
    record(DriverCall::DeviceWaitIdle);
    vk::Result::SUCCESS
}

/// `vkGetInstanceProcAddr` of the driver
pub unsafe extern "system" fn get_instance_proc_addr(
    instance: vk::Instance,
    name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    let name = unsafe { CStr::from_ptr(name) };
    if is_missing(name) {
        return None;
    }

    match name.to_bytes() {
        b"vkGetInstanceProcAddr" => {
            void_function!(get_instance_proc_addr, vk::PFN_vkGetInstanceProcAddr)
        }
        b"vkCreateInstance" => void_function!(create_instance, vk::PFN_vkCreateInstance),
        b"vkCreateDevice" => void_function!(create_device, vk::PFN_vkCreateDevice),
        b"vkGetPhysicalDeviceMemoryProperties"
            if instance != vk::Instance::null()
                || BEHAVIOR.with_borrow(|behavior| behavior.global_memory_properties) =>
        {
            void_function!(
                get_physical_device_memory_properties,
                vk::PFN_vkGetPhysicalDeviceMemoryProperties
            )
        }
        _ if instance == vk::Instance::null() => None,
        b"vkDestroyInstance" => void_function!(destroy_instance, vk::PFN_vkDestroyInstance),
        b"vkEnumeratePhysicalDevices" => {
            void_function!(enumerate_physical_devices, vk::PFN_vkEnumeratePhysicalDevices)
        }
        b"vkEnumerateDeviceExtensionProperties" => void_function!(
            enumerate_device_extension_properties,
            vk::PFN_vkEnumerateDeviceExtensionProperties
        ),
        _ => None,
    }
}

/// `vkGetDeviceProcAddr` of the driver
pub unsafe extern "system" fn get_device_proc_addr(
    _device: vk::Device,
    name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    let name = unsafe { CStr::from_ptr(name) };
    if is_missing(name) {
        return None;
    }

    match name.to_bytes() {
        b"vkGetDeviceProcAddr" => void_function!(get_device_proc_addr, vk::PFN_vkGetDeviceProcAddr),
        b"vkDestroyDevice" => void_function!(destroy_device, vk::PFN_vkDestroyDevice),
        b"vkAllocateMemory" => void_function!(allocate_memory, vk::PFN_vkAllocateMemory),
        b"vkFreeMemory" => void_function!(free_memory, vk::PFN_vkFreeMemory),
        b"vkDeviceWaitIdle" => void_function!(device_wait_idle, vk::PFN_vkDeviceWaitIdle),
        _ => None,
    }
}

/// The physical device the driver exposes for `instance`
pub fn physical_device(instance: vk::Instance) -> vk::PhysicalDevice {
    unsafe { (*(instance.as_raw() as *const InstanceObject)).physical_device }
}

/// Creates an instance through the layer, with the driver as the next link.
pub fn create_instance_through_layer() -> Result<vk::Instance, vk::Result> {
    let mut driver_link = LayerInstanceLink {
        p_next: ptr::null_mut(),
        pfn_next_get_instance_proc_addr: get_instance_proc_addr,
        pfn_next_get_physical_device_proc_addr: None,
    };
    let mut link_info = LayerInstanceCreateInfo::default();
    link_info.u.layer_info = &mut driver_link;
    let mut create_info = vk::InstanceCreateInfo::default();
    create_info.p_next = &mut link_info as *mut LayerInstanceCreateInfo as *const c_void;

    unsafe { create_instance_with(&create_info) }
}

/// Calls the layer's `vkCreateInstance` with `create_info`.
///
/// # Safety
///
/// The chain of `create_info` must be valid.
pub unsafe fn create_instance_with(
    create_info: &vk::InstanceCreateInfo<'_>,
) -> Result<vk::Instance, vk::Result> {
    let create: vk::PFN_vkCreateInstance = unsafe {
        cast(MemTrack_GetInstanceProcAddr(
            vk::Instance::null(),
            c"vkCreateInstance".as_ptr(),
        ))
    };
    let mut instance = vk::Instance::null();
    match unsafe { create(create_info, ptr::null(), &mut instance) } {
        vk::Result::SUCCESS => Ok(instance),
        err => Err(err),
    }
}

/// Creates an instance directly on the driver, bypassing the layer.
pub fn create_instance_without_layer() -> vk::Instance {
    let mut instance = vk::Instance::null();
    let result = unsafe { create_instance(ptr::null(), ptr::null(), &mut instance) };
    assert_eq!(result, vk::Result::SUCCESS);
    instance
}

/// Destroys an instance through the layer.
pub fn destroy_instance_through_layer(instance: vk::Instance) {
    let destroy: vk::PFN_vkDestroyInstance = unsafe {
        cast(MemTrack_GetInstanceProcAddr(
            instance,
            c"vkDestroyInstance".as_ptr(),
        ))
    };
    unsafe { destroy(instance, ptr::null()) };
}

/// A device created through the layer and the layer's entry points for it
pub struct LayerDevice {
    pub device: vk::Device,
    allocate_memory: vk::PFN_vkAllocateMemory,
    free_memory: vk::PFN_vkFreeMemory,
    destroy_device: vk::PFN_vkDestroyDevice,
}

impl LayerDevice {
    /// Creates a device on `physical_device` through the layer, with the driver as the next link.
    pub fn create(
        instance: vk::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self, vk::Result> {
        let mut driver_link = LayerDeviceLink {
            p_next: ptr::null_mut(),
            pfn_next_get_instance_proc_addr: get_instance_proc_addr,
            pfn_next_get_device_proc_addr: get_device_proc_addr,
        };
        let mut link_info = LayerDeviceCreateInfo::default();
        link_info.u.layer_info = &mut driver_link;
        let mut create_info = vk::DeviceCreateInfo::default();
        create_info.p_next = &mut link_info as *mut LayerDeviceCreateInfo as *const c_void;

        let create: vk::PFN_vkCreateDevice = unsafe {
            cast(MemTrack_GetInstanceProcAddr(
                instance,
                c"vkCreateDevice".as_ptr(),
            ))
        };
        let mut device = vk::Device::null();
        let result = unsafe { create(physical_device, &create_info, ptr::null(), &mut device) };
        if result != vk::Result::SUCCESS {
            return Err(result);
        }

        let resolve = |name: &CStr| unsafe { MemTrack_GetDeviceProcAddr(device, name.as_ptr()) };
        unsafe {
            Ok(Self {
                device,
                allocate_memory: cast(resolve(c"vkAllocateMemory")),
                free_memory: cast(resolve(c"vkFreeMemory")),
                destroy_device: cast(resolve(c"vkDestroyDevice")),
            })
        }
    }

    /// Allocates `size` bytes of `memory_type_index` through the layer.
    pub fn allocate(
        &self,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> Result<vk::DeviceMemory, vk::Result> {
        let mut allocate_info = vk::MemoryAllocateInfo::default();
        allocate_info.allocation_size = size;
        allocate_info.memory_type_index = memory_type_index;

        let mut memory = vk::DeviceMemory::null();
        match unsafe { (self.allocate_memory)(self.device, &allocate_info, ptr::null(), &mut memory) }
        {
            vk::Result::SUCCESS => Ok(memory),
            err => Err(err),
        }
    }

    /// Frees `memory` through the layer.
    pub fn free(&self, memory: vk::DeviceMemory) {
        unsafe { (self.free_memory)(self.device, memory, ptr::null()) };
    }

    /// Destroys the device through the layer.
    pub fn destroy(self) {
        unsafe { (self.destroy_device)(self.device, ptr::null()) };
    }
}
