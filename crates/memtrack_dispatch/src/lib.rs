//! Dispatch chaining for the memtrack layer
//!
//! This crate knows how a Vulkan layer finds the next link in the call chain, how the function
//! pointers of that link are captured per created object and how they are found again for later
//! calls on the same object.

mod handle;
mod loader;
mod registry;
mod table;

pub use handle::{DispatchableHandle, HandleIdentity};
pub use loader::{
    LayerDeviceCreateInfo, LayerDeviceCreateInfoPayload, LayerDeviceLink, LayerFunction,
    LayerInstanceCreateInfo, LayerInstanceCreateInfoPayload, LayerInstanceLink, LinkInfo,
    NextDeviceLink, NextInstanceLink, PNextChain, PfnGetPhysicalDeviceProcAddr, find_link_info,
    next_device_link, next_instance_link,
};
pub use registry::{DispatchMap, DispatchRegistry};
pub use table::{DeviceDispatch, InstanceDispatch};
