//! Shared pieces of the memtrack layer: identity constants, configuration and errors.

mod config;
mod error;

use std::ffi::CStr;
use std::fmt;

use ash::vk;

pub use config::{LayerConfig, ReportTarget};
pub use error::LayerError;

/// Name the layer registers under with the loader
pub const LAYER_NAME: &CStr = c"VK_LAYER_MEMTRACK_memory_usage";
/// Human readable description reported by the layer enumeration entry points
pub const LAYER_DESCRIPTION: &CStr = c"Tracks and reports Vulkan device memory usage";
/// Implementation version reported by the layer enumeration entry points
pub const LAYER_IMPLEMENTATION_VERSION: u32 = 1;
/// Vulkan version the layer was written against
pub const LAYER_SPEC_VERSION: u32 = vk::API_VERSION_1_0;

/// The two dispatch scopes of the Vulkan call chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Instance,
    Device,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Instance => f.write_str("instance"),
            Scope::Device => f.write_str("device"),
        }
    }
}

/// Returns `true` if `name` is the name of this layer.
pub fn is_own_layer_name(name: Option<&CStr>) -> bool {
    name == Some(LAYER_NAME)
}
