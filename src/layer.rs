//! The layer's process wide state

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, MutexGuard, OnceLock, PoisonError};

use ash::vk::{self, Handle};
use log::info;
use memtrack_dispatch::{DeviceDispatch, DispatchRegistry, HandleIdentity, InstanceDispatch};
use memtrack_shared::{LayerConfig, LayerError};
use memtrack_stats::{AllocationRecord, DeviceStats, DeviceTracker, MemoryReport};

static LAYER: LazyLock<Layer> = LazyLock::new(Layer::new);

/// Returns the layer state shared by all entry points.
pub fn layer() -> &'static Layer {
    &LAYER
}

/// Everything guarded by the layer lock
struct LayerState {
    registry: DispatchRegistry,
    /// Memory statistics and live allocations, keyed by raw device handle
    devices: HashMap<u64, DeviceTracker>,
}

/// Dispatch tables and memory statistics of every instance and device created through the layer.
///
/// All state sits behind one lock. Every method is a single critical section, so lookups and the
/// updates depending on them can't interleave with other threads. The lock is never held while
/// calling into the next link.
pub struct Layer {
    state: Mutex<LayerState>,
    config: OnceLock<LayerConfig>,
}

impl Default for Layer {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LayerState {
                registry: DispatchRegistry::new(),
                devices: HashMap::new(),
            }),
            config: OnceLock::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LayerState> {
        // The state is updated by plain assignments only, a panicking holder can't leave it
        // half written
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The layer configuration, or the defaults if none was set.
    pub fn config(&self) -> &LayerConfig {
        self.config.get_or_init(LayerConfig::default)
    }

    /// Sets the configuration. Returns `false` if one was already set.
    pub fn set_config(&self, config: LayerConfig) -> bool {
        self.config.set(config).is_ok()
    }

    /// Stores the dispatch table of a newly created instance.
    pub fn publish_instance(&self, key: HandleIdentity, table: InstanceDispatch) {
        self.lock().registry.instances_mut().publish(key, table);
    }

    /// Returns the dispatch table of the instance (or physical device) with identity `key`.
    pub fn instance_dispatch(&self, key: HandleIdentity) -> Result<InstanceDispatch, LayerError> {
        self.lock().registry.instances().lookup(key)
    }

    /// Removes and returns the dispatch table of a destroyed instance.
    pub fn remove_instance(&self, key: HandleIdentity) -> Result<InstanceDispatch, LayerError> {
        self.lock().registry.instances_mut().erase(key)
    }

    /// Stores the dispatch table and the zeroed memory statistics of a newly created device.
    pub fn install_device(
        &self,
        device: vk::Device,
        key: HandleIdentity,
        table: DeviceDispatch,
        stats: DeviceStats,
    ) {
        let mut state = self.lock();
        state.registry.devices_mut().publish(key, table);
        state
            .devices
            .insert(device.as_raw(), DeviceTracker::new(stats));
    }

    /// Returns the dispatch table of the device with identity `key`.
    pub fn device_dispatch(&self, key: HandleIdentity) -> Result<DeviceDispatch, LayerError> {
        self.lock().registry.devices().lookup(key)
    }

    /// Removes a destroyed device, returning its dispatch table and the report of its peak usage.
    ///
    /// Nothing is removed unless both the table and the statistics exist.
    pub fn remove_device(
        &self,
        device: vk::Device,
        key: HandleIdentity,
    ) -> Result<(DeviceDispatch, MemoryReport), LayerError> {
        let mut state = self.lock();
        state.registry.devices().lookup(key)?;
        let tracker = state
            .devices
            .remove(&device.as_raw())
            .ok_or(LayerError::MissingDeviceStats(device.as_raw()))?;
        let table = state.registry.devices_mut().erase(key)?;

        if tracker.live_allocations() > 0 {
            info!(
                "Device {device:?} destroyed with {} allocation(s) still live",
                tracker.live_allocations()
            );
        }

        Ok((table, tracker.report()))
    }

    /// Accounts a successful allocation of `memory` on `device`.
    pub fn record_allocation(
        &self,
        device: vk::Device,
        memory: vk::DeviceMemory,
        record: AllocationRecord,
    ) -> Result<(), LayerError> {
        self.lock()
            .devices
            .get_mut(&device.as_raw())
            .ok_or(LayerError::MissingDeviceStats(device.as_raw()))?
            .allocated(memory, record)
    }

    /// Accounts the release of `memory` on `device` and returns the table to forward the free
    /// through. The record is gone before the free reaches the driver, so a concurrent allocation
    /// that gets the same handle back records cleanly.
    pub fn release_allocation(
        &self,
        device: vk::Device,
        key: HandleIdentity,
        memory: vk::DeviceMemory,
    ) -> Result<DeviceDispatch, LayerError> {
        let mut state = self.lock();
        let table = state.registry.devices().lookup(key)?;
        state
            .devices
            .get_mut(&device.as_raw())
            .ok_or(LayerError::MissingDeviceStats(device.as_raw()))?
            .freed(memory)?;
        Ok(table)
    }

    /// Copy of the statistics of `device`.
    #[cfg(test)]
    pub(crate) fn device_tracker(&self, device: vk::Device) -> Option<DeviceTracker> {
        self.lock().devices.get(&device.as_raw()).cloned()
    }
}
