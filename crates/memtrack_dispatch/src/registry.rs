use std::collections::HashMap;

use log::debug;
use memtrack_shared::{LayerError, Scope};

use crate::{DeviceDispatch, HandleIdentity, InstanceDispatch};

/// Dispatch tables of one scope, keyed by handle identity
pub struct DispatchMap<T> {
    scope: Scope,
    tables: HashMap<HandleIdentity, T>,
}

impl<T: Copy> DispatchMap<T> {
    /// Creates an empty map for `scope`.
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            tables: HashMap::new(),
        }
    }

    /// Stores `table` under `key`, returning the table it replaced.
    pub fn publish(&mut self, key: HandleIdentity, table: T) -> Option<T> {
        debug!("Publishing {} dispatch table {:#x}", self.scope, key.as_usize());
        self.tables.insert(key, table)
    }

    /// Returns the table stored under `key`.
    ///
    /// A miss means a call arrived for a handle that was never created through this layer or was
    /// already destroyed.
    pub fn lookup(&self, key: HandleIdentity) -> Result<T, LayerError> {
        self.tables
            .get(&key)
            .copied()
            .ok_or(LayerError::MissingDispatchTable {
                scope: self.scope,
                key: key.as_usize(),
            })
    }

    /// Removes the table stored under `key`.
    pub fn erase(&mut self, key: HandleIdentity) -> Result<T, LayerError> {
        debug!("Erasing {} dispatch table {:#x}", self.scope, key.as_usize());
        self.tables
            .remove(&key)
            .ok_or(LayerError::MissingDispatchTable {
                scope: self.scope,
                key: key.as_usize(),
            })
    }

    /// Returns `true` if a table is stored under `key`.
    pub fn contains(&self, key: HandleIdentity) -> bool {
        self.tables.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// All dispatch tables the layer knows about, one map per scope.
///
/// The registry itself is not synchronized. The owner serializes access to it together with the
/// rest of the layer state.
pub struct DispatchRegistry {
    instances: DispatchMap<InstanceDispatch>,
    devices: DispatchMap<DeviceDispatch>,
}

impl Default for DispatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self {
            instances: DispatchMap::new(Scope::Instance),
            devices: DispatchMap::new(Scope::Device),
        }
    }

    /// Instance scope tables
    pub fn instances(&self) -> &DispatchMap<InstanceDispatch> {
        &self.instances
    }

    /// Instance scope tables, for publishing and erasing
    pub fn instances_mut(&mut self) -> &mut DispatchMap<InstanceDispatch> {
        &mut self.instances
    }

    /// Device scope tables
    pub fn devices(&self) -> &DispatchMap<DeviceDispatch> {
        &self.devices
    }

    /// Device scope tables, for publishing and erasing
    pub fn devices_mut(&mut self) -> &mut DispatchMap<DeviceDispatch> {
        &mut self.devices
    }
}
