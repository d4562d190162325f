use ash::vk;
use memtrack_shared::LayerError;

use crate::{HeapReport, MemoryReport, TypeReport};

/// Current usage and high-water mark of a memory type or heap, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub current: vk::DeviceSize,
    pub maximum: vk::DeviceSize,
}

impl Usage {
    fn add(&mut self, size: vk::DeviceSize) {
        self.current = self.current.saturating_add(size);
        self.maximum = self.maximum.max(self.current);
    }

    fn sub(&mut self, size: vk::DeviceSize) {
        debug_assert!(size <= self.current, "freeing more than was allocated");
        self.current = self.current.saturating_sub(size);
    }
}

/// A memory type of the device and its usage
#[derive(Debug, Clone, Copy)]
pub struct MemoryTypeInfo {
    pub memory_type: vk::MemoryType,
    pub usage: Usage,
}

/// A memory heap of the device and its usage
#[derive(Debug, Clone, Copy)]
pub struct MemoryHeapInfo {
    pub memory_heap: vk::MemoryHeap,
    pub usage: Usage,
}

impl MemoryHeapInfo {
    /// Returns `true` if the heap lives in device local memory.
    pub fn is_device_local(&self) -> bool {
        self.memory_heap
            .flags
            .contains(vk::MemoryHeapFlags::DEVICE_LOCAL)
    }
}

/// Usage of every memory type and heap of one device
#[derive(Debug, Clone)]
pub struct DeviceStats {
    memory_types: Vec<MemoryTypeInfo>,
    memory_heaps: Vec<MemoryHeapInfo>,
}

impl DeviceStats {
    /// Creates zeroed statistics sized to the memory topology the driver reported.
    pub fn new(properties: &vk::PhysicalDeviceMemoryProperties) -> Self {
        let type_count = (properties.memory_type_count as usize).min(vk::MAX_MEMORY_TYPES);
        let heap_count = (properties.memory_heap_count as usize).min(vk::MAX_MEMORY_HEAPS);

        Self {
            memory_types: properties.memory_types[..type_count]
                .iter()
                .map(|&memory_type| MemoryTypeInfo {
                    memory_type,
                    usage: Usage::default(),
                })
                .collect(),
            memory_heaps: properties.memory_heaps[..heap_count]
                .iter()
                .map(|&memory_heap| MemoryHeapInfo {
                    memory_heap,
                    usage: Usage::default(),
                })
                .collect(),
        }
    }

    pub fn memory_types(&self) -> &[MemoryTypeInfo] {
        &self.memory_types
    }

    pub fn memory_heaps(&self) -> &[MemoryHeapInfo] {
        &self.memory_heaps
    }

    /// Checks that `memory_type_index` and the heap it belongs to exist.
    pub fn validate(&self, memory_type_index: u32) -> Result<(), LayerError> {
        self.indices(memory_type_index).map(|_| ())
    }

    /// Accounts `size` bytes allocated from `memory_type_index`.
    pub fn allocate(
        &mut self,
        memory_type_index: u32,
        size: vk::DeviceSize,
    ) -> Result<(), LayerError> {
        let (type_index, heap_index) = self.indices(memory_type_index)?;
        self.memory_types[type_index].usage.add(size);
        self.memory_heaps[heap_index].usage.add(size);
        Ok(())
    }

    /// Accounts `size` bytes returned to `memory_type_index`.
    pub fn free(&mut self, memory_type_index: u32, size: vk::DeviceSize) -> Result<(), LayerError> {
        let (type_index, heap_index) = self.indices(memory_type_index)?;
        self.memory_types[type_index].usage.sub(size);
        self.memory_heaps[heap_index].usage.sub(size);
        Ok(())
    }

    /// Summarizes the peak usage of the device.
    pub fn report(&self) -> MemoryReport {
        let types = self
            .memory_types
            .iter()
            .enumerate()
            .map(|(index, info)| TypeReport {
                index,
                heap_index: info.memory_type.heap_index,
                maximum_usage: info.usage.maximum,
            })
            .collect();

        let mut device_local_total = 0;
        let mut host_total = 0;
        let heaps = self
            .memory_heaps
            .iter()
            .enumerate()
            .map(|(index, info)| {
                if info.is_device_local() {
                    device_local_total += info.usage.maximum;
                } else {
                    host_total += info.usage.maximum;
                }
                HeapReport {
                    index,
                    device_local: info.is_device_local(),
                    maximum_usage: info.usage.maximum,
                }
            })
            .collect();

        MemoryReport {
            types,
            heaps,
            device_local_total,
            host_total,
        }
    }

    fn indices(&self, memory_type_index: u32) -> Result<(usize, usize), LayerError> {
        let type_index = memory_type_index as usize;
        let memory_type = self.memory_types.get(type_index).ok_or(
            LayerError::MemoryTypeOutOfRange {
                index: memory_type_index,
                count: self.memory_types.len(),
            },
        )?;

        let heap_index = memory_type.memory_type.heap_index as usize;
        if heap_index >= self.memory_heaps.len() {
            return Err(LayerError::MemoryHeapOutOfRange {
                index: memory_type.memory_type.heap_index,
                count: self.memory_heaps.len(),
            });
        }

        Ok((type_index, heap_index))
    }
}
