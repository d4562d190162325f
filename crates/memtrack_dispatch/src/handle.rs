use ash::vk::{self, Handle};

/// Vulkan handles the loader hands out as pointers to objects that start with the loader's
/// dispatch pointer.
///
/// Non-dispatchable handles (memory, buffers, images, ...) are plain 64 bit values and carry no
/// dispatch pointer, so they don't implement this trait.
pub trait DispatchableHandle: Handle + Copy {}

impl DispatchableHandle for vk::Instance {}
impl DispatchableHandle for vk::PhysicalDevice {}
impl DispatchableHandle for vk::Device {}
impl DispatchableHandle for vk::Queue {}
impl DispatchableHandle for vk::CommandBuffer {}

/// Key under which the dispatch table of a dispatchable handle is stored.
///
/// The loader ABI guarantees that the first pointer sized field of every dispatchable object is
/// the loader's own dispatch table pointer. Child objects share it with their parent: a physical
/// device has the same identity as the instance it was enumerated from, and queues and command
/// buffers the same identity as their device. The identity stays stable for the lifetime of the
/// object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleIdentity(usize);

impl HandleIdentity {
    /// Derives the identity of `handle`.
    ///
    /// # Safety
    ///
    /// `handle` must be a live, non-null dispatchable handle created through the loader.
    pub unsafe fn of<H: DispatchableHandle>(handle: H) -> Self {
        let object = handle.as_raw() as usize as *const usize;
        // SAFETY: The caller guarantees that the handle points to a loader created object, whose
        // first field is the dispatch pointer
        Self(unsafe { object.read() })
    }

    /// Returns the raw key value.
    pub fn as_usize(self) -> usize {
        self.0
    }
}
