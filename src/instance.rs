use ash::vk;
use log::{debug, info, warn};
use memtrack_dispatch::{HandleIdentity, InstanceDispatch, next_instance_link};
use memtrack_shared::{LayerError, Scope};

use crate::{OrFatal, layer, logging, setup_failure};

/// `vkCreateInstance` of the layer
///
/// Takes this layer's link out of the loader chain, creates the instance through the next link and
/// captures the instance's dispatch table.
pub unsafe extern "system" fn create_instance(
    p_create_info: *const vk::InstanceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_instance: *mut vk::Instance,
) -> vk::Result {
    logging::init();

    // SAFETY: The create info is valid or null
    let Some(create_info) = (unsafe { p_create_info.as_ref() }) else {
        return setup_failure(
            c"vkCreateInstance",
            &LayerError::MissingLinkInfo(Scope::Instance),
        );
    };
    // SAFETY: The loader passes its own create info
    let next = match unsafe { next_instance_link(create_info) } {
        Ok(next) => next,
        Err(err) => return setup_failure(c"vkCreateInstance", &err),
    };
    let create = match next.create_instance() {
        Ok(create) => create,
        Err(err) => return setup_failure(c"vkCreateInstance", &err),
    };

    // SAFETY: Arguments are passed on unchanged, with our link taken out of the chain
    let result = unsafe { create(p_create_info, p_allocator, p_instance) };
    if result != vk::Result::SUCCESS {
        debug!("Next link failed to create an instance: {result}");
        return result;
    }
    // SAFETY: The next link wrote the new instance
    let instance = unsafe { p_instance.read() };

    // SAFETY: The instance was just created by the next link
    match unsafe { InstanceDispatch::load(instance, next.get_instance_proc_addr) } {
        Ok(table) => {
            // SAFETY: The instance is a live dispatchable handle
            let key = unsafe { HandleIdentity::of(instance) };
            layer().publish_instance(key, table);
            info!("Created instance {instance:?}");
            vk::Result::SUCCESS
        }
        Err(err) => {
            // SAFETY: The instance was created by the next link and is unknown to the application
            match unsafe { next.destroy_instance(instance) } {
                // SAFETY: Same allocator as the creation
                Ok(destroy) => unsafe { destroy(instance, p_allocator) },
                Err(destroy_err) => warn!("Leaking instance {instance:?}: {destroy_err}"),
            }
            // SAFETY: The application must not see the destroyed handle
            unsafe { p_instance.write(vk::Instance::null()) };
            setup_failure(c"vkCreateInstance", &err)
        }
    }
}

/// `vkDestroyInstance` of the layer
pub unsafe extern "system" fn destroy_instance(
    instance: vk::Instance,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if instance == vk::Instance::null() {
        return;
    }

    // SAFETY: The application passes a live instance
    let key = unsafe { HandleIdentity::of(instance) };
    // The entry is gone before the driver frees the instance, a new instance reusing the loader's
    // dispatch pointer can't be confused with this one
    let table = layer().remove_instance(key).or_fatal(c"vkDestroyInstance");
    // SAFETY: Arguments are passed on unchanged
    unsafe { (table.destroy_instance)(instance, p_allocator) };
    info!("Destroyed instance {instance:?}");
}
