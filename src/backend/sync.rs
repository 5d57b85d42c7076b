// Synchronization primitives
//
// One FrameSlot per frame in flight: a semaphore pair ordering GPU work
// and a fence bounding how far the CPU may run ahead. Slots are created
// once at engine init and live until engine teardown; swapchain
// recreation never touches them.

use ash::vk;

use super::context::GpuContext;
use crate::error::RenderResult;

/// Frame synchronization - one per frame in flight
pub struct FrameSlot {
    /// Signaled when the acquired swapchain image is safe to render into
    pub image_available: vk::Semaphore,
    /// Signaled when rendering to the image is complete
    pub render_finished: vk::Semaphore,
    /// Signaled when all GPU work submitted for this slot has finished.
    /// Created pre-signaled so the first wait does not block forever.
    pub in_flight_fence: vk::Fence,
}

impl FrameSlot {
    pub fn new<C: GpuContext>(ctx: &C) -> RenderResult<Self> {
        Ok(Self {
            image_available: ctx.create_semaphore()?,
            render_finished: ctx.create_semaphore()?,
            in_flight_fence: ctx.create_fence(true)?,
        })
    }

    pub fn destroy<C: GpuContext>(&self, ctx: &C) {
        ctx.destroy_semaphore(self.image_available);
        ctx.destroy_semaphore(self.render_finished);
        ctx.destroy_fence(self.in_flight_fence);
    }
}
