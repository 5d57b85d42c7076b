// Frame synchronization engine
//
// Drives the acquire -> submit -> present cycle over a fixed ring of
// frame slots. The fence wait at the top of each frame bounds CPU-ahead
// submission to exactly the number of slots; the semaphore chain orders
// the GPU work itself. Staleness (out-of-date/suboptimal/resize) is
// recovered locally by swapchain recreation and never surfaced as an
// error; everything else propagates to the caller.

use ash::vk;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::context::{GpuContext, PresentDesc, SubmitDesc};
use super::swapchain::{RecreateOutcome, SwapchainManager};
use super::sync::FrameSlot;
use crate::error::{QueueRole, RenderError, RenderResult};

/// Large but finite fence timeout. Hitting it means the GPU is hung;
/// the wait maps that to a distinct error instead of looping silently.
pub const FENCE_WAIT_TIMEOUT_NS: u64 = 5_000_000_000;

/// What a single `draw_frame` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Submitted and presented normally
    Presented,
    /// The swapchain was stale; it was rebuilt and this frame skipped
    Recreated,
    /// Recreation was needed but deferred (zero-area surface)
    Deferred,
}

pub struct FrameEngine {
    frames: Vec<FrameSlot>,
    current_frame: usize,
    /// Set by the window layer on resize events, consumed at present time
    resize_requested: Arc<AtomicBool>,
}

impl FrameEngine {
    pub fn new<C: GpuContext>(ctx: &C, frames_in_flight: usize) -> RenderResult<Self> {
        // Reachable from config, so an error rather than a panic
        if frames_in_flight == 0 {
            return Err(RenderError::InitializationFailed(
                "max_frames_in_flight must be at least 1".into(),
            ));
        }

        let frames = (0..frames_in_flight)
            .map(|_| FrameSlot::new(ctx))
            .collect::<RenderResult<Vec<_>>>()?;

        log::info!("Frame engine ready: {} frames in flight", frames_in_flight);

        Ok(Self {
            frames,
            current_frame: 0,
            resize_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag handle for the window layer; setting it requests a swapchain
    /// rebuild at the next present.
    pub fn resize_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.resize_requested)
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Slot index the next `draw_frame` call will use.
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Render one frame.
    ///
    /// `window_extent` is the current window size, used when the
    /// swapchain has to be rebuilt mid-cycle.
    pub fn draw_frame<C: GpuContext>(
        &mut self,
        ctx: &C,
        chain: &mut SwapchainManager,
        window_extent: vk::Extent2D,
    ) -> RenderResult<FrameOutcome> {
        let result = self.drive_frame(ctx, chain, window_extent);
        // The slot rotates every call, stale frames included
        self.current_frame = (self.current_frame + 1) % self.frames.len();
        result
    }

    fn drive_frame<C: GpuContext>(
        &mut self,
        ctx: &C,
        chain: &mut SwapchainManager,
        window_extent: vk::Extent2D,
    ) -> RenderResult<FrameOutcome> {
        let slot = &self.frames[self.current_frame];

        // 1. Bound CPU-ahead submission: wait for the GPU work that last
        //    used this slot. Timeout here surfaces as GpuHang.
        ctx.wait_for_fence(slot.in_flight_fence, FENCE_WAIT_TIMEOUT_NS)?;

        // 2. Acquire. The returned index is valid immediately; the image
        //    itself is guarded by the image_available semaphore.
        let acquired =
            match ctx.acquire_next_image(chain.swapchain(), u64::MAX, slot.image_available) {
                Ok(acquired) => acquired,
                Err(e) if e.is_stale() => {
                    return self.recreate(ctx, chain, window_extent);
                }
                Err(e) => return Err(e),
            };
        if acquired.suboptimal {
            self.resize_requested.store(true, Ordering::Relaxed);
        }

        // 3. Reset only after the wait succeeded and an image is in hand;
        //    resetting earlier could leave the fence forever unsignaled if
        //    this frame never submits.
        ctx.reset_fence(slot.in_flight_fence)?;

        // 4. Submit the command buffer for the acquired image index (not
        //    the slot index; image count and slot count differ).
        ctx.submit(
            QueueRole::Graphics,
            &SubmitDesc {
                wait_semaphore: slot.image_available,
                wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                command_buffer: chain.command_buffer(acquired.index),
                signal_semaphore: slot.render_finished,
            },
            slot.in_flight_fence,
        )?;

        // 5. Present, then fold in any externally-flagged resize.
        let mut stale = match ctx.present(
            QueueRole::Present,
            &PresentDesc {
                wait_semaphore: slot.render_finished,
                swapchain: chain.swapchain(),
                image_index: acquired.index,
            },
        ) {
            Ok(suboptimal) => suboptimal,
            Err(e) if e.is_stale() => true,
            Err(e) => return Err(e),
        };
        stale |= self.resize_requested.swap(false, Ordering::Relaxed);

        if stale {
            return self.recreate(ctx, chain, window_extent);
        }

        Ok(FrameOutcome::Presented)
    }

    fn recreate<C: GpuContext>(
        &mut self,
        ctx: &C,
        chain: &mut SwapchainManager,
        window_extent: vk::Extent2D,
    ) -> RenderResult<FrameOutcome> {
        match chain.recreate(ctx, window_extent)? {
            RecreateOutcome::Recreated => {
                // The rebuilt chain already matches the surface
                self.resize_requested.store(false, Ordering::Relaxed);
                Ok(FrameOutcome::Recreated)
            }
            RecreateOutcome::Deferred => {
                // Re-arm so the retry is not lost once the surface has area
                self.resize_requested.store(true, Ordering::Relaxed);
                Ok(FrameOutcome::Deferred)
            }
        }
    }

    /// Final teardown. The caller must have waited for device idle.
    pub fn destroy<C: GpuContext>(&mut self, ctx: &C) {
        for slot in self.frames.drain(..) {
            slot.destroy(ctx);
        }
    }
}
