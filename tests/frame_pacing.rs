// Frame pacing and swapchain lifecycle, driven against a fake GPU
// context that counts every create/destroy/queue call.

use std::cell::RefCell;
use std::collections::HashSet;

use ash::vk::{self, Handle};

use frameloop::backend::context::{
    AcquiredImage, GpuContext, PipelineDesc, PresentDesc, SubmitDesc, SwapchainDesc,
};
use frameloop::backend::frame::{FrameEngine, FrameOutcome};
use frameloop::backend::swapchain::{DrawSpec, RecreateOutcome, SwapchainManager};
use frameloop::error::{QueueRole, RenderError, RenderResult};

const SURFACE: u64 = 7;

#[derive(Default, Clone, Copy)]
struct Counts {
    created: usize,
    destroyed: usize,
}

impl Counts {
    fn balanced(&self) -> bool {
        self.created == self.destroyed
    }
}

struct FakeState {
    next_handle: u64,

    // Surface the fake reports
    caps: vk::SurfaceCapabilitiesKHR,
    formats: Vec<vk::SurfaceFormatKHR>,
    modes: Vec<vk::PresentModeKHR>,
    image_count: u32,

    // Queue / sync call counters
    acquire_calls: usize,
    submit_calls: usize,
    present_calls: usize,
    wait_idle_calls: usize,
    recorded_buffers: usize,

    // Fault injection
    acquire_out_of_date_on: Option<usize>,
    acquire_suboptimal_on: Option<usize>,
    present_suboptimal_on: Option<usize>,
    fail_next_framebuffer: bool,
    submit_error: Option<RenderError>,
    wait_error: Option<RenderError>,

    // Fence model: signaled state plus which fences have GPU work
    // pending. Waiting on a pending fence "completes" that work.
    signaled: HashSet<u64>,
    pending: HashSet<u64>,
    outstanding: usize,
    max_outstanding: usize,

    // Resource bookkeeping
    swapchains: Counts,
    image_views: Counts,
    framebuffers: Counts,
    render_passes: Counts,
    pipeline_layouts: Counts,
    pipelines: Counts,
    semaphores: Counts,
    fences: Counts,
    command_buffers: Counts,
    swapchain_events: Vec<&'static str>,

    acquire_cursor: u32,
}

struct FakeContext {
    state: RefCell<FakeState>,
}

impl FakeContext {
    fn new(image_count: u32) -> Self {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: image_count.saturating_sub(1).max(1),
            max_image_count: 0,
            current_extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };

        Self {
            state: RefCell::new(FakeState {
                next_handle: 100,
                caps,
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                image_count,
                acquire_calls: 0,
                submit_calls: 0,
                present_calls: 0,
                wait_idle_calls: 0,
                recorded_buffers: 0,
                acquire_out_of_date_on: None,
                acquire_suboptimal_on: None,
                present_suboptimal_on: None,
                fail_next_framebuffer: false,
                submit_error: None,
                wait_error: None,
                signaled: HashSet::new(),
                pending: HashSet::new(),
                outstanding: 0,
                max_outstanding: 0,
                swapchains: Counts::default(),
                image_views: Counts::default(),
                framebuffers: Counts::default(),
                render_passes: Counts::default(),
                pipeline_layouts: Counts::default(),
                pipelines: Counts::default(),
                semaphores: Counts::default(),
                fences: Counts::default(),
                command_buffers: Counts::default(),
                swapchain_events: Vec::new(),
                acquire_cursor: 0,
            }),
        }
    }

    fn handle(state: &mut FakeState) -> u64 {
        state.next_handle += 1;
        state.next_handle
    }

    fn fail_acquire_on(&self, call: usize) {
        self.state.borrow_mut().acquire_out_of_date_on = Some(call);
    }

    fn mark_acquire_suboptimal_on(&self, call: usize) {
        self.state.borrow_mut().acquire_suboptimal_on = Some(call);
    }

    fn mark_present_suboptimal_on(&self, call: usize) {
        self.state.borrow_mut().present_suboptimal_on = Some(call);
    }

    fn fail_next_framebuffer(&self) {
        self.state.borrow_mut().fail_next_framebuffer = true;
    }

    fn fail_submit_with(&self, error: RenderError) {
        self.state.borrow_mut().submit_error = Some(error);
    }

    fn fail_wait_with(&self, error: RenderError) {
        self.state.borrow_mut().wait_error = Some(error);
    }

    fn set_current_extent(&self, width: u32, height: u32) {
        self.state.borrow_mut().caps.current_extent = vk::Extent2D { width, height };
    }
}

fn draw_spec() -> DrawSpec {
    DrawSpec {
        vert_shader: vk::ShaderModule::from_raw(1001),
        frag_shader: vk::ShaderModule::from_raw(1002),
        clear_color: [0.0, 0.0, 0.0, 1.0],
        vertex_buffer: Some(vk::Buffer::from_raw(2001)),
        vertex_count: 3,
    }
}

fn manager(ctx: &FakeContext) -> SwapchainManager {
    SwapchainManager::create(
        ctx,
        vk::SurfaceKHR::from_raw(SURFACE),
        vk::Extent2D {
            width: 640,
            height: 480,
        },
        vk::PresentModeKHR::MAILBOX,
        draw_spec(),
    )
    .expect("swapchain creation against the fake cannot fail")
}

fn window_extent() -> vk::Extent2D {
    vk::Extent2D {
        width: 640,
        height: 480,
    }
}

impl GpuContext for FakeContext {
    fn surface_capabilities(
        &self,
        _surface: vk::SurfaceKHR,
    ) -> RenderResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.state.borrow().caps)
    }

    fn surface_formats(&self, _surface: vk::SurfaceKHR) -> RenderResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.state.borrow().formats.clone())
    }

    fn present_modes(&self, _surface: vk::SurfaceKHR) -> RenderResult<Vec<vk::PresentModeKHR>> {
        Ok(self.state.borrow().modes.clone())
    }

    fn create_swapchain(&self, _desc: &SwapchainDesc) -> RenderResult<vk::SwapchainKHR> {
        let mut state = self.state.borrow_mut();
        state.swapchains.created += 1;
        state.swapchain_events.push("create");
        let h = Self::handle(&mut state);
        Ok(vk::SwapchainKHR::from_raw(h))
    }

    fn destroy_swapchain(&self, _swapchain: vk::SwapchainKHR) {
        let mut state = self.state.borrow_mut();
        state.swapchains.destroyed += 1;
        state.swapchain_events.push("destroy");
    }

    fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> RenderResult<Vec<vk::Image>> {
        let mut state = self.state.borrow_mut();
        let count = state.image_count;
        Ok((0..count)
            .map(|_| vk::Image::from_raw(Self::handle(&mut state)))
            .collect())
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
    ) -> RenderResult<vk::ImageView> {
        let mut state = self.state.borrow_mut();
        state.image_views.created += 1;
        let h = Self::handle(&mut state);
        Ok(vk::ImageView::from_raw(h))
    }

    fn destroy_image_view(&self, _view: vk::ImageView) {
        self.state.borrow_mut().image_views.destroyed += 1;
    }

    fn create_render_pass(&self, _format: vk::Format) -> RenderResult<vk::RenderPass> {
        let mut state = self.state.borrow_mut();
        state.render_passes.created += 1;
        let h = Self::handle(&mut state);
        Ok(vk::RenderPass::from_raw(h))
    }

    fn destroy_render_pass(&self, _render_pass: vk::RenderPass) {
        self.state.borrow_mut().render_passes.destroyed += 1;
    }

    fn create_pipeline_layout(&self) -> RenderResult<vk::PipelineLayout> {
        let mut state = self.state.borrow_mut();
        state.pipeline_layouts.created += 1;
        let h = Self::handle(&mut state);
        Ok(vk::PipelineLayout::from_raw(h))
    }

    fn destroy_pipeline_layout(&self, _layout: vk::PipelineLayout) {
        self.state.borrow_mut().pipeline_layouts.destroyed += 1;
    }

    fn create_pipeline(&self, _desc: &PipelineDesc) -> RenderResult<vk::Pipeline> {
        let mut state = self.state.borrow_mut();
        state.pipelines.created += 1;
        let h = Self::handle(&mut state);
        Ok(vk::Pipeline::from_raw(h))
    }

    fn destroy_pipeline(&self, _pipeline: vk::Pipeline) {
        self.state.borrow_mut().pipelines.destroyed += 1;
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> RenderResult<vk::Framebuffer> {
        let mut state = self.state.borrow_mut();
        if state.fail_next_framebuffer {
            state.fail_next_framebuffer = false;
            return Err(RenderError::OutOfDeviceMemory);
        }
        state.framebuffers.created += 1;
        let h = Self::handle(&mut state);
        Ok(vk::Framebuffer::from_raw(h))
    }

    fn destroy_framebuffer(&self, _framebuffer: vk::Framebuffer) {
        self.state.borrow_mut().framebuffers.destroyed += 1;
    }

    fn create_semaphore(&self) -> RenderResult<vk::Semaphore> {
        let mut state = self.state.borrow_mut();
        state.semaphores.created += 1;
        let h = Self::handle(&mut state);
        Ok(vk::Semaphore::from_raw(h))
    }

    fn destroy_semaphore(&self, _semaphore: vk::Semaphore) {
        self.state.borrow_mut().semaphores.destroyed += 1;
    }

    fn create_fence(&self, signaled: bool) -> RenderResult<vk::Fence> {
        let mut state = self.state.borrow_mut();
        state.fences.created += 1;
        let h = Self::handle(&mut state);
        if signaled {
            state.signaled.insert(h);
        }
        Ok(vk::Fence::from_raw(h))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.borrow_mut();
        state.fences.destroyed += 1;
        state.signaled.remove(&fence.as_raw());
        state.pending.remove(&fence.as_raw());
    }

    fn allocate_command_buffers(&self, count: u32) -> RenderResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.borrow_mut();
        state.command_buffers.created += count as usize;
        Ok((0..count)
            .map(|_| vk::CommandBuffer::from_raw(Self::handle(&mut state)))
            .collect())
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        self.state.borrow_mut().command_buffers.destroyed += buffers.len();
    }

    fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        _timeout: u64,
        _signal: vk::Semaphore,
    ) -> RenderResult<AcquiredImage> {
        let mut state = self.state.borrow_mut();
        state.acquire_calls += 1;

        if state.acquire_out_of_date_on == Some(state.acquire_calls) {
            state.acquire_out_of_date_on = None;
            return Err(RenderError::OutOfDate);
        }

        let suboptimal = state.acquire_suboptimal_on == Some(state.acquire_calls);
        if suboptimal {
            state.acquire_suboptimal_on = None;
        }

        let index = state.acquire_cursor % state.image_count;
        state.acquire_cursor += 1;
        Ok(AcquiredImage { index, suboptimal })
    }

    fn submit(&self, _role: QueueRole, _desc: &SubmitDesc, fence: vk::Fence) -> RenderResult<()> {
        let mut state = self.state.borrow_mut();
        state.submit_calls += 1;

        if let Some(error) = state.submit_error.take() {
            return Err(error);
        }

        state.pending.insert(fence.as_raw());
        state.outstanding += 1;
        state.max_outstanding = state.max_outstanding.max(state.outstanding);
        Ok(())
    }

    fn present(&self, _role: QueueRole, _desc: &PresentDesc) -> RenderResult<bool> {
        let mut state = self.state.borrow_mut();
        state.present_calls += 1;

        let suboptimal = state.present_suboptimal_on == Some(state.present_calls);
        if suboptimal {
            state.present_suboptimal_on = None;
        }
        Ok(suboptimal)
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> RenderResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.wait_error.take() {
            return Err(error);
        }
        // Waiting on pending GPU work completes it
        if state.pending.remove(&fence.as_raw()) {
            state.outstanding -= 1;
        }
        state.signaled.insert(fence.as_raw());
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> RenderResult<()> {
        let mut state = self.state.borrow_mut();
        assert!(
            !state.pending.contains(&fence.as_raw()),
            "fence reset while GPU work referencing it is still in flight"
        );
        state.signaled.remove(&fence.as_raw());
        Ok(())
    }

    fn device_wait_idle(&self) -> RenderResult<()> {
        let mut state = self.state.borrow_mut();
        state.wait_idle_calls += 1;
        // All pending work completes
        let drained: Vec<u64> = state.pending.drain().collect();
        for fence in drained {
            state.signaled.insert(fence);
        }
        state.outstanding = 0;
        Ok(())
    }

    fn begin_commands(&self, _cmd: vk::CommandBuffer) -> RenderResult<()> {
        self.state.borrow_mut().recorded_buffers += 1;
        Ok(())
    }

    fn begin_render_pass(
        &self,
        _cmd: vk::CommandBuffer,
        _render_pass: vk::RenderPass,
        _framebuffer: vk::Framebuffer,
        _extent: vk::Extent2D,
        _clear_color: [f32; 4],
    ) {
    }

    fn bind_pipeline(&self, _cmd: vk::CommandBuffer, _pipeline: vk::Pipeline) {}

    fn bind_vertex_buffer(&self, _cmd: vk::CommandBuffer, _buffer: vk::Buffer) {}

    fn draw(&self, _cmd: vk::CommandBuffer, _vertex_count: u32) {}

    fn end_render_pass(&self, _cmd: vk::CommandBuffer) {}

    fn end_commands(&self, _cmd: vk::CommandBuffer) -> RenderResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------

#[test]
fn five_successful_frames_rotate_two_slots_over_three_images() {
    let ctx = FakeContext::new(3);
    let mut chain = manager(&ctx);
    let mut engine = FrameEngine::new(&ctx, 2).unwrap();
    assert_eq!(engine.frames_in_flight(), 2);

    let mut slots = Vec::new();
    for _ in 0..5 {
        slots.push(engine.current_frame());
        let outcome = engine.draw_frame(&ctx, &mut chain, window_extent()).unwrap();
        assert_eq!(outcome, FrameOutcome::Presented);
    }

    assert_eq!(slots, vec![0, 1, 0, 1, 0]);

    let state = ctx.state.borrow();
    assert_eq!(state.acquire_calls, 5);
    assert_eq!(state.submit_calls, 5);
    assert_eq!(state.present_calls, 5);
    assert_eq!(state.swapchains.created, 1, "no recreation expected");
}

#[test]
fn in_flight_submissions_are_bounded_by_slot_count() {
    let ctx = FakeContext::new(3);
    let mut chain = manager(&ctx);
    let mut engine = FrameEngine::new(&ctx, 2).unwrap();

    for _ in 0..8 {
        engine.draw_frame(&ctx, &mut chain, window_extent()).unwrap();
    }

    let state = ctx.state.borrow();
    assert!(
        state.max_outstanding <= 2,
        "saw {} submissions in flight with 2 slots",
        state.max_outstanding
    );
}

#[test]
fn slot_rotation_is_unaffected_by_recreation() {
    let ctx = FakeContext::new(3);
    let mut chain = manager(&ctx);
    let mut engine = FrameEngine::new(&ctx, 2).unwrap();

    ctx.fail_acquire_on(3);

    let mut slots = Vec::new();
    for _ in 0..6 {
        slots.push(engine.current_frame());
        engine.draw_frame(&ctx, &mut chain, window_extent()).unwrap();
    }

    // K mod 2, staleness on the 3rd call included
    assert_eq!(slots, vec![0, 1, 0, 1, 0, 1]);
    assert_eq!(engine.current_frame(), 0);
}

#[test]
fn recreation_twice_stays_consistent_and_leaks_nothing() {
    let ctx = FakeContext::new(3);
    let mut chain = manager(&ctx);

    for _ in 0..2 {
        let outcome = chain.recreate(&ctx, window_extent()).unwrap();
        assert_eq!(outcome, RecreateOutcome::Recreated);

        let state = chain.state();
        assert!(state.is_consistent());
        assert_eq!(state.image_count(), 3);
        assert_eq!((chain.extent().width, chain.extent().height), (640, 480));
    }

    chain.destroy(&ctx);

    let state = ctx.state.borrow();
    assert!(state.swapchains.balanced(), "swapchain leak");
    assert!(state.image_views.balanced(), "image view leak");
    assert!(state.framebuffers.balanced(), "framebuffer leak");
    assert!(state.render_passes.balanced(), "render pass leak");
    assert!(state.pipeline_layouts.balanced(), "pipeline layout leak");
    assert!(state.pipelines.balanced(), "pipeline leak");
    assert!(state.command_buffers.balanced(), "command buffer leak");
}

#[test]
fn stale_acquire_triggers_one_recreation_then_recovers() {
    let ctx = FakeContext::new(3);
    let mut chain = manager(&ctx);
    let mut engine = FrameEngine::new(&ctx, 2).unwrap();

    ctx.fail_acquire_on(3);

    for _ in 0..2 {
        let outcome = engine.draw_frame(&ctx, &mut chain, window_extent()).unwrap();
        assert_eq!(outcome, FrameOutcome::Presented);
    }

    // 3rd call: stale acquire, no submit, one rebuild
    let outcome = engine.draw_frame(&ctx, &mut chain, window_extent()).unwrap();
    assert_eq!(outcome, FrameOutcome::Recreated);

    {
        let state = ctx.state.borrow();
        assert_eq!(state.submit_calls, 2);
        assert_eq!(state.swapchain_events, vec!["create", "destroy", "create"]);
        // All command buffers re-recorded against the new generation
        assert_eq!(state.recorded_buffers, 6);
    }

    // 4th call: clean retry
    let outcome = engine.draw_frame(&ctx, &mut chain, window_extent()).unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);

    let state = ctx.state.borrow();
    assert_eq!(state.acquire_calls, 4);
    assert_eq!(state.submit_calls, 3);
    assert_eq!(state.present_calls, 3);
}

#[test]
fn device_lost_on_submit_propagates_without_recreation() {
    let ctx = FakeContext::new(3);
    let mut chain = manager(&ctx);
    let mut engine = FrameEngine::new(&ctx, 2).unwrap();

    ctx.fail_submit_with(RenderError::DeviceLost);

    let result = engine.draw_frame(&ctx, &mut chain, window_extent());
    assert_eq!(result, Err(RenderError::DeviceLost));

    let state = ctx.state.borrow();
    assert_eq!(state.swapchains.created, 1, "no recreation on fatal error");
    assert_eq!(state.present_calls, 0);
}

#[test]
fn fence_timeout_surfaces_as_gpu_hang() {
    let ctx = FakeContext::new(3);
    let mut chain = manager(&ctx);
    let mut engine = FrameEngine::new(&ctx, 2).unwrap();

    ctx.fail_wait_with(RenderError::GpuHang);

    let result = engine.draw_frame(&ctx, &mut chain, window_extent());
    assert_eq!(result, Err(RenderError::GpuHang));

    let state = ctx.state.borrow();
    assert_eq!(state.acquire_calls, 0, "no acquire after a hung fence wait");
}

#[test]
fn zero_area_surface_defers_recreation() {
    let ctx = FakeContext::new(3);
    let mut chain = manager(&ctx);
    let mut engine = FrameEngine::new(&ctx, 2).unwrap();

    // Minimized: the surface reports no usable area
    ctx.set_current_extent(0, 0);
    ctx.fail_acquire_on(1);

    let outcome = engine
        .draw_frame(&ctx, &mut chain, vk::Extent2D { width: 0, height: 0 })
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Deferred);

    // The old generation was left untouched
    let state = ctx.state.borrow();
    assert_eq!(state.swapchains.destroyed, 0);
    assert!(chain.state().is_consistent());
    assert_eq!(chain.state().image_count(), 3);
}

#[test]
fn suboptimal_present_completes_the_frame_then_recreates() {
    let ctx = FakeContext::new(3);
    let mut chain = manager(&ctx);
    let mut engine = FrameEngine::new(&ctx, 2).unwrap();

    ctx.mark_present_suboptimal_on(1);

    let outcome = engine.draw_frame(&ctx, &mut chain, window_extent()).unwrap();
    assert_eq!(outcome, FrameOutcome::Recreated);

    {
        let state = ctx.state.borrow();
        // The image was still presented before the rebuild
        assert_eq!(state.submit_calls, 1);
        assert_eq!(state.present_calls, 1);
        assert_eq!(state.swapchain_events, vec!["create", "destroy", "create"]);
    }

    let outcome = engine.draw_frame(&ctx, &mut chain, window_extent()).unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);
}

#[test]
fn suboptimal_acquire_presents_then_recreates_once() {
    let ctx = FakeContext::new(3);
    let mut chain = manager(&ctx);
    let mut engine = FrameEngine::new(&ctx, 2).unwrap();

    ctx.mark_acquire_suboptimal_on(1);

    let outcome = engine.draw_frame(&ctx, &mut chain, window_extent()).unwrap();
    assert_eq!(outcome, FrameOutcome::Recreated);

    {
        let state = ctx.state.borrow();
        // A suboptimal acquire still yields a usable image
        assert_eq!(state.submit_calls, 1);
        assert_eq!(state.present_calls, 1);
        assert_eq!(state.swapchains.created, 2);
    }

    // The rebuild cleared the flag; no second recreation
    let outcome = engine.draw_frame(&ctx, &mut chain, window_extent()).unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);
    assert_eq!(ctx.state.borrow().swapchains.created, 2);
}

#[test]
fn zero_frames_in_flight_is_rejected() {
    let ctx = FakeContext::new(3);
    assert!(matches!(
        FrameEngine::new(&ctx, 0),
        Err(RenderError::InitializationFailed(_))
    ));
    // Nothing was created for the rejected engine
    assert_eq!(ctx.state.borrow().semaphores.created, 0);
}

#[test]
fn failed_rebuild_releases_partial_resources() {
    let ctx = FakeContext::new(3);
    let mut chain = manager(&ctx);

    ctx.fail_next_framebuffer();
    let result = chain.recreate(&ctx, window_extent());
    assert_eq!(result, Err(RenderError::OutOfDeviceMemory));

    let state = ctx.state.borrow();
    assert!(state.swapchains.balanced(), "swapchain leak");
    assert!(state.image_views.balanced(), "image view leak");
    assert!(state.framebuffers.balanced(), "framebuffer leak");
    assert!(state.render_passes.balanced(), "render pass leak");
    assert!(state.pipeline_layouts.balanced(), "pipeline layout leak");
    assert!(state.pipelines.balanced(), "pipeline leak");
    assert!(state.command_buffers.balanced(), "command buffer leak");
}

#[test]
fn frame_slots_are_torn_down_with_the_engine() {
    let ctx = FakeContext::new(3);
    let mut engine = FrameEngine::new(&ctx, 2).unwrap();

    {
        let state = ctx.state.borrow();
        assert_eq!(state.semaphores.created, 4);
        assert_eq!(state.fences.created, 2);
    }

    engine.destroy(&ctx);

    let state = ctx.state.borrow();
    assert!(state.semaphores.balanced());
    assert!(state.fences.balanced());
}
