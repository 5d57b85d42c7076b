// GpuContext - the capability interface the core consumes
//
// The swapchain manager, frame engine, and command recorder only ever talk
// to this trait. The real implementation (VulkanContext) forwards to ash;
// the integration tests drive the same code with a counting fake.

use ash::vk;

use crate::error::{QueueRole, RenderResult};

/// Everything needed to request a swapchain from the presentation system.
#[derive(Debug, Clone)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub min_image_count: u32,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// Inputs for building a graphics pipeline against the current generation.
/// Shader modules outlive swapchain generations; render pass and extent do not.
#[derive(Debug, Clone, Copy)]
pub struct PipelineDesc {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub extent: vk::Extent2D,
    pub vert_shader: vk::ShaderModule,
    pub frag_shader: vk::ShaderModule,
}

/// One queue submission: wait for the acquired image at color-attachment
/// output, run one command buffer, signal render-finished and the slot fence.
#[derive(Debug, Clone, Copy)]
pub struct SubmitDesc {
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub command_buffer: vk::CommandBuffer,
    pub signal_semaphore: vk::Semaphore,
}

/// One presentation request for an acquired image.
#[derive(Debug, Clone, Copy)]
pub struct PresentDesc {
    pub wait_semaphore: vk::Semaphore,
    pub swapchain: vk::SwapchainKHR,
    pub image_index: u32,
}

/// Result of a successful image acquisition. The index is valid immediately;
/// the image contents are only safe once the signaled semaphore fires.
#[derive(Debug, Clone, Copy)]
pub struct AcquiredImage {
    pub index: u32,
    pub suboptimal: bool,
}

/// Factory and queue operations supplied by the GPU context.
///
/// Contract for staleness: `acquire_next_image` and `present` return
/// `Err(RenderError::OutOfDate)` when the surface changed under the chain;
/// a suboptimal-but-usable chain is reported through the boolean channel
/// (`AcquiredImage::suboptimal`, `present -> Ok(true)`).
pub trait GpuContext {
    fn surface_capabilities(
        &self,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(&self, surface: vk::SurfaceKHR) -> RenderResult<Vec<vk::SurfaceFormatKHR>>;
    fn present_modes(&self, surface: vk::SurfaceKHR) -> RenderResult<Vec<vk::PresentModeKHR>>;

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RenderResult<vk::SwapchainKHR>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RenderResult<Vec<vk::Image>>;

    fn create_image_view(&self, image: vk::Image, format: vk::Format)
        -> RenderResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_render_pass(&self, format: vk::Format) -> RenderResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_pipeline_layout(&self) -> RenderResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    fn create_pipeline(&self, desc: &PipelineDesc) -> RenderResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> RenderResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    fn create_semaphore(&self) -> RenderResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    /// `signaled` starts the fence signaled so a first wait does not block.
    fn create_fence(&self, signaled: bool) -> RenderResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);

    fn allocate_command_buffers(&self, count: u32) -> RenderResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]);

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> RenderResult<AcquiredImage>;

    fn submit(&self, role: QueueRole, desc: &SubmitDesc, fence: vk::Fence) -> RenderResult<()>;

    /// Returns true when the presentation engine reports the chain suboptimal.
    fn present(&self, role: QueueRole, desc: &PresentDesc) -> RenderResult<bool>;

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> RenderResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> RenderResult<()>;
    fn device_wait_idle(&self) -> RenderResult<()>;

    // Command recording. Buffers are replayed every time their image index is
    // acquired, so begin_commands records with the simultaneous-use flag.
    fn begin_commands(&self, cmd: vk::CommandBuffer) -> RenderResult<()>;
    fn begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    );
    fn bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    fn draw(&self, cmd: vk::CommandBuffer, vertex_count: u32);
    fn end_render_pass(&self, cmd: vk::CommandBuffer);
    fn end_commands(&self, cmd: vk::CommandBuffer) -> RenderResult<()>;
}
