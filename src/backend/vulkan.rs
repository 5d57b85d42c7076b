// VulkanContext - real GpuContext over ash
//
// Thin forwarding layer: every trait operation maps to one or two ash
// calls, with vk::Result codes converted into the RenderError taxonomy
// at this boundary. Nothing above this file touches ash directly for
// swapchain, sync, or queue work.

use ash::vk;
use std::sync::Arc;

use super::context::{
    AcquiredImage, GpuContext, PipelineDesc, PresentDesc, SubmitDesc, SwapchainDesc,
};
use super::pipeline;
use super::VulkanDevice;
use crate::error::{QueueRole, RenderError, RenderResult};

pub struct VulkanContext {
    device: Arc<VulkanDevice>,
    surface_loader: ash::extensions::khr::Surface,
    swapchain_loader: ash::extensions::khr::Swapchain,
}

impl VulkanContext {
    pub fn new(device: Arc<VulkanDevice>, surface_loader: ash::extensions::khr::Surface) -> Self {
        let swapchain_loader =
            ash::extensions::khr::Swapchain::new(&device.instance, &device.device);
        Self {
            device,
            surface_loader,
            swapchain_loader,
        }
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    // Graphics and present run on the same queue family here; the role
    // split exists so a dedicated present queue can slot in later.
    fn queue(&self, role: QueueRole) -> RenderResult<vk::Queue> {
        match role {
            QueueRole::Graphics | QueueRole::Present => Ok(self.device.graphics_queue),
        }
    }
}

impl GpuContext for VulkanContext {
    fn surface_capabilities(
        &self,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.device.physical_device, surface)
        }
        .map_err(RenderError::from)
    }

    fn surface_formats(&self, surface: vk::SurfaceKHR) -> RenderResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.device.physical_device, surface)
        }
        .map_err(RenderError::from)
    }

    fn present_modes(&self, surface: vk::SurfaceKHR) -> RenderResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.device.physical_device, surface)
        }
        .map_err(RenderError::from)
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RenderResult<vk::SwapchainKHR> {
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(desc.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.format)
            .image_color_space(desc.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true);

        unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(RenderError::from)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RenderResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(RenderError::from)
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
    ) -> RenderResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe { self.device.device.create_image_view(&create_info, None) }
            .map_err(RenderError::from)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.device.destroy_image_view(view, None) };
    }

    fn create_render_pass(&self, format: vk::Format) -> RenderResult<vk::RenderPass> {
        pipeline::create_render_pass(&self.device, format)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.device.destroy_render_pass(render_pass, None) };
    }

    fn create_pipeline_layout(&self) -> RenderResult<vk::PipelineLayout> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        unsafe { self.device.device.create_pipeline_layout(&layout_info, None) }
            .map_err(RenderError::from)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> RenderResult<vk::Pipeline> {
        pipeline::create_graphics_pipeline(
            &self.device,
            desc.render_pass,
            desc.layout,
            desc.extent,
            desc.vert_shader,
            desc.frag_shader,
        )
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.device.destroy_pipeline(pipeline, None) };
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> RenderResult<vk::Framebuffer> {
        pipeline::create_framebuffer(&self.device, render_pass, view, extent)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.device.destroy_framebuffer(framebuffer, None) };
    }

    fn create_semaphore(&self) -> RenderResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device.device.create_semaphore(&create_info, None) }
            .map_err(RenderError::from)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.device.destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> RenderResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.device.create_fence(&create_info, None) }.map_err(RenderError::from)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.device.destroy_fence(fence, None) };
    }

    fn allocate_command_buffers(&self, count: u32) -> RenderResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.device.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.device.allocate_command_buffers(&alloc_info) }
            .map_err(RenderError::from)
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        unsafe {
            self.device
                .device
                .free_command_buffers(self.device.command_pool, buffers)
        };
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> RenderResult<AcquiredImage> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout, signal, vk::Fence::null())
        }?;
        Ok(AcquiredImage { index, suboptimal })
    }

    fn submit(&self, role: QueueRole, desc: &SubmitDesc, fence: vk::Fence) -> RenderResult<()> {
        let queue = self.queue(role)?;

        let wait_semaphores = [desc.wait_semaphore];
        let wait_stages = [desc.wait_stage];
        let command_buffers = [desc.command_buffer];
        let signal_semaphores = [desc.signal_semaphore];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(queue, &[submit_info.build()], fence)
        }?;
        Ok(())
    }

    fn present(&self, role: QueueRole, desc: &PresentDesc) -> RenderResult<bool> {
        let queue = self.queue(role)?;

        let wait_semaphores = [desc.wait_semaphore];
        let swapchains = [desc.swapchain];
        let image_indices = [desc.image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal =
            unsafe { self.swapchain_loader.queue_present(queue, &present_info) }?;
        Ok(suboptimal)
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> RenderResult<()> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[fence], true, timeout_ns)
        }?;
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> RenderResult<()> {
        unsafe { self.device.device.reset_fences(&[fence]) }?;
        Ok(())
    }

    fn device_wait_idle(&self) -> RenderResult<()> {
        self.device.wait_idle()
    }

    fn begin_commands(&self, cmd: vk::CommandBuffer) -> RenderResult<()> {
        // The same buffer is replayed whenever its image index comes up
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
        unsafe { self.device.device.begin_command_buffer(cmd, &begin_info) }?;
        Ok(())
    }

    fn begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device.device.cmd_begin_render_pass(
                cmd,
                &begin_info,
                vk::SubpassContents::INLINE,
            )
        };
    }

    fn bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    fn bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe {
            self.device
                .device
                .cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0])
        };
    }

    fn draw(&self, cmd: vk::CommandBuffer, vertex_count: u32) {
        unsafe { self.device.device.cmd_draw(cmd, vertex_count, 1, 0, 0) };
    }

    fn end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.device.cmd_end_render_pass(cmd) };
    }

    fn end_commands(&self, cmd: vk::CommandBuffer) -> RenderResult<()> {
        unsafe { self.device.device.end_command_buffer(cmd) }?;
        Ok(())
    }
}
