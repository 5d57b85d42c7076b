// Swapchain - Window presentation
//
// Owns one generation of presentable resources at a time: the chain
// handle, its images, one view/framebuffer/command buffer per image,
// and the render pass + pipeline tied to the current format and extent.
// A generation is always torn down and rebuilt wholesale, never patched.

use ash::vk;

use super::commands;
use super::context::{GpuContext, PipelineDesc, SwapchainDesc};
use crate::error::{RenderError, RenderResult};

/// What to record into every command buffer of a generation.
#[derive(Debug, Clone, Copy)]
pub struct DrawSpec {
    pub vert_shader: vk::ShaderModule,
    pub frag_shader: vk::ShaderModule,
    pub clear_color: [f32; 4],
    pub vertex_buffer: Option<vk::Buffer>,
    pub vertex_count: u32,
}

/// One generation of presentable resources.
///
/// Invariant: `images`, `image_views`, `framebuffers`, and
/// `command_buffers` always have the same length.
pub struct SwapchainState {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    /// Owned by the presentation system, never destroyed by us
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub command_buffers: Vec<vk::CommandBuffer>,
}

impl SwapchainState {
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn is_consistent(&self) -> bool {
        self.images.len() == self.image_views.len()
            && self.images.len() == self.framebuffers.len()
            && self.images.len() == self.command_buffers.len()
    }
}

/// Outcome of a recreation request. A zero-area surface (minimized
/// window) defers rather than building a 0x0 chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreateOutcome {
    Recreated,
    Deferred,
}

pub struct SwapchainManager {
    surface: vk::SurfaceKHR,
    preferred_present_mode: vk::PresentModeKHR,
    draw: DrawSpec,
    state: SwapchainState,
    render_pass: vk::RenderPass,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl SwapchainManager {
    pub fn create<C: GpuContext>(
        ctx: &C,
        surface: vk::SurfaceKHR,
        desired_extent: vk::Extent2D,
        preferred_present_mode: vk::PresentModeKHR,
        draw: DrawSpec,
    ) -> RenderResult<Self> {
        let generation =
            Self::build_generation(ctx, surface, desired_extent, preferred_present_mode, &draw)?;

        let manager = Self {
            surface,
            preferred_present_mode,
            draw,
            state: generation.state,
            render_pass: generation.render_pass,
            pipeline_layout: generation.pipeline_layout,
            pipeline: generation.pipeline,
        };

        commands::record_command_buffers(
            ctx,
            &manager.state,
            manager.render_pass,
            manager.pipeline,
            &manager.draw,
        )?;

        Ok(manager)
    }

    /// Tear down the current generation and build a fresh one.
    ///
    /// Waits for the device to go idle before destroying anything, so no
    /// in-flight GPU work can still reference the old objects. If the
    /// surface currently has zero usable area the old generation is kept
    /// untouched and the request is deferred.
    pub fn recreate<C: GpuContext>(
        &mut self,
        ctx: &C,
        desired_extent: vk::Extent2D,
    ) -> RenderResult<RecreateOutcome> {
        let caps = ctx.surface_capabilities(self.surface)?;
        let extent = choose_extent(&caps, desired_extent);
        if extent.width == 0 || extent.height == 0 {
            log::debug!("Deferring swapchain recreation: surface has zero area");
            return Ok(RecreateOutcome::Deferred);
        }

        log::info!(
            "Recreating swapchain: {}x{}",
            extent.width,
            extent.height
        );

        ctx.device_wait_idle()?;
        self.destroy_generation(ctx);

        let generation = Self::build_generation(
            ctx,
            self.surface,
            desired_extent,
            self.preferred_present_mode,
            &self.draw,
        )?;
        self.state = generation.state;
        self.render_pass = generation.render_pass;
        self.pipeline_layout = generation.pipeline_layout;
        self.pipeline = generation.pipeline;

        commands::record_command_buffers(
            ctx,
            &self.state,
            self.render_pass,
            self.pipeline,
            &self.draw,
        )?;

        Ok(RecreateOutcome::Recreated)
    }

    /// Final teardown. The caller must have waited for device idle.
    pub fn destroy<C: GpuContext>(&mut self, ctx: &C) {
        self.destroy_generation(ctx);
    }

    fn build_generation<C: GpuContext>(
        ctx: &C,
        surface: vk::SurfaceKHR,
        desired_extent: vk::Extent2D,
        preferred_present_mode: vk::PresentModeKHR,
        draw: &DrawSpec,
    ) -> RenderResult<Generation> {
        let caps = ctx.surface_capabilities(surface)?;
        let formats = ctx.surface_formats(surface)?;
        let modes = ctx.present_modes(surface)?;

        let surface_format = choose_surface_format(&formats).ok_or_else(|| {
            RenderError::InitializationFailed("surface reports no formats".into())
        })?;
        let present_mode = choose_present_mode(&modes, preferred_present_mode);
        let extent = choose_extent(&caps, desired_extent);
        let min_image_count = choose_image_count(&caps);

        log::info!(
            "Creating swapchain: {}x{}, {:?}, {:?}, {} images requested",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            min_image_count
        );

        let swapchain = ctx.create_swapchain(&SwapchainDesc {
            surface,
            min_image_count,
            format: surface_format.format,
            color_space: surface_format.color_space,
            extent,
            present_mode,
            pre_transform: caps.current_transform,
        })?;

        // Everything built from here on is tracked in the partial so a
        // mid-build failure releases it instead of leaking.
        let mut partial = PartialGeneration::new(swapchain, surface_format.format, extent);
        match Self::fill_generation(ctx, &mut partial, draw) {
            Ok(generation) => Ok(generation),
            Err(e) => {
                partial.abort(ctx);
                Err(e)
            }
        }
    }

    fn fill_generation<C: GpuContext>(
        ctx: &C,
        partial: &mut PartialGeneration,
        draw: &DrawSpec,
    ) -> RenderResult<Generation> {
        partial.images = ctx.swapchain_images(partial.swapchain)?;
        log::info!("Swapchain delivered {} images", partial.images.len());

        for i in 0..partial.images.len() {
            let view = ctx.create_image_view(partial.images[i], partial.format)?;
            partial.image_views.push(view);
        }

        let render_pass = ctx.create_render_pass(partial.format)?;
        partial.render_pass = Some(render_pass);
        let pipeline_layout = ctx.create_pipeline_layout()?;
        partial.pipeline_layout = Some(pipeline_layout);
        let pipeline = ctx.create_pipeline(&PipelineDesc {
            render_pass,
            layout: pipeline_layout,
            extent: partial.extent,
            vert_shader: draw.vert_shader,
            frag_shader: draw.frag_shader,
        })?;
        partial.pipeline = Some(pipeline);

        for i in 0..partial.image_views.len() {
            let framebuffer =
                ctx.create_framebuffer(render_pass, partial.image_views[i], partial.extent)?;
            partial.framebuffers.push(framebuffer);
        }

        partial.command_buffers = ctx.allocate_command_buffers(partial.images.len() as u32)?;

        Ok(Generation {
            state: SwapchainState {
                swapchain: partial.swapchain,
                format: partial.format,
                extent: partial.extent,
                images: std::mem::take(&mut partial.images),
                image_views: std::mem::take(&mut partial.image_views),
                framebuffers: std::mem::take(&mut partial.framebuffers),
                command_buffers: std::mem::take(&mut partial.command_buffers),
            },
            render_pass,
            pipeline_layout,
            pipeline,
        })
    }

    // Dependency order: command buffers, framebuffers, pipeline, layout,
    // render pass, image views, swapchain.
    fn destroy_generation<C: GpuContext>(&mut self, ctx: &C) {
        ctx.free_command_buffers(&self.state.command_buffers);
        self.state.command_buffers.clear();

        for framebuffer in self.state.framebuffers.drain(..) {
            ctx.destroy_framebuffer(framebuffer);
        }
        ctx.destroy_pipeline(self.pipeline);
        self.pipeline = vk::Pipeline::null();
        ctx.destroy_pipeline_layout(self.pipeline_layout);
        self.pipeline_layout = vk::PipelineLayout::null();
        ctx.destroy_render_pass(self.render_pass);
        self.render_pass = vk::RenderPass::null();
        for view in self.state.image_views.drain(..) {
            ctx.destroy_image_view(view);
        }
        self.state.images.clear();
        ctx.destroy_swapchain(self.state.swapchain);
        self.state.swapchain = vk::SwapchainKHR::null();
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.state.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.state.extent
    }

    pub fn state(&self) -> &SwapchainState {
        &self.state
    }

    pub fn command_buffer(&self, image_index: u32) -> vk::CommandBuffer {
        self.state.command_buffers[image_index as usize]
    }
}

struct Generation {
    state: SwapchainState,
    render_pass: vk::RenderPass,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

/// In-progress generation build. On success its contents move into a
/// `Generation`; on failure `abort` destroys whatever was created,
/// in the same dependency order `destroy_generation` uses.
struct PartialGeneration {
    swapchain: vk::SwapchainKHR,
    format: vk::Format,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    render_pass: Option<vk::RenderPass>,
    pipeline_layout: Option<vk::PipelineLayout>,
    pipeline: Option<vk::Pipeline>,
    framebuffers: Vec<vk::Framebuffer>,
    command_buffers: Vec<vk::CommandBuffer>,
}

impl PartialGeneration {
    fn new(swapchain: vk::SwapchainKHR, format: vk::Format, extent: vk::Extent2D) -> Self {
        Self {
            swapchain,
            format,
            extent,
            images: Vec::new(),
            image_views: Vec::new(),
            render_pass: None,
            pipeline_layout: None,
            pipeline: None,
            framebuffers: Vec::new(),
            command_buffers: Vec::new(),
        }
    }

    fn abort<C: GpuContext>(self, ctx: &C) {
        ctx.free_command_buffers(&self.command_buffers);
        for framebuffer in self.framebuffers {
            ctx.destroy_framebuffer(framebuffer);
        }
        if let Some(pipeline) = self.pipeline {
            ctx.destroy_pipeline(pipeline);
        }
        if let Some(layout) = self.pipeline_layout {
            ctx.destroy_pipeline_layout(layout);
        }
        if let Some(render_pass) = self.render_pass {
            ctx.destroy_render_pass(render_pass);
        }
        for view in self.image_views {
            ctx.destroy_image_view(view);
        }
        ctx.destroy_swapchain(self.swapchain);
    }
}

/// Prefer 32-bit sRGB; otherwise take the first reported format.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Prefer the requested mode, then MAILBOX for low latency without
/// tearing. FIFO is the guaranteed fallback.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if modes.contains(&preferred) {
        preferred
    } else if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// A surface that reports a fixed current extent wins verbatim; the
/// u32::MAX sentinel means the window size decides, clamped to the
/// surface's reported bounds.
pub fn choose_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: desired.width.clamp(
                caps.min_image_extent.width,
                caps.max_image_extent.width,
            ),
            height: desired.height.clamp(
                caps.min_image_extent.height,
                caps.max_image_extent.height,
            ),
        }
    }
}

/// min + 1 for headroom, clamped to the max (0 meaning unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && count > caps.max_image_count {
        count = caps.max_image_count;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(
        current: (u32, u32),
        min: (u32, u32),
        max: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn extent_clamps_to_surface_bounds() {
        let caps = caps((u32::MAX, u32::MAX), (1, 1), (4096, 4096));
        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 8000,
                height: 8000,
            },
        );
        assert_eq!((extent.width, extent.height), (4096, 4096));
    }

    #[test]
    fn fixed_current_extent_wins_over_request() {
        let caps = caps((800, 600), (1, 1), (4096, 4096));
        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 1920,
                height: 1080,
            },
        );
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn preferred_srgb_format_is_chosen_when_present() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn first_format_is_fallback() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn no_formats_is_none() {
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn mailbox_preferred_over_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn fifo_is_guaranteed_fallback() {
        let modes = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn configured_mode_wins_when_available() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn image_count_adds_headroom_and_respects_max() {
        let mut c = caps((0, 0), (0, 0), (0, 0));
        c.min_image_count = 2;
        c.max_image_count = 0; // unbounded
        assert_eq!(choose_image_count(&c), 3);

        c.max_image_count = 2;
        assert_eq!(choose_image_count(&c), 2);
    }
}
