// Command recording
//
// One command buffer per swapchain image, recorded once per generation
// and replayed every time its image index is acquired. Re-invoked in
// full after every recreation; recording must complete before the
// corresponding buffer is next submitted.

use ash::vk;

use super::context::GpuContext;
use super::swapchain::{DrawSpec, SwapchainState};
use crate::error::RenderResult;

pub fn record_command_buffers<C: GpuContext>(
    ctx: &C,
    state: &SwapchainState,
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
    draw: &DrawSpec,
) -> RenderResult<()> {
    debug_assert!(state.is_consistent());

    for (&cmd, &framebuffer) in state.command_buffers.iter().zip(&state.framebuffers) {
        ctx.begin_commands(cmd)?;
        ctx.begin_render_pass(cmd, render_pass, framebuffer, state.extent, draw.clear_color);
        ctx.bind_pipeline(cmd, pipeline);
        if let Some(vertex_buffer) = draw.vertex_buffer {
            ctx.bind_vertex_buffer(cmd, vertex_buffer);
        }
        ctx.draw(cmd, draw.vertex_count);
        ctx.end_render_pass(cmd);
        ctx.end_commands(cmd)?;
    }

    log::debug!("Recorded {} command buffers", state.command_buffers.len());
    Ok(())
}
