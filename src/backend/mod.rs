// Backend module - Vulkan abstraction layer
//
// Design: the swapchain manager, frame engine, and command recorder
// speak only to the GpuContext trait; VulkanContext is the one place
// that touches ash for them.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod device;
pub mod frame;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod vulkan;

pub use context::GpuContext;
pub use device::VulkanDevice;
pub use frame::{FrameEngine, FrameOutcome};
pub use surface::SurfaceBinding;
pub use swapchain::{DrawSpec, SwapchainManager};
pub use vulkan::VulkanContext;
