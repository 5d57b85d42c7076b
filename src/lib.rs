// frameloop - a thin Vulkan presentation engine
//
// The interesting part is the swapchain lifecycle and per-frame
// synchronization: backend::swapchain owns the presentable resources,
// backend::frame drives acquire/submit/present over a bounded ring of
// in-flight frames, and backend::context is the seam that lets tests
// run the whole cycle against a fake GPU.

pub mod backend;
pub mod config;
pub mod error;
