// Presentation surface binding
//
// Wraps the platform window into a vk::SurfaceKHR the rest of the backend
// can present to. Surface creation is per-platform because winit hands out
// raw-window-handle 0.6 handles.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::sync::Arc;
use winit::window::Window;

use super::VulkanDevice;
use crate::error::{RenderError, RenderResult};

pub struct SurfaceBinding {
    pub surface: vk::SurfaceKHR,
    pub loader: ash::extensions::khr::Surface,
}

impl SurfaceBinding {
    pub fn new(device: &Arc<VulkanDevice>, window: &Window) -> RenderResult<Self> {
        let loader = ash::extensions::khr::Surface::new(&device.entry, &device.instance);

        let display_handle = window
            .display_handle()
            .map_err(|e| RenderError::InitializationFailed(format!("no display handle: {e}")))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| RenderError::InitializationFailed(format!("no window handle: {e}")))?
            .as_raw();

        let surface = create_platform_surface(device, display_handle, window_handle)?;

        // The graphics queue family must also be able to present here
        let supported = unsafe {
            loader.get_physical_device_surface_support(
                device.physical_device,
                device.graphics_queue_family,
                surface,
            )
        }?;

        if !supported {
            unsafe { loader.destroy_surface(surface, None) };
            return Err(RenderError::InitializationFailed(
                "selected queue family cannot present to this surface".into(),
            ));
        }

        Ok(Self { surface, loader })
    }

    /// Current window size in pixels, as a Vulkan extent.
    pub fn window_extent(window: &Window) -> vk::Extent2D {
        let size = window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    pub fn destroy(&self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

fn create_platform_surface(
    device: &VulkanDevice,
    display_handle: RawDisplayHandle,
    window_handle: RawWindowHandle,
) -> RenderResult<vk::SurfaceKHR> {
    match (display_handle, window_handle) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
            let hinstance = handle
                .hinstance
                .map(|h| h.get())
                .unwrap_or(0) as *const std::ffi::c_void;
            let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(hwnd);
            let win32_loader =
                ash::extensions::khr::Win32Surface::new(&device.entry, &device.instance);
            unsafe { win32_loader.create_win32_surface(&create_info, None) }
                .map_err(RenderError::from)
        }

        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
            let dpy = display
                .display
                .map(|d| d.as_ptr())
                .unwrap_or(std::ptr::null_mut());
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy as *mut _)
                .window(handle.window);
            let xlib_loader =
                ash::extensions::khr::XlibSurface::new(&device.entry, &device.instance);
            unsafe { xlib_loader.create_xlib_surface(&create_info, None) }
                .map_err(RenderError::from)
        }

        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr())
                .surface(handle.surface.as_ptr());
            let wayland_loader =
                ash::extensions::khr::WaylandSurface::new(&device.entry, &device.instance);
            unsafe { wayland_loader.create_wayland_surface(&create_info, None) }
                .map_err(RenderError::from)
        }

        _ => Err(RenderError::InitializationFailed(
            "unsupported windowing system".into(),
        )),
    }
}
