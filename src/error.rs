// Error taxonomy for the render backend
//
// Every factory and queue operation returns a typed error instead of
// logging and continuing. Staleness (OutOfDate/Suboptimal) is recovered
// inside the frame engine; everything else reaches the caller.

use ash::vk;
use thiserror::Error;

/// Queue roles the context provisions. Asking for a role that was not
/// provisioned is a programmer error, reported as `InvalidQueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRole {
    Graphics,
    Present,
}

/// Render backend error kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("out of host memory")]
    OutOfHostMemory,

    #[error("out of device memory")]
    OutOfDeviceMemory,

    #[error("device lost")]
    DeviceLost,

    #[error("surface lost")]
    SurfaceLost,

    /// Swapchain no longer matches the surface; recoverable by recreation.
    #[error("swapchain out of date")]
    OutOfDate,

    /// Swapchain still usable but stale; recoverable by recreation.
    #[error("swapchain suboptimal")]
    Suboptimal,

    #[error("native window already in use")]
    NativeWindowInUse,

    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    #[error("no suitable physical device")]
    NoSuitablePhysicalDevice,

    #[error("queue role {0:?} was not provisioned")]
    InvalidQueue(QueueRole),

    #[error("command pool creation failed: {0:?}")]
    CommandPoolCreationFailed(vk::Result),

    /// A fence wait hit its (large but finite) timeout. The GPU is likely
    /// hung; the only recourse is tearing down the whole context.
    #[error("fence wait timed out, GPU may be hung")]
    GpuHang,

    /// Vulkan result code with no dedicated kind above.
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),
}

impl RenderError {
    /// Staleness signals that the swapchain should be rebuilt. These are a
    /// normal operating condition during resize, never surfaced to callers.
    pub fn is_stale(&self) -> bool {
        matches!(self, RenderError::OutOfDate | RenderError::Suboptimal)
    }
}

impl From<vk::Result> for RenderError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => RenderError::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => RenderError::OutOfDeviceMemory,
            vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
            vk::Result::ERROR_SURFACE_LOST_KHR => RenderError::SurfaceLost,
            vk::Result::ERROR_OUT_OF_DATE_KHR => RenderError::OutOfDate,
            vk::Result::SUBOPTIMAL_KHR => RenderError::Suboptimal,
            vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR => RenderError::NativeWindowInUse,
            vk::Result::ERROR_INITIALIZATION_FAILED => {
                RenderError::InitializationFailed("driver reported initialization failure".into())
            }
            vk::Result::TIMEOUT => RenderError::GpuHang,
            other => RenderError::Api(other),
        }
    }
}

/// Result alias for render backend operations.
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vk_codes_map_to_kinds() {
        assert_eq!(
            RenderError::from(vk::Result::ERROR_DEVICE_LOST),
            RenderError::DeviceLost
        );
        assert_eq!(
            RenderError::from(vk::Result::ERROR_OUT_OF_DATE_KHR),
            RenderError::OutOfDate
        );
        assert_eq!(RenderError::from(vk::Result::TIMEOUT), RenderError::GpuHang);
        assert_eq!(
            RenderError::from(vk::Result::INCOMPLETE),
            RenderError::Api(vk::Result::INCOMPLETE)
        );
    }

    #[test]
    fn only_staleness_is_recoverable() {
        assert!(RenderError::OutOfDate.is_stale());
        assert!(RenderError::Suboptimal.is_stale());
        assert!(!RenderError::DeviceLost.is_stale());
        assert!(!RenderError::GpuHang.is_stale());
    }
}
