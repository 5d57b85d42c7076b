// Shader module loading
//
// Vulkan consumes SPIR-V bytecode; the GLSL sources under shaders/ are
// compiled to .spv by build.rs and loaded at startup.

use ash::vk;
use std::path::Path;

use super::VulkanDevice;
use crate::error::{RenderError, RenderResult};

/// Create a shader module from raw SPIR-V bytes.
pub fn create_shader_module(device: &VulkanDevice, code: &[u8]) -> RenderResult<vk::ShaderModule> {
    if code.len() % 4 != 0 {
        return Err(RenderError::InitializationFailed(
            "SPIR-V byte length is not a multiple of 4".into(),
        ));
    }

    // SPIR-V is a stream of 4-byte words; the compiler output is aligned
    let code_aligned =
        unsafe { std::slice::from_raw_parts(code.as_ptr() as *const u32, code.len() / 4) };

    let create_info = vk::ShaderModuleCreateInfo::builder().code(code_aligned);

    unsafe { device.device.create_shader_module(&create_info, None) }.map_err(RenderError::from)
}

/// Load a compiled SPIR-V file and create a shader module from it.
pub fn load_shader_module<P: AsRef<Path>>(
    device: &VulkanDevice,
    path: P,
) -> RenderResult<vk::ShaderModule> {
    let path = path.as_ref();
    let code = std::fs::read(path).map_err(|e| {
        RenderError::InitializationFailed(format!(
            "failed to read shader {:?} (did build.rs run glslc?): {e}",
            path
        ))
    })?;
    create_shader_module(device, &code)
}
