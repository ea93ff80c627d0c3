use std::ffi::CStr;
use std::io::Cursor;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::pipeline_ctx::reflection::ShaderInfo;

const ENTRY_POINT: &CStr = c"main";

/// Reinterpret SPIR-V bytes as words, fixing up byte order from the magic number
pub fn spirv_words(code: &[u8]) -> Result<Vec<u32>> {
    Ok(ash::util::read_spv(&mut Cursor::new(code))?)
}

/// A compiled shader module paired with its reflection
pub struct Shader {
    pub module: vk::ShaderModule,
    info: ShaderInfo,
    ctx: Arc<DeviceContext>,
}

impl Shader {
    pub fn new(ctx: Arc<DeviceContext>, words: &[u32], info: ShaderInfo) -> Result<Self> {
        if words.is_empty() {
            return Err(eyre!("Shader \"{}\" has no code", info.name));
        }

        let shader_module_info = vk::ShaderModuleCreateInfo::default()
            .code(words);
        let module = unsafe {
            ctx.device().create_shader_module(&shader_module_info, None)?
        };

        log::debug!("Created {:?} shader \"{}\"", info.stage, info.name);
        Ok(Self { module, info, ctx })
    }

    /// Accepts a raw SPIR-V binary as read from disk
    pub fn from_bytes(ctx: Arc<DeviceContext>, code: &[u8], info: ShaderInfo) -> Result<Self> {
        let words = spirv_words(code)
            .map_err(|e| eyre!("Shader \"{}\" is not valid SPIR-V: {}", info.name, e))?;
        Self::new(ctx, &words, info)
    }

    pub fn info(&self) -> &ShaderInfo {
        &self.info
    }

    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.info.stage
    }

    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.info.stage)
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: u32 = 0x0723_0203;

    #[test]
    fn words_keep_their_order() {
        let mut code = MAGIC.to_le_bytes().to_vec();
        code.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        assert_eq!(spirv_words(&code).unwrap(), vec![MAGIC, 0x0001_0000]);
    }

    #[test]
    fn big_endian_binaries_are_swapped() {
        let mut code = MAGIC.to_be_bytes().to_vec();
        code.extend_from_slice(&7u32.to_be_bytes());
        assert_eq!(spirv_words(&code).unwrap(), vec![MAGIC, 7]);
    }

    #[test]
    fn partial_words_are_rejected() {
        let mut code = MAGIC.to_le_bytes().to_vec();
        code.push(0);
        assert!(spirv_words(&code).is_err());
    }
}
