use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::DeviceContext;

pub struct Sampler {
    pub sampler: vk::Sampler,
    ctx: Arc<DeviceContext>,
}

impl Sampler {
    pub fn new(ctx: Arc<DeviceContext>, info: &vk::SamplerCreateInfo) -> Result<Self> {
        let sampler = unsafe { ctx.device().create_sampler(info, None)? };
        Ok(Self { sampler, ctx })
    }

    /// Trilinear, repeating sampler covering the whole mip chain
    pub fn linear(ctx: Arc<DeviceContext>) -> Result<Self> {
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .max_lod(vk::LOD_CLAMP_NONE);
        Self::new(ctx, &info)
    }

    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_sampler(self.sampler, None);
        }
    }
}
