use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::error::SceneError;

/// Bytes occupied by a `width` x `height` image of `format` with no row padding
pub fn compute_image_size(width: u32, height: u32, format: vk::Format) -> Result<usize> {
    let (width, height) = (width as usize, height as usize);
    let texel_size = match format {
        vk::Format::R8_UNORM
        | vk::Format::R8_SNORM
        | vk::Format::R8_UINT
        | vk::Format::R8_SINT
        | vk::Format::R8_SRGB => 1,
        vk::Format::R16_UNORM
        | vk::Format::R16_SNORM
        | vk::Format::R16_UINT
        | vk::Format::R16_SINT
        | vk::Format::R16_SFLOAT => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SNORM
        | vk::Format::R8G8B8A8_UINT
        | vk::Format::R8G8B8A8_SINT
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::R32_UINT
        | vk::Format::R32_SINT
        | vk::Format::R32_SFLOAT => 4,
        vk::Format::R16G16B16A16_UNORM
        | vk::Format::R16G16B16A16_SNORM
        | vk::Format::R16G16B16A16_UINT
        | vk::Format::R16G16B16A16_SINT
        | vk::Format::R16G16B16A16_SFLOAT => 8,
        vk::Format::R32G32B32A32_UINT
        | vk::Format::R32G32B32A32_SINT
        | vk::Format::R32G32B32A32_SFLOAT => 16,
        // 4x4 blocks
        vk::Format::BC1_RGB_UNORM_BLOCK
        | vk::Format::BC1_RGB_SRGB_BLOCK
        | vk::Format::BC1_RGBA_UNORM_BLOCK
        | vk::Format::BC1_RGBA_SRGB_BLOCK => {
            return Ok(width.div_ceil(4) * height.div_ceil(4) * 8);
        }
        vk::Format::BC3_UNORM_BLOCK | vk::Format::BC3_SRGB_BLOCK => {
            return Ok(width.div_ceil(4) * height.div_ceil(4) * 16);
        }
        format => return Err(SceneError::UnsupportedFormat(format).into()),
    };
    Ok(width * height * texel_size)
}

/// A decoded 2D bitmap, tightly packed
#[derive(Debug, Clone)]
pub struct PixelImage {
    width: u32,
    height: u32,
    format: vk::Format,
    pixels: Vec<u8>,
}

impl PixelImage {
    pub fn new(width: u32, height: u32, format: vk::Format, pixels: Vec<u8>) -> Result<Self> {
        let expected = compute_image_size(width, height, format)?;
        if pixels.len() != expected {
            return Err(eyre!(
                "{}x{} {:?} image needs {} bytes, got {}",
                width, height, format, expected, pixels.len()
            ));
        }
        Ok(Self { width, height, format, pixels })
    }

    /// Converts to 8-bit RGBA in the sRGB encoding
    pub fn from_dynamic_image(image: &image::DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            format: vk::Format::R8G8B8A8_SRGB,
            pixels: rgba.into_raw(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Checks that six faces can form a cube map: same format, square, same side length.
/// Returns the shared format and side length.
pub fn validate_cube_faces(faces: &[&PixelImage]) -> Result<(vk::Format, u32)> {
    let first = faces
        .first()
        .ok_or(SceneError::BadCubeFace { face: 0 })?;
    let (format, side) = (first.format, first.width);

    for (face, image) in faces.iter().enumerate() {
        if image.format != format || image.width != side || image.height != side {
            return Err(SceneError::BadCubeFace { face }.into());
        }
    }
    if faces.len() != 6 {
        return Err(SceneError::BadCubeFace { face: faces.len() }.into());
    }

    Ok((format, side))
}
