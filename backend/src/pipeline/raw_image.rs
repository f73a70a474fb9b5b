use image::{ColorType, DynamicImage, RgbImage};

use super::PipelineError;

/// Color layout of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Luma,
    LumaAlpha,
    Rgb,
    Rgba,
    Other,
}

impl From<ColorType> for ColorMode {
    fn from(color: ColorType) -> Self {
        match color {
            ColorType::L8 | ColorType::L16 => ColorMode::Luma,
            ColorType::La8 | ColorType::La16 => ColorMode::LumaAlpha,
            ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => ColorMode::Rgb,
            ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => ColorMode::Rgba,
            _ => ColorMode::Other,
        }
    }
}

/// A decoded upload.
///
/// Uploads are converted to 8-bit RGB on decode, so a `RawImage` produced by
/// [`RawImage::decode`] is always [`ColorMode::Rgb`]; the color mode of the
/// file as stored is kept in `source_mode` for logging.
#[derive(Debug, Clone)]
pub struct RawImage {
    pixels: DynamicImage,
    source_mode: ColorMode,
}

impl RawImage {
    pub fn decode(bytes: &[u8]) -> Result<Self, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::Corrupt("empty upload".to_string()));
        }
        let decoded =
            image::load_from_memory(bytes).map_err(|e| PipelineError::Corrupt(e.to_string()))?;
        let source_mode = ColorMode::from(decoded.color());
        Ok(Self {
            pixels: DynamicImage::ImageRgb8(decoded.to_rgb8()),
            source_mode,
        })
    }

    /// Wraps an already decoded image without converting it.
    pub fn from_dynamic(pixels: DynamicImage) -> Self {
        let source_mode = ColorMode::from(pixels.color());
        Self {
            pixels,
            source_mode,
        }
    }

    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self::from_dynamic(DynamicImage::ImageRgb8(pixels))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn channels(&self) -> u8 {
        self.pixels.color().channel_count()
    }

    pub fn color_mode(&self) -> ColorMode {
        ColorMode::from(self.pixels.color())
    }

    pub fn source_mode(&self) -> ColorMode {
        self.source_mode
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.pixels
    }
}
