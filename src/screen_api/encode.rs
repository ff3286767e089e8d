use std::io::Cursor;

use anyhow::{Context, Result};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, RgbaImage};

/// Bounds and quality applied to every stored frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoding {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl From<&crate::config::RecordingConfig> for FrameEncoding {
    fn from(config: &crate::config::RecordingConfig) -> Self {
        Self {
            max_width: config.max_frame_width,
            max_height: config.max_frame_height,
            quality: config.jpeg_quality,
        }
    }
}

/// Downscales the frame so that it fits into the bounds, keeping the aspect ratio, and encodes it
/// as JPEG. Frames that already fit are never upscaled.
pub fn encode_frame(frame: RgbaImage, encoding: FrameEncoding) -> Result<Vec<u8>> {
    let mut image = DynamicImage::ImageRgba8(frame);
    if image.width() > encoding.max_width || image.height() > encoding.max_height {
        image = image.resize(encoding.max_width, encoding.max_height, FilterType::Triangle);
    }
    let rgb = image.to_rgb8();

    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, encoding.quality)
        .encode_image(&rgb)
        .context("failed to encode frame as jpeg")?;
    Ok(buffer.into_inner())
}
