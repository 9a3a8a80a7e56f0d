use std::io::Cursor;

use image::imageops::FilterType;
use image::ImageFormat;

use crate::types::WorkerResult;

pub const OUTPUT_WIDTH: u32 = 800;

/// Turns a downloaded source image into the stored artifact.
pub trait ImageTransformer: Send + Sync {
    fn transform(&self, source: &[u8]) -> WorkerResult<Vec<u8>>;
}

/// Resize to a fixed width (aspect ratio preserved) and encode as WebP.
#[derive(Debug, Clone, Copy)]
pub struct WebpTransformer {
    width: u32,
}

impl Default for WebpTransformer {
    fn default() -> Self {
        Self { width: OUTPUT_WIDTH }
    }
}

impl WebpTransformer {
    pub fn with_width(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}

impl ImageTransformer for WebpTransformer {
    fn transform(&self, source: &[u8]) -> WorkerResult<Vec<u8>> {
        let img = image::load_from_memory(source)?;
        let height = scaled_height(img.width(), img.height(), self.width);
        let resized = img.resize_exact(self.width, height, FilterType::Lanczos3);

        // The WebP encoder only takes 8-bit RGB(A)
        let resized = image::DynamicImage::ImageRgba8(resized.to_rgba8());

        let mut buf = Vec::new();
        resized.write_to(&mut Cursor::new(&mut buf), ImageFormat::WebP)?;
        Ok(buf)
    }
}

fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return 1;
    }
    let scaled = (height as f64 * target_width as f64 / width as f64).round() as u32;
    scaled.max(1)
}
