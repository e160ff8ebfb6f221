use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
    #[error("Nothing to crop: image has no content")]
    EmptyCrop,
}

/// Supplies decoded images and the two optional preparation steps applied
/// before recognition.
pub trait ImageProvider: Send + Sync {
    fn load(&self, path: &Path) -> Result<DynamicImage, PreprocessError>;
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, PreprocessError>;
    fn crop(&self, img: &DynamicImage) -> Result<DynamicImage, PreprocessError>;
    fn preprocess(&self, img: &DynamicImage) -> Result<DynamicImage, PreprocessError>;
}

/// Longest side after preparation. Tesseract works best around 300 DPI / ~2000 px.
const MAX_SIDE: u32 = 2800;
/// White border kept around the cropped content.
const CROP_PADDING: u32 = 8;

/// `image`-crate implementation: ink bounding box crop, upscale, grayscale and
/// contrast stretch.
#[derive(Debug, Clone)]
pub struct StandardImageProvider {
    upscale_min_side: u32,
}

impl StandardImageProvider {
    pub fn new(upscale_min_side: u32) -> Self {
        Self { upscale_min_side }
    }
}

impl Default for StandardImageProvider {
    fn default() -> Self {
        Self::new(800)
    }
}

impl ImageProvider for StandardImageProvider {
    fn load(&self, path: &Path) -> Result<DynamicImage, PreprocessError> {
        Ok(image::open(path)?)
    }

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, PreprocessError> {
        Ok(image::load_from_memory(data)?)
    }

    fn crop(&self, img: &DynamicImage) -> Result<DynamicImage, PreprocessError> {
        let (x, y, w, h) = ink_bounds(&img.to_luma8()).ok_or(PreprocessError::EmptyCrop)?;
        let x0 = x.saturating_sub(CROP_PADDING);
        let y0 = y.saturating_sub(CROP_PADDING);
        let x1 = (x + w + CROP_PADDING).min(img.width());
        let y1 = (y + h + CROP_PADDING).min(img.height());
        Ok(img.crop_imm(x0, y0, x1 - x0, y1 - y0))
    }

    fn preprocess(&self, img: &DynamicImage) -> Result<DynamicImage, PreprocessError> {
        let img = if img.width().min(img.height()) < self.upscale_min_side {
            img.resize(img.width() * 2, img.height() * 2, FilterType::Lanczos3)
        } else {
            img.clone()
        };
        Ok(normalize(img))
    }
}

/// Bounding box `(x, y, width, height)` of pixels darker than the midpoint
/// between the image's darkest and lightest values.
fn ink_bounds(gray: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let (min_px, max_px) = gray
        .pixels()
        .fold((255u8, 0u8), |(mn, mx), p| (mn.min(p[0]), mx.max(p[0])));
    if max_px == min_px {
        return None;
    }
    let threshold = ((min_px as u16 + max_px as u16) / 2) as u8;

    let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0, 0);
    for (x, y, p) in gray.enumerate_pixels() {
        if p[0] < threshold {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
    }
    (x0 != u32::MAX).then(|| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Grayscale + contrast stretch.
fn normalize(img: DynamicImage) -> DynamicImage {
    let img = if img.width() > MAX_SIDE || img.height() > MAX_SIDE {
        img.resize(MAX_SIDE, MAX_SIDE, FilterType::Lanczos3)
    } else {
        img
    };

    let gray: GrayImage = img.to_luma8();

    let (min_px, max_px) = gray
        .pixels()
        .fold((255u8, 0u8), |(mn, mx), p| (mn.min(p[0]), mx.max(p[0])));

    if max_px == min_px {
        // Uniform image, nothing to stretch.
        return DynamicImage::ImageLuma8(gray);
    }

    let range = (max_px - min_px) as u32;
    let stretched: GrayImage = ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0];
        let v = ((p - min_px) as u32 * 255 / range) as u8;
        Luma([v])
    });

    DynamicImage::ImageLuma8(stretched)
}

/// PNG bytes handed to the recognizer.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}
