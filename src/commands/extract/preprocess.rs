use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::morphology::close;

/// Share of the page height treated as the letter header.
pub const HEADER_FRACTION: f32 = 0.20;

const ADAPTIVE_SIGMA: f32 = 2.0;
const ADAPTIVE_OFFSET: i16 = 2;
const CONTRAST_ALPHA: f32 = 3.0;
const CONTRAST_BETA: f32 = -100.0;
const CONTRAST_LEVEL: u8 = 140;
const MORPHOLOGY_LEVEL: u8 = 127;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Variant {
    Adaptive,
    Contrast,
    Otsu,
    Morphological,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Adaptive,
        Variant::Contrast,
        Variant::Otsu,
        Variant::Morphological,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Adaptive => "adaptive",
            Self::Contrast => "contrast",
            Self::Otsu => "otsu",
            Self::Morphological => "morphological",
        }
    }

    pub fn apply(self, gray: &GrayImage) -> GrayImage {
        match self {
            Self::Adaptive => adaptive_gaussian_threshold(gray),
            Self::Contrast => contrast_denoise_threshold(gray),
            Self::Otsu => otsu_threshold(gray),
            Self::Morphological => morphological_threshold(gray),
        }
    }
}

pub fn load_grayscale(path: &Path) -> Result<GrayImage> {
    let image =
        image::open(path).with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(image.to_luma8())
}

/// Binarized variants of a rendered page written next to it, plus the header crop.
#[derive(Debug, Clone)]
pub struct PreparedPage {
    pub variants: Vec<(Variant, PathBuf)>,
    pub header: Option<PathBuf>,
}

/// Builds the requested variants for one page image and saves them as PNGs in `work_dir`.
///
/// The header crop is taken from the Otsu variant when `with_header` is set.
pub fn prepare_page(
    page_path: &Path,
    work_dir: &Path,
    variants: &[Variant],
    with_header: bool,
) -> Result<PreparedPage> {
    let gray = load_grayscale(page_path)?;
    let stem = page_path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("page");

    let mut prepared = PreparedPage {
        variants: Vec::with_capacity(variants.len()),
        header: None,
    };

    for &variant in variants {
        let processed = variant.apply(&gray);
        let path = work_dir.join(format!("{stem}_{}.png", variant.as_str()));
        processed
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;

        if with_header && variant == Variant::Otsu {
            let header = header_region(&processed, HEADER_FRACTION);
            let header_path = work_dir.join(format!("{stem}_header.png"));
            header
                .save(&header_path)
                .with_context(|| format!("failed to write {}", header_path.display()))?;
            prepared.header = Some(header_path);
        }

        prepared.variants.push((variant, path));
    }

    if with_header && prepared.header.is_none() {
        let header = header_region(&otsu_threshold(&gray), HEADER_FRACTION);
        let header_path = work_dir.join(format!("{stem}_header.png"));
        header
            .save(&header_path)
            .with_context(|| format!("failed to write {}", header_path.display()))?;
        prepared.header = Some(header_path);
    }

    Ok(prepared)
}

/// Gaussian-weighted local mean threshold: a pixel is white when it is brighter
/// than its neighbourhood mean minus the offset.
pub fn adaptive_gaussian_threshold(gray: &GrayImage) -> GrayImage {
    let local_mean = gaussian_blur_f32(gray, ADAPTIVE_SIGMA);
    let mut output = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in gray.enumerate_pixels() {
        let mean = i16::from(local_mean.get_pixel(x, y)[0]);
        let value = if i16::from(pixel[0]) > mean - ADAPTIVE_OFFSET {
            255
        } else {
            0
        };
        output.put_pixel(x, y, Luma([value]));
    }
    output
}

pub fn contrast_denoise_threshold(gray: &GrayImage) -> GrayImage {
    let mut stretched = gray.clone();
    for pixel in stretched.pixels_mut() {
        let scaled = (CONTRAST_ALPHA * f32::from(pixel[0]) + CONTRAST_BETA).abs();
        pixel[0] = scaled.round().min(255.0) as u8;
    }
    let denoised = median_filter(&stretched, 1, 1);
    binarize(&denoised, CONTRAST_LEVEL)
}

pub fn otsu_threshold(gray: &GrayImage) -> GrayImage {
    let denoised = median_filter(gray, 1, 1);
    let level = otsu_level(&denoised);
    binarize(&denoised, level)
}

pub fn morphological_threshold(gray: &GrayImage) -> GrayImage {
    let closed = close(gray, Norm::LInf, 1);
    binarize(&closed, MORPHOLOGY_LEVEL)
}

/// Top `fraction` of the image, at least one row tall.
pub fn header_region(image: &GrayImage, fraction: f32) -> GrayImage {
    let height = ((image.height() as f32 * fraction) as u32).clamp(1, image.height().max(1));
    image::imageops::crop_imm(image, 0, 0, image.width(), height).to_image()
}

fn binarize(image: &GrayImage, level: u8) -> GrayImage {
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = if pixel[0] > level { 255 } else { 0 };
    }
    output
}
