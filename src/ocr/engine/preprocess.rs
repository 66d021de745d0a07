use image::DynamicImage;
use image::imageops::FilterType;

use crate::ocr::RecognizedWord;

/// Down-scale factor that keeps the OCR input at most `max_width` wide. Never enlarges.
pub(crate) fn ocr_scale(width: u32, max_width: u32) -> f32 {
    if width == 0 || max_width == 0 {
        return 1.0;
    }
    (max_width as f32 / width as f32).min(1.0)
}

pub(crate) fn downscale_for_ocr(image: &DynamicImage, scale: f32) -> DynamicImage {
    if scale >= 1.0 {
        return image.clone();
    }
    let width = ((image.width() as f32 * scale).round() as u32).max(1);
    let height = ((image.height() as f32 * scale).round() as u32).max(1);
    image.resize_exact(width, height, FilterType::Triangle)
}

/// Maps boxes recognised on the down-scaled image back to the source image.
pub(crate) fn rescale_words(words: Vec<RecognizedWord>, scale: f32) -> Vec<RecognizedWord> {
    if scale >= 1.0 || scale <= 0.0 {
        return words;
    }
    let inverse = 1.0 / scale;
    words
        .into_iter()
        .map(|word| RecognizedWord {
            bbox: word.bbox.scaled(inverse, inverse),
            ..word
        })
        .collect()
}

/// Drops low-confidence and blank words before they reach block grouping.
pub(crate) fn filter_words(words: Vec<RecognizedWord>, min_confidence: f32) -> Vec<RecognizedWord> {
    words
        .into_iter()
        .filter(|word| word.confidence > min_confidence && !word.text.trim().is_empty())
        .collect()
}

/// Composites transparency onto white and converts to luma for the engine.
pub(super) fn flatten_to_luma(image: &DynamicImage) -> DynamicImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = image::GrayImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = r as f32 * alpha + 255.0 * (1.0 - alpha);
        let g = g as f32 * alpha + 255.0 * (1.0 - alpha);
        let b = b as f32 * alpha + 255.0 * (1.0 - alpha);
        let value = (0.299 * r + 0.587 * g + 0.114 * b).round() as u8;
        luma.put_pixel(x, y, image::Luma([value]));
    }

    DynamicImage::ImageLuma8(luma)
}
