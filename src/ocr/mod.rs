mod engine;
mod progress;

use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

pub use engine::{TesseractRecognizer, list_tesseract_languages};
pub use progress::{ProgressEvent, ProgressReporter, ProgressStage};

pub(crate) use engine::{downscale_for_ocr, filter_words, ocr_scale, rescale_words};

/// Axis-aligned box in source-image pixels, `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Non-uniform scale, used to map native pixels onto a displayed size.
    pub fn scaled(&self, scale_x: f32, scale_y: f32) -> BBox {
        BBox {
            x0: self.x0 * scale_x,
            y0: self.y0 * scale_y,
            x1: self.x1 * scale_x,
            y1: self.y1 * scale_y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedWord {
    pub text: String,
    /// Engine certainty, 0 to 100.
    pub confidence: f32,
    pub bbox: BBox,
}

impl RecognizedWord {
    pub fn new(text: impl Into<String>, confidence: f32, bbox: BBox) -> Self {
        Self {
            text: text.into(),
            confidence,
            bbox,
        }
    }
}

/// Raw output of a recognizer, in the pixel space of the image it was given.
#[derive(Debug, Clone, Default)]
pub struct Recognition {
    pub words: Vec<RecognizedWord>,
    pub full_text: String,
}

/// The OCR collaborator. Implementations may block; callers run them off the async executor.
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn recognize(&self, image: &DynamicImage, progress: &ProgressReporter) -> Result<Recognition>;
}

/// Output of the recognition stage, handed to translation and rendering.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedImage {
    #[serde(skip)]
    pub original_image: Vec<u8>,
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub extracted_texts: Vec<RecognizedWord>,
    pub full_text: String,
    pub detected_language: String,
}
