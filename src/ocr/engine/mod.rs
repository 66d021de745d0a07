mod parse;
mod preprocess;
mod tesseract;

use anyhow::{Context, Result};
use image::DynamicImage;
use std::io::Write;
use tracing::info;

use crate::ocr::{ProgressReporter, Recognition, TextRecognizer};
use crate::settings::Settings;

pub use tesseract::list_tesseract_languages;

pub(crate) use preprocess::{downscale_for_ocr, filter_words, ocr_scale, rescale_words};

/// Runs the `tesseract` CLI and reads word boxes from its TSV output.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    languages: String,
    psm: u32,
    char_whitelist: Option<String>,
}

impl TesseractRecognizer {
    /// Resolves the requested languages against the installed traineddata once.
    pub fn init(settings: &Settings) -> Result<Self> {
        let languages = tesseract::normalize_ocr_languages(&settings.ocr_languages)?;
        info!(languages = %languages, psm = settings.ocr_psm, "tesseract ready");
        Ok(Self {
            languages,
            psm: settings.ocr_psm,
            char_whitelist: settings.ocr_char_whitelist.clone(),
        })
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage, progress: &ProgressReporter) -> Result<Recognition> {
        let prepared = preprocess::flatten_to_luma(image);
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        prepared
            .write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().ok();

        progress.recognizing(0.0);
        let tsv = tesseract::run_tesseract_tsv(
            tmp.path(),
            &self.languages,
            self.psm,
            self.char_whitelist.as_deref(),
        )?;
        progress.recognizing(1.0);
        parse::parse_tsv_words(&tsv)
    }
}
