use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::ocr::BBox;
use crate::style::{OverlayStyleId, PixelSampler, resolve_style};
use crate::translate::TranslationRecord;

mod font;
mod layout;
mod raster;
mod svg;

pub use font::{FontMetrics, OverlayFont, load_font_metrics};

use layout::{WRAP_INSET, export_font_size, interactive_font_size, wrap_words};
use svg::{BlockPaint, SvgDoc, draw_block, draw_plain_block};

pub const EXPORT_FILE_NAME: &str = "translated-image.png";

/// How the native-resolution export draws blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Same wrapping, borders, shadows and badges as the interactive overlay.
    Matched,
    /// One centred line per block in adaptive colours, no badge.
    Simplified,
}

impl ExportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::Matched => "matched",
            ExportMode::Simplified => "simplified",
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "matched" => Ok(ExportMode::Matched),
            "simplified" => Ok(ExportMode::Simplified),
            other => Err(anyhow!(
                "unknown export mode '{}' (expected matched or simplified)",
                other
            )),
        }
    }
}

/// Encoded source image plus its native pixel size.
#[derive(Debug, Clone, Copy)]
pub struct SourceImage<'a> {
    pub bytes: &'a [u8],
    pub mime: &'a str,
    pub width: u32,
    pub height: u32,
}

/// Size at which the image is currently shown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: f32,
    pub height: f32,
}

impl DisplaySize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl FromStr for DisplaySize {
    type Err = anyhow::Error;

    /// Parses `WIDTHxHEIGHT`, e.g. `640x480`.
    fn from_str(value: &str) -> Result<Self> {
        let (w, h) = value
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| anyhow!("display size must look like WIDTHxHEIGHT: '{}'", value))?;
        let width: f32 = w
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid display width '{}'", w))?;
        let height: f32 = h
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid display height '{}'", h))?;
        if width <= 0.0 || height <= 0.0 {
            return Err(anyhow!("display size must be positive: '{}'", value));
        }
        Ok(Self { width, height })
    }
}

/// What gets drawn: one consistent records/style/visibility triple.
pub struct OverlayScene<'a> {
    pub records: &'a [TranslationRecord],
    pub style: OverlayStyleId,
    pub visible: bool,
    /// Pixels of the native image, used by the adaptive style.
    pub sampler: Option<&'a dyn PixelSampler>,
    pub font: &'a OverlayFont,
}

/// Overlay sized to `display`, block boxes scaled per axis from native pixels.
/// With `with_backdrop` the source image is drawn underneath, stretched to fit.
pub fn interactive_svg(
    scene: &OverlayScene<'_>,
    source: &SourceImage<'_>,
    display: DisplaySize,
    with_backdrop: bool,
) -> String {
    let scale_x = axis_scale(display.width, source.width);
    let scale_y = axis_scale(display.height, source.height);
    let mut doc = SvgDoc::open(display.width, display.height);
    if with_backdrop {
        doc.image(source.bytes, source.mime, display.width, display.height);
    }
    if !scene.visible {
        return doc.finish();
    }
    debug!(
        blocks = scene.records.len(),
        style = %scene.style,
        scale_x,
        scale_y,
        "rendering interactive overlay"
    );
    for (index, record) in scene.records.iter().enumerate() {
        let rect = record.bbox.scaled(scale_x, scale_y);
        let font_size = interactive_font_size(rect.height());
        draw_block(&mut doc, &matched_paint(scene, index, record, rect, font_size));
    }
    doc.finish()
}

/// Native-resolution composite of the source image and its overlay.
pub fn export_svg(scene: &OverlayScene<'_>, source: &SourceImage<'_>, mode: ExportMode) -> String {
    let width = source.width as f32;
    let height = source.height as f32;
    let mut doc = SvgDoc::open(width, height);
    doc.image(source.bytes, source.mime, width, height);
    if !scene.visible {
        return doc.finish();
    }
    for (index, record) in scene.records.iter().enumerate() {
        let rect = record.bbox;
        let font_size = export_font_size(rect.height());
        match mode {
            ExportMode::Matched => {
                draw_block(&mut doc, &matched_paint(scene, index, record, rect, font_size))
            }
            ExportMode::Simplified => {
                let colors = resolve_style(scene.sampler, &record.bbox, OverlayStyleId::Adaptive);
                draw_plain_block(
                    &mut doc,
                    rect,
                    &colors,
                    font_size,
                    &record.translated_text,
                    scene.font.family(),
                    scene.font.weight(),
                );
            }
        }
    }
    doc.finish()
}

/// Rasterized [`export_svg`], always exactly `source.width` x `source.height`.
pub fn export_png(
    scene: &OverlayScene<'_>,
    source: &SourceImage<'_>,
    mode: ExportMode,
) -> Result<Vec<u8>> {
    if source.width == 0 || source.height == 0 {
        return Err(anyhow!("cannot export an image with no pixels"));
    }
    let svg = export_svg(scene, source, mode);
    raster::svg_to_png(&svg, scene.font.font_data())
}

/// Colours are resolved from the record's native box; drawing uses `rect`.
fn matched_paint<'a>(
    scene: &OverlayScene<'a>,
    index: usize,
    record: &TranslationRecord,
    rect: BBox,
    font_size: f32,
) -> BlockPaint<'a> {
    let colors = resolve_style(scene.sampler, &record.bbox, scene.style);
    let max_width = rect.width() - WRAP_INSET;
    let lines = wrap_words(&record.translated_text, max_width, |text| {
        scene.font.measure(text, font_size)
    });
    BlockPaint {
        index,
        rect,
        colors,
        border_width: (scene.style != OverlayStyleId::Shadow).then(|| scene.style.border_width()),
        drop_shadow: scene.style.has_drop_shadow(),
        font_size,
        lines,
        badge: true,
        font_family: scene.font.family(),
        font_weight: scene.font.weight(),
    }
}

fn axis_scale(displayed: f32, native: u32) -> f32 {
    if native == 0 {
        1.0
    } else {
        displayed / native as f32
    }
}
