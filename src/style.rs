use anyhow::{Result, anyhow};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::ocr::BBox;

/// Largest region sampled under a block, anchored at its top-left corner.
const SAMPLE_MAX_W: f32 = 50.0;
const SAMPLE_MAX_H: f32 = 20.0;
const LIGHT_LUMINANCE: f32 = 128.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayStyleId {
    Adaptive,
    Solid,
    Transparent,
    Outline,
    Shadow,
}

impl OverlayStyleId {
    pub const ALL: [OverlayStyleId; 5] = [
        OverlayStyleId::Adaptive,
        OverlayStyleId::Solid,
        OverlayStyleId::Transparent,
        OverlayStyleId::Outline,
        OverlayStyleId::Shadow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayStyleId::Adaptive => "adaptive",
            OverlayStyleId::Solid => "solid",
            OverlayStyleId::Transparent => "transparent",
            OverlayStyleId::Outline => "outline",
            OverlayStyleId::Shadow => "shadow",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            OverlayStyleId::Adaptive => "Smart Adaptive",
            OverlayStyleId::Solid => "Solid Background",
            OverlayStyleId::Transparent => "Semi-Transparent",
            OverlayStyleId::Outline => "Outline Only",
            OverlayStyleId::Shadow => "Text Shadow",
        }
    }

    pub fn has_drop_shadow(&self) -> bool {
        matches!(self, OverlayStyleId::Outline | OverlayStyleId::Shadow)
    }

    pub fn border_width(&self) -> f32 {
        if *self == OverlayStyleId::Outline {
            3.0
        } else {
            2.0
        }
    }
}

impl fmt::Display for OverlayStyleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverlayStyleId {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let lower = value.trim().to_ascii_lowercase();
        OverlayStyleId::ALL
            .into_iter()
            .find(|style| style.as_str() == lower)
            .ok_or_else(|| {
                anyhow!(
                    "unknown overlay style '{}' (expected adaptive, solid, transparent, outline or shadow)",
                    value.trim()
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Opacity in `[0, 1]`.
    pub a: f32,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0.0);
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 1.0);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 1.0);

    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_transparent(&self) -> bool {
        self.a <= 0.0
    }

    /// Colour component as an SVG paint; opacity goes in the matching `*-opacity` attribute.
    pub fn svg_rgb(&self) -> String {
        format!("rgb({},{},{})", self.r, self.g, self.b)
    }

    pub fn css(&self) -> String {
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }

    /// Translucent opposite used for drop shadows behind text of this colour.
    pub fn shadow_complement(&self) -> Rgba {
        if *self == Rgba::WHITE {
            Rgba::new(0, 0, 0, 0.8)
        } else {
            Rgba::new(255, 255, 255, 0.8)
        }
    }
}

impl Serialize for Rgba {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.css())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverlayStyleChoice {
    pub background: Rgba,
    pub text: Rgba,
    pub border: Rgba,
}

impl OverlayStyleChoice {
    const fn new(background: Rgba, text: Rgba, border: Rgba) -> Self {
        Self {
            background,
            text,
            border,
        }
    }
}

const ACCENT: (u8, u8, u8) = (59, 130, 246);

const fn accent(alpha: f32) -> Rgba {
    Rgba::new(ACCENT.0, ACCENT.1, ACCENT.2, alpha)
}

pub const NEUTRAL_STYLE: OverlayStyleChoice =
    OverlayStyleChoice::new(accent(0.9), Rgba::WHITE, accent(1.0));
/// Chosen over light image regions.
pub const DARK_PANEL_STYLE: OverlayStyleChoice = OverlayStyleChoice::new(
    Rgba::new(0, 0, 0, 0.8),
    Rgba::WHITE,
    Rgba::new(0, 0, 0, 0.9),
);
/// Chosen over dark image regions.
pub const LIGHT_PANEL_STYLE: OverlayStyleChoice = OverlayStyleChoice::new(
    Rgba::new(255, 255, 255, 0.9),
    Rgba::BLACK,
    Rgba::new(255, 255, 255, 1.0),
);

pub fn fixed_style(style: OverlayStyleId) -> Option<OverlayStyleChoice> {
    match style {
        OverlayStyleId::Solid => Some(OverlayStyleChoice::new(
            accent(0.95),
            Rgba::WHITE,
            accent(1.0),
        )),
        OverlayStyleId::Transparent => Some(OverlayStyleChoice::new(
            accent(0.7),
            Rgba::WHITE,
            accent(0.8),
        )),
        OverlayStyleId::Outline => Some(OverlayStyleChoice::new(
            Rgba::TRANSPARENT,
            Rgba::WHITE,
            accent(1.0),
        )),
        OverlayStyleId::Shadow => Some(OverlayStyleChoice::new(
            Rgba::TRANSPARENT,
            Rgba::WHITE,
            Rgba::TRANSPARENT,
        )),
        OverlayStyleId::Adaptive => None,
    }
}

/// Read access to RGBA pixels of the source image.
pub trait PixelSampler {
    fn sample(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Vec<[u8; 4]>>;
}

impl PixelSampler for RgbaImage {
    /// The region is clipped to the image; a region with nothing inside it is an error.
    fn sample(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Vec<[u8; 4]>> {
        let (img_w, img_h) = self.dimensions();
        if width == 0 || height == 0 || x >= img_w || y >= img_h {
            return Err(anyhow!(
                "sample region {}x{}+{}+{} is outside the {}x{} image",
                width,
                height,
                x,
                y,
                img_w,
                img_h
            ));
        }
        let x_end = x.saturating_add(width).min(img_w);
        let y_end = y.saturating_add(height).min(img_h);
        let mut pixels = Vec::with_capacity(((x_end - x) * (y_end - y)) as usize);
        for py in y..y_end {
            for px in x..x_end {
                pixels.push(self.get_pixel(px, py).0);
            }
        }
        Ok(pixels)
    }
}

pub fn luminance(pixel: [u8; 4]) -> f32 {
    0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
}

pub fn resolve_style(
    sampler: Option<&dyn PixelSampler>,
    bbox: &BBox,
    style: OverlayStyleId,
) -> OverlayStyleChoice {
    if let Some(fixed) = fixed_style(style) {
        return fixed;
    }
    let Some(sampler) = sampler else {
        return NEUTRAL_STYLE;
    };
    match average_luminance(sampler, bbox) {
        Ok(avg) if avg > LIGHT_LUMINANCE => DARK_PANEL_STYLE,
        Ok(_) => LIGHT_PANEL_STYLE,
        Err(err) => {
            warn!("adaptive style sampling failed: {:#}", err);
            NEUTRAL_STYLE
        }
    }
}

fn average_luminance(sampler: &dyn PixelSampler, bbox: &BBox) -> Result<f32> {
    let x = bbox.x0.max(0.0).floor() as u32;
    let y = bbox.y0.max(0.0).floor() as u32;
    let width = bbox.width().min(SAMPLE_MAX_W).round() as u32;
    let height = bbox.height().min(SAMPLE_MAX_H).round() as u32;
    let pixels = sampler.sample(x, y, width, height)?;
    if pixels.is_empty() {
        return Err(anyhow!("sample region is empty"));
    }
    let total: f32 = pixels.iter().copied().map(luminance).sum();
    Ok(total / pixels.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba as Pixel;

    fn filled(width: u32, height: u32, value: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Pixel([value, value, value, 255]))
    }

    #[test]
    fn black_region_gets_light_panel() {
        let image = filled(100, 100, 0);
        let choice = resolve_style(
            Some(&image),
            &BBox::new(10.0, 10.0, 90.0, 40.0),
            OverlayStyleId::Adaptive,
        );
        assert_eq!(choice, LIGHT_PANEL_STYLE);
        assert_eq!(choice.text, Rgba::BLACK);
    }

    #[test]
    fn white_region_gets_dark_panel() {
        let image = filled(100, 100, 255);
        let choice = resolve_style(
            Some(&image),
            &BBox::new(10.0, 10.0, 90.0, 40.0),
            OverlayStyleId::Adaptive,
        );
        assert_eq!(choice, DARK_PANEL_STYLE);
        assert_eq!(choice.text, Rgba::WHITE);
    }

    #[test]
    fn samples_only_top_left_window() {
        let mut image = filled(200, 100, 255);
        for y in 0..100 {
            for x in 0..200 {
                if x >= 50 || y >= 20 {
                    image.put_pixel(x, y, Pixel([0, 0, 0, 255]));
                }
            }
        }
        let choice = resolve_style(
            Some(&image),
            &BBox::new(0.0, 0.0, 200.0, 100.0),
            OverlayStyleId::Adaptive,
        );
        assert_eq!(choice, DARK_PANEL_STYLE);
    }

    #[test]
    fn out_of_bounds_falls_back_to_neutral() {
        let image = filled(10, 10, 255);
        let choice = resolve_style(
            Some(&image),
            &BBox::new(40.0, 40.0, 80.0, 60.0),
            OverlayStyleId::Adaptive,
        );
        assert_eq!(choice, NEUTRAL_STYLE);
    }

    #[test]
    fn missing_sampler_falls_back_to_neutral() {
        let choice = resolve_style(
            None,
            &BBox::new(0.0, 0.0, 10.0, 10.0),
            OverlayStyleId::Adaptive,
        );
        assert_eq!(choice, NEUTRAL_STYLE);
    }

    #[test]
    fn fixed_styles_ignore_pixels() {
        let image = filled(100, 100, 255);
        let bbox = BBox::new(0.0, 0.0, 50.0, 20.0);
        let outline = resolve_style(Some(&image), &bbox, OverlayStyleId::Outline);
        assert!(outline.background.is_transparent());
        assert_eq!(outline.border, Rgba::new(59, 130, 246, 1.0));
        let shadow = resolve_style(Some(&image), &bbox, OverlayStyleId::Shadow);
        assert!(shadow.background.is_transparent());
        assert!(shadow.border.is_transparent());
        assert_eq!(
            resolve_style(None, &bbox, OverlayStyleId::Solid).background,
            Rgba::new(59, 130, 246, 0.95)
        );
    }

    #[test]
    fn luminance_weights_channels() {
        assert_eq!(luminance([0, 0, 0, 255]), 0.0);
        assert!((luminance([255, 255, 255, 255]) - 255.0).abs() < 1e-3);
        assert!((luminance([255, 0, 0, 255]) - 76.245).abs() < 1e-3);
    }

    #[test]
    fn style_ids_parse_case_insensitively() {
        assert_eq!(
            "Shadow".parse::<OverlayStyleId>().unwrap(),
            OverlayStyleId::Shadow
        );
        assert!("neon".parse::<OverlayStyleId>().is_err());
    }

    #[test]
    fn shadow_complement_contrasts_text() {
        assert_eq!(Rgba::WHITE.shadow_complement(), Rgba::new(0, 0, 0, 0.8));
        assert_eq!(
            Rgba::BLACK.shadow_complement(),
            Rgba::new(255, 255, 255, 0.8)
        );
    }
}
