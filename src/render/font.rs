use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use ttf_parser::{Face, name_id};
use usvg::fontdb;

use crate::settings::Settings;

const FALLBACK_FAMILIES: &[&str] = &["Arial", "Liberation Sans", "DejaVu Sans", "sans-serif"];
const CSS_FALLBACK: &str = "Arial, sans-serif";
const BOLD_WEIGHT: u16 = 700;

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    family: Option<String>,
    face_index: u32,
    weight: u16,
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// CSS weight of the measured face (400 regular, 700 bold).
    pub fn weight(&self) -> u16 {
        self.weight
    }

    fn measure(&self, text: &str, font_size: f32) -> Option<f32> {
        let face = Face::parse(&self.data, self.face_index).ok()?;
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == ' ' {
                advance = advance.saturating_add(self.space_advance as u32);
                continue;
            }
            let glyph_advance = face
                .glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .unwrap_or(self.space_advance);
            advance = advance.saturating_add(glyph_advance as u32);
        }
        let units = self.units_per_em.max(1) as f32;
        Some(advance as f32 * (font_size / units))
    }
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .field("weight", &self.weight)
            .finish()
    }
}

/// Font used for overlay text: real metrics when a face could be loaded,
/// otherwise a per-character width estimate.
#[derive(Debug, Clone)]
pub struct OverlayFont {
    metrics: Option<FontMetrics>,
    family: String,
}

impl Default for OverlayFont {
    fn default() -> Self {
        Self {
            metrics: None,
            family: CSS_FALLBACK.to_string(),
        }
    }
}

impl OverlayFont {
    pub fn from_settings(settings: &Settings) -> Self {
        let font_path = settings.overlay_font_path.as_deref().map(Path::new);
        match resolve_overlay_font(font_path, settings.overlay_font_family.as_deref()) {
            Ok(metrics) => {
                let family = metrics
                    .family()
                    .map(|name| format!("{}, sans-serif", name))
                    .unwrap_or_else(|| CSS_FALLBACK.to_string());
                debug!(family = %family, "overlay font resolved");
                Self {
                    metrics: Some(metrics),
                    family,
                }
            }
            Err(err) => {
                warn!("overlay font unavailable, estimating text widths: {:#}", err);
                Self::default()
            }
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Weight to draw overlay text with. Widths are measured on this face, so
    /// drawing heavier than it would overflow the wrapped lines.
    pub fn weight(&self) -> u16 {
        self.metrics
            .as_ref()
            .map(FontMetrics::weight)
            .unwrap_or(BOLD_WEIGHT)
    }

    pub fn font_data(&self) -> Option<&[u8]> {
        self.metrics.as_ref().map(FontMetrics::data)
    }

    pub fn measure(&self, text: &str, font_size: f32) -> f32 {
        self.metrics
            .as_ref()
            .and_then(|metrics| metrics.measure(text, font_size))
            .unwrap_or_else(|| estimate_text_width_units(text) * font_size)
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

fn resolve_overlay_font(font_path: Option<&Path>, font_family: Option<&str>) -> Result<FontMetrics> {
    if let Some(path) = font_path {
        return load_font_metrics(path);
    }

    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    if let Some(family) = font_family {
        return load_font_metrics_from_family(&db, family);
    }
    for candidate in FALLBACK_FAMILIES {
        if let Ok(metrics) = load_font_metrics_from_family(&db, candidate) {
            return Ok(metrics);
        }
    }
    Err(anyhow!("no fallback fonts found"))
}

fn estimate_char_units(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.28
    } else if ch.is_ascii_alphanumeric() {
        0.6
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0xAC00..=0xD7A3
    ) {
        1.0
    } else {
        0.65
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units).sum()
}

/// Picks the face to measure with. Overlay text is bold, so a bold face of the
/// preferred family wins, then any face of that family, then any bold face.
fn load_font_metrics_from_data(
    data: &[u8],
    preferred_family: Option<&str>,
    preferred_index: Option<u32>,
) -> Result<FontMetrics> {
    let mut best: Option<(u8, FontMetrics)> = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        let Ok(face) = Face::parse(data, index) else {
            continue;
        };
        let family = extract_family_name(&face);
        let weight = face.weight().to_number();
        let family_match = match (preferred_family, &family) {
            (Some(preferred), Some(found)) => found.eq_ignore_ascii_case(preferred),
            _ => false,
        };
        let rank = u8::from(preferred_index == Some(index)) * 4
            + u8::from(family_match) * 2
            + u8::from(weight >= 600);
        if best.as_ref().is_some_and(|(best_rank, _)| *best_rank >= rank) {
            continue;
        }

        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 4);
        let metrics = FontMetrics {
            data: Arc::new(data.to_vec()),
            units_per_em,
            space_advance,
            family,
            face_index: index,
            weight,
        };
        best = Some((rank, metrics));
    }
    best.map(|(_, metrics)| metrics)
        .ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Result<FontMetrics> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        weight: fontdb::Weight::BOLD,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    load_font_metrics_from_data(&data, Some(family), Some(index))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_grows_with_text_and_size() {
        let font = OverlayFont::default();
        let short = font.measure("abc", 10.0);
        assert!((short - 18.0).abs() < 1e-4);
        assert!(font.measure("abc", 20.0) > short);
        assert!(font.measure("abcd", 10.0) > short);
    }

    #[test]
    fn wide_scripts_estimate_wider() {
        let font = OverlayFont::default();
        assert!(font.measure("日本", 10.0) > font.measure("ab", 10.0));
    }

    #[test]
    fn draw_weight_follows_measured_face() {
        assert_eq!(OverlayFont::default().weight(), 700);
        let regular = OverlayFont {
            metrics: Some(FontMetrics {
                data: Arc::new(Vec::new()),
                units_per_em: 1000,
                space_advance: 250,
                family: Some("Plain".to_string()),
                face_index: 0,
                weight: 400,
            }),
            family: "Plain, sans-serif".to_string(),
        };
        assert_eq!(regular.weight(), 400);
    }

    #[test]
    fn garbage_font_data_is_rejected() {
        assert!(load_font_metrics_from_data(b"not a font", None, None).is_err());
    }

    #[test]
    fn unreadable_font_path_is_an_error() {
        assert!(load_font_metrics(Path::new("/definitely/not/a/font.ttf")).is_err());
    }
}
