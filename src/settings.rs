use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::render::ExportMode;
use crate::style::OverlayStyleId;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub translation_primary_url: String,
    pub translation_secondary_url: String,
    pub translation_source_lang: String,
    pub translation_email: Option<String>,
    pub translation_timeout_secs: u64,
    pub rate_limit_retries: usize,
    pub target_lang: String,
    pub ocr_languages: String,
    pub ocr_psm: u32,
    pub ocr_max_width: u32,
    pub ocr_min_confidence: f32,
    pub ocr_char_whitelist: Option<String>,
    pub upload_max_width: u32,
    pub upload_jpeg_quality: u8,
    pub overlay_style: OverlayStyleId,
    pub overlay_visible: bool,
    pub overlay_font_family: Option<String>,
    pub overlay_font_path: Option<String>,
    pub export_mode: ExportMode,
    pub resize_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            translation_primary_url: "https://api.mymemory.translated.net/get".to_string(),
            translation_secondary_url: "https://libretranslate.de/translate".to_string(),
            translation_source_lang: "en".to_string(),
            translation_email: None,
            translation_timeout_secs: 15,
            rate_limit_retries: 2,
            target_lang: "hi".to_string(),
            ocr_languages: "eng".to_string(),
            ocr_psm: 6,
            ocr_max_width: 800,
            ocr_min_confidence: 25.0,
            ocr_char_whitelist: None,
            upload_max_width: 1200,
            upload_jpeg_quality: 80,
            overlay_style: OverlayStyleId::Adaptive,
            overlay_visible: true,
            overlay_font_family: None,
            overlay_font_path: None,
            export_mode: ExportMode::Matched,
            resize_debounce_ms: 100,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    translation: Option<TranslationSettings>,
    ocr: Option<OcrSettings>,
    upload: Option<UploadSettings>,
    overlay: Option<OverlaySettings>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    primary_url: Option<String>,
    secondary_url: Option<String>,
    source_lang: Option<String>,
    target_lang: Option<String>,
    email: Option<String>,
    timeout_secs: Option<u64>,
    rate_limit_retries: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    languages: Option<String>,
    psm: Option<u32>,
    max_width: Option<u32>,
    min_confidence: Option<f32>,
    char_whitelist: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UploadSettings {
    max_width: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    style: Option<String>,
    visible: Option<bool>,
    font_family: Option<String>,
    font_path: Option<String>,
    export_mode: Option<String>,
    resize_debounce_ms: Option<u64>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings
                .merge(parsed)
                .with_context(|| format!("invalid settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(translation) = incoming.translation {
            merge_string(&mut self.translation_primary_url, translation.primary_url);
            merge_string(&mut self.translation_secondary_url, translation.secondary_url);
            merge_string(&mut self.translation_source_lang, translation.source_lang);
            merge_string(&mut self.target_lang, translation.target_lang);
            merge_optional(&mut self.translation_email, translation.email);
            if let Some(secs) = translation.timeout_secs.filter(|secs| *secs > 0) {
                self.translation_timeout_secs = secs;
            }
            if let Some(retries) = translation.rate_limit_retries {
                self.rate_limit_retries = retries;
            }
        }
        if let Some(ocr) = incoming.ocr {
            merge_string(&mut self.ocr_languages, ocr.languages);
            if let Some(psm) = ocr.psm {
                self.ocr_psm = psm;
            }
            if let Some(width) = ocr.max_width.filter(|width| *width > 0) {
                self.ocr_max_width = width;
            }
            if let Some(conf) = ocr.min_confidence.filter(|conf| *conf >= 0.0) {
                self.ocr_min_confidence = conf;
            }
            merge_optional(&mut self.ocr_char_whitelist, ocr.char_whitelist);
        }
        if let Some(upload) = incoming.upload {
            if let Some(width) = upload.max_width.filter(|width| *width > 0) {
                self.upload_max_width = width;
            }
            if let Some(quality) = upload.jpeg_quality.filter(|q| (1..=100).contains(q)) {
                self.upload_jpeg_quality = quality;
            }
        }
        if let Some(overlay) = incoming.overlay {
            if let Some(style) = overlay.style.filter(|value| !value.trim().is_empty()) {
                self.overlay_style = style.parse()?;
            }
            if let Some(visible) = overlay.visible {
                self.overlay_visible = visible;
            }
            merge_optional(&mut self.overlay_font_family, overlay.font_family);
            merge_optional(&mut self.overlay_font_path, overlay.font_path);
            if let Some(mode) = overlay.export_mode.filter(|value| !value.trim().is_empty()) {
                self.export_mode = mode.parse()?;
            }
            if let Some(ms) = overlay.resize_debounce_ms {
                self.resize_debounce_ms = ms;
            }
        }
        Ok(())
    }
}

fn merge_string(target: &mut String, value: Option<String>) {
    if let Some(value) = value {
        if !value.trim().is_empty() {
            *target = value.trim().to_string();
        }
    }
}

fn merge_optional(target: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        if !value.trim().is_empty() {
            *target = Some(value.trim().to_string());
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".ocr-overlay-translator"))
        }
    })
}
