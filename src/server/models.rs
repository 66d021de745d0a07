use serde::{Deserialize, Serialize};

use crate::translate::TranslationRecord;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct TranslateRequest {
    pub(crate) image_base64: Option<String>,
    pub(crate) lang: Option<String>,
    pub(crate) style: Option<String>,
    pub(crate) display_width: Option<f32>,
    pub(crate) display_height: Option<f32>,
    pub(crate) hide_overlay: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TranslateResponse {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) records: Vec<TranslationRecord>,
    pub(crate) results: String,
    pub(crate) overlay_svg: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LanguageOption {
    pub(crate) value: String,
    pub(crate) label: String,
    pub(crate) flag: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
