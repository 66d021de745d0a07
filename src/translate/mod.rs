use anyhow::{Context, Result};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::grouping::TextBlock;
use crate::languages;
use crate::ocr::BBox;
use crate::settings::Settings;

mod dictionary;
mod libre;
mod mymemory;
mod retry;

pub use dictionary::FallbackDictionary;
pub use libre::LibreTranslate;
pub use mymemory::MyMemory;

/// Blocks whose trimmed text is shorter than this are not translated.
const MIN_BLOCK_CHARS: usize = 2;

pub type ServiceFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// A remote translation backend. Any error counts as "no answer" and moves
/// the caller on to the next tier.
pub trait TranslationService: Send + Sync {
    fn name(&self) -> &'static str;

    fn translate<'a>(&'a self, text: &'a str, source: &'a str, target: &'a str) -> ServiceFuture<'a>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRecord {
    pub original_text: String,
    pub translated_text: String,
    pub from_language: String,
    pub to_language: String,
    /// Mean of the block's word confidences.
    pub confidence: f64,
    /// Union of the block's word boxes, in source-image pixels.
    pub bbox: BBox,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockRequest<'a> {
    pub source_lang: &'a str,
    pub target_lang: &'a str,
    /// Name recorded as `from_language`, usually the detected language.
    pub detected_language: &'a str,
}

/// Drives translation tiers: primary service, secondary service, then the
/// embedded dictionary. Never fails.
#[derive(Clone)]
pub struct BlockTranslator {
    primary: Option<Arc<dyn TranslationService>>,
    secondary: Option<Arc<dyn TranslationService>>,
    dictionary: FallbackDictionary,
}

impl BlockTranslator {
    pub fn new(
        primary: Option<Arc<dyn TranslationService>>,
        secondary: Option<Arc<dyn TranslationService>>,
        dictionary: FallbackDictionary,
    ) -> Self {
        Self {
            primary,
            secondary,
            dictionary,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.translation_timeout_secs))
            .build()
            .with_context(|| "failed to build HTTP client")?;
        let primary = MyMemory::new(client.clone(), &settings.translation_primary_url)
            .with_email(settings.translation_email.clone())
            .with_max_retries(settings.rate_limit_retries);
        let secondary = LibreTranslate::new(client, &settings.translation_secondary_url)
            .with_max_retries(settings.rate_limit_retries);
        Ok(Self::new(
            Some(Arc::new(primary)),
            Some(Arc::new(secondary)),
            FallbackDictionary::embedded()?,
        ))
    }

    pub async fn translate_text(&self, text: &str, source: &str, target: &str) -> String {
        for service in [&self.primary, &self.secondary].into_iter().flatten() {
            match service.translate(text, source, target).await {
                Ok(translated) => {
                    debug!(service = service.name(), "translated block");
                    return translated;
                }
                Err(err) => warn!("{} translation failed: {:#}", service.name(), err),
            }
        }
        info!("remote translation unavailable; using local dictionary");
        self.dictionary.translate(text, target)
    }

    /// Translates blocks one after another; the output keeps block order.
    pub async fn translate_blocks(
        &self,
        blocks: &[TextBlock],
        request: BlockRequest<'_>,
    ) -> Vec<TranslationRecord> {
        let to_language = languages::display_name(request.target_lang);
        let mut records = Vec::with_capacity(blocks.len());
        for block in blocks {
            let Some(bbox) = block.union_bbox() else {
                continue;
            };
            let original_text = block.joined_text();
            if original_text.trim().chars().count() < MIN_BLOCK_CHARS {
                continue;
            }
            let translated_text = self
                .translate_text(&original_text, request.source_lang, request.target_lang)
                .await;
            records.push(TranslationRecord {
                original_text,
                translated_text,
                from_language: request.detected_language.to_string(),
                to_language: to_language.clone(),
                confidence: block.mean_confidence(),
                bbox,
            });
        }
        records
    }
}

/// Numbered "original → translated" list, one entry per record.
pub fn format_results(records: &[TranslationRecord]) -> String {
    records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            format!(
                "{}. {} → {}",
                idx + 1,
                record.original_text,
                record.translated_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
