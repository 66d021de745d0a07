use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::retry::send_with_retry;
use super::{ServiceFuture, TranslationService};

/// Secondary service: LibreTranslate-compatible JSON `POST`.
#[derive(Debug, Clone)]
pub struct LibreTranslate {
    client: reqwest::Client,
    url: String,
    max_retries: usize,
}

impl LibreTranslate {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            max_retries: 0,
        }
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    async fn request(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let body = json!({
            "q": text,
            "source": source,
            "target": target,
            "format": "text",
        });
        let (status, response) = send_with_retry("LibreTranslate", self.max_retries, || {
            self.client.post(&self.url).json(&body)
        })
        .await?;
        if status != StatusCode::OK {
            return Err(anyhow!("LibreTranslate HTTP error ({})", status));
        }
        extract_translation(&response)
    }
}

impl TranslationService for LibreTranslate {
    fn name(&self) -> &'static str {
        "libretranslate"
    }

    fn translate<'a>(&'a self, text: &'a str, source: &'a str, target: &'a str) -> ServiceFuture<'a> {
        Box::pin(self.request(text, source, target))
    }
}

#[derive(Deserialize)]
struct LibreResponse {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

fn extract_translation(body: &str) -> Result<String> {
    let parsed: LibreResponse = serde_json::from_str(body)
        .with_context(|| "failed to parse LibreTranslate response JSON")?;
    parsed
        .translated_text
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| anyhow!("LibreTranslate response has no translatedText"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_translated_text() {
        assert_eq!(
            extract_translation(r#"{"translatedText":"bonjour"}"#).unwrap(),
            "bonjour"
        );
    }

    #[test]
    fn missing_field_is_malformed() {
        assert!(extract_translation(r#"{"error":"too many requests"}"#).is_err());
        assert!(extract_translation("not json").is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let service = LibreTranslate::new(reqwest::Client::new(), "http://127.0.0.1:1/translate");
        assert!(service.translate("hello", "en", "fr").await.is_err());
    }
}
