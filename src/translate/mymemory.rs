use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;

use super::retry::send_with_retry;
use super::{ServiceFuture, TranslationService};

/// Primary service: a `GET` with `q` and a `source|target` language pair,
/// answered with a status envelope.
#[derive(Debug, Clone)]
pub struct MyMemory {
    client: reqwest::Client,
    url: String,
    email: Option<String>,
    max_retries: usize,
}

impl MyMemory {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            email: None,
            max_retries: 0,
        }
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    async fn request(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let langpair = format!("{}|{}", source, target);
        let mut query = vec![("q", text.to_string()), ("langpair", langpair)];
        if let Some(email) = &self.email {
            query.push(("de", email.clone()));
        }
        let (status, body) = send_with_retry("MyMemory", self.max_retries, || {
            self.client.get(&self.url).query(&query)
        })
        .await?;
        if !status.is_success() {
            return Err(anyhow!("MyMemory HTTP error ({})", status));
        }
        extract_translation(&body)
    }
}

impl TranslationService for MyMemory {
    fn name(&self) -> &'static str {
        "mymemory"
    }

    fn translate<'a>(&'a self, text: &'a str, source: &'a str, target: &'a str) -> ServiceFuture<'a> {
        Box::pin(self.request(text, source, target))
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "responseStatus")]
    response_status: Option<Value>,
    #[serde(rename = "responseData")]
    response_data: Option<ResponseData>,
}

#[derive(Deserialize)]
struct ResponseData {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

fn extract_translation(body: &str) -> Result<String> {
    let envelope: Envelope =
        serde_json::from_str(body).with_context(|| "failed to parse MyMemory response JSON")?;
    // The status arrives as a number or as a numeric string.
    let status = envelope
        .response_status
        .as_ref()
        .and_then(|value| {
            value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        })
        .ok_or_else(|| anyhow!("MyMemory response has no status"))?;
    if status != 200 {
        return Err(anyhow!("MyMemory response status {}", status));
    }
    let text = envelope
        .response_data
        .and_then(|data| data.translated_text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| anyhow!("MyMemory response has no translatedText"))?;
    if text.starts_with("MYMEMORY WARNING") {
        return Err(anyhow!("MyMemory quota exhausted"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_numeric_and_string_status() {
        let numeric = r#"{"responseData":{"translatedText":"नमस्ते"},"responseStatus":200}"#;
        assert_eq!(extract_translation(numeric).unwrap(), "नमस्ते");
        let string = r#"{"responseData":{"translatedText":"hola"},"responseStatus":"200"}"#;
        assert_eq!(extract_translation(string).unwrap(), "hola");
    }

    #[test]
    fn rejects_failure_envelopes() {
        let denied = r#"{"responseData":{"translatedText":"INVALID LANGUAGE PAIR"},"responseStatus":"403"}"#;
        assert!(extract_translation(denied).is_err());
        let empty = r#"{"responseData":{"translatedText":""},"responseStatus":200}"#;
        assert!(extract_translation(empty).is_err());
        let quota = r#"{"responseData":{"translatedText":"MYMEMORY WARNING: YOU USED ALL AVAILABLE FREE TRANSLATIONS"},"responseStatus":200}"#;
        assert!(extract_translation(quota).is_err());
        assert!(extract_translation("<html>busy</html>").is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let service = MyMemory::new(reqwest::Client::new(), "http://127.0.0.1:1/get");
        assert!(service.translate("hello", "en", "hi").await.is_err());
    }
}
