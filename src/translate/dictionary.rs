use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

include!(concat!(env!("OUT_DIR"), "/embedded_dictionaries.rs"));

#[derive(Debug, Deserialize)]
struct DictionaryFile {
    words: HashMap<String, String>,
}

/// Word-by-word last resort when no remote service answers.
#[derive(Debug, Clone, Default)]
pub struct FallbackDictionary {
    by_language: HashMap<String, HashMap<String, String>>,
}

impl FallbackDictionary {
    /// Loads the word lists compiled into the binary from `src/dictionaries`.
    pub fn embedded() -> Result<Self> {
        let mut by_language = HashMap::new();
        for code in EMBEDDED_DICTIONARY_CODES {
            let Some(raw) = embedded_dictionary(code) else {
                continue;
            };
            let parsed: DictionaryFile = toml::from_str(raw)
                .with_context(|| format!("failed to parse embedded dictionary '{}'", code))?;
            let words = parsed
                .words
                .into_iter()
                .map(|(key, value)| (key.to_lowercase(), value))
                .collect();
            by_language.insert(code.to_string(), words);
        }
        Ok(Self { by_language })
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.by_language.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    /// Replaces each whitespace-separated token found in the target
    /// language's list; unknown tokens are kept verbatim.
    pub fn translate(&self, text: &str, target: &str) -> String {
        let Some(words) = self.by_language.get(&target.trim().to_lowercase()) else {
            return text.to_string();
        };
        text.split_whitespace()
            .map(|token| {
                words
                    .get(&lookup_key(token))
                    .map(String::as_str)
                    .unwrap_or(token)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn lookup_key(token: &str) -> String {
    token
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .collect::<String>()
        .to_lowercase()
}
