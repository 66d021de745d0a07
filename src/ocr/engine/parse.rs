use anyhow::{Result, anyhow};

use crate::ocr::{BBox, Recognition, RecognizedWord};

type LineKey = (i32, i32, i32, i32);

/// Reads word rows (level 5) from tesseract TSV. The full text keeps the
/// engine's line structure: words joined by spaces, lines by newlines.
pub(super) fn parse_tsv_words(tsv: &str) -> Result<Recognition> {
    let mut rows = tsv.lines();
    let header = rows.next().unwrap_or_default();
    if !header.starts_with("level") {
        return Err(anyhow!("unexpected tesseract TSV header"));
    }

    let mut words = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    let mut last_key: Option<LineKey> = None;

    for row in rows {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let key: LineKey = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        let left: f32 = cols[6].parse().unwrap_or(0.0);
        let top: f32 = cols[7].parse().unwrap_or(0.0);
        let width: f32 = cols[8].parse().unwrap_or(0.0);
        let height: f32 = cols[9].parse().unwrap_or(0.0);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11..].join("\t");
        let text = text.trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        if last_key == Some(key) {
            if let Some(line) = lines.last_mut() {
                line.push(' ');
                line.push_str(text);
            }
        } else {
            lines.push(text.to_string());
            last_key = Some(key);
        }

        words.push(RecognizedWord::new(
            text,
            conf,
            BBox::new(left, top, left + width, top + height),
        ));
    }

    Ok(Recognition {
        words,
        full_text: lines.join("\n"),
    })
}
