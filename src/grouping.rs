//! Groups recognised words into reading-order text blocks.
//!
//! The thresholds are fixed pixel distances in source-image space. They do not
//! scale with resolution or glyph size, so very large or very small scans group
//! less reliably.

use std::cmp::Ordering;

use crate::ocr::{BBox, RecognizedWord};

/// Words whose top edges differ by at most this many pixels share a line.
pub const SAME_LINE_TOLERANCE_PX: f32 = 30.0;
/// A horizontal gap wider than this splits a line into separate phrases.
pub const PHRASE_GAP_PX: f32 = 100.0;

/// A non-empty run of words that reads as one line or phrase.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    words: Vec<RecognizedWord>,
}

impl TextBlock {
    pub fn words(&self) -> &[RecognizedWord] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn joined_text(&self) -> String {
        self.words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn mean_confidence(&self) -> f64 {
        if self.words.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.words.iter().map(|word| f64::from(word.confidence)).sum();
        sum / self.words.len() as f64
    }

    pub fn union_bbox(&self) -> Option<BBox> {
        let mut words = self.words.iter();
        let first = words.next()?.bbox;
        Some(words.fold(first, |acc, word| acc.union(&word.bbox)))
    }
}

pub fn group_text_blocks(words: &[RecognizedWord]) -> Vec<TextBlock> {
    let sorted = sort_reading_order(words);

    let mut blocks = Vec::new();
    let mut current: Vec<RecognizedWord> = Vec::new();
    let mut last: Option<(f32, f32)> = None;

    for word in sorted {
        if let Some((last_y, last_x)) = last {
            let new_line = (word.bbox.y0 - last_y).abs() > SAME_LINE_TOLERANCE_PX;
            let large_gap = word.bbox.x0 - last_x > PHRASE_GAP_PX;
            if (new_line || large_gap) && !current.is_empty() {
                blocks.push(TextBlock {
                    words: std::mem::take(&mut current),
                });
            }
        }
        last = Some((word.bbox.y0, word.bbox.x1));
        current.push(word.clone());
    }

    if !current.is_empty() {
        blocks.push(TextBlock { words: current });
    }
    blocks
}

fn reading_order(a: &RecognizedWord, b: &RecognizedWord) -> Ordering {
    let dy = a.bbox.y0 - b.bbox.y0;
    if dy.abs() > SAME_LINE_TOLERANCE_PX {
        dy.total_cmp(&0.0)
    } else {
        a.bbox.x0.total_cmp(&b.bbox.x0)
    }
}

// The line tolerance makes `reading_order` non-transitive, which the std sorts
// may reject with a panic. A stable insertion sort only ever compares
// neighbours and tolerates it.
fn sort_reading_order(words: &[RecognizedWord]) -> Vec<&RecognizedWord> {
    let mut sorted: Vec<&RecognizedWord> = Vec::with_capacity(words.len());
    for word in words {
        let mut idx = sorted.len();
        while idx > 0 && reading_order(sorted[idx - 1], word) == Ordering::Greater {
            idx -= 1;
        }
        sorted.insert(idx, word);
    }
    sorted
}
