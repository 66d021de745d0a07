/// Extra margin drawn around each block's box.
pub(crate) const BOX_PADDING: f32 = 4.0;
/// Horizontal room lost to padding when wrapping inside a box.
pub(crate) const WRAP_INSET: f32 = 8.0;
pub(crate) const LINE_HEIGHT_FACTOR: f32 = 1.2;

/// Display-sized overlays keep text between 10 and 18 px.
pub(crate) fn interactive_font_size(box_height: f32) -> f32 {
    (box_height * 0.8).min(18.0).max(10.0)
}

/// Native-resolution exports only bound the size from below.
pub(crate) fn export_font_size(box_height: f32) -> f32 {
    (box_height * 0.8).max(12.0)
}

/// Greedy word wrap: a line grows while `measure` stays within `max_width`.
/// A word wider than `max_width` still gets a line of its own.
pub(crate) fn wrap_words<F>(text: &str, max_width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if measure(&candidate) > max_width && !current.is_empty() {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Vertical centres of `line_count` stacked lines centred in a box.
pub(crate) fn line_centers(box_y: f32, box_height: f32, line_count: usize, font_size: f32) -> Vec<f32> {
    let line_height = font_size * LINE_HEIGHT_FACTOR;
    let total = line_count as f32 * line_height;
    let start = box_y + box_height / 2.0 - total / 2.0 + line_height / 2.0;
    (0..line_count)
        .map(|idx| start + idx as f32 * line_height)
        .collect()
}
