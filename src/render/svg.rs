use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::ocr::BBox;
use crate::style::{OverlayStyleChoice, Rgba};

use super::layout::{BOX_PADDING, line_centers};

/// Distance from a line's vertical centre down to its alphabetic baseline, in ems.
const MIDDLE_TO_BASELINE: f32 = 0.35;
const BADGE_W: f32 = 20.0;
const BADGE_H: f32 = 12.0;

pub(super) struct SvgDoc {
    buf: String,
}

impl SvgDoc {
    pub(super) fn open(width: f32, height: f32) -> Self {
        let mut buf = String::new();
        buf.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = width,
            h = height
        ));
        Self { buf }
    }

    pub(super) fn image(&mut self, bytes: &[u8], mime: &str, width: f32, height: f32) {
        let uri = format!("data:{};base64,{}", mime, BASE64.encode(bytes));
        self.buf.push_str(&format!(
            r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
            uri = uri,
            w = width,
            h = height
        ));
    }

    pub(super) fn finish(mut self) -> String {
        self.buf.push_str("</svg>");
        self.buf
    }

    fn push(&mut self, fragment: &str) {
        self.buf.push_str(fragment);
    }
}

/// Everything needed to paint one translated block on a surface.
pub(super) struct BlockPaint<'a> {
    pub(super) index: usize,
    /// Block box in surface coordinates, before padding.
    pub(super) rect: BBox,
    pub(super) colors: OverlayStyleChoice,
    /// `None` leaves the box unstroked.
    pub(super) border_width: Option<f32>,
    pub(super) drop_shadow: bool,
    pub(super) font_size: f32,
    pub(super) lines: Vec<String>,
    pub(super) badge: bool,
    pub(super) font_family: &'a str,
    pub(super) font_weight: u16,
}

pub(super) fn draw_block(doc: &mut SvgDoc, paint: &BlockPaint<'_>) {
    let rect = paint.rect;
    let x = rect.x0 - BOX_PADDING;
    let y = rect.y0 - BOX_PADDING;
    let w = rect.width() + BOX_PADDING * 2.0;
    let h = rect.height() + BOX_PADDING * 2.0;

    let fill_attrs = if paint.colors.background.is_transparent() {
        r#"fill="none""#.to_string()
    } else {
        paint_attrs("fill", &paint.colors.background)
    };
    let stroke_attrs = match paint.border_width {
        Some(width) if !paint.colors.border.is_transparent() => format!(
            r#" {} stroke-width="{}""#,
            paint_attrs("stroke", &paint.colors.border),
            width
        ),
        _ => String::new(),
    };
    if !paint.colors.background.is_transparent() || !stroke_attrs.is_empty() {
        doc.push(&format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" {fill}{stroke}/>"#,
            x = x,
            y = y,
            w = w,
            h = h,
            fill = fill_attrs,
            stroke = stroke_attrs
        ));
    }

    let filter_attr = if paint.drop_shadow {
        let id = format!("shadow-{}", paint.index);
        let shadow = paint.colors.text.shadow_complement();
        doc.push(&format!(
            r#"<filter id="{id}" x="-20%" y="-20%" width="140%" height="140%"><feDropShadow dx="2" dy="2" stdDeviation="2" flood-color="{color}" flood-opacity="{opacity}"/></filter>"#,
            id = id,
            color = shadow.svg_rgb(),
            opacity = shadow.a
        ));
        format!(r#" filter="url(#{})""#, id)
    } else {
        String::new()
    };

    let center_x = rect.x0 + rect.width() / 2.0;
    let centers = line_centers(rect.y0, rect.height(), paint.lines.len(), paint.font_size);
    for (line, center_y) in paint.lines.iter().zip(centers) {
        doc.push(&format!(
            r#"<text x="{x}" y="{y}" font-family="{family}" font-size="{size}" font-weight="{weight}" text-anchor="middle" {fill}{filter}>{text}</text>"#,
            x = center_x,
            y = center_y + paint.font_size * MIDDLE_TO_BASELINE,
            family = escape_xml(paint.font_family),
            weight = paint.font_weight,
            size = paint.font_size,
            fill = paint_attrs("fill", &paint.colors.text),
            filter = filter_attr,
            text = escape_xml(line)
        ));
    }

    if paint.badge {
        draw_badge(doc, paint);
    }
}

/// 1-based index tag at the block's top-left corner, light text on a dark tab.
fn draw_badge(doc: &mut SvgDoc, paint: &BlockPaint<'_>) {
    let rect = paint.rect;
    let badge_size = (paint.font_size * 0.6).max(8.0);
    doc.push(&format!(
        r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" {fill}/>"#,
        x = rect.x0 - 2.0,
        y = rect.y0 - 16.0,
        w = BADGE_W,
        h = BADGE_H,
        fill = paint_attrs("fill", &Rgba::new(0, 0, 0, 0.8))
    ));
    doc.push(&format!(
        r#"<text x="{x}" y="{y}" font-family="{family}" font-size="{size}" font-weight="bold" {fill}>{index}</text>"#,
        x = rect.x0 + 2.0,
        y = rect.y0 - 10.0 + badge_size * MIDDLE_TO_BASELINE,
        family = escape_xml(paint.font_family),
        size = badge_size,
        fill = paint_attrs("fill", &Rgba::new(255, 255, 255, 0.9)),
        index = paint.index + 1
    ));
}

/// Single centred line without wrapping, badge, border or shadow.
pub(super) fn draw_plain_block(
    doc: &mut SvgDoc,
    rect: BBox,
    colors: &OverlayStyleChoice,
    font_size: f32,
    text: &str,
    font_family: &str,
    font_weight: u16,
) {
    doc.push(&format!(
        r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" {fill}/>"#,
        x = rect.x0 - BOX_PADDING,
        y = rect.y0 - BOX_PADDING,
        w = rect.width() + BOX_PADDING * 2.0,
        h = rect.height() + BOX_PADDING * 2.0,
        fill = paint_attrs("fill", &colors.background)
    ));
    let center_y = rect.y0 + rect.height() / 2.0;
    doc.push(&format!(
        r#"<text x="{x}" y="{y}" font-family="{family}" font-size="{size}" font-weight="{weight}" text-anchor="middle" {fill}>{text}</text>"#,
        x = rect.x0 + rect.width() / 2.0,
        y = center_y + font_size * MIDDLE_TO_BASELINE,
        family = escape_xml(font_family),
        weight = font_weight,
        size = font_size,
        fill = paint_attrs("fill", &colors.text),
        text = escape_xml(text.trim())
    ));
}

fn paint_attrs(kind: &str, color: &Rgba) -> String {
    format!(
        r#"{kind}="{rgb}" {kind}-opacity="{a}""#,
        kind = kind,
        rgb = color.svg_rgb(),
        a = color.a
    )
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
