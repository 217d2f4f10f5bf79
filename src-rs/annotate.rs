use anyhow::{bail, Context, Result};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fs;
use std::io::{self, Read};

pub const DEFAULT_SCORE_IMAGE: &str = "/mnt/kimi/upload/Berceuse m27-30.png";

const LABEL_PADDING: i32 = 2;
const NOTE_FONT_PX: u32 = 13;
const SMALL_FONT_PX: u32 = 11;

const RH_COLOR: Rgba<u8> = Rgba([200, 0, 0, 220]);
const LH_COLOR: Rgba<u8> = Rgba([0, 0, 180, 220]);
const RH_BG: Rgba<u8> = Rgba([255, 220, 220, 150]);
const LH_BG: Rgba<u8> = Rgba([220, 220, 255, 150]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Rh,
    Lh,
}

impl Hand {
    fn colors(self) -> (Rgba<u8>, Rgba<u8>) {
        match self {
            Hand::Rh => (RH_COLOR, RH_BG),
            Hand::Lh => (LH_COLOR, LH_BG),
        }
    }
}

/// Which of the two requested faces a label uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FontRole {
    Note,
    Small,
}

impl FontRole {
    /// TrueType faces are not resolved; both roles use the built-in 8x8
    /// bitmap font scaled to the nearest integer size.
    fn bitmap(self) -> BitmapFont {
        let (px, bold) = match self {
            FontRole::Note => (NOTE_FONT_PX, true),
            FontRole::Small => (SMALL_FONT_PX, false),
        };
        BitmapFont {
            scale: (f64::from(px) / 8.0).round().max(1.0) as u32,
            bold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BitmapFont {
    scale: u32,
    bold: bool,
}

impl BitmapFont {
    fn measure(self, text: &str) -> (i32, i32) {
        let (x0, y0, x1, y1) = text_bbox(0, 0, text, self.scale);
        let extra = i32::from(self.bold && x1 > x0);
        ((x1 - x0).saturating_add(extra), y1 - y0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteLabel {
    pub x: i32,
    pub y: i32,
    pub text: String,
    pub hand: Hand,
    pub font: FontRole,
}

impl NoteLabel {
    fn new(x: i32, y: i32, text: &str, hand: Hand, font: FontRole) -> Self {
        Self {
            x,
            y,
            text: text.to_string(),
            hand,
            font,
        }
    }
}

/// Where a label ended up, background box included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedLabel {
    #[serde(flatten)]
    pub label: NoteLabel,
    pub text_width: i32,
    pub text_height: i32,
    pub bbox: [i32; 4],
}

// Measures 27-29, one system each: (x, note, y).
const M27_RH: &[(i32, &str, i32)] = &[
    (180, "Ab4", 90),
    (240, "C5", 90),
    (300, "Db5", 90),
    (360, "C5", 90),
    (420, "Ab4", 90),
    (480, "C5", 90),
    (540, "Bb4", 90),
    (600, "C5", 90),
    (660, "Ab4", 90),
    (720, "C5", 90),
    (780, "Gb4", 90),
    (840, "C5", 90),
    (900, "F4", 90),
    (960, "Ab4", 90),
    (1020, "Eb4", 90),
    (1080, "Ab4", 90),
];

const M27_RH_UPPER: &[(i32, &str, i32)] = &[
    (180, "F5", 70),
    (240, "F5", 70),
    (300, "F5", 70),
    (360, "F5", 70),
    (420, "F5", 70),
    (480, "F5", 70),
    (540, "Eb5", 70),
    (600, "Eb5", 70),
    (660, "F5", 70),
    (720, "F5", 70),
    (780, "F5", 70),
    (840, "F5", 70),
    (900, "F5", 70),
    (960, "F5", 70),
    (1020, "Gb5", 70),
    (1080, "Gb5", 70),
];

const M27_LH: &[(i32, &str, i32)] = &[
    (200, "Db2", 320),
    (380, "Db3", 320),
    (560, "Ab3", 320),
    (740, "Db4", 320),
    (920, "Ab3", 320),
    (1100, "Db3", 320),
];

const M28_RH: &[(i32, &str, i32)] = &[
    (180, "F4", 540),
    (240, "Ab4", 540),
    (300, "Db5", 540),
    (360, "Ab4", 540),
    (420, "F4", 540),
    (480, "Ab4", 540),
    (540, "Eb5", 540),
    (600, "Ab4", 540),
    (660, "F4", 540),
    (720, "Ab4", 540),
    (780, "C5", 540),
    (840, "Ab4", 540),
    (900, "Db5", 540),
    (960, "Ab4", 540),
    (1020, "C5", 540),
    (1080, "Ab4", 540),
];

const M28_RH_UPPER: &[(i32, &str, i32)] = &[
    (180, "Ab5", 520),
    (240, "Ab5", 520),
    (300, "Ab5", 520),
    (360, "Ab5", 520),
    (420, "Ab5", 520),
    (480, "Ab5", 520),
    (540, "Ab5", 520),
    (600, "Ab5", 520),
    (660, "Ab5", 520),
    (720, "Ab5", 520),
    (780, "Ab5", 520),
    (840, "Ab5", 520),
    (900, "Ab5", 520),
    (960, "Ab5", 520),
    (1020, "Ab5", 520),
    (1080, "Ab5", 520),
];

const M28_LH: &[(i32, &str, i32)] = &[
    (200, "Db2", 770),
    (380, "Db3", 770),
    (560, "Ab3", 770),
    (740, "Db4", 770),
    (920, "Ab3", 770),
    (1100, "Db3", 770),
];

const M29_RH: &[(i32, &str, i32)] = &[
    (180, "Db5", 940),
    (240, "Ab4", 940),
    (300, "C5", 940),
    (360, "Ab4", 940),
    (420, "Db5", 940),
    (480, "Ab4", 940),
    (540, "Eb5", 940),
    (600, "Ab4", 940),
    (660, "Db5", 940),
    (720, "Ab4", 940),
    (780, "C5", 940),
    (840, "Ab4", 940),
    (900, "Bb4", 940),
    (960, "Db5", 940),
    (1020, "Ab4", 940),
    (1080, "Db5", 940),
];

const M29_RH_UPPER: &[(i32, &str, i32)] = &[
    (180, "Ab5", 920),
    (240, "Ab5", 920),
    (300, "Ab5", 920),
    (360, "Ab5", 920),
    (420, "Ab5", 920),
    (480, "Ab5", 920),
    (540, "Gb5", 920),
    (600, "Gb5", 920),
    (660, "F5", 920),
    (720, "F5", 920),
    (780, "F5", 920),
    (840, "F5", 920),
    (900, "F5", 920),
    (960, "F5", 920),
    (1020, "F5", 920),
    (1080, "F5", 920),
];

const M29_LH: &[(i32, &str, i32)] = &[
    (200, "Db2", 1170),
    (380, "Db3", 1170),
    (560, "Ab3", 1170),
    (740, "Db4", 1170),
    (920, "Ab3", 1170),
    (1100, "Db3", 1170),
];

/// Note names for measures 27-29 of the score image.
pub fn builtin_labels() -> Vec<NoteLabel> {
    let groups: [(&[(i32, &str, i32)], Hand, FontRole); 9] = [
        (M27_RH, Hand::Rh, FontRole::Note),
        (M27_RH_UPPER, Hand::Rh, FontRole::Small),
        (M27_LH, Hand::Lh, FontRole::Note),
        (M28_RH, Hand::Rh, FontRole::Note),
        (M28_RH_UPPER, Hand::Rh, FontRole::Small),
        (M28_LH, Hand::Lh, FontRole::Note),
        (M29_RH, Hand::Rh, FontRole::Note),
        (M29_RH_UPPER, Hand::Rh, FontRole::Small),
        (M29_LH, Hand::Lh, FontRole::Note),
    ];
    groups
        .iter()
        .flat_map(|(notes, hand, font)| {
            notes
                .iter()
                .map(move |(x, text, y)| NoteLabel::new(*x, *y, text, *hand, *font))
        })
        .collect()
}

/// Reads a label file (or stdin for `-`): either a list of labels or an
/// object with a `labels` list.
pub fn load_labels(path: &str) -> Result<Vec<NoteLabel>> {
    let raw = if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read labels from stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read labels file: {path}"))?
    };

    let value: Value = serde_json::from_str(&raw).context("invalid labels JSON")?;
    let items = match &value {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("labels").and_then(Value::as_array) {
            Some(items) => items,
            None => bail!("labels must be a list or an object with 'labels'"),
        },
        _ => bail!("labels must be a list or an object with 'labels'"),
    };

    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(label_from_object)
        .collect())
}

fn label_from_object(obj: &Map<String, Value>) -> Option<NoteLabel> {
    let x = value_to_i32(obj.get("x"))?;
    let y = value_to_i32(obj.get("y"))?;
    let text = obj.get("text").and_then(Value::as_str)?.trim();
    if text.is_empty() {
        return None;
    }
    let hand = match obj.get("hand").and_then(Value::as_str).map(str::to_ascii_lowercase) {
        Some(h) if matches!(h.as_str(), "lh" | "left") => Hand::Lh,
        _ => Hand::Rh,
    };
    let font = match obj.get("size").and_then(Value::as_str) {
        Some("small") => FontRole::Small,
        _ => FontRole::Note,
    };
    Some(NoteLabel::new(x, y, text, hand, font))
}

fn value_to_i32(value: Option<&Value>) -> Option<i32> {
    match value {
        Some(Value::Number(n)) => n.as_f64().map(|v| v.round() as i32),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().map(|v| v.round() as i32),
        _ => None,
    }
}

/// Draws every label on a transparent layer the size of the image.
pub fn render_overlay(width: u32, height: u32, labels: &[NoteLabel]) -> (RgbaImage, Vec<PlacedLabel>) {
    let mut overlay = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 0]));
    let placed = labels
        .iter()
        .map(|label| draw_note_with_bg(&mut overlay, label))
        .collect();
    (overlay, placed)
}

fn draw_note_with_bg(overlay: &mut RgbaImage, label: &NoteLabel) -> PlacedLabel {
    let font = label.font.bitmap();
    let (color, bg) = label.hand.colors();
    let (text_width, text_height) = font.measure(&label.text);
    let bbox = [
        label.x.saturating_sub(LABEL_PADDING),
        label.y.saturating_sub(LABEL_PADDING),
        label.x.saturating_add(text_width).saturating_add(LABEL_PADDING),
        label.y.saturating_add(text_height).saturating_add(LABEL_PADDING),
    ];
    fill_rect(overlay, bbox[0], bbox[1], bbox[2], bbox[3], bg);
    draw_bitmap_text(overlay, label.x, label.y, &label.text, color, font.scale);
    if font.bold {
        draw_bitmap_text(overlay, label.x.saturating_add(1), label.y, &label.text, color, font.scale);
    }
    PlacedLabel {
        label: label.clone(),
        text_width,
        text_height,
        bbox,
    }
}

/// Composites `overlay` over `base` in place.
pub fn alpha_composite(base: &mut RgbaImage, overlay: &RgbaImage) {
    let width = base.width().min(overlay.width());
    let height = base.height().min(overlay.height());
    for y in 0..height {
        for x in 0..width {
            let src = *overlay.get_pixel(x, y);
            if src[3] == 0 {
                continue;
            }
            let dst = *base.get_pixel(x, y);
            base.put_pixel(x, y, blend_pixel(dst, src));
        }
    }
}

pub fn annotation_meta(placed: &[PlacedLabel], width: u32, height: u32) -> Value {
    json!({
        "size": {"width": width, "height": height, "units": "px"},
        "label_count": placed.len(),
        "labels": placed,
    })
}

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = f64::from(src[3]) / 255.0;
    if sa <= 0.0 {
        return dst;
    }
    let da = f64::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let channel = |i: usize| -> u8 {
        let value = (f64::from(src[i]) * sa + f64::from(dst[i]) * da * (1.0 - sa)) / out_a;
        value.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

fn clamp_i32(value: i32, min_value: i32, max_value: i32) -> i32 {
    value.max(min_value).min(max_value)
}

/// Fills the inclusive rectangle, replacing pixels. Off-image parts are
/// clipped.
fn fill_rect(img: &mut RgbaImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let (w, h) = (img.width() as i32, img.height() as i32);
    if x0.max(x1) < 0 || y0.max(y1) < 0 || x0.min(x1) >= w || y0.min(y1) >= h {
        return;
    }
    let min_x = clamp_i32(x0.min(x1), 0, w - 1);
    let max_x = clamp_i32(x0.max(x1), 0, w - 1);
    let min_y = clamp_i32(y0.min(y1), 0, h - 1);
    let max_y = clamp_i32(y0.max(y1), 0, h - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            img.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_bitmap_text(img: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>, scale: u32) {
    let scale_i = scale.max(1) as i32;
    let advance = 8 * scale_i;
    let mut cursor_x = x;
    let mut cursor_y = y;
    for ch in text.chars() {
        if ch == '\n' {
            cursor_x = x;
            cursor_y = cursor_y.saturating_add(advance);
            continue;
        }
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x = cursor_x.saturating_add(advance);
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            for col_idx in 0..8 {
                if (*row >> col_idx) & 1 == 0 {
                    continue;
                }
                let px = cursor_x.saturating_add(col_idx * scale_i);
                let py = cursor_y.saturating_add(row_idx as i32 * scale_i);
                for sy in 0..scale_i {
                    for sx in 0..scale_i {
                        let tx = px.saturating_add(sx);
                        let ty = py.saturating_add(sy);
                        if tx >= 0 && ty >= 0 && tx < img.width() as i32 && ty < img.height() as i32
                        {
                            img.put_pixel(tx as u32, ty as u32, color);
                        }
                    }
                }
            }
        }
        cursor_x = cursor_x.saturating_add(advance);
    }
}

fn text_bbox(x: i32, y: i32, text: &str, scale: u32) -> (i32, i32, i32, i32) {
    let scale_i = scale.max(1) as i32;
    let lines: Vec<&str> = text.split('\n').collect();
    let width_chars = lines
        .iter()
        .map(|line| i32::try_from(line.chars().count()).unwrap_or(i32::MAX))
        .max()
        .unwrap_or(0);
    let line_count = i32::try_from(lines.len().max(1)).unwrap_or(i32::MAX);
    (
        x,
        y,
        x.saturating_add(width_chars.saturating_mul(8 * scale_i)),
        y.saturating_add(line_count.saturating_mul(8 * scale_i)),
    )
}
