use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// One normalized entry of the glyph name file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlyphRow {
    pub name: String,
    pub codepoint: String,
    pub description: String,
}

impl GlyphRow {
    fn new(name: String, codepoint: String, description: String) -> Self {
        Self {
            name,
            codepoint,
            description,
        }
    }

    fn named(name: String) -> Self {
        Self::new(name, String::new(), String::new())
    }

    /// Uppercased codepoint as shown in the table.
    pub fn codepoint_display(&self) -> String {
        self.codepoint.to_uppercase()
    }

    pub fn decoded(&self) -> DecodedCodepoint {
        decode_codepoint(&self.codepoint)
    }

    /// Text of the rendered table row, cell by cell, as a browser would
    /// report it through `textContent`.
    pub fn visible_text(&self) -> String {
        let decoded = self.decoded();
        format!(
            "{}{}{}{}{}",
            decoded.sample,
            self.name,
            self.codepoint_display(),
            decoded.entity,
            self.description
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedCodepoint {
    pub sample: String,
    pub entity: String,
}

/// Decodes a `U+XXXX` codepoint into the glyph itself and its numeric
/// character reference. Anything else yields two empty strings.
pub fn decode_codepoint(raw: &str) -> DecodedCodepoint {
    let upper = raw.to_uppercase();
    let Some(hex) = upper.strip_prefix("U+") else {
        return DecodedCodepoint::default();
    };
    if hex.is_empty() || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return DecodedCodepoint::default();
    }
    let Some(ch) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) else {
        return DecodedCodepoint::default();
    };
    DecodedCodepoint {
        sample: ch.to_string(),
        entity: format!("&#x{hex};"),
    }
}

/// Reads and normalizes the glyph file. Unreadable or malformed input is
/// treated as an empty table.
pub fn load_glyphs(path: &Path) -> Vec<GlyphRow> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "glyph file unreadable");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => normalize_rows(&value),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "glyph file is not valid JSON");
            Vec::new()
        }
    }
}

/// Flattens any JSON shape into rows, keeping source order.
pub fn normalize_rows(value: &Value) -> Vec<GlyphRow> {
    match value {
        Value::Object(entries) => entries
            .iter()
            .map(|(name, info)| match info.as_object() {
                Some(info) => GlyphRow::new(
                    name.clone(),
                    field_text(info, "codepoint"),
                    field_text(info, "description"),
                ),
                None => GlyphRow::named(name.clone()),
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item.as_object() {
                Some(obj) if obj.contains_key("name") => GlyphRow::new(
                    obj.get("name").map(value_text).unwrap_or_default(),
                    field_text(obj, "codepoint"),
                    field_text(obj, "description"),
                ),
                _ => GlyphRow::named(value_text(item)),
            })
            .collect(),
        scalar => vec![GlyphRow::named(value_text(scalar))],
    }
}

fn field_text(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(value) if is_truthy(value) => value_text(value),
        _ => String::new(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(obj) => !obj.is_empty(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
