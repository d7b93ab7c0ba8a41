//! Direct record → PDF rendering, with no markup step.
//!
//! Layout: worker name as the title, the photo if the record carries one,
//! then a two-column table of the first report entry's fields.

use serde_json::Value;

use crate::engines::{extract_blocks, parse_html, Block};
use crate::error::{EngineError, Result};
use crate::markup::decode_entities;
use crate::pdf::{decode_base64, parse_data_uri, FlowWriter, TextStyle};
use crate::pipeline::PageOptions;
use crate::record::ProfileRecord;

const LABEL_COLUMN_PT: f32 = 170.0;
const PHOTO_MAX_WIDTH: f32 = 120.0;
const PHOTO_MAX_HEIGHT: f32 = 150.0;

/// Renders a [`ProfileRecord`] straight to PDF bytes.
#[derive(Debug, Clone, Default)]
pub struct RecordRenderer {
    page: PageOptions,
}

impl RecordRenderer {
    pub const NAME: &'static str = "record";

    pub fn new(page: PageOptions) -> Self {
        Self { page }
    }

    pub fn render_record(&self, record: &ProfileRecord) -> Result<Vec<u8>> {
        let title = record
            .worker_name()
            .unwrap_or_else(|| "Employee Profile".to_string());
        let mut writer = FlowWriter::new(&title, &self.page);
        writer.text(&title, &TextStyle::heading(1), 0.0);

        let entry = record.first_entry();
        let photo_key = entry.and_then(|fields| {
            fields
                .iter()
                .find(|(key, _)| key.to_ascii_lowercase().contains("photo"))
                .map(|(key, value)| (key.clone(), value))
        });

        if let Some((key, Value::String(data))) = &photo_key {
            match decode_photo(data)
                .and_then(|bytes| writer.image(key, &bytes, PHOTO_MAX_WIDTH, PHOTO_MAX_HEIGHT))
            {
                Ok(_) => log::debug!("embedded photo from field '{key}'"),
                Err(reason) => log::warn!("photo field '{key}' not embedded: {reason}"),
            }
        }

        writer.rule();
        if let Some(fields) = entry {
            for (key, value) in fields {
                if photo_key.as_ref().is_some_and(|(k, _)| k == key) {
                    continue;
                }
                let Some(text) = summarize(value) else {
                    continue;
                };
                writer.row(&[humanize_key(key), text], false, Some(LABEL_COLUMN_PT));
            }
        }

        let extra = record.entries().len().saturating_sub(1);
        if extra > 0 {
            writer.space(6.0);
            writer.text(
                &format!("{extra} further report entr{} not shown", if extra == 1 { "y" } else { "ies" }),
                &TextStyle::LABEL,
                0.0,
            );
        }

        let bytes = writer.finish();
        if bytes.is_empty() {
            return Err(EngineError::new(Self::NAME, "empty document").into());
        }
        log::info!("Rendered record PDF for {title} ({} bytes)", bytes.len());
        Ok(bytes)
    }
}

fn decode_photo(data: &str) -> std::result::Result<Vec<u8>, String> {
    if data.trim_start().starts_with("data:") {
        parse_data_uri(data.trim())
    } else {
        decode_base64(data)
    }
}

/// Display text for a field value. Nested arrays and objects are
/// summarised; nulls are skipped.
fn summarize(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "Yes" } else { "No" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(plain_text(s)),
        Value::Array(items) => Some(match items.len() {
            1 => "1 item".to_string(),
            n => format!("{n} items"),
        }),
        Value::Object(map) => Some(format!("{} fields", map.len())),
    }
}

/// Rich-text fields arrive as HTML; keep only their text.
fn plain_text(s: &str) -> String {
    if !s.contains('<') {
        return decode_entities(s);
    }
    let (blocks, _) = extract_blocks(&parse_html(s));
    blocks
        .into_iter()
        .filter_map(|block| match block {
            Block::Heading { text, .. } | Block::Paragraph(text) => Some(text),
            Block::ListItem { marker, text, .. } => Some(format!("{marker} {text}")),
            Block::TableRow { cells, .. } => Some(cells.join(" | ")),
            Block::Image(_) | Block::Rule => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `Primary_Work_Email` → `Primary Work Email`, `businessTitle` → `Business Title`.
fn humanize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for c in key.chars() {
        if c == '_' || c == '-' {
            if !out.ends_with(' ') {
                out.push(' ');
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower {
            out.push(' ');
        }
        if out.is_empty() || out.ends_with(' ') {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
    }
    out.trim().to_string()
}
