//! Markup rendering – turns a profile record into talent-card HTML.
//!
//! Templates are Handlebars. The render context is the first report entry's
//! fields plus `Report_Entry`, so `{{Worker}}` and
//! `{{Report_Entry.[0].Worker}}` name the same value. `{{ … }}` output is
//! HTML-escaped; rich-text fields go through `{{{ … }}}`.
//!
//! Helpers:
//! - `decode_entities` – turn `&#39;`, `&amp;` … back into characters
//! - `fix_empty_paragraphs` – `<p></p>` → `<p>&nbsp;</p>` so empty rich-text
//!   paragraphs keep their height in every PDF engine
//! - `list` – render an array as `<ul><li>…</li></ul>` (items escaped)
//! - `first_name` – text before the first ` (` (Workday `"Name (ID)"` refs)

use std::fs;
use std::path::{Path, PathBuf};

use handlebars::{handlebars_helper, html_escape, Handlebars};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::record::{ProfileRecord, REPORT_ENTRY};
use crate::tenant::Tenant;

/// Produces markup for a profile record. Opaque to the rest of the crate.
pub trait MarkupRenderer: Send + Sync {
    fn render(&self, tenant: Tenant, record: &ProfileRecord) -> Result<String>;
}

/// Handlebars renderer over per-tenant template files.
pub struct TemplateRenderer {
    source: TemplateSource,
    handlebars: Handlebars<'static>,
}

#[derive(Debug, Clone)]
enum TemplateSource {
    /// `talent-card-<tenant>.html` read from a directory on every render.
    Directory(PathBuf),
    /// One template for every tenant.
    Inline(String),
}

impl TemplateRenderer {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self::with_source(TemplateSource::Directory(dir.into()))
    }

    pub fn from_source(template: impl Into<String>) -> Self {
        Self::with_source(TemplateSource::Inline(template.into()))
    }

    fn with_source(source: TemplateSource) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_helper("decode_entities", Box::new(decode_entities_helper));
        handlebars.register_helper("fix_empty_paragraphs", Box::new(fix_empty_paragraphs_helper));
        handlebars.register_helper("first_name", Box::new(first_name_helper));
        handlebars.register_helper("list", Box::new(list_helper));
        Self { source, handlebars }
    }

    /// File name of the tenant-specific talent-card template.
    pub fn template_name(tenant: Tenant) -> String {
        format!("talent-card-{tenant}.html")
    }

    fn load(&self, tenant: Tenant) -> Result<String> {
        match &self.source {
            TemplateSource::Inline(text) => Ok(text.clone()),
            TemplateSource::Directory(dir) => read_template(dir, &Self::template_name(tenant)),
        }
    }
}

impl MarkupRenderer for TemplateRenderer {
    fn render(&self, tenant: Tenant, record: &ProfileRecord) -> Result<String> {
        let template = self.load(tenant)?;
        self.handlebars
            .render_template(&template, &template_context(record))
            .map_err(|e| Error::Template(e.to_string()))
    }
}

fn read_template(dir: &Path, name: &str) -> Result<String> {
    let path = dir.join(name);
    fs::read_to_string(&path)
        .map_err(|e| Error::Template(format!("cannot read {}: {e}", path.display())))
}

/// The first entry's fields at the top level, plus `Report_Entry` itself.
fn template_context(record: &ProfileRecord) -> Value {
    let mut context: Map<String, Value> = record.first_entry().cloned().unwrap_or_default();
    context.insert(
        REPORT_ENTRY.to_string(),
        Value::Array(record.entries().to_vec()),
    );
    Value::Object(context)
}

// Helpers return values, so `{{helper x}}` output is escaped like any other
// expression and `{{{helper x}}}` is emitted raw.

handlebars_helper!(decode_entities_helper: |v: Json| decode_entities(&value_to_text(v)));

handlebars_helper!(fix_empty_paragraphs_helper: |v: Json| fix_empty_paragraphs(&value_to_text(v)));

handlebars_helper!(first_name_helper: |v: Json| first_name(&value_to_text(v)));

handlebars_helper!(list_helper: |v: Json| match v {
    Value::Array(items) => render_list(items),
    other => html_escape(&value_to_text(other)),
});

fn first_name(reference: &str) -> String {
    reference.split(" (").next().unwrap_or_default().trim().to_string()
}

/// Scalar values render as their text; arrays of scalars join with ", ";
/// objects render as compact JSON.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

fn render_list(items: &[Value]) -> String {
    let mut out = String::from("<ul>");
    for item in items {
        let text = match item {
            Value::Object(map) => map
                .values()
                .map(value_to_text)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" - "),
            other => value_to_text(other),
        };
        out.push_str("<li>");
        out.push_str(&html_escape(&text));
        out.push_str("</li>");
    }
    out.push_str("</ul>");
    out
}

/// Decode the HTML entities Workday embeds in rich-text fields.
pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';').filter(|&semi| semi <= 10) {
            Some(semi) => match decode_entity(&tail[1..semi]) {
                Some(c) => {
                    out.push(c);
                    rest = &tail[semi + 1..];
                }
                None => {
                    out.push('&');
                    rest = &tail[1..];
                }
            },
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{00A0}'),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

pub fn fix_empty_paragraphs(s: &str) -> String {
    s.replace("<p></p>", "<p>&nbsp;</p>")
}
