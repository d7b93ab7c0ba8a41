//! Flowing PDF writer on top of `printpdf` (v0.8 ops API) and its built-in
//! Helvetica faces.
//!
//! Content is laid out top to bottom inside the page margins. A block that
//! does not fit on the current page starts a new one; wrapped text breaks
//! between lines.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use printpdf::*;

use crate::pipeline::PageOptions;

const PT_TO_MM: f32 = 0.352778;

/// Line height as a multiple of the font size.
const LINE_HEIGHT: f32 = 1.3;

/// Text appearance for one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f32,
    pub bold: bool,
    pub color: [f32; 3],
    /// Extra vertical space after the block, in points.
    pub space_after: f32,
}

impl TextStyle {
    pub const BODY: TextStyle = TextStyle {
        size: 10.0,
        bold: false,
        color: [0.13, 0.13, 0.13],
        space_after: 6.0,
    };

    pub const LABEL: TextStyle = TextStyle {
        size: 9.0,
        bold: true,
        color: [0.3, 0.3, 0.3],
        space_after: 0.0,
    };

    pub fn heading(level: u8) -> TextStyle {
        let size = match level {
            1 => 20.0,
            2 => 15.0,
            3 => 12.5,
            _ => 11.0,
        };
        TextStyle {
            size,
            bold: true,
            color: [0.05, 0.2, 0.4],
            space_after: size * 0.5,
        }
    }

    pub fn line_height(&self) -> f32 {
        self.size * LINE_HEIGHT
    }

    fn font(&self) -> BuiltinFont {
        if self.bold {
            BuiltinFont::HelveticaBold
        } else {
            BuiltinFont::Helvetica
        }
    }
}

/// Approximate advance width of `text` in points.
///
/// Average Helvetica glyph ≈ 0.5 em; bold ≈ 0.55 em.
pub fn measure_text_width(text: &str, size: f32, bold: bool) -> f32 {
    let avg = if bold { 0.55 } else { 0.5 };
    text.chars().count() as f32 * size * avg
}

/// Word-wrap `text` to `max_width` points. `\n` forces a break; words wider
/// than a line are split by characters.
pub fn wrap_text(text: &str, size: f32, bold: bool, max_width: f32) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if measure_text_width(&candidate, size, bold) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            for piece in split_long_word(word, size, bold, max_width) {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                current = piece;
            }
        }
        // Blank paragraphs keep their line.
        lines.push(current);
    }
    lines
}

fn split_long_word(word: &str, size: f32, bold: bool, max_width: f32) -> Vec<String> {
    let per_line = ((max_width / measure_text_width("M", size, bold)).floor() as usize).max(1);
    let chars: Vec<char> = word.chars().collect();
    if chars.len() <= per_line || measure_text_width(word, size, bold) <= max_width {
        return vec![word.to_string()];
    }
    chars.chunks(per_line).map(|c| c.iter().collect()).collect()
}

/// Fold text into the subset the built-in fonts can show.
///
/// Built-in fonts only cover WinAnsi; typographic punctuation maps to ASCII
/// and anything else outside Latin-1 becomes `?`.
pub fn to_builtin_text(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2022}' => '*',
            '\u{00A0}' => ' ',
            '\u{2026}' => '.',
            c if c.is_ascii() => c,
            c => fold_latin1(c),
        })
        .collect()
}

fn fold_latin1(c: char) -> char {
    match c {
        'À'..='Å' => 'A',
        'à'..='å' => 'a',
        'Ç' => 'C',
        'ç' => 'c',
        'È'..='Ë' => 'E',
        'è'..='ë' => 'e',
        'Ì'..='Ï' => 'I',
        'ì'..='ï' => 'i',
        'Ñ' => 'N',
        'ñ' => 'n',
        'Ò'..='Ö' | 'Ø' => 'O',
        'ò'..='ö' | 'ø' => 'o',
        'Ù'..='Ü' => 'U',
        'ù'..='ü' => 'u',
        'Ý' => 'Y',
        'ý' | 'ÿ' => 'y',
        'ß' => 's',
        _ => '?',
    }
}

/// Decode a `data:<mime>;base64,<data>` URI into raw bytes.
pub fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let rest = src.strip_prefix("data:").ok_or_else(|| {
        let preview: String = src.chars().take(80).collect();
        format!("image src must be a base64 data URI, got {preview:?}")
    })?;
    let comma = rest
        .find(',')
        .ok_or_else(|| "invalid data URI: missing ',' separator".to_string())?;
    if !rest[..comma].contains(";base64") {
        return Err("only base64-encoded data URIs are supported".to_string());
    }
    decode_base64(&rest[comma + 1..])
}

/// Decode base64, ignoring embedded whitespace (SOAP payloads are wrapped).
pub fn decode_base64(data: &str) -> Result<Vec<u8>, String> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64_STD
        .decode(compact.as_bytes())
        .map_err(|e| format!("base64 decode error: {e}"))
}

struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// Writes blocks of text, rules and images onto successive pages.
pub struct FlowWriter {
    doc: PdfDocument,
    page_width: f32,
    page_height: f32,
    margin: f32,
    pages: Vec<PdfPage>,
    ops: Vec<Op>,
    /// Distance from the top of the content area, in points.
    y: f32,
    images: HashMap<String, ImageResource>,
}

impl FlowWriter {
    pub fn new(title: &str, page: &PageOptions) -> Self {
        Self {
            doc: PdfDocument::new(&to_builtin_text(title)),
            page_width: page.effective_width(),
            page_height: page.effective_height(),
            margin: page.margin,
            pages: Vec::new(),
            ops: Vec::new(),
            y: 0.0,
            images: HashMap::new(),
        }
    }

    pub fn content_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }

    fn content_height(&self) -> f32 {
        self.page_height - 2.0 * self.margin
    }

    /// Number of pages started so far, counting the current one.
    pub fn page_count(&self) -> usize {
        self.pages.len() + 1
    }

    pub fn new_page(&mut self) {
        let ops = std::mem::take(&mut self.ops);
        self.pages.push(PdfPage::new(
            Mm(self.page_width * PT_TO_MM),
            Mm(self.page_height * PT_TO_MM),
            ops,
        ));
        self.y = 0.0;
    }

    /// Start a new page unless `height` still fits. A block taller than a
    /// whole page is placed at the top of a fresh page and allowed to run
    /// off it.
    fn ensure_space(&mut self, height: f32) {
        if self.y > 0.0 && self.y + height > self.content_height() {
            self.new_page();
        }
    }

    pub fn space(&mut self, height: f32) {
        self.y = (self.y + height).min(self.content_height());
    }

    /// Wrapped text at `indent` points from the left margin.
    pub fn text(&mut self, text: &str, style: &TextStyle, indent: f32) {
        let width = self.content_width() - indent;
        for line in wrap_text(text, style.size, style.bold, width) {
            self.ensure_space(style.line_height());
            self.write_line(indent, &line, style);
            self.y += style.line_height();
        }
        self.y += style.space_after;
    }

    /// A list entry: `marker` hangs to the left of the wrapped text.
    pub fn list_item(&mut self, marker: &str, text: &str, depth: usize, style: &TextStyle) {
        let indent = 14.0 + depth as f32 * 14.0;
        let width = self.content_width() - indent;
        for (i, line) in wrap_text(text, style.size, style.bold, width).iter().enumerate() {
            self.ensure_space(style.line_height());
            if i == 0 {
                let marker_x = indent - measure_text_width(marker, style.size, style.bold) - 4.0;
                self.write_line(marker_x.max(0.0), marker, style);
            }
            self.write_line(indent, line, style);
            self.y += style.line_height();
        }
        self.y += style.space_after / 2.0;
    }

    /// One table row with equal-width columns, or a label column of
    /// `first_column` points followed by the rest when given.
    pub fn row(&mut self, cells: &[String], header: bool, first_column: Option<f32>) {
        if cells.is_empty() {
            return;
        }
        let total = self.content_width();
        let widths: Vec<f32> = match first_column {
            Some(first) if cells.len() > 1 => {
                let rest = (total - first) / (cells.len() - 1) as f32;
                std::iter::once(first)
                    .chain(std::iter::repeat(rest).take(cells.len() - 1))
                    .collect()
            }
            _ => vec![total / cells.len() as f32; cells.len()],
        };

        let padding = 4.0;
        let wrapped: Vec<(Vec<String>, TextStyle)> = cells
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, width))| {
                let style = if header || (first_column.is_some() && i == 0) {
                    TextStyle::LABEL
                } else {
                    TextStyle::BODY
                };
                let lines = wrap_text(cell, style.size, style.bold, width - 2.0 * padding);
                (lines, style)
            })
            .collect();
        let height = wrapped
            .iter()
            .map(|(lines, style)| lines.len() as f32 * style.line_height())
            .fold(0.0f32, f32::max)
            + 2.0 * padding;

        self.ensure_space(height);
        if header {
            self.fill_rect(0.0, total, height, [0.92, 0.94, 0.97]);
        }
        let mut x = 0.0;
        for ((lines, style), width) in wrapped.iter().zip(&widths) {
            let mut line_y = self.y + padding;
            for line in lines {
                self.write_line_at(x + padding, line_y, line, style);
                line_y += style.line_height();
            }
            x += width;
        }
        self.y += height;
        self.hline(0.0, total, 0.5, [0.8, 0.8, 0.8]);
    }

    /// Horizontal rule across the content width.
    pub fn rule(&mut self) {
        self.ensure_space(8.0);
        self.y += 4.0;
        let width = self.content_width();
        self.hline(0.0, width, 0.75, [0.6, 0.6, 0.6]);
        self.y += 4.0;
    }

    /// Embed an image scaled to fit `max_width` × `max_height`, keeping its
    /// aspect ratio. Returns the drawn size in points.
    pub fn image(&mut self, key: &str, bytes: &[u8], max_width: f32, max_height: f32) -> Result<(f32, f32), String> {
        if !self.images.contains_key(key) {
            let decoded =
                ::image::load_from_memory(bytes).map_err(|e| format!("image decode error: {e}"))?;
            let mut warnings = Vec::new();
            let raw = RawImage::decode_from_bytes(bytes, &mut warnings)
                .map_err(|e| format!("image embed error: {e}"))?;
            let xobj_id = self.doc.add_image(&raw);
            self.images.insert(
                key.to_string(),
                ImageResource {
                    xobj_id,
                    px_width: decoded.width(),
                    px_height: decoded.height(),
                },
            );
        }
        let Some(res) = self.images.get(key) else {
            return Err("image not registered".to_string());
        };
        if res.px_width == 0 || res.px_height == 0 {
            return Err("image has no pixels".to_string());
        }

        let max_width = max_width.min(self.content_width());
        let scale = (max_width / res.px_width as f32)
            .min(max_height / res.px_height as f32)
            .min(1.0);
        let (width, height) = (res.px_width as f32 * scale, res.px_height as f32 * scale);
        let id = res.xobj_id.clone();

        self.ensure_space(height);
        let bottom = self.page_height - self.margin - self.y - height;
        // At 72 dpi one pixel is one point.
        self.ops.push(Op::UseXobject {
            id,
            transform: XObjectTransform {
                translate_x: Some(Pt(self.margin)),
                translate_y: Some(Pt(bottom)),
                dpi: Some(72.0),
                scale_x: Some(scale),
                scale_y: Some(scale),
                rotate: None,
            },
        });
        self.y += height + 6.0;
        Ok((width, height))
    }

    /// Close the last page and serialise the document.
    pub fn finish(mut self) -> Vec<u8> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.new_page();
        }
        let pages = std::mem::take(&mut self.pages);
        self.doc.with_pages(pages);
        self.doc.save(&PdfSaveOptions::default(), &mut Vec::new())
    }

    fn write_line(&mut self, x: f32, text: &str, style: &TextStyle) {
        let y = self.y;
        self.write_line_at(x, y, text, style);
    }

    fn write_line_at(&mut self, x: f32, y: f32, text: &str, style: &TextStyle) {
        if text.trim().is_empty() {
            return;
        }
        // Baseline ≈ top of line + ascender (0.75 em).
        let baseline = self.page_height - self.margin - y - style.size * 0.75;
        let font = style.font();
        self.ops.push(Op::StartTextSection);
        self.ops.push(Op::SetTextCursor {
            pos: Point {
                x: Pt(self.margin + x),
                y: Pt(baseline),
            },
        });
        self.ops.push(Op::SetFontSizeBuiltinFont {
            size: Pt(style.size),
            font,
        });
        self.ops.push(Op::SetFillColor { col: rgb(style.color) });
        self.ops.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(to_builtin_text(text))],
            font,
        });
        self.ops.push(Op::EndTextSection);
    }

    fn hline(&mut self, x: f32, width: f32, thickness: f32, color: [f32; 3]) {
        let y = self.page_height - self.margin - self.y;
        let point = |x: f32| LinePoint {
            p: Point { x: Pt(x), y: Pt(y) },
            bezier: false,
        };
        self.ops.push(Op::SetOutlineColor { col: rgb(color) });
        self.ops.push(Op::SetOutlineThickness { pt: Pt(thickness) });
        self.ops.push(Op::DrawLine {
            line: Line {
                points: vec![point(self.margin + x), point(self.margin + x + width)],
                is_closed: false,
            },
        });
    }

    fn fill_rect(&mut self, x: f32, width: f32, height: f32, color: [f32; 3]) {
        let top = self.page_height - self.margin - self.y;
        let (x1, x2) = (self.margin + x, self.margin + x + width);
        let (y1, y2) = (top - height, top);
        let corner = |x: f32, y: f32| LinePoint {
            p: Point { x: Pt(x), y: Pt(y) },
            bezier: false,
        };
        self.ops.push(Op::SetFillColor { col: rgb(color) });
        self.ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing {
                    points: vec![corner(x1, y1), corner(x2, y1), corner(x2, y2), corner(x1, y2)],
                }],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            },
        });
    }
}

fn rgb([r, g, b]: [f32; 3]) -> Color {
    Color::Rgb(Rgb {
        r,
        g,
        b,
        icc_profile: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_text_width() {
        // 5 chars × 16 × 0.5 = 40
        assert!((measure_text_width("Hello", 16.0, false) - 40.0).abs() < 0.1);
    }

    #[test]
    fn wraps_on_words_and_forced_breaks() {
        let lines = wrap_text("Hello world foo bar", 16.0, false, 60.0);
        assert!(lines.len() >= 2, "expected wrapping, got {lines:?}");
        assert_eq!(wrap_text("a\nb", 10.0, false, 500.0), vec!["a", "b"]);
    }

    #[test]
    fn splits_words_wider_than_a_line() {
        let lines = wrap_text(&"x".repeat(100), 10.0, false, 100.0);
        assert!(lines.len() > 1, "{lines:?}");
        assert!(lines.iter().all(|l| measure_text_width(l, 10.0, false) <= 100.0));
    }

    #[test]
    fn folds_to_builtin_charset() {
        assert_eq!(to_builtin_text("José – “hi” • 漢"), "Jose - \"hi\" * ?");
    }

    #[test]
    fn data_uri_requires_base64() {
        assert_eq!(parse_data_uri("data:text/plain;base64,aGk=").unwrap(), b"hi");
        assert!(parse_data_uri("data:text/plain,hi").is_err());
        assert!(parse_data_uri("logo.png").is_err());
        assert_eq!(decode_base64("aG\n k=").unwrap(), b"hi");
    }

    #[test]
    fn empty_document_still_has_a_page() {
        let bytes = FlowWriter::new("empty", &PageOptions::default()).finish();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn long_text_paginates() {
        let mut writer = FlowWriter::new("long", &PageOptions::default());
        for i in 0..200 {
            writer.text(&format!("Paragraph {i}"), &TextStyle::BODY, 0.0);
        }
        assert!(writer.page_count() > 1);
        let bytes = writer.finish();
        assert!(bytes.starts_with(b"%PDF-"));
    }
}
