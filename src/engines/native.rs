//! In-process engine: HTML subset → blocks → wrapped, paginated PDF.
//!
//! Styling is fixed; CSS in the document is ignored. The engine needs no
//! external binaries, so it is always available and sits last in the
//! default order.

use super::html::{extract_blocks, parse_html, Block};
use crate::error::EngineError;
use crate::pdf::{parse_data_uri, FlowWriter, TextStyle};
use crate::pipeline::{Availability, PageOptions, RenderEngine};

/// Largest size an inline image is drawn at, in points.
const MAX_IMAGE_WIDTH: f32 = 180.0;
const MAX_IMAGE_HEIGHT: f32 = 220.0;

#[derive(Debug, Clone, Default)]
pub struct NativeEngine;

impl NativeEngine {
    pub const NAME: &'static str = "native";

    pub fn new() -> Self {
        Self
    }
}

impl RenderEngine for NativeEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn probe(&self) -> Availability {
        Availability::Available
    }

    fn render(&self, markup: &str, page: &PageOptions) -> Result<Vec<u8>, EngineError> {
        let (blocks, title) = extract_blocks(&parse_html(markup));
        log::debug!("native engine laying out {} blocks", blocks.len());

        let mut writer = FlowWriter::new(title.as_deref().unwrap_or("Document"), page);
        for block in &blocks {
            match block {
                Block::Heading { level, text } => {
                    let style = TextStyle::heading(*level);
                    writer.space(style.size * 0.3);
                    writer.text(text, &style, 0.0);
                }
                Block::Paragraph(text) => writer.text(text, &TextStyle::BODY, 0.0),
                Block::ListItem {
                    marker,
                    depth,
                    text,
                } => writer.list_item(marker, text, *depth, &TextStyle::BODY),
                Block::TableRow { cells, header } => writer.row(cells, *header, None),
                Block::Rule => writer.rule(),
                Block::Image(src) => {
                    let drawn = parse_data_uri(src).and_then(|bytes| {
                        writer.image(src, &bytes, MAX_IMAGE_WIDTH, MAX_IMAGE_HEIGHT)
                    });
                    if let Err(reason) = drawn {
                        log::warn!("Skipping image: {reason}");
                    }
                }
            }
        }

        let pages = writer.page_count();
        let bytes = writer.finish();
        log::debug!("native engine wrote {pages} page(s), {} bytes", bytes.len());
        Ok(bytes)
    }
}
