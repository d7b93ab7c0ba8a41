//! HTML subset parser for the native engine.
//!
//! Parses markup into a small DOM, then flattens it into printable
//! [`Block`]s. Supported structure:
//! - headings `h1`–`h6`, paragraphs, `div`/`section`-style containers
//! - `ul`/`ol` lists, `table` rows with `th`/`td` cells
//! - `br`, `hr`, `img` with data URIs
//!
//! Everything else is treated as an inline wrapper around its text. The
//! contents of `head`, `style` and `script` are dropped.

use std::collections::HashMap;

use crate::markup::decode_entities;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Heading(u8),
    P,
    Div,
    Ul,
    Ol,
    Li,
    Table,
    Tr,
    Td,
    Th,
    Br,
    Hr,
    Img,
    Strong,
    Title,
    /// Elements whose content never prints.
    Hidden,
    Other(String),
}

impl Tag {
    fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "h1" => Tag::Heading(1),
            "h2" => Tag::Heading(2),
            "h3" => Tag::Heading(3),
            "h4" => Tag::Heading(4),
            "h5" => Tag::Heading(5),
            "h6" => Tag::Heading(6),
            "p" => Tag::P,
            "div" | "section" | "article" | "header" | "footer" | "main" | "aside" | "nav"
            | "body" | "html" | "blockquote" | "figure" | "tbody" | "thead" | "tfoot" => Tag::Div,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "br" => Tag::Br,
            "hr" => Tag::Hr,
            "img" => Tag::Img,
            "strong" | "b" => Tag::Strong,
            "title" => Tag::Title,
            "head" | "style" | "script" | "noscript" | "template" => Tag::Hidden,
            other => Tag::Other(other.to_string()),
        }
    }

    /// Elements that never have content or a closing tag.
    fn is_void(&self) -> bool {
        matches!(self, Tag::Br | Tag::Hr | Tag::Img)
            || matches!(self, Tag::Other(name) if matches!(name.as_str(), "meta" | "link" | "input" | "col" | "wbr" | "source"))
    }
}

#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }
}

/// Parse markup into DOM nodes. Never fails; unclosed elements end at EOF.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let mut parser = Parser {
        input: html,
        pos: 0,
        open: Vec::new(),
    };
    parser.parse_nodes()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Lower-cased names of the elements currently open.
    open: Vec<String>,
}

impl<'a> Parser<'a> {
    fn parse_nodes(&mut self) -> Vec<DomNode> {
        let mut nodes = Vec::new();
        while !self.eof() {
            if self.starts_with("</") {
                // An end tag closes this level only if some open element matches it.
                let name = self.peek_end_tag().to_ascii_lowercase();
                if self.open.contains(&name) {
                    break;
                }
                self.skip_past('>');
                continue;
            }
            if let Some(node) = self.parse_node() {
                nodes.push(node);
            }
        }
        nodes
    }

    fn parse_node(&mut self) -> Option<DomNode> {
        if self.starts_with("<!--") {
            self.skip_past_str("-->");
            return None;
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            self.skip_past('>');
            return None;
        }
        if self.starts_with("<")
            && self.input[self.pos + 1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic())
        {
            return Some(self.parse_element());
        }
        Some(self.parse_text())
    }

    fn parse_text(&mut self) -> DomNode {
        let start = self.pos;
        self.advance_char();
        while !self.eof() && !self.starts_with("<") {
            self.advance_char();
        }
        DomNode::Text(decode_entities(&self.input[start..self.pos]))
    }

    fn parse_element(&mut self) -> DomNode {
        self.pos += 1; // '<'
        let name = self.parse_name();
        let tag = Tag::parse(&name);
        let mut elem = ElementNode::new(tag);

        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let before = self.pos;
            let (key, value) = self.parse_attribute();
            if self.pos == before {
                self.advance_char();
                continue;
            }
            elem.attributes.insert(key.to_ascii_lowercase(), value);
        }

        if self.starts_with("/>") {
            self.pos += 2;
            return DomNode::Element(elem);
        }
        if self.starts_with(">") {
            self.pos += 1;
        }
        if elem.tag.is_void() {
            return DomNode::Element(elem);
        }

        let lower = name.to_ascii_lowercase();
        if matches!(lower.as_str(), "style" | "script") {
            // Raw text: runs to the matching end tag.
            let close = format!("</{lower}");
            let rest = self.input[self.pos..].to_ascii_lowercase();
            let end = rest.find(&close).map_or(self.input.len(), |i| self.pos + i);
            elem.children
                .push(DomNode::Text(self.input[self.pos..end].to_string()));
            self.pos = end;
        } else {
            self.open.push(lower.clone());
            elem.children = self.parse_nodes();
            self.open.pop();
        }

        if self.starts_with("</") {
            let closing = self.peek_end_tag();
            if closing.eq_ignore_ascii_case(&lower) {
                self.skip_past('>');
            }
        }
        DomNode::Element(elem)
    }

    fn peek_end_tag(&self) -> String {
        self.input[self.pos + 2..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .collect()
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ':' {
                self.advance_char();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> (String, String) {
        let key = self.parse_name();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return (key, String::new());
        }
        self.pos += 1;
        self.skip_whitespace();
        let value = match self.current_char() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.current_char().is_some_and(|c| c != quote) {
                    self.advance_char();
                }
                let raw = &self.input[start..self.pos];
                if !self.eof() {
                    self.pos += 1;
                }
                decode_entities(raw)
            }
            _ => {
                let start = self.pos;
                while self
                    .current_char()
                    .is_some_and(|c| !c.is_whitespace() && c != '>')
                {
                    self.advance_char();
                }
                self.input[start..self.pos].to_string()
            }
        };
        (key, value)
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().is_some_and(char::is_whitespace) {
            self.advance_char();
        }
    }

    fn skip_past(&mut self, c: char) {
        match self.input[self.pos..].find(c) {
            Some(i) => self.pos += i + c.len_utf8(),
            None => self.pos = self.input.len(),
        }
    }

    fn skip_past_str(&mut self, s: &str) {
        match self.input[self.pos..].find(s) {
            Some(i) => self.pos += i + s.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance_char(&mut self) {
        if let Some(c) = self.current_char() {
            self.pos += c.len_utf8();
        }
    }
}

/// A printable unit of the native layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, text: String },
    /// Body text; `\n` marks a forced line break.
    Paragraph(String),
    ListItem { marker: String, depth: usize, text: String },
    TableRow { cells: Vec<String>, header: bool },
    /// `src` of an `<img>`.
    Image(String),
    Rule,
}

/// Flatten parsed nodes into blocks in document order. Also returns the
/// document `<title>`, if any.
pub fn extract_blocks(nodes: &[DomNode]) -> (Vec<Block>, Option<String>) {
    let mut walker = BlockWalker::default();
    walker.walk(nodes);
    walker.flush_paragraph();
    (walker.blocks, walker.title)
}

#[derive(Default)]
struct BlockWalker {
    blocks: Vec<Block>,
    inline: String,
    title: Option<String>,
    /// Counters for the open lists; `None` for bulleted ones.
    lists: Vec<Option<usize>>,
}

impl BlockWalker {
    fn walk(&mut self, nodes: &[DomNode]) {
        for node in nodes {
            match node {
                DomNode::Text(text) => push_collapsed(&mut self.inline, text),
                DomNode::Element(elem) => self.element(elem),
            }
        }
    }

    fn element(&mut self, elem: &ElementNode) {
        match &elem.tag {
            Tag::Hidden => {
                if let Some(title) = find_title(&elem.children) {
                    self.title.get_or_insert(title);
                }
            }
            Tag::Title => {
                let text = inline_text(&elem.children);
                if !text.is_empty() {
                    self.title.get_or_insert(text);
                }
            }
            Tag::Br => self.inline.push('\n'),
            Tag::Hr => {
                self.flush_paragraph();
                self.blocks.push(Block::Rule);
            }
            Tag::Img => {
                self.flush_paragraph();
                if let Some(src) = elem.attributes.get("src") {
                    self.blocks.push(Block::Image(src.clone()));
                }
            }
            Tag::Heading(level) => {
                self.flush_paragraph();
                let text = inline_text(&elem.children);
                if !text.is_empty() {
                    self.blocks.push(Block::Heading {
                        level: *level,
                        text,
                    });
                }
            }
            Tag::P | Tag::Div => {
                self.flush_paragraph();
                self.walk(&elem.children);
                self.flush_paragraph();
            }
            Tag::Ul | Tag::Ol => {
                self.flush_paragraph();
                self.lists
                    .push(matches!(elem.tag, Tag::Ol).then_some(0));
                self.walk(&elem.children);
                self.lists.pop();
            }
            Tag::Li => self.list_item(elem),
            Tag::Table => {
                self.flush_paragraph();
                self.walk(&elem.children);
            }
            Tag::Tr => {
                self.flush_paragraph();
                self.table_row(elem);
            }
            Tag::Td | Tag::Th | Tag::Strong | Tag::Other(_) => self.walk(&elem.children),
        }
    }

    fn list_item(&mut self, elem: &ElementNode) {
        self.flush_paragraph();
        let depth = self.lists.len().saturating_sub(1);
        let marker = match self.lists.last_mut() {
            Some(Some(counter)) => {
                *counter += 1;
                format!("{counter}.")
            }
            _ => "-".to_string(),
        };

        // Text before any nested list belongs to this item.
        let mut text = String::new();
        let mut nested = Vec::new();
        for child in &elem.children {
            match child {
                DomNode::Element(e) if matches!(e.tag, Tag::Ul | Tag::Ol) => nested.push(child),
                DomNode::Element(e) if matches!(e.tag, Tag::Br) => text.push('\n'),
                DomNode::Element(e) => push_collapsed(&mut text, &inline_text(&e.children)),
                DomNode::Text(t) => push_collapsed(&mut text, t),
            }
        }
        self.blocks.push(Block::ListItem {
            marker,
            depth,
            text: tidy(&text),
        });
        for child in nested {
            if let DomNode::Element(e) = child {
                self.element(e);
            }
        }
    }

    fn table_row(&mut self, row: &ElementNode) {
        let mut cells = Vec::new();
        let mut header = false;
        for child in &row.children {
            if let DomNode::Element(cell) = child {
                if matches!(cell.tag, Tag::Td | Tag::Th) {
                    header |= cell.tag == Tag::Th;
                    cells.push(inline_text(&cell.children));
                }
            }
        }
        if !cells.is_empty() {
            self.blocks.push(Block::TableRow { cells, header });
        }
    }

    fn flush_paragraph(&mut self) {
        let text = tidy(&std::mem::take(&mut self.inline));
        if !text.is_empty() {
            self.blocks.push(Block::Paragraph(text));
        }
    }
}

fn find_title(nodes: &[DomNode]) -> Option<String> {
    nodes.iter().find_map(|node| match node {
        DomNode::Element(e) if e.tag == Tag::Title => Some(inline_text(&e.children)),
        DomNode::Element(e) => find_title(&e.children),
        DomNode::Text(_) => None,
    })
}

/// Concatenated, whitespace-collapsed text of `nodes`.
fn inline_text(nodes: &[DomNode]) -> String {
    fn collect(nodes: &[DomNode], out: &mut String) {
        for node in nodes {
            match node {
                DomNode::Text(t) => push_collapsed(out, t),
                DomNode::Element(e) if e.tag == Tag::Br => out.push('\n'),
                DomNode::Element(e) if e.tag == Tag::Hidden => {}
                DomNode::Element(e) => collect(&e.children, out),
            }
        }
    }
    let mut out = String::new();
    collect(nodes, &mut out);
    tidy(&out)
}

/// Append `text` with runs of whitespace collapsed to one space.
/// Non-breaking spaces survive so `<p>&nbsp;</p>` keeps its line.
fn push_collapsed(out: &mut String, text: &str) {
    for c in text.chars() {
        if c.is_whitespace() && c != '\u{00A0}' {
            if !out.ends_with(' ') && !out.ends_with('\n') && !out.is_empty() {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
    }
}

fn tidy(text: &str) -> String {
    text.split('\n')
        .map(|line| line.trim_matches(' '))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(html: &str) -> Vec<Block> {
        extract_blocks(&parse_html(html)).0
    }

    #[test]
    fn parses_attributes_and_void_elements() {
        let nodes = parse_html(r#"<div class="card"><img src="data:x"><br/><p>Hi</p></div>"#);
        let DomNode::Element(div) = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(div.tag, Tag::Div);
        assert_eq!(div.attributes.get("class").map(String::as_str), Some("card"));
        assert_eq!(div.children.len(), 3);
    }

    #[test]
    fn extracts_headings_paragraphs_and_breaks() {
        let got = blocks(
            "<html><head><title>Card</title><style>p { color: red }</style></head>\
             <body><h1>Jane  Doe</h1><p>Line one<br>Line <b>two</b></p><p>&nbsp;</p></body></html>",
        );
        assert_eq!(
            got,
            vec![
                Block::Heading {
                    level: 1,
                    text: "Jane Doe".into()
                },
                Block::Paragraph("Line one\nLine two".into()),
                Block::Paragraph("\u{00A0}".into()),
            ]
        );
        let (_, title) = extract_blocks(&parse_html("<head><title>Card</title></head>"));
        assert_eq!(title.as_deref(), Some("Card"));
    }

    #[test]
    fn numbers_ordered_lists_and_nests() {
        let got = blocks("<ol><li>First<ul><li>Inner</li></ul></li><li>Second</li></ol>");
        assert_eq!(
            got,
            vec![
                Block::ListItem {
                    marker: "1.".into(),
                    depth: 0,
                    text: "First".into()
                },
                Block::ListItem {
                    marker: "-".into(),
                    depth: 1,
                    text: "Inner".into()
                },
                Block::ListItem {
                    marker: "2.".into(),
                    depth: 0,
                    text: "Second".into()
                },
            ]
        );
    }

    #[test]
    fn table_rows_keep_cells() {
        let got = blocks(
            "<table><thead><tr><th>Year</th><th>Rating</th></tr></thead>\
             <tbody><tr><td>2024</td><td>Exceeds</td></tr></tbody></table>",
        );
        assert_eq!(
            got,
            vec![
                Block::TableRow {
                    cells: vec!["Year".into(), "Rating".into()],
                    header: true
                },
                Block::TableRow {
                    cells: vec!["2024".into(), "Exceeds".into()],
                    header: false
                },
            ]
        );
    }

    #[test]
    fn tolerates_stray_markup() {
        let got = blocks("<p>a < b</p></span><p>unclosed");
        assert_eq!(
            got,
            vec![
                Block::Paragraph("a < b".into()),
                Block::Paragraph("unclosed".into())
            ]
        );
    }
}
