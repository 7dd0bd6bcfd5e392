//! Tolerant HTML parsing and canonical emission for the editor tree.
//!
//! The parser is deliberately small: it recognizes the block and inline
//! vocabulary the editor itself emits and degrades everything else to
//! paragraphs or transparent inline content. Arbitrary-HTML fidelity is
//! out of scope.

use crate::ZWSP;
use crate::font::px_to_pt;
use crate::node::{Document, ElementNode, Marks, Node, TextNode, VoidNode, kind};

const BLOCK_TAGS: &[&str] = &[
    "div", "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "table", "blockquote", "pre",
];

/// Whether raw HTML starts with a block-level tag; anything else gets
/// wrapped in a `<div>` before parsing.
pub fn starts_with_block_tag(html: &str) -> bool {
    let trimmed = html.trim_start();
    let Some(rest) = trimmed.strip_prefix('<') else {
        return false;
    };
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    BLOCK_TAGS.contains(&name.as_str())
}

/// Parse a whole body into a document. Empty or whitespace input yields
/// the canonical empty paragraph.
pub fn parse_document(body: &str) -> Document {
    if body.trim().is_empty() {
        return Document::empty();
    }
    let source;
    let body = if starts_with_block_tag(body) {
        body
    } else {
        source = format!("<div>{body}</div>");
        &source
    };
    let children = parse_fragment(body);
    if children.is_empty() {
        return Document::empty();
    }
    Document { children }
}

/// Parse an HTML fragment into block nodes.
pub fn parse_fragment(html: &str) -> Vec<Node> {
    let tokens = tokenize(html);
    let mut builder = Builder::default();
    for token in tokens {
        match token {
            Token::Text(text) => builder.text(&text),
            Token::Open { name, attrs } => builder.open(&name, &attrs),
            Token::Close(name) => builder.close(&name),
        }
    }
    builder.finish()
}

// === Tokenizer ===

#[derive(Debug)]
enum Token {
    Text(String),
    Open {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Close(String),
}

fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut ix = 0;
    let mut text_start = 0;

    while ix < bytes.len() {
        if bytes[ix] != b'<' {
            ix += 1;
            continue;
        }
        if ix > text_start {
            tokens.push(Token::Text(decode_entities(&input[text_start..ix])));
        }
        if input[ix..].starts_with("<!--") {
            ix = input[ix..]
                .find("-->")
                .map(|end| ix + end + 3)
                .unwrap_or(bytes.len());
        } else if input[ix..].starts_with("<!") || input[ix..].starts_with("<?") {
            ix = input[ix..]
                .find('>')
                .map(|end| ix + end + 1)
                .unwrap_or(bytes.len());
        } else if input[ix..].starts_with("</") {
            let end = input[ix..].find('>').map(|e| ix + e).unwrap_or(bytes.len());
            let name = input[ix + 2..end]
                .trim()
                .to_ascii_lowercase();
            tokens.push(Token::Close(name));
            ix = (end + 1).min(bytes.len());
        } else {
            let end = input[ix..].find('>').map(|e| ix + e).unwrap_or(bytes.len());
            let inner = input[ix + 1..end].trim_end_matches('/');
            let (name, attrs) = parse_tag(inner);
            if !name.is_empty() {
                // Raw-text elements: swallow their contents entirely.
                if name == "script" || name == "style" {
                    let close = format!("</{name}");
                    ix = input[end..]
                        .to_ascii_lowercase()
                        .find(&close)
                        .map(|e| end + e)
                        .unwrap_or(bytes.len());
                    let skip_end = input[ix..].find('>').map(|e| ix + e + 1).unwrap_or(bytes.len());
                    ix = skip_end;
                    text_start = ix;
                    continue;
                }
                tokens.push(Token::Open { name, attrs });
            }
            ix = (end + 1).min(bytes.len());
        }
        text_start = ix;
    }
    if text_start < bytes.len() {
        tokens.push(Token::Text(decode_entities(&input[text_start..])));
    }
    tokens
}

fn parse_tag(inner: &str) -> (String, Vec<(String, String)>) {
    let mut name_end = inner.len();
    for (pos, c) in inner.char_indices() {
        if c.is_whitespace() {
            name_end = pos;
            break;
        }
    }
    let name = inner[..name_end].trim().to_ascii_lowercase();
    let mut attrs = Vec::new();
    let rest = &inner[name_end.min(inner.len())..];
    let mut ix = 0;
    let bytes = rest.as_bytes();
    while ix < bytes.len() {
        while ix < bytes.len() && (bytes[ix] as char).is_whitespace() {
            ix += 1;
        }
        let key_start = ix;
        while ix < bytes.len() && !matches!(bytes[ix], b'=' | b' ' | b'\t' | b'\n' | b'\r') {
            ix += 1;
        }
        if ix == key_start {
            ix += 1;
            continue;
        }
        let key = rest[key_start..ix].to_ascii_lowercase();
        while ix < bytes.len() && (bytes[ix] as char).is_whitespace() {
            ix += 1;
        }
        let mut value = String::new();
        if ix < bytes.len() && bytes[ix] == b'=' {
            ix += 1;
            while ix < bytes.len() && (bytes[ix] as char).is_whitespace() {
                ix += 1;
            }
            if ix < bytes.len() && (bytes[ix] == b'"' || bytes[ix] == b'\'') {
                let quote = bytes[ix];
                ix += 1;
                let value_start = ix;
                while ix < bytes.len() && bytes[ix] != quote {
                    ix += 1;
                }
                value = decode_entities(&rest[value_start..ix]);
                ix = (ix + 1).min(bytes.len());
            } else {
                let value_start = ix;
                while ix < bytes.len() && !(bytes[ix] as char).is_whitespace() {
                    ix += 1;
                }
                value = decode_entities(&rest[value_start..ix]);
            }
        }
        attrs.push((key, value));
    }
    (name, attrs)
}

fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let Some(end) = rest.find(';').filter(|&e| e <= 12) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{A0}'),
            _ => entity
                .strip_prefix('#')
                .and_then(|num| {
                    if let Some(hex) = num.strip_prefix(['x', 'X']) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    }
                })
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// === Tree builder ===

#[derive(Default)]
struct Builder {
    out: Vec<Node>,
    containers: Vec<ElementNode>,
    block: Option<ElementNode>,
    inline: Vec<(String, Marks)>,
    marks: Marks,
    lists: Vec<String>,
    quotes: usize,
}

impl Builder {
    fn text(&mut self, text: &str) {
        let text: String = text.chars().filter(|&c| c != ZWSP).collect();
        if text.is_empty() {
            return;
        }
        if self.block.is_none() && text.trim().is_empty() {
            return;
        }
        if self.block.is_none() {
            let block_kind = if self.quotes > 0 {
                kind::BLOCKQUOTE
            } else {
                kind::PARAGRAPH
            };
            self.block = Some(ElementNode::new(block_kind));
        }
        let block = self.block.as_mut().expect("block just ensured");
        block.children.push(Node::Text(TextNode {
            text,
            marks: self.marks.clone(),
        }));
    }

    fn open(&mut self, name: &str, attrs: &[(String, String)]) {
        match name {
            "p" | "div" | "section" | "article" | "header" | "footer" | "aside" | "main" => {
                // Paragraphs inside a blockquote context become quote blocks.
                let block_kind = if self.quotes > 0 {
                    kind::BLOCKQUOTE
                } else {
                    kind::PARAGRAPH
                };
                self.start_block(block_kind, attrs, None);
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<u8>().unwrap_or(1);
                self.start_block(kind::HEADING, attrs, Some(level));
            }
            "blockquote" => {
                self.finish_block();
                self.quotes += 1;
            }
            "pre" => self.start_block(kind::CODE_BLOCK, attrs, None),
            "ul" => {
                self.finish_block();
                self.lists.push("unordered".to_string());
            }
            "ol" => {
                self.finish_block();
                self.lists.push("ordered".to_string());
            }
            "li" => {
                self.start_block(kind::LIST_ITEM, attrs, None);
                let list_type = self
                    .lists
                    .last()
                    .cloned()
                    .unwrap_or_else(|| "unordered".to_string());
                let block = self.block.as_mut().expect("start_block opened a block");
                block.set_attr("list_type", serde_json::json!(list_type));
                if self.lists.len() > 1 {
                    block.set_attr("indent", serde_json::json!(self.lists.len() - 1));
                }
            }
            "table" => {
                self.finish_block();
                let mut table = ElementNode::new(kind::TABLE);
                for (key, value) in attrs {
                    match key.as_str() {
                        "border" if value != "0" => table.set_attr("border", serde_json::json!(1)),
                        "width" => {
                            if let Ok(width) = value.trim_end_matches("px").parse::<u32>() {
                                table.set_attr("width", serde_json::json!(width));
                            }
                        }
                        "style" => {
                            if let Some(width) = style_value(value, "width") {
                                if let Ok(width) =
                                    width.trim().trim_end_matches("px").trim().parse::<u32>()
                                {
                                    table.set_attr("width", serde_json::json!(width));
                                }
                            }
                        }
                        _ => {}
                    }
                }
                self.containers.push(table);
            }
            "tr" => {
                self.finish_block();
                self.containers.push(ElementNode::new(kind::TABLE_ROW));
            }
            "td" | "th" => {
                self.finish_block();
                let mut cell = ElementNode::new(kind::TABLE_CELL);
                if name == "th" {
                    cell.set_attr("header", serde_json::json!(true));
                }
                self.containers.push(cell);
            }
            "img" => {
                self.finish_block();
                let mut image = ElementNode::new(kind::IMAGE);
                for (key, value) in attrs {
                    match key.as_str() {
                        "src" => image.set_attr("src", serde_json::json!(value)),
                        "alt" => image.set_attr("alt", serde_json::json!(value)),
                        "class" => {
                            for class in value.split_whitespace() {
                                if let Some(align) = class.strip_prefix("align-") {
                                    image.set_attr("align", serde_json::json!(align));
                                }
                                if class == "text-wrap-around" {
                                    image.set_attr("wrap", serde_json::json!("around"));
                                }
                            }
                        }
                        _ => {}
                    }
                }
                let node = Node::Void(VoidNode {
                    kind: kind::IMAGE.to_string(),
                    attrs: image.attrs,
                });
                self.append_block_node(node);
            }
            "br" => {
                let block = self
                    .block
                    .get_or_insert_with(|| ElementNode::new(kind::PARAGRAPH));
                block.children.push(Node::Text(TextNode {
                    text: "\n".to_string(),
                    marks: self.marks.clone(),
                }));
            }
            "b" | "strong" => self.push_inline(name, |m| m.bold = true),
            "i" | "em" => self.push_inline(name, |m| m.italic = true),
            "u" => self.push_inline(name, |m| m.underline = true),
            "s" | "strike" | "del" => self.push_inline(name, |m| m.strikethrough = true),
            "a" => {
                let href = attr_value(attrs, "href").map(str::to_string);
                self.inline.push((name.to_string(), self.marks.clone()));
                self.marks.link = href;
            }
            "span" => {
                self.inline.push((name.to_string(), self.marks.clone()));
                if let Some(style) = attr_value(attrs, "style") {
                    if let Some(size) = style_value(style, "font-size") {
                        if let Some(pt) = parse_css_font_size(&size) {
                            self.marks.font_size_pt = Some(pt);
                        }
                    }
                    if let Some(family) = style_value(style, "font-family") {
                        self.marks.font_family = Some(first_font_family(&family));
                    }
                }
            }
            "font" => {
                self.inline.push((name.to_string(), self.marks.clone()));
                if let Some(face) = attr_value(attrs, "face") {
                    self.marks.font_family = Some(first_font_family(face));
                }
                if let Some(size) = attr_value(attrs, "size") {
                    if let Ok(legacy) = size.parse::<u8>() {
                        self.marks.font_size_pt = Some(crate::font::legacy_size_to_pt(legacy));
                    }
                }
            }
            // Unknown tags are transparent inline content.
            _ => {}
        }
    }

    fn close(&mut self, name: &str) {
        match name {
            "p" | "div" | "section" | "article" | "header" | "footer" | "aside" | "main" | "h1"
            | "h2" | "h3" | "h4" | "h5" | "h6" | "pre" | "li" => {
                self.finish_block();
            }
            "blockquote" => {
                self.finish_block();
                self.quotes = self.quotes.saturating_sub(1);
            }
            "ul" | "ol" => {
                self.finish_block();
                self.lists.pop();
            }
            "td" | "th" => {
                self.finish_block();
                self.close_container(kind::TABLE_CELL);
            }
            "tr" => {
                self.finish_block();
                self.close_container(kind::TABLE_ROW);
            }
            "table" => {
                self.finish_block();
                self.close_container(kind::TABLE);
            }
            _ => {
                // Inline close: restore the marks saved at the open.
                if let Some(pos) = self.inline.iter().rposition(|(tag, _)| tag == name) {
                    let (_, saved) = self.inline.remove(pos);
                    self.marks = saved;
                }
            }
        }
    }

    fn start_block(&mut self, block_kind: &str, attrs: &[(String, String)], level: Option<u8>) {
        self.finish_block();
        let mut block = ElementNode::new(block_kind);
        if let Some(level) = level {
            block.set_attr("level", serde_json::json!(level.clamp(1, 6)));
        }
        for (key, value) in attrs {
            match key.as_str() {
                "align" => {
                    if matches!(value.as_str(), "center" | "right" | "justify") {
                        block.set_attr("align", serde_json::json!(value));
                    }
                }
                "style" => {
                    if let Some(align) = style_value(value, "text-align") {
                        let align = align.trim();
                        if matches!(align, "center" | "right" | "justify") {
                            block.set_attr("align", serde_json::json!(align));
                        }
                    }
                    if let Some(margin) = style_value(value, "margin-left") {
                        if let Ok(px) = margin.trim().trim_end_matches("px").trim().parse::<u32>() {
                            let indent = (px / 40).min(8);
                            if indent > 0 {
                                block.set_attr("indent", serde_json::json!(indent));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        self.block = Some(block);
    }

    fn finish_block(&mut self) {
        let Some(mut block) = self.block.take() else {
            return;
        };
        block.normalize_inlines();
        self.append_block_node(Node::Element(block));
    }

    fn append_block_node(&mut self, node: Node) {
        match self.containers.last_mut() {
            Some(container) => container.children.push(node),
            None => self.out.push(node),
        }
    }

    fn close_container(&mut self, expected: &str) {
        let Some(pos) = self.containers.iter().rposition(|c| c.kind == expected) else {
            return;
        };
        // Close anything left open inside it first.
        while self.containers.len() > pos + 1 {
            let inner = self.containers.pop().expect("non-empty container stack");
            self.append_container(inner);
        }
        let container = self.containers.pop().expect("container at pos");
        self.append_container(container);
    }

    fn append_container(&mut self, container: ElementNode) {
        match self.containers.last_mut() {
            Some(parent) => parent.children.push(Node::Element(container)),
            None => self.out.push(Node::Element(container)),
        }
    }

    fn push_inline(&mut self, tag: &str, set: impl Fn(&mut Marks)) {
        self.inline.push((tag.to_string(), self.marks.clone()));
        set(&mut self.marks);
    }

    fn finish(mut self) -> Vec<Node> {
        self.finish_block();
        while let Some(container) = self.containers.pop() {
            self.append_container(container);
        }
        self.out
    }
}

fn attr_value<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn style_value(style: &str, property: &str) -> Option<String> {
    for declaration in style.split(';') {
        let mut parts = declaration.splitn(2, ':');
        let name = parts.next()?.trim().to_ascii_lowercase();
        if name == property {
            return parts.next().map(|v| v.trim().to_string());
        }
    }
    None
}

fn parse_css_font_size(value: &str) -> Option<u32> {
    let value = value.trim();
    if let Some(pt) = value.strip_suffix("pt") {
        return pt.trim().parse::<f64>().ok().map(|v| v.round().max(1.0) as u32);
    }
    if let Some(px) = value.strip_suffix("px") {
        return px.trim().parse::<f64>().ok().map(px_to_pt);
    }
    None
}

fn first_font_family(value: &str) -> String {
    value
        .split(',')
        .next()
        .unwrap_or(value)
        .trim()
        .trim_matches(['"', '\''])
        .to_string()
}

// === Emission ===

/// Emit the canonical inner HTML for the whole document. Adjacent list
/// items of the same kind group into a single `<ul>`/`<ol>`.
pub fn emit_document(doc: &Document) -> String {
    emit_nodes(&doc.children)
}

pub fn emit_nodes(nodes: &[Node]) -> String {
    let mut out = String::new();
    let mut ix = 0;
    while ix < nodes.len() {
        match &nodes[ix] {
            Node::Element(el) if el.kind == kind::LIST_ITEM => {
                let list_type = el.attr_str("list_type").unwrap_or("unordered").to_string();
                let tag = if list_type == "ordered" { "ol" } else { "ul" };
                out.push_str(&format!("<{tag}>"));
                while ix < nodes.len() {
                    let Node::Element(item) = &nodes[ix] else {
                        break;
                    };
                    if item.kind != kind::LIST_ITEM
                        || item.attr_str("list_type").unwrap_or("unordered") != list_type
                    {
                        break;
                    }
                    out.push_str(&emit_leaf_block(item, "li"));
                    ix += 1;
                }
                out.push_str(&format!("</{tag}>"));
            }
            node => {
                out.push_str(&emit_node(node));
                ix += 1;
            }
        }
    }
    out
}

fn emit_node(node: &Node) -> String {
    match node {
        Node::Element(el) => match el.kind.as_str() {
            kind::PARAGRAPH => emit_leaf_block(el, "p"),
            kind::HEADING => {
                let level = el.attr_u64("level").unwrap_or(1).clamp(1, 6);
                emit_leaf_block(el, &format!("h{level}"))
            }
            kind::BLOCKQUOTE => emit_leaf_block(el, "blockquote"),
            kind::CODE_BLOCK => emit_leaf_block(el, "pre"),
            kind::LIST_ITEM => emit_leaf_block(el, "li"),
            kind::TABLE => emit_table(el),
            kind::TABLE_ROW | kind::TABLE_CELL => emit_nodes(&el.children),
            _ => emit_leaf_block(el, "p"),
        },
        Node::Void(void) if void.kind == kind::IMAGE => emit_image(void),
        Node::Void(_) => String::new(),
        Node::Text(t) => escape_text(&t.text),
    }
}

fn block_style(el: &ElementNode) -> String {
    let mut style = String::new();
    if let Some(align) = el.attr_str("align") {
        style.push_str(&format!("text-align:{align};"));
    }
    let indent = el.attr_u64("indent").unwrap_or(0);
    if indent > 0 {
        style.push_str(&format!("margin-left:{}px;", indent * 40));
    }
    style
}

fn emit_leaf_block(el: &ElementNode, tag: &str) -> String {
    let style = block_style(el);
    let mut out = String::new();
    out.push('<');
    out.push_str(tag);
    if !style.is_empty() {
        out.push_str(&format!(" style=\"{}\"", style.trim_end_matches(';')));
    }
    out.push('>');
    out.push_str(&emit_inlines(el));
    out.push_str(&format!("</{tag}>"));
    out
}

fn emit_inlines(el: &ElementNode) -> String {
    if el.is_text_empty() {
        return ZWSP.to_string();
    }
    let mut out = String::new();
    for node in &el.children {
        let Node::Text(t) = node else { continue };
        if t.text.is_empty() {
            continue;
        }
        out.push_str(&emit_run(t));
    }
    out
}

fn emit_run(run: &TextNode) -> String {
    let mut open = String::new();
    let mut close = String::new();
    let marks = &run.marks;

    if let Some(link) = &marks.link {
        open.push_str(&format!("<a href=\"{}\">", escape_attr(link)));
        close.insert_str(0, "</a>");
    }
    let mut span_style = String::new();
    if let Some(family) = &marks.font_family {
        span_style.push_str(&format!("font-family:{family};"));
    }
    if let Some(pt) = marks.font_size_pt {
        span_style.push_str(&format!("font-size:{pt}pt;"));
    }
    if !span_style.is_empty() {
        open.push_str(&format!(
            "<span style=\"{}\">",
            span_style.trim_end_matches(';')
        ));
        close.insert_str(0, "</span>");
    }
    for (active, tag) in [
        (marks.bold, "b"),
        (marks.italic, "i"),
        (marks.underline, "u"),
        (marks.strikethrough, "s"),
    ] {
        if active {
            open.push_str(&format!("<{tag}>"));
            close.insert_str(0, &format!("</{tag}>"));
        }
    }

    let mut text = String::new();
    for (ix, line) in run.text.split('\n').enumerate() {
        if ix > 0 {
            text.push_str("<br>");
        }
        text.push_str(&escape_text(line));
    }
    format!("{open}{text}{close}")
}

fn emit_table(el: &ElementNode) -> String {
    let mut out = String::from("<table");
    if el.attr_u64("border").unwrap_or(0) > 0 {
        out.push_str(" border=\"1\"");
    }
    if let Some(width) = el.attr_u64("width") {
        out.push_str(&format!(" style=\"width:{width}px\""));
    }
    out.push('>');
    for row in &el.children {
        let Node::Element(row) = row else { continue };
        out.push_str("<tr>");
        for cell in &row.children {
            let Node::Element(cell) = cell else { continue };
            let header = cell.attrs.get("header").and_then(|v| v.as_bool()).unwrap_or(false);
            let tag = if header { "th" } else { "td" };
            let style = if header {
                "min-width:40px;background-color:#dddddd"
            } else {
                "min-width:40px"
            };
            out.push_str(&format!("<{tag} style=\"{style}\">"));
            // A single plain paragraph renders inline inside the cell.
            match cell.children.as_slice() {
                [Node::Element(only)]
                    if only.kind == kind::PARAGRAPH && only.attrs.is_empty() =>
                {
                    out.push_str(&emit_inlines(only));
                }
                _ => out.push_str(&emit_nodes(&cell.children)),
            }
            out.push_str(&format!("</{tag}>"));
        }
        out.push_str("</tr>");
    }
    out.push_str("</table>");
    out
}

fn emit_image(void: &crate::node::VoidNode) -> String {
    let mut out = String::from("<img");
    if let Some(src) = void.attr_str("src") {
        out.push_str(&format!(" src=\"{}\"", escape_attr(src)));
    }
    if let Some(alt) = void.attr_str("alt") {
        out.push_str(&format!(" alt=\"{}\"", escape_attr(alt)));
    }
    let mut classes: Vec<String> = Vec::new();
    if let Some(align) = void.attr_str("align") {
        classes.push(format!("align-{align}"));
    }
    if void.attr_str("wrap") == Some("around") {
        classes.push("text-wrap-around".to_string());
    }
    if !classes.is_empty() {
        out.push_str(&format!(" class=\"{}\"", classes.join(" ")));
    }
    out.push_str(" style=\"max-width: 100%\">");
    out
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{A0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

// === Semantic comparison for the change notifier ===

/// Whether a body is one of the placeholder forms that count as empty:
/// `<p>ZWSP</p>`, `<p><br></p>`, or whitespace.
pub fn is_placeholder_body(body: &str) -> bool {
    normalize_for_compare(body).is_empty()
}

/// Two bodies are equivalent when they differ only in placeholder content
/// and whitespace.
pub fn bodies_equivalent(a: &str, b: &str) -> bool {
    normalize_for_compare(a) == normalize_for_compare(b)
}

fn normalize_for_compare(body: &str) -> String {
    let mut s: String = body.chars().filter(|&c| c != ZWSP).collect();
    for placeholder in ["<p><br></p>", "<p></p>", "<div><br></div>", "<div></div>"] {
        s = s.replace(placeholder, "");
    }
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for c in s.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out.trim().to_string()
}
