use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type Attrs = BTreeMap<String, serde_json::Value>;
pub type ElementKind = String;
pub type Path = Vec<usize>;

pub mod kind {
    pub const PARAGRAPH: &str = "paragraph";
    pub const HEADING: &str = "heading";
    pub const BLOCKQUOTE: &str = "blockquote";
    pub const CODE_BLOCK: &str = "code_block";
    pub const LIST_ITEM: &str = "list_item";
    pub const TABLE: &str = "table";
    pub const TABLE_ROW: &str = "table_row";
    pub const TABLE_CELL: &str = "table_cell";
    pub const IMAGE: &str = "image";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Document {
    pub fn empty() -> Self {
        Self {
            children: vec![Node::paragraph("")],
        }
    }

    pub fn node_ref(&self, path: &[usize]) -> Option<&Node> {
        let mut node = self.children.get(*path.first()?)?;
        for &ix in path.iter().skip(1) {
            node = match node {
                Node::Element(el) => el.children.get(ix)?,
                Node::Void(_) | Node::Text(_) => return None,
            };
        }
        Some(node)
    }

    pub fn node_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let mut node = self.children.get_mut(*path.first()?)?;
        for &ix in path.iter().skip(1) {
            node = match node {
                Node::Element(el) => el.children.get_mut(ix)?,
                Node::Void(_) | Node::Text(_) => return None,
            };
        }
        Some(node)
    }

    /// Leaf blocks (elements whose children are inline) in document order,
    /// paired with their paths. Tables contribute the paragraphs inside
    /// their cells, not the table scaffolding itself.
    pub fn leaf_blocks(&self) -> Vec<(Path, &ElementNode)> {
        let mut out = Vec::new();
        for (ix, node) in self.children.iter().enumerate() {
            collect_leaf_blocks(node, vec![ix], &mut out);
        }
        out
    }

    /// Resolve the leaf block containing `path` (a text path or a block
    /// path). Returns the block's path.
    pub fn leaf_block_path(&self, path: &[usize]) -> Option<Path> {
        let mut prefix = path.to_vec();
        while !prefix.is_empty() {
            if let Some(Node::Element(el)) = self.node_ref(&prefix) {
                if el.is_leaf_block() {
                    return Some(prefix);
                }
            }
            prefix.pop();
        }
        None
    }
}

fn collect_leaf_blocks<'a>(node: &'a Node, path: Path, out: &mut Vec<(Path, &'a ElementNode)>) {
    let Node::Element(el) = node else {
        return;
    };
    if el.is_leaf_block() {
        out.push((path, el));
        return;
    }
    for (ix, child) in el.children.iter().enumerate() {
        let mut child_path = path.clone();
        child_path.push(ix);
        collect_leaf_blocks(child, child_path, out);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
    Void(VoidNode),
}

impl Node {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::Element(ElementNode {
            kind: kind::PARAGRAPH.to_string(),
            attrs: Attrs::default(),
            children: vec![Node::Text(TextNode {
                text: text.into(),
                marks: Marks::default(),
            })],
        })
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        let mut attrs = Attrs::default();
        attrs.insert("level".to_string(), serde_json::json!(level.clamp(1, 6)));
        Node::Element(ElementNode {
            kind: kind::HEADING.to_string(),
            attrs,
            children: vec![Node::Text(TextNode {
                text: text.into(),
                marks: Marks::default(),
            })],
        })
    }

    pub fn image(src: impl Into<String>) -> Self {
        let mut attrs = Attrs::default();
        attrs.insert("src".to_string(), serde_json::json!(src.into()));
        Node::Void(VoidNode {
            kind: kind::IMAGE.to_string(),
            attrs,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl ElementNode {
    pub fn new(kind: impl Into<ElementKind>) -> Self {
        Self {
            kind: kind.into(),
            attrs: Attrs::default(),
            children: Vec::new(),
        }
    }

    /// A leaf block holds inline content directly (text leaves); container
    /// elements (table, table_row, table_cell) hold further elements.
    pub fn is_leaf_block(&self) -> bool {
        !matches!(
            self.kind.as_str(),
            kind::TABLE | kind::TABLE_ROW | kind::TABLE_CELL
        )
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(|v| v.as_str())
    }

    pub fn attr_u64(&self, name: &str) -> Option<u64> {
        self.attrs.get(name).and_then(|v| v.as_u64())
    }

    pub fn set_attr(&mut self, name: &str, value: serde_json::Value) {
        self.attrs.insert(name.to_string(), value);
    }

    pub fn text_len(&self) -> usize {
        self.children.iter().fold(0, |acc, node| match node {
            Node::Text(t) => acc + t.text.len(),
            _ => acc,
        })
    }

    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(t) = node {
                out.push_str(&t.text);
            }
        }
        out
    }

    pub fn is_text_empty(&self) -> bool {
        self.text_len() == 0
    }

    /// Merge adjacent text leaves with equal marks and drop empty leaves,
    /// keeping at least one so the block stays addressable.
    pub fn normalize_inlines(&mut self) {
        let mut normalized: Vec<Node> = Vec::with_capacity(self.children.len());
        for node in self.children.drain(..) {
            match node {
                Node::Text(text) => {
                    if let Some(Node::Text(prev)) = normalized.last_mut() {
                        if prev.marks == text.marks {
                            prev.text.push_str(&text.text);
                            continue;
                        }
                    }
                    normalized.push(Node::Text(text));
                }
                other => normalized.push(other),
            }
        }

        let has_any_text = normalized
            .iter()
            .any(|node| matches!(node, Node::Text(t) if !t.text.is_empty()));
        if has_any_text {
            normalized.retain(|node| !matches!(node, Node::Text(t) if t.text.is_empty()));
        }

        if normalized.is_empty() {
            normalized.push(Node::Text(TextNode::default()));
        }
        self.children = normalized;
    }

    pub fn last_marks(&self) -> Option<&Marks> {
        self.children.iter().rev().find_map(|node| match node {
            Node::Text(t) if !t.text.is_empty() => Some(&t.marks),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoidNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
}

impl VoidNode {
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TextNode {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub marks: Marks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Marks {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size_pt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Marks {
    pub fn is_default(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }

    pub fn document_start() -> Self {
        Self::new(vec![0, 0], 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Anchor and focus in document order.
    pub fn ordered(&self) -> (&Point, &Point) {
        if point_le(&self.anchor, &self.focus) {
            (&self.anchor, &self.focus)
        } else {
            (&self.focus, &self.anchor)
        }
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::collapsed(Point::document_start())
    }
}

pub(crate) fn point_le(a: &Point, b: &Point) -> bool {
    match a.path.cmp(&b.path) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => a.offset <= b.offset,
    }
}

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_merges_equal_mark_runs() {
        let mut block = ElementNode::new(kind::PARAGRAPH);
        block.children = vec![
            Node::Text(TextNode {
                text: "ab".into(),
                marks: Marks::default(),
            }),
            Node::Text(TextNode {
                text: "cd".into(),
                marks: Marks::default(),
            }),
        ];
        block.normalize_inlines();
        assert_eq!(block.children.len(), 1);
        assert_eq!(block.to_plain_text(), "abcd");
    }

    #[test]
    fn normalize_keeps_one_empty_leaf() {
        let mut block = ElementNode::new(kind::PARAGRAPH);
        block.children = vec![];
        block.normalize_inlines();
        assert_eq!(block.children.len(), 1);
        assert!(block.is_text_empty());
    }

    #[test]
    fn leaf_blocks_descend_into_table_cells() {
        let mut cell = ElementNode::new(kind::TABLE_CELL);
        cell.children = vec![Node::paragraph("x")];
        let mut row = ElementNode::new(kind::TABLE_ROW);
        row.children = vec![Node::Element(cell)];
        let mut table = ElementNode::new(kind::TABLE);
        table.children = vec![Node::Element(row)];

        let doc = Document {
            children: vec![Node::paragraph("a"), Node::Element(table)],
        };
        let leaves = doc.leaf_blocks();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].0, vec![0]);
        assert_eq!(leaves[1].0, vec![1, 0, 0, 0]);
    }

    #[test]
    fn leaf_block_path_resolves_from_text_path() {
        let doc = Document {
            children: vec![Node::paragraph("hello")],
        };
        assert_eq!(doc.leaf_block_path(&[0, 0]), Some(vec![0]));
        assert_eq!(doc.leaf_block_path(&[0]), Some(vec![0]));
    }
}
