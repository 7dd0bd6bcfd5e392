use serde::{Deserialize, Serialize};

use crate::font::{DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE_PT};
use crate::node::{ElementNode, kind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    #[default]
    None,
    Unordered,
    Ordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    pub fn from_attr(value: Option<&str>) -> Self {
        match value {
            Some("center") => Alignment::Center,
            Some("right") => Alignment::Right,
            Some("justify") => Alignment::Justify,
            _ => Alignment::Left,
        }
    }

    pub fn as_attr(self) -> Option<&'static str> {
        match self {
            Alignment::Left => None,
            Alignment::Center => Some("center"),
            Alignment::Right => Some("right"),
            Alignment::Justify => Some("justify"),
        }
    }
}

/// Normalized snapshot of the formatting at the current selection,
/// published to the host on every selection change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattingState {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub block_format: String,
    pub font_family: String,
    pub font_size_pt: u32,
    pub list_kind: ListKind,
    pub alignment: Alignment,
}

impl Default for FormattingState {
    fn default() -> Self {
        Self {
            bold: false,
            italic: false,
            underline: false,
            strikethrough: false,
            block_format: "p".to_string(),
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size_pt: DEFAULT_FONT_SIZE_PT,
            list_kind: ListKind::None,
            alignment: Alignment::Left,
        }
    }
}

/// The toolbar-facing block format tag for a leaf block. Anything outside
/// the known set reports as `p`.
pub fn block_format_for(block: &ElementNode) -> String {
    match block.kind.as_str() {
        kind::HEADING => {
            let level = block.attr_u64("level").unwrap_or(1).clamp(1, 6);
            format!("h{level}")
        }
        kind::BLOCKQUOTE => "blockquote".to_string(),
        kind::CODE_BLOCK => "pre".to_string(),
        _ => "p".to_string(),
    }
}

pub fn list_kind_for(block: &ElementNode) -> ListKind {
    if block.kind != kind::LIST_ITEM {
        return ListKind::None;
    }
    match block.attr_str("list_type") {
        Some("ordered") => ListKind::Ordered,
        _ => ListKind::Unordered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn formatting_state_serializes_camel_case() {
        let state = FormattingState::default();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["blockFormat"], "p");
        assert_eq!(json["fontSizePt"], 12);
        assert_eq!(json["listKind"], "none");
        assert_eq!(json["alignment"], "left");
    }

    #[test]
    fn unknown_block_kind_reports_p() {
        let block = ElementNode::new("aside");
        assert_eq!(block_format_for(&block), "p");
    }

    #[test]
    fn heading_reports_level_tag() {
        let Node::Element(block) = Node::heading(3, "t") else {
            unreachable!();
        };
        assert_eq!(block_format_for(&block), "h3");
    }
}
