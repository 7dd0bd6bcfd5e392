use penmark_editor_core::{Alignment, FormattingState, pt_to_legacy_size};
use serde_json::json;
use tracing::debug;

use crate::surface::SurfaceHandle;

const ALLOWED_BLOCK_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre",
];

/// Toolbar toggles with a 1:1 engine command behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    UnorderedList,
    OrderedList,
}

impl ToggleKind {
    pub fn wire_name(self) -> &'static str {
        match self {
            ToggleKind::Bold => "bold",
            ToggleKind::Italic => "italic",
            ToggleKind::Underline => "underline",
            ToggleKind::Strikethrough => "strikeThrough",
            ToggleKind::UnorderedList => "insertUnorderedList",
            ToggleKind::OrderedList => "insertOrderedList",
        }
    }
}

/// Stateless facade translating host intents into engine commands.
/// Arguments that originate as user strings always travel JSON-encoded;
/// nothing is spliced into the wire by hand.
pub struct Dispatcher;

impl Dispatcher {
    /// Apply a toggle, then confirm against a fresh state snapshot so the
    /// caller can surface the authoritative boolean.
    pub fn toggle(surface: &mut SurfaceHandle, kind: ToggleKind) -> anyhow::Result<bool> {
        surface.command(kind.wire_name(), None)?;
        let state = Self::query_state(surface)?;
        Ok(match kind {
            ToggleKind::Bold => state.bold,
            ToggleKind::Italic => state.italic,
            ToggleKind::Underline => state.underline,
            ToggleKind::Strikethrough => state.strikethrough,
            ToggleKind::UnorderedList => {
                state.list_kind == penmark_editor_core::ListKind::Unordered
            }
            ToggleKind::OrderedList => state.list_kind == penmark_editor_core::ListKind::Ordered,
        })
    }

    /// Set the enclosing block format. Tags outside the allowed set fall
    /// back to `p`.
    pub fn set_block(surface: &mut SurfaceHandle, tag: &str) -> anyhow::Result<()> {
        let tag = tag.to_ascii_lowercase();
        let tag = if ALLOWED_BLOCK_TAGS.contains(&tag.as_str()) {
            tag
        } else {
            debug!(%tag, "unknown block tag, falling back to p");
            "p".to_string()
        };
        surface.command("formatBlock", Some(json!({ "tag": tag })))
    }

    pub fn set_font_family(surface: &mut SurfaceHandle, name: &str) -> anyhow::Result<()> {
        surface.command("fontName", Some(json!({ "name": name })))
    }

    /// Points map onto the legacy 1-7 ladder; the precise size rides along
    /// so the engine can anchor `font-size:Npt` styling (and the ZWSP
    /// caret strategy for collapsed selections).
    pub fn set_font_size(surface: &mut SurfaceHandle, pt: u32) -> anyhow::Result<()> {
        let size = pt_to_legacy_size(pt);
        surface.command("fontSize", Some(json!({ "pt": pt, "size": size })))
    }

    /// Alignment is optimistic: the caller flips its widget group before
    /// the confirming snapshot arrives; a later snapshot corrects drift.
    pub fn align(surface: &mut SurfaceHandle, alignment: Alignment) -> anyhow::Result<Alignment> {
        let command = match alignment {
            Alignment::Left => "justifyLeft",
            Alignment::Center => "justifyCenter",
            Alignment::Right => "justifyRight",
            Alignment::Justify => "justifyFull",
        };
        surface.command(command, None)?;
        Ok(alignment)
    }

    pub fn indent(surface: &mut SurfaceHandle) -> anyhow::Result<()> {
        surface.command("indent", None)
    }

    pub fn outdent(surface: &mut SurfaceHandle) -> anyhow::Result<()> {
        surface.command("outdent", None)
    }

    pub fn remove_format(surface: &mut SurfaceHandle) -> anyhow::Result<()> {
        surface.command("removeFormat", None)
    }

    pub fn create_link(surface: &mut SurfaceHandle, url: &str) -> anyhow::Result<()> {
        surface.command("createLink", Some(json!({ "url": url })))
    }

    pub fn insert_html(surface: &mut SurfaceHandle, html: &str) -> anyhow::Result<()> {
        surface.command("insertHTML", Some(json!({ "html": html })))
    }

    pub fn insert_image(surface: &mut SurfaceHandle, src: &str) -> anyhow::Result<()> {
        surface.command("insertImage", Some(json!({ "src": src })))
    }

    pub fn insert_table(
        surface: &mut SurfaceHandle,
        rows: u32,
        cols: u32,
        has_header: bool,
        border: bool,
        width: Option<u32>,
    ) -> anyhow::Result<()> {
        surface.command(
            "insertTable",
            Some(json!({
                "rows": rows,
                "cols": cols,
                "hasHeader": has_header,
                "border": border,
                "width": width,
            })),
        )
    }

    pub fn undo(surface: &mut SurfaceHandle) -> anyhow::Result<()> {
        surface.command("undo", None)
    }

    pub fn redo(surface: &mut SurfaceHandle) -> anyhow::Result<()> {
        surface.command("redo", None)
    }

    pub fn query_state(surface: &mut SurfaceHandle) -> anyhow::Result<FormattingState> {
        let value = surface.query("queryState")?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn stack_sizes(surface: &mut SurfaceHandle) -> anyhow::Result<(usize, usize)> {
        let value = surface.query("stackSizes")?;
        let undo = value["undo"].as_u64().unwrap_or(0) as usize;
        let redo = value["redo"].as_u64().unwrap_or(0) as usize;
        Ok((undo, redo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SurfaceHandle;

    #[test]
    fn toggle_confirms_with_fresh_state() {
        let (mut surface, _events) = SurfaceHandle::spawn();
        surface.set_content("<p>word</p>").unwrap();
        let active = Dispatcher::toggle(&mut surface, ToggleKind::Bold).unwrap();
        assert!(active);
        let active = Dispatcher::toggle(&mut surface, ToggleKind::Bold).unwrap();
        assert!(!active);
    }

    #[test]
    fn unknown_block_tag_falls_back_to_p() {
        let (mut surface, _events) = SurfaceHandle::spawn();
        surface.set_content("<h2>t</h2>").unwrap();
        Dispatcher::set_block(&mut surface, "marquee").unwrap();
        let state = Dispatcher::query_state(&mut surface).unwrap();
        assert_eq!(state.block_format, "p");
    }

    #[test]
    fn font_size_travels_with_both_scales() {
        let (mut surface, _events) = SurfaceHandle::spawn();
        surface.set_content("<p>x</p>").unwrap();
        Dispatcher::set_font_size(&mut surface, 14).unwrap();
        // Collapsed caret: the anchor adopts the size.
        let state = Dispatcher::query_state(&mut surface).unwrap();
        assert_eq!(state.font_size_pt, 14);
    }

    #[test]
    fn list_toggle_reports_exclusive_kind() {
        let (mut surface, _events) = SurfaceHandle::spawn();
        surface.set_content("<p>a</p>").unwrap();
        assert!(Dispatcher::toggle(&mut surface, ToggleKind::UnorderedList).unwrap());
        assert!(Dispatcher::toggle(&mut surface, ToggleKind::OrderedList).unwrap());
        let state = Dispatcher::query_state(&mut surface).unwrap();
        assert_eq!(state.list_kind, penmark_editor_core::ListKind::Ordered);
    }
}
