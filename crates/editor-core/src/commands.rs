use std::collections::HashMap;

use serde_json::Value;

use crate::editor::Editor;
use crate::font::legacy_size_to_pt;
use crate::node::{Marks, kind};
use crate::state::Alignment;

#[derive(Debug, Clone)]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone)]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Whether a command name was recognized. Unknown names are deliberately
/// not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    Ignored,
}

pub type CommandHandler = fn(&mut Editor, Option<&Value>) -> Result<(), CommandError>;
pub type QueryHandler = fn(&mut Editor) -> Result<Value, QueryError>;

/// Commands and queries addressable by their wire names.
pub struct CommandRegistry {
    commands: HashMap<&'static str, CommandHandler>,
    queries: HashMap<&'static str, QueryHandler>,
}

impl CommandRegistry {
    pub fn editor() -> Self {
        let mut registry = Self {
            commands: HashMap::new(),
            queries: HashMap::new(),
        };
        registry.install_marks();
        registry.install_blocks();
        registry.install_editing();
        registry.install_objects();
        registry.install_history();
        registry.install_queries();
        registry
    }

    pub fn command(&self, name: &str) -> Option<CommandHandler> {
        self.commands.get(name).copied()
    }

    pub fn query(&self, name: &str) -> Option<QueryHandler> {
        self.queries.get(name).copied()
    }

    pub fn command_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    fn add(&mut self, name: &'static str, handler: CommandHandler) {
        self.commands.insert(name, handler);
    }

    fn add_query(&mut self, name: &'static str, handler: QueryHandler) {
        self.queries.insert(name, handler);
    }

    fn install_marks(&mut self) {
        self.add("bold", |editor, _| {
            toggle_mark(editor, |m| m.bold, |m, v| m.bold = v);
            Ok(())
        });
        self.add("italic", |editor, _| {
            toggle_mark(editor, |m| m.italic, |m, v| m.italic = v);
            Ok(())
        });
        self.add("underline", |editor, _| {
            toggle_mark(editor, |m| m.underline, |m, v| m.underline = v);
            Ok(())
        });
        self.add("strikeThrough", |editor, _| {
            toggle_mark(editor, |m| m.strikethrough, |m, v| m.strikethrough = v);
            Ok(())
        });
        self.add("removeFormat", |editor, _| {
            editor.update_marks_in_selection(|m| {
                let link = m.link.clone();
                *m = Marks {
                    link,
                    ..Marks::default()
                };
            });
            Ok(())
        });
        self.add("fontName", |editor, args| {
            let Some(name) = string_arg(args, "name") else {
                return Err(CommandError::new("fontName requires a name"));
            };
            let family = name.trim_matches(['"', '\'']).to_string();
            editor.update_marks_in_selection(move |m| m.font_family = Some(family.clone()));
            Ok(())
        });
        self.add("fontSize", |editor, args| {
            let pt = args
                .and_then(|v| v.get("pt"))
                .and_then(Value::as_u64)
                .map(|pt| pt as u32)
                .or_else(|| {
                    args.and_then(|v| v.get("size"))
                        .and_then(Value::as_u64)
                        .map(|sz| legacy_size_to_pt(sz.min(7) as u8))
                });
            let Some(pt) = pt else {
                return Err(CommandError::new("fontSize requires pt or size"));
            };
            if editor.selection().is_collapsed() {
                let mut marks = editor.effective_marks();
                marks.font_size_pt = Some(pt);
                editor.insert_zwsp_anchor(marks);
            } else {
                editor.update_marks_in_selection(move |m| m.font_size_pt = Some(pt));
            }
            Ok(())
        });
        self.add("createLink", |editor, args| {
            let Some(url) = string_arg(args, "url") else {
                return Err(CommandError::new("createLink requires a url"));
            };
            if editor.selection().is_collapsed() {
                let mut marks = editor.effective_marks();
                marks.link = Some(url.clone());
                editor.set_pending_marks(marks);
                editor.insert_text(&url);
            } else {
                editor.update_marks_in_selection(move |m| m.link = Some(url.clone()));
            }
            Ok(())
        });
        self.add("unlink", |editor, _| {
            editor.update_marks_in_selection(|m| m.link = None);
            Ok(())
        });
    }

    fn install_blocks(&mut self) {
        self.add("formatBlock", |editor, args| {
            let tag = string_arg(args, "tag").unwrap_or_default().to_lowercase();
            let tag = tag.trim_matches(['<', '>']).to_string();
            match tag.as_str() {
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    let level = tag[1..].parse::<u8>().unwrap_or(1);
                    editor.set_block_kind(kind::HEADING, Some(level));
                }
                "blockquote" => editor.set_block_kind(kind::BLOCKQUOTE, None),
                "pre" => editor.set_block_kind(kind::CODE_BLOCK, None),
                // `p` is the canonical "Normal" tag and the fallback for
                // anything unrecognized.
                _ => editor.set_block_kind(kind::PARAGRAPH, None),
            }
            Ok(())
        });
        self.add("insertUnorderedList", |editor, _| {
            editor.toggle_list("unordered");
            Ok(())
        });
        self.add("insertOrderedList", |editor, _| {
            editor.toggle_list("ordered");
            Ok(())
        });
        self.add("justifyLeft", |editor, _| {
            editor.set_alignment(Alignment::Left);
            Ok(())
        });
        self.add("justifyCenter", |editor, _| {
            editor.set_alignment(Alignment::Center);
            Ok(())
        });
        self.add("justifyRight", |editor, _| {
            editor.set_alignment(Alignment::Right);
            Ok(())
        });
        self.add("justifyFull", |editor, _| {
            editor.set_alignment(Alignment::Justify);
            Ok(())
        });
        self.add("indent", |editor, _| {
            editor.adjust_indent(1);
            Ok(())
        });
        self.add("outdent", |editor, _| {
            editor.adjust_indent(-1);
            Ok(())
        });
    }

    fn install_editing(&mut self) {
        self.add("insertText", |editor, args| {
            let Some(text) = string_arg(args, "text") else {
                return Err(CommandError::new("insertText requires text"));
            };
            editor.insert_text(&text);
            Ok(())
        });
        self.add("insertParagraph", |editor, _| {
            editor.insert_paragraph();
            Ok(())
        });
        self.add("deleteBackward", |editor, _| {
            editor.delete_backward();
            Ok(())
        });
        self.add("insertHTML", |editor, args| {
            let Some(html) = string_arg(args, "html") else {
                return Err(CommandError::new("insertHTML requires html"));
            };
            editor.insert_html_fragment(&html);
            Ok(())
        });
    }

    fn install_objects(&mut self) {
        self.add("insertImage", |editor, args| {
            let Some(src) = string_arg(args, "src") else {
                return Err(CommandError::new("insertImage requires src"));
            };
            let alt = args
                .and_then(|v| v.get("alt"))
                .and_then(Value::as_str)
                .map(str::to_string);
            editor.insert_image(&src, alt.as_deref());
            Ok(())
        });
        self.add("setImageAlign", |editor, args| {
            let align = string_arg(args, "align").unwrap_or_else(|| "none".to_string());
            let align = match align.as_str() {
                "left" | "center" | "right" => align,
                _ => "none".to_string(),
            };
            editor.set_image_attr("align", &align);
            Ok(())
        });
        self.add("setImageWrap", |editor, args| {
            let wrap = string_arg(args, "wrap").unwrap_or_else(|| "none".to_string());
            let wrap = if wrap == "around" { wrap } else { "none".to_string() };
            editor.set_image_attr("wrap", &wrap);
            Ok(())
        });
        self.add("insertTable", |editor, args| {
            let rows = args
                .and_then(|v| v.get("rows"))
                .and_then(Value::as_u64)
                .unwrap_or(2) as usize;
            let cols = args
                .and_then(|v| v.get("cols"))
                .and_then(Value::as_u64)
                .unwrap_or(2) as usize;
            let has_header = args
                .and_then(|v| v.get("hasHeader"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let border = args
                .and_then(|v| v.get("border"))
                .and_then(Value::as_bool)
                .unwrap_or(true);
            let width = args
                .and_then(|v| v.get("width"))
                .and_then(Value::as_u64)
                .map(|w| w as u32);
            editor.insert_table(rows, cols, has_header, border, width);
            Ok(())
        });
    }

    fn install_history(&mut self) {
        self.add("undo", |editor, _| {
            editor.undo();
            Ok(())
        });
        self.add("redo", |editor, _| {
            editor.redo();
            Ok(())
        });
    }

    fn install_queries(&mut self) {
        self.add_query("queryState", |editor| {
            serde_json::to_value(editor.formatting_state())
                .map_err(|err| QueryError::new(format!("Failed to encode state: {err}")))
        });
        self.add_query("stackSizes", |editor| {
            let (undo, redo) = editor.stack_sizes();
            Ok(serde_json::json!({ "undo": undo, "redo": redo }))
        });
    }
}

fn toggle_mark(
    editor: &mut Editor,
    get: impl Fn(&Marks) -> bool + Copy,
    set: impl Fn(&mut Marks, bool) + Copy,
) {
    let enabled = editor.is_mark_active(get);
    editor.update_marks_in_selection(move |m| set(m, !enabled));
}

/// Fetch a string argument either as a bare JSON string or as a field of
/// an object payload.
fn string_arg(args: Option<&Value>, field: &str) -> Option<String> {
    let args = args?;
    if let Some(s) = args.as_str() {
        return Some(s.to_string());
    }
    args.get(field).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, Selection};

    fn select_all_of_block(editor: &mut Editor, row: usize) {
        let len = match &editor.doc().children[row] {
            Node::Element(el) => el.text_len(),
            _ => 0,
        };
        let anchor = crate::node::Point::new(vec![row, 0], 0);
        let focus = crate::node::Point::new(vec![row, 0], len);
        editor.set_selection(Selection {
            anchor,
            focus,
        });
    }

    #[test]
    fn bold_toggle_on_range_splits_runs() {
        let mut editor = Editor::new();
        editor.set_content("<p>abcde</p>");
        editor.set_selection(Selection {
            anchor: crate::node::Point::new(vec![0, 0], 1),
            focus: crate::node::Point::new(vec![0, 0], 3),
        });
        editor.run_command("bold", None).unwrap();

        let Node::Element(block) = &editor.doc().children[0] else {
            panic!("expected block");
        };
        let runs: Vec<(String, bool)> = block
            .children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some((t.text.clone(), t.marks.bold)),
                _ => None,
            })
            .collect();
        assert_eq!(
            runs,
            vec![
                ("a".to_string(), false),
                ("bc".to_string(), true),
                ("de".to_string(), false),
            ]
        );

        editor.run_command("bold", None).unwrap();
        let Node::Element(block) = &editor.doc().children[0] else {
            panic!("expected block");
        };
        assert_eq!(block.children.len(), 1);
    }

    #[test]
    fn bold_on_collapsed_caret_applies_to_typed_text() {
        let mut editor = Editor::new();
        editor.run_command("bold", None).unwrap();
        editor
            .run_command("insertText", Some(&serde_json::json!({ "text": "Hi" })))
            .unwrap();
        let state = editor.formatting_state();
        assert!(state.bold);
        assert!(editor.body_html().contains("<b>"));
    }

    #[test]
    fn format_block_h1_and_fallback() {
        let mut editor = Editor::new();
        editor.set_content("<p>Title</p>");
        editor
            .run_command("formatBlock", Some(&serde_json::json!({ "tag": "h1" })))
            .unwrap();
        assert_eq!(editor.formatting_state().block_format, "h1");
        assert!(editor.body_html().contains("<h1>Title</h1>"));

        editor
            .run_command("formatBlock", Some(&serde_json::json!({ "tag": "marquee" })))
            .unwrap();
        assert_eq!(editor.formatting_state().block_format, "p");
    }

    #[test]
    fn list_toggles_are_mutually_exclusive() {
        let mut editor = Editor::new();
        editor.set_content("<p>one</p><p>two</p>");
        editor.set_selection(Selection {
            anchor: crate::node::Point::new(vec![0, 0], 0),
            focus: crate::node::Point::new(vec![1, 0], 3),
        });
        editor.run_command("insertUnorderedList", None).unwrap();
        assert_eq!(
            editor.formatting_state().list_kind,
            crate::state::ListKind::Unordered
        );
        editor.run_command("insertOrderedList", None).unwrap();
        let state = editor.formatting_state();
        assert_eq!(state.list_kind, crate::state::ListKind::Ordered);
        let body = editor.body_html();
        assert!(body.contains("<ol>"));
        assert!(!body.contains("<ul>"));
    }

    #[test]
    fn toggling_active_list_restores_paragraphs() {
        let mut editor = Editor::new();
        editor.set_content("<ul><li>a</li></ul>");
        editor.run_command("insertUnorderedList", None).unwrap();
        assert_eq!(
            editor.formatting_state().list_kind,
            crate::state::ListKind::None
        );
        assert!(editor.body_html().contains("<p>"));
    }

    #[test]
    fn alignment_commands_are_exclusive() {
        let mut editor = Editor::new();
        editor.set_content("<p>text</p>");
        editor.run_command("justifyCenter", None).unwrap();
        assert_eq!(editor.formatting_state().alignment, Alignment::Center);
        editor.run_command("justifyRight", None).unwrap();
        assert_eq!(editor.formatting_state().alignment, Alignment::Right);
        editor.run_command("justifyLeft", None).unwrap();
        assert_eq!(editor.formatting_state().alignment, Alignment::Left);
        assert!(!editor.body_html().contains("text-align"));
    }

    #[test]
    fn font_size_on_collapsed_caret_anchors_zwsp() {
        let mut editor = Editor::new();
        editor
            .run_command("fontSize", Some(&serde_json::json!({ "pt": 72 })))
            .unwrap();
        editor
            .run_command("insertText", Some(&serde_json::json!({ "text": "x" })))
            .unwrap();
        let body = editor.body_html();
        assert!(body.contains("font-size:72pt"), "body: {body}");
        assert!(body.contains('\u{200B}'));
        assert!(body.contains('x'));
        assert_eq!(editor.formatting_state().font_size_pt, 72);
    }

    #[test]
    fn font_name_applies_to_selection() {
        let mut editor = Editor::new();
        editor.set_content("<p>word</p>");
        select_all_of_block(&mut editor, 0);
        editor
            .run_command("fontName", Some(&serde_json::json!({ "name": "Liberation Serif" })))
            .unwrap();
        assert_eq!(editor.formatting_state().font_family, "Liberation Serif");
        assert!(editor.body_html().contains("font-family:Liberation Serif"));
    }

    #[test]
    fn insert_table_emits_table_clicked() {
        let mut editor = Editor::new();
        editor
            .run_command(
                "insertTable",
                Some(&serde_json::json!({
                    "rows": 2, "cols": 3, "hasHeader": true, "border": true, "width": 120
                })),
            )
            .unwrap();
        let events = editor.take_events();
        assert!(events.contains(&crate::editor::EditorEvent::TableClicked));
        let body = editor.body_html();
        assert!(body.contains("<table"));
        assert!(body.contains("<th"));
        assert_eq!(body.matches("<tr>").count(), 2);
    }

    #[test]
    fn leaving_a_table_deactivates_the_table_toolbar() {
        let mut editor = Editor::new();
        editor
            .run_command("insertTable", Some(&serde_json::json!({ "rows": 1, "cols": 1 })))
            .unwrap();
        editor.take_events();

        editor
            .run_command(
                "insertHTML",
                Some(&serde_json::json!({ "html": "<p>out</p><p>side</p>" })),
            )
            .unwrap();
        let events = editor.take_events();
        assert!(events.contains(&crate::editor::EditorEvent::TablesDeactivated));
    }

    #[test]
    fn insert_image_keeps_caret_editable() {
        let mut editor = Editor::new();
        editor
            .run_command(
                "insertImage",
                Some(&serde_json::json!({ "src": "data:image/png;base64,AAAA" })),
            )
            .unwrap();
        let body = editor.body_html();
        assert!(body.contains("data:image/png;base64,AAAA"));
        assert!(body.contains("max-width: 100%"));
        // Typing continues in the paragraph after the image.
        editor
            .run_command("insertText", Some(&serde_json::json!({ "text": "after" })))
            .unwrap();
        assert!(editor.body_html().contains("after"));
    }

    #[test]
    fn remove_format_clears_marks_but_keeps_link() {
        let mut editor = Editor::new();
        editor.set_content("<p><b><a href=\"https://e.org\">x</a></b></p>");
        select_all_of_block(&mut editor, 0);
        editor.run_command("removeFormat", None).unwrap();
        let body = editor.body_html();
        assert!(!body.contains("<b>"));
        assert!(body.contains("href=\"https://e.org\""));
    }

    #[test]
    fn stack_sizes_query_reports_json() {
        let mut editor = Editor::new();
        let value = editor.run_query("stackSizes").unwrap();
        assert_eq!(value["undo"], 1);
        assert_eq!(value["redo"], 0);
    }

    #[test]
    fn query_state_round_trips_as_json() {
        let mut editor = Editor::new();
        let value = editor.run_query("queryState").unwrap();
        let state: crate::state::FormattingState = serde_json::from_value(value).unwrap();
        assert_eq!(state.block_format, "p");
    }
}
