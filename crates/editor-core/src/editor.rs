use std::ops::Range;

use crate::commands::{CommandError, CommandOutcome, CommandRegistry, QueryError};
use crate::font::DEFAULT_FONT_SIZE_PT;
use crate::html;
use crate::node::{
    Attrs, Document, ElementNode, Marks, Node, Path, Point, Selection, TextNode,
    clamp_to_char_boundary, kind,
};
use crate::state::{Alignment, FormattingState, block_format_for, list_kind_for};

/// Combined bound on the undo and redo stacks.
const MAX_HISTORY: usize = 100;

/// Events the engine raises for the host's optional collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorEvent {
    TableClicked,
    TableDeleted,
    TablesDeactivated,
}

#[derive(Debug, Clone)]
struct Snapshot {
    doc: Document,
    selection: Selection,
}

/// The headless editing engine. Owns the document tree, the selection,
/// the undo history and the pending caret marks; commands and queries go
/// through the registry by wire name.
pub struct Editor {
    doc: Document,
    selection: Selection,
    registry: CommandRegistry,
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    skip_commit: bool,
    pending_marks: Option<Marks>,
    last_reflected_pt: u32,
    events: Vec<EditorEvent>,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    pub fn new() -> Self {
        let doc = Document::empty();
        let selection = Selection::default();
        let mut editor = Self {
            doc,
            selection,
            registry: CommandRegistry::editor(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            skip_commit: false,
            pending_marks: None,
            last_reflected_pt: DEFAULT_FONT_SIZE_PT,
            events: Vec::new(),
        };
        editor.reset_history();
        editor
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
        self.pending_marks = None;
        self.normalize_selection();
    }

    pub fn take_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn push_event(&mut self, event: EditorEvent) {
        self.events.push(event);
    }

    // === Content ===

    /// Replace the whole document from HTML. Empty or whitespace input
    /// installs the canonical empty paragraph; history is reset to the
    /// loaded state and the caret moves to the start of the first block.
    pub fn set_content(&mut self, body: &str) {
        self.doc = html::parse_document(body);
        self.selection = Selection::default();
        self.pending_marks = None;
        self.normalize();
        self.reset_history();
    }

    /// The canonical inner HTML of the editor root.
    pub fn body_html(&self) -> String {
        html::emit_document(&self.doc)
    }

    // === History ===

    fn reset_history(&mut self) {
        self.undo_stack = vec![Snapshot {
            doc: self.doc.clone(),
            selection: self.selection.clone(),
        }];
        self.redo_stack.clear();
    }

    pub fn stack_sizes(&self) -> (usize, usize) {
        (self.undo_stack.len(), self.redo_stack.len())
    }

    /// Push the current state if it differs from the committed top.
    /// Consecutive entries on the undo stack are therefore always distinct.
    fn commit(&mut self) {
        let differs = self
            .undo_stack
            .last()
            .map(|top| top.doc != self.doc)
            .unwrap_or(true);
        if !differs {
            return;
        }
        self.undo_stack.push(Snapshot {
            doc: self.doc.clone(),
            selection: self.selection.clone(),
        });
        self.redo_stack.clear();
        while self.undo_stack.len() + self.redo_stack.len() > MAX_HISTORY {
            self.undo_stack.remove(0);
        }
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub(crate) fn undo(&mut self) -> bool {
        if self.undo_stack.len() < 2 {
            self.skip_commit = true;
            return false;
        }
        let top = self.undo_stack.pop().expect("non-empty undo stack");
        self.redo_stack.push(top);
        let previous = self.undo_stack.last().expect("undo stack keeps its base");
        self.doc = previous.doc.clone();
        self.selection = previous.selection.clone();
        self.pending_marks = None;
        self.skip_commit = true;
        true
    }

    pub(crate) fn redo(&mut self) -> bool {
        let Some(snapshot) = self.redo_stack.pop() else {
            self.skip_commit = true;
            return false;
        };
        self.doc = snapshot.doc.clone();
        self.selection = snapshot.selection.clone();
        self.undo_stack.push(snapshot);
        self.pending_marks = None;
        self.skip_commit = true;
        true
    }

    // === Command / query dispatch ===

    /// Apply a named command. Unrecognized names are a deliberate no-op:
    /// the engine never raises into the host for them.
    pub fn run_command(
        &mut self,
        name: &str,
        args: Option<&serde_json::Value>,
    ) -> Result<CommandOutcome, CommandError> {
        let Some(handler) = self.registry.command(name) else {
            return Ok(CommandOutcome::Ignored);
        };
        let was_in_table = self.selection_in_table();
        self.skip_commit = false;
        handler(self, args)?;
        self.normalize();
        if !self.skip_commit {
            self.commit();
        }
        self.skip_commit = false;
        // Table toolbar lifecycle: entering a cell surfaces it, leaving
        // dismisses it.
        let now_in_table = self.selection_in_table();
        if now_in_table && !was_in_table {
            self.push_event(EditorEvent::TableClicked);
        } else if was_in_table && !now_in_table {
            self.push_event(EditorEvent::TablesDeactivated);
        }
        Ok(CommandOutcome::Applied)
    }

    fn selection_in_table(&self) -> bool {
        self.doc
            .leaf_block_path(&self.selection.focus.path)
            .map(|path| path.len() > 1)
            .unwrap_or(false)
    }

    pub fn run_query(&mut self, name: &str) -> Result<serde_json::Value, QueryError> {
        let Some(handler) = self.registry.query(name) else {
            return Err(QueryError::new(format!("Unknown query: {name}")));
        };
        handler(self)
    }

    // === Normalization ===

    fn normalize(&mut self) {
        if self.doc.children.is_empty() {
            self.doc = Document::empty();
        }
        normalize_node_list(&mut self.doc.children);
        self.normalize_selection();
    }

    fn normalize_selection(&mut self) {
        self.selection = Selection {
            anchor: self.normalize_point(self.selection.anchor.clone()),
            focus: self.normalize_point(self.selection.focus.clone()),
        };
    }

    /// Clamp a point so it addresses a text leaf at a char boundary. An
    /// unresolvable path snaps to the end of the document root.
    fn normalize_point(&self, point: Point) -> Point {
        if let Some(block_path) = self.doc.leaf_block_path(&point.path) {
            let Some(Node::Element(block)) = self.doc.node_ref(&block_path) else {
                return self.document_end();
            };
            // Point addresses the block itself: descend to its first leaf.
            if block_path == point.path {
                let first_text = block
                    .children
                    .iter()
                    .position(|n| matches!(n, Node::Text(_)))
                    .unwrap_or(0);
                let mut path = block_path;
                path.push(first_text);
                return Point::new(path, 0);
            }
            let child_ix = point.path[block_path.len()].min(block.children.len().saturating_sub(1));
            let mut path = block_path;
            path.push(child_ix);
            let offset = match self.doc.node_ref(&path) {
                Some(Node::Text(t)) => clamp_to_char_boundary(&t.text, point.offset),
                _ => 0,
            };
            return Point::new(path, offset);
        }
        self.document_end()
    }

    pub(crate) fn document_end(&self) -> Point {
        let leaves = self.doc.leaf_blocks();
        let Some((path, block)) = leaves.last() else {
            return Point::document_start();
        };
        let mut text_ix = 0;
        let mut len = 0;
        for (ix, child) in block.children.iter().enumerate() {
            if let Node::Text(t) = child {
                text_ix = ix;
                len = t.text.len();
            }
        }
        let mut path = path.clone();
        path.push(text_ix);
        Point::new(path, len)
    }

    // === Selection geometry ===

    /// Leaf-block index range covered by the selection, with byte offsets
    /// local to the first and last block.
    pub(crate) fn selected_leaf_range(&self) -> SelectedRange {
        let leaves = self.doc.leaf_blocks();
        let (start, end) = self.selection.ordered();
        let start_block = self.doc.leaf_block_path(&start.path);
        let end_block = self.doc.leaf_block_path(&end.path);

        let locate = |block: &Option<Path>| -> usize {
            block
                .as_ref()
                .and_then(|p| leaves.iter().position(|(lp, _)| lp == p))
                .unwrap_or(0)
        };

        let start_ix = locate(&start_block);
        let end_ix = locate(&end_block).max(start_ix);
        SelectedRange {
            start_block: start_ix,
            end_block: end_ix,
            start_offset: self.block_local_offset(start),
            end_offset: self.block_local_offset(end),
        }
    }

    fn block_local_offset(&self, point: &Point) -> usize {
        let Some(block_path) = self.doc.leaf_block_path(&point.path) else {
            return 0;
        };
        let Some(Node::Element(block)) = self.doc.node_ref(&block_path) else {
            return 0;
        };
        if block_path == point.path {
            return 0;
        }
        let child_ix = point.path[block_path.len()];
        let mut acc = 0;
        for (ix, child) in block.children.iter().enumerate() {
            if ix == child_ix {
                return acc + point.offset;
            }
            if let Node::Text(t) = child {
                acc += t.text.len();
            }
        }
        acc
    }

    fn point_at_block_offset(&self, block_path: &[usize], offset: usize) -> Point {
        let Some(Node::Element(block)) = self.doc.node_ref(block_path) else {
            return self.document_end();
        };
        let mut acc = 0;
        let mut last_text: Option<(usize, usize)> = None;
        for (ix, child) in block.children.iter().enumerate() {
            if let Node::Text(t) = child {
                if offset <= acc + t.text.len() {
                    let mut path = block_path.to_vec();
                    path.push(ix);
                    return Point::new(path, clamp_to_char_boundary(&t.text, offset - acc));
                }
                acc += t.text.len();
                last_text = Some((ix, t.text.len()));
            }
        }
        let (ix, len) = last_text.unwrap_or((0, 0));
        let mut path = block_path.to_vec();
        path.push(ix);
        Point::new(path, len)
    }

    /// Iterate the selected leaf blocks with their local byte ranges.
    pub(crate) fn for_each_selected_block(&mut self, mut f: impl FnMut(&mut ElementNode, Range<usize>)) {
        let range = self.selected_leaf_range();
        let leaves: Vec<Path> = self.doc.leaf_blocks().into_iter().map(|(p, _)| p).collect();
        for ix in range.start_block..=range.end_block.min(leaves.len().saturating_sub(1)) {
            let Some(Node::Element(block)) = self.doc.node_mut(&leaves[ix]) else {
                continue;
            };
            let len = block.text_len();
            let local = Range {
                start: if ix == range.start_block {
                    range.start_offset.min(len)
                } else {
                    0
                },
                end: if ix == range.end_block {
                    range.end_offset.min(len)
                } else {
                    len
                },
            };
            f(block, local);
        }
    }

    // === Marks ===

    pub(crate) fn marks_before_caret(&self) -> Marks {
        let point = &self.selection.focus;
        let Some(Node::Text(node)) = self.doc.node_ref(&point.path) else {
            return Marks::default();
        };
        if point.offset == 0 && point.path.last().copied().unwrap_or(0) > 0 {
            let mut prev = point.path.clone();
            *prev.last_mut().expect("non-empty path") -= 1;
            if let Some(Node::Text(prev_node)) = self.doc.node_ref(&prev) {
                if !prev_node.text.is_empty() {
                    return prev_node.marks.clone();
                }
            }
        }
        node.marks.clone()
    }

    pub(crate) fn effective_marks(&self) -> Marks {
        self.pending_marks
            .clone()
            .unwrap_or_else(|| self.marks_before_caret())
    }

    pub(crate) fn set_pending_marks(&mut self, marks: Marks) {
        self.pending_marks = Some(marks);
    }

    /// Ranged selections report a mark active only when every selected
    /// character carries it; collapsed selections consult the caret marks.
    pub(crate) fn is_mark_active(&self, get: impl Fn(&Marks) -> bool) -> bool {
        if self.selection.is_collapsed() {
            return get(&self.effective_marks());
        }

        let range = self.selected_leaf_range();
        let leaves = self.doc.leaf_blocks();
        let mut enabled = true;
        let mut saw_text = false;
        for ix in range.start_block..=range.end_block.min(leaves.len().saturating_sub(1)) {
            let (_, block) = &leaves[ix];
            let len = block.text_len();
            let local_start = if ix == range.start_block { range.start_offset.min(len) } else { 0 };
            let local_end = if ix == range.end_block { range.end_offset.min(len) } else { len };

            let mut cursor = 0;
            for child in &block.children {
                let Node::Text(t) = child else { continue };
                let node_end = cursor + t.text.len();
                let overlap_start = local_start.max(cursor);
                let overlap_end = local_end.min(node_end);
                if overlap_start < overlap_end {
                    saw_text = true;
                    if !get(&t.marks) {
                        enabled = false;
                    }
                }
                cursor = node_end;
            }
        }
        enabled && saw_text
    }

    pub(crate) fn update_marks_in_selection(&mut self, update: impl Fn(&mut Marks)) {
        if self.selection.is_collapsed() {
            let mut marks = self.effective_marks();
            update(&mut marks);
            self.pending_marks = Some(marks);
            return;
        }
        self.for_each_selected_block(|block, local| {
            apply_marks_in_block(block, local, &update);
        });
    }

    // === Text editing primitives ===

    pub(crate) fn insert_text(&mut self, text: &str) {
        if !self.selection.is_collapsed() {
            self.delete_selection_contents();
        }
        let marks = self.effective_marks();
        let text = text.replace("\r\n", "\n").replace('\r', "\n");

        let point = self.selection.focus.clone();
        let inserted = self.insert_text_at(&point, &text, &marks);
        if !inserted {
            // Detached range: snap to the end of the root and retry once.
            let end = self.document_end();
            self.selection = Selection::collapsed(end.clone());
            self.insert_text_at(&end, &text, &marks);
        }
        self.pending_marks = None;
    }

    fn insert_text_at(&mut self, point: &Point, text: &str, marks: &Marks) -> bool {
        let Some(block_path) = self.doc.leaf_block_path(&point.path) else {
            return false;
        };
        let base = self.block_local_offset(point);
        let Some(Node::Element(block)) = self.doc.node_mut(&block_path) else {
            return false;
        };
        insert_marked_text(block, base, text, marks);
        block.normalize_inlines();
        let caret = self.point_at_block_offset(&block_path, base + text.len());
        self.selection = Selection::collapsed(caret);
        true
    }

    pub(crate) fn delete_selection_contents(&mut self) {
        if self.selection.is_collapsed() {
            return;
        }
        let range = self.selected_leaf_range();
        let leaves: Vec<Path> = self.doc.leaf_blocks().into_iter().map(|(p, _)| p).collect();
        if leaves.is_empty() {
            return;
        }
        let start_path = leaves[range.start_block].clone();
        let end_block = range.end_block.min(leaves.len() - 1);

        if range.start_block == end_block {
            if let Some(Node::Element(block)) = self.doc.node_mut(&start_path) {
                remove_text_range(block, range.start_offset..range.end_offset);
                block.normalize_inlines();
            }
        } else {
            let end_path = leaves[end_block].clone();
            let same_parent = start_path.len() == 1 && end_path.len() == 1;

            // Trim the tail of the first block and the head of the last.
            let mut tail: Vec<Node> = Vec::new();
            if let Some(Node::Element(block)) = self.doc.node_mut(&end_path) {
                remove_text_range(block, 0..range.end_offset);
                block.normalize_inlines();
                tail = block.children.clone();
            }
            if let Some(Node::Element(block)) = self.doc.node_mut(&start_path) {
                let len = block.text_len();
                remove_text_range(block, range.start_offset..len);
                if same_parent {
                    block.children.extend(tail);
                }
                block.normalize_inlines();
            }
            if same_parent {
                // Drop the now-merged trailing blocks.
                let from = start_path[0] + 1;
                let to = (end_path[0] + 1).min(self.doc.children.len());
                if from < to {
                    self.doc.children.drain(from..to);
                }
            }
        }

        let caret = self.point_at_block_offset(&start_path, range.start_offset);
        self.selection = Selection::collapsed(caret);
    }

    pub(crate) fn insert_paragraph(&mut self) {
        if !self.selection.is_collapsed() {
            self.delete_selection_contents();
        }
        let point = self.selection.focus.clone();
        let Some(block_path) = self.doc.leaf_block_path(&point.path) else {
            return;
        };
        // Splitting inside table cells is not supported; the caret stays put.
        if block_path.len() != 1 {
            return;
        }
        let offset = self.block_local_offset(&point);
        let row = block_path[0];
        let Some(Node::Element(block)) = self.doc.node_mut(&block_path) else {
            return;
        };

        let successor_kind = split_successor_kind(&block.kind);
        let mut rest = split_block_at(block, offset);
        block.normalize_inlines();

        let mut attrs = block.attrs.clone();
        let kind_for_rest = if block.is_text_empty() && rest.is_empty() {
            // Enter on an empty heading produces a paragraph after it.
            successor_kind.clone()
        } else if offset == 0 {
            block.kind.clone()
        } else {
            successor_kind.clone()
        };
        if kind_for_rest != kind::HEADING {
            attrs.remove("level");
        }
        if rest.is_empty() {
            rest.push(Node::Text(TextNode::default()));
        }
        let mut new_block = ElementNode {
            kind: kind_for_rest,
            attrs,
            children: rest,
        };
        new_block.normalize_inlines();
        self.doc.children.insert(row + 1, Node::Element(new_block));
        let caret = self.point_at_block_offset(&[row + 1], 0);
        self.selection = Selection::collapsed(caret);
    }

    pub(crate) fn delete_backward(&mut self) {
        if !self.selection.is_collapsed() {
            self.delete_selection_contents();
            return;
        }
        let point = self.selection.focus.clone();
        let Some(block_path) = self.doc.leaf_block_path(&point.path) else {
            return;
        };
        let offset = self.block_local_offset(&point);
        if offset > 0 {
            let Some(Node::Element(block)) = self.doc.node_mut(&block_path) else {
                return;
            };
            let text = block.to_plain_text();
            let prev = previous_char_boundary(&text, offset);
            remove_text_range(block, prev..offset);
            block.normalize_inlines();
            let caret = self.point_at_block_offset(&block_path, prev);
            self.selection = Selection::collapsed(caret);
            return;
        }

        // At block start: a list item demotes to a paragraph first, then
        // blocks merge with their previous top-level sibling.
        if block_path.len() != 1 {
            return;
        }
        let row = block_path[0];
        if let Some(Node::Element(block)) = self.doc.node_mut(&block_path) {
            if block.kind == kind::LIST_ITEM {
                block.kind = kind::PARAGRAPH.to_string();
                block.attrs.remove("list_type");
                return;
            }
        }
        if row == 0 {
            return;
        }
        let prev_path = vec![row - 1];
        let Some(Node::Element(prev)) = self.doc.node_ref(&prev_path) else {
            // Previous sibling is a void (image, divider): remove it.
            if matches!(self.doc.children.get(row - 1), Some(Node::Void(_))) {
                self.doc.children.remove(row - 1);
            }
            return;
        };
        if !prev.is_leaf_block() {
            self.doc.children.remove(row - 1);
            self.push_event(EditorEvent::TableDeleted);
            return;
        }
        let prev_len = prev.text_len();
        let Some(Node::Element(current)) = self.doc.node_ref(&block_path) else {
            return;
        };
        let moved = current.children.clone();
        if let Some(Node::Element(prev)) = self.doc.node_mut(&prev_path) {
            prev.children.extend(moved);
            prev.normalize_inlines();
        }
        self.doc.children.remove(row);
        let caret = self.point_at_block_offset(&prev_path, prev_len);
        self.selection = Selection::collapsed(caret);
    }

    pub(crate) fn insert_block_after_current(&mut self, node: Node) -> usize {
        let row = self
            .doc
            .leaf_block_path(&self.selection.focus.path)
            .map(|p| p[0])
            .unwrap_or_else(|| self.doc.children.len().saturating_sub(1));
        let at = (row + 1).min(self.doc.children.len());
        self.doc.children.insert(at, node);
        at
    }

    /// Insert a zero-width space carrying `marks` and leave the caret just
    /// after it, so subsequent typing adopts the marks.
    pub(crate) fn insert_zwsp_anchor(&mut self, marks: Marks) {
        self.set_pending_marks(marks);
        self.insert_text(&crate::ZWSP.to_string());
    }

    /// Splice parsed HTML at the selection. A fragment consisting of one
    /// plain block is inserted inline at the caret; anything else is
    /// inserted as blocks after the current one.
    pub(crate) fn insert_html_fragment(&mut self, fragment: &str) {
        if !self.selection.is_collapsed() {
            self.delete_selection_contents();
        }
        let nodes = html::parse_fragment(fragment);
        if nodes.is_empty() {
            return;
        }

        let inline_only = nodes.len() == 1
            && matches!(
                &nodes[0],
                Node::Element(el)
                    if el.kind == kind::PARAGRAPH
                        && el.attrs.is_empty()
                        && el.children.iter().all(|c| matches!(c, Node::Text(_)))
            );
        if inline_only {
            let Node::Element(el) = &nodes[0] else {
                unreachable!();
            };
            for child in &el.children {
                let Node::Text(t) = child else { continue };
                self.set_pending_marks(t.marks.clone());
                self.insert_text(&t.text);
            }
            return;
        }

        let mut at = self
            .doc
            .leaf_block_path(&self.selection.focus.path)
            .map(|p| p[0] + 1)
            .unwrap_or(self.doc.children.len());
        // Inserting into an empty document replaces the placeholder block.
        if self.doc.children.len() == 1 {
            if let Some(Node::Element(first)) = self.doc.children.first() {
                if first.kind == kind::PARAGRAPH && first.is_text_empty() {
                    self.doc.children.clear();
                    at = 0;
                }
            }
        }
        let last = at + nodes.len() - 1;
        for (ix, node) in nodes.into_iter().enumerate() {
            self.doc.children.insert(at + ix, node);
        }
        let caret_row = last.min(self.doc.children.len().saturating_sub(1));
        if let Some(path) = self.doc.leaf_block_path(&[caret_row]) {
            let end = {
                let Some(Node::Element(block)) = self.doc.node_ref(&path) else {
                    return;
                };
                block.text_len()
            };
            let caret = self.point_at_block_offset(&path, end);
            self.selection = Selection::collapsed(caret);
        } else {
            self.selection = Selection::collapsed(self.document_end());
        }
    }

    pub(crate) fn insert_image(&mut self, src: &str, alt: Option<&str>) {
        let Node::Void(mut image) = Node::image(src) else {
            unreachable!();
        };
        if let Some(alt) = alt {
            image.attrs.insert("alt".to_string(), serde_json::json!(alt));
        }
        let at = self.insert_block_after_current(Node::Void(image));
        if at + 1 >= self.doc.children.len() {
            self.doc.children.push(Node::paragraph(""));
        }
        let caret = self.point_at_block_offset(&[at + 1], 0);
        self.selection = Selection::collapsed(caret);
    }

    pub(crate) fn insert_table(
        &mut self,
        rows: usize,
        cols: usize,
        has_header: bool,
        border: bool,
        width: Option<u32>,
    ) {
        let rows = rows.clamp(1, 100);
        let cols = cols.clamp(1, 25);
        let mut table = ElementNode::new(kind::TABLE);
        table.attrs = table_attrs(border, width);
        for row_ix in 0..rows {
            let mut row = ElementNode::new(kind::TABLE_ROW);
            for _ in 0..cols {
                let mut cell = ElementNode::new(kind::TABLE_CELL);
                if has_header && row_ix == 0 {
                    cell.set_attr("header", serde_json::json!(true));
                }
                cell.children = vec![Node::paragraph("")];
                row.children.push(Node::Element(cell));
            }
            table.children.push(Node::Element(row));
        }

        let at = self.insert_block_after_current(Node::Element(table));
        if at + 1 >= self.doc.children.len() {
            self.doc.children.push(Node::paragraph(""));
        }
        // The caret lands in the first cell; the enter-table transition
        // raises the tableClicked event.
        let caret = self.point_at_block_offset(&[at, 0, 0, 0], 0);
        self.selection = Selection::collapsed(caret);
    }

    /// Update an attribute on the image nearest to the caret, scanning
    /// backward from the current block.
    pub(crate) fn set_image_attr(&mut self, name: &str, value: &str) -> bool {
        let row = self
            .doc
            .leaf_block_path(&self.selection.focus.path)
            .map(|p| p[0])
            .unwrap_or(0)
            .min(self.doc.children.len().saturating_sub(1));
        for ix in (0..=row).rev() {
            if let Some(Node::Void(image)) = self.doc.children.get_mut(ix) {
                if image.kind == kind::IMAGE {
                    image
                        .attrs
                        .insert(name.to_string(), serde_json::json!(value));
                    return true;
                }
            }
        }
        false
    }

    // === Block formatting ===

    pub(crate) fn set_block_kind(&mut self, new_kind: &str, level: Option<u8>) {
        let range = self.selected_leaf_range();
        let leaves: Vec<Path> = self.doc.leaf_blocks().into_iter().map(|(p, _)| p).collect();
        for ix in range.start_block..=range.end_block.min(leaves.len().saturating_sub(1)) {
            let Some(Node::Element(block)) = self.doc.node_mut(&leaves[ix]) else {
                continue;
            };
            block.kind = new_kind.to_string();
            block.attrs.remove("list_type");
            match level {
                Some(level) => block.set_attr("level", serde_json::json!(level)),
                None => {
                    block.attrs.remove("level");
                }
            }
        }
    }

    /// Toggling a list kind deactivates the other; toggling the active
    /// kind restores paragraphs.
    pub(crate) fn toggle_list(&mut self, list_type: &str) {
        let range = self.selected_leaf_range();
        let leaves: Vec<Path> = self.doc.leaf_blocks().into_iter().map(|(p, _)| p).collect();
        let span = range.start_block..=range.end_block.min(leaves.len().saturating_sub(1));

        let all_match = span.clone().all(|ix| {
            matches!(
                self.doc.node_ref(&leaves[ix]),
                Some(Node::Element(el))
                    if el.kind == kind::LIST_ITEM && el.attr_str("list_type") == Some(list_type)
            )
        });
        for ix in span {
            let Some(Node::Element(block)) = self.doc.node_mut(&leaves[ix]) else {
                continue;
            };
            if all_match {
                block.kind = kind::PARAGRAPH.to_string();
                block.attrs.remove("list_type");
            } else {
                block.kind = kind::LIST_ITEM.to_string();
                block.attrs.remove("level");
                block.set_attr("list_type", serde_json::json!(list_type));
            }
        }
    }

    pub(crate) fn set_alignment(&mut self, alignment: Alignment) {
        let range = self.selected_leaf_range();
        let leaves: Vec<Path> = self.doc.leaf_blocks().into_iter().map(|(p, _)| p).collect();
        for ix in range.start_block..=range.end_block.min(leaves.len().saturating_sub(1)) {
            let Some(Node::Element(block)) = self.doc.node_mut(&leaves[ix]) else {
                continue;
            };
            match alignment.as_attr() {
                Some(value) => block.set_attr("align", serde_json::json!(value)),
                None => {
                    block.attrs.remove("align");
                }
            }
        }
    }

    pub(crate) fn adjust_indent(&mut self, delta: i8) {
        const MAX_INDENT: i64 = 8;
        let range = self.selected_leaf_range();
        let leaves: Vec<Path> = self.doc.leaf_blocks().into_iter().map(|(p, _)| p).collect();
        for ix in range.start_block..=range.end_block.min(leaves.len().saturating_sub(1)) {
            let Some(Node::Element(block)) = self.doc.node_mut(&leaves[ix]) else {
                continue;
            };
            let current = block.attr_u64("indent").unwrap_or(0) as i64;
            let next = (current + delta as i64).clamp(0, MAX_INDENT);
            if next == 0 {
                block.attrs.remove("indent");
            } else {
                block.set_attr("indent", serde_json::json!(next));
            }
        }
    }

    // === State reflection ===

    /// True when every selected leaf block is a list item of `list_type`.
    pub fn is_list_active(&self, list_type: &str) -> bool {
        let range = self.selected_leaf_range();
        let leaves = self.doc.leaf_blocks();
        if leaves.is_empty() {
            return false;
        }
        (range.start_block..=range.end_block.min(leaves.len() - 1)).all(|ix| {
            let (_, block) = &leaves[ix];
            block.kind == kind::LIST_ITEM && block.attr_str("list_type") == Some(list_type)
        })
    }

    pub fn formatting_state(&mut self) -> FormattingState {
        let leaves = self.doc.leaf_blocks();
        let range = self.selected_leaf_range();
        let block = leaves.get(range.start_block).map(|(_, el)| *el);

        let marks = self.effective_marks();
        let (block_format, list_kind, alignment) = match block {
            Some(block) => (
                block_format_for(block),
                list_kind_for(block),
                Alignment::from_attr(block.attr_str("align")),
            ),
            None => ("p".to_string(), Default::default(), Alignment::Left),
        };

        let font_size_pt = marks.font_size_pt.unwrap_or(self.last_reflected_pt);
        self.last_reflected_pt = font_size_pt;

        FormattingState {
            bold: self.is_mark_active(|m| m.bold),
            italic: self.is_mark_active(|m| m.italic),
            underline: self.is_mark_active(|m| m.underline),
            strikethrough: self.is_mark_active(|m| m.strikethrough),
            block_format,
            font_family: marks
                .font_family
                .unwrap_or_else(|| crate::font::DEFAULT_FONT_FAMILY.to_string()),
            font_size_pt,
            list_kind,
            alignment,
        }
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SelectedRange {
    pub start_block: usize,
    pub end_block: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

fn normalize_node_list(nodes: &mut Vec<Node>) {
    for node in nodes.iter_mut() {
        if let Node::Element(el) = node {
            if el.is_leaf_block() {
                el.normalize_inlines();
            } else {
                normalize_node_list(&mut el.children);
            }
        }
    }
}

fn split_successor_kind(kind_str: &str) -> String {
    match kind_str {
        kind::HEADING => kind::PARAGRAPH.to_string(),
        other => other.to_string(),
    }
}

/// Split a block's inline children at a byte offset, returning the tail.
fn split_block_at(block: &mut ElementNode, offset: usize) -> Vec<Node> {
    let mut head: Vec<Node> = Vec::new();
    let mut tail: Vec<Node> = Vec::new();
    let mut cursor = 0;
    for node in block.children.drain(..) {
        match node {
            Node::Text(t) => {
                let end = cursor + t.text.len();
                if end <= offset {
                    cursor = end;
                    head.push(Node::Text(t));
                } else if cursor >= offset {
                    cursor = end;
                    tail.push(Node::Text(t));
                } else {
                    let split = clamp_to_char_boundary(&t.text, offset - cursor);
                    let (left, right) = t.text.split_at(split);
                    head.push(Node::Text(TextNode {
                        text: left.to_string(),
                        marks: t.marks.clone(),
                    }));
                    tail.push(Node::Text(TextNode {
                        text: right.to_string(),
                        marks: t.marks,
                    }));
                    cursor = end;
                }
            }
            other => {
                if cursor <= offset {
                    head.push(other);
                } else {
                    tail.push(other);
                }
            }
        }
    }
    block.children = head;
    tail
}

fn insert_marked_text(block: &mut ElementNode, offset: usize, text: &str, marks: &Marks) {
    let tail = split_block_at(block, offset);
    block.children.push(Node::Text(TextNode {
        text: text.to_string(),
        marks: marks.clone(),
    }));
    block.children.extend(tail);
}

fn remove_text_range(block: &mut ElementNode, range: Range<usize>) {
    if range.start >= range.end {
        return;
    }
    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0;
    for node in block.children.drain(..) {
        match node {
            Node::Text(t) => {
                let end = cursor + t.text.len();
                let keep_left = range.start.max(cursor).min(end);
                let keep_right = range.end.max(cursor).min(end);
                let mut kept = String::new();
                kept.push_str(&t.text[..keep_left - cursor]);
                kept.push_str(&t.text[keep_right - cursor..]);
                if !kept.is_empty() {
                    out.push(Node::Text(TextNode {
                        text: kept,
                        marks: t.marks,
                    }));
                }
                cursor = end;
            }
            other => out.push(other),
        }
    }
    block.children = out;
}

pub(crate) fn apply_marks_in_block(
    block: &mut ElementNode,
    range: Range<usize>,
    update: impl Fn(&mut Marks),
) {
    if range.start >= range.end {
        return;
    }
    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0;
    for node in block.children.drain(..) {
        match node {
            Node::Text(t) => {
                let end = cursor + t.text.len();
                let overlap_start = range.start.max(cursor).min(end);
                let overlap_end = range.end.max(cursor).min(end);
                if overlap_start >= overlap_end {
                    out.push(Node::Text(t));
                } else {
                    let left = &t.text[..overlap_start - cursor];
                    let middle = &t.text[overlap_start - cursor..overlap_end - cursor];
                    let right = &t.text[overlap_end - cursor..];
                    if !left.is_empty() {
                        out.push(Node::Text(TextNode {
                            text: left.to_string(),
                            marks: t.marks.clone(),
                        }));
                    }
                    let mut marks = t.marks.clone();
                    update(&mut marks);
                    out.push(Node::Text(TextNode {
                        text: middle.to_string(),
                        marks,
                    }));
                    if !right.is_empty() {
                        out.push(Node::Text(TextNode {
                            text: right.to_string(),
                            marks: t.marks,
                        }));
                    }
                }
                cursor = end;
            }
            other => out.push(other),
        }
    }
    block.children = out;
    block.normalize_inlines();
}

fn previous_char_boundary(s: &str, offset: usize) -> usize {
    let mut ix = offset.min(s.len()).saturating_sub(1);
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

pub(crate) fn table_attrs(border: bool, width: Option<u32>) -> Attrs {
    let mut attrs = Attrs::default();
    if border {
        attrs.insert("border".to_string(), serde_json::json!(1));
    }
    if let Some(width) = width {
        attrs.insert("width".to_string(), serde_json::json!(width));
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor_with(body: &str) -> Editor {
        let mut editor = Editor::new();
        editor.set_content(body);
        editor
    }

    #[test]
    fn starts_with_canonical_empty_paragraph() {
        let editor = Editor::new();
        assert_eq!(editor.doc().children.len(), 1);
        assert!(matches!(
            &editor.doc().children[0],
            Node::Element(el) if el.kind == kind::PARAGRAPH && el.is_text_empty()
        ));
    }

    #[test]
    fn set_content_resets_history() {
        let mut editor = editor_with("<p>one</p>");
        editor
            .run_command("insertText", Some(&serde_json::json!({ "text": "x" })))
            .unwrap();
        assert!(editor.can_undo());
        editor.set_content("<p>two</p>");
        assert!(!editor.can_undo());
        assert!(!editor.can_redo());
        assert_eq!(editor.stack_sizes(), (1, 0));
    }

    #[test]
    fn insert_text_advances_caret() {
        let mut editor = Editor::new();
        editor.insert_text("hi");
        assert_eq!(editor.doc().children.len(), 1);
        let Node::Element(block) = &editor.doc().children[0] else {
            panic!("expected block");
        };
        assert_eq!(block.to_plain_text(), "hi");
        assert_eq!(editor.selection().focus.offset, 2);
    }

    #[test]
    fn undo_restores_previous_snapshot() {
        let mut editor = editor_with("<p>base</p>");
        editor
            .run_command("insertText", Some(&serde_json::json!({ "text": "!" })))
            .unwrap();
        assert!(editor.body_html().contains("!base"));
        editor.run_command("undo", None).unwrap();
        assert!(editor.body_html().contains("base"));
        assert!(!editor.body_html().contains("!base"));
        editor.run_command("redo", None).unwrap();
        assert!(editor.body_html().contains("!base"));
    }

    #[test]
    fn history_skips_identical_states() {
        let mut editor = editor_with("<p>abc</p>");
        let before = editor.stack_sizes();
        // Aligning left on an unaligned paragraph changes nothing.
        editor.run_command("justifyLeft", None).unwrap();
        assert_eq!(editor.stack_sizes(), before);
    }

    #[test]
    fn history_is_bounded() {
        let mut editor = Editor::new();
        for ix in 0..150 {
            editor
                .run_command(
                    "insertText",
                    Some(&serde_json::json!({ "text": format!("{ix}") })),
                )
                .unwrap();
        }
        let (undo, redo) = editor.stack_sizes();
        assert!(undo + redo <= 100);
    }

    #[test]
    fn undo_redo_undo_is_stable() {
        let mut editor = editor_with("<p>seed</p>");
        editor
            .run_command("insertText", Some(&serde_json::json!({ "text": "A" })))
            .unwrap();
        editor
            .run_command("insertText", Some(&serde_json::json!({ "text": "B" })))
            .unwrap();
        editor.run_command("undo", None).unwrap();
        let after_undo = editor.body_html();
        editor.run_command("redo", None).unwrap();
        editor.run_command("undo", None).unwrap();
        assert_eq!(editor.body_html(), after_undo);
    }

    #[test]
    fn unknown_command_is_a_noop() {
        let mut editor = editor_with("<p>x</p>");
        let before = editor.body_html();
        let outcome = editor.run_command("transmogrify", None).unwrap();
        assert_eq!(outcome, CommandOutcome::Ignored);
        assert_eq!(editor.body_html(), before);
    }

    #[test]
    fn delete_backward_merges_blocks() {
        let mut editor = editor_with("<p>ab</p><p>cd</p>");
        let caret = editor.point_at_block_offset(&[1], 0);
        editor.set_selection(Selection::collapsed(caret));
        editor.run_command("deleteBackward", None).unwrap();
        assert_eq!(editor.doc().children.len(), 1);
        let Node::Element(block) = &editor.doc().children[0] else {
            panic!("expected block");
        };
        assert_eq!(block.to_plain_text(), "abcd");
    }

    #[test]
    fn enter_on_empty_document_adds_paragraph_and_moves_caret() {
        let mut editor = Editor::new();
        editor.run_command("insertParagraph", None).unwrap();
        assert_eq!(editor.doc().children.len(), 2);
        assert_eq!(editor.selection().focus.path[0], 1);
        assert_eq!(editor.selection().focus.offset, 0);
    }

    #[test]
    fn enter_after_heading_produces_paragraph() {
        let mut editor = editor_with("<h1>Title</h1>");
        let caret = editor.point_at_block_offset(&[0], 5);
        editor.set_selection(Selection::collapsed(caret));
        editor.run_command("insertParagraph", None).unwrap();
        assert!(matches!(
            &editor.doc().children[1],
            Node::Element(el) if el.kind == kind::PARAGRAPH
        ));
    }

    #[test]
    fn selection_snaps_to_document_end_when_detached() {
        let mut editor = editor_with("<p>ok</p>");
        editor.selection = Selection::collapsed(Point::new(vec![9, 0], 4));
        editor.insert_text("!");
        let Node::Element(block) = &editor.doc().children[0] else {
            panic!("expected block");
        };
        assert_eq!(block.to_plain_text(), "ok!");
    }
}
