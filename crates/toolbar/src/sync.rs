use penmark_editor_core::{
    Alignment, FONT_SIZE_LADDER, FormattingState, ListKind, nearest_ladder_size,
};
use tracing::warn;

use crate::mirror::{ComboMirror, DropdownMirror, ToggleMirror};

/// Block dropdown entries; index 0 is `Normal` and doubles as the sink
/// for unknown formats.
pub const BLOCK_FORMATS: &[(&str, &str)] = &[
    ("p", "Normal"),
    ("h1", "Heading 1"),
    ("h2", "Heading 2"),
    ("h3", "Heading 3"),
    ("h4", "Heading 4"),
    ("h5", "Heading 5"),
    ("h6", "Heading 6"),
    ("blockquote", "Blockquote"),
    ("pre", "Preformatted"),
];

/// What happened to an incoming snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Applied,
    /// Older than one already applied; dropped.
    Stale,
    /// Unparseable payload; the caller should request a fresh query.
    Malformed,
}

/// Host-side mirrors of the formatting toolbar. Never a source of truth:
/// it writes snapshots into widgets and nothing else.
pub struct ToolbarSync {
    pub bold: ToggleMirror,
    pub italic: ToggleMirror,
    pub underline: ToggleMirror,
    pub strikethrough: ToggleMirror,
    pub list_unordered: ToggleMirror,
    pub list_ordered: ToggleMirror,
    pub align_left: ToggleMirror,
    pub align_center: ToggleMirror,
    pub align_right: ToggleMirror,
    pub align_justify: ToggleMirror,
    pub block_format: DropdownMirror,
    pub font_family: ComboMirror,
    pub font_size: DropdownMirror,
    known_families: Vec<String>,
    last_seq: u64,
}

impl ToolbarSync {
    pub fn new(known_families: Vec<String>) -> Self {
        let blocks = BLOCK_FORMATS
            .iter()
            .map(|(_, label)| label.to_string())
            .collect();
        let sizes = FONT_SIZE_LADDER.iter().map(|s| s.to_string()).collect();
        Self {
            bold: ToggleMirror::new("bold"),
            italic: ToggleMirror::new("italic"),
            underline: ToggleMirror::new("underline"),
            strikethrough: ToggleMirror::new("strikethrough"),
            list_unordered: ToggleMirror::new("list-unordered"),
            list_ordered: ToggleMirror::new("list-ordered"),
            align_left: ToggleMirror::new("align-left"),
            align_center: ToggleMirror::new("align-center"),
            align_right: ToggleMirror::new("align-right"),
            align_justify: ToggleMirror::new("align-justify"),
            block_format: DropdownMirror::new("block-format", blocks),
            font_family: ComboMirror::new("font-family", ""),
            font_size: DropdownMirror::new("font-size", sizes),
            known_families,
            last_seq: 0,
        }
    }

    /// Apply a `selectionChanged` snapshot payload. Stale and malformed
    /// snapshots are dropped (the latter asks for a refresh upstream).
    pub fn apply_snapshot(&mut self, seq: u64, payload: &str) -> SnapshotOutcome {
        if seq <= self.last_seq {
            return SnapshotOutcome::Stale;
        }
        let state: FormattingState = match serde_json::from_str(payload) {
            Ok(state) => state,
            Err(err) => {
                warn!(%err, "malformed formatting state; requesting refresh");
                return SnapshotOutcome::Malformed;
            }
        };
        self.last_seq = seq;
        self.apply_state(&state);
        SnapshotOutcome::Applied
    }

    pub fn apply_state(&mut self, state: &FormattingState) {
        self.bold.set_programmatic(state.bold);
        self.italic.set_programmatic(state.italic);
        self.underline.set_programmatic(state.underline);
        self.strikethrough.set_programmatic(state.strikethrough);

        self.list_unordered
            .set_programmatic(state.list_kind == ListKind::Unordered);
        self.list_ordered
            .set_programmatic(state.list_kind == ListKind::Ordered);

        self.set_alignment(state.alignment);

        let block_ix = BLOCK_FORMATS
            .iter()
            .position(|(tag, _)| *tag == state.block_format)
            .unwrap_or(0);
        self.block_format.set_programmatic(block_ix);

        match match_font_family(&self.known_families, &state.font_family) {
            Some(ix) => {
                let family = self.known_families[ix].clone();
                self.font_family.set_programmatic(family);
            }
            None => {
                // No usable match: keep the previous selection.
            }
        }

        let size = nearest_ladder_size(state.font_size_pt);
        let size_ix = FONT_SIZE_LADDER
            .iter()
            .position(|&s| s == size)
            .unwrap_or(0);
        self.font_size.set_programmatic(size_ix);
    }

    /// Exactly one alignment button is active at any time; "none" lights
    /// up left.
    pub fn set_alignment(&mut self, alignment: Alignment) {
        self.align_left
            .set_programmatic(alignment == Alignment::Left);
        self.align_center
            .set_programmatic(alignment == Alignment::Center);
        self.align_right
            .set_programmatic(alignment == Alignment::Right);
        self.align_justify
            .set_programmatic(alignment == Alignment::Justify);
    }

    pub fn active_alignment(&self) -> Alignment {
        if self.align_center.is_active() {
            Alignment::Center
        } else if self.align_right.is_active() {
            Alignment::Right
        } else if self.align_justify.is_active() {
            Alignment::Justify
        } else {
            Alignment::Left
        }
    }

    pub fn alignment_active_count(&self) -> usize {
        [
            &self.align_left,
            &self.align_center,
            &self.align_right,
            &self.align_justify,
        ]
        .iter()
        .filter(|m| m.is_active())
        .count()
    }
}

/// Match a reported family against the host's font list: exact
/// case-insensitive first, then longest common prefix; no overlap at all
/// means "keep what is selected".
pub fn match_font_family(known: &[String], reported: &str) -> Option<usize> {
    let reported = reported.trim().trim_matches(['"', '\'']);
    if reported.is_empty() {
        return None;
    }
    let lowered = reported.to_lowercase();
    if let Some(ix) = known.iter().position(|k| k.to_lowercase() == lowered) {
        return Some(ix);
    }

    let mut best: Option<(usize, usize)> = None;
    for (ix, candidate) in known.iter().enumerate() {
        let len = common_prefix_len(&candidate.to_lowercase(), &lowered);
        if len == 0 {
            continue;
        }
        if best.map(|(_, best_len)| len > best_len).unwrap_or(true) {
            best = Some((ix, len));
        }
    }
    best.map(|(ix, _)| ix)
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count()
}
