use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use penmark_editor_core::{Editor, EditorEvent, bodies_equivalent};
use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{
    CHANGED_SENTINEL, CONTENT_CHANGED, ChannelEvent, Request, Response, SELECTION_CHANGED,
    TABLE_CLICKED, TABLE_DELETED, TABLES_DEACTIVATED,
};

/// At most one selection snapshot reaches the host per window.
const SELECTION_DEBOUNCE: Duration = Duration::from_millis(150);
/// Content notifications coalesce over a slightly longer window.
const CONTENT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Handle to the engine running on its surface thread. Requests are
/// applied in issue order; responses come back tagged with the request's
/// correlation id.
pub struct SurfaceHandle {
    requests: Sender<Request>,
    responses: Receiver<Response>,
    next_id: u64,
    join: Option<JoinHandle<()>>,
}

impl SurfaceHandle {
    /// Spawn the engine on its own thread. The returned receiver carries
    /// the debounced `contentChanged`/`selectionChanged`/table events.
    pub fn spawn() -> (Self, Receiver<ChannelEvent>) {
        let (request_tx, request_rx) = mpsc::channel::<Request>();
        let (response_tx, response_rx) = mpsc::channel::<Response>();
        let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>();

        let join = std::thread::Builder::new()
            .name("penmark-surface".to_string())
            .spawn(move || {
                SurfaceLoop::new(response_tx, event_tx).run(request_rx);
            })
            .expect("spawn surface thread");

        (
            Self {
                requests: request_tx,
                responses: response_rx,
                next_id: 1,
                join: Some(join),
            },
            event_rx,
        )
    }

    fn roundtrip(&mut self, make: impl FnOnce(u64) -> Request) -> anyhow::Result<Option<Value>> {
        let id = self.next_id;
        self.next_id += 1;
        self.requests
            .send(make(id))
            .context("surface thread is gone")?;
        loop {
            let response = self
                .responses
                .recv()
                .context("surface thread closed the response channel")?;
            if response.id() != id {
                // A response for an abandoned request; drop it.
                continue;
            }
            return match response {
                Response::Ok { value, .. } => Ok(value),
                Response::Err { message, .. } => Err(anyhow!(message)),
            };
        }
    }

    pub fn command(&mut self, name: &str, args: Option<Value>) -> anyhow::Result<()> {
        self.roundtrip(|id| Request::Command {
            id,
            name: name.to_string(),
            args,
        })
        .map(|_| ())
    }

    pub fn query(&mut self, name: &str) -> anyhow::Result<Value> {
        self.roundtrip(|id| Request::Query {
            id,
            name: name.to_string(),
        })?
        .ok_or_else(|| anyhow!("query returned no value"))
    }

    /// Programmatic load; the surface holds the ignore-changes latch for
    /// its duration so no `contentChanged` leaks out.
    pub fn set_content(&mut self, html: &str) -> anyhow::Result<()> {
        self.roundtrip(|id| Request::SetContent {
            id,
            html: html.to_string(),
        })
        .map(|_| ())
    }

    pub fn body_html(&mut self) -> anyhow::Result<String> {
        let value = self
            .roundtrip(|id| Request::GetBody { id })?
            .ok_or_else(|| anyhow!("body query returned no value"))?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("body is not a string"))
    }
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        let _ = self.requests.send(Request::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

struct SurfaceLoop {
    editor: Editor,
    responses: Sender<Response>,
    events: Sender<ChannelEvent>,
    seq: u64,
    ignore_changes: bool,
    last_emitted_body: String,
    pending_content: Option<Instant>,
    pending_selection: Option<Instant>,
}

impl SurfaceLoop {
    fn new(responses: Sender<Response>, events: Sender<ChannelEvent>) -> Self {
        let editor = Editor::new();
        let last_emitted_body = editor.body_html();
        Self {
            editor,
            responses,
            events,
            seq: 0,
            ignore_changes: false,
            last_emitted_body,
            // Prime the reflector once on load.
            pending_selection: Some(Instant::now()),
            pending_content: None,
        }
    }

    fn run(mut self, requests: Receiver<Request>) {
        loop {
            let timeout = self
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::from_secs(3600));
            match requests.recv_timeout(timeout) {
                Ok(Request::Shutdown) => break,
                Ok(request) => self.handle(request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.flush_due();
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.pending_content, self.pending_selection) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    fn handle(&mut self, request: Request) {
        let id = request.id().unwrap_or(0);
        let body_before = self.editor.body_html();
        let result = match request {
            Request::Command { name, args, .. } => {
                debug!(command = %name, "apply");
                self.editor
                    .run_command(&name, args.as_ref())
                    .map(|_| None)
                    .map_err(|err| err.message().to_string())
            }
            Request::Query { name, .. } => self
                .editor
                .run_query(&name)
                .map(Some)
                .map_err(|err| err.message().to_string()),
            Request::SetContent { html, .. } => {
                // Latch held for the rest of this request: programmatic
                // loads never count as content changes.
                self.ignore_changes = true;
                self.editor.set_content(&html);
                self.last_emitted_body = self.editor.body_html();
                Ok(None)
            }
            Request::GetBody { .. } => Ok(Some(Value::String(self.editor.body_html()))),
            Request::Shutdown => return,
        };

        let response = match result {
            Ok(value) => Response::Ok { id, value },
            Err(message) => {
                warn!(%message, "command failed");
                Response::Err { id, message }
            }
        };
        let _ = self.responses.send(response);

        for event in self.editor.take_events() {
            let name = match event {
                EditorEvent::TableClicked => TABLE_CLICKED,
                EditorEvent::TableDeleted => TABLE_DELETED,
                EditorEvent::TablesDeactivated => TABLES_DEACTIVATED,
            };
            self.post(name, name.to_string());
        }

        let body_after = self.editor.body_html();
        if !self.ignore_changes
            && body_after != body_before
            && !bodies_equivalent(&body_after, &self.last_emitted_body)
        {
            self.pending_content
                .get_or_insert(Instant::now() + CONTENT_DEBOUNCE);
        }
        self.ignore_changes = false;
        // Every applied request may move the selection; schedule a snapshot
        // and let the debounce window collapse bursts.
        self.pending_selection
            .get_or_insert(Instant::now() + SELECTION_DEBOUNCE);
    }

    fn flush_due(&mut self) {
        let now = Instant::now();
        if let Some(deadline) = self.pending_content {
            if deadline <= now {
                self.pending_content = None;
                self.last_emitted_body = self.editor.body_html();
                self.post(CONTENT_CHANGED, CHANGED_SENTINEL.to_string());
            }
        }
        if let Some(deadline) = self.pending_selection {
            if deadline <= now {
                self.pending_selection = None;
                let state = self.editor.formatting_state();
                match serde_json::to_string(&state) {
                    Ok(payload) => self.post(SELECTION_CHANGED, payload),
                    Err(err) => warn!(%err, "failed to encode formatting state"),
                }
            }
        }
    }

    fn post(&mut self, name: &str, payload: String) {
        self.seq += 1;
        let _ = self.events.send(ChannelEvent {
            seq: self.seq,
            name: name.to_string(),
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_events(rx: &Receiver<ChannelEvent>, wait: Duration) -> Vec<ChannelEvent> {
        std::thread::sleep(wait);
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn programmatic_load_does_not_emit_content_changed() {
        let (mut surface, events) = SurfaceHandle::spawn();
        surface.set_content("<p>loaded</p>").unwrap();
        let events = drain_events(&events, Duration::from_millis(500));
        assert!(events.iter().all(|e| e.name != CONTENT_CHANGED));
        // The reflector is primed at least once.
        assert!(events.iter().any(|e| e.name == SELECTION_CHANGED));
    }

    #[test]
    fn user_edit_emits_content_changed_once_per_window() {
        let (mut surface, events) = SurfaceHandle::spawn();
        surface.set_content("<p>seed</p>").unwrap();
        for ch in ["a", "b", "c"] {
            surface
                .command("insertText", Some(serde_json::json!({ "text": ch })))
                .unwrap();
        }
        let events = drain_events(&events, Duration::from_millis(700));
        let content: Vec<_> = events.iter().filter(|e| e.name == CONTENT_CHANGED).collect();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0].payload, CHANGED_SENTINEL);
    }

    #[test]
    fn placeholder_only_delta_is_suppressed() {
        let (mut surface, events) = SurfaceHandle::spawn();
        surface.set_content("").unwrap();
        // Pressing Enter in an empty document only shuffles placeholders.
        surface.command("insertParagraph", None).unwrap();
        surface.command("deleteBackward", None).unwrap();
        let events = drain_events(&events, Duration::from_millis(700));
        assert!(events.iter().all(|e| e.name != CONTENT_CHANGED));
    }

    #[test]
    fn selection_snapshots_are_monotone_and_coalesced() {
        let (mut surface, events) = SurfaceHandle::spawn();
        surface.set_content("<p>text</p>").unwrap();
        surface.command("bold", None).unwrap();
        surface.command("italic", None).unwrap();
        let events = drain_events(&events, Duration::from_millis(700));
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted);
        let snapshots: Vec<_> = events
            .iter()
            .filter(|e| e.name == SELECTION_CHANGED)
            .collect();
        assert!(!snapshots.is_empty());
        assert!(snapshots.len() <= 2, "bursts must coalesce: {snapshots:?}");
    }

    #[test]
    fn table_insert_posts_table_clicked() {
        let (mut surface, events) = SurfaceHandle::spawn();
        surface
            .command(
                "insertTable",
                Some(serde_json::json!({ "rows": 2, "cols": 2 })),
            )
            .unwrap();
        let events = drain_events(&events, Duration::from_millis(100));
        assert!(events.iter().any(|e| e.name == TABLE_CLICKED));
    }

    #[test]
    fn body_round_trip_through_surface() {
        let (mut surface, _events) = SurfaceHandle::spawn();
        surface.set_content("<p><b>x</b></p>").unwrap();
        assert_eq!(surface.body_html().unwrap(), "<p><b>x</b></p>");
    }

    #[test]
    fn unknown_command_is_silent() {
        let (mut surface, _events) = SurfaceHandle::spawn();
        surface.set_content("<p>x</p>").unwrap();
        surface.command("definitelyNotACommand", None).unwrap();
        assert_eq!(surface.body_html().unwrap(), "<p>x</p>");
    }
}
