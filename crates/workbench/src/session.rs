use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread::JoinHandle;

use anyhow::Context;
use penmark_channel::{
    CONTENT_CHANGED, ChannelEvent, Dispatcher, SELECTION_CHANGED, SurfaceHandle, TABLE_CLICKED,
    TABLE_DELETED, TABLES_DEACTIVATED,
};
use penmark_convert::{ConverterConfig, TempDirRegistry};
use penmark_doc_io::{DocumentFormat, DocumentOrigin, load_document, save_html};
use penmark_toolbar::{SnapshotOutcome, ToolbarSync};
use tracing::{info, warn};

/// Everything that lives and dies with one open document: the engine
/// surface, the toolbar mirrors, the file handle and modified flag, the
/// conversion temp dirs, and the save-in-flight marker.
pub struct DocumentSession {
    surface: SurfaceHandle,
    events: Receiver<ChannelEvent>,
    pub toolbar: ToolbarSync,
    converter: ConverterConfig,
    registry: TempDirRegistry,
    origin: DocumentOrigin,
    format: Option<DocumentFormat>,
    current_file: Option<PathBuf>,
    title: String,
    modified: bool,
    table_toolbar_visible: bool,
    save_worker: Option<JoinHandle<()>>,
    save_results: Receiver<anyhow::Result<PathBuf>>,
    save_results_tx: mpsc::Sender<anyhow::Result<PathBuf>>,
    pending_save: Option<PathBuf>,
}

impl DocumentSession {
    pub fn new(converter: ConverterConfig) -> Self {
        let (surface, events) = SurfaceHandle::spawn();
        let (save_results_tx, save_results) = mpsc::channel();
        Self {
            surface,
            events,
            toolbar: ToolbarSync::new(default_families()),
            converter,
            registry: TempDirRegistry::new(),
            origin: DocumentOrigin::New,
            format: None,
            current_file: None,
            title: "Untitled".to_string(),
            modified: false,
            table_toolbar_visible: false,
            save_worker: None,
            save_results,
            save_results_tx,
            pending_save: None,
        }
    }

    pub fn surface(&mut self) -> &mut SurfaceHandle {
        &mut self.surface
    }

    pub fn origin(&self) -> DocumentOrigin {
        self.origin
    }

    pub fn format(&self) -> Option<&DocumentFormat> {
        self.format.as_ref()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.current_file.as_deref()
    }

    pub fn table_toolbar_visible(&self) -> bool {
        self.table_toolbar_visible
    }

    /// Open a file into the session. On failure the current document is
    /// untouched and the error is surfaced to the host.
    pub fn open(&mut self, path: &Path) -> anyhow::Result<()> {
        let loaded = load_document(path, &self.converter, &mut self.registry)
            .with_context(|| format!("could not open {}", path.display()))?;
        self.surface.set_content(&loaded.body_html)?;
        self.origin = loaded.origin;
        self.format = Some(loaded.format);
        self.current_file = Some(path.to_path_buf());
        self.title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        self.modified = false;
        info!(path = %path.display(), "document opened");
        Ok(())
    }

    /// Save to the current file (or the given path), off the host thread.
    /// A save requested while one is in flight is coalesced, latest wins.
    pub fn save(&mut self, path: Option<&Path>) -> anyhow::Result<()> {
        let target = path
            .map(Path::to_path_buf)
            .or_else(|| self.current_file.clone())
            .context("no file to save to")?;

        if self.save_worker.is_some() {
            info!(path = %target.display(), "save already in flight; queueing latest");
            self.pending_save = Some(target);
            return Ok(());
        }

        let body = self.surface.body_html()?;
        let title = self.title.clone();
        let tx = self.save_results_tx.clone();
        let worker_path = target.clone();
        self.save_worker = Some(std::thread::spawn(move || {
            let result = save_html(&worker_path, &title, &body)
                .map(|()| worker_path)
                .map_err(anyhow::Error::from);
            let _ = tx.send(result);
        }));
        Ok(())
    }

    /// Drain engine events and save completions; called from the host
    /// loop. Returns the number of events applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            applied += 1;
            match event.name.as_str() {
                CONTENT_CHANGED => {
                    self.modified = true;
                }
                SELECTION_CHANGED => {
                    if self.toolbar.apply_snapshot(event.seq, &event.payload)
                        == SnapshotOutcome::Malformed
                    {
                        // Protocol error: drop the snapshot, ask again.
                        match Dispatcher::query_state(&mut self.surface) {
                            Ok(state) => self.toolbar.apply_state(&state),
                            Err(err) => warn!(%err, "state refresh failed"),
                        }
                    }
                }
                TABLE_CLICKED => {
                    self.table_toolbar_visible = true;
                }
                TABLE_DELETED | TABLES_DEACTIVATED => {
                    self.table_toolbar_visible = false;
                }
                _ => {}
            }
        }

        while let Ok(result) = self.save_results.try_recv() {
            if let Some(worker) = self.save_worker.take() {
                let _ = worker.join();
            }
            match result {
                Ok(path) => {
                    info!(path = %path.display(), "save finished");
                    self.current_file = Some(path);
                    self.modified = false;
                }
                Err(err) => {
                    // Save failures leave the modified flag untouched.
                    warn!(%err, "save failed");
                }
            }
            if let Some(next) = self.pending_save.take() {
                let _ = self.save(Some(&next));
            }
        }
        applied
    }

    /// Block until any in-flight (and queued) save lands.
    pub fn finish_saves(&mut self) {
        while self.save_worker.is_some() {
            if let Ok(result) = self.save_results.recv() {
                if let Some(worker) = self.save_worker.take() {
                    let _ = worker.join();
                }
                if let Ok(path) = result {
                    self.current_file = Some(path);
                    self.modified = false;
                }
                if let Some(next) = self.pending_save.take() {
                    let _ = self.save(Some(&next));
                }
            } else {
                break;
            }
        }
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        // Destruction waits for the save, then tears down conversion
        // temp dirs with the registry.
        self.finish_saves();
        self.registry.clear();
    }
}

fn default_families() -> Vec<String> {
    [
        "Sans",
        "Serif",
        "Monospace",
        "Liberation Serif",
        "Liberation Sans",
        "Liberation Mono",
        "DejaVu Sans",
        "DejaVu Serif",
        "DejaVu Sans Mono",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn no_converter() -> ConverterConfig {
        ConverterConfig {
            binary: None,
            ..ConverterConfig::default()
        }
    }

    fn settle(session: &mut DocumentSession) {
        std::thread::sleep(Duration::from_millis(700));
        session.pump();
    }

    #[test]
    fn open_resets_modified_and_user_edit_sets_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.html");
        std::fs::write(&path, "<body><p>seed</p></body>").unwrap();

        let mut session = DocumentSession::new(no_converter());
        session.open(&path).unwrap();
        settle(&mut session);
        assert!(!session.is_modified());

        session
            .surface()
            .command("insertText", Some(serde_json::json!({ "text": "x" })))
            .unwrap();
        settle(&mut session);
        assert!(session.is_modified());
    }

    #[test]
    fn save_clears_modified_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.html");

        let mut session = DocumentSession::new(no_converter());
        session.surface().set_content("<p>content</p>").unwrap();
        session
            .surface()
            .command("insertText", Some(serde_json::json!({ "text": "!" })))
            .unwrap();
        settle(&mut session);
        assert!(session.is_modified());

        session.save(Some(&path)).unwrap();
        session.finish_saves();
        session.pump();
        assert!(!session.is_modified());

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("<!DOCTYPE html>"));
        assert!(saved.contains("!content"));
    }

    #[test]
    fn overlapping_saves_coalesce_latest_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.html");
        let second = dir.path().join("second.html");

        let mut session = DocumentSession::new(no_converter());
        session.surface().set_content("<p>body</p>").unwrap();

        session.save(Some(&first)).unwrap();
        session.save(Some(&second)).unwrap();
        session.finish_saves();
        session.pump();
        session.finish_saves();

        assert!(second.exists());
        assert_eq!(session.current_file(), Some(second.as_path()));
    }

    #[test]
    fn failed_open_leaves_document_untouched() {
        let mut session = DocumentSession::new(no_converter());
        session.surface().set_content("<p>keep me</p>").unwrap();

        let err = session.open(Path::new("/nonexistent/missing.odt"));
        assert!(err.is_err());
        assert_eq!(session.surface().body_html().unwrap(), "<p>keep me</p>");
    }

    #[test]
    fn table_insert_surfaces_table_toolbar() {
        let mut session = DocumentSession::new(no_converter());
        session
            .surface()
            .command(
                "insertTable",
                Some(serde_json::json!({ "rows": 2, "cols": 2 })),
            )
            .unwrap();
        settle(&mut session);
        assert!(session.table_toolbar_visible());
    }
}
