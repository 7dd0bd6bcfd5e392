use std::io::Write as _;
use std::path::{Path, PathBuf};

use penmark_convert::{ConversionJob, ConverterConfig};
use penmark_editor_core::{Node, parse_document};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::page::{PageSetup, PrintRequest};
use crate::{IoError, mhtml};

/// Export targets selectable in Save As.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTarget {
    Html,
    Mhtml,
    PlainText,
    Markdown,
    Pdf,
    Docx,
    Odt,
}

impl SaveTarget {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "mhtml" | "mht" => SaveTarget::Mhtml,
            "txt" => SaveTarget::PlainText,
            "md" | "markdown" => SaveTarget::Markdown,
            "pdf" => SaveTarget::Pdf,
            "docx" => SaveTarget::Docx,
            "odt" => SaveTarget::Odt,
            _ => SaveTarget::Html,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            SaveTarget::Html => "html",
            SaveTarget::Mhtml => "mhtml",
            SaveTarget::PlainText => "txt",
            SaveTarget::Markdown => "md",
            SaveTarget::Pdf => "pdf",
            SaveTarget::Docx => "docx",
            SaveTarget::Odt => "odt",
        }
    }
}

/// Result of a save. `Degraded` means the requested target's dependency
/// was unavailable and an HTML file was written instead; the host shows
/// this as a transient status, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved {
        path: PathBuf,
        target: SaveTarget,
    },
    Degraded {
        path: PathBuf,
        requested: SaveTarget,
        reason: String,
    },
}

/// The canonical on-disk shape of a saved document.
pub fn wrap_in_skeleton(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title></head><body>{}</body></html>",
        escape_title(title),
        body
    )
}

fn escape_title(title: &str) -> String {
    title
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Write atomically: temp file in the target directory, fsync, rename.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), IoError> {
    let wrap = |source: std::io::Error| IoError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut temp = match dir {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    }
    .map_err(wrap)?;
    temp.write_all(contents).map_err(wrap)?;
    temp.as_file().sync_all().map_err(wrap)?;
    temp.persist(path).map_err(|err| wrap(err.error))?;
    Ok(())
}

/// Save the canonical HTML document (the plain Save path).
pub fn save_html(path: &Path, title: &str, body_html: &str) -> Result<(), IoError> {
    let document = wrap_in_skeleton(title, body_html);
    atomic_write(path, document.as_bytes())?;
    info!(path = %path.display(), bytes = document.len(), "saved");
    Ok(())
}

/// The Save As matrix. Missing dependencies degrade to HTML and say so.
pub fn save_as(
    path: &Path,
    title: &str,
    body_html: &str,
    target: SaveTarget,
    converter: &ConverterConfig,
) -> Result<SaveOutcome, IoError> {
    match target {
        SaveTarget::Html => {
            save_html(path, title, body_html)?;
            Ok(SaveOutcome::Saved {
                path: path.to_path_buf(),
                target,
            })
        }
        SaveTarget::Mhtml => {
            let document = wrap_in_skeleton(title, body_html);
            let archive = mhtml::assemble(title, &document);
            atomic_write(path, archive.as_bytes())?;
            Ok(SaveOutcome::Saved {
                path: path.to_path_buf(),
                target,
            })
        }
        SaveTarget::PlainText => {
            let text = html_to_text(body_html);
            atomic_write(path, text.as_bytes())?;
            Ok(SaveOutcome::Saved {
                path: path.to_path_buf(),
                target,
            })
        }
        SaveTarget::Markdown => match which::which("pandoc") {
            Ok(pandoc) => {
                let markdown = html_to_markdown_via(&pandoc, body_html, converter)?;
                atomic_write(path, markdown.as_bytes())?;
                Ok(SaveOutcome::Saved {
                    path: path.to_path_buf(),
                    target,
                })
            }
            Err(_) => degrade(path, title, body_html, target, "no html-to-markdown converter"),
        },
        SaveTarget::Pdf => {
            // Print-to-pdf belongs to the rendering surface; the headless
            // core degrades.
            degrade(path, title, body_html, target, "print-to-pdf is unavailable")
        }
        SaveTarget::Docx | SaveTarget::Odt => {
            if converter.binary.is_none() {
                return degrade(path, title, body_html, target, "no document converter");
            }
            let document = wrap_in_skeleton(title, body_html);
            let staging = tempfile::tempdir().map_err(|source| IoError::Write {
                path: path.to_path_buf(),
                source,
            })?;
            let html_path = staging.path().join("export.html");
            atomic_write(&html_path, document.as_bytes())?;

            let job = ConversionJob::new(&html_path, target.extension())?;
            let outcome = job.run(converter)?;
            let bytes = std::fs::read(&outcome.output_path).map_err(|source| IoError::Read {
                path: outcome.output_path.clone(),
                source,
            })?;
            atomic_write(path, &bytes)?;
            Ok(SaveOutcome::Saved {
                path: path.to_path_buf(),
                target,
            })
        }
    }
}

fn degrade(
    path: &Path,
    title: &str,
    body_html: &str,
    requested: SaveTarget,
    reason: &str,
) -> Result<SaveOutcome, IoError> {
    let fallback = path.with_extension("html");
    warn!(requested = ?requested, %reason, fallback = %fallback.display(), "degrading save to html");
    save_html(&fallback, title, body_html)?;
    Ok(SaveOutcome::Degraded {
        path: fallback,
        requested,
        reason: reason.to_string(),
    })
}

fn html_to_markdown_via(
    pandoc: &Path,
    body_html: &str,
    converter: &ConverterConfig,
) -> Result<String, IoError> {
    use std::process::{Command, Stdio};

    let mut child = Command::new(pandoc)
        .args(["-f", "html", "-t", "markdown_strict"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(penmark_convert::ConvertError::Spawn)?;
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(body_html.as_bytes());
    }
    let started = std::time::Instant::now();
    let output = loop {
        match child.try_wait().map_err(penmark_convert::ConvertError::Io)? {
            Some(_) => break child.wait_with_output().map_err(penmark_convert::ConvertError::Io)?,
            None if started.elapsed() >= converter.timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(penmark_convert::ConvertError::TimedOut(converter.timeout).into());
            }
            None => std::thread::sleep(std::time::Duration::from_millis(25)),
        }
    };
    if !output.status.success() {
        return Err(penmark_convert::ConvertError::NonZeroExit {
            status: output.status,
            stderr: String::new(),
        }
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Build the delegated print-to-pdf request. The rendering surface does
/// the actual printing; headless hosts fall back to `save_as` with the
/// Pdf target, which degrades.
pub fn pdf_print_request(title: &str, body_html: &str, setup: PageSetup) -> PrintRequest {
    PrintRequest {
        html_document: wrap_in_skeleton(title, body_html),
        setup,
    }
}

/// Strip tags, preserving paragraph breaks, by running the body through
/// the editor's own parser.
pub fn html_to_text(body_html: &str) -> String {
    let doc = parse_document(body_html);
    let mut paragraphs: Vec<String> = Vec::new();
    collect_text(&doc.children, &mut paragraphs);
    paragraphs.join("\n\n")
}

fn collect_text(nodes: &[Node], out: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Element(el) => {
                if el.is_leaf_block() {
                    let text: String = el
                        .to_plain_text()
                        .chars()
                        .filter(|&c| c != '\u{200B}')
                        .collect();
                    if !text.is_empty() {
                        out.push(text);
                    }
                } else {
                    collect_text(&el.children, out);
                }
            }
            Node::Void(_) | Node::Text(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skeleton_has_canonical_shape() {
        let doc = wrap_in_skeleton("My <Doc>", "<p>x</p>");
        assert!(doc.starts_with("<!DOCTYPE html><html><head><meta charset=\"utf-8\">"));
        assert!(doc.contains("<title>My &lt;Doc&gt;</title>"));
        assert!(doc.contains("<body><p>x</p></body>"));
    }

    #[test]
    fn atomic_write_replaces_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.html");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        // No stray temp files are left behind.
        let extra: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.path() != path)
            .collect();
        assert!(extra.is_empty());
    }

    #[test]
    fn text_export_preserves_paragraph_breaks() {
        let text = html_to_text("<p>one</p><h1>two</h1><p><b>three</b></p>");
        assert_eq!(text, "one\n\ntwo\n\nthree");
    }

    #[test]
    fn pdf_target_degrades_to_html() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        let outcome = save_as(
            &path,
            "T",
            "<p>x</p>",
            SaveTarget::Pdf,
            &ConverterConfig::default(),
        )
        .unwrap();
        let SaveOutcome::Degraded { path: written, requested, .. } = outcome else {
            panic!("expected degraded outcome");
        };
        assert_eq!(requested, SaveTarget::Pdf);
        assert_eq!(written.extension().unwrap(), "html");
        assert!(std::fs::read_to_string(&written).unwrap().contains("<p>x</p>"));
    }

    #[test]
    fn docx_without_converter_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.docx");
        let converter = ConverterConfig {
            binary: None,
            ..ConverterConfig::default()
        };
        let outcome = save_as(&path, "T", "<p>x</p>", SaveTarget::Docx, &converter).unwrap();
        assert!(matches!(outcome, SaveOutcome::Degraded { .. }));
    }

    #[test]
    fn target_detection_from_extension() {
        assert_eq!(SaveTarget::from_path(Path::new("a.mht")), SaveTarget::Mhtml);
        assert_eq!(SaveTarget::from_path(Path::new("a.txt")), SaveTarget::PlainText);
        assert_eq!(SaveTarget::from_path(Path::new("a.anything")), SaveTarget::Html);
    }
}
