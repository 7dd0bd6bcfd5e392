use std::path::Path;

use penmark_convert::{ConversionJob, ConverterConfig, TempDirRegistry};
use tracing::info;

use crate::detect::{DocumentFormat, DocumentOrigin};
use crate::extract::{decode_text, extract_body};
use crate::markdown::markdown_to_html;
use crate::{IoError, mhtml};

/// A reconciled document body ready for the engine's `setContent`.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub body_html: String,
    pub format: DocumentFormat,
    pub origin: DocumentOrigin,
}

/// Load any supported file into editor-shaped HTML. Foreign formats go
/// through the conversion orchestrator; its temp output is adopted by
/// `registry` so it outlives this call and is cleaned up with the
/// session.
pub fn load_document(
    path: &Path,
    converter: &ConverterConfig,
    registry: &mut TempDirRegistry,
) -> Result<LoadedDocument, IoError> {
    let format = DocumentFormat::from_path(path);
    info!(path = %path.display(), ?format, "loading document");

    let read = |path: &Path| {
        std::fs::read(path).map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })
    };

    let (body_html, origin) = match &format {
        DocumentFormat::Html => {
            let text = decode_text(&read(path)?);
            (extract_body(&text).to_string(), DocumentOrigin::LoadedFromFile)
        }
        DocumentFormat::Mhtml => {
            let html = mhtml::extract_html(&read(path)?)?;
            (extract_body(&html).to_string(), DocumentOrigin::LoadedFromFile)
        }
        DocumentFormat::Markdown => {
            let text = decode_text(&read(path)?);
            (markdown_to_html(&text), DocumentOrigin::LoadedFromFile)
        }
        DocumentFormat::PlainText => {
            let text = decode_text(&read(path)?);
            (plain_text_to_html(&text), DocumentOrigin::LoadedFromFile)
        }
        DocumentFormat::Foreign(_) => {
            let job = ConversionJob::new(path, "html")?;
            let outcome = job.run(converter)?;
            let html = outcome.html_with_inlined_images()?;
            registry.adopt(outcome);
            (
                extract_body(&html).to_string(),
                DocumentOrigin::ConvertedFromForeign,
            )
        }
    };

    Ok(LoadedDocument {
        body_html,
        format,
        origin,
    })
}

/// Plain text becomes a single `<div>` with escaped content and `<br>`
/// per newline.
pub fn plain_text_to_html(text: &str) -> String {
    let mut out = String::from("<div>");
    for (ix, line) in text.replace("\r\n", "\n").replace('\r', "\n").split('\n').enumerate() {
        if ix > 0 {
            out.push_str("<br>");
        }
        for c in line.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                other => out.push(other),
            }
        }
    }
    out.push_str("</div>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_escaped_and_wrapped() {
        let html = plain_text_to_html("a < b\nsecond & line");
        assert_eq!(html, "<div>a &lt; b<br>second &amp; line</div>");
    }

    #[test]
    fn missing_converter_leaves_error_to_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.odt");
        std::fs::write(&path, b"fake odt").unwrap();

        let converter = ConverterConfig {
            binary: None,
            ..ConverterConfig::default()
        };
        let mut registry = TempDirRegistry::new();
        let err = load_document(&path, &converter, &mut registry).unwrap_err();
        assert!(matches!(
            err,
            IoError::Convert(penmark_convert::ConvertError::MissingConverter)
        ));
        assert!(registry.current().is_none());
    }
}
