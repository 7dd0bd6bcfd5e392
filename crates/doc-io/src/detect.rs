use std::path::Path;

/// What the on-disk extension says the document is. Anything outside the
/// natively renderable set goes through the conversion orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFormat {
    Html,
    Mhtml,
    Markdown,
    PlainText,
    Foreign(String),
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "html" | "htm" | "xhtml" => DocumentFormat::Html,
            "mhtml" | "mht" => DocumentFormat::Mhtml,
            "md" | "markdown" => DocumentFormat::Markdown,
            "txt" | "" => DocumentFormat::PlainText,
            other => DocumentFormat::Foreign(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentOrigin {
    #[default]
    New,
    LoadedFromFile,
    ConvertedFromForeign,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_detection_is_case_insensitive() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.HTML")),
            DocumentFormat::Html
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.Mht")),
            DocumentFormat::Mhtml
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("notes.md")),
            DocumentFormat::Markdown
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("report.ODT")),
            DocumentFormat::Foreign("odt".to_string())
        );
    }
}
