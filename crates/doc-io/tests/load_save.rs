use penmark_convert::{ConverterConfig, TempDirRegistry};
use penmark_doc_io::{
    DocumentFormat, DocumentOrigin, IoError, SaveOutcome, SaveTarget, load_document, save_as,
    save_html,
};
use penmark_editor_core::Editor;

fn no_converter() -> ConverterConfig {
    ConverterConfig {
        binary: None,
        ..ConverterConfig::default()
    }
}

#[test]
fn save_then_load_round_trips_the_body() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.html");

    let mut editor = Editor::new();
    editor.set_content("<p><b>x</b></p>");
    save_html(&path, "a", &editor.body_html()).unwrap();

    let mut registry = TempDirRegistry::new();
    let loaded = load_document(&path, &no_converter(), &mut registry).unwrap();
    assert_eq!(loaded.format, DocumentFormat::Html);
    assert_eq!(loaded.origin, DocumentOrigin::LoadedFromFile);

    let mut fresh = Editor::new();
    fresh.set_content(&loaded.body_html);
    assert_eq!(fresh.body_html(), "<p><b>x</b></p>");
}

#[test]
fn html_without_body_is_loaded_whole() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fragment.html");
    std::fs::write(&path, "<p>no body tag here</p>").unwrap();

    let mut registry = TempDirRegistry::new();
    let loaded = load_document(&path, &no_converter(), &mut registry).unwrap();
    assert!(loaded.body_html.contains("no body tag here"));

    let mut editor = Editor::new();
    editor.set_content(&loaded.body_html);
    assert!(editor.body_html().contains("no body tag here"));
}

#[test]
fn mhtml_with_cid_image_loads_with_data_uri() {
    use base64::Engine as _;
    let png = base64::engine::general_purpose::STANDARD.encode(b"\x89PNGdata");
    let mhtml = format!(
        "MIME-Version: 1.0\r\n\
         Content-Type: multipart/related; boundary=\"BOUND\"\r\n\
         \r\n\
         --BOUND\r\n\
         Content-Type: text/html; charset=\"utf-8\"\r\n\
         \r\n\
         <html><body><p>pic:</p><img src=\"cid:one\"></body></html>\r\n\
         --BOUND\r\n\
         Content-Type: image/png\r\n\
         Content-Transfer-Encoding: base64\r\n\
         Content-ID: <one>\r\n\
         \r\n\
         {png}\r\n\
         --BOUND--\r\n"
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("page.mhtml");
    std::fs::write(&path, mhtml).unwrap();

    let mut registry = TempDirRegistry::new();
    let loaded = load_document(&path, &no_converter(), &mut registry).unwrap();
    assert!(loaded.body_html.contains("data:image/png;base64,"));
    assert!(!loaded.body_html.contains("cid:one"));

    let mut editor = Editor::new();
    editor.set_content(&loaded.body_html);
    assert!(editor.body_html().contains("data:image/png;base64,"));
}

#[test]
fn markdown_loads_through_internal_converter() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.md");
    std::fs::write(&path, "# Heading\n\nBody with **bold**.\n").unwrap();

    let mut registry = TempDirRegistry::new();
    let loaded = load_document(&path, &no_converter(), &mut registry).unwrap();

    let mut editor = Editor::new();
    editor.set_content(&loaded.body_html);
    let body = editor.body_html();
    assert!(body.contains("<h1>Heading</h1>"));
    assert!(body.contains("<b>bold</b>"));
}

#[test]
fn plain_text_loads_escaped_with_breaks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.txt");
    std::fs::write(&path, "1 < 2\nsecond line").unwrap();

    let mut registry = TempDirRegistry::new();
    let loaded = load_document(&path, &no_converter(), &mut registry).unwrap();
    assert_eq!(loaded.body_html, "<div>1 &lt; 2<br>second line</div>");
}

#[test]
fn foreign_format_without_converter_fails_and_leaves_caller_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("letter.odt");
    std::fs::write(&path, b"odt bytes").unwrap();

    let mut editor = Editor::new();
    editor.set_content("<p>previous document</p>");
    let before = editor.body_html();

    let mut registry = TempDirRegistry::new();
    let err = load_document(&path, &no_converter(), &mut registry).unwrap_err();
    assert!(matches!(err, IoError::Convert(_)));
    // The document is only replaced on success.
    assert_eq!(editor.body_html(), before);
}

#[test]
fn save_as_markdown_degrades_without_pandoc_dependency_or_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.md");
    let outcome = save_as(&path, "T", "<p>hello</p>", SaveTarget::Markdown, &no_converter()).unwrap();
    match outcome {
        SaveOutcome::Saved { path, .. } => {
            assert!(std::fs::read_to_string(path).unwrap().contains("hello"));
        }
        SaveOutcome::Degraded { path, .. } => {
            assert_eq!(path.extension().unwrap(), "html");
            assert!(std::fs::read_to_string(path).unwrap().contains("hello"));
        }
    }
}

#[test]
fn latin1_html_loads_without_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.html");
    // "café" in latin-1: invalid as UTF-8.
    std::fs::write(&path, [b"<body><p>caf".as_ref(), &[0xE9], b"</p></body>"].concat()).unwrap();

    let mut registry = TempDirRegistry::new();
    let loaded = load_document(&path, &no_converter(), &mut registry).unwrap();
    assert!(loaded.body_html.contains("café"));
}
