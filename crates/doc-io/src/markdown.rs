use pulldown_cmark::{Options, Parser, html};

/// Markdown to HTML for the load path: headings, emphasis, inline code,
/// links, lists, and paragraph breaks are what the editor cares about.
pub fn markdown_to_html(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    let parser = Parser::new_ext(source, options);
    let mut out = String::with_capacity(source.len() * 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_markdown_maps_to_html() {
        let out = markdown_to_html("# Title\n\nSome **bold** and *italic* and `code`.\n");
        assert!(out.contains("<h1>Title</h1>"));
        assert!(out.contains("<strong>bold</strong>"));
        assert!(out.contains("<em>italic</em>"));
        assert!(out.contains("<code>code</code>"));
    }

    #[test]
    fn links_and_lists_survive() {
        let out = markdown_to_html("- [site](https://e.org)\n- two\n");
        assert!(out.contains("<ul>"));
        assert!(out.contains("<a href=\"https://e.org\">site</a>"));
    }
}
