//! Single-file format rendering: Markdown, raw HTML, and plain text are
//! each wrapped into a minimal `index.html` (spec.md §4.3).

const SHELL_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
</head>
<body>
"#;
const SHELL_TAIL: &str = "\n</body>\n</html>\n";

/// Renders Markdown (GFM + typographer + definition lists + footnotes) into
/// a minimal HTML shell.
pub fn render_markdown(source: &str) -> String {
    use pulldown_cmark::{html, Options, Parser};

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_DEFINITION_LIST);

    let parser = Parser::new_ext(source, options);
    let mut body = String::new();
    html::push_html(&mut body, parser);

    format!("{SHELL_HEAD}{body}{SHELL_TAIL}")
}

/// HTML is written verbatim — no shell wrapping.
pub fn render_html(source: &str) -> String {
    source.to_string()
}

/// Plain text is HTML-escaped inside a `<pre>` block inside the shell.
pub fn render_plain_text(source: &str) -> String {
    let escaped = source
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!("{SHELL_HEAD}<pre>{escaped}</pre>{SHELL_TAIL}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_renders_heading() {
        let html = render_markdown("# Hello");
        assert!(html.contains("<h1>Hello</h1>"));
    }

    #[test]
    fn plain_text_escapes_html() {
        let html = render_plain_text("<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn html_passes_through_unmodified() {
        let source = "<h1>Raw</h1>";
        assert_eq!(render_html(source), source);
    }
}
