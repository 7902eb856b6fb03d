//! HTML-to-Markdown conversion stage.
//!
//! Picks the main content container out of a documentation page, rewrites
//! tables into Markdown (htmd does not handle them), then converts the rest
//! with `htmd`. Input that is not HTML passes through unchanged so Markdown
//! and plain-text sources can share a stack with HTML ones.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use docpipe_shared::{DocpipeError, Result};

use crate::stack::FilterStage;

/// Content containers tried in priority order.
const CONTENT_SELECTORS: &[&str] = &[
    "article .markdown",  // Docusaurus
    ".vp-doc",            // VitePress
    ".markdown-section",  // GitBook
    "[role=\"main\"]",    // ReadTheDocs
    "article",
    "main",
    ".content",
];

/// Tags dropped entirely during conversion.
const SKIPPED_TAGS: &[&str] = &["script", "style", "nav", "iframe", "noscript", "svg"];

static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static HEADER_CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th").expect("valid selector"));
static DATA_CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("valid selector"));
static BODY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid selector"));

/// Converts an HTML page into Markdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlToMarkdown;

impl FilterStage for HtmlToMarkdown {
    fn name(&self) -> &str {
        "html-to-markdown"
    }

    fn apply(&self, content: &str) -> Result<String> {
        if !looks_like_html(content) {
            return Ok(content.to_string());
        }

        let main = extract_content_html(content);
        let main = tables_to_markdown(&main);

        let converter = htmd::HtmlToMarkdown::builder()
            .skip_tags(SKIPPED_TAGS.to_vec())
            .build();
        let markdown = converter
            .convert(&main)
            .map_err(|e| DocpipeError::Conversion(format!("htmd conversion failed: {e}")))?;

        debug!(html_len = content.len(), md_len = markdown.len(), "html converted");
        Ok(markdown)
    }
}

/// Whether `content` should be treated as HTML.
fn looks_like_html(content: &str) -> bool {
    let head = content.trim_start();
    head.starts_with('<') && head.contains('>')
}

/// Inner HTML of the best content container, falling back to `<body>`.
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    for sel_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(sel_str) else {
            continue;
        };
        if let Some(el) = doc.select(&selector).next() {
            return el.inner_html();
        }
    }

    doc.select(&BODY_SEL)
        .next()
        .map(|body| body.inner_html())
        .unwrap_or_else(|| html.to_string())
}

/// Replace every `<table>` with a Markdown table.
fn tables_to_markdown(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut result = html.to_string();

    for table in fragment.select(&TABLE_SEL) {
        result = result.replacen(&table.html(), &render_table(&table), 1);
    }

    result
}

fn cell_texts(row: &ElementRef, sel: &Selector) -> Vec<String> {
    row.select(sel)
        .map(|cell| cell.text().collect::<String>().trim().replace('|', "\\|"))
        .collect()
}

fn render_table(table: &ElementRef) -> String {
    let mut header: Option<Vec<String>> = None;
    let mut body: Vec<Vec<String>> = Vec::new();

    for row in table.select(&ROW_SEL) {
        let heads = cell_texts(&row, &HEADER_CELL_SEL);
        if !heads.is_empty() && header.is_none() {
            header = Some(heads);
            continue;
        }
        let cells = cell_texts(&row, &DATA_CELL_SEL);
        if !cells.is_empty() {
            body.push(cells);
        }
    }

    // Without <th> the first data row becomes the header.
    let header = match header {
        Some(h) => h,
        None if !body.is_empty() => body.remove(0),
        None => return String::new(),
    };

    let width = std::iter::once(&header)
        .chain(body.iter())
        .map(Vec::len)
        .max()
        .unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let line = |cells: &[String]| {
        let padded: Vec<&str> = (0..width)
            .map(|i| cells.get(i).map(String::as_str).unwrap_or(""))
            .collect();
        format!("| {} |\n", padded.join(" | "))
    };

    let mut md = String::from("\n\n");
    md.push_str(&line(&header));
    md.push_str(&format!("| {} |\n", vec!["---"; width].join(" | ")));
    for row in &body {
        md.push_str(&line(row));
    }
    md.push('\n');
    md
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(html: &str) -> String {
        HtmlToMarkdown.apply(html).expect("convert")
    }

    #[test]
    fn converts_simple_page() {
        let md = convert("<html><body><main><h1>Hello World</h1><p>Some text.</p></main></body></html>");
        assert!(md.contains("# Hello World"));
        assert!(md.contains("Some text."));
    }

    #[test]
    fn strips_nav_and_footer() {
        let md = convert(
            r#"<html><body>
            <nav><a href="/">Home</a></nav>
            <main><h1>Content</h1><p>Important text.</p></main>
            <footer><p>Copyright 2024</p></footer>
        </body></html>"#,
        );
        assert!(md.contains("Important text."));
        assert!(!md.contains("Copyright 2024"));
    }

    #[test]
    fn prefers_docusaurus_container() {
        let md = convert(
            r#"<html><body><article><div class="markdown"><h1>Install</h1><p>npm i</p></div>
            <footer>Edit this page</footer></article></body></html>"#,
        );
        assert!(md.contains("Install"));
        assert!(!md.contains("Edit this page"));
    }

    #[test]
    fn preserves_code_blocks() {
        let md = convert(
            r#"<html><body><main><h1>Code</h1>
            <pre><code class="language-rust">fn main() {}</code></pre></main></body></html>"#,
        );
        assert!(md.contains("```"));
        assert!(md.contains("fn main() {}"));
    }

    #[test]
    fn preserves_tables() {
        let md = convert(
            r#"<html><body><main><h1>Data</h1>
            <table>
                <thead><tr><th>Name</th><th>Value</th></tr></thead>
                <tbody><tr><td>foo</td><td>bar</td></tr><tr><td>baz</td></tr></tbody>
            </table></main></body></html>"#,
        );
        assert!(md.contains("| Name | Value |"));
        assert!(md.contains("| foo | bar |"));
        assert!(md.contains("baz"));
    }

    #[test]
    fn body_fallback_without_main() {
        let md = convert("<html><body><h1>Direct Body</h1><p>Content in body.</p></body></html>");
        assert!(md.contains("Direct Body"));
        assert!(md.contains("Content in body."));
    }

    #[test]
    fn non_html_passes_through() {
        let input = "# Already Markdown\n\nText with a < sign.";
        assert_eq!(convert(input), input);
    }
}
