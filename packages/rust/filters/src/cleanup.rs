//! Markdown cleanup stages.
//!
//! Each stage is a small, stateless pass over converted Markdown. Passes that
//! rewrite prose leave fenced code blocks untouched.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use docpipe_shared::Result;

use crate::stack::FilterStage;

/// Apply `f` to every line outside fenced code blocks; fence lines and code
/// lines pass through unchanged. Returning `None` drops the line.
fn map_prose_lines(md: &str, mut f: impl FnMut(&str) -> Option<String>) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut fence: Option<&str> = None;

    for line in md.lines() {
        let trimmed = line.trim_start();
        let marker = if trimmed.starts_with("```") {
            Some("```")
        } else if trimmed.starts_with("~~~") {
            Some("~~~")
        } else {
            None
        };

        match (fence, marker) {
            (None, Some(m)) => {
                fence = Some(m);
                out.push(line.to_string());
            }
            (Some(open), Some(m)) if open == m => {
                fence = None;
                out.push(line.to_string());
            }
            (Some(_), _) => out.push(line.to_string()),
            (None, None) => {
                if let Some(mapped) = f(line) {
                    out.push(mapped);
                }
            }
        }
    }

    out.join("\n")
}

// ---------------------------------------------------------------------------
// normalize-headings
// ---------------------------------------------------------------------------

/// Keeps the first H1 and demotes every later H1 to H2.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeHeadings;

impl FilterStage for NormalizeHeadings {
    fn name(&self) -> &str {
        "normalize-headings"
    }

    fn apply(&self, content: &str) -> Result<String> {
        static H1_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^#\s+(.+)$").expect("valid regex"));

        let mut seen_h1 = false;
        Ok(map_prose_lines(content, |line| match H1_RE.captures(line) {
            Some(caps) if seen_h1 => Some(format!("## {}", &caps[1])),
            Some(_) => {
                seen_h1 = true;
                Some(line.to_string())
            }
            None => Some(line.to_string()),
        }))
    }
}

// ---------------------------------------------------------------------------
// collapse-blank-lines
// ---------------------------------------------------------------------------

/// Collapses runs of blank prose lines into a single blank line.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollapseBlankLines;

impl FilterStage for CollapseBlankLines {
    fn name(&self) -> &str {
        "collapse-blank-lines"
    }

    fn apply(&self, content: &str) -> Result<String> {
        let mut previous_blank = false;
        Ok(map_prose_lines(content, |line| {
            let blank = line.trim().is_empty();
            let keep = !(blank && previous_blank);
            previous_blank = blank;
            keep.then(|| line.to_string())
        }))
    }
}

// ---------------------------------------------------------------------------
// code-fence-languages
// ---------------------------------------------------------------------------

/// Rewrites class-style fence hints (`language-js`, `lang-python`,
/// `highlight-rust`) to the bare language name.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeFenceLanguages;

impl FilterStage for CodeFenceLanguages {
    fn name(&self) -> &str {
        "code-fence-languages"
    }

    fn apply(&self, content: &str) -> Result<String> {
        static LANG_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?m)^(\s*)(```|~~~)(?:language-|lang-|highlight-)([\w+#-]+)")
                .expect("valid regex")
        });

        Ok(LANG_PREFIX_RE.replace_all(content, "$1$2$3").into_owned())
    }
}

// ---------------------------------------------------------------------------
// strip-html
// ---------------------------------------------------------------------------

/// Removes layout tags that survived conversion, keeping their text.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripHtml;

impl FilterStage for StripHtml {
    fn name(&self) -> &str {
        "strip-html"
    }

    fn apply(&self, content: &str) -> Result<String> {
        static LAYOUT_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(
                r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary|main|font|center)(?:\s[^>]*)?/?>",
            )
            .expect("valid regex")
        });

        Ok(map_prose_lines(content, |line| {
            Some(LAYOUT_TAG_RE.replace_all(line, "").into_owned())
        }))
    }
}

// ---------------------------------------------------------------------------
// resolve-links
// ---------------------------------------------------------------------------

/// Resolves relative Markdown links against a fixed base URL.
///
/// Image links, anchors, `mailto:` and absolute URLs are left alone.
#[derive(Debug, Clone)]
pub struct ResolveLinks {
    base: Url,
}

impl ResolveLinks {
    /// Resolve links against `base`.
    pub fn new(base: Url) -> Self {
        Self { base }
    }
}

impl FilterStage for ResolveLinks {
    fn name(&self) -> &str {
        "resolve-links"
    }

    fn apply(&self, content: &str) -> Result<String> {
        static LINK_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

        Ok(map_prose_lines(content, |line| {
            let rewritten = LINK_RE.replace_all(line, |caps: &regex::Captures| {
                let (bang, text, href) = (&caps[1], &caps[2], &caps[3]);
                let is_absolute = href.starts_with("http://")
                    || href.starts_with("https://")
                    || href.starts_with('#')
                    || href.starts_with("mailto:");

                if !bang.is_empty() || is_absolute {
                    return caps[0].to_string();
                }
                match self.base.join(href) {
                    Ok(resolved) => format!("[{text}]({resolved})"),
                    Err(_) => caps[0].to_string(),
                }
            });
            Some(rewritten.into_owned())
        }))
    }
}

// ---------------------------------------------------------------------------
// trim-whitespace
// ---------------------------------------------------------------------------

/// Strips trailing whitespace from every line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimWhitespace;

impl FilterStage for TrimWhitespace {
    fn name(&self) -> &str {
        "trim-whitespace"
    }

    fn apply(&self, content: &str) -> Result<String> {
        Ok(content
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

// ---------------------------------------------------------------------------
// trailing-newline
// ---------------------------------------------------------------------------

/// Ensures the document ends with exactly one newline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailingNewline;

impl FilterStage for TrailingNewline {
    fn name(&self) -> &str {
        "trailing-newline"
    }

    fn apply(&self, content: &str) -> Result<String> {
        let trimmed = content.trim_end_matches(['\n', '\r']);
        Ok(format!("{trimmed}\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(stage: &dyn FilterStage, input: &str) -> String {
        stage.apply(input).expect("cleanup stages never fail")
    }

    #[test]
    fn normalize_headings_demotes_duplicate_h1() {
        let input = "# Title\n\nSome text\n\n# Another Title\n\nMore text";
        assert_eq!(
            run(&NormalizeHeadings, input),
            "# Title\n\nSome text\n\n## Another Title\n\nMore text"
        );
    }

    #[test]
    fn normalize_headings_ignores_shell_comments_in_code() {
        let input = "# Title\n\n```bash\n# install it\nnpm i\n```";
        assert_eq!(run(&NormalizeHeadings, input), input);
    }

    #[test]
    fn collapse_blank_lines_keeps_one() {
        let input = "Line 1\n\n\n\n\nLine 2";
        assert_eq!(run(&CollapseBlankLines, input), "Line 1\n\nLine 2");
    }

    #[test]
    fn collapse_blank_lines_preserves_code() {
        let input = "```\na\n\n\nb\n```";
        assert_eq!(run(&CollapseBlankLines, input), input);
    }

    #[test]
    fn code_fence_languages_strips_prefix() {
        let input = "```language-javascript\nconsole.log('hi');\n```";
        assert!(run(&CodeFenceLanguages, input).starts_with("```javascript"));

        let tilde = "~~~lang-python\nprint(1)\n~~~";
        assert!(run(&CodeFenceLanguages, tilde).starts_with("~~~python"));
    }

    #[test]
    fn code_fence_languages_keeps_plain() {
        let input = "```rust\nfn main() {}\n```";
        assert_eq!(run(&CodeFenceLanguages, input), input);
    }

    #[test]
    fn strip_html_removes_layout_tags() {
        let input = "# Title\n\n<div class=\"note\">Important info</div>\n\nMore text";
        let result = run(&StripHtml, input);
        assert!(result.contains("Important info"));
        assert!(!result.contains("<div"));
        assert!(!result.contains("</div>"));
    }

    #[test]
    fn strip_html_preserves_code_blocks() {
        let input = "# Title\n\n```html\n<div>Preserved</div>\n```\n\nText";
        assert!(run(&StripHtml, input).contains("<div>Preserved</div>"));
    }

    #[test]
    fn resolve_links_relative_resolved() {
        let stage = ResolveLinks::new(Url::parse("https://docs.example.com/guide/intro").unwrap());
        assert_eq!(
            run(&stage, "[Next](/api/reference)"),
            "[Next](https://docs.example.com/api/reference)"
        );
    }

    #[test]
    fn resolve_links_leaves_absolute_anchor_and_image() {
        let stage = ResolveLinks::new(Url::parse("https://docs.example.com/page").unwrap());
        for input in [
            "[Link](https://other.com/page)",
            "[Section](#section-1)",
            "![Logo](img/logo.png)",
        ] {
            assert_eq!(run(&stage, input), input);
        }
    }

    #[test]
    fn trim_whitespace_trims_trailing() {
        assert_eq!(
            run(&TrimWhitespace, "Line 1   \nLine 2\t\nLine 3"),
            "Line 1\nLine 2\nLine 3"
        );
    }

    #[test]
    fn trailing_newline_normalizes() {
        assert_eq!(run(&TrailingNewline, "Content"), "Content\n");
        assert_eq!(run(&TrailingNewline, "Content\n\n\n"), "Content\n");
    }
}
