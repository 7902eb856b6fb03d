//! Content filter stack and built-in stages.
//!
//! A [`FilterStack`] is an ordered list of [`FilterStage`]s applied to raw
//! source content before it is indexed. The built-in stages turn HTML
//! documentation pages into clean Markdown; callers can add their own stages
//! with [`FnStage`] or by implementing the trait.

mod cleanup;
mod html;
mod stack;

use url::Url;

use docpipe_shared::{DocpipeError, Result};

pub use cleanup::{
    CodeFenceLanguages, CollapseBlankLines, NormalizeHeadings, ResolveLinks, StripHtml,
    TrailingNewline, TrimWhitespace,
};
pub use html::HtmlToMarkdown;
pub use stack::{FilterStack, FilterStage, FnStage};

pub use docpipe_shared::DEFAULT_STAGES;

/// The default HTML-to-Markdown stack.
pub fn markdown_stack() -> FilterStack {
    FilterStack::new()
        .with(HtmlToMarkdown)
        .with(NormalizeHeadings)
        .with(CollapseBlankLines)
        .with(CodeFenceLanguages)
        .with(StripHtml)
        .with(TrimWhitespace)
        .with(TrailingNewline)
}

/// Build a stack from configured stage names.
///
/// `resolve-links` requires `base_url`. Unknown names are a config error.
pub fn build_stack<S: AsRef<str>>(names: &[S], base_url: Option<&str>) -> Result<FilterStack> {
    let mut stack = FilterStack::new();
    for name in names {
        match name.as_ref() {
            "html-to-markdown" => stack.add(HtmlToMarkdown),
            "normalize-headings" => stack.add(NormalizeHeadings),
            "collapse-blank-lines" => stack.add(CollapseBlankLines),
            "code-fence-languages" => stack.add(CodeFenceLanguages),
            "strip-html" => stack.add(StripHtml),
            "trim-whitespace" => stack.add(TrimWhitespace),
            "trailing-newline" => stack.add(TrailingNewline),
            "resolve-links" => {
                let base = base_url.ok_or_else(|| {
                    DocpipeError::config("filter stage resolve-links requires filters.base_url")
                })?;
                let base = Url::parse(base)
                    .map_err(|e| DocpipeError::config(format!("invalid filters.base_url: {e}")))?;
                stack.add(ResolveLinks::new(base))
            }
            other => return Err(DocpipeError::config(format!("unknown filter stage {other:?}"))),
        };
    }
    Ok(stack)
}
