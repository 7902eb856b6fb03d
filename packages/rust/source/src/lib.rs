//! Source providers: where raw documentation content comes from.
//!
//! The pipeline only knows the [`SourceProvider`] contract. This crate also
//! ships [`HttpSourceProvider`], which fetches pages over HTTP.

mod http;

use std::future::Future;

use docpipe_shared::{Metadata, Result};

pub use http::{HttpSourceProvider, is_ssrf_target};

/// Raw content of one source unit plus whatever the provider knows about it.
#[derive(Debug, Clone, Default)]
pub struct RawSource {
    /// Unfiltered content as fetched.
    pub content: String,
    /// Provider metadata (URL, status code, title, ...).
    pub metadata: Metadata,
}

/// Fetches raw content for a source reference.
///
/// Any error returned here is reported by the pipeline as an extraction
/// failure of that unit; it never aborts a batch.
pub trait SourceProvider: Send + Sync {
    /// Fetch the content behind `source_ref`.
    fn fetch(&self, source_ref: &str) -> impl Future<Output = Result<RawSource>> + Send;
}

