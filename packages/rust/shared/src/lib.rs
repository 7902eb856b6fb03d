//! Shared types, error model, and configuration for docpipe.
//!
//! This crate is the foundation depended on by all other docpipe crates.
//! It provides:
//! - [`DocpipeError`]: the unified error type
//! - Domain types ([`Entry`], [`EntryId`], [`Metadata`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], [`FetchConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, FetchConfig, FetchPoliciesConfig, FiltersConfig, PipelineConfig,
    SourceConfig, TemplateConfig, DEFAULT_STAGES, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from,
};
pub use error::{DocpipeError, Result};
pub use types::{Entry, EntryId, Metadata, RESOURCE_SCHEME, VERSION_SEPARATOR, content_hash};
