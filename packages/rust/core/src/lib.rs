//! Core documentation resource pipeline for docpipe.
//!
//! - [`uri`]: URI template matching and parameter typing
//! - [`version`]: version normalization, ordering, and inheritance
//! - [`index`]: the in-memory entry index
//! - [`resource`]: resource templates and the template registry
//! - [`pipeline`]: batch ingestion into the index
//! - [`persist`]: snapshot, restore, and event mirroring to storage

pub mod index;
pub mod persist;
pub mod pipeline;
pub mod resource;
pub mod uri;
pub mod version;

pub use index::{AddOutcome, EntryIndex, IndexEvent};
pub use pipeline::{
    BatchProgress, BatchSummary, FailureStage, Pipeline, SilentProgress, SourceUnit, UnitFailure,
};
pub use resource::{ResourceTemplate, TemplateRegistry};
pub use uri::{ParamType, ParamValue, ParameterSet, ParameterTypes, UriTemplate};
pub use version::{Precision, Version, VersionScheme, normalize, resolve_inheritance};
