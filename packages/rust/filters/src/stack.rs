//! The filter stage contract and the ordered stack that runs stages.
//!
//! A stage is a pure `&str -> String` transform that may fail. The stack runs
//! stages strictly in append order and attributes the first failure to the
//! stage that raised it; later stages never run and no partial content escapes.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use docpipe_shared::{DocpipeError, Result};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One named content transform.
///
/// Implementations must not keep state between invocations, so a failed
/// unit can be re-run from its raw content with identical results.
pub trait FilterStage: Send + Sync {
    /// Stage name used in error attribution and tracing.
    fn name(&self) -> &str;

    /// Transform `content`, or fail.
    fn apply(&self, content: &str) -> Result<String>;
}

/// Closure-backed stage for ad-hoc transforms.
pub struct FnStage<F> {
    name: String,
    f: F,
}

impl<F> FnStage<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    /// Wrap `f` as a stage called `name`.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> FilterStage for FnStage<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, content: &str) -> Result<String> {
        (self.f)(content)
    }
}

// ---------------------------------------------------------------------------
// FilterStack
// ---------------------------------------------------------------------------

/// Ordered sequence of stages. Cheap to clone; stages are shared.
#[derive(Clone, Default)]
pub struct FilterStack {
    stages: Vec<Arc<dyn FilterStage>>,
}

impl FilterStack {
    /// An empty stack (the identity transform).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn add(&mut self, stage: impl FilterStage + 'static) -> &mut Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Append an already-shared stage.
    pub fn add_shared(&mut self, stage: Arc<dyn FilterStage>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, stage: impl FilterStage + 'static) -> Self {
        self.add(stage);
        self
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the stack has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order on the calling thread.
    pub fn process(&self, content: &str) -> Result<String> {
        let mut current = content.to_string();
        for stage in &self.stages {
            current = stage
                .apply(&current)
                .map_err(|e| DocpipeError::filter_stage(stage.name(), e))?;
            trace!(stage = stage.name(), len = current.len(), "stage applied");
        }
        Ok(current)
    }

    /// Run every stage in order on the blocking pool, bounding each stage by
    /// `per_stage`.
    ///
    /// A stage that exceeds its budget or panics is reported as a failure of
    /// that stage. A timed-out stage keeps running on its blocking thread but
    /// its output is discarded.
    pub async fn process_with_timeout(&self, content: String, per_stage: Duration) -> Result<String> {
        let mut current = content;
        for stage in &self.stages {
            let worker = Arc::clone(stage);
            let input = std::mem::take(&mut current);
            let handle = tokio::task::spawn_blocking(move || worker.apply(&input));

            current = match tokio::time::timeout(per_stage, handle).await {
                Ok(Ok(Ok(output))) => output,
                Ok(Ok(Err(e))) => return Err(DocpipeError::filter_stage(stage.name(), e)),
                Ok(Err(join_err)) => {
                    return Err(DocpipeError::filter_stage(
                        stage.name(),
                        DocpipeError::Conversion(format!("stage panicked: {join_err}")),
                    ));
                }
                Err(_) => {
                    return Err(DocpipeError::filter_stage(
                        stage.name(),
                        DocpipeError::Timeout {
                            operation: format!("filter stage {}", stage.name()),
                            after: per_stage,
                        },
                    ));
                }
            };
            trace!(stage = stage.name(), len = current.len(), "stage applied");
        }
        Ok(current)
    }
}

impl std::fmt::Debug for FilterStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterStack")
            .field("stages", &self.stage_names())
            .finish()
    }
}
