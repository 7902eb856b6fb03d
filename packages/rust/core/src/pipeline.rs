//! Batch ingestion: fetch → filter → render path → index.
//!
//! Units run as a bounded task group. Tasks only prepare entries; the join
//! loop is the single caller of [`EntryIndex::add`]. A failing unit is
//! recorded in the [`BatchSummary`] and never stops the batch. The one
//! exception is [`DocpipeError::IndexInvariant`], which aborts it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use docpipe_filters::FilterStack;
use docpipe_shared::{
    DocpipeError, Entry, EntryId, Metadata, PipelineConfig, Result, SourceConfig, content_hash,
};
use docpipe_source::SourceProvider;

use crate::index::{AddOutcome, EntryIndex};
use crate::resource::TemplateRegistry;

/// One unit of work: where to fetch, and which resource URI it becomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub source_ref: String,
    pub uri: String,
}

impl SourceUnit {
    pub fn new(source_ref: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            source_ref: source_ref.into(),
            uri: uri.into(),
        }
    }
}

impl From<&SourceConfig> for SourceUnit {
    fn from(config: &SourceConfig) -> Self {
        Self::new(config.url.clone(), config.uri.clone())
    }
}

/// Where in the per-unit sequence a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Extraction,
    Filter,
    Template,
    Timeout,
    Index,
    /// The unit's task panicked or was aborted.
    Task,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Extraction => "extraction",
            Self::Filter => "filter",
            Self::Template => "template",
            Self::Timeout => "timeout",
            Self::Index => "index",
            Self::Task => "task",
        })
    }
}

/// A unit that did not make it into the index.
#[derive(Debug)]
pub struct UnitFailure {
    pub source_ref: String,
    pub uri: String,
    pub stage: FailureStage,
    pub error: DocpipeError,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Units never started because the batch was cancelled.
    pub skipped: usize,
    pub failures: Vec<UnitFailure>,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// Progress callback for reporting batch status.
pub trait BatchProgress: Send + Sync {
    /// Called once before any unit starts.
    fn started(&self, total: usize);
    /// Called as each unit is indexed, fails, or is skipped.
    fn unit_finished(&self, uri: &str, ok: bool, done: usize, total: usize);
    /// Called when the batch completes.
    fn done(&self, summary: &BatchSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl BatchProgress for SilentProgress {
    fn started(&self, _total: usize) {}
    fn unit_finished(&self, _uri: &str, _ok: bool, _done: usize, _total: usize) {}
    fn done(&self, _summary: &BatchSummary) {}
}

/// Explicitly constructed pipeline context: provider, filters, templates,
/// and the shared index.
pub struct Pipeline<P> {
    provider: Arc<P>,
    filters: FilterStack,
    templates: Arc<TemplateRegistry>,
    index: Arc<EntryIndex>,
    config: PipelineConfig,
}

impl<P> fmt::Debug for Pipeline<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("filters", &self.filters)
            .field("templates", &self.templates.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// What a unit task hands back to the join loop.
enum UnitOutcome {
    Ready(PreparedEntry),
    Failed(UnitFailure),
    Skipped(SourceUnit),
}

struct PreparedEntry {
    unit: SourceUnit,
    path: String,
    content: String,
    metadata: Metadata,
}

impl<P: SourceProvider + 'static> Pipeline<P> {
    pub fn new(
        provider: P,
        filters: FilterStack,
        templates: TemplateRegistry,
        index: Arc<EntryIndex>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            provider: Arc::new(provider),
            filters,
            templates: Arc::new(templates),
            index,
            config,
        }
    }

    pub fn index(&self) -> &Arc<EntryIndex> {
        &self.index
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Run every unit through the pipeline and index the results.
    ///
    /// Returns `Err` only for [`DocpipeError::IndexInvariant`]; every other
    /// failure is reported per unit in the summary.
    #[instrument(skip_all, fields(units = units.len(), concurrency = self.config.concurrency))]
    pub async fn run(
        &self,
        units: Vec<SourceUnit>,
        cancel: CancellationToken,
        progress: &dyn BatchProgress,
    ) -> Result<BatchSummary> {
        let start = Instant::now();
        let total = units.len();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks: JoinSet<UnitOutcome> = JoinSet::new();
        let mut spawned: HashMap<tokio::task::Id, SourceUnit> = HashMap::with_capacity(total);

        info!(total, "starting batch");
        progress.started(total);

        for unit in units {
            let ctx = UnitContext {
                provider: Arc::clone(&self.provider),
                filters: self.filters.clone(),
                templates: Arc::clone(&self.templates),
                config: self.config.clone(),
            };
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let task_unit = unit.clone();
            let handle = tasks.spawn(async move { ctx.process(task_unit, semaphore, cancel).await });
            spawned.insert(handle.id(), unit);
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    let unit = spawned.remove(&e.id()).unwrap_or_else(|| SourceUnit::new("", ""));
                    UnitOutcome::Failed(UnitFailure {
                        source_ref: unit.source_ref,
                        uri: unit.uri,
                        stage: FailureStage::Task,
                        error: DocpipeError::validation(format!("unit task failed: {e}")),
                    })
                }
            };

            let (uri, ok) = match outcome {
                UnitOutcome::Ready(prepared) => {
                    let uri = prepared.unit.uri.clone();
                    match self.index_prepared(prepared) {
                        Ok(()) => {
                            summary.succeeded += 1;
                            (uri, true)
                        }
                        Err(failure) if failure.error.is_fatal() => {
                            // Dropping the JoinSet aborts the remaining tasks.
                            warn!(error = %failure.error, "index invariant violated, aborting batch");
                            return Err(failure.error);
                        }
                        Err(failure) => {
                            record_failure(&mut summary, failure);
                            (uri, false)
                        }
                    }
                }
                UnitOutcome::Failed(failure) => {
                    let uri = failure.uri.clone();
                    record_failure(&mut summary, failure);
                    (uri, false)
                }
                UnitOutcome::Skipped(unit) => {
                    debug!(uri = %unit.uri, "unit skipped");
                    summary.skipped += 1;
                    (unit.uri, false)
                }
            };
            progress.unit_finished(&uri, ok, summary.total(), total);
        }

        summary.elapsed = start.elapsed();
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "batch complete"
        );
        progress.done(&summary);
        Ok(summary)
    }

    /// Turn a prepared unit into an entry and add it, reusing the id already
    /// indexed at its path.
    fn index_prepared(&self, prepared: PreparedEntry) -> std::result::Result<(), UnitFailure> {
        let PreparedEntry {
            unit,
            path,
            content,
            metadata,
        } = prepared;

        let id = self
            .index
            .find_by_path(&path)
            .map(|existing| existing.id)
            .unwrap_or_else(EntryId::new);
        let entry = Entry {
            id,
            path,
            content,
            metadata,
        };

        match self.index.add(entry) {
            Ok(outcome) => {
                debug!(uri = %unit.uri, %id, ?outcome, "unit indexed");
                if let AddOutcome::Superseded(old) = outcome {
                    debug!(%old, "previous entry at path replaced");
                }
                Ok(())
            }
            Err(error) => Err(UnitFailure {
                source_ref: unit.source_ref,
                uri: unit.uri,
                stage: FailureStage::Index,
                error,
            }),
        }
    }
}

fn record_failure(summary: &mut BatchSummary, failure: UnitFailure) {
    warn!(
        uri = %failure.uri,
        source_ref = %failure.source_ref,
        stage = %failure.stage,
        error = %failure.error,
        "unit failed"
    );
    summary.failed += 1;
    summary.failures.push(failure);
}

/// Everything one unit task needs, owned.
struct UnitContext<P> {
    provider: Arc<P>,
    filters: FilterStack,
    templates: Arc<TemplateRegistry>,
    config: PipelineConfig,
}

impl<P: SourceProvider> UnitContext<P> {
    async fn process(
        self,
        unit: SourceUnit,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
    ) -> UnitOutcome {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return UnitOutcome::Skipped(unit),
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return UnitOutcome::Skipped(unit),
            },
        };
        if cancel.is_cancelled() {
            return UnitOutcome::Skipped(unit);
        }

        // From here on the unit runs to completion even if cancelled.
        debug!(uri = %unit.uri, source_ref = %unit.source_ref, "unit started");
        let fail = |unit: SourceUnit, stage, error| {
            UnitOutcome::Failed(UnitFailure {
                source_ref: unit.source_ref,
                uri: unit.uri,
                stage,
                error,
            })
        };

        // An unroutable URI never reaches the provider.
        let (template, params) = match self.templates.match_uri(&unit.uri) {
            Ok(found) => found,
            Err(error) => return fail(unit, FailureStage::Template, error),
        };
        let path = match template.render_path(&params) {
            Ok(path) => path,
            Err(error) => return fail(unit, FailureStage::Template, error),
        };

        let fetch_timeout = self.config.fetch_timeout;
        let raw = match tokio::time::timeout(fetch_timeout, self.provider.fetch(&unit.source_ref))
            .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                let error = DocpipeError::extraction(&unit.source_ref, e);
                return fail(unit, FailureStage::Extraction, error);
            }
            Err(_) => {
                let error = DocpipeError::extraction(
                    &unit.source_ref,
                    DocpipeError::Timeout {
                        operation: "fetch".into(),
                        after: fetch_timeout,
                    },
                );
                return fail(unit, FailureStage::Timeout, error);
            }
        };

        let content = match self
            .filters
            .process_with_timeout(raw.content, self.config.stage_timeout)
            .await
        {
            Ok(content) => content,
            Err(error) => {
                let stage = match &error {
                    DocpipeError::FilterStage { source, .. }
                        if matches!(**source, DocpipeError::Timeout { .. }) =>
                    {
                        FailureStage::Timeout
                    }
                    _ => FailureStage::Filter,
                };
                return fail(unit, stage, error);
            }
        };

        let mut metadata = raw.metadata;
        metadata
            .entry("fetched_at".into())
            .or_insert_with(|| Utc::now().to_rfc3339().into());
        metadata.insert("source_ref".into(), unit.source_ref.as_str().into());
        metadata.insert("uri".into(), unit.uri.as_str().into());
        metadata.insert("template".into(), template.template().into());
        metadata.insert("content_hash".into(), content_hash(&content).into());
        if let Some(version) = template.version_of(&params) {
            metadata.insert("version".into(), version.canonical().into());
            metadata.insert("version_scheme".into(), version.scheme().as_str().into());
        }
        if let Some(release) = template.release() {
            metadata.insert("release".into(), release.into());
        }

        debug!(uri = %unit.uri, %path, bytes = content.len(), "unit prepared");
        UnitOutcome::Ready(PreparedEntry {
            unit,
            path,
            content,
            metadata,
        })
    }
}
