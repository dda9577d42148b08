//! Batch orchestrator: the public face of the processing pipeline.
//!
//! `process` validates a request, moves the state machine to `Running`,
//! drives the [`ChunkScheduler`] and publishes every observable step on the
//! [`EventBus`]. Per-file failures are recorded and the batch carries on;
//! only orchestration failures (cancellation, invariant violations, panics)
//! move the machine to `Error`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::FutureExt;
use tracing::{error, info, instrument, warn, Span};
use uuid::Uuid;

use notegen_core::{
    logging, BatchEvent, BatchOutcome, BatchRequest, DocumentFile, DocumentStore, Error,
    EventBus, FileProcessingResult, ProcessingError, ProcessingOptions, ProcessingState,
    ProcessingStats, ProcessingStatus, Result, StatsSink, TextGenerator,
};

use crate::pause::{PauseGate, ShutdownSignal};
use crate::progress::ProgressTracker;
use crate::scheduler::{ChunkObserver, ChunkScheduler};
use crate::state::ProcessingStateMachine;
use crate::stats::StatsAggregator;
use crate::steps::{FrontMatterStep, LinkTransform, StepPipeline, WikilinkStep};

/// Coordinates batch runs over a document store.
///
/// All methods take `&self`; share the orchestrator behind an `Arc` to
/// pause, resume or shut down from another task while `process` runs.
pub struct BatchOrchestrator {
    store: Arc<dyn DocumentStore>,
    front_matter: Option<Arc<FrontMatterStep>>,
    wikilinks: Option<Arc<WikilinkStep>>,
    stats_sink: Option<Arc<dyn StatsSink>>,
    events: EventBus,
    options: ProcessingOptions,
    machine: ProcessingStateMachine,
    shutdown: ShutdownSignal,
    progress: Mutex<ProgressTracker>,
    current_batch: Mutex<Option<Uuid>>,
    aggregator: StatsAggregator,
}

impl BatchOrchestrator {
    pub fn builder(store: Arc<dyn DocumentStore>) -> BatchOrchestratorBuilder {
        BatchOrchestratorBuilder::new(store)
    }

    /// Current state of the state machine.
    pub fn state(&self) -> ProcessingState {
        self.machine.state()
    }

    /// Snapshot of the current (or last) run's status.
    pub fn status(&self) -> ProcessingStatus {
        lock(&self.progress).snapshot(self.machine.state())
    }

    /// The bus all batch events are published on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Default options applied to requests that carry none.
    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    /// Every document in the store, ready to build a [`BatchRequest`].
    pub async fn list_documents(&self) -> Result<Vec<DocumentFile>> {
        self.store.list().await
    }

    /// Hold the batch at the next chunk boundary. Only legal while running.
    pub fn pause(&self) -> Result<()> {
        self.machine
            .transition_from(ProcessingState::Running, ProcessingState::Paused)?;
        info!("Batch paused");
        self.emit(BatchEvent::Pause);
        Ok(())
    }

    /// Release a paused batch. Only legal while paused.
    pub fn resume(&self) -> Result<()> {
        self.machine
            .transition_from(ProcessingState::Paused, ProcessingState::Running)?;
        info!("Batch resumed");
        self.emit(BatchEvent::Resume);
        Ok(())
    }

    /// Acknowledge a failed run so a new one can start.
    pub fn reset(&self) -> Result<()> {
        self.machine
            .transition_from(ProcessingState::Error, ProcessingState::Idle)?;
        info!("Orchestrator reset after error");
        Ok(())
    }

    /// Stop accepting work and abort the running batch at its next
    /// suspension point. Files already in flight finish first.
    pub fn shutdown(&self) {
        if self.shutdown.trigger() {
            info!(state = %self.machine.state(), "Orchestrator shutting down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Run one batch to completion.
    ///
    /// Invalid requests are rejected before any state change or event.
    /// Returns [`Error::InvalidState`] unless the orchestrator is idle and
    /// [`Error::ShutDown`] after [`shutdown`](Self::shutdown).
    #[instrument(
        skip_all,
        fields(batch_id = tracing::field::Empty, file_count = request.files.len())
    )]
    pub async fn process(&self, request: BatchRequest) -> Result<BatchOutcome> {
        if self.shutdown.is_triggered() {
            return Err(Error::ShutDown);
        }
        let options = request.validate(&self.options)?;
        let pipeline = self.pipeline_for(&options)?;
        self.machine
            .transition_from(ProcessingState::Idle, ProcessingState::Running)?;

        let batch_id = Uuid::now_v7();
        Span::current().record(logging::BATCH_ID, tracing::field::display(batch_id));
        *lock(&self.current_batch) = Some(batch_id);

        let total_files = request.files.len();
        let start_time = Utc::now();
        lock(&self.progress).begin(total_files, start_time);

        info!(
            total_files,
            chunk_size = options.chunk_size,
            max_retries = options.max_retries,
            front_matter = options.generate_front_matter,
            wikilinks = options.generate_wikilinks,
            "Batch started"
        );
        self.events
            .emit_for_batch(batch_id, BatchEvent::Start { total_files });

        let scheduler = ChunkScheduler::new(options);
        let mut gate = PauseGate::new(self.machine.subscribe(), self.shutdown.subscribe());
        let observer = BatchObserver {
            batch_id,
            events: &self.events,
            progress: &self.progress,
            machine: &self.machine,
        };

        let run = AssertUnwindSafe(scheduler.run(&request.files, &pipeline, &mut gate, &observer))
            .catch_unwind()
            .await;
        lock(&self.progress).finish();

        let results = match run {
            Ok(Ok(results)) if results.len() == total_files => Ok(results),
            Ok(Ok(results)) => Err(Error::Internal(format!(
                "scheduler returned {} results for {total_files} files",
                results.len()
            ))),
            Ok(Err(e)) => Err(e),
            Err(panic) => Err(Error::Internal(format!(
                "batch panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        match results {
            Ok(results) => self.complete(batch_id, results, start_time).await,
            Err(e) => {
                if let Err(transition) = self.machine.transition(ProcessingState::Error) {
                    warn!(error = %transition, "Could not record batch failure in state machine");
                }
                error!(error = %e, "Batch aborted");
                Err(e)
            }
        }
    }

    async fn complete(
        &self,
        batch_id: Uuid,
        results: Vec<FileProcessingResult>,
        start_time: chrono::DateTime<Utc>,
    ) -> Result<BatchOutcome> {
        let stats = self.aggregator.summarize(batch_id, &results, start_time);

        info!(
            total_files = stats.total_files,
            processed_files = stats.processed_files,
            error_files = stats.error_files,
            skipped_files = stats.skipped_files,
            duration_ms = stats.duration_ms(),
            "Batch complete"
        );

        // The machine stays busy until `complete` is out, so the next batch
        // cannot start (or emit) ahead of it.
        self.persist(&stats).await;
        self.events.emit_for_batch(
            batch_id,
            BatchEvent::Complete {
                stats: stats.clone(),
            },
        );
        self.machine.transition(ProcessingState::Idle)?;

        Ok(BatchOutcome {
            file_results: results,
            stats,
        })
    }

    async fn persist(&self, stats: &ProcessingStats) {
        let Some(sink) = &self.stats_sink else {
            return;
        };
        if let Err(e) = sink.append(stats.clone()).await {
            warn!(error = %e, "Failed to persist batch stats");
        }
    }

    fn pipeline_for(&self, options: &ProcessingOptions) -> Result<StepPipeline> {
        let mut pipeline = StepPipeline::new();
        if options.generate_front_matter {
            let step = self.front_matter.clone().ok_or_else(|| {
                Error::InvalidInput("front matter requested but no generator is configured".into())
            })?;
            pipeline = pipeline.with_front_matter(step);
        }
        if options.generate_wikilinks {
            let step = self.wikilinks.clone().ok_or_else(|| {
                Error::InvalidInput("wikilinks requested but no generator is configured".into())
            })?;
            pipeline = pipeline.with_wikilinks(step);
        }
        Ok(pipeline)
    }

    fn emit(&self, event: BatchEvent) {
        // Copy out: handlers may call back into the orchestrator.
        let batch_id = *lock(&self.current_batch);
        match batch_id {
            Some(batch_id) => self.events.emit_for_batch(batch_id, event),
            None => self.events.emit(event),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Turns scheduler callbacks into progress updates and events.
struct BatchObserver<'a> {
    batch_id: Uuid,
    events: &'a EventBus,
    progress: &'a Mutex<ProgressTracker>,
    machine: &'a ProcessingStateMachine,
}

impl ChunkObserver for BatchObserver<'_> {
    fn chunk_started(&self, index: usize, files: &[DocumentFile]) {
        self.events.emit_for_batch(
            self.batch_id,
            BatchEvent::ChunkStart {
                index,
                files: files.iter().map(|f| f.path.clone()).collect(),
                size: files.len(),
            },
        );
    }

    fn file_started(&self, file: &DocumentFile) {
        lock(self.progress).file_started(&file.path);
        self.events.emit_for_batch(
            self.batch_id,
            BatchEvent::FileStart {
                file: file.path.clone(),
            },
        );
    }

    fn file_completed(&self, result: &FileProcessingResult, error: Option<&ProcessingError>) {
        let status = {
            let mut progress = lock(self.progress);
            progress.record(result, error);
            progress.snapshot(self.machine.state())
        };

        self.events.emit_for_batch(
            self.batch_id,
            BatchEvent::FileComplete {
                result: result.clone(),
            },
        );
        if let Some(error) = error {
            self.events
                .emit_for_batch(self.batch_id, BatchEvent::Error(error.clone()));
        }
        self.events
            .emit_for_batch(self.batch_id, BatchEvent::Progress { status });
    }

    fn chunk_completed(&self, index: usize, files: &[DocumentFile]) {
        self.events.emit_for_batch(
            self.batch_id,
            BatchEvent::ChunkComplete {
                index,
                files: files.iter().map(|f| f.path.clone()).collect(),
                size: files.len(),
            },
        );
    }
}

/// Builder for [`BatchOrchestrator`].
pub struct BatchOrchestratorBuilder {
    store: Arc<dyn DocumentStore>,
    front_matter_generator: Option<Arc<dyn TextGenerator>>,
    wikilink_generator: Option<Arc<dyn TextGenerator>>,
    link_transform: Option<LinkTransform>,
    overwrite_front_matter: bool,
    stats_sink: Option<Arc<dyn StatsSink>>,
    events: Option<EventBus>,
    options: ProcessingOptions,
}

impl BatchOrchestratorBuilder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            front_matter_generator: None,
            wikilink_generator: None,
            link_transform: None,
            overwrite_front_matter: false,
            stats_sink: None,
            events: None,
            options: ProcessingOptions::default(),
        }
    }

    pub fn with_front_matter_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.front_matter_generator = Some(generator);
        self
    }

    pub fn with_wikilink_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.wikilink_generator = Some(generator);
        self
    }

    /// Replace how generated link text is merged into a document.
    pub fn with_link_transform(mut self, transform: LinkTransform) -> Self {
        self.link_transform = Some(transform);
        self
    }

    /// Regenerate front matter on documents that already have it.
    pub fn with_overwrite_front_matter(mut self, overwrite: bool) -> Self {
        self.overwrite_front_matter = overwrite;
        self
    }

    pub fn with_stats_sink(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.stats_sink = Some(sink);
        self
    }

    /// Publish on an existing bus instead of a private one.
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_options(mut self, options: ProcessingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> BatchOrchestrator {
        let front_matter = self.front_matter_generator.map(|generator| {
            Arc::new(
                FrontMatterStep::new(self.store.clone(), generator)
                    .with_overwrite_existing(self.overwrite_front_matter),
            )
        });
        let wikilinks = self.wikilink_generator.map(|generator| {
            let step = WikilinkStep::new(self.store.clone(), generator);
            Arc::new(match self.link_transform {
                Some(transform) => step.with_link_transform(transform),
                None => step,
            })
        });

        BatchOrchestrator {
            store: self.store,
            front_matter,
            wikilinks,
            stats_sink: self.stats_sink,
            events: self.events.unwrap_or_default(),
            options: self.options,
            machine: ProcessingStateMachine::new(),
            shutdown: ShutdownSignal::new(),
            progress: Mutex::new(ProgressTracker::new()),
            current_batch: Mutex::new(None),
            aggregator: StatsAggregator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegen_inference::MockGenerator;
    use notegen_store::MemoryDocumentStore;

    fn orchestrator() -> BatchOrchestrator {
        let store = MemoryDocumentStore::with_documents([("a.md", "Body\n")]);
        BatchOrchestrator::builder(Arc::new(store))
            .with_front_matter_generator(Arc::new(MockGenerator::new().with_fixed_response("title: A")))
            .with_options(
                ProcessingOptions::default()
                    .with_delay_between_chunks(0)
                    .with_retry_delay(0),
            )
            .build()
    }

    #[test]
    fn test_pause_and_resume_rejected_when_idle() {
        let orchestrator = orchestrator();
        assert!(matches!(orchestrator.pause(), Err(Error::InvalidState(_))));
        assert!(matches!(orchestrator.resume(), Err(Error::InvalidState(_))));
        assert!(matches!(orchestrator.reset(), Err(Error::InvalidState(_))));
        assert_eq!(orchestrator.state(), ProcessingState::Idle);
    }

    #[tokio::test]
    async fn test_missing_generator_is_invalid_input() {
        let orchestrator = orchestrator();
        let request = BatchRequest::new(vec![DocumentFile::new("a.md")], true, true);
        assert!(matches!(
            orchestrator.process(request).await,
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(orchestrator.state(), ProcessingState::Idle);
    }

    #[tokio::test]
    async fn test_process_returns_to_idle() {
        let orchestrator = orchestrator();
        let files = orchestrator.list_documents().await.unwrap();
        let outcome = orchestrator
            .process(BatchRequest::new(files, true, false))
            .await
            .unwrap();

        assert_eq!(outcome.stats.processed_files, 1);
        assert_eq!(orchestrator.state(), ProcessingState::Idle);
        let status = orchestrator.status();
        assert_eq!(status.files_processed, 1);
        assert_eq!(status.files_remaining, 0);
        assert_eq!(status.current_file, None);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let orchestrator = orchestrator();
        orchestrator.shutdown();
        assert!(orchestrator.is_shut_down());
        let request = BatchRequest::new(vec![DocumentFile::new("a.md")], true, false);
        assert!(matches!(
            orchestrator.process(request).await,
            Err(Error::ShutDown)
        ));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }
}
