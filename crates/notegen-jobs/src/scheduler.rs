//! Chunked execution of a transform over a file list.

use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use notegen_core::{DocumentFile, FileProcessingResult, ProcessingError, ProcessingOptions, Result};

use crate::pause::PauseGate;
use crate::retry::{Attempted, RetryExhausted, RetryableStep};
use crate::steps::FileTransform;

/// Receives the scheduler's progress as it happens.
///
/// Called on the scheduler's task: `chunk_started` and `chunk_completed`
/// bracket every file callback of that chunk, and `file_completed` fires
/// exactly once per file.
pub trait ChunkObserver: Send + Sync {
    fn chunk_started(&self, index: usize, files: &[DocumentFile]);
    fn file_started(&self, file: &DocumentFile);
    fn file_completed(&self, result: &FileProcessingResult, error: Option<&ProcessingError>);
    fn chunk_completed(&self, index: usize, files: &[DocumentFile]);
}

/// Runs chunks sequentially and the files of a chunk concurrently.
///
/// Before each chunk the [`PauseGate`] is consulted, so a pause lets the
/// chunk in flight finish and holds back the next one. Between chunks (never
/// after the last) the scheduler cools down for `delay_between_chunks_ms`.
/// Per-file failures become failed results; only cancellation ends a run
/// early.
#[derive(Debug, Clone)]
pub struct ChunkScheduler {
    options: ProcessingOptions,
    retry: RetryableStep,
}

impl ChunkScheduler {
    pub fn new(options: ProcessingOptions) -> Self {
        let retry = RetryableStep::from_options(&options);
        Self { options, retry }
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    /// Partition `files` into chunks of at most `chunk_size`.
    pub fn chunks<'a>(&self, files: &'a [DocumentFile]) -> std::slice::Chunks<'a, DocumentFile> {
        files.chunks(self.options.chunk_size.max(1))
    }

    /// Process every file, returning results in input order.
    pub async fn run(
        &self,
        files: &[DocumentFile],
        transform: &dyn FileTransform,
        gate: &mut PauseGate,
        observer: &dyn ChunkObserver,
    ) -> Result<Vec<FileProcessingResult>> {
        let chunk_count = self.chunks(files).len();
        let concurrency = self.options.effective_concurrency();
        let delay = Duration::from_millis(self.options.delay_between_chunks_ms);
        let mut results = Vec::with_capacity(files.len());

        for (index, chunk) in self.chunks(files).enumerate() {
            gate.wait_until_resumed().await?;

            debug!(
                chunk_index = index,
                chunk_count,
                file_count = chunk.len(),
                concurrency,
                "Chunk started"
            );
            observer.chunk_started(index, chunk);

            // Boxed so the batch future is provably `Send` and can be spawned.
            let file_futures: Vec<BoxFuture<'_, FileProcessingResult>> = chunk
                .iter()
                .map(|file| self.process_file(file, transform, observer).boxed())
                .collect();
            let chunk_results: Vec<FileProcessingResult> = stream::iter(file_futures)
                .buffered(concurrency)
                .collect()
                .await;
            results.extend(chunk_results);

            observer.chunk_completed(index, chunk);
            debug!(chunk_index = index, "Chunk complete");

            if index + 1 < chunk_count {
                gate.delay(delay).await?;
            }
        }

        Ok(results)
    }

    async fn process_file(
        &self,
        file: &DocumentFile,
        transform: &dyn FileTransform,
        observer: &dyn ChunkObserver,
    ) -> FileProcessingResult {
        trace!(file_path = %file.path, "File started");
        observer.file_started(file);
        let started = Instant::now();

        let outcome = self.retry.execute(file, transform).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (result, error) = match outcome {
            Ok(Attempted { value, retries }) => (
                FileProcessingResult::succeeded(
                    file.path.clone(),
                    value.front_matter_generated,
                    value.wikilinks_generated,
                    elapsed_ms,
                    retries,
                ),
                None,
            ),
            Err(RetryExhausted { error, retries }) => {
                warn!(
                    file_path = %file.path,
                    retry_count = retries,
                    error = %error,
                    "File failed after retries"
                );
                let message = error.to_string();
                let failure = ProcessingError {
                    file_path: file.path.clone(),
                    error: message.clone(),
                    timestamp: Utc::now(),
                    retry_count: retries,
                };
                (
                    FileProcessingResult::failed(file.path.clone(), message, elapsed_ms, retries),
                    Some(failure),
                )
            }
        };

        observer.file_completed(&result, error.as_ref());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pause::ShutdownSignal;
    use crate::state::ProcessingStateMachine;
    use crate::steps::StepOutcome;
    use async_trait::async_trait;
    use notegen_core::{Error, ProcessingState};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        ChunkStart(usize, usize),
        FileStart(String),
        FileDone(String, bool),
        ChunkDone(usize),
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Seen>>);

    impl Recorder {
        fn seen(&self) -> Vec<Seen> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ChunkObserver for Recorder {
        fn chunk_started(&self, index: usize, files: &[DocumentFile]) {
            self.0.lock().unwrap().push(Seen::ChunkStart(index, files.len()));
        }
        fn file_started(&self, file: &DocumentFile) {
            self.0.lock().unwrap().push(Seen::FileStart(file.path.clone()));
        }
        fn file_completed(&self, result: &FileProcessingResult, _: Option<&ProcessingError>) {
            self.0
                .lock()
                .unwrap()
                .push(Seen::FileDone(result.path.clone(), result.success));
        }
        fn chunk_completed(&self, index: usize, _: &[DocumentFile]) {
            self.0.lock().unwrap().push(Seen::ChunkDone(index));
        }
    }

    /// Sleeps, tracks peak concurrency and fails paths containing "bad".
    #[derive(Default)]
    struct SlowTransform {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl FileTransform for SlowTransform {
        async fn apply(&self, file: &DocumentFile) -> Result<StepOutcome> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if file.path.contains("bad") {
                return Err(Error::Generation(format!("cannot process {}", file.path)));
            }
            Ok(StepOutcome {
                front_matter_generated: true,
                wikilinks_generated: false,
            })
        }
    }

    fn files(names: &[&str]) -> Vec<DocumentFile> {
        names.iter().map(|n| DocumentFile::new(*n)).collect()
    }

    fn gate() -> (ProcessingStateMachine, ShutdownSignal, PauseGate) {
        let machine = ProcessingStateMachine::new();
        machine.transition(ProcessingState::Running).unwrap();
        let shutdown = ShutdownSignal::new();
        let gate = PauseGate::new(machine.subscribe(), shutdown.subscribe());
        (machine, shutdown, gate)
    }

    fn options(chunk_size: usize) -> ProcessingOptions {
        ProcessingOptions::default()
            .with_chunk_size(chunk_size)
            .with_delay_between_chunks(0)
            .with_retry_delay(0)
    }

    #[test]
    fn test_chunks_partition() {
        let scheduler = ChunkScheduler::new(options(2));
        let input = files(&["a.md", "b.md", "c.md", "d.md", "e.md"]);
        let sizes: Vec<usize> = scheduler.chunks(&input).map(|c| c.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(scheduler.chunks(&[]).len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_can_be_spawned() {
        let (_machine, _shutdown, mut gate) = gate();
        let handle = tokio::spawn(async move {
            let scheduler = ChunkScheduler::new(options(2));
            let recorder = Recorder::default();
            let transform = SlowTransform::default();
            let input = files(&["a.md", "b.md", "c.md"]);
            scheduler
                .run(&input, &transform, &mut gate, &recorder)
                .await
                .map(|results| results.len())
        });
        assert_eq!(handle.await.unwrap().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_bracket_their_files() {
        let (_machine, _shutdown, mut gate) = gate();
        let scheduler = ChunkScheduler::new(options(2));
        let recorder = Recorder::default();
        let input = files(&["a.md", "b.md", "c.md"]);

        let results = scheduler
            .run(&input, &SlowTransform::default(), &mut gate, &recorder)
            .await
            .unwrap();

        let paths: Vec<_> = results.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "b.md", "c.md"]);

        let seen = recorder.seen();
        assert_eq!(seen.first(), Some(&Seen::ChunkStart(0, 2)));
        let first_done = seen.iter().position(|s| *s == Seen::ChunkDone(0)).unwrap();
        let second_start = seen.iter().position(|s| *s == Seen::ChunkStart(1, 1)).unwrap();
        assert!(first_done < second_start);
        assert!(seen[..first_done].contains(&Seen::FileDone("b.md".into(), true)));
        assert_eq!(seen.last(), Some(&Seen::ChunkDone(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_files_within_chunk_run_concurrently() {
        let (_machine, _shutdown, mut gate) = gate();
        let scheduler = ChunkScheduler::new(options(4).with_max_concurrent(4));
        let transform = SlowTransform::default();
        let start = Instant::now();

        scheduler
            .run(&files(&["a.md", "b.md", "c.md", "d.md"]), &transform, &mut gate, &Recorder::default())
            .await
            .unwrap();

        assert_eq!(transform.peak.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_concurrent_caps_chunk() {
        let (_machine, _shutdown, mut gate) = gate();
        let scheduler = ChunkScheduler::new(options(4).with_max_concurrent(2));
        let transform = SlowTransform::default();

        scheduler
            .run(&files(&["a.md", "b.md", "c.md", "d.md"]), &transform, &mut gate, &Recorder::default())
            .await
            .unwrap();

        assert_eq!(transform.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_chunks() {
        let (_machine, _shutdown, mut gate) = gate();
        let scheduler = ChunkScheduler::new(options(1).with_delay_between_chunks(1_000));
        let start = Instant::now();

        scheduler
            .run(&files(&["a.md", "b.md", "c.md"]), &SlowTransform::default(), &mut gate, &Recorder::default())
            .await
            .unwrap();

        // 3 x 100ms of work plus 2 cooldowns.
        assert_eq!(start.elapsed(), Duration::from_millis(2_300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_results_not_errors() {
        let (_machine, _shutdown, mut gate) = gate();
        let scheduler = ChunkScheduler::new(options(2).with_max_retries(2));
        let results = scheduler
            .run(&files(&["ok.md", "bad.md"]), &SlowTransform::default(), &mut gate, &Recorder::default())
            .await
            .unwrap();

        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(results[1].retry_count, 2);
        assert_eq!(results[1].error.as_deref(), Some("Generation error: cannot process bad.md"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_list_emits_nothing() {
        let (_machine, _shutdown, mut gate) = gate();
        let recorder = Recorder::default();
        let results = ChunkScheduler::new(options(3))
            .run(&[], &SlowTransform::default(), &mut gate, &recorder)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert!(recorder.seen().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_before_next_chunk() {
        let (_machine, shutdown, mut gate) = gate();
        let scheduler = ChunkScheduler::new(options(1).with_delay_between_chunks(60_000));
        let recorder = Recorder::default();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.trigger();
        });

        let err = scheduler
            .run(&files(&["a.md", "b.md"]), &SlowTransform::default(), &mut gate, &recorder)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled(_)));
        assert!(!recorder.seen().contains(&Seen::ChunkStart(1, 1)));
    }
}
