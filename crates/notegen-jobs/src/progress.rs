//! Live progress bookkeeping for a batch.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use notegen_core::{FileProcessingResult, ProcessingError, ProcessingState, ProcessingStatus};

/// Estimated milliseconds left, from the mean time per attempted file.
///
/// `None` until at least one file has been processed.
pub fn estimate_remaining_ms(elapsed_ms: f64, processed: usize, remaining: usize) -> Option<f64> {
    if processed == 0 {
        return None;
    }
    Some((elapsed_ms / processed as f64) * remaining as f64)
}

/// Owns the [`ProcessingStatus`] of the current run.
///
/// `files_processed` counts attempts: it advances once per completed file,
/// successful or not, and `files_remaining` moves down in step so that
/// `files_processed + files_remaining == files_queued` after every update.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    status: ProcessingStatus,
    started: Option<Instant>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new run of `total` files. Clears the previous error list.
    pub fn begin(&mut self, total: usize, start_time: DateTime<Utc>) {
        self.status = ProcessingStatus {
            state: ProcessingState::Running,
            files_queued: total,
            files_processed: 0,
            files_remaining: total,
            current_file: None,
            start_time: Some(start_time),
            estimated_time_remaining_ms: None,
            errors: Vec::new(),
        };
        self.started = Some(Instant::now());
    }

    pub fn file_started(&mut self, path: &str) {
        self.status.current_file = Some(path.to_string());
    }

    /// Account for one completed file using the time since [`begin`](Self::begin).
    pub fn record(&mut self, result: &FileProcessingResult, error: Option<&ProcessingError>) {
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        self.record_at(result, error, elapsed);
    }

    /// Account for one completed file with an explicit elapsed time.
    pub fn record_at(
        &mut self,
        result: &FileProcessingResult,
        error: Option<&ProcessingError>,
        elapsed: Duration,
    ) {
        let status = &mut self.status;
        if status.files_remaining == 0 {
            return;
        }
        status.files_processed += 1;
        status.files_remaining -= 1;
        if status.current_file.as_deref() == Some(result.path.as_str()) {
            status.current_file = None;
        }
        if let Some(error) = error {
            status.errors.push(error.clone());
        }
        status.estimated_time_remaining_ms = estimate_remaining_ms(
            elapsed.as_secs_f64() * 1000.0,
            status.files_processed,
            status.files_remaining,
        );
    }

    /// Copy of the current status, tagged with `state`.
    pub fn snapshot(&self, state: ProcessingState) -> ProcessingStatus {
        ProcessingStatus {
            state,
            ..self.status.clone()
        }
    }

    /// Clear per-file fields once the run is over.
    pub fn finish(&mut self) {
        self.status.current_file = None;
        self.status.estimated_time_remaining_ms = None;
        self.started = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(path: &str) -> FileProcessingResult {
        FileProcessingResult::succeeded(path, true, false, 10, 0)
    }

    #[test]
    fn test_eta_scenario() {
        // 2 of 10 files in 2000 ms
        assert_eq!(estimate_remaining_ms(2000.0, 2, 8), Some(8000.0));
        assert_eq!(estimate_remaining_ms(500.0, 0, 10), None);
    }

    #[test]
    fn test_record_keeps_counts_balanced() {
        let mut tracker = ProgressTracker::new();
        tracker.begin(10, Utc::now());

        tracker.record_at(&ok("a.md"), None, Duration::from_millis(1000));
        tracker.record_at(&ok("b.md"), None, Duration::from_millis(2000));

        let status = tracker.snapshot(ProcessingState::Running);
        assert_eq!(status.files_processed, 2);
        assert_eq!(status.files_remaining, 8);
        assert_eq!(status.files_processed + status.files_remaining, status.files_queued);
        assert_eq!(status.estimated_time_remaining_ms, Some(8000.0));
        assert_eq!(status.percent_complete(), 20.0);
    }

    #[test]
    fn test_failures_count_as_processed() {
        let mut tracker = ProgressTracker::new();
        tracker.begin(2, Utc::now());
        let failed = FileProcessingResult::failed("a.md", "boom", 5, 2);
        let error = ProcessingError {
            file_path: "a.md".into(),
            error: "boom".into(),
            timestamp: Utc::now(),
            retry_count: 2,
        };
        tracker.record_at(&failed, Some(&error), Duration::from_millis(100));

        let status = tracker.snapshot(ProcessingState::Running);
        assert_eq!(status.files_processed, 1);
        assert_eq!(status.errors, vec![error]);
    }

    #[test]
    fn test_begin_resets_errors_and_current_file() {
        let mut tracker = ProgressTracker::new();
        tracker.begin(1, Utc::now());
        tracker.file_started("a.md");
        tracker.record_at(
            &FileProcessingResult::failed("a.md", "x", 1, 0),
            Some(&ProcessingError {
                file_path: "a.md".into(),
                error: "x".into(),
                timestamp: Utc::now(),
                retry_count: 0,
            }),
            Duration::from_millis(1),
        );
        assert_eq!(tracker.snapshot(ProcessingState::Running).current_file, None);

        tracker.begin(3, Utc::now());
        let status = tracker.snapshot(ProcessingState::Running);
        assert!(status.errors.is_empty());
        assert_eq!(status.files_remaining, 3);
        assert_eq!(status.estimated_time_remaining_ms, None);
    }

    #[test]
    fn test_extra_results_do_not_underflow() {
        let mut tracker = ProgressTracker::new();
        tracker.begin(1, Utc::now());
        tracker.record_at(&ok("a.md"), None, Duration::ZERO);
        tracker.record_at(&ok("a.md"), None, Duration::ZERO);
        assert_eq!(tracker.snapshot(ProcessingState::Idle).files_processed, 1);
    }

    #[test]
    fn test_empty_queue_percent_is_zero() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.snapshot(ProcessingState::Idle).percent_complete(), 0.0);
    }
}
