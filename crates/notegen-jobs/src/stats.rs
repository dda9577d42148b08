//! Terminal summary of a batch.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use notegen_core::{FileProcessingResult, ProcessingStats};

/// Build [`ProcessingStats`] from every result of a run.
///
/// `processed_files` counts successes (skipped files included),
/// `error_files` counts failures and the average is taken over all results.
pub fn aggregate(
    batch_id: Uuid,
    results: &[FileProcessingResult],
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> ProcessingStats {
    let processed_files = results.iter().filter(|r| r.success).count();
    let skipped_files = results.iter().filter(|r| r.is_skipped()).count();
    let total_ms: u64 = results.iter().map(|r| r.processing_time_ms).sum();
    let average_processing_time_ms = if results.is_empty() {
        0.0
    } else {
        total_ms as f64 / results.len() as f64
    };

    ProcessingStats {
        batch_id,
        total_files: results.len(),
        processed_files,
        error_files: results.len() - processed_files,
        skipped_files,
        start_time,
        end_time,
        average_processing_time_ms,
    }
}

/// Stateless aggregator stamping the end time with the wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsAggregator;

impl StatsAggregator {
    pub fn summarize(
        &self,
        batch_id: Uuid,
        results: &[FileProcessingResult],
        start_time: DateTime<Utc>,
    ) -> ProcessingStats {
        aggregate(batch_id, results, start_time, Utc::now())
    }
}
