//! Crate-wide error type and run-summary accounting.
//!
//! Every stage reports failures through [`PipelineError`]; non-fatal
//! conditions (a malformed record, an assembly fallback, a contig with no
//! reference match) do not propagate as errors at all -- they accumulate
//! into a [`RunSummary`] that the `run` CLI subcommand logs and serializes
//! alongside the VCF.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Top-level pipeline error. Mirrors the exit-code table: usage (1), I/O
/// (2), malformed input (3), invariant violation (4).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

impl PipelineError {
    /// Maps this error onto the exit code table.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Usage(_) => 1,
            PipelineError::Io(_) => 2,
            PipelineError::MalformedInput(_) => 3,
            PipelineError::InvariantViolated(_) => 4,
        }
    }
}

/// Reason a partition produced no variant calls, attached to the run
/// summary rather than surfaced as an error -- "the pipeline never silently
/// drops a partition; every lost partition is reported with a reason code."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LossReason {
    AssemblyFail,
    NoReferenceMatch,
    AlignmentFail,
    PartitionTooSmall,
}

impl std::fmt::Display for LossReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LossReason::AssemblyFail => "AssemblyFail",
            LossReason::NoReferenceMatch => "NoReferenceMatch",
            LossReason::AlignmentFail => "AlignmentFail",
            LossReason::PartitionTooSmall => "PartitionTooSmall",
        };
        f.write_str(s)
    }
}

/// Accumulated non-fatal run statistics, logged at the end of a run and
/// serialized next to the VCF as a JSON sidecar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub reads_processed: u64,
    pub reads_novel: u64,
    pub malformed_records_skipped: u64,
    pub partitions_total: u64,
    pub partitions_lost: HashMap<String, LossReason>,
    pub variants_emitted: u64,
    pub low_confidence: bool,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_loss(&mut self, partition_label: impl Into<String>, reason: LossReason) {
        self.partitions_lost.insert(partition_label.into(), reason);
    }

    pub fn log_final(&self) {
        log::info!(
            "run summary: {} reads processed, {} novel, {} malformed skipped, \
             {} partitions ({} lost), {} variants emitted{}",
            self.reads_processed,
            self.reads_novel,
            self.malformed_records_skipped,
            self.partitions_total,
            self.partitions_lost.len(),
            self.variants_emitted,
            if self.low_confidence {
                " [low-confidence: sketch FPR above ceiling]"
            } else {
                ""
            }
        );
        for (label, reason) in &self.partitions_lost {
            log::warn!("partition {label} lost: {reason}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(PipelineError::Usage("x".into()).exit_code(), 1);
        assert_eq!(
            PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).exit_code(),
            2
        );
        assert_eq!(PipelineError::MalformedInput("x".into()).exit_code(), 3);
        assert_eq!(PipelineError::InvariantViolated("x".into()).exit_code(), 4);
    }

    #[test]
    fn test_record_loss_and_summarize() {
        let mut summary = RunSummary::new();
        summary.record_loss("cc3", LossReason::NoReferenceMatch);
        assert_eq!(summary.partitions_lost.len(), 1);
        assert_eq!(
            summary.partitions_lost.get("cc3"),
            Some(&LossReason::NoReferenceMatch)
        );
    }
}
