//! Batch outcome reporting

use std::fmt;
use std::time::Duration;

use keyharvest_store::CheckpointError;

/// Terminal state of one keyword in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// A non-empty artifact was already cached; nothing fetched.
    Reused,
    /// Fetched and persisted.
    Fetched,
    /// The adapter returned no records. Still completed.
    Empty,
    /// Adapter or persistence failure; not completed.
    Failed,
}

impl KeyStatus {
    pub fn is_completed(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reused => write!(f, "REUSED"),
            Self::Fetched => write!(f, "FETCHED"),
            Self::Empty => write!(f, "EMPTY"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOutcome {
    pub keyword: String,
    pub status: KeyStatus,
    /// Records stored for the keyword after dedup.
    pub records: usize,
    pub error: Option<String>,
}

impl KeyOutcome {
    pub(crate) fn completed(keyword: &str, status: KeyStatus, records: usize) -> Self {
        Self {
            keyword: keyword.to_string(),
            status,
            records,
            error: None,
        }
    }

    pub(crate) fn failed(keyword: &str, error: impl fmt::Display) -> Self {
        Self {
            keyword: keyword.to_string(),
            status: KeyStatus::Failed,
            records: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Summary of one `BatchRunner::run` call.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub session: String,
    pub platform: String,
    /// Distinct keywords requested.
    pub total_keys: usize,
    /// Requested keywords the checkpoint already listed as completed.
    pub already_completed: usize,
    /// Keywords visited in this run (completed or failed).
    pub newly_processed: usize,
    pub reused: Vec<String>,
    pub failed: Vec<String>,
    /// Records stored for keywords visited in this run.
    pub total_records: usize,
    /// Every completed keyword of the session, in completion order.
    pub completed_keywords: Vec<String>,
    pub outcomes: Vec<KeyOutcome>,
    /// Stopped early by the stop flag.
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn remaining(&self) -> usize {
        self.total_keys - self.already_completed - self.completed_this_run()
    }

    pub fn completed_this_run(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_completed()).count()
    }
}

/// Failure that aborts a whole run.
#[derive(Debug)]
pub enum BatchError {
    /// Progress cannot be loaded or persisted.
    Checkpoint(CheckpointError),
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checkpoint(e) => write!(f, "batch aborted: {e}"),
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Checkpoint(e) => Some(e),
        }
    }
}

impl From<CheckpointError> for BatchError {
    fn from(e: CheckpointError) -> Self {
        Self::Checkpoint(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_failed_is_incomplete() {
        assert!(KeyStatus::Empty.is_completed());
        assert!(KeyStatus::Reused.is_completed());
        assert!(!KeyStatus::Failed.is_completed());
    }

    #[test]
    fn remaining_counts() {
        let report = BatchReport {
            session: "s".into(),
            platform: "p".into(),
            total_keys: 4,
            already_completed: 1,
            newly_processed: 2,
            reused: vec![],
            failed: vec!["b".into()],
            total_records: 3,
            completed_keywords: vec!["x".into(), "a".into()],
            outcomes: vec![
                KeyOutcome::completed("a", KeyStatus::Fetched, 3),
                KeyOutcome::failed("b", "boom"),
            ],
            interrupted: true,
            elapsed: Duration::ZERO,
        };
        assert_eq!(report.completed_this_run(), 1);
        assert_eq!(report.remaining(), 2);
    }
}
