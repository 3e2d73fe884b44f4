//! Source adapter contract

use std::fmt;
use std::ops::ControlFlow;

use keyharvest_core::RecordSet;

/// Failure surfaced by a [`SourceAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Authentication or configuration problem. Retrying within the run
    /// cannot help.
    Configuration(String),
    /// Rate limit or network failure that outlasted the adapter's own retries.
    Transient(String),
}

impl AdapterError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::Transient(msg) => write!(f, "transient error: {msg}"),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Receives each page of records; `Break` asks the adapter to stop early.
pub type PageSink<'a> = dyn FnMut(RecordSet) -> ControlFlow<()> + 'a;

/// Turns a keyword into records from one remote platform.
///
/// Pagination, authentication and rate limiting stay inside the adapter.
pub trait SourceAdapter {
    /// Platform name used in cache keys and checkpoints.
    fn platform(&self) -> &str;

    /// Field that identifies a record for deduplication.
    fn dedup_field(&self) -> &str;

    /// Deliver up to `max_records` records for `keyword`, page by page.
    fn fetch_pages(
        &self,
        keyword: &str,
        max_records: usize,
        sink: &mut PageSink<'_>,
    ) -> Result<(), AdapterError>;

    /// Collect every page into one set.
    fn fetch(&self, keyword: &str, max_records: usize) -> Result<RecordSet, AdapterError> {
        let mut all = RecordSet::new(self.dedup_field());
        self.fetch_pages(keyword, max_records, &mut |page| {
            all.extend(page);
            ControlFlow::Continue(())
        })?;
        Ok(all)
    }
}
