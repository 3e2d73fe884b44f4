//! keyharvest-batch: resumable multi-keyword collection
//!
//! [`BatchRunner`] walks a keyword list, reusing cached artifacts, fetching
//! the rest through a [`SourceAdapter`] and recording progress in a
//! checkpoint after every keyword.

mod adapter;
mod report;
mod runner;

pub use adapter::{AdapterError, PageSink, SourceAdapter};
pub use report::{BatchError, BatchReport, KeyOutcome, KeyStatus};
pub use runner::{BatchRunner, DEFAULT_FLUSH_INTERVAL};
