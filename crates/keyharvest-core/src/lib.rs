//! keyharvest core - record model and shared runtime plumbing
//!
//! Records are open field maps (platforms contribute different fields);
//! only the dedup field name is fixed per platform. This crate also carries
//! the injectable delays, the shutdown flag and logging/progress setup used
//! by the batch runner and the CLI.

pub mod delay;
pub mod logging;
pub mod progress;
pub mod record;
pub mod shutdown;
pub mod value;

// Re-exports for convenience
pub use delay::{Delay, NoDelay, RecordingDelay, ThreadSleep};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, fmt_num};
pub use record::{Record, RecordSet};
pub use shutdown::{install_signal_handlers, shutdown_flag};
pub use value::{Value, ValueKind};
