#![warn(missing_docs)]

//! Log event deduplication.
//!
//! Decide path: event → policy by severity → key derivation → cache check.
//! Independently, a pruner sweeps cache entries older than the configured
//! expiration.

pub mod cache;
pub mod clock;
pub mod error;
pub mod event;
pub mod filter;
pub mod key;
pub mod layer;
pub mod pruner;
pub mod settings;
pub mod severity;

pub use cache::{DedupCache, DedupStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DedupError, Result};
pub use event::{LogEvent, PropertyValue, ScalarValue};
pub use filter::{DeduplicationFilter, LogEventFilter};
pub use key::derive_key;
pub use layer::DedupLayerFilter;
pub use pruner::Pruner;
pub use settings::{DeduplicationLevel, DeduplicationSettings};
pub use severity::Severity;
