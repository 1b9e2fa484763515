//! Semantic event model and the ledger that tracks event lifetimes
//!
//! Detectors open events when a state starts and close them when it ends.
//! The ledger guarantees one open record per key, finish-once end times and
//! append-only closure order for export.

mod key;
mod ledger;
mod types;

pub use key::EventKey;
pub use ledger::{Ledger, Metadata};
pub use types::{EventKind, EventRecord, ParticipantId, Properties, PropertyValue};
