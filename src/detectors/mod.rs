//! State-change detectors
//!
//! Each detector turns raw per-frame signals (overlap toggles, pose samples,
//! constraint offsets) into ledger opens and closes. Detectors never fail
//! loudly: rejected or unmatched signals return `false` and log.

mod contact;
mod furniture;
mod grasp;
mod pouring;
mod slide;

pub use contact::ContactDetector;
pub use furniture::{
    FurnitureBand, FurnitureDetector, FurnitureJoint, FurnitureReading, FurnitureTransition,
    Impulse, ImpulseActuator, ImpulseCommand, RecordingActuator, classify_band,
};
pub use grasp::GraspDetector;
pub use pouring::{
    AngleExtremum, PoseSample, PourKind, PourSummary, PouringDetector, PouringExtrema,
    pouring_extrema,
};
pub use slide::SlideDetector;

use bevy::log::warn;

use crate::events::{EventKey, EventKind, Ledger, ParticipantId, Properties};
use crate::identity::Timestamp;

/// Detector for events between two participants with begin/end signals
pub trait PairDetector {
    /// State started between `subject` and `other`
    fn begin(
        &mut self,
        ledger: &mut Ledger,
        subject: &ParticipantId,
        other: &ParticipantId,
        at: Timestamp,
    ) -> bool;

    /// State ended between `subject` and `other`
    fn end(
        &mut self,
        ledger: &mut Ledger,
        subject: &ParticipantId,
        other: &ParticipantId,
        at: Timestamp,
    ) -> bool;
}

/// Open a two-participant event, rejecting self pairs
fn open_pair(
    ledger: &mut Ledger,
    kind: EventKind,
    first: &ParticipantId,
    second: &ParticipantId,
    at: Timestamp,
    properties: Properties,
) -> bool {
    if first == second {
        warn!("Rejecting {} of {} with itself", kind, first);
        return false;
    }
    ledger
        .open_event(kind, vec![first.clone(), second.clone()], at, properties)
        .is_some()
}

/// Close a two-participant event regardless of argument order
fn close_pair(
    ledger: &mut Ledger,
    kind: EventKind,
    first: &ParticipantId,
    second: &ParticipantId,
    at: Timestamp,
) -> bool {
    if first == second {
        return false;
    }
    ledger.close(&EventKey::pair(kind, first, second), at, Properties::new())
}
