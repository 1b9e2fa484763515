//! Grasp detection, reported by the manipulator (hand/gripper) side

use bevy::log::warn;
use std::collections::BTreeSet;

use super::{PairDetector, close_pair, open_pair};
use crate::events::{EventKind, Ledger, ParticipantId, Properties, PropertyValue};
use crate::identity::Timestamp;

/// Grasping events keyed by (manipulator, grasped object).
///
/// Only registered manipulators may start or end a grasp; reports from the
/// object side are rejected.
#[derive(Debug, Default)]
pub struct GraspDetector {
    manipulators: BTreeSet<ParticipantId>,
}

impl GraspDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_manipulator(&mut self, id: ParticipantId) {
        self.manipulators.insert(id);
    }

    pub fn remove_manipulator(&mut self, id: &ParticipantId) -> bool {
        self.manipulators.remove(id)
    }

    pub fn is_manipulator(&self, id: &ParticipantId) -> bool {
        self.manipulators.contains(id)
    }
}

impl PairDetector for GraspDetector {
    fn begin(
        &mut self,
        ledger: &mut Ledger,
        manipulator: &ParticipantId,
        object: &ParticipantId,
        at: Timestamp,
    ) -> bool {
        if !self.is_manipulator(manipulator) {
            warn!("Grasp start from {}, which is not a manipulator", manipulator);
            return false;
        }
        let mut properties = Properties::new();
        properties.insert("performedBy".into(), PropertyValue::Ref(manipulator.clone()));
        properties.insert("objectActedOn".into(), PropertyValue::Ref(object.clone()));
        open_pair(ledger, EventKind::Grasping, manipulator, object, at, properties)
    }

    fn end(
        &mut self,
        ledger: &mut Ledger,
        manipulator: &ParticipantId,
        object: &ParticipantId,
        at: Timestamp,
    ) -> bool {
        if !self.is_manipulator(manipulator) {
            warn!("Grasp end from {}, which is not a manipulator", manipulator);
            return false;
        }
        close_pair(ledger, EventKind::Grasping, manipulator, object, at)
    }
}
