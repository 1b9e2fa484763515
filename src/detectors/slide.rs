//! Slide detection (an object pushed along a surface by a manipulator)

use bevy::log::warn;
use std::collections::BTreeSet;

use super::{PairDetector, close_pair, open_pair};
use crate::events::{EventKind, Ledger, ParticipantId, Properties, PropertyValue};
use crate::identity::Timestamp;

/// Sliding events between a manipulator and the slid object.
///
/// Either side may report; the key is undirected but the record keeps which
/// participant is the manipulator (`performedBy`).
#[derive(Debug, Default)]
pub struct SlideDetector {
    manipulators: BTreeSet<ParticipantId>,
}

impl SlideDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_manipulator(&mut self, id: ParticipantId) {
        self.manipulators.insert(id);
    }

    pub fn remove_manipulator(&mut self, id: &ParticipantId) -> bool {
        self.manipulators.remove(id)
    }

    /// (manipulator, object) for a reported pair, if exactly one side manipulates
    fn orient<'a>(
        &self,
        a: &'a ParticipantId,
        b: &'a ParticipantId,
    ) -> Option<(&'a ParticipantId, &'a ParticipantId)> {
        match (self.manipulators.contains(a), self.manipulators.contains(b)) {
            (true, false) => Some((a, b)),
            (false, true) => Some((b, a)),
            _ => None,
        }
    }
}

impl PairDetector for SlideDetector {
    fn begin(
        &mut self,
        ledger: &mut Ledger,
        subject: &ParticipantId,
        other: &ParticipantId,
        at: Timestamp,
    ) -> bool {
        let Some((manipulator, object)) = self.orient(subject, other) else {
            warn!("Slide between {} and {} has no single manipulator", subject, other);
            return false;
        };
        let mut properties = Properties::new();
        properties.insert("performedBy".into(), PropertyValue::Ref(manipulator.clone()));
        properties.insert("objectActedOn".into(), PropertyValue::Ref(object.clone()));
        open_pair(ledger, EventKind::Sliding, manipulator, object, at, properties)
    }

    fn end(
        &mut self,
        ledger: &mut Ledger,
        subject: &ParticipantId,
        other: &ParticipantId,
        at: Timestamp,
    ) -> bool {
        close_pair(ledger, EventKind::Sliding, subject, other, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Metadata;
    use crate::identity::IdAllocator;

    #[test]
    fn test_slide_keeps_manipulator() {
        let mut ledger = Ledger::new(Metadata::new("ep", "log"), IdAllocator::sequential("ev_"));
        let mut slide = SlideDetector::new();
        let hand = ParticipantId::from("LeftHand");
        let plate = ParticipantId::from("Plate");
        slide.add_manipulator(hand.clone());

        // Reported from the object side
        assert!(slide.begin(&mut ledger, &plate, &hand, Timestamp(2.0)));
        assert!(!slide.begin(&mut ledger, &hand, &plate, Timestamp(2.1)));
        assert!(slide.end(&mut ledger, &hand, &plate, Timestamp(4.0)));

        let record = &ledger.finished()[0];
        assert_eq!(record.participants()[0], hand);
        assert_eq!(record.property("performedBy"), Some(&PropertyValue::Ref(hand)));
        assert_eq!(record.property("objectActedOn"), Some(&PropertyValue::Ref(plate)));
    }

    #[test]
    fn test_slide_without_manipulator_rejected() {
        let mut ledger = Ledger::new(Metadata::new("ep", "log"), IdAllocator::sequential("ev_"));
        let mut slide = SlideDetector::new();
        let (a, b) = (ParticipantId::from("A"), ParticipantId::from("B"));
        assert!(!slide.begin(&mut ledger, &a, &b, Timestamp(0.0)));
        assert_eq!(ledger.open_count(), 0);
    }
}
