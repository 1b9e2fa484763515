//! Contact (touching) detection from overlap begin/end notifications

use super::{PairDetector, close_pair, open_pair};
use crate::events::{EventKind, Ledger, ParticipantId, Properties};
use crate::identity::Timestamp;

/// Touching events between a trigger owner and whatever enters its area.
///
/// Both sides of a contact usually report it; the order-independent key
/// makes the second report a no-op.
#[derive(Debug, Default)]
pub struct ContactDetector {
    begins: u64,
    ends: u64,
}

impl ContactDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepted begin signals (duplicates excluded)
    pub fn begins(&self) -> u64 {
        self.begins
    }

    /// Accepted end signals (unmatched ones excluded)
    pub fn ends(&self) -> u64 {
        self.ends
    }
}

impl PairDetector for ContactDetector {
    fn begin(
        &mut self,
        ledger: &mut Ledger,
        subject: &ParticipantId,
        other: &ParticipantId,
        at: Timestamp,
    ) -> bool {
        let opened = open_pair(ledger, EventKind::Touching, subject, other, at, Properties::new());
        if opened {
            self.begins += 1;
        }
        opened
    }

    fn end(
        &mut self,
        ledger: &mut Ledger,
        subject: &ParticipantId,
        other: &ParticipantId,
        at: Timestamp,
    ) -> bool {
        let closed = close_pair(ledger, EventKind::Touching, subject, other, at);
        if closed {
            self.ends += 1;
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Metadata;
    use crate::identity::IdAllocator;

    fn ledger() -> Ledger {
        Ledger::new(Metadata::new("ep", "log"), IdAllocator::sequential("ev_"))
    }

    #[test]
    fn test_touch_scenario() {
        let mut ledger = ledger();
        let mut contact = ContactDetector::new();
        let (a, b) = (ParticipantId::from("A"), ParticipantId::from("B"));

        assert!(contact.begin(&mut ledger, &a, &b, Timestamp(1.0)));
        // The other side reports the same contact
        assert!(!contact.begin(&mut ledger, &b, &a, Timestamp(1.1)));
        assert!(contact.end(&mut ledger, &b, &a, Timestamp(3.5)));

        let finished = ledger.finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].kind(), EventKind::Touching);
        assert_eq!(finished[0].start(), Timestamp(1.0));
        assert_eq!(finished[0].end(), Some(Timestamp(3.5)));
        assert_eq!(finished[0].participants(), &[a, b]);
        assert_eq!((contact.begins(), contact.ends()), (1, 1));
    }

    #[test]
    fn test_self_contact_rejected() {
        let mut ledger = ledger();
        let mut contact = ContactDetector::new();
        let a = ParticipantId::from("A");
        assert!(!contact.begin(&mut ledger, &a, &a, Timestamp(1.0)));
        assert!(!contact.end(&mut ledger, &a, &a, Timestamp(2.0)));
        assert_eq!(ledger.open_count(), 0);
    }

    #[test]
    fn test_spurious_end_ignored() {
        let mut ledger = ledger();
        let mut contact = ContactDetector::new();
        let (a, b) = (ParticipantId::from("A"), ParticipantId::from("B"));
        assert!(!contact.end(&mut ledger, &a, &b, Timestamp(2.0)));
        assert!(ledger.finished().is_empty());
        assert_eq!(contact.ends(), 0);
    }
}
