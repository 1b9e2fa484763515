//! Order-independent event keys

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::{EventKind, ParticipantId};

/// Identity of an in-progress event: kind plus the sorted participant set.
///
/// `A touches B` and `B touches A` produce the same key, so begin/end
/// callbacks arriving from either side resolve to the same open record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    kind: EventKind,
    participants: Vec<ParticipantId>,
}

impl EventKey {
    /// Build a key from one or two participants. Anything else is rejected.
    pub fn new(kind: EventKind, participants: &[ParticipantId]) -> Option<Self> {
        if participants.is_empty() || participants.len() > 2 {
            return None;
        }
        let mut participants = participants.to_vec();
        participants.sort();
        Some(Self { kind, participants })
    }

    pub fn pair(kind: EventKind, a: &ParticipantId, b: &ParticipantId) -> Self {
        let mut participants = vec![a.clone(), b.clone()];
        participants.sort();
        Self { kind, participants }
    }

    pub fn single(kind: EventKind, id: &ParticipantId) -> Self {
        Self {
            kind,
            participants: vec![id.clone()],
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn participants(&self) -> &[ParticipantId] {
        &self.participants
    }

    pub fn involves(&self, id: &ParticipantId) -> bool {
        self.participants.contains(id)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.participants.iter().map(|p| p.as_str()).collect();
        write!(f, "{}:{}", self.kind, ids.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_order_independent() {
        let a = ParticipantId::from("A");
        let b = ParticipantId::from("B");
        assert_eq!(
            EventKey::pair(EventKind::Touching, &a, &b),
            EventKey::pair(EventKind::Touching, &b, &a)
        );
        assert_ne!(
            EventKey::pair(EventKind::Touching, &a, &b),
            EventKey::pair(EventKind::Grasping, &a, &b)
        );
    }

    #[test]
    fn test_key_participant_bounds() {
        assert!(EventKey::new(EventKind::Touching, &[]).is_none());
        let three: Vec<ParticipantId> = ["A", "B", "C"].iter().map(|s| (*s).into()).collect();
        assert!(EventKey::new(EventKind::Touching, &three).is_none());
        let key = EventKey::new(EventKind::Touching, &three[..2]).unwrap();
        assert_eq!(key.to_string(), "Touching:A|B");
    }
}
