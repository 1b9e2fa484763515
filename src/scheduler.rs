//! Cancellable one-shot delayed actions
//!
//! At most one pending action per target: scheduling again for the same
//! target replaces (cancels) the earlier one. Due actions are drained by the
//! session on each tick, in due-time order.

use std::collections::BTreeMap;

use crate::events::ParticipantId;
use crate::identity::Timestamp;

/// What a delayed action is for
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionTarget {
    /// Deferred session start (`StartMode::AfterDelay` / `AtNextTick`)
    SessionStart,
    /// Push an open drawer/door closed
    CloseFurniture(ParticipantId),
}

#[derive(Debug, Default)]
pub struct DelayedActions {
    pending: BTreeMap<ActionTarget, Timestamp>,
}

impl DelayedActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `target` to fire `delay_secs` after `now`.
    ///
    /// Returns true if this replaced a pending action for the same target.
    pub fn schedule(&mut self, target: ActionTarget, now: Timestamp, delay_secs: f64) -> bool {
        let due = Timestamp(now.secs() + delay_secs.max(0.0));
        self.pending.insert(target, due).is_some()
    }

    pub fn cancel(&mut self, target: &ActionTarget) -> bool {
        self.pending.remove(target).is_some()
    }

    pub fn is_pending(&self, target: &ActionTarget) -> bool {
        self.pending.contains_key(target)
    }

    pub fn due_time(&self, target: &ActionTarget) -> Option<Timestamp> {
        self.pending.get(target).copied()
    }

    /// Remove and return every action due at or before `now`
    pub fn drain_due(&mut self, now: Timestamp) -> Vec<ActionTarget> {
        let mut due: Vec<(Timestamp, ActionTarget)> = self
            .pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(target, at)| (*at, target.clone()))
            .collect();
        due.sort();
        for (_, target) in &due {
            self.pending.remove(target);
        }
        due.into_iter().map(|(_, target)| target).collect()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drawer(id: &str) -> ActionTarget {
        ActionTarget::CloseFurniture(id.into())
    }

    #[test]
    fn test_fires_once_when_due() {
        let mut actions = DelayedActions::new();
        actions.schedule(drawer("d1"), Timestamp(1.0), 5.0);
        assert!(actions.drain_due(Timestamp(5.9)).is_empty());
        assert_eq!(actions.drain_due(Timestamp(6.0)), vec![drawer("d1")]);
        assert!(actions.drain_due(Timestamp(100.0)).is_empty());
    }

    #[test]
    fn test_reschedule_replaces_pending() {
        let mut actions = DelayedActions::new();
        assert!(!actions.schedule(drawer("d1"), Timestamp(0.0), 5.0));
        assert!(actions.schedule(drawer("d1"), Timestamp(3.0), 5.0));
        assert_eq!(actions.len(), 1);
        assert!(actions.drain_due(Timestamp(5.0)).is_empty());
        assert_eq!(actions.due_time(&drawer("d1")), Some(Timestamp(8.0)));
    }

    #[test]
    fn test_cancel() {
        let mut actions = DelayedActions::new();
        actions.schedule(drawer("d1"), Timestamp(0.0), 1.0);
        assert!(actions.cancel(&drawer("d1")));
        assert!(!actions.cancel(&drawer("d1")));
        assert!(actions.drain_due(Timestamp(10.0)).is_empty());
    }

    #[test]
    fn test_drain_order_by_due_time() {
        let mut actions = DelayedActions::new();
        actions.schedule(drawer("b"), Timestamp(0.0), 2.0);
        actions.schedule(drawer("a"), Timestamp(0.0), 3.0);
        actions.schedule(ActionTarget::SessionStart, Timestamp(0.0), 0.0);
        assert_eq!(
            actions.drain_due(Timestamp(3.0)),
            vec![ActionTarget::SessionStart, drawer("b"), drawer("a")]
        );
    }
}
