//! Event ledger - owns every event from open to finished
//!
//! Open events live in a map keyed by [`EventKey`]; closing moves the record
//! into the append-only finished list in one step. Inconsistent signals
//! (duplicate opens, closes without an open) are logged and ignored.

use bevy::log::{debug, warn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::key::EventKey;
use super::types::{EventKind, EventRecord, ParticipantId, Properties, PropertyValue};
use crate::identity::{IdAllocator, Timestamp};

/// Per-episode metadata, exported with every document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub episode_id: String,
    pub namespace: String,
    /// Wall-clock time at which the episode started
    pub started_at: DateTime<Utc>,
    pub properties: Properties,
}

impl Metadata {
    pub fn new(episode_id: &str, namespace: &str) -> Self {
        Self::with_started_at(episode_id, namespace, Utc::now())
    }

    pub fn with_started_at(episode_id: &str, namespace: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            episode_id: episode_id.to_string(),
            namespace: namespace.to_string(),
            started_at,
            properties: Properties::new(),
        }
    }

    /// Local name of the metadata individual
    pub fn individual_name(&self) -> String {
        format!("EpisodeMetadata_{}", self.episode_id)
    }
}

/// Open and finished events of one episode
#[derive(Debug)]
pub struct Ledger {
    namespace: String,
    ids: IdAllocator,
    metadata: Metadata,
    open: BTreeMap<EventKey, EventRecord>,
    finished: Vec<EventRecord>,
}

impl Ledger {
    pub fn new(metadata: Metadata, ids: IdAllocator) -> Self {
        Self {
            namespace: metadata.namespace.clone(),
            ids,
            metadata,
            open: BTreeMap::new(),
            finished: Vec::new(),
        }
    }

    /// Build a new (not yet opened) record with a fresh id
    pub fn create_record(
        &mut self,
        kind: EventKind,
        participants: Vec<ParticipantId>,
        start: Timestamp,
    ) -> EventRecord {
        EventRecord::new(self.ids.next_id(), self.namespace.clone(), kind, participants, start)
    }

    /// Insert an open record for `key`.
    ///
    /// Returns false if an event is already open for the key; the running
    /// event keeps its original start time.
    pub fn open(&mut self, key: EventKey, record: EventRecord) -> bool {
        if !record.is_open() {
            warn!("Refusing to open already finished event {}", record.id());
            return false;
        }
        if self.open.contains_key(&key) {
            debug!("Event {} is already open, ignoring duplicate start", key);
            return false;
        }
        self.open.insert(key, record);
        true
    }

    /// Create and open an event in one call. Returns the key on success.
    ///
    /// Participants keep their given order in the record (subject first);
    /// the key sorts them.
    pub fn open_event(
        &mut self,
        kind: EventKind,
        participants: Vec<ParticipantId>,
        start: Timestamp,
        properties: Properties,
    ) -> Option<EventKey> {
        let Some(key) = EventKey::new(kind, &participants) else {
            warn!("Cannot open {} event with {} participants", kind, participants.len());
            return None;
        };
        if self.open.contains_key(&key) {
            debug!("Event {} is already open, ignoring duplicate start", key);
            return None;
        }
        let record = self
            .create_record(kind, participants, start)
            .with_properties(properties);
        self.open(key.clone(), record).then_some(key)
    }

    /// Close the event open for `key`, merging `extra` into its properties.
    ///
    /// Returns false if nothing is open for the key.
    pub fn close(&mut self, key: &EventKey, end: Timestamp, extra: Properties) -> bool {
        let Some(mut record) = self.open.remove(key) else {
            warn!("No open event for {} at {}, ignoring end signal", key, end);
            return false;
        };
        if end < record.start() {
            warn!(
                "Event {} ends ({}) before it starts ({}), clamping",
                key,
                end,
                record.start()
            );
        }
        record.finish(end, extra);
        self.finished.push(record);
        true
    }

    /// Close every open event at `end`. Returns how many were closed.
    pub fn force_close_all(&mut self, end: Timestamp) -> usize {
        let open = std::mem::take(&mut self.open);
        let count = open.len();
        // Deterministic closure order: by start time, then id
        let mut records: Vec<EventRecord> = open.into_values().collect();
        records.sort_by(|a, b| a.start().cmp(&b.start()).then_with(|| a.id().cmp(b.id())));
        for mut record in records {
            record.finish(end, Properties::new());
            self.finished.push(record);
        }
        count
    }

    /// Close every open event that involves `id` (e.g. the item was removed)
    pub fn close_involving(&mut self, id: &ParticipantId, end: Timestamp) -> usize {
        let keys: Vec<EventKey> = self
            .open
            .keys()
            .filter(|key| key.involves(id))
            .cloned()
            .collect();
        for key in &keys {
            self.close(key, end, Properties::new());
        }
        keys.len()
    }

    pub fn is_open(&self, key: &EventKey) -> bool {
        self.open.contains_key(key)
    }

    pub fn open_record(&self, key: &EventKey) -> Option<&EventRecord> {
        self.open.get(key)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Finished events in closure order
    pub fn finished(&self) -> &[EventRecord] {
        &self.finished
    }

    pub fn last_finished(&self) -> Option<&EventRecord> {
        self.finished.last()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn set_metadata_property(&mut self, predicate: &str, value: PropertyValue) {
        self.metadata.properties.insert(predicate.to_string(), value);
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Ledger {
        Ledger::new(Metadata::new("ep_test", "log"), IdAllocator::sequential("ev_"))
    }

    fn ab() -> (ParticipantId, ParticipantId) {
        (ParticipantId::from("A"), ParticipantId::from("B"))
    }

    fn touch(
        ledger: &mut Ledger,
        a: &ParticipantId,
        b: &ParticipantId,
        at: f64,
    ) -> Option<EventKey> {
        let participants = vec![a.clone(), b.clone()];
        ledger.open_event(EventKind::Touching, participants, Timestamp(at), Properties::new())
    }

    #[test]
    fn test_open_close_produces_one_finished_record() {
        let mut ledger = ledger();
        let (a, b) = ab();
        let key = touch(&mut ledger, &a, &b, 1.0).unwrap();
        assert!(ledger.close(&key, Timestamp(3.5), Properties::new()));

        assert_eq!(ledger.open_count(), 0);
        assert_eq!(ledger.finished().len(), 1);
        let record = &ledger.finished()[0];
        assert_eq!(record.kind(), EventKind::Touching);
        assert_eq!(record.start(), Timestamp(1.0));
        assert_eq!(record.end(), Some(Timestamp(3.5)));
        assert_eq!(record.participants(), &[a, b]);
    }

    #[test]
    fn test_duplicate_open_is_idempotent() {
        let mut ledger = ledger();
        let (a, b) = ab();
        let first = touch(&mut ledger, &a, &b, 1.0);
        let second = touch(&mut ledger, &b, &a, 2.0);
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(ledger.open_count(), 1);

        let key = first.unwrap();
        assert_eq!(ledger.open_record(&key).unwrap().start(), Timestamp(1.0));

        // Raw open on the same key is rejected too
        let record = ledger.create_record(EventKind::Touching, vec![a, b], Timestamp(5.0));
        assert!(!ledger.open(key, record));
        assert_eq!(ledger.open_count(), 1);
    }

    #[test]
    fn test_close_unknown_key_is_ignored() {
        let mut ledger = ledger();
        let (a, b) = ab();
        let key = EventKey::pair(EventKind::Grasping, &a, &b);
        assert!(!ledger.close(&key, Timestamp(1.0), Properties::new()));
        assert!(ledger.finished().is_empty());
        assert_eq!(ledger.open_count(), 0);
    }

    #[test]
    fn test_close_merges_extra_properties() {
        let mut ledger = ledger();
        let (a, b) = ab();
        let key = ledger
            .open_event(EventKind::PouredInto, vec![a, b], Timestamp(0.0), Properties::new())
            .unwrap();
        let mut extra = Properties::new();
        extra.insert("maxPouringAngle".into(), PropertyValue::Number(80.0));
        ledger.close(&key, Timestamp(2.0), extra);
        assert_eq!(
            ledger.finished()[0].property("maxPouringAngle"),
            Some(&PropertyValue::Number(80.0))
        );
    }

    #[test]
    fn test_force_close_all_closes_exactly_once() {
        let mut ledger = ledger();
        let (a, b) = ab();
        let c = ParticipantId::from("C");
        let touching = touch(&mut ledger, &a, &b, 1.0).unwrap();
        ledger.open_event(EventKind::Grasping, vec![c, a], Timestamp(0.5), Properties::new());

        assert_eq!(ledger.force_close_all(Timestamp(10.0)), 2);
        assert_eq!(ledger.force_close_all(Timestamp(11.0)), 0);
        assert_eq!(ledger.finished().len(), 2);
        // Earlier start closes first
        assert_eq!(ledger.finished()[0].kind(), EventKind::Grasping);
        assert!(ledger.finished().iter().all(|r| r.end() == Some(Timestamp(10.0))));
        // Late end signal for a force-closed event is just a warning
        assert!(!ledger.close(&touching, Timestamp(12.0), Properties::new()));
    }

    #[test]
    fn test_reopen_after_close_creates_new_record() {
        let mut ledger = ledger();
        let (a, b) = ab();
        for (start, end) in [(1.0, 2.0), (3.0, 4.0)] {
            let key = touch(&mut ledger, &a, &b, start).unwrap();
            ledger.close(&key, Timestamp(end), Properties::new());
        }
        assert_eq!(ledger.finished().len(), 2);
        assert_ne!(ledger.finished()[0].id(), ledger.finished()[1].id());
    }

    #[test]
    fn test_close_involving() {
        let mut ledger = ledger();
        let (a, b) = ab();
        let c = ParticipantId::from("C");
        touch(&mut ledger, &a, &b, 1.0);
        touch(&mut ledger, &b, &c, 1.0);
        assert_eq!(ledger.close_involving(&a, Timestamp(2.0)), 1);
        assert_eq!(ledger.open_count(), 1);
        assert_eq!(ledger.finished().len(), 1);
    }
}
