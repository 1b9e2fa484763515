//! Ledger -> document assembly
//!
//! Node order is fixed: metadata, events (closure order), objects (by id),
//! timepoints (by time). Objects and timepoints are collected into an
//! [`IndividualRegistry`] first so each is emitted exactly once.

use bevy::log::debug;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::node::{NodeKind, OwlDoc, OwlNode, OwlValue, qualify};
use crate::events::{EventKind, Ledger, ParticipantId, PropertyValue};
use crate::identity::Timestamp;
use crate::registry::RegisteredItem;

/// Class and label of an object individual
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub class: String,
    pub label: String,
}

impl ObjectInfo {
    /// Used for ids nobody registered
    pub fn unknown(id: &ParticipantId) -> Self {
        Self {
            class: "Thing".to_string(),
            label: id.to_string(),
        }
    }
}

impl From<&RegisteredItem> for ObjectInfo {
    fn from(item: &RegisteredItem) -> Self {
        Self {
            class: item.class.clone(),
            label: item.label.clone(),
        }
    }
}

/// Timestamp snapped to the millisecond, the precision of timepoint names
fn snap(ts: Timestamp) -> (i64, Timestamp) {
    let millis = (ts.secs() * 1000.0).round() as i64;
    (millis, Timestamp(millis as f64 / 1000.0))
}

/// Distinct objects and instants referenced by the exported events
#[derive(Debug, Default)]
pub struct IndividualRegistry {
    objects: BTreeMap<ParticipantId, ObjectInfo>,
    timepoints: BTreeMap<i64, Timestamp>,
}

impl IndividualRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// First registration wins. Returns false if the id was already known.
    pub fn register_object(&mut self, id: &ParticipantId, info: ObjectInfo) -> bool {
        if self.objects.contains_key(id) {
            return false;
        }
        self.objects.insert(id.clone(), info);
        true
    }

    /// Register an instant and return its node name
    pub fn register_timepoint(&mut self, ts: Timestamp) -> String {
        let (millis, snapped) = snap(ts);
        self.timepoints.entry(millis).or_insert(snapped);
        snapped.label()
    }

    pub fn objects(&self) -> impl Iterator<Item = (&ParticipantId, &ObjectInfo)> {
        self.objects.iter()
    }

    /// Registered instants in time order
    pub fn timepoints(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.timepoints.values().copied()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn timepoint_count(&self) -> usize {
        self.timepoints.len()
    }
}

/// Predicate linking an event to each of its participants
fn participant_predicate(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Touching => "inContact",
        EventKind::FurnitureStateChange => "objectActedOn",
        _ => "hasParticipant",
    }
}

/// Build the episode document from the ledger's finished events.
///
/// `lookup` resolves class/label of participants; unresolved ids become
/// `Thing` individuals labelled with their id.
pub fn assemble<F>(ledger: &Ledger, lookup: F, generated_at: DateTime<Utc>) -> OwlDoc
where
    F: Fn(&ParticipantId) -> Option<ObjectInfo>,
{
    let ns = ledger.namespace();
    let metadata = ledger.metadata();
    let mut individuals = IndividualRegistry::new();
    let register = |individuals: &mut IndividualRegistry, id: &ParticipantId| {
        if !individuals.objects.contains_key(id) {
            let info = lookup(id).unwrap_or_else(|| ObjectInfo::unknown(id));
            individuals.register_object(id, info);
        }
    };

    let meta_individual = metadata.individual_name();
    let mut meta_node = OwlNode::new(NodeKind::Metadata, ns, meta_individual, "EpisodeMetadata")
        .with("experimentName", OwlValue::Literal(metadata.episode_id.clone()))
        .with("experimentStartTime", OwlValue::Literal(metadata.started_at.to_rfc3339()));
    for (predicate, value) in &metadata.properties {
        if let PropertyValue::Ref(id) = value {
            register(&mut individuals, id);
        }
        meta_node.push(predicate, to_owl_value(ns, value));
    }
    let meta_name = meta_node.qualified_name();

    let mut event_nodes = Vec::with_capacity(ledger.finished().len());
    for record in ledger.finished() {
        let Some(end) = record.end() else {
            debug!("Skipping unfinished record {} during export", record.id());
            continue;
        };
        let class = record.kind().owl_class();
        let mut node = OwlNode::new(NodeKind::Event, ns, record.individual_name(), class);
        let start_name = individuals.register_timepoint(record.start());
        let end_name = individuals.register_timepoint(end);
        node.push("startTime", OwlValue::Ref(qualify(ns, &start_name)));
        node.push("endTime", OwlValue::Ref(qualify(ns, &end_name)));
        node.push("inEpisode", OwlValue::Ref(meta_name.clone()));

        for participant in record.participants() {
            register(&mut individuals, participant);
            node.push(
                participant_predicate(record.kind()),
                OwlValue::Ref(qualify(ns, participant.as_str())),
            );
        }
        for (predicate, value) in record.properties() {
            if let PropertyValue::Ref(id) = value {
                register(&mut individuals, id);
            }
            node.push(predicate, to_owl_value(ns, value));
        }

        meta_node.push("subAction", OwlValue::Ref(node.qualified_name()));
        event_nodes.push(node);
    }

    let mut nodes = Vec::with_capacity(
        1 + event_nodes.len() + individuals.object_count() + individuals.timepoint_count(),
    );
    nodes.push(meta_node);
    nodes.extend(event_nodes);
    for (id, info) in individuals.objects() {
        nodes.push(
            OwlNode::new(NodeKind::Object, ns, id.as_str(), info.class.as_str())
                .with("label", OwlValue::Literal(info.label.clone())),
        );
    }
    for ts in individuals.timepoints() {
        nodes.push(
            OwlNode::new(NodeKind::Timepoint, ns, ts.label(), "TimePoint")
                .with("timeValue", OwlValue::Number(ts.secs())),
        );
    }

    OwlDoc {
        episode_id: metadata.episode_id.clone(),
        namespace: ns.to_string(),
        generated_at,
        nodes,
    }
}

fn to_owl_value(ns: &str, value: &PropertyValue) -> OwlValue {
    match value {
        PropertyValue::Literal(s) => OwlValue::Literal(s.clone()),
        PropertyValue::Number(n) => OwlValue::Number(*n),
        PropertyValue::Ref(id) => OwlValue::Ref(qualify(ns, id.as_str())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Metadata, Properties};
    use crate::identity::IdAllocator;

    fn ledger() -> Ledger {
        Ledger::new(Metadata::new("ep_1", "log"), IdAllocator::sequential("ev_"))
    }

    fn touch(ledger: &mut Ledger, a: &str, b: &str, start: f64, end: f64) {
        let participants = vec![a.into(), b.into()];
        let key = ledger
            .open_event(EventKind::Touching, participants, Timestamp(start), Properties::new())
            .unwrap();
        ledger.close(&key, Timestamp(end), Properties::new());
    }

    fn no_lookup(_: &ParticipantId) -> Option<ObjectInfo> {
        None
    }

    #[test]
    fn test_shared_end_time_single_timepoint() {
        let mut ledger = ledger();
        touch(&mut ledger, "A", "B", 1.0, 3.5);
        touch(&mut ledger, "C", "D", 2.0, 3.5);

        let doc = assemble(&ledger, no_lookup, Utc::now());
        assert_eq!(doc.count(NodeKind::Event), 2);
        // 1.0, 2.0, 3.5
        assert_eq!(doc.count(NodeKind::Timepoint), 3);
        assert_eq!(doc.count(NodeKind::Object), 4);
        assert_eq!(doc.count(NodeKind::Metadata), 1);

        let ends: Vec<&OwlValue> = doc
            .nodes_of(NodeKind::Event)
            .flat_map(|n| n.values("endTime"))
            .collect();
        assert_eq!(ends[0], ends[1]);
        assert_eq!(ends[0], &OwlValue::Ref("log:timepoint_3.500".to_string()));
        assert!(doc.find("log:timepoint_3.500").is_some());
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let mut ledger = ledger();
        touch(&mut ledger, "B", "A", 1.0, 2.0);
        touch(&mut ledger, "A", "C", 1.5, 4.0);
        let first = assemble(&ledger, no_lookup, Utc::now());
        let second = assemble(&ledger, no_lookup, Utc::now());
        assert!(first.same_content(&second));
    }

    #[test]
    fn test_node_order_and_edges() {
        let mut ledger = ledger();
        let key = ledger
            .open_event(
                EventKind::Grasping,
                vec!["Hand".into(), "Cup".into()],
                Timestamp(0.25),
                Properties::from([("performedBy".to_string(), PropertyValue::Ref("Hand".into()))]),
            )
            .unwrap();
        ledger.close(&key, Timestamp(1.0), Properties::new());

        let lookup = |id: &ParticipantId| {
            (id.as_str() == "Cup").then(|| ObjectInfo {
                class: "Cup".to_string(),
                label: "BlueCup".to_string(),
            })
        };
        let doc = assemble(&ledger, lookup, Utc::now());
        let kinds: Vec<NodeKind> = doc.nodes.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Metadata,
                NodeKind::Event,
                NodeKind::Object,
                NodeKind::Object,
                NodeKind::Timepoint,
                NodeKind::Timepoint
            ]
        );

        let event = &doc.nodes[1];
        assert_eq!(event.class, "GraspingSomething");
        assert_eq!(event.name, "GraspingSomething_ev_0001");
        assert_eq!(event.values("hasParticipant").count(), 2);
        assert_eq!(
            event.values("inEpisode").next(),
            Some(&OwlValue::Ref("log:EpisodeMetadata_ep_1".to_string()))
        );

        let cup = doc.find("log:Cup").unwrap();
        assert_eq!(cup.class, "Cup");
        assert_eq!(cup.values("label").next(), Some(&OwlValue::Literal("BlueCup".to_string())));
        assert_eq!(doc.find("log:Hand").unwrap().class, "Thing");

        let metadata = &doc.nodes[0];
        assert_eq!(metadata.values("subAction").count(), 1);
    }

    #[test]
    fn test_timepoints_dedup_at_millisecond() {
        let mut individuals = IndividualRegistry::new();
        let a = individuals.register_timepoint(Timestamp(1.0));
        let b = individuals.register_timepoint(Timestamp(1.0002));
        let c = individuals.register_timepoint(Timestamp(0.5));
        assert_eq!(a, b);
        assert_eq!(c, "timepoint_0.500");
        assert_eq!(individuals.timepoint_count(), 2);
        let ordered: Vec<Timestamp> = individuals.timepoints().collect();
        assert_eq!(ordered, vec![Timestamp(0.5), Timestamp(1.0)]);
    }
}
