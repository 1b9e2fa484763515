//! Event record definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::identity::Timestamp;

/// Opaque identifier of a logged entity (actor, container, hand, ...)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        ParticipantId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        ParticipantId(id.to_string())
    }
}

/// Kind of semantic occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Touching,
    Grasping,
    PouredInto,
    PouredOut,
    Sliding,
    FurnitureStateChange,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Touching,
        EventKind::Grasping,
        EventKind::PouredInto,
        EventKind::PouredOut,
        EventKind::Sliding,
        EventKind::FurnitureStateChange,
    ];

    /// Ontology class used as the type label of the event individual
    pub fn owl_class(&self) -> &'static str {
        match self {
            EventKind::Touching => "TouchingSituation",
            EventKind::Grasping => "GraspingSomething",
            EventKind::PouredInto => "PouredInto",
            EventKind::PouredOut => "PouredOut",
            EventKind::Sliding => "SlidingSituation",
            EventKind::FurnitureStateChange => "FurnitureStateChange",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Typed object of an event property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Literal(String),
    Number(f64),
    /// Reference to another individual (rendered as a resource, not a literal)
    Ref(ParticipantId),
}

impl PropertyValue {
    pub fn literal(value: impl Into<String>) -> Self {
        PropertyValue::Literal(value.into())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

/// Predicate name -> value. Ordered so exports are deterministic.
pub type Properties = BTreeMap<String, PropertyValue>;

/// One semantic occurrence: kind, participants, time span, extra properties.
///
/// `start` is fixed at construction. `end` can be set once, by the ledger,
/// when the event is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    id: String,
    namespace: String,
    kind: EventKind,
    participants: Vec<ParticipantId>,
    start: Timestamp,
    end: Option<Timestamp>,
    properties: Properties,
}

impl EventRecord {
    pub fn new(
        id: impl Into<String>,
        namespace: impl Into<String>,
        kind: EventKind,
        participants: Vec<ParticipantId>,
        start: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            namespace: namespace.into(),
            kind,
            participants,
            start,
            end: None,
            properties: Properties::new(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `<Class>_<id>`, the local name of the event individual
    pub fn individual_name(&self) -> String {
        format!("{}_{}", self.kind.owl_class(), self.id)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
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

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.end
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    pub fn duration(&self) -> Option<f64> {
        self.end.map(|end| end.secs() - self.start.secs())
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, predicate: &str) -> Option<&PropertyValue> {
        self.properties.get(predicate)
    }

    /// Set the end time and merge the closing properties.
    ///
    /// Returns false (and changes nothing) when the record already ended.
    pub(crate) fn finish(&mut self, end: Timestamp, extra: Properties) -> bool {
        if self.end.is_some() {
            return false;
        }
        self.end = Some(end.max(self.start));
        self.properties.extend(extra);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_once() {
        let mut record = EventRecord::new(
            "e1",
            "log",
            EventKind::Touching,
            vec!["A".into(), "B".into()],
            Timestamp(1.0),
        );
        assert!(record.is_open());
        assert!(record.finish(Timestamp(2.0), Properties::new()));
        assert!(!record.finish(Timestamp(9.0), Properties::new()));
        assert_eq!(record.end(), Some(Timestamp(2.0)));
        assert_eq!(record.duration(), Some(1.0));
    }

    #[test]
    fn test_end_never_before_start() {
        let mut record =
            EventRecord::new("e1", "log", EventKind::Sliding, vec!["A".into()], Timestamp(4.0));
        record.finish(Timestamp(3.0), Properties::new());
        assert_eq!(record.end(), Some(Timestamp(4.0)));
    }

    #[test]
    fn test_individual_name() {
        let record =
            EventRecord::new("x9", "log", EventKind::Grasping, vec!["H".into()], Timestamp(0.0));
        assert_eq!(record.individual_name(), "GraspingSomething_x9");
    }

    #[test]
    fn test_property_value_json_shape() {
        let json = serde_json::to_string(&PropertyValue::Number(2.5)).unwrap();
        assert_eq!(json, r#"{"type":"number","value":2.5}"#);
    }
}
