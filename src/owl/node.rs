//! Graph document model: named individuals with ordered property edges

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of the shared vocabulary (classes and predicates)
pub const KNOWROB_PREFIX: &str = "knowrob";
pub const KNOWROB_IRI: &str = "http://knowrob.org/kb/knowrob.owl#";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Metadata,
    Event,
    Object,
    Timepoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OwlValue {
    Literal(String),
    Number(f64),
    /// Qualified name of another node (`ns:name`)
    Ref(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwlEdge {
    /// Qualified predicate, e.g. `knowrob:startTime`
    pub predicate: String,
    pub value: OwlValue,
}

/// One individual of the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwlNode {
    pub kind: NodeKind,
    pub namespace: String,
    pub name: String,
    /// Type label (vocabulary class)
    pub class: String,
    pub edges: Vec<OwlEdge>,
}

impl OwlNode {
    pub fn new(
        kind: NodeKind,
        namespace: &str,
        name: impl Into<String>,
        class: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            namespace: namespace.to_string(),
            name: name.into(),
            class: class.into(),
            edges: Vec::new(),
        }
    }

    pub fn qualified_name(&self) -> String {
        qualify(&self.namespace, &self.name)
    }

    /// Append an edge in the vocabulary namespace
    pub fn push(&mut self, predicate: &str, value: OwlValue) {
        self.edges.push(OwlEdge {
            predicate: qualify(KNOWROB_PREFIX, predicate),
            value,
        });
    }

    pub fn with(mut self, predicate: &str, value: OwlValue) -> Self {
        self.push(predicate, value);
        self
    }

    /// Values of every edge with the given local predicate name
    pub fn values<'a>(&'a self, predicate: &'a str) -> impl Iterator<Item = &'a OwlValue> + 'a {
        let qualified = qualify(KNOWROB_PREFIX, predicate);
        self.edges
            .iter()
            .filter(move |e| e.predicate == qualified)
            .map(|e| &e.value)
    }
}

pub fn qualify(namespace: &str, name: &str) -> String {
    format!("{}:{}", namespace, name)
}

/// Assembled episode document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwlDoc {
    pub episode_id: String,
    pub namespace: String,
    /// Wall-clock export time; the only field that differs between re-exports
    pub generated_at: DateTime<Utc>,
    pub nodes: Vec<OwlNode>,
}

impl OwlDoc {
    pub fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &OwlNode> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes_of(kind).count()
    }

    pub fn find(&self, qualified_name: &str) -> Option<&OwlNode> {
        self.nodes.iter().find(|n| n.qualified_name() == qualified_name)
    }

    /// Equal apart from `generated_at`
    pub fn same_content(&self, other: &OwlDoc) -> bool {
        self.episode_id == other.episode_id
            && self.namespace == other.namespace
            && self.nodes == other.nodes
    }
}
