//! Document assembly and export
//!
//! Turns the ledger's finished events into a graph document of named
//! individuals (metadata, events, objects, timepoints) and writes it out as
//! RDF/XML or JSON. Timelines are an alternative per-participant view.

mod assembler;
mod node;
mod timeline;
mod writer;

pub use assembler::{IndividualRegistry, ObjectInfo, assemble};
pub use node::{KNOWROB_IRI, KNOWROB_PREFIX, NodeKind, OwlDoc, OwlEdge, OwlNode, OwlValue, qualify};
pub use timeline::{Timeline, TimelineInterval};
pub use writer::{namespace_iri, to_json, to_rdf_xml, write_json, write_owl, write_timeline};
