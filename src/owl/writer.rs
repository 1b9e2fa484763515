//! Document serialization: RDF/XML, JSON and the timeline page

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use super::node::{KNOWROB_IRI, KNOWROB_PREFIX, OwlDoc, OwlValue};
use super::timeline::Timeline;
use crate::error::SinkError;

/// IRI of the per-episode namespace
pub fn namespace_iri(namespace: &str) -> String {
    format!("http://knowrob.org/kb/{}.owl#", namespace)
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// `ns:name` -> `&ns;name`
fn entity_ref(qualified: &str) -> String {
    match qualified.split_once(':') {
        Some((ns, name)) => format!("&{};{}", ns, xml_escape(name)),
        None => xml_escape(qualified),
    }
}

/// Render the document as RDF/XML
pub fn to_rdf_xml(doc: &OwlDoc) -> String {
    let ns = doc.namespace.as_str();
    let mut out = String::new();
    let _ = writeln!(out, r#"<?xml version="1.0" encoding="utf-8"?>"#);
    let _ = writeln!(out, "<!DOCTYPE rdf:RDF [");
    let _ = writeln!(out, r#"  <!ENTITY owl "http://www.w3.org/2002/07/owl#">"#);
    let _ = writeln!(out, r#"  <!ENTITY xsd "http://www.w3.org/2001/XMLSchema#">"#);
    let _ = writeln!(out, r#"  <!ENTITY rdfs "http://www.w3.org/2000/01/rdf-schema#">"#);
    let _ = writeln!(out, r#"  <!ENTITY rdf "http://www.w3.org/1999/02/22-rdf-syntax-ns#">"#);
    let _ = writeln!(out, r#"  <!ENTITY {} "{}">"#, KNOWROB_PREFIX, KNOWROB_IRI);
    let _ = writeln!(out, r#"  <!ENTITY {} "{}">"#, ns, namespace_iri(ns));
    let _ = writeln!(out, "]>");
    let _ = writeln!(out);
    let _ = writeln!(out, r#"<rdf:RDF xmlns:computable="http://knowrob.org/kb/computable.owl#""#);
    let _ = writeln!(out, r#"  xmlns:owl="http://www.w3.org/2002/07/owl#""#);
    let _ = writeln!(out, r#"  xmlns:xsd="http://www.w3.org/2001/XMLSchema#""#);
    let _ = writeln!(out, r#"  xmlns:rdfs="http://www.w3.org/2000/01/rdf-schema#""#);
    let _ = writeln!(out, r#"  xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#""#);
    let _ = writeln!(out, r#"  xmlns:{}="{}""#, KNOWROB_PREFIX, KNOWROB_IRI);
    let _ = writeln!(out, r#"  xmlns:{}="{}">"#, ns, namespace_iri(ns));
    let _ = writeln!(out);
    let _ = writeln!(out, r#"  <owl:Ontology rdf:about="{}">"#, namespace_iri(ns));
    let _ = writeln!(
        out,
        r#"    <rdfs:comment>episode {} generated {}</rdfs:comment>"#,
        xml_escape(&doc.episode_id),
        doc.generated_at.to_rfc3339()
    );
    let _ = writeln!(
        out,
        r#"    <owl:imports rdf:resource="package://knowrob_common/owl/knowrob.owl"/>"#
    );
    let _ = writeln!(out, "  </owl:Ontology>");

    for node in &doc.nodes {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            r#"  <owl:NamedIndividual rdf:about="{}">"#,
            entity_ref(&node.qualified_name())
        );
        let _ = writeln!(
            out,
            r#"    <rdf:type rdf:resource="&{};{}"/>"#,
            KNOWROB_PREFIX,
            xml_escape(&node.class)
        );
        for edge in &node.edges {
            match &edge.value {
                OwlValue::Ref(target) => {
                    let _ = writeln!(
                        out,
                        r#"    <{} rdf:resource="{}"/>"#,
                        edge.predicate,
                        entity_ref(target)
                    );
                }
                OwlValue::Number(n) => {
                    let _ = writeln!(
                        out,
                        r#"    <{p} rdf:datatype="&xsd;float">{n}</{p}>"#,
                        p = edge.predicate,
                        n = n
                    );
                }
                OwlValue::Literal(s) => {
                    let _ = writeln!(
                        out,
                        r#"    <{p} rdf:datatype="&xsd;string">{v}</{p}>"#,
                        p = edge.predicate,
                        v = xml_escape(s)
                    );
                }
            }
        }
        let _ = writeln!(out, "  </owl:NamedIndividual>");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "</rdf:RDF>");
    out
}

fn write_text(path: &Path, text: &str) -> Result<(), SinkError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

pub fn write_owl(doc: &OwlDoc, path: &Path) -> Result<(), SinkError> {
    write_text(path, &to_rdf_xml(doc))
}

pub fn to_json(doc: &OwlDoc) -> Result<String, SinkError> {
    Ok(serde_json::to_string_pretty(doc)?)
}

pub fn write_json(doc: &OwlDoc, path: &Path) -> Result<(), SinkError> {
    write_text(path, &to_json(doc)?)
}

pub fn write_timeline(timeline: &Timeline, title: &str, path: &Path) -> Result<(), SinkError> {
    write_text(path, &timeline.to_html(title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owl::{NodeKind, OwlNode};
    use chrono::Utc;

    fn doc() -> OwlDoc {
        OwlDoc {
            episode_id: "ep_1".to_string(),
            namespace: "log".to_string(),
            generated_at: Utc::now(),
            nodes: vec![
                OwlNode::new(NodeKind::Event, "log", "TouchingSituation_e1", "TouchingSituation")
                    .with("startTime", OwlValue::Ref("log:timepoint_1.000".to_string()))
                    .with("note", OwlValue::Literal("a < b & c".to_string()))
                    .with("depth", OwlValue::Number(2.5)),
            ],
        }
    }

    #[test]
    fn test_rdf_xml_shape() {
        let xml = to_rdf_xml(&doc());
        assert!(xml.contains(r#"<owl:NamedIndividual rdf:about="&log;TouchingSituation_e1">"#));
        assert!(xml.contains(r#"<rdf:type rdf:resource="&knowrob;TouchingSituation"/>"#));
        assert!(xml.contains(r#"<knowrob:startTime rdf:resource="&log;timepoint_1.000"/>"#));
        assert!(xml.contains(
            r#"<knowrob:note rdf:datatype="&xsd;string">a &lt; b &amp; c</knowrob:note>"#
        ));
        assert!(xml.contains(r#"<knowrob:depth rdf:datatype="&xsd;float">2.5</knowrob:depth>"#));
        assert!(xml.contains(r#"<!ENTITY log "http://knowrob.org/kb/log.owl#">"#));
        assert!(xml.trim_end().ends_with("</rdf:RDF>"));
    }

    #[test]
    fn test_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let doc = doc();
        let owl_path = dir.path().join("nested").join("ep_1_ED.owl");
        let json_path = dir.path().join("ep_1_ED.json");
        write_owl(&doc, &owl_path).unwrap();
        write_json(&doc, &json_path).unwrap();

        assert!(fs::read_to_string(&owl_path).unwrap().contains("TouchingSituation_e1"));
        let json = fs::read_to_string(&json_path).unwrap();
        let parsed: OwlDoc = serde_json::from_str(&json).unwrap();
        assert!(parsed.same_content(&doc));
    }
}
