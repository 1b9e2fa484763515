//! Request and response bodies of the KnowRob episode REST API
//!
//! Times and angles travel as decimal strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::EventKind;

pub const CREATE_EPISODE: &str = "create_episode";
pub const ADD_SUBACTION: &str = "add_subaction_with_task";
pub const ADD_POURING_INFO: &str = "add_additional_pouring_information";
pub const FINISH_EPISODE: &str = "finish_episode";

/// Seconds (or degrees) as sent on the wire
pub fn decimal(value: f64) -> String {
    format!("{:.6}", value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEpisode {
    pub game_participant: String,
    pub game_start_time: String,
}

/// Response of `create_episode`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeCreated {
    #[serde(rename = "Episode")]
    pub episode: String,
    #[serde(rename = "Action")]
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAction {
    pub parent_action_id: String,
    pub sub_action_type: String,
    pub task_type: String,
    pub start_time: String,
    pub end_time: String,
    /// `[Class:label,Class:label]`
    pub objects_participated: String,
    pub additional_info: String,
    pub game_participant: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PouringInfo {
    pub parent_action_id: String,
    pub sub_action_type: String,
    pub max_pouring_angle: String,
    pub min_pouring_angle: String,
    pub source_container: String,
    pub destination_container: String,
    pub pouring_pose: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishEpisode {
    pub episode_iri: String,
    pub game_end_time: String,
}

/// Key names used by the KnowRob server for fields named differently here
const SERVER_KEYS: [(&str, &str); 2] = [
    ("parent_action_id", "parent_action_iri"),
    ("additional_info", "additional_event_info"),
];

/// Rename request keys to the ones the KnowRob server reads
pub fn server_keys(mut body: Value) -> Value {
    if let Some(fields) = body.as_object_mut() {
        for (ours, theirs) in SERVER_KEYS {
            if let Some(value) = fields.remove(ours) {
                fields.insert(theirs.to_string(), value);
            }
        }
    }
    body
}

/// `(sub_action_type, task_type)` for kinds that are pushed
pub fn action_types(kind: EventKind) -> Option<(&'static str, &'static str)> {
    match kind {
        EventKind::Touching => Some(("soma:'Touch'", "soma:'Touching'")),
        EventKind::Grasping => Some(("soma:'Grasp'", "soma:'Grasping'")),
        EventKind::PouredInto | EventKind::PouredOut => Some(("soma:'Pour'", "soma:'Pouring'")),
        EventKind::Sliding => Some(("soma:'Slide'", "soma:'Sliding'")),
        EventKind::FurnitureStateChange => None,
    }
}

/// `[a,b,c]` from `Class:label` entries
pub fn objects_participated<I, S>(entries: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined: Vec<String> = entries.into_iter().map(|s| s.as_ref().to_string()).collect();
    format!("[{}]", joined.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objects_participated_format() {
        assert_eq!(
            objects_participated(["Cup:BlueCup", "Hand:RightHand"]),
            "[Cup:BlueCup,Hand:RightHand]"
        );
        assert_eq!(objects_participated(Vec::<String>::new()), "[]");
    }

    #[test]
    fn test_episode_response_field_names() {
        let parsed: EpisodeCreated =
            serde_json::from_str(r#"{"Episode":"ep_iri","Action":"act_iri"}"#).unwrap();
        assert_eq!(parsed.episode, "ep_iri");
        assert_eq!(parsed.action, "act_iri");
    }

    #[test]
    fn test_action_types() {
        assert_eq!(
            action_types(EventKind::PouredOut),
            Some(("soma:'Pour'", "soma:'Pouring'"))
        );
        assert!(action_types(EventKind::FurnitureStateChange).is_none());
        assert_eq!(decimal(12.5), "12.500000");
    }

    #[test]
    fn test_server_keys_renames_iri_fields() {
        let request = SubAction {
            parent_action_id: "act".to_string(),
            sub_action_type: "soma:'Touch'".to_string(),
            task_type: "soma:'Touching'".to_string(),
            start_time: decimal(1.0),
            end_time: decimal(2.0),
            objects_participated: "[]".to_string(),
            additional_info: String::new(),
            game_participant: "tester".to_string(),
        };
        let body = server_keys(serde_json::to_value(&request).unwrap());
        assert_eq!(body["parent_action_iri"], "act");
        assert_eq!(body["additional_event_info"], "");
        assert!(body.get("parent_action_id").is_none());
        assert!(body.get("additional_info").is_none());
        assert_eq!(body["task_type"], "soma:'Touching'");
    }
}
