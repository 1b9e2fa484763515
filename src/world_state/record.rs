//! Serialized world state shapes

use bevy::math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::identity::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// `{loc:{x,y,z}, rot:{x,y,z,w}}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub loc: Location,
    pub rot: Rotation,
}

impl PoseRecord {
    pub fn new(location: Vec3, rotation: Quat) -> Self {
        Self {
            loc: Location {
                x: location.x,
                y: location.y,
                z: location.z,
            },
            rot: Rotation {
                x: rotation.x,
                y: rotation.y,
                z: rotation.z,
                w: rotation.w,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneRecord {
    pub name: String,
    pub class: String,
    pub pose: PoseRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub class: String,
    pub pose: PoseRecord,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bones: Vec<BoneRecord>,
}

/// Entities that moved since the previous record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldStateRecord {
    pub timestamp: Timestamp,
    pub entities: Vec<EntityRecord>,
}

impl WorldStateRecord {
    pub fn entity(&self, id: &str) -> Option<&EntityRecord> {
        self.entities.iter().find(|e| e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let record = WorldStateRecord {
            timestamp: Timestamp(1.5),
            entities: vec![EntityRecord {
                id: "Cup".to_string(),
                class: "Cup".to_string(),
                pose: PoseRecord::new(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY),
                bones: Vec::new(),
            }],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["timestamp"], 1.5);
        assert_eq!(json["entities"][0]["pose"]["loc"]["z"], 3.0);
        assert_eq!(json["entities"][0]["pose"]["rot"]["w"], 1.0);
        assert!(json["entities"][0].get("bones").is_none());
    }
}
