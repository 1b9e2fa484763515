//! Delta-encoded world state sampling
//!
//! Hosts push the latest pose of each entity (and its bones). On every
//! sampling period only the entities that moved more than the configured
//! linear/angular thresholds since they were last written are emitted.

use bevy::log::debug;
use bevy::math::{Quat, Vec3};
use std::collections::BTreeMap;

use super::record::{BoneRecord, EntityRecord, PoseRecord, WorldStateRecord};
use crate::config::WorldStateConfig;
use crate::events::ParticipantId;
use crate::identity::Timestamp;
use crate::registry::ItemRegistry;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub location: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(location: Vec3, rotation: Quat) -> Self {
        Self { location, rotation }
    }
}

#[derive(Debug, Default)]
struct EntityPoses {
    root: Option<Pose>,
    bones: BTreeMap<String, Pose>,
}

#[derive(Debug)]
pub struct WorldStateTracker {
    linear_threshold_sq: f32,
    angular_threshold: f32,
    update_rate: f64,
    since_update: f64,
    current: BTreeMap<ParticipantId, EntityPoses>,
    written: BTreeMap<ParticipantId, EntityPoses>,
}

impl WorldStateTracker {
    pub fn new(config: &WorldStateConfig) -> Self {
        Self {
            linear_threshold_sq: config.linear_threshold * config.linear_threshold,
            angular_threshold: config.angular_threshold,
            update_rate: config.update_rate,
            since_update: 0.0,
            current: BTreeMap::new(),
            written: BTreeMap::new(),
        }
    }

    pub fn update_pose(&mut self, id: &ParticipantId, pose: Pose) {
        self.current.entry(id.clone()).or_default().root = Some(pose);
    }

    pub fn update_bone(&mut self, id: &ParticipantId, bone: &str, pose: Pose) {
        self.current
            .entry(id.clone())
            .or_default()
            .bones
            .insert(bone.to_string(), pose);
    }

    /// Drop all state for a removed entity
    pub fn forget(&mut self, id: &ParticipantId) -> bool {
        let tracked = self.current.remove(id).is_some();
        self.written.remove(id);
        tracked
    }

    pub fn tracked_count(&self) -> usize {
        self.current.len()
    }

    fn moved(&self, last: Option<&Pose>, now: &Pose) -> bool {
        let Some(last) = last else {
            return true;
        };
        last.location.distance_squared(now.location) > self.linear_threshold_sq
            || last.rotation.angle_between(now.rotation) > self.angular_threshold
    }

    /// Advance the sampling clock; samples once per `update_rate`
    /// (every call when the rate is 0)
    pub fn tick(
        &mut self,
        delta_secs: f64,
        now: Timestamp,
        registry: &ItemRegistry,
    ) -> Option<WorldStateRecord> {
        if self.update_rate > 0.0 {
            self.since_update += delta_secs.max(0.0);
            if self.since_update < self.update_rate {
                return None;
            }
            self.since_update = 0.0;
        }
        self.sample(now, registry)
    }

    /// Entities that moved since last written; `None` if nothing did
    pub fn sample(&mut self, now: Timestamp, registry: &ItemRegistry) -> Option<WorldStateRecord> {
        let mut entities = Vec::new();

        for (id, poses) in &self.current {
            let Some(root) = poses.root else {
                continue;
            };
            let last = self.written.get(id);
            let root_moved = self.moved(last.and_then(|l| l.root.as_ref()), &root);

            let item = registry.get(id);
            let bones: Vec<BoneRecord> = poses
                .bones
                .iter()
                .filter(|(name, pose)| self.moved(last.and_then(|l| l.bones.get(*name)), pose))
                .map(|(name, pose)| BoneRecord {
                    name: name.clone(),
                    class: item
                        .and_then(|i| i.bones.get(name))
                        .cloned()
                        .unwrap_or_else(|| name.clone()),
                    pose: PoseRecord::new(pose.location, pose.rotation),
                })
                .collect();

            if !root_moved && bones.is_empty() {
                continue;
            }
            entities.push(EntityRecord {
                id: id.to_string(),
                class: registry.class_of(id).to_string(),
                pose: PoseRecord::new(root.location, root.rotation),
                bones,
            });
        }

        if entities.is_empty() {
            return None;
        }
        for entity in &entities {
            let id = ParticipantId::new(entity.id.as_str());
            let Some(current) = self.current.get(&id) else {
                continue;
            };
            let written = self.written.entry(id).or_default();
            written.root = current.root;
            for bone in &entity.bones {
                if let Some(pose) = current.bones.get(&bone.name) {
                    written.bones.insert(bone.name.clone(), *pose);
                }
            }
        }
        debug!("World state at {}: {} entities changed", now, entities.len());
        Some(WorldStateRecord {
            timestamp: now,
            entities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegisteredItem;

    fn tracker(update_rate: f64) -> WorldStateTracker {
        WorldStateTracker::new(&WorldStateConfig {
            enabled: true,
            linear_threshold: 0.5,
            angular_threshold: 0.01,
            update_rate,
            ..WorldStateConfig::default()
        })
    }

    fn at(x: f32) -> Pose {
        Pose::new(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY)
    }

    #[test]
    fn test_only_moved_entities_written() {
        let mut registry = ItemRegistry::new();
        registry.register(RegisteredItem::new("Cup", "Cup"));
        let mut tracker = tracker(0.0);
        let (cup, bowl) = (ParticipantId::from("Cup"), ParticipantId::from("Bowl"));

        tracker.update_pose(&cup, at(0.0));
        tracker.update_pose(&bowl, at(5.0));
        let first = tracker.sample(Timestamp(0.0), &registry).unwrap();
        assert_eq!(first.entities.len(), 2);
        assert_eq!(first.entity("Cup").unwrap().class, "Cup");
        assert_eq!(first.entity("Bowl").unwrap().class, "Thing");

        // Below the threshold: nothing written, no empty record
        tracker.update_pose(&cup, at(0.3));
        assert!(tracker.sample(Timestamp(0.1), &registry).is_none());

        // Accumulated drift since the last write crosses it
        tracker.update_pose(&cup, at(0.6));
        let third = tracker.sample(Timestamp(0.2), &registry).unwrap();
        assert_eq!(third.entities.len(), 1);
        assert_eq!(third.entities[0].id, "Cup");

        tracker.update_pose(&bowl, Pose::new(Vec3::new(5.0, 0.0, 0.0), Quat::from_rotation_z(0.2)));
        let fourth = tracker.sample(Timestamp(0.3), &registry).unwrap();
        assert_eq!(fourth.entities[0].id, "Bowl");
    }

    #[test]
    fn test_update_rate_gates_sampling() {
        let registry = ItemRegistry::new();
        let mut tracker = tracker(0.5);
        let cup = ParticipantId::from("Cup");
        tracker.update_pose(&cup, at(0.0));
        assert!(tracker.tick(0.2, Timestamp(0.2), &registry).is_none());
        assert!(tracker.tick(0.2, Timestamp(0.4), &registry).is_none());
        assert!(tracker.tick(0.2, Timestamp(0.6), &registry).is_some());
    }

    #[test]
    fn test_bones_and_forget() {
        let mut registry = ItemRegistry::new();
        registry.register(
            RegisteredItem::new("Hand", "RightHand").with_bone("index_01", "IndexFinger"),
        );
        let mut tracker = tracker(0.0);
        let hand = ParticipantId::from("Hand");

        tracker.update_pose(&hand, at(0.0));
        tracker.update_bone(&hand, "index_01", at(0.1));
        let first = tracker.sample(Timestamp(0.0), &registry).unwrap();
        assert_eq!(first.entities[0].bones.len(), 1);
        assert_eq!(first.entities[0].bones[0].class, "IndexFinger");

        // Only the bone moves: entity is written with just that bone
        tracker.update_bone(&hand, "index_01", at(2.0));
        let second = tracker.sample(Timestamp(0.1), &registry).unwrap();
        assert_eq!(second.entities[0].bones.len(), 1);

        assert!(tracker.forget(&hand));
        assert_eq!(tracker.tracked_count(), 0);
        assert!(tracker.sample(Timestamp(0.2), &registry).is_none());

        // Seen again after removal counts as a first sighting
        tracker.update_pose(&hand, at(0.0));
        assert!(tracker.sample(Timestamp(0.3), &registry).is_some());
    }
}
