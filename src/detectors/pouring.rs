//! Pouring detection with pose tracking of the active container
//!
//! While a pour is open every pose sample of its source container is kept.
//! On close the samples are reduced to the extreme tilt angles (rotation
//! about X) and attached, together with the raw pose list, to the record.

use bevy::log::{debug, warn};
use bevy::math::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::events::{EventKey, EventKind, Ledger, ParticipantId, Properties, PropertyValue};
use crate::identity::Timestamp;

/// Direction of a pour, relative to the logged container pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PourKind {
    /// Source poured into destination
    Into,
    /// Source poured out (spilled, emptied) with destination as the target area
    Out,
}

impl PourKind {
    pub fn event_kind(self) -> EventKind {
        match self {
            PourKind::Into => EventKind::PouredInto,
            PourKind::Out => EventKind::PouredOut,
        }
    }
}

/// Sampled pose of a container
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub location: Vec3,
    /// Euler angles in degrees: x = roll, y = pitch, z = yaw
    pub rotation: Vec3,
    pub timestamp: Timestamp,
}

impl PoseSample {
    pub fn new(location: Vec3, rotation: Vec3, timestamp: Timestamp) -> Self {
        Self {
            location,
            rotation,
            timestamp,
        }
    }

    fn to_json(self) -> serde_json::Value {
        serde_json::json!({
            "t": self.timestamp.secs(),
            "loc": [self.location.x, self.location.y, self.location.z],
            "rot": [self.rotation.x, self.rotation.y, self.rotation.z],
        })
    }
}

/// Extreme tilt angle and the full rotation at which it occurred
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleExtremum {
    pub angle: f32,
    pub rotation: Vec3,
    pub timestamp: Timestamp,
}

impl AngleExtremum {
    fn from_sample(sample: &PoseSample) -> Self {
        Self {
            angle: sample.rotation.x,
            rotation: sample.rotation,
            timestamp: sample.timestamp,
        }
    }

    /// `x,y,z` with two decimals
    pub fn rotation_label(&self) -> String {
        format!("{:.2},{:.2},{:.2}", self.rotation.x, self.rotation.y, self.rotation.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PouringExtrema {
    pub max: AngleExtremum,
    pub min: AngleExtremum,
}

/// Min/max rotation about X over all samples; `None` without samples.
///
/// On ties the earliest sample wins.
pub fn pouring_extrema(samples: &[PoseSample]) -> Option<PouringExtrema> {
    let first = samples.first()?;
    let mut max = AngleExtremum::from_sample(first);
    let mut min = max;
    for sample in &samples[1..] {
        if sample.rotation.x > max.angle {
            max = AngleExtremum::from_sample(sample);
        }
        if sample.rotation.x < min.angle {
            min = AngleExtremum::from_sample(sample);
        }
    }
    Some(PouringExtrema { max, min })
}

/// What a closed pour produced (used for the knowledge-base push)
#[derive(Debug, Clone, PartialEq)]
pub struct PourSummary {
    pub event_id: String,
    pub kind: PourKind,
    pub source: ParticipantId,
    pub destination: ParticipantId,
    pub extrema: Option<PouringExtrema>,
    pub poses: Vec<PoseSample>,
}

impl PourSummary {
    /// Pose list as a JSON array string
    pub fn poses_json(&self) -> String {
        poses_json(&self.poses)
    }
}

fn poses_json(poses: &[PoseSample]) -> String {
    serde_json::Value::Array(poses.iter().map(|p| p.to_json()).collect()).to_string()
}

#[derive(Debug)]
struct ActivePour {
    kind: PourKind,
    source: ParticipantId,
    destination: ParticipantId,
    samples: Vec<PoseSample>,
}

#[derive(Debug, Default)]
pub struct PouringDetector {
    active: BTreeMap<EventKey, ActivePour>,
}

impl PouringDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pour from `source` to `destination`
    pub fn begin(
        &mut self,
        ledger: &mut Ledger,
        source: &ParticipantId,
        destination: &ParticipantId,
        kind: PourKind,
        at: Timestamp,
    ) -> bool {
        if source == destination {
            warn!("Rejecting pour of {} into itself", source);
            return false;
        }
        let mut properties = Properties::new();
        properties.insert("sourceContainer".into(), PropertyValue::Ref(source.clone()));
        properties.insert("destinationContainer".into(), PropertyValue::Ref(destination.clone()));

        let Some(key) = ledger.open_event(
            kind.event_kind(),
            vec![source.clone(), destination.clone()],
            at,
            properties,
        ) else {
            return false;
        };
        self.active.insert(
            key,
            ActivePour {
                kind,
                source: source.clone(),
                destination: destination.clone(),
                samples: Vec::new(),
            },
        );
        true
    }

    /// Record a pose of `container` for every open pour it is the source of.
    /// Returns how many pours took the sample.
    pub fn sample(&mut self, container: &ParticipantId, pose: PoseSample) -> usize {
        let mut taken = 0;
        for pour in self.active.values_mut().filter(|p| &p.source == container) {
            pour.samples.push(pose);
            taken += 1;
        }
        taken
    }

    /// End a pour, attaching extrema and the pose list to the record
    pub fn end(
        &mut self,
        ledger: &mut Ledger,
        source: &ParticipantId,
        destination: &ParticipantId,
        kind: PourKind,
        at: Timestamp,
    ) -> Option<PourSummary> {
        let key = EventKey::pair(kind.event_kind(), source, destination);
        let Some(pour) = self.active.remove(&key) else {
            warn!("No open pour for {}, ignoring end signal", key);
            return None;
        };
        self.close(ledger, key, pour, at)
    }

    /// End every open pour (session teardown)
    pub fn end_all(&mut self, ledger: &mut Ledger, at: Timestamp) -> Vec<PourSummary> {
        let active = std::mem::take(&mut self.active);
        active
            .into_iter()
            .filter_map(|(key, pour)| self.close(ledger, key, pour, at))
            .collect()
    }

    /// Drop tracking for pours involving a removed item (the ledger closes them)
    pub fn forget(&mut self, id: &ParticipantId) -> usize {
        let before = self.active.len();
        self.active.retain(|key, _| !key.involves(id));
        before - self.active.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Samples collected so far for an open pour
    pub fn sample_count(
        &self,
        source: &ParticipantId,
        destination: &ParticipantId,
        kind: PourKind,
    ) -> usize {
        self.active
            .get(&EventKey::pair(kind.event_kind(), source, destination))
            .map(|p| p.samples.len())
            .unwrap_or(0)
    }

    fn close(
        &mut self,
        ledger: &mut Ledger,
        key: EventKey,
        pour: ActivePour,
        at: Timestamp,
    ) -> Option<PourSummary> {
        let extrema = pouring_extrema(&pour.samples);
        let mut extra = Properties::new();
        extra.insert("poseSampleCount".into(), PropertyValue::Number(pour.samples.len() as f64));
        if let Some(extrema) = &extrema {
            let (max, min) = (&extrema.max, &extrema.min);
            extra.insert("maxPouringAngle".into(), PropertyValue::Number(max.angle as f64));
            extra.insert("maxPouringRotation".into(), PropertyValue::literal(max.rotation_label()));
            extra.insert("minPouringAngle".into(), PropertyValue::Number(min.angle as f64));
            extra.insert("minPouringRotation".into(), PropertyValue::literal(min.rotation_label()));
            extra.insert("pouringPose".into(), PropertyValue::literal(poses_json(&pour.samples)));
        } else {
            debug!("Pour {} closed without pose samples, no extrema", key);
        }

        if !ledger.close(&key, at, extra) {
            return None;
        }
        let event_id = ledger.last_finished().map(|r| r.id().to_string()).unwrap_or_default();
        Some(PourSummary {
            event_id,
            kind: pour.kind,
            source: pour.source,
            destination: pour.destination,
            extrema,
            poses: pour.samples,
        })
    }
}
