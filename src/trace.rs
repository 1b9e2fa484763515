//! Signal traces
//!
//! A trace is a JSON-lines recording of the signals a host feeds into a
//! session, one object per line:
//!
//! ```text
//! {"t":0.0,"signal":"register_item","id":"Cup","class":"Cup"}
//! {"t":1.0,"signal":"contact_begin","a":"Cup","b":"Table"}
//! {"signal":"tick","dt":0.5}
//! {"t":3.5,"signal":"contact_end","a":"Cup","b":"Table"}
//! ```
//!
//! `t` is optional episode time; replay advances the session clock to it
//! before applying the signal. Lines that fail to parse are skipped and
//! reported, blank lines and `#` comments are ignored.

use bevy::log::{debug, warn};
use bevy::math::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::constants::DOOR_FREE_SWING;
use crate::detectors::{FurnitureJoint, FurnitureReading, PourKind};
use crate::error::SinkError;
use crate::events::ParticipantId;
use crate::registry::RegisteredItem;
use crate::session::SemLogSession;
use crate::world_state::Pose;

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

/// Joint of a traced drawer or door
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceJoint {
    Drawer { initial_location: [f32; 3] },
    /// Limits default to a free swing around the closed angle
    Door {
        closed_angle: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_angle: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_angle: Option<f32>,
    },
}

impl From<TraceJoint> for FurnitureJoint {
    fn from(joint: TraceJoint) -> Self {
        match joint {
            TraceJoint::Drawer { initial_location } => FurnitureJoint::Drawer {
                initial_location: Vec3::from_array(initial_location),
            },
            TraceJoint::Door {
                closed_angle,
                min_angle,
                max_angle,
            } => FurnitureJoint::Door {
                closed_angle,
                min_angle: min_angle.unwrap_or(closed_angle - DOOR_FREE_SWING),
                max_angle: max_angle.unwrap_or(closed_angle + DOOR_FREE_SWING),
            },
        }
    }
}

/// `{"linear":[x,y,z]}` or `{"angular":deg}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceReading {
    Linear([f32; 3]),
    Angular(f32),
}

impl From<TraceReading> for FurnitureReading {
    fn from(reading: TraceReading) -> Self {
        match reading {
            TraceReading::Linear(location) => FurnitureReading::Linear(Vec3::from_array(location)),
            TraceReading::Angular(angle) => FurnitureReading::Angular(angle),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum TraceSignal {
    RegisterItem {
        id: String,
        class: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        /// Hands and grippers
        #[serde(default)]
        manipulator: bool,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        bones: BTreeMap<String, String>,
    },
    RegisterFurniture {
        id: String,
        class: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        joint: TraceJoint,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial: Option<TraceReading>,
    },
    RemoveItem {
        id: String,
    },
    ContactBegin {
        a: String,
        b: String,
    },
    ContactEnd {
        a: String,
        b: String,
    },
    GraspBegin {
        manipulator: String,
        object: String,
    },
    GraspEnd {
        manipulator: String,
        object: String,
    },
    SlideBegin {
        a: String,
        b: String,
    },
    SlideEnd {
        a: String,
        b: String,
    },
    PourBegin {
        source: String,
        destination: String,
        #[serde(default = "default_pour_kind")]
        kind: PourKind,
    },
    PourEnd {
        source: String,
        destination: String,
        #[serde(default = "default_pour_kind")]
        kind: PourKind,
    },
    /// Entity pose, rotation as a quaternion `[x,y,z,w]`
    Pose {
        id: String,
        location: [f32; 3],
        #[serde(default = "identity_rotation")]
        rotation: [f32; 4],
    },
    Bone {
        id: String,
        bone: String,
        location: [f32; 3],
        #[serde(default = "identity_rotation")]
        rotation: [f32; 4],
    },
    FurnitureReading {
        id: String,
        reading: TraceReading,
    },
    Tick {
        dt: f64,
    },
    /// Explicit start for `manual` sessions
    Start,
}

fn default_pour_kind() -> PourKind {
    PourKind::Into
}

/// One line of a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Episode time at which the signal happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<f64>,
    #[serde(flatten)]
    pub signal: TraceSignal,
}

impl TraceEntry {
    pub fn at(t: f64, signal: TraceSignal) -> Self {
        Self { t: Some(t), signal }
    }

    pub fn untimed(signal: TraceSignal) -> Self {
        Self { t: None, signal }
    }

    pub fn to_line(&self) -> Result<String, SinkError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A line that could not be parsed
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLine {
    /// 1-based line number
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTrace {
    pub entries: Vec<TraceEntry>,
    pub skipped: Vec<SkippedLine>,
}

impl ParsedTrace {
    /// Latest explicit timestamp in the trace
    pub fn last_time(&self) -> Option<f64> {
        self.entries.iter().filter_map(|e| e.t).reduce(f64::max)
    }
}

/// Parse trace content from a string
pub fn parse_trace_content(content: &str) -> ParsedTrace {
    let mut parsed = ParsedTrace::default();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<TraceEntry>(line) {
            Ok(entry) => parsed.entries.push(entry),
            Err(e) => parsed.skipped.push(SkippedLine {
                line: index + 1,
                reason: e.to_string(),
            }),
        }
    }
    parsed
}

/// Parse a trace file
pub fn parse_trace(path: &Path) -> Result<ParsedTrace, SinkError> {
    let content = fs::read_to_string(path)?;
    Ok(parse_trace_content(&content))
}

/// Write entries as a trace file
pub fn write_trace(entries: &[TraceEntry], path: &Path) -> Result<(), SinkError> {
    let mut content = String::new();
    for entry in entries {
        content.push_str(&entry.to_line()?);
        content.push('\n');
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

/// Counts from a replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    /// Signals the session ignored or refused
    pub rejected: usize,
    pub transitions: usize,
    pub impulses: usize,
}

fn pose(location: [f32; 3], rotation: [f32; 4]) -> Pose {
    let [x, y, z, w] = rotation;
    Pose::new(Vec3::from_array(location), Quat::from_xyzw(x, y, z, w).normalize())
}

fn item(id: String, class: String, label: Option<String>) -> RegisteredItem {
    let item = RegisteredItem::new(id, class);
    match label {
        Some(label) => item.with_label(label),
        None => item,
    }
}

/// Feed one signal to the session. Returns whether it was accepted.
pub fn apply_signal(
    session: &mut SemLogSession,
    signal: TraceSignal,
    stats: &mut ReplayStats,
) -> bool {
    let p = |id: String| ParticipantId(id);
    match signal {
        TraceSignal::RegisterItem {
            id,
            class,
            label,
            manipulator,
            bones,
        } => {
            let mut item = item(id, class, label);
            for (bone, class) in bones {
                item = item.with_bone(bone, class);
            }
            if manipulator {
                session.register_manipulator(item)
            } else {
                session.register_item(item)
            }
        }
        TraceSignal::RegisterFurniture {
            id,
            class,
            label,
            joint,
            initial,
        } => session.register_furniture(
            item(id, class, label),
            joint.into(),
            initial.map(Into::into),
        ),
        TraceSignal::RemoveItem { id } => session.remove_item(&p(id)),
        TraceSignal::ContactBegin { a, b } => session.contact_begin(&p(a), &p(b)),
        TraceSignal::ContactEnd { a, b } => session.contact_end(&p(a), &p(b)),
        TraceSignal::GraspBegin {
            manipulator,
            object,
        } => session.grasp_begin(&p(manipulator), &p(object)),
        TraceSignal::GraspEnd {
            manipulator,
            object,
        } => session.grasp_end(&p(manipulator), &p(object)),
        TraceSignal::SlideBegin { a, b } => session.slide_begin(&p(a), &p(b)),
        TraceSignal::SlideEnd { a, b } => session.slide_end(&p(a), &p(b)),
        TraceSignal::PourBegin {
            source,
            destination,
            kind,
        } => session.pour_begin(&p(source), &p(destination), kind),
        TraceSignal::PourEnd {
            source,
            destination,
            kind,
        } => session.pour_end(&p(source), &p(destination), kind),
        TraceSignal::Pose {
            id,
            location,
            rotation,
        } => session.update_pose(&p(id), pose(location, rotation)),
        TraceSignal::Bone {
            id,
            bone,
            location,
            rotation,
        } => session.update_bone(&p(id), &bone, pose(location, rotation)),
        TraceSignal::FurnitureReading { id, reading } => {
            session.furniture_reading(&p(id), reading.into())
        }
        TraceSignal::Tick { dt } => {
            advance(session, dt, stats);
            true
        }
        TraceSignal::Start => session.start(),
    }
}

fn advance(session: &mut SemLogSession, dt: f64, stats: &mut ReplayStats) {
    let outcome = session.tick(dt);
    stats.transitions += outcome.transitions.len();
    stats.impulses += outcome.impulses.len();
}

/// Replay entries in order into `session`
pub fn replay(session: &mut SemLogSession, entries: &[TraceEntry]) -> ReplayStats {
    let mut stats = ReplayStats::default();
    for entry in entries {
        if let Some(t) = entry.t {
            let dt = t - session.now().secs();
            if dt > 0.0 {
                advance(session, dt, &mut stats);
            } else if dt < 0.0 {
                warn!("Trace time {:.3} is before session time {}, applying now", t, session.now());
            }
        }
        if apply_signal(session, entry.signal.clone(), &mut stats) {
            stats.applied += 1;
        } else {
            debug!("Signal rejected: {:?}", entry.signal);
            stats.rejected += 1;
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SemLogConfig;
    use crate::events::{EventKind, PropertyValue};
    use crate::identity::Timestamp;

    const SAMPLE_TRACE: &str = r#"
# kitchen run
{"t":0.0,"signal":"register_item","id":"Cup","class":"Cup","label":"BlueCup"}
{"t":0.0,"signal":"register_item","id":"Hand","class":"RightHand","manipulator":true}
{"t":0.0,"signal":"register_furniture","id":"Drawer1","class":"Drawer","joint":{"kind":"drawer","initial_location":[0.0,0.0,0.0]}}
{"t":1.0,"signal":"grasp_begin","manipulator":"Hand","object":"Cup"}
{"t":1.0,"signal":"pour_begin","source":"Cup","destination":"Bowl"}
{"t":1.5,"signal":"pose","id":"Cup","location":[0.0,0.0,10.0],"rotation":[0.3826834,0.0,0.0,0.9238795]}
{"t":2.0,"signal":"pour_end","source":"Cup","destination":"Bowl","kind":"into"}
{"t":2.0,"signal":"furniture_reading","id":"Drawer1","reading":{"linear":[0.0,30.0,0.0]}}
{"signal":"tick","dt":0.5}
this is not json
{"t":3.0,"signal":"grasp_end","manipulator":"Hand","object":"Cup"}
"#;

    fn session() -> SemLogSession {
        let mut config = SemLogConfig::default();
        config.session.episode_id = "trace_ep".to_string();
        config.session.log_directory = None;
        let mut session = SemLogSession::new(config).unwrap();
        session.begin_play();
        session
    }

    #[test]
    fn test_parse_trace_content() {
        let parsed = parse_trace_content(SAMPLE_TRACE);
        assert_eq!(parsed.entries.len(), 10);
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].line, 12);
        assert_eq!(parsed.last_time(), Some(3.0));
        assert_eq!(
            parsed.entries[3].signal,
            TraceSignal::GraspBegin {
                manipulator: "Hand".to_string(),
                object: "Cup".to_string()
            }
        );
        // Pour kind defaults to "into"
        assert!(matches!(
            parsed.entries[4].signal,
            TraceSignal::PourBegin { kind: PourKind::Into, .. }
        ));
    }

    #[test]
    fn test_replay_into_session() {
        let parsed = parse_trace_content(SAMPLE_TRACE);
        let mut session = session();
        let stats = replay(&mut session, &parsed.entries);
        assert_eq!(stats.rejected, 0);
        assert_eq!(stats.applied, 10);
        assert_eq!(stats.transitions, 1);

        let finished = session.ledger().finished();
        let kinds: Vec<EventKind> = finished.iter().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            vec![EventKind::PouredInto, EventKind::FurnitureStateChange, EventKind::Grasping]
        );

        let pour = &finished[0];
        assert_eq!((pour.start(), pour.end()), (Timestamp(1.0), Some(Timestamp(2.0))));
        let angle = pour.property("maxPouringAngle").and_then(PropertyValue::as_number).unwrap();
        assert!((angle - 45.0).abs() < 0.01);

        let grasp = &finished[2];
        assert_eq!(grasp.end(), Some(Timestamp(3.0)));
    }

    #[test]
    fn test_door_joint_limits() {
        let free: TraceJoint =
            serde_json::from_str(r#"{"kind":"door","closed_angle":10.0}"#).unwrap();
        assert_eq!(FurnitureJoint::from(free), FurnitureJoint::free_door(10.0));

        let limited: TraceJoint = serde_json::from_str(
            r#"{"kind":"door","closed_angle":0.0,"min_angle":-110.0,"max_angle":0.0}"#,
        )
        .unwrap();
        assert_eq!(
            FurnitureJoint::from(limited),
            FurnitureJoint::Door {
                closed_angle: 0.0,
                min_angle: -110.0,
                max_angle: 0.0,
            }
        );
    }

    #[test]
    fn test_rejected_signals_are_counted() {
        let mut session = session();
        let entries = vec![
            TraceEntry::untimed(TraceSignal::ContactEnd {
                a: "A".to_string(),
                b: "B".to_string(),
            }),
            TraceEntry::untimed(TraceSignal::RemoveItem { id: "Ghost".to_string() }),
        ];
        let stats = replay(&mut session, &entries);
        assert_eq!(stats.applied, 0);
        assert_eq!(stats.rejected, 2);
    }

    #[test]
    fn test_write_then_parse_trace_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces/run.jsonl");
        let entries = vec![
            TraceEntry::at(0.5, TraceSignal::SlideBegin {
                a: "Hand".to_string(),
                b: "Cup".to_string(),
            }),
            TraceEntry::untimed(TraceSignal::Start),
        ];
        write_trace(&entries, &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(r#"{"t":0.5,"signal":"slide_begin","a":"Hand","b":"Cup"}"#));
        assert_eq!(parse_trace(&path).unwrap().entries, entries);
    }
}
