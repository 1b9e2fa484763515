//! Drawer and door state tracking
//!
//! Polled on a fixed interval rather than every frame. Each piece of
//! furniture is classified into a band from its offset to the closed pose,
//! and a state event is logged only when the band changes.

use bevy::log::{debug, info, warn};
use bevy::math::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::config::{BandThresholds, FurnitureConfig};
use crate::constants::DOOR_FREE_SWING;
use crate::events::{EventKey, EventKind, Ledger, ParticipantId, Properties, PropertyValue};
use crate::identity::Timestamp;
use crate::scheduler::{ActionTarget, DelayedActions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FurnitureBand {
    Closed,
    HalfClosed,
    Open,
}

impl fmt::Display for FurnitureBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Open above `open`, Closed at or below `closed`, HalfClosed in between
pub fn classify_band(offset: f32, thresholds: &BandThresholds) -> FurnitureBand {
    if offset > thresholds.open {
        FurnitureBand::Open
    } else if offset <= thresholds.closed {
        FurnitureBand::Closed
    } else {
        FurnitureBand::HalfClosed
    }
}

/// Constraint a piece of furniture moves along
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FurnitureJoint {
    /// Linear constraint; the offset is the distance from the initial location
    Drawer { initial_location: Vec3 },
    /// Rotational constraint limited to `min_angle..=max_angle`; the offset
    /// is degrees away from `closed_angle`, with readings clamped to the
    /// limits. `closed_angle` is usually one of the limits.
    Door {
        closed_angle: f32,
        min_angle: f32,
        max_angle: f32,
    },
}

/// Current position along the joint
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FurnitureReading {
    Linear(Vec3),
    Angular(f32),
}

impl FurnitureJoint {
    /// Door swinging freely around its closed angle
    pub fn free_door(closed_angle: f32) -> Self {
        FurnitureJoint::Door {
            closed_angle,
            min_angle: closed_angle - DOOR_FREE_SWING,
            max_angle: closed_angle + DOOR_FREE_SWING,
        }
    }

    /// Limits ordered and containing the closed angle
    fn is_consistent(&self) -> bool {
        match *self {
            FurnitureJoint::Drawer { initial_location } => initial_location.is_finite(),
            FurnitureJoint::Door {
                closed_angle,
                min_angle,
                max_angle,
            } => min_angle <= closed_angle && closed_angle <= max_angle,
        }
    }

    fn rest_reading(&self) -> FurnitureReading {
        match *self {
            FurnitureJoint::Drawer { initial_location } => {
                FurnitureReading::Linear(initial_location)
            }
            FurnitureJoint::Door { closed_angle, .. } => FurnitureReading::Angular(closed_angle),
        }
    }

    /// Offset from the closed pose, `None` if the reading does not fit the joint
    fn offset(&self, reading: FurnitureReading) -> Option<f32> {
        match (*self, reading) {
            (FurnitureJoint::Drawer { initial_location }, FurnitureReading::Linear(location)) => {
                Some(location.distance(initial_location))
            }
            (
                FurnitureJoint::Door {
                    closed_angle,
                    min_angle,
                    max_angle,
                },
                FurnitureReading::Angular(angle),
            ) => Some((angle.clamp(min_angle, max_angle) - closed_angle).abs()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FurnitureTransition {
    pub id: ParticipantId,
    pub from: FurnitureBand,
    pub to: FurnitureBand,
    pub at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Impulse {
    Linear(Vec3),
    /// Signed, about the door hinge
    Angular(f32),
}

/// One-shot push applied by the host physics
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseCommand {
    pub target: ParticipantId,
    pub impulse: Impulse,
}

/// Host hook that applies close impulses to physics bodies
pub trait ImpulseActuator: Send + Sync {
    fn apply(&mut self, command: &ImpulseCommand);
}

/// Actuator that only remembers what it was asked to do.
///
/// Clones share the same command list.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    applied: Arc<Mutex<Vec<ImpulseCommand>>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<ImpulseCommand> {
        self.applied.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ImpulseActuator for RecordingActuator {
    fn apply(&mut self, command: &ImpulseCommand) {
        if let Ok(mut applied) = self.applied.lock() {
            applied.push(command.clone());
        }
    }
}

#[derive(Debug)]
struct Tracked {
    joint: FurnitureJoint,
    reading: FurnitureReading,
    band: FurnitureBand,
}

#[derive(Debug)]
pub struct FurnitureDetector {
    config: FurnitureConfig,
    tracked: BTreeMap<ParticipantId, Tracked>,
    since_poll: f64,
}

impl FurnitureDetector {
    pub fn new(config: FurnitureConfig) -> Self {
        Self {
            config,
            tracked: BTreeMap::new(),
            since_poll: 0.0,
        }
    }

    fn thresholds(&self, joint: &FurnitureJoint) -> &BandThresholds {
        match joint {
            FurnitureJoint::Drawer { .. } => &self.config.drawer,
            FurnitureJoint::Door { .. } => &self.config.door,
        }
    }

    fn state_key(id: &ParticipantId) -> EventKey {
        EventKey::single(EventKind::FurnitureStateChange, id)
    }

    fn open_state(ledger: &mut Ledger, id: &ParticipantId, band: FurnitureBand, at: Timestamp) {
        let mut properties = Properties::new();
        properties.insert("furnitureState".into(), PropertyValue::literal(band.to_string()));
        ledger.open_event(EventKind::FurnitureStateChange, vec![id.clone()], at, properties);
    }

    /// Start tracking `id`. The band of `initial` (or of the rest pose) is the
    /// baseline: it opens the first state interval and is not a transition.
    pub fn register(
        &mut self,
        ledger: &mut Ledger,
        id: ParticipantId,
        joint: FurnitureJoint,
        initial: Option<FurnitureReading>,
        at: Timestamp,
    ) -> bool {
        if self.tracked.contains_key(&id) {
            warn!("Furniture {} is already tracked", id);
            return false;
        }
        if !joint.is_consistent() {
            warn!("Rejecting furniture {} with inconsistent joint {:?}", id, joint);
            return false;
        }
        let reading = initial.unwrap_or_else(|| joint.rest_reading());
        let Some(offset) = joint.offset(reading) else {
            warn!("Initial reading of {} does not match its joint", id);
            return false;
        };
        let band = classify_band(offset, self.thresholds(&joint));
        debug!("Tracking furniture {} with baseline {}", id, band);
        Self::open_state(ledger, &id, band, at);
        self.tracked.insert(id, Tracked { joint, reading, band });
        true
    }

    /// Stop tracking; the caller closes the open state event
    pub fn remove(&mut self, id: &ParticipantId) -> bool {
        self.tracked.remove(id).is_some()
    }

    /// Latest position, picked up by the next poll
    pub fn update_reading(&mut self, id: &ParticipantId, reading: FurnitureReading) -> bool {
        let Some(tracked) = self.tracked.get_mut(id) else {
            debug!("Reading for untracked furniture {}", id);
            return false;
        };
        if tracked.joint.offset(reading).is_none() {
            warn!("Reading {:?} does not match the joint of {}", reading, id);
            return false;
        }
        tracked.reading = reading;
        true
    }

    pub fn band(&self, id: &ParticipantId) -> Option<FurnitureBand> {
        self.tracked.get(id).map(|t| t.band)
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Accumulate frame time and poll once per interval
    pub fn tick(
        &mut self,
        ledger: &mut Ledger,
        scheduler: &mut DelayedActions,
        delta_secs: f64,
        now: Timestamp,
    ) -> Vec<FurnitureTransition> {
        self.since_poll += delta_secs.max(0.0);
        if self.since_poll < self.config.poll_interval {
            return Vec::new();
        }
        self.since_poll = 0.0;
        self.poll(ledger, scheduler, now)
    }

    /// Classify every tracked piece and log band changes
    pub fn poll(
        &mut self,
        ledger: &mut Ledger,
        scheduler: &mut DelayedActions,
        now: Timestamp,
    ) -> Vec<FurnitureTransition> {
        let mut transitions = Vec::new();
        let (drawer, door) = (self.config.drawer, self.config.door);

        for (id, tracked) in self.tracked.iter_mut() {
            let Some(offset) = tracked.joint.offset(tracked.reading) else {
                continue;
            };
            let thresholds = match tracked.joint {
                FurnitureJoint::Drawer { .. } => &drawer,
                FurnitureJoint::Door { .. } => &door,
            };
            let band = classify_band(offset, thresholds);
            if band == tracked.band {
                continue;
            }

            info!("Furniture {} {} -> {} (offset {:.2})", id, tracked.band, band, offset);
            let mut extra = Properties::new();
            extra.insert("nextFurnitureState".into(), PropertyValue::literal(band.to_string()));
            ledger.close(&Self::state_key(id), now, extra);
            Self::open_state(ledger, id, band, now);

            let target = ActionTarget::CloseFurniture(id.clone());
            match band {
                FurnitureBand::Open if self.config.auto_close => {
                    scheduler.schedule(target, now, self.config.close_delay);
                }
                FurnitureBand::Closed => {
                    if scheduler.cancel(&target) {
                        debug!("{} closed on its own, close impulse cancelled", id);
                    }
                }
                _ => {}
            }

            transitions.push(FurnitureTransition {
                id: id.clone(),
                from: tracked.band,
                to: band,
                at: now,
            });
            tracked.band = band;
        }
        transitions
    }

    /// Push that moves `id` back toward its closed pose, if it is not closed
    pub fn impulse_for(&self, id: &ParticipantId) -> Option<ImpulseCommand> {
        let tracked = self.tracked.get(id)?;
        if tracked.band == FurnitureBand::Closed {
            return None;
        }
        let magnitude = self.config.close_impulse;
        let impulse = match (tracked.joint, tracked.reading) {
            (FurnitureJoint::Drawer { initial_location }, FurnitureReading::Linear(location)) => {
                Impulse::Linear((initial_location - location).normalize_or_zero() * magnitude)
            }
            (FurnitureJoint::Door { closed_angle, .. }, FurnitureReading::Angular(angle)) => {
                Impulse::Angular((closed_angle - angle).signum() * magnitude)
            }
            _ => return None,
        };
        Some(ImpulseCommand {
            target: id.clone(),
            impulse,
        })
    }
}
