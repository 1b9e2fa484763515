//! World state logging
//!
//! [`WorldStateTracker`] decides what changed; a [`WorldStateSink`] stores
//! it. [`WorldStateLogger`] ties the two together and turns sink failures
//! into a warning plus a disabled output path.

mod record;
mod sink;
mod tracker;

pub use record::{BoneRecord, EntityRecord, Location, PoseRecord, Rotation, WorldStateRecord};
pub use sink::{JsonLinesSink, MemorySink, SqliteSink, WorldStateSink, open_sink};
pub use tracker::{Pose, WorldStateTracker};

use bevy::log::{error, info, warn};

use crate::config::WorldStateConfig;
use crate::events::ParticipantId;
use crate::identity::Timestamp;
use crate::registry::ItemRegistry;

pub struct WorldStateLogger {
    tracker: WorldStateTracker,
    sink: Option<Box<dyn WorldStateSink>>,
    written: u64,
}

impl WorldStateLogger {
    pub fn new(config: &WorldStateConfig, sink: Box<dyn WorldStateSink>) -> Self {
        info!("World state logger writing to {}", sink.describe());
        Self {
            tracker: WorldStateTracker::new(config),
            sink: Some(sink),
            written: 0,
        }
    }

    /// Open the configured sink; `None` (with an error log) if that fails
    pub fn from_config(config: &WorldStateConfig, episode_id: &str) -> Option<Self> {
        match open_sink(&config.sink, episode_id) {
            Ok(sink) => Some(Self::new(config, sink)),
            Err(e) => {
                error!("World state logging disabled: {}", e);
                None
            }
        }
    }

    pub fn tracker_mut(&mut self) -> &mut WorldStateTracker {
        &mut self.tracker
    }

    pub fn forget(&mut self, id: &ParticipantId) {
        self.tracker.forget(id);
    }

    /// Sample and write if the period elapsed and something moved
    pub fn tick(&mut self, delta_secs: f64, now: Timestamp, registry: &ItemRegistry) {
        if self.sink.is_none() {
            return;
        }
        if let Some(record) = self.tracker.tick(delta_secs, now, registry) {
            self.write(&record);
        }
    }

    /// Sample now regardless of the period
    pub fn sample_now(&mut self, now: Timestamp, registry: &ItemRegistry) {
        if self.sink.is_none() {
            return;
        }
        if let Some(record) = self.tracker.sample(now, registry) {
            self.write(&record);
        }
    }

    fn write(&mut self, record: &WorldStateRecord) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        match sink.write(record) {
            Ok(()) => self.written += 1,
            Err(e) => {
                warn!("World state sink {} failed, disabling: {}", sink.describe(), e);
                self.sink = None;
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(sink) = self.sink.as_mut()
            && let Err(e) = sink.flush()
        {
            warn!("Failed to flush world state sink {}: {}", sink.describe(), e);
        }
    }

    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    pub fn records_written(&self) -> u64 {
        self.written
    }
}
