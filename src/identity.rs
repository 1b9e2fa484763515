//! Episode-relative timestamps and unique identifiers
//!
//! Every event and every exported individual is named with an id from
//! [`IdAllocator`]; every time value comes from [`EpisodeClock`], which never
//! runs backwards.

use bevy::log::warn;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Seconds since the episode started
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0.0);

    pub fn secs(self) -> f64 {
        self.0
    }

    /// Label used to name the timepoint individual for this instant.
    ///
    /// Two timestamps with the same label are the same timepoint.
    pub fn label(self) -> String {
        format!("timepoint_{:.3}", self.0)
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

impl From<f64> for Timestamp {
    fn from(secs: f64) -> Self {
        Timestamp(secs)
    }
}

/// Monotonic episode clock driven by host ticks
#[derive(Debug, Clone, Default)]
pub struct EpisodeClock {
    now: f64,
    /// World time at which the episode started (for `sync_world_time`)
    origin: Option<f64>,
}

impl EpisodeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current episode time
    pub fn now(&self) -> Timestamp {
        Timestamp(self.now)
    }

    /// Advance by a frame delta. Negative deltas are ignored.
    pub fn advance(&mut self, delta_secs: f64) -> Timestamp {
        if delta_secs > 0.0 && delta_secs.is_finite() {
            self.now += delta_secs;
        }
        self.now()
    }

    /// Follow an absolute world clock. The first call fixes the episode origin.
    pub fn sync_world_time(&mut self, world_secs: f64) -> Timestamp {
        if !world_secs.is_finite() {
            warn!("Ignoring non-finite world time {}", world_secs);
            return self.now();
        }
        let origin = *self.origin.get_or_insert(world_secs);
        let candidate = world_secs - origin;
        if candidate < self.now {
            warn!(
                "World time went backwards ({:.3} < {:.3}), keeping episode clock",
                candidate, self.now
            );
        } else {
            self.now = candidate;
        }
        self.now()
    }
}

/// Produces unique identifiers for events and episodes
#[derive(Debug, Clone, Default)]
pub enum IdAllocator {
    /// Random v4 UUIDs in simple (hyphen-less) form
    #[default]
    Random,
    /// `<prefix><n>` with a zero-padded counter; reproducible across runs
    Sequential { prefix: String, next: u64 },
}

impl IdAllocator {
    pub fn random() -> Self {
        IdAllocator::Random
    }

    pub fn sequential(prefix: &str) -> Self {
        IdAllocator::Sequential {
            prefix: prefix.to_string(),
            next: 1,
        }
    }

    /// Allocate the next id
    pub fn next_id(&mut self) -> String {
        match self {
            IdAllocator::Random => Uuid::new_v4().simple().to_string(),
            IdAllocator::Sequential { prefix, next } => {
                let id = format!("{}{:04}", prefix, next);
                *next += 1;
                id
            }
        }
    }
}

/// Fresh episode tag (used when the config leaves the episode id empty)
pub fn new_episode_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("ep_{}", &uuid[..12])
}
