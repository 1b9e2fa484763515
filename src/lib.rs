//! SemLog - semantic event logging for interactive simulations
//!
//! Hosts feed per-frame signals (contacts, grasps, pours, poses, furniture
//! positions) into a [`SemLogSession`]; detectors turn them into timed
//! events which are exported at the end of the episode as an OWL document.

// Core modules
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod identity;
pub mod registry;
pub mod scheduler;

// Detection and export
pub mod detectors;
pub mod knowrob;
pub mod owl;
pub mod world_state;

// Host integration
pub mod plugin;
pub mod session;
pub mod trace;

// Re-export commonly used types for convenience
pub use config::{
    BandThresholds, CONFIG_FILE, FurnitureConfig, KnowRobConfig, SemLogConfig, SessionConfig,
    StartMode, WorldStateConfig, WorldStateSinkConfig,
};
pub use constants::*;
pub use detectors::{
    FurnitureBand, FurnitureJoint, FurnitureReading, Impulse, ImpulseActuator, ImpulseCommand,
    PourKind,
};
pub use error::{ConfigError, SinkError};
pub use events::{EventKey, EventKind, EventRecord, Ledger, Metadata, ParticipantId, PropertyValue};
pub use identity::{EpisodeClock, IdAllocator, Timestamp};
pub use owl::{OwlDoc, Timeline};
pub use plugin::{SemLogPlugin, SemLogSettings, SemLogSystems};
pub use registry::{ItemRegistry, RegisteredItem};
pub use scheduler::{ActionTarget, DelayedActions};
pub use session::{FinishReport, SemLogSession, SessionState, TickOutcome};
pub use trace::{TraceEntry, TraceSignal};
pub use world_state::{Pose, WorldStateSink};
