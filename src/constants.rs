//! Default values shared by the config layer and the detectors

/// Namespace prefix used for every logged individual
pub const DEFAULT_NAMESPACE: &str = "log";

/// Directory where finished episodes are written
pub const DEFAULT_LOG_DIR: &str = "SemLog";

// =============================================================================
// FURNITURE
// =============================================================================

/// How often furniture constraints are classified (seconds)
pub const FURNITURE_POLL_INTERVAL: f64 = 0.25;

/// Drawer offset (cm) above which a drawer counts as open
pub const DRAWER_OPEN_THRESHOLD: f32 = 15.0;

/// Drawer offset (cm) at or below which a drawer counts as closed
pub const DRAWER_CLOSED_THRESHOLD: f32 = 2.0;

/// Door angle (degrees) above which a door counts as open
pub const DOOR_OPEN_THRESHOLD: f32 = 45.0;

/// Door angle (degrees) at or below which a door counts as closed
pub const DOOR_CLOSED_THRESHOLD: f32 = 3.0;

/// Swing (degrees) on either side of the closed angle for doors without limits
pub const DOOR_FREE_SWING: f32 = 180.0;

/// Delay before an open drawer/door gets pushed closed (seconds)
pub const FURNITURE_CLOSE_DELAY: f64 = 5.0;

/// Magnitude of the closing impulse
pub const FURNITURE_CLOSE_IMPULSE: f32 = 300.0;

// =============================================================================
// WORLD STATE
// =============================================================================

/// Minimum movement (cm) before an entity is logged again
pub const WORLD_STATE_LINEAR_THRESHOLD: f32 = 0.5;

/// Minimum rotation (radians) before an entity is logged again
pub const WORLD_STATE_ANGULAR_THRESHOLD: f32 = 0.01;

/// World state sampling period (seconds, 0 = every tick)
pub const WORLD_STATE_UPDATE_RATE: f64 = 0.0;

// =============================================================================
// KNOWROB
// =============================================================================

/// Default KnowRob REST port
pub const KNOWROB_DEFAULT_PORT: u16 = 62226;

/// Path of the REST API below host:port
pub const KNOWROB_API_PATH: &str = "/knowrob/api/v1.0/";
