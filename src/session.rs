//! Logging session - the composition root
//!
//! Owns the clock, ledger, registry, detectors, scheduler and output paths
//! of one episode and exposes the signal API hosts call into. Teardown
//! (force-closing open events and exporting) runs exactly once: on an
//! explicit [`SemLogSession::finish`], on app exit through the plugin, or
//! when the session is dropped while still running.

use bevy::log::{debug, error, info, warn};
use bevy::math::{EulerRot, Vec3};
use bevy::prelude::Resource;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::{SemLogConfig, StartMode};
use crate::detectors::{
    ContactDetector, FurnitureDetector, FurnitureJoint, FurnitureReading, FurnitureTransition,
    GraspDetector, ImpulseActuator, ImpulseCommand, PairDetector, PoseSample, PourKind,
    PourSummary, PouringDetector, SlideDetector,
};
use crate::error::ConfigError;
use crate::events::{EventKind, EventRecord, Ledger, Metadata, ParticipantId, PropertyValue};
use crate::identity::{EpisodeClock, IdAllocator, Timestamp, new_episode_id};
use crate::knowrob::{KnowRobClient, KnowRobTransport, objects_participated};
use crate::owl::{self, ObjectInfo, OwlDoc, Timeline};
use crate::registry::{ItemRegistry, RegisteredItem};
use crate::scheduler::{ActionTarget, DelayedActions};
use crate::world_state::{Pose, WorldStateLogger, WorldStateSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, waiting for its start mode
    Pending,
    Running,
    Finished,
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub started: bool,
    pub transitions: Vec<FurnitureTransition>,
    pub impulses: Vec<ImpulseCommand>,
}

/// Result of the one-time teardown
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinishReport {
    pub finished_events: usize,
    pub force_closed: usize,
    pub owl_path: Option<PathBuf>,
    pub json_path: Option<PathBuf>,
    pub timeline_path: Option<PathBuf>,
}

#[derive(Resource)]
pub struct SemLogSession {
    config: SemLogConfig,
    episode_id: String,
    state: SessionState,
    clock: EpisodeClock,
    ledger: Ledger,
    registry: ItemRegistry,
    /// Items removed mid-episode, still needed to label exported individuals
    departed: BTreeMap<ParticipantId, RegisteredItem>,
    contact: ContactDetector,
    grasp: GraspDetector,
    slide: SlideDetector,
    pouring: PouringDetector,
    furniture: FurnitureDetector,
    /// Furniture registered before the start, baselined when logging starts
    pending_furniture: Vec<(ParticipantId, FurnitureJoint, Option<FurnitureReading>)>,
    scheduler: DelayedActions,
    world_state: Option<WorldStateLogger>,
    knowrob: Option<KnowRobClient>,
    /// Finished records already mirrored to the knowledge base
    pushed: usize,
    actuator: Option<Box<dyn ImpulseActuator>>,
}

impl SemLogSession {
    /// Validate the config and build the session with its configured sinks.
    ///
    /// Output paths that fail to open are logged and left disabled; only an
    /// invalid config is an error.
    pub fn new(config: SemLogConfig) -> Result<Self, ConfigError> {
        if let Err(e) = config.validate() {
            error!("Invalid semlog config: {}", e);
            return Err(e);
        }

        let episode_id = if config.session.episode_id.trim().is_empty() {
            new_episode_id()
        } else {
            config.session.episode_id.clone()
        };
        let ids = if config.session.sequential_ids {
            IdAllocator::sequential(&format!("{}_", episode_id))
        } else {
            IdAllocator::random()
        };
        let ledger = Ledger::new(Metadata::new(&episode_id, &config.session.namespace), ids);

        let world_state = if config.world_state.enabled {
            WorldStateLogger::from_config(&config.world_state, &episode_id)
        } else {
            None
        };
        let knowrob = Self::connect_knowrob(&config);

        info!(
            "SemLog session {} created (namespace {}, start {:?})",
            episode_id, config.session.namespace, config.session.start
        );
        Ok(Self {
            furniture: FurnitureDetector::new(config.furniture.clone()),
            episode_id,
            state: SessionState::Pending,
            clock: EpisodeClock::new(),
            ledger,
            registry: ItemRegistry::new(),
            departed: BTreeMap::new(),
            contact: ContactDetector::new(),
            grasp: GraspDetector::new(),
            slide: SlideDetector::new(),
            pouring: PouringDetector::new(),
            pending_furniture: Vec::new(),
            scheduler: DelayedActions::new(),
            world_state,
            knowrob,
            pushed: 0,
            actuator: None,
            config,
        })
    }

    #[cfg(feature = "knowrob-http")]
    fn connect_knowrob(config: &SemLogConfig) -> Option<KnowRobClient> {
        config
            .knowrob
            .enabled
            .then(|| KnowRobClient::connect(&config.knowrob))
    }

    #[cfg(not(feature = "knowrob-http"))]
    fn connect_knowrob(config: &SemLogConfig) -> Option<KnowRobClient> {
        if config.knowrob.enabled {
            error!("KnowRob push requested but built without the knowrob-http feature, disabled");
        }
        None
    }

    /// Replace the world state sink (enables world state logging)
    pub fn with_world_state_sink(mut self, sink: Box<dyn WorldStateSink>) -> Self {
        self.world_state = Some(WorldStateLogger::new(&self.config.world_state, sink));
        self
    }

    /// Push events to the knowledge base through `transport`
    pub fn with_knowrob_transport(mut self, transport: Box<dyn KnowRobTransport>) -> Self {
        self.knowrob = Some(KnowRobClient::new(&self.config.knowrob, transport));
        self
    }

    /// Where close impulses go
    pub fn with_actuator(mut self, actuator: Box<dyn ImpulseActuator>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    // ---- lifecycle ----

    /// Host "begin play": apply the configured start mode
    pub fn begin_play(&mut self) -> bool {
        if self.state != SessionState::Pending {
            return false;
        }
        let now = self.clock.now();
        match self.config.session.start {
            StartMode::AtBeginPlay => return self.start(),
            StartMode::AtNextTick => {
                self.scheduler.schedule(ActionTarget::SessionStart, now, 0.0);
            }
            StartMode::AfterDelay { delay } => {
                info!("SemLog session {} starts in {:.2}s", self.episode_id, delay);
                self.scheduler.schedule(ActionTarget::SessionStart, now, delay);
            }
            StartMode::Manual => {}
        }
        false
    }

    /// Start logging now. Returns false unless the session was pending.
    pub fn start(&mut self) -> bool {
        if self.state != SessionState::Pending {
            debug!("Session {} already {:?}", self.episode_id, self.state);
            return false;
        }
        self.scheduler.cancel(&ActionTarget::SessionStart);
        self.state = SessionState::Running;
        let now = self.clock.now();

        for (id, joint, initial) in std::mem::take(&mut self.pending_furniture) {
            self.furniture.register(&mut self.ledger, id, joint, initial, now);
        }
        if let Some(knowrob) = self.knowrob.as_mut() {
            let start_unix = Utc::now().timestamp_millis() as f64 / 1000.0;
            knowrob.create_episode(start_unix);
        }
        info!("SemLog session {} started at {}", self.episode_id, now);
        true
    }

    /// Advance episode time by a frame delta
    pub fn tick(&mut self, delta_secs: f64) -> TickOutcome {
        let now = self.clock.advance(delta_secs);
        self.process_tick(delta_secs.max(0.0), now)
    }

    /// Advance episode time to follow an absolute world clock
    pub fn tick_world_time(&mut self, world_secs: f64) -> TickOutcome {
        let before = self.clock.now();
        let now = self.clock.sync_world_time(world_secs);
        self.process_tick(now.secs() - before.secs(), now)
    }

    fn process_tick(&mut self, delta_secs: f64, now: Timestamp) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.state == SessionState::Finished {
            return outcome;
        }

        for target in self.scheduler.drain_due(now) {
            match target {
                ActionTarget::SessionStart => outcome.started |= self.start(),
                ActionTarget::CloseFurniture(id) => {
                    if let Some(command) = self.apply_close_impulse(&id) {
                        outcome.impulses.push(command);
                    }
                }
            }
        }
        if self.state != SessionState::Running {
            return outcome;
        }

        outcome.transitions = self
            .furniture
            .tick(&mut self.ledger, &mut self.scheduler, delta_secs, now);
        if !outcome.transitions.is_empty() {
            self.sync_knowrob();
        }
        if let Some(world_state) = self.world_state.as_mut() {
            world_state.tick(delta_secs, now, &self.registry);
        }
        outcome
    }

    fn apply_close_impulse(&mut self, id: &ParticipantId) -> Option<ImpulseCommand> {
        let command = self.furniture.impulse_for(id)?;
        match self.actuator.as_mut() {
            Some(actuator) => {
                info!("Pushing {} closed ({:?})", id, command.impulse);
                actuator.apply(&command);
            }
            None => warn!("Close impulse for {} but no actuator is attached", id),
        }
        Some(command)
    }

    /// Force-close open events and export, then wait for queued KnowRob
    /// requests. Runs once; later calls return `None`.
    pub fn finish(&mut self) -> Option<FinishReport> {
        match self.state {
            SessionState::Finished => return None,
            SessionState::Pending => {
                info!(
                    "SemLog session {} finished before it started, nothing to export",
                    self.episode_id
                );
                self.state = SessionState::Finished;
                self.scheduler.clear();
                return Some(FinishReport::default());
            }
            SessionState::Running => {}
        }
        self.state = SessionState::Finished;
        self.scheduler.clear();
        let now = self.clock.now();

        let pours = self.pouring.end_all(&mut self.ledger, now);
        self.sync_knowrob();
        for summary in &pours {
            self.push_pouring(summary);
        }
        let force_closed = self.ledger.force_close_all(now) + pours.len();
        self.sync_knowrob();

        if let Some(world_state) = self.world_state.as_mut() {
            world_state.sample_now(now, &self.registry);
            world_state.flush();
        }

        let mut report = FinishReport {
            finished_events: self.ledger.finished().len(),
            force_closed,
            ..FinishReport::default()
        };
        self.export(&mut report);

        if let Some(knowrob) = self.knowrob.as_mut() {
            let end_unix = Utc::now().timestamp_millis() as f64 / 1000.0;
            knowrob.finish_episode(end_unix);
            knowrob.shutdown();
        }
        self.registry.clear_observers();
        info!(
            "SemLog session {} finished at {}: {} events ({} force-closed)",
            self.episode_id, now, report.finished_events, report.force_closed
        );
        Some(report)
    }

    fn export(&self, report: &mut FinishReport) {
        let Some(dir) = self.config.session.log_directory.as_ref() else {
            debug!("No log directory configured, skipping document export");
            return;
        };
        let doc = self.assemble();

        let owl_path = dir.join(format!("{}_ED.owl", self.episode_id));
        match owl::write_owl(&doc, &owl_path) {
            Ok(()) => {
                info!("Events written to {}", owl_path.display());
                report.owl_path = Some(owl_path);
            }
            Err(e) => error!("Failed to write {}: {}", owl_path.display(), e),
        }

        if self.config.session.write_json {
            let json_path = dir.join(format!("{}_ED.json", self.episode_id));
            match owl::write_json(&doc, &json_path) {
                Ok(()) => report.json_path = Some(json_path),
                Err(e) => error!("Failed to write {}: {}", json_path.display(), e),
            }
        }

        if self.config.session.write_timelines {
            let timeline_path = dir.join(format!("{}_TL.html", self.episode_id));
            match owl::write_timeline(&self.timeline(), &self.episode_id, &timeline_path) {
                Ok(()) => report.timeline_path = Some(timeline_path),
                Err(e) => error!("Failed to write {}: {}", timeline_path.display(), e),
            }
        }
    }

    // ---- export ----

    /// Registered or already removed item
    fn lookup(&self, id: &ParticipantId) -> Option<&RegisteredItem> {
        self.registry.get(id).or_else(|| self.departed.get(id))
    }

    fn object_info(&self, id: &ParticipantId) -> Option<ObjectInfo> {
        self.lookup(id).map(ObjectInfo::from)
    }

    /// Document of everything finished so far
    pub fn assemble(&self) -> OwlDoc {
        owl::assemble(&self.ledger, |id| self.object_info(id), Utc::now())
    }

    pub fn timeline(&self) -> Timeline {
        Timeline::from_records(self.ledger.finished())
    }

    fn class_and_label(&self, id: &ParticipantId) -> String {
        match self.lookup(id) {
            Some(item) => item.class_and_label(),
            None => format!("Thing:{}", id),
        }
    }

    /// Mirror newly finished records to the knowledge base
    fn sync_knowrob(&mut self) {
        let finished = self.ledger.finished().len();
        if self.knowrob.is_none() {
            self.pushed = finished;
            return;
        }
        let pending: Vec<(EventRecord, String)> = self.ledger.finished()[self.pushed..]
            .iter()
            .map(|record| {
                let labels = record.participants().iter().map(|p| self.class_and_label(p));
                let objects = objects_participated(labels);
                (record.clone(), objects)
            })
            .collect();
        self.pushed = finished;
        if let Some(knowrob) = self.knowrob.as_mut() {
            for (record, objects) in &pending {
                knowrob.push_event(record, objects);
            }
        }
    }

    fn push_pouring(&mut self, summary: &PourSummary) {
        let source = self.class_and_label(&summary.source);
        let destination = self.class_and_label(&summary.destination);
        if let Some(knowrob) = self.knowrob.as_mut() {
            knowrob.push_pouring(summary, &source, &destination);
        }
    }

    // ---- items ----

    pub fn register_item(&mut self, item: RegisteredItem) -> bool {
        self.departed.remove(&item.id);
        self.registry.register(item)
    }

    /// Register a hand/gripper that can grasp and slide objects
    pub fn register_manipulator(&mut self, item: RegisteredItem) -> bool {
        self.grasp.add_manipulator(item.id.clone());
        self.slide.add_manipulator(item.id.clone());
        self.register_item(item)
    }

    /// Register a drawer or door. Its state is tracked from the start of logging.
    pub fn register_furniture(
        &mut self,
        item: RegisteredItem,
        joint: FurnitureJoint,
        initial: Option<FurnitureReading>,
    ) -> bool {
        let id = item.id.clone();
        if !self.register_item(item) {
            return false;
        }
        match self.state {
            SessionState::Running => {
                let now = self.clock.now();
                self.furniture.register(&mut self.ledger, id, joint, initial, now)
            }
            SessionState::Pending => {
                self.pending_furniture.push((id, joint, initial));
                true
            }
            SessionState::Finished => false,
        }
    }

    /// Remove an item: observers are notified, its open events closed now and
    /// it is no longer sampled.
    pub fn remove_item(&mut self, id: &ParticipantId) -> bool {
        let Some(item) = self.registry.remove(id) else {
            debug!("Remove of unknown item {}", id);
            return false;
        };
        let now = self.clock.now();
        self.pouring.forget(id);
        self.furniture.remove(id);
        self.pending_furniture.retain(|(pending, _, _)| pending != id);
        self.grasp.remove_manipulator(id);
        self.slide.remove_manipulator(id);
        self.scheduler.cancel(&ActionTarget::CloseFurniture(id.clone()));
        if let Some(world_state) = self.world_state.as_mut() {
            world_state.forget(id);
        }
        let closed = self.ledger.close_involving(id, now);
        if closed > 0 {
            info!("Closed {} open events of removed item {}", closed, id);
            self.sync_knowrob();
        }
        self.departed.insert(id.clone(), item);
        true
    }

    // ---- signals ----

    fn accepting(&self, signal: &str) -> bool {
        if self.state == SessionState::Running {
            return true;
        }
        debug!("Ignoring {} while session is {:?}", signal, self.state);
        false
    }

    fn pair_signal(
        &mut self,
        kind: EventKind,
        begin: bool,
        a: &ParticipantId,
        b: &ParticipantId,
    ) -> bool {
        if !self.accepting("pair signal") {
            return false;
        }
        let now = self.clock.now();
        let detector: &mut dyn PairDetector = match kind {
            EventKind::Touching => &mut self.contact,
            EventKind::Grasping => &mut self.grasp,
            EventKind::Sliding => &mut self.slide,
            other => {
                warn!("{} is not a pair signal", other);
                return false;
            }
        };
        if begin {
            detector.begin(&mut self.ledger, a, b, now)
        } else {
            let closed = detector.end(&mut self.ledger, a, b, now);
            if closed {
                self.sync_knowrob();
            }
            closed
        }
    }

    pub fn contact_begin(&mut self, subject: &ParticipantId, other: &ParticipantId) -> bool {
        self.pair_signal(EventKind::Touching, true, subject, other)
    }

    pub fn contact_end(&mut self, subject: &ParticipantId, other: &ParticipantId) -> bool {
        self.pair_signal(EventKind::Touching, false, subject, other)
    }

    pub fn grasp_begin(&mut self, manipulator: &ParticipantId, object: &ParticipantId) -> bool {
        self.pair_signal(EventKind::Grasping, true, manipulator, object)
    }

    pub fn grasp_end(&mut self, manipulator: &ParticipantId, object: &ParticipantId) -> bool {
        self.pair_signal(EventKind::Grasping, false, manipulator, object)
    }

    pub fn slide_begin(&mut self, subject: &ParticipantId, other: &ParticipantId) -> bool {
        self.pair_signal(EventKind::Sliding, true, subject, other)
    }

    pub fn slide_end(&mut self, subject: &ParticipantId, other: &ParticipantId) -> bool {
        self.pair_signal(EventKind::Sliding, false, subject, other)
    }

    pub fn pour_begin(
        &mut self,
        source: &ParticipantId,
        destination: &ParticipantId,
        kind: PourKind,
    ) -> bool {
        if !self.accepting("pour begin") {
            return false;
        }
        let now = self.clock.now();
        self.pouring.begin(&mut self.ledger, source, destination, kind, now)
    }

    pub fn pour_end(
        &mut self,
        source: &ParticipantId,
        destination: &ParticipantId,
        kind: PourKind,
    ) -> bool {
        if !self.accepting("pour end") {
            return false;
        }
        let now = self.clock.now();
        let Some(summary) = self
            .pouring
            .end(&mut self.ledger, source, destination, kind, now)
        else {
            return false;
        };
        self.sync_knowrob();
        self.push_pouring(&summary);
        true
    }

    /// Sample for active pours, rotation as euler degrees (x = roll)
    pub fn pour_sample(
        &mut self,
        container: &ParticipantId,
        location: Vec3,
        rotation_deg: Vec3,
    ) -> usize {
        if !self.accepting("pour sample") {
            return 0;
        }
        let sample = PoseSample::new(location, rotation_deg, self.clock.now());
        self.pouring.sample(container, sample)
    }

    /// Latest pose of a registered entity: feeds world state and active pours
    pub fn update_pose(&mut self, id: &ParticipantId, pose: Pose) -> bool {
        if !self.registry.contains(id) {
            debug!("Pose for unregistered entity {}", id);
            return false;
        }
        if let Some(world_state) = self.world_state.as_mut() {
            world_state.tracker_mut().update_pose(id, pose);
        }
        if self.state == SessionState::Running {
            let (x, y, z) = pose.rotation.to_euler(EulerRot::XYZ);
            let rotation_deg = Vec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees());
            self.pouring
                .sample(id, PoseSample::new(pose.location, rotation_deg, self.clock.now()));
        }
        true
    }

    pub fn update_bone(&mut self, id: &ParticipantId, bone: &str, pose: Pose) -> bool {
        if !self.registry.contains(id) {
            return false;
        }
        if let Some(world_state) = self.world_state.as_mut() {
            world_state.tracker_mut().update_bone(id, bone, pose);
        }
        true
    }

    /// Latest drawer/door position, classified on the next poll
    pub fn furniture_reading(&mut self, id: &ParticipantId, reading: FurnitureReading) -> bool {
        let queued = self
            .pending_furniture
            .iter_mut()
            .find(|(pending, _, _)| pending == id);
        if let Some((_, _, initial)) = queued {
            *initial = Some(reading);
            return true;
        }
        self.furniture.update_reading(id, reading)
    }

    pub fn set_metadata_property(&mut self, predicate: &str, value: PropertyValue) {
        self.ledger.set_metadata_property(predicate, value);
    }

    // ---- accessors ----

    pub fn config(&self) -> &SemLogConfig {
        &self.config
    }

    pub fn episode_id(&self) -> &str {
        &self.episode_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn registry(&self) -> &ItemRegistry {
        &self.registry
    }

    /// For subscribing to removals
    pub fn registry_mut(&mut self) -> &mut ItemRegistry {
        &mut self.registry
    }

    pub fn furniture(&self) -> &FurnitureDetector {
        &self.furniture
    }

    pub fn world_state(&self) -> Option<&WorldStateLogger> {
        self.world_state.as_ref()
    }

    pub fn knowrob(&self) -> Option<&KnowRobClient> {
        self.knowrob.as_ref()
    }

    pub fn is_pending(&self, target: &ActionTarget) -> bool {
        self.scheduler.is_pending(target)
    }
}

impl Drop for SemLogSession {
    fn drop(&mut self) {
        if self.state == SessionState::Running {
            warn!("SemLog session {} dropped without finish, finishing now", self.episode_id);
            self.finish();
        }
    }
}
