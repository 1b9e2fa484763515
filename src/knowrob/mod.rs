//! KnowRob knowledge-base push
//!
//! Mirrors finished events into a remote episode as sub-actions. Requests are
//! fire-and-forget: the client only queues them, a worker thread posts them
//! in order, and the first failure disables the client for the rest of the
//! session.

mod payload;
mod transport;
mod worker;

pub use payload::{
    ADD_POURING_INFO, ADD_SUBACTION, CREATE_EPISODE, CreateEpisode, EpisodeCreated,
    FINISH_EPISODE, FinishEpisode, PouringInfo, SubAction, action_types, decimal,
    objects_participated,
};
#[cfg(feature = "knowrob-http")]
pub use transport::HttpTransport;
pub use transport::{KnowRobTransport, RecordingTransport};

use bevy::log::{debug, error, warn};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::KnowRobConfig;
use crate::detectors::PourSummary;
use crate::events::EventRecord;
use worker::{Job, WorkerStatus};

pub struct KnowRobClient {
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    status: Arc<WorkerStatus>,
    game_participant: String,
    game_start_unix: f64,
    episode_requested: bool,
}

impl KnowRobClient {
    pub fn new(config: &KnowRobConfig, transport: Box<dyn KnowRobTransport>) -> Self {
        let status = Arc::new(WorkerStatus::default());
        let (jobs, worker) = match worker::spawn(transport, status.clone(), config.iri_keys) {
            Ok((jobs, worker)) => (Some(jobs), Some(worker)),
            Err(e) => {
                error!("Failed to start KnowRob worker, push disabled: {}", e);
                status.disable();
                (None, None)
            }
        };
        Self {
            jobs,
            worker,
            status,
            game_participant: config.game_participant.clone(),
            game_start_unix: 0.0,
            episode_requested: false,
        }
    }

    /// Client with the HTTP transport for the configured host
    #[cfg(feature = "knowrob-http")]
    pub fn connect(config: &KnowRobConfig) -> Self {
        bevy::log::info!("KnowRob client targeting {}", config.base_url());
        Self::new(config, Box::new(HttpTransport::new(&config.base_url())))
    }

    fn enqueue(&self, job: Job) -> bool {
        if self.status.is_disabled() {
            return false;
        }
        match &self.jobs {
            Some(jobs) => jobs.send(job).is_ok(),
            None => false,
        }
    }

    /// Queue the remote episode creation. `start_unix` is the wall-clock game
    /// start; sub-action times are offset by it.
    pub fn create_episode(&mut self, start_unix: f64) -> bool {
        self.game_start_unix = start_unix;
        let request = CreateEpisode {
            game_participant: self.game_participant.clone(),
            game_start_time: decimal(start_unix),
        };
        self.episode_requested = self.enqueue(Job::CreateEpisode(request));
        self.episode_requested
    }

    /// Queue a finished event as a sub-action of the episode action.
    ///
    /// Kinds without a task mapping are skipped.
    pub fn push_event(&mut self, record: &EventRecord, objects: &str) -> bool {
        let Some((sub_action_type, task_type)) = action_types(record.kind()) else {
            return false;
        };
        if !self.episode_requested {
            debug!("No KnowRob episode, not pushing {}", record.id());
            return false;
        }
        let end = record.end().unwrap_or(record.start());
        let request = SubAction {
            parent_action_id: String::new(),
            sub_action_type: sub_action_type.to_string(),
            task_type: task_type.to_string(),
            start_time: decimal(self.game_start_unix + record.start().secs()),
            end_time: decimal(self.game_start_unix + end.secs()),
            objects_participated: objects.to_string(),
            additional_info: String::new(),
            game_participant: self.game_participant.clone(),
        };
        self.enqueue(Job::SubAction(request))
    }

    /// Queue pouring extrema and poses; skipped when no poses were sampled
    pub fn push_pouring(&mut self, summary: &PourSummary, source: &str, destination: &str) -> bool {
        let Some(extrema) = summary.extrema else {
            debug!("Pour {} has no samples, skipping pouring info", summary.event_id);
            return false;
        };
        if !self.episode_requested {
            return false;
        }
        let request = PouringInfo {
            parent_action_id: String::new(),
            sub_action_type: "soma:'Pour'".to_string(),
            max_pouring_angle: decimal(extrema.max.angle as f64),
            min_pouring_angle: decimal(extrema.min.angle as f64),
            source_container: source.to_string(),
            destination_container: destination.to_string(),
            pouring_pose: summary.poses_json(),
        };
        self.enqueue(Job::Pouring(request))
    }

    pub fn finish_episode(&mut self, end_unix: f64) -> bool {
        if !self.episode_requested {
            return false;
        }
        if end_unix < self.game_start_unix {
            warn!(
                "Game end time {} is before start time {}",
                end_unix, self.game_start_unix
            );
        }
        self.enqueue(Job::FinishEpisode {
            game_end_time: decimal(end_unix),
        })
    }

    /// Block until every queued request has been handled
    pub fn flush(&self) -> bool {
        let Some(jobs) = &self.jobs else {
            return false;
        };
        let (done, wait) = crossbeam_channel::bounded(1);
        jobs.send(Job::Flush(done)).is_ok() && wait.recv().is_ok()
    }

    /// Drain the queue and stop the worker; later requests are dropped
    pub fn shutdown(&mut self) {
        drop(self.jobs.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("KnowRob worker panicked");
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.status.is_disabled()
    }

    pub fn episode_iri(&self) -> Option<String> {
        self.status.episode().map(|created| created.episode)
    }

    pub fn action_iri(&self) -> Option<String> {
        self.status.episode().map(|created| created.action)
    }

    /// Requests that reached the server
    pub fn requests_sent(&self) -> u64 {
        self.status.sent()
    }
}

impl Drop for KnowRobClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
