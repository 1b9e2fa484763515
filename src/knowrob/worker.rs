//! Background thread that owns the transport
//!
//! Jobs are handled in the order they were queued, so sub-actions only go
//! out after the `create_episode` response has set the parent action.

use bevy::log::{debug, info, warn};
use crossbeam_channel::Sender;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::payload::{
    ADD_POURING_INFO, ADD_SUBACTION, CREATE_EPISODE, CreateEpisode, EpisodeCreated,
    FINISH_EPISODE, FinishEpisode, PouringInfo, SubAction, server_keys,
};
use super::transport::KnowRobTransport;

pub(super) enum Job {
    CreateEpisode(CreateEpisode),
    /// Parent action is filled in by the worker
    SubAction(SubAction),
    Pouring(PouringInfo),
    FinishEpisode { game_end_time: String },
    /// Answered once every earlier job is done
    Flush(Sender<()>),
}

/// State shared between the client and its worker
#[derive(Debug, Default)]
pub(super) struct WorkerStatus {
    disabled: AtomicBool,
    sent: AtomicU64,
    episode: Mutex<Option<EpisodeCreated>>,
}

impl WorkerStatus {
    pub fn disable(&self) {
        self.disabled.store(true, Ordering::Release);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn episode(&self) -> Option<EpisodeCreated> {
        self.episode.lock().ok().and_then(|episode| episode.clone())
    }

    fn set_episode(&self, created: EpisodeCreated) {
        if let Ok(mut episode) = self.episode.lock() {
            *episode = Some(created);
        }
    }
}

struct Worker {
    transport: Box<dyn KnowRobTransport>,
    status: Arc<WorkerStatus>,
    iri_keys: bool,
    created: Option<EpisodeCreated>,
}

/// Start the worker thread. Dropping the returned sender stops it.
pub(super) fn spawn(
    transport: Box<dyn KnowRobTransport>,
    status: Arc<WorkerStatus>,
    iri_keys: bool,
) -> std::io::Result<(Sender<Job>, JoinHandle<()>)> {
    let (tx, rx) = crossbeam_channel::unbounded::<Job>();
    let mut worker = Worker {
        transport,
        status,
        iri_keys,
        created: None,
    };
    let handle = thread::Builder::new()
        .name("knowrob_push".into())
        .spawn(move || {
            while let Ok(job) = rx.recv() {
                worker.run(job);
            }
            debug!("KnowRob worker exited");
        })?;
    Ok((tx, handle))
}

impl Worker {
    fn run(&mut self, job: Job) {
        match job {
            Job::Flush(done) => {
                let _ = done.send(());
            }
            // Requests queued before a failure are dropped
            _ if self.status.is_disabled() => {}
            Job::CreateEpisode(request) => {
                let Some(response) = self.send(CREATE_EPISODE, &request) else {
                    return;
                };
                match serde_json::from_str::<EpisodeCreated>(&response) {
                    Ok(created) => {
                        info!("KnowRob episode {} (action {})", created.episode, created.action);
                        self.status.set_episode(created.clone());
                        self.created = Some(created);
                    }
                    Err(e) => {
                        warn!("Unexpected create_episode response, disabling client: {}", e);
                        self.status.disable();
                    }
                }
            }
            Job::SubAction(mut request) => {
                let Some(action) = self.created.as_ref().map(|c| c.action.clone()) else {
                    debug!("No KnowRob episode, dropping {}", request.sub_action_type);
                    return;
                };
                request.parent_action_id = action;
                self.send(ADD_SUBACTION, &request);
            }
            Job::Pouring(mut request) => {
                let Some(action) = self.created.as_ref().map(|c| c.action.clone()) else {
                    return;
                };
                request.parent_action_id = action;
                self.send(ADD_POURING_INFO, &request);
            }
            Job::FinishEpisode { game_end_time } => {
                let Some(episode_iri) = self.created.as_ref().map(|c| c.episode.clone()) else {
                    return;
                };
                let request = FinishEpisode {
                    episode_iri,
                    game_end_time,
                };
                self.send(FINISH_EPISODE, &request);
            }
        }
    }

    fn send<T: Serialize>(&mut self, endpoint: &str, payload: &T) -> Option<String> {
        let body: Value = match serde_json::to_value(payload) {
            Ok(body) if self.iri_keys => server_keys(body),
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to encode {} request: {}", endpoint, e);
                return None;
            }
        };
        match self.transport.post(endpoint, &body) {
            Ok(response) => {
                self.status.sent.fetch_add(1, Ordering::Relaxed);
                debug!("KnowRob {} -> {}", endpoint, response);
                Some(response)
            }
            Err(e) => {
                warn!("KnowRob request {} failed, disabling client: {}", endpoint, e);
                self.status.disable();
                None
            }
        }
    }
}
