//! How requests reach the knowledge base

use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::payload::CREATE_EPISODE;
use crate::error::SinkError;

/// POSTs a JSON body to `<base_url><endpoint>` and returns the response body
pub trait KnowRobTransport: Send + Sync {
    fn post(&mut self, endpoint: &str, body: &Value) -> Result<String, SinkError>;
}

/// Captures requests instead of sending them.
///
/// `create_episode` gets a canned episode/action response; every other
/// endpoint answers `{}`. Clones share the request list.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    requests: Arc<Mutex<Vec<(String, Value)>>>,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose every request fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Transport that takes `delay` to answer each request
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.requests().into_iter().map(|(endpoint, _)| endpoint).collect()
    }
}

impl KnowRobTransport for RecordingTransport {
    fn post(&mut self, endpoint: &str, body: &Value) -> Result<String, SinkError> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((endpoint.to_string(), body.clone()));
        }
        if self.fail {
            return Err(SinkError::Transport(format!("{} refused", endpoint)));
        }
        if endpoint == CREATE_EPISODE {
            Ok(concat!(
                r#"{"Episode":"http://www.ease-crc.org/ont/SOMA.owl#Episode_test","#,
                r#""Action":"http://www.ease-crc.org/ont/SOMA.owl#Action_test"}"#
            )
            .to_string())
        } else {
            Ok("{}".to_string())
        }
    }
}

/// Blocking HTTP transport, driven from the client's worker thread
#[cfg(feature = "knowrob-http")]
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
}

#[cfg(feature = "knowrob-http")]
impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(5))
            .build();
        Self {
            agent,
            base_url: base_url.to_string(),
        }
    }
}

#[cfg(feature = "knowrob-http")]
impl KnowRobTransport for HttpTransport {
    fn post(&mut self, endpoint: &str, body: &Value) -> Result<String, SinkError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())
            .map_err(|e| SinkError::Transport(format!("{}: {}", url, e)))?;
        Ok(response.into_string()?)
    }
}
