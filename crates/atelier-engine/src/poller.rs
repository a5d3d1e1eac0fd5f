use std::sync::Arc;
use std::thread;
use std::time::Duration;

use atelier_contracts::credentials::non_empty_env;
use atelier_contracts::errors::AdapterError;
use atelier_contracts::events::{EventPayload, EventWriter};
use serde_json::Value;

use crate::{GenerativeService, OperationHandle};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Unbounded when `None`.
    pub max_polls: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_polls: None,
        }
    }
}

impl PollPolicy {
    /// Reads `ATELIER_VIDEO_POLL_INTERVAL` (seconds, 1..=120) and
    /// `ATELIER_VIDEO_MAX_POLLS` on top of the defaults.
    pub fn from_env() -> Self {
        Self::from_values(
            non_empty_env("ATELIER_VIDEO_POLL_INTERVAL").as_deref(),
            non_empty_env("ATELIER_VIDEO_MAX_POLLS").as_deref(),
        )
    }

    fn from_values(interval: Option<&str>, max_polls: Option<&str>) -> Self {
        let interval = interval
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .map(|value| Duration::from_secs_f64(value.clamp(1.0, 120.0)))
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let max_polls = max_polls
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|value| *value > 0);
        Self {
            interval,
            max_polls,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolledVideo {
    pub locator: String,
    pub polls: u32,
}

/// Waits out a video operation: sleep, re-poll, repeat until `done`.
///
/// There is no cancellation; once started the loop runs until the service
/// reports completion, fails, or `max_polls` is exhausted.
#[derive(Clone)]
pub struct VideoPoller {
    policy: PollPolicy,
    wait: Arc<dyn Fn(Duration) + Send + Sync>,
}

impl VideoPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self::with_wait(policy, thread::sleep)
    }

    pub fn with_wait(policy: PollPolicy, wait: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        Self {
            policy,
            wait: Arc::new(wait),
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn await_completion(
        &self,
        service: &dyn GenerativeService,
        handle: OperationHandle,
        credential: &str,
        events: Option<&EventWriter>,
    ) -> Result<PolledVideo, AdapterError> {
        let mut handle = handle;
        let mut polls = 0u32;
        while !handle.done {
            if let Some(max_polls) = self.policy.max_polls {
                if polls >= max_polls {
                    return Err(AdapterError::remote(format!(
                        "video operation {} timed out after {max_polls} polls",
                        handle.name
                    )));
                }
            }
            (self.wait)(self.policy.interval);
            handle = service
                .poll_video_operation(&handle, credential)
                .map_err(|err| AdapterError::classify(&err))?;
            polls += 1;
            if let Some(events) = events {
                let mut payload = EventPayload::new();
                payload.insert("operation".to_string(), Value::String(handle.name.clone()));
                payload.insert("poll".to_string(), Value::Number(polls.into()));
                payload.insert("done".to_string(), Value::Bool(handle.done));
                // Event log failures never fail the generation.
                let _ = events.emit("video_poll", payload);
            }
        }

        if let Some(error) = handle.error {
            return Err(AdapterError::classify(&anyhow::anyhow!(
                "video operation {} failed: {error}",
                handle.name
            )));
        }
        let Some(locator) = handle
            .locator
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        else {
            return Err(AdapterError::malformed(format!(
                "video operation {} finished without a video locator",
                handle.name
            )));
        };
        Ok(PolledVideo { locator, polls })
    }
}
