//! Action invoker.
//!
//! Turns local action requests into remote invocations and keeps a record
//! of each request so the host can follow its progress.

use crate::adapter::Notifier;
use crate::consumed::SharedThing;
use crate::error::{DeviceError, DeviceResult};
use crate::td::ActionAffordance;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use tracing::{debug, warn};

/// Lifecycle of an action request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Local record of one action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub time_requested: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_completed: Option<DateTime<Utc>>,
}

impl ActionRequest {
    fn pending(id: String, name: String, input: Option<Value>) -> Self {
        Self {
            id,
            name,
            input,
            status: ActionStatus::Pending,
            output: None,
            error: None,
            time_requested: Utc::now(),
            time_completed: None,
        }
    }

    fn complete(&mut self, output: Option<Value>) {
        self.status = ActionStatus::Completed;
        self.output = output;
        self.time_completed = Some(Utc::now());
    }

    fn fail(&mut self, error: String) {
        self.status = ActionStatus::Failed;
        self.error = Some(error);
        self.time_completed = Some(Utc::now());
    }

    /// Whether the request reached a final state.
    pub fn is_finished(&self) -> bool {
        self.status != ActionStatus::Pending
    }
}

/// Forwards action requests to the remote thing.
///
/// Pending requests are always kept. Finished ones are kept up to `history`,
/// the oldest finished record being evicted first.
pub struct ActionInvoker {
    thing: SharedThing,
    notifier: Notifier,
    actions: BTreeMap<String, ActionAffordance>,
    requests: DashMap<String, ActionRequest>,
    finished: Mutex<VecDeque<String>>,
    history: usize,
}

impl ActionInvoker {
    pub fn new(thing: SharedThing, notifier: Notifier, history: usize) -> Self {
        Self {
            thing,
            notifier,
            actions: BTreeMap::new(),
            requests: DashMap::new(),
            finished: Mutex::new(VecDeque::new()),
            history,
        }
    }

    /// Make an action available locally.
    pub fn register(&mut self, affordance: ActionAffordance) {
        self.actions.insert(affordance.name.clone(), affordance);
    }

    pub fn find(&self, name: &str) -> Option<&ActionAffordance> {
        self.actions.get(name)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionAffordance> {
        self.actions.values()
    }

    /// Invoke `name` remotely and track the request under `request_id`.
    ///
    /// `request_id` only correlates the local record; it is not sent to the
    /// remote thing. Reusing an id replaces the earlier record.
    pub async fn request_action(
        &self,
        request_id: impl Into<String>,
        name: &str,
        input: Option<Value>,
    ) -> DeviceResult<Option<Value>> {
        if !self.actions.contains_key(name) {
            return Err(DeviceError::UnknownAction(name.to_string()));
        }

        let request_id = request_id.into();
        let mut request = ActionRequest::pending(request_id.clone(), name.to_string(), input.clone());
        self.record(&request);

        debug!(device_id = %self.notifier.device_id(), action = %name, request_id = %request_id, "Invoking action");
        let result = self.thing.invoke_action(name, input).await;

        match result {
            Ok(output) => {
                request.complete(output.clone());
                self.record(&request);
                Ok(output)
            }
            Err(source) => {
                warn!(
                    device_id = %self.notifier.device_id(),
                    action = %name,
                    request_id = %request_id,
                    "Action invocation failed: {}",
                    source
                );
                request.fail(source.to_string());
                self.record(&request);
                Err(DeviceError::Invoke {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }

    /// Snapshot of one request record.
    pub fn request(&self, request_id: &str) -> Option<ActionRequest> {
        self.requests.get(request_id).map(|r| r.value().clone())
    }

    /// Snapshot of every request record, oldest first.
    pub fn requests(&self) -> Vec<ActionRequest> {
        let mut all: Vec<ActionRequest> = self.requests.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|r| r.time_requested);
        all
    }

    fn record(&self, request: &ActionRequest) {
        self.requests.insert(request.id.clone(), request.clone());
        if request.is_finished() {
            self.retire(&request.id);
        }
        self.notifier.action_status(request.clone());
    }

    /// Queue a finished record for eviction and drop whatever overflows.
    fn retire(&self, request_id: &str) {
        let evicted: Vec<String> = {
            let mut finished = self.finished.lock();
            finished.retain(|id| id != request_id);
            finished.push_back(request_id.to_string());
            let excess = finished.len().saturating_sub(self.history);
            finished.drain(..excess).collect()
        };

        for id in evicted {
            // A reused id may belong to a request that is pending again
            self.requests.remove_if(&id, |_, r| r.is_finished());
        }
    }
}
