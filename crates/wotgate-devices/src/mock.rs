//! In-memory consumed thing for tests and demos.
//!
//! `MockThing` records every call it receives, serves canned property values
//! and action outputs, and lets the caller push property values or event
//! payloads into whatever sinks the device registered. Individual operations
//! can be made to fail, and subscription cancels can be made to fail or hang.

use crate::consumed::{ConsumedThing, RemoteSubscription, ValueSink};
use crate::error::{ThingError, ThingResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Operation selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Read,
    Write,
    Invoke,
    Observe,
    Subscribe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CancelMode {
    #[default]
    Succeed,
    Fail,
    Hang,
}

#[derive(Default)]
struct MockState {
    values: HashMap<String, Value>,
    outputs: HashMap<String, Value>,
    failures: HashSet<(MockOp, String)>,
    cancel_mode: CancelMode,

    reads: Vec<String>,
    writes: Vec<(String, Value)>,
    invokes: Vec<(String, Option<Value>)>,
    observe_calls: Vec<String>,
    subscribe_calls: Vec<String>,
    cancels: usize,

    observers: HashMap<String, ValueSink>,
    subscribers: HashMap<String, ValueSink>,
}

/// Scriptable in-memory thing.
///
/// Clones share state, so a test can keep one clone for assertions after
/// handing another to a device.
#[derive(Clone, Default)]
pub struct MockThing {
    state: Arc<Mutex<MockState>>,
}

impl MockThing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value returned by reads of `property`.
    pub fn with_value(self, property: &str, value: Value) -> Self {
        self.set_value(property, value);
        self
    }

    /// Output returned by invocations of `action`.
    pub fn with_output(self, action: &str, output: Value) -> Self {
        self.state.lock().outputs.insert(action.to_string(), output);
        self
    }

    /// Make `op` on `name` fail with a transport error.
    pub fn failing(self, op: MockOp, name: &str) -> Self {
        self.state.lock().failures.insert((op, name.to_string()));
        self
    }

    /// Every subscription cancel returns an error.
    pub fn with_failing_cancels(self) -> Self {
        self.state.lock().cancel_mode = CancelMode::Fail;
        self
    }

    /// Every subscription cancel never completes.
    pub fn with_hanging_cancels(self) -> Self {
        self.state.lock().cancel_mode = CancelMode::Hang;
        self
    }

    pub fn set_value(&self, property: &str, value: Value) {
        self.state.lock().values.insert(property.to_string(), value);
    }

    /// Deliver a property change to the observer of `property`.
    ///
    /// Returns `false` if nobody observes it or the receiving side is gone.
    pub fn push_property(&self, property: &str, value: Value) -> bool {
        let sink = self.state.lock().observers.get(property).cloned();
        sink.is_some_and(|s| s.send(value).is_ok())
    }

    /// Deliver an event payload to the subscriber of `event`.
    pub fn emit_event(&self, event: &str, data: Value) -> bool {
        let sink = self.state.lock().subscribers.get(event).cloned();
        sink.is_some_and(|s| s.send(data).is_ok())
    }

    pub fn reads(&self) -> Vec<String> {
        self.state.lock().reads.clone()
    }

    pub fn writes(&self) -> Vec<(String, Value)> {
        self.state.lock().writes.clone()
    }

    pub fn invokes(&self) -> Vec<(String, Option<Value>)> {
        self.state.lock().invokes.clone()
    }

    /// Names passed to `observe_property`, in call order.
    pub fn observe_calls(&self) -> Vec<String> {
        self.state.lock().observe_calls.clone()
    }

    /// Names passed to `subscribe_event`, in call order.
    pub fn subscribe_calls(&self) -> Vec<String> {
        self.state.lock().subscribe_calls.clone()
    }

    /// Subscriptions currently open (not yet successfully cancelled).
    pub fn open_subscriptions(&self) -> usize {
        let state = self.state.lock();
        state.observers.len() + state.subscribers.len()
    }

    pub fn is_observing(&self, property: &str) -> bool {
        self.state.lock().observers.contains_key(property)
    }

    /// Cancel attempts, including failed and hung ones.
    pub fn cancel_count(&self) -> usize {
        self.state.lock().cancels
    }

    fn check(&self, op: MockOp, name: &str) -> ThingResult<()> {
        if self.state.lock().failures.contains(&(op, name.to_string())) {
            return Err(ThingError::Transport(format!("injected {:?} failure for '{}'", op, name)));
        }
        Ok(())
    }
}

#[async_trait]
impl ConsumedThing for MockThing {
    async fn read_property(&self, name: &str) -> ThingResult<Value> {
        self.state.lock().reads.push(name.to_string());
        self.check(MockOp::Read, name)?;
        self.state
            .lock()
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| ThingError::Rejected(format!("no value for '{}'", name)))
    }

    /// Records the write and stores the value for later reads. Observers are
    /// not notified; use [`MockThing::push_property`] for that.
    async fn write_property(&self, name: &str, value: Value) -> ThingResult<()> {
        self.state
            .lock()
            .writes
            .push((name.to_string(), value.clone()));
        self.check(MockOp::Write, name)?;
        self.set_value(name, value);
        Ok(())
    }

    async fn invoke_action(&self, name: &str, input: Option<Value>) -> ThingResult<Option<Value>> {
        self.state.lock().invokes.push((name.to_string(), input));
        self.check(MockOp::Invoke, name)?;
        Ok(self.state.lock().outputs.get(name).cloned())
    }

    async fn observe_property(
        &self,
        name: &str,
        sink: ValueSink,
    ) -> ThingResult<Box<dyn RemoteSubscription>> {
        self.state.lock().observe_calls.push(name.to_string());
        self.check(MockOp::Observe, name)?;
        self.state.lock().observers.insert(name.to_string(), sink);
        Ok(Box::new(MockSubscription {
            state: Arc::clone(&self.state),
            target: Target::Property(name.to_string()),
        }))
    }

    async fn subscribe_event(
        &self,
        name: &str,
        sink: ValueSink,
    ) -> ThingResult<Box<dyn RemoteSubscription>> {
        self.state.lock().subscribe_calls.push(name.to_string());
        self.check(MockOp::Subscribe, name)?;
        self.state.lock().subscribers.insert(name.to_string(), sink);
        Ok(Box::new(MockSubscription {
            state: Arc::clone(&self.state),
            target: Target::Event(name.to_string()),
        }))
    }
}

enum Target {
    Property(String),
    Event(String),
}

struct MockSubscription {
    state: Arc<Mutex<MockState>>,
    target: Target,
}

#[async_trait]
impl RemoteSubscription for MockSubscription {
    async fn cancel(&self) -> ThingResult<()> {
        let mode = {
            let mut state = self.state.lock();
            state.cancels += 1;
            state.cancel_mode
        };

        match mode {
            CancelMode::Hang => std::future::pending().await,
            CancelMode::Fail => Err(ThingError::Transport("cancel refused".to_string())),
            CancelMode::Succeed => {
                let mut state = self.state.lock();
                match &self.target {
                    Target::Property(name) => state.observers.remove(name),
                    Target::Event(name) => state.subscribers.remove(name),
                };
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumed::value_channel;
    use serde_json::json;

    #[tokio::test]
    async fn test_reads_and_writes_are_recorded() {
        let thing = MockThing::new().with_value("temp", json!(21.5));

        assert_eq!(thing.read_property("temp").await.unwrap(), json!(21.5));
        thing.write_property("temp", json!(19)).await.unwrap();
        assert_eq!(thing.read_property("temp").await.unwrap(), json!(19));
        assert!(thing.read_property("missing").await.is_err());

        assert_eq!(thing.reads(), vec!["temp", "temp", "missing"]);
        assert_eq!(thing.writes(), vec![("temp".to_string(), json!(19))]);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let thing = MockThing::new()
            .with_output("fade", json!("ok"))
            .failing(MockOp::Invoke, "fade");

        let err = thing.invoke_action("fade", None).await.unwrap_err();
        assert!(matches!(err, ThingError::Transport(_)));
        assert_eq!(thing.invokes().len(), 1);
    }

    #[tokio::test]
    async fn test_push_reaches_sink_until_cancelled() {
        let thing = MockThing::new();
        let (sink, mut values) = value_channel();
        let subscription = thing.observe_property("temp", sink).await.unwrap();

        assert!(thing.push_property("temp", json!(1)));
        assert_eq!(values.recv().await, Some(json!(1)));
        assert!(!thing.emit_event("temp", json!(1)));

        subscription.cancel().await.unwrap();
        assert!(!thing.push_property("temp", json!(2)));
        assert_eq!(thing.cancel_count(), 1);
        assert_eq!(thing.open_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_failing_cancel_keeps_sink() {
        let thing = MockThing::new().with_failing_cancels();
        let (sink, _values) = value_channel();
        let subscription = thing.subscribe_event("alarm", sink).await.unwrap();

        assert!(subscription.cancel().await.is_err());
        assert_eq!(thing.open_subscriptions(), 1);
    }
}
