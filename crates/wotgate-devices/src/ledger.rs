//! Subscription ledger.
//!
//! Every remote subscription a device opens (property observation or event
//! subscription) is recorded here together with the local task pumping its
//! values. Teardown releases all of them in one pass; there is no other
//! removal path.

use crate::consumed::RemoteSubscription;
use crate::error::{LedgerError, ThingError, ThingResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// What a subscription observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriptionKind {
    PropertyObserve,
    EventSubscribe,
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PropertyObserve => write!(f, "property-observe"),
            Self::EventSubscribe => write!(f, "event-subscribe"),
        }
    }
}

/// One open remote subscription.
pub struct Subscription {
    kind: SubscriptionKind,
    name: String,
    remote: Box<dyn RemoteSubscription>,
    pump: Option<AbortHandle>,
}

impl Subscription {
    pub fn new(
        kind: SubscriptionKind,
        name: impl Into<String>,
        remote: Box<dyn RemoteSubscription>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            remote,
            pump: None,
        }
    }

    /// Attach the local task draining this subscription's sink.
    pub fn with_pump(mut self, pump: AbortHandle) -> Self {
        self.pump = Some(pump);
        self
    }

    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the local pump, then cancel the remote side within `timeout`.
    async fn cancel(self, timeout: Duration) -> ThingResult<()> {
        if let Some(pump) = &self.pump {
            pump.abort();
        }
        match tokio::time::timeout(timeout, self.remote.cancel()).await {
            Ok(result) => result,
            Err(_) => Err(ThingError::Timeout(timeout.as_millis() as u64)),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("pump", &self.pump.is_some())
            .finish()
    }
}

#[derive(Default)]
struct LedgerState {
    entries: Vec<Subscription>,
    released: bool,
}

/// Registry of every open subscription of one device.
pub struct SubscriptionLedger {
    owner: String,
    cancel_timeout: Duration,
    state: Mutex<LedgerState>,
}

impl SubscriptionLedger {
    /// Create an empty ledger for the device `owner`.
    pub fn new(owner: impl Into<String>, cancel_timeout: Duration) -> Self {
        Self {
            owner: owner.into(),
            cancel_timeout,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Record an open subscription.
    ///
    /// A second live entry for the same (kind, name), or any registration
    /// after [`release_all`](Self::release_all), is refused; the offered
    /// subscription is cancelled before the error is returned so it cannot
    /// leak.
    pub async fn register(&self, subscription: Subscription) -> Result<(), LedgerError> {
        let refused = {
            let mut state = self.state.lock();
            let kind = subscription.kind;
            let name = subscription.name.clone();
            if state.released {
                Some((subscription, LedgerError::Released { kind, name }))
            } else if state
                .entries
                .iter()
                .any(|s| s.kind == kind && s.name == name)
            {
                Some((subscription, LedgerError::Duplicate { kind, name }))
            } else {
                debug!(device_id = %self.owner, %kind, name = %name, "Subscription registered");
                state.entries.push(subscription);
                None
            }
        };

        match refused {
            None => Ok(()),
            Some((subscription, err)) => {
                if let Err(e) = subscription.cancel(self.cancel_timeout).await {
                    warn!(device_id = %self.owner, "Failed to cancel refused subscription: {}", e);
                }
                Err(err)
            }
        }
    }

    /// Cancel every held subscription and clear the ledger.
    ///
    /// Cancellation is best effort: a failing or timed-out cancel is logged
    /// and the remaining entries are still attempted. Returns the number of
    /// entries released; calls after the first return 0.
    pub async fn release_all(&self) -> usize {
        let entries = {
            let mut state = self.state.lock();
            if state.released {
                return 0;
            }
            state.released = true;
            std::mem::take(&mut state.entries)
        };

        let count = entries.len();
        for subscription in entries {
            let kind = subscription.kind;
            let name = subscription.name.clone();
            match subscription.cancel(self.cancel_timeout).await {
                Ok(()) => debug!(device_id = %self.owner, %kind, name = %name, "Subscription cancelled"),
                Err(e) => warn!(
                    device_id = %self.owner,
                    %kind,
                    name = %name,
                    "Failed to cancel subscription: {}",
                    e
                ),
            }
        }
        count
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists for (kind, name).
    pub fn contains(&self, kind: SubscriptionKind, name: &str) -> bool {
        self.state
            .lock()
            .entries
            .iter()
            .any(|s| s.kind == kind && s.name == name)
    }

    /// Whether [`release_all`](Self::release_all) has run.
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }
}

impl Drop for SubscriptionLedger {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.entries.is_empty() {
            return;
        }
        // Remote cancels need a runtime; only the local pumps can be stopped here.
        warn!(
            device_id = %self.owner,
            count = state.entries.len(),
            "Ledger dropped without release, remote subscriptions leaked"
        );
        for subscription in &state.entries {
            if let Some(pump) = &subscription.pump {
                pump.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSubscription {
        cancels: Arc<AtomicUsize>,
        fail: bool,
        hang: bool,
    }

    #[async_trait]
    impl RemoteSubscription for CountingSubscription {
        async fn cancel(&self) -> ThingResult<()> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(ThingError::Transport("link down".to_string()));
            }
            Ok(())
        }
    }

    fn subscription(
        kind: SubscriptionKind,
        name: &str,
        cancels: &Arc<AtomicUsize>,
        fail: bool,
    ) -> Subscription {
        Subscription::new(
            kind,
            name,
            Box::new(CountingSubscription {
                cancels: Arc::clone(cancels),
                fail,
                hang: false,
            }),
        )
    }

    fn ledger() -> SubscriptionLedger {
        SubscriptionLedger::new("test", Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_register_and_release() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let ledger = ledger();

        ledger
            .register(subscription(SubscriptionKind::PropertyObserve, "temp", &cancels, false))
            .await
            .unwrap();
        ledger
            .register(subscription(SubscriptionKind::EventSubscribe, "temp", &cancels, false))
            .await
            .unwrap();

        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains(SubscriptionKind::PropertyObserve, "temp"));
        assert!(ledger.contains(SubscriptionKind::EventSubscribe, "temp"));

        assert_eq!(ledger.release_all().await, 2);
        assert_eq!(cancels.load(Ordering::SeqCst), 2);
        assert!(ledger.is_empty());
        assert!(ledger.is_released());
    }

    #[tokio::test]
    async fn test_release_all_is_idempotent() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let ledger = ledger();
        ledger
            .register(subscription(SubscriptionKind::EventSubscribe, "alarm", &cancels, false))
            .await
            .unwrap();

        assert_eq!(ledger.release_all().await, 1);
        assert_eq!(ledger.release_all().await, 0);
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_is_refused_and_cancelled() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let ledger = ledger();
        ledger
            .register(subscription(SubscriptionKind::PropertyObserve, "temp", &cancels, false))
            .await
            .unwrap();

        let err = ledger
            .register(subscription(SubscriptionKind::PropertyObserve, "temp", &cancels, false))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Duplicate { .. }));
        assert_eq!(ledger.len(), 1);
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_register_after_release_is_refused() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let ledger = ledger();
        ledger.release_all().await;

        let err = ledger
            .register(subscription(SubscriptionKind::EventSubscribe, "late", &cancels, false))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Released { .. }));
        assert!(ledger.is_empty());
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_cancel_does_not_stop_release() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let ledger = ledger();
        ledger
            .register(subscription(SubscriptionKind::PropertyObserve, "a", &cancels, true))
            .await
            .unwrap();
        ledger
            .register(subscription(SubscriptionKind::PropertyObserve, "b", &cancels, false))
            .await
            .unwrap();

        assert_eq!(ledger.release_all().await, 2);
        assert_eq!(cancels.load(Ordering::SeqCst), 2);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_hanging_cancel_is_bounded() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let ledger = SubscriptionLedger::new("test", Duration::from_millis(20));
        ledger
            .register(Subscription::new(
                SubscriptionKind::EventSubscribe,
                "stuck",
                Box::new(CountingSubscription {
                    cancels: Arc::clone(&cancels),
                    fail: false,
                    hang: true,
                }),
            ))
            .await
            .unwrap();
        ledger
            .register(subscription(SubscriptionKind::EventSubscribe, "fine", &cancels, false))
            .await
            .unwrap();

        assert_eq!(ledger.release_all().await, 2);
        assert_eq!(cancels.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_release_aborts_pump() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let ledger = ledger();
        let pump = tokio::spawn(std::future::pending::<()>());

        ledger
            .register(
                subscription(SubscriptionKind::PropertyObserve, "temp", &cancels, false)
                    .with_pump(pump.abort_handle()),
            )
            .await
            .unwrap();
        ledger.release_all().await;

        let joined = pump.await;
        assert!(joined.unwrap_err().is_cancelled());
    }
}
