//! Remote service availability
//!
//! The [`AvailabilityStore`] holds the one availability value a caller
//! consults before offering fetch or publish actions. The
//! [`AvailabilityProber`] is the only writer: each attempt moves the store to
//! `checking`, runs one time-boxed probe and publishes the classification.
//! A `starting` result is re-probed after a fixed delay, up to the policy's
//! retry limit or until the caller cancels.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::HealthApi;
use crate::config::ProbePolicy;
use crate::error::ApiError;

/// Reachability classification of the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Checking,
    Online,
    Starting,
    Offline,
    Error,
}

impl AvailabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityStatus::Checking => "checking",
            AvailabilityStatus::Online => "online",
            AvailabilityStatus::Starting => "starting",
            AvailabilityStatus::Offline => "offline",
            AvailabilityStatus::Error => "error",
        }
    }
}

/// Availability status plus a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAvailability {
    pub status: AvailabilityStatus,
    pub message: String,
}

impl ServiceAvailability {
    pub fn checking() -> Self {
        Self::new(AvailabilityStatus::Checking, "Checking server status...")
    }

    pub fn online() -> Self {
        Self::new(AvailabilityStatus::Online, "Server is ready")
    }

    pub fn starting() -> Self {
        Self::new(AvailabilityStatus::Starting, "Server is starting...")
    }

    pub fn offline(message: impl Into<String>) -> Self {
        Self::new(AvailabilityStatus::Offline, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(AvailabilityStatus::Error, message)
    }

    fn new(status: AvailabilityStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Whether fetch and publish actions should be offered
    pub fn is_online(&self) -> bool {
        self.status == AvailabilityStatus::Online
    }
}

impl fmt::Display for ServiceAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.as_str(), self.message)
    }
}

/// Callback invoked on every availability change
pub type AvailabilityListener = Box<dyn Fn(&ServiceAvailability) + Send + Sync>;

struct StoreInner {
    tx: watch::Sender<ServiceAvailability>,
    listeners: Mutex<Vec<AvailabilityListener>>,
}

/// Shared holder of the current availability value.
///
/// Clones share the same value. Readers either poll [`current`], await a
/// [`subscribe`] receiver, or register a listener that sees every change.
///
/// [`current`]: AvailabilityStore::current
/// [`subscribe`]: AvailabilityStore::subscribe
#[derive(Clone)]
pub struct AvailabilityStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for AvailabilityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvailabilityStore")
            .field("current", &self.current())
            .finish()
    }
}

impl Default for AvailabilityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AvailabilityStore {
    /// A store starting in `checking`
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ServiceAvailability::checking());
        Self {
            inner: Arc::new(StoreInner {
                tx,
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn current(&self) -> ServiceAvailability {
        self.inner.tx.borrow().clone()
    }

    /// Receiver that wakes on changes; intermediate values may be coalesced
    pub fn subscribe(&self) -> watch::Receiver<ServiceAvailability> {
        self.inner.tx.subscribe()
    }

    /// Register a callback that fires synchronously on every change.
    ///
    /// Listeners run under the registry lock and must not register more
    /// listeners.
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(&ServiceAvailability) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().push(Box::new(listener));
    }

    pub(crate) fn set(&self, value: ServiceAvailability) {
        self.inner.tx.send_replace(value.clone());
        let listeners = self.inner.listeners.lock();
        for listener in listeners.iter() {
            listener(&value);
        }
    }
}

/// Map a completed probe call onto an availability value
pub fn classify(result: Result<(), ApiError>) -> ServiceAvailability {
    match result {
        Ok(()) => ServiceAvailability::online(),
        Err(ApiError::Timeout) => ServiceAvailability::starting(),
        Err(ApiError::Client(msg)) => {
            ServiceAvailability::error(format!("Server status check failed: {msg}"))
        }
        Err(_) => ServiceAvailability::offline("Server connection failed"),
    }
}

/// Probes the remote service and publishes the result to a store
pub struct AvailabilityProber<A: ?Sized> {
    api: Arc<A>,
    store: AvailabilityStore,
    policy: ProbePolicy,
}

impl<A> AvailabilityProber<A>
where
    A: HealthApi + ?Sized + 'static,
{
    pub fn new(api: Arc<A>, store: AvailabilityStore, policy: ProbePolicy) -> Self {
        Self { api, store, policy }
    }

    pub fn store(&self) -> &AvailabilityStore {
        &self.store
    }

    pub fn policy(&self) -> &ProbePolicy {
        &self.policy
    }

    /// One attempt: `checking`, then the classified outcome.
    ///
    /// The probe runs on its own task so a panic inside the API surfaces as
    /// `error` instead of unwinding into the caller.
    pub async fn probe_once(&self) -> ServiceAvailability {
        self.publish(ServiceAvailability::checking());

        let api = Arc::clone(&self.api);
        let mut task = tokio::spawn(async move { api.probe().await });

        let outcome = match tokio::time::timeout(self.policy.timeout, &mut task).await {
            Err(_elapsed) => {
                task.abort();
                ServiceAvailability::starting()
            }
            Ok(Err(join_error)) => {
                ServiceAvailability::error(format!("Server status check failed: {join_error}"))
            }
            Ok(Ok(result)) => classify(result),
        };

        self.publish(outcome.clone());
        outcome
    }

    /// Probe until the service resolves, retries run out, or `cancel` fires.
    ///
    /// Cancellation is honored between attempts; the store then keeps its
    /// last value (`starting`).
    pub async fn probe(&self, cancel: &CancellationToken) -> ServiceAvailability {
        let mut retries = 0u32;

        loop {
            let outcome = self.probe_once().await;
            if outcome.status != AvailabilityStatus::Starting {
                return outcome;
            }

            if retries >= self.policy.max_retries {
                let gave_up = ServiceAvailability::offline(format!(
                    "Server did not finish starting after {retries} retries"
                ));
                warn!(retries, "giving up on starting server");
                self.publish(gave_up.clone());
                return gave_up;
            }
            retries += 1;

            info!(
                retry = retries,
                delay_secs = self.policy.retry_delay.as_secs_f64(),
                "server starting, scheduling re-probe"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("availability probing cancelled");
                    return outcome;
                }
                _ = tokio::time::sleep(self.policy.retry_delay) => {}
            }
        }
    }

    /// Run [`probe`](Self::probe) as a background task
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<ServiceAvailability> {
        tokio::spawn(async move { self.probe(&cancel).await })
    }

    fn publish(&self, value: ServiceAvailability) {
        info!(status = value.status.as_str(), message = %value.message, "service availability");
        self.store.set(value);
    }
}
