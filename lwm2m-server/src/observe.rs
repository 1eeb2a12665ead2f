//! Observation engine
//!
//! Each session owns one worker task. It wakes on a lifetime-period tick,
//! on notifications pushed by the transport, on reconcile requests and on
//! close/shutdown. Reconciling (re-)establishes every observation whose
//! subscription is missing or has lapsed; failures are retried on the
//! next tick.

use crate::device::Device;
use lwm2m_core::{ContentFormat, Lwm2mError, Lwm2mResult, Path};
use lwm2m_node::{Node, Object, Resource, get_all_resources, get_object_by_path, get_resource_by_path};
use lwm2m_transport::{Notification, NotificationSink, Subscription};
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Callback invoked with the decoded nodes of each notification
pub type ObserveCallback = Arc<dyn Fn(&Device, &Path, &[Node]) + Send + Sync>;

/// Requests handled by the session worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionControl {
    Reconcile,
}

pub(crate) struct Observation {
    pub(crate) callback: ObserveCallback,
    pub(crate) subscription: Option<Box<dyn Subscription>>,
    pub(crate) generation: u64,
}

impl Observation {
    fn needs_subscription(&self) -> bool {
        self.subscription
            .as_ref()
            .is_none_or(|subscription| subscription.is_cancelled())
    }
}

impl Device {
    /// Observe a path
    ///
    /// Replaces (and cancels) any observation already at `path`. The
    /// subscription is established in the background; the callback runs
    /// on the session worker, before the shadow cache is updated.
    pub fn observe<F>(&self, path: Path, callback: F) -> Lwm2mResult<()>
    where
        F: Fn(&Device, &Path, &[Node]) + Send + Sync + 'static,
    {
        self.install_observation(path, Arc::new(callback))?;
        self.refresh_observations();
        Ok(())
    }

    /// Observe an object, receiving it reassembled from each notification
    pub fn observe_object<F>(&self, path: Path, callback: F) -> Lwm2mResult<()>
    where
        F: Fn(&Device, &Object) + Send + Sync + 'static,
    {
        if !path.is_object() {
            return Err(Lwm2mError::PathInvalidValue(format!(
                "{} is not an object path",
                path
            )));
        }
        self.observe(path, move |device, path, nodes| {
            match get_object_by_path(nodes, path) {
                Ok(object) => callback(device, &object),
                Err(e) => log::warn!("Notification for {} without the object: {}", path, e),
            }
        })
    }

    /// Observe a single resource
    pub fn observe_resource<F>(&self, path: Path, callback: F) -> Lwm2mResult<()>
    where
        F: Fn(&Device, &Resource) + Send + Sync + 'static,
    {
        if !path.is_resource() {
            return Err(Lwm2mError::PathInvalidValue(format!(
                "{} is not a resource path",
                path
            )));
        }
        self.observe(path, move |device, path, nodes| {
            match get_resource_by_path(nodes, path) {
                Ok(resource) => callback(device, resource),
                Err(e) => log::warn!("Notification for {} without the resource: {}", path, e),
            }
        })
    }

    /// Observe a path and establish the subscription immediately
    ///
    /// On failure the observation stays registered and is retried on the
    /// next tick; the error is returned to the caller.
    pub async fn observe_now<F>(&self, path: Path, callback: F) -> Lwm2mResult<()>
    where
        F: Fn(&Device, &Path, &[Node]) + Send + Sync + 'static,
    {
        let generation = self.install_observation(path, Arc::new(callback))?;
        self.establish(path, generation).await
    }

    /// Stop observing a path
    ///
    /// # Errors
    ///
    /// `NotFound` if the path is not observed
    pub fn cancel_observe(&self, path: &Path) -> Lwm2mResult<()> {
        let removed = { self.observations().remove(path) };
        let observation = removed.ok_or(Lwm2mError::NotFound)?;
        if let Some(subscription) = observation.subscription {
            self.spawn_cancel(*path, subscription);
        }
        Ok(())
    }

    /// Paths currently observed, ascending
    pub fn observed_paths(&self) -> Vec<Path> {
        let mut paths: Vec<Path> = self.observations().keys().copied().collect();
        paths.sort_unstable();
        paths
    }

    /// Ask the worker to re-establish lapsed observations now
    pub fn refresh_observations(&self) {
        // a full queue already holds a pending reconcile
        let _ = self.inner.control.try_send(SessionControl::Reconcile);
    }

    /// Last value of a resource seen in a notification
    pub fn cached_resource(&self, path: &Path) -> Option<Resource> {
        self.inner
            .shadow
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    fn install_observation(&self, path: Path, callback: ObserveCallback) -> Lwm2mResult<u64> {
        if self.is_closed() {
            return Err(Lwm2mError::SessionNotFound(self.id().to_string()));
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let replaced = {
            self.observations().insert(
                path,
                Observation {
                    callback,
                    subscription: None,
                    generation,
                },
            )
        };
        if let Some(Observation {
            subscription: Some(subscription),
            ..
        }) = replaced
        {
            log::debug!("Replacing observation {} of {}", path, self.endpoint());
            self.spawn_cancel(path, subscription);
        }
        Ok(generation)
    }

    pub(crate) async fn run(
        self,
        initial_delay: Duration,
        mut notifications: mpsc::Receiver<Notification>,
        mut control: mpsc::Receiver<SessionControl>,
        mut closed: watch::Receiver<bool>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut next_reconcile = Instant::now() + initial_delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_reconcile) => {
                    self.reconcile().await;
                    next_reconcile = Instant::now() + self.lifetime_duration();
                }
                Some(notification) = notifications.recv() => {
                    self.dispatch_notification(notification);
                }
                Some(message) = control.recv() => match message {
                    SessionControl::Reconcile => self.reconcile().await,
                },
                _ = closed.changed() => break,
                _ = shutdown.changed() => break,
            }
        }
        log::debug!("Session {} worker stopped", self.id());
        self.close();
    }

    async fn reconcile(&self) {
        let pending: Vec<(Path, u64)> = {
            self.observations()
                .iter()
                .filter(|(_, observation)| observation.needs_subscription())
                .map(|(path, observation)| (*path, observation.generation))
                .collect()
        };
        for (path, generation) in pending {
            if let Err(e) = self.establish(path, generation).await {
                log::warn!("Failed to observe {} on {}: {}", path, self.endpoint(), e);
            }
        }
    }

    /// Subscribe and install the result if the observation is still the
    /// one identified by `generation`
    async fn establish(&self, path: Path, generation: u64) -> Lwm2mResult<()> {
        let connection = self.connection();
        let sink = NotificationSink::new(path, self.inner.notifications.clone());
        let subscription = tokio::time::timeout(
            self.lifetime_duration(),
            connection.observe(&path, ContentFormat::Tlv, sink),
        )
        .await
        .map_err(|_| Lwm2mError::Timeout)??;

        let stale = {
            let mut observations = self.observations();
            match observations.get_mut(&path) {
                Some(observation) if observation.generation == generation => observation
                    .subscription
                    .replace(subscription)
                    .filter(|lapsed| !lapsed.is_cancelled()),
                _ => Some(subscription),
            }
        };
        if let Some(stale) = stale {
            self.spawn_cancel(path, stale);
        }
        log::debug!("Observing {} on {}", path, self.endpoint());
        Ok(())
    }

    fn dispatch_notification(&self, notification: Notification) {
        let Notification { path, message } = notification;
        let callback = {
            self.observations()
                .get(&path)
                .map(|observation| Arc::clone(&observation.callback))
        };
        let Some(callback) = callback else {
            log::debug!("Dropping notification for unobserved {}", path);
            return;
        };
        if !message.code.is_success() {
            log::warn!("Notification for {} carried {}", path, message.code);
            return;
        }

        let nodes = match self.decode_response(&path, &message) {
            Ok(nodes) => nodes,
            Err(e) => {
                log::warn!("Dropping undecodable notification for {}: {}", path, e);
                return;
            }
        };
        callback(self, &path, &nodes);
        self.update_shadow(&nodes);
    }

    fn update_shadow(&self, nodes: &[Node]) {
        let Ok(resources) = get_all_resources(nodes, &Path::root()) else {
            return;
        };
        let mut shadow = self
            .inner
            .shadow
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for (path, resource) in resources {
            shadow.insert(path, resource.clone());
        }
    }

    pub(crate) fn spawn_cancel(&self, path: Path, subscription: Box<dyn Subscription>) {
        let timeout = self.lifetime_duration();
        let endpoint = self.endpoint().to_string();
        tokio::spawn(async move {
            if let Err(e) = cancel_subscription(subscription.as_ref(), timeout).await {
                log::warn!("Failed to cancel observation {} of {}: {}", path, endpoint, e);
            }
        });
    }
}

/// Cancel a subscription, bounded by `timeout`
pub(crate) async fn cancel_subscription(
    subscription: &dyn Subscription,
    timeout: Duration,
) -> Lwm2mResult<()> {
    if subscription.is_cancelled() {
        return Ok(());
    }
    tokio::time::timeout(timeout, subscription.cancel())
        .await
        .map_err(|_| Lwm2mError::Timeout)?
}
