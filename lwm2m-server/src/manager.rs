//! Device manager
//!
//! Owns the session table and the lifecycle event queue.
//!
//! # Architecture
//! - One `tokio::sync::RwLock` guards the table (by id and by endpoint).
//! - Every transition reserves event queue slots first, then takes the table
//!   lock, mutates, and fills the slots before releasing it. Queue order is
//!   therefore transition order, and a full queue never blocks the lock.
//! - A single dispatcher task drains the queue and calls the listener, so
//!   listener calls never overlap.
//! - An expiry sweeper deregisters sessions that outlived lifetime + grace.

use crate::config::ManagerConfig;
use crate::device::Device;
use crate::events::{DeviceEvent, DeviceEventKind, DeviceEventListener};
use crate::registration::{RegisterRequest, UpdateRequest};
use lwm2m_codec::CoreLink;
use lwm2m_core::{Lwm2mError, Lwm2mResult};
use lwm2m_node::Registry;
use lwm2m_transport::Connection;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, PermitIterator};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

const SESSION_ID_LENGTH: usize = 5;
/// `register` reserves room for a replaced session's `Deregister` and the new `Register`
const MIN_EVENT_QUEUE_CAPACITY: usize = 2;
const SESSION_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Registry of registered devices
///
/// Cheap to clone; all clones share the same table. Must be created inside
/// a Tokio runtime since it spawns its dispatcher and expiry tasks.
///
/// # Usage Example
/// ```rust,no_run
/// use lwm2m_server::{DeviceManager, RegistrationHandler};
///
/// let manager = DeviceManager::new();
/// let handler = RegistrationHandler::new(manager.clone());
/// // feed `/rd` requests from the transport into `handler.handle(...)`
/// ```
#[derive(Clone)]
pub struct DeviceManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ManagerConfig,
    registry: Arc<Registry>,
    sessions: RwLock<SessionTable>,
    events: mpsc::Sender<DeviceEvent>,
    listener: std::sync::RwLock<Option<Arc<dyn DeviceEventListener>>>,
    shutdown: watch::Sender<bool>,
}

#[derive(Default)]
struct SessionTable {
    by_id: HashMap<String, Device>,
    by_endpoint: HashMap<String, String>,
}

impl SessionTable {
    fn insert(&mut self, device: Device) {
        self.by_endpoint
            .insert(device.endpoint().to_string(), device.id().to_string());
        self.by_id.insert(device.id().to_string(), device);
    }

    fn remove(&mut self, id: &str) -> Option<Device> {
        let device = self.by_id.remove(id)?;
        if self.by_endpoint.get(device.endpoint()).map(String::as_str) == Some(id) {
            self.by_endpoint.remove(device.endpoint());
        }
        Some(device)
    }

    fn unused_id(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let id: String = (0..SESSION_ID_LENGTH)
                .map(|_| char::from(SESSION_ID_ALPHABET[rng.gen_range(0..SESSION_ID_ALPHABET.len())]))
                .collect();
            if !self.by_id.contains_key(&id) {
                return id;
            }
        }
    }
}

impl DeviceManager {
    /// Create a manager with the default configuration and core objects
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default(), Arc::new(Registry::with_core_objects()))
    }

    /// Create a manager with custom configuration and registry
    pub fn with_config(config: ManagerConfig, registry: Arc<Registry>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity.max(MIN_EVENT_QUEUE_CAPACITY));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::new(ManagerInner {
            config,
            registry,
            sessions: RwLock::new(SessionTable::default()),
            events: events_tx,
            listener: std::sync::RwLock::new(None),
            shutdown: shutdown_tx,
        });

        tokio::spawn(dispatch_events(Arc::downgrade(&inner), events_rx));
        tokio::spawn(sweep_expired(Arc::downgrade(&inner), shutdown_rx));
        Self { inner }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Set the receiver of lifecycle events, replacing any previous one
    pub fn set_event_listener(&self, listener: Arc<dyn DeviceEventListener>) {
        *self
            .inner
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    /// Register a device
    ///
    /// A previous session of the same endpoint is removed first and emits
    /// `Deregister` before the new session's `Register`.
    pub async fn register(
        &self,
        request: RegisterRequest,
        links: Vec<CoreLink>,
        connection: Arc<dyn Connection>,
    ) -> Device {
        let mut permits = self.reserve_events(2).await;
        let mut table = self.inner.sessions.write().await;

        let replaced = match table.by_endpoint.get(&request.endpoint).cloned() {
            Some(old_id) => table.remove(&old_id),
            None => None,
        };
        if let Some(old) = &replaced {
            emit(&mut permits, DeviceEventKind::Deregister, old);
        }

        let device = Device::start(
            table.unused_id(),
            &request,
            &links,
            connection,
            Arc::clone(&self.inner.registry),
            &self.inner.config,
            self.inner.shutdown.subscribe(),
        );
        table.insert(device.clone());
        emit(&mut permits, DeviceEventKind::Register, &device);
        drop(table);

        if let Some(old) = replaced {
            log::info!(
                "{} re-registered, replacing session {}",
                old.endpoint(),
                old.id()
            );
            old.close();
        }
        device
    }

    /// Emit `PostRegister` once the registration response was acknowledged
    pub async fn post_register(&self, id: &str) -> Lwm2mResult<()> {
        self.emit_for(id, DeviceEventKind::PostRegister).await
    }

    /// Merge an update into a session
    ///
    /// # Arguments
    /// * `links` - New object links, if the update carried any
    /// * `connection` - Replacement connection when the device moved
    pub async fn update(
        &self,
        id: &str,
        request: UpdateRequest,
        links: Option<Vec<CoreLink>>,
        connection: Option<Arc<dyn Connection>>,
    ) -> Lwm2mResult<Device> {
        let mut permits = self.reserve_events(1).await;
        let table = self.inner.sessions.write().await;
        let device = table
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| Lwm2mError::DeviceNotFound(id.to_string()))?;
        device.apply_update(&request, links.as_deref(), connection);
        emit(&mut permits, DeviceEventKind::Update, &device);
        Ok(device)
    }

    /// Emit `PostUpdate` once the update response was acknowledged
    pub async fn post_update(&self, id: &str) -> Lwm2mResult<()> {
        self.emit_for(id, DeviceEventKind::PostUpdate).await
    }

    /// Remove and close a session
    ///
    /// Observations are cancelled in the background; the call does not wait
    /// for the device to answer.
    pub async fn deregister(&self, id: &str) -> Lwm2mResult<Device> {
        self.remove_session(id, |_| true)
            .await?
            .ok_or_else(|| Lwm2mError::DeviceNotFound(id.to_string()))
    }

    /// Remove a session if `should_remove` holds for it under the table lock
    ///
    /// `Ok(None)` when the session exists but was kept.
    async fn remove_session<F>(&self, id: &str, should_remove: F) -> Lwm2mResult<Option<Device>>
    where
        F: FnOnce(&Device) -> bool,
    {
        let mut permits = self.reserve_events(1).await;
        let mut table = self.inner.sessions.write().await;
        let current = table
            .by_id
            .get(id)
            .ok_or_else(|| Lwm2mError::DeviceNotFound(id.to_string()))?;
        if !should_remove(current) {
            return Ok(None);
        }
        let Some(device) = table.remove(id) else {
            return Ok(None);
        };
        emit(&mut permits, DeviceEventKind::Deregister, &device);
        drop(table);

        device.close();
        Ok(Some(device))
    }

    /// Look up a session by id
    pub async fn get_device(&self, id: &str) -> Lwm2mResult<Device> {
        self.inner
            .sessions
            .read()
            .await
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| Lwm2mError::DeviceNotFound(id.to_string()))
    }

    /// Look up a session by endpoint client name
    pub async fn get_device_by_endpoint(&self, endpoint: &str) -> Lwm2mResult<Device> {
        let table = self.inner.sessions.read().await;
        table
            .by_endpoint
            .get(endpoint)
            .and_then(|id| table.by_id.get(id))
            .cloned()
            .ok_or_else(|| Lwm2mError::DeviceNotFound(endpoint.to_string()))
    }

    /// Every registered session
    pub async fn devices(&self) -> Vec<Device> {
        self.inner.sessions.read().await.by_id.values().cloned().collect()
    }

    pub async fn device_count(&self) -> usize {
        self.inner.sessions.read().await.by_id.len()
    }

    /// Stop background tasks and close every session
    ///
    /// No events are emitted for sessions closed here.
    pub async fn shutdown(&self) {
        let devices: Vec<Device> = {
            let mut table = self.inner.sessions.write().await;
            table.by_endpoint.clear();
            table.by_id.drain().map(|(_, device)| device).collect()
        };
        let mut closing = JoinSet::new();
        for device in devices {
            closing.spawn(async move { device.close_and_wait().await });
        }
        while closing.join_next().await.is_some() {}
        self.inner.shutdown.send_replace(true);
        log::info!("Device manager shut down");
    }

    /// Deregister every session whose lifetime has run out
    pub(crate) async fn deregister_expired(&self) {
        let now = Instant::now();
        let grace = self.inner.config.expiry_grace;
        let expired: Vec<String> = {
            let table = self.inner.sessions.read().await;
            table
                .by_id
                .values()
                .filter(|device| device.is_expired(now, grace))
                .map(|device| device.id().to_string())
                .collect()
        };
        for id in expired {
            match self.remove_expired(&id, grace).await {
                Ok(Some(device)) => log::info!("Registration of {} expired", device.endpoint()),
                Ok(None) => log::debug!("Expiry of {} skipped: updated meanwhile", id),
                Err(e) => log::debug!("Expiry of {} skipped: {}", id, e),
            }
        }
    }

    /// Deregister a session only if it is still expired now
    pub(crate) async fn remove_expired(&self, id: &str, grace: Duration) -> Lwm2mResult<Option<Device>> {
        self.remove_session(id, |device| device.is_expired(Instant::now(), grace))
            .await
    }

    async fn emit_for(&self, id: &str, kind: DeviceEventKind) -> Lwm2mResult<()> {
        let mut permits = self.reserve_events(1).await;
        let table = self.inner.sessions.read().await;
        let device = table
            .by_id
            .get(id)
            .ok_or_else(|| Lwm2mError::DeviceNotFound(id.to_string()))?;
        emit(&mut permits, kind, device);
        Ok(())
    }

    async fn reserve_events(&self, count: usize) -> Option<PermitIterator<'_, DeviceEvent>> {
        match self.inner.events.reserve_many(count).await {
            Ok(permits) => Some(permits),
            Err(_) => {
                log::warn!("Event dispatcher stopped, events dropped");
                None
            }
        }
    }

    fn listener(&self) -> Option<Arc<dyn DeviceEventListener>> {
        self.inner
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

fn emit(permits: &mut Option<PermitIterator<'_, DeviceEvent>>, kind: DeviceEventKind, device: &Device) {
    if let Some(permit) = permits.as_mut().and_then(Iterator::next) {
        permit.send(DeviceEvent::new(kind, device.clone()));
    }
}

/// Deliver queued events to the listener, one at a time
///
/// Ends once the manager is dropped.
async fn dispatch_events(manager: Weak<ManagerInner>, mut events: mpsc::Receiver<DeviceEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = manager.upgrade() else {
            break;
        };
        let manager = DeviceManager { inner };
        log::debug!("Dispatching {}", event.description());
        if let Some(listener) = manager.listener() {
            listener.on_device_event(&event, &manager).await;
        }
    }
    log::debug!("Event dispatcher stopped");
}

async fn sweep_expired(manager: Weak<ManagerInner>, mut shutdown: watch::Receiver<bool>) {
    let period = match manager.upgrade() {
        Some(inner) => inner.config.expiry_check_interval.max(Duration::from_millis(1)),
        None => return,
    };
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        let Some(inner) = manager.upgrade() else {
            break;
        };
        DeviceManager { inner }.deregister_expired().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelEventListener;
    use crate::test_support::{FakeConnection, wait_until};
    use lwm2m_codec::parse_core_links;
    use lwm2m_core::Path;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn next_event(events: &mut UnboundedReceiver<DeviceEvent>) -> (DeviceEventKind, String) {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event not delivered")
            .expect("listener dropped");
        (event.kind, event.device.id().to_string())
    }

    fn listening_manager(config: ManagerConfig) -> (DeviceManager, UnboundedReceiver<DeviceEvent>) {
        let manager = DeviceManager::with_config(config, Arc::new(Registry::with_core_objects()));
        let (listener, events) = ChannelEventListener::new();
        manager.set_event_listener(Arc::new(listener));
        (manager, events)
    }

    #[tokio::test]
    async fn test_register_assigns_alphabetic_id() {
        let (manager, mut events) = listening_manager(ManagerConfig::default());
        let device = manager
            .register(
                RegisterRequest::new("dev1"),
                parse_core_links("</3/0>"),
                FakeConnection::new("10.0.0.1:5683"),
            )
            .await;
        assert_eq!(device.id().len(), 5);
        assert!(device.id().chars().all(|c| c.is_ascii_alphabetic()));
        assert_eq!(
            next_event(&mut events).await,
            (DeviceEventKind::Register, device.id().to_string())
        );

        let found = manager.get_device_by_endpoint("dev1").await.unwrap();
        assert_eq!(found.id(), device.id());
        assert_eq!(manager.device_count().await, 1);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_reregistration_replaces_session() {
        let (manager, mut events) = listening_manager(ManagerConfig::default());
        let first = manager
            .register(
                RegisterRequest::new("dev1"),
                Vec::new(),
                FakeConnection::new("10.0.0.1:5683"),
            )
            .await;
        let second = manager
            .register(
                RegisterRequest::new("dev1").with_lifetime(300),
                Vec::new(),
                FakeConnection::new("10.0.0.1:5684"),
            )
            .await;
        assert_ne!(first.id(), second.id());

        assert!(matches!(
            manager.get_device(first.id()).await,
            Err(Lwm2mError::DeviceNotFound(_))
        ));
        assert_eq!(manager.get_device_by_endpoint("dev1").await.unwrap().id(), second.id());
        assert_eq!(manager.device_count().await, 1);

        assert_eq!(
            next_event(&mut events).await,
            (DeviceEventKind::Register, first.id().to_string())
        );
        assert_eq!(
            next_event(&mut events).await,
            (DeviceEventKind::Deregister, first.id().to_string())
        );
        assert_eq!(
            next_event(&mut events).await,
            (DeviceEventKind::Register, second.id().to_string())
        );
        wait_until(|| first.is_closed()).await;
        assert!(!second.is_closed());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_and_post_events_in_order() {
        let (manager, mut events) = listening_manager(ManagerConfig::default());
        let device = manager
            .register(
                RegisterRequest::new("dev1"),
                parse_core_links("</3/0>"),
                FakeConnection::new("10.0.0.1:5683"),
            )
            .await;
        let id = device.id().to_string();
        manager.post_register(&id).await.unwrap();

        let update = UpdateRequest {
            lifetime: Some(600),
            ..UpdateRequest::default()
        };
        manager
            .update(&id, update, Some(parse_core_links("</3/0>,</5/0>")), None)
            .await
            .unwrap();
        manager.post_update(&id).await.unwrap();
        assert_eq!(device.lifetime(), 600);
        assert!(device.has_object(5));

        let kinds = [
            DeviceEventKind::Register,
            DeviceEventKind::PostRegister,
            DeviceEventKind::Update,
            DeviceEventKind::PostUpdate,
        ];
        for kind in kinds {
            assert_eq!(next_event(&mut events).await, (kind, id.clone()));
        }
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let manager = DeviceManager::new();
        assert!(matches!(
            manager.get_device("zzzzz").await,
            Err(Lwm2mError::DeviceNotFound(_))
        ));
        assert!(matches!(
            manager.get_device_by_endpoint("dev1").await,
            Err(Lwm2mError::DeviceNotFound(_))
        ));
        assert!(matches!(
            manager.update("zzzzz", UpdateRequest::default(), None, None).await,
            Err(Lwm2mError::DeviceNotFound(_))
        ));
        assert!(matches!(
            manager.deregister("zzzzz").await,
            Err(Lwm2mError::DeviceNotFound(_))
        ));
        assert!(matches!(
            manager.post_register("zzzzz").await,
            Err(Lwm2mError::DeviceNotFound(_))
        ));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_deregister_closes_session() {
        let (manager, mut events) = listening_manager(ManagerConfig::default());
        let device = manager
            .register(
                RegisterRequest::new("dev1"),
                Vec::new(),
                FakeConnection::new("10.0.0.1:5683"),
            )
            .await;
        let removed = manager.deregister(device.id()).await.unwrap();
        assert!(removed.is_closed());
        assert!(manager.devices().await.is_empty());

        next_event(&mut events).await;
        assert_eq!(
            next_event(&mut events).await,
            (DeviceEventKind::Deregister, device.id().to_string())
        );
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_expired_sessions_are_deregistered() {
        let config = ManagerConfig {
            expiry_check_interval: Duration::from_millis(50),
            expiry_grace: Duration::ZERO,
            ..ManagerConfig::default()
        };
        let (manager, mut events) = listening_manager(config);
        let short = manager
            .register(
                RegisterRequest::new("short").with_lifetime(1),
                Vec::new(),
                FakeConnection::new("10.0.0.1:5683"),
            )
            .await;
        let long = manager
            .register(
                RegisterRequest::new("long").with_lifetime(3600),
                Vec::new(),
                FakeConnection::new("10.0.0.2:5683"),
            )
            .await;
        next_event(&mut events).await;
        next_event(&mut events).await;

        let event = tokio::time::timeout(Duration::from_secs(3), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, DeviceEventKind::Deregister);
        assert_eq!(event.device.id(), short.id());
        assert!(manager.get_device(long.id()).await.is_ok());
        assert_eq!(manager.device_count().await, 1);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_single_slot_event_queue_keeps_replacement_events() {
        let config = ManagerConfig {
            event_queue_capacity: 1,
            ..ManagerConfig::default()
        };
        let (manager, mut events) = listening_manager(config);
        let first = manager
            .register(
                RegisterRequest::new("dev1"),
                Vec::new(),
                FakeConnection::new("10.0.0.1:5683"),
            )
            .await;
        let second = manager
            .register(
                RegisterRequest::new("dev1"),
                Vec::new(),
                FakeConnection::new("10.0.0.1:5684"),
            )
            .await;

        assert_eq!(
            next_event(&mut events).await,
            (DeviceEventKind::Register, first.id().to_string())
        );
        assert_eq!(
            next_event(&mut events).await,
            (DeviceEventKind::Deregister, first.id().to_string())
        );
        assert_eq!(
            next_event(&mut events).await,
            (DeviceEventKind::Register, second.id().to_string())
        );
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_expiry_keeps_session_updated_after_check() {
        let manager = DeviceManager::new();
        let device = manager
            .register(
                RegisterRequest::new("dev1").with_lifetime(1),
                Vec::new(),
                FakeConnection::new("10.0.0.1:5683"),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(device.is_expired(Instant::now(), Duration::ZERO));

        // the sweep saw it expired, then the update arrived
        manager
            .update(device.id(), UpdateRequest::default(), None, None)
            .await
            .unwrap();
        assert!(matches!(
            manager.remove_expired(device.id(), Duration::ZERO).await,
            Ok(None)
        ));
        assert!(manager.get_device(device.id()).await.is_ok());
        assert!(!device.is_closed());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let removed = manager
            .remove_expired(device.id(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(removed.map(|d| d.id().to_string()), Some(device.id().to_string()));
        assert!(device.is_closed());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_deregister_does_not_wait_for_unresponsive_device() {
        let manager = DeviceManager::new();
        let connection = FakeConnection::new("10.0.0.1:5683");
        connection.set_hang_cancel(true);
        let device = manager
            .register(
                RegisterRequest::new("dev1").with_lifetime(60),
                parse_core_links("</3/0>"),
                connection.clone(),
            )
            .await;
        device
            .observe_now(Path::object_instance(3, 0).unwrap(), |_, _, _| {})
            .await
            .unwrap();

        let removed = tokio::time::timeout(Duration::from_millis(500), manager.deregister(device.id()))
            .await
            .expect("deregister waited on the device")
            .unwrap();
        assert!(removed.is_closed());
        wait_until(|| connection.observations()[0].state.cancel_calls() == 1).await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_sessions() {
        let manager = DeviceManager::new();
        let device = manager
            .register(
                RegisterRequest::new("dev1"),
                Vec::new(),
                FakeConnection::new("10.0.0.1:5683"),
            )
            .await;
        manager.shutdown().await;
        assert!(device.is_closed());
        assert_eq!(manager.device_count().await, 0);
    }
}
