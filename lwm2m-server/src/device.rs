//! Device sessions
//!
//! A [`Device`] is the server-side state of one registered client: its
//! registration fields, the object skeleton announced in its links, its
//! transport connection, and its observations (see `observe.rs`). The
//! handle is cheap to clone; every clone refers to the same session.

use crate::config::ManagerConfig;
use crate::observe::{Observation, SessionControl};
use crate::registration::{Binding, RegisterRequest, UpdateRequest};
use bytes::Bytes;
use lwm2m_codec::{CoreLink, parse_core_links};
use lwm2m_core::{ContentFormat, Lwm2mError, Lwm2mResult, Path};
use lwm2m_node::{
    Node, Object, ObjectInstance, Registry, Resource, decode_message, encode_message,
    get_object_by_path, get_resource_by_path,
};
use lwm2m_transport::{Connection, Message, Notification, ResponseCode, Subscription};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Handle to a registered device session
#[derive(Clone)]
pub struct Device {
    pub(crate) inner: Arc<DeviceInner>,
}

pub(crate) struct DeviceInner {
    id: String,
    endpoint: String,
    version: String,
    pub(crate) registry: Arc<Registry>,
    state: RwLock<SessionState>,
    pub(crate) observations: Mutex<HashMap<Path, Observation>>,
    pub(crate) shadow: RwLock<HashMap<Path, Resource>>,
    pub(crate) generation: AtomicU64,
    pub(crate) control: mpsc::Sender<SessionControl>,
    pub(crate) notifications: mpsc::Sender<Notification>,
    closed: AtomicBool,
    close_signal: watch::Sender<bool>,
}

struct SessionState {
    lifetime: u32,
    binding: Binding,
    sms_number: Option<String>,
    connection: Arc<dyn Connection>,
    objects: BTreeMap<u16, Object>,
    last_activity: Instant,
}

impl Device {
    /// Create a session and spawn its worker
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn start(
        id: String,
        request: &RegisterRequest,
        links: &[CoreLink],
        connection: Arc<dyn Connection>,
        registry: Arc<Registry>,
        config: &ManagerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let capacity = config.session_queue_capacity.max(1);
        let (control_tx, control_rx) = mpsc::channel(capacity);
        let (notification_tx, notification_rx) = mpsc::channel(capacity);
        let (close_tx, close_rx) = watch::channel(false);

        let device = Device {
            inner: Arc::new(DeviceInner {
                id,
                endpoint: request.endpoint.clone(),
                version: request.version.clone(),
                registry,
                state: RwLock::new(SessionState {
                    lifetime: request.lifetime,
                    binding: request.binding,
                    sms_number: request.sms_number.clone(),
                    connection,
                    objects: objects_from_links(links),
                    last_activity: Instant::now(),
                }),
                observations: Mutex::new(HashMap::new()),
                shadow: RwLock::new(HashMap::new()),
                generation: AtomicU64::new(0),
                control: control_tx,
                notifications: notification_tx,
                closed: AtomicBool::new(false),
                close_signal: close_tx,
            }),
        };

        let worker = device.clone();
        let initial_delay = config.initial_observe_delay;
        tokio::spawn(async move {
            worker
                .run(initial_delay, notification_rx, control_rx, close_rx, shutdown)
                .await;
        });
        device
    }

    /// Session id, also the registration location `rd/<id>`
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Endpoint client name
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// LWM2M protocol version announced at registration
    pub fn version(&self) -> &str {
        &self.inner.version
    }

    /// Registration lifetime in seconds
    pub fn lifetime(&self) -> u32 {
        self.state().lifetime
    }

    pub fn binding(&self) -> Binding {
        self.state().binding
    }

    /// Whether the device uses queue mode
    pub fn queue_mode(&self) -> bool {
        self.state().binding.queue
    }

    pub fn sms_number(&self) -> Option<String> {
        self.state().sms_number.clone()
    }

    /// Object skeletons announced by the device, without resource values
    pub fn objects(&self) -> Vec<Object> {
        self.state().objects.values().cloned().collect()
    }

    pub fn has_object(&self, object_id: u16) -> bool {
        self.state().objects.contains_key(&object_id)
    }

    pub fn has_object_instance(&self, object_id: u16, instance_id: u16) -> bool {
        self.state()
            .objects
            .get(&object_id)
            .is_some_and(|object| object.has_instance(instance_id))
    }

    /// The connection used for server-initiated requests
    pub fn connection(&self) -> Arc<dyn Connection> {
        Arc::clone(&self.state().connection)
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Read any path, returning the decoded nodes
    pub async fn read(&self, path: &Path) -> Lwm2mResult<Vec<Node>> {
        let response = self.connection().get(path, ContentFormat::Tlv).await?;
        expect_code(&response, ResponseCode::Content)?;
        self.decode_response(path, &response)
    }

    /// Read an object with all its instances
    pub async fn read_object(&self, path: &Path) -> Lwm2mResult<Object> {
        require(path.is_object(), path, "an object")?;
        let nodes = self.read(path).await?;
        get_object_by_path(&nodes, path)
    }

    /// Read a single resource
    pub async fn read_resource(&self, path: &Path) -> Lwm2mResult<Resource> {
        require(path.is_resource(), path, "a resource")?;
        let nodes = self.read(path).await?;
        get_resource_by_path(&nodes, path).cloned()
    }

    /// Write nodes to a path as TLV
    pub async fn write(&self, path: &Path, nodes: &[Node]) -> Lwm2mResult<()> {
        let payload = encode_message(ContentFormat::Tlv, nodes)?;
        let response = self
            .connection()
            .put(path, ContentFormat::Tlv, payload)
            .await?;
        expect_code(&response, ResponseCode::Changed)
    }

    /// Write one resource to its own path
    pub async fn write_resource(&self, resource: &Resource) -> Lwm2mResult<()> {
        self.write(&resource.path(), &[Node::Resource(resource.clone())])
            .await
    }

    /// Discover the links below a path
    pub async fn discover(&self, path: &Path) -> Lwm2mResult<Vec<CoreLink>> {
        let response = self
            .connection()
            .get(path, ContentFormat::LinkFormat)
            .await?;
        expect_code(&response, ResponseCode::Content)?;
        links_from_payload(&response.payload)
    }

    /// Execute a resource, optionally passing plain-text arguments
    pub async fn execute(&self, path: &Path, arguments: Option<&str>) -> Lwm2mResult<()> {
        require(path.is_resource(), path, "a resource")?;
        let (content_format, payload) = match arguments {
            Some(arguments) => (
                Some(ContentFormat::TextPlain),
                Bytes::copy_from_slice(arguments.as_bytes()),
            ),
            None => (None, Bytes::new()),
        };
        let response = self
            .connection()
            .post(path, content_format, payload)
            .await?;
        expect_code(&response, ResponseCode::Changed)
    }

    /// Create an object instance
    ///
    /// Returns the path of the new instance when the device reports it.
    pub async fn create(&self, path: &Path, nodes: &[Node]) -> Lwm2mResult<Option<Path>> {
        require(path.is_object(), path, "an object")?;
        let payload = encode_message(ContentFormat::Tlv, nodes)?;
        let response = self
            .connection()
            .post(path, Some(ContentFormat::Tlv), payload)
            .await?;
        expect_code(&response, ResponseCode::Created)?;

        if response.location_path.is_empty() {
            return Ok(None);
        }
        let created: Path = response.location_path.join("/").parse()?;
        if let Ok(instance_id) = created.object_instance_id() {
            let object_id = created.object_id()?;
            let mut state = self.state_mut();
            let object = state
                .objects
                .entry(object_id)
                .or_insert_with(|| Object::new(object_id));
            if !object.has_instance(instance_id) {
                object.insert_instance(ObjectInstance::new(object_id, instance_id)?)?;
            }
        }
        Ok(Some(created))
    }

    /// Delete an object instance
    pub async fn delete(&self, path: &Path) -> Lwm2mResult<()> {
        require(path.is_object_instance(), path, "an object instance")?;
        let response = self.connection().delete(path).await?;
        expect_code(&response, ResponseCode::Deleted)?;

        let (object_id, instance_id) = (path.object_id()?, path.object_instance_id()?);
        if let Some(object) = self.state_mut().objects.get_mut(&object_id) {
            object.remove_instance(instance_id);
        }
        Ok(())
    }

    /// Stop the worker and cancel every observation in the background
    ///
    /// Returns without waiting for the device to answer the cancellations.
    /// Subsequent calls do nothing.
    pub fn close(&self) {
        for (path, subscription) in self.begin_close() {
            self.spawn_cancel(path, subscription);
        }
    }

    /// Close and wait until every cancellation finished or timed out
    ///
    /// Cancellations run concurrently, so this takes at most one lifetime.
    pub(crate) async fn close_and_wait(&self) {
        let timeout = self.lifetime_duration();
        let mut cancels = JoinSet::new();
        for (path, subscription) in self.begin_close() {
            let endpoint = self.endpoint().to_string();
            cancels.spawn(async move {
                if let Err(e) = crate::observe::cancel_subscription(subscription.as_ref(), timeout).await {
                    log::warn!("Failed to cancel observation {} of {}: {}", path, endpoint, e);
                }
            });
        }
        while cancels.join_next().await.is_some() {}
    }

    /// Mark the session closed, signal the worker and hand back the live
    /// subscriptions; empty if already closed
    fn begin_close(&self) -> Vec<(Path, Box<dyn Subscription>)> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }
        let drained: Vec<(Path, Observation)> = { self.observations().drain().collect() };
        self.inner.close_signal.send_replace(true);
        log::debug!("Session {} ({}) closed", self.id(), self.endpoint());
        drained
            .into_iter()
            .filter_map(|(path, observation)| Some((path, observation.subscription?)))
            .collect()
    }

    /// Merge the fields present in an update
    pub(crate) fn apply_update(
        &self,
        request: &UpdateRequest,
        links: Option<&[CoreLink]>,
        connection: Option<Arc<dyn Connection>>,
    ) {
        let mut state = self.state_mut();
        if let Some(lifetime) = request.lifetime {
            state.lifetime = lifetime;
        }
        if let Some(binding) = request.binding {
            state.binding = binding;
        }
        if let Some(sms_number) = &request.sms_number {
            state.sms_number = Some(sms_number.clone());
        }
        if let Some(links) = links {
            state.objects = objects_from_links(links);
        }
        if let Some(connection) = connection {
            log::debug!(
                "Session {} moved to {}",
                self.inner.id,
                connection.remote_addr()
            );
            state.connection = connection;
        }
        state.last_activity = Instant::now();
    }

    /// Whether the lifetime plus `grace` has passed since the last
    /// registration or update
    pub(crate) fn is_expired(&self, now: Instant, grace: Duration) -> bool {
        let state = self.state();
        let lifetime = Duration::from_secs(u64::from(state.lifetime));
        now.saturating_duration_since(state.last_activity) > lifetime + grace
    }

    /// Lifetime as a duration, never zero
    pub(crate) fn lifetime_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.lifetime().max(1)))
    }

    pub(crate) fn decode_response(&self, path: &Path, response: &Message) -> Lwm2mResult<Vec<Node>> {
        let content_format = response.content_format()?.unwrap_or(ContentFormat::Tlv);
        decode_message(&self.inner.registry, path, content_format, &response.payload)
    }

    pub(crate) fn observations(&self) -> MutexGuard<'_, HashMap<Path, Observation>> {
        self.inner
            .observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.inner.id)
            .field("endpoint", &self.inner.endpoint)
            .field("version", &self.inner.version)
            .finish_non_exhaustive()
    }
}

/// Fail with `UnexpectedResponseCode` unless the response has `expected`
pub(crate) fn expect_code(response: &Message, expected: ResponseCode) -> Lwm2mResult<()> {
    if response.code == expected {
        return Ok(());
    }
    Err(Lwm2mError::UnexpectedResponseCode {
        expected: expected.to_string(),
        actual: response.code.to_string(),
    })
}

pub(crate) fn links_from_payload(payload: &[u8]) -> Lwm2mResult<Vec<CoreLink>> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| Lwm2mError::InvalidFormat(format!("link format is not UTF-8: {}", e)))?;
    Ok(parse_core_links(text))
}

fn require(ok: bool, path: &Path, level: &str) -> Lwm2mResult<()> {
    if ok {
        return Ok(());
    }
    Err(Lwm2mError::PathInvalidValue(format!(
        "{} is not {} path",
        path, level
    )))
}

/// Build object skeletons from registration or discovery links
///
/// A link typed `oma.lwm2m` sets the alternate root path, which is
/// stripped from the links that follow it.
pub(crate) fn objects_from_links(links: &[CoreLink]) -> BTreeMap<u16, Object> {
    let mut objects = BTreeMap::new();
    let mut root = String::new();

    for link in links {
        if link.is_lwm2m_root() {
            root = link.uri().trim_end_matches('/').to_string();
            continue;
        }
        let uri = match link.uri().strip_prefix(root.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => link.uri(),
        };
        let path: Path = match uri.parse() {
            Ok(path) => path,
            Err(_) => {
                log::debug!("Ignoring link {}", link);
                continue;
            }
        };

        let Ok(object_id) = path.object_id() else {
            continue;
        };
        if path.is_object() {
            objects.entry(object_id).or_insert_with(|| Object::new(object_id));
        } else if path.is_object_instance() {
            let object = objects
                .entry(object_id)
                .or_insert_with(|| Object::new(object_id));
            if let Ok(instance_id) = path.object_instance_id() {
                if object.has_instance(instance_id) {
                    continue;
                }
                let inserted = ObjectInstance::new(object_id, instance_id)
                    .and_then(|instance| object.insert_instance(instance));
                if let Err(e) = inserted {
                    log::debug!("Ignoring link {}: {}", link, e);
                }
            }
        }
    }
    objects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeConnection, MockConn, test_device};
    use lwm2m_node::Value;
    use tokio_test::{assert_err, assert_ok};

    fn links(text: &str) -> Vec<CoreLink> {
        parse_core_links(text)
    }

    #[test]
    fn test_objects_from_links() {
        let objects = objects_from_links(&links("</1/0>,</3/0>,</3303/0>,</3303/1>,</5>"));
        let ids: Vec<u16> = objects.keys().copied().collect();
        assert_eq!(ids, vec![1, 3, 5, 3303]);
        assert_eq!(objects[&3303].instance_count(), 2);
        assert_eq!(objects[&5].instance_count(), 0);

        // reserved and duplicate instances are skipped, the rest is kept
        let objects = objects_from_links(&links("</3/65535>,</3/1>,</3/1>"));
        assert_eq!(objects[&3].instance_ids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_objects_from_links_alternate_root() {
        let objects = objects_from_links(&links(
            "</lwm2m>;rt=\"oma.lwm2m\",</lwm2m/1/0>,</lwm2m/3/0>,</other/7>,</lwm2m/1/0/1>",
        ));
        let ids: Vec<u16> = objects.keys().copied().collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(objects[&1].has_instance(0));
    }

    #[tokio::test]
    async fn test_accessors_and_update() {
        let connection = FakeConnection::new("10.0.0.1:5683");
        let (device, _shutdown) = test_device(connection, "</3/0>,</3303/0>");
        assert_eq!(device.endpoint(), "dev1");
        assert_eq!(device.version(), "1.0");
        assert_eq!(device.lifetime(), 30);
        assert!(!device.queue_mode());
        assert!(device.has_object_instance(3303, 0));
        assert!(!device.has_object(4));

        let update = UpdateRequest {
            lifetime: Some(120),
            binding: None,
            sms_number: Some("+123".to_string()),
        };
        let moved = FakeConnection::new("10.0.0.2:5683");
        device.apply_update(&update, Some(&links("</4/0>")), Some(moved as Arc<dyn Connection>));
        assert_eq!(device.lifetime(), 120);
        assert_eq!(device.binding(), Binding::default());
        assert_eq!(device.sms_number().as_deref(), Some("+123"));
        assert!(device.has_object(4));
        assert!(!device.has_object(3));
        assert_eq!(device.connection().remote_addr(), "10.0.0.2:5683");
    }

    #[tokio::test]
    async fn test_read_decodes_tlv() {
        let connection = FakeConnection::new("10.0.0.1:5683");
        connection.push_response(Message::new(ResponseCode::Content).with_payload(
            ContentFormat::Tlv,
            Bytes::from(hex::decode("E4164441BC0000").unwrap()),
        ));
        let (device, _shutdown) = test_device(connection.clone(), "</3303/0>");

        let path = Path::resource(3303, 0, 5700).unwrap();
        let resource = assert_ok!(device.read_resource(&path).await);
        assert_eq!(resource.value().unwrap(), Value::Float(23.5));
        assert_eq!(
            connection.requests(),
            vec![(lwm2m_transport::Method::Get, path)]
        );
    }

    #[tokio::test]
    async fn test_read_plain_text_response() {
        let connection = FakeConnection::new("10.0.0.1:5683");
        connection.push_response(
            Message::new(ResponseCode::Content)
                .with_payload(ContentFormat::TextPlain, Bytes::from_static(b"87")),
        );
        let (device, _shutdown) = test_device(connection, "</3/0>");
        let resource = assert_ok!(device.read_resource(&Path::resource(3, 0, 9).unwrap()).await);
        assert_eq!(resource.value().unwrap(), Value::Integer(87));
    }

    #[tokio::test]
    async fn test_unexpected_response_code() {
        let mut mock = MockConn::new();
        mock.expect_post()
            .returning(|_, _, _| Ok(Message::new(ResponseCode::Content)));
        mock.expect_get()
            .returning(|_, _| Ok(Message::new(ResponseCode::NotFound)));
        let (device, _shutdown) = crate::test_support::device_with(Arc::new(mock), "</3/0>");

        let err = assert_err!(device.execute(&Path::resource(3, 0, 4).unwrap(), None).await);
        match err {
            Lwm2mError::UnexpectedResponseCode { expected, actual } => {
                assert_eq!(expected, "2.04 Changed");
                assert_eq!(actual, "2.05 Content");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(
            device.read(&Path::object(3)).await,
            Err(Lwm2mError::UnexpectedResponseCode { .. })
        ));
    }

    #[tokio::test]
    async fn test_execute_sends_text_arguments() {
        let mut mock = MockConn::new();
        mock.expect_post()
            .withf(|path, content_format, payload| {
                path.to_string() == "/3/0/4"
                    && *content_format == Some(ContentFormat::TextPlain)
                    && &payload[..] == b"0='now'"
            })
            .times(1)
            .returning(|_, _, _| Ok(Message::new(ResponseCode::Changed)));
        let (device, _shutdown) = crate::test_support::device_with(Arc::new(mock), "</3/0>");
        assert_ok!(device.execute(&Path::resource(3, 0, 4).unwrap(), Some("0='now'")).await);
    }

    #[tokio::test]
    async fn test_path_level_checks() {
        // no expectations: any transport call would fail the test
        let mock = MockConn::new();
        let (device, _shutdown) = crate::test_support::device_with(Arc::new(mock), "</3/0>");

        assert!(matches!(
            device.delete(&Path::object(3)).await,
            Err(Lwm2mError::PathInvalidValue(_))
        ));
        assert!(matches!(
            device.execute(&Path::object_instance(3, 0).unwrap(), None).await,
            Err(Lwm2mError::PathInvalidValue(_))
        ));
        assert!(matches!(
            device.create(&Path::object_instance(3303, 0).unwrap(), &[]).await,
            Err(Lwm2mError::PathInvalidValue(_))
        ));
        assert!(matches!(
            device.read_resource(&Path::object(3)).await,
            Err(Lwm2mError::PathInvalidValue(_))
        ));
    }

    #[tokio::test]
    async fn test_create_and_delete_track_skeleton() {
        let connection = FakeConnection::new("10.0.0.1:5683");
        connection.push_response(Message::new(ResponseCode::Created).with_location(["3303", "1"]));
        connection.push_response(Message::new(ResponseCode::Deleted));
        let (device, _shutdown) = test_device(connection, "</3303/0>");

        let mut instance = ObjectInstance::new(3303, 1).unwrap();
        instance
            .insert_resource(
                Resource::single(Path::resource(3303, 1, 5750).unwrap(), Value::from("Indoor")).unwrap(),
            )
            .unwrap();
        let created = assert_ok!(
            device
                .create(&Path::object(3303), &[Node::from(instance)])
                .await
        );
        assert_eq!(created, Some(Path::object_instance(3303, 1).unwrap()));
        assert!(device.has_object_instance(3303, 1));

        assert_ok!(device.delete(&Path::object_instance(3303, 1).unwrap()).await);
        assert!(!device.has_object_instance(3303, 1));
        assert!(device.has_object_instance(3303, 0));
    }

    #[tokio::test]
    async fn test_discover_parses_links() {
        let connection = FakeConnection::new("10.0.0.1:5683");
        connection.push_response(Message::new(ResponseCode::Content).with_payload(
            ContentFormat::LinkFormat,
            Bytes::from_static(b"</3/0>;pmin=10,</3/0/1>,</3/0/2>"),
        ));
        let (device, _shutdown) = test_device(connection, "</3/0>");
        let links = assert_ok!(device.discover(&Path::object_instance(3, 0).unwrap()).await);
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].param("pmin"), Some("10"));
    }

    #[tokio::test]
    async fn test_expiry_window() {
        let connection = FakeConnection::new("10.0.0.1:5683");
        let (device, _shutdown) = test_device(connection, "</3/0>");
        let now = Instant::now();
        assert!(!device.is_expired(now, Duration::ZERO));
        assert!(!device.is_expired(now + Duration::from_secs(40), Duration::from_secs(15)));
        assert!(device.is_expired(now + Duration::from_secs(46), Duration::from_secs(15)));
    }
}
