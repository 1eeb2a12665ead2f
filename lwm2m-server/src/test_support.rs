//! In-memory transport doubles shared by the unit tests

use crate::config::ManagerConfig;
use crate::device::Device;
use crate::registration::RegisterRequest;
use async_trait::async_trait;
use bytes::Bytes;
use lwm2m_codec::parse_core_links;
use lwm2m_core::{ContentFormat, Lwm2mError, Lwm2mResult, Path};
use lwm2m_node::Registry;
use lwm2m_transport::{Connection, Message, Method, NotificationSink, Subscription};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

mockall::mock! {
    pub Conn {}

    #[async_trait]
    impl Connection for Conn {
        fn remote_addr(&self) -> String;
        async fn get(&self, path: &Path, accept: ContentFormat) -> Lwm2mResult<Message>;
        async fn put(&self, path: &Path, content_format: ContentFormat, payload: Bytes) -> Lwm2mResult<Message>;
        async fn post(&self, path: &Path, content_format: Option<ContentFormat>, payload: Bytes) -> Lwm2mResult<Message>;
        async fn delete(&self, path: &Path) -> Lwm2mResult<Message>;
        async fn observe(&self, path: &Path, accept: ContentFormat, sink: NotificationSink) -> Lwm2mResult<Box<dyn Subscription>>;
        async fn bootstrap_finish(&self) -> Lwm2mResult<Message>;
    }
}

/// Shared state of one fake subscription
#[derive(Debug, Default)]
pub(crate) struct SubscriptionState {
    cancelled: AtomicBool,
    cancel_calls: AtomicUsize,
}

impl SubscriptionState {
    pub(crate) fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Mark the subscription dropped by the device
    pub(crate) fn lapse(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

struct FakeSubscription {
    state: Arc<SubscriptionState>,
    hang_cancel: bool,
}

#[async_trait]
impl Subscription for FakeSubscription {
    fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    async fn cancel(&self) -> Lwm2mResult<()> {
        self.state.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_cancel {
            // device never answers
            std::future::pending::<()>().await;
        }
        self.state.cancelled.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct FakeObservation {
    pub(crate) path: Path,
    pub(crate) sink: NotificationSink,
    pub(crate) state: Arc<SubscriptionState>,
}

/// Connection answering from a queue of canned responses
pub(crate) struct FakeConnection {
    addr: String,
    responses: Mutex<VecDeque<Message>>,
    requests: Mutex<Vec<(Method, Path)>>,
    observations: Mutex<Vec<FakeObservation>>,
    finishes: AtomicUsize,
    fail_observe: AtomicBool,
    hang_cancel: AtomicBool,
}

impl FakeConnection {
    pub(crate) fn new(addr: &str) -> Arc<Self> {
        Arc::new(Self {
            addr: addr.to_string(),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            observations: Mutex::new(Vec::new()),
            finishes: AtomicUsize::new(0),
            fail_observe: AtomicBool::new(false),
            hang_cancel: AtomicBool::new(false),
        })
    }

    pub(crate) fn push_response(&self, message: Message) {
        self.responses.lock().unwrap().push_back(message);
    }

    pub(crate) fn requests(&self) -> Vec<(Method, Path)> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn observations(&self) -> Vec<FakeObservation> {
        self.observations.lock().unwrap().clone()
    }

    pub(crate) fn finish_count(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }

    pub(crate) fn set_fail_observe(&self, fail: bool) {
        self.fail_observe.store(fail, Ordering::SeqCst);
    }

    /// Make cancellations of later subscriptions never complete
    pub(crate) fn set_hang_cancel(&self, hang: bool) {
        self.hang_cancel.store(hang, Ordering::SeqCst);
    }

    fn respond(&self, method: Method, path: &Path) -> Lwm2mResult<Message> {
        self.requests.lock().unwrap().push((method, *path));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Lwm2mError::Transport(format!("no response queued for {}", path)))
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn remote_addr(&self) -> String {
        self.addr.clone()
    }

    async fn get(&self, path: &Path, _accept: ContentFormat) -> Lwm2mResult<Message> {
        self.respond(Method::Get, path)
    }

    async fn put(&self, path: &Path, _: ContentFormat, _: Bytes) -> Lwm2mResult<Message> {
        self.respond(Method::Put, path)
    }

    async fn post(&self, path: &Path, _: Option<ContentFormat>, _: Bytes) -> Lwm2mResult<Message> {
        self.respond(Method::Post, path)
    }

    async fn delete(&self, path: &Path) -> Lwm2mResult<Message> {
        self.respond(Method::Delete, path)
    }

    async fn observe(
        &self,
        path: &Path,
        _accept: ContentFormat,
        sink: NotificationSink,
    ) -> Lwm2mResult<Box<dyn Subscription>> {
        if self.fail_observe.load(Ordering::SeqCst) {
            return Err(Lwm2mError::Transport("observe refused".to_string()));
        }
        let state = Arc::new(SubscriptionState::default());
        self.observations.lock().unwrap().push(FakeObservation {
            path: *path,
            sink,
            state: Arc::clone(&state),
        });
        Ok(Box::new(FakeSubscription {
            state,
            hang_cancel: self.hang_cancel.load(Ordering::SeqCst),
        }))
    }

    async fn bootstrap_finish(&self) -> Lwm2mResult<Message> {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(Message::new(lwm2m_transport::ResponseCode::Changed))
    }
}

/// Start a session for endpoint `dev1` over a fake connection
pub(crate) fn test_device(
    connection: Arc<FakeConnection>,
    links: &str,
) -> (Device, watch::Sender<bool>) {
    device_with(connection, links)
}

/// Start a session for endpoint `dev1` over any connection
pub(crate) fn device_with(
    connection: Arc<dyn Connection>,
    links: &str,
) -> (Device, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let device = Device::start(
        "abcde".to_string(),
        &RegisterRequest::new("dev1"),
        &parse_core_links(links),
        connection,
        Arc::new(Registry::with_core_objects()),
        &ManagerConfig::default(),
        shutdown_rx,
    );
    (device, shutdown_tx)
}

/// Poll `condition` until it holds, failing the test after two seconds
pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
