//! Bootstrap interface (`/bs`)
//!
//! A client sends `POST /bs?ep=<name>` to ask for provisioning. After the
//! `2.04` response is acknowledged, the application's [`BootstrapProvider`]
//! configures the client through a [`BootstrapSession`]. Whatever the
//! provider's outcome, the server then sends Bootstrap-Finish.

use crate::config::BootstrapConfig;
use crate::device::{expect_code, links_from_payload};
use async_trait::async_trait;
use lwm2m_codec::CoreLink;
use lwm2m_core::{ContentFormat, Lwm2mError, Lwm2mResult, Path};
use lwm2m_node::{Node, Registry, decode_message, encode_message};
use lwm2m_transport::{Connection, Message, Method, Request, ResponseCode};
use std::fmt;
use std::sync::Arc;

/// Parameters of a Bootstrap-Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapRequest {
    pub endpoint: String,
    /// Raw `pct` option: the content format the client prefers
    pub preferred_content_format: Option<u16>,
}

impl BootstrapRequest {
    /// Parse the query options of `POST /bs`
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if `ep` is missing or `pct` is not a number
    pub fn from_request(request: &Request) -> Lwm2mResult<Self> {
        let endpoint = request
            .query("ep")
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| Lwm2mError::InvalidRequest("missing endpoint name".to_string()))?;
        let preferred_content_format = request
            .query("pct")
            .map(|value| {
                value.parse::<u16>().map_err(|_| {
                    Lwm2mError::InvalidRequest(format!("invalid content format {:?}", value))
                })
            })
            .transpose()?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            preferred_content_format,
        })
    }
}

/// Application hook that provisions a bootstrapping client
#[async_trait]
pub trait BootstrapProvider: Send + Sync {
    async fn bootstrap(&self, session: &BootstrapSession) -> anyhow::Result<()>;
}

/// Operations available to a provider during one bootstrap
pub struct BootstrapSession {
    endpoint: String,
    content_format: ContentFormat,
    connection: Arc<dyn Connection>,
    registry: Arc<Registry>,
}

impl BootstrapSession {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Content format used for writes
    pub fn content_format(&self) -> ContentFormat {
        self.content_format
    }

    /// Bootstrap-Read
    pub async fn read(&self, path: &Path) -> Lwm2mResult<Vec<Node>> {
        let response = self.connection.get(path, ContentFormat::Tlv).await?;
        expect_code(&response, ResponseCode::Content)?;
        let content_format = response.content_format()?.unwrap_or(ContentFormat::Tlv);
        decode_message(&self.registry, path, content_format, &response.payload)
    }

    /// Bootstrap-Discover
    pub async fn discover(&self, path: &Path) -> Lwm2mResult<Vec<CoreLink>> {
        let response = self.connection.get(path, ContentFormat::LinkFormat).await?;
        expect_code(&response, ResponseCode::Content)?;
        links_from_payload(&response.payload)
    }

    /// Bootstrap-Write
    pub async fn write(&self, path: &Path, nodes: &[Node]) -> Lwm2mResult<()> {
        let payload = encode_message(self.content_format, nodes)?;
        let response = self
            .connection
            .put(path, self.content_format, payload)
            .await?;
        expect_code(&response, ResponseCode::Changed)
    }

    /// Bootstrap-Delete; the root path deletes everything deletable
    pub async fn delete(&self, path: &Path) -> Lwm2mResult<()> {
        let response = self.connection.delete(path).await?;
        expect_code(&response, ResponseCode::Deleted)
    }
}

/// A bootstrap waiting for its response to be acknowledged
pub struct PendingBootstrap {
    request: BootstrapRequest,
    connection: Arc<dyn Connection>,
}

impl PendingBootstrap {
    pub fn request(&self) -> &BootstrapRequest {
        &self.request
    }
}

impl fmt::Debug for PendingBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingBootstrap")
            .field("request", &self.request)
            .field("remote_addr", &self.connection.remote_addr())
            .finish()
    }
}

/// Response to send, plus the bootstrap to run after it is acknowledged
#[derive(Debug)]
pub struct BootstrapOutcome {
    pub response: Message,
    pub pending: Option<PendingBootstrap>,
}

/// Handler of the bootstrap interface
pub struct BootstrapHandler {
    provider: Arc<dyn BootstrapProvider>,
    registry: Arc<Registry>,
    config: BootstrapConfig,
}

impl BootstrapHandler {
    pub fn new(provider: Arc<dyn BootstrapProvider>, registry: Arc<Registry>) -> Self {
        Self::with_config(BootstrapConfig::default(), provider, registry)
    }

    pub fn with_config(
        config: BootstrapConfig,
        provider: Arc<dyn BootstrapProvider>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            provider,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Handle one `/bs` request
    pub fn handle(&self, request: &Request, connection: Arc<dyn Connection>) -> BootstrapOutcome {
        let reply = |code| BootstrapOutcome {
            response: Message::new(code),
            pending: None,
        };
        if request.uri_path.len() != 1 || request.uri_path[0] != "bs" {
            return reply(ResponseCode::NotFound);
        }
        if request.method != Method::Post {
            return reply(ResponseCode::MethodNotAllowed);
        }

        match BootstrapRequest::from_request(request) {
            Ok(bootstrap) => {
                log::info!(
                    "Bootstrap requested by {} from {}",
                    bootstrap.endpoint,
                    connection.remote_addr()
                );
                BootstrapOutcome {
                    response: Message::new(ResponseCode::Changed),
                    pending: Some(PendingBootstrap {
                        request: bootstrap,
                        connection,
                    }),
                }
            }
            Err(e) => {
                log::info!("Rejected bootstrap request: {}", e);
                reply(ResponseCode::BadRequest)
            }
        }
    }

    /// Run the provider, then send Bootstrap-Finish
    ///
    /// The provider is bounded by the configured timeout. Its failure is
    /// logged; the returned result is that of Bootstrap-Finish.
    pub async fn acknowledged(&self, pending: PendingBootstrap) -> Lwm2mResult<()> {
        let PendingBootstrap {
            request,
            connection,
        } = pending;
        let session = BootstrapSession {
            content_format: self.session_format(request.preferred_content_format),
            endpoint: request.endpoint,
            connection,
            registry: Arc::clone(&self.registry),
        };

        match tokio::time::timeout(self.config.timeout, self.provider.bootstrap(&session)).await {
            Ok(Ok(())) => log::info!("Bootstrap of {} provisioned", session.endpoint),
            Ok(Err(e)) => log::warn!("Bootstrap of {} failed: {:#}", session.endpoint, e),
            Err(_) => log::warn!(
                "Bootstrap of {} timed out after {:?}",
                session.endpoint,
                self.config.timeout
            ),
        }

        let response = session.connection.bootstrap_finish().await?;
        expect_code(&response, ResponseCode::Changed)
    }

    fn session_format(&self, preferred: Option<u16>) -> ContentFormat {
        match preferred.map(ContentFormat::from_code) {
            Some(Ok(
                format @ (ContentFormat::Tlv | ContentFormat::TextPlain | ContentFormat::OctetStream),
            )) => format,
            Some(_) => {
                log::debug!(
                    "Preferred content format {:?} not usable, falling back to {}",
                    preferred,
                    self.config.content_format
                );
                self.config.content_format
            }
            None => self.config.content_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeConnection, MockConn};
    use lwm2m_node::{ObjectInstance, Resource, Value};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    struct SecurityProvider;

    #[async_trait]
    impl BootstrapProvider for SecurityProvider {
        async fn bootstrap(&self, session: &BootstrapSession) -> anyhow::Result<()> {
            session.delete(&Path::root()).await?;
            let mut security = ObjectInstance::new(0, 1).unwrap();
            security.insert_resource(Resource::single(
                Path::resource(0, 1, 0).unwrap(),
                Value::from("coap://10.0.0.10:5683"),
            )?)?;
            session
                .write(&Path::object_instance(0, 1).unwrap(), &[Node::from(security)])
                .await?;
            Ok(())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl BootstrapProvider for FailingProvider {
        async fn bootstrap(&self, session: &BootstrapSession) -> anyhow::Result<()> {
            anyhow::bail!("no credentials for {}", session.endpoint())
        }
    }

    struct StuckProvider;

    #[async_trait]
    impl BootstrapProvider for StuckProvider {
        async fn bootstrap(&self, _session: &BootstrapSession) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn handler(provider: Arc<dyn BootstrapProvider>) -> BootstrapHandler {
        let config = BootstrapConfig {
            timeout: Duration::from_millis(50),
            ..BootstrapConfig::default()
        };
        BootstrapHandler::with_config(config, provider, Arc::new(Registry::with_core_objects()))
    }

    fn bootstrap_request(queries: &[&str]) -> Request {
        queries
            .iter()
            .fold(Request::new(Method::Post, ["bs"]), |request, query| {
                request.with_query(*query)
            })
    }

    #[tokio::test]
    async fn test_bootstrap_provisions_then_finishes() {
        let connection = FakeConnection::new("10.0.0.1:5683");
        connection.push_response(Message::new(ResponseCode::Deleted));
        connection.push_response(Message::new(ResponseCode::Changed));
        let handler = handler(Arc::new(SecurityProvider));

        let outcome = handler.handle(&bootstrap_request(&["ep=dev1"]), connection.clone());
        assert_eq!(outcome.response.code, ResponseCode::Changed);
        let pending = outcome.pending.unwrap();
        assert_eq!(pending.request().endpoint, "dev1");

        assert_ok!(handler.acknowledged(pending).await);
        assert_eq!(
            connection.requests(),
            vec![
                (Method::Delete, Path::root()),
                (Method::Put, Path::object_instance(0, 1).unwrap()),
            ]
        );
        assert_eq!(connection.finish_count(), 1);
    }

    #[tokio::test]
    async fn test_finish_sent_after_provider_failure() {
        let connection = FakeConnection::new("10.0.0.1:5683");
        let handler = handler(Arc::new(FailingProvider));
        let outcome = handler.handle(&bootstrap_request(&["ep=dev1"]), connection.clone());
        assert_ok!(handler.acknowledged(outcome.pending.unwrap()).await);
        assert_eq!(connection.finish_count(), 1);
    }

    #[tokio::test]
    async fn test_finish_sent_after_provider_timeout() {
        let mut mock = MockConn::new();
        mock.expect_remote_addr()
            .returning(|| "10.0.0.1:5683".to_string());
        mock.expect_bootstrap_finish()
            .times(1)
            .returning(|| Ok(Message::new(ResponseCode::Changed)));
        let handler = handler(Arc::new(StuckProvider));

        let outcome = handler.handle(&bootstrap_request(&["ep=dev1"]), Arc::new(mock));
        assert_ok!(handler.acknowledged(outcome.pending.unwrap()).await);
    }

    #[tokio::test]
    async fn test_finish_rejection_is_reported() {
        let mut mock = MockConn::new();
        mock.expect_remote_addr()
            .returning(|| "10.0.0.1:5683".to_string());
        mock.expect_bootstrap_finish()
            .returning(|| Ok(Message::new(ResponseCode::NotAcceptable)));
        let handler = handler(Arc::new(FailingProvider));

        let outcome = handler.handle(&bootstrap_request(&["ep=dev1"]), Arc::new(mock));
        let err = assert_err!(handler.acknowledged(outcome.pending.unwrap()).await);
        assert!(matches!(err, Lwm2mError::UnexpectedResponseCode { .. }));
    }

    #[tokio::test]
    async fn test_request_rejections() {
        let connection = FakeConnection::new("10.0.0.1:5683");
        let handler = handler(Arc::new(FailingProvider));
        let cases = [
            (bootstrap_request(&[]), ResponseCode::BadRequest),
            (bootstrap_request(&["ep=dev1", "pct=tlv"]), ResponseCode::BadRequest),
            (Request::new(Method::Get, ["bs"]), ResponseCode::MethodNotAllowed),
            (Request::new(Method::Post, ["rd"]), ResponseCode::NotFound),
        ];
        for (request, expected) in cases {
            let outcome = handler.handle(&request, connection.clone());
            assert_eq!(outcome.response.code, expected, "{:?}", request);
            assert!(outcome.pending.is_none());
        }
        assert_eq!(connection.finish_count(), 0);
    }

    #[test]
    fn test_preferred_content_format() {
        let handler = handler(Arc::new(FailingProvider));
        assert_eq!(handler.session_format(None), ContentFormat::Tlv);
        assert_eq!(handler.session_format(Some(0)), ContentFormat::TextPlain);
        assert_eq!(handler.session_format(Some(110)), ContentFormat::Tlv);
        assert_eq!(handler.session_format(Some(12345)), ContentFormat::Tlv);
    }
}
