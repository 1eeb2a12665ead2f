//! Registration interface (`/rd`)
//!
//! Transport-independent handling of Register, Update and De-register
//! requests. The transport passes each inbound request together with the
//! connection it arrived on, sends the returned response, and reports the
//! acknowledgement back through [`RegistrationHandler::acknowledged`].

use crate::device::{Device, links_from_payload};
use crate::manager::DeviceManager;
use lwm2m_core::{Lwm2mError, Lwm2mResult};
use lwm2m_transport::{Connection, Message, Method, Request, ResponseCode};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Lifetime in seconds when neither the request nor configuration gives one
pub const DEFAULT_LIFETIME: u32 = 30;

const SUPPORTED_VERSIONS: [&str; 2] = ["1.0", "1.1"];

/// Transport a device is reachable over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingMode {
    #[default]
    Udp,
    Tcp,
    Sms,
    NonIp,
}

impl BindingMode {
    fn letter(self) -> char {
        match self {
            Self::Udp => 'U',
            Self::Tcp => 'T',
            Self::Sms => 'S',
            Self::NonIp => 'N',
        }
    }
}

/// Binding mode with the queue-mode flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Binding {
    pub mode: BindingMode,
    pub queue: bool,
}

impl FromStr for Binding {
    type Err = Lwm2mError;

    /// Parse `U`, `UQ`, `T`, `S`, `N`, also accepting 1.0 combinations
    /// such as `US` or `UQS` where the first letter is the primary mode
    fn from_str(s: &str) -> Lwm2mResult<Self> {
        let mut letters = s.chars();
        let mode = match letters.next() {
            Some('U') => BindingMode::Udp,
            Some('T') => BindingMode::Tcp,
            Some('S') => BindingMode::Sms,
            Some('N') => BindingMode::NonIp,
            _ => return Err(Lwm2mError::InvalidRequest(format!("invalid binding {:?}", s))),
        };
        let mut queue = false;
        for letter in letters {
            match letter {
                'Q' => queue = true,
                'U' | 'T' | 'S' | 'N' => {}
                _ => {
                    return Err(Lwm2mError::InvalidRequest(format!("invalid binding {:?}", s)));
                }
            }
        }
        Ok(Self { mode, queue })
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mode.letter())?;
        if self.queue {
            write!(f, "Q")?;
        }
        Ok(())
    }
}

/// Parameters of a Register request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub endpoint: String,
    pub version: String,
    pub lifetime: u32,
    pub binding: Binding,
    pub sms_number: Option<String>,
}

impl RegisterRequest {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            version: SUPPORTED_VERSIONS[0].to_string(),
            lifetime: DEFAULT_LIFETIME,
            binding: Binding::default(),
            sms_number: None,
        }
    }

    pub fn with_lifetime(mut self, lifetime: u32) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = binding;
        self
    }

    /// Parse the query options of `POST /rd`
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if `ep` is missing or any option is malformed
    pub fn from_request(request: &Request, default_lifetime: u32) -> Lwm2mResult<Self> {
        let endpoint = request
            .query("ep")
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| Lwm2mError::InvalidRequest("missing endpoint name".to_string()))?;

        let version = match request.query("lwm2m") {
            None => SUPPORTED_VERSIONS[0],
            Some(version) if SUPPORTED_VERSIONS.contains(&version) => version,
            Some(version) => {
                return Err(Lwm2mError::InvalidRequest(format!(
                    "unsupported LWM2M version {:?}",
                    version
                )));
            }
        };

        Ok(Self {
            endpoint: endpoint.to_string(),
            version: version.to_string(),
            lifetime: parse_lifetime(request)?.unwrap_or(default_lifetime),
            binding: parse_binding(request)?.unwrap_or_default(),
            sms_number: request.query("sms").map(str::to_string),
        })
    }
}

/// Parameters of an Update request; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub lifetime: Option<u32>,
    pub binding: Option<Binding>,
    pub sms_number: Option<String>,
}

impl UpdateRequest {
    /// Parse the query options of `POST /rd/<id>`
    pub fn from_request(request: &Request) -> Lwm2mResult<Self> {
        Ok(Self {
            lifetime: parse_lifetime(request)?,
            binding: parse_binding(request)?,
            sms_number: request.query("sms").map(str::to_string),
        })
    }
}

fn parse_lifetime(request: &Request) -> Lwm2mResult<Option<u32>> {
    request
        .query("lt")
        .map(|value| match value.parse::<u32>() {
            Ok(lifetime) if lifetime > 0 => Ok(lifetime),
            _ => Err(Lwm2mError::InvalidRequest(format!("invalid lifetime {:?}", value))),
        })
        .transpose()
}

fn parse_binding(request: &Request) -> Lwm2mResult<Option<Binding>> {
    request.query("b").map(str::parse).transpose()
}

/// Work to do once the transport has delivered a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfterAck {
    Registered(String),
    Updated(String),
}

/// Response to send, plus the follow-up to run after it is acknowledged
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub response: Message,
    pub after_ack: Option<AfterAck>,
}

impl RequestOutcome {
    fn reply(code: ResponseCode) -> Self {
        Self {
            response: Message::new(code),
            after_ack: None,
        }
    }
}

/// Handler of the registration interface
#[derive(Clone)]
pub struct RegistrationHandler {
    manager: DeviceManager,
}

impl RegistrationHandler {
    pub fn new(manager: DeviceManager) -> Self {
        Self { manager }
    }

    /// Handle one `/rd` request
    ///
    /// # Arguments
    /// * `request` - The inbound request
    /// * `connection` - Connection the request arrived on
    pub async fn handle(&self, request: &Request, connection: Arc<dyn Connection>) -> RequestOutcome {
        let segments: Vec<&str> = request.uri_path.iter().map(String::as_str).collect();
        match (request.method, segments.as_slice()) {
            (Method::Post, ["rd"]) => self.register(request, connection).await,
            (Method::Post, ["rd", id]) => self.update(id, request, connection).await,
            (Method::Delete, ["rd", id]) => self.deregister(id).await,
            (_, ["rd"]) | (_, ["rd", _]) => RequestOutcome::reply(ResponseCode::MethodNotAllowed),
            _ => RequestOutcome::reply(ResponseCode::NotFound),
        }
    }

    /// Run the follow-up of an acknowledged response
    pub async fn acknowledged(&self, after_ack: AfterAck) {
        let result = match &after_ack {
            AfterAck::Registered(id) => self.manager.post_register(id).await,
            AfterAck::Updated(id) => self.manager.post_update(id).await,
        };
        if let Err(e) = result {
            log::warn!("Acknowledgement {:?} not delivered: {}", after_ack, e);
        }
    }

    async fn register(&self, request: &Request, connection: Arc<dyn Connection>) -> RequestOutcome {
        let register = match RegisterRequest::from_request(request, self.manager.config().default_lifetime) {
            Ok(register) => register,
            Err(e) => {
                log::info!("Rejected registration from {}: {}", connection.remote_addr(), e);
                return RequestOutcome::reply(ResponseCode::BadRequest);
            }
        };
        let links = match links_from_payload(&request.payload) {
            Ok(links) => links,
            Err(e) => {
                log::info!("Rejected registration of {}: {}", register.endpoint, e);
                return RequestOutcome::reply(ResponseCode::BadRequest);
            }
        };

        let device = self.manager.register(register, links, connection).await;
        log::info!("Registered {} as rd/{}", device.endpoint(), device.id());
        RequestOutcome {
            response: Message::new(ResponseCode::Created).with_location(["rd", device.id()]),
            after_ack: Some(AfterAck::Registered(device.id().to_string())),
        }
    }

    async fn update(&self, id: &str, request: &Request, connection: Arc<dyn Connection>) -> RequestOutcome {
        let update = match UpdateRequest::from_request(request) {
            Ok(update) => update,
            Err(e) => {
                log::info!("Rejected update of rd/{}: {}", id, e);
                return RequestOutcome::reply(ResponseCode::BadRequest);
            }
        };
        let links = if request.payload.is_empty() {
            None
        } else {
            match links_from_payload(&request.payload) {
                Ok(links) => Some(links),
                Err(e) => {
                    log::info!("Rejected update of rd/{}: {}", id, e);
                    return RequestOutcome::reply(ResponseCode::BadRequest);
                }
            }
        };

        let moved = match self.manager.get_device(id).await {
            Ok(device) => moved_connection(&device, connection),
            Err(_) => return RequestOutcome::reply(ResponseCode::NotFound),
        };
        match self.manager.update(id, update, links, moved).await {
            Ok(_) => RequestOutcome {
                response: Message::new(ResponseCode::Changed),
                after_ack: Some(AfterAck::Updated(id.to_string())),
            },
            Err(_) => RequestOutcome::reply(ResponseCode::NotFound),
        }
    }

    async fn deregister(&self, id: &str) -> RequestOutcome {
        match self.manager.deregister(id).await {
            Ok(device) => {
                log::info!("Deregistered {} (rd/{})", device.endpoint(), id);
                RequestOutcome::reply(ResponseCode::Deleted)
            }
            Err(_) => RequestOutcome::reply(ResponseCode::NotFound),
        }
    }
}

/// The new connection if the device now talks from another address
fn moved_connection(device: &Device, connection: Arc<dyn Connection>) -> Option<Arc<dyn Connection>> {
    if device.connection().remote_addr() == connection.remote_addr() {
        None
    } else {
        Some(connection)
    }
}
