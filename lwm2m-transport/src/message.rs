//! CoAP-level request and response shapes

use bytes::Bytes;
use lwm2m_core::{ContentFormat, Lwm2mResult};
use std::fmt;

/// CoAP response codes used by LWM2M
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Created,
    Deleted,
    Valid,
    Changed,
    Content,
    Continue,
    BadRequest,
    Unauthorized,
    BadOption,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    RequestEntityIncomplete,
    PreconditionFailed,
    RequestEntityTooLarge,
    UnsupportedContentFormat,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    ProxyingNotSupported,
}

impl ResponseCode {
    /// Class and detail, e.g. `(2, 5)` for 2.05 Content
    pub fn class_detail(&self) -> (u8, u8) {
        match self {
            Self::Created => (2, 1),
            Self::Deleted => (2, 2),
            Self::Valid => (2, 3),
            Self::Changed => (2, 4),
            Self::Content => (2, 5),
            Self::Continue => (2, 31),
            Self::BadRequest => (4, 0),
            Self::Unauthorized => (4, 1),
            Self::BadOption => (4, 2),
            Self::Forbidden => (4, 3),
            Self::NotFound => (4, 4),
            Self::MethodNotAllowed => (4, 5),
            Self::NotAcceptable => (4, 6),
            Self::RequestEntityIncomplete => (4, 8),
            Self::PreconditionFailed => (4, 12),
            Self::RequestEntityTooLarge => (4, 13),
            Self::UnsupportedContentFormat => (4, 15),
            Self::InternalServerError => (5, 0),
            Self::NotImplemented => (5, 1),
            Self::BadGateway => (5, 2),
            Self::ServiceUnavailable => (5, 3),
            Self::GatewayTimeout => (5, 4),
            Self::ProxyingNotSupported => (5, 5),
        }
    }

    /// Single-byte code as carried in the CoAP header
    pub fn to_u8(self) -> u8 {
        let (class, detail) = self.class_detail();
        (class << 5) | detail
    }

    /// Parse the single-byte CoAP code
    pub fn from_u8(value: u8) -> Option<Self> {
        const ALL: [ResponseCode; 23] = [
            ResponseCode::Created,
            ResponseCode::Deleted,
            ResponseCode::Valid,
            ResponseCode::Changed,
            ResponseCode::Content,
            ResponseCode::Continue,
            ResponseCode::BadRequest,
            ResponseCode::Unauthorized,
            ResponseCode::BadOption,
            ResponseCode::Forbidden,
            ResponseCode::NotFound,
            ResponseCode::MethodNotAllowed,
            ResponseCode::NotAcceptable,
            ResponseCode::RequestEntityIncomplete,
            ResponseCode::PreconditionFailed,
            ResponseCode::RequestEntityTooLarge,
            ResponseCode::UnsupportedContentFormat,
            ResponseCode::InternalServerError,
            ResponseCode::NotImplemented,
            ResponseCode::BadGateway,
            ResponseCode::ServiceUnavailable,
            ResponseCode::GatewayTimeout,
            ResponseCode::ProxyingNotSupported,
        ];
        ALL.into_iter().find(|code| code.to_u8() == value)
    }

    pub fn is_success(&self) -> bool {
        self.class_detail().0 == 2
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Deleted => "Deleted",
            Self::Valid => "Valid",
            Self::Changed => "Changed",
            Self::Content => "Content",
            Self::Continue => "Continue",
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::BadOption => "Bad Option",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::NotAcceptable => "Not Acceptable",
            Self::RequestEntityIncomplete => "Request Entity Incomplete",
            Self::PreconditionFailed => "Precondition Failed",
            Self::RequestEntityTooLarge => "Request Entity Too Large",
            Self::UnsupportedContentFormat => "Unsupported Content-Format",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
            Self::BadGateway => "Bad Gateway",
            Self::ServiceUnavailable => "Service Unavailable",
            Self::GatewayTimeout => "Gateway Timeout",
            Self::ProxyingNotSupported => "Proxying Not Supported",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (class, detail) = self.class_detail();
        write!(f, "{}.{:02} {}", class, detail, self.reason())
    }
}

/// Request methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// A response, or a notification, exchanged with a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub code: ResponseCode,
    /// Raw content-format option, if present
    pub content_format: Option<u16>,
    pub payload: Bytes,
    /// Location-Path option segments
    pub location_path: Vec<String>,
}

impl Message {
    /// Create an empty message with a response code
    pub fn new(code: ResponseCode) -> Self {
        Self {
            code,
            content_format: None,
            payload: Bytes::new(),
            location_path: Vec::new(),
        }
    }

    /// Attach a payload and its content format
    pub fn with_payload(mut self, content_format: ContentFormat, payload: Bytes) -> Self {
        self.content_format = Some(content_format.code());
        self.payload = payload;
        self
    }

    /// Attach a Location-Path
    pub fn with_location<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.location_path = segments.into_iter().map(Into::into).collect();
        self
    }

    /// The payload's content format, `None` when the option is absent
    ///
    /// # Errors
    ///
    /// `ContentFormatNotSupported` for codes the engine does not know
    pub fn content_format(&self) -> Lwm2mResult<Option<ContentFormat>> {
        self.content_format.map(ContentFormat::from_code).transpose()
    }
}

/// An inbound request delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub uri_path: Vec<String>,
    /// Uri-Query options, each `key=value` or a bare `key`
    pub queries: Vec<String>,
    pub content_format: Option<u16>,
    pub payload: Bytes,
}

impl Request {
    pub fn new<I, S>(method: Method, uri_path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            uri_path: uri_path.into_iter().map(Into::into).collect(),
            queries: Vec::new(),
            content_format: None,
            payload: Bytes::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.queries.push(query.into());
        self
    }

    pub fn with_payload(mut self, content_format: ContentFormat, payload: Bytes) -> Self {
        self.content_format = Some(content_format.code());
        self.payload = payload;
        self
    }

    /// Value of the first `name=value` query option
    pub fn query(&self, name: &str) -> Option<&str> {
        self.queries.iter().find_map(|query| match query.split_once('=') {
            Some((key, value)) if key == name => Some(value),
            None if query == name => Some(""),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_code_bytes() {
        assert_eq!(ResponseCode::Content.to_u8(), 0x45);
        assert_eq!(ResponseCode::Created.to_u8(), 0x41);
        assert_eq!(ResponseCode::NotFound.to_u8(), 0x84);
        assert_eq!(ResponseCode::from_u8(0x44), Some(ResponseCode::Changed));
        assert_eq!(ResponseCode::from_u8(0x01), None);
    }

    #[test]
    fn test_response_code_display() {
        assert_eq!(ResponseCode::Content.to_string(), "2.05 Content");
        assert_eq!(ResponseCode::BadRequest.to_string(), "4.00 Bad Request");
    }

    #[test]
    fn test_request_queries() {
        let request = Request::new(Method::Post, ["rd"])
            .with_query("ep=dev1")
            .with_query("lt=60")
            .with_query("Q");
        assert_eq!(request.query("ep"), Some("dev1"));
        assert_eq!(request.query("lt"), Some("60"));
        assert_eq!(request.query("Q"), Some(""));
        assert_eq!(request.query("b"), None);
    }

    #[test]
    fn test_message_content_format() {
        let message = Message::new(ResponseCode::Content)
            .with_payload(ContentFormat::Tlv, Bytes::from_static(&[0xC1, 0x00, 0x01]));
        assert_eq!(message.content_format().unwrap(), Some(ContentFormat::Tlv));

        let mut unknown = Message::new(ResponseCode::Content);
        unknown.content_format = Some(9999);
        assert!(unknown.content_format().is_err());
    }
}
