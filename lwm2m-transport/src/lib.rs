//! Transport layer interfaces for the LWM2M server
//!
//! The CoAP/DTLS stack lives outside this workspace. This crate defines
//! what the server engine needs from it: a per-device [`Connection`] for
//! server-initiated requests, [`Subscription`] handles for observations,
//! and the [`Request`]/[`Message`] shapes of inbound and outbound traffic.

pub mod connection;
pub mod message;

pub use lwm2m_core::{Lwm2mError, Lwm2mResult};

pub use connection::{Connection, Notification, NotificationSink, Subscription};
pub use message::{Message, Method, Request, ResponseCode};
