//! Wire codecs for LWM2M payloads
//!
//! This crate provides:
//! - the TLV structural codec (`tlv`)
//! - scalar value codecs for the TLV binary, plain-text and opaque
//!   representations (`value`)
//! - the RFC 6690 CoRE link format parser used by registration and discovery
//!   (`core_link`)

pub mod core_link;
pub mod tlv;
pub mod value;

pub use lwm2m_core::{Lwm2mError, Lwm2mResult};

pub use core_link::{CoreLink, parse_core_links};
pub use tlv::{TlvDecoder, TlvEncoder, TlvEntry, TlvKind};
pub use value::{
    BinaryValue, EncodedValue, ObjectLink, OpaqueValue, PlainTextValue, ResourceType, Value,
    Valuer,
};
