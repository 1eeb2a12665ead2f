//! lwm2m - Rust implementation of an OMA LWM2M server engine
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `lwm2m-core`: error type, `Path`, content formats
//! - `lwm2m-codec`: TLV, value codecs, CoRE link format
//! - `lwm2m-node`: object model, resource registry, message encode/decode
//! - `lwm2m-transport`: interfaces the CoAP/DTLS stack implements
//! - `lwm2m-server`: device manager, sessions, observations, registration
//!   and bootstrap
//!
//! # Usage
//!
//! ```no_run
//! use lwm2m::server::{DeviceManager, RegistrationHandler};
//! ```

// Re-export core types
pub use lwm2m_core::{ContentFormat, Lwm2mError, Lwm2mResult, Path};

// Re-export the object model
pub mod node {
    pub use lwm2m_node::*;
}

// Re-export wire codecs
pub mod codec {
    pub use lwm2m_codec::*;
}

// Re-export transport interfaces
pub mod transport {
    pub use lwm2m_transport::*;
}

// Re-export server API
pub mod server {
    pub use lwm2m_server::*;
}
