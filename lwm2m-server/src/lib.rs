//! LWM2M server engine
//!
//! This crate provides the server side of the LWM2M device management
//! protocol on top of the transport interfaces in `lwm2m-transport`.
//!
//! - `manager`: session table, lifecycle events, lifetime expiry
//! - `device` / `observe`: per-device session, device operations and the
//!   observation engine
//! - `registration`: the `/rd` interface
//! - `bootstrap`: the `/bs` interface
//! - `config`: manager and bootstrap configuration
//!
//! # TODO
//!
//! - [ ] Send / SenML-JSON notifications (LWM2M 1.1)
//! - [ ] Write-Attributes (pmin/pmax) on observations

pub mod bootstrap;
pub mod config;
pub mod device;
pub mod events;
pub mod manager;
pub mod observe;
pub mod registration;

#[cfg(test)]
mod test_support;

pub use lwm2m_core::{Lwm2mError, Lwm2mResult};

pub use bootstrap::{
    BootstrapHandler, BootstrapOutcome, BootstrapProvider, BootstrapRequest, BootstrapSession,
    PendingBootstrap,
};
pub use config::{BootstrapConfig, ManagerConfig};
pub use device::Device;
pub use events::{ChannelEventListener, DeviceEvent, DeviceEventKind, DeviceEventListener};
pub use manager::DeviceManager;
pub use observe::ObserveCallback;
pub use registration::{
    AfterAck, Binding, BindingMode, RegisterRequest, RegistrationHandler, RequestOutcome,
    UpdateRequest,
};
