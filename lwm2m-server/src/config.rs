//! Server configuration

use lwm2m_core::ContentFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Device manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Capacity of the manager event queue
    pub event_queue_capacity: usize,
    /// Capacity of each session's inbound queues
    pub session_queue_capacity: usize,
    /// Delay before a new session first establishes its observations
    pub initial_observe_delay: Duration,
    /// Period of the lifetime expiry sweep
    pub expiry_check_interval: Duration,
    /// Extra time granted past a session's lifetime before it expires
    pub expiry_grace: Duration,
    /// Lifetime in seconds when a registration carries no `lt`
    pub default_lifetime: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: 1000,
            session_queue_capacity: 10,
            initial_observe_delay: Duration::from_secs(1),
            expiry_check_interval: Duration::from_secs(60),
            expiry_grace: Duration::from_secs(15),
            default_lifetime: 30,
        }
    }
}

/// Bootstrap handler configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Upper bound on one provider run
    pub timeout: Duration,
    /// Content format used when the client states no usable preference
    pub content_format: ContentFormat,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            content_format: ContentFormat::Tlv,
        }
    }
}
