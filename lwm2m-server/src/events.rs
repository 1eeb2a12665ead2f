//! Device lifecycle events
//!
//! The manager emits one event per registration transition. Events are
//! delivered in transition order by a single dispatcher task, so a
//! listener never sees two events concurrently.

use crate::device::Device;
use crate::manager::DeviceManager;
use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Kind of a lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceEventKind {
    /// A new session was created
    Register,
    /// The registration response was acknowledged
    PostRegister,
    /// Registration fields were updated
    Update,
    /// The update response was acknowledged
    PostUpdate,
    /// The session was removed (explicitly, by re-registration or by expiry)
    Deregister,
}

impl DeviceEventKind {
    #[must_use]
    pub fn is_registration(&self) -> bool {
        matches!(self, Self::Register | Self::PostRegister)
    }
}

/// A lifecycle transition of one device session
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    pub kind: DeviceEventKind,
    pub device: Device,
}

impl DeviceEvent {
    pub fn new(kind: DeviceEventKind, device: Device) -> Self {
        Self { kind, device }
    }

    /// Human-readable description of the event
    pub fn description(&self) -> String {
        format!(
            "{:?} of {} (session {})",
            self.kind,
            self.device.endpoint(),
            self.device.id()
        )
    }
}

/// Receiver of device lifecycle events
///
/// # Arguments
/// * `event` - The transition that occurred
/// * `manager` - The emitting manager, for follow-up lookups
#[async_trait]
pub trait DeviceEventListener: Send + Sync {
    async fn on_device_event(&self, event: &DeviceEvent, manager: &DeviceManager);
}

/// Listener that forwards events to a tokio channel
pub struct ChannelEventListener {
    tx: UnboundedSender<DeviceEvent>,
}

impl ChannelEventListener {
    /// Create a listener and the receiver its events arrive on
    pub fn new() -> (Self, UnboundedReceiver<DeviceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DeviceEventListener for ChannelEventListener {
    async fn on_device_event(&self, event: &DeviceEvent, _manager: &DeviceManager) {
        // receiver may be gone
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        assert!(DeviceEventKind::Register.is_registration());
        assert!(DeviceEventKind::PostRegister.is_registration());
        assert!(!DeviceEventKind::Update.is_registration());
        assert!(!DeviceEventKind::Deregister.is_registration());
    }
}
