//! Per-device connection and observation handles

use crate::message::Message;
use async_trait::async_trait;
use bytes::Bytes;
use lwm2m_core::{ContentFormat, Lwm2mError, Lwm2mResult, Path};
use tokio::sync::mpsc;

/// Client-side endpoint of a registered device
///
/// Implemented by the CoAP/DTLS stack. One connection is handed to the
/// server per registration and replaced when the device re-registers or
/// updates from a new address.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Remote address, used to detect address changes on update
    fn remote_addr(&self) -> String;

    /// Send a GET (Read or Discover)
    ///
    /// # Arguments
    ///
    /// * `path` - Target path on the device
    /// * `accept` - Content format the response should be encoded in
    async fn get(&self, path: &Path, accept: ContentFormat) -> Lwm2mResult<Message>;

    /// Send a PUT (Write)
    async fn put(&self, path: &Path, content_format: ContentFormat, payload: Bytes)
    -> Lwm2mResult<Message>;

    /// Send a POST (Execute or Create)
    ///
    /// # Arguments
    ///
    /// * `content_format` - Format of `payload`; `None` for an empty body
    async fn post(
        &self,
        path: &Path,
        content_format: Option<ContentFormat>,
        payload: Bytes,
    ) -> Lwm2mResult<Message>;

    /// Send a DELETE
    async fn delete(&self, path: &Path) -> Lwm2mResult<Message>;

    /// Start observing a path
    ///
    /// Every notification the device sends for this observation must be
    /// pushed into `sink`. The returned subscription cancels it.
    async fn observe(
        &self,
        path: &Path,
        accept: ContentFormat,
        sink: NotificationSink,
    ) -> Lwm2mResult<Box<dyn Subscription>>;

    /// Send Bootstrap-Finish (POST /bs)
    async fn bootstrap_finish(&self) -> Lwm2mResult<Message>;

    /// Release transport resources
    async fn close(&self) -> Lwm2mResult<()> {
        Ok(())
    }
}

/// Handle of an established observation
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Whether the subscription has lapsed, either cancelled by the server
    /// or dropped by the device/transport
    fn is_cancelled(&self) -> bool;

    /// Cancel the observation on the device
    async fn cancel(&self) -> Lwm2mResult<()>;
}

/// A notification received for an observed path
#[derive(Debug, Clone)]
pub struct Notification {
    pub path: Path,
    pub message: Message,
}

/// Where a transport delivers notifications of one observation
#[derive(Debug, Clone)]
pub struct NotificationSink {
    path: Path,
    sender: mpsc::Sender<Notification>,
}

impl NotificationSink {
    pub fn new(path: Path, sender: mpsc::Sender<Notification>) -> Self {
        Self { path, sender }
    }

    /// The observed path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deliver a notification, waiting for queue capacity
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` once the receiving session has ended
    pub async fn notify(&self, message: Message) -> Lwm2mResult<()> {
        self.sender
            .send(Notification {
                path: self.path,
                message,
            })
            .await
            .map_err(|_| Lwm2mError::SessionNotFound(self.path.to_string()))
    }

    /// Whether the receiving session has ended
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ResponseCode;

    #[tokio::test]
    async fn test_sink_tags_notifications_with_path() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = NotificationSink::new(Path::resource(3303, 0, 5700).unwrap(), tx);
        sink.notify(Message::new(ResponseCode::Content)).await.unwrap();

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.path, Path::resource(3303, 0, 5700).unwrap());
        assert_eq!(notification.message.code, ResponseCode::Content);
    }

    #[tokio::test]
    async fn test_sink_reports_closed_session() {
        let (tx, rx) = mpsc::channel(1);
        let sink = NotificationSink::new(Path::object(3), tx);
        drop(rx);
        assert!(sink.is_closed());
        assert!(matches!(
            sink.notify(Message::new(ResponseCode::Content)).await,
            Err(Lwm2mError::SessionNotFound(_))
        ));
    }
}
