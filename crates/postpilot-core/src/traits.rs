//! Transport traits — the narrow publish contract the engine consumes.

use async_trait::async_trait;

use crate::error::Result;

/// Outbound publish surface of a messaging transport.
///
/// Every method returns the transport's message id on success. Failures are
/// `PostPilotError::Channel` and are caught at the dispatcher boundary —
/// implementations should not retry internally.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a photo by opaque media handle, with optional caption.
    async fn send_photo(&self, chat_id: i64, file_id: &str, caption: Option<&str>) -> Result<i64>;

    /// Publish a video by opaque media handle, with optional caption.
    async fn send_video(&self, chat_id: i64, file_id: &str, caption: Option<&str>) -> Result<i64>;

    /// Publish a plain text message.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64>;
}
