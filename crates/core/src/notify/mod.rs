pub mod telegram;

use crate::domain::digest::AlertDigest;

pub use telegram::TelegramSink;

/// Delivery channel for alert digests. Never errors; `false` means "not delivered".
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// `false` when the channel lacks credentials and every delivery would fail.
    fn is_configured(&self) -> bool {
        true
    }

    async fn deliver(&self, digest: &AlertDigest) -> bool;
}
