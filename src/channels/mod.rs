//! Outbound delivery channels.

pub mod email;

pub use email::{EmailChannel, EmailConfig};

use async_trait::async_trait;

use crate::error::DeliveryError;

/// Sends one message to one recipient. No retries: the next scheduled run
/// picks the still-unsent lead up again.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}
