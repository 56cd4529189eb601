use async_trait::async_trait;

use crate::DeliveryError;

/// A way of getting a message to one recipient
///
/// `to` is the recipient as stored on the queue item: an address for the
/// local and remote couriers, a command line for the pipe courier. A
/// courier only reports what happened; retrying is the queue's business.
#[async_trait]
pub trait Courier: Send + Sync + std::fmt::Debug {
    async fn deliver(&self, from: &str, to: &str, data: &[u8]) -> Result<(), DeliveryError>;
}
