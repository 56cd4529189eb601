use hermod_common::{ItemId, address::AddressError};
use hermod_spool::SpoolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue already holds its configured maximum number of items.
    /// Submitters should answer with a transient rejection.
    #[error("Queue is full")]
    QueueFull,

    #[error("Message has no recipients")]
    NoRecipients,

    #[error("Invalid recipient address '{0}': {1}")]
    InvalidAddress(String, #[source] AddressError),

    #[error("No queued item with id {0}")]
    NotFound(ItemId),

    #[error("Spool error: {0}")]
    Spool(#[from] SpoolError),
}

impl QueueError {
    /// The submission may succeed if tried again later
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::QueueFull | Self::Spool(_))
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
