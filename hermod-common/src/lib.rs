pub mod address;
pub mod domain;
pub mod id;
pub mod logging;
pub mod message;

pub use domain::{Domain, DomainSet};
pub use id::ItemId;
pub use message::{Message, Recipient, RecipientKind, RecipientStatus, Route};
pub use tracing;

/// Broadcast to long-running tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
