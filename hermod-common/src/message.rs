use std::{
    fmt::{self, Display},
    sync::Arc,
    time::SystemTime,
};

use serde::{Deserialize, Serialize};

use crate::ItemId;

/// Which courier an email recipient is handed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    Local,
    Remote,
}

/// Delivery class of a recipient, fixed when the item is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecipientKind {
    Email(Route),
    Pipe,
}

impl Display for RecipientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Email(Route::Local) => "local",
            Self::Email(Route::Remote) => "remote",
            Self::Pipe => "pipe",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecipientStatus {
    #[default]
    Pending,
    Success,
    Failure,
}

impl RecipientStatus {
    /// Terminal statuses never transition again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl Display for RecipientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
        })
    }
}

/// One delivery target of a queued message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// What the courier is given: the normalized address, or the command
    /// line for a pipe
    pub address: String,
    /// Exactly what was submitted
    pub original_address: String,
    pub kind: RecipientKind,
    pub status: RecipientStatus,
    pub attempts: u32,
    pub last_failure: Option<String>,
    pub next_retry_at: Option<SystemTime>,
    /// Failed because the message outlived its retry budget
    pub expired: bool,
}

impl Recipient {
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        original_address: impl Into<String>,
        kind: RecipientKind,
    ) -> Self {
        Self {
            address: address.into(),
            original_address: original_address.into(),
            kind,
            status: RecipientStatus::Pending,
            attempts: 0,
            last_failure: None,
            next_retry_at: None,
            expired: false,
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Persisted snapshot of a queued message and all of its recipients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: ItemId,
    pub from: String,
    pub created_at: SystemTime,
    pub data: Arc<[u8]>,
    pub recipients: Vec<Recipient>,
}

impl Message {
    /// All recipients have reached a terminal status
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.recipients.iter().all(Recipient::is_terminal)
    }

    pub fn failed(&self) -> impl Iterator<Item = &Recipient> {
        self.recipients
            .iter()
            .filter(|r| r.status == RecipientStatus::Failure)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Recipient> {
        self.recipients.iter().filter(|r| !r.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(statuses: &[RecipientStatus]) -> Message {
        Message {
            id: ItemId::parse("01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap(),
            from: "from".to_string(),
            created_at: SystemTime::UNIX_EPOCH,
            data: Arc::from(&b"data"[..]),
            recipients: statuses
                .iter()
                .enumerate()
                .map(|(i, status)| Recipient {
                    status: *status,
                    ..Recipient::new(
                        format!("r{i}@loco"),
                        format!("r{i}@loco"),
                        RecipientKind::Email(Route::Local),
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(!RecipientStatus::Pending.is_terminal());
        assert!(RecipientStatus::Success.is_terminal());
        assert!(RecipientStatus::Failure.is_terminal());
    }

    #[test]
    fn resolution() {
        use RecipientStatus::{Failure, Pending, Success};

        assert!(message(&[Success, Failure]).is_resolved());
        assert!(!message(&[Success, Pending]).is_resolved());
        assert_eq!(message(&[Success, Failure, Failure]).failed().count(), 2);
        assert_eq!(message(&[Pending, Failure]).pending().count(), 1);
    }

    #[test]
    fn kind_display() {
        assert_eq!(RecipientKind::Email(Route::Local).to_string(), "local");
        assert_eq!(RecipientKind::Email(Route::Remote).to_string(), "remote");
        assert_eq!(RecipientKind::Pipe.to_string(), "pipe");
    }
}
