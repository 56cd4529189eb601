//! Typed error handling for delivery attempts.
//!
//! Every courier reports failure as one of three kinds:
//! - Permanent: the recipient can never be reached this way, don't retry
//! - Temporary: try again later with backoff
//! - System: something is wrong on our side; the queue retries these too

use thiserror::Error;

use crate::{dns::DnsError, smtp::ClientError};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    #[error("System error: {0}")]
    System(#[from] SystemError),
}

#[derive(Debug, Error)]
pub enum PermanentError {
    /// Recipient address is invalid or was refused.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Domain does not exist (NXDOMAIN).
    #[error("Domain not found: {0}")]
    DomainNotFound(String),

    /// No MX, A or AAAA records for the domain.
    #[error("No mail servers available for domain: {0}")]
    NoMailServers(String),

    /// Remote server gave a 5xx reply.
    #[error("Message rejected: {0}")]
    MessageRejected(String),

    /// Local delivery agent reported an unknown user or host.
    #[error("Mailbox unavailable: {0}")]
    MailboxUnavailable(String),

    /// Pipe command exited nonzero, timed out or could not be run.
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

#[derive(Debug, Error)]
pub enum TemporaryError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("DNS lookup failed: {0}")]
    DnsLookupFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Remote server gave a 4xx reply, or a 5xx the policy treats as transient.
    #[error("Temporary SMTP error: {0}")]
    SmtpTemporary(String),

    /// Local delivery agent failed in a way worth retrying.
    #[error("Local delivery failed: {0}")]
    LocalDelivery(String),
}

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// Returns `true` if this error is temporary and should be retried.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Returns `true` if this error is permanent and should not be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }
}

impl From<DnsError> for DeliveryError {
    fn from(error: DnsError) -> Self {
        match error {
            DnsError::NoMailServers(domain) => Self::Permanent(PermanentError::NoMailServers(domain)),
            DnsError::DomainNotFound(domain) => {
                Self::Permanent(PermanentError::DomainNotFound(domain))
            }
            DnsError::LookupFailed(err) => {
                Self::Temporary(TemporaryError::DnsLookupFailed(err.to_string()))
            }
        }
    }
}

/// Transport level client failures. Reply codes are classified separately
/// by the failure policy, since only it knows which 5xx replies are final.
impl From<ClientError> for DeliveryError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Io(e) => {
                Self::Temporary(TemporaryError::ConnectionFailed(format!("I/O error: {e}")))
            }
            ClientError::ConnectionClosed => Self::Temporary(TemporaryError::ConnectionFailed(
                "Connection closed unexpectedly".to_string(),
            )),
            ClientError::Timeout(stage) => {
                Self::Temporary(TemporaryError::Timeout(format!("waiting for {stage}")))
            }
            ClientError::Parse(msg) => {
                Self::System(SystemError::Internal(format!("SMTP protocol parse error: {msg}")))
            }
        }
    }
}
