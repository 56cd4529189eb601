use serde::Deserialize;

use crate::error::{DeliveryError, PermanentError, SystemError, TemporaryError};

/// `EX_NOUSER` from sysexits.h
pub const EX_NOUSER: i32 = 67;
/// `EX_NOHOST` from sysexits.h
pub const EX_NOHOST: i32 = 68;

/// Where the line between "retry later" and "give up" sits for couriers
/// whose failures are ambiguous.
///
/// ```ron
/// policy: (
///     permanent_exit_codes: [67, 68],
///     temporary_reply_codes: [552],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FailurePolicy {
    /// Delivery agent exit codes that mean the recipient does not exist.
    /// Every other nonzero exit is retried.
    #[serde(default = "default_permanent_exit_codes")]
    pub permanent_exit_codes: Vec<i32>,

    /// 5xx replies to treat as transient. RFC 5321 asks clients to treat
    /// 552 on RCPT as temporary.
    #[serde(default = "default_temporary_reply_codes")]
    pub temporary_reply_codes: Vec<u16>,
}

fn default_permanent_exit_codes() -> Vec<i32> {
    vec![EX_NOUSER, EX_NOHOST]
}

fn default_temporary_reply_codes() -> Vec<u16> {
    vec![552]
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            permanent_exit_codes: default_permanent_exit_codes(),
            temporary_reply_codes: default_temporary_reply_codes(),
        }
    }
}

impl FailurePolicy {
    /// Classify an unsuccessful local delivery agent exit
    ///
    /// `code` is `None` when the agent was killed by a signal.
    pub fn agent_exit(&self, code: Option<i32>, detail: &str) -> DeliveryError {
        match code {
            Some(code) if self.permanent_exit_codes.contains(&code) => {
                PermanentError::MailboxUnavailable(format!("exit status {code}: {detail}")).into()
            }
            Some(code) => {
                TemporaryError::LocalDelivery(format!("exit status {code}: {detail}")).into()
            }
            None => TemporaryError::LocalDelivery(format!("killed by signal: {detail}")).into(),
        }
    }

    /// Classify an unexpected SMTP reply
    pub fn reply(&self, code: u16, message: &str) -> DeliveryError {
        let text = format!("{code} {message}");

        match code {
            400..500 => TemporaryError::SmtpTemporary(text).into(),
            500..600 if self.temporary_reply_codes.contains(&code) => {
                TemporaryError::SmtpTemporary(text).into()
            }
            550 | 551 | 553 => PermanentError::InvalidRecipient(text).into(),
            500..600 => PermanentError::MessageRejected(text).into(),
            _ => SystemError::Internal(format!("Unexpected SMTP response: {text}")).into(),
        }
    }
}
