//! Delivery Status Notifications (RFC 3464)
//!
//! When an item resolves with at least one failed recipient, the sender is
//! told about it with a bounce queued through the normal submission path:
//!
//! ```text
//! multipart/report; report-type="delivery-status"
//! ├── text/plain              which recipients failed, and why
//! ├── message/delivery-status per-recipient status fields
//! └── text/rfc822-headers     headers of the original message
//! ```
//!
//! Bounces use the null sender so that a bounce that fails in turn is never
//! bounced again.

use std::{
    fmt::Write as _,
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Utc};
use hermod_common::{Message, Recipient, address};
use serde::Deserialize;

/// Most of the original message quoted back when no header terminator is found
const MAX_QUOTED_HEADERS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DsnConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Name of this MTA for the `Reporting-MTA` field
    #[serde(default = "defaults::reporting_mta")]
    pub reporting_mta: String,

    /// Shown as the bounce's `From:` header
    #[serde(default = "defaults::postmaster")]
    pub postmaster: String,
}

impl Default for DsnConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            reporting_mta: defaults::reporting_mta(),
            postmaster: defaults::postmaster(),
        }
    }
}

mod defaults {
    pub const fn enabled() -> bool {
        true
    }

    pub fn reporting_mta() -> String {
        "localhost".to_string()
    }

    pub fn postmaster() -> String {
        "postmaster@localhost".to_string()
    }
}

/// Whether `message` warrants a bounce to its sender
///
/// Only resolved messages with a failed recipient are bounced, and never
/// when the sender is null.
#[must_use]
pub fn should_bounce(message: &Message, config: &DsnConfig) -> bool {
    config.enabled
        && !address::is_null_sender(&message.from)
        && message.is_resolved()
        && message.failed().next().is_some()
}

/// Render the bounce for `message`, ready to be queued to its sender
#[must_use]
pub fn build_bounce(message: &Message, config: &DsnConfig, now: SystemTime) -> Vec<u8> {
    let boundary = format!(
        "----=_Part_{}_{}",
        ulid::Ulid::new(),
        now.duration_since(UNIX_EPOCH).unwrap_or_default().as_micros()
    );

    let human_readable = human_readable_part(message, config);
    let delivery_status = delivery_status_part(message, config);
    let original_headers = original_headers(&message.data);

    format!(
        "Date: {date}\r\n\
        From: Mail Delivery System <{postmaster}>\r\n\
        To: <{sender}>\r\n\
        Subject: Undelivered Mail Returned to Sender\r\n\
        Auto-Submitted: auto-replied\r\n\
        MIME-Version: 1.0\r\n\
        Content-Type: multipart/report; report-type=\"delivery-status\"; boundary=\"{boundary}\"\r\n\
        \r\n\
        This is a multi-part message in MIME format.\r\n\
        \r\n\
        --{boundary}\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        Content-Transfer-Encoding: 8bit\r\n\
        \r\n\
        {human_readable}\r\n\
        --{boundary}\r\n\
        Content-Type: message/delivery-status\r\n\
        \r\n\
        {delivery_status}\r\n\
        --{boundary}\r\n\
        Content-Type: text/rfc822-headers\r\n\
        \r\n\
        {original_headers}\r\n\
        --{boundary}--\r\n",
        date = rfc2822(now),
        postmaster = config.postmaster,
        sender = message.from.trim(),
    )
    .into_bytes()
}

fn human_readable_part(message: &Message, config: &DsnConfig) -> String {
    let mut text = format!(
        "This is the mail system at host {}.\r\n\
        \r\n\
        Your message could not be delivered to one or more recipients.\r\n\
        The message was queued as {} on {}.\r\n\
        \r\n",
        config.reporting_mta,
        message.id,
        rfc2822(message.created_at),
    );

    for recipient in message.failed() {
        let _ = write!(
            text,
            "<{}>: {}\r\n",
            recipient.original_address.trim(),
            reason(recipient.last_failure.as_deref())
        );
    }

    text
}

fn delivery_status_part(message: &Message, config: &DsnConfig) -> String {
    let mut dsn = format!("Reporting-MTA: dns; {}\r\n", config.reporting_mta);
    let _ = write!(dsn, "Arrival-Date: {}\r\n", rfc2822(message.created_at));

    for recipient in message.failed() {
        dsn.push_str("\r\n");

        let _ = write!(
            dsn,
            "Final-Recipient: rfc822; {}\r\n",
            recipient.original_address.trim()
        );
        dsn.push_str("Action: failed\r\n");
        let _ = write!(dsn, "Status: {}\r\n", status_code(recipient));
        let _ = write!(
            dsn,
            "Diagnostic-Code: X-Hermod; {}\r\n",
            single_line(reason(recipient.last_failure.as_deref()))
        );
    }

    dsn
}

/// The header block of the original message, or its first kilobyte when
/// no blank line ends the headers within that
fn original_headers(data: &[u8]) -> String {
    let end = data
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .unwrap_or(data.len())
        .min(MAX_QUOTED_HEADERS);

    if end == 0 {
        return String::from("(No headers available)");
    }

    String::from_utf8_lossy(&data[..end]).into_owned()
}

fn reason(last_failure: Option<&str>) -> &str {
    last_failure
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("delivery failed")
}

/// RFC 3463 status: 4.4.7 for delivery time expired, otherwise a generic
/// permanent failure
const fn status_code(recipient: &Recipient) -> &'static str {
    if recipient.expired { "4.4.7" } else { "5.0.0" }
}

/// Collapse line breaks so a multi-line failure stays one header field
fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn rfc2822(at: SystemTime) -> String {
    DateTime::<Utc>::from(at).to_rfc2822()
}
