//! Address helpers used for routing decisions
//!
//! These are deliberately small and pure: the queue only needs to know the
//! user and domain parts of an address, a canonical form to classify on,
//! and whether a recipient is really a command to pipe the message into.

use thiserror::Error;

/// Prefix marking a recipient as a command rather than a mailbox
pub const PIPE_PREFIX: char = '|';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Address is empty")]
    Empty,

    #[error("Address contains whitespace or control characters: {0:?}")]
    InvalidCharacter(String),

    #[error("Address has a domain but no user part: {0:?}")]
    MissingUser(String),
}

/// Split an address into its user and domain parts.
///
/// The split happens at the last `@`, so quoted local parts containing `@`
/// keep working. An address without `@` has an empty domain.
///
/// ```
/// use hermod_common::address::split;
///
/// assert_eq!(split("am@loco"), ("am", "loco"));
/// assert_eq!(split("nodomain"), ("nodomain", ""));
/// ```
pub fn split(address: &str) -> (&str, &str) {
    address
        .rsplit_once('@')
        .map_or((address, ""), |(user, domain)| (user, domain))
}

/// The domain part of `address`, empty when there is none.
pub fn domain(address: &str) -> &str {
    split(address).1
}

/// The user part of `address`.
pub fn user(address: &str) -> &str {
    split(address).0
}

/// Whether the null reverse-path (`MAIL FROM:<>`) was used.
pub fn is_null_sender(address: &str) -> bool {
    let trimmed = address.trim();
    trimmed.is_empty() || trimmed == "<>"
}

/// If `address` names a pipe target, return the command line.
pub fn pipe_command(address: &str) -> Option<&str> {
    address
        .trim_start()
        .strip_prefix(PIPE_PREFIX)
        .map(str::trim)
        .filter(|command| !command.is_empty())
}

/// Canonical form of an address.
///
/// Surrounding whitespace is dropped and the domain is lowercased; the user
/// part is kept as submitted since local parts are case sensitive.
///
/// # Errors
///
/// Returns an [`AddressError`] if the address is empty, has embedded
/// whitespace or control characters, or has a domain with no user.
pub fn normalize(address: &str) -> Result<String, AddressError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AddressError::Empty);
    }

    if address
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(AddressError::InvalidCharacter(address.to_string()));
    }

    match address.rsplit_once('@') {
        Some(("", _)) => Err(AddressError::MissingUser(address.to_string())),
        Some((user, domain)) => Ok(format!("{user}@{}", domain.to_ascii_lowercase())),
        None => Ok(address.to_string()),
    }
}
