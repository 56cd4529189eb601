use hermod_common::{
    DomainSet, Recipient, RecipientKind, Route,
    address::{self, AddressError, PIPE_PREFIX},
};

use crate::QueueError;

/// Decides once, at submission, which courier each recipient goes to
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    local_domains: DomainSet,
}

impl Classifier {
    #[must_use]
    pub const fn new(local_domains: DomainSet) -> Self {
        Self { local_domains }
    }

    #[must_use]
    pub const fn local_domains(&self) -> &DomainSet {
        &self.local_domains
    }

    /// Build a pending [`Recipient`] for a submitted address.
    ///
    /// - `|command` becomes a pipe recipient running `command`
    /// - an address with no domain, or one of ours, is local
    /// - everything else is remote
    ///
    /// # Errors
    /// [`QueueError::InvalidAddress`] if the address cannot be normalized
    /// or is a pipe with no command
    pub fn classify(&self, submitted: &str) -> Result<Recipient, QueueError> {
        if submitted.trim_start().starts_with(PIPE_PREFIX) {
            return address::pipe_command(submitted)
                .map(|command| Recipient::new(command, submitted, RecipientKind::Pipe))
                .ok_or_else(|| {
                    QueueError::InvalidAddress(submitted.to_string(), AddressError::Empty)
                });
        }

        let normalized = address::normalize(submitted)
            .map_err(|err| QueueError::InvalidAddress(submitted.to_string(), err))?;

        let domain = address::domain(&normalized);
        let route = if domain.is_empty() || self.local_domains.contains(domain) {
            Route::Local
        } else {
            Route::Remote
        };

        Ok(Recipient::new(normalized, submitted, RecipientKind::Email(route)))
    }
}
