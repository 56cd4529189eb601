//! Delivery backends for the hermod queue
//!
//! Every backend implements [`Courier`]. The queue picks one per recipient
//! from a [`Couriers`] bundle according to the recipient's kind, which was
//! fixed when the message was queued.

pub mod config;
pub mod courier;
pub mod dns;
pub mod error;
pub mod local;
pub mod pipe;
pub mod policy;
pub mod process;
pub mod remote;
pub mod smtp;

use std::sync::Arc;

use hermod_common::{RecipientKind, Route};

pub use config::CourierConfig;
pub use courier::Courier;
pub use error::{DeliveryError, PermanentError, SystemError, TemporaryError};
pub use local::{LocalConfig, LocalCourier};
pub use pipe::{PipeConfig, PipeCourier};
pub use policy::FailurePolicy;
pub use remote::{RemoteConfig, SmtpCourier};

/// The three couriers a queue dispatches to
#[derive(Debug, Clone)]
pub struct Couriers {
    pub local: Arc<dyn Courier>,
    pub remote: Arc<dyn Courier>,
    pub pipe: Arc<dyn Courier>,
}

impl Couriers {
    /// Build the production couriers from configuration
    ///
    /// # Errors
    /// If the remote courier needs DNS and no resolver can be created
    pub fn from_config(config: CourierConfig) -> Result<Self, DeliveryError> {
        let policy = Arc::new(config.policy);

        Ok(Self {
            local: Arc::new(LocalCourier::new(config.local, Arc::clone(&policy))),
            remote: Arc::new(SmtpCourier::new(config.remote, policy)?),
            pipe: Arc::new(PipeCourier::new(config.pipe)),
        })
    }

    /// The courier responsible for recipients of `kind`
    #[must_use]
    pub fn for_kind(&self, kind: RecipientKind) -> &Arc<dyn Courier> {
        match kind {
            RecipientKind::Email(Route::Local) => &self.local,
            RecipientKind::Email(Route::Remote) => &self.remote,
            RecipientKind::Pipe => &self.pipe,
        }
    }
}
