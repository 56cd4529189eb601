//! The hermod delivery queue
//!
//! Accepts messages with one sender and any number of recipients, keeps
//! them durably in a [`BackingStore`](hermod_spool::BackingStore), and
//! drives each recipient to delivery or failure through the couriers in
//! [`Couriers`](hermod_courier::Couriers). Failures are bounced to the
//! sender once the whole message is resolved.

pub mod classify;
pub mod config;
pub mod dsn;
pub mod error;
pub mod id;
pub mod policy;
pub mod queue;
pub mod scheduler;

pub use classify::Classifier;
pub use config::QueueConfig;
pub use dsn::DsnConfig;
pub use error::QueueError;
pub use id::IdGenerator;
pub use policy::RetryPolicy;
pub use queue::{LoadSummary, Queue, TickSummary, cleanup::MAX_CLEANUP_ATTEMPTS, describe};
pub use scheduler::RetryScheduler;
