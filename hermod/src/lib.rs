//! The hermod daemon: configuration, startup recovery and the scheduler
//! loop around [`hermod_queue::Queue`]

pub mod controller;

pub use controller::{Hermod, SHUTDOWN_BROADCAST};
