//! Backing store implementations
//!
//! - `file`: one record per file in a spool directory, for production
//! - `memory`: records held in a map, for tests and throwaway setups

pub mod file;
pub mod memory;

pub use file::{FileBackingStore, FileBackingStoreBuilder};
pub use memory::MemoryBackingStore;
