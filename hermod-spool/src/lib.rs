//! Durable storage for queued messages
//!
//! Every queued message is kept as a single record keyed by its id. Writes
//! replace the whole record atomically, so a crash can never leave a torn
//! record behind for the queue to trip over on restart.

pub mod backends;
pub mod config;
pub mod error;
pub mod r#trait;

use hermod_common::Message;

pub use backends::{FileBackingStore, MemoryBackingStore};
pub use config::SpoolConfig;
pub use error::{Result, SerializationError, SpoolError, ValidationError};
pub use r#trait::BackingStore;

/// Encode a message into its on-disk record form
///
/// # Errors
/// If the message cannot be encoded
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(message, bincode::config::standard())
        .map_err(|e| SerializationError::Encode(e).into())
}

/// Decode a record produced by [`encode`]
///
/// # Errors
/// If the bytes are not a valid record
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let (message, read): (Message, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(SerializationError::Decode)?;

    if read != bytes.len() {
        return Err(SerializationError::Corrupted(format!(
            "{} trailing bytes after record",
            bytes.len() - read
        ))
        .into());
    }

    Ok(message)
}
