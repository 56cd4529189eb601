//! Just enough of an SMTP client to relay one message to one recipient.

mod client;
mod error;
mod response;

pub use client::{SmtpClient, dot_stuff};
pub use error::ClientError;
pub use response::Response;
