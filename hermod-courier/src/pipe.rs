use std::time::Duration;

use async_trait::async_trait;
use hermod_common::outgoing;
use serde::Deserialize;

use crate::{
    Courier, DeliveryError,
    error::PermanentError,
    process::{self, ProcessError},
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipeConfig {
    /// Hard limit on how long a pipe command may run (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    30
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Delivers by running the recipient's command with the message on stdin
///
/// The command line is split on whitespace and run without a shell. The
/// sender is exported as `SENDER`. Commands are assumed deterministic, so
/// every failure (nonzero exit, timeout, missing program) is permanent.
#[derive(Debug, Clone, Default)]
pub struct PipeCourier {
    config: PipeConfig,
}

impl PipeCourier {
    #[must_use]
    pub const fn new(config: PipeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Courier for PipeCourier {
    #[tracing::instrument(level = "debug", skip(self, data), fields(size = data.len()))]
    async fn deliver(&self, from: &str, to: &str, data: &[u8]) -> Result<(), DeliveryError> {
        let mut words = to.split_whitespace();
        let Some(program) = words.next() else {
            return Err(PermanentError::CommandFailed("empty command".to_string()).into());
        };
        let args: Vec<String> = words.map(ToString::to_string).collect();

        outgoing!(level = DEBUG, "Piping message from {from} into {to}");

        let exit = process::run(
            program,
            &args,
            &[("SENDER", from)],
            data,
            Duration::from_secs(self.config.timeout_secs),
        )
        .await
        .map_err(|err: ProcessError| PermanentError::CommandFailed(err.to_string()))?;

        if exit.success() {
            Ok(())
        } else {
            let status = exit
                .code
                .map_or_else(|| "killed by signal".to_string(), |c| format!("exit status {c}"));
            let detail = if exit.stderr.is_empty() {
                format!("{to}: {status}")
            } else {
                format!("{to}: {status}: {}", exit.stderr)
            };
            Err(PermanentError::CommandFailed(detail).into())
        }
    }
}
