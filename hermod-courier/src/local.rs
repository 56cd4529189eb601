use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use hermod_common::{address, outgoing};
use serde::Deserialize;

use crate::{
    Courier, DeliveryError, FailurePolicy,
    error::{SystemError, TemporaryError},
    process::{self, ProcessError},
};

/// How to reach the local mail delivery agent
///
/// `mda_args` may use `%from%`, `%from_user%`, `%from_domain%`, `%to%`,
/// `%to_user%` and `%to_domain%`, which are replaced per delivery.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_mda_binary")]
    pub mda_binary: String,

    #[serde(default = "default_mda_args")]
    pub mda_args: Vec<String>,

    /// Limit on a single agent run (default: 60)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_mda_binary() -> String {
    "procmail".to_string()
}

fn default_mda_args() -> Vec<String> {
    ["-f", "%from%", "-d", "%to_user%"]
        .into_iter()
        .map(String::from)
        .collect()
}

const fn default_timeout_secs() -> u64 {
    60
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            mda_binary: default_mda_binary(),
            mda_args: default_mda_args(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Substitute the envelope into an argument template
fn expand(template: &str, from: &str, to: &str) -> String {
    let (from_user, from_domain) = address::split(from);
    let (to_user, to_domain) = address::split(to);

    // Longest placeholders first so `%to%` never eats part of `%to_user%`
    template
        .replace("%from_user%", from_user)
        .replace("%from_domain%", from_domain)
        .replace("%from%", from)
        .replace("%to_user%", to_user)
        .replace("%to_domain%", to_domain)
        .replace("%to%", to)
}

/// Hands mail for local domains to a delivery agent such as procmail
///
/// Exit 0 is success. Exit codes the [`FailurePolicy`] lists as permanent
/// (unknown user or host by default) fail the recipient; anything else,
/// including a missing binary or a timeout, is retried.
#[derive(Debug, Clone)]
pub struct LocalCourier {
    config: LocalConfig,
    policy: Arc<FailurePolicy>,
}

impl LocalCourier {
    #[must_use]
    pub const fn new(config: LocalConfig, policy: Arc<FailurePolicy>) -> Self {
        Self { config, policy }
    }

    fn arguments(&self, from: &str, to: &str) -> Vec<String> {
        self.config
            .mda_args
            .iter()
            .map(|arg| expand(arg, from, to))
            .collect()
    }
}

#[async_trait]
impl Courier for LocalCourier {
    #[tracing::instrument(level = "debug", skip(self, data), fields(size = data.len()))]
    async fn deliver(&self, from: &str, to: &str, data: &[u8]) -> Result<(), DeliveryError> {
        if self.config.mda_binary.trim().is_empty() {
            return Err(SystemError::Configuration("no mda_binary configured".to_string()).into());
        }

        outgoing!(
            level = DEBUG,
            "Handing message for {to} to {}",
            self.config.mda_binary
        );

        let exit = process::run(
            &self.config.mda_binary,
            &self.arguments(from, to),
            &[],
            data,
            Duration::from_secs(self.config.timeout_secs),
        )
        .await
        .map_err(|err| match err {
            ProcessError::Timeout { .. } => TemporaryError::Timeout(err.to_string()),
            ProcessError::Spawn { .. } | ProcessError::Wait { .. } => {
                TemporaryError::LocalDelivery(err.to_string())
            }
        })?;

        if exit.success() {
            Ok(())
        } else {
            Err(self.policy.agent_exit(exit.code, &exit.stderr))
        }
    }
}
