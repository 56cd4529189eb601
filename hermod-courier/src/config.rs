use serde::Deserialize;

use crate::{FailurePolicy, LocalConfig, PipeConfig, RemoteConfig};

/// Settings for every courier, as found under `couriers:` in the config
///
/// ```ron
/// couriers: (
///     local: (mda_binary: "procmail", mda_args: ["-f", "%from%", "-d", "%to_user%"]),
///     remote: (helo_domain: "mx.example.com"),
///     pipe: (timeout_secs: 30),
///     policy: (permanent_exit_codes: [67, 68], temporary_reply_codes: [552]),
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CourierConfig {
    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub pipe: PipeConfig,

    #[serde(default)]
    pub policy: FailurePolicy,
}
