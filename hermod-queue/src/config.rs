use hermod_common::DomainSet;
use serde::Deserialize;

use crate::{RetryPolicy, dsn::DsnConfig};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueueConfig {
    /// Most items held at once; `put` fails with `QueueFull` beyond this
    #[serde(default = "defaults::max_items")]
    pub max_items: usize,

    /// Domains we deliver to locally
    #[serde(default)]
    pub local_domains: DomainSet,

    /// How often the scheduler looks for due retries (in seconds)
    #[serde(default = "defaults::scan_interval_secs")]
    pub scan_interval_secs: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub dsn: DsnConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_items: defaults::max_items(),
            local_domains: DomainSet::default(),
            scan_interval_secs: defaults::scan_interval_secs(),
            retry: RetryPolicy::default(),
            dsn: DsnConfig::default(),
        }
    }
}

mod defaults {
    pub const fn max_items() -> usize {
        200
    }

    pub const fn scan_interval_secs() -> u64 {
        10
    }
}
