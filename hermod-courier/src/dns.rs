//! MX resolution for remote delivery.
//!
//! MX records sorted by preference, falling back to the domain itself
//! (implicit MX, RFC 5321 section 5.1) when it has address records but no
//! MX. Results are cached by DNS TTL within configured bounds.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use hickory_resolver::{
    ResolveError, TokioResolver, config::ResolverOpts, name_server::TokioConnectionProvider,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DnsError {
    /// No MX, A, or AAAA records found for the domain.
    #[error("No mail servers found for domain: {0}")]
    NoMailServers(String),

    /// DNS query failed due to network or resolver issues.
    #[error("DNS lookup failed: {0}")]
    LookupFailed(#[from] ResolveError),

    /// Domain does not exist (NXDOMAIN).
    #[error("Domain does not exist: {0}")]
    DomainNotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DnsConfig {
    /// DNS query timeout in seconds (default: 5)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Lower bound on how long a lookup is cached (default: 60)
    #[serde(default = "default_min_cache_ttl_secs")]
    pub min_cache_ttl_secs: u64,

    /// Upper bound on how long a lookup is cached (default: 3600)
    #[serde(default = "default_max_cache_ttl_secs")]
    pub max_cache_ttl_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    5
}

const fn default_min_cache_ttl_secs() -> u64 {
    60
}

const fn default_max_cache_ttl_secs() -> u64 {
    3600
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            min_cache_ttl_secs: default_min_cache_ttl_secs(),
            max_cache_ttl_secs: default_max_cache_ttl_secs(),
        }
    }
}

/// A host to try, lower preference first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailServer {
    pub host: String,
    pub preference: u16,
}

#[derive(Debug, Clone)]
struct CachedResult {
    servers: Arc<Vec<MailServer>>,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct MxResolver {
    resolver: TokioResolver,
    cache: DashMap<String, CachedResult>,
    config: DnsConfig,
}

impl MxResolver {
    /// Build a resolver from the system configuration
    ///
    /// # Errors
    /// If the system resolver configuration cannot be loaded
    pub fn new(config: DnsConfig) -> Result<Self, DnsError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(config.timeout_secs);

        let resolver = TokioResolver::builder(TokioConnectionProvider::default())?
            .with_options(opts)
            .build();

        Ok(Self {
            resolver,
            cache: DashMap::new(),
            config,
        })
    }

    /// Mail servers for `domain`, most preferred first
    ///
    /// # Errors
    /// - [`DnsError::DomainNotFound`] on NXDOMAIN
    /// - [`DnsError::NoMailServers`] if there is nothing to connect to
    /// - [`DnsError::LookupFailed`] for resolver trouble worth retrying
    pub async fn resolve(&self, domain: &str) -> Result<Arc<Vec<MailServer>>, DnsError> {
        if let Some(cached) = self.cache.get(domain)
            && cached.expires_at > Instant::now()
        {
            return Ok(Arc::clone(&cached.servers));
        }

        let (servers, ttl) = self.lookup(domain).await?;
        let servers = Arc::new(servers);
        let ttl = u64::from(ttl).clamp(
            self.config.min_cache_ttl_secs,
            self.config.max_cache_ttl_secs,
        );

        self.cache.insert(
            domain.to_string(),
            CachedResult {
                servers: Arc::clone(&servers),
                expires_at: Instant::now() + Duration::from_secs(ttl),
            },
        );

        debug!(
            "Resolved {} mail server(s) for {domain}, cached for {ttl}s",
            servers.len()
        );

        Ok(servers)
    }

    async fn lookup(&self, domain: &str) -> Result<(Vec<MailServer>, u32), DnsError> {
        match self.resolver.mx_lookup(domain).await {
            Ok(mx) => {
                let ttl = mx
                    .as_lookup()
                    .records()
                    .iter()
                    .map(hickory_resolver::proto::rr::Record::ttl)
                    .min()
                    .unwrap_or(300);

                let mut servers: Vec<MailServer> = mx
                    .iter()
                    .map(|mx| MailServer {
                        host: mx.exchange().to_utf8().trim_end_matches('.').to_string(),
                        preference: mx.preference(),
                    })
                    .collect();

                if servers.is_empty() {
                    return self.implicit_mx(domain).await;
                }

                servers.sort_by_key(|s| s.preference);
                Ok((servers, ttl))
            }
            Err(err) if err.is_nx_domain() => Err(DnsError::DomainNotFound(domain.to_string())),
            Err(err) if err.is_no_records_found() => self.implicit_mx(domain).await,
            Err(err) => {
                warn!("MX lookup failed for {domain}: {err}");
                Err(DnsError::LookupFailed(err))
            }
        }
    }

    /// No MX records: the domain itself is the mail server if it resolves
    async fn implicit_mx(&self, domain: &str) -> Result<(Vec<MailServer>, u32), DnsError> {
        match self.resolver.lookup_ip(domain).await {
            Ok(ips) if ips.iter().next().is_some() => {
                let ttl = ips
                    .as_lookup()
                    .records()
                    .iter()
                    .map(hickory_resolver::proto::rr::Record::ttl)
                    .min()
                    .unwrap_or(300);

                Ok((
                    vec![MailServer {
                        host: domain.to_string(),
                        preference: 0,
                    }],
                    ttl,
                ))
            }
            Ok(_) => Err(DnsError::NoMailServers(domain.to_string())),
            Err(err) if err.is_nx_domain() => Err(DnsError::DomainNotFound(domain.to_string())),
            Err(err) if err.is_no_records_found() => {
                Err(DnsError::NoMailServers(domain.to_string()))
            }
            Err(err) => Err(DnsError::LookupFailed(err)),
        }
    }
}
