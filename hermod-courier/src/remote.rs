use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use hermod_common::{address, outgoing};
use serde::Deserialize;
use tokio::net::TcpStream;

use crate::{
    Courier, DeliveryError, FailurePolicy,
    dns::{DnsConfig, MailServer, MxResolver},
    error::{PermanentError, SystemError},
    smtp::{Response, SmtpClient},
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteConfig {
    /// Name we announce in EHLO / HELO
    #[serde(default = "default_helo_domain")]
    pub helo_domain: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Relay everything through this host instead of looking up MX records
    #[serde(default)]
    pub smarthost: Option<String>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Limit on waiting for any single reply (default: 300)
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    #[serde(default)]
    pub dns: DnsConfig,
}

fn default_helo_domain() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    25
}

const fn default_connect_timeout_secs() -> u64 {
    60
}

const fn default_command_timeout_secs() -> u64 {
    300
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            helo_domain: default_helo_domain(),
            port: default_port(),
            smarthost: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            dns: DnsConfig::default(),
        }
    }
}

/// Relays mail for remote domains over SMTP
///
/// Mail servers are tried in MX preference order. A temporary failure moves
/// on to the next server; a permanent one ends the attempt since every MX
/// for a domain is expected to give the same verdict.
#[derive(Debug)]
pub struct SmtpCourier {
    config: RemoteConfig,
    policy: Arc<FailurePolicy>,
    resolver: Option<MxResolver>,
}

impl SmtpCourier {
    /// # Errors
    /// If MX lookups are needed and the system resolver cannot be set up
    pub fn new(config: RemoteConfig, policy: Arc<FailurePolicy>) -> Result<Self, DeliveryError> {
        let resolver = if config.smarthost.is_some() {
            None
        } else {
            Some(
                MxResolver::new(config.dns.clone())
                    .map_err(|e| SystemError::Configuration(e.to_string()))?,
            )
        };

        Ok(Self {
            config,
            policy,
            resolver,
        })
    }

    async fn servers(&self, domain: &str) -> Result<Arc<Vec<MailServer>>, DeliveryError> {
        if let Some(host) = &self.config.smarthost {
            return Ok(Arc::new(vec![MailServer {
                host: host.clone(),
                preference: 0,
            }]));
        }

        match &self.resolver {
            Some(resolver) => Ok(resolver.resolve(domain).await?),
            None => Err(SystemError::Configuration("no resolver available".to_string()).into()),
        }
    }

    /// Check a reply against the codes this stage allows
    fn expect(&self, response: &Response, accepted: &[u16]) -> Result<(), DeliveryError> {
        if accepted.contains(&response.code) {
            Ok(())
        } else {
            Err(self.policy.reply(response.code, &response.message()))
        }
    }

    async fn transaction(
        &self,
        server: &MailServer,
        from: &str,
        to: &str,
        data: &[u8],
    ) -> Result<(), DeliveryError> {
        let mut client = SmtpClient::<TcpStream>::connect(
            &server.host,
            self.config.port,
            Duration::from_secs(self.config.connect_timeout_secs),
            Duration::from_secs(self.config.command_timeout_secs),
        )
        .await?;

        self.expect(&client.greeting().await?, &[220])?;

        let ehlo = client.ehlo(&self.config.helo_domain).await?;
        if !ehlo.is_success() {
            let helo = client.helo(&self.config.helo_domain).await?;
            self.expect(&helo, &[250])?;
        }

        self.expect(&client.mail_from(from).await?, &[250])?;
        self.expect(&client.rcpt_to(to).await?, &[250, 251])?;
        self.expect(&client.data().await?, &[354])?;
        self.expect(&client.send_data(data).await?, &[250])?;

        // The message is accepted at this point
        if let Err(err) = client.quit().await {
            tracing::debug!(host = %server.host, "QUIT failed after delivery: {err}");
        }

        Ok(())
    }
}

#[async_trait]
impl Courier for SmtpCourier {
    #[tracing::instrument(level = "debug", skip(self, data), fields(size = data.len()))]
    async fn deliver(&self, from: &str, to: &str, data: &[u8]) -> Result<(), DeliveryError> {
        let domain = address::domain(to);
        if domain.is_empty() {
            return Err(PermanentError::InvalidRecipient(format!("{to} has no domain")).into());
        }

        let servers = self.servers(domain).await?;
        let mut last_error = None;

        for server in servers.iter() {
            outgoing!(
                level = DEBUG,
                "Relaying message for {to} via {}:{}",
                server.host,
                self.config.port
            );

            match self.transaction(server, from, to, data).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_permanent() => return Err(err),
                Err(err) => {
                    tracing::debug!(host = %server.host, "Delivery attempt failed: {err}");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PermanentError::NoMailServers(domain.to_string()).into()))
    }
}
