//! Relay configuration from command-line flags with environment fallbacks.

use crate::error::ConfigError;
use crate::socket::DEFAULT_WS_URL;
use clap::Parser;
use reqwest::Url;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WEBHOOK_URL: &str = "http://localhost:5678/webhook/whatsapp";
pub const DEFAULT_SERVICE_NAME: &str = "WhatsApp Relay";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "whatsapp-relay",
    version,
    about = "Relay one WhatsApp session over HTTP and forward inbound messages to a webhook"
)]
pub struct RelayConfig {
    /// Endpoint that receives every inbound message as a JSON POST.
    #[arg(long, env = "WEBHOOK_URL", default_value = DEFAULT_WEBHOOK_URL, value_parser = parse_webhook_url)]
    pub webhook_url: Url,

    /// IP address the HTTP server binds to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory holding the persisted session credentials.
    #[arg(long, env = "AUTH_DIR", default_value = "auth_info")]
    pub auth_dir: PathBuf,

    /// Delay before reopening a dropped session.
    #[arg(long, env = "RECONNECT_DELAY_SECS", default_value_t = 3)]
    pub reconnect_delay_secs: u64,

    /// Per-request webhook timeout; 0 disables it.
    #[arg(long, env = "WEBHOOK_TIMEOUT_SECS", default_value_t = 10)]
    pub webhook_timeout_secs: u64,

    #[arg(long, env = "WA_WS_URL", default_value = DEFAULT_WS_URL)]
    pub ws_url: String,

    /// Name reported by `GET /`.
    #[arg(long, env = "SERVICE_NAME", default_value = DEFAULT_SERVICE_NAME)]
    pub service_name: String,
}

impl RelayConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn webhook_timeout(&self) -> Option<Duration> {
        (self.webhook_timeout_secs > 0).then(|| Duration::from_secs(self.webhook_timeout_secs))
    }
}

/// Accept only absolute http(s) URLs.
pub fn parse_webhook_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidWebhookUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(invalid("scheme must be http or https")),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(url)
}
