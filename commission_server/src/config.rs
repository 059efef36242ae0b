use std::{env, time::Duration};

use acp_common::{helpers::parse_boolean_flag, Money, Secret};
use log::*;

const DEFAULT_ACP_HOST: &str = "127.0.0.1";
const DEFAULT_ACP_PORT: u16 = 8380;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_WEBHOOK_RETRY_INTERVAL: Duration = Duration::from_secs(10);
/// Minimum withdrawal amount in major units.
const DEFAULT_MIN_WITHDRAWAL: i64 = 100;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// How often the release sweep moves due commissions to `Available`.
    pub sweep_interval: Duration,
    /// How often the webhook retry pump re-processes due events.
    pub webhook_retry_interval: Duration,
    /// The smallest withdrawal an agent may request.
    pub min_withdrawal: Money,
    pub webhook: WebhookConfig,
}

#[derive(Clone, Debug, Default)]
pub struct WebhookConfig {
    /// Shared secret for the payment provider's HMAC signatures.
    pub hmac_secret: Secret<String>,
    /// When false, signature checks are skipped entirely. Only ever disable this in local development.
    pub hmac_checks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ACP_HOST.to_string(),
            port: DEFAULT_ACP_PORT,
            database_url: String::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            webhook_retry_interval: DEFAULT_WEBHOOK_RETRY_INTERVAL,
            min_withdrawal: Money::from_major(DEFAULT_MIN_WITHDRAWAL),
            webhook: WebhookConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("ACP_HOST").ok().unwrap_or_else(|| DEFAULT_ACP_HOST.into());
        let port = env::var("ACP_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for ACP_PORT. {e} Using the default, {DEFAULT_ACP_PORT}, instead."
                    );
                    DEFAULT_ACP_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_ACP_PORT);
        let database_url = env::var("ACP_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ ACP_DATABASE_URL is not set. Please set it to the URL for the ledger database.");
            String::default()
        });
        let sweep_interval = interval_from_env("ACP_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL);
        let webhook_retry_interval = interval_from_env("ACP_WEBHOOK_RETRY_INTERVAL_SECS", DEFAULT_WEBHOOK_RETRY_INTERVAL);
        let min_withdrawal = env::var("ACP_MIN_WITHDRAWAL")
            .ok()
            .and_then(|s| {
                s.parse::<i64>()
                    .map_err(|e| {
                        error!(
                            "🪛️ {s} is not a valid amount for ACP_MIN_WITHDRAWAL. {e} Using the default, \
                             {DEFAULT_MIN_WITHDRAWAL}, instead."
                        );
                    })
                    .ok()
            })
            .map(Money::from_major)
            .unwrap_or_else(|| Money::from_major(DEFAULT_MIN_WITHDRAWAL));
        let webhook = WebhookConfig::from_env_or_default();
        Self { host, port, database_url, sweep_interval, webhook_retry_interval, min_withdrawal, webhook }
    }
}

impl WebhookConfig {
    pub fn from_env_or_default() -> Self {
        let hmac_secret = env::var("ACP_WEBHOOK_HMAC_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ ACP_WEBHOOK_HMAC_SECRET is not set. Please set it to the shared secret for your payment \
                 provider's webhook signatures."
            );
            String::default()
        });
        let hmac_secret = Secret::new(hmac_secret);
        let hmac_checks = parse_boolean_flag(env::var("ACP_WEBHOOK_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ Webhook HMAC checks are disabled. Anyone can post payment notifications to this server.");
        }
        Self { hmac_secret, hmac_checks }
    }
}

fn interval_from_env(var: &str, default: Duration) -> Duration {
    env::var(var)
        .ok()
        .and_then(|s| {
            s.parse::<u64>()
                .map_err(|e| {
                    error!("🪛️ {s} is not a valid number of seconds for {var}. {e} Using {}s instead.", default.as_secs());
                })
                .ok()
        })
        .map(Duration::from_secs)
        .unwrap_or(default)
}
