use cinema_shared::pii::Masked;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
    pub tickets: TicketsConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_price")]
    pub default_price: f64,
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            default_price: default_price(),
            pending_ttl_seconds: default_pending_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_currency() -> String { "usd".to_string() }
fn default_price() -> f64 { 15.0 }
fn default_pending_ttl() -> u64 { 900 }
fn default_sweep_interval() -> u64 { 60 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HS256 shared secret. Ignored when `public_key_pem` is set.
    #[serde(default)]
    pub jwt_secret: Option<Masked<String>>,
    /// RS256 realm public key, as published by the identity provider.
    #[serde(default)]
    pub public_key_pem: Option<String>,
    /// Client whose `resource_access` roles are honoured alongside realm roles.
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_requests_topic")]
    pub payment_requests_topic: String,
    #[serde(default = "default_events_topic")]
    pub payment_events_topic: String,
    #[serde(default = "default_worker_group")]
    pub payment_worker_group: String,
    #[serde(default = "default_reconciler_group")]
    pub reconciler_group: String,
    #[serde(default = "default_ticket_group")]
    pub ticket_group: String,
    #[serde(default = "default_backoff")]
    pub reconnect_backoff_seconds: u64,
}

fn default_requests_topic() -> String { "payment_requests".to_string() }
fn default_events_topic() -> String { "payment_events".to_string() }
fn default_worker_group() -> String { "payment_workers".to_string() }
fn default_reconciler_group() -> String { "q_movies_payment_updates".to_string() }
fn default_ticket_group() -> String { "q_tickets_generation".to_string() }
fn default_backoff() -> u64 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct TicketsConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    /// Charges above this many minor units are declined by the simulated processor.
    #[serde(default = "default_decline_over")]
    pub decline_over_amount: i64,
    /// Unpublished outcomes a worker keeps for redelivery.
    #[serde(default = "default_ledger_capacity")]
    pub ledger_capacity: usize,
    #[serde(default = "default_ledger_ttl")]
    pub ledger_ttl_seconds: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            decline_over_amount: default_decline_over(),
            ledger_capacity: default_ledger_capacity(),
            ledger_ttl_seconds: default_ledger_ttl(),
        }
    }
}

fn default_decline_over() -> i64 { 100_000 }
fn default_ledger_capacity() -> usize { 10_000 }
fn default_ledger_ttl() -> u64 { 3600 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `CINEMA__KAFKA__BROKERS=broker:9092`
            .add_source(config::Environment::with_prefix("CINEMA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
