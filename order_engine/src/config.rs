use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use shop_common::{helpers::parse_boolean_flag, Secret};

use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/order_engine.db";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_NODE_ID: u16 = 1;
/// Fewer attempts than this and ordinary contention starts to leak out as errors.
pub const MIN_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10;
pub const DEFAULT_CHECKOUT_LOCK_TTL_MS: u64 = 5_000;
pub const DEFAULT_UNPAID_ORDER_TIMEOUT_MINS: i64 = 30;
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Everything the engine needs to know at start-up. Built once, then handed to the API objects.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    /// Distinguishes engine instances in generated order numbers.
    pub node_id: u16,
    pub retry: RetryPolicy,
    /// How long the per-user checkout lock is held at most. Must comfortably exceed the time taken to place an order.
    pub checkout_lock_ttl: Duration,
    /// Pending orders older than this are cancelled by the expiry worker.
    pub unpaid_order_timeout: chrono::Duration,
    /// Shared secret for gateway callback signatures.
    pub gateway_secret: Secret<String>,
    /// Only ever disable this in tests.
    pub gateway_signature_checks: bool,
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            node_id: DEFAULT_NODE_ID,
            retry: RetryPolicy::default(),
            checkout_lock_ttl: Duration::from_millis(DEFAULT_CHECKOUT_LOCK_TTL_MS),
            unpaid_order_timeout: chrono::Duration::minutes(DEFAULT_UNPAID_ORDER_TIMEOUT_MINS),
            gateway_secret: Secret::default(),
            gateway_signature_checks: true,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("OE_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ OE_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let db_max_connections = env_or_default("OE_DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS);
        let node_id = env_or_default("OE_NODE_ID", DEFAULT_NODE_ID);
        let max_attempts = env_or_default("OE_RETRY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS);
        let max_attempts = if max_attempts < MIN_RETRY_ATTEMPTS {
            warn!("🪛️ OE_RETRY_MAX_ATTEMPTS must be at least {MIN_RETRY_ATTEMPTS}. Using {MIN_RETRY_ATTEMPTS}.");
            MIN_RETRY_ATTEMPTS
        } else {
            max_attempts
        };
        let base_delay = env_or_default("OE_RETRY_BASE_DELAY_MS", DEFAULT_RETRY_BASE_DELAY_MS);
        let max_delay = env_or_default("OE_RETRY_MAX_DELAY_MS", DEFAULT_RETRY_MAX_DELAY_MS);
        let retry = RetryPolicy::new(max_attempts, Duration::from_millis(base_delay), Duration::from_millis(max_delay));
        let checkout_lock_ttl =
            Duration::from_millis(env_or_default("OE_CHECKOUT_LOCK_TTL_MS", DEFAULT_CHECKOUT_LOCK_TTL_MS));
        let unpaid_order_timeout =
            chrono::Duration::minutes(env_or_default("OE_UNPAID_ORDER_TIMEOUT", DEFAULT_UNPAID_ORDER_TIMEOUT_MINS));
        let gateway_secret = env::var("OE_GATEWAY_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ OE_GATEWAY_SECRET is not set. Payment callbacks cannot be verified until it is.");
            String::default()
        });
        let gateway_signature_checks = parse_boolean_flag(env::var("OE_GATEWAY_SIGNATURE_CHECKS").ok(), true);
        if !gateway_signature_checks {
            warn!("🚨️ Gateway signature checks are DISABLED. Anyone can mark orders as paid. Never do this in production.");
        }
        let event_buffer_size = env_or_default("OE_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE);
        Self {
            database_url,
            db_max_connections,
            node_id,
            retry,
            checkout_lock_ttl,
            unpaid_order_timeout,
            gateway_secret: Secret::new(gateway_secret),
            gateway_signature_checks,
            event_buffer_size,
        }
    }
}

/// Reads and parses `name`, logging and falling back to `default` if it is missing or malformed.
pub fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            info!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        env::set_var("OE_TEST_CONFIG_PORT", "not-a-number");
        assert_eq!(env_or_default("OE_TEST_CONFIG_PORT", 8360u16), 8360);
        env::set_var("OE_TEST_CONFIG_PORT", " 9000 ");
        assert_eq!(env_or_default("OE_TEST_CONFIG_PORT", 8360u16), 9000);
        assert_eq!(env_or_default("OE_TEST_CONFIG_UNSET", 7u32), 7);
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert!(config.retry.max_attempts() >= MIN_RETRY_ATTEMPTS);
        assert!(config.gateway_signature_checks);
        assert_eq!(config.unpaid_order_timeout, chrono::Duration::minutes(30));
    }
}
