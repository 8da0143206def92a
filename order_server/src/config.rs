use std::{env, time::Duration};

use log::*;
use order_engine::{config::env_or_default, EngineConfig};

const DEFAULT_OE_HOST: &str = "127.0.0.1";
const DEFAULT_OE_PORT: u16 = 8360;
const DEFAULT_EXPIRY_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How often the expiry worker looks for unpaid orders that have timed out.
    pub expiry_interval: Duration,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OE_HOST.to_string(),
            port: DEFAULT_OE_PORT,
            expiry_interval: Duration::from_secs(DEFAULT_EXPIRY_INTERVAL_SECS),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("OE_HOST").ok().unwrap_or_else(|| {
            info!("🪛️ OE_HOST is not set. Listening on {DEFAULT_OE_HOST}.");
            DEFAULT_OE_HOST.into()
        });
        let port = env_or_default("OE_PORT", DEFAULT_OE_PORT);
        let expiry_interval = match env_or_default("OE_EXPIRY_INTERVAL", DEFAULT_EXPIRY_INTERVAL_SECS) {
            0 => {
                warn!("🪛️ OE_EXPIRY_INTERVAL cannot be zero. Using {DEFAULT_EXPIRY_INTERVAL_SECS}s.");
                Duration::from_secs(DEFAULT_EXPIRY_INTERVAL_SECS)
            },
            secs => Duration::from_secs(secs),
        };
        let engine = EngineConfig::from_env_or_default();
        Self { host, port, expiry_interval, engine }
    }
}
