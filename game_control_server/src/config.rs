//! Server configuration, environment-driven with logged fallbacks.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `GIG_HOST` | Bind address | `127.0.0.1` |
//! | `GIG_WS_PORT` | WebSocket listener port | `8330` |
//! | `GIG_HTTP_PORT` | Plain HTTP (health) listener port | `8331` |
//! | `GIG_POLL_INTERVAL_MS` | Object-store polling interval | `10000` |
//! | `GIG_BUCKET` | Object-store bucket holding invoice artifacts | *(must be set)* |
//! | `GIG_LOCAL_BUCKET_DIR` | Use a local directory as the bucket instead of S3 (development) | *(unset)* |
//! | `GIG_STORAGE_DIR` | Directory for processed invoice records | `./invoice_storage` |
//! | `GIG_MAX_RETRIES` | Scans before a registration expires, or `unlimited` | `unlimited` |
//! | `GIG_S3_ENDPOINT` | Custom S3-compatible endpoint (enables path-style addressing) | *(ambient AWS config)* |
//! | `GIG_S3_REGION` | Object-store region | *(ambient AWS config)* |
//! | `GIG_S3_ACCESS_KEY` / `GIG_S3_SECRET_KEY` | Static credentials | *(ambient AWS config)* |
//! | `GIG_GAME_OVER_URL` | External game-over sink | `http://127.0.0.1:8350/game-over` |
//! | `GIG_PROCESS_ORDER_URL` | External order sink | `http://127.0.0.1:8350/process-order` |
//! | `GIG_SINK_TIMEOUT_MS` | Timeout for outbound sink calls | `5000` |
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use gig_common::Secret;
use invoice_delivery_engine::{gateway::ObjectStoreConfig, types::MaxRetries};
use log::*;

use crate::integrations::SinkConfig;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_WS_PORT: u16 = 8330;
const DEFAULT_HTTP_PORT: u16 = 8331;
const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
const DEFAULT_STORAGE_DIR: &str = "./invoice_storage";
const DEFAULT_GAME_OVER_URL: &str = "http://127.0.0.1:8350/game-over";
const DEFAULT_PROCESS_ORDER_URL: &str = "http://127.0.0.1:8350/process-order";
const DEFAULT_SINK_TIMEOUT_MS: u64 = 5_000;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub ws_port: u16,
    pub http_port: u16,
    pub poll_interval_ms: u64,
    pub storage_dir: PathBuf,
    pub max_retries: MaxRetries,
    pub object_store: ObjectStoreConfig,
    /// When set, the polling engine watches this directory instead of an S3 bucket. Development convenience.
    pub local_bucket_dir: Option<PathBuf>,
    pub sinks: SinkConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ws_port: DEFAULT_WS_PORT,
            http_port: DEFAULT_HTTP_PORT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            max_retries: MaxRetries::Unlimited,
            object_store: ObjectStoreConfig::default(),
            local_bucket_dir: None,
            sinks: SinkConfig {
                game_over_url: DEFAULT_GAME_OVER_URL.to_string(),
                process_order_url: DEFAULT_PROCESS_ORDER_URL.to_string(),
                timeout: Duration::from_millis(DEFAULT_SINK_TIMEOUT_MS),
            },
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let host = env::var("GIG_HOST").ok().unwrap_or_else(|| DEFAULT_HOST.into());
        let ws_port = env_parsed("GIG_WS_PORT", DEFAULT_WS_PORT);
        let http_port = env_parsed("GIG_HTTP_PORT", DEFAULT_HTTP_PORT);
        let poll_interval_ms = env_parsed("GIG_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS);
        let storage_dir =
            env::var("GIG_STORAGE_DIR").map(PathBuf::from).ok().unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
        let max_retries = env_parsed("GIG_MAX_RETRIES", MaxRetries::Unlimited);
        let local_bucket_dir = env::var("GIG_LOCAL_BUCKET_DIR").ok().map(PathBuf::from);
        let bucket = env::var("GIG_BUCKET").ok().unwrap_or_else(|| {
            if local_bucket_dir.is_none() {
                error!("GIG_BUCKET is not set. Please set it to the bucket your invoice artifacts land in.");
            }
            String::default()
        });
        let object_store = ObjectStoreConfig {
            bucket,
            endpoint: env::var("GIG_S3_ENDPOINT").ok(),
            region: env::var("GIG_S3_REGION").ok(),
            access_key: env::var("GIG_S3_ACCESS_KEY").ok().map(Secret::new),
            secret_key: env::var("GIG_S3_SECRET_KEY").ok().map(Secret::new),
        };
        let sinks = SinkConfig {
            game_over_url: env::var("GIG_GAME_OVER_URL").ok().unwrap_or_else(|| DEFAULT_GAME_OVER_URL.into()),
            process_order_url: env::var("GIG_PROCESS_ORDER_URL")
                .ok()
                .unwrap_or_else(|| DEFAULT_PROCESS_ORDER_URL.into()),
            timeout: Duration::from_millis(env_parsed("GIG_SINK_TIMEOUT_MS", DEFAULT_SINK_TIMEOUT_MS)),
        };
        Self { host, ws_port, http_port, poll_interval_ms, storage_dir, max_retries, object_store, local_bucket_dir, sinks }
    }
}

fn env_parsed<T>(var: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|e| {
            error!("'{s}' is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}
