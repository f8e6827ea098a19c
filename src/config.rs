//! Server configuration module
//! Handles dynamic configuration parameters loaded from the environment

use crate::constants::{
    DEFAULT_HOST, DEFAULT_MAX_CHAT_DURATION_MS, DEFAULT_MAX_MESSAGE_LENGTH, DEFAULT_PORT,
    MAX_MESSAGE_LENGTH_LIMIT, MIN_MESSAGE_LENGTH_LIMIT,
};
use crate::error::{PairlinkError, Result};
use serde::Serialize;
use std::env;
use std::time::Duration;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Deployment environment label ("development" / "production")
    pub environment: String,
    /// Origins allowed on the admin surface; non-empty required in production
    pub allowed_origins: Vec<String>,
    /// Admin-surface rate limit window
    pub rate_limit_window_ms: u64,
    /// Admin-surface rate limit budget per window
    pub rate_limit_max_requests: u32,
    /// Maximum accepted chat message length, clamped to [1, 10000]
    pub max_message_length: usize,
    /// Absolute cap on chat room lifetime
    pub max_chat_duration: Duration,
    pub content_filter_enabled: bool,
    pub profanity_filter_strict: bool,
    /// ICE servers handed opaquely to clients
    pub stun_servers: Vec<String>,
    pub turn_servers: Vec<String>,
    pub log_level: String,
    pub log_path: Option<String>,
}

/// Client-safe subset of the configuration served on `/config`
#[derive(Debug, Clone, Serialize)]
pub struct ClientConfig {
    pub max_message_length: usize,
    pub max_chat_duration_ms: u64,
    pub chat_types: Vec<String>,
    pub ice_servers: Vec<IceServer>,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct IceServer {
    pub urls: String,
    pub kind: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = env::var("PAIRLINK_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env::var("PAIRLINK_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let environment =
            env::var("PAIRLINK_ENV").unwrap_or_else(|_| "development".to_string());

        let allowed_origins = env::var("PAIRLINK_ALLOWED_ORIGINS")
            .map(|v| split_list(&v))
            .unwrap_or_default();

        if environment == "production" && allowed_origins.is_empty() {
            return Err(PairlinkError::Config(
                "PAIRLINK_ALLOWED_ORIGINS must be a non-empty list in production".to_string(),
            ));
        }

        let rate_limit_window_ms = env::var("PAIRLINK_RATE_LIMIT_WINDOW_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60_000);

        let rate_limit_max_requests = env::var("PAIRLINK_RATE_LIMIT_MAX_REQUESTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        let max_message_length: usize = env::var("PAIRLINK_MAX_MESSAGE_LENGTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_MESSAGE_LENGTH)
            .clamp(MIN_MESSAGE_LENGTH_LIMIT, MAX_MESSAGE_LENGTH_LIMIT);

        let max_chat_duration_ms: u64 = env::var("PAIRLINK_MAX_CHAT_DURATION_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CHAT_DURATION_MS);

        let content_filter_enabled = env::var("PAIRLINK_CONTENT_FILTER")
            .map(|v| parse_bool(&v))
            .unwrap_or(true);

        let profanity_filter_strict = env::var("PAIRLINK_PROFANITY_STRICT")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        let stun_servers = env::var("PAIRLINK_STUN_SERVERS")
            .map(|v| split_list(&v))
            .unwrap_or_else(|_| vec!["stun:stun.l.google.com:19302".to_string()]);

        let turn_servers = env::var("PAIRLINK_TURN_SERVERS")
            .map(|v| split_list(&v))
            .unwrap_or_default();

        let log_level = env::var("PAIRLINK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_path = env::var("PAIRLINK_LOG_PATH").ok();

        Ok(Self {
            host,
            port,
            environment,
            allowed_origins,
            rate_limit_window_ms,
            rate_limit_max_requests,
            max_message_length,
            max_chat_duration: Duration::from_millis(max_chat_duration_ms),
            content_filter_enabled,
            profanity_filter_strict,
            stun_servers,
            turn_servers,
            log_level,
            log_path,
        })
    }

    /// Fixed configuration for test suites; never reads the environment.
    pub fn for_testing() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            environment: "development".to_string(),
            allowed_origins: Vec::new(),
            rate_limit_window_ms: 60_000,
            rate_limit_max_requests: 100,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            max_chat_duration: Duration::from_millis(DEFAULT_MAX_CHAT_DURATION_MS),
            content_filter_enabled: true,
            profanity_filter_strict: true,
            stun_servers: vec!["stun:stun.test:3478".to_string()],
            turn_servers: Vec::new(),
            log_level: "debug".to_string(),
            log_path: None,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Subset of the configuration that is safe to hand to clients.
    pub fn client_view(&self) -> ClientConfig {
        let mut ice_servers: Vec<IceServer> = self
            .stun_servers
            .iter()
            .map(|s| IceServer {
                urls: s.clone(),
                kind: "stun".to_string(),
            })
            .collect();
        ice_servers.extend(self.turn_servers.iter().map(|s| IceServer {
            urls: s.clone(),
            kind: "turn".to_string(),
        }));

        ClientConfig {
            max_message_length: self.max_message_length,
            max_chat_duration_ms: self.max_chat_duration.as_millis() as u64,
            chat_types: vec!["text".to_string(), "video".to_string()],
            ice_servers,
            rate_limit_window_ms: self.rate_limit_window_ms,
            rate_limit_max_requests: self.rate_limit_max_requests,
        }
    }
}

fn parse_bool(v: &str) -> bool {
    let v = v.to_lowercase();
    v == "true" || v == "1" || v == "yes"
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
