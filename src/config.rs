//! Environment variable based configuration

use std::env;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    #[allow(dead_code)]
    pub cors_origins: Vec<String>,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    pub log_level: String,
}

/// Session token configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token_secret: String,
}

/// Durable store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Bound on any single store call; a timeout counts as a failed write.
    pub timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .unwrap_or(3001),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            auth: AuthConfig {
                token_secret: env::var("JWT_SECRET")
                    .unwrap_or_else(|_| "itj-travel-dev-secret".to_string()),
            },
            store: StoreConfig {
                timeout_ms: env::var("STORE_TIMEOUT_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .unwrap_or(5000),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}
