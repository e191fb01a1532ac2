use anyhow::Result;
use std::env;
use std::net::SocketAddr;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub database_path: String,
    /// Records kept in the fast store after hydrating a session from durable history.
    pub load_trim_limit: usize,
    /// Records kept in the fast store while a session is live. Looser than the
    /// load window: active sessions trade memory for context richness.
    pub active_trim_limit: usize,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,
    pub llm_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let llm_base_url = env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8081".into());

        Ok(Self {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            api_port: env::var("API_PORT").unwrap_or_else(|_| "8000".into()).parse()?,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./data/chat_history.db".into()),
            load_trim_limit: env::var("LOAD_TRIM_LIMIT")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            active_trim_limit: env::var("ACTIVE_TRIM_LIMIT")
                .unwrap_or_else(|_| "20".into())
                .parse()?,
            llm_base_url,
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "local-llm".into()),
            llm_max_tokens: env::var("LLM_MAX_TOKENS")
                .unwrap_or_else(|_| "2000".into())
                .parse()?,
            llm_temperature: env::var("LLM_TEMPERATURE")
                .unwrap_or_else(|_| "0.7".into())
                .parse()?,
            llm_timeout_seconds: env::var("LLM_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "600".into())
                .parse()?,
            request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "600".into())
                .parse()?,
        })
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- Database Path: {}", self.database_path);
        info!("- Load Trim Limit: {}", self.load_trim_limit);
        info!("- Active Trim Limit: {}", self.active_trim_limit);
        info!("- LLM Backend: {}", self.llm_base_url);
        info!("- LLM Model: {}", self.llm_model);
        info!("- Request Timeout: {}s", self.request_timeout_seconds);
    }

    pub fn api_addr(&self) -> SocketAddr {
        format!("{}:{}", self.api_host, self.api_port).parse().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper function to create a test Config with default values
    fn create_test_config() -> Config {
        Config {
            api_host: "127.0.0.1".to_string(),
            api_port: 8000,
            database_path: "./data/chat_history.db".to_string(),
            load_trim_limit: 10,
            active_trim_limit: 20,
            llm_base_url: "http://127.0.0.1:8081".to_string(),
            llm_model: "local-llm".to_string(),
            llm_max_tokens: 2000,
            llm_temperature: 0.7,
            llm_timeout_seconds: 600,
            request_timeout_seconds: 600,
        }
    }

    #[test]
    fn test_config_creation_with_default_values() {
        let config = create_test_config();

        assert_eq!(config.api_port, 8000);
        assert_eq!(config.load_trim_limit, 10);
        assert_eq!(config.active_trim_limit, 20);
    }

    #[test]
    fn test_api_addr_parsing() {
        let config = create_test_config();
        let addr = config.api_addr();

        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8000);
    }

    #[test]
    fn test_api_addr_with_zero_address() {
        let mut config = create_test_config();
        config.api_host = "0.0.0.0".to_string();
        config.api_port = 5000;

        let addr = config.api_addr();
        assert_eq!(addr.port(), 5000);
        assert_eq!(addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_active_window_looser_than_load_window() {
        let config = create_test_config();

        // The live-session buffer is intentionally larger than the rehydration window
        assert!(config.active_trim_limit >= config.load_trim_limit);
    }

    #[test]
    fn test_trim_limits_are_positive() {
        let config = create_test_config();

        assert!(config.load_trim_limit > 0);
        assert!(config.active_trim_limit > 0);
    }

    #[test]
    fn test_llm_backend_url_format() {
        let config = create_test_config();

        assert!(config.llm_base_url.starts_with("http://") || config.llm_base_url.starts_with("https://"));
    }

    #[test]
    fn test_timeouts_are_positive() {
        let config = create_test_config();

        assert!(config.llm_timeout_seconds > 0);
        assert!(config.request_timeout_seconds > 0);
    }

    #[test]
    fn test_config_clone() {
        let config1 = create_test_config();
        let config2 = config1.clone();

        assert_eq!(config1.api_host, config2.api_host);
        assert_eq!(config1.load_trim_limit, config2.load_trim_limit);
    }
}
