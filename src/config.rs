//! Configuration types for llm-bridge.
//!
//! Config is loaded once at startup from a TOML file, overlaid with a handful
//! of environment variables, and validated before the server opens its port.
//! Nothing here changes after startup.
//!
//! Secrets never live in the file: `[openai]` names the environment variables
//! that hold the API key and organization id, and [`OpenAIConfig::api_key`]
//! resolves them.
//!
//! # Example
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 5050
//!
//! [openai]
//! api_key_env   = "OPENAI_API_KEY"
//! timeout_secs  = 120
//! default_model = "gpt-5-nano"
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub openai: OpenAIConfig,
}

impl Config {
    /// Load the config file at `path`, falling back to defaults when the file
    /// does not exist, then apply environment overrides and validate.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).context("parsing config TOML")?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the deployment knobs that are conventionally set through the
    /// environment. `lookup` is injected so tests need not touch process env.
    fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = lookup("BRIDGE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("BRIDGE_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("BRIDGE_PORT is not a valid port: {port}"))?;
        }
        if let Some(max) = lookup("MAX_CONTENT_LENGTH") {
            self.server.max_content_length = max
                .trim()
                .parse()
                .with_context(|| format!("MAX_CONTENT_LENGTH is not a byte count: {max}"))?;
        }
        if let Some(timeout) = lookup("REQUEST_TIMEOUT") {
            self.openai.timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| format!("REQUEST_TIMEOUT is not a number of seconds: {timeout}"))?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.server.log_level = level.trim().to_lowercase();
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.server.port != 0, "server.port must be non-zero");
        anyhow::ensure!(
            self.server.max_content_length > 0,
            "server.max_content_length must be greater than zero"
        );
        anyhow::ensure!(
            self.server.log_max_files > 0,
            "server.log_max_files must be at least 1"
        );
        anyhow::ensure!(
            self.openai.timeout_secs.is_finite() && self.openai.timeout_secs > 0.0,
            "openai.timeout_secs must be a positive number, got {}",
            self.openai.timeout_secs
        );
        anyhow::ensure!(
            self.openai.default_max_tokens > 0,
            "openai.default_max_tokens must be greater than zero"
        );
        anyhow::ensure!(
            !self.openai.default_model.trim().is_empty(),
            "openai.default_model must not be empty"
        );
        anyhow::ensure!(
            self.openai.base_url.starts_with("http://")
                || self.openai.base_url.starts_with("https://"),
            "openai.base_url must be an http(s) URL, got `{}`",
            self.openai.base_url
        );
        Ok(())
    }
}

/// Listener and logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Interface to bind (default: `127.0.0.1`).
    #[serde(default = "defaults::host")]
    pub host: String,

    /// Listen port (default: 5050).
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Largest accepted request body in bytes (default: 50 MiB).
    #[serde(default = "defaults::max_content_length")]
    pub max_content_length: usize,

    /// Log level used when `RUST_LOG` is unset (default: `info`).
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    /// Directory for the rotating log file (default: `logs`).
    #[serde(default = "defaults::log_dir")]
    pub log_dir: String,

    /// Number of rotated log files kept on disk (default: 5).
    #[serde(default = "defaults::log_max_files")]
    pub log_max_files: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
            max_content_length: defaults::max_content_length(),
            log_level: defaults::log_level(),
            log_dir: defaults::log_dir(),
            log_max_files: defaults::log_max_files(),
        }
    }
}

/// Settings for the completion provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAIConfig {
    /// Base URL without the `/v1` suffix (added by the client).
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "defaults::api_key_env")]
    pub api_key_env: String,

    /// Environment variable holding the organization id. Optional at runtime.
    #[serde(default = "defaults::org_id_env")]
    pub org_id_env: String,

    /// Timeout for a single provider call, in seconds (default: 120).
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: f64,

    /// Model used when a request does not name one.
    #[serde(default = "defaults::default_model")]
    pub default_model: String,

    /// Output token ceiling used when a request does not set `max_tokens`.
    #[serde(default = "defaults::default_max_tokens")]
    pub default_max_tokens: u32,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            api_key_env: defaults::api_key_env(),
            org_id_env: defaults::org_id_env(),
            timeout_secs: defaults::timeout_secs(),
            default_model: defaults::default_model(),
            default_max_tokens: defaults::default_max_tokens(),
        }
    }
}

impl OpenAIConfig {
    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        non_empty_env(&self.api_key_env)
    }

    /// Resolve the organization id from the configured environment variable.
    pub fn org_id(&self) -> Option<String> {
        non_empty_env(&self.org_id_env)
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

mod defaults {
    pub fn host() -> String { "127.0.0.1".into() }
    pub fn port() -> u16 { 5050 }
    pub fn max_content_length() -> usize { 50 * 1024 * 1024 }
    pub fn log_level() -> String { "info".into() }
    pub fn log_dir() -> String { "logs".into() }
    pub fn log_max_files() -> usize { 5 }
    pub fn base_url() -> String { "https://api.openai.com".into() }
    pub fn api_key_env() -> String { "OPENAI_API_KEY".into() }
    pub fn org_id_env() -> String { "OPENAI_ORG_ID".into() }
    pub fn timeout_secs() -> f64 { 120.0 }
    pub fn default_model() -> String { "gpt-5-nano".into() }
    pub fn default_max_tokens() -> u32 { 4096 }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    // -----------------------------------------------------------------------
    // Parsing & defaults
    // -----------------------------------------------------------------------

    #[test]
    fn parse_example_config() {
        let content = include_str!("../config.example.toml");
        let config: Config = toml::from_str(content).expect("example config should parse");
        config.validate().expect("example config should be valid");
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").expect("empty config should parse");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5050);
        assert_eq!(config.server.max_content_length, 52_428_800);
        assert_eq!(config.openai.timeout_secs, 120.0);
        assert_eq!(config.openai.default_model, "gpt-5-nano");
        assert_eq!(config.openai.default_max_tokens, 4096);
        config.validate().expect("defaults should be valid");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [openai]
            default_model = "gpt-4o-mini"
            "#,
        )
        .unwrap();
        assert_eq!(config.openai.default_model, "gpt-4o-mini");
        assert_eq!(config.openai.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.server.port, 5050);
    }

    #[test]
    fn load_falls_back_to_defaults_when_file_is_missing() {
        let config = Config::load(Path::new("/definitely/not/here/bridge.toml"))
            .expect("missing file should mean defaults");
        assert!(!config.openai.default_model.is_empty());
    }

    // -----------------------------------------------------------------------
    // Environment overrides
    // -----------------------------------------------------------------------

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[
                ("BRIDGE_HOST", "0.0.0.0"),
                ("BRIDGE_PORT", "9000"),
                ("MAX_CONTENT_LENGTH", "1024"),
                ("REQUEST_TIMEOUT", "2.5"),
                ("LOG_LEVEL", "DEBUG"),
            ]))
            .unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_content_length, 1024);
        assert_eq!(config.openai.timeout_secs, 2.5);
        assert_eq!(config.server.log_level, "debug");
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[("BRIDGE_PORT", "  ")]))
            .unwrap();
        assert_eq!(config.server.port, 5050);
    }

    #[test]
    fn unparseable_port_override_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(env(&[("BRIDGE_PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("BRIDGE_PORT"), "got: {err}");
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn validation_rejects_zero_timeout() {
        let mut config = Config::default();
        config.openai.timeout_secs = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_body_limit() {
        let mut config = Config::default();
        config.server.max_content_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_non_http_base_url() {
        let mut config = Config::default();
        config.openai.base_url = "api.openai.com".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_blank_default_model() {
        let mut config = Config::default();
        config.openai.default_model = " ".into();
        assert!(config.validate().is_err());
    }

    // -----------------------------------------------------------------------
    // Secret resolution
    // -----------------------------------------------------------------------

    #[test]
    fn api_key_resolves_from_named_env_var() {
        let var = "LLM_BRIDGE_TEST_KEY_RESOLVE_123";
        // SAFETY: unique var name; no other test reads it.
        unsafe { std::env::set_var(var, "sk-test-resolved") };
        let cfg = OpenAIConfig {
            api_key_env: var.into(),
            ..OpenAIConfig::default()
        };
        assert_eq!(cfg.api_key().as_deref(), Some("sk-test-resolved"));
        unsafe { std::env::remove_var(var) };
    }

    #[test]
    fn empty_api_key_counts_as_absent() {
        let var = "LLM_BRIDGE_TEST_KEY_EMPTY_456";
        // SAFETY: unique var name; no other test reads it.
        unsafe { std::env::set_var(var, "") };
        let cfg = OpenAIConfig {
            api_key_env: var.into(),
            ..OpenAIConfig::default()
        };
        assert!(cfg.api_key().is_none());
        unsafe { std::env::remove_var(var) };
    }

    #[test]
    fn org_id_is_none_when_env_var_is_unset() {
        let cfg = OpenAIConfig {
            org_id_env: "LLM_BRIDGE_TEST_DEFINITELY_NOT_SET_XYZ_99".into(),
            ..OpenAIConfig::default()
        };
        assert!(cfg.org_id().is_none());
    }
}
