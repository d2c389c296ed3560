//! Configuration management for Suikou
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, SuikouError};
use crate::providers::GenerationOptions;
use crate::stream::WritePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for Suikou
///
/// Holds the provider selection, generation options, the session store
/// backend, streaming behavior, and the HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider configuration (Ollama, remote server, command)
    pub provider: ProviderConfig,
    /// Options sent with every generation request
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Session store backend
    #[serde(default)]
    pub store: StoreConfig,
    /// Streaming write behavior
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Provider configuration
///
/// Specifies which AI provider to use and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider to use
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Remote proofreading server configuration
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Local command configuration
    #[serde(default)]
    pub command: CommandConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model to use for Ollama
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:latest".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
        }
    }
}

/// Remote proofreading server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the server (`/chat` and `/health` are appended)
    #[serde(default = "default_remote_url")]
    pub base_url: String,
}

fn default_remote_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
        }
    }
}

/// Local command provider configuration
///
/// The program receives the rendered prompt on stdin and answers on
/// stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program to run
    #[serde(default = "default_command_program")]
    pub program: String,

    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,

    /// Maximum stdout size accepted from the program
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_command_program() -> String {
    "claude".to_string()
}

fn default_max_output_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: default_command_program(),
            args: Vec::new(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

/// Generation request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Timeout for one generation, first byte to last delta (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Request incremental deltas from providers that support them
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

/// Upper bound for `generation.timeout_seconds` (one day)
pub const MAX_TIMEOUT_SECONDS: u64 = 24 * 60 * 60;

fn default_timeout() -> u64 {
    60
}

fn default_stream() -> bool {
    true
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
            stream: default_stream(),
        }
    }
}

impl GenerationConfig {
    /// Options passed to `Provider::generate`
    pub fn options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: self.stream,
        }
    }

    /// Generation timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Session store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Durable `sled` database
    #[default]
    Sled,
    /// Process memory only
    Memory,
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Backend to use
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database path for the durable backend (defaults to the data dir)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Streaming write configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamingConfig {
    /// Minimum interval between intermediate snapshot writes (0 = every delta)
    #[serde(default)]
    pub min_write_interval_ms: u64,
}

impl StreamingConfig {
    /// Write policy for the streaming accumulator
    pub fn write_policy(&self) -> WritePolicy {
        WritePolicy::throttled(Duration::from_millis(self.min_write_interval_ms))
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            provider: ProviderConfig {
                provider_type: "ollama".to_string(),
                ollama: OllamaConfig::default(),
                remote: RemoteConfig::default(),
                command: CommandConfig::default(),
            },
            generation: GenerationConfig::default(),
            store: StoreConfig::default(),
            streaming: StreamingConfig::default(),
            server: ServerConfig::default(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SuikouError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| SuikouError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        // Provider overrides
        if let Ok(provider_type) = std::env::var("SUIKOU_PROVIDER") {
            self.provider.provider_type = provider_type;
        }

        if let Ok(ollama_host) = std::env::var("SUIKOU_OLLAMA_HOST") {
            self.provider.ollama.host = ollama_host;
        }

        if let Ok(ollama_model) = std::env::var("SUIKOU_OLLAMA_MODEL") {
            self.provider.ollama.model = ollama_model;
        }

        if let Ok(remote_url) = std::env::var("SUIKOU_REMOTE_URL") {
            self.provider.remote.base_url = remote_url;
        }

        if let Ok(program) = std::env::var("SUIKOU_COMMAND") {
            self.provider.command.program = program;
        }

        // Generation and streaming overrides
        if let Ok(timeout) = std::env::var("SUIKOU_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.generation.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid SUIKOU_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(interval) = std::env::var("SUIKOU_MIN_WRITE_INTERVAL_MS") {
            if let Ok(value) = interval.parse() {
                self.streaming.min_write_interval_ms = value;
            } else {
                tracing::warn!("Invalid SUIKOU_MIN_WRITE_INTERVAL_MS: {}", interval);
            }
        }

        // Store and server overrides
        if let Ok(path) = std::env::var("SUIKOU_STORE_PATH") {
            self.store.path = Some(PathBuf::from(path));
        }

        if let Ok(bind) = std::env::var("SUIKOU_BIND") {
            self.server.bind = bind;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(provider) = &cli.provider {
            self.provider.provider_type = provider.clone();
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.provider.provider_type.is_empty() {
            return Err(SuikouError::Config("Provider type cannot be empty".to_string()).into());
        }

        let valid_providers = ["ollama", "remote", "command"];
        if !valid_providers.contains(&self.provider.provider_type.as_str()) {
            return Err(SuikouError::Config(format!(
                "Invalid provider type: {}. Must be one of: {}",
                self.provider.provider_type,
                valid_providers.join(", ")
            ))
            .into());
        }

        if self.provider.provider_type == "command" && self.provider.command.program.is_empty() {
            return Err(
                SuikouError::Config("command.program cannot be empty".to_string()).into(),
            );
        }

        if self.provider.command.max_output_bytes == 0 {
            return Err(SuikouError::Config(
                "command.max_output_bytes must be greater than 0".to_string(),
            )
            .into());
        }

        if self.generation.timeout_seconds == 0 {
            return Err(SuikouError::Config(
                "generation.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.generation.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(SuikouError::Config(format!(
                "generation.timeout_seconds must be at most {}",
                MAX_TIMEOUT_SECONDS
            ))
            .into());
        }

        if self.generation.max_tokens == 0 {
            return Err(SuikouError::Config(
                "generation.max_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(SuikouError::Config(
                "generation.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(SuikouError::Config(format!(
                "server.bind is not a socket address: {}",
                self.server.bind
            ))
            .into());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
