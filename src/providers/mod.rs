//! Provider module for Suikou
//!
//! This module contains the AI provider abstraction and implementations
//! for a local Ollama server, a remote proofreading server, and a local
//! command-line program.

pub mod base;
pub mod command;
pub mod ollama;
pub mod remote;

pub use base::{DeltaStream, Generation, GenerationOptions, Message, Provider};
pub use command::{render_transcript, CommandProvider};
pub use ollama::OllamaProvider;
pub use remote::{ChatRequest, ChatResponse, RemoteProvider};

use crate::config::ProviderConfig;
use crate::error::{Result, SuikouError};
use std::sync::Arc;

/// Create a provider instance based on configuration
///
/// # Arguments
///
/// * `config` - Provider configuration; `provider_type` selects the backend
///   ("ollama", "remote", or "command")
///
/// # Returns
///
/// Returns a shared provider instance
///
/// # Errors
///
/// Returns error if provider type is invalid or initialization fails
///
/// # Examples
///
/// ```
/// use suikou::config::{CommandConfig, OllamaConfig, ProviderConfig, RemoteConfig};
/// use suikou::providers::create_provider;
///
/// let config = ProviderConfig {
///     provider_type: "command".to_string(),
///     ollama: OllamaConfig::default(),
///     remote: RemoteConfig::default(),
///     command: CommandConfig::default(),
/// };
/// let provider = create_provider(&config).unwrap();
/// assert_eq!(provider.name(), "command");
/// ```
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    match config.provider_type.as_str() {
        "ollama" => Ok(Arc::new(OllamaProvider::new(config.ollama.clone())?)),
        "remote" => Ok(Arc::new(RemoteProvider::new(config.remote.clone())?)),
        "command" => Ok(Arc::new(CommandProvider::new(config.command.clone()))),
        other => Err(SuikouError::Provider(format!("Unknown provider type: {}", other)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommandConfig, OllamaConfig, RemoteConfig};

    fn config(provider_type: &str) -> ProviderConfig {
        ProviderConfig {
            provider_type: provider_type.to_string(),
            ollama: OllamaConfig::default(),
            remote: RemoteConfig::default(),
            command: CommandConfig::default(),
        }
    }

    #[test]
    fn test_create_each_provider() {
        for name in ["ollama", "remote", "command"] {
            let provider = create_provider(&config(name)).unwrap();
            assert_eq!(provider.name(), name);
        }
    }

    #[test]
    fn test_create_unknown_provider() {
        let result = create_provider(&config("gpt"));
        assert!(result.is_err());
        assert!(result
            .err()
            .map(|e| e.to_string().contains("Unknown provider type: gpt"))
            .unwrap_or(false));
    }
}
