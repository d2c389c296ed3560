//! Remote proofreading server provider
//!
//! Talks to a thin HTTP server that runs the model on its side and
//! answers in one piece: `POST /chat` with `{messages, originalText}`
//! returns `{success, result}` or `{success: false, error}`. The same
//! contract is served by `suikou serve`, so one instance can front
//! another.

use crate::config::RemoteConfig;
use crate::error::{Result, SuikouError};
use crate::providers::{Generation, GenerationOptions, Message, Provider};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body for `POST /chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Conversation to answer
    pub messages: Vec<Message>,
    /// Text being proofread, when the caller wants the server to add it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
}

/// Response body for `POST /chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Whether the server produced an answer
    pub success: bool,
    /// Answer text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    /// Successful response
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            error: None,
        }
    }

    /// Failed response
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Provider backed by a remote proofreading server
#[derive(Debug)]
pub struct RemoteProvider {
    client: Client,
    config: RemoteConfig,
}

impl RemoteProvider {
    /// Create a new remote provider
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("suikou/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SuikouError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!("Initialized remote provider: {}", config.base_url);
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Provider for RemoteProvider {
    fn name(&self) -> &str {
        "remote"
    }

    async fn generate(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<Generation> {
        let request = ChatRequest {
            messages: messages.to_vec(),
            original_text: None,
        };

        let response = self
            .client
            .post(self.endpoint("/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| SuikouError::Generation(format!("Remote request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            SuikouError::Generation(format!("Failed to read remote response: {}", e))
        })?;

        // The server reports failures in the body, with or without a 2xx.
        let parsed: Option<ChatResponse> = serde_json::from_str(&body).ok();
        match parsed {
            Some(ChatResponse {
                success: true,
                result: Some(result),
                ..
            }) if status.is_success() => Ok(Generation::Complete(result)),
            Some(ChatResponse {
                error: Some(error), ..
            }) => Err(SuikouError::Generation(error).into()),
            _ if !status.is_success() => {
                tracing::error!("Remote server returned {}: {}", status, body);
                Err(SuikouError::Generation(format!(
                    "Remote server returned {}: {}",
                    status, body
                ))
                .into())
            }
            _ => Err(SuikouError::Generation(format!(
                "Malformed remote response: {}",
                body
            ))
            .into()),
        }
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.endpoint("/health"))
            .send()
            .await
            .map_err(|e| SuikouError::Provider(format!("Remote server unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(SuikouError::Provider(format!(
                "Remote health check returned {}",
                response.status()
            ))
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_camel_case() {
        let request = ChatRequest {
            messages: vec![Message::user("hi")],
            original_text: Some("orig".to_string()),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["originalText"], "orig");
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_chat_response_constructors() {
        let ok = serde_json::to_value(ChatResponse::ok("done")).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "result": "done"}));
        let failed = serde_json::to_value(ChatResponse::failed("nope")).unwrap();
        assert_eq!(failed, serde_json::json!({"success": false, "error": "nope"}));
    }

    #[test]
    fn test_endpoint() {
        let provider = RemoteProvider::new(RemoteConfig {
            base_url: "http://host:1/".to_string(),
        })
        .unwrap();
        assert_eq!(provider.endpoint("/chat"), "http://host:1/chat");
    }
}
