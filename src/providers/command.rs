//! Command-line program provider
//!
//! Runs a local program (the `claude` CLI by default), writes the whole
//! conversation to its stdin as plain text, and takes its trimmed stdout
//! as the answer. The program is killed if the request is dropped, which
//! is how the orchestrator's timeout reaches it.

use crate::config::CommandConfig;
use crate::error::{Result, SuikouError};
use crate::providers::{Generation, GenerationOptions, Message, Provider};

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Provider that shells out to a CLI program
#[derive(Debug, Clone)]
pub struct CommandProvider {
    config: CommandConfig,
}

impl CommandProvider {
    /// Create a provider for `config.program`
    pub fn new(config: CommandConfig) -> Self {
        tracing::info!(
            "Initialized command provider: {} {}",
            config.program,
            config.args.join(" ")
        );
        Self { config }
    }
}

/// Render messages as the plain-text prompt piped to the program
///
/// System messages come first. A lone user message is passed through
/// as is; anything longer is rendered as a labelled conversation.
///
/// # Examples
///
/// ```
/// use suikou::providers::{render_transcript, Message};
///
/// let single = render_transcript(&[Message::user("Fix this")]);
/// assert_eq!(single, "Fix this");
///
/// let chat = render_transcript(&[
///     Message::user("Original text: x"),
///     Message::assistant("X."),
///     Message::user("Why?"),
/// ]);
/// assert!(chat.contains("User: Why?"));
/// assert!(chat.contains("Assistant: X."));
/// ```
pub fn render_transcript(messages: &[Message]) -> String {
    let (system, conversation): (Vec<&Message>, Vec<&Message>) =
        messages.iter().partition(|m| m.is_system());

    let mut sections: Vec<String> = system.iter().map(|m| m.content.clone()).collect();

    match conversation.as_slice() {
        [] => {}
        [only] if only.role == "user" => sections.push(only.content.clone()),
        turns => {
            let mut block = String::from("Conversation so far:");
            for turn in turns {
                let label = if turn.role == "assistant" {
                    "Assistant"
                } else {
                    "User"
                };
                block.push_str(&format!("\n\n{}: {}", label, turn.content));
            }
            sections.push(block);
        }
    }

    sections.join("\n\n")
}

/// Read `reader` to the end, failing if it exceeds `limit` bytes
async fn read_bounded<R: AsyncRead + Unpin>(reader: R, limit: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buffer)
        .await?;
    if buffer.len() > limit {
        return Err(SuikouError::Generation(format!(
            "program output exceeded {} bytes",
            limit
        ))
        .into());
    }
    Ok(buffer)
}

#[async_trait]
impl Provider for CommandProvider {
    fn name(&self) -> &str {
        "command"
    }

    async fn generate(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<Generation> {
        let prompt = render_transcript(messages);

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SuikouError::Generation(format!(
                    "failed to start `{}`: {}",
                    self.config.program, e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SuikouError::Generation("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SuikouError::Generation("child stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SuikouError::Generation("child stderr unavailable".into()))?;

        let write = async move {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await?;
            Ok::<_, std::io::Error>(())
        };
        let limit = self.config.max_output_bytes;
        let (written, out, err) = tokio::join!(
            write,
            read_bounded(stdout, limit),
            read_bounded(stderr, limit)
        );

        let out = out?;
        let status = child.wait().await?;
        let stderr_text = err
            .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
            .unwrap_or_default();
        if !stderr_text.is_empty() {
            tracing::warn!("{} stderr: {}", self.config.program, stderr_text);
        }

        if !status.success() {
            let detail = if stderr_text.is_empty() {
                status.to_string()
            } else {
                stderr_text
            };
            return Err(SuikouError::Generation(format!(
                "`{}` failed: {}",
                self.config.program, detail
            ))
            .into());
        }
        if let Err(e) = written {
            // A program may exit successfully without reading all of stdin.
            tracing::debug!("Could not write full prompt to {}: {}", self.config.program, e);
        }

        let answer = String::from_utf8_lossy(&out).trim().to_string();
        Ok(Generation::Complete(answer))
    }

    async fn health_check(&self) -> Result<()> {
        let status = Command::new(&self.config.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| {
                SuikouError::Provider(format!("`{}` is not runnable: {}", self.config.program, e))
            })?;
        if !status.success() {
            return Err(SuikouError::Provider(format!(
                "`{} --version` exited with {}",
                self.config.program, status
            ))
            .into());
        }
        Ok(())
    }
}
