//! Suikou - AI proofreading with a shared, streaming session
//!
//! This library keeps a single proofreading session in a shared store and
//! lets any number of viewers follow it while an AI provider streams the
//! answer in.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Session record, partial writes, and the status state machine
//! - `store`: The shared session slot (in-memory and `sled`) with change notifications
//! - `history`: Bootstrap turn, visible projection, and follow-up prompt assembly
//! - `stream`: Accumulates provider deltas into store writes
//! - `orchestrator`: Validates requests and sequences writes and provider calls
//! - `reset`: Clears the session on navigation or an explicit reset
//! - `view`: What a viewer displays for one snapshot
//! - `providers`: AI provider abstraction and implementations (Ollama, remote, command)
//! - `server`: HTTP surface for viewers and thin clients
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use suikou::{Config, MemoryStore, Orchestrator};
//! use suikou::providers::create_provider;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cli = suikou::cli::Cli::parse_args();
//!     let config = Config::load("config/config.yaml", &cli)?;
//!     config.validate()?;
//!
//!     let store = Arc::new(MemoryStore::new());
//!     let provider = create_provider(&config.provider)?;
//!     let orchestrator = Orchestrator::from_config(store, provider, &config);
//!     orchestrator.start_proofreading("Their going to the park tomorow.").await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod reset;
pub mod server;
pub mod session;
pub mod store;
pub mod stream;
pub mod view;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, SuikouError};
pub use orchestrator::Orchestrator;
pub use reset::{ResetEvent, ResetTrigger};
pub use session::{SessionPatch, SessionRecord, SessionStatus, Turn};
pub use store::{MemoryStore, SessionStore, SledStore};
pub use view::SessionView;

#[cfg(test)]
pub mod test_utils;
