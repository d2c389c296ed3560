//! Fixed prompts for proofreading and follow-up chat
//!
//! The proofreading request and the follow-up conversation use different
//! system instructions. The bootstrap prompt is both sent to the provider
//! and stored as `history[0]`, so the stored history always shows what
//! the model was actually asked.

pub mod chat_prompt;
pub mod proofread_prompt;

pub use chat_prompt::{original_text_context, CHAT_SYSTEM_PROMPT};
pub use proofread_prompt::{bootstrap_prompt, PROOFREAD_SYSTEM_PROMPT};
