//! Follow-up chat prompt

/// System instruction for follow-up questions about a rewrite
pub const CHAT_SYSTEM_PROMPT: &str = "You are an expert editor and proofreader. \
Answer the user's questions about the text and help them improve it further.";

/// Context line that reintroduces the original text ahead of prior turns
///
/// # Examples
///
/// ```
/// use suikou::prompts::original_text_context;
///
/// assert_eq!(original_text_context("abc"), "Original text: abc");
/// ```
pub fn original_text_context(original_text: &str) -> String {
    format!("Original text: {}", original_text)
}
