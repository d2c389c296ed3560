//! Proofreading prompt
//!
//! The model is asked for three rewrites of the selected text, each under
//! a fixed label, with no list of corrections and no markdown.

/// System instruction for the initial proofreading request
pub const PROOFREAD_SYSTEM_PROMPT: &str = "You are an expert editor and proofreader. \
Rewrite the text you are given in three styles, labelled [Formal], [Casual] and [Concise]. \
Keep the meaning of the original.";

/// Builds the bootstrap prompt embedding the selected text
///
/// # Arguments
///
/// * `original_text` - The text selected by the user
///
/// # Examples
///
/// ```
/// use suikou::prompts::bootstrap_prompt;
///
/// let prompt = bootstrap_prompt("teh cat");
/// assert!(prompt.starts_with("Please proofread"));
/// assert!(prompt.ends_with("teh cat"));
/// ```
pub fn bootstrap_prompt(original_text: &str) -> String {
    format!(
        r#"Please proofread the following text. Do not list the corrections. Answer in plain text, not markdown, following this format:
[Formal]
XXXXXXXXXX
[Casual]
YYYYYYYYYY
[Concise]
ZZZZZZZZZZ

Text:
{}"#,
        original_text
    )
}
