//! Prompt templates for document extraction.
//!
//! The prompt is plain string interpolation of the user's question into a
//! fixed instruction. Keeping it here means a prompt change never touches
//! request or parsing code, and tests can inspect the exact text sent.

/// Placeholder replaced with the user's question.
pub const QUESTION_PLACEHOLDER: &str = "{question}";

/// Default extraction prompt.
///
/// Used when `ExtractionConfig::prompt_template` is `None`.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Extract all relevant details from the input and answer the question: {question}. Return the output as a JSON array of objects.";

/// Build the user prompt for `question`.
///
/// The question is inserted verbatim apart from surrounding whitespace;
/// callers are expected to have rejected empty questions already.
pub fn build_prompt(question: &str, template: Option<&str>) -> String {
    template
        .unwrap_or(DEFAULT_PROMPT_TEMPLATE)
        .replace(QUESTION_PLACEHOLDER, question.trim())
}
