//! Collaborator traits: advisory essay graders and submission persistence.
//!
//! Graders are implemented by `proctor-providers`, the file store by
//! `proctor-store`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{EssayFeedback, Submission};

// ---------------------------------------------------------------------------
// Essay grader trait
// ---------------------------------------------------------------------------

/// Backend that comments on free-text answers. Advisory only.
#[async_trait]
pub trait EssayGrader: Send + Sync {
    /// Human-readable grader name (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Produce feedback for one essay answer.
    async fn grade_essay(&self, request: &EssayRequest) -> anyhow::Result<EssayFeedback>;
}

/// One essay to be graded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EssayRequest {
    /// The question text.
    pub question: String,
    /// The examinee's answer.
    pub answer: String,
}

// ---------------------------------------------------------------------------
// Submission store trait
// ---------------------------------------------------------------------------

/// The sole persistence write of a session.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Persist a submission and return the id it was stored under.
    async fn save_submission(&self, submission: &Submission) -> anyhow::Result<String>;
}

// ---------------------------------------------------------------------------
// Grader prompt
// ---------------------------------------------------------------------------

/// System prompt shared by the LLM-backed graders.
pub const ESSAY_SYSTEM_PROMPT: &str = "You are an assistant that reviews essay answers. Identify the key themes and key facts the student presents and suggest a grade between 0 and 100. Respond ONLY with a JSON object of the form {\"key_themes\": [string], \"key_facts\": [string], \"grade_suggestion\": number}.";

/// Render the user prompt for an essay request.
pub fn essay_prompt(request: &EssayRequest) -> String {
    format!(
        "Essay question: {}\n\nStudent answer: {}",
        request.question, request.answer
    )
}

// ---------------------------------------------------------------------------
// Grader output parsing
// ---------------------------------------------------------------------------

/// Extract a JSON object from an LLM response.
///
/// Handles:
/// - ```json``` blocks (preferred)
/// - Generic ``` blocks
/// - Bare responses, trimmed to the outermost `{ ... }`
pub fn extract_json_from_markdown(response: &str) -> String {
    let mut json_blocks = Vec::new();
    let mut generic_blocks = Vec::new();
    let mut in_block = false;
    let mut is_json_block = false;
    let mut current_block = String::new();

    for line in response.lines() {
        let trimmed = line.trim();

        if !in_block && trimmed.starts_with("```") {
            in_block = true;
            let lang = trimmed.trim_start_matches('`').trim().to_lowercase();
            is_json_block = lang == "json";
            current_block.clear();
            continue;
        }

        if in_block && trimmed == "```" {
            in_block = false;
            if is_json_block {
                json_blocks.push(current_block.clone());
            } else {
                generic_blocks.push(current_block.clone());
            }
            current_block.clear();
            continue;
        }

        if in_block {
            if !current_block.is_empty() {
                current_block.push('\n');
            }
            current_block.push_str(line);
        }
    }

    if let Some(block) = json_blocks.into_iter().next() {
        return block;
    }
    if let Some(block) = generic_blocks.into_iter().next() {
        return block;
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => response[start..=end].to_string(),
        _ => response.trim().to_string(),
    }
}

/// Parse grader output into feedback, clamping the grade to 0..=100.
pub fn parse_essay_feedback(response: &str) -> Result<EssayFeedback, crate::error::ProviderError> {
    let json = extract_json_from_markdown(response);
    let mut feedback: EssayFeedback = serde_json::from_str(&json)
        .map_err(|e| crate::error::ProviderError::MalformedOutput(format!("{e}: {json}")))?;
    feedback.grade_suggestion = feedback.grade_suggestion.clamp(0.0, 100.0);
    Ok(feedback)
}
