//! Mock grader for testing and offline runs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use proctor_core::model::EssayFeedback;
use proctor_core::traits::{parse_essay_feedback, EssayGrader, EssayRequest};

/// A grader that answers without any network call.
///
/// Either replays a fixed raw response (run through the same parser as the
/// real graders) or derives feedback from the answer itself.
pub struct MockGrader {
    fixed_response: Option<String>,
    call_count: AtomicU32,
    last_request: Mutex<Option<EssayRequest>>,
}

impl MockGrader {
    /// Feedback derived from the answer: its longest words become themes and
    /// the grade grows with the word count.
    pub fn new() -> Self {
        Self {
            fixed_response: None,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same raw model output.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            fixed_response: Some(response.to_string()),
            ..Self::new()
        }
    }

    /// Get the number of calls made to this grader.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this grader.
    pub fn last_request(&self) -> Option<EssayRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockGrader {
    fn default() -> Self {
        Self::new()
    }
}

fn derived_feedback(answer: &str) -> EssayFeedback {
    let mut words: Vec<&str> = answer
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let word_count = words.len();
    words.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    words.dedup();

    EssayFeedback {
        key_themes: words.iter().take(3).map(|w| w.to_lowercase()).collect(),
        key_facts: Vec::new(),
        grade_suggestion: (word_count as f64 * 2.0).min(100.0),
    }
}

#[async_trait]
impl EssayGrader for MockGrader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn grade_essay(&self, request: &EssayRequest) -> anyhow::Result<EssayFeedback> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request.clone());

        match &self.fixed_response {
            Some(raw) => Ok(parse_essay_feedback(raw)?),
            None => Ok(derived_feedback(&request.answer)),
        }
    }
}
