//! In-memory submission store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::Submission;
use crate::traits::SubmissionStore;

/// Keeps submissions in memory. Useful for dry runs and tests.
///
/// Failures and latency can be injected to exercise retry paths.
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<(String, Submission)>>,
    failures_left: AtomicU32,
    delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` saves fail.
    pub fn failing(count: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(count),
            ..Self::default()
        }
    }

    /// Wait this long inside every save.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of submissions saved so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All saved submissions with their ids, oldest first.
    pub fn submissions(&self) -> Vec<(String, Submission)> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Submission)>> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn save_submission(&self, submission: &Submission) -> anyhow::Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            anyhow::bail!("simulated storage failure");
        }

        let id = Uuid::new_v4().to_string();
        self.lock().push((id.clone(), submission.clone()));
        Ok(id)
    }
}
