//! proctor-store: Submissions persisted as JSON files.
//!
//! Each submission is written once to `<dir>/<id>.json`, where `id` is a
//! UUID v4 assigned at save time. Files are written to a temporary name and
//! renamed into place, so a reader never sees a half-written submission.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use proctor_core::model::Submission;
use proctor_core::traits::SubmissionStore;

/// Errors raised by the file store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No submission exists under this id.
    #[error("submission not found: {0}")]
    NotFound(String),

    /// The id cannot name a file inside the store directory.
    #[error("invalid submission id: {0:?}")]
    InvalidId(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed submission {}: {source}", .path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A submission together with the id it was stored under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSubmission {
    pub id: String,
    pub submission: Submission,
}

/// Stores submissions as pretty-printed JSON files in one directory.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    /// Write a submission and return its new id.
    pub async fn save(&self, submission: &Submission) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let path = self.path_for(&id)?;
        let stored = StoredSubmission {
            id: id.clone(),
            submission: submission.clone(),
        };
        let json = serde_json::to_vec_pretty(&stored).map_err(|source| {
            StoreError::Serialization {
                path: path.clone(),
                source,
            }
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let tmp = self.dir.join(format!(".{id}.json.tmp"));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        info!(submission = %id, path = %path.display(), "submission written");
        Ok(id)
    }

    /// Load one submission by id.
    pub async fn load(&self, id: &str) -> Result<StoredSubmission, StoreError> {
        let path = self.path_for(id)?;
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()))
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_slice(&content).map_err(|source| StoreError::Serialization { path, source })
    }

    /// All stored submissions, oldest first.
    ///
    /// A missing directory is treated as an empty store.
    pub async fn list(&self) -> Result<Vec<StoredSubmission>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut submissions = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let Some(entry) = entry else { break };

            let path = entry.path();
            let id = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) if !name.starts_with('.') => name.strip_suffix(".json"),
                _ => None,
            };
            if let Some(id) = id {
                submissions.push(self.load(id).await?);
            } else {
                debug!(path = %path.display(), "skipping non-submission file");
            }
        }

        submissions.sort_by(|a, b| {
            a.submission
                .submitted_at
                .cmp(&b.submission.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(submissions)
    }
}

#[async_trait]
impl SubmissionStore for JsonDirStore {
    async fn save_submission(&self, submission: &Submission) -> anyhow::Result<String> {
        Ok(self.save(submission).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proctor_core::model::{Answer, AnswerValue, Infraction, InfractionKind, SubmitTrigger};

    fn submission(student: &str, minutes_ago: i64) -> Submission {
        Submission {
            exam_id: "midterm".into(),
            student_id: student.into(),
            answers: vec![Answer {
                question_id: "q1".into(),
                value: AnswerValue::Ids(vec!["a".into(), "c".into()]),
                score: Some(3.0),
            }],
            score: 3,
            elapsed_seconds: 1200,
            infractions: vec![Infraction::now(InfractionKind::Paste)],
            essay_feedback: vec![],
            trigger: SubmitTrigger::Timer,
            submitted_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path().join("nested"));

        let id = store.save(&submission("ada", 0)).await.unwrap();
        assert!(dir.path().join("nested").join(format!("{id}.json")).exists());

        let loaded = store.load(&id).await.unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.submission.student_id, "ada");
        assert_eq!(loaded.submission.score, 3);
        assert_eq!(loaded.submission.trigger, SubmitTrigger::Timer);
        assert_eq!(
            loaded.submission.answers[0].value,
            AnswerValue::Ids(vec!["a".into(), "c".into()])
        );
        assert_eq!(loaded.submission.infractions[0].kind, InfractionKind::Paste);
    }

    #[tokio::test]
    async fn trait_save_assigns_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        let a = store.save_submission(&submission("a", 0)).await.unwrap();
        let b = store.save_submission(&submission("b", 0)).await.unwrap();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[tokio::test]
    async fn list_is_ordered_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        store.save(&submission("late", 1)).await.unwrap();
        store.save(&submission("early", 30)).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let all = store.list().await.unwrap();
        let students: Vec<_> = all.iter().map(|s| s.submission.student_id.as_str()).collect();
        assert_eq!(students, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn missing_directory_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path().join("absent"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_id_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        let err = store.load("0000-missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "0000-missing"));
    }

    #[tokio::test]
    async fn path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        assert!(matches!(
            store.load("../etc/passwd").await,
            Err(StoreError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn corrupt_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let err = store.load("broken").await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[tokio::test]
    async fn write_failure_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        // The store directory would have to live beneath a regular file.
        let store = JsonDirStore::new(blocker.join("sub"));
        let err = store.save_submission(&submission("x", 0)).await.unwrap_err();
        assert!(err.downcast_ref::<StoreError>().is_some());
    }
}
