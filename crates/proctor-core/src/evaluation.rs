//! Turning a submission score into a verdict.

use serde::{Deserialize, Serialize};

use crate::model::{EvaluationPolicy, ExamDefinition, QualitativeRating};

/// Threshold used when an exam does not configure a valid one.
pub const DEFAULT_APPROVAL_THRESHOLD: f64 = 60.0;

/// Label used when no qualitative rating matches.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Pass/fail verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultStatus {
    Passed,
    Failed,
    UnderReview,
}

/// Derived view of a score relative to its exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEvaluation {
    pub score: u32,
    pub total_points: f64,
    pub percentage: Option<f64>,
    /// Score on a 0..=10 scale.
    pub scaled: Option<f64>,
    pub status: ResultStatus,
    /// Qualitative label, for qualitative exams.
    pub label: Option<String>,
}

/// Evaluate a submission score against the exam's evaluation policy.
pub fn evaluate(score: u32, exam: &ExamDefinition) -> ResultEvaluation {
    let total_points = exam.total_points();
    let value = f64::from(score);

    match &exam.evaluation {
        EvaluationPolicy::Quantitative { approval_threshold } => {
            let threshold = approval_threshold
                .filter(|t| (0.0..=100.0).contains(t))
                .unwrap_or(DEFAULT_APPROVAL_THRESHOLD);

            let (percentage, scaled, status) = if total_points > 0.0 {
                let percentage = value / total_points * 100.0;
                let status = if percentage >= threshold {
                    ResultStatus::Passed
                } else {
                    ResultStatus::Failed
                };
                (percentage, value / total_points * 10.0, status)
            } else {
                let positive = score > 0;
                let status = if threshold == 0.0 {
                    ResultStatus::Passed
                } else {
                    ResultStatus::Failed
                };
                (
                    if positive { 100.0 } else { 0.0 },
                    if positive { 10.0 } else { 0.0 },
                    status,
                )
            };

            ResultEvaluation {
                score,
                total_points,
                percentage: Some(percentage),
                scaled: Some(scaled),
                status,
                label: None,
            }
        }
        EvaluationPolicy::Qualitative { ratings } => {
            if total_points <= 0.0 || ratings.is_empty() {
                return ResultEvaluation {
                    score,
                    total_points,
                    percentage: None,
                    scaled: None,
                    status: ResultStatus::UnderReview,
                    label: None,
                };
            }

            let percentage = value / total_points * 100.0;
            let (status, label) = match rate(percentage, ratings) {
                Some(rating) => {
                    let status = match rating.is_passing {
                        Some(true) => ResultStatus::Passed,
                        Some(false) => ResultStatus::Failed,
                        None => ResultStatus::UnderReview,
                    };
                    (status, rating.label.clone())
                }
                None => (ResultStatus::UnderReview, UNCATEGORIZED.to_string()),
            };

            ResultEvaluation {
                score,
                total_points,
                percentage: Some(percentage),
                scaled: Some(value / total_points * 10.0),
                status,
                label: Some(label),
            }
        }
    }
}

/// Highest rating whose minimum the percentage reaches.
fn rate(percentage: f64, ratings: &[QualitativeRating]) -> Option<&QualitativeRating> {
    let mut sorted: Vec<&QualitativeRating> = ratings.iter().collect();
    sorted.sort_by(|a, b| b.min_percentage.total_cmp(&a.min_percentage));
    sorted.into_iter().find(|r| percentage >= r.min_percentage)
}
