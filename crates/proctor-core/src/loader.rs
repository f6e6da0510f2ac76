//! Exam definition loading.
//!
//! Exams are authored as TOML (or JSON) files. Authoring-level validation is
//! the editor's job; loading only rejects definitions that would break the
//! one-answer-per-question invariant.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::{ExamDefinition, QuestionKind};

/// Load an exam from a `.toml` or `.json` file.
pub fn parse_exam(path: &Path) -> Result<ExamDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read exam file: {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        parse_exam_json_str(&content, path)
    } else {
        parse_exam_str(&content, path)
    }
}

/// Parse a TOML string into an `ExamDefinition` (useful for testing).
pub fn parse_exam_str(content: &str, source_path: &Path) -> Result<ExamDefinition> {
    let mut exam: ExamDefinition = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    check_unique_ids(&exam)
        .with_context(|| format!("invalid exam: {}", source_path.display()))?;
    derive_points(&mut exam);
    Ok(exam)
}

/// Parse a JSON string into an `ExamDefinition`.
pub fn parse_exam_json_str(content: &str, source_path: &Path) -> Result<ExamDefinition> {
    let mut exam: ExamDefinition = serde_json::from_str(content)
        .with_context(|| format!("failed to parse JSON: {}", source_path.display()))?;
    check_unique_ids(&exam)
        .with_context(|| format!("invalid exam: {}", source_path.display()))?;
    derive_points(&mut exam);
    Ok(exam)
}

/// A true-false-justification question without positive points is worth
/// the sum of its two parts.
fn derive_points(exam: &mut ExamDefinition) {
    for question in &mut exam.questions {
        if let QuestionKind::TrueFalseJustification {
            points_for_affirmation,
            points_for_justification,
            ..
        } = &question.kind
        {
            if question.points <= 0.0 {
                question.points =
                    points_for_affirmation.max(0.0) + points_for_justification.max(0.0);
            }
        }
    }
}

fn check_unique_ids(exam: &ExamDefinition) -> Result<()> {
    let mut seen = HashSet::new();
    for question in &exam.questions {
        anyhow::ensure!(
            seen.insert(question.id.as_str()),
            "duplicate question id '{}'",
            question.id
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerValue, EvaluationPolicy, JustifiedResponse, OnTimeUpAction};

    const SAMPLE: &str = r#"
id = "philosophy-101"
title = "Logic midterm"
duration_minutes = 30
on_time_up_action = "allow-submission-grace-period"
grace_period_minutes = 5
auto_submit_on_focus_loss = true

[evaluation]
evaluation_type = "qualitative"
ratings = [
  { label = "Excellent", min_percentage = 90, is_passing = true },
  { label = "Insufficient", min_percentage = 0, is_passing = false },
]

[[questions]]
id = "arg"
text = "Reconstruct the argument"
points = 4
type = "argument-reconstruction"
items = [
  { id = "p1", text = "All men are mortal" },
  { id = "p2", text = "Socrates is a man" },
  { id = "c", text = "Socrates is mortal" },
]
correct_order = ["p1", "p2", "c"]

[[questions]]
id = "tfj"
text = "Decide and justify"
points = 2
type = "true-false-justification"
affirmation = "Modus ponens is valid"
is_affirmation_true = true
points_for_affirmation = 1
points_for_justification = 1
justification_options = [
  { id = "j1", text = "Because it is", is_correct = true },
  { id = "j2", text = "Because it is not" },
]

[[questions]]
id = "essay"
text = "Discuss"
points = 10
type = "free-text"
"#;

    #[test]
    fn parse_full_exam() {
        let exam = parse_exam_str(SAMPLE, Path::new("sample.toml")).unwrap();
        assert_eq!(exam.id, "philosophy-101");
        assert_eq!(exam.questions.len(), 3);
        assert_eq!(
            exam.on_time_up_action,
            OnTimeUpAction::AllowSubmissionGracePeriod
        );
        assert!(exam.auto_submit_on_focus_loss);
        assert!(!exam.randomize_questions);
        assert_eq!(exam.total_points(), 16.0);
        assert!(matches!(
            exam.evaluation,
            EvaluationPolicy::Qualitative { ref ratings } if ratings.len() == 2
        ));
        assert!(matches!(
            exam.question("tfj").unwrap().kind,
            QuestionKind::TrueFalseJustification {
                points_for_justification,
                ..
            } if points_for_justification == 1.0
        ));
    }

    #[test]
    fn justification_points_default_to_sum_of_parts() {
        let toml = r#"
id = "tfj-only"
duration_minutes = 5

[[questions]]
id = "explicit-parts"
text = "Decide and justify"
type = "true-false-justification"
affirmation = "Water is wet"
is_affirmation_true = true
points_for_affirmation = 1
points_for_justification = 3
justification_options = [
  { id = "j1", text = "Because", is_correct = true },
  { id = "j2", text = "Because not" },
]

[[questions]]
id = "default-parts"
text = "Decide and justify"
type = "true-false-justification"
affirmation = "Fire is cold"
is_affirmation_true = false
justification_options = [{ id = "k1", text = "Because", is_correct = true }]
"#;
        let exam = parse_exam_str(toml, Path::new("tfj.toml")).unwrap();
        let explicit = exam.question("explicit-parts").unwrap();
        assert_eq!(explicit.points, 4.0);
        assert_eq!(exam.question("default-parts").unwrap().points, 10.0);

        let answer = AnswerValue::Justified(JustifiedResponse {
            affirmation_response: Some(true),
            justification_id: Some("j1".into()),
        });
        assert_eq!(crate::scoring::score(explicit, &answer), 4.0);
    }

    #[test]
    fn defaults_apply() {
        let exam = parse_exam_str(
            "id = \"bare\"\nduration_minutes = 5\n",
            Path::new("bare.toml"),
        )
        .unwrap();
        assert_eq!(exam.on_time_up_action, OnTimeUpAction::AutoSubmit);
        assert!(exam.questions.is_empty());
        assert!(matches!(
            exam.evaluation,
            EvaluationPolicy::Quantitative {
                approval_threshold: None
            }
        ));
    }

    #[test]
    fn duplicate_question_ids_rejected() {
        let toml = r#"
id = "dup"
duration_minutes = 5

[[questions]]
id = "q"
text = "a"
type = "free-text"

[[questions]]
id = "q"
text = "b"
type = "free-text"
"#;
        let err = parse_exam_str(toml, Path::new("dup.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate question id"));
    }

    #[test]
    fn unknown_question_type_rejected() {
        let toml = r#"
id = "bad"
duration_minutes = 5

[[questions]]
id = "q"
text = "a"
type = "matching"
"#;
        assert!(parse_exam_str(toml, Path::new("bad.toml")).is_err());
    }

    #[test]
    fn parse_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exam.json");
        std::fs::write(
            &path,
            r#"{
  "id": "json-exam",
  "duration_minutes": 1,
  "questions": [
    {"id": "q1", "text": "t", "points": 1, "type": "true-false-complex",
     "statement": "s", "is_statement_true": false}
  ]
}"#,
        )
        .unwrap();
        let exam = parse_exam(&path).unwrap();
        assert_eq!(exam.id, "json-exam");
        assert_eq!(exam.questions[0].kind.tag(), "true-false-complex");
    }

    #[test]
    fn missing_file_has_context() {
        let err = parse_exam(Path::new("does-not-exist.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read exam file"));
    }
}
