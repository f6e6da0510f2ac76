//! Deterministic per-question scoring.
//!
//! `score` is total: any value whose shape does not fit the question variant
//! scores zero instead of failing, so one malformed answer never aborts the
//! rest of a submission.

use std::collections::HashSet;

use crate::model::{Answer, AnswerValue, ChoiceOption, Question, QuestionKind};

/// Number of leading positions that hold premises in an argument reconstruction.
pub const ARGUMENT_PREMISES: usize = 2;
/// Number of conclusion positions following the premises.
pub const ARGUMENT_CONCLUSIONS: usize = 1;

/// Score a single response against its question.
///
/// The result is always within `[0, question.points]`.
pub fn score(question: &Question, value: &AnswerValue) -> f64 {
    let points = question.points.max(0.0);

    let raw = match (&question.kind, value) {
        (QuestionKind::MultipleChoice { options, .. }, AnswerValue::Text(chosen)) => {
            match options.iter().find(|o| o.is_correct) {
                Some(correct) if &correct.id == chosen => points,
                _ => 0.0,
            }
        }
        (QuestionKind::MultipleResponse { options, .. }, AnswerValue::Ids(selected)) => {
            if selection_matches(options, selected) {
                points
            } else {
                0.0
            }
        }
        (
            QuestionKind::WeightedChoice {
                options,
                allow_multiple_selections: false,
                ..
            },
            AnswerValue::Text(chosen),
        ) => options
            .iter()
            .find(|o| &o.id == chosen)
            .map(|o| points * o.percentage.max(0.0) / 100.0)
            .unwrap_or(0.0),
        (
            QuestionKind::WeightedChoice {
                options,
                allow_multiple_selections: true,
                ..
            },
            AnswerValue::Ids(selected),
        ) => {
            let chosen: HashSet<&str> = selected.iter().map(String::as_str).collect();
            let sum: f64 = options
                .iter()
                .filter(|o| chosen.contains(o.id.as_str()))
                .map(|o| o.percentage)
                .sum();
            points * sum.clamp(0.0, 100.0) / 100.0
        }
        (QuestionKind::ArgumentReconstruction { correct_order, .. }, AnswerValue::Ids(order)) => {
            if argument_matches(correct_order, order) {
                points
            } else {
                0.0
            }
        }
        (
            QuestionKind::TrueFalseComplex {
                is_statement_true, ..
            },
            AnswerValue::Flag(answer),
        ) => {
            if answer == is_statement_true {
                points
            } else {
                0.0
            }
        }
        (
            QuestionKind::TrueFalseJustification {
                is_affirmation_true,
                justification_options,
                points_for_affirmation,
                points_for_justification,
                ..
            },
            AnswerValue::Justified(response),
        ) => {
            let affirmation = if response.affirmation_response == Some(*is_affirmation_true) {
                points_for_affirmation.max(0.0)
            } else {
                0.0
            };
            let justification = match (
                justification_options.iter().find(|o| o.is_correct),
                response.justification_id.as_deref(),
            ) {
                (Some(correct), Some(chosen)) if correct.id == chosen => {
                    points_for_justification.max(0.0)
                }
                _ => 0.0,
            };
            affirmation + justification
        }
        // Essays are never auto-scored; an advisory grader may comment on them.
        (QuestionKind::FreeText, _) => 0.0,
        // Blank-level scoring rules for cloze are not defined yet.
        (QuestionKind::Cloze { .. }, _) => 0.0,
        (QuestionKind::MultipleChoice { .. }, _)
        | (QuestionKind::MultipleResponse { .. }, _)
        | (QuestionKind::WeightedChoice { .. }, _)
        | (QuestionKind::ArgumentReconstruction { .. }, _)
        | (QuestionKind::TrueFalseComplex { .. }, _)
        | (QuestionKind::TrueFalseJustification { .. }, _) => 0.0,
    };

    raw.clamp(0.0, points)
}

/// Exact set equality between the selection and the authored-correct options.
fn selection_matches(options: &[ChoiceOption], selected: &[String]) -> bool {
    let correct: HashSet<&str> = options
        .iter()
        .filter(|o| o.is_correct)
        .map(|o| o.id.as_str())
        .collect();
    if correct.is_empty() {
        return false;
    }
    let chosen: HashSet<&str> = selected.iter().map(String::as_str).collect();
    chosen == correct
}

/// All-or-nothing check of an argument ordering.
///
/// Premises and distractors are compared as sets; the conclusion must sit at
/// its exact position.
fn argument_matches(correct_order: &[String], order: &[String]) -> bool {
    let head = ARGUMENT_PREMISES + ARGUMENT_CONCLUSIONS;
    if correct_order.len() < head || order.len() != correct_order.len() {
        return false;
    }

    fn as_set(ids: &[String]) -> HashSet<&str> {
        ids.iter().map(String::as_str).collect()
    }

    as_set(&order[..ARGUMENT_PREMISES]) == as_set(&correct_order[..ARGUMENT_PREMISES])
        && order[ARGUMENT_PREMISES] == correct_order[ARGUMENT_PREMISES]
        && as_set(&order[head..]) == as_set(&correct_order[head..])
}

/// Aggregate per-question scores into the submission score.
pub fn aggregate(scores: impl IntoIterator<Item = f64>) -> u32 {
    let total: f64 = scores.into_iter().sum();
    total.max(0.0).round() as u32
}

/// Score every answer in place, returning the aggregate.
///
/// Answers whose question id is unknown keep a score of zero.
pub fn score_answers(questions: &[Question], answers: &mut [Answer]) -> u32 {
    for answer in answers.iter_mut() {
        let s = questions
            .iter()
            .find(|q| q.id == answer.question_id)
            .map(|q| score(q, &answer.value))
            .unwrap_or(0.0);
        answer.score = Some(s);
    }
    aggregate(answers.iter().filter_map(|a| a.score))
}
