//! Display order for questions and options.
//!
//! Shuffling only ever reorders identifiers for presentation. Answers and
//! scoring stay keyed by the authored ids.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::{ExamDefinition, QuestionKind};

/// Presentation order computed once at session start.
#[derive(Debug, Clone, Default)]
pub struct Presentation {
    question_order: Vec<String>,
    option_order: HashMap<String, Vec<String>>,
    /// Cloze blank option orders, keyed by question id then blank id.
    blank_option_order: HashMap<String, HashMap<String, Vec<String>>>,
}

impl Presentation {
    /// Build the display order for an exam.
    pub fn new<R: Rng + ?Sized>(exam: &ExamDefinition, rng: &mut R) -> Self {
        let mut question_order: Vec<String> = exam.questions.iter().map(|q| q.id.clone()).collect();
        if exam.randomize_questions {
            question_order.shuffle(rng);
        }

        let mut option_order = HashMap::new();
        let mut blank_option_order = HashMap::new();
        for question in &exam.questions {
            if let QuestionKind::Cloze { sub_questions, .. } = &question.kind {
                let mut blanks = HashMap::new();
                for blank in sub_questions.iter().filter(|b| !b.options.is_empty()) {
                    let mut ids: Vec<String> = blank.options.iter().map(|o| o.id.clone()).collect();
                    if blank.randomize_options {
                        ids.shuffle(rng);
                    }
                    blanks.insert(blank.id.clone(), ids);
                }
                blank_option_order.insert(question.id.clone(), blanks);
                continue;
            }

            let (mut ids, shuffle): (Vec<String>, bool) = match &question.kind {
                QuestionKind::MultipleChoice {
                    options,
                    randomize_options,
                }
                | QuestionKind::MultipleResponse {
                    options,
                    randomize_options,
                } => (
                    options.iter().map(|o| o.id.clone()).collect(),
                    *randomize_options,
                ),
                QuestionKind::WeightedChoice {
                    options,
                    randomize_options,
                    ..
                } => (
                    options.iter().map(|o| o.id.clone()).collect(),
                    *randomize_options,
                ),
                QuestionKind::TrueFalseJustification {
                    justification_options,
                    randomize_justification_options,
                    ..
                } => (
                    justification_options.iter().map(|o| o.id.clone()).collect(),
                    *randomize_justification_options,
                ),
                // Items start scrambled so the authored order is not given away.
                QuestionKind::ArgumentReconstruction { items, .. } => {
                    (items.iter().map(|i| i.id.clone()).collect(), true)
                }
                QuestionKind::FreeText
                | QuestionKind::TrueFalseComplex { .. }
                | QuestionKind::Cloze { .. } => continue,
            };
            if shuffle {
                ids.shuffle(rng);
            }
            option_order.insert(question.id.clone(), ids);
        }

        Self {
            question_order,
            option_order,
            blank_option_order,
        }
    }

    /// Question ids in display order.
    pub fn question_order(&self) -> &[String] {
        &self.question_order
    }

    /// Option (or item) ids of a question in display order.
    pub fn options_for(&self, question_id: &str) -> Option<&[String]> {
        self.option_order.get(question_id).map(Vec::as_slice)
    }

    /// Option ids of one cloze blank in display order.
    pub fn blank_options_for(&self, question_id: &str, blank_id: &str) -> Option<&[String]> {
        self.blank_option_order
            .get(question_id)?
            .get(blank_id)
            .map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.question_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.question_order.is_empty()
    }
}
