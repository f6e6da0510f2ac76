//! Core data model types for proctor.
//!
//! The question union is closed: every consumer matches on [`QuestionKind`]
//! exhaustively, so adding a variant surfaces every place that must handle it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single prompt in an exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Stable identifier, never reshuffled.
    pub id: String,
    /// The prompt shown to the examinee.
    pub text: String,
    /// Maximum points awarded for this question.
    #[serde(default)]
    pub points: f64,
    /// Optional feedback shown after grading.
    #[serde(default)]
    pub feedback: Option<String>,
    /// Variant-specific payload.
    #[serde(flatten)]
    pub kind: QuestionKind,
}

/// The eight question variants and their authored answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QuestionKind {
    MultipleChoice {
        options: Vec<ChoiceOption>,
        #[serde(default)]
        randomize_options: bool,
    },
    MultipleResponse {
        options: Vec<ChoiceOption>,
        #[serde(default)]
        randomize_options: bool,
    },
    FreeText,
    WeightedChoice {
        options: Vec<WeightedOption>,
        #[serde(default)]
        randomize_options: bool,
        #[serde(default)]
        allow_multiple_selections: bool,
    },
    ArgumentReconstruction {
        items: Vec<ArgumentItem>,
        /// Canonical order: premises, then the conclusion, then distractors.
        correct_order: Vec<String>,
    },
    TrueFalseJustification {
        affirmation: String,
        is_affirmation_true: bool,
        justification_options: Vec<ChoiceOption>,
        #[serde(default = "default_sub_points")]
        points_for_affirmation: f64,
        #[serde(default = "default_sub_points")]
        points_for_justification: f64,
        #[serde(default)]
        randomize_justification_options: bool,
    },
    TrueFalseComplex {
        statement: String,
        is_statement_true: bool,
    },
    Cloze {
        text_with_placeholders: String,
        #[serde(default)]
        sub_questions: Vec<ClozeSubQuestion>,
    },
}

fn default_sub_points() -> f64 {
    5.0
}

impl QuestionKind {
    /// The wire tag of this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice { .. } => "multiple-choice",
            QuestionKind::MultipleResponse { .. } => "multiple-response",
            QuestionKind::FreeText => "free-text",
            QuestionKind::WeightedChoice { .. } => "weighted-choice",
            QuestionKind::ArgumentReconstruction { .. } => "argument-reconstruction",
            QuestionKind::TrueFalseJustification { .. } => "true-false-justification",
            QuestionKind::TrueFalseComplex { .. } => "true-false-complex",
            QuestionKind::Cloze { .. } => "cloze",
        }
    }
}

/// An option that is either right or wrong.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// An option contributing a signed percentage (-100..=100) of the points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedOption {
    pub id: String,
    pub text: String,
    pub percentage: f64,
}

/// An item to be placed in an argument reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentItem {
    pub id: String,
    pub text: String,
}

/// Kind of blank inside a cloze question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClozeBlankKind {
    MultipleChoice,
    ShortAnswer,
    Numerical,
}

/// One blank of a cloze question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClozeSubQuestion {
    pub id: String,
    pub placeholder_label: String,
    #[serde(rename = "type")]
    pub kind: ClozeBlankKind,
    #[serde(default)]
    pub points: f64,
    #[serde(default)]
    pub options: Vec<ClozeOption>,
    /// Authored answer for a single-select multiple-choice blank.
    #[serde(default)]
    pub correct_option_id: Option<String>,
    /// Authored answers when several options may be selected.
    #[serde(default)]
    pub correct_option_ids: Vec<String>,
    #[serde(default, alias = "allow_multiple_selections_in_sub_question")]
    pub allow_multiple_selections: bool,
    #[serde(default, alias = "randomize_sub_question_options")]
    pub randomize_options: bool,
    /// Expected value for short-answer and numerical blanks.
    #[serde(default)]
    pub correct_answer: Option<serde_json::Value>,
}

/// An option of a multiple-choice cloze blank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClozeOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// What happens when the main countdown reaches zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnTimeUpAction {
    #[default]
    AutoSubmit,
    PreventSubmit,
    AllowSubmissionGracePeriod,
}

impl fmt::Display for OnTimeUpAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnTimeUpAction::AutoSubmit => write!(f, "auto-submit"),
            OnTimeUpAction::PreventSubmit => write!(f, "prevent-submit"),
            OnTimeUpAction::AllowSubmissionGracePeriod => {
                write!(f, "allow-submission-grace-period")
            }
        }
    }
}

impl FromStr for OnTimeUpAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto-submit" => Ok(OnTimeUpAction::AutoSubmit),
            "prevent-submit" => Ok(OnTimeUpAction::PreventSubmit),
            "allow-submission-grace-period" | "grace" => {
                Ok(OnTimeUpAction::AllowSubmissionGracePeriod)
            }
            other => Err(format!("unknown on-time-up action: {other}")),
        }
    }
}

/// A qualitative band, e.g. "Excellent" from 90%.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitativeRating {
    pub label: String,
    pub min_percentage: f64,
    #[serde(default)]
    pub is_passing: Option<bool>,
}

/// How a final score is turned into a verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "evaluation_type", rename_all = "lowercase")]
pub enum EvaluationPolicy {
    Quantitative {
        #[serde(default)]
        approval_threshold: Option<f64>,
    },
    Qualitative {
        #[serde(default)]
        ratings: Vec<QualitativeRating>,
    },
}

impl Default for EvaluationPolicy {
    fn default() -> Self {
        EvaluationPolicy::Quantitative {
            approval_threshold: None,
        }
    }
}

/// The static definition of a timed exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamDefinition {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub on_time_up_action: OnTimeUpAction,
    #[serde(default)]
    pub grace_period_minutes: Option<u32>,
    #[serde(default)]
    pub auto_submit_on_focus_loss: bool,
    #[serde(default)]
    pub randomize_questions: bool,
    #[serde(default)]
    pub evaluation: EvaluationPolicy,
}

impl ExamDefinition {
    /// Look up a question by its stable id.
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Sum of the points of every question.
    pub fn total_points(&self) -> f64 {
        self.questions.iter().map(|q| q.points.max(0.0)).sum()
    }
}

/// Response to a true-false-justification question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JustifiedResponse {
    pub affirmation_response: Option<bool>,
    pub justification_id: Option<String>,
}

/// The examinee's raw response. Its shape depends on the question variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// No response recorded.
    Empty,
    Flag(bool),
    /// A single option id or free text.
    Text(String),
    /// Selected option ids, or an ordering of item ids.
    Ids(Vec<String>),
    Justified(JustifiedResponse),
    /// Cloze responses keyed by placeholder label.
    Blanks(BTreeMap<String, serde_json::Value>),
}

impl AnswerValue {
    /// The empty value a fresh session starts with for this variant.
    pub fn default_for(kind: &QuestionKind) -> Self {
        match kind {
            QuestionKind::MultipleResponse { .. } | QuestionKind::ArgumentReconstruction { .. } => {
                AnswerValue::Ids(Vec::new())
            }
            QuestionKind::WeightedChoice {
                allow_multiple_selections: true,
                ..
            } => AnswerValue::Ids(Vec::new()),
            QuestionKind::TrueFalseJustification { .. } => {
                AnswerValue::Justified(JustifiedResponse::default())
            }
            QuestionKind::TrueFalseComplex { .. } => AnswerValue::Empty,
            QuestionKind::Cloze { .. } => AnswerValue::Blanks(BTreeMap::new()),
            QuestionKind::MultipleChoice { .. }
            | QuestionKind::FreeText
            | QuestionKind::WeightedChoice { .. } => AnswerValue::Text(String::new()),
        }
    }

    /// Whether the examinee has interacted with the question in a meaningful way.
    pub fn is_answered(&self) -> bool {
        match self {
            AnswerValue::Empty => false,
            AnswerValue::Flag(_) => true,
            AnswerValue::Text(s) => !s.is_empty(),
            AnswerValue::Ids(ids) => !ids.is_empty(),
            AnswerValue::Justified(r) => {
                r.affirmation_response.is_some()
                    || r.justification_id.as_deref().is_some_and(|j| !j.is_empty())
            }
            AnswerValue::Blanks(blanks) => blanks.values().any(|v| match v {
                serde_json::Value::Null => false,
                serde_json::Value::String(s) => !s.is_empty(),
                serde_json::Value::Array(a) => !a.is_empty(),
                _ => true,
            }),
        }
    }
}

/// The examinee's recorded response to one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    pub value: AnswerValue,
    #[serde(default)]
    pub score: Option<f64>,
}

/// The kind of integrity-relevant event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InfractionKind {
    Copy,
    Paste,
    FocusLost,
}

impl fmt::Display for InfractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfractionKind::Copy => write!(f, "copy"),
            InfractionKind::Paste => write!(f, "paste"),
            InfractionKind::FocusLost => write!(f, "focus-lost"),
        }
    }
}

/// A timestamped integrity event. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Infraction {
    #[serde(rename = "type")]
    pub kind: InfractionKind,
    pub timestamp: DateTime<Utc>,
}

impl Infraction {
    pub fn now(kind: InfractionKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// What caused a submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmitTrigger {
    User,
    Timer,
    FocusLoss,
}

impl fmt::Display for SubmitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitTrigger::User => write!(f, "user"),
            SubmitTrigger::Timer => write!(f, "timer"),
            SubmitTrigger::FocusLoss => write!(f, "focus-loss"),
        }
    }
}

/// Advisory feedback from an essay grader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EssayFeedback {
    #[serde(default)]
    pub key_themes: Vec<String>,
    #[serde(default)]
    pub key_facts: Vec<String>,
    /// Suggested grade on a 0..=100 scale.
    pub grade_suggestion: f64,
}

/// Essay feedback attached to the question it was produced for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EssayGradingResult {
    pub question_id: String,
    pub feedback: EssayFeedback,
}

/// The final, immutable record of a completed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub exam_id: String,
    pub student_id: String,
    /// One answer per question, in exam order, each carrying its score.
    pub answers: Vec<Answer>,
    /// Sum of per-question scores, rounded and floored at zero.
    pub score: u32,
    pub elapsed_seconds: u64,
    #[serde(default)]
    pub infractions: Vec<Infraction>,
    #[serde(default)]
    pub essay_feedback: Vec<EssayGradingResult>,
    pub trigger: SubmitTrigger,
    pub submitted_at: DateTime<Utc>,
}
