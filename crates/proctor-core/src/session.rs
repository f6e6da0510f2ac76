//! The exam session controller.
//!
//! Owns the answer map, question pointer, infraction log and clock for one
//! examinee, and funnels every submission trigger (user, timer, focus loss)
//! through a single-flight guard so at most one [`Submission`] is produced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use crate::clock::{ClockEvent, Phase, SessionClock, TimingPolicy};
use crate::error::{ProviderError, SessionError};
use crate::integrity::InfractionStream;
use crate::model::{
    Answer, AnswerValue, EssayGradingResult, ExamDefinition, Infraction, InfractionKind, Question,
    QuestionKind, SubmitTrigger, Submission,
};
use crate::presentation::Presentation;
use crate::scoring;
use crate::traits::{EssayGrader, EssayRequest, SubmissionStore};

const DEFAULT_GRADER_TIMEOUT: Duration = Duration::from_secs(60);

// Submission guard states.
const IDLE: u8 = 0;
const IN_FLIGHT: u8 = 1;
const DONE: u8 = 2;
const ABANDONED: u8 = 3;

/// Result of a submission request.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// This call produced and saved the submission.
    Submitted(SubmissionReceipt),
    /// Another trigger is currently submitting.
    InProgress,
    /// The session was already submitted.
    AlreadySubmitted,
}

/// A saved submission and the id the store assigned to it.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub id: String,
    pub submission: Submission,
}

/// Result of reporting an integrity event.
#[derive(Debug, Clone)]
pub enum IntegrityOutcome {
    /// The infraction was logged.
    Recorded,
    /// The infraction was logged and triggered an automatic submission.
    Submitted(SubmitOutcome),
}

/// Answered indicator for one question, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionStatus {
    pub question_id: String,
    pub answered: bool,
}

/// How an essay grading failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraderFailure {
    /// Bad credentials or an unknown model; every later request fails too.
    Permanent,
    RateLimited { retry_after_ms: u64 },
    Transient,
}

impl GraderFailure {
    fn classify(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<ProviderError>() {
            Some(e) if e.is_permanent() => GraderFailure::Permanent,
            Some(e) => match e.retry_after_ms() {
                Some(retry_after_ms) => GraderFailure::RateLimited { retry_after_ms },
                None => GraderFailure::Transient,
            },
            None => GraderFailure::Transient,
        }
    }
}

struct SessionState {
    clock: SessionClock,
    answers: HashMap<String, AnswerValue>,
    current: usize,
    infractions: Vec<Infraction>,
    submission_id: Option<String>,
}

/// Builder for [`ExamSession`].
pub struct SessionBuilder {
    exam: Arc<ExamDefinition>,
    student_id: String,
    store: Arc<dyn SubmissionStore>,
    grader: Option<Arc<dyn EssayGrader>>,
    grader_timeout: Duration,
    seed: Option<u64>,
}

impl SessionBuilder {
    /// Forward non-empty essay answers to this grader at submission time.
    pub fn grader(mut self, grader: Arc<dyn EssayGrader>) -> Self {
        self.grader = Some(grader);
        self
    }

    pub fn grader_timeout(mut self, timeout: Duration) -> Self {
        self.grader_timeout = timeout;
        self
    }

    /// Seed the presentation shuffle for a reproducible display order.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> ExamSession {
        let presentation = match self.seed {
            Some(seed) => Presentation::new(&self.exam, &mut StdRng::seed_from_u64(seed)),
            None => Presentation::new(&self.exam, &mut rand::thread_rng()),
        };

        let answers = self
            .exam
            .questions
            .iter()
            .map(|q| (q.id.clone(), AnswerValue::default_for(&q.kind)))
            .collect();

        let state = SessionState {
            clock: SessionClock::new(TimingPolicy::from_exam(&self.exam)),
            answers,
            current: 0,
            infractions: Vec::new(),
            submission_id: None,
        };

        info!(
            exam = %self.exam.id,
            student = %self.student_id,
            questions = self.exam.questions.len(),
            "exam session started"
        );

        ExamSession {
            exam: self.exam,
            student_id: self.student_id,
            presentation,
            store: self.store,
            grader: self.grader,
            grader_timeout: self.grader_timeout,
            state: Mutex::new(state),
            guard: AtomicU8::new(IDLE),
        }
    }
}

/// One examinee taking one exam.
pub struct ExamSession {
    exam: Arc<ExamDefinition>,
    student_id: String,
    presentation: Presentation,
    store: Arc<dyn SubmissionStore>,
    grader: Option<Arc<dyn EssayGrader>>,
    grader_timeout: Duration,
    state: Mutex<SessionState>,
    guard: AtomicU8,
}

impl ExamSession {
    pub fn builder(
        exam: Arc<ExamDefinition>,
        student_id: impl Into<String>,
        store: Arc<dyn SubmissionStore>,
    ) -> SessionBuilder {
        SessionBuilder {
            exam,
            student_id: student_id.into(),
            store,
            grader: None,
            grader_timeout: DEFAULT_GRADER_TIMEOUT,
            seed: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Read-only projections
    // -----------------------------------------------------------------------

    pub fn exam(&self) -> &ExamDefinition {
        &self.exam
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    pub fn phase(&self) -> Phase {
        self.state().clock.phase()
    }

    pub fn remaining_secs(&self) -> u64 {
        self.state().clock.remaining_secs()
    }

    /// Remaining time of the active countdown as `MM:SS`.
    pub fn formatted_remaining(&self) -> String {
        self.state().clock.formatted_remaining()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.state().clock.elapsed_secs()
    }

    /// Whether a submission is currently being assembled or saved.
    pub fn is_submitting(&self) -> bool {
        self.guard.load(Ordering::Acquire) == IN_FLIGHT
    }

    /// Id of the saved submission, once there is one.
    pub fn submission_id(&self) -> Option<String> {
        self.state().submission_id.clone()
    }

    pub fn answer(&self, question_id: &str) -> Option<AnswerValue> {
        self.state().answers.get(question_id).cloned()
    }

    pub fn infractions(&self) -> Vec<Infraction> {
        self.state().infractions.clone()
    }

    /// Answered indicator for every question, in display order.
    pub fn question_status(&self) -> Vec<QuestionStatus> {
        let state = self.state();
        self.presentation
            .question_order()
            .iter()
            .map(|id| QuestionStatus {
                question_id: id.clone(),
                answered: state.answers.get(id).is_some_and(AnswerValue::is_answered),
            })
            .collect()
    }

    pub fn current_index(&self) -> usize {
        self.state().current
    }

    /// The question at the current display position.
    pub fn current_question(&self) -> Option<&Question> {
        let index = self.current_index();
        self.presentation
            .question_order()
            .get(index)
            .and_then(|id| self.exam.question(id))
    }

    // -----------------------------------------------------------------------
    // Examinee actions
    // -----------------------------------------------------------------------

    /// Record the examinee's response to a question.
    ///
    /// Only allowed while the session is in `Main` or `Grace` and no
    /// submission is in flight.
    pub fn set_answer(&self, question_id: &str, value: AnswerValue) -> Result<(), SessionError> {
        let mut state = self.state();
        let phase = state.clock.phase();
        if phase.is_terminal() {
            debug!(question = question_id, %phase, "answer ignored, session closed");
            return Err(SessionError::Terminal(phase));
        }
        if self.guard.load(Ordering::Acquire) == IN_FLIGHT {
            return Err(SessionError::Submitting);
        }
        match state.answers.get_mut(question_id) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(SessionError::UnknownQuestion(question_id.to_string())),
        }
    }

    /// Move the question pointer to a display position.
    pub fn go_to_question(&self, index: usize) -> Result<(), SessionError> {
        let mut state = self.state();
        let phase = state.clock.phase();
        if phase.is_terminal() {
            return Err(SessionError::Terminal(phase));
        }
        let len = self.presentation.len();
        if index >= len {
            return Err(SessionError::IndexOutOfRange { index, len });
        }
        state.current = index;
        Ok(())
    }

    /// Advance to the next question. Returns `false` at the end or once closed.
    pub fn next_question(&self) -> bool {
        let next = self.current_index() + 1;
        self.go_to_question(next).is_ok()
    }

    /// Go back one question. Returns `false` at the start or once closed.
    pub fn previous_question(&self) -> bool {
        match self.current_index().checked_sub(1) {
            Some(prev) => self.go_to_question(prev).is_ok(),
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Clock and integrity
    // -----------------------------------------------------------------------

    /// Advance the clock by one second, submitting automatically on expiry.
    pub async fn tick(&self) -> Result<Option<ClockEvent>, SessionError> {
        let event = self.state().clock.tick();

        match event {
            Some(ClockEvent::GraceStarted { seconds }) => {
                info!(exam = %self.exam.id, seconds, "main time up, grace period started");
            }
            Some(ClockEvent::Prevented) => {
                warn!(exam = %self.exam.id, "time up, submission is no longer possible");
            }
            Some(ClockEvent::Expired) => {
                info!(exam = %self.exam.id, "time up, submitting automatically");
                self.submit(SubmitTrigger::Timer).await?;
            }
            None => {}
        }

        Ok(event)
    }

    /// Append an infraction and apply the focus-loss policy.
    pub async fn report_integrity_event(
        &self,
        infraction: Infraction,
    ) -> Result<IntegrityOutcome, SessionError> {
        let kind = infraction.kind;
        let auto_submit = {
            let mut state = self.state();
            state.infractions.push(infraction);
            kind == InfractionKind::FocusLost
                && self.exam.auto_submit_on_focus_loss
                && !state.clock.phase().is_terminal()
                && self.guard.load(Ordering::Acquire) == IDLE
        };

        warn!(exam = %self.exam.id, student = %self.student_id, %kind, "integrity infraction recorded");

        if auto_submit {
            info!(exam = %self.exam.id, "focus lost, submitting automatically");
            let outcome = self.submit(SubmitTrigger::FocusLoss).await?;
            return Ok(IntegrityOutcome::Submitted(outcome));
        }
        Ok(IntegrityOutcome::Recorded)
    }

    /// Report every infraction arriving on `stream` until the monitor goes away.
    pub async fn consume_integrity(&self, mut stream: InfractionStream) {
        while let Some(infraction) = stream.recv().await {
            if let Err(e) = self.report_integrity_event(infraction).await {
                error!("integrity-triggered submission failed: {e}");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Submit the session. Only the first caller proceeds.
    pub async fn submit(&self, trigger: SubmitTrigger) -> Result<SubmitOutcome, SessionError> {
        let phase = self.phase();
        if phase == Phase::Prevented {
            return Err(SessionError::Terminal(phase));
        }

        match self
            .guard
            .compare_exchange(IDLE, IN_FLIGHT, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(IN_FLIGHT) => {
                debug!(%trigger, "submission already in progress");
                return Ok(SubmitOutcome::InProgress);
            }
            Err(DONE) => {
                debug!(%trigger, "session already submitted");
                return Ok(SubmitOutcome::AlreadySubmitted);
            }
            Err(_) => return Err(SessionError::Terminal(Phase::Ended)),
        }

        info!(exam = %self.exam.id, student = %self.student_id, %trigger, "submitting");

        let (mut answers, infractions, elapsed_seconds) = {
            let state = self.state();
            let answers: Vec<Answer> = self
                .exam
                .questions
                .iter()
                .map(|q| Answer {
                    question_id: q.id.clone(),
                    value: state
                        .answers
                        .get(&q.id)
                        .cloned()
                        .unwrap_or_else(|| AnswerValue::default_for(&q.kind)),
                    score: None,
                })
                .collect();
            (answers, state.infractions.clone(), state.clock.elapsed_secs())
        };

        let score = scoring::score_answers(&self.exam.questions, &mut answers);
        let essay_feedback = self.grade_essays(&answers).await;

        let submission = Submission {
            exam_id: self.exam.id.clone(),
            student_id: self.student_id.clone(),
            answers,
            score,
            elapsed_seconds,
            infractions,
            essay_feedback,
            trigger,
            submitted_at: chrono::Utc::now(),
        };

        match self.store.save_submission(&submission).await {
            Ok(id) => {
                {
                    let mut state = self.state();
                    state.clock.finish();
                    state.submission_id = Some(id.clone());
                }
                self.guard.store(DONE, Ordering::Release);
                info!(exam = %self.exam.id, submission = %id, score, "submission saved");
                Ok(SubmitOutcome::Submitted(SubmissionReceipt { id, submission }))
            }
            Err(cause) => {
                let phase = self.phase();
                if phase.is_terminal() {
                    self.guard.store(ABANDONED, Ordering::Release);
                    error!(exam = %self.exam.id, %phase, "failed to save submission: {cause:#}");
                    Err(SessionError::PersistenceAfterEnd { phase, cause })
                } else {
                    self.guard.store(IDLE, Ordering::Release);
                    warn!(exam = %self.exam.id, "failed to save submission, retry allowed: {cause:#}");
                    Err(SessionError::Persistence(cause))
                }
            }
        }
    }

    /// Ask the grader about every non-empty essay. Failures are logged and skipped.
    async fn grade_essays(&self, answers: &[Answer]) -> Vec<EssayGradingResult> {
        let Some(grader) = &self.grader else {
            return Vec::new();
        };

        let requests: Vec<(String, EssayRequest)> = answers
            .iter()
            .filter_map(|answer| {
                let question = self.exam.question(&answer.question_id)?;
                match (&question.kind, &answer.value) {
                    (QuestionKind::FreeText, AnswerValue::Text(text)) if !text.trim().is_empty() => {
                        Some((
                            answer.question_id.clone(),
                            EssayRequest {
                                question: question.text.clone(),
                                answer: text.clone(),
                            },
                        ))
                    }
                    _ => None,
                }
            })
            .collect();

        let timeout = self.grader_timeout;
        let graded = join_all(requests.into_iter().map(|(question_id, request)| {
            let grader = Arc::clone(grader);
            async move {
                match tokio::time::timeout(timeout, grader.grade_essay(&request)).await {
                    Ok(Ok(feedback)) => Some(EssayGradingResult {
                        question_id,
                        feedback,
                    }),
                    Ok(Err(e)) => {
                        match GraderFailure::classify(&e) {
                            GraderFailure::Permanent => warn!(
                                question = %question_id,
                                grader = grader.name(),
                                "essay grading failed permanently, check the grader configuration: {e:#}"
                            ),
                            GraderFailure::RateLimited { retry_after_ms } => warn!(
                                question = %question_id,
                                grader = grader.name(),
                                retry_after_ms,
                                "essay grader is rate limited: {e:#}"
                            ),
                            GraderFailure::Transient => warn!(
                                question = %question_id,
                                grader = grader.name(),
                                "essay grading failed: {e:#}"
                            ),
                        }
                        None
                    }
                    Err(_) => {
                        warn!(question = %question_id, grader = grader.name(), "essay grading timed out after {}s", timeout.as_secs());
                        None
                    }
                }
            }
        }))
        .await;

        graded.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_exam_str;
    use crate::model::{EssayFeedback, JustifiedResponse};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::AtomicU32;

    const EXAM: &str = r#"
id = "midterm"
duration_minutes = 1
on_time_up_action = "auto-submit"

[[questions]]
id = "mc"
text = "Capital of France?"
points = 5
type = "multiple-choice"
options = [
  { id = "paris", text = "Paris", is_correct = true },
  { id = "rome", text = "Rome" },
]

[[questions]]
id = "tfj"
text = "Decide and justify"
points = 4
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
id = "essay"
text = "Explain photosynthesis"
points = 10
type = "free-text"
"#;

    fn exam_with(extra: &str) -> Arc<ExamDefinition> {
        let toml = format!("{extra}\n{EXAM}");
        Arc::new(parse_exam_str(&toml, Path::new("midterm.toml")).unwrap())
    }

    fn exam() -> Arc<ExamDefinition> {
        exam_with("")
    }

    fn session(exam: Arc<ExamDefinition>, store: Arc<MemoryStore>) -> ExamSession {
        ExamSession::builder(exam, "student-1", store).seed(1).build()
    }

    fn text(s: &str) -> AnswerValue {
        AnswerValue::Text(s.into())
    }

    struct FixedGrader {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl EssayGrader for FixedGrader {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn grade_essay(&self, request: &EssayRequest) -> anyhow::Result<EssayFeedback> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                anyhow::bail!("grader offline");
            }
            Ok(EssayFeedback {
                key_themes: vec![request.question.clone()],
                key_facts: vec![],
                grade_suggestion: 88.0,
            })
        }
    }

    #[tokio::test]
    async fn answers_start_empty_and_can_be_set() {
        let store = Arc::new(MemoryStore::new());
        let s = session(exam(), store);
        assert!(s.question_status().iter().all(|q| !q.answered));
        assert_eq!(
            s.answer("tfj"),
            Some(AnswerValue::Justified(JustifiedResponse::default()))
        );

        s.set_answer("mc", text("paris")).unwrap();
        assert_eq!(s.answer("mc"), Some(text("paris")));
        let answered: Vec<_> = s
            .question_status()
            .into_iter()
            .filter(|q| q.answered)
            .map(|q| q.question_id)
            .collect();
        assert_eq!(answered, vec!["mc".to_string()]);
    }

    #[tokio::test]
    async fn unknown_question_rejected() {
        let s = session(exam(), Arc::new(MemoryStore::new()));
        let err = s.set_answer("nope", text("x")).unwrap_err();
        assert!(matches!(err, SessionError::UnknownQuestion(id) if id == "nope"));
    }

    #[tokio::test]
    async fn navigation_is_bounded() {
        let s = session(exam(), Arc::new(MemoryStore::new()));
        assert_eq!(s.current_index(), 0);
        assert!(!s.previous_question());
        assert!(s.next_question());
        assert!(s.next_question());
        assert!(!s.next_question());
        assert_eq!(s.current_index(), 2);
        assert!(matches!(
            s.go_to_question(3),
            Err(SessionError::IndexOutOfRange { index: 3, len: 3 })
        ));
        s.go_to_question(0).unwrap();
        assert_eq!(s.current_question().unwrap().id, "mc");
    }

    #[tokio::test]
    async fn user_submission_scores_and_ends_session() {
        let store = Arc::new(MemoryStore::new());
        let s = session(exam(), Arc::clone(&store));
        s.set_answer("mc", text("paris")).unwrap();
        s.set_answer(
            "tfj",
            AnswerValue::Justified(JustifiedResponse {
                affirmation_response: Some(false),
                justification_id: Some("j1".into()),
            }),
        )
        .unwrap();
        for _ in 0..10 {
            s.tick().await.unwrap();
        }

        let outcome = s.submit(SubmitTrigger::User).await.unwrap();
        let SubmitOutcome::Submitted(receipt) = outcome else {
            panic!("expected a submission, got {outcome:?}");
        };
        assert_eq!(receipt.submission.score, 8);
        assert_eq!(receipt.submission.elapsed_seconds, 10);
        assert_eq!(receipt.submission.trigger, SubmitTrigger::User);
        assert_eq!(receipt.submission.answers.len(), 3);
        assert_eq!(receipt.submission.answers[0].score, Some(5.0));
        assert_eq!(receipt.submission.answers[1].score, Some(3.0));
        assert_eq!(receipt.submission.answers[2].score, Some(0.0));
        assert_eq!(s.phase(), Phase::Ended);
        assert_eq!(s.submission_id(), Some(receipt.id));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn terminal_session_rejects_edits_and_second_submission() {
        let store = Arc::new(MemoryStore::new());
        let s = session(exam(), Arc::clone(&store));
        s.submit(SubmitTrigger::User).await.unwrap();

        assert!(matches!(
            s.set_answer("mc", text("paris")),
            Err(SessionError::Terminal(Phase::Ended))
        ));
        assert_eq!(s.answer("mc"), Some(text("")));
        assert!(matches!(
            s.submit(SubmitTrigger::User).await.unwrap(),
            SubmitOutcome::AlreadySubmitted
        ));
        assert!(s.go_to_question(1).is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn timer_expiry_auto_submits_once() {
        let store = Arc::new(MemoryStore::new());
        let s = session(exam(), Arc::clone(&store));
        s.set_answer("mc", text("paris")).unwrap();

        let mut events = Vec::new();
        for _ in 0..70 {
            if let Some(event) = s.tick().await.unwrap() {
                events.push(event);
            }
        }
        assert_eq!(events, vec![ClockEvent::Expired]);
        assert_eq!(s.phase(), Phase::Ended);
        let saved = store.submissions();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].1.trigger, SubmitTrigger::Timer);
        assert_eq!(saved[0].1.score, 5);
        assert_eq!(saved[0].1.elapsed_seconds, 60);
    }

    #[tokio::test]
    async fn grace_period_then_auto_submit() {
        let store = Arc::new(MemoryStore::new());
        let exam = exam_with("");
        let mut exam = (*exam).clone();
        exam.on_time_up_action = crate::model::OnTimeUpAction::AllowSubmissionGracePeriod;
        exam.grace_period_minutes = Some(5);
        let s = session(Arc::new(exam), Arc::clone(&store));

        for _ in 0..60 {
            s.tick().await.unwrap();
        }
        assert_eq!(s.phase(), Phase::Grace);
        assert_eq!(s.remaining_secs(), 300);

        // Answers can still change during grace.
        s.set_answer("mc", text("paris")).unwrap();

        for _ in 0..299 {
            s.tick().await.unwrap();
        }
        assert!(store.is_empty());
        assert_eq!(s.tick().await.unwrap(), Some(ClockEvent::Expired));

        let saved = store.submissions();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].1.score, 5);
        assert_eq!(saved[0].1.elapsed_seconds, 60);
        assert_eq!(s.phase(), Phase::Ended);

        for _ in 0..10 {
            assert_eq!(s.tick().await.unwrap(), None);
        }
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn manual_submit_during_grace_ends_session() {
        let store = Arc::new(MemoryStore::new());
        let mut exam = (*exam()).clone();
        exam.on_time_up_action = crate::model::OnTimeUpAction::AllowSubmissionGracePeriod;
        exam.grace_period_minutes = Some(5);
        let s = session(Arc::new(exam), Arc::clone(&store));

        for _ in 0..90 {
            s.tick().await.unwrap();
        }
        assert_eq!(s.phase(), Phase::Grace);
        s.set_answer("mc", text("paris")).unwrap();

        let SubmitOutcome::Submitted(receipt) = s.submit(SubmitTrigger::User).await.unwrap() else {
            panic!("expected submission");
        };
        assert_eq!(receipt.submission.trigger, SubmitTrigger::User);
        assert_eq!(receipt.submission.score, 5);
        assert_eq!(receipt.submission.elapsed_seconds, 60);
        assert_eq!(s.phase(), Phase::Ended);

        // The grace countdown is gone; nothing fires later.
        for _ in 0..300 {
            assert_eq!(s.tick().await.unwrap(), None);
        }
        assert!(matches!(
            s.submit(SubmitTrigger::User).await.unwrap(),
            SubmitOutcome::AlreadySubmitted
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn prevent_submit_blocks_everything() {
        let store = Arc::new(MemoryStore::new());
        let mut exam = (*exam()).clone();
        exam.on_time_up_action = crate::model::OnTimeUpAction::PreventSubmit;
        let s = session(Arc::new(exam), Arc::clone(&store));

        for _ in 0..60 {
            s.tick().await.unwrap();
        }
        assert_eq!(s.phase(), Phase::Prevented);
        assert!(matches!(
            s.submit(SubmitTrigger::User).await,
            Err(SessionError::Terminal(Phase::Prevented))
        ));
        assert!(s.set_answer("mc", text("paris")).is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn focus_loss_auto_submits_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let s = session(
            exam_with("auto_submit_on_focus_loss = true"),
            Arc::clone(&store),
        );

        let first = s
            .report_integrity_event(Infraction::now(InfractionKind::FocusLost))
            .await
            .unwrap();
        assert!(matches!(
            first,
            IntegrityOutcome::Submitted(SubmitOutcome::Submitted(_))
        ));

        let second = s
            .report_integrity_event(Infraction::now(InfractionKind::FocusLost))
            .await
            .unwrap();
        assert!(matches!(second, IntegrityOutcome::Recorded));

        assert_eq!(store.len(), 1);
        assert_eq!(s.infractions().len(), 2);
        let saved = store.submissions();
        assert_eq!(saved[0].1.trigger, SubmitTrigger::FocusLoss);
        assert_eq!(saved[0].1.infractions.len(), 1);
    }

    #[tokio::test]
    async fn focus_loss_without_policy_only_records() {
        let store = Arc::new(MemoryStore::new());
        let s = session(exam(), Arc::clone(&store));
        for kind in [
            InfractionKind::Copy,
            InfractionKind::Paste,
            InfractionKind::FocusLost,
        ] {
            let outcome = s.report_integrity_event(Infraction::now(kind)).await.unwrap();
            assert!(matches!(outcome, IntegrityOutcome::Recorded));
        }
        assert_eq!(s.phase(), Phase::Main);
        assert!(store.is_empty());
        let kinds: Vec<_> = s.infractions().iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                InfractionKind::Copy,
                InfractionKind::Paste,
                InfractionKind::FocusLost
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn racing_triggers_produce_one_submission() {
        let store = Arc::new(MemoryStore::new().with_delay(Duration::from_millis(200)));
        let s = session(
            exam_with("auto_submit_on_focus_loss = true"),
            Arc::clone(&store),
        );

        let (user, timer, focus) = tokio::join!(
            s.submit(SubmitTrigger::User),
            s.submit(SubmitTrigger::Timer),
            s.report_integrity_event(Infraction::now(InfractionKind::FocusLost)),
        );

        assert!(matches!(user.unwrap(), SubmitOutcome::Submitted(_)));
        assert!(matches!(timer.unwrap(), SubmitOutcome::InProgress));
        assert!(matches!(focus.unwrap(), IntegrityOutcome::Recorded));
        assert_eq!(store.len(), 1);
        assert_eq!(s.infractions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn edits_are_frozen_while_submitting() {
        let store = Arc::new(MemoryStore::new().with_delay(Duration::from_millis(200)));
        let s = session(exam(), Arc::clone(&store));

        let (submitted, edit) = tokio::join!(s.submit(SubmitTrigger::User), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            s.set_answer("mc", text("paris"))
        });
        assert!(matches!(submitted.unwrap(), SubmitOutcome::Submitted(_)));
        assert!(matches!(edit, Err(SessionError::Submitting)));
    }

    #[tokio::test]
    async fn failed_save_while_open_allows_retry() {
        let store = Arc::new(MemoryStore::failing(1));
        let s = session(exam(), Arc::clone(&store));

        let err = s.submit(SubmitTrigger::User).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(s.phase(), Phase::Main);
        assert!(!s.is_submitting());

        s.set_answer("mc", text("paris")).unwrap();
        let outcome = s.submit(SubmitTrigger::User).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Submitted(ref r) if r.submission.score == 5));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn failed_save_after_expiry_is_terminal() {
        let store = Arc::new(MemoryStore::failing(1));
        let s = session(exam(), Arc::clone(&store));

        for _ in 0..59 {
            s.tick().await.unwrap();
        }
        let err = s.tick().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::PersistenceAfterEnd {
                phase: Phase::Ended,
                ..
            }
        ));
        assert!(!err.is_retryable());
        assert!(matches!(
            s.submit(SubmitTrigger::User).await,
            Err(SessionError::Terminal(Phase::Ended))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn essays_forwarded_to_grader_without_affecting_score() {
        let store = Arc::new(MemoryStore::new());
        let grader = Arc::new(FixedGrader {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let s = ExamSession::builder(exam(), "student-1", store.clone())
            .grader(grader.clone())
            .build();
        s.set_answer("essay", text("Plants turn light into sugar."))
            .unwrap();

        let SubmitOutcome::Submitted(receipt) = s.submit(SubmitTrigger::User).await.unwrap() else {
            panic!("expected submission");
        };
        assert_eq!(grader.calls.load(Ordering::Relaxed), 1);
        assert_eq!(receipt.submission.score, 0);
        assert_eq!(receipt.submission.essay_feedback.len(), 1);
        assert_eq!(receipt.submission.essay_feedback[0].question_id, "essay");
        assert_eq!(receipt.submission.essay_feedback[0].feedback.grade_suggestion, 88.0);
    }

    #[tokio::test]
    async fn grader_failure_does_not_block_submission() {
        let store = Arc::new(MemoryStore::new());
        let grader = Arc::new(FixedGrader {
            calls: AtomicU32::new(0),
            fail: true,
        });
        let s = ExamSession::builder(exam(), "student-1", store.clone())
            .grader(grader.clone())
            .build();
        s.set_answer("essay", text("Something")).unwrap();

        let outcome = s.submit(SubmitTrigger::User).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Submitted(ref r) if r.submission.essay_feedback.is_empty()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn grader_failures_are_classified() {
        let auth: anyhow::Error = ProviderError::AuthenticationFailed("bad key".into()).into();
        assert_eq!(GraderFailure::classify(&auth), GraderFailure::Permanent);

        let limited: anyhow::Error = ProviderError::RateLimited {
            retry_after_ms: 1500,
        }
        .into();
        assert_eq!(
            GraderFailure::classify(&limited),
            GraderFailure::RateLimited {
                retry_after_ms: 1500
            }
        );

        let timeout: anyhow::Error = ProviderError::Timeout(30).into();
        assert_eq!(GraderFailure::classify(&timeout), GraderFailure::Transient);
        let wrapped = anyhow::Error::from(ProviderError::ModelNotFound("m".into()))
            .context("grading essay");
        assert_eq!(GraderFailure::classify(&wrapped), GraderFailure::Permanent);
        assert_eq!(
            GraderFailure::classify(&anyhow::anyhow!("grader offline")),
            GraderFailure::Transient
        );
    }

    #[tokio::test]
    async fn blank_essays_are_not_sent() {
        let grader = Arc::new(FixedGrader {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let s = ExamSession::builder(exam(), "student-1", Arc::new(MemoryStore::new()))
            .grader(grader.clone())
            .build();
        s.set_answer("essay", text("   ")).unwrap();
        s.submit(SubmitTrigger::User).await.unwrap();
        assert_eq!(grader.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn consume_integrity_applies_policy() {
        let store = Arc::new(MemoryStore::new());
        let s = session(
            exam_with("auto_submit_on_focus_loss = true"),
            Arc::clone(&store),
        );
        let (monitor, stream) = crate::integrity::IntegrityMonitor::new();
        monitor.observe(crate::integrity::SurfaceSignal::Copy);
        monitor.observe(crate::integrity::SurfaceSignal::WindowBlur);
        monitor.observe(crate::integrity::SurfaceSignal::WindowBlur);
        drop(monitor);

        s.consume_integrity(stream).await;
        assert_eq!(s.infractions().len(), 3);
        assert_eq!(store.len(), 1);
        assert_eq!(s.phase(), Phase::Ended);
    }
}
