//! The `proctor take` command.
//!
//! Replays a script of timed actions against a live session. The session
//! clock is simulated: one loop iteration is one exam second, optionally
//! paced against the wall clock with `--pace-ms`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use proctor_core::integrity::{Disposition, InfractionStream, IntegrityMonitor, SurfaceSignal};
use proctor_core::loader::parse_exam;
use proctor_core::model::{AnswerValue, ExamDefinition, Submission, SubmitTrigger};
use proctor_core::session::{ExamSession, IntegrityOutcome, SubmitOutcome};
use proctor_core::store::MemoryStore;
use proctor_core::traits::{EssayGrader, SubmissionStore};
use proctor_providers::config::{create_grader, load_config_from, ProctorConfig};
use proctor_store::JsonDirStore;

use super::results::print_submission;

pub struct TakeOptions {
    pub exam: PathBuf,
    pub script: PathBuf,
    pub student: String,
    pub seed: Option<u64>,
    pub pace_ms: u64,
    pub grader: Option<String>,
    pub store: Option<PathBuf>,
    pub dry_run: bool,
    pub config: Option<PathBuf>,
}

/// A timed list of examinee actions.
#[derive(Debug, Deserialize)]
pub(crate) struct Script {
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    at_secs: u64,
    action: Action,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    value: Option<AnswerValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum Action {
    Answer,
    Copy,
    Paste,
    /// The window lost focus.
    Blur,
    /// The page became hidden.
    Hide,
    /// The page became visible again.
    Show,
    Submit,
}

impl Script {
    fn parse(content: &str, exam: &ExamDefinition) -> Result<Self> {
        let mut script: Script = toml::from_str(content)?;
        for step in &script.steps {
            if step.action == Action::Answer {
                let question = step
                    .question
                    .as_deref()
                    .with_context(|| format!("answer at {}s has no question", step.at_secs))?;
                anyhow::ensure!(
                    exam.question(question).is_some(),
                    "answer at {}s references unknown question '{question}'",
                    step.at_secs
                );
                anyhow::ensure!(
                    step.value.is_some(),
                    "answer at {}s has no value",
                    step.at_secs
                );
            }
        }
        script.steps.sort_by_key(|s| s.at_secs);
        Ok(script)
    }

    fn load(path: &Path, exam: &ExamDefinition) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script: {}", path.display()))?;
        Self::parse(&content, exam)
            .with_context(|| format!("invalid script: {}", path.display()))
    }
}

fn select_grader(
    config: &ProctorConfig,
    name: Option<&str>,
) -> Result<Option<Arc<dyn EssayGrader>>> {
    match name {
        Some(name) => {
            let grader_config = config.graders.get(name).with_context(|| {
                let mut available: Vec<_> = config.graders.keys().collect();
                available.sort();
                format!("grader '{name}' not found in config. Available: {available:?}")
            })?;
            Ok(Some(create_grader(grader_config, config.essay_model.clone())?))
        }
        None => config.build_default_grader(),
    }
}

pub async fn execute(opts: TakeOptions) -> Result<()> {
    let config = load_config_from(opts.config.as_deref())?;
    let exam = Arc::new(parse_exam(&opts.exam)?);
    let script = Script::load(&opts.script, &exam)?;
    let grader = select_grader(&config, opts.grader.as_deref())?;

    let memory = Arc::new(MemoryStore::new());
    let files = JsonDirStore::new(opts.store.clone().unwrap_or_else(|| config.store_dir.clone()));
    let store: Arc<dyn SubmissionStore> = if opts.dry_run {
        memory.clone()
    } else {
        Arc::new(files.clone())
    };

    let mut builder = ExamSession::builder(Arc::clone(&exam), opts.student.clone(), store)
        .grader_timeout(Duration::from_secs(config.grader_timeout_secs));
    if let Some(grader) = grader {
        builder = builder.grader(grader);
    }
    if let Some(seed) = opts.seed {
        builder = builder.seed(seed);
    }
    let session = builder.build();
    let (monitor, mut infractions) = IntegrityMonitor::new();

    eprintln!(
        "proctor v{}: {} question(s), {} min",
        env!("CARGO_PKG_VERSION"),
        exam.questions.len(),
        exam.duration_minutes
    );

    let mut steps = script.steps.into_iter().peekable();
    let mut second: u64 = 0;
    while !session.phase().is_terminal() {
        while let Some(step) = steps.next_if(|s| s.at_secs <= second) {
            run_step(&session, &monitor, &mut infractions, step).await?;
            if session.phase().is_terminal() {
                break;
            }
        }
        if session.phase().is_terminal() {
            break;
        }

        session.tick().await?;
        second += 1;
        if opts.pace_ms > 0 {
            tokio::time::sleep(Duration::from_millis(opts.pace_ms)).await;
        }
    }
    monitor.set_enabled(false);

    let phase = session.phase();
    info!(%phase, second, "session closed");

    let Some(id) = session.submission_id() else {
        println!("Session {phase} without a submission: time ran out and late submission is not allowed.");
        return Ok(());
    };

    let submission: Submission = if opts.dry_run {
        memory
            .submissions()
            .into_iter()
            .find(|(saved_id, _)| saved_id == &id)
            .map(|(_, submission)| submission)
            .context("submission missing from memory store")?
    } else {
        files.load(&id).await?.submission
    };

    print_submission(&exam, &submission, Some(&id));
    if opts.dry_run {
        println!("\n(dry run, submission not written)");
    } else {
        println!("\nSaved to {}", files.dir().join(format!("{id}.json")).display());
    }

    Ok(())
}

async fn run_step(
    session: &ExamSession,
    monitor: &IntegrityMonitor,
    infractions: &mut InfractionStream,
    step: Step,
) -> Result<()> {
    let signal = match step.action {
        Action::Answer => {
            let (Some(question), Some(value)) = (step.question, step.value) else {
                return Ok(());
            };
            if let Err(e) = session.set_answer(&question, value) {
                warn!(at = step.at_secs, question = %question, "answer rejected: {e}");
            }
            return Ok(());
        }
        Action::Submit => {
            match session.submit(SubmitTrigger::User).await? {
                SubmitOutcome::Submitted(receipt) => {
                    info!(at = step.at_secs, submission = %receipt.id, "submitted");
                }
                outcome => warn!(at = step.at_secs, ?outcome, "submit had no effect"),
            }
            return Ok(());
        }
        Action::Copy => SurfaceSignal::Copy,
        Action::Paste => SurfaceSignal::Paste,
        Action::Blur => SurfaceSignal::WindowBlur,
        Action::Hide => SurfaceSignal::VisibilityChange { hidden: true },
        Action::Show => SurfaceSignal::VisibilityChange { hidden: false },
    };

    if monitor.observe(signal) == Disposition::Suppress {
        info!(at = step.at_secs, "paste suppressed");
    }
    while let Some(infraction) = infractions.try_recv() {
        if let IntegrityOutcome::Submitted(SubmitOutcome::Submitted(receipt)) =
            session.report_integrity_event(infraction).await?
        {
            info!(at = step.at_secs, submission = %receipt.id, "submitted after focus loss");
        }
    }
    Ok(())
}
