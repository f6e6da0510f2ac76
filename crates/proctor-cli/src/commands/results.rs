//! The `proctor results` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use proctor_core::evaluation::{evaluate, ResultEvaluation, ResultStatus};
use proctor_core::loader::parse_exam;
use proctor_core::model::{ExamDefinition, Submission};
use proctor_providers::config::load_config_from;
use proctor_store::JsonDirStore;

pub async fn execute(
    exam_path: PathBuf,
    submission_id: Option<String>,
    store_dir: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let exam = parse_exam(&exam_path)?;
    let dir = match store_dir {
        Some(dir) => dir,
        None => load_config_from(config_path.as_deref())?.store_dir,
    };
    let store = JsonDirStore::new(dir);

    match submission_id {
        Some(id) => {
            let stored = store
                .load(&id)
                .await
                .with_context(|| format!("failed to load submission from {}", store.dir().display()))?;
            anyhow::ensure!(
                stored.submission.exam_id == exam.id,
                "submission {id} belongs to exam '{}', not '{}'",
                stored.submission.exam_id,
                exam.id
            );
            let evaluation = evaluate(stored.submission.score, &exam);
            if format == "json" {
                let out = serde_json::json!({
                    "id": stored.id,
                    "evaluation": evaluation,
                    "submission": stored.submission,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_submission(&exam, &stored.submission, Some(&stored.id));
            }
        }
        None => {
            let all: Vec<_> = store
                .list()
                .await?
                .into_iter()
                .filter(|s| s.submission.exam_id == exam.id)
                .collect();

            if format == "json" {
                let out: Vec<_> = all
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "id": s.id,
                            "student_id": s.submission.student_id,
                            "evaluation": evaluate(s.submission.score, &exam),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            if all.is_empty() {
                println!("No submissions for exam '{}'.", exam.id);
                return Ok(());
            }

            let mut table = Table::new();
            table.set_header(vec![
                "Id",
                "Student",
                "Submitted",
                "Trigger",
                "Score",
                "Result",
                "Infractions",
            ]);
            for stored in &all {
                let s = &stored.submission;
                let evaluation = evaluate(s.score, &exam);
                table.add_row(vec![
                    Cell::new(&stored.id),
                    Cell::new(&s.student_id),
                    Cell::new(s.submitted_at.format("%Y-%m-%d %H:%M:%S")),
                    Cell::new(s.trigger),
                    Cell::new(format!("{}/{}", s.score, evaluation.total_points)),
                    Cell::new(verdict(&evaluation)),
                    Cell::new(s.infractions.len()),
                ]);
            }
            println!("{table}");
            println!("{} submission(s)", all.len());
        }
    }

    Ok(())
}

pub(crate) fn status_label(status: ResultStatus) -> &'static str {
    match status {
        ResultStatus::Passed => "passed",
        ResultStatus::Failed => "failed",
        ResultStatus::UnderReview => "under review",
    }
}

fn verdict(evaluation: &ResultEvaluation) -> String {
    match &evaluation.label {
        Some(label) => format!("{label} ({})", status_label(evaluation.status)),
        None => status_label(evaluation.status).to_string(),
    }
}

/// Print a submission with its per-question breakdown and verdict.
pub(crate) fn print_submission(exam: &ExamDefinition, submission: &Submission, id: Option<&str>) {
    let evaluation = evaluate(submission.score, exam);

    if let Some(id) = id {
        println!("Submission: {id}");
    }
    println!("Student: {}", submission.student_id);
    println!("Trigger: {}", submission.trigger);
    println!(
        "Elapsed: {}m {:02}s",
        submission.elapsed_seconds / 60,
        submission.elapsed_seconds % 60
    );

    let mut table = Table::new();
    table.set_header(vec!["Question", "Type", "Answered", "Score"]);
    for answer in &submission.answers {
        let question = exam.question(&answer.question_id);
        table.add_row(vec![
            Cell::new(&answer.question_id),
            Cell::new(question.map(|q| q.kind.tag()).unwrap_or("?")),
            Cell::new(if answer.value.is_answered() { "yes" } else { "no" }),
            Cell::new(format!(
                "{:.2}/{}",
                answer.score.unwrap_or(0.0),
                question.map(|q| q.points).unwrap_or(0.0)
            )),
        ]);
    }
    println!("\n{table}");

    match evaluation.percentage {
        Some(pct) => println!(
            "Score: {}/{} ({pct:.1}%), {}",
            submission.score,
            evaluation.total_points,
            verdict(&evaluation)
        ),
        None => println!(
            "Score: {}/{}, {}",
            submission.score,
            evaluation.total_points,
            verdict(&evaluation)
        ),
    }

    if !submission.infractions.is_empty() {
        println!("Infractions: {}", submission.infractions.len());
        for infraction in &submission.infractions {
            println!(
                "  {} at {}",
                infraction.kind,
                infraction.timestamp.format("%H:%M:%S")
            );
        }
    }

    for result in &submission.essay_feedback {
        println!(
            "Essay feedback for {}: suggested grade {:.0}/100",
            result.question_id, result.feedback.grade_suggestion
        );
        if !result.feedback.key_themes.is_empty() {
            println!("  themes: {}", result.feedback.key_themes.join(", "));
        }
        if !result.feedback.key_facts.is_empty() {
            println!("  facts: {}", result.feedback.key_facts.join(", "));
        }
    }
}
