//! The `proctor inspect` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use proctor_core::loader::parse_exam;
use proctor_core::model::{EvaluationPolicy, OnTimeUpAction, QuestionKind};

pub fn execute(exam_path: PathBuf) -> Result<()> {
    let exam = parse_exam(&exam_path)?;

    let title = if exam.title.is_empty() {
        exam.id.clone()
    } else {
        format!("{} ({})", exam.title, exam.id)
    };
    println!("Exam: {title}");
    println!("Duration: {} min", exam.duration_minutes);
    match exam.on_time_up_action {
        OnTimeUpAction::AllowSubmissionGracePeriod => println!(
            "On time up: {} ({} min)",
            exam.on_time_up_action,
            exam.grace_period_minutes.unwrap_or(0)
        ),
        action => println!("On time up: {action}"),
    }
    println!(
        "Auto-submit on focus loss: {}",
        if exam.auto_submit_on_focus_loss { "yes" } else { "no" }
    );
    match &exam.evaluation {
        EvaluationPolicy::Quantitative { approval_threshold } => println!(
            "Evaluation: quantitative, pass at {}%",
            approval_threshold.unwrap_or(proctor_core::evaluation::DEFAULT_APPROVAL_THRESHOLD)
        ),
        EvaluationPolicy::Qualitative { ratings } => {
            println!("Evaluation: qualitative, {} rating(s)", ratings.len())
        }
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Id", "Type", "Points", "Details"]);
    for (i, question) in exam.questions.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&question.id),
            Cell::new(question.kind.tag()),
            Cell::new(format_points(question.points)),
            Cell::new(details(&question.kind)),
        ]);
    }
    println!("\n{table}");
    println!(
        "{} question(s), {} point(s) total",
        exam.questions.len(),
        format_points(exam.total_points())
    );

    Ok(())
}

fn format_points(points: f64) -> String {
    if points.fract() == 0.0 {
        format!("{points:.0}")
    } else {
        format!("{points:.2}")
    }
}

fn details(kind: &QuestionKind) -> String {
    match kind {
        QuestionKind::MultipleChoice { options, .. }
        | QuestionKind::MultipleResponse { options, .. } => {
            format!("{} options", options.len())
        }
        QuestionKind::WeightedChoice {
            options,
            allow_multiple_selections,
            ..
        } => {
            let mode = if *allow_multiple_selections { "multi" } else { "single" };
            format!("{} weighted options, {mode}", options.len())
        }
        QuestionKind::ArgumentReconstruction { items, .. } => format!("{} items", items.len()),
        QuestionKind::TrueFalseJustification {
            justification_options,
            ..
        } => format!("{} justifications", justification_options.len()),
        QuestionKind::TrueFalseComplex { .. } => String::new(),
        QuestionKind::FreeText => "essay, not auto-scored".to_string(),
        QuestionKind::Cloze { sub_questions, .. } => {
            format!("{} blanks, not auto-scored", sub_questions.len())
        }
    }
}
