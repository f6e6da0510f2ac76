//! The `proctor init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_absent(Path::new("proctor.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("exams")?;
    write_if_absent(Path::new("exams/sample.toml"), SAMPLE_EXAM)?;

    std::fs::create_dir_all("scripts")?;
    write_if_absent(Path::new("scripts/sample-run.toml"), SAMPLE_SCRIPT)?;

    println!("\nNext steps:");
    println!("  1. Edit proctor.toml to pick an essay grader");
    println!("  2. Run: proctor inspect --exam exams/sample.toml");
    println!("  3. Run: proctor take --exam exams/sample.toml --script scripts/sample-run.toml");

    Ok(())
}

fn write_if_absent(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# proctor configuration

# Grader used for advisory essay feedback. Remove to skip essay grading.
default_grader = "offline"
store_dir = "./proctor-submissions"
grader_timeout_secs = 60

[graders.offline]
type = "mock"

[graders.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[graders.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[graders.ollama]
type = "ollama"
base_url = "http://localhost:11434"
"#;

pub(crate) const SAMPLE_EXAM: &str = r#"id = "sample-logic"
title = "Logic basics"
duration_minutes = 10
on_time_up_action = "allow-submission-grace-period"
grace_period_minutes = 2
auto_submit_on_focus_loss = false
randomize_questions = false

[evaluation]
evaluation_type = "quantitative"
approval_threshold = 60

[[questions]]
id = "capital"
text = "What is the capital of France?"
points = 2
type = "multiple-choice"
randomize_options = true
options = [
  { id = "paris", text = "Paris", is_correct = true },
  { id = "rome", text = "Rome" },
  { id = "madrid", text = "Madrid" },
]

[[questions]]
id = "primes"
text = "Select every prime number."
points = 3
type = "multiple-response"
options = [
  { id = "two", text = "2", is_correct = true },
  { id = "three", text = "3", is_correct = true },
  { id = "four", text = "4" },
  { id = "nine", text = "9" },
]

[[questions]]
id = "syllogism"
text = "Reconstruct the argument: premises first, then the conclusion, then anything left over."
points = 4
type = "argument-reconstruction"
items = [
  { id = "p1", text = "All humans are mortal." },
  { id = "p2", text = "Socrates is a human." },
  { id = "c", text = "Socrates is mortal." },
  { id = "d", text = "Socrates was Greek." },
]
correct_order = ["p1", "p2", "c", "d"]

[[questions]]
id = "modus-ponens"
text = "Decide whether the affirmation holds and pick the best justification."
points = 2
type = "true-false-justification"
affirmation = "From 'if P then Q' and 'P' we may conclude 'Q'."
is_affirmation_true = true
points_for_affirmation = 1
points_for_justification = 1
justification_options = [
  { id = "j1", text = "That is the definition of modus ponens.", is_correct = true },
  { id = "j2", text = "Only if Q is also known to be true." },
]

[[questions]]
id = "sky"
text = "True or false?"
points = 1
type = "true-false-complex"
statement = "A valid argument can have a false conclusion."
is_statement_true = true

[[questions]]
id = "fallacy"
text = "Which answer best names the fallacy in 'everyone believes it, so it is true'?"
points = 2
type = "weighted-choice"
options = [
  { id = "popularity", text = "Appeal to popularity", percentage = 100 },
  { id = "authority", text = "Appeal to authority", percentage = 50 },
  { id = "strawman", text = "Straw man", percentage = -50 },
]

[[questions]]
id = "essay"
text = "Explain the difference between validity and soundness."
points = 5
type = "free-text"
"#;

pub(crate) const SAMPLE_SCRIPT: &str = r#"# Each step runs when the simulated clock reaches `at_secs`.
# Actions: answer, copy, paste, blur, hide, show, submit.

[[steps]]
at_secs = 3
action = "answer"
question = "capital"
value = "paris"

[[steps]]
at_secs = 10
action = "answer"
question = "primes"
value = ["three", "two"]

[[steps]]
at_secs = 20
action = "answer"
question = "syllogism"
value = ["p2", "p1", "c", "d"]

[[steps]]
at_secs = 30
action = "paste"

[[steps]]
at_secs = 35
action = "answer"
question = "modus-ponens"
value = { affirmation_response = true, justification_id = "j1" }

[[steps]]
at_secs = 40
action = "answer"
question = "sky"
value = true

[[steps]]
at_secs = 45
action = "answer"
question = "fallacy"
value = "authority"

[[steps]]
at_secs = 50
action = "answer"
question = "essay"
value = "A valid argument has a form where true premises guarantee a true conclusion. A sound argument is valid and its premises are actually true."

[[steps]]
at_secs = 60
action = "submit"
"#;
