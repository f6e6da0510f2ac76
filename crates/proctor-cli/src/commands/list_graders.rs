//! The `proctor list-graders` command.

use std::path::PathBuf;

use anyhow::Result;

use proctor_providers::config::load_config_from;

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    if config.graders.is_empty() {
        println!("No graders configured. Run `proctor init` to create a config file.");
        return Ok(());
    }

    let mut names: Vec<&String> = config.graders.keys().collect();
    names.sort();
    for name in names {
        let grader = &config.graders[name];
        let marker = if config.default_grader.as_ref() == Some(name) {
            " (default)"
        } else {
            ""
        };
        println!("{name}: {}{marker}", grader.kind());
    }

    if let Some(model) = &config.essay_model {
        println!("\nEssay model: {model}");
    }

    Ok(())
}
