//! proctor CLI: run timed exam sessions from the terminal.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "proctor", version, about = "Timed exam sessions with integrity monitoring")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take an exam by replaying a timed script against a live session
    Take {
        /// Path to the exam definition (.toml or .json)
        #[arg(long)]
        exam: PathBuf,

        /// Path to the session script (.toml)
        #[arg(long)]
        script: PathBuf,

        /// Examinee identifier
        #[arg(long, default_value = "anonymous")]
        student: String,

        /// Seed for question and option shuffling
        #[arg(long)]
        seed: Option<u64>,

        /// Real milliseconds per simulated second (0 runs as fast as possible)
        #[arg(long, default_value = "0")]
        pace_ms: u64,

        /// Grader to use for essays, overriding `default_grader`
        #[arg(long)]
        grader: Option<String>,

        /// Directory submissions are written to, overriding `store_dir`
        #[arg(long)]
        store: Option<PathBuf>,

        /// Keep the submission in memory instead of writing it
        #[arg(long)]
        dry_run: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show an exam's settings and questions
    Inspect {
        /// Path to the exam definition
        #[arg(long)]
        exam: PathBuf,
    },

    /// Evaluate stored submissions against their exam
    Results {
        /// Path to the exam definition
        #[arg(long)]
        exam: PathBuf,

        /// Submission id; lists every submission for the exam when omitted
        #[arg(long)]
        submission: Option<String>,

        /// Directory submissions are read from, overriding `store_dir`
        #[arg(long)]
        store: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List configured essay graders
    ListGraders {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter config, exam and script
    Init,
}

#[tokio::main]
async fn main() {
    let filter = match "proctor=info".parse() {
        Ok(directive) => tracing_subscriber::EnvFilter::from_default_env().add_directive(directive),
        Err(_) => tracing_subscriber::EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Take {
            exam,
            script,
            student,
            seed,
            pace_ms,
            grader,
            store,
            dry_run,
            config,
        } => {
            commands::take::execute(commands::take::TakeOptions {
                exam,
                script,
                student,
                seed,
                pace_ms,
                grader,
                store,
                dry_run,
                config,
            })
            .await
        }
        Commands::Inspect { exam } => commands::inspect::execute(exam),
        Commands::Results {
            exam,
            submission,
            store,
            format,
            config,
        } => commands::results::execute(exam, submission, store, format, config).await,
        Commands::ListGraders { config } => commands::list_graders::execute(config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
