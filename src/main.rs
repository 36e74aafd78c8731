use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use webqa::browser::ChromeLauncher;
use webqa::dsl::{TestDefinition, TestResult, input_schema, parse_test_definition, validate_test_definition};
use webqa::interpreter::{Interpreter, InterpreterConfig};
use webqa::session::list_sessions;

/// webqa - JSON-described browser tests with recorded evidence
#[derive(Parser, Debug)]
#[command(
    name = "webqa",
    about = "Run JSON-described browser tests against Chromium and record the session",
    after_help = "ENVIRONMENT VARIABLES:\n\
        WEBQA_RECORDINGS_DIR       Base directory for recordings\n\
        WEBQA_HEADLESS             Run Chromium headless (true/false)\n\
        WEBQA_CHROME_PATH          Chromium executable\n\
        WEBQA_ACTION_TIMEOUT       Element action timeout (ms)\n\
        WEBQA_WAIT_FOR_TIMEOUT     Default wait_for timeout (ms)\n\
        WEBQA_VIDEO_GRACE          Delay before looking for the recording (ms)\n\
        WEBQA_VIDEO_POLL_ATTEMPTS  Recording lookups before giving up\n\
        RUST_LOG                   Log filter (default: info)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a test definition and print its report
    Run {
        /// JSON file with {"test_name": ..., "steps": [...]}
        #[arg(required_unless_present_all = ["name", "steps"], conflicts_with_all = ["name", "steps"])]
        file: Option<PathBuf>,

        /// Test name, used together with --steps instead of a file
        #[arg(long, requires = "steps")]
        name: Option<String>,

        /// Steps as a JSON array
        #[arg(long, requires = "name")]
        steps: Option<String>,

        /// Base directory for recordings
        #[arg(long, env = "WEBQA_RECORDINGS_DIR")]
        recordings_dir: Option<PathBuf>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Chromium executable
        #[arg(long, env = "WEBQA_CHROME_PATH")]
        chrome: Option<PathBuf>,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a test definition without running it
    Validate {
        /// JSON file with the test definition
        file: PathBuf,
    },

    /// Print the JSON schema of test definitions
    Schema,

    /// List recording directories
    Sessions {
        /// Base directory for recordings
        #[arg(long, env = "WEBQA_RECORDINGS_DIR")]
        recordings_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Some(Commands::Run {
            file,
            name,
            steps,
            recordings_dir,
            headed,
            chrome,
            json,
        }) => {
            let definition = load_definition(file, name, steps)?;

            let mut config = InterpreterConfig::default();
            if let Some(dir) = recordings_dir {
                config = config.recordings_dir(dir);
            }
            if headed {
                config = config.headless(false);
            }
            let mut launcher = ChromeLauncher::from_config();
            if let Some(path) = chrome {
                launcher = launcher.executable(path);
            }

            let interpreter = Interpreter::with_config(launcher, config);
            let result = interpreter.execute_test(&definition).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_report(&result);
            }
            if !result.success {
                std::process::exit(1);
            }
        }

        Some(Commands::Validate { file }) => {
            let raw = std::fs::read_to_string(&file)?;
            match parse_test_definition(&raw) {
                Ok(definition) => println!("{}", serde_json::to_string_pretty(&definition)?),
                Err(e) => {
                    eprintln!("Invalid test definition: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Some(Commands::Schema) => {
            println!("{}", serde_json::to_string_pretty(&input_schema())?);
        }

        Some(Commands::Sessions { recordings_dir }) => {
            let base = recordings_dir.unwrap_or_else(webqa::config::recordings_dir);
            let sessions = list_sessions(&base)?;
            if sessions.is_empty() {
                println!("No recordings in {}", base.display());
            }
            for dir in sessions {
                println!("{}", dir.display());
            }
        }

        None => {
            println!("webqa - JSON-described browser tests with recorded evidence");
            println!();
            println!("Usage: webqa <COMMAND>");
            println!();
            println!("Commands:");
            println!("  run       Execute a test definition and print its report");
            println!("  validate  Check a test definition without running it");
            println!("  schema    Print the JSON schema of test definitions");
            println!("  sessions  List recording directories");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(())
}

fn load_definition(
    file: Option<PathBuf>,
    name: Option<String>,
    steps: Option<String>,
) -> Result<TestDefinition, Box<dyn Error>> {
    if let Some(path) = file {
        let raw = std::fs::read_to_string(&path)?;
        return Ok(parse_test_definition(&raw)?);
    }
    let steps: serde_json::Value = serde_json::from_str(steps.as_deref().unwrap_or("[]"))?;
    let input = serde_json::json!({
        "test_name": name.unwrap_or_default(),
        "steps": steps,
    });
    Ok(validate_test_definition(&input)?)
}

fn print_report(result: &TestResult) {
    let status = if result.success { "PASSED" } else { "FAILED" };
    println!(
        "{} {} ({}/{} steps, {} ms)",
        status, result.test_name, result.steps_executed, result.steps_total, result.total_duration_ms
    );
    for step in &result.step_results {
        let mark = if step.success { "ok" } else { "FAIL" };
        println!(
            "  [{}] Step {} {} ({} ms)",
            mark, step.step_index, step.action, step.duration_ms
        );
        if let Some(error) = &step.error {
            println!("        {}", error);
        }
    }
    for shot in &result.screenshots {
        println!("  Screenshot: {}", shot);
    }
    if let Some(video) = &result.video_path {
        println!("  Recording: {}", video);
    }
    if let Some(error) = &result.error {
        println!("\nError: {}", error);
    }
}
