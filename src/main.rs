use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use log::warn;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use pytx::error::{PipelineError, RenderError};
use pytx::report::{self, ReportFormat};
use pytx::runner::{CancelToken, ConsoleEventListener, Pipeline};
use pytx::utils::config::{Config, RunConfig};

const EXIT_FATAL: u8 = 1;
const EXIT_TESTS_FAILED: u8 = 2;
const EXIT_RENDER_FAILED: u8 = 3;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "pytx")]
#[command(version)]
#[command(about = "Run API test suites and generate DOCX/HTML/JSON/JUnit reports", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct RunArgs {
    /// Directory containing test_*.yaml files
    #[arg(long, default_value = "tests")]
    test_dir: PathBuf,

    /// Environment file with BASE_API_URL, TEST_USER, ...
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Output directory for reports
    #[arg(short, long, default_value = "./output")]
    output: PathBuf,

    /// Report formats (comma-separated): docx, json, html, junit
    #[arg(short, long, value_delimiter = ',', default_value = "docx,json")]
    format: Vec<ReportFormat>,

    /// File name pattern for test discovery
    #[arg(long, default_value = "test_*.y*ml")]
    pattern: String,

    /// Only run tests carrying one of these tags (comma-separated)
    #[arg(long = "tag", value_delimiter = ',')]
    tags: Vec<String>,

    /// Number of tests executing at the same time
    #[arg(short = 'j', long, default_value = "1")]
    concurrency: usize,

    /// Per-test timeout in seconds
    #[arg(long, default_value = "60")]
    unit_timeout_secs: u64,

    /// Whole-run timeout in seconds
    #[arg(long)]
    run_timeout_secs: Option<u64>,

    /// Login attempts on network failure
    #[arg(long, default_value = "3")]
    session_attempts: u32,

    /// Default HTTP request timeout in milliseconds
    #[arg(long, default_value = "10000")]
    request_timeout_ms: u64,

    /// Custom login endpoint (defaults to /login, then /authenticate)
    #[arg(long)]
    auth_endpoint: Option<String>,

    /// Exit with code 2 when any test failed or errored
    #[arg(long, default_value = "false")]
    fail_on_test_failure: bool,

    /// Log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate report from saved JSON results
    Report {
        /// Path to test results JSON
        results: PathBuf,

        /// Output format (json, html, junit, docx)
        #[arg(short, long, default_value = "html")]
        format: ReportFormat,

        /// Output directory
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Log verbosity (-v info, -vv debug)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Report {
            results,
            format,
            output,
            verbose,
        }) => {
            init_logging(verbose);
            println!(
                "{} Generating {} report from: {}",
                "📊".to_string().blue(),
                format.to_string().cyan(),
                results.display()
            );
            match report::generate_report(&results, format, &output) {
                Ok(path) => {
                    println!("  Report saved to: {}", path.display().to_string().cyan());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("{} {:#}", "✗".red().bold(), e);
                    if e.downcast_ref::<RenderError>().is_some() {
                        ExitCode::from(EXIT_RENDER_FAILED)
                    } else {
                        ExitCode::from(EXIT_FATAL)
                    }
                }
            }
        }
        None => {
            init_logging(cli.run.verbose);
            run(cli.run).await
        }
    }
}

async fn run(args: RunArgs) -> ExitCode {
    let run_config = match RunConfig::from_env(&args.test_dir, Some(args.env_file.as_path())) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), PipelineError::from(e));
            return ExitCode::from(EXIT_FATAL);
        }
    };

    println!(
        "{} Running tests from: {}",
        "▶".green().bold(),
        args.test_dir.display()
    );
    println!("  Target: {}", run_config.base_api_url.cyan());
    println!(
        "  Project: {} / {} / {}",
        run_config.project_name.cyan(),
        run_config.environment_name.cyan(),
        run_config.test_cycle.cyan()
    );
    if args.concurrency > 1 {
        println!("  Concurrency: {}", args.concurrency.to_string().yellow());
    }
    println!("  Output: {}", args.output.display().to_string().cyan());

    let config = Config {
        pattern: args.pattern,
        tags: args.tags,
        concurrency: args.concurrency,
        unit_timeout: Duration::from_secs(args.unit_timeout_secs),
        run_timeout: args.run_timeout_secs.map(Duration::from_secs),
        session_attempts: args.session_attempts,
        request_timeout_ms: args.request_timeout_ms,
        auth_endpoint: args.auth_endpoint,
        ..Config::default()
    };

    // First Ctrl+C stops dispatching; in-flight tests finish and the report is
    // still written. A second one exits immediately.
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if handler_token.cancel() {
            eprintln!("\n{} Interrupted again, exiting without a report", "✗".red().bold());
            std::process::exit(EXIT_INTERRUPTED);
        }
        println!(
            "\n{} Cancelling run... (press Ctrl+C again to exit now)",
            "⏹".yellow()
        );
    }) {
        warn!("Could not install Ctrl+C handler: {}", e);
    }

    let pipeline = Pipeline::new(run_config, config)
        .with_formats(args.format)
        .with_output_dir(args.output)
        .with_cancel_token(cancel);

    let listener = tokio::spawn(ConsoleEventListener::listen(pipeline.subscribe()));
    let result = pipeline.run().await;
    drop(pipeline);
    let _ = listener.await;

    let report = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{} Run aborted {}", "✗".red().bold(), e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    if let Some(dir) = report.logs.first().and_then(|p| p.parent()) {
        println!("  {} Run logs in {}", "📄".to_string().blue(), dir.display());
    }
    if report.render_failed() {
        for e in &report.render_errors {
            eprintln!("{} {}", "✗".red().bold(), e);
        }
        return ExitCode::from(EXIT_RENDER_FAILED);
    }
    if args.fail_on_test_failure && report.summary.has_problems() {
        return ExitCode::from(EXIT_TESTS_FAILED);
    }
    ExitCode::SUCCESS
}
