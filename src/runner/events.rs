use super::state::{OutcomeStatus, RunSummary};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Run events for real-time console output
#[derive(Debug, Clone)]
pub enum TestEvent {
    // Run events
    RunStarted {
        run_id: String,
        test_dir: String,
        concurrency: usize,
    },
    SessionEstablished {
        base_url: String,
        user: String,
    },
    RunFinished {
        summary: RunSummary,
    },

    // Unit events
    UnitStarted {
        index: usize,
        unit_id: String,
        name: String,
    },
    UnitFinished {
        index: usize,
        unit_id: String,
        name: String,
        status: OutcomeStatus,
        duration_ms: u64,
    },

    // Log event for coordinated output
    Log {
        message: String,
    },
}

/// Event emitter for broadcasting run events
pub struct EventEmitter {
    sender: broadcast::Sender<TestEvent>,
}

impl EventEmitter {
    pub fn emit(&self, event: TestEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }
}

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    /// Print events until every emitter is dropped
    pub async fn listen(mut receiver: broadcast::Receiver<TestEvent>) {
        use colored::Colorize;
        use indicatif::ProgressDrawTarget;
        use std::io::IsTerminal;

        let multi = if std::io::stdout().is_terminal() {
            MultiProgress::new()
        } else {
            // Piped output: no escape codes
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        // In-flight units by dispatch index
        let mut spinners: HashMap<usize, ProgressBar> = HashMap::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                TestEvent::RunStarted {
                    run_id,
                    test_dir,
                    concurrency,
                } => {
                    multi
                        .println(format!(
                            "\n{} Test run started: {} ({}, {} worker{})",
                            "▶".green().bold(),
                            run_id.cyan(),
                            test_dir,
                            concurrency,
                            if concurrency == 1 { "" } else { "s" }
                        ))
                        .ok();
                }

                TestEvent::SessionEstablished { base_url, user } => {
                    multi
                        .println(format!(
                            "  {} Authenticated as {} against {}",
                            "🔑".yellow(),
                            user.white().bold(),
                            base_url
                        ))
                        .ok();
                }

                TestEvent::UnitStarted { index, name, .. } => {
                    let pb = multi.add(ProgressBar::new_spinner());
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("    {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    pb.set_message(format!("[{}] {}... ", index + 1, name.dimmed()));
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinners.insert(index, pb);
                }

                TestEvent::UnitFinished {
                    index,
                    name,
                    status,
                    duration_ms,
                    ..
                } => {
                    let (icon, tail) = match &status {
                        OutcomeStatus::Passed => ("✓".green(), String::new()),
                        OutcomeStatus::Failed { message, .. } => {
                            ("✗".red(), format!(" {}", first_line(message).red()))
                        }
                        OutcomeStatus::Skipped { reason } => {
                            ("○".yellow(), format!(" {}", reason.dimmed()))
                        }
                        OutcomeStatus::Errored { detail } => {
                            ("!".red().bold(), format!(" {}", first_line(detail).red()))
                        }
                    };
                    let line = format!(
                        "    {} [{}] {} ({}ms){}",
                        icon,
                        index + 1,
                        name,
                        duration_ms,
                        tail
                    );

                    if let Some(pb) = spinners.remove(&index) {
                        pb.finish_and_clear();
                    }
                    multi.println(line).ok();
                }

                TestEvent::RunFinished { summary } => {
                    for (_, pb) in spinners.drain() {
                        pb.finish_and_clear();
                    }

                    // Direct stdout so the summary is not overwritten by MultiProgress
                    println!("\n{} Test run finished", "■".blue().bold());
                    println!("  Total tests: {}", summary.total);
                    println!(
                        "  {} passed, {} failed, {} skipped, {} errored",
                        summary.passed.to_string().green(),
                        summary.failed.to_string().red(),
                        summary.skipped.to_string().yellow(),
                        summary.errored.to_string().red()
                    );
                    println!("  Duration: {}ms", summary.duration_ms);
                }

                TestEvent::Log { message } => {
                    multi.println(format!("      {}", message)).ok();
                }
            }
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
