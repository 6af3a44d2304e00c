use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::events::{EventEmitter, TestEvent};
use super::session::Session;
use super::state::{Outcome, OutcomeStatus, ResultAggregator};
use super::unit::{TestUnit, UnitRun};

/// Shared flag that stops the executor from dispatching further units
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the token had already been cancelled
    pub fn cancel(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs test units against the shared session and turns each one into
/// exactly one [`Outcome`].
pub struct TestExecutor {
    session: Arc<Session>,
    emitter: Arc<EventEmitter>,
    unit_timeout: Duration,
    concurrency: usize,
    cancel: CancelToken,
    deadline: Option<Instant>,
}

impl TestExecutor {
    pub fn new(session: Arc<Session>, emitter: Arc<EventEmitter>) -> Self {
        Self {
            session,
            emitter,
            unit_timeout: Duration::from_secs(60),
            concurrency: 1,
            cancel: CancelToken::new(),
            deadline: None,
        }
    }

    pub fn with_unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Bound the whole run, counted from now
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = timeout.map(|t| Instant::now() + t);
        self
    }

    fn stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Execute every unit and feed the outcomes to `aggregator` in input
    /// order, whatever order they complete in.
    pub async fn run_all<I>(&self, units: I, aggregator: &mut ResultAggregator)
    where
        I: IntoIterator<Item = TestUnit>,
    {
        let mut outcomes = stream::iter(units.into_iter().enumerate())
            .map(|(index, unit)| self.execute(index, unit))
            .buffered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            aggregator.add(outcome);
        }
    }

    /// Run one unit in its own task. Panics and timeouts become `Errored`.
    pub async fn execute(&self, index: usize, unit: TestUnit) -> Outcome {
        let started_at = Utc::now();
        let path = unit.path.display().to_string();

        if self.stopped() {
            debug!("Not dispatching {}: run cancelled", unit.id);
            let status = OutcomeStatus::errored("cancelled");
            self.emit_finished(index, &unit, &status, 0);
            return Outcome {
                unit_id: unit.id,
                name: unit.name,
                path,
                suite: unit.suite,
                status,
                started_at,
                finished_at: started_at,
                duration_ms: 0,
                timings: Vec::new(),
            };
        }

        self.emitter.emit(TestEvent::UnitStarted {
            index,
            unit_id: unit.id.clone(),
            name: unit.name.clone(),
        });

        let clock = Instant::now();
        let body = unit.body.clone();
        let session = self.session.clone();
        let mut handle = tokio::spawn(async move { body.run(&session).await });

        let (limit, clipped) = match self.deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(clock);
                if left < self.unit_timeout {
                    (left, true)
                } else {
                    (self.unit_timeout, false)
                }
            }
            None => (self.unit_timeout, false),
        };

        let run = match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(run)) => run,
            Ok(Err(e)) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                warn!("Unit {} panicked: {}", unit.id, message);
                UnitRun::new(OutcomeStatus::errored(format!("panicked: {}", message)))
            }
            Ok(Err(e)) => UnitRun::new(OutcomeStatus::errored(format!("task aborted: {}", e))),
            Err(_) => {
                handle.abort();
                let status = if clipped {
                    OutcomeStatus::errored(format!(
                        "cancelled: run deadline reached after {}ms in this unit",
                        limit.as_millis()
                    ))
                } else {
                    OutcomeStatus::errored(format!(
                        "timed out after {}s",
                        self.unit_timeout.as_secs_f64()
                    ))
                };
                warn!("Unit {} abandoned: {}", unit.id, status.message().unwrap_or(""));
                UnitRun::new(status)
            }
        };

        let duration_ms = clock.elapsed().as_millis() as u64;
        self.emit_finished(index, &unit, &run.status, duration_ms);

        Outcome {
            unit_id: unit.id,
            name: unit.name,
            path,
            suite: unit.suite,
            status: run.status,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            timings: run.timings,
        }
    }

    fn emit_finished(&self, index: usize, unit: &TestUnit, status: &OutcomeStatus, duration_ms: u64) {
        self.emitter.emit(TestEvent::UnitFinished {
            index,
            unit_id: unit.id.clone(),
            name: unit.name.clone(),
            status: status.clone(),
            duration_ms,
        });
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
