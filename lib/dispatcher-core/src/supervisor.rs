//! Process supervisor with crash-loop protection

use crate::{DispatcherError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Attempts shorter than this count as short failures
pub const MIN_RUNTIME: Duration = Duration::from_secs(60);

/// Number of short failures after which the supervisor gives up
pub const MAX_SHORT_FAILURES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    Aborted,
}

/// How the supervisor finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// Cancellation was requested; clean exit.
    Shutdown,
    /// Too many attempts ended before the minimum runtime.
    CrashLoop { short_failures: u32 },
    /// An attempt failed in a way restarting cannot fix.
    Fatal(String),
}

impl SupervisorOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorOutcome::Shutdown => 0,
            SupervisorOutcome::CrashLoop { .. } | SupervisorOutcome::Fatal(_) => 1,
        }
    }
}

/// Record of one finished run attempt
#[derive(Debug)]
pub struct RunAttempt {
    pub started: Instant,
    pub elapsed: Duration,
    pub error: Option<DispatcherError>,
}

/// Supervisor restarts the run attempt until shutdown or a crash loop.
///
/// The short failure counter only ever increases: a long healthy run does not
/// reset it, so short failures spread over a long lifetime still add up to
/// the limit.
pub struct Supervisor {
    min_runtime: Duration,
    max_short_failures: u32,
    short_failures: u32,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(min_runtime: Duration, max_short_failures: u32) -> Self {
        Self {
            min_runtime,
            max_short_failures,
            short_failures: 0,
            state: SupervisorState::Running,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn short_failures(&self) -> u32 {
        self.short_failures
    }

    /// Run `attempt` repeatedly, with no delay between attempts.
    pub async fn run<F, Fut>(&mut self, cancel: &CancellationToken, mut attempt: F) -> SupervisorOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        loop {
            let started = Instant::now();
            let result = attempt().await;
            let record = RunAttempt {
                started,
                elapsed: started.elapsed(),
                error: result.err(),
            };

            if let Some(outcome) = self.record(record, cancel.is_cancelled()) {
                return outcome;
            }
        }
    }

    /// Account for a finished attempt; returns an outcome once supervision ends.
    pub fn record(&mut self, attempt: RunAttempt, cancelled: bool) -> Option<SupervisorOutcome> {
        if let Some(err) = &attempt.error {
            error!("Run died after {:?}: {}", attempt.elapsed, err);
        }

        if cancelled {
            info!("Shutdown requested, stopping supervisor");
            return Some(SupervisorOutcome::Shutdown);
        }

        if let Some(err) = attempt.error.as_ref().filter(|e| e.is_fatal()) {
            self.state = SupervisorState::Aborted;
            error!("Fatal error, not restarting: {}", err);
            return Some(SupervisorOutcome::Fatal(err.to_string()));
        }

        if attempt.elapsed < self.min_runtime {
            self.short_failures += 1;
            warn!(
                "Run lasted less than {:?} ({} of {} short failures)",
                self.min_runtime, self.short_failures, self.max_short_failures
            );
        }

        if self.short_failures >= self.max_short_failures {
            self.state = SupervisorState::Aborted;
            error!("Too many short-term deaths ({})", self.short_failures);
            return Some(SupervisorOutcome::CrashLoop {
                short_failures: self.short_failures,
            });
        }

        None
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(MIN_RUNTIME, MAX_SHORT_FAILURES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn died() -> DispatcherError {
        DispatcherError::Watch(SourceError::InvalidDefinition("connection refused".to_string()))
    }

    fn attempt_lasting(elapsed: Duration) -> RunAttempt {
        RunAttempt {
            started: Instant::now(),
            elapsed,
            error: Some(died()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborts_after_max_short_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let mut supervisor = Supervisor::default();

        let counter = attempts.clone();
        let outcome = supervisor
            .run(&cancel, move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Err(died())
                }
            })
            .await;

        assert_eq!(outcome, SupervisorOutcome::CrashLoop { short_failures: 10 });
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 10);
        assert_eq!(supervisor.state(), SupervisorState::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_runs_are_always_restarted() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let mut supervisor = Supervisor::default();

        let counter = attempts.clone();
        let attempt_cancel = cancel.clone();
        let outcome = supervisor
            .run(&cancel, move || {
                let counter = counter.clone();
                let cancel = attempt_cancel.clone();
                async move {
                    tokio::time::sleep(Duration::from_secs(120)).await;
                    if counter.fetch_add(1, Ordering::SeqCst) + 1 == 25 {
                        cancel.cancel();
                        return Ok(());
                    }
                    Err(died())
                }
            })
            .await;

        assert_eq!(outcome, SupervisorOutcome::Shutdown);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(attempts.load(Ordering::SeqCst), 25);
        assert_eq!(supervisor.short_failures(), 0);
    }

    #[test]
    fn test_counter_is_not_reset_by_long_runs() {
        let mut supervisor = Supervisor::default();

        for _ in 0..5 {
            assert!(supervisor.record(attempt_lasting(Duration::from_secs(1)), false).is_none());
        }
        assert!(supervisor.record(attempt_lasting(Duration::from_secs(3600)), false).is_none());
        assert_eq!(supervisor.short_failures(), 5);

        for _ in 0..4 {
            assert!(supervisor.record(attempt_lasting(Duration::from_secs(1)), false).is_none());
        }
        assert_eq!(supervisor.state(), SupervisorState::Running);

        let outcome = supervisor.record(attempt_lasting(Duration::from_secs(1)), false);
        assert_eq!(outcome, Some(SupervisorOutcome::CrashLoop { short_failures: 10 }));
    }

    #[test]
    fn test_fatal_error_aborts_immediately() {
        let mut supervisor = Supervisor::default();
        let attempt = RunAttempt {
            started: Instant::now(),
            elapsed: Duration::from_millis(5),
            error: Some(DispatcherError::SourceConstruction {
                id: 1,
                source: SourceError::InvalidDefinition("empty name".to_string()),
            }),
        };

        let outcome = supervisor.record(attempt, false).unwrap();
        assert!(matches!(outcome, SupervisorOutcome::Fatal(_)));
        assert_eq!(supervisor.short_failures(), 0);
        assert_eq!(supervisor.state(), SupervisorState::Aborted);
    }

    #[test]
    fn test_cancellation_wins_over_short_failure() {
        let mut supervisor = Supervisor::new(MIN_RUNTIME, 1);
        let outcome = supervisor.record(attempt_lasting(Duration::from_secs(1)), true);
        assert_eq!(outcome, Some(SupervisorOutcome::Shutdown));
        assert_eq!(supervisor.short_failures(), 0);
    }
}
