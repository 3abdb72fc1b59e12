// src/pkg/stability.rs

//! OSGi bundle stability monitor
//!
//! Bundle activation is asynchronous and can flap, so a deployment is
//! only declared done after N consecutive identical bundle-status
//! snapshots. Transient monitoring failures reset the run and, in rescue
//! mode, are themselves allowed to terminate the check after a barrier of
//! consecutive errors. Exhausting `max_attempts` is fatal.

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Polling policy for one stability check. Immutable per action.
#[derive(Debug, Clone)]
pub struct HealthcheckConfig {
    /// Treat `error_state_barrier` consecutive poll failures as a
    /// (degraded) success instead of continuing to poll
    pub rescue_mode: bool,
    /// Consecutive identical snapshots required to declare stability
    pub same_state_barrier: u32,
    /// Consecutive poll failures tolerated before rescue triggers
    pub error_state_barrier: u32,
    /// Total poll attempts before the check aborts fatally
    pub max_attempts: u32,
    /// Pause between poll attempts
    pub sleep_secs: u64,
}

impl HealthcheckConfig {
    /// Reject configurations the state machine cannot make progress with
    pub fn validate(&self) -> Result<()> {
        if self.same_state_barrier == 0 {
            return Err(Error::InitError(
                "same_state_barrier must be greater than 0".to_string(),
            ));
        }
        if self.error_state_barrier == 0 {
            return Err(Error::InitError(
                "error_state_barrier must be greater than 0".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::InitError(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Mutable state of one stability check. Created fresh per check,
/// discarded afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorRun {
    /// Snapshot seen on the previous successful poll
    pub previous: String,
    /// Length of the current streak of identical snapshots. A fresh
    /// snapshot starts a streak of 1; an error drops it back to 0.
    pub same_state: u32,
    /// Consecutive polls that failed
    pub errors: u32,
    /// Current attempt, starting at 1
    pub attempt: u32,
}

impl MonitorRun {
    pub fn new() -> Self {
        Self {
            previous: String::new(),
            same_state: 0,
            errors: 0,
            attempt: 1,
        }
    }
}

impl Default for MonitorRun {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a single poll against the bundle status endpoint
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// Endpoint answered with a status snapshot
    Snapshot(String),
    /// Endpoint could not be reached or answered garbage
    Failed(String),
}

/// Outcome of feeding one poll into the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Barrier not reached yet; keep polling with the updated run
    Continue(MonitorRun),
    /// Snapshots settled: the instance is stable
    Stabilized,
    /// Rescue mode accepted repeated poll failures as terminal
    Rescued,
}

/// Terminal successful verdicts of a stability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityVerdict {
    Stabilized,
    /// Success by policy, not by observation; callers should treat the
    /// deployment as degraded
    RescuedAfterErrors,
}

/// Advance the state machine by one poll.
///
/// Pure: all progress lives in the returned [`MonitorRun`], so the
/// machine is testable without a clock or a network.
pub fn step(mut run: MonitorRun, outcome: PollOutcome, config: &HealthcheckConfig) -> StepResult {
    match outcome {
        PollOutcome::Snapshot(snapshot) => {
            if snapshot == run.previous {
                run.same_state += 1;
            } else {
                run.same_state = 1;
            }
            // A successful poll ends any error streak
            run.errors = 0;
            run.previous = snapshot;

            debug!(
                "Attempt {}: same state count {}/{}",
                run.attempt, run.same_state, config.same_state_barrier
            );

            if run.same_state == config.same_state_barrier {
                return StepResult::Stabilized;
            }
        }
        PollOutcome::Failed(reason) => {
            // An error invalidates the stability run so far
            run.previous.clear();
            run.same_state = 0;
            run.errors += 1;

            warn!(
                "Attempt {}: bundle status poll failed ({}), error count {}/{}",
                run.attempt, reason, run.errors, config.error_state_barrier
            );

            if config.rescue_mode && run.errors == config.error_state_barrier {
                return StepResult::Rescued;
            }
        }
    }

    StepResult::Continue(run)
}

/// Poll `fetch` until the instance stabilizes or the check fails.
///
/// Sleeps `sleep_secs` between attempts, never after a terminal one.
/// Returns [`Error::StabilityTimeout`] once `max_attempts` polls have
/// passed without a terminal state; callers abort on that.
pub fn await_stability<F>(mut fetch: F, config: &HealthcheckConfig) -> Result<StabilityVerdict>
where
    F: FnMut() -> Result<String>,
{
    config.validate()?;

    let mut run = MonitorRun::new();

    loop {
        let outcome = match fetch() {
            Ok(snapshot) => PollOutcome::Snapshot(snapshot),
            Err(e) => PollOutcome::Failed(e.to_string()),
        };

        let attempt = run.attempt;
        run = match step(run, outcome, config) {
            StepResult::Stabilized => {
                info!("Bundles stabilized after {} attempt(s)", attempt);
                return Ok(StabilityVerdict::Stabilized);
            }
            StepResult::Rescued => {
                warn!(
                    "Accepting {} consecutive poll failures as terminal (rescue mode); \
                     instance state was not verified",
                    config.error_state_barrier
                );
                return Ok(StabilityVerdict::RescuedAfterErrors);
            }
            StepResult::Continue(run) => run,
        };

        if run.attempt == config.max_attempts {
            return Err(Error::StabilityTimeout(format!(
                "Bundles did not stabilize within {} attempts",
                config.max_attempts
            )));
        }

        std::thread::sleep(Duration::from_secs(config.sleep_secs));
        run.attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn config(rescue: bool, same: u32, errors: u32, max: u32) -> HealthcheckConfig {
        HealthcheckConfig {
            rescue_mode: rescue,
            same_state_barrier: same,
            error_state_barrier: errors,
            max_attempts: max,
            sleep_secs: 0,
        }
    }

    /// Drive `await_stability` from a scripted sequence of poll results
    fn run_scripted(
        script: Vec<std::result::Result<&'static str, &'static str>>,
        cfg: &HealthcheckConfig,
    ) -> (Result<StabilityVerdict>, usize) {
        let polls = RefCell::new(0usize);
        let script = RefCell::new(script.into_iter());
        let verdict = await_stability(
            || {
                *polls.borrow_mut() += 1;
                match script.borrow_mut().next().expect("script exhausted") {
                    Ok(s) => Ok(s.to_string()),
                    Err(e) => Err(Error::RemoteUnavailable(e.to_string())),
                }
            },
            cfg,
        );
        let count = *polls.borrow();
        (verdict, count)
    }

    #[test]
    fn test_stabilizes_at_barrier() {
        // Three identical snapshots with a barrier of three terminate on
        // exactly the third poll
        let cfg = config(false, 3, 5, 10);
        let (verdict, polls) = run_scripted(vec![Ok("A"), Ok("A"), Ok("A")], &cfg);
        assert_eq!(verdict.unwrap(), StabilityVerdict::Stabilized);
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_changing_snapshots_reset_streak() {
        let cfg = config(false, 2, 5, 10);
        let (verdict, polls) = run_scripted(vec![Ok("A"), Ok("B"), Ok("B")], &cfg);
        assert_eq!(verdict.unwrap(), StabilityVerdict::Stabilized);
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_rescue_after_consecutive_errors() {
        let cfg = config(true, 3, 5, 20);
        let script = vec![Err("down"); 5];
        let (verdict, polls) = run_scripted(script, &cfg);
        assert_eq!(verdict.unwrap(), StabilityVerdict::RescuedAfterErrors);
        assert_eq!(polls, 5);
    }

    #[test]
    fn test_no_rescue_without_rescue_mode() {
        let cfg = config(false, 3, 2, 4);
        let script = vec![Err("down"); 4];
        let (verdict, polls) = run_scripted(script, &cfg);
        assert!(matches!(verdict, Err(Error::StabilityTimeout(_))));
        assert_eq!(polls, 4);
    }

    #[test]
    fn test_success_resets_error_streak() {
        // Errors interleaved with successes never reach the error barrier
        let cfg = config(true, 2, 2, 10);
        let script = vec![Err("down"), Ok("A"), Err("down"), Ok("B"), Ok("B")];
        let (verdict, polls) = run_scripted(script, &cfg);
        assert_eq!(verdict.unwrap(), StabilityVerdict::Stabilized);
        assert_eq!(polls, 5);
    }

    #[test]
    fn test_error_invalidates_streak() {
        // A A puts the streak at 2; the error wipes it and clears the
        // previous snapshot, so the following As start over
        let cfg = config(false, 3, 10, 10);
        let (verdict, polls) = run_scripted(
            vec![Ok("A"), Ok("A"), Err("down"), Ok("A"), Ok("A"), Ok("A")],
            &cfg,
        );
        assert_eq!(verdict.unwrap(), StabilityVerdict::Stabilized);
        assert_eq!(polls, 6);
    }

    #[test]
    fn test_fatal_at_max_attempts() {
        let cfg = config(false, 3, 5, 3);
        let (verdict, polls) = run_scripted(vec![Ok("A"), Ok("B"), Ok("C")], &cfg);
        assert!(matches!(verdict, Err(Error::StabilityTimeout(_))));
        // Exactly max_attempts polls, none after the terminal attempt
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_no_poll_after_terminal_attempt() {
        // Script has no second entry; reaching for it would panic
        let cfg = config(false, 1, 5, 10);
        let (verdict, polls) = run_scripted(vec![Ok("A")], &cfg);
        assert_eq!(verdict.unwrap(), StabilityVerdict::Stabilized);
        assert_eq!(polls, 1);
    }

    #[test]
    fn test_step_is_pure() {
        let cfg = config(false, 3, 3, 10);
        let run = MonitorRun::new();
        let before = run.clone();
        let _ = step(run.clone(), PollOutcome::Snapshot("A".to_string()), &cfg);
        assert_eq!(run, before);
    }

    #[test]
    fn test_zero_barrier_rejected() {
        let cfg = config(false, 0, 3, 10);
        assert!(matches!(
            await_stability(|| Ok("A".to_string()), &cfg),
            Err(Error::InitError(_))
        ));
    }
}
