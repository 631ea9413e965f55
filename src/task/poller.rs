//! Poll loop for blocking waits
//!
//! [`Task::wait`] drives a small state machine:
//!
//! ```text
//! Pending → Polling → {Completed, Failed, TimedOut, Cancelled}
//! ```
//!
//! Each iteration polls the status endpoint once. Transient transport
//! failures are tolerated up to a consecutive bound so a flaky connection
//! cannot mask a stuck task forever; authorization and malformed-response
//! failures abort the wait immediately. The deadline and the cancel token
//! are honored before every remote call and during the inter-poll sleep;
//! giving up locally leaves the remote task running untouched.

use std::thread;
use std::time::{Duration, Instant};

use crate::client::ApiError;
use crate::signal::CancelToken;

use super::Task;

/// Interval used by [`Task::wait_for`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Granularity at which the inter-poll sleep rechecks cancellation and
/// the deadline.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Tuning knobs for a blocking wait.
#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    /// Delay between status polls.
    pub interval: Duration,
    /// Overall wait budget; `None` or zero waits until cancelled.
    pub timeout: Option<Duration>,
    /// Consecutive transient transport failures tolerated before the wait
    /// escalates them to fatal. Reset by any successful poll.
    pub max_transient_errors: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            max_transient_errors: 3,
        }
    }
}

/// States of one wait invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// No poll issued yet.
    Pending,
    /// Between polls of a live task.
    Polling,
    /// Terminal: remote task finished with the success marker.
    Completed,
    /// Terminal: remote task failed, or the wait aborted on a fatal error.
    Failed,
    /// Terminal: the local wait budget ran out.
    TimedOut,
    /// Terminal: the caller cancelled the wait.
    Cancelled,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Pending | PollState::Polling)
    }

    /// Valid transitions of the wait state machine.
    pub fn can_transition_to(&self, next: PollState) -> bool {
        match (self, next) {
            // the first deadline/cancel check runs before any poll
            (PollState::Pending, PollState::Polling)
            | (PollState::Pending, PollState::TimedOut)
            | (PollState::Pending, PollState::Cancelled) => true,

            (PollState::Polling, PollState::Polling)
            | (PollState::Polling, PollState::Completed)
            | (PollState::Polling, PollState::Failed)
            | (PollState::Polling, PollState::TimedOut)
            | (PollState::Polling, PollState::Cancelled) => true,

            _ => false,
        }
    }
}

/// Errors returned by [`Task::wait`]/[`Task::wait_for`].
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    /// The remote task finished with a non-success exit status. This is a
    /// successful observation of an unsuccessful job; the text is the
    /// remote's own diagnostic.
    #[error("remote task failed: {exit_status}")]
    TaskFailed { exit_status: String },

    /// The wait budget ran out before the task went terminal. The remote
    /// task keeps running.
    #[error("deadline exceeded after {waited:?}; remote task still running")]
    DeadlineExceeded { waited: Duration },

    /// The caller cancelled the wait. The remote task keeps running.
    #[error("wait cancelled")]
    Cancelled,

    /// Status reads kept failing at the transport level.
    #[error("status polling failed {attempts} consecutive times: {source}")]
    TransportExhausted {
        attempts: u32,
        #[source]
        source: ApiError,
    },

    /// A fatal status-read failure: not authorized, malformed response,
    /// or a non-transient API error.
    #[error(transparent)]
    Api(#[from] ApiError),
}

struct Poller<'a> {
    task: &'a mut Task,
    config: PollerConfig,
    state: PollState,
    started: Instant,
    deadline: Option<Instant>,
    transient_errors: u32,
}

impl<'a> Poller<'a> {
    fn new(task: &'a mut Task, config: PollerConfig) -> Self {
        let started = Instant::now();
        let deadline = config
            .timeout
            .filter(|t| !t.is_zero())
            .map(|t| started + t);
        Self {
            task,
            config,
            state: PollState::Pending,
            started,
            deadline,
            transient_errors: 0,
        }
    }

    fn transition(&mut self, next: PollState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid poll transition {:?} -> {next:?}",
            self.state
        );
        self.state = next;
    }

    fn deadline_reached(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn give_up(&mut self, cancel: &CancelToken) -> Option<WaitError> {
        if cancel.is_cancelled() {
            self.transition(PollState::Cancelled);
            return Some(WaitError::Cancelled);
        }
        if self.deadline_reached() {
            self.transition(PollState::TimedOut);
            return Some(WaitError::DeadlineExceeded {
                waited: self.started.elapsed(),
            });
        }
        None
    }

    fn run(&mut self, cancel: &CancelToken) -> Result<(), WaitError> {
        loop {
            // checked before every remote call
            if let Some(err) = self.give_up(cancel) {
                return Err(err);
            }

            self.transition(PollState::Polling);
            match self.task.status() {
                Ok(()) => {
                    self.transient_errors = 0;
                    if self.task.snapshot().is_terminal() {
                        return if self.task.is_successful() {
                            self.transition(PollState::Completed);
                            Ok(())
                        } else {
                            self.transition(PollState::Failed);
                            Err(WaitError::TaskFailed {
                                exit_status: self
                                    .task
                                    .exit_status()
                                    .unwrap_or_default()
                                    .to_string(),
                            })
                        };
                    }
                }
                Err(err) if err.is_transient() => {
                    self.transient_errors += 1;
                    if self.transient_errors > self.config.max_transient_errors {
                        self.transition(PollState::Failed);
                        return Err(WaitError::TransportExhausted {
                            attempts: self.transient_errors,
                            source: err,
                        });
                    }
                }
                Err(err) => {
                    self.transition(PollState::Failed);
                    return Err(err.into());
                }
            }

            if let Some(err) = self.pause(cancel) {
                return Err(err);
            }
        }
    }

    /// Sleep one poll interval in slices so cancellation and the deadline
    /// interrupt within [`SLEEP_SLICE`].
    fn pause(&mut self, cancel: &CancelToken) -> Option<WaitError> {
        let mut slept = Duration::ZERO;
        while slept < self.config.interval {
            if let Some(err) = self.give_up(cancel) {
                return Some(err);
            }
            let slice = SLEEP_SLICE.min(self.config.interval - slept);
            thread::sleep(slice);
            slept += slice;
        }
        None
    }
}

impl Task {
    /// Block until the task reaches a terminal state, polling every
    /// `interval`.
    ///
    /// Gives up after `timeout` (`None` or zero waits indefinitely) or
    /// when `cancel` fires; either way the remote task is left running.
    /// Success returns `Ok(())`; a remote failure returns
    /// [`WaitError::TaskFailed`] carrying the remote's exit-status text.
    pub fn wait(
        &mut self,
        cancel: &CancelToken,
        interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<(), WaitError> {
        self.wait_with(
            cancel,
            PollerConfig {
                interval,
                timeout,
                ..PollerConfig::default()
            },
        )
    }

    /// [`Task::wait`] with the default interval
    /// ([`DEFAULT_POLL_INTERVAL`], 1 second).
    pub fn wait_for(
        &mut self,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<(), WaitError> {
        self.wait(cancel, DEFAULT_POLL_INTERVAL, timeout)
    }

    /// Fully configurable wait.
    pub fn wait_with(
        &mut self,
        cancel: &CancelToken,
        config: PollerConfig,
    ) -> Result<(), WaitError> {
        let mut poller = Poller::new(self, config);
        let result = poller.run(cancel);
        debug_assert!(poller.state.is_terminal());
        result
    }
}
