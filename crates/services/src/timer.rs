use std::time::Duration;

use exam_core::model::{AttemptSession, Rejection, Transition};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::handle::AttemptHandle;

/// Whether the attempt clock should be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
}

impl TimerState {
    #[must_use]
    pub fn of(session: &AttemptSession) -> Self {
        if session.is_timed() && !session.is_submitted() {
            Self::Running
        } else {
            Self::Idle
        }
    }
}

/// Keeps the ticking task alive; dropping it stops the clock.
#[derive(Debug)]
pub struct TimerGuard {
    task: JoinHandle<()>,
}

impl TimerGuard {
    /// True once the timer stopped on its own (submission or reset).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Drives `tick(1)` once per second while the attempt is timed and open.
pub struct TimerController;

impl TimerController {
    pub const PERIOD: Duration = Duration::from_secs(1);

    /// Start the clock for `handle`.
    ///
    /// Returns `None` when there is nothing to time (untimed or submitted) and
    /// when no tokio runtime is available; in the latter case the attempt can
    /// still be submitted manually, it just never expires.
    #[must_use]
    pub fn start(handle: &AttemptHandle) -> Option<TimerGuard> {
        if handle.read(TimerState::of) == TimerState::Idle {
            tracing::debug!("timer idle: attempt is untimed or already submitted");
            return None;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::warn!(error = %err, "timer unavailable; attempt will not auto-submit");
                return None;
            }
        };
        let task = runtime.spawn(run(handle.clone()));
        Some(TimerGuard { task })
    }
}

async fn run(handle: AttemptHandle) {
    let mut changes = handle.subscribe();
    let period = TimerController::PERIOD;
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => match handle.tick(1) {
                Transition::Submitted(reason) => {
                    tracing::info!(?reason, "time limit reached");
                    break;
                }
                Transition::Rejected(Rejection::Closed) => break,
                Transition::Unchanged if handle.read(TimerState::of) == TimerState::Idle => break,
                _ => {}
            },
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let submitted = changes.borrow_and_update().submitted;
                if submitted || handle.read(TimerState::of) == TimerState::Idle {
                    break;
                }
            }
        }
    }
    tracing::debug!("timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{ExerciseId, Question, QuestionSet, SubmitReason};

    fn handle(minutes: u32) -> AttemptHandle {
        let handle = AttemptHandle::default();
        handle.start_session(ExerciseId::new(1), minutes);
        handle.set_questions(
            QuestionSet::new(vec![Question::new("q1", "Q", Vec::new(), "A")]).unwrap(),
        );
        handle
    }

    #[test]
    fn state_follows_session() {
        let handle = handle(1);
        assert_eq!(handle.read(TimerState::of), TimerState::Running);
        handle.submit();
        assert_eq!(handle.read(TimerState::of), TimerState::Idle);
        assert_eq!(
            AttemptHandle::default().read(TimerState::of),
            TimerState::Idle
        );
    }

    #[test]
    fn without_runtime_timer_degrades_silently() {
        let handle = handle(1);
        assert!(TimerController::start(&handle).is_none());
        assert_eq!(handle.submit(), Transition::Submitted(SubmitReason::Manual));
    }

    #[tokio::test(start_paused = true)]
    async fn untimed_attempt_runs_no_timer() {
        let handle = handle(0);
        assert!(TimerController::start(&handle).is_none());
        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(handle.read(AttemptSession::elapsed_secs), 0);
        assert!(!handle.is_submitted());
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_duration() {
        let handle = handle(1);
        let guard = TimerController::start(&handle).expect("timer running");

        time::sleep(Duration::from_millis(59_500)).await;
        assert_eq!(handle.read(AttemptSession::elapsed_secs), 59);
        assert!(!handle.is_submitted());

        time::sleep(Duration::from_secs(1)).await;
        assert!(handle.is_submitted());
        assert_eq!(
            handle.read(AttemptSession::submit_reason),
            Some(SubmitReason::TimeExpired)
        );

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(handle.read(AttemptSession::elapsed_secs), 60);
        assert!(guard.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_submit_stops_the_clock() {
        let handle = handle(5);
        let guard = TimerController::start(&handle).expect("timer running");

        time::sleep(Duration::from_millis(3_500)).await;
        handle.submit();
        time::sleep(Duration::from_secs(10)).await;

        assert_eq!(handle.read(AttemptSession::elapsed_secs), 3);
        assert!(guard.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_guard_cancels_ticking() {
        let handle = handle(5);
        let guard = TimerController::start(&handle).expect("timer running");

        time::sleep(Duration::from_millis(2_500)).await;
        drop(guard);
        time::sleep(Duration::from_secs(10)).await;

        assert_eq!(handle.read(AttemptSession::elapsed_secs), 2);
        assert!(!handle.is_submitted());
    }
}
