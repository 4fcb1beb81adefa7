use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use exam_core::model::{Rejection, SubmitReason, Transition};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::environment::ProctorEnvironment;
use super::policy::{FullscreenState, ProctorAction, ProctorPolicy, ProctorSignal};
use crate::error::ProctorError;
use crate::handle::AttemptHandle;
use crate::notify::{NotificationSink, Severity};

pub const CHEAT_LIMIT_ERROR: &str = "Cheating limit reached. Your exam has been submitted.";

/// Applies [`ProctorPolicy`] to an attempt.
pub struct ProctorMonitor {
    handle: AttemptHandle,
    notifier: Arc<dyn NotificationSink>,
    fullscreen: FullscreenState,
}

impl ProctorMonitor {
    #[must_use]
    pub fn new(handle: AttemptHandle, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            handle,
            notifier,
            fullscreen: FullscreenState::NotFullscreen,
        }
    }

    #[must_use]
    pub fn fullscreen(&self) -> FullscreenState {
        self.fullscreen
    }

    /// React to one signal and return what it did to the attempt.
    pub fn handle_signal(&mut self, signal: &ProctorSignal) -> Transition {
        let previous = self.fullscreen;
        self.fullscreen = previous.after(signal);

        if self.handle.is_submitted() {
            return Transition::Rejected(Rejection::Closed);
        }

        match ProctorPolicy::action_for(signal) {
            ProctorAction::Ignore => Transition::Unchanged,
            ProctorAction::Block(notice) => {
                if let Some(notice) = notice {
                    self.notifier.notice(&notice);
                }
                Transition::Unchanged
            }
            ProctorAction::Cheat(notice) => {
                let transition = self.handle.register_cheat_event();
                if transition.changed() {
                    let count = self.handle.read(|s| s.cheat_count());
                    tracing::warn!(?signal, cheat_count = count, "cheat event recorded");
                    if let Some(notice) = notice {
                        self.notifier.notice(&notice);
                    }
                }
                if transition.submitted() == Some(SubmitReason::CheatLimit) {
                    self.notifier.notify(CHEAT_LIMIT_ERROR, Severity::Error);
                }
                transition
            }
            // Leaving a state we never entered (fullscreen was denied) is not an exit.
            ProctorAction::Terminate(_) if previous == FullscreenState::NotFullscreen => {
                tracing::debug!("fullscreen exit while not fullscreen; ignored");
                Transition::Unchanged
            }
            ProctorAction::Terminate(notice) => {
                let transition = self.handle.terminate(SubmitReason::FullscreenExit);
                if transition.changed() {
                    tracing::warn!("fullscreen exited; attempt force-submitted");
                    self.notifier.notice(&notice);
                }
                transition
            }
        }
    }

    /// Request fullscreen, attach listeners and start consuming signals.
    ///
    /// Listeners stay attached until the attempt is submitted or the returned
    /// guard is dropped, whichever happens first.
    pub fn arm(
        mut self,
        env: Arc<dyn ProctorEnvironment>,
    ) -> Result<ProctorGuard, ProctorError> {
        if self.handle.is_submitted() {
            return Err(ProctorError::AlreadySubmitted);
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ProctorError::NoRuntime)?;

        match env.request_fullscreen() {
            Ok(()) => self.fullscreen = FullscreenState::Fullscreen,
            Err(err) => {
                tracing::warn!(error = %err, "fullscreen unavailable; continuing without it");
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        env.attach(tx)?;
        let registration = Arc::new(Registration {
            env,
            released: AtomicBool::new(false),
        });
        tracing::debug!(fullscreen = ?self.fullscreen, "proctoring armed");

        let task = runtime.spawn(run(self, rx, Arc::clone(&registration)));
        Ok(ProctorGuard { task, registration })
    }
}

struct Registration {
    env: Arc<dyn ProctorEnvironment>,
    released: AtomicBool,
}

impl Registration {
    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.env.detach();
            tracing::debug!("proctoring listeners released");
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}

/// Keeps the monitor running; dropping it removes every listener.
pub struct ProctorGuard {
    task: JoinHandle<()>,
    registration: Arc<Registration>,
}

impl ProctorGuard {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ProctorGuard {
    fn drop(&mut self) {
        self.registration.release();
        self.task.abort();
    }
}

impl std::fmt::Debug for ProctorGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProctorGuard")
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

async fn run(
    mut monitor: ProctorMonitor,
    mut signals: mpsc::UnboundedReceiver<ProctorSignal>,
    registration: Arc<Registration>,
) {
    let mut changes = monitor.handle.subscribe();
    if !changes.borrow_and_update().submitted {
        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(signal) => {
                        if monitor.handle_signal(&signal).submitted().is_some() {
                            break;
                        }
                    }
                    None => break,
                },
                changed = changes.changed() => {
                    if changed.is_err() || changes.borrow_and_update().submitted {
                        break;
                    }
                }
            }
        }
    }
    registration.release();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CollectingSink;
    use crate::proctor::{ChannelEnvironment, KeyPress};
    use exam_core::model::{AttemptSession, ExerciseId, Question, QuestionSet};

    fn handle() -> AttemptHandle {
        let handle = AttemptHandle::default();
        handle.start_session(ExerciseId::new(7), 30);
        handle.set_questions(
            QuestionSet::new(vec![Question::new("q1", "Q", Vec::new(), "A")]).unwrap(),
        );
        handle
    }

    fn monitor(handle: &AttemptHandle) -> (ProctorMonitor, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let monitor = ProctorMonitor::new(handle.clone(), sink.clone());
        (monitor, sink)
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn third_tab_switch_submits() {
        let handle = handle();
        let (mut monitor, sink) = monitor(&handle);

        assert_eq!(
            monitor.handle_signal(&ProctorSignal::VisibilityHidden),
            Transition::Applied
        );
        monitor.handle_signal(&ProctorSignal::WindowBlur);
        assert_eq!(
            monitor.handle_signal(&ProctorSignal::VisibilityHidden),
            Transition::Submitted(SubmitReason::CheatLimit)
        );

        assert_eq!(handle.read(AttemptSession::cheat_count), 3);
        let notices = sink.notices();
        assert_eq!(notices.len(), 3);
        assert_eq!(notices[2].severity, Severity::Error);
    }

    #[test]
    fn fullscreen_exit_submits_only_after_entering() {
        let handle = handle();
        let (mut monitor, sink) = monitor(&handle);

        assert_eq!(
            monitor.handle_signal(&ProctorSignal::FullscreenExited),
            Transition::Unchanged
        );
        monitor.handle_signal(&ProctorSignal::FullscreenEntered);
        assert_eq!(
            monitor.handle_signal(&ProctorSignal::FullscreenExited),
            Transition::Submitted(SubmitReason::FullscreenExit)
        );
        assert_eq!(handle.read(AttemptSession::cheat_count), 1);
        assert_eq!(sink.notices()[0].severity, Severity::Error);
    }

    #[test]
    fn blocked_actions_never_penalize() {
        let handle = handle();
        let (mut monitor, sink) = monitor(&handle);

        for signal in [
            ProctorSignal::KeyDown(KeyPress::new("Escape")),
            ProctorSignal::BeforeUnload,
            ProctorSignal::Copy,
            ProctorSignal::ContextMenu,
        ] {
            assert_eq!(monitor.handle_signal(&signal), Transition::Unchanged);
        }
        assert_eq!(handle.read(AttemptSession::cheat_count), 0);
        assert_eq!(sink.notices().len(), 2);
    }

    #[test]
    fn signals_after_submit_are_inert() {
        let handle = handle();
        handle.submit();
        let (mut monitor, sink) = monitor(&handle);

        assert_eq!(
            monitor.handle_signal(&ProctorSignal::VisibilityHidden),
            Transition::Rejected(Rejection::Closed)
        );
        assert_eq!(handle.read(AttemptSession::cheat_count), 0);
        assert!(sink.notices().is_empty());
    }

    #[test]
    fn arming_needs_a_runtime() {
        let handle = handle();
        let (monitor, _) = monitor(&handle);
        let env = Arc::new(ChannelEnvironment::new());
        assert!(matches!(
            monitor.arm(env.clone()),
            Err(ProctorError::NoRuntime)
        ));
        assert_eq!(env.attach_count(), 0);
    }

    #[tokio::test]
    async fn armed_monitor_detaches_after_submission() {
        let handle = handle();
        let (monitor, _) = monitor(&handle);
        let env = Arc::new(ChannelEnvironment::new());
        let guard = monitor.arm(env.clone()).unwrap();

        assert_eq!(env.fullscreen_requests(), 1);
        assert!(env.is_attached());
        assert!(env.emit(ProctorSignal::Copy));

        env.emit(ProctorSignal::FullscreenExited);
        settle().await;

        assert_eq!(
            handle.read(AttemptSession::submit_reason),
            Some(SubmitReason::FullscreenExit)
        );
        assert!(!env.is_attached());
        assert_eq!(env.detach_count(), 1);
        assert!(guard.is_finished());

        drop(guard);
        assert_eq!(env.detach_count(), 1);
    }

    #[tokio::test]
    async fn manual_submit_releases_listeners() {
        let handle = handle();
        let (monitor, _) = monitor(&handle);
        let env = Arc::new(ChannelEnvironment::new());
        let _guard = monitor.arm(env.clone()).unwrap();

        handle.submit();
        settle().await;

        assert_eq!(env.detach_count(), 1);
        assert!(!env.emit(ProctorSignal::VisibilityHidden));
        assert_eq!(handle.read(AttemptSession::cheat_count), 0);
    }

    #[tokio::test]
    async fn dropping_guard_releases_listeners_immediately() {
        let handle = handle();
        let (monitor, _) = monitor(&handle);
        let env = Arc::new(ChannelEnvironment::new());
        let guard = monitor.arm(env.clone()).unwrap();

        drop(guard);
        assert_eq!(env.detach_count(), 1);
        assert!(!handle.is_submitted());
    }

    #[tokio::test]
    async fn denied_fullscreen_degrades_without_terminating() {
        let handle = handle();
        let (monitor, _) = monitor(&handle);
        let env = Arc::new(ChannelEnvironment::denying_fullscreen("blocked"));
        let _guard = monitor.arm(env.clone()).unwrap();

        env.emit(ProctorSignal::FullscreenExited);
        env.emit(ProctorSignal::VisibilityHidden);
        settle().await;

        assert!(!handle.is_submitted());
        assert_eq!(handle.read(AttemptSession::cheat_count), 1);
    }

    #[tokio::test]
    async fn arming_a_submitted_attempt_is_refused() {
        let handle = handle();
        handle.submit();
        let (monitor, _) = monitor(&handle);
        let env = Arc::new(ChannelEnvironment::new());
        assert!(matches!(
            monitor.arm(env.clone()),
            Err(ProctorError::AlreadySubmitted)
        ));
        assert_eq!(env.fullscreen_requests(), 0);
    }
}
