use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use exam_core::model::{
    Answer, AttemptResults, AttemptSession, AttemptSnapshot, ExerciseId, QuestionId, QuestionSet,
    SubmitReason, Transition,
};
use tokio::sync::watch;

/// Change marker published after every effective transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Revision {
    pub seq: u64,
    pub submitted: bool,
}

struct Shared {
    session: Mutex<AttemptSession>,
    changes: watch::Sender<Revision>,
}

/// Single owner of the attempt state.
///
/// The timer, the proctoring monitor and user actions all write through these
/// methods; each call runs to completion under the lock, so an
/// increment-and-check such as the cheat limit is never observed half done.
#[derive(Clone)]
pub struct AttemptHandle {
    shared: Arc<Shared>,
}

impl AttemptHandle {
    #[must_use]
    pub fn new(session: AttemptSession) -> Self {
        let (changes, _) = watch::channel(Revision {
            seq: 0,
            submitted: session.is_submitted(),
        });
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                changes,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AttemptSession> {
        // Every transition leaves the session consistent, so a poisoned lock is still usable.
        self.shared
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, op: impl FnOnce(&mut AttemptSession) -> Transition) -> Transition {
        let mut session = self.lock();
        let transition = op(&mut session);
        if transition.changed() {
            // Published under the session lock so revisions arrive in transition order.
            let submitted = session.is_submitted();
            self.shared.changes.send_modify(|rev| {
                rev.seq = rev.seq.wrapping_add(1);
                rev.submitted = submitted;
            });
        }
        drop(session);
        tracing::trace!(?transition, "attempt transition");
        transition
    }

    /// Receive a notification after each change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Revision> {
        self.shared.changes.subscribe()
    }

    #[must_use]
    pub fn revision(&self) -> Revision {
        *self.shared.changes.borrow()
    }

    /// Run a read-only query against the current state.
    pub fn read<R>(&self, f: impl FnOnce(&AttemptSession) -> R) -> R {
        let session = self.lock();
        f(&session)
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.read(AttemptSession::is_submitted)
    }

    #[must_use]
    pub fn snapshot(&self) -> AttemptSnapshot {
        self.read(AttemptSession::snapshot)
    }

    #[must_use]
    pub fn results(&self) -> Option<AttemptResults> {
        self.read(AttemptResults::from_session)
    }

    pub fn start_session(&self, exercise_id: ExerciseId, duration_minutes: u32) -> Transition {
        self.apply(|s| s.start_session(exercise_id, duration_minutes))
    }

    pub fn set_questions(&self, questions: QuestionSet) -> Transition {
        self.apply(|s| s.set_questions(questions))
    }

    pub fn mark_visited(&self, question_id: &QuestionId) -> Transition {
        self.apply(|s| s.mark_visited(question_id))
    }

    pub fn record_answer(&self, question_id: &QuestionId, answer: Answer) -> Transition {
        self.apply(|s| s.record_answer(question_id, answer))
    }

    pub fn clear_answer(&self, question_id: &QuestionId) -> Transition {
        self.apply(|s| s.clear_answer(question_id))
    }

    pub fn set_current_index(&self, index: usize) -> Transition {
        self.apply(|s| s.set_current_index(index))
    }

    pub fn next(&self) -> Transition {
        self.apply(AttemptSession::next)
    }

    pub fn previous(&self) -> Transition {
        self.apply(AttemptSession::previous)
    }

    pub fn tick(&self, delta_secs: u32) -> Transition {
        self.apply(|s| s.tick(delta_secs))
    }

    pub fn submit(&self) -> Transition {
        self.apply(AttemptSession::submit)
    }

    pub fn register_cheat_event(&self) -> Transition {
        self.apply(AttemptSession::register_cheat_event)
    }

    pub fn terminate(&self, reason: SubmitReason) -> Transition {
        self.apply(|s| s.terminate(reason))
    }

    pub fn reset(&self) -> Transition {
        self.apply(AttemptSession::reset)
    }

    /// Replace the whole session, e.g. with one restored from a snapshot.
    pub fn replace(&self, session: AttemptSession) -> Transition {
        self.apply(|s| {
            if *s == session {
                return Transition::Unchanged;
            }
            *s = session;
            Transition::Applied
        })
    }
}

impl Default for AttemptHandle {
    fn default() -> Self {
        Self::new(AttemptSession::default())
    }
}

impl std::fmt::Debug for AttemptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptHandle")
            .field("revision", &self.revision())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::Question;

    fn running() -> AttemptHandle {
        let handle = AttemptHandle::default();
        handle.start_session(ExerciseId::new(1), 1);
        handle.set_questions(
            QuestionSet::new(vec![Question::new("q1", "Q", Vec::new(), "A")]).unwrap(),
        );
        handle
    }

    #[test]
    fn revision_advances_only_on_change() {
        let handle = running();
        let before = handle.revision();
        handle.record_answer(&QuestionId::new("q1"), Answer::from("A"));
        let after = handle.revision();
        assert_eq!(after.seq, before.seq + 1);

        handle.record_answer(&QuestionId::new("q1"), Answer::from("A"));
        handle.record_answer(&QuestionId::new("missing"), Answer::from("A"));
        assert_eq!(handle.revision(), after);
    }

    #[test]
    fn submission_is_published() {
        let handle = running();
        let rx = handle.subscribe();
        handle.register_cheat_event();
        handle.register_cheat_event();
        handle.register_cheat_event();
        assert!(rx.borrow().submitted);
        assert!(handle.is_submitted());
        assert_eq!(handle.read(AttemptSession::cheat_count), 3);
    }

    #[test]
    fn concurrent_cheat_events_are_not_lost() {
        let handle = AttemptHandle::new(AttemptSession::new(
            exam_core::model::AttemptSettings::new(1_000, 5).unwrap(),
        ));
        handle.start_session(ExerciseId::new(1), 0);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        handle.register_cheat_event();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(handle.read(AttemptSession::cheat_count), 400);
        assert!(!handle.is_submitted());
    }

    #[test]
    fn cheat_limit_never_overshoots_under_contention() {
        let handle = running();
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                std::thread::spawn(move || handle.register_cheat_event())
            })
            .collect();
        let submitted = workers
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|t| t.submitted().is_some())
            .count();

        assert_eq!(submitted, 1);
        assert_eq!(handle.read(AttemptSession::cheat_count), 3);
    }
}
