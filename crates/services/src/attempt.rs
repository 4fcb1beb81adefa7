use std::sync::Arc;

use exam_core::model::{
    AnswerReview, AttemptResults, AttemptSession, AttemptSettings, ExerciseId, QuestionSet,
    Transition,
};
use storage::repository::{QuestionSource, SessionStateRepository};
use uuid::Uuid;

use crate::Clock;
use crate::error::AttemptError;
use crate::handle::AttemptHandle;
use crate::notify::{NotificationSink, Severity};
use crate::persist::{PersistGuard, SnapshotPersister};
use crate::proctor::{ProctorEnvironment, ProctorGuard, ProctorMonitor};
use crate::submission::SubmissionCoordinator;
use crate::timer::{TimerController, TimerGuard};

pub const QUESTIONS_FAILED_ERROR: &str = "Could not load the questions for this exam.";
pub const NO_QUESTIONS_INFO: &str = "This exercise has no questions.";

/// Starts, resumes and tears down attempts.
#[derive(Clone)]
pub struct AttemptService {
    clock: Clock,
    settings: AttemptSettings,
    snapshots: Arc<dyn SessionStateRepository>,
    questions: Arc<dyn QuestionSource>,
    notifier: Arc<dyn NotificationSink>,
}

impl AttemptService {
    #[must_use]
    pub fn new(
        clock: Clock,
        settings: AttemptSettings,
        snapshots: Arc<dyn SessionStateRepository>,
        questions: Arc<dyn QuestionSource>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            clock,
            settings,
            snapshots,
            questions,
            notifier,
        }
    }

    #[must_use]
    pub fn settings(&self) -> AttemptSettings {
        self.settings
    }

    /// Begin a fresh attempt for `exercise_id`.
    ///
    /// Any previously persisted attempt is discarded first. Questions are
    /// fetched exactly once; the timer, proctoring and snapshot persistence are
    /// armed only after they are in place.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if the stored state cannot be cleared, the
    /// questions cannot be fetched, or the question set is malformed.
    pub async fn start_attempt(
        &self,
        exercise_id: ExerciseId,
        duration_minutes: u32,
        env: Arc<dyn ProctorEnvironment>,
    ) -> Result<AttemptRun, AttemptError> {
        self.snapshots.clear_snapshot().await?;

        let handle = AttemptHandle::new(AttemptSession::new(self.settings));
        handle.start_session(exercise_id, duration_minutes);

        let questions = match self.questions.fetch_questions(exercise_id).await {
            Ok(questions) => questions,
            Err(err) => {
                tracing::error!(%exercise_id, error = %err, "question fetch failed");
                self.notifier.notify(QUESTIONS_FAILED_ERROR, Severity::Error);
                return Err(err.into());
            }
        };
        let questions = QuestionSet::new(questions)?;
        if questions.is_empty() {
            self.notifier.notify(NO_QUESTIONS_INFO, Severity::Info);
        }
        let first = questions.as_slice().first().map(|q| q.id.clone());
        handle.set_questions(questions);
        if let Some(first) = first {
            handle.mark_visited(&first);
        }

        let run = self.arm(handle, env);
        tracing::info!(
            run_id = %run.id,
            %exercise_id,
            duration_minutes,
            question_count = run.handle.read(|s| s.questions().len()),
            "attempt started"
        );
        Ok(run)
    }

    /// Pick up the persisted attempt after a reload.
    ///
    /// A submitted attempt is resumed without timer or proctoring so its
    /// results can still be shown.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NoAttempt` when nothing is stored, or the
    /// storage/snapshot error when the stored state is unusable.
    pub async fn resume_attempt(
        &self,
        env: Arc<dyn ProctorEnvironment>,
    ) -> Result<AttemptRun, AttemptError> {
        let stored = self
            .snapshots
            .load_snapshot()
            .await?
            .ok_or(AttemptError::NoAttempt)?;
        let session = AttemptSession::restore(stored.snapshot).map_err(|err| {
            tracing::warn!(error = %err, "stored attempt is invalid");
            err
        })?;
        if session.exercise_id().is_none() {
            return Err(AttemptError::NoAttempt);
        }

        let run = self.arm(AttemptHandle::new(session), env);
        tracing::info!(
            run_id = %run.id,
            saved_at = %stored.saved_at,
            elapsed_secs = run.handle.read(AttemptSession::elapsed_secs),
            submitted = run.handle.is_submitted(),
            "attempt resumed"
        );
        Ok(run)
    }

    /// Discard whatever attempt is persisted.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::Storage` if the backend cannot be reached.
    pub async fn discard_stored(&self) -> Result<(), AttemptError> {
        self.snapshots.clear_snapshot().await?;
        Ok(())
    }

    fn arm(&self, handle: AttemptHandle, env: Arc<dyn ProctorEnvironment>) -> AttemptRun {
        let persister = SnapshotPersister::start(&handle, Arc::clone(&self.snapshots), self.clock);
        let timer = TimerController::start(&handle);
        let proctor = if handle.is_submitted() {
            None
        } else {
            match ProctorMonitor::new(handle.clone(), Arc::clone(&self.notifier)).arm(env) {
                Ok(guard) => Some(guard),
                Err(err) => {
                    tracing::warn!(error = %err, "proctoring disabled for this attempt");
                    None
                }
            }
        };

        AttemptRun {
            id: Uuid::new_v4(),
            clock: self.clock,
            handle,
            coordinator: SubmissionCoordinator::new(Arc::clone(&self.notifier)),
            snapshots: Arc::clone(&self.snapshots),
            timer,
            proctor,
            persister,
        }
    }
}

/// One live attempt and the background work attached to it.
///
/// Dropping the run stops the timer and removes proctoring listeners; call
/// [`AttemptRun::finish`] to also reset the state and clear persistence.
pub struct AttemptRun {
    id: Uuid,
    clock: Clock,
    handle: AttemptHandle,
    coordinator: SubmissionCoordinator,
    snapshots: Arc<dyn SessionStateRepository>,
    timer: Option<TimerGuard>,
    proctor: Option<ProctorGuard>,
    persister: Option<PersistGuard>,
}

impl AttemptRun {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn handle(&self) -> &AttemptHandle {
        &self.handle
    }

    #[must_use]
    pub fn is_proctored(&self) -> bool {
        self.proctor.as_ref().is_some_and(|guard| !guard.is_finished())
    }

    #[must_use]
    pub fn is_clock_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|guard| !guard.is_finished())
    }

    pub fn submit(&self) -> Transition {
        self.handle.submit()
    }

    pub async fn wait_for_results(&self) -> AttemptResults {
        self.coordinator.wait_for_results(&self.handle).await
    }

    #[must_use]
    pub fn results(&self) -> Option<AttemptResults> {
        self.coordinator.results(&self.handle)
    }

    #[must_use]
    pub fn review(&self) -> Option<Vec<AnswerReview>> {
        self.coordinator.review(&self.handle)
    }

    /// Stop background work and write a final snapshot so the attempt can be
    /// resumed later.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::Storage` if the final snapshot cannot be saved.
    pub async fn suspend(mut self) -> Result<(), AttemptError> {
        self.timer.take();
        self.proctor.take();
        if let Some(persister) = self.persister.take() {
            persister.stop().await;
        }
        self.snapshots
            .save_snapshot(&self.handle.snapshot(), self.clock.now())
            .await?;
        tracing::info!(run_id = %self.id, "attempt suspended");
        Ok(())
    }

    /// Tear the attempt down: stop background work, reset the state and
    /// clear the persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::Storage` if the snapshot cannot be cleared.
    pub async fn finish(mut self) -> Result<(), AttemptError> {
        self.timer.take();
        self.proctor.take();
        if let Some(persister) = self.persister.take() {
            persister.stop().await;
        }
        self.handle.reset();
        self.snapshots.clear_snapshot().await?;
        tracing::info!(run_id = %self.id, "attempt finished");
        Ok(())
    }
}

impl std::fmt::Debug for AttemptRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptRun")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("timer", &self.timer)
            .field("proctor", &self.proctor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CollectingSink;
    use crate::proctor::{ChannelEnvironment, ProctorSignal};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use exam_core::model::{AttemptSnapshot, Question, SubmitReason};
    use storage::repository::{
        InMemoryQuestionBank, InMemoryRepository, StorageError, StoredSnapshot,
    };

    struct Fixture {
        service: AttemptService,
        snapshots: Arc<InMemoryRepository>,
        sink: Arc<CollectingSink>,
    }

    fn fixture() -> Fixture {
        let bank = InMemoryQuestionBank::new();
        bank.insert(
            ExerciseId::new(1),
            vec![
                Question::new("q1", "One", vec!["A".into(), "B".into()], "A"),
                Question::new("q2", "Two", vec!["A".into(), "B".into()], "B"),
            ],
        )
        .unwrap();
        bank.insert(ExerciseId::new(2), Vec::new()).unwrap();
        bank.insert(
            ExerciseId::new(3),
            vec![
                Question::new("dup", "", Vec::new(), "A"),
                Question::new("dup", "", Vec::new(), "B"),
            ],
        )
        .unwrap();

        let snapshots = Arc::new(InMemoryRepository::new());
        let sink = Arc::new(CollectingSink::new());
        let service = AttemptService::new(
            Clock::default(),
            AttemptSettings::default(),
            snapshots.clone(),
            Arc::new(bank),
            sink.clone(),
        );
        Fixture {
            service,
            snapshots,
            sink,
        }
    }

    #[tokio::test]
    async fn start_marks_first_question_and_arms_everything() {
        let fx = fixture();
        let env = Arc::new(ChannelEnvironment::new());
        let run = fx
            .service
            .start_attempt(ExerciseId::new(1), 30, env.clone())
            .await
            .unwrap();

        assert!(run.is_proctored());
        assert!(run.is_clock_running());
        assert!(env.is_attached());
        let visited = run.handle().read(|s| s.visited().len());
        assert_eq!(visited, 1);
        assert_eq!(run.handle().read(AttemptSession::duration_limit_secs), 1800);
    }

    #[tokio::test]
    async fn empty_exercise_is_legal() {
        let fx = fixture();
        let run = fx
            .service
            .start_attempt(ExerciseId::new(2), 0, Arc::new(ChannelEnvironment::new()))
            .await
            .unwrap();
        assert!(run.handle().read(|s| s.questions().is_empty()));
        assert!(!run.is_clock_running());
        assert_eq!(fx.sink.notices()[0].severity, Severity::Info);
    }

    #[tokio::test]
    async fn fetch_and_validation_failures_surface() {
        let fx = fixture();
        let err = fx
            .service
            .start_attempt(ExerciseId::new(99), 10, Arc::new(ChannelEnvironment::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AttemptError::Storage(StorageError::NotFound)));
        assert_eq!(fx.sink.notices()[0].severity, Severity::Error);

        let err = fx
            .service
            .start_attempt(ExerciseId::new(3), 10, Arc::new(ChannelEnvironment::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AttemptError::Questions(_)));
    }

    #[tokio::test]
    async fn finish_resets_and_clears_persistence() {
        let fx = fixture();
        let env = Arc::new(ChannelEnvironment::new());
        let run = fx
            .service
            .start_attempt(ExerciseId::new(1), 10, env.clone())
            .await
            .unwrap();
        run.submit();
        let results = run.wait_for_results().await;
        assert_eq!(results.reason, SubmitReason::Manual);

        let handle = run.handle().clone();
        run.finish().await.unwrap();

        assert_eq!(handle.read(AttemptSession::exercise_id), None);
        assert!(fx.snapshots.load_snapshot().await.unwrap().is_none());
        assert_eq!(env.detach_count(), 1);
        assert!(!env.emit(ProctorSignal::VisibilityHidden));
    }

    /// Accepts reads and clears but refuses every write.
    struct ReadOnlyRepository;

    #[async_trait]
    impl SessionStateRepository for ReadOnlyRepository {
        async fn load_snapshot(&self) -> Result<Option<StoredSnapshot>, StorageError> {
            Ok(None)
        }

        async fn save_snapshot(
            &self,
            _snapshot: &AttemptSnapshot,
            _saved_at: DateTime<Utc>,
        ) -> Result<(), StorageError> {
            Err(StorageError::Connection("read-only".into()))
        }

        async fn clear_snapshot(&self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn suspend_reports_a_failed_final_save() {
        let bank = InMemoryQuestionBank::new();
        bank.insert(
            ExerciseId::new(1),
            vec![Question::new("q1", "One", Vec::new(), "A")],
        )
        .unwrap();
        let service = AttemptService::new(
            Clock::default(),
            AttemptSettings::default(),
            Arc::new(ReadOnlyRepository),
            Arc::new(bank),
            Arc::new(CollectingSink::new()),
        );

        let run = service
            .start_attempt(ExerciseId::new(1), 10, Arc::new(ChannelEnvironment::new()))
            .await
            .unwrap();
        let err = run.suspend().await.unwrap_err();
        assert!(matches!(err, AttemptError::Storage(StorageError::Connection(_))));
    }

    #[tokio::test]
    async fn resume_without_stored_state_reports_no_attempt() {
        let fx = fixture();
        let err = fx
            .service
            .resume_attempt(Arc::new(ChannelEnvironment::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AttemptError::NoAttempt));
    }
}
