use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::model::{AttemptSnapshot, ExerciseId, Question};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Fixed key under which the in-progress attempt is persisted.
pub const ATTEMPT_SNAPSHOT_KEY: &str = "exam.attempt-session";

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A persisted snapshot together with the moment it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    pub snapshot: AttemptSnapshot,
    pub saved_at: DateTime<Utc>,
}

/// Local key-value persistence for the single active attempt.
///
/// Starting a new attempt must clear the stored state rather than merge into it.
#[async_trait]
pub trait SessionStateRepository: Send + Sync {
    /// Load the persisted attempt, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored value is unreadable,
    /// or other storage errors.
    async fn load_snapshot(&self) -> Result<Option<StoredSnapshot>, StorageError>;

    /// Persist the attempt, replacing whatever was stored before.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn save_snapshot(
        &self,
        snapshot: &AttemptSnapshot,
        saved_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Remove the persisted attempt. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be reached.
    async fn clear_snapshot(&self) -> Result<(), StorageError>;
}

/// Supplies the question snapshot for an exercise.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Fetch the ordered questions of an exercise.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown exercises, or other storage errors.
    async fn fetch_questions(&self, exercise_id: ExerciseId) -> Result<Vec<Question>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    snapshots: Arc<Mutex<HashMap<&'static str, StoredSnapshot>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl SessionStateRepository for InMemoryRepository {
    async fn load_snapshot(&self) -> Result<Option<StoredSnapshot>, StorageError> {
        let guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(ATTEMPT_SNAPSHOT_KEY).cloned())
    }

    async fn save_snapshot(
        &self,
        snapshot: &AttemptSnapshot,
        saved_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            ATTEMPT_SNAPSHOT_KEY,
            StoredSnapshot {
                snapshot: snapshot.clone(),
                saved_at,
            },
        );
        Ok(())
    }

    async fn clear_snapshot(&self) -> Result<(), StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(ATTEMPT_SNAPSHOT_KEY);
        Ok(())
    }
}

/// Question bank held in memory, keyed by exercise.
#[derive(Clone, Default)]
pub struct InMemoryQuestionBank {
    exercises: Arc<Mutex<HashMap<ExerciseId, Vec<Question>>>>,
}

impl InMemoryQuestionBank {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the questions of an exercise.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the bank lock is poisoned.
    pub fn insert(&self, exercise_id: ExerciseId, questions: Vec<Question>) -> Result<(), StorageError> {
        let mut guard = self
            .exercises
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(exercise_id, questions);
        Ok(())
    }
}

#[async_trait]
impl QuestionSource for InMemoryQuestionBank {
    async fn fetch_questions(&self, exercise_id: ExerciseId) -> Result<Vec<Question>, StorageError> {
        let guard = self
            .exercises
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(&exercise_id).cloned().ok_or(StorageError::NotFound)
    }
}

/// Aggregates the attempt persistence behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub attempts: Arc<dyn SessionStateRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let attempts: Arc<dyn SessionStateRepository> = Arc::new(InMemoryRepository::new());
        Self { attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{AttemptSession, QuestionSet};
    use exam_core::time::fixed_now;

    fn snapshot_for(exercise: u64) -> AttemptSnapshot {
        let mut session = AttemptSession::default();
        session.start_session(ExerciseId::new(exercise), 1);
        session.set_questions(
            QuestionSet::new(vec![Question::new("q1", "Q", Vec::new(), "A")]).unwrap(),
        );
        session.snapshot()
    }

    #[tokio::test]
    async fn saving_replaces_previous_attempt() {
        let repo = InMemoryRepository::new();
        assert!(repo.load_snapshot().await.unwrap().is_none());

        repo.save_snapshot(&snapshot_for(1), fixed_now()).await.unwrap();
        repo.save_snapshot(&snapshot_for(2), fixed_now()).await.unwrap();

        let stored = repo.load_snapshot().await.unwrap().unwrap();
        assert_eq!(stored.snapshot.exercise_id, Some(ExerciseId::new(2)));
        assert_eq!(stored.saved_at, fixed_now());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let repo = InMemoryRepository::new();
        repo.save_snapshot(&snapshot_for(1), fixed_now()).await.unwrap();
        repo.clear_snapshot().await.unwrap();
        repo.clear_snapshot().await.unwrap();
        assert!(repo.load_snapshot().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn question_bank_reports_unknown_exercise() {
        let bank = InMemoryQuestionBank::new();
        bank.insert(
            ExerciseId::new(1),
            vec![Question::new("q1", "Q", Vec::new(), "A")],
        )
        .unwrap();

        assert_eq!(bank.fetch_questions(ExerciseId::new(1)).await.unwrap().len(), 1);
        assert!(matches!(
            bank.fetch_questions(ExerciseId::new(2)).await,
            Err(StorageError::NotFound)
        ));
    }
}
