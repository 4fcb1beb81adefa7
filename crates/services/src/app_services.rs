use std::sync::Arc;

use exam_core::model::AttemptSettings;
use storage::repository::{QuestionSource, Storage};

use crate::Clock;
use crate::attempt::AttemptService;
use crate::error::AppServicesError;
use crate::notify::NotificationSink;

/// Assembles the exam-facing services over one storage backend.
#[derive(Clone)]
pub struct ExamServices {
    storage: Storage,
    attempts: Arc<AttemptService>,
}

impl ExamServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        settings: AttemptSettings,
        questions: Arc<dyn QuestionSource>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::with_storage(storage, clock, settings, questions, notifier))
    }

    /// Build services that keep the attempt in memory only.
    #[must_use]
    pub fn in_memory(
        clock: Clock,
        settings: AttemptSettings,
        questions: Arc<dyn QuestionSource>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self::with_storage(Storage::in_memory(), clock, settings, questions, notifier)
    }

    fn with_storage(
        storage: Storage,
        clock: Clock,
        settings: AttemptSettings,
        questions: Arc<dyn QuestionSource>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let attempts = Arc::new(AttemptService::new(
            clock,
            settings,
            Arc::clone(&storage.attempts),
            questions,
            notifier,
        ));
        Self { storage, attempts }
    }

    #[must_use]
    pub fn attempts(&self) -> Arc<AttemptService> {
        Arc::clone(&self.attempts)
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}
