use std::env;

use async_trait::async_trait;
use exam_core::model::{ExerciseId, Question};
use reqwest::Client;
use storage::repository::{QuestionSource, StorageError};

use crate::error::QuestionSourceError;

#[derive(Clone, Debug)]
pub struct QuestionSourceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl QuestionSourceConfig {
    /// Read `EXAM_QUESTIONS_URL` (and optionally `EXAM_QUESTIONS_API_KEY`).
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("EXAM_QUESTIONS_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let api_key = env::var("EXAM_QUESTIONS_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        Some(Self { base_url, api_key })
    }

    #[must_use]
    pub fn questions_url(&self, exercise_id: ExerciseId) -> String {
        format!(
            "{}/exercises/{}/questions",
            self.base_url.trim_end_matches('/'),
            exercise_id
        )
    }
}

/// Fetches the question snapshot of an exercise over HTTP.
#[derive(Clone)]
pub struct HttpQuestionSource {
    client: Client,
    config: Option<QuestionSourceConfig>,
}

impl HttpQuestionSource {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(QuestionSourceConfig::from_env())
    }

    #[must_use]
    pub fn new(config: Option<QuestionSourceConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Fetch the ordered questions of an exercise.
    ///
    /// # Errors
    ///
    /// Returns `QuestionSourceError` when the source is disabled, the request
    /// fails, or the server answers with a non-success status.
    pub async fn fetch(&self, exercise_id: ExerciseId) -> Result<Vec<Question>, QuestionSourceError> {
        let config = self.config.as_ref().ok_or(QuestionSourceError::Disabled)?;

        let mut request = self.client.get(config.questions_url(exercise_id));
        if let Some(key) = &config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(QuestionSourceError::HttpStatus(response.status()));
        }

        let questions: Vec<Question> = response.json().await?;
        tracing::debug!(%exercise_id, count = questions.len(), "questions fetched");
        Ok(questions)
    }
}

#[async_trait]
impl QuestionSource for HttpQuestionSource {
    async fn fetch_questions(&self, exercise_id: ExerciseId) -> Result<Vec<Question>, StorageError> {
        Ok(self.fetch(exercise_id).await?)
    }
}
