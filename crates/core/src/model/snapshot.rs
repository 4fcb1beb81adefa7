use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::model::attempt::{AttemptSession, SubmitReason};
use crate::model::ids::{ExerciseId, QuestionId};
use crate::model::question::{Answer, Question, QuestionError, QuestionSet};
use crate::model::settings::{AttemptSettings, SettingsError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error(transparent)]
    Questions(#[from] QuestionError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("answer keys do not match the question ids")]
    AnswerKeysMismatch,

    #[error("visited question {0} is not part of the attempt")]
    UnknownVisited(QuestionId),

    #[error("current index {index} is out of range for {len} questions")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("open attempt has {count} cheat events, limit is {limit}")]
    CheatLimitReached { count: u32, limit: u32 },

    #[error("open attempt has used {elapsed}s of its {limit}s limit")]
    TimeLimitReached { elapsed: u32, limit: u32 },

    #[error("untimed attempt records {0}s elapsed")]
    UntimedElapsed(u32),
}

/// Persisted shape of an [`AttemptSession`], written after every change so a
/// reload does not lose progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSnapshot {
    pub version: u32,
    pub settings: AttemptSettings,
    pub exercise_id: Option<ExerciseId>,
    pub duration_limit_secs: u32,
    pub questions: Vec<Question>,
    pub answers: BTreeMap<QuestionId, Option<Answer>>,
    pub visited_question_ids: BTreeSet<QuestionId>,
    pub current_index: usize,
    pub elapsed_secs: u32,
    pub cheat_count: u32,
    pub submitted: Option<SubmitReason>,
}

impl AttemptSnapshot {
    pub const VERSION: u32 = 1;
}

impl AttemptSession {
    #[must_use]
    pub fn snapshot(&self) -> AttemptSnapshot {
        AttemptSnapshot {
            version: AttemptSnapshot::VERSION,
            settings: self.settings,
            exercise_id: self.exercise_id,
            duration_limit_secs: self.duration_limit_secs,
            questions: self.questions.clone(),
            answers: self.answers.clone(),
            visited_question_ids: self.visited.clone(),
            current_index: self.current_index,
            elapsed_secs: self.elapsed_secs,
            cheat_count: self.cheat_count,
            submitted: self.submitted,
        }
    }

    /// Rehydrate a session from a persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the snapshot breaks any session invariant.
    pub fn restore(snapshot: AttemptSnapshot) -> Result<Self, SnapshotError> {
        if snapshot.version != AttemptSnapshot::VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        let settings = snapshot.settings.validate()?;
        let questions = QuestionSet::new(snapshot.questions)?.into_vec();

        let keys_match = snapshot.answers.len() == questions.len()
            && questions.iter().all(|q| snapshot.answers.contains_key(&q.id));
        if !keys_match {
            return Err(SnapshotError::AnswerKeysMismatch);
        }
        if let Some(stray) = snapshot
            .visited_question_ids
            .iter()
            .find(|id| !snapshot.answers.contains_key(*id))
        {
            return Err(SnapshotError::UnknownVisited(stray.clone()));
        }
        if snapshot.current_index >= questions.len().max(1) {
            return Err(SnapshotError::IndexOutOfRange {
                index: snapshot.current_index,
                len: questions.len(),
            });
        }
        let timed = snapshot.duration_limit_secs > 0;
        if !timed && snapshot.elapsed_secs > 0 {
            return Err(SnapshotError::UntimedElapsed(snapshot.elapsed_secs));
        }
        // An open attempt must still be able to accept answers.
        if snapshot.submitted.is_none() {
            if snapshot.cheat_count >= settings.cheat_limit() {
                return Err(SnapshotError::CheatLimitReached {
                    count: snapshot.cheat_count,
                    limit: settings.cheat_limit(),
                });
            }
            if timed && snapshot.elapsed_secs >= snapshot.duration_limit_secs {
                return Err(SnapshotError::TimeLimitReached {
                    elapsed: snapshot.elapsed_secs,
                    limit: snapshot.duration_limit_secs,
                });
            }
        }

        Ok(Self {
            settings,
            exercise_id: snapshot.exercise_id,
            duration_limit_secs: snapshot.duration_limit_secs,
            questions,
            answers: snapshot.answers,
            visited: snapshot.visited_question_ids,
            current_index: snapshot.current_index,
            elapsed_secs: snapshot.elapsed_secs,
            cheat_count: snapshot.cheat_count,
            submitted: snapshot.submitted,
        })
    }
}
