use serde::{Deserialize, Serialize};

use crate::model::attempt::{AttemptSession, SubmitReason};
use crate::model::ids::{ExerciseId, QuestionId};
use crate::model::question::Answer;

/// Per-question line of the "review answers" view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerReview {
    pub question_id: QuestionId,
    pub given: Option<Answer>,
    pub correct: Answer,
    pub is_correct: bool,
}

/// Read-only summary of a submitted attempt.
///
/// Unanswered questions count as wrong; there is no partial credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptResults {
    pub exercise_id: Option<ExerciseId>,
    pub reason: SubmitReason,
    pub correct_count: u32,
    pub wrong_count: u32,
    pub total_marks: u32,
    pub time_spent_secs: u32,
    pub cheat_count: u32,
    pub answers: Vec<AnswerReview>,
}

impl AttemptResults {
    /// Grade a session. Returns `None` until the session is submitted.
    #[must_use]
    pub fn from_session(session: &AttemptSession) -> Option<Self> {
        let reason = session.submit_reason()?;

        let answers: Vec<AnswerReview> = session
            .questions()
            .iter()
            .map(|question| {
                let given = session.answer(&question.id).cloned();
                let is_correct = given.as_ref().is_some_and(|a| question.is_correct(a));
                AnswerReview {
                    question_id: question.id.clone(),
                    given,
                    correct: question.correct_answer.clone(),
                    is_correct,
                }
            })
            .collect();

        let total = u32::try_from(answers.len()).unwrap_or(u32::MAX);
        let correct_count =
            u32::try_from(answers.iter().filter(|a| a.is_correct).count()).unwrap_or(u32::MAX);

        Some(Self {
            exercise_id: session.exercise_id(),
            reason,
            correct_count,
            wrong_count: total.saturating_sub(correct_count),
            total_marks: correct_count.saturating_mul(session.settings().points_per_question()),
            time_spent_secs: session.elapsed_secs(),
            cheat_count: session.cheat_count(),
            answers,
        })
    }

    #[must_use]
    pub fn question_count(&self) -> u32 {
        self.correct_count.saturating_add(self.wrong_count)
    }
}
