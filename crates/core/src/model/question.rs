use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question at position {index} has an empty id")]
    EmptyId { index: usize },

    #[error("question id {id} appears more than once")]
    DuplicateId { id: QuestionId },
}

//
// ─── ANSWER ────────────────────────────────────────────────────────────────────
//

/// A chosen (or expected) answer to a question.
///
/// Grading compares answers by exact string equality.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answer(String);

impl Answer {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Answer {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Answer({:?})", self.0)
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A question as delivered by the question source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: Answer,
}

impl Question {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
    ) -> Self {
        Self {
            id: QuestionId::new(id),
            text: text.into(),
            options,
            correct_answer: Answer::new(correct_answer),
        }
    }

    #[must_use]
    pub fn is_correct(&self, answer: &Answer) -> bool {
        &self.correct_answer == answer
    }
}

//
// ─── QUESTION SET ──────────────────────────────────────────────────────────────
//

/// An ordered, validated snapshot of the questions for one attempt.
///
/// Ids are guaranteed non-empty and unique, so the answer map derived from a
/// set always has exactly one key per question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionSet {
    questions: Vec<Question>,
}

impl QuestionSet {
    /// Validate and wrap an ordered list of questions.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyId` for blank ids and
    /// `QuestionError::DuplicateId` when an id repeats.
    pub fn new(questions: Vec<Question>) -> Result<Self, QuestionError> {
        let mut seen = HashSet::with_capacity(questions.len());
        for (index, question) in questions.iter().enumerate() {
            if question.id.is_blank() {
                return Err(QuestionError::EmptyId { index });
            }
            if !seen.insert(&question.id) {
                return Err(QuestionError::DuplicateId {
                    id: question.id.clone(),
                });
            }
        }
        Ok(Self { questions })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Question> {
        self.questions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: &str, correct: &str) -> Question {
        Question::new(id, format!("Question {id}"), vec!["A".into(), "B".into()], correct)
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = QuestionSet::new(vec![q("q1", "A"), q("q1", "B")]).unwrap_err();
        assert_eq!(
            err,
            QuestionError::DuplicateId {
                id: QuestionId::new("q1")
            }
        );
    }

    #[test]
    fn rejects_blank_ids() {
        let err = QuestionSet::new(vec![q("q1", "A"), q(" ", "B")]).unwrap_err();
        assert_eq!(err, QuestionError::EmptyId { index: 1 });
    }

    #[test]
    fn empty_set_is_allowed() {
        let set = QuestionSet::new(Vec::new()).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn deserializes_camel_case_payload() {
        let json = r#"{"id":"q7","text":"2+2?","options":["3","4"],"correctAnswer":"4"}"#;
        let question: Question = serde_json::from_str(json).unwrap();
        assert_eq!(question.id.as_str(), "q7");
        assert!(question.is_correct(&Answer::from("4")));
        assert!(!question.is_correct(&Answer::from("3")));
    }
}
