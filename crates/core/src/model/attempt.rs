use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::ids::{ExerciseId, QuestionId};
use crate::model::question::{Answer, Question, QuestionSet};
use crate::model::settings::AttemptSettings;

//
// ─── TRANSITIONS ───────────────────────────────────────────────────────────────
//

/// Why an attempt reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitReason {
    Manual,
    TimeExpired,
    CheatLimit,
    FullscreenExit,
}

/// Why a mutation request was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The attempt is already submitted.
    Closed,
    UnknownQuestion,
    IndexOutOfRange,
}

/// Outcome of a store operation.
///
/// Operations never fail: invalid requests come back as `Rejected` and leave
/// the state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Unchanged,
    Rejected(Rejection),
    Submitted(SubmitReason),
}

impl Transition {
    /// True when the operation changed observable state.
    #[must_use]
    pub fn changed(&self) -> bool {
        matches!(self, Transition::Applied | Transition::Submitted(_))
    }

    #[must_use]
    pub fn submitted(&self) -> Option<SubmitReason> {
        match self {
            Transition::Submitted(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Palette state of a single question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionStatus {
    Answered,
    Visited,
    NotVisited,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Authoritative state of one timed attempt.
///
/// Every mutation goes through a method returning a [`Transition`]; the
/// fields themselves are never exposed mutably. Once submitted, answers, the
/// active index, elapsed time and the cheat counter are frozen.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptSession {
    pub(super) settings: AttemptSettings,
    pub(super) exercise_id: Option<ExerciseId>,
    pub(super) duration_limit_secs: u32,
    pub(super) questions: Vec<Question>,
    pub(super) answers: BTreeMap<QuestionId, Option<Answer>>,
    pub(super) visited: BTreeSet<QuestionId>,
    pub(super) current_index: usize,
    pub(super) elapsed_secs: u32,
    pub(super) cheat_count: u32,
    pub(super) submitted: Option<SubmitReason>,
}

impl AttemptSession {
    #[must_use]
    pub fn new(settings: AttemptSettings) -> Self {
        Self {
            settings,
            exercise_id: None,
            duration_limit_secs: 0,
            questions: Vec::new(),
            answers: BTreeMap::new(),
            visited: BTreeSet::new(),
            current_index: 0,
            elapsed_secs: 0,
            cheat_count: 0,
            submitted: None,
        }
    }

    fn replace_with(&mut self, next: Self) -> Transition {
        if *self == next {
            return Transition::Unchanged;
        }
        *self = next;
        Transition::Applied
    }

    /// Begin a fresh attempt for `exercise_id`, discarding everything else.
    ///
    /// Questions are supplied separately through [`Self::set_questions`].
    pub fn start_session(&mut self, exercise_id: ExerciseId, duration_minutes: u32) -> Transition {
        let next = Self {
            exercise_id: Some(exercise_id),
            duration_limit_secs: duration_minutes.saturating_mul(60),
            ..Self::new(self.settings)
        };
        self.replace_with(next)
    }

    /// Replace the question snapshot and restart progress on it.
    ///
    /// The exercise and duration are kept; every answer starts out empty.
    pub fn set_questions(&mut self, questions: QuestionSet) -> Transition {
        let questions = questions.into_vec();
        let answers = questions.iter().map(|q| (q.id.clone(), None)).collect();
        let next = Self {
            exercise_id: self.exercise_id,
            duration_limit_secs: self.duration_limit_secs,
            questions,
            answers,
            ..Self::new(self.settings)
        };
        self.replace_with(next)
    }

    pub fn mark_visited(&mut self, question_id: &QuestionId) -> Transition {
        if self.is_submitted() {
            return Transition::Rejected(Rejection::Closed);
        }
        if !self.answers.contains_key(question_id) {
            return Transition::Rejected(Rejection::UnknownQuestion);
        }
        if self.visited.insert(question_id.clone()) {
            Transition::Applied
        } else {
            Transition::Unchanged
        }
    }

    pub fn record_answer(&mut self, question_id: &QuestionId, answer: Answer) -> Transition {
        self.write_answer(question_id, Some(answer))
    }

    /// Withdraw a previously recorded answer.
    pub fn clear_answer(&mut self, question_id: &QuestionId) -> Transition {
        self.write_answer(question_id, None)
    }

    fn write_answer(&mut self, question_id: &QuestionId, answer: Option<Answer>) -> Transition {
        if self.is_submitted() {
            return Transition::Rejected(Rejection::Closed);
        }
        let Some(slot) = self.answers.get_mut(question_id) else {
            return Transition::Rejected(Rejection::UnknownQuestion);
        };
        if *slot == answer {
            return Transition::Unchanged;
        }
        *slot = answer;
        Transition::Applied
    }

    /// Move to `index` and mark that question visited.
    ///
    /// Out-of-range indices are rejected and leave the active index unchanged.
    pub fn set_current_index(&mut self, index: usize) -> Transition {
        if self.is_submitted() {
            return Transition::Rejected(Rejection::Closed);
        }
        let Some(question) = self.questions.get(index) else {
            return Transition::Rejected(Rejection::IndexOutOfRange);
        };
        let newly_visited = self.visited.insert(question.id.clone());
        if !newly_visited && self.current_index == index {
            return Transition::Unchanged;
        }
        self.current_index = index;
        Transition::Applied
    }

    pub fn next(&mut self) -> Transition {
        self.set_current_index(self.current_index.saturating_add(1))
    }

    pub fn previous(&mut self) -> Transition {
        match self.current_index.checked_sub(1) {
            Some(index) => self.set_current_index(index),
            None if self.is_submitted() => Transition::Rejected(Rejection::Closed),
            None => Transition::Rejected(Rejection::IndexOutOfRange),
        }
    }

    /// Advance elapsed time; submits with `TimeExpired` once the limit is hit.
    ///
    /// Untimed attempts never accumulate time.
    pub fn tick(&mut self, delta_secs: u32) -> Transition {
        if self.is_submitted() {
            return Transition::Rejected(Rejection::Closed);
        }
        if !self.is_timed() || delta_secs == 0 {
            return Transition::Unchanged;
        }
        self.elapsed_secs = self.elapsed_secs.saturating_add(delta_secs);
        if self.elapsed_secs >= self.duration_limit_secs {
            self.submitted = Some(SubmitReason::TimeExpired);
            return Transition::Submitted(SubmitReason::TimeExpired);
        }
        Transition::Applied
    }

    pub fn submit(&mut self) -> Transition {
        self.submit_with(SubmitReason::Manual)
    }

    /// Enter the terminal state. The first reason recorded wins.
    pub fn submit_with(&mut self, reason: SubmitReason) -> Transition {
        if self.is_submitted() {
            return Transition::Unchanged;
        }
        self.submitted = Some(reason);
        Transition::Submitted(reason)
    }

    /// Count one cheat event; reaching the limit submits in the same step.
    pub fn register_cheat_event(&mut self) -> Transition {
        if self.is_submitted() {
            return Transition::Rejected(Rejection::Closed);
        }
        self.cheat_count = self.cheat_count.saturating_add(1);
        if self.cheat_count >= self.settings.cheat_limit() {
            self.submitted = Some(SubmitReason::CheatLimit);
            return Transition::Submitted(SubmitReason::CheatLimit);
        }
        Transition::Applied
    }

    /// Count a cheat event and submit regardless of the limit.
    pub fn terminate(&mut self, reason: SubmitReason) -> Transition {
        if self.is_submitted() {
            return Transition::Rejected(Rejection::Closed);
        }
        self.cheat_count = self.cheat_count.saturating_add(1);
        self.submitted = Some(reason);
        Transition::Submitted(reason)
    }

    pub fn reset(&mut self) -> Transition {
        let next = Self::new(self.settings);
        self.replace_with(next)
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn settings(&self) -> AttemptSettings {
        self.settings
    }

    #[must_use]
    pub fn exercise_id(&self) -> Option<ExerciseId> {
        self.exercise_id
    }

    #[must_use]
    pub fn duration_limit_secs(&self) -> u32 {
        self.duration_limit_secs
    }

    #[must_use]
    pub fn is_timed(&self) -> bool {
        self.duration_limit_secs > 0
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, Option<Answer>> {
        &self.answers
    }

    #[must_use]
    pub fn answer(&self, question_id: &QuestionId) -> Option<&Answer> {
        self.answers.get(question_id).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn visited(&self) -> &BTreeSet<QuestionId> {
        &self.visited
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    #[must_use]
    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    /// Seconds left on the clock, or `None` for untimed attempts.
    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        self.is_timed()
            .then(|| self.duration_limit_secs.saturating_sub(self.elapsed_secs))
    }

    #[must_use]
    pub fn cheat_count(&self) -> u32 {
        self.cheat_count
    }

    #[must_use]
    pub fn cheat_limit(&self) -> u32 {
        self.settings.cheat_limit()
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.submitted.is_some()
    }

    #[must_use]
    pub fn submit_reason(&self) -> Option<SubmitReason> {
        self.submitted
    }

    #[must_use]
    pub fn attempted_count(&self) -> usize {
        self.answers.values().filter(|a| a.is_some()).count()
    }

    #[must_use]
    pub fn visited_but_not_attempted(&self) -> usize {
        self.visited.len().saturating_sub(self.attempted_count())
    }

    #[must_use]
    pub fn not_attempted(&self) -> usize {
        self.questions.len().saturating_sub(self.attempted_count())
    }

    /// Share of answered questions in `[0, 100]`; `0` without questions.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percentage(&self) -> f64 {
        if self.questions.is_empty() {
            return 0.0;
        }
        let pct = self.attempted_count() as f64 / self.questions.len() as f64 * 100.0;
        pct.clamp(0.0, 100.0)
    }

    /// Returns `None` for ids outside the current question set.
    #[must_use]
    pub fn question_status(&self, question_id: &QuestionId) -> Option<QuestionStatus> {
        let answer = self.answers.get(question_id)?;
        Some(if answer.is_some() {
            QuestionStatus::Answered
        } else if self.visited.contains(question_id) {
            QuestionStatus::Visited
        } else {
            QuestionStatus::NotVisited
        })
    }
}

impl Default for AttemptSession {
    fn default() -> Self {
        Self::new(AttemptSettings::default())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
