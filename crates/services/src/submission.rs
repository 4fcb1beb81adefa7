use std::str::FromStr;
use std::sync::Arc;

use exam_core::model::{AnswerReview, AttemptResults, SubmitReason};

use crate::error::ParseActionError;
use crate::handle::AttemptHandle;
use crate::notify::{NotificationSink, Severity};

pub const SUBMITTED_SUCCESS: &str = "Exam submitted successfully.";
pub const TIME_UP_WARNING: &str = "Time is up! Your exam has been submitted automatically.";

/// What the user chose on the results screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsAction {
    ReviewAnswers,
    Finish,
}

impl FromStr for ResultsAction {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "review" | "review-answers" => Ok(Self::ReviewAnswers),
            "finish" | "done" => Ok(Self::Finish),
            other => Err(ParseActionError(other.to_owned())),
        }
    }
}

/// Turns the terminal revision into a results summary.
///
/// Grading is a pure read; nothing here mutates the attempt.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    notifier: Arc<dyn NotificationSink>,
}

impl SubmissionCoordinator {
    #[must_use]
    pub fn new(notifier: Arc<dyn NotificationSink>) -> Self {
        Self { notifier }
    }

    /// Wait until the attempt is submitted, by any trigger, then grade it.
    pub async fn wait_for_results(&self, handle: &AttemptHandle) -> AttemptResults {
        let mut changes = handle.subscribe();
        loop {
            if let Some(results) = handle.results() {
                self.announce(&results);
                return results;
            }
            // `handle` owns the sender, so the channel cannot close while we wait.
            if changes.changed().await.is_err() {
                tracing::error!("attempt change feed closed before submission");
                std::future::pending::<()>().await;
            }
        }
    }

    /// Grade without waiting; `None` while the attempt is still open.
    #[must_use]
    pub fn results(&self, handle: &AttemptHandle) -> Option<AttemptResults> {
        handle.results()
    }

    /// Per-question detail for the "review answers" view.
    #[must_use]
    pub fn review(&self, handle: &AttemptHandle) -> Option<Vec<AnswerReview>> {
        handle.results().map(|results| results.answers)
    }

    fn announce(&self, results: &AttemptResults) {
        tracing::info!(
            reason = ?results.reason,
            correct = results.correct_count,
            wrong = results.wrong_count,
            marks = results.total_marks,
            time_spent_secs = results.time_spent_secs,
            "attempt submitted"
        );
        // Proctoring already told the user about forced submissions.
        match results.reason {
            SubmitReason::Manual => self.notifier.notify(SUBMITTED_SUCCESS, Severity::Success),
            SubmitReason::TimeExpired => self.notifier.notify(TIME_UP_WARNING, Severity::Warning),
            SubmitReason::CheatLimit | SubmitReason::FullscreenExit => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CollectingSink;
    use exam_core::model::{Answer, ExerciseId, Question, QuestionId, QuestionSet};
    use std::time::Duration;

    fn handle() -> AttemptHandle {
        let handle = AttemptHandle::default();
        handle.start_session(ExerciseId::new(3), 10);
        handle.set_questions(
            QuestionSet::new(vec![
                Question::new("q1", "One", vec!["A".into(), "B".into()], "A"),
                Question::new("q2", "Two", vec!["C".into(), "D".into()], "D"),
            ])
            .unwrap(),
        );
        handle
    }

    #[test]
    fn results_action_parses_user_input() {
        assert_eq!("review".parse::<ResultsAction>(), Ok(ResultsAction::ReviewAnswers));
        assert_eq!(" Finish ".parse::<ResultsAction>(), Ok(ResultsAction::Finish));
        assert_eq!(
            "Later".parse::<ResultsAction>(),
            Err(ParseActionError("later".into()))
        );
    }

    #[test]
    fn nothing_to_show_while_open() {
        let sink = Arc::new(CollectingSink::new());
        let coordinator = SubmissionCoordinator::new(sink);
        let handle = handle();
        assert!(coordinator.results(&handle).is_none());
        assert!(coordinator.review(&handle).is_none());
    }

    #[tokio::test]
    async fn already_submitted_resolves_immediately() {
        let sink = Arc::new(CollectingSink::new());
        let coordinator = SubmissionCoordinator::new(sink.clone());
        let handle = handle();
        handle.record_answer(&QuestionId::new("q1"), Answer::from("A"));
        handle.tick(42);
        handle.submit();

        let results = coordinator.wait_for_results(&handle).await;
        assert_eq!(results.correct_count, 1);
        assert_eq!(results.wrong_count, 1);
        assert_eq!(results.total_marks, 5);
        assert_eq!(results.time_spent_secs, 42);
        assert_eq!(sink.notices()[0].severity, Severity::Success);
    }

    #[tokio::test]
    async fn waits_for_a_later_submission() {
        let sink = Arc::new(CollectingSink::new());
        let coordinator = SubmissionCoordinator::new(sink.clone());
        let handle = handle();

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { coordinator.wait_for_results(&handle).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.record_answer(&QuestionId::new("q2"), Answer::from("D"));
        assert!(!waiter.is_finished());

        handle.register_cheat_event();
        handle.register_cheat_event();
        handle.register_cheat_event();

        let results = waiter.await.unwrap();
        assert_eq!(results.reason, SubmitReason::CheatLimit);
        assert_eq!(results.correct_count, 1);
        assert_eq!(results.cheat_count, 3);
        assert!(sink.notices().is_empty());
    }

    #[tokio::test]
    async fn review_lists_every_question() {
        let sink = Arc::new(CollectingSink::new());
        let coordinator = SubmissionCoordinator::new(sink);
        let handle = handle();
        handle.record_answer(&QuestionId::new("q2"), Answer::from("C"));
        handle.submit();

        let review = coordinator.review(&handle).unwrap();
        assert_eq!(review.len(), 2);
        assert!(review[0].given.is_none());
        assert!(!review[1].is_correct);
        assert_eq!(review[1].correct.as_str(), "D");
    }
}
