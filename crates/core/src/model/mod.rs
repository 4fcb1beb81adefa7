mod attempt;
mod ids;
mod question;
mod results;
mod settings;
mod snapshot;

pub use ids::{ExerciseId, ParseIdError, QuestionId};

pub use attempt::{AttemptSession, QuestionStatus, Rejection, SubmitReason, Transition};
pub use question::{Answer, Question, QuestionError, QuestionSet};
pub use results::{AnswerReview, AttemptResults};
pub use settings::{AttemptSettings, SettingsError};
pub use snapshot::{AttemptSnapshot, SnapshotError};
