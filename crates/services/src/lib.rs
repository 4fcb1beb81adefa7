#![forbid(unsafe_code)]

pub mod app_services;
pub mod attempt;
pub mod error;
pub mod handle;
pub mod notify;
pub mod persist;
pub mod proctor;
pub mod question_source;
pub mod submission;
pub mod timer;

pub use exam_core::Clock;

pub use app_services::ExamServices;
pub use attempt::{AttemptRun, AttemptService};
pub use error::{
    AppServicesError, AttemptError, EnvironmentError, ParseActionError, ProctorError,
    QuestionSourceError,
};
pub use handle::{AttemptHandle, Revision};
pub use notify::{CollectingSink, Notice, NotificationSink, Severity, TracingSink};
pub use persist::{PersistGuard, SnapshotPersister};
pub use proctor::{
    ChannelEnvironment, FullscreenState, KeyPress, ProctorAction, ProctorEnvironment, ProctorGuard,
    ProctorMonitor, ProctorPolicy, ProctorSignal,
};
pub use question_source::{HttpQuestionSource, QuestionSourceConfig};
pub use submission::{ResultsAction, SubmissionCoordinator};
pub use timer::{TimerController, TimerGuard, TimerState};
