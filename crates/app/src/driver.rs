use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::sync::Arc;

use exam_core::model::{
    Answer, AnswerReview, AttemptResults, AttemptSession, QuestionStatus, Rejection, Transition,
};
use services::{AttemptHandle, ChannelEnvironment, KeyPress, ProctorSignal};

/// One line typed by the test taker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Answer(String),
    Clear,
    Goto(usize),
    Next,
    Prev,
    Signal(ProctorSignal),
    Submit,
    Status,
    Help,
    Quit,
}

/// Why a typed line could not be understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    MissingAnswer,
    InvalidNumber(String),
    ZeroIndex,
    MissingKey,
    UnknownModifier(String),
    UnknownCommand(String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::MissingAnswer => write!(f, "answer needs a value"),
            InputError::InvalidNumber(raw) => write!(f, "invalid question number: {raw}"),
            InputError::ZeroIndex => write!(f, "questions are numbered from 1"),
            InputError::MissingKey => write!(f, "key needs a name, e.g. `key ctrl+r`"),
            InputError::UnknownModifier(raw) => write!(f, "unknown modifier: {raw}"),
            InputError::UnknownCommand(raw) => write!(f, "unknown command: {raw}"),
        }
    }
}

impl std::error::Error for InputError {}

impl FromStr for Input {
    type Err = InputError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));

        let input = match word.to_ascii_lowercase().as_str() {
            "answer" | "a" if !rest.is_empty() => Self::Answer(rest.to_owned()),
            "answer" | "a" => return Err(InputError::MissingAnswer),
            "clear" => Self::Clear,
            "goto" | "g" => {
                let n: usize = rest
                    .parse()
                    .map_err(|_| InputError::InvalidNumber(rest.to_owned()))?;
                if n == 0 {
                    return Err(InputError::ZeroIndex);
                }
                Self::Goto(n - 1)
            }
            "next" | "n" => Self::Next,
            "prev" | "p" => Self::Prev,
            "hide" => Self::Signal(ProctorSignal::VisibilityHidden),
            "show" => Self::Signal(ProctorSignal::VisibilityVisible),
            "blur" => Self::Signal(ProctorSignal::WindowBlur),
            "focus" => Self::Signal(ProctorSignal::WindowFocus),
            "fullscreen" => Self::Signal(ProctorSignal::FullscreenEntered),
            "exit-fullscreen" => Self::Signal(ProctorSignal::FullscreenExited),
            "reload" => Self::Signal(ProctorSignal::BeforeUnload),
            "copy" => Self::Signal(ProctorSignal::Copy),
            "menu" => Self::Signal(ProctorSignal::ContextMenu),
            "select" => Self::Signal(ProctorSignal::SelectStart),
            "key" => Self::Signal(ProctorSignal::KeyDown(parse_key(rest)?)),
            "submit" => Self::Submit,
            "status" | "s" | "" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "q" => Self::Quit,
            other => return Err(InputError::UnknownCommand(other.to_owned())),
        };
        Ok(input)
    }
}

/// `ctrl+r`, `meta+R`, `Escape`, `F5`.
fn parse_key(raw: &str) -> Result<KeyPress, InputError> {
    let mut parts: Vec<&str> = raw.split('+').map(str::trim).collect();
    let Some(key) = parts.pop().filter(|k| !k.is_empty()) else {
        return Err(InputError::MissingKey);
    };
    let mut press = KeyPress::new(key);
    for modifier in parts {
        press = match modifier.to_ascii_lowercase().as_str() {
            "ctrl" => press.with_ctrl(),
            "meta" | "cmd" => press.with_meta(),
            other => return Err(InputError::UnknownModifier(other.to_owned())),
        };
    }
    Ok(press)
}

pub const HELP: &str = "\
commands:
  answer <text>    answer the current question
  clear            clear the current answer
  goto <n>         jump to question n
  next | prev      move between questions
  submit           submit the exam
  status           show the current question and progress
  quit             leave; progress is kept for `resume`
environment:
  hide | show | blur | focus | fullscreen | exit-fullscreen
  reload | copy | menu | select | key <combo>";

#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    Print(String),
    Silent,
    Quit,
}

/// Routes typed input to the attempt and to the simulated environment.
pub struct Driver {
    handle: AttemptHandle,
    env: Arc<ChannelEnvironment>,
}

impl Driver {
    pub fn new(handle: AttemptHandle, env: Arc<ChannelEnvironment>) -> Self {
        Self { handle, env }
    }

    pub fn apply(&self, input: Input) -> Step {
        let transition = match input {
            Input::Answer(text) => match self.current_id() {
                Some(id) => self.handle.record_answer(&id, Answer::new(text)),
                None => return Step::Print("no question to answer".into()),
            },
            Input::Clear => match self.current_id() {
                Some(id) => self.handle.clear_answer(&id),
                None => return Step::Silent,
            },
            Input::Goto(index) => self.handle.set_current_index(index),
            Input::Next => self.handle.next(),
            Input::Prev => self.handle.previous(),
            Input::Submit => self.handle.submit(),
            Input::Signal(signal) => {
                let prevented = self.env.emit(signal);
                return if prevented {
                    Step::Print("(blocked)".into())
                } else {
                    Step::Silent
                };
            }
            Input::Status => return Step::Print(self.handle.read(render_status)),
            Input::Help => return Step::Print(HELP.into()),
            Input::Quit => return Step::Quit,
        };

        match transition {
            Transition::Rejected(Rejection::Closed) => Step::Print("the exam is closed".into()),
            Transition::Rejected(Rejection::IndexOutOfRange) => {
                Step::Print("no such question".into())
            }
            Transition::Rejected(Rejection::UnknownQuestion) => {
                Step::Print("unknown question".into())
            }
            Transition::Applied => Step::Print(self.handle.read(render_status)),
            Transition::Unchanged | Transition::Submitted(_) => Step::Silent,
        }
    }

    fn current_id(&self) -> Option<exam_core::model::QuestionId> {
        self.handle
            .read(|s| s.current_question().map(|q| q.id.clone()))
    }
}

fn clock(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub fn render_status(session: &AttemptSession) -> String {
    let mut out = String::new();
    let total = session.questions().len();
    match session.current_question() {
        Some(question) => {
            let answer = session
                .answer(&question.id)
                .map_or("-", Answer::as_str);
            let _ = writeln!(
                out,
                "Question {}/{total}: {}",
                session.current_index() + 1,
                question.text
            );
            if !question.options.is_empty() {
                let _ = writeln!(out, "  options: {}", question.options.join(" | "));
            }
            let _ = writeln!(out, "  your answer: {answer}");
        }
        None => {
            let _ = writeln!(out, "No questions in this exercise.");
        }
    }

    let palette: String = session
        .questions()
        .iter()
        .map(|q| match session.question_status(&q.id) {
            Some(QuestionStatus::Answered) => '#',
            Some(QuestionStatus::Visited) => 'o',
            _ => '.',
        })
        .collect();
    let _ = writeln!(
        out,
        "[{palette}] attempted {} | visited {} | not attempted {} | {:.0}%",
        session.attempted_count(),
        session.visited_but_not_attempted(),
        session.not_attempted(),
        session.progress_percentage()
    );
    let time = session
        .remaining_secs()
        .map_or_else(|| "untimed".to_owned(), |left| format!("{} left", clock(left)));
    let _ = write!(
        out,
        "{time} | cheat events {}/{}",
        session.cheat_count(),
        session.cheat_limit()
    );
    out
}

pub fn render_results(results: &AttemptResults) -> String {
    format!(
        "Submitted ({:?})\n  correct: {}\n  wrong: {}\n  marks: {}\n  time spent: {}\n  cheat events: {}",
        results.reason,
        results.correct_count,
        results.wrong_count,
        results.total_marks,
        clock(results.time_spent_secs),
        results.cheat_count
    )
}

pub fn render_review(review: &[AnswerReview]) -> String {
    let mut out = String::new();
    for (n, line) in review.iter().enumerate() {
        let given = line.given.as_ref().map_or("-", Answer::as_str);
        let mark = if line.is_correct { "ok" } else { "x" };
        let _ = writeln!(
            out,
            "{:>3}. [{mark}] {} given: {given} correct: {}",
            n + 1,
            line.question_id,
            line.correct
        );
    }
    out
}
