use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use super::policy::{ProctorPolicy, ProctorSignal};
use crate::error::EnvironmentError;

/// The host the attempt runs in (a browser window, a kiosk shell, a test double).
///
/// `attach` installs listeners that forward signals into `signals`; `detach`
/// removes them again and must be safe to call more than once.
pub trait ProctorEnvironment: Send + Sync {
    fn request_fullscreen(&self) -> Result<(), EnvironmentError>;

    fn attach(&self, signals: mpsc::UnboundedSender<ProctorSignal>)
    -> Result<(), EnvironmentError>;

    fn detach(&self);
}

#[derive(Debug, Default)]
struct ChannelState {
    listener: Option<mpsc::UnboundedSender<ProctorSignal>>,
    attach_count: usize,
    detach_count: usize,
    fullscreen_denied: Option<String>,
    fullscreen_requests: usize,
}

/// In-process environment: signals are pushed with [`ChannelEnvironment::emit`].
#[derive(Debug, Default)]
pub struct ChannelEnvironment {
    state: Mutex<ChannelState>,
}

impl ChannelEnvironment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every fullscreen request fail with `reason`.
    #[must_use]
    pub fn denying_fullscreen(reason: impl Into<String>) -> Self {
        let env = Self::default();
        env.lock().fullscreen_denied = Some(reason.into());
        env
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispatch a signal to the attached listener.
    ///
    /// Returns whether the default action was prevented. Without a listener
    /// nothing is prevented.
    pub fn emit(&self, signal: ProctorSignal) -> bool {
        let state = self.lock();
        let Some(listener) = state.listener.as_ref() else {
            return false;
        };
        let prevented = ProctorPolicy::prevents_default(&signal);
        if listener.send(signal).is_err() {
            tracing::debug!("proctor listener gone; signal dropped");
            return false;
        }
        prevented
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.lock()
            .listener
            .as_ref()
            .is_some_and(|listener| !listener.is_closed())
    }

    #[must_use]
    pub fn attach_count(&self) -> usize {
        self.lock().attach_count
    }

    #[must_use]
    pub fn detach_count(&self) -> usize {
        self.lock().detach_count
    }

    #[must_use]
    pub fn fullscreen_requests(&self) -> usize {
        self.lock().fullscreen_requests
    }
}

impl ProctorEnvironment for ChannelEnvironment {
    fn request_fullscreen(&self) -> Result<(), EnvironmentError> {
        let mut state = self.lock();
        state.fullscreen_requests += 1;
        match &state.fullscreen_denied {
            Some(reason) => Err(EnvironmentError::FullscreenDenied(reason.clone())),
            None => Ok(()),
        }
    }

    fn attach(
        &self,
        signals: mpsc::UnboundedSender<ProctorSignal>,
    ) -> Result<(), EnvironmentError> {
        let mut state = self.lock();
        if state.listener.is_some() {
            return Err(EnvironmentError::ListenersUnavailable(
                "listeners already attached".to_owned(),
            ));
        }
        state.listener = Some(signals);
        state.attach_count += 1;
        Ok(())
    }

    fn detach(&self) {
        let mut state = self.lock();
        if state.listener.take().is_some() {
            state.detach_count += 1;
        }
    }
}
