//! Proctoring: turns environment signals into cheat events and forced submissions.

mod environment;
mod monitor;
mod policy;

pub use environment::{ChannelEnvironment, ProctorEnvironment};
pub use monitor::{ProctorGuard, ProctorMonitor};
pub use policy::{FullscreenState, KeyPress, ProctorAction, ProctorPolicy, ProctorSignal};
