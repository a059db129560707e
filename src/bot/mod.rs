//! Bot sessions
//!
//! This module provides:
//! - `RunnerArguments`: what a session is launched with (room or peer connection)
//! - `BotRunner`: builds the TTS → transport pipeline and greets the client
//! - `BotSupervisor`: detached session tasks with failure logging and shutdown

mod args;
mod runner;
mod supervisor;

use crate::config::Config;
use crate::transport::TransportFactory;
use std::sync::Arc;

pub use args::{DailyRunnerArguments, RunnerArguments, WebRtcRunnerArguments};
pub use runner::{bot, BotError, BotRunner, BotState};
pub use supervisor::{BotHandle, BotSupervisor, DispatchError};

/// Everything a session needs besides its runner arguments
#[derive(Clone)]
pub struct BotContext {
    pub config: Arc<Config>,
    pub transports: Arc<dyn TransportFactory>,
    pub http: reqwest::Client,
}
