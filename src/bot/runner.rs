use super::{BotContext, RunnerArguments};
use crate::config::BotConfig;
use crate::pipeline::{
    Frame, FrameProcessor, FrameQueue, Pipeline, PipelineError, PipelineParams, PipelineRunner,
    PipelineTask, TaskOutcome,
};
use crate::transport::{Transport, TransportError, TransportEvent};
use crate::tts::{AzureTts, TtsError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BotError {
    #[error("bot runner already started")]
    AlreadyStarted,

    #[error("transport events were already taken")]
    EventsUnavailable,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("TTS error: {0}")]
    Tts(#[from] TtsError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Idle,
    Running,
    Terminated,
}

/// Runs one session: TTS → transport output, greeting on client connect
pub struct BotRunner {
    config: BotConfig,
    state: BotState,
}

impl BotRunner {
    pub fn new(config: BotConfig) -> Self {
        Self {
            config,
            state: BotState::Idle,
        }
    }

    pub fn state(&self) -> BotState {
        self.state
    }

    /// Build the pipeline and drive it to completion. Only valid once.
    pub async fn run(
        &mut self,
        mut transport: Box<dyn Transport>,
        tts: Box<dyn FrameProcessor>,
        cancel: CancellationToken,
    ) -> Result<TaskOutcome, BotError> {
        if self.state != BotState::Idle {
            return Err(BotError::AlreadyStarted);
        }

        self.state = BotState::Running;
        info!("Starting bot on {} transport", transport.kind());

        let result = self.drive(transport.as_mut(), tts, cancel).await;

        if let Err(e) = transport.close().await {
            warn!("Failed to close transport: {}", e);
        }
        self.state = BotState::Terminated;
        info!("Bot terminated");

        result
    }

    async fn drive(
        &self,
        transport: &mut dyn Transport,
        tts: Box<dyn FrameProcessor>,
        cancel: CancellationToken,
    ) -> Result<TaskOutcome, BotError> {
        let events = transport
            .take_events()
            .ok_or(BotError::EventsUnavailable)?;

        let pipeline = Pipeline::new(vec![tts, transport.output()]);
        let idle_timeout = match self.config.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let task = PipelineTask::new(pipeline, PipelineParams { idle_timeout })
            .with_cancel_token(cancel);

        // Held until the task ends so the input stays open if the event stream closes
        let queue = task.queue();
        let listener = tokio::spawn(handle_transport_events(
            events,
            queue.clone(),
            task.cancel_token(),
            self.config.greeting.clone(),
        ));

        let outcome = PipelineRunner::new(self.config.handle_sigint).run(task).await;
        listener.abort();
        drop(queue);

        Ok(outcome?)
    }
}

/// React to transport events for the lifetime of the session
async fn handle_transport_events(
    mut events: mpsc::Receiver<TransportEvent>,
    queue: FrameQueue,
    cancel: CancellationToken,
    greeting: String,
) {
    let mut greeted = false;

    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::ClientConnected { client_id } if !greeted => {
                greeted = true;
                info!("Client connected: {}", client_id);
                // One batch: the greeting is always ahead of the end marker
                if let Err(e) = queue.queue_frames(vec![Frame::TtsSpeak(greeting.clone()), Frame::End]) {
                    warn!("Could not queue greeting: {}", e);
                    return;
                }
            }
            TransportEvent::ClientConnected { client_id } => {
                debug!("Ignoring repeated connect from {}", client_id);
            }
            TransportEvent::ClientDisconnected { client_id } => {
                info!("Client disconnected: {}", client_id);
                cancel.cancel();
                return;
            }
            TransportEvent::UserStartedSpeaking => debug!("User started speaking"),
            TransportEvent::UserStoppedSpeaking => debug!("User stopped speaking"),
        }
    }
}

/// Session entry point: resolve the transport, build TTS, run the bot
pub async fn bot(
    args: RunnerArguments,
    ctx: BotContext,
    cancel: CancellationToken,
) -> Result<TaskOutcome, BotError> {
    let kind = args.transport_kind();
    let params = kind.params();
    let mut transport = ctx.transports.create(&args, params).await?;

    let tts = match AzureTts::new(
        ctx.http.clone(),
        &ctx.config.azure,
        transport.output_sample_rate(),
    ) {
        Ok(tts) => tts,
        Err(e) => {
            if let Err(close_err) = transport.close().await {
                warn!("Failed to close transport: {}", close_err);
            }
            return Err(e.into());
        }
    };

    let mut runner = BotRunner::new(ctx.config.bot.clone());
    runner.run(transport, Box::new(tts), cancel).await
}
