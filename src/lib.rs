pub mod bot;
pub mod config;
pub mod http;
pub mod pipeline;
pub mod rooms;
pub mod transport;
pub mod tts;

pub use bot::{
    BotContext, BotRunner, BotState, BotSupervisor, DailyRunnerArguments, RunnerArguments,
    WebRtcRunnerArguments,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use pipeline::{AudioFrame, Frame, FrameProcessor, Pipeline, PipelineTask, TaskOutcome};
pub use rooms::{DailyRestHelper, RoomDescriptor};
pub use transport::{Transport, TransportEvent, TransportFactory, TransportKind, TransportParams};
pub use tts::AzureTts;
