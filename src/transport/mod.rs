//! Transports connecting a bot session to its remote client
//!
//! - `registry`: transport names to lazily built capability configurations
//! - `vad`: voice activity detection for inbound audio
//! - `webrtc`: peer connection and transport for the smallwebrtc flow

pub mod registry;
pub mod vad;
pub mod webrtc;

use crate::bot::RunnerArguments;
use crate::pipeline::FrameProcessor;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

pub use registry::{resolve, TransportKind, TransportParams, UnknownTransport};
pub use vad::{VadAnalyzer, VadParams, VadState};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport '{0}' is not available in this server")]
    Unsupported(String),

    #[error("invalid session description: {0}")]
    InvalidOffer(String),

    #[error("peer connection error: {0}")]
    PeerConnection(String),
}

impl From<::webrtc::Error> for TransportError {
    fn from(err: ::webrtc::Error) -> Self {
        TransportError::PeerConnection(err.to_string())
    }
}

/// Events a transport reports to the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ClientConnected { client_id: String },
    ClientDisconnected { client_id: String },
    UserStartedSpeaking,
    UserStoppedSpeaking,
}

/// A live transport owned by one bot session
#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Pipeline stage delivering frames to the remote client
    fn output(&self) -> Box<dyn FrameProcessor>;

    /// Event stream; only the first call returns it
    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>>;

    /// Sample rate the output stage expects
    fn output_sample_rate(&self) -> u32;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Builds the transport for a session from its runner arguments
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        args: &RunnerArguments,
        params: TransportParams,
    ) -> Result<Box<dyn Transport>, TransportError>;

    /// Whether `create` can succeed for this kind
    fn supports(&self, _kind: TransportKind) -> bool {
        true
    }
}

/// Transport factory used by the server binary
#[derive(Debug, Default, Clone)]
pub struct DefaultTransportFactory;

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn create(
        &self,
        args: &RunnerArguments,
        params: TransportParams,
    ) -> Result<Box<dyn Transport>, TransportError> {
        match args {
            // Joining a Daily room as a media participant needs Daily's native
            // call client, which this server does not link.
            RunnerArguments::Daily(_) => Err(TransportError::Unsupported(
                TransportKind::Daily.to_string(),
            )),
            RunnerArguments::WebRtc(webrtc_args) => {
                info!(
                    "Creating smallwebrtc transport for peer {}",
                    webrtc_args.connection.pc_id()
                );
                Ok(Box::new(webrtc::SmallWebRtcTransport::new(
                    args.transport_kind(),
                    Arc::clone(&webrtc_args.connection),
                    params,
                )))
            }
        }
    }

    fn supports(&self, kind: TransportKind) -> bool {
        kind != TransportKind::Daily
    }
}
