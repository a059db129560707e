//! Peer-to-peer WebRTC transport
//!
//! The HTTP `/offer` endpoint creates a `PeerConnection`, answers the
//! browser's offer, and hands the connection to a bot session which wraps it
//! in a `SmallWebRtcTransport`.

mod connection;
pub mod g711;
mod transport;

use crate::pipeline::AudioFrame;
use crate::transport::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

pub use connection::{SmallWebRtcConnection, SmallWebRtcConnectionFactory, SAMPLE_RATE};
pub use transport::{SmallWebRtcTransport, WebRtcOutput};

/// SDP offer or answer as exchanged with the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
}

/// Answer returned from `/offer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
    pub pc_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Closed
        )
    }
}

/// A negotiated peer connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Identifier returned to the client with the answer
    fn pc_id(&self) -> &str;

    /// Apply the remote offer and prepare a local answer
    async fn initialize(&self, offer: SessionDescription) -> Result<(), TransportError>;

    /// Local answer, once `initialize` succeeded
    async fn answer(&self) -> Option<Answer>;

    /// Connection state; the receiver always holds the latest value
    fn state(&self) -> watch::Receiver<ConnectionState>;

    /// Decoded inbound audio; only the first call returns it
    fn take_inbound_audio(&self) -> Option<mpsc::Receiver<AudioFrame>>;

    /// Sample rate of the negotiated audio codec
    fn sample_rate(&self) -> u32;

    async fn write_audio(&self, frame: &AudioFrame) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Creates fresh peer connections for `/offer`
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>, TransportError>;
}
