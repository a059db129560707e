use crate::transport::webrtc::PeerConnection;
use crate::transport::TransportKind;
use std::fmt;
use std::sync::Arc;

/// Session launched for a provisioned room
#[derive(Debug, Clone)]
pub struct DailyRunnerArguments {
    /// Transport resolved from the request
    pub kind: TransportKind,
    pub room_url: String,
    pub token: String,
    /// Original `/connect` request body
    pub body: serde_json::Value,
}

/// Session launched for a peer connection answered by `/offer`
#[derive(Clone)]
pub struct WebRtcRunnerArguments {
    pub kind: TransportKind,
    pub connection: Arc<dyn PeerConnection>,
}

impl fmt::Debug for WebRtcRunnerArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcRunnerArguments")
            .field("kind", &self.kind)
            .field("pc_id", &self.connection.pc_id())
            .finish()
    }
}

/// Immutable launch arguments for one bot session
#[derive(Debug, Clone)]
pub enum RunnerArguments {
    Daily(DailyRunnerArguments),
    WebRtc(WebRtcRunnerArguments),
}

impl RunnerArguments {
    pub fn transport_kind(&self) -> TransportKind {
        match self {
            RunnerArguments::Daily(args) => args.kind,
            RunnerArguments::WebRtc(args) => args.kind,
        }
    }
}
