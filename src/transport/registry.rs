use super::vad::{VadAnalyzer, VadParams};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Transport types a session can run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Room-based transport; the room is provisioned by the room service
    Daily,
    /// Peer-to-peer WebRTC negotiated through `/offer`
    SmallWebRtc,
    /// Alias configuration for generic WebRTC runner arguments
    WebRtc,
}

impl TransportKind {
    pub const ALL: [TransportKind; 3] = [
        TransportKind::Daily,
        TransportKind::SmallWebRtc,
        TransportKind::WebRtc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Daily => "daily",
            TransportKind::SmallWebRtc => "smallwebrtc",
            TransportKind::WebRtc => "webrtc",
        }
    }

    /// Build the capability configuration for this transport.
    ///
    /// Capability objects (the VAD analyzer) are only constructed here, for the
    /// selected variant.
    pub fn params(&self) -> TransportParams {
        match self {
            TransportKind::Daily => daily_params(),
            TransportKind::SmallWebRtc | TransportKind::WebRtc => webrtc_params(),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTransport(pub String);

impl fmt::Display for UnknownTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown transport '{}'", self.0)
    }
}

impl std::error::Error for UnknownTransport {}

impl FromStr for TransportKind {
    type Err = UnknownTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransportKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownTransport(s.to_string()))
    }
}

/// Look up a transport by its lower-case name
pub fn resolve(name: &str) -> Option<TransportKind> {
    name.parse().ok()
}

/// Capability configuration materialized once per session
#[derive(Debug)]
pub struct TransportParams {
    pub audio_in_enabled: bool,
    pub audio_out_enabled: bool,
    pub vad_analyzer: Option<VadAnalyzer>,
}

fn daily_params() -> TransportParams {
    TransportParams {
        audio_in_enabled: false,
        audio_out_enabled: true,
        vad_analyzer: None,
    }
}

fn webrtc_params() -> TransportParams {
    TransportParams {
        audio_in_enabled: true,
        audio_out_enabled: true,
        vad_analyzer: Some(VadAnalyzer::new(VadParams::default())),
    }
}
