use super::g711;
use super::{Answer, ConnectionFactory, ConnectionState, PeerConnection, SessionDescription};
use crate::pipeline::AudioFrame;
use crate::transport::TransportError;
use ::webrtc::api::interceptor_registry::register_default_interceptors;
use ::webrtc::api::media_engine::{MediaEngine, MIME_TYPE_PCMU};
use ::webrtc::api::APIBuilder;
use ::webrtc::ice_transport::ice_server::RTCIceServer;
use ::webrtc::interceptor::registry::Registry;
use ::webrtc::media::Sample;
use ::webrtc::peer_connection::configuration::RTCConfiguration;
use ::webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use ::webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use ::webrtc::peer_connection::RTCPeerConnection;
use ::webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use ::webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use ::webrtc::track::track_local::TrackLocal;
use ::webrtc::track::track_remote::TrackRemote;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// PCMU runs at 8 kHz mono in both directions
pub const SAMPLE_RATE: u32 = 8000;

const PCMU_PAYLOAD_TYPE: u8 = 0;

/// Inbound frames buffered before the bot drains them (~2s of 20ms packets)
const INBOUND_QUEUE: usize = 100;

const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => {
                ConnectionState::New
            }
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
        }
    }
}

fn pcmu_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_PCMU.to_owned(),
        clock_rate: SAMPLE_RATE,
        channels: 1,
        sdp_fmtp_line: String::new(),
        rtcp_feedback: vec![],
    }
}

/// Peer connection backed by webrtc-rs
///
/// Only PCMU is registered with the media engine, so the browser has to
/// negotiate it for both the bot's audio track and its own microphone.
pub struct SmallWebRtcConnection {
    pc_id: String,
    pc: Arc<RTCPeerConnection>,
    track: Arc<TrackLocalStaticSample>,
    state: watch::Receiver<ConnectionState>,
    inbound: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
}

impl SmallWebRtcConnection {
    pub async fn new(ice_servers: &[String]) -> Result<Self, TransportError> {
        let pc_id = format!("SmallWebRTCConnection#{}", uuid::Uuid::new_v4());

        let mut media = MediaEngine::default();
        media.register_codec(
            RTCRtpCodecParameters {
                capability: pcmu_capability(),
                payload_type: PCMU_PAYLOAD_TYPE,
                ..Default::default()
            },
            RTPCodecType::Audio,
        )?;

        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(config).await?);

        let track = Arc::new(TrackLocalStaticSample::new(
            pcmu_capability(),
            "audio".to_owned(),
            "voicebot".to_owned(),
        ));
        let rtp_sender = pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // RTCP must be drained for the interceptors (NACK, reports) to run
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtp_sender.read(&mut buf).await.is_ok() {}
        });

        let (state_tx, state_rx) = watch::channel(ConnectionState::New);
        let log_id = pc_id.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let state = ConnectionState::from(state);
            info!("Peer connection {} is now {:?}", log_id, state);
            state_tx.send_replace(state);
            Box::pin(async {})
        }));

        let (audio_tx, audio_rx) = mpsc::channel(INBOUND_QUEUE);
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let audio_tx = audio_tx.clone();
            Box::pin(async move {
                if track.kind() == RTPCodecType::Audio {
                    tokio::spawn(read_inbound_audio(track, audio_tx));
                }
            })
        }));

        Ok(Self {
            pc_id,
            pc,
            track,
            state: state_rx,
            inbound: Mutex::new(Some(audio_rx)),
        })
    }
}

/// Decode inbound PCMU packets until the track ends
async fn read_inbound_audio(track: Arc<TrackRemote>, audio_tx: mpsc::Sender<AudioFrame>) {
    info!("Inbound audio track started (ssrc {})", track.ssrc());

    while let Ok((packet, _)) = track.read_rtp().await {
        let frame = AudioFrame::new(g711::decode(&packet.payload), SAMPLE_RATE, 1);
        if audio_tx.try_send(frame).is_err() {
            // Nobody is draining (or too slowly); drop rather than stall RTP reads
            debug!("Dropping inbound audio packet");
        }
    }

    info!("Inbound audio track ended (ssrc {})", track.ssrc());
}

#[async_trait]
impl PeerConnection for SmallWebRtcConnection {
    fn pc_id(&self) -> &str {
        &self.pc_id
    }

    async fn initialize(&self, offer: SessionDescription) -> Result<(), TransportError> {
        if offer.sdp_type != "offer" {
            return Err(TransportError::InvalidOffer(format!(
                "expected an offer, got '{}'",
                offer.sdp_type
            )));
        }

        let remote = RTCSessionDescription::offer(offer.sdp)
            .map_err(|e| TransportError::InvalidOffer(e.to_string()))?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| TransportError::InvalidOffer(e.to_string()))?;

        let answer = self.pc.create_answer(None).await?;
        let mut gathering_complete = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(answer).await?;

        // Non-trickle: the answer must carry every candidate
        let _ = gathering_complete.recv().await;

        info!("Peer connection {} initialized", self.pc_id);
        Ok(())
    }

    async fn answer(&self) -> Option<Answer> {
        let local = self.pc.local_description().await?;
        if local.sdp.is_empty() {
            return None;
        }

        Some(Answer {
            sdp: local.sdp,
            sdp_type: local.sdp_type.to_string(),
            pc_id: self.pc_id.clone(),
        })
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn take_inbound_audio(&self) -> Option<mpsc::Receiver<AudioFrame>> {
        match self.inbound.lock() {
            Ok(mut inbound) => inbound.take(),
            Err(_) => None,
        }
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    async fn write_audio(&self, frame: &AudioFrame) -> Result<(), TransportError> {
        let frame = frame.to_mono().downsample(SAMPLE_RATE);
        if frame.sample_rate != SAMPLE_RATE {
            warn!(
                "Cannot convert {} Hz audio to {} Hz, dropping frame",
                frame.sample_rate, SAMPLE_RATE
            );
            return Ok(());
        }

        let sample = Sample {
            data: Bytes::from(g711::encode(&frame.samples)),
            duration: frame.duration(),
            ..Default::default()
        };
        self.track.write_sample(&sample).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        info!("Closing peer connection {}", self.pc_id);
        self.pc.close().await?;
        Ok(())
    }
}

/// Creates `SmallWebRtcConnection`s for incoming offers
#[derive(Debug, Clone)]
pub struct SmallWebRtcConnectionFactory {
    ice_servers: Vec<String>,
}

impl SmallWebRtcConnectionFactory {
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self { ice_servers }
    }
}

impl Default for SmallWebRtcConnectionFactory {
    fn default() -> Self {
        Self::new(vec![DEFAULT_STUN_SERVER.to_string()])
    }
}

#[async_trait]
impl ConnectionFactory for SmallWebRtcConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>, TransportError> {
        Ok(Arc::new(SmallWebRtcConnection::new(&self.ice_servers).await?))
    }
}
