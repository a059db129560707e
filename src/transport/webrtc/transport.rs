use super::{ConnectionState, PeerConnection};
use crate::pipeline::{AudioFrame, Frame, FrameProcessor, PipelineError};
use crate::transport::{
    Transport, TransportError, TransportEvent, TransportKind, TransportParams, VadAnalyzer,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Audio is sent to the peer in packets of this length
const PACKET_DURATION: Duration = Duration::from_millis(20);

/// Let the remote jitter buffer play out the tail before the session closes
const END_GRACE: Duration = Duration::from_millis(500);

const EVENT_QUEUE: usize = 32;

/// Transport over a negotiated `PeerConnection`
pub struct SmallWebRtcTransport {
    kind: TransportKind,
    connection: Arc<dyn PeerConnection>,
    audio_out_enabled: bool,
    events: Option<mpsc::Receiver<TransportEvent>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SmallWebRtcTransport {
    pub fn new(
        kind: TransportKind,
        connection: Arc<dyn PeerConnection>,
        params: TransportParams,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);

        let mut tasks = vec![tokio::spawn(watch_connection(
            connection.pc_id().to_string(),
            connection.state(),
            events_tx.clone(),
        ))];

        if params.audio_in_enabled {
            if let Some(audio) = connection.take_inbound_audio() {
                tasks.push(tokio::spawn(analyze_inbound_audio(
                    audio,
                    params.vad_analyzer,
                    events_tx,
                )));
            }
        }

        Self {
            kind,
            connection,
            audio_out_enabled: params.audio_out_enabled,
            events: Some(events_rx),
            tasks,
        }
    }
}

/// Translate connection state changes into client events, each at most once
async fn watch_connection(
    client_id: String,
    mut state: watch::Receiver<ConnectionState>,
    events: mpsc::Sender<TransportEvent>,
) {
    let mut connected = false;

    loop {
        let current = *state.borrow_and_update();

        if current == ConnectionState::Connected && !connected {
            connected = true;
            let event = TransportEvent::ClientConnected {
                client_id: client_id.clone(),
            };
            if events.send(event).await.is_err() {
                return;
            }
        } else if current.is_terminal() {
            let _ = events
                .send(TransportEvent::ClientDisconnected { client_id })
                .await;
            return;
        }

        if state.changed().await.is_err() {
            return;
        }
    }
}

/// Run inbound audio through the VAD and report speaking transitions
async fn analyze_inbound_audio(
    mut audio: mpsc::Receiver<AudioFrame>,
    mut vad: Option<VadAnalyzer>,
    events: mpsc::Sender<TransportEvent>,
) {
    while let Some(frame) = audio.recv().await {
        let Some(vad) = vad.as_mut() else {
            continue;
        };

        let was_speaking = vad.is_speaking();
        vad.analyze(&frame);

        let event = match (was_speaking, vad.is_speaking()) {
            (false, true) => TransportEvent::UserStartedSpeaking,
            (true, false) => TransportEvent::UserStoppedSpeaking,
            _ => continue,
        };

        if events.send(event).await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl Transport for SmallWebRtcTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn output(&self) -> Box<dyn FrameProcessor> {
        Box::new(WebRtcOutput::new(
            Arc::clone(&self.connection),
            self.audio_out_enabled,
        ))
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events.take()
    }

    fn output_sample_rate(&self) -> u32 {
        self.connection.sample_rate()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.connection.close().await
    }
}

impl Drop for SmallWebRtcTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Final pipeline stage: paces synthesized audio onto the peer connection
pub struct WebRtcOutput {
    connection: Arc<dyn PeerConnection>,
    enabled: bool,
    pacer: Interval,
}

impl WebRtcOutput {
    pub fn new(connection: Arc<dyn PeerConnection>, enabled: bool) -> Self {
        let mut pacer = tokio::time::interval(PACKET_DURATION);
        pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            connection,
            enabled,
            pacer,
        }
    }
}

#[async_trait]
impl FrameProcessor for WebRtcOutput {
    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, PipelineError> {
        match frame {
            Frame::OutputAudio(audio) if self.enabled => {
                let packets = audio.chunks(PACKET_DURATION);
                debug!("Sending {} audio packet(s)", packets.len());

                for packet in &packets {
                    self.pacer.tick().await;
                    self.connection
                        .write_audio(packet)
                        .await
                        .map_err(|e| PipelineError::stage(self.name(), e))?;
                }

                Ok(vec![Frame::OutputAudio(audio)])
            }
            Frame::End => {
                info!("End of session reached output, flushing");
                tokio::time::sleep(END_GRACE).await;
                Ok(vec![Frame::End])
            }
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &str {
        "webrtc-output"
    }
}
