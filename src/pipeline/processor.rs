use super::frames::Frame;
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage {stage} failed: {message}")]
    Stage { stage: String, message: String },

    #[error("pipeline input queue closed")]
    QueueClosed,
}

impl PipelineError {
    pub fn stage(stage: &str, message: impl std::fmt::Display) -> Self {
        Self::Stage {
            stage: stage.to_string(),
            message: message.to_string(),
        }
    }
}

/// A single pipeline stage
///
/// Implementations:
/// - `AzureTts`: turns `TtsSpeak` into `OutputAudio`
/// - transport output stages: deliver `OutputAudio` to the remote peer
#[async_trait]
pub trait FrameProcessor: Send {
    /// Process one frame, returning the frames to hand to the next stage
    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, PipelineError>;

    /// Stage name for logging
    fn name(&self) -> &str;
}

/// Ordered chain of stages
pub struct Pipeline {
    stages: Vec<Box<dyn FrameProcessor>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn FrameProcessor>>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Push a frame through every stage. Returns what leaves the last stage.
    pub async fn push(&mut self, frame: Frame) -> Result<Vec<Frame>, PipelineError> {
        let mut frames = vec![frame];

        for stage in self.stages.iter_mut() {
            let mut next = Vec::with_capacity(frames.len());
            for frame in frames {
                debug!("{} <- {}", stage.name(), frame.name());
                next.extend(stage.process(frame).await?);
            }
            frames = next;
        }

        Ok(frames)
    }
}
