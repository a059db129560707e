//! Frame pipeline driven by each bot session
//!
//! A session owns exactly one `PipelineTask`:
//! - frames are queued through a `FrameQueue`
//! - each frame flows through the ordered `Pipeline` stages
//! - the task ends on `Frame::End`, on idle timeout, or on cancellation

mod frames;
mod processor;
mod task;

pub use frames::{AudioFrame, Frame};
pub use processor::{FrameProcessor, Pipeline, PipelineError};
pub use task::{FrameQueue, PipelineParams, PipelineRunner, PipelineTask, TaskOutcome};
