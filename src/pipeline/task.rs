use super::frames::Frame;
use super::processor::{Pipeline, PipelineError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Parameters for a pipeline task
#[derive(Debug, Clone, Default)]
pub struct PipelineParams {
    /// Stop the task when no frame is queued for this long
    pub idle_timeout: Option<Duration>,
}

/// Why a task stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// An `End` frame went through the pipeline
    Completed,
    /// Nothing was queued within the idle timeout
    IdleTimeout,
    /// The task's cancellation token fired
    Cancelled,
}

/// Input handle for a running task
///
/// Each `queue_frames` call is delivered as one batch, so frames queued
/// together are processed back to back in the given order.
#[derive(Clone)]
pub struct FrameQueue {
    tx: mpsc::UnboundedSender<Vec<Frame>>,
}

impl FrameQueue {
    pub fn queue_frames(&self, frames: Vec<Frame>) -> Result<(), PipelineError> {
        self.tx.send(frames).map_err(|_| PipelineError::QueueClosed)
    }

    pub fn queue_frame(&self, frame: Frame) -> Result<(), PipelineError> {
        self.queue_frames(vec![frame])
    }
}

/// A pipeline plus its input queue
pub struct PipelineTask {
    pipeline: Pipeline,
    params: PipelineParams,
    tx: mpsc::UnboundedSender<Vec<Frame>>,
    rx: mpsc::UnboundedReceiver<Vec<Frame>>,
    cancel: CancellationToken,
}

impl PipelineTask {
    pub fn new(pipeline: Pipeline, params: PipelineParams) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            pipeline,
            params,
            tx,
            rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token (e.g. a child of the supervisor's)
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn queue(&self) -> FrameQueue {
        FrameQueue {
            tx: self.tx.clone(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the pipeline until `End`, idle timeout or cancellation
    pub async fn run(self) -> Result<TaskOutcome, PipelineError> {
        let PipelineTask {
            mut pipeline,
            params,
            tx,
            mut rx,
            cancel,
        } = self;
        // Only externally handed-out queues keep the channel open.
        drop(tx);

        info!("Pipeline task started ({} stages)", pipeline.len());
        pipeline.push(Frame::Start).await?;

        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Pipeline task cancelled");
                    return Ok(TaskOutcome::Cancelled);
                }
                batch = rx.recv() => batch,
                _ = idle(params.idle_timeout) => {
                    warn!("Pipeline idle for {:?}, stopping", params.idle_timeout);
                    return Ok(TaskOutcome::IdleTimeout);
                }
            };

            let Some(batch) = batch else {
                // Every queue was dropped; nothing can reach the pipeline anymore.
                return Err(PipelineError::QueueClosed);
            };

            for frame in batch {
                let is_end = frame == Frame::End;

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("Pipeline task cancelled");
                        return Ok(TaskOutcome::Cancelled);
                    }
                    out = pipeline.push(frame) => {
                        let out = out?;
                        debug!("{} frame(s) left the pipeline", out.len());
                    }
                }

                if is_end {
                    info!("Pipeline task completed");
                    return Ok(TaskOutcome::Completed);
                }
            }
        }
    }
}

async fn idle(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// Drives a task to completion
#[derive(Debug, Clone, Default)]
pub struct PipelineRunner {
    /// Cancel the task on Ctrl-C
    pub handle_sigint: bool,
}

impl PipelineRunner {
    pub fn new(handle_sigint: bool) -> Self {
        Self { handle_sigint }
    }

    pub async fn run(&self, task: PipelineTask) -> Result<TaskOutcome, PipelineError> {
        if !self.handle_sigint {
            return task.run().await;
        }

        let cancel = task.cancel_token();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling pipeline task");
                cancel.cancel();
            }
        });

        let result = task.run().await;
        watcher.abort();
        result
    }
}
