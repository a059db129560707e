use super::runner::BotError;
use crate::pipeline::TaskOutcome;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("server is shutting down")]
    ShuttingDown,
}

/// Identifies a dispatched session in logs
#[derive(Debug, Clone)]
pub struct BotHandle {
    pub session_id: Uuid,
    pub label: String,
}

/// Owns every detached bot session
///
/// Sessions are not awaited by the HTTP handlers that start them. Their
/// failures (errors and panics) end up here and are only logged, since the
/// HTTP response has already been sent.
#[derive(Clone)]
pub struct BotSupervisor {
    tracker: TaskTracker,
    shutdown: CancellationToken,
    active: Arc<AtomicUsize>,
}

impl BotSupervisor {
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Start a session in the background.
    ///
    /// `bot` receives a cancellation token that fires on supervisor shutdown.
    pub fn dispatch<F, Fut>(&self, label: &str, bot: F) -> Result<BotHandle, DispatchError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<TaskOutcome, BotError>> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::ShuttingDown);
        }

        let session_id = Uuid::new_v4();
        let span = info_span!("bot", session = %session_id, transport = %label);

        let session = tokio::spawn(bot(self.shutdown.child_token()).instrument(span.clone()));
        self.active.fetch_add(1, Ordering::SeqCst);

        let active = Arc::clone(&self.active);
        self.tracker.spawn(
            async move {
                match session.await {
                    Ok(Ok(outcome)) => info!("Bot session finished: {:?}", outcome),
                    Ok(Err(e)) => error!("Bot session failed: {}", e),
                    Err(e) if e.is_panic() => error!("Bot session panicked: {}", e),
                    Err(e) => warn!("Bot session aborted: {}", e),
                }
                active.fetch_sub(1, Ordering::SeqCst);
            }
            .instrument(span),
        );

        info!("Dispatched bot session {} ({})", session_id, label);
        Ok(BotHandle {
            session_id,
            label: label.to_string(),
        })
    }

    /// Refuse new sessions, cancel running ones and wait up to `grace` for them.
    /// Returns whether every session stopped in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        info!("Stopping {} bot session(s)", self.active_sessions());
        self.shutdown.cancel();
        self.tracker.close();

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "{} bot session(s) still running after {:?}",
                    self.active_sessions(),
                    grace
                );
                false
            }
        }
    }
}

impl Default for BotSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
