use crate::bot::{BotContext, BotSupervisor};
use crate::config::Config;
use crate::rooms::DailyRestHelper;
use crate::transport::webrtc::{ConnectionFactory, SmallWebRtcConnectionFactory};
use crate::transport::{DefaultTransportFactory, TransportFactory};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Timeout for outbound calls (room service, TTS)
const HTTP_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Built once at startup
    pub config: Arc<Config>,

    pub rooms: DailyRestHelper,

    /// Creates a peer connection per `/offer`
    pub connections: Arc<dyn ConnectionFactory>,

    /// Detached bot sessions
    pub bots: BotSupervisor,

    /// Handed to every dispatched bot
    pub bot_context: BotContext,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_CLIENT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_collaborators(
            config,
            http,
            Arc::new(SmallWebRtcConnectionFactory::default()),
            Arc::new(DefaultTransportFactory),
        ))
    }

    /// State with explicit connection and transport factories
    pub fn with_collaborators(
        config: Config,
        http: reqwest::Client,
        connections: Arc<dyn ConnectionFactory>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        let config = Arc::new(config);

        Self {
            rooms: DailyRestHelper::from_config(http.clone(), &config.daily),
            connections,
            bots: BotSupervisor::new(),
            bot_context: BotContext {
                config: Arc::clone(&config),
                transports,
                http,
            },
            config,
        }
    }
}
