use crate::config::DailyConfig;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("DAILY_API_KEY not configured")]
    MissingApiKey,

    #[error("room service returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("room service unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected room service response: {0}")]
    InvalidResponse(String),

    #[error("room TTL of {0} seconds is out of range")]
    InvalidTtl(u64),
}

/// A provisioned room and its access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomDescriptor {
    pub url: String,
    pub name: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    /// Fixed at creation; never renewed
    pub expires_at: DateTime<Utc>,
}

/// Room as returned by `POST /rooms`
#[derive(Debug, Clone, Deserialize)]
pub struct DailyRoom {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Minimal client for the Daily REST API
#[derive(Debug, Clone)]
pub struct DailyRestHelper {
    http: reqwest::Client,
    api_key: Option<String>,
    api_url: String,
}

impl DailyRestHelper {
    pub fn new(http: reqwest::Client, api_key: Option<String>, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_key,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(http: reqwest::Client, config: &DailyConfig) -> Self {
        Self::new(http, config.api_key.clone(), config.api_url.clone())
    }

    fn api_key(&self) -> Result<&str, ProvisionError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(ProvisionError::MissingApiKey)
    }

    /// Create an audio-first room expiring at `expires_at`
    pub async fn create_room(&self, expires_at: DateTime<Utc>) -> Result<DailyRoom, ProvisionError> {
        let api_key = self.api_key()?;

        let body = json!({
            "properties": {
                "exp": expires_at.timestamp(),
                "eject_at_room_exp": true,
                "start_video_off": true,
            }
        });

        let response = self
            .http
            .post(format!("{}/rooms", self.api_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let response = check_status(response).await?;
        response
            .json::<DailyRoom>()
            .await
            .map_err(|e| ProvisionError::InvalidResponse(e.to_string()))
    }

    /// Owner token for `room_name`, valid until `expires_at`
    pub async fn get_token(
        &self,
        room_name: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ProvisionError> {
        let api_key = self.api_key()?;

        let body = json!({
            "properties": {
                "room_name": room_name,
                "exp": expires_at.timestamp(),
                "is_owner": true,
            }
        });

        let response = self
            .http
            .post(format!("{}/meeting-tokens", self.api_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let response = check_status(response).await?;
        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| ProvisionError::InvalidResponse(e.to_string()))?;

        Ok(token.token)
    }

    pub async fn delete_room(&self, room_name: &str) -> Result<(), ProvisionError> {
        let api_key = self.api_key()?;

        let response = self
            .http
            .delete(format!("{}/rooms/{}", self.api_url, room_name))
            .bearer_auth(api_key)
            .send()
            .await?;

        check_status(response).await?;
        info!("Deleted room {}", room_name);
        Ok(())
    }

    /// Create a room and an owner token sharing one expiry, `ttl` from now.
    ///
    /// Single attempt; any failure is returned as is.
    pub async fn create_room_and_token(
        &self,
        ttl: std::time::Duration,
    ) -> Result<RoomDescriptor, ProvisionError> {
        // Fail before any network call when unconfigured
        self.api_key()?;

        let created_at = Utc::now().trunc_subsecs(0);
        let expires_at = expiry_after(created_at, ttl)?;

        let room = self.create_room(expires_at).await?;
        info!("Created room {} (expires {})", room.url, expires_at);

        let token = match self.get_token(&room.name, expires_at).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Token request failed for room {}: {}", room.name, e);
                if let Err(cleanup) = self.delete_room(&room.name).await {
                    warn!("Could not delete room {}: {}", room.name, cleanup);
                }
                return Err(e);
            }
        };

        Ok(RoomDescriptor {
            url: room.url,
            name: room.name,
            token,
            created_at,
            expires_at,
        })
    }
}

/// `created_at + ttl`, or `InvalidTtl` when it does not fit a timestamp
fn expiry_after(
    created_at: DateTime<Utc>,
    ttl: std::time::Duration,
) -> Result<DateTime<Utc>, ProvisionError> {
    let secs = ttl.as_secs();
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| created_at.checked_add_signed(delta))
        .ok_or(ProvisionError::InvalidTtl(secs))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProvisionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProvisionError::Upstream {
        status: status.as_u16(),
        body,
    })
}
