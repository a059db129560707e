use super::error::ApiError;
use super::state::AppState;
use crate::bot::{self, DailyRunnerArguments, RunnerArguments, WebRtcRunnerArguments};
use crate::rooms::ProvisionError;
use crate::transport::webrtc::{Answer, SessionDescription};
use crate::transport::{resolve, TransportError, TransportKind};
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectResponse {
    #[serde(rename = "dailyRoom")]
    pub daily_room: String,

    #[serde(rename = "dailyToken")]
    pub daily_token: String,

    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct OfferRequest {
    pub sdp: Option<String>,

    #[serde(rename = "type")]
    pub sdp_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub enabled_transports: Vec<String>,
    pub active_sessions: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /connect
/// Create a Daily room and launch the bot in it
pub async fn connect(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ConnectResponse>, ApiError> {
    let request = parse_connect_body(&body)?;
    let logged = serde_json::Value::Object(request.clone());
    info!("Connection request received: {}", logged);

    let transport_type = match request.get("transport_type") {
        None | Some(Value::Null) => state.config.default_transport().to_string(),
        Some(Value::String(name)) => name.to_lowercase(),
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "transport_type invalide: {}",
                other
            )))
        }
    };

    if !state.config.is_transport_enabled(&transport_type) {
        warn!("Requested transport not allowed: {}", transport_type);
        return Err(ApiError::BadRequest(format!(
            "Transport '{}' non disponible",
            transport_type
        )));
    }

    let Some(kind) = resolve(&transport_type) else {
        warn!("Enabled transport has no registry entry: {}", transport_type);
        return Err(ApiError::BadRequest(format!(
            "Transport '{}' non disponible",
            transport_type
        )));
    };

    if kind != TransportKind::Daily {
        return Err(ApiError::BadRequest(
            "Utilisez l'endpoint /offer pour SmallWebRTC".to_string(),
        ));
    }

    let ttl = Duration::from_secs(state.config.daily.room_ttl_secs);
    let room = state
        .rooms
        .create_room_and_token(ttl)
        .await
        .map_err(|e| {
            error!("Failed to create Daily room: {}", e);
            let message = format!("Échec de création de la room Daily: {}", e);
            match e {
                ProvisionError::MissingApiKey | ProvisionError::InvalidTtl(_) => {
                    ApiError::Configuration(message)
                }
                _ => ApiError::Upstream(message),
            }
        })?;

    info!("Daily room created: {}", room.url);

    let args = RunnerArguments::Daily(DailyRunnerArguments {
        kind,
        room_url: room.url.clone(),
        token: room.token.clone(),
        body: Value::Object(request),
    });
    let ctx = state.bot_context.clone();

    if let Err(e) = state
        .bots
        .dispatch(kind.as_str(), move |cancel| {
            bot::bot(args, ctx, cancel)
        })
    {
        error!("Could not launch bot for room {}: {}", room.url, e);
        // No bot will ever join; don't leave the room around until it expires
        if let Err(cleanup) = state.rooms.delete_room(&room.name).await {
            warn!("Could not delete orphaned room {}: {}", room.name, cleanup);
        }
        return Err(ApiError::Upstream(format!("Échec de lancement du bot: {}", e)));
    }

    Ok(Json(ConnectResponse {
        daily_room: room.url,
        daily_token: room.token,
        message: "Room Daily créée avec succès, bot lancé".to_string(),
    }))
}

/// An absent or empty body counts as `{}`; anything but a JSON object is rejected.
fn parse_connect_body(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) => Err(ApiError::BadRequest(
            "Le corps de la requête doit être un objet JSON".to_string(),
        )),
        Err(e) => Err(ApiError::BadRequest(format!("JSON invalide: {}", e))),
    }
}

/// POST /offer
/// Answer a browser's WebRTC offer and launch the bot on the connection
pub async fn offer(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Answer>, ApiError> {
    if !state
        .config
        .is_transport_enabled(TransportKind::SmallWebRtc.as_str())
    {
        return Err(ApiError::BadRequest(
            "Le transport SmallWebRTC n'est pas activé".to_string(),
        ));
    }

    let invalid_offer = || ApiError::BadRequest("Offre SDP invalide".to_string());

    let request: OfferRequest = serde_json::from_slice(&body).map_err(|_| invalid_offer())?;
    let (Some(sdp), Some(sdp_type)) = (request.sdp, request.sdp_type) else {
        return Err(invalid_offer());
    };

    let connection = state.connections.create().await.map_err(|e| {
        error!("Failed to create peer connection: {}", e);
        ApiError::Upstream(format!("Impossible de créer la connexion WebRTC: {}", e))
    })?;

    if let Err(e) = connection.initialize(SessionDescription { sdp, sdp_type }).await {
        error!("Failed to apply offer: {}", e);
        let _ = connection.close().await;
        return Err(match e {
            TransportError::InvalidOffer(_) => invalid_offer(),
            other => ApiError::Upstream(format!("Échec de la négociation WebRTC: {}", other)),
        });
    }

    let Some(answer) = connection.answer().await.filter(|a| !a.sdp.is_empty()) else {
        error!("No answer produced for {}", connection.pc_id());
        let _ = connection.close().await;
        return Err(ApiError::Upstream(
            "Impossible de créer une réponse WebRTC".to_string(),
        ));
    };

    let args = RunnerArguments::WebRtc(WebRtcRunnerArguments {
        kind: TransportKind::SmallWebRtc,
        connection: connection.clone(),
    });
    let ctx = state.bot_context.clone();

    if let Err(e) = state
        .bots
        .dispatch(TransportKind::SmallWebRtc.as_str(), move |cancel| {
            bot::bot(args, ctx, cancel)
        })
    {
        error!("Could not launch bot for {}: {}", connection.pc_id(), e);
        let _ = connection.close().await;
        return Err(ApiError::Upstream(format!("Échec de lancement du bot: {}", e)));
    }

    info!("Answered offer for {}", answer.pc_id);
    Ok(Json(answer))
}

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service.name.clone(),
        enabled_transports: state.config.enabled_transports.clone(),
        active_sessions: state.bots.active_sessions(),
    })
}

/// GET /
pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "Azure Debug Voice AI Engine",
        "status": "running",
    }))
}

/// GET /client
/// Static browser client
pub async fn client_page(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let client_file = Path::new(&state.config.service.client_dir).join("client.html");

    let response = match ServeFile::new(&client_file).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    if response.status() == StatusCode::NOT_FOUND {
        warn!("Client file missing: {}", client_file.display());
        return Err(ApiError::NotFound("Client file not found".to_string()));
    }

    Ok(response.into_response())
}
