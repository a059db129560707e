use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tower::ServiceExt;
use voicebot_server::config::Config;
use voicebot_server::pipeline::AudioFrame;
use voicebot_server::transport::webrtc::{
    Answer, ConnectionFactory, ConnectionState, PeerConnection, SessionDescription,
};
use voicebot_server::transport::{
    Transport, TransportError, TransportFactory, TransportKind, TransportParams,
};
use voicebot_server::{create_router, AppState, RunnerArguments};
use wiremock::matchers::{header as header_eq, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Fakes
// ============================================================================

/// Records launch arguments and never builds a transport
#[derive(Default)]
struct RecordingTransports {
    launched: Mutex<Vec<RunnerArguments>>,
}

#[async_trait]
impl TransportFactory for RecordingTransports {
    async fn create(
        &self,
        args: &RunnerArguments,
        _params: TransportParams,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self.launched.lock().unwrap().push(args.clone());
        Err(TransportError::Unsupported("test".into()))
    }
}

struct FakeConnection {
    answer_sdp: String,
    reject_offer: bool,
    closed: AtomicUsize,
    state: watch::Sender<ConnectionState>,
}

#[async_trait]
impl PeerConnection for FakeConnection {
    fn pc_id(&self) -> &str {
        "pc-test"
    }

    async fn initialize(&self, offer: SessionDescription) -> Result<(), TransportError> {
        if self.reject_offer || offer.sdp_type != "offer" {
            return Err(TransportError::InvalidOffer("rejected".into()));
        }
        Ok(())
    }

    async fn answer(&self) -> Option<Answer> {
        Some(Answer {
            sdp: self.answer_sdp.clone(),
            sdp_type: "answer".into(),
            pc_id: "pc-test".into(),
        })
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn take_inbound_audio(&self) -> Option<mpsc::Receiver<AudioFrame>> {
        None
    }

    fn sample_rate(&self) -> u32 {
        8000
    }

    async fn write_audio(&self, _frame: &AudioFrame) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeConnections {
    created: AtomicUsize,
    answer_sdp: String,
    reject_offer: bool,
}

impl FakeConnections {
    fn answering(sdp: &str) -> Self {
        Self {
            created: AtomicUsize::new(0),
            answer_sdp: sdp.to_string(),
            reject_offer: false,
        }
    }
}

#[async_trait]
impl ConnectionFactory for FakeConnections {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>, TransportError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let (state, _) = watch::channel(ConnectionState::New);
        Ok(Arc::new(FakeConnection {
            answer_sdp: self.answer_sdp.clone(),
            reject_offer: self.reject_offer,
            closed: AtomicUsize::new(0),
            state,
        }))
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct TestApp {
    state: AppState,
    router: Router,
    transports: Arc<RecordingTransports>,
    connections: Arc<FakeConnections>,
}

fn test_config(daily_url: &str, transports: &[&str]) -> Config {
    let mut cfg = Config::default();
    cfg.daily.api_key = Some("test-key".to_string());
    cfg.daily.api_url = daily_url.to_string();
    cfg.enabled_transports = transports.iter().map(|t| t.to_string()).collect();
    cfg
}

fn test_app(cfg: Config) -> TestApp {
    test_app_with(cfg, FakeConnections::answering("v=0\r\nanswer"))
}

fn test_app_with(cfg: Config, connections: FakeConnections) -> TestApp {
    let transports = Arc::new(RecordingTransports::default());
    let connections = Arc::new(connections);
    let state = AppState::with_collaborators(
        cfg,
        reqwest::Client::new(),
        connections.clone(),
        transports.clone(),
    );

    TestApp {
        router: create_router(state.clone()),
        state,
        transports,
        connections,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn mount_daily(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rooms"))
        .and(header_eq("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "room-1",
            "url": "https://example.daily.co/room-1"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/meeting-tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok-1"})))
        .mount(server)
        .await;
}

// ============================================================================
// /connect
// ============================================================================

#[tokio::test]
async fn test_connect_creates_room_and_launches_bot() {
    let server = MockServer::start().await;
    mount_daily(&server).await;
    let app = test_app(test_config(&server.uri(), &["daily"]));

    let (status, body) = send(&app.router, post_json("/connect", json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dailyRoom"], "https://example.daily.co/room-1");
    assert_eq!(body["dailyToken"], "tok-1");
    assert_eq!(body["message"], "Room Daily créée avec succès, bot lancé");

    // Let the dispatched session run and record its arguments
    assert!(app.state.bots.shutdown(Duration::from_secs(2)).await);
    let launched = app.transports.launched.lock().unwrap();
    assert_eq!(launched.len(), 1);
    match &launched[0] {
        RunnerArguments::Daily(args) => {
            assert_eq!(args.kind, TransportKind::Daily);
            assert_eq!(args.room_url, "https://example.daily.co/room-1");
            assert_eq!(args.token, "tok-1");
        }
        other => panic!("unexpected runner arguments: {:?}", other),
    }
}

#[tokio::test]
async fn test_connect_accepts_empty_body() {
    let server = MockServer::start().await;
    mount_daily(&server).await;
    let app = test_app(test_config(&server.uri(), &["daily"]));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/connect")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dailyToken"], "tok-1");
}

#[tokio::test]
async fn test_connect_room_and_token_share_expiry() {
    let server = MockServer::start().await;
    mount_daily(&server).await;
    let app = test_app(test_config(&server.uri(), &["daily"]));

    let before = chrono::Utc::now().timestamp();
    let (status, _) = send(&app.router, post_json("/connect", json!({}))).await;
    let after = chrono::Utc::now().timestamp();
    assert_eq!(status, StatusCode::OK);

    let requests = server.received_requests().await.unwrap();
    let exp_of = |p: &str| -> i64 {
        let request = requests.iter().find(|r| r.url.path() == p).unwrap();
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        body["properties"]["exp"].as_i64().unwrap()
    };

    let room_exp = exp_of("/rooms");
    assert_eq!(room_exp, exp_of("/meeting-tokens"));
    assert!(room_exp >= before + 7200 && room_exp <= after + 7200);
}

#[tokio::test]
async fn test_connect_rejects_disabled_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let app = test_app(test_config(&server.uri(), &["daily"]));

    let (status, body) = send(
        &app.router,
        post_json("/connect", json!({"transport_type": "smallwebrtc"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Transport 'smallwebrtc' non disponible");
}

#[tokio::test]
async fn test_connect_rejects_enabled_but_unknown_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let app = test_app(test_config(&server.uri(), &["daily", "foo"]));

    let (status, body) = send(
        &app.router,
        post_json("/connect", json!({"transport_type": "foo"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Transport 'foo' non disponible");
}

#[tokio::test]
async fn test_connect_with_out_of_range_room_ttl_fails_cleanly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let mut cfg = test_config(&server.uri(), &["daily"]);
    cfg.daily.room_ttl_secs = u64::MAX / 2;
    let app = test_app(cfg);

    let (status, body) = send(&app.router, post_json("/connect", json!({}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Échec de création de la room Daily"));
}

#[tokio::test]
async fn test_connect_redirects_webrtc_to_offer() {
    let server = MockServer::start().await;
    let app = test_app(test_config(&server.uri(), &["daily", "smallwebrtc"]));

    let (status, body) = send(
        &app.router,
        post_json("/connect", json!({"transport_type": "SmallWebRTC"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Utilisez l'endpoint /offer pour SmallWebRTC");
}

#[tokio::test]
async fn test_connect_uses_first_enabled_transport_by_default() {
    let server = MockServer::start().await;
    let app = test_app(test_config(&server.uri(), &["smallwebrtc", "daily"]));

    let (status, body) = send(&app.router, post_json("/connect", json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Utilisez l'endpoint /offer pour SmallWebRTC");
}

#[tokio::test]
async fn test_connect_rejects_non_object_body() {
    let server = MockServer::start().await;
    let app = test_app(test_config(&server.uri(), &["daily"]));

    let (status, _) = send(&app.router, post_json("/connect", json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_connect_without_api_key_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let mut cfg = test_config(&server.uri(), &["daily"]);
    cfg.daily.api_key = None;
    let app = test_app(cfg);

    let (status, body) = send(&app.router, post_json("/connect", json!({}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Échec de création de la room Daily"));
    assert!(error.contains("DAILY_API_KEY"));
}

#[tokio::test]
async fn test_connect_reports_room_service_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rooms"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;
    let app = test_app(test_config(&server.uri(), &["daily"]));

    let (status, body) = send(&app.router, post_json("/connect", json!({}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Échec de création de la room Daily"));
    assert!(app.transports.launched.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_deletes_room_when_bot_cannot_start() {
    let server = MockServer::start().await;
    mount_daily(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/rooms/room-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": true})))
        .expect(1)
        .mount(&server)
        .await;
    let app = test_app(test_config(&server.uri(), &["daily"]));
    app.state.bots.shutdown(Duration::from_millis(100)).await;

    let (status, body) = send(&app.router, post_json("/connect", json!({}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Échec de lancement du bot"));
}

// ============================================================================
// /offer
// ============================================================================

#[tokio::test]
async fn test_offer_returns_answer_and_launches_bot() {
    let app = test_app(test_config("http://unused", &["daily", "smallwebrtc"]));

    let (status, body) = send(
        &app.router,
        post_json("/offer", json!({"sdp": "v=0\r\noffer", "type": "offer"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sdp"], "v=0\r\nanswer");
    assert_eq!(body["type"], "answer");
    assert_eq!(body["pc_id"], "pc-test");

    assert!(app.state.bots.shutdown(Duration::from_secs(2)).await);
    let launched = app.transports.launched.lock().unwrap();
    match launched.as_slice() {
        [RunnerArguments::WebRtc(args)] => assert_eq!(args.kind, TransportKind::SmallWebRtc),
        other => panic!("unexpected runner arguments: {:?}", other),
    }
}

#[tokio::test]
async fn test_offer_rejected_when_webrtc_disabled() {
    let app = test_app(test_config("http://unused", &["daily"]));

    let (status, body) = send(
        &app.router,
        post_json("/offer", json!({"sdp": "v=0", "type": "offer"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Le transport SmallWebRTC n'est pas activé");
    assert_eq!(app.connections.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_offer_with_missing_fields_creates_no_connection() {
    let app = test_app(test_config("http://unused", &["smallwebrtc"]));

    for body in [json!({"sdp": "v=0"}), json!({"type": "offer"}), json!({})] {
        let (status, response) = send(&app.router, post_json("/offer", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], "Offre SDP invalide");
    }

    assert_eq!(app.connections.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_offer_rejected_by_peer_connection() {
    let app = test_app_with(
        test_config("http://unused", &["smallwebrtc"]),
        FakeConnections {
            created: AtomicUsize::new(0),
            answer_sdp: "v=0".into(),
            reject_offer: true,
        },
    );

    let (status, body) = send(
        &app.router,
        post_json("/offer", json!({"sdp": "garbage", "type": "offer"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Offre SDP invalide");
}

#[tokio::test]
async fn test_offer_without_answer_fails() {
    let app = test_app_with(
        test_config("http://unused", &["smallwebrtc"]),
        FakeConnections::answering(""),
    );

    let (status, body) = send(
        &app.router,
        post_json("/offer", json!({"sdp": "v=0", "type": "offer"})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Impossible de créer une réponse WebRTC");
    assert_eq!(app.state.bots.active_sessions(), 0);
}

// ============================================================================
// Service endpoints
// ============================================================================

#[tokio::test]
async fn test_health_lists_enabled_transports() {
    let app = test_app(test_config("http://unused", &["daily", "smallwebrtc"]));

    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "azuredebug-server");
    assert_eq!(body["enabled_transports"], json!(["daily", "smallwebrtc"]));
    assert_eq!(body["active_sessions"], 0);
}

#[tokio::test]
async fn test_index_banner() {
    let app = test_app(test_config("http://unused", &["daily"]));

    let request = Request::get("/").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"message": "Azure Debug Voice AI Engine", "status": "running"})
    );
}

#[tokio::test]
async fn test_client_page_served_from_client_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("client.html"), "<html>voice client</html>").unwrap();

    let mut cfg = test_config("http://unused", &["daily"]);
    cfg.service.client_dir = dir.path().to_string_lossy().to_string();
    let app = test_app(cfg);

    let request = Request::get("/client").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"<html>voice client</html>");
}

#[tokio::test]
async fn test_client_page_missing_is_not_found() {
    let dir = tempfile::tempdir().unwrap();

    let mut cfg = test_config("http://unused", &["daily"]);
    cfg.service.client_dir = dir.path().to_string_lossy().to_string();
    let app = test_app(cfg);

    let request = Request::get("/client").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Client file not found"}));
}

// ============================================================================
// CORS
// ============================================================================

fn preflight(origin: &str) -> Request<Body> {
    Request::builder()
        .method(Method::OPTIONS)
        .uri("/connect")
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_cors_preflight_for_allowed_origin() {
    let app = test_app(test_config("http://unused", &["daily"]));

    for origin in ["http://localhost:3000", "http://192.168.1.42:8080"] {
        let response = app.router.clone().oneshot(preflight(origin)).await.unwrap();
        let headers = response.headers();

        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], origin);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST");
    }
}

#[tokio::test]
async fn test_cors_preflight_for_unknown_origin() {
    let app = test_app(test_config("http://unused", &["daily"]));

    let response = app
        .router
        .clone()
        .oneshot(preflight("https://evil.example.com"))
        .await
        .unwrap();

    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
