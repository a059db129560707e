//! HTTP API for session provisioning
//!
//! - POST /connect - Create a Daily room + token and launch a bot
//! - POST /offer - Answer a WebRTC offer and launch a bot on the peer connection
//! - GET /health - Health check with enabled transports
//! - GET / - Service banner
//! - GET /client - Static browser client

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ErrorResponse};
pub use handlers::{ConnectResponse, HealthResponse, OfferRequest};
pub use routes::{create_router, is_allowed_origin};
pub use state::AppState;
