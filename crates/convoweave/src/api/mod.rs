//! HTTP API module.
//!
//! Provides the REST surface and the WebSocket upgrade endpoint. Handlers
//! are thin adapters over the session controller and registry.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::{AppState, ServerState};
