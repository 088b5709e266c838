//! HTTP API: routing, middleware, envelopes and server lifecycle

pub mod middleware;
pub mod response;
mod router;
mod server;

pub use response::{ApiError, ApiResponse, Meta};
pub use router::{AppState, DocumentCache, EntityKind, create_router};
pub use server::{Server, shutdown_signal};
