//! HTTP server: mutation API routes, auth, and the live-stream attach.

pub mod auth;
pub mod error;
pub mod routes;
pub mod ws;

pub use auth::JwtVerifier;
pub use error::{ApiError, ApiResult};
pub use routes::{router, AppState, AuthUser};
