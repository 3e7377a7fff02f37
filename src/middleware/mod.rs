mod auth;
mod core;
mod cors;
mod tracing;

pub use auth::AuthMiddleware;
pub use core::Middleware;
pub use cors::CorsMiddleware;
pub use tracing::TracingMiddleware;
