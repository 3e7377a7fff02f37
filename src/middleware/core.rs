use std::time::Duration;

use crate::server::{HandlerRequest, HandlerResponse};

/// Hooks around handler execution.
///
/// `before` may short-circuit with an early response, in which case the
/// handler never runs but `after` still sees the response.
pub trait Middleware: Send + Sync {
    fn before(&self, _req: &HandlerRequest) -> Option<HandlerResponse> {
        None
    }
    fn after(&self, _req: &HandlerRequest, _res: &mut HandlerResponse, _latency: Duration) {}
}
