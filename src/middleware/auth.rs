use serde_json::json;

use super::Middleware;
use crate::server::{HandlerRequest, HandlerResponse};

/// Bearer-token gate for non-public routes.
///
/// When no token is configured the gate is open (local development); setting
/// one requires `Authorization: Bearer <token>` on every route not marked
/// public.
pub struct AuthMiddleware {
    token: Option<String>,
}

impl AuthMiddleware {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

fn unauthorized(message: &str) -> HandlerResponse {
    HandlerResponse::json(401, json!({ "success": false, "message": message }))
}

impl Middleware for AuthMiddleware {
    fn before(&self, req: &HandlerRequest) -> Option<HandlerResponse> {
        let expected = self.token.as_deref()?;
        if req.public {
            return None;
        }
        // A header without the Bearer scheme counts as no token at all.
        let presented = req
            .header("authorization")
            .and_then(|h| h.strip_prefix("Bearer "));
        match presented {
            None => Some(unauthorized("Not authorized, no token provided")),
            Some(token) if token == expected => None,
            Some(_) => Some(unauthorized("Not authorized, token failed")),
        }
    }
}
