use std::time::Duration;

use http::Method;
use serde_json::Value;

use super::Middleware;
use crate::server::{HandlerRequest, HandlerResponse, HeaderVec};

/// CORS policy for the admin surface.
///
/// The panel frontend is served from a different origin than the API, so
/// every response carries the allow headers and preflight OPTIONS requests
/// are answered without reaching a handler.
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_headers: Vec<String>,
    allowed_methods: Vec<Method>,
}

impl CorsMiddleware {
    pub fn new(
        allowed_origins: Vec<String>,
        allowed_headers: Vec<String>,
        allowed_methods: Vec<Method>,
    ) -> Self {
        Self {
            allowed_origins,
            allowed_headers,
            allowed_methods,
        }
    }

    /// Response for a preflight OPTIONS request.
    pub fn preflight(&self) -> HandlerResponse {
        let mut resp = HandlerResponse::new(204, HeaderVec::new(), Value::Null);
        self.apply(&mut resp);
        resp
    }

    fn apply(&self, res: &mut HandlerResponse) {
        res.set_header(
            "Access-Control-Allow-Origin",
            &self.allowed_origins.join(", "),
        );
        res.set_header(
            "Access-Control-Allow-Headers",
            &self.allowed_headers.join(", "),
        );
        let methods = self
            .allowed_methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        res.set_header("Access-Control-Allow-Methods", &methods);
    }
}

/// Permissive default: all origins, the headers the panel sends, and the
/// methods the generated route tables use.
impl Default for CorsMiddleware {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".into()],
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
        }
    }
}

impl Middleware for CorsMiddleware {
    fn before(&self, req: &HandlerRequest) -> Option<HandlerResponse> {
        if req.method == Method::OPTIONS {
            Some(self.preflight())
        } else {
            None
        }
    }

    fn after(&self, _req: &HandlerRequest, res: &mut HandlerResponse, _latency: Duration) {
        self.apply(res);
    }
}
