//! The HTTP service: parse, route, dispatch, write.

use std::io;
use std::sync::{Arc, RwLock};

use http::Method;
use may_minihttp::{HttpService, Request, Response};
use serde_json::json;

use super::request::{parse_request, ParsedRequest};
use super::response::{write_handler_response, write_json_error, HandlerResponse};
use crate::dispatcher::Dispatcher;
use crate::errors::PanelError;
use crate::middleware::CorsMiddleware;
use crate::router::Router;

/// Per-connection service driving the admin surface.
///
/// The router sits behind an `RwLock` shared with the
/// [`AdminServer`](super::AdminServer): request handling takes a read lock,
/// while resource generation takes the write lock to swap route tables in
/// place. The dispatcher locks internally and is shared as a plain `Arc`.
#[derive(Clone)]
pub struct AdminService {
    pub router: Arc<RwLock<Router>>,
    pub dispatcher: Arc<Dispatcher>,
    pub cors: Arc<CorsMiddleware>,
}

impl AdminService {
    pub fn new(
        router: Arc<RwLock<Router>>,
        dispatcher: Arc<Dispatcher>,
        cors: Arc<CorsMiddleware>,
    ) -> Self {
        Self {
            router,
            dispatcher,
            cors,
        }
    }
}

/// Basic health check endpoint returning `{ "status": "ok" }`.
pub fn health_endpoint(res: &mut Response) -> io::Result<()> {
    write_handler_response(res, HandlerResponse::ok(json!({ "status": "ok" })));
    Ok(())
}

impl HttpService for AdminService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let ParsedRequest {
            method,
            path,
            headers,
            query_params,
            body,
        } = parse_request(req);

        if method == Method::GET && path == "/health" {
            return health_endpoint(res);
        }

        // Browser preflights never match a mounted route; answer them here.
        if method == Method::OPTIONS {
            write_handler_response(res, self.cors.preflight());
            return Ok(());
        }

        let route_match = {
            let router = self.router.read().unwrap();
            router.route(&method, &path)
        };

        let Some(mut route_match) = route_match else {
            let err = PanelError::not_found(format!("{method} {path}"));
            write_json_error(res, err.status(), err.to_body());
            return Ok(());
        };
        route_match.query_params = query_params;

        match self.dispatcher.dispatch(route_match, body, headers) {
            Some(reply) => write_handler_response(res, reply),
            None => write_json_error(
                res,
                500,
                json!({
                    "success": false,
                    "message": "Handler failed or not registered",
                    "method": method.as_str(),
                    "path": path,
                }),
            ),
        }
        Ok(())
    }
}
