//! Coroutine-based handler dispatch.
//!
//! Every registered handler runs in its own `may` coroutine and receives
//! requests over an MPSC channel. The reply travels back over a per-request
//! channel carried inside the request itself. Handler panics are caught in
//! the coroutine and converted into 500 responses, so one broken resource
//! cannot take the server down.
//!
//! The handler map and middleware chain take their own short locks, and no
//! lock is held while a reply is awaited. A handler can therefore register
//! or remove other handlers mid-request, which is how freshly generated
//! resources go live without a restart.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use may::coroutine;
use may::sync::mpsc;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::ids::RequestId;
use crate::middleware::Middleware;
use crate::resources::ResourceContext;
use crate::router::RouteMatch;
use crate::runtime_config::RuntimeConfig;
use crate::server::{Handler, HandlerRequest, HandlerResponse, HeaderVec};

/// Sending side of a handler coroutine's request channel.
pub type HandlerSender = mpsc::Sender<HandlerRequest>;

/// Routes matched requests to handler coroutines and runs the middleware
/// chain around them.
pub struct Dispatcher {
    handlers: RwLock<HashMap<String, HandlerSender>>,
    middlewares: RwLock<Vec<Arc<dyn Middleware>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Dispatcher {
            handlers: RwLock::new(HashMap::new()),
            middlewares: RwLock::new(Vec::new()),
        }
    }

    /// Append a middleware. Middleware runs in registration order: `before`
    /// front to back ahead of the handler, `after` front to back on the
    /// response.
    pub fn add_middleware(&self, mw: Arc<dyn Middleware>) {
        self.middlewares.write().unwrap().push(mw);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().unwrap().len()
    }

    /// Spawn a coroutine for `handler` and register it under `name`.
    ///
    /// Re-registering a name replaces the old sender. Dropping the old sender
    /// closes its channel, so the previous coroutine drains pending requests
    /// and exits.
    ///
    /// # Safety
    ///
    /// Calls `may::coroutine::Builder::spawn`, which is unsafe in the `may`
    /// runtime. The handler is a plain `fn` pointer and the context is moved
    /// into the coroutine, so no borrowed state can outlive the caller.
    pub unsafe fn register_handler(&self, name: &str, handler: Handler, ctx: Arc<ResourceContext>) {
        let (tx, rx) = mpsc::channel::<HandlerRequest>();
        let stack_size = RuntimeConfig::from_env().stack_size;
        let coroutine_name = name.to_string();

        let spawn_result = unsafe {
            coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || {
                    debug!(
                        handler_name = %coroutine_name,
                        stack_size,
                        "handler coroutine started"
                    );

                    for req in rx.iter() {
                        let reply_tx = req.reply_tx.clone();
                        let outcome = catch_unwind(AssertUnwindSafe(|| handler(&ctx, &req)));
                        let response = match outcome {
                            Ok(response) => response,
                            Err(panic) => {
                                let panic_message = panic_text(panic.as_ref());
                                error!(
                                    request_id = %req.request_id,
                                    handler_name = %req.handler_name,
                                    %panic_message,
                                    "handler panicked"
                                );
                                HandlerResponse::json(
                                    500,
                                    json!({
                                        "success": false,
                                        "message": format!("Handler panicked: {panic_message}"),
                                    }),
                                )
                            }
                        };
                        let _ = reply_tx.send(response);
                    }

                    debug!(handler_name = %coroutine_name, "handler coroutine exited");
                })
        };

        match spawn_result {
            Ok(_) => {
                let replaced = self.handlers.write().unwrap().insert(name.to_string(), tx);
                if replaced.is_some() {
                    warn!(
                        handler_name = %name,
                        "replaced existing handler - old coroutine will exit"
                    );
                }
            }
            Err(err) => {
                // Leave the route unregistered; dispatch will answer 500.
                error!(
                    handler_name = %name,
                    error = %err,
                    stack_size,
                    "failed to spawn handler coroutine"
                );
            }
        }
    }

    /// Drop the senders for `names`. Each affected coroutine exits once its
    /// channel drains.
    pub fn deregister(&self, names: &[String]) {
        let mut handlers = self.handlers.write().unwrap();
        for name in names {
            if handlers.remove(name).is_some() {
                debug!(handler_name = %name, "handler deregistered");
            }
        }
    }

    /// Dispatch a matched request to its handler coroutine.
    ///
    /// Returns `None` when no handler is registered under the matched name;
    /// the service turns that into a 500. A registered handler whose channel
    /// has closed produces a 503 instead of hanging the connection.
    #[must_use]
    pub fn dispatch(
        &self,
        route_match: RouteMatch,
        body: Option<Value>,
        headers: HeaderVec,
    ) -> Option<HandlerResponse> {
        let (reply_tx, reply_rx) = mpsc::channel();

        let tx = {
            let handlers = self.handlers.read().unwrap();
            match handlers.get(&route_match.handler_name) {
                Some(tx) => tx.clone(),
                None => {
                    error!(
                        handler_name = %route_match.handler_name,
                        registered = handlers.len(),
                        "no handler registered for matched route"
                    );
                    return None;
                }
            }
        };
        let middlewares: Vec<Arc<dyn Middleware>> = self.middlewares.read().unwrap().clone();

        let request_id = RequestId::from_header_or_new(
            headers
                .iter()
                .rfind(|(k, _)| k.as_ref().eq_ignore_ascii_case("x-request-id"))
                .map(|(_, v)| v.as_str()),
        );

        let request = HandlerRequest {
            request_id,
            method: route_match.route.method.clone(),
            path: route_match.route.path_pattern.clone(),
            handler_name: route_match.handler_name,
            public: route_match.route.public,
            path_params: route_match.path_params,
            query_params: route_match.query_params,
            headers,
            body,
            reply_tx,
        };

        let mut early_resp: Option<HandlerResponse> = None;
        for mw in &middlewares {
            if early_resp.is_none() {
                early_resp = mw.before(&request);
            } else {
                mw.before(&request);
            }
        }

        let (mut resp, latency) = if let Some(r) = early_resp {
            (r, Duration::from_millis(0))
        } else {
            debug!(
                request_id = %request.request_id,
                handler_name = %request.handler_name,
                method = %request.method,
                path = %request.path,
                "request dispatched to handler"
            );

            let start = Instant::now();
            if let Err(err) = tx.send(request.clone()) {
                error!(
                    request_id = %request.request_id,
                    handler_name = %request.handler_name,
                    error = %err,
                    "failed to send request to handler"
                );
                return None;
            }

            match reply_rx.recv() {
                Ok(response) => {
                    let elapsed = start.elapsed();
                    info!(
                        request_id = %request.request_id,
                        handler_name = %request.handler_name,
                        latency_ms = elapsed.as_millis() as u64,
                        status = response.status,
                        "handler response received"
                    );
                    (response, elapsed)
                }
                Err(err) => {
                    error!(
                        request_id = %request.request_id,
                        handler_name = %request.handler_name,
                        error = %err,
                        "handler channel closed without a reply"
                    );
                    return Some(HandlerResponse::json(
                        503,
                        json!({
                            "success": false,
                            "message": format!(
                                "Handler '{}' is not responding - possible crash or resource exhaustion",
                                request.handler_name
                            ),
                        }),
                    ));
                }
            }
        };

        for mw in &middlewares {
            mw.after(&request, &mut resp, latency);
        }

        Some(resp)
    }
}

fn panic_text(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
