//! Route declarations for handler modules.

use http::Method;

use super::request::HandlerRequest;
use super::response::HandlerResponse;
use crate::resources::ResourceContext;

/// A request handler: a plain function over the shared resource context.
///
/// Handlers are `fn` pointers rather than boxed closures so generated
/// modules stay declarative and identical in shape to the built-in ones.
pub type Handler = fn(&ResourceContext, &HandlerRequest) -> HandlerResponse;

/// One route in a handler module's table: a method, a path pattern relative
/// to the mount prefix, and the function that serves it.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub handler: Handler,
    pub public: bool,
}

impl Route {
    fn new(method: Method, path: &str, handler: Handler) -> Self {
        Self {
            method,
            path: path.to_string(),
            handler,
            public: false,
        }
    }

    pub fn get(path: &str, handler: Handler) -> Self {
        Self::new(Method::GET, path, handler)
    }

    pub fn post(path: &str, handler: Handler) -> Self {
        Self::new(Method::POST, path, handler)
    }

    pub fn put(path: &str, handler: Handler) -> Self {
        Self::new(Method::PUT, path, handler)
    }

    pub fn delete(path: &str, handler: Handler) -> Self {
        Self::new(Method::DELETE, path, handler)
    }

    /// Mark the route public: it skips the admin bearer-token check.
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }
}

/// The ordered set of routes a handler module mounts under one prefix.
#[derive(Debug, Clone)]
pub struct RouteTable {
    pub routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }
}
