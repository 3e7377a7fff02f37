//! Regex route table for the admin HTTP surface.
//!
//! Routes are registered per mount prefix (one prefix per resource) so a
//! regenerated resource can atomically replace its old routes at runtime.

use std::sync::Arc;

use http::Method;
use regex::Regex;
use smallvec::SmallVec;
use tracing::debug;

/// Parameter storage with inline capacity for the common case.
///
/// Admin routes carry at most a handful of parameters (`{id}`, `{slug}`,
/// pagination), so eight inline slots avoid heap allocation on the hot path.
pub type ParamVec = SmallVec<[(Arc<str>, String); 8]>;

/// Metadata for one mounted route.
#[derive(Debug, Clone)]
pub struct RouteMeta {
    pub method: Method,
    /// Full request pattern including the mount prefix, e.g. `/api/cases/{id}`.
    pub path_pattern: String,
    /// Mount prefix this route was registered under, e.g. `/api/cases`.
    pub mount: String,
    /// Dispatcher key, unique per (method, pattern).
    pub handler_name: String,
    /// Public routes skip the bearer-token check.
    pub public: bool,
}

/// Result of a successful route lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<RouteMeta>,
    pub handler_name: String,
    pub path_params: ParamVec,
    pub query_params: ParamVec,
}

impl RouteMatch {
    /// Look up a path parameter by name. Last write wins when a name repeats.
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a query parameter by name. Last write wins when a name repeats.
    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Linear-scan regex router.
///
/// The table is small (a few routes per resource) and rebuilt rarely, so a
/// compiled-regex scan in registration order is both simple and predictable.
pub struct Router {
    routes: Vec<(Method, Regex, Arc<RouteMeta>, Vec<String>)>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a route. Callers replace a prefix wholesale via [`Router::unmount`]
    /// before re-mounting, so duplicates are not checked here.
    pub fn mount(&mut self, meta: RouteMeta) {
        let (regex, param_names) = Self::path_to_regex(&meta.path_pattern);
        debug!(
            method = %meta.method,
            pattern = %meta.path_pattern,
            handler = %meta.handler_name,
            "route mounted"
        );
        self.routes
            .push((meta.method.clone(), regex, Arc::new(meta), param_names));
    }

    /// Remove every route registered under `prefix` and return the handler
    /// names that were attached to them, so the dispatcher can drop the
    /// matching handler channels.
    pub fn unmount(&mut self, prefix: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.routes.retain(|(_, _, meta, _)| {
            if meta.mount == prefix {
                removed.push(meta.handler_name.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Match a request against the table in registration order.
    ///
    /// Captured path parameters are percent-decoded; a capture that is not
    /// valid UTF-8 after decoding is kept verbatim.
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        for (route_method, regex, meta, param_names) in &self.routes {
            if route_method != method {
                continue;
            }
            let Some(caps) = regex.captures(path) else {
                continue;
            };
            let mut path_params = ParamVec::new();
            for (index, name) in param_names.iter().enumerate() {
                if let Some(value) = caps.get(index + 1) {
                    let decoded = urlencoding::decode(value.as_str())
                        .map(|cow| cow.into_owned())
                        .unwrap_or_else(|_| value.as_str().to_string());
                    path_params.push((Arc::from(name.as_str()), decoded));
                }
            }
            return Some(RouteMatch {
                route: meta.clone(),
                handler_name: meta.handler_name.clone(),
                path_params,
                query_params: ParamVec::new(),
            });
        }
        None
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Compile a `{param}`-style pattern into an anchored regex plus the
    /// parameter names in capture order.
    pub(crate) fn path_to_regex(path: &str) -> (Regex, Vec<String>) {
        if path == "/" {
            return (
                Regex::new(r"^/$").expect("Failed to compile path regex"),
                Vec::new(),
            );
        }

        let mut pattern = String::from("^");
        let mut param_names = Vec::new();

        for segment in path.split('/') {
            if segment.starts_with('{') && segment.ends_with('}') {
                let name = segment
                    .trim_start_matches('{')
                    .trim_end_matches('}')
                    .to_string();
                pattern.push_str("/([^/]+)");
                param_names.push(name);
            } else if !segment.is_empty() {
                pattern.push('/');
                pattern.push_str(&regex::escape(segment));
            }
        }

        pattern.push('$');
        let regex = Regex::new(&pattern).expect("Failed to compile path regex");
        (regex, param_names)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
