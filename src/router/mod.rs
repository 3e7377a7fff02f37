//! # Router Module
//!
//! Path matching and route resolution for the admin HTTP surface. Incoming
//! request paths are tested against compiled regex patterns, one per mounted
//! route, and the first match yields the dispatcher handler name plus the
//! extracted path parameters.
//!
//! Route tables change at runtime: generating a resource mounts a fresh
//! prefix (`/api/<route>` and `/api/<route>-structure`), and regenerating or
//! resetting unmounts it again. The router therefore keeps its table as a
//! plain vector guarded by the server's `RwLock` rather than a precompiled
//! static structure.
//!
//! ## Example
//!
//! ```rust,ignore
//! use panelforge::router::{RouteMeta, Router};
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.mount(RouteMeta {
//!     method: Method::GET,
//!     path_pattern: "/api/cases/{id}".to_string(),
//!     mount: "/api/cases".to_string(),
//!     handler_name: "GET /api/cases/{id}".to_string(),
//!     public: false,
//! });
//!
//! if let Some(route_match) = router.route(&Method::GET, "/api/cases/123") {
//!     println!("Handler: {}", route_match.handler_name);
//!     println!("id = {:?}", route_match.get_path_param("id"));
//! }
//! ```

mod core;

pub use core::{ParamVec, RouteMatch, RouteMeta, Router};
