pub mod admin;
pub mod http_server;
pub mod request;
pub mod response;
pub mod routes;
pub mod service;

pub use admin::{AdminServer, RouteMounter};
pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_query_params, parse_request, HandlerRequest, HeaderVec, ParsedRequest};
pub use response::{write_handler_response, write_json_error, HandlerResponse};
pub use routes::{Handler, Route, RouteTable};
pub use service::{health_endpoint, AdminService};
