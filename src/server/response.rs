//! Handler responses and the wire-level response writer.

use std::sync::Arc;

use may_minihttp::Response;
use serde_json::{json, Value};

use super::request::HeaderVec;
use crate::errors::PanelError;

/// Response produced by a handler function.
///
/// The body is always JSON; the admin surface has no other content types.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: Value,
}

impl HandlerResponse {
    pub fn new(status: u16, headers: HeaderVec, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self::new(status, HeaderVec::new(), body)
    }

    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    pub fn created(body: Value) -> Self {
        Self::json(201, body)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::json(400, json!({ "success": false, "message": message }))
    }

    pub fn not_found(what: &str) -> Self {
        Self::json(
            404,
            json!({ "success": false, "message": format!("{what} not found") }),
        )
    }

    /// Map a [`PanelError`] onto its HTTP status and standard error body.
    pub fn from_error(err: &PanelError) -> Self {
        Self::json(err.status(), err.to_body())
    }

    /// Set a header, replacing any existing value under the same
    /// case-insensitive name.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers
            .retain(|(k, _)| !k.as_ref().eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value.to_string()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rfind(|(k, _)| k.as_ref().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub(crate) fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

/// Write a handler response to the wire.
///
/// `may_minihttp` requires `'static` header strings, so non-static header
/// lines are leaked; handlers only set the small fixed CORS set, which keeps
/// the leak bounded per response.
pub fn write_handler_response(res: &mut Response, reply: HandlerResponse) {
    res.status_code(reply.status as usize, status_reason(reply.status));

    let mut has_content_type = false;
    for (name, value) in &reply.headers {
        if name.as_ref().eq_ignore_ascii_case("content-type") {
            has_content_type = true;
        }
        let line = format!("{name}: {value}").into_boxed_str();
        res.header(Box::leak(line));
    }
    if !has_content_type {
        res.header("Content-Type: application/json");
    }

    res.body_vec(reply.body.to_string().into_bytes());
}

/// Write a JSON error body without going through a handler.
pub fn write_json_error(res: &mut Response, status: u16, body: Value) {
    res.status_code(status as usize, status_reason(status));
    res.header("Content-Type: application/json");
    res.body_vec(body.to_string().into_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_pick_the_right_status() {
        assert_eq!(HandlerResponse::ok(json!({})).status, 200);
        assert_eq!(HandlerResponse::created(json!({})).status, 201);

        let resp = HandlerResponse::bad_request("id parameter is required");
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["message"], "id parameter is required");
        assert_eq!(resp.body["success"], false);

        let resp = HandlerResponse::not_found("Case");
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body["message"], "Case not found");
    }

    #[test]
    fn from_error_maps_status_and_kind() {
        let err = PanelError::validation("name is required");
        let resp = HandlerResponse::from_error(&err);
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["error"], "ValidationError");
        assert_eq!(resp.body["message"], "name is required");
    }

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut resp = HandlerResponse::ok(json!({}));
        resp.set_header("X-Total-Count", "5");
        resp.set_header("x-total-count", "9");
        assert_eq!(resp.headers.len(), 1);
        assert_eq!(resp.header("X-TOTAL-COUNT"), Some("9"));
    }

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(204), "No Content");
        assert_eq!(status_reason(404), "Not Found");
        assert_eq!(status_reason(501), "Not Implemented");
        assert_eq!(status_reason(299), "OK");
    }
}
