//! Request parsing and the handler-facing request type.

use std::io::Read;
use std::sync::Arc;

use http::Method;
use may::sync::mpsc;
use may_minihttp::Request;
use serde_json::Value;
use smallvec::SmallVec;
use tracing::debug;

use super::response::HandlerResponse;
use crate::ids::RequestId;
use crate::router::ParamVec;

/// Header storage with inline capacity. Admin requests rarely carry more
/// than a dozen headers, so sixteen inline slots keep parsing allocation-free.
pub type HeaderVec = SmallVec<[(Arc<str>, String); 16]>;

/// Everything extracted from the raw HTTP request before routing.
#[derive(Debug)]
pub struct ParsedRequest {
    pub method: Method,
    /// Request path with the query string stripped.
    pub path: String,
    /// Headers with lowercased names, in wire order.
    pub headers: HeaderVec,
    pub query_params: ParamVec,
    /// Parsed JSON body, if the request carried one that parsed.
    pub body: Option<Value>,
}

/// Parse query string parameters from a URL path.
///
/// Extracts everything after the `?` and percent-decodes names and values.
pub fn parse_query_params(path: &str) -> ParamVec {
    match path.find('?') {
        Some(pos) => url::form_urlencoded::parse(path[pos + 1..].as_bytes())
            .map(|(k, v)| (Arc::from(k.as_ref()), v.to_string()))
            .collect(),
        None => ParamVec::new(),
    }
}

/// Extract method, path, headers, query parameters and JSON body from a raw
/// `may_minihttp` request. The body reader is consumed last.
pub fn parse_request(req: Request) -> ParsedRequest {
    let method = Method::from_bytes(req.method().as_bytes()).unwrap_or(Method::GET);
    let raw_path = req.path().to_string();
    let path = raw_path.split('?').next().unwrap_or("/").to_string();

    let mut headers = HeaderVec::new();
    for h in req.headers().iter() {
        headers.push((
            Arc::from(h.name.to_ascii_lowercase().as_str()),
            String::from_utf8_lossy(h.value).to_string(),
        ));
    }

    let query_params = parse_query_params(&raw_path);

    let body = {
        let mut body_str = String::new();
        if let Ok(size) = req.body().read_to_string(&mut body_str) {
            if size > 0 {
                serde_json::from_str(&body_str).ok()
            } else {
                None
            }
        } else {
            None
        }
    };

    debug!(
        method = %method,
        path = %path,
        header_count = headers.len(),
        has_body = body.is_some(),
        "HTTP request parsed"
    );

    ParsedRequest {
        method,
        path,
        headers,
        query_params,
        body,
    }
}

/// The request a handler function receives.
///
/// Carries the matched route's parameters plus the reply channel the handler
/// coroutine uses to send its response back to the dispatcher.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub request_id: RequestId,
    pub method: Method,
    /// The matched route pattern, e.g. `/api/cases/{id}`.
    pub path: String,
    pub handler_name: String,
    /// True when the matched route skips the bearer-token check.
    pub public: bool,
    pub path_params: ParamVec,
    pub query_params: ParamVec,
    /// Headers with lowercased names.
    pub headers: HeaderVec,
    pub body: Option<Value>,
    pub reply_tx: mpsc::Sender<HandlerResponse>,
}

impl HandlerRequest {
    /// Path parameter by name. Last write wins when a name repeats.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Query parameter by name. Last write wins when a name repeats.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Query parameter parsed as `usize`, falling back to `default` when the
    /// parameter is absent or unparseable.
    pub fn query_usize(&self, name: &str, default: usize) -> usize {
        self.query_param(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rfind(|(k, _)| k.as_ref().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The JSON body, or `Value::Null` when the request had none.
    pub fn body_json(&self) -> Value {
        self.body.clone().unwrap_or(Value::Null)
    }

    /// An array-valued body field, or `None` when the field is absent or not
    /// an array.
    pub fn body_array(&self, key: &str) -> Option<Vec<Value>> {
        self.body.as_ref()?.get(key)?.as_array().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_with(query: &[(&str, &str)], body: Option<Value>) -> HandlerRequest {
        let (reply_tx, _reply_rx) = mpsc::channel();
        let mut query_params = ParamVec::new();
        for (k, v) in query {
            query_params.push((Arc::from(*k), (*v).to_string()));
        }
        HandlerRequest {
            request_id: RequestId::new(),
            method: Method::GET,
            path: "/api/cases".to_string(),
            handler_name: "GET /api/cases".to_string(),
            public: false,
            path_params: ParamVec::new(),
            query_params,
            headers: HeaderVec::new(),
            body,
            reply_tx,
        }
    }

    #[test]
    fn parses_query_strings_with_percent_encoding() {
        let params = parse_query_params("/api/cases?page=2&search=hello%20world");
        assert_eq!(params[0], (Arc::from("page"), "2".to_string()));
        assert_eq!(params[1], (Arc::from("search"), "hello world".to_string()));
        assert!(parse_query_params("/api/cases").is_empty());
    }

    #[test]
    fn query_usize_falls_back_on_garbage() {
        let req = request_with(&[("page", "3"), ("limit", "abc")], None);
        assert_eq!(req.query_usize("page", 1), 3);
        assert_eq!(req.query_usize("limit", 10), 10);
        assert_eq!(req.query_usize("missing", 7), 7);
    }

    #[test]
    fn body_accessors_tolerate_missing_bodies() {
        let req = request_with(&[], None);
        assert_eq!(req.body_json(), Value::Null);
        assert!(req.body_array("fields").is_none());

        let req = request_with(&[], Some(json!({ "fields": [{ "name": "title" }] })));
        assert_eq!(req.body_array("fields").unwrap().len(), 1);
        assert!(req.body_array("name").is_none());
    }
}
