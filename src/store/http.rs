//! Data-API backed document store.
//!
//! Forwards each command document as a JSON POST to a single endpoint and
//! interprets the reply the same way a driver would: transport failures and
//! non-success statuses are store errors, and a well-formed reply with
//! `"ok": 0` carries the server's `errmsg`.

use std::time::Duration;

use serde_json::Value;

use crate::errors::{PanelError, PanelResult};
use crate::store::DocumentStore;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub struct HttpStore {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpStore {
    pub fn new(endpoint: &str) -> PanelResult<Self> {
        let parsed = url::Url::parse(endpoint)
            .map_err(|err| PanelError::Store(format!("invalid database url {endpoint:?}: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PanelError::Store(format!(
                "database url {endpoint:?} must use http or https"
            )));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .build()
            .map_err(|err| PanelError::Store(format!("http client init failed: {err}")))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

impl DocumentStore for HttpStore {
    fn run_command(&self, command: Value) -> PanelResult<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&command)
            .send()
            .map_err(|err| PanelError::Store(format!("command request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PanelError::Store(format!(
                "command endpoint returned {status}"
            )));
        }

        let reply: Value = response
            .json()
            .map_err(|err| PanelError::Store(format!("command reply was not json: {err}")))?;

        if reply.get("ok").and_then(Value::as_f64) == Some(0.0) {
            let errmsg = reply
                .get("errmsg")
                .and_then(Value::as_str)
                .unwrap_or("command failed");
            return Err(PanelError::Store(errmsg.to_string()));
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Read;
    use std::thread;

    /// Serve `replies` in order on an ephemeral port, capturing each request
    /// body, then shut down.
    fn spawn_endpoint(replies: Vec<String>) -> (String, thread::JoinHandle<Vec<Value>>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for reply in replies {
                let mut request = server.recv().unwrap();
                let mut body = String::new();
                request.as_reader().read_to_string(&mut body).unwrap();
                seen.push(serde_json::from_str(&body).unwrap());
                let response = tiny_http::Response::from_string(reply).with_header(
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .unwrap(),
                );
                request.respond(response).unwrap();
            }
            seen
        });
        (format!("http://{addr}/command"), handle)
    }

    #[test]
    fn posts_the_command_and_returns_the_reply() {
        let (endpoint, handle) = spawn_endpoint(vec![
            json!({ "cursor": { "firstBatch": [{ "title": "a" }] }, "ok": 1 }).to_string(),
        ]);
        let store = HttpStore::new(&endpoint).unwrap();

        let reply = store
            .run_command(json!({ "find": "cases", "filter": {} }))
            .unwrap();
        assert_eq!(reply["cursor"]["firstBatch"][0]["title"], "a");

        let seen = handle.join().unwrap();
        assert_eq!(seen[0]["find"], "cases");
    }

    #[test]
    fn ok_zero_reply_surfaces_the_errmsg() {
        let (endpoint, handle) =
            spawn_endpoint(vec![json!({ "ok": 0, "errmsg": "ns not found: ghosts" }).to_string()]);
        let store = HttpStore::new(&endpoint).unwrap();

        let err = store.run_command(json!({ "drop": "ghosts" })).unwrap_err();
        assert!(err.to_string().contains("ns not found"));
        handle.join().unwrap();
    }

    #[test]
    fn rejects_non_http_endpoints() {
        assert!(HttpStore::new("mongodb://localhost/db").is_err());
    }
}
