//! # Document Store Protocol
//!
//! One seam to the database: [`DocumentStore::run_command`] carries
//! Mongo-style command documents (`find`, `count`, `insert`, `update`,
//! `delete`, `listCollections`, `drop`) with EJSON atoms for ids
//! (`{"$oid": …}`) and dates (`{"$date": …}`).
//!
//! Two implementations:
//! - [`MemoryStore`] - an in-process interpreter for development and tests
//! - [`HttpStore`] - POSTs each command to a data-API endpoint
//!
//! The store is constructed once from the database URL and injected as
//! `Arc<dyn DocumentStore>` into every component that needs it.

mod http;
mod memory;

pub use http::HttpStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::errors::{PanelError, PanelResult};

pub trait DocumentStore: Send + Sync {
    /// Execute one command document and return the raw reply.
    fn run_command(&self, command: Value) -> PanelResult<Value>;
}

/// Select a store implementation from the database URL scheme: `http(s)`
/// URLs talk to a data API, `mem:` keeps documents in process. Anything else
/// is refused rather than silently served from memory.
pub fn store_from_url(url: &str) -> PanelResult<Arc<dyn DocumentStore>> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(Arc::new(HttpStore::new(url)?))
    } else if url == "mem:" || url.starts_with("mem://") || url.starts_with("memory:") {
        Ok(Arc::new(MemoryStore::new()))
    } else {
        Err(PanelError::Store(format!(
            "unsupported database url {url:?}: expected http(s):// or mem:"
        )))
    }
}

/// Drop a collection, treating "ns not found" as already dropped.
pub fn drop_collection_if_exists(store: &dyn DocumentStore, name: &str) -> PanelResult<()> {
    match store.run_command(json!({ "drop": name })) {
        Ok(_) => Ok(()),
        Err(err) if err.message().to_lowercase().contains("ns not found") => Ok(()),
        Err(err) => Err(err),
    }
}

/// EJSON date atom for a timestamp.
pub fn ejson_date(ts: DateTime<Utc>) -> Value {
    json!({ "$date": ts.to_rfc3339_opts(SecondsFormat::Millis, true) })
}

/// Current server time as an EJSON date atom.
pub fn ejson_now() -> Value {
    ejson_date(Utc::now())
}

/// Parse an EJSON date atom (or a bare RFC 3339 string) back into a
/// timestamp.
pub fn parse_ejson_date(value: &Value) -> Option<DateTime<Utc>> {
    let raw = match value {
        Value::Object(map) => map.get("$date")?.as_str()?,
        Value::String(s) => s.as_str(),
        _ => return None,
    };
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_scheme_selects_the_implementation() {
        assert!(store_from_url("mem:").is_ok());
        assert!(store_from_url("http://127.0.0.1:3999/cmd").is_ok());
        assert!(store_from_url("mongodb://localhost/db").is_err());
    }

    #[test]
    fn date_atoms_round_trip() {
        let now = Utc::now();
        let atom = ejson_date(now);
        let parsed = parse_ejson_date(&atom).unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn drop_tolerates_missing_collections() {
        let store = MemoryStore::new();
        assert!(drop_collection_if_exists(&store, "ghosts").is_ok());
        store
            .run_command(json!({ "insert": "ghosts", "documents": [{ "a": 1 }] }))
            .unwrap();
        drop_collection_if_exists(&store, "ghosts").unwrap();
        let reply = store.run_command(json!({ "listCollections": 1 })).unwrap();
        assert_eq!(reply["cursor"]["firstBatch"], json!([]));
    }
}
