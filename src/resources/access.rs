//! Per-request document access.
//!
//! Every handler resolves an [`AccessStrategy`] for its model before touching
//! the store. The strategy runs the same command protocol either way; what
//! differs is timestamp handling and presentation:
//!
//! - **Typed** (model covered by the client ledger): writes stamp
//!   `created_at`/`updated_at` themselves, reads present the camelCase
//!   `createdAt`/`updatedAt` keys with ISO date strings
//! - **Raw** (model not yet covered): a timestamp-repair pass runs before
//!   every read, and documents are presented as stored, snake_case keys and
//!   EJSON date atoms included
//!
//! Both paths remap `_id.$oid` to a plain `id` string.

use std::sync::Arc;

use chrono::SecondsFormat;
use serde_json::{json, Map, Value};

use crate::errors::{PanelError, PanelResult};
use crate::ids::mint_document_id;
use crate::store::{ejson_now, parse_ejson_date, DocumentStore};

/// How documents of one model are read and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPath {
    Typed,
    Raw,
}

pub struct AccessStrategy {
    store: Arc<dyn DocumentStore>,
    collection: String,
    path: AccessPath,
}

impl AccessStrategy {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str, path: AccessPath) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            path,
        }
    }

    #[must_use]
    pub fn path(&self) -> AccessPath {
        self.path
    }

    /// Page of documents newest-first plus the total count.
    pub fn find_many(&self, skip: usize, take: usize) -> PanelResult<(Vec<Value>, usize)> {
        self.ensure_timestamps()?;
        let reply = self.store.run_command(json!({
            "find": &self.collection,
            "filter": {},
            "sort": { "created_at": -1 },
            "skip": skip,
            "limit": take,
        }))?;
        let docs = self.present_batch(&reply);
        let count = self
            .store
            .run_command(json!({ "count": &self.collection, "query": {} }))?;
        let total = count.get("n").and_then(Value::as_u64).unwrap_or(0) as usize;
        Ok((docs, total))
    }

    /// Every document, newest-first.
    pub fn find_all(&self) -> PanelResult<Vec<Value>> {
        self.ensure_timestamps()?;
        let reply = self.store.run_command(json!({
            "find": &self.collection,
            "filter": {},
            "sort": { "created_at": -1 },
        }))?;
        Ok(self.present_batch(&reply))
    }

    pub fn find_one(&self, id: &str) -> PanelResult<Option<Value>> {
        self.ensure_timestamps()?;
        let reply = self.store.run_command(json!({
            "find": &self.collection,
            "filter": id_filter(id),
            "limit": 1,
        }))?;
        Ok(self.present_first(&reply))
    }

    pub fn find_first(&self) -> PanelResult<Option<Value>> {
        self.ensure_timestamps()?;
        let reply = self.store.run_command(json!({
            "find": &self.collection,
            "filter": {},
            "limit": 1,
        }))?;
        Ok(self.present_first(&reply))
    }

    /// Insert a sanitized document and return it as stored.
    pub fn insert(&self, payload: Value) -> PanelResult<Value> {
        let data = sanitize_create_data(payload);
        match self.path {
            AccessPath::Typed => {
                let mut doc = data;
                if let Value::Object(map) = &mut doc {
                    let now = ejson_now();
                    map.insert("_id".to_string(), json!({ "$oid": mint_document_id() }));
                    map.insert("created_at".to_string(), now.clone());
                    map.insert("updated_at".to_string(), now);
                }
                self.store.run_command(json!({
                    "insert": &self.collection,
                    "documents": [doc],
                }))?;
                let reply = self.store.run_command(json!({
                    "find": &self.collection,
                    "filter": {},
                    "sort": { "created_at": -1 },
                    "limit": 1,
                }))?;
                self.present_first(&reply)
                    .ok_or_else(|| PanelError::Store("insert did not persist a document".into()))
            }
            AccessPath::Raw => {
                self.store.run_command(json!({
                    "insert": &self.collection,
                    "documents": [data],
                }))?;
                self.ensure_timestamps()?;
                let reply = self.store.run_command(json!({
                    "find": &self.collection,
                    "filter": {},
                    "sort": { "created_at": -1 },
                    "limit": 1,
                }))?;
                self.present_first(&reply)
                    .ok_or_else(|| PanelError::Store("insert did not persist a document".into()))
            }
        }
    }

    /// Apply a sanitized patch to one document. `None` when the id missed.
    pub fn update(&self, id: &str, payload: Value) -> PanelResult<Option<Value>> {
        let mut set = match sanitize_create_data(payload) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        set.insert(
            "created_at".to_string(),
            json!({ "$ifNull": ["$created_at", "$$NOW"] }),
        );
        set.insert("updated_at".to_string(), json!("$$NOW"));

        let reply = self.store.run_command(json!({
            "update": &self.collection,
            "updates": [{
                "q": id_filter(id),
                "u": [{ "$set": set }],
                "multi": false,
            }],
        }))?;
        if reply.get("n").and_then(Value::as_u64).unwrap_or(0) == 0 {
            return Ok(None);
        }
        self.find_one(id)
    }

    /// Delete one document by id. `false` when the id missed.
    pub fn delete(&self, id: &str) -> PanelResult<bool> {
        let reply = self.store.run_command(json!({
            "delete": &self.collection,
            "deletes": [{ "q": id_filter(id), "limit": 1 }],
        }))?;
        Ok(reply.get("n").and_then(Value::as_u64).unwrap_or(0) > 0)
    }

    /// Replace the whole collection with sanitized copies of `items` and
    /// return the resulting documents newest-first.
    pub fn replace_all(&self, items: Vec<Value>) -> PanelResult<Vec<Value>> {
        self.store.run_command(json!({
            "delete": &self.collection,
            "deletes": [{ "q": {}, "limit": 0 }],
        }))?;

        let docs: Vec<Value> = items
            .into_iter()
            .map(|item| {
                let mut doc = sanitize_create_data(item);
                if self.path == AccessPath::Typed {
                    if let Value::Object(map) = &mut doc {
                        let now = ejson_now();
                        map.insert("_id".to_string(), json!({ "$oid": mint_document_id() }));
                        map.insert("created_at".to_string(), now.clone());
                        map.insert("updated_at".to_string(), now);
                    }
                }
                doc
            })
            .collect();

        if !docs.is_empty() {
            self.store.run_command(json!({
                "insert": &self.collection,
                "documents": docs,
            }))?;
        }
        self.find_all()
    }

    /// Patch the first document, creating it when the collection is empty.
    pub fn upsert_first(&self, payload: Value) -> PanelResult<Value> {
        match self.find_first()? {
            Some(existing) => {
                let id = existing
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| PanelError::Store("stored document has no id".into()))?;
                self.update(&id, payload)?
                    .ok_or_else(|| PanelError::Store("updated document disappeared".into()))
            }
            None => self.insert(payload),
        }
    }

    /// Repair pass run before raw reads: string timestamps become real dates
    /// and missing ones are backfilled with now.
    fn ensure_timestamps(&self) -> PanelResult<()> {
        if self.path == AccessPath::Typed {
            return Ok(());
        }
        self.store.run_command(json!({
            "update": &self.collection,
            "updates": [
                {
                    "q": { "created_at": { "$type": "string" } },
                    "u": [{ "$set": { "created_at": { "$toDate": "$created_at" } } }],
                    "multi": true,
                },
                {
                    "q": { "updated_at": { "$type": "string" } },
                    "u": [{ "$set": { "updated_at": { "$toDate": "$updated_at" } } }],
                    "multi": true,
                },
                {
                    "q": { "created_at": { "$exists": false } },
                    "u": [{ "$set": { "created_at": "$$NOW" } }],
                    "multi": true,
                },
                {
                    "q": { "updated_at": { "$exists": false } },
                    "u": [{ "$set": { "updated_at": "$$NOW" } }],
                    "multi": true,
                },
            ],
        }))?;
        Ok(())
    }

    fn present_batch(&self, reply: &Value) -> Vec<Value> {
        batch_of(reply)
            .into_iter()
            .map(|doc| self.present(doc))
            .collect()
    }

    fn present_first(&self, reply: &Value) -> Option<Value> {
        batch_of(reply).into_iter().next().map(|doc| self.present(doc))
    }

    fn present(&self, doc: Value) -> Value {
        match self.path {
            AccessPath::Typed => present_typed(doc),
            AccessPath::Raw => present_raw(doc),
        }
    }
}

fn id_filter(id: &str) -> Value {
    json!({ "_id": { "$oid": id } })
}

fn batch_of(reply: &Value) -> Vec<Value> {
    reply
        .pointer("/cursor/firstBatch")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn remap_id(map: &mut Map<String, Value>) {
    if let Some(id) = map.remove("_id") {
        let id = match id.get("$oid").and_then(Value::as_str) {
            Some(oid) => Value::String(oid.to_string()),
            None => id,
        };
        map.insert("id".to_string(), id);
    }
}

fn present_raw(doc: Value) -> Value {
    let Value::Object(mut map) = doc else {
        return doc;
    };
    remap_id(&mut map);
    Value::Object(map)
}

fn present_typed(doc: Value) -> Value {
    let Value::Object(mut map) = doc else {
        return doc;
    };
    remap_id(&mut map);
    if let Some(created) = map.remove("created_at") {
        map.insert("createdAt".to_string(), iso_string(created));
    }
    if let Some(updated) = map.remove("updated_at") {
        map.insert("updatedAt".to_string(), iso_string(updated));
    }
    Value::Object(map)
}

fn iso_string(value: Value) -> Value {
    match parse_ejson_date(&value) {
        Some(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => value,
    }
}

/// Strip system keys from a client payload and normalize the known aliases.
/// Non-object payloads collapse to an unpublished empty document.
#[must_use]
pub fn sanitize_create_data(payload: Value) -> Value {
    let Value::Object(map) = payload else {
        return json!({ "isPublished": false });
    };
    let mut out = Map::new();
    let mut is_published = Value::Bool(false);
    for (key, value) in map {
        match key.as_str() {
            "id" | "createdAt" | "updatedAt" => {}
            "isPublished" => {
                if value.is_boolean() {
                    is_published = value;
                }
            }
            "isVisible" => {
                out.insert("is_visible".to_string(), value);
            }
            "iconType" => {
                out.insert("icon_type".to_string(), value);
            }
            "isSystem" => {
                out.insert("is_system".to_string(), value);
            }
            _ => {
                out.insert(key, value);
            }
        }
    }
    out.insert("isPublished".to_string(), is_published);
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn raw(collection: &str) -> (Arc<MemoryStore>, AccessStrategy) {
        let store = Arc::new(MemoryStore::new());
        let strategy = AccessStrategy::new(store.clone(), collection, AccessPath::Raw);
        (store, strategy)
    }

    fn typed(collection: &str) -> AccessStrategy {
        AccessStrategy::new(Arc::new(MemoryStore::new()), collection, AccessPath::Typed)
    }

    #[test]
    fn sanitize_strips_system_keys_and_aliases() {
        let out = sanitize_create_data(json!({
            "id": "abc",
            "createdAt": "2024-01-01",
            "title": "kept",
            "isVisible": true,
            "iconType": "svg",
            "isPublished": true,
        }));
        assert_eq!(
            out,
            json!({ "title": "kept", "is_visible": true, "icon_type": "svg", "isPublished": true })
        );
    }

    #[test]
    fn sanitize_defaults_unpublished() {
        assert_eq!(sanitize_create_data(json!([1, 2])), json!({ "isPublished": false }));
        assert_eq!(
            sanitize_create_data(json!({ "isPublished": "yes" })),
            json!({ "isPublished": false })
        );
    }

    #[test]
    fn raw_insert_returns_stored_document_with_id() {
        let (_, strategy) = raw("cases");
        let doc = strategy.insert(json!({ "title": "first" })).unwrap();
        assert_eq!(doc["title"], "first");
        assert!(doc["id"].is_string());
        // Raw presentation keeps physical keys and date atoms.
        assert!(doc["created_at"]["$date"].is_string());
        assert!(doc.get("createdAt").is_none());
    }

    #[test]
    fn typed_insert_presents_camel_case_iso_dates() {
        let strategy = typed("cases");
        let doc = strategy.insert(json!({ "title": "first" })).unwrap();
        assert!(doc["id"].is_string());
        let created = doc["createdAt"].as_str().unwrap();
        assert!(created.ends_with('Z'), "expected ISO string, got {created}");
        assert!(doc.get("created_at").is_none());
    }

    #[test]
    fn find_many_pages_newest_first() {
        let (_, strategy) = raw("cases");
        for n in 0..5 {
            strategy.insert(json!({ "n": n })).unwrap();
        }
        let (docs, total) = strategy.find_many(0, 2).unwrap();
        assert_eq!(total, 5);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["n"], 4);
        assert_eq!(docs[1]["n"], 3);

        let (page3, _) = strategy.find_many(4, 2).unwrap();
        assert_eq!(page3.len(), 1);
        assert_eq!(page3[0]["n"], 0);
    }

    #[test]
    fn raw_reads_repair_legacy_string_timestamps() {
        let (store, strategy) = raw("cases");
        store
            .run_command(json!({
                "insert": "cases",
                "documents": [{ "title": "legacy", "created_at": "2023-06-01T00:00:00Z" }],
            }))
            .unwrap();

        let docs = strategy.find_all().unwrap();
        assert_eq!(docs[0]["created_at"]["$date"], "2023-06-01T00:00:00.000Z");
        assert!(docs[0]["updated_at"]["$date"].is_string());
    }

    #[test]
    fn update_misses_return_none() {
        let (_, strategy) = raw("cases");
        assert!(strategy
            .update("000000000000000000000000", json!({ "title": "x" }))
            .unwrap()
            .is_none());
    }

    #[test]
    fn update_patches_and_bumps_updated_at() {
        let (_, strategy) = raw("cases");
        let doc = strategy.insert(json!({ "title": "before" })).unwrap();
        let id = doc["id"].as_str().unwrap();

        let updated = strategy
            .update(id, json!({ "title": "after" }))
            .unwrap()
            .unwrap();
        assert_eq!(updated["title"], "after");
        assert_eq!(updated["id"], doc["id"]);
        assert_eq!(updated["created_at"], doc["created_at"]);
    }

    #[test]
    fn delete_reports_whether_anything_went() {
        let (_, strategy) = raw("cases");
        let doc = strategy.insert(json!({ "title": "x" })).unwrap();
        let id = doc["id"].as_str().unwrap();
        assert!(strategy.delete(id).unwrap());
        assert!(!strategy.delete(id).unwrap());
    }

    #[test]
    fn replace_all_swaps_the_collection() {
        let (_, strategy) = raw("items");
        strategy.insert(json!({ "old": true })).unwrap();

        let docs = strategy
            .replace_all(vec![json!({ "name": "a" }), json!({ "name": "b" })])
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.get("old").is_none()));

        let emptied = strategy.replace_all(Vec::new()).unwrap();
        assert!(emptied.is_empty());
    }

    #[test]
    fn upsert_first_creates_then_patches() {
        let (_, strategy) = raw("menus");
        let created = strategy.upsert_first(json!({ "links": [1] })).unwrap();
        assert_eq!(created["links"], json!([1]));

        let patched = strategy.upsert_first(json!({ "links": [1, 2] })).unwrap();
        assert_eq!(patched["links"], json!([1, 2]));
        assert_eq!(patched["id"], created["id"]);

        let (_, total) = strategy.find_many(0, 10).unwrap();
        assert_eq!(total, 1);
    }
}
