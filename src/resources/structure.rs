//! Structure singleton access.
//!
//! Each generated resource keeps one document in `<resource>_structures`
//! whose `fields` array is the admin UI's field layout. Reads repair legacy
//! string dates (conversion only, no backfill) and then upsert the singleton
//! into existence; writes replace the `fields` array wholesale. Only the
//! array ever leaves this module, so typed and raw models share one path.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::errors::PanelResult;
use crate::store::DocumentStore;

pub struct StructureAccessor {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl StructureAccessor {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
        }
    }

    /// The stored field layout, creating an empty singleton on first read.
    pub fn read(&self) -> PanelResult<Vec<Value>> {
        self.normalize_dates()?;
        self.store.run_command(json!({
            "update": &self.collection,
            "updates": [{
                "q": {},
                "u": [{ "$set": {
                    "fields": { "$ifNull": ["$fields", []] },
                    "created_at": { "$ifNull": ["$created_at", "$$NOW"] },
                    "updated_at": "$$NOW",
                } }],
                "upsert": true,
                "multi": false,
            }],
        }))?;
        let reply = self.store.run_command(json!({
            "find": &self.collection,
            "filter": {},
            "limit": 1,
        }))?;
        let fields = reply
            .pointer("/cursor/firstBatch/0/fields")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(fields)
    }

    /// Replace the field layout and return it as saved.
    pub fn write(&self, fields: Vec<Value>) -> PanelResult<Vec<Value>> {
        self.normalize_dates()?;
        self.store.run_command(json!({
            "update": &self.collection,
            "updates": [{
                "q": {},
                "u": [{ "$set": {
                    "fields": &fields,
                    "created_at": { "$ifNull": ["$created_at", "$$NOW"] },
                    "updated_at": "$$NOW",
                } }],
                "upsert": true,
                "multi": false,
            }],
        }))?;
        Ok(fields)
    }

    fn normalize_dates(&self) -> PanelResult<()> {
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
            ],
        }))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn accessor() -> (Arc<MemoryStore>, StructureAccessor) {
        let store = Arc::new(MemoryStore::new());
        let accessor = StructureAccessor::new(store.clone(), "cases_structures");
        (store, accessor)
    }

    #[test]
    fn first_read_creates_an_empty_singleton() {
        let (store, accessor) = accessor();
        assert_eq!(accessor.read().unwrap(), Vec::<Value>::new());

        let reply = store
            .run_command(json!({ "count": "cases_structures", "query": {} }))
            .unwrap();
        assert_eq!(reply["n"], 1);

        // Repeat reads reuse the singleton.
        accessor.read().unwrap();
        let reply = store
            .run_command(json!({ "count": "cases_structures", "query": {} }))
            .unwrap();
        assert_eq!(reply["n"], 1);
    }

    #[test]
    fn write_replaces_fields_and_read_returns_them() {
        let (_, accessor) = accessor();
        let layout = vec![json!({ "label": "Заголовок", "type": "text", "order": 0 })];
        let saved = accessor.write(layout.clone()).unwrap();
        assert_eq!(saved, layout);
        assert_eq!(accessor.read().unwrap(), layout);

        let replaced = accessor.write(Vec::new()).unwrap();
        assert!(replaced.is_empty());
        assert_eq!(accessor.read().unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn read_keeps_existing_fields_intact() {
        let (store, accessor) = accessor();
        store
            .run_command(json!({
                "insert": "cases_structures",
                "documents": [{ "fields": [{ "label": "kept" }], "created_at": "2024-01-01T00:00:00Z" }],
            }))
            .unwrap();

        let fields = accessor.read().unwrap();
        assert_eq!(fields[0]["label"], "kept");

        // The legacy string date was converted in place.
        let reply = store
            .run_command(json!({
                "find": "cases_structures",
                "filter": { "created_at": { "$type": "string" } },
            }))
            .unwrap();
        assert!(reply["cursor"]["firstBatch"].as_array().unwrap().is_empty());
    }
}
