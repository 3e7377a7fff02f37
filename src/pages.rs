//! Dynamic page registry.
//!
//! One document per admin page in `dynamic_pages`, keyed by slug. The
//! generator upserts a page for every generated resource so the admin UI
//! never 404s on its first visit; lookups auto-create a bare page for
//! resources generated before pages existed.
//!
//! All writes go through one slug-keyed upsert: `$set` the full payload,
//! `$setOnInsert` the creation timestamp.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::errors::{PanelError, PanelResult};
use crate::store::{ejson_now, DocumentStore};

pub const DYNAMIC_PAGES_COLLECTION: &str = "dynamic_pages";

pub struct DynamicPages {
    store: Arc<dyn DocumentStore>,
}

impl DynamicPages {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn find_by_slug(&self, slug: &str) -> PanelResult<Option<Value>> {
        let reply = self.store.run_command(json!({
            "find": DYNAMIC_PAGES_COLLECTION,
            "filter": { "slug": slug },
            "limit": 1,
        }))?;
        Ok(reply
            .pointer("/cursor/firstBatch/0")
            .cloned()
            .map(present_page))
    }

    /// Write the full page payload under `slug` and return it as stored.
    pub fn upsert(
        &self,
        slug: &str,
        title: &str,
        blocks: &Value,
        structure: &Value,
    ) -> PanelResult<Value> {
        let now = ejson_now();
        self.store.run_command(json!({
            "update": DYNAMIC_PAGES_COLLECTION,
            "updates": [{
                "q": { "slug": slug },
                "u": {
                    "$set": {
                        "slug": slug,
                        "title": title,
                        "blocks": blocks,
                        "structure": structure,
                        "updated_at": &now,
                    },
                    "$setOnInsert": { "created_at": &now },
                },
                "upsert": true,
                "multi": false,
            }],
        }))?;
        self.find_by_slug(slug)?
            .ok_or_else(|| PanelError::Store("dynamic page upsert did not persist".to_string()))
    }

    /// Fetch a page, creating a bare one when the slug is unknown.
    pub fn get_or_create(&self, slug: &str) -> PanelResult<Value> {
        if let Some(page) = self.find_by_slug(slug)? {
            return Ok(page);
        }
        self.upsert(slug, slug, &json!([]), &json!({ "fields": [] }))
    }

    /// Create a page, refusing a slug that already exists.
    pub fn create(
        &self,
        slug: &str,
        title: Option<&str>,
        blocks: Option<&Value>,
        structure: Option<&Value>,
    ) -> PanelResult<Value> {
        if self.find_by_slug(slug)?.is_some() {
            return Err(PanelError::Conflict(format!(
                "Dynamic page with slug \"{slug}\" already exists"
            )));
        }
        self.upsert(
            slug,
            title.unwrap_or(slug),
            blocks.unwrap_or(&json!([])),
            structure.unwrap_or(&json!({})),
        )
    }

    /// Merge a partial update into a page. Absent body keys keep the stored
    /// values; an unknown slug is created instead. The flag reports whether
    /// the write created the page.
    pub fn update(&self, slug: &str, patch: &Value) -> PanelResult<(Value, bool)> {
        let title = patch.get("title").and_then(Value::as_str);
        let blocks = patch.get("blocks");
        let structure = patch.get("structure");

        let Some(existing) = self.find_by_slug(slug)? else {
            let page = self.upsert(
                slug,
                title.unwrap_or(slug),
                blocks.unwrap_or(&json!([])),
                structure.unwrap_or(&json!({})),
            )?;
            return Ok((page, true));
        };

        let merged_title = match title {
            Some(t) => t.to_string(),
            None => existing
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or(slug)
                .to_string(),
        };
        let merged_blocks = blocks
            .cloned()
            .unwrap_or_else(|| existing.get("blocks").cloned().unwrap_or_else(|| json!([])));
        let merged_structure = structure.cloned().unwrap_or_else(|| {
            existing
                .get("structure")
                .cloned()
                .unwrap_or_else(|| json!({}))
        });

        let page = self.upsert(slug, &merged_title, &merged_blocks, &merged_structure)?;
        Ok((page, false))
    }
}

fn present_page(doc: Value) -> Value {
    let Value::Object(mut map) = doc else {
        return doc;
    };
    if let Some(id) = map.remove("_id") {
        let id = match id.get("$oid").and_then(Value::as_str) {
            Some(oid) => Value::String(oid.to_string()),
            None => id,
        };
        map.insert("id".to_string(), id);
    }
    Value::Object(map)
}
