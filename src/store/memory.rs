//! In-process document store.
//!
//! Interprets the same command documents the HTTP store forwards, so the
//! rest of the crate runs identically against `mem:` and a real backend.
//! Covers the command surface the accessors actually issue: equality and
//! `$type`/`$exists` filters, classic `$set`/`$setOnInsert` updates,
//! aggregation-pipeline updates with `$toDate`/`$ifNull`/`$$NOW` and
//! `"$field"` references, single-key sorts, skip/limit, and upserts.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::errors::{PanelError, PanelResult};
use crate::ids::mint_document_id;
use crate::store::{ejson_now, parse_ejson_date, DocumentStore};

#[derive(Debug, Clone)]
struct StoredDoc {
    /// Insertion sequence, used to break sort ties deterministically.
    seq: u64,
    doc: Value,
}

#[derive(Debug, Default)]
struct Inner {
    collections: BTreeMap<String, Vec<StoredDoc>>,
    next_seq: u64,
}

/// Development and test backend holding all documents in process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PanelResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| PanelError::Store("memory store lock poisoned".to_string()))
    }
}

impl DocumentStore for MemoryStore {
    fn run_command(&self, command: Value) -> PanelResult<Value> {
        let cmd = command
            .as_object()
            .ok_or_else(|| PanelError::Store("command must be an object".to_string()))?;

        if cmd.contains_key("find") {
            self.cmd_find(cmd)
        } else if cmd.contains_key("count") {
            self.cmd_count(cmd)
        } else if cmd.contains_key("insert") {
            self.cmd_insert(cmd)
        } else if cmd.contains_key("update") {
            self.cmd_update(cmd)
        } else if cmd.contains_key("delete") {
            self.cmd_delete(cmd)
        } else if cmd.contains_key("listCollections") {
            self.cmd_list_collections()
        } else if cmd.contains_key("drop") {
            self.cmd_drop(cmd)
        } else {
            Err(PanelError::Store(format!(
                "unsupported command: {}",
                Value::Object(cmd.clone())
            )))
        }
    }
}

impl MemoryStore {
    fn cmd_find(&self, cmd: &Map<String, Value>) -> PanelResult<Value> {
        let coll = command_target(cmd, "find")?;
        let filter = cmd.get("filter").cloned().unwrap_or_else(|| json!({}));
        let inner = self.lock()?;

        let mut matched: Vec<&StoredDoc> = inner
            .collections
            .get(&coll)
            .map(|docs| docs.iter().filter(|d| matches_filter(&d.doc, &filter)).collect())
            .unwrap_or_default();

        if let Some(sort) = cmd.get("sort").and_then(Value::as_object) {
            if let Some((key, dir)) = sort.iter().next() {
                let descending = dir.as_i64().unwrap_or(1) < 0;
                matched.sort_by(|a, b| {
                    let ord = cmp_values(a.doc.get(key), b.doc.get(key))
                        .then(a.seq.cmp(&b.seq));
                    if descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                });
            }
        }

        let skip = cmd.get("skip").and_then(Value::as_u64).unwrap_or(0) as usize;
        let limit = cmd.get("limit").and_then(Value::as_u64).unwrap_or(0) as usize;

        let mut batch: Vec<Value> = matched.into_iter().skip(skip).map(|d| d.doc.clone()).collect();
        if limit > 0 {
            batch.truncate(limit);
        }

        Ok(json!({
            "cursor": { "firstBatch": batch, "id": 0, "ns": format!("panel.{coll}") },
            "ok": 1,
        }))
    }

    fn cmd_count(&self, cmd: &Map<String, Value>) -> PanelResult<Value> {
        let coll = command_target(cmd, "count")?;
        let query = cmd.get("query").cloned().unwrap_or_else(|| json!({}));
        let inner = self.lock()?;
        let n = inner
            .collections
            .get(&coll)
            .map(|docs| docs.iter().filter(|d| matches_filter(&d.doc, &query)).count())
            .unwrap_or(0);
        Ok(json!({ "n": n, "ok": 1 }))
    }

    fn cmd_insert(&self, cmd: &Map<String, Value>) -> PanelResult<Value> {
        let coll = command_target(cmd, "insert")?;
        let documents = cmd
            .get("documents")
            .and_then(Value::as_array)
            .ok_or_else(|| PanelError::Store("insert requires a documents array".to_string()))?;
        let mut inner = self.lock()?;
        let mut n = 0;
        for doc in documents {
            let mut doc = doc.clone();
            ensure_object_id(&mut doc);
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner
                .collections
                .entry(coll.clone())
                .or_default()
                .push(StoredDoc { seq, doc });
            n += 1;
        }
        Ok(json!({ "n": n, "ok": 1 }))
    }

    fn cmd_update(&self, cmd: &Map<String, Value>) -> PanelResult<Value> {
        let coll = command_target(cmd, "update")?;
        let updates = cmd
            .get("updates")
            .and_then(Value::as_array)
            .ok_or_else(|| PanelError::Store("update requires an updates array".to_string()))?;

        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let mut n = 0usize;
        let mut modified = 0usize;

        for entry in updates {
            let q = entry.get("q").cloned().unwrap_or_else(|| json!({}));
            let u = entry
                .get("u")
                .ok_or_else(|| PanelError::Store("update entry requires u".to_string()))?
                .clone();
            let multi = entry.get("multi").and_then(Value::as_bool).unwrap_or(false);
            let upsert = entry.get("upsert").and_then(Value::as_bool).unwrap_or(false);
            let now = ejson_now();

            // A plain update on a missing collection must not create it.
            let mut hit = false;
            if let Some(docs) = inner.collections.get_mut(&coll) {
                for stored in docs.iter_mut() {
                    if !matches_filter(&stored.doc, &q) {
                        continue;
                    }
                    hit = true;
                    n += 1;
                    let before = stored.doc.clone();
                    apply_update(&mut stored.doc, &u, &now, false)?;
                    if stored.doc != before {
                        modified += 1;
                    }
                    if !multi {
                        break;
                    }
                }
            }

            if !hit && upsert {
                let mut doc = upsert_base(&q);
                apply_update(&mut doc, &u, &now, true)?;
                ensure_object_id(&mut doc);
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner
                    .collections
                    .entry(coll.clone())
                    .or_default()
                    .push(StoredDoc { seq, doc });
                n += 1;
            }
        }

        Ok(json!({ "n": n, "nModified": modified, "ok": 1 }))
    }

    fn cmd_delete(&self, cmd: &Map<String, Value>) -> PanelResult<Value> {
        let coll = command_target(cmd, "delete")?;
        let deletes = cmd
            .get("deletes")
            .and_then(Value::as_array)
            .ok_or_else(|| PanelError::Store("delete requires a deletes array".to_string()))?;

        let mut inner = self.lock()?;
        let mut n = 0usize;
        for entry in deletes {
            let q = entry.get("q").cloned().unwrap_or_else(|| json!({}));
            let limit = entry.get("limit").and_then(Value::as_u64).unwrap_or(0);
            if let Some(docs) = inner.collections.get_mut(&coll) {
                let mut removed = 0u64;
                docs.retain(|stored| {
                    if (limit == 0 || removed < limit) && matches_filter(&stored.doc, &q) {
                        removed += 1;
                        false
                    } else {
                        true
                    }
                });
                n += removed as usize;
            }
        }
        Ok(json!({ "n": n, "ok": 1 }))
    }

    fn cmd_list_collections(&self) -> PanelResult<Value> {
        let inner = self.lock()?;
        let batch: Vec<Value> = inner
            .collections
            .keys()
            .map(|name| json!({ "name": name, "type": "collection" }))
            .collect();
        Ok(json!({
            "cursor": { "firstBatch": batch, "id": 0, "ns": "panel.$cmd.listCollections" },
            "ok": 1,
        }))
    }

    fn cmd_drop(&self, cmd: &Map<String, Value>) -> PanelResult<Value> {
        let coll = command_target(cmd, "drop")?;
        let mut inner = self.lock()?;
        if inner.collections.remove(&coll).is_none() {
            return Err(PanelError::Store(format!("ns not found: {coll}")));
        }
        Ok(json!({ "ok": 1 }))
    }
}

fn command_target(cmd: &Map<String, Value>, key: &str) -> PanelResult<String> {
    cmd.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PanelError::Store(format!("{key} requires a collection name")))
}

fn ensure_object_id(doc: &mut Value) {
    if let Value::Object(map) = doc {
        if !map.contains_key("_id") {
            map.insert("_id".to_string(), json!({ "$oid": mint_document_id() }));
        }
    }
}

/// Equality fields of the query seed the upserted document, matching how
/// the real server builds upsert bases. Operator conditions are skipped.
fn upsert_base(q: &Value) -> Value {
    let mut base = Map::new();
    if let Value::Object(filter) = q {
        for (key, cond) in filter {
            if !is_operator_condition(cond) {
                base.insert(key.clone(), cond.clone());
            }
        }
    }
    Value::Object(base)
}

fn is_operator_condition(cond: &Value) -> bool {
    cond.as_object()
        .map(|map| map.keys().any(|k| k == "$type" || k == "$exists"))
        .unwrap_or(false)
}

fn matches_filter(doc: &Value, filter: &Value) -> bool {
    let Value::Object(conditions) = filter else {
        return false;
    };
    conditions.iter().all(|(key, cond)| {
        let field = doc.get(key);
        match cond.as_object() {
            Some(op) if op.contains_key("$type") => match op.get("$type").and_then(Value::as_str) {
                Some("string") => matches!(field, Some(Value::String(_))),
                Some("object") => matches!(field, Some(Value::Object(_))),
                _ => false,
            },
            Some(op) if op.contains_key("$exists") => {
                let wanted = op.get("$exists").and_then(Value::as_bool).unwrap_or(true);
                field.is_some() == wanted
            }
            _ => field == Some(cond),
        }
    })
}

fn apply_update(doc: &mut Value, u: &Value, now: &Value, inserting: bool) -> PanelResult<()> {
    match u {
        // Aggregation pipeline: a list of { $set: {…} } stages whose values
        // may reference the current document.
        Value::Array(stages) => {
            for stage in stages {
                let set = stage
                    .get("$set")
                    .and_then(Value::as_object)
                    .ok_or_else(|| {
                        PanelError::Store("pipeline updates support $set stages only".to_string())
                    })?;
                let snapshot = doc.clone();
                for (key, expr) in set {
                    let value = eval_expr(expr, &snapshot, now);
                    set_field(doc, key, value);
                }
            }
            Ok(())
        }
        // Classic update document: $set always applies, $setOnInsert only
        // when the write created the document.
        Value::Object(ops) => {
            if let Some(set) = ops.get("$set").and_then(Value::as_object) {
                for (key, value) in set {
                    set_field(doc, key, value.clone());
                }
            }
            if inserting {
                if let Some(set) = ops.get("$setOnInsert").and_then(Value::as_object) {
                    for (key, value) in set {
                        set_field(doc, key, value.clone());
                    }
                }
            }
            Ok(())
        }
        _ => Err(PanelError::Store(
            "update u must be a document or pipeline".to_string(),
        )),
    }
}

fn set_field(doc: &mut Value, key: &str, value: Value) {
    if !doc.is_object() {
        *doc = json!({});
    }
    if let Value::Object(map) = doc {
        map.insert(key.to_string(), value);
    }
}

/// Evaluate a pipeline `$set` expression against the current document.
fn eval_expr(expr: &Value, doc: &Value, now: &Value) -> Value {
    match expr {
        Value::String(s) if s == "$$NOW" => now.clone(),
        Value::String(s) if s.starts_with('$') && !s.starts_with("$$") => {
            doc.get(&s[1..]).cloned().unwrap_or(Value::Null)
        }
        Value::Object(map) => {
            if let Some(arg) = map.get("$toDate") {
                return to_date(eval_expr(arg, doc, now));
            }
            if let Some(args) = map.get("$ifNull").and_then(Value::as_array) {
                if args.len() == 2 {
                    let first = eval_expr(&args[0], doc, now);
                    if first.is_null() {
                        return eval_expr(&args[1], doc, now);
                    }
                    return first;
                }
            }
            let evaluated: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), eval_expr(v, doc, now)))
                .collect();
            Value::Object(evaluated)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| eval_expr(v, doc, now)).collect())
        }
        other => other.clone(),
    }
}

fn to_date(value: Value) -> Value {
    match &value {
        Value::Object(map) if map.contains_key("$date") => value,
        Value::String(raw) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                let utc = dt.with_timezone(&Utc);
                return json!({ "$date": utc.to_rfc3339_opts(SecondsFormat::Millis, true) });
            }
            if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                if let Some(midnight) = date.and_hms_milli_opt(0, 0, 0, 0) {
                    let utc = midnight.and_utc();
                    return json!({ "$date": utc.to_rfc3339_opts(SecondsFormat::Millis, true) });
                }
            }
            Value::Null
        }
        Value::Null => Value::Null,
        _ => value,
    }
}

fn cmp_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            if let (Some(da), Some(db)) = (parse_ejson_date(a), parse_ejson_date(b)) {
                return da.cmp(&db);
            }
            match (a, b) {
                (Value::Number(x), Value::Number(y)) => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(Ordering::Equal),
                (Value::String(x), Value::String(y)) => x.cmp(y),
                _ => Ordering::Equal,
            }
        }
    }
}
