//! Live registration of generated resources.
//!
//! The modules written into a managed project compile into that project's
//! own server binary. The admin server itself serves the same contracts
//! through the generic handlers here, mounted per resource the moment
//! generation finishes, so a new resource answers requests without any
//! restart.
//!
//! Handlers are plain `fn` pointers shared by every mounted resource; each
//! call recovers its resource identity from the matched path pattern and
//! the metadata registered alongside the mount. On startup the identities
//! of previously generated resources are read back from their generated
//! module files, which remain the source of truth for what exists.

use std::fs;

use serde_json::{json, Map, Value};
use tracing::warn;

use super::ResourceContext;
use crate::config::ProjectPaths;
use crate::descriptor::{ResourceDescriptor, ResourceShape};
use crate::errors::{PanelError, PanelResult};
use crate::naming;
use crate::server::{HandlerRequest, HandlerResponse, Route, RouteTable};

/// Identity of one mounted resource: everything the generic handlers need
/// that the request path alone does not carry.
#[derive(Debug, Clone)]
pub struct LiveResource {
    pub slug: String,
    pub model: String,
    pub collection: String,
    pub shape: ResourceShape,
    /// Declared and physical payload field names (singleton shape only).
    pub singleton_field: Option<(String, String)>,
}

impl LiveResource {
    /// Identity of a resource that was just generated from `desc`.
    #[must_use]
    pub fn from_descriptor(desc: &ResourceDescriptor) -> Self {
        let singleton_field = match desc.shape {
            ResourceShape::Singleton => Some(desc.singleton_payload_field()),
            _ => None,
        };
        Self {
            slug: desc.route_name(),
            model: desc.model_name(),
            collection: desc.collection(),
            shape: desc.shape,
            singleton_field,
        }
    }

    /// Identity derived from a route slug alone; used when a mounted slug
    /// has no registered metadata.
    fn from_slug(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            model: naming::capitalize_first(slug),
            collection: naming::collection_name(slug),
            shape: ResourceShape::Collection,
            singleton_field: None,
        }
    }

    /// Recover a resource's identity from its generated modules: the shape
    /// from the handler functions `routes.rs` references, the names from the
    /// constants baked into `handlers.rs`.
    pub fn from_generated_files(project: &ProjectPaths, slug: &str) -> PanelResult<Self> {
        let dir = project.resource_dir(slug);
        let routes = fs::read_to_string(dir.join("routes.rs"))
            .map_err(|e| PanelError::Io(format!("read {}/routes.rs: {e}", dir.display())))?;
        let handlers = fs::read_to_string(dir.join("handlers.rs"))
            .map_err(|e| PanelError::Io(format!("read {}/handlers.rs: {e}", dir.display())))?;

        let shape = if routes.contains("handlers::put_value") {
            ResourceShape::Singleton
        } else if routes.contains("handlers::replace_all") {
            ResourceShape::CollectionBulk
        } else {
            ResourceShape::Collection
        };

        let model = quoted_after(&handlers, "const MODEL: &str = \"")
            .unwrap_or_else(|| naming::capitalize_first(slug));
        let collection = quoted_after(&handlers, "const COLLECTION: &str = \"")
            .unwrap_or_else(|| naming::collection_name(slug));
        let singleton_field = match shape {
            ResourceShape::Singleton => Some((
                quoted_after(&handlers, "req.body_array(\"").unwrap_or_else(|| "data".to_string()),
                quoted_after(&handlers, "doc.get(\"").unwrap_or_else(|| "data".to_string()),
            )),
            _ => None,
        };

        Ok(Self {
            slug: slug.to_string(),
            model,
            collection,
            shape,
            singleton_field,
        })
    }

    /// Declared and physical singleton payload names, defaulting to `data`.
    fn singleton_payload(&self) -> (String, String) {
        self.singleton_field
            .clone()
            .unwrap_or_else(|| ("data".to_string(), "data".to_string()))
    }
}

/// First quoted string following `marker`, e.g. the value of a string
/// constant the generator wrote.
fn quoted_after(text: &str, marker: &str) -> Option<String> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    Some(rest[..rest.find('"')?].to_string())
}

/// Identities of every generated resource present in the project tree.
/// Resource directories whose modules cannot be read are skipped.
pub fn discover_resources(project: &ProjectPaths) -> PanelResult<Vec<LiveResource>> {
    let mut out = Vec::new();
    for slug in project.generated_slugs()? {
        match LiveResource::from_generated_files(project, &slug) {
            Ok(res) => out.push(res),
            Err(err) => {
                warn!(slug = %slug, error = %err, "skipping unreadable generated resource");
            }
        }
    }
    Ok(out)
}

/// Route table for a resource of `shape`, matching the generated modules
/// route for route.
#[must_use]
pub fn resource_table(shape: ResourceShape) -> RouteTable {
    match shape {
        ResourceShape::Collection => RouteTable::new(vec![
            Route::get("/", get_all),
            Route::post("/", create),
            Route::get("/{id}", get_by_id),
            Route::put("/{id}", update),
            Route::delete("/{id}", delete),
        ]),
        ResourceShape::CollectionBulk => RouteTable::new(vec![
            Route::get("/", bulk_get_all).public(),
            Route::put("/", replace_all),
            Route::post("/", create),
            Route::get("/{id}", get_by_id),
            Route::delete("/{id}", delete),
        ]),
        ResourceShape::Singleton => RouteTable::new(vec![
            Route::get("/", get_value),
            Route::put("/", put_value),
            Route::post("/", create),
            Route::get("/{id}", get_by_id),
            Route::delete("/{id}", delete),
        ]),
    }
}

/// Route table for a resource's `-structure` prefix.
#[must_use]
pub fn structure_table() -> RouteTable {
    RouteTable::new(vec![
        Route::get("/", get_structure),
        Route::put("/", put_structure),
    ])
}

/// Route slug of the mounted resource, recovered from the request's path
/// pattern: `/api/cases/{id}` → `cases`, `/api/menu-structure` → `menu`.
fn base_slug(req: &HandlerRequest) -> String {
    let path = req.path.strip_prefix("/api/").unwrap_or(&req.path);
    let slug = path.split('/').next().unwrap_or_default();
    slug.strip_suffix("-structure").unwrap_or(slug).to_string()
}

fn identity(ctx: &ResourceContext, req: &HandlerRequest) -> LiveResource {
    let slug = base_slug(req);
    ctx.live_resource(&slug)
        .unwrap_or_else(|| LiveResource::from_slug(&slug))
}

fn get_all(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let res = identity(ctx, req);
    let page = req.query_usize("page", 1).max(1);
    let limit = req.query_usize("limit", 10).max(1);
    match ctx
        .accessor(&res.model, &res.collection)
        .find_many((page - 1) * limit, limit)
    {
        Ok((docs, total)) => {
            let mut body = Map::new();
            body.insert(res.slug, Value::Array(docs));
            body.insert("total".to_string(), json!(total));
            body.insert("page".to_string(), json!(page));
            body.insert("limit".to_string(), json!(limit));
            body.insert("totalPages".to_string(), json!((total + limit - 1) / limit));
            HandlerResponse::ok(Value::Object(body))
        }
        Err(err) => HandlerResponse::from_error(&err),
    }
}

fn bulk_get_all(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let res = identity(ctx, req);
    match ctx.accessor(&res.model, &res.collection).find_all() {
        Ok(docs) => HandlerResponse::ok(json!({ "items": docs })),
        Err(err) => HandlerResponse::from_error(&err),
    }
}

fn replace_all(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let res = identity(ctx, req);
    let items = match req.body_array("items") {
        Some(items) => items,
        None => return HandlerResponse::bad_request("items must be an array"),
    };
    match ctx.accessor(&res.model, &res.collection).replace_all(items) {
        Ok(docs) => HandlerResponse::ok(json!({ "items": docs })),
        Err(err) => HandlerResponse::from_error(&err),
    }
}

fn get_value(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let res = identity(ctx, req);
    let (field_key, physical) = res.singleton_payload();
    let accessor = ctx.accessor(&res.model, &res.collection);
    let doc = match accessor.find_first() {
        Ok(Some(doc)) => doc,
        Ok(None) => {
            let mut seed = Map::new();
            seed.insert(physical.clone(), json!([]));
            match accessor.insert(Value::Object(seed)) {
                Ok(doc) => doc,
                Err(err) => return HandlerResponse::from_error(&err),
            }
        }
        Err(err) => return HandlerResponse::from_error(&err),
    };
    let mut body = Map::new();
    body.insert(field_key, singleton_value(&doc, &physical));
    HandlerResponse::ok(Value::Object(body))
}

fn put_value(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let res = identity(ctx, req);
    let (field_key, physical) = res.singleton_payload();
    let value = match req.body_array(&field_key) {
        Some(value) => value,
        None => return HandlerResponse::bad_request(&format!("{field_key} must be an array")),
    };
    let mut patch = Map::new();
    patch.insert(physical.clone(), Value::Array(value));
    match ctx
        .accessor(&res.model, &res.collection)
        .upsert_first(Value::Object(patch))
    {
        Ok(doc) => {
            let mut body = Map::new();
            body.insert(field_key, singleton_value(&doc, &physical));
            HandlerResponse::ok(Value::Object(body))
        }
        Err(err) => HandlerResponse::from_error(&err),
    }
}

/// Payload field of a singleton document; null and missing both read as `[]`.
fn singleton_value(doc: &Value, physical: &str) -> Value {
    match doc.get(physical) {
        Some(value) if !value.is_null() => value.clone(),
        _ => json!([]),
    }
}

fn create(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let res = identity(ctx, req);
    match ctx
        .accessor(&res.model, &res.collection)
        .insert(req.body_json())
    {
        Ok(doc) => HandlerResponse::created(doc),
        Err(err) => HandlerResponse::from_error(&err),
    }
}

fn get_by_id(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let res = identity(ctx, req);
    let id = match req.path_param("id") {
        Some(id) => id.to_string(),
        None => return HandlerResponse::bad_request("id parameter is required"),
    };
    match ctx.accessor(&res.model, &res.collection).find_one(&id) {
        Ok(Some(doc)) => HandlerResponse::ok(doc),
        Ok(None) => HandlerResponse::not_found(&res.model),
        Err(err) => HandlerResponse::from_error(&err),
    }
}

fn update(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let res = identity(ctx, req);
    let id = match req.path_param("id") {
        Some(id) => id.to_string(),
        None => return HandlerResponse::bad_request("id parameter is required"),
    };
    match ctx
        .accessor(&res.model, &res.collection)
        .update(&id, req.body_json())
    {
        Ok(Some(doc)) => HandlerResponse::ok(doc),
        Ok(None) => HandlerResponse::not_found(&res.model),
        Err(err) => HandlerResponse::from_error(&err),
    }
}

fn delete(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let res = identity(ctx, req);
    let id = match req.path_param("id") {
        Some(id) => id.to_string(),
        None => return HandlerResponse::bad_request("id parameter is required"),
    };
    match ctx.accessor(&res.model, &res.collection).delete(&id) {
        Ok(true) => HandlerResponse::ok(json!({ "message": format!("{} deleted", res.model) })),
        Ok(false) => HandlerResponse::not_found(&res.model),
        Err(err) => HandlerResponse::from_error(&err),
    }
}

fn get_structure(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let res = identity(ctx, req);
    let collection = naming::structure_collection_name(&res.slug);
    match ctx.structure(&res.model, &collection).read() {
        Ok(fields) => HandlerResponse::ok(json!({ "fields": fields })),
        Err(err) => HandlerResponse::from_error(&err),
    }
}

fn put_structure(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let res = identity(ctx, req);
    let fields = match req.body_array("fields") {
        Some(fields) => fields,
        None => return HandlerResponse::bad_request("fields must be an array"),
    };
    let collection = naming::structure_collection_name(&res.slug);
    let saved = match ctx.structure(&res.model, &collection).write(fields) {
        Ok(saved) => saved,
        Err(err) => return HandlerResponse::from_error(&err),
    };
    match ctx.sync_model_from_structure(&res.slug, &saved) {
        Ok(changed) => HandlerResponse::ok(json!({ "fields": saved, "modelSynced": changed })),
        Err(err) => HandlerResponse::from_error(&err),
    }
}
