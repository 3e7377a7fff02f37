//! The `/api/admin` management surface: resource generation, dynamic pages,
//! snapshot export/import.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, warn};

use crate::descriptor::{GenerateRequest, ResourceDescriptor};
use crate::errors::PanelResult;
use crate::generator::generate_resource;
use crate::pages::DynamicPages;
use crate::resources::{discover_resources, LiveResource, ResourceContext};
use crate::server::{HandlerRequest, HandlerResponse, Route, RouteTable};
use crate::snapshot::SnapshotEngine;

pub fn admin_table() -> RouteTable {
    RouteTable::new(vec![
        Route::post("/generate-resource", generate),
        Route::get("/dynamic-pages/{slug}", get_page),
        Route::post("/dynamic-pages/{slug}", create_page),
        Route::put("/dynamic-pages/{slug}", update_page),
        Route::get("/data/export", export_data),
        Route::post("/data/import", import_data),
    ])
}

/// POST /api/admin/generate-resource
///
/// Validates the descriptor, runs the generation pipeline, upserts the admin
/// page and mounts the new routes, then responds. A changed schema is pushed
/// to the database afterwards in a detached task so the response is never
/// held up by the CLI.
pub fn generate(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    // A body that does not look like a generation request validates as
    // empty, so every violation is reported at once.
    let request: GenerateRequest = serde_json::from_value(req.body_json()).unwrap_or_default();
    let desc = match ResourceDescriptor::from_request(request) {
        Ok(desc) => desc,
        Err(err) => return HandlerResponse::from_error(&err),
    };

    match run_generation(ctx, &desc) {
        Ok(body) => HandlerResponse::created(body),
        Err(err) => {
            error!(resource = %desc.name, error = %err, "resource generation failed");
            HandlerResponse::json(
                500,
                json!({
                    "success": false,
                    "message": format!("Failed to generate resource: {}", err.message()),
                }),
            )
        }
    }
}

fn run_generation(ctx: &ResourceContext, desc: &ResourceDescriptor) -> PanelResult<Value> {
    let generated = generate_resource(ctx.project(), desc)?;

    if !generated.page_slug.is_empty() {
        pages(ctx).upsert(
            &generated.page_slug,
            &generated.page_title,
            &json!([]),
            &json!({ "fields": generated.structure_fields }),
        )?;
    }

    ctx.mount_live(&LiveResource::from_descriptor(desc));

    if generated.schema_changed {
        ctx.sync().spawn_detached();
    }

    Ok(json!({
        "success": true,
        "message": format!("Resource {} generated successfully", generated.name),
        "resourceName": generated.name,
        "endpoints": generated.endpoints,
    }))
}

/// GET /api/admin/dynamic-pages/{slug}
pub fn get_page(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let Some(slug) = req.path_param("slug") else {
        return HandlerResponse::bad_request("slug parameter is required");
    };
    match pages(ctx).get_or_create(slug) {
        Ok(page) => HandlerResponse::ok(page),
        Err(err) => HandlerResponse::from_error(&err),
    }
}

/// POST /api/admin/dynamic-pages/{slug}
pub fn create_page(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let Some(slug) = req.path_param("slug") else {
        return HandlerResponse::bad_request("slug parameter is required");
    };
    let body = req.body_json();
    match pages(ctx).create(
        slug,
        body.get("title").and_then(Value::as_str),
        body.get("blocks"),
        body.get("structure"),
    ) {
        Ok(page) => HandlerResponse::created(page),
        Err(err) => HandlerResponse::from_error(&err),
    }
}

/// PUT /api/admin/dynamic-pages/{slug}
///
/// Partial merge into an existing page; an unknown slug is created instead,
/// answering 201.
pub fn update_page(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let Some(slug) = req.path_param("slug") else {
        return HandlerResponse::bad_request("slug parameter is required");
    };
    match pages(ctx).update(slug, &req.body_json()) {
        Ok((page, created)) if created => HandlerResponse::created(page),
        Ok((page, _)) => HandlerResponse::ok(page),
        Err(err) => HandlerResponse::from_error(&err),
    }
}

/// GET /api/admin/data/export
pub fn export_data(ctx: &ResourceContext, _req: &HandlerRequest) -> HandlerResponse {
    match snapshot(ctx).export() {
        Ok(body) => HandlerResponse::ok(body),
        Err(err) => HandlerResponse::from_error(&err),
    }
}

/// POST /api/admin/data/import
pub fn import_data(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
    let body = req.body_json();
    let payload = match body.get("snapshot") {
        Some(payload) if payload.is_object() => payload,
        _ => return HandlerResponse::bad_request("snapshot is required"),
    };
    if let Err(err) = snapshot(ctx).import(payload) {
        return HandlerResponse::from_error(&err);
    }
    remount_generated(ctx);
    HandlerResponse::ok(json!({
        "success": true,
        "message": "Импорт завершен. Все данные и сгенерированные ресурсы заменены.",
    }))
}

/// Rebuild the live mounts from the generated tree: everything currently
/// mounted comes down, everything present on disk goes up. Run at startup
/// and after an import replaces the tree.
pub fn remount_generated(ctx: &ResourceContext) {
    for slug in ctx.live_slugs() {
        ctx.unmount_live(&slug);
    }
    match discover_resources(ctx.project()) {
        Ok(resources) => {
            for res in &resources {
                ctx.mount_live(res);
            }
        }
        Err(err) => warn!(error = %err, "could not rediscover generated resources"),
    }
}

fn pages(ctx: &ResourceContext) -> DynamicPages {
    DynamicPages::new(Arc::clone(ctx.store()))
}

fn snapshot(ctx: &ResourceContext) -> SnapshotEngine {
    SnapshotEngine::new(ctx.project().clone(), Arc::clone(ctx.store()))
}
