use std::fs;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::bootstrap;
use crate::config::ProjectPaths;
use crate::descriptor::{ResourceDescriptor, ResourceShape};
use crate::errors::{PanelError, PanelResult};
use crate::generator::templates;
use crate::schema;

/// Outcome of a generation run, consumed by the HTTP layer for the response
/// body, the dynamic-page upsert and live route registration.
#[derive(Debug, Clone)]
pub struct GeneratedResource {
    /// Resource name as requested
    pub name: String,
    pub model_name: String,
    /// Lowercase slug: directory name, route prefix, page fallback
    pub route_name: String,
    pub collection: String,
    pub shape: ResourceShape,
    /// Endpoint map for the generation response
    pub endpoints: Value,
    pub page_slug: String,
    pub page_title: String,
    /// Structure fields carried through from the request
    pub structure_fields: Vec<Value>,
    /// Whether either schema model block changed (drives the sync step)
    pub schema_changed: bool,
}

/// Run the generation pipeline for a validated descriptor: merge both model
/// blocks into the schema, write the resource module files, and register the
/// routes in the bootstrap.
///
/// Validation happens before this is called; failures here are
/// `GenerationError`s after partial side effects (no rollback).
pub fn generate_resource(
    project: &ProjectPaths,
    desc: &ResourceDescriptor,
) -> PanelResult<GeneratedResource> {
    let slug = desc.route_name();
    info!(resource = %desc.name, slug = %slug, shape = ?desc.shape, "generating resource");

    let model_text = templates::render_model(desc)?;
    debug!(model = %desc.model_name(), "merging resource model");
    let model_changed = schema::merge_model_file(&project.schema_file(), &model_text)?;

    let structure_text = templates::render_structure_model(desc)?;
    debug!(model = %format!("{}Structure", desc.model_name()), "merging structure model");
    let structure_changed = schema::merge_model_file(&project.schema_file(), &structure_text)?;

    write_resource_modules(project, desc)?;

    bootstrap::edit_file(&project.resources_mod_file(), |text| {
        Ok(bootstrap::ensure_resource_module(text, &slug))
    })?;
    bootstrap::edit_file(&project.bootstrap_file(), |text| {
        let text = bootstrap::register_routes(text, &slug)?;
        bootstrap::register_structure_routes(&text, &slug)
    })?;
    info!(slug = %slug, "routes registered in bootstrap");

    Ok(GeneratedResource {
        name: desc.name.clone(),
        model_name: desc.model_name(),
        route_name: slug.clone(),
        collection: desc.collection(),
        shape: desc.shape,
        endpoints: endpoints_map(&slug, desc.shape),
        page_slug: desc.page_slug(),
        page_title: desc.page_title(),
        structure_fields: desc.structure_fields.clone().unwrap_or_default(),
        schema_changed: model_changed || structure_changed,
    })
}

/// Write the five module files of a generated resource.
fn write_resource_modules(project: &ProjectPaths, desc: &ResourceDescriptor) -> PanelResult<()> {
    let dir = project.resource_dir(&desc.route_name());
    fs::create_dir_all(&dir)
        .map_err(|e| PanelError::generation(format!("create {}: {e}", dir.display())))?;

    let files = [
        ("handlers.rs", templates::render_handlers(desc)?),
        ("routes.rs", templates::render_routes(desc)?),
        (
            "structure_handlers.rs",
            templates::render_structure_handlers(desc)?,
        ),
        (
            "structure_routes.rs",
            templates::render_structure_routes(desc)?,
        ),
        ("mod.rs", templates::render_resource_mod(true)?),
    ];
    for (name, content) in files {
        let path = dir.join(name);
        fs::write(&path, content)
            .map_err(|e| PanelError::generation(format!("write {}: {e}", path.display())))?;
        debug!(file = %path.display(), "wrote generated module");
    }
    Ok(())
}

/// Endpoint map reported in the generation response. `update` drops the id
/// segment for bulk and singleton shapes.
pub fn endpoints_map(route_name: &str, shape: ResourceShape) -> Value {
    let update = match shape {
        ResourceShape::Collection => format!("PUT /api/{route_name}/:id"),
        ResourceShape::CollectionBulk | ResourceShape::Singleton => {
            format!("PUT /api/{route_name}")
        }
    };
    json!({
        "getAll": format!("GET /api/{route_name}"),
        "getById": format!("GET /api/{route_name}/:id"),
        "create": format!("POST /api/{route_name}"),
        "update": update,
        "delete": format!("DELETE /api/{route_name}/:id"),
    })
}
