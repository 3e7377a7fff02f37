use askama::Template;

use crate::descriptor::{ResourceDescriptor, ResourceShape};
use crate::errors::PanelResult;
use crate::naming;

/// Template data for a resource persistence model.
///
/// Renders the canonical block layout: standard fields, one line per declared
/// field, the `additionalBlocks` tail and the collection mapping.
#[derive(Template)]
#[template(path = "prisma_model.txt")]
pub struct PrismaModelTemplate {
    /// Capitalized model name
    pub model_name: String,
    /// Pre-formatted `  <name> <Type>[?]` lines for declared fields
    pub field_lines: Vec<String>,
    /// Physical collection name
    pub collection: String,
}

/// Template data for the companion structure model (`<Name>Structure`).
#[derive(Template)]
#[template(path = "structure_model.txt")]
pub struct StructureModelTemplate {
    pub model_name: String,
    pub collection: String,
}

/// Template data for collection-shaped handlers (paginated list, per-id CRUD).
#[derive(Template)]
#[template(path = "collection_handlers.rs.txt", escape = "none")]
pub struct CollectionHandlersTemplate {
    pub model_name: String,
    pub route_name: String,
    pub collection: String,
}

/// Template data for bulk-collection handlers (PUT replaces the collection).
#[derive(Template)]
#[template(path = "bulk_handlers.rs.txt", escape = "none")]
pub struct BulkHandlersTemplate {
    pub model_name: String,
    pub route_name: String,
    pub collection: String,
}

/// Template data for singleton handlers (one document, one payload field).
#[derive(Template)]
#[template(path = "singleton_handlers.rs.txt", escape = "none")]
pub struct SingletonHandlersTemplate {
    pub model_name: String,
    pub route_name: String,
    pub collection: String,
    /// Declared payload field name, used in request/response bodies
    pub field_key: String,
    /// Physical (snake_case) payload field name in stored documents
    pub physical_field: String,
}

/// Template data for the structure endpoints of a generated resource.
#[derive(Template)]
#[template(path = "structure_handlers.rs.txt", escape = "none")]
pub struct StructureHandlersTemplate {
    pub model_name: String,
    pub route_name: String,
    pub collection: String,
    /// Lowercase resource name passed to the model-sync step
    pub resource_name: String,
}

#[derive(Template)]
#[template(path = "collection_routes.rs.txt", escape = "none")]
pub struct CollectionRoutesTemplate {
    pub route_name: String,
}

#[derive(Template)]
#[template(path = "bulk_routes.rs.txt", escape = "none")]
pub struct BulkRoutesTemplate {
    pub route_name: String,
}

#[derive(Template)]
#[template(path = "singleton_routes.rs.txt", escape = "none")]
pub struct SingletonRoutesTemplate {
    pub route_name: String,
}

#[derive(Template)]
#[template(path = "structure_routes.rs.txt", escape = "none")]
pub struct StructureRoutesTemplate {
    pub route_name: String,
}

/// Template data for a resource's `mod.rs`.
#[derive(Template)]
#[template(path = "resource_mod.rs.txt")]
pub struct ResourceModTemplate {
    /// Whether the resource carries structure endpoint modules
    pub has_structure: bool,
}

/// Seed schema: canonical preamble plus the protected `User`/`Config` models.
#[derive(Template)]
#[template(path = "schema.prisma.txt")]
pub struct SchemaSeedTemplate;

/// Seed server bootstrap; its import/mount line shapes are the patcher's
/// anchors.
#[derive(Template)]
#[template(path = "main.rs.txt", escape = "none")]
pub struct BootstrapSeedTemplate;

#[derive(Template)]
#[template(path = "resources_mod.rs.txt", escape = "none")]
pub struct ResourcesModSeedTemplate;

#[derive(Template)]
#[template(path = "auth_handlers.rs.txt", escape = "none")]
pub struct AuthHandlersTemplate;

#[derive(Template)]
#[template(path = "auth_routes.rs.txt", escape = "none")]
pub struct AuthRoutesTemplate;

#[derive(Template)]
#[template(path = "config_handlers.rs.txt", escape = "none")]
pub struct ConfigHandlersTemplate;

#[derive(Template)]
#[template(path = "config_routes.rs.txt", escape = "none")]
pub struct ConfigRoutesTemplate;

#[derive(Template)]
#[template(path = "media_handlers.rs.txt", escape = "none")]
pub struct MediaHandlersTemplate;

#[derive(Template)]
#[template(path = "media_routes.rs.txt", escape = "none")]
pub struct MediaRoutesTemplate;

/// Seed `scripts/reset.sh`, a thin shell entry point over `panelforge reset`.
#[derive(Template)]
#[template(path = "reset.sh.txt", escape = "none")]
pub struct ResetScriptTemplate;

/// Render the persistence-model text for a descriptor.
///
/// A declared field whose physical name is `is_published` is dropped; the
/// system injects `isPublished` itself.
pub fn render_model(desc: &ResourceDescriptor) -> PanelResult<String> {
    let field_lines = desc
        .fields
        .iter()
        .filter(|f| f.physical_name() != "is_published")
        .map(|f| {
            let mut line = format!("  {} {}", f.physical_name(), f.ty.as_str());
            if !f.required {
                line.push('?');
            }
            line
        })
        .collect();
    let text = PrismaModelTemplate {
        model_name: desc.model_name(),
        field_lines,
        collection: desc.collection(),
    }
    .render()?;
    Ok(text.trim_end().to_string())
}

/// Render the companion structure-model text.
pub fn render_structure_model(desc: &ResourceDescriptor) -> PanelResult<String> {
    render_structure_model_named(&desc.name)
}

/// Render a structure-model text from a bare resource name (also used when
/// the model is re-synthesized from a saved structure).
pub fn render_structure_model_named(resource: &str) -> PanelResult<String> {
    let text = StructureModelTemplate {
        model_name: format!("{}Structure", naming::capitalize_first(resource)),
        collection: naming::structure_collection_name(resource),
    }
    .render()?;
    Ok(text.trim_end().to_string())
}

/// Render the handler module for a descriptor's resolved shape.
pub fn render_handlers(desc: &ResourceDescriptor) -> PanelResult<String> {
    let text = match desc.shape {
        ResourceShape::Collection => CollectionHandlersTemplate {
            model_name: desc.model_name(),
            route_name: desc.route_name(),
            collection: desc.collection(),
        }
        .render()?,
        ResourceShape::CollectionBulk => BulkHandlersTemplate {
            model_name: desc.model_name(),
            route_name: desc.route_name(),
            collection: desc.collection(),
        }
        .render()?,
        ResourceShape::Singleton => {
            let (field_key, physical_field) = desc.singleton_payload_field();
            SingletonHandlersTemplate {
                model_name: desc.model_name(),
                route_name: desc.route_name(),
                collection: desc.collection(),
                field_key,
                physical_field,
            }
            .render()?
        }
    };
    Ok(text)
}

/// Render the route-table module for a descriptor's resolved shape.
pub fn render_routes(desc: &ResourceDescriptor) -> PanelResult<String> {
    let route_name = desc.route_name();
    let text = match desc.shape {
        ResourceShape::Collection => CollectionRoutesTemplate { route_name }.render()?,
        ResourceShape::CollectionBulk => BulkRoutesTemplate { route_name }.render()?,
        ResourceShape::Singleton => SingletonRoutesTemplate { route_name }.render()?,
    };
    Ok(text)
}

pub fn render_structure_handlers(desc: &ResourceDescriptor) -> PanelResult<String> {
    Ok(StructureHandlersTemplate {
        model_name: format!("{}Structure", desc.model_name()),
        route_name: desc.route_name(),
        collection: naming::structure_collection_name(&desc.name),
        resource_name: desc.route_name(),
    }
    .render()?)
}

pub fn render_structure_routes(desc: &ResourceDescriptor) -> PanelResult<String> {
    Ok(StructureRoutesTemplate {
        route_name: desc.route_name(),
    }
    .render()?)
}

pub fn render_resource_mod(has_structure: bool) -> PanelResult<String> {
    Ok(ResourceModTemplate { has_structure }.render()?)
}
