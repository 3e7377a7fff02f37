//! # Resource Runtime
//!
//! Everything a handler needs at request time, bundled into one
//! [`ResourceContext`]:
//!
//! - [`AccessStrategy`] - typed-or-raw document access, resolved per model
//!   from the client ledger
//! - [`StructureAccessor`] - the field-layout singleton of a resource
//! - [`ModelRegistry`] - the parsed ledger behind the typed/raw decision
//! - [`LiveResource`] - identity of each generated resource mounted on the
//!   running server, plus the mount surface handlers use to add more
//! - model re-synthesis: saving a structure layout rewrites the resource's
//!   persistence model and pushes the schema to the live database
//!
//! The context is cheap to share: one instance is built at server startup
//! and handed to every dispatched handler by reference.

mod access;
mod live;
mod registry;
mod structure;

pub use access::{sanitize_create_data, AccessPath, AccessStrategy};
pub use live::{discover_resources, resource_table, structure_table, LiveResource};
pub use registry::ModelRegistry;
pub use structure::StructureAccessor;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::info;

use crate::config::ProjectPaths;
use crate::descriptor::{fields_from_structure, ResourceDescriptor, ResourceShape};
use crate::errors::PanelResult;
use crate::generator::templates;
use crate::schema;
use crate::server::RouteMounter;
use crate::store::DocumentStore;
use crate::sync::SyncEngine;

pub struct ResourceContext {
    store: Arc<dyn DocumentStore>,
    registry: Arc<ModelRegistry>,
    project: ProjectPaths,
    sync: Arc<SyncEngine>,
    live: RwLock<HashMap<String, LiveResource>>,
    mounter: OnceCell<RouteMounter>,
}

impl ResourceContext {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<ModelRegistry>,
        project: ProjectPaths,
        sync: Arc<SyncEngine>,
    ) -> Self {
        Self {
            store,
            registry,
            project,
            sync,
            live: RwLock::new(HashMap::new()),
            mounter: OnceCell::new(),
        }
    }

    /// Build a context for a managed project: the registry loads the
    /// project's ledger and the sync engine runs in its root.
    pub fn for_project(project: ProjectPaths, store: Arc<dyn DocumentStore>) -> Self {
        let registry = Arc::new(ModelRegistry::load(project.ledger_file()));
        let sync = Arc::new(SyncEngine::new(project.clone(), Arc::clone(&registry)));
        Self::new(store, registry, project, sync)
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn project(&self) -> &ProjectPaths {
        &self.project
    }

    pub fn sync(&self) -> &Arc<SyncEngine> {
        &self.sync
    }

    /// Access strategy for one model/collection pair, resolved against the
    /// ledger at call time so a fresh regeneration takes effect immediately.
    pub fn accessor(&self, model: &str, collection: &str) -> AccessStrategy {
        let path = if self.registry.is_typed(model) {
            AccessPath::Typed
        } else {
            AccessPath::Raw
        };
        AccessStrategy::new(Arc::clone(&self.store), collection, path)
    }

    pub fn structure(&self, _model: &str, collection: &str) -> StructureAccessor {
        StructureAccessor::new(Arc::clone(&self.store), collection)
    }

    /// Attach the server's mount surface. Called once at assembly; a second
    /// attach (e.g. a rebuilt server sharing the context) is ignored.
    pub fn attach_mounter(&self, mounter: RouteMounter) {
        let _ = self.mounter.set(mounter);
    }

    pub fn mounter(&self) -> Option<&RouteMounter> {
        self.mounter.get()
    }

    /// Register a generated resource and mount its route tables. Metadata
    /// goes in first so a request racing the mount still resolves its
    /// identity. Without an attached mounter only the metadata is kept.
    pub fn mount_live(&self, res: &LiveResource) {
        self.live
            .write()
            .unwrap()
            .insert(res.slug.clone(), res.clone());
        if let Some(mounter) = self.mounter.get() {
            mounter.mount(&format!("/api/{}", res.slug), resource_table(res.shape));
            mounter.mount(&format!("/api/{}-structure", res.slug), structure_table());
            info!(slug = %res.slug, model = %res.model, shape = ?res.shape, "resource live");
        }
    }

    /// Unmount a generated resource's routes and drop its metadata.
    pub fn unmount_live(&self, slug: &str) {
        if let Some(mounter) = self.mounter.get() {
            mounter.unmount(&format!("/api/{slug}"));
            mounter.unmount(&format!("/api/{slug}-structure"));
        }
        self.live.write().unwrap().remove(slug);
    }

    pub fn live_resource(&self, slug: &str) -> Option<LiveResource> {
        self.live.read().unwrap().get(slug).cloned()
    }

    pub fn live_slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.live.read().unwrap().keys().cloned().collect();
        slugs.sort();
        slugs
    }

    /// Re-synthesize a resource's persistence model from its saved structure
    /// layout. Returns whether the schema document changed; a change is
    /// pushed to the live database before this returns.
    ///
    /// A layout that yields no model fields leaves the schema alone.
    pub fn sync_model_from_structure(
        &self,
        resource: &str,
        fields: &[Value],
    ) -> PanelResult<bool> {
        let model_fields = fields_from_structure(fields);
        if model_fields.is_empty() {
            return Ok(false);
        }

        let desc = ResourceDescriptor {
            name: resource.to_string(),
            fields: model_fields,
            shape: ResourceShape::Collection,
            menu_item: None,
            structure_fields: None,
        };
        let model_text = templates::render_model(&desc)?;
        let changed = schema::merge_model_file(&self.project.schema_file(), &model_text)?;

        if changed {
            info!(resource, "structure changed the schema, syncing database");
            self.sync.push_and_generate()?;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::descriptor::{FieldSpec, FieldType};
    use crate::schema::{SchemaDoc, CANONICAL_PREAMBLE};
    use crate::server::{AdminServer, HeaderVec};
    use crate::store::MemoryStore;
    use http::Method;
    use serde_json::json;

    fn project_with_schema(dir: &tempfile::TempDir) -> ProjectPaths {
        let project = ProjectPaths::new(dir.path());
        std::fs::create_dir_all(project.schema_file().parent().unwrap()).unwrap();
        std::fs::write(project.schema_file(), CANONICAL_PREAMBLE).unwrap();
        project
    }

    fn context(project: ProjectPaths) -> ResourceContext {
        ResourceContext::for_project(project, Arc::new(MemoryStore::new()))
    }

    fn cases_resource() -> LiveResource {
        LiveResource::from_descriptor(&ResourceDescriptor {
            name: "Cases".to_string(),
            fields: vec![FieldSpec {
                name: "title".to_string(),
                ty: FieldType::String,
                required: true,
            }],
            shape: ResourceShape::Collection,
            menu_item: None,
            structure_fields: None,
        })
    }

    #[test]
    fn mount_live_without_a_server_keeps_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(ProjectPaths::new(dir.path()));

        ctx.mount_live(&cases_resource());
        assert_eq!(ctx.live_slugs(), ["cases"]);
        let res = ctx.live_resource("cases").unwrap();
        assert_eq!(res.model, "Cases");
        assert_eq!(res.collection, "cases");

        ctx.unmount_live("cases");
        assert!(ctx.live_slugs().is_empty());
        assert!(ctx.live_resource("cases").is_none());
    }

    #[test]
    fn mount_live_serves_both_prefixes_on_the_server() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(context(ProjectPaths::new(dir.path())));
        let server = AdminServer::with_context(Arc::clone(&ctx), ServerConfig::default());

        ctx.mount_live(&cases_resource());

        let router = server.router();
        let hit = router
            .read()
            .unwrap()
            .route(&Method::GET, "/api/cases")
            .unwrap();
        let resp = server
            .dispatcher()
            .dispatch(hit, None, HeaderVec::new())
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(
            resp.body,
            json!({ "cases": [], "total": 0, "page": 1, "limit": 10, "totalPages": 0 })
        );

        assert!(router
            .read()
            .unwrap()
            .route(&Method::PUT, "/api/cases-structure")
            .is_some());

        ctx.unmount_live("cases");
        assert!(router
            .read()
            .unwrap()
            .route(&Method::GET, "/api/cases")
            .is_none());
        assert!(router
            .read()
            .unwrap()
            .route(&Method::GET, "/api/cases-structure")
            .is_none());
    }

    #[test]
    fn accessor_path_follows_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_with_schema(&dir);
        std::fs::create_dir_all(project.ledger_file().parent().unwrap()).unwrap();
        std::fs::write(
            project.ledger_file(),
            format!("{CANONICAL_PREAMBLE}\nmodel Cases {{\n  id String @id\n}}\n"),
        )
        .unwrap();

        let ctx = context(project);
        assert_eq!(ctx.accessor("Cases", "cases").path(), AccessPath::Typed);
        assert_eq!(ctx.accessor("Banners", "banners").path(), AccessPath::Raw);
    }

    #[test]
    fn empty_structure_layout_never_touches_the_schema() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_with_schema(&dir);
        let schema_before = std::fs::read_to_string(project.schema_file()).unwrap();

        let ctx = context(project.clone());
        let changed = ctx.sync_model_from_structure("cases", &[]).unwrap();
        assert!(!changed);

        // Blocks-only layouts synthesize nothing either.
        let blocks_only = vec![json!({ "type": "additionalBlocks", "order": 0 })];
        assert!(!ctx.sync_model_from_structure("cases", &blocks_only).unwrap());
        assert_eq!(
            std::fs::read_to_string(project.schema_file()).unwrap(),
            schema_before
        );
    }

    #[test]
    fn unchanged_model_skips_the_database_sync() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_with_schema(&dir);
        let ctx = context(project.clone());

        let layout = vec![json!({ "label": "Заголовок", "type": "text", "order": 0 })];

        // Seed the schema with exactly the model this layout synthesizes, so
        // the merge is a no-op and no subprocess runs.
        let desc = ResourceDescriptor {
            name: "cases".to_string(),
            fields: fields_from_structure(&layout),
            shape: ResourceShape::Collection,
            menu_item: None,
            structure_fields: None,
        };
        let model_text = templates::render_model(&desc).unwrap();
        schema::merge_model_file(&project.schema_file(), &model_text).unwrap();

        let changed = ctx.sync_model_from_structure("cases", &layout).unwrap();
        assert!(!changed);

        let doc = SchemaDoc::parse(std::fs::read_to_string(project.schema_file()).unwrap());
        assert!(doc.model_body("Cases").unwrap().contains("zagolovok String?"));
    }
}
