//! Cleanup of generated state, with a dry-run preview.
//!
//! Reset walks the four places generation leaves marks: resource
//! directories, bootstrap registration lines, schema model blocks, and
//! database collections. Preview reports what apply would remove and
//! touches nothing. The protected core set (`User`/`Config` models,
//! `users`/`config` collections, core module dirs) always survives.
//!
//! A store failure downgrades the collection phase to a warning so the
//! filesystem cleanup still completes, matching `scripts/reset.sh` being
//! runnable against a stopped database.

use std::fs;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::bootstrap;
use crate::config::{ProjectPaths, PROTECTED_COLLECTIONS, PROTECTED_MODELS};
use crate::errors::PanelResult;
use crate::schema::SchemaDoc;
use crate::store::{drop_collection_if_exists, DocumentStore};

/// What a reset removed, or would remove in preview.
#[derive(Debug, Default)]
pub struct ResetReport {
    pub applied: bool,
    pub generated_dirs: Vec<String>,
    pub bootstrap_changed: bool,
    pub removed_models: Vec<String>,
    /// Every collection the scan saw, protected ones included.
    pub collections: Vec<String>,
    pub dropped_collections: Vec<String>,
    /// Set when the collection scan or drop failed; file cleanup still ran.
    pub store_error: Option<String>,
}

pub struct ResetEngine {
    project: ProjectPaths,
    store: Arc<dyn DocumentStore>,
}

impl ResetEngine {
    pub fn new(project: ProjectPaths, store: Arc<dyn DocumentStore>) -> Self {
        Self { project, store }
    }

    pub fn preview(&self) -> PanelResult<ResetReport> {
        self.run(false)
    }

    pub fn apply(&self) -> PanelResult<ResetReport> {
        self.run(true)
    }

    fn run(&self, apply: bool) -> PanelResult<ResetReport> {
        let mut report = ResetReport {
            applied: apply,
            ..ResetReport::default()
        };

        report.generated_dirs = self.project.generated_slugs()?;
        if apply {
            for slug in &report.generated_dirs {
                fs::remove_dir_all(self.project.resource_dir(slug))?;
                info!(resource = %slug, "removed generated resource dir");
            }
        }

        report.bootstrap_changed = self.update_bootstrap(&report.generated_dirs, apply)?;
        report.removed_models = self.update_schema(apply)?;

        match self.process_collections(apply) {
            Ok((names, dropped)) => {
                report.collections = names;
                report.dropped_collections = dropped;
            }
            Err(err) => {
                warn!(error = %err, "collection cleanup failed, continuing");
                report.store_error = Some(err.message());
            }
        }

        Ok(report)
    }

    fn update_bootstrap(&self, slugs: &[String], apply: bool) -> PanelResult<bool> {
        let path = self.project.bootstrap_file();
        let text = fs::read_to_string(&path)?;
        let next = bootstrap::deregister_routes(&text, slugs);
        let changed = next != text;
        if changed && apply {
            fs::write(&path, next)?;
        }

        let mod_path = self.project.resources_mod_file();
        let mod_text = fs::read_to_string(&mod_path)?;
        let mod_next = bootstrap::remove_resource_modules(&mod_text, slugs);
        let mod_changed = mod_next != mod_text;
        if mod_changed && apply {
            fs::write(&mod_path, mod_next)?;
        }

        Ok(changed || mod_changed)
    }

    fn update_schema(&self, apply: bool) -> PanelResult<Vec<String>> {
        let path = self.project.schema_file();
        let text = fs::read_to_string(&path)?;
        let mut doc = SchemaDoc::parse(text);
        let removed = doc.remove_models_except(&PROTECTED_MODELS);
        if !removed.is_empty() && apply {
            fs::write(&path, doc.text())?;
            info!(models = ?removed, "removed generated schema models");
        }
        Ok(removed)
    }

    fn process_collections(&self, apply: bool) -> PanelResult<(Vec<String>, Vec<String>)> {
        let reply = self.store.run_command(json!({ "listCollections": 1 }))?;
        let names: Vec<String> = reply
            .pointer("/cursor/firstBatch")
            .and_then(Value::as_array)
            .map(|batch| {
                batch
                    .iter()
                    .filter_map(|c| c.get("name").and_then(Value::as_str))
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let doomed: Vec<String> = names
            .iter()
            .filter(|name| !PROTECTED_COLLECTIONS.contains(&name.as_str()))
            .cloned()
            .collect();
        if apply {
            for name in &doomed {
                drop_collection_if_exists(self.store.as_ref(), name)?;
            }
            if !doomed.is_empty() {
                info!(collections = ?doomed, "dropped generated collections");
            }
        }
        Ok((names, doomed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PanelError;
    use crate::store::MemoryStore;
    use std::path::Path;

    const SCHEMA: &str = "generator client {\n  provider = \"prisma-client-js\"\n}\n\nmodel User {\n  id String @id\n}\n\nmodel Config {\n  id String @id\n}\n\nmodel Cases {\n  id String @id\n}\n";

    const BOOTSTRAP: &str = "mod resources;\n\nuse resources::auth::routes as auth_routes;\nuse resources::cases::routes as cases_routes;\nuse resources::cases::structure_routes as cases_structure_routes;\n\nfn main() -> anyhow::Result<()> {\n    let server = panelforge::server::AdminServer::from_env()?;\n    server.mount(\"/api/auth\", auth_routes::table());\n    server.mount(\"/api/cases\", cases_routes::table());\n    server.mount(\"/api/cases-structure\", cases_structure_routes::table());\n    server.run()\n}\n";

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn seed_project(dir: &Path) -> ProjectPaths {
        let project = ProjectPaths::new(dir);
        write(&project.schema_file(), SCHEMA);
        write(&project.bootstrap_file(), BOOTSTRAP);
        write(
            &project.resources_mod_file(),
            "pub mod auth;\npub mod users;\npub mod config;\npub mod media;\npub mod cases;\n",
        );
        for name in ["auth", "users", "config", "media", "cases"] {
            write(&project.resource_dir(name).join("mod.rs"), "pub mod handlers;\n");
        }
        project
    }

    fn seed_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (coll, doc) in [
            ("users", json!({ "email": "admin@site.test" })),
            ("config", json!({ "site_name": "Atlas" })),
            ("cases", json!({ "title": "Old" })),
            ("dynamic_pages", json!({ "slug": "cases" })),
        ] {
            store
                .run_command(json!({ "insert": coll, "documents": [doc] }))
                .unwrap();
        }
        store
    }

    fn collection_names(store: &MemoryStore) -> Vec<String> {
        store
            .run_command(json!({ "listCollections": 1 }))
            .unwrap()
            .pointer("/cursor/firstBatch")
            .and_then(Value::as_array)
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn preview_reports_everything_and_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let project = seed_project(dir.path());
        let store = seed_store();
        let engine = ResetEngine::new(project.clone(), store.clone());

        let report = engine.preview().unwrap();
        assert!(!report.applied);
        assert_eq!(report.generated_dirs, vec!["cases".to_string()]);
        assert!(report.bootstrap_changed);
        assert_eq!(report.removed_models, vec!["Cases".to_string()]);
        assert_eq!(
            report.dropped_collections,
            vec!["cases".to_string(), "dynamic_pages".to_string()]
        );
        assert!(report.store_error.is_none());

        assert!(project.resource_dir("cases").exists());
        assert_eq!(fs::read_to_string(project.schema_file()).unwrap(), SCHEMA);
        assert_eq!(
            fs::read_to_string(project.bootstrap_file()).unwrap(),
            BOOTSTRAP
        );
        assert_eq!(collection_names(&store).len(), 4);
    }

    #[test]
    fn apply_removes_generated_state_and_keeps_core() {
        let dir = tempfile::tempdir().unwrap();
        let project = seed_project(dir.path());
        let store = seed_store();
        let engine = ResetEngine::new(project.clone(), store.clone());

        let report = engine.apply().unwrap();
        assert!(report.applied);

        assert!(!project.resource_dir("cases").exists());
        assert!(project.resource_dir("auth").exists());

        let bootstrap = fs::read_to_string(project.bootstrap_file()).unwrap();
        assert!(!bootstrap.contains("resources::cases::"));
        assert!(!bootstrap.contains("\"/api/cases\""));
        assert!(!bootstrap.contains("\"/api/cases-structure\""));
        assert!(bootstrap.contains("resources::auth::"));

        let mods = fs::read_to_string(project.resources_mod_file()).unwrap();
        assert!(!mods.contains("pub mod cases;"));
        assert!(mods.contains("pub mod media;"));

        let schema = fs::read_to_string(project.schema_file()).unwrap();
        assert!(!schema.contains("model Cases {"));
        assert!(schema.contains("model User {"));
        assert!(schema.contains("model Config {"));

        let names = collection_names(&store);
        assert_eq!(names, vec!["config".to_string(), "users".to_string()]);
    }

    #[test]
    fn second_apply_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let project = seed_project(dir.path());
        let store = seed_store();
        let engine = ResetEngine::new(project.clone(), store.clone());

        engine.apply().unwrap();
        let report = engine.apply().unwrap();
        assert!(report.generated_dirs.is_empty());
        assert!(!report.bootstrap_changed);
        assert!(report.removed_models.is_empty());
        assert!(report.dropped_collections.is_empty());
    }

    #[test]
    fn store_failure_is_soft_and_files_still_reset() {
        struct DownStore;
        impl DocumentStore for DownStore {
            fn run_command(&self, _command: Value) -> PanelResult<Value> {
                Err(PanelError::Store("connection refused".to_string()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let project = seed_project(dir.path());
        let engine = ResetEngine::new(project.clone(), Arc::new(DownStore));

        let report = engine.apply().unwrap();
        assert_eq!(report.store_error.as_deref(), Some("connection refused"));
        assert!(!project.resource_dir("cases").exists());
        assert!(!fs::read_to_string(project.schema_file())
            .unwrap()
            .contains("model Cases {"));
    }
}
