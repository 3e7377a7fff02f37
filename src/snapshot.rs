//! Whole-state snapshot of a managed project.
//!
//! Export serializes every generated resource directory, the schema and
//! bootstrap text, and the contents of every database collection into one
//! JSON document. Import validates the payload, backs up the protected
//! system collections, wipes generated state through the reset script, then
//! replays the payload's files and collections.
//!
//! Import is deliberately not atomic: a crash mid-sequence leaves a
//! partially reset project, and the operator retries from a known-good
//! snapshot. What it does guarantee is that `users` and `config` survive:
//! they are backed up before the wipe and restored last, from the payload
//! when it carries documents for them, otherwise from the backup.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::info;

use crate::config::{ProjectPaths, PROTECTED_COLLECTIONS, PROTECTED_MODELS};
use crate::errors::{PanelError, PanelResult};
use crate::schema::SchemaDoc;
use crate::store::{drop_collection_if_exists, DocumentStore};
use crate::sync::capture;

/// Overrides the reset script invoked during import.
pub const RESET_SCRIPT_ENV: &str = "PANELFORGE_RESET_SCRIPT";

const SNAPSHOT_VERSION: u64 = 1;

pub struct SnapshotEngine {
    project: ProjectPaths,
    store: Arc<dyn DocumentStore>,
}

/// Borrowed view of a structurally valid snapshot payload.
struct SnapshotParts<'a> {
    schema: &'a str,
    bootstrap: &'a str,
    dirs: &'a [Value],
    collections: &'a [Value],
}

impl SnapshotEngine {
    pub fn new(project: ProjectPaths, store: Arc<dyn DocumentStore>) -> Self {
        Self { project, store }
    }

    /// Serialize generated files and all collection contents.
    pub fn export(&self) -> PanelResult<Value> {
        let mut generated_dirs = Vec::new();
        for slug in self.project.generated_slugs()? {
            let files = read_dir_tree(&self.project.resource_dir(&slug))?;
            generated_dirs.push(json!({ "name": slug, "files": files }));
        }

        let schema = fs::read_to_string(self.project.schema_file())?;
        let bootstrap = fs::read_to_string(self.project.bootstrap_file())?;

        let mut collections = Vec::new();
        for name in self.collection_names()? {
            let documents = self.collection_documents(&name)?;
            collections.push(json!({ "name": name, "documents": documents }));
        }

        info!(
            dirs = generated_dirs.len(),
            collections = collections.len(),
            "exported snapshot"
        );
        Ok(json!({
            "version": SNAPSHOT_VERSION,
            "exportedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "snapshot": {
                "files": {
                    "prismaSchema": schema,
                    "serverMain": bootstrap,
                    "generatedDirs": generated_dirs,
                },
                "database": { "collections": collections },
            },
        }))
    }

    /// Replace all generated state with the payload's. `payload` is the
    /// `snapshot` member of an exported document.
    pub fn import(&self, payload: &Value) -> PanelResult<()> {
        let parts = validate_payload(payload)?;

        // Backup before any destructive step.
        let existing: HashSet<String> = self.collection_names()?.into_iter().collect();
        let mut backup: Vec<(String, Vec<Value>)> = Vec::new();
        for name in PROTECTED_COLLECTIONS {
            if existing.contains(name) {
                backup.push((name.to_string(), self.collection_documents(name)?));
            }
        }

        self.run_reset_script()?;

        // The script already wipes generated dirs; clear any leftovers from
        // partial earlier runs.
        for slug in self.project.generated_slugs()? {
            fs::remove_dir_all(self.project.resource_dir(&slug))?;
        }

        write_text(&self.project.schema_file(), parts.schema)?;
        write_text(&self.project.bootstrap_file(), parts.bootstrap)?;
        for dir in parts.dirs {
            self.write_generated_dir(dir)?;
        }

        for collection in parts.collections {
            let Some(name) = collection.get("name").and_then(Value::as_str) else {
                continue;
            };
            if name.is_empty() || PROTECTED_COLLECTIONS.contains(&name) {
                continue;
            }
            let documents = collection
                .get("documents")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            self.restore_collection(name, &documents)?;
        }

        // System collections last: payload documents win when present, the
        // pre-reset backup otherwise, so an admin account always survives.
        for name in PROTECTED_COLLECTIONS {
            let from_payload = parts
                .collections
                .iter()
                .find(|c| c.get("name").and_then(Value::as_str) == Some(name))
                .and_then(|c| c.get("documents"))
                .and_then(Value::as_array)
                .filter(|docs| !docs.is_empty());
            match from_payload {
                Some(docs) => self.restore_collection(name, docs)?,
                None => {
                    if let Some((_, docs)) = backup.iter().find(|(n, _)| n == name) {
                        self.restore_collection(name, docs)?;
                    }
                }
            }
        }

        info!("snapshot import finished");
        Ok(())
    }

    fn collection_names(&self) -> PanelResult<Vec<String>> {
        let reply = self.store.run_command(json!({ "listCollections": 1 }))?;
        let batch = reply
            .pointer("/cursor/firstBatch")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(batch
            .iter()
            .filter_map(|c| c.get("name").and_then(Value::as_str))
            .filter(|name| !name.is_empty() && !name.starts_with("system."))
            .map(str::to_string)
            .collect())
    }

    fn collection_documents(&self, name: &str) -> PanelResult<Vec<Value>> {
        let reply = self
            .store
            .run_command(json!({ "find": name, "filter": {} }))?;
        Ok(reply
            .pointer("/cursor/firstBatch")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    fn restore_collection(&self, name: &str, documents: &[Value]) -> PanelResult<()> {
        drop_collection_if_exists(self.store.as_ref(), name)?;
        if documents.is_empty() {
            return Ok(());
        }
        self.store
            .run_command(json!({ "insert": name, "documents": documents }))?;
        Ok(())
    }

    fn run_reset_script(&self) -> PanelResult<()> {
        let script = std::env::var(RESET_SCRIPT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.project.reset_script());
        if !script.exists() {
            return Err(PanelError::Generation(format!(
                "reset script not found: {}",
                script.display()
            )));
        }
        info!(script = %script.display(), "running reset script");
        let output = Command::new(&script)
            .arg("--apply")
            .current_dir(self.project.root())
            .output()
            .map_err(|err| PanelError::Generation(format!("failed to run reset script: {err}")))?;
        if !output.status.success() {
            return Err(PanelError::Generation(format!(
                "reset script failed: {}",
                capture(&output)
            )));
        }
        Ok(())
    }

    fn write_generated_dir(&self, dir: &Value) -> PanelResult<()> {
        let Some(name) = dir.get("name").and_then(Value::as_str) else {
            return Ok(());
        };
        let Some(files) = dir.get("files").and_then(Value::as_array) else {
            return Ok(());
        };
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(PanelError::validation(format!(
                "Invalid generated dir name: {name}"
            )));
        }

        let base = self.project.resource_dir(name);
        fs::create_dir_all(&base)?;
        for file in files {
            let rel = file
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or("")
                .replace('\\', "/");
            if rel.is_empty() || rel.starts_with('/') || rel.split('/').any(|seg| seg == "..") {
                return Err(PanelError::validation(format!(
                    "Invalid snapshot file path: {rel}"
                )));
            }
            let content = file.get("content").and_then(Value::as_str).unwrap_or("");
            write_text(&base.join(&rel), content)?;
        }
        Ok(())
    }
}

fn validate_payload(payload: &Value) -> PanelResult<SnapshotParts<'_>> {
    if !payload.is_object() {
        return Err(PanelError::validation("snapshot is required"));
    }

    let files = payload.get("files");
    let schema = files
        .and_then(|f| f.get("prismaSchema"))
        .and_then(Value::as_str);
    let bootstrap = files
        .and_then(|f| f.get("serverMain"))
        .and_then(Value::as_str);
    let dirs = files
        .and_then(|f| f.get("generatedDirs"))
        .and_then(Value::as_array);
    let (Some(schema), Some(bootstrap), Some(dirs)) = (schema, bootstrap, dirs) else {
        return Err(PanelError::validation("Invalid snapshot.files format"));
    };

    let collections = payload
        .pointer("/database/collections")
        .and_then(Value::as_array)
        .ok_or_else(|| PanelError::validation("Invalid snapshot.database.collections format"))?;

    let doc = SchemaDoc::parse(schema);
    if PROTECTED_MODELS.iter().any(|m| !doc.contains_model(m)) {
        return Err(PanelError::validation(
            "Snapshot schema must contain User and Config models",
        ));
    }

    let names: HashSet<&str> = collections
        .iter()
        .filter_map(|c| c.get("name").and_then(Value::as_str))
        .collect();
    for name in PROTECTED_COLLECTIONS {
        if !names.contains(name) {
            return Err(PanelError::Validation(vec![format!(
                "Snapshot does not contain required system collection: {name}"
            )]));
        }
    }

    Ok(SnapshotParts {
        schema,
        bootstrap,
        dirs,
        collections,
    })
}

/// Files under `base` as `{path, content}` entries with forward-slash
/// relative paths, sorted for stable exports.
fn read_dir_tree(base: &Path) -> PanelResult<Vec<Value>> {
    let mut files = Vec::new();
    collect_files(base, base, &mut files)?;
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files
        .into_iter()
        .map(|(path, content)| json!({ "path": path, "content": content }))
        .collect())
}

fn collect_files(base: &Path, dir: &Path, out: &mut Vec<(String, String)>) -> PanelResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(base, &path, out)?;
            continue;
        }
        let rel = path
            .strip_prefix(base)
            .map_err(|_| PanelError::Io(format!("file escaped snapshot base: {}", path.display())))?
            .to_string_lossy()
            .replace('\\', "/");
        out.push((rel, fs::read_to_string(&path)?));
    }
    Ok(())
}

fn write_text(path: &Path, content: &str) -> PanelResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::sync::test_support::env_lock;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    const SCHEMA: &str = "generator client {\n  provider = \"prisma-client-js\"\n}\n\nmodel User {\n  id String @id\n}\n\nmodel Config {\n  id String @id\n}\n\nmodel Cases {\n  id String @id\n}\n";

    fn seed_project(dir: &Path) -> ProjectPaths {
        let project = ProjectPaths::new(dir);
        write_text(&project.schema_file(), SCHEMA).unwrap();
        write_text(&project.bootstrap_file(), "mod resources;\n").unwrap();
        for core in ProjectPaths::CORE_MODULES {
            write_text(&project.resource_dir(core).join("mod.rs"), "pub mod handlers;\n").unwrap();
        }
        project
    }

    fn seed_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .run_command(json!({
                "insert": "users",
                "documents": [{ "email": "admin@site.test", "role": "admin" }],
            }))
            .unwrap();
        store
            .run_command(json!({
                "insert": "config",
                "documents": [{ "site_name": "Atlas" }],
            }))
            .unwrap();
        store
    }

    fn docs(store: &MemoryStore, coll: &str) -> Vec<Value> {
        store
            .run_command(json!({ "find": coll, "filter": {} }))
            .unwrap()
            .pointer("/cursor/firstBatch")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("reset-stub.sh");
        fs::write(&path, body).unwrap();
        #[cfg(unix)]
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn with_reset_script<T>(script: &Path, f: impl FnOnce() -> T) -> T {
        let _guard = env_lock().lock().unwrap();
        let previous = std::env::var(RESET_SCRIPT_ENV).ok();
        std::env::set_var(RESET_SCRIPT_ENV, script);
        let result = f();
        match previous {
            Some(value) => std::env::set_var(RESET_SCRIPT_ENV, value),
            None => std::env::remove_var(RESET_SCRIPT_ENV),
        }
        result
    }

    fn import_payload() -> Value {
        json!({
            "files": {
                "prismaSchema": "model User {\n  id String @id\n}\n\nmodel Config {\n  id String @id\n}\n\nmodel Banners {\n  id String @id\n}\n",
                "serverMain": "mod resources;\n// imported\n",
                "generatedDirs": [{
                    "name": "banners",
                    "files": [
                        { "path": "mod.rs", "content": "pub mod handlers;\n" },
                        { "path": "sub/routes.rs", "content": "// routes\n" },
                    ],
                }],
            },
            "database": {
                "collections": [
                    { "name": "banners", "documents": [{ "_id": { "$oid": "b1b1b1b1b1b1b1b1b1b1b1b1" }, "title": "Sale" }] },
                    { "name": "users", "documents": [] },
                    { "name": "config", "documents": [{ "site_name": "Imported" }] },
                ],
            },
        })
    }

    #[test]
    fn export_collects_generated_dirs_and_collections() {
        let dir = tempfile::tempdir().unwrap();
        let project = seed_project(dir.path());
        write_text(
            &project.resource_dir("cases").join("mod.rs"),
            "pub mod handlers;\n",
        )
        .unwrap();
        write_text(
            &project.resource_dir("cases").join("sub/routes.rs"),
            "// routes\n",
        )
        .unwrap();

        let store = seed_store();
        store
            .run_command(json!({ "insert": "system.views", "documents": [{ "v": 1 }] }))
            .unwrap();
        let engine = SnapshotEngine::new(project, store);

        let exported = engine.export().unwrap();
        assert_eq!(exported["version"], 1);
        assert!(exported["exportedAt"].as_str().unwrap().ends_with('Z'));

        let files = &exported["snapshot"]["files"];
        assert_eq!(files["prismaSchema"], SCHEMA);
        let dirs = files["generatedDirs"].as_array().unwrap();
        assert_eq!(dirs.len(), 1, "core dirs must not be exported");
        assert_eq!(dirs[0]["name"], "cases");
        assert_eq!(
            dirs[0]["files"],
            json!([
                { "path": "mod.rs", "content": "pub mod handlers;\n" },
                { "path": "sub/routes.rs", "content": "// routes\n" },
            ])
        );

        let collections = exported["snapshot"]["database"]["collections"]
            .as_array()
            .unwrap();
        let names: Vec<&str> = collections
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"users") && names.contains(&"config"));
        assert!(!names.iter().any(|n| n.starts_with("system.")));
    }

    #[test]
    fn import_validates_before_touching_anything() {
        let dir = tempfile::tempdir().unwrap();
        let project = seed_project(dir.path());
        let store = seed_store();
        let engine = SnapshotEngine::new(project.clone(), store.clone());

        let cases = [
            (json!(null), "snapshot is required"),
            (json!({ "database": { "collections": [] } }), "Invalid snapshot.files format"),
            (
                json!({
                    "files": { "prismaSchema": SCHEMA, "serverMain": "", "generatedDirs": [] },
                    "database": {},
                }),
                "Invalid snapshot.database.collections format",
            ),
            (
                json!({
                    "files": { "prismaSchema": "model User {\n}\n", "serverMain": "", "generatedDirs": [] },
                    "database": { "collections": [{ "name": "users" }, { "name": "config" }] },
                }),
                "Snapshot schema must contain User and Config models",
            ),
            (
                json!({
                    "files": { "prismaSchema": SCHEMA, "serverMain": "", "generatedDirs": [] },
                    "database": { "collections": [{ "name": "config" }] },
                }),
                "Snapshot does not contain required system collection: users",
            ),
        ];
        for (payload, message) in cases {
            let err = engine.import(&payload).unwrap_err();
            assert_eq!(err.message(), message);
        }

        // Nothing ran, nothing changed.
        assert_eq!(fs::read_to_string(project.schema_file()).unwrap(), SCHEMA);
        assert_eq!(docs(&store, "users").len(), 1);
    }

    #[test]
    fn import_replays_files_and_collections_with_system_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let project = seed_project(dir.path());
        write_text(
            &project.resource_dir("cases").join("mod.rs"),
            "pub mod handlers;\n",
        )
        .unwrap();
        let store = seed_store();
        store
            .run_command(json!({ "insert": "cases", "documents": [{ "title": "Old" }] }))
            .unwrap();
        let engine = SnapshotEngine::new(project.clone(), store.clone());

        let script = write_script(dir.path(), "#!/bin/sh\ntouch reset-ran\nexit 0\n");
        let result = with_reset_script(&script, || engine.import(&import_payload()));
        result.unwrap();

        // Script ran from the project root.
        assert!(project.root().join("reset-ran").exists());

        // Files replaced verbatim; leftover generated dir cleared, core kept.
        let schema = fs::read_to_string(project.schema_file()).unwrap();
        assert!(schema.contains("model Banners {"));
        assert!(!schema.contains("model Cases {"));
        assert_eq!(
            fs::read_to_string(project.bootstrap_file()).unwrap(),
            "mod resources;\n// imported\n"
        );
        assert!(!project.resource_dir("cases").exists());
        assert!(project.resource_dir("users").exists());
        assert_eq!(
            fs::read_to_string(project.resource_dir("banners").join("sub/routes.rs")).unwrap(),
            "// routes\n"
        );

        // Collections: payload wins where it has documents, backup otherwise.
        let banners = docs(&store, "banners");
        assert_eq!(banners.len(), 1);
        assert_eq!(banners[0]["title"], "Sale");
        let users = docs(&store, "users");
        assert_eq!(users.len(), 1, "empty payload users falls back to backup");
        assert_eq!(users[0]["email"], "admin@site.test");
        let config = docs(&store, "config");
        assert_eq!(config[0]["site_name"], "Imported");
    }

    #[test]
    fn import_rejects_unsafe_generated_paths() {
        let dir = tempfile::tempdir().unwrap();
        let project = seed_project(dir.path());
        let engine = SnapshotEngine::new(project, seed_store());
        let script = write_script(dir.path(), "#!/bin/sh\nexit 0\n");

        let mut bad_dir = import_payload();
        bad_dir["files"]["generatedDirs"][0]["name"] = json!("../evil");
        let err = with_reset_script(&script, || engine.import(&bad_dir)).unwrap_err();
        assert_eq!(err.message(), "Invalid generated dir name: ../evil");

        let mut bad_path = import_payload();
        bad_path["files"]["generatedDirs"][0]["files"][0]["path"] = json!("../../escape.rs");
        let err = with_reset_script(&script, || engine.import(&bad_path)).unwrap_err();
        assert_eq!(err.message(), "Invalid snapshot file path: ../../escape.rs");
    }

    #[test]
    fn reset_script_failure_aborts_import() {
        let dir = tempfile::tempdir().unwrap();
        let project = seed_project(dir.path());
        let store = seed_store();
        let engine = SnapshotEngine::new(project.clone(), store.clone());
        let script = write_script(dir.path(), "#!/bin/sh\necho 'wipe failed' >&2\nexit 1\n");

        let err = with_reset_script(&script, || engine.import(&import_payload())).unwrap_err();
        assert!(matches!(err, PanelError::Generation(_)));
        assert!(err.message().contains("wipe failed"));

        // Aborted before any write or restore.
        assert_eq!(fs::read_to_string(project.schema_file()).unwrap(), SCHEMA);
        assert_eq!(docs(&store, "users").len(), 1);
    }
}
