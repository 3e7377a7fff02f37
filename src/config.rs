//! Managed project layout and server settings.
//!
//! Every component that touches the scaffolded project (generator, reset,
//! snapshot, registry) resolves files through [`ProjectPaths`] so the
//! filesystem contract lives in one place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Model names that survive a reset and must be present in any imported
/// schema text.
pub const PROTECTED_MODELS: [&str; 2] = ["User", "Config"];

/// Collections that survive a reset and are restored last on import.
pub const PROTECTED_COLLECTIONS: [&str; 2] = ["users", "config"];

/// Filesystem layout of a managed admin project.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    /// Module directories seeded by `init`; never exported, reset or
    /// deregistered.
    pub const CORE_MODULES: [&'static str; 4] = ["auth", "users", "config", "media"];

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Schema document mutated by the merge engine.
    pub fn schema_file(&self) -> PathBuf {
        self.root.join("prisma").join("schema.prisma")
    }

    /// Client ledger: a copy of the schema refreshed after each successful
    /// client regeneration. The registry parses it to decide typed vs raw
    /// access per model.
    pub fn ledger_file(&self) -> PathBuf {
        self.root.join("client").join("schema.prisma")
    }

    /// Server bootstrap source maintained by the registration patcher.
    pub fn bootstrap_file(&self) -> PathBuf {
        self.root.join("server").join("main.rs")
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.root.join("server").join("resources")
    }

    pub fn resources_mod_file(&self) -> PathBuf {
        self.resources_dir().join("mod.rs")
    }

    pub fn resource_dir(&self, slug: &str) -> PathBuf {
        self.resources_dir().join(slug)
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("scripts")
    }

    pub fn reset_script(&self) -> PathBuf {
        self.scripts_dir().join("reset.sh")
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.root.join("generated")
    }

    pub fn is_core_module(name: &str) -> bool {
        Self::CORE_MODULES.iter().any(|m| *m == name)
    }

    /// Slugs of generated resources: resource directories minus the core
    /// seeded ones, sorted for stable output.
    pub fn generated_slugs(&self) -> io::Result<Vec<String>> {
        let dir = self.resources_dir();
        let mut slugs = Vec::new();
        if !dir.exists() {
            return Ok(slugs);
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !Self::is_core_module(&name) {
                slugs.push(name);
            }
        }
        slugs.sort();
        Ok(slugs)
    }
}

/// Settings for the admin server, assembled by the CLI from flags and
/// `PANELFORGE_*` environment fallbacks.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub database_url: String,
    pub admin_token: Option<String>,
    pub watch: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            database_url: "mem:".to_string(),
            admin_token: None,
            watch: false,
        }
    }
}

impl ServerConfig {
    /// Settings from `PANELFORGE_*` environment variables, with the defaults
    /// filling any gap. An empty admin token counts as unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            addr: std::env::var("PANELFORGE_ADDR").unwrap_or(defaults.addr),
            database_url: std::env::var("PANELFORGE_DATABASE_URL").unwrap_or(defaults.database_url),
            admin_token: std::env::var("PANELFORGE_ADMIN_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            watch: std::env::var("PANELFORGE_WATCH")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.watch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_modules_are_recognized() {
        for name in ProjectPaths::CORE_MODULES {
            assert!(ProjectPaths::is_core_module(name));
        }
        assert!(!ProjectPaths::is_core_module("cases"));
    }

    #[test]
    fn paths_follow_the_managed_layout() {
        let project = ProjectPaths::new("/tmp/site");
        assert_eq!(
            project.schema_file(),
            PathBuf::from("/tmp/site/prisma/schema.prisma")
        );
        assert_eq!(
            project.ledger_file(),
            PathBuf::from("/tmp/site/client/schema.prisma")
        );
        assert_eq!(
            project.bootstrap_file(),
            PathBuf::from("/tmp/site/server/main.rs")
        );
        assert_eq!(
            project.resource_dir("cases"),
            PathBuf::from("/tmp/site/server/resources/cases")
        );
    }

    #[test]
    fn generated_slugs_skip_core_modules() {
        let dir = tempfile::tempdir().unwrap();
        let project = ProjectPaths::new(dir.path());
        for name in ["auth", "users", "config", "media", "cases", "banners"] {
            fs::create_dir_all(project.resource_dir(name)).unwrap();
        }
        fs::write(project.resources_mod_file(), "pub mod cases;\n").unwrap();
        let slugs = project.generated_slugs().unwrap();
        assert_eq!(slugs, vec!["banners".to_string(), "cases".to_string()]);
    }
}
