//! Database synchronization via the schema CLI.
//!
//! After the schema document changes, two subprocess steps bring the world in
//! line: `db push` applies the schema to the live database, `generate`
//! rebuilds the typed client. Push failures are hard errors. Generate
//! failures are expected while the managed server holds its client files
//! open, so that path falls back to touching a restart marker in the
//! bootstrap source; the supervisor restarts the server, which regenerates
//! on boot.
//!
//! On a successful generate the schema is copied to the client ledger and
//! the model registry reloads, flipping fresh models to typed access.

use std::process::Command;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::bootstrap;
use crate::config::ProjectPaths;
use crate::errors::{PanelError, PanelResult};
use crate::resources::ModelRegistry;

/// Overrides the schema CLI binary, mainly for tests.
pub const PRISMA_BIN_ENV: &str = "PANELFORGE_PRISMA_BIN";

const OUTPUT_LIMIT: usize = 8 * 1024;

/// What a completed sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Client regeneration succeeded and the ledger was refreshed.
    pub generated: bool,
    /// Regeneration failed and the bootstrap restart marker was touched.
    pub restart_touched: bool,
}

pub struct SyncEngine {
    project: ProjectPaths,
    registry: Arc<ModelRegistry>,
}

impl SyncEngine {
    pub fn new(project: ProjectPaths, registry: Arc<ModelRegistry>) -> Self {
        Self { project, registry }
    }

    /// Push the schema and regenerate the client, blocking until done.
    pub fn push_and_generate(&self) -> PanelResult<SyncReport> {
        let schema = self.project.schema_file();
        if !schema.exists() {
            return Err(PanelError::Sync(format!(
                "schema not found at {}",
                schema.display()
            )));
        }

        let bin = prisma_bin();
        let output = Command::new(&bin)
            .args(["db", "push", "--accept-data-loss", "--skip-generate"])
            .current_dir(self.project.root())
            .output()
            .map_err(|err| PanelError::Sync(format!("failed to run {bin}: {err}")))?;
        if !output.status.success() {
            return Err(PanelError::Sync(format!(
                "prisma db push failed: {}",
                capture(&output)
            )));
        }
        debug!(output = %capture(&output), "schema pushed to database");

        let output = Command::new(&bin)
            .arg("generate")
            .current_dir(self.project.root())
            .output()
            .map_err(|err| PanelError::Sync(format!("failed to run {bin}: {err}")))?;
        if output.status.success() {
            self.refresh_ledger()?;
            info!("client regenerated, ledger refreshed");
            return Ok(SyncReport {
                generated: true,
                restart_touched: false,
            });
        }

        warn!(
            output = %capture(&output),
            "client regeneration failed, touching restart marker"
        );
        let restart_touched = match self.touch_restart() {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "could not touch restart marker; restart the server manually");
                false
            }
        };
        Ok(SyncReport {
            generated: false,
            restart_touched,
        })
    }

    /// Run the sync after the current response goes out. Failures are
    /// logged, never surfaced.
    pub fn spawn_detached(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("panelforge-sync".to_string())
            .spawn(move || {
                if let Err(err) = engine.push_and_generate() {
                    error!(%err, "detached schema sync failed");
                }
            });
        if let Err(err) = spawned {
            error!(%err, "could not spawn detached sync thread");
        }
    }

    fn refresh_ledger(&self) -> PanelResult<()> {
        let ledger = self.project.ledger_file();
        if let Some(parent) = ledger.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PanelError::Io(format!("create {}: {e}", parent.display())))?;
        }
        std::fs::copy(self.project.schema_file(), &ledger)
            .map_err(|e| PanelError::Io(format!("refresh ledger {}: {e}", ledger.display())))?;
        self.registry.reload();
        Ok(())
    }

    fn touch_restart(&self) -> PanelResult<()> {
        bootstrap::edit_file(&self.project.bootstrap_file(), |text| {
            Ok(bootstrap::touch_restart_marker(text))
        })
    }
}

fn prisma_bin() -> String {
    std::env::var(PRISMA_BIN_ENV).unwrap_or_else(|_| "prisma".to_string())
}

/// Subprocess output for logs and errors: stderr when present, stdout
/// otherwise, truncated to a sane size.
pub(crate) fn capture(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let raw = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    let mut text = raw.trim().to_string();
    if text.len() > OUTPUT_LIMIT {
        let mut end = OUTPUT_LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("...");
    }
    if text.is_empty() {
        format!("exit status {}", output.status)
    } else {
        text
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Mutex, OnceLock};

    /// Serialize environment mutations across test modules.
    pub fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CANONICAL_PREAMBLE;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    const BOOTSTRAP: &str = "mod resources;\n\nfn main() -> anyhow::Result<()> {\n    Ok(())\n}\n";

    fn write_stub(dir: &Path, body: &str) -> std::path::PathBuf {
        let stub = dir.join("prisma-stub");
        fs::write(&stub, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = fs::metadata(&stub).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&stub, perms).unwrap();
        stub
    }

    fn project(dir: &Path) -> ProjectPaths {
        let project = ProjectPaths::new(dir);
        fs::create_dir_all(project.schema_file().parent().unwrap()).unwrap();
        fs::write(
            project.schema_file(),
            format!("{CANONICAL_PREAMBLE}\nmodel Cases {{\n  id String @id\n}}\n"),
        )
        .unwrap();
        fs::create_dir_all(project.bootstrap_file().parent().unwrap()).unwrap();
        fs::write(project.bootstrap_file(), BOOTSTRAP).unwrap();
        project
    }

    fn engine(project: &ProjectPaths) -> (Arc<ModelRegistry>, SyncEngine) {
        let registry = Arc::new(ModelRegistry::load(project.ledger_file()));
        let engine = SyncEngine::new(project.clone(), Arc::clone(&registry));
        (registry, engine)
    }

    fn with_stub<T>(stub: &Path, f: impl FnOnce() -> T) -> T {
        let _guard = test_support::env_lock().lock().unwrap();
        let old = std::env::var(PRISMA_BIN_ENV).ok();
        std::env::set_var(PRISMA_BIN_ENV, stub);
        let result = f();
        match old {
            Some(v) => std::env::set_var(PRISMA_BIN_ENV, v),
            None => std::env::remove_var(PRISMA_BIN_ENV),
        }
        result
    }

    #[test]
    fn successful_sync_refreshes_ledger_and_registry() {
        let dir = tempfile::tempdir().unwrap();
        let proj = project(dir.path());
        let stub = write_stub(dir.path(), "exit 0");
        let (registry, engine) = engine(&proj);
        assert!(!registry.is_typed("Cases"));

        let report = with_stub(&stub, || engine.push_and_generate()).unwrap();
        assert!(report.generated);
        assert!(!report.restart_touched);
        assert_eq!(
            fs::read_to_string(proj.ledger_file()).unwrap(),
            fs::read_to_string(proj.schema_file()).unwrap()
        );
        assert!(registry.is_typed("Cases"));
    }

    #[test]
    fn push_failure_is_a_hard_error_with_output() {
        let dir = tempfile::tempdir().unwrap();
        let proj = project(dir.path());
        let stub = write_stub(
            dir.path(),
            "if [ \"$1\" = \"db\" ]; then echo 'P1001: cannot reach database' >&2; exit 1; fi\nexit 0",
        );
        let (_, engine) = engine(&proj);

        let err = with_stub(&stub, || engine.push_and_generate()).unwrap_err();
        assert!(matches!(err, PanelError::Sync(_)));
        assert!(err.to_string().contains("P1001"));
        assert!(!proj.ledger_file().exists());
    }

    #[test]
    fn generate_failure_touches_the_restart_marker() {
        let dir = tempfile::tempdir().unwrap();
        let proj = project(dir.path());
        let stub = write_stub(
            dir.path(),
            "if [ \"$1\" = \"generate\" ]; then exit 1; fi\nexit 0",
        );
        let (registry, engine) = engine(&proj);

        let report = with_stub(&stub, || engine.push_and_generate()).unwrap();
        assert!(!report.generated);
        assert!(report.restart_touched);
        assert!(!proj.ledger_file().exists());
        assert!(!registry.is_typed("Cases"));

        let bootstrap = fs::read_to_string(proj.bootstrap_file()).unwrap();
        assert_eq!(
            bootstrap
                .lines()
                .filter(|l| l.starts_with("// client regenerated at "))
                .count(),
            1
        );
    }

    #[test]
    fn missing_schema_refuses_to_sync() {
        let dir = tempfile::tempdir().unwrap();
        let proj = ProjectPaths::new(dir.path());
        let registry = Arc::new(ModelRegistry::load(proj.ledger_file()));
        let engine = SyncEngine::new(proj, registry);
        let err = engine.push_and_generate().unwrap_err();
        assert!(err.to_string().contains("schema not found"));
    }

    #[test]
    fn detached_sync_completes_in_the_background() {
        let dir = tempfile::tempdir().unwrap();
        let proj = project(dir.path());
        let stub = write_stub(dir.path(), "exit 0");
        let (_, engine) = engine(&proj);
        let engine = Arc::new(engine);

        let completed = with_stub(&stub, || {
            engine.spawn_detached();
            for _ in 0..100 {
                if proj.ledger_file().exists() {
                    return true;
                }
                std::thread::sleep(std::time::Duration::from_millis(20));
            }
            false
        });
        assert!(completed, "detached sync never refreshed the ledger");
    }
}
