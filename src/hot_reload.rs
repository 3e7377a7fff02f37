//! Ledger hot reload.
//!
//! A successful client regeneration rewrites `client/schema.prisma`, which is
//! what flips fresh models from raw to typed access. The in-process sync
//! engine reloads the registry itself after a push; this watcher covers
//! regenerations done by anything else (a manual CLI run, the managed server
//! restarting) while the server runs with `--watch`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use crate::resources::ModelRegistry;

/// Watch the client ledger and reload `registry` whenever it changes.
///
/// Watching stops when the returned watcher is dropped, so the caller must
/// keep it alive for the lifetime of the server.
pub fn watch_ledger<P: AsRef<Path>>(
    ledger_path: P,
    registry: Arc<ModelRegistry>,
) -> notify::Result<RecommendedWatcher> {
    let path: PathBuf = ledger_path.as_ref().to_path_buf();
    let ledger_name = path.file_name().map(|n| n.to_os_string());
    let display_path = path.clone();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                if !event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == ledger_name.as_deref())
                {
                    return;
                }
                let models = registry.reload();
                info!(ledger = %display_path.display(), models, "ledger reloaded");
            }
            Err(err) => warn!(error = %err, "ledger watch error"),
        },
        Config::default(),
    )?;

    // Regeneration replaces the ledger rather than rewriting it in place,
    // which would break a watch on the file itself. Watch the parent
    // directory and filter events down to the ledger by name.
    let target = path.parent().map(Path::to_path_buf).unwrap_or(path);
    watcher.watch(&target, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
