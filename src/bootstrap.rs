//! Server-registration patcher for the managed project's bootstrap source.
//!
//! `server/main.rs` in a managed project is plain text with two contiguous
//! blocks the generator maintains: a `use resources::…` import block and a
//! `server.mount("/api/…")` block. The exact line shapes written here are
//! load-bearing: registration finds its insertion point by locating the last
//! line of each block, and the reset path removes lines by the same needles.
//!
//! All operations are idempotent per resource. Registration fails loudly
//! when no anchor line exists at all, since that means the bootstrap was
//! hand-edited out of shape.

use crate::errors::{PanelError, PanelResult};
use chrono::{SecondsFormat, Utc};
use std::path::Path;

const MARKER_PREFIX: &str = "// client regenerated at ";

/// Import line registered for a resource's route table.
#[must_use]
pub fn import_line(slug: &str) -> String {
    format!("use resources::{slug}::routes as {slug}_routes;")
}

/// Import line for the companion structure route table.
#[must_use]
pub fn structure_import_line(slug: &str) -> String {
    format!("use resources::{slug}::structure_routes as {slug}_structure_routes;")
}

/// Mount line for a resource's route table.
#[must_use]
pub fn mount_line(slug: &str) -> String {
    format!("    server.mount(\"/api/{slug}\", {slug}_routes::table());")
}

/// Mount line for the companion structure route table.
#[must_use]
pub fn structure_mount_line(slug: &str) -> String {
    format!("    server.mount(\"/api/{slug}-structure\", {slug}_structure_routes::table());")
}

/// Register a resource's import and mount lines. Each concern no-ops
/// independently when its line is already present.
pub fn register_routes(text: &str, slug: &str) -> PanelResult<String> {
    let text = insert_line(
        text,
        &import_line(slug),
        &format!("use resources::{slug}::routes as "),
        is_import_anchor,
        "Could not find place to add import",
    )?;
    insert_line(
        &text,
        &mount_line(slug),
        &format!("\"/api/{slug}\""),
        is_mount_anchor,
        "Could not find place to register routes",
    )
}

/// Register the structure-route import and mount lines for a resource.
pub fn register_structure_routes(text: &str, slug: &str) -> PanelResult<String> {
    let text = insert_line(
        text,
        &structure_import_line(slug),
        &format!("use resources::{slug}::structure_routes as "),
        is_import_anchor,
        "Could not find place to add import",
    )?;
    insert_line(
        &text,
        &structure_mount_line(slug),
        &format!("\"/api/{slug}-structure\""),
        is_mount_anchor,
        "Could not find place to register routes",
    )
}

/// Strip every import/mount line referencing any of the given slugs, then
/// collapse the blank runs left behind.
#[must_use]
pub fn deregister_routes(text: &str, slugs: &[String]) -> String {
    let kept: Vec<&str> = text
        .split('\n')
        .filter(|line| {
            !slugs.iter().any(|slug| {
                line.contains(&format!("resources::{slug}::"))
                    || line.contains(&format!("\"/api/{slug}\""))
                    || line.contains(&format!("\"/api/{slug}-structure\""))
            })
        })
        .collect();
    collapse_blank_runs(&kept.join("\n"))
}

/// Replace the restart marker at the end of the bootstrap with a fresh
/// timestamp. Used when client regeneration fails because the running
/// process holds the client files: the content change makes the supervisor
/// restart the managed server, which regenerates on boot.
#[must_use]
pub fn touch_restart_marker(text: &str) -> String {
    let kept: Vec<&str> = text
        .split('\n')
        .filter(|line| !line.trim_start().starts_with(MARKER_PREFIX))
        .collect();
    let mut out = kept.join("\n").trim_end().to_string();
    let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    out.push_str(&format!("\n\n{MARKER_PREFIX}{stamp}\n"));
    out
}

/// Append `pub mod <slug>;` to the resources module list when absent.
#[must_use]
pub fn ensure_resource_module(text: &str, slug: &str) -> String {
    let declaration = format!("pub mod {slug};");
    if text.lines().any(|l| l.trim() == declaration) {
        return text.to_string();
    }
    let mut out = text.trim_end().to_string();
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&declaration);
    out.push('\n');
    out
}

/// Remove `pub mod <slug>;` declarations for the given slugs.
#[must_use]
pub fn remove_resource_modules(text: &str, slugs: &[String]) -> String {
    let kept: Vec<&str> = text
        .split('\n')
        .filter(|line| {
            !slugs
                .iter()
                .any(|slug| line.trim() == format!("pub mod {slug};"))
        })
        .collect();
    collapse_blank_runs(&kept.join("\n"))
}

/// Read-patch-write a bootstrap (or module list) file.
pub fn edit_file(
    path: &Path,
    patch: impl FnOnce(&str) -> PanelResult<String>,
) -> PanelResult<()> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| PanelError::Io(format!("read {}: {e}", path.display())))?;
    let patched = patch(&text)?;
    if patched != text {
        std::fs::write(path, patched)
            .map_err(|e| PanelError::Io(format!("write {}: {e}", path.display())))?;
    }
    Ok(())
}

fn is_import_anchor(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("use resources::") && trimmed.contains(" as ")
}

fn is_mount_anchor(line: &str) -> bool {
    line.contains("server.mount(\"/api/")
}

/// Insert `new_line` after the last line matching `anchor`, unless a line
/// containing `needle` already exists.
fn insert_line(
    text: &str,
    new_line: &str,
    needle: &str,
    anchor: fn(&str) -> bool,
    missing_anchor_msg: &str,
) -> PanelResult<String> {
    if text.contains(needle) {
        return Ok(text.to_string());
    }
    let mut lines: Vec<String> = text.split('\n').map(String::from).collect();
    let last_anchor = lines
        .iter()
        .rposition(|l| anchor(l))
        .ok_or_else(|| PanelError::Generation(missing_anchor_msg.to_string()))?;
    lines.insert(last_anchor + 1, new_line.to_string());
    Ok(lines.join("\n"))
}

/// Squash runs of 3+ newlines down to 2 and guarantee a trailing newline.
fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push('\n');
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    let mut out = out.trim_end().to_string();
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOTSTRAP: &str = "mod resources;\n\nuse panelforge::server::AdminServer;\n\nuse resources::auth::routes as auth_routes;\nuse resources::users::routes as users_routes;\nuse resources::config::routes as config_routes;\nuse resources::media::routes as media_routes;\n\nfn main() -> anyhow::Result<()> {\n    let server = AdminServer::from_env()?;\n\n    server.mount(\"/api/auth\", auth_routes::table());\n    server.mount(\"/api/users\", users_routes::table());\n    server.mount(\"/api/config\", config_routes::table());\n    server.mount(\"/api/media\", media_routes::table());\n\n    server.run()\n}\n";

    #[test]
    fn register_inserts_after_last_anchor() {
        let patched = register_routes(BOOTSTRAP, "cases").unwrap();
        let lines: Vec<&str> = patched.lines().collect();
        let import_idx = lines
            .iter()
            .position(|l| *l == "use resources::cases::routes as cases_routes;")
            .unwrap();
        assert_eq!(lines[import_idx - 1], "use resources::media::routes as media_routes;");
        let mount_idx = lines
            .iter()
            .position(|l| l.contains("\"/api/cases\""))
            .unwrap();
        assert!(lines[mount_idx - 1].contains("\"/api/media\""));
    }

    #[test]
    fn register_twice_is_idempotent() {
        let once = register_routes(BOOTSTRAP, "cases").unwrap();
        let twice = register_routes(&once, "cases").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn structure_registration_does_not_satisfy_main() {
        let with_structure = register_structure_routes(BOOTSTRAP, "cases").unwrap();
        assert!(with_structure.contains("\"/api/cases-structure\""));
        let both = register_routes(&with_structure, "cases").unwrap();
        assert!(both.contains("use resources::cases::routes as cases_routes;"));
        assert!(both.contains("\"/api/cases\""));
    }

    #[test]
    fn missing_anchor_fails_loudly() {
        let err = register_routes("fn main() {}\n", "cases").unwrap_err();
        assert!(matches!(err, PanelError::Generation(_)));
    }

    #[test]
    fn deregister_strips_all_lines_and_blank_runs() {
        let text = register_routes(BOOTSTRAP, "cases").unwrap();
        let text = register_structure_routes(&text, "cases").unwrap();
        let cleaned = deregister_routes(&text, &["cases".to_string()]);
        assert!(!cleaned.contains("cases"));
        assert!(!cleaned.contains("\n\n\n"));
        // Core mounts survive.
        assert!(cleaned.contains("\"/api/media\""));
    }

    #[test]
    fn restart_marker_replaces_previous() {
        let first = touch_restart_marker(BOOTSTRAP);
        assert_eq!(
            first.lines().filter(|l| l.starts_with("// client regenerated at ")).count(),
            1
        );
        let second = touch_restart_marker(&first);
        assert_eq!(
            second.lines().filter(|l| l.starts_with("// client regenerated at ")).count(),
            1
        );
    }

    #[test]
    fn module_list_append_and_remove() {
        let text = "pub mod auth;\npub mod users;\n";
        let with = ensure_resource_module(text, "cases");
        assert!(with.ends_with("pub mod cases;\n"));
        assert_eq!(ensure_resource_module(&with, "cases"), with);
        let without = remove_resource_modules(&with, &["cases".to_string()]);
        assert!(!without.contains("cases"));
    }
}
