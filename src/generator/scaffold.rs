use std::fs;
use std::path::Path;

use anyhow::Context;
use askama::Template;

use crate::config::ProjectPaths;
use crate::generator::templates::{
    AuthHandlersTemplate, AuthRoutesTemplate, BootstrapSeedTemplate, CollectionHandlersTemplate,
    CollectionRoutesTemplate, ConfigHandlersTemplate, ConfigRoutesTemplate, MediaHandlersTemplate,
    MediaRoutesTemplate, ResetScriptTemplate, ResourcesModSeedTemplate, SchemaSeedTemplate,
};
use crate::generator::templates::render_resource_mod;

/// Seed a managed project: schema + ledger, bootstrap, core resource modules,
/// reset script and the generated-output directory.
///
/// Refuses to touch an already-initialized target unless `force` is set.
pub fn scaffold_project(project: &ProjectPaths, force: bool) -> anyhow::Result<()> {
    if project.schema_file().exists() && !force {
        anyhow::bail!(
            "project already initialized at {:?}; use --force to overwrite",
            project.root()
        );
    }

    let schema = SchemaSeedTemplate.render()?;
    write_file(&project.schema_file(), &schema)?;
    // The ledger starts as an exact copy: every seeded model is typed.
    write_file(&project.ledger_file(), &schema)?;

    write_file(&project.bootstrap_file(), &BootstrapSeedTemplate.render()?)?;
    write_file(
        &project.resources_mod_file(),
        &ResourcesModSeedTemplate.render()?,
    )?;

    write_core_module(
        project,
        "users",
        &CollectionHandlersTemplate {
            model_name: "User".to_string(),
            route_name: "users".to_string(),
            collection: "users".to_string(),
        }
        .render()?,
        &CollectionRoutesTemplate {
            route_name: "users".to_string(),
        }
        .render()?,
    )?;
    write_core_module(
        project,
        "config",
        &ConfigHandlersTemplate.render()?,
        &ConfigRoutesTemplate.render()?,
    )?;
    write_core_module(
        project,
        "auth",
        &AuthHandlersTemplate.render()?,
        &AuthRoutesTemplate.render()?,
    )?;
    write_core_module(
        project,
        "media",
        &MediaHandlersTemplate.render()?,
        &MediaRoutesTemplate.render()?,
    )?;

    let script = project.reset_script();
    write_file(&script, &ResetScriptTemplate.render()?)?;
    make_executable(&script)?;

    write_file(&project.generated_dir().join(".gitkeep"), "")?;

    println!("✅ Project initialized at {:?}", project.root());
    Ok(())
}

fn write_core_module(
    project: &ProjectPaths,
    name: &str,
    handlers: &str,
    routes: &str,
) -> anyhow::Result<()> {
    let dir = project.resource_dir(name);
    write_file(&dir.join("handlers.rs"), handlers)?;
    write_file(&dir.join("routes.rs"), routes)?;
    write_file(&dir.join("mod.rs"), &render_resource_mod(false)?)?;
    Ok(())
}

fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {parent:?}"))?;
    }
    fs::write(path, content).with_context(|| format!("write {path:?}"))?;
    println!("✅ Wrote {path:?}");
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)
        .with_context(|| format!("stat {path:?}"))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).with_context(|| format!("chmod {path:?}"))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
