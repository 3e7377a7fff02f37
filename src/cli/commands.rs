use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api;
use crate::config::{ProjectPaths, ServerConfig};
use crate::descriptor::{GenerateRequest, ResourceDescriptor};
use crate::generator;
use crate::hot_reload::watch_ledger;
use crate::reset::{ResetEngine, ResetReport};
use crate::runtime_config::RuntimeConfig;
use crate::server::{AdminServer, ServerHandle};
use crate::store::store_from_url;

/// Command-line interface for panelforge.
///
/// Manages a scaffolded admin project: seeds it, serves it, generates
/// resources into it offline, and resets it back to the core set.
#[derive(Parser)]
#[command(name = "panelforge")]
#[command(about = "Admin-panel backend with a runtime resource generator", long_about = None)]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides this)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scaffold a managed admin project
    Init {
        /// Project directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Re-seed over an already initialized project
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Run the admin server for a managed project
    Serve {
        /// Project directory (default: PANELFORGE_PROJECT_ROOT or `.`)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Listen address (default: PANELFORGE_ADDR or 0.0.0.0:8080)
        #[arg(long)]
        addr: Option<String>,

        /// Document store URL: an http(s):// data API or `mem:` for the
        /// in-process store (default: PANELFORGE_DATABASE_URL or `mem:`)
        #[arg(long)]
        database_url: Option<String>,

        /// Bearer token required on non-public routes
        /// (default: PANELFORGE_ADMIN_TOKEN)
        #[arg(long)]
        admin_token: Option<String>,

        /// Reload the model registry when the client ledger changes
        #[arg(long, default_value_t = false)]
        watch: bool,
    },
    /// Generate a resource offline: module files, schema merge and bootstrap
    /// registration, without a running server
    Generate {
        /// Resource name, e.g. "Cases"
        #[arg(long)]
        name: String,

        /// Field as name:Type[:required]; repeat per field
        #[arg(long = "field")]
        fields: Vec<String>,

        /// Resource shape: collection, collectionBulk or singleton
        /// (default: inferred from the fields)
        #[arg(long = "type")]
        shape: Option<String>,

        /// Project directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Remove generated resources, models and collections; preview by default
    Reset {
        /// Project directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Actually delete; without this the command only prints what a
        /// reset would remove
        #[arg(long, default_value_t = false)]
        apply: bool,

        /// Document store URL (default: PANELFORGE_DATABASE_URL or `mem:`)
        #[arg(long)]
        database_url: Option<String>,
    },
}

pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Init { dir, force } => {
            generator::scaffold_project(&ProjectPaths::new(dir), force)
        }
        Commands::Serve {
            dir,
            addr,
            database_url,
            admin_token,
            watch,
        } => cmd_serve(dir, addr, database_url, admin_token, watch),
        Commands::Generate {
            name,
            fields,
            shape,
            dir,
        } => cmd_generate(&name, &fields, shape.as_deref(), &dir),
        Commands::Reset {
            dir,
            apply,
            database_url,
        } => cmd_reset(&dir, apply, database_url),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn cmd_serve(
    dir: Option<PathBuf>,
    addr: Option<String>,
    database_url: Option<String>,
    admin_token: Option<String>,
    watch: bool,
) -> anyhow::Result<()> {
    let root = dir.unwrap_or_else(|| {
        PathBuf::from(std::env::var("PANELFORGE_PROJECT_ROOT").unwrap_or_else(|_| ".".to_string()))
    });
    let project = ProjectPaths::new(&root);
    ensure_initialized(&project)?;

    let mut config = ServerConfig::from_env();
    if let Some(addr) = addr {
        config.addr = addr;
    }
    if let Some(url) = database_url {
        config.database_url = url;
    }
    if let Some(token) = admin_token {
        config.admin_token = Some(token).filter(|t| !t.is_empty());
    }
    config.watch = config.watch || watch;
    if config.admin_token.is_none() {
        warn!("no admin token configured; admin endpoints accept unauthenticated requests");
    }

    let runtime = RuntimeConfig::from_env();
    may::config().set_stack_size(runtime.stack_size);

    let server = AdminServer::new(project, config)?;
    let ctx = server.context();

    for (prefix, table) in api::core_tables() {
        server.mount(prefix, table);
    }
    server.mount("/api/admin", api::admin_table());
    api::admin::remount_generated(&ctx);

    // Dropping the watcher stops the reloads, so it lives until shutdown.
    let _watcher = if server.config().watch {
        Some(watch_ledger(
            ctx.project().ledger_file(),
            Arc::clone(ctx.registry()),
        )?)
    } else {
        None
    };

    let handle = server.start()?;
    wait_for_shutdown(handle)
}

#[cfg(unix)]
fn wait_for_shutdown(handle: ServerHandle) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "shutting down");
    }
    handle.stop();
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown(handle: ServerHandle) -> anyhow::Result<()> {
    handle
        .join()
        .map_err(|_| anyhow::anyhow!("server exited after a panic"))
}

fn cmd_generate(
    name: &str,
    fields: &[String],
    shape: Option<&str>,
    dir: &Path,
) -> anyhow::Result<()> {
    let project = ProjectPaths::new(dir);
    ensure_initialized(&project)?;

    let mut specs = Vec::with_capacity(fields.len());
    for raw in fields {
        specs.push(parse_field(raw)?);
    }

    let request = GenerateRequest {
        resource_name: Some(name.to_string()),
        fields: Some(Value::Array(specs)),
        resource_type: shape.map(str::to_string),
        ..GenerateRequest::default()
    };
    let desc = ResourceDescriptor::from_request(request)?;
    let generated = generator::generate_resource(&project, &desc)?;

    println!(
        "✅ Generated {} at server/resources/{}/",
        generated.model_name, generated.route_name
    );
    if let Some(endpoints) = generated.endpoints.as_object() {
        for (operation, route) in endpoints {
            println!("   {operation}: {}", route.as_str().unwrap_or_default());
        }
    }
    if generated.schema_changed {
        println!("   schema.prisma updated; push it with the ORM CLI or let the server sync it");
    }
    Ok(())
}

/// Parse one `--field` value of the form `name:Type[:required]`.
fn parse_field(raw: &str) -> anyhow::Result<Value> {
    let mut parts = raw.splitn(3, ':');
    let name = parts.next().unwrap_or_default();
    let ty = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("--field wants name:Type[:required], got {raw:?}"))?;
    let required = match parts.next() {
        None => false,
        Some("required") => true,
        Some(other) => anyhow::bail!("unknown field modifier {other:?} in {raw:?}"),
    };
    Ok(json!({ "name": name, "type": ty, "required": required }))
}

fn cmd_reset(dir: &Path, apply: bool, database_url: Option<String>) -> anyhow::Result<()> {
    let project = ProjectPaths::new(dir);
    ensure_initialized(&project)?;

    let url = database_url.unwrap_or_else(|| ServerConfig::from_env().database_url);
    let store = store_from_url(&url)?;
    let engine = ResetEngine::new(project, store);
    let report = if apply {
        engine.apply()?
    } else {
        engine.preview()?
    };
    print_reset_report(&report);
    Ok(())
}

fn print_reset_report(report: &ResetReport) {
    let verb = if report.applied {
        "Removed"
    } else {
        "Would remove"
    };
    for slug in &report.generated_dirs {
        println!("{verb} server/resources/{slug}/");
    }
    for model in &report.removed_models {
        println!("{verb} model {model} from schema.prisma");
    }
    if report.bootstrap_changed {
        println!("{verb} bootstrap route registrations");
    }
    for name in &report.dropped_collections {
        println!("{verb} collection {name}");
    }
    if let Some(err) = &report.store_error {
        println!("⚠️ Collection cleanup failed: {err}");
    }

    let nothing = report.generated_dirs.is_empty()
        && report.removed_models.is_empty()
        && !report.bootstrap_changed
        && report.dropped_collections.is_empty();
    if nothing {
        println!("Nothing to reset.");
    } else if report.applied {
        println!("✅ Reset complete");
    } else {
        println!("Preview only; re-run with --apply to delete.");
    }
}

fn ensure_initialized(project: &ProjectPaths) -> anyhow::Result<()> {
    if !project.schema_file().exists() {
        anyhow::bail!(
            "no managed project at {:?}; run `panelforge init` first",
            project.root()
        );
    }
    Ok(())
}
