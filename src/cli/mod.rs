//! Command-line entry points.
//!
//! Four subcommands manage a scaffolded admin project:
//!
//! - `init` seeds the project layout (schema, ledger, bootstrap, core
//!   resource modules, reset script)
//! - `serve` runs the admin server with the generation API mounted
//! - `generate` generates a resource offline, without a server
//! - `reset` removes everything generation added, with a dry-run preview
//!
//! ```bash
//! panelforge init --dir ./panel
//! panelforge serve --dir ./panel --addr 0.0.0.0:8080 --watch
//! panelforge generate --name Cases --field title:String:required --dir ./panel
//! panelforge reset --dir ./panel --apply
//! ```
//!
//! Settings fall back to `PANELFORGE_*` environment variables where a flag
//! is omitted; `--verbose` raises the default log filter to debug.

mod commands;


pub use commands::{run_cli, Cli, Commands};
