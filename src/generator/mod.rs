//! # Generator Module
//!
//! Turns a validated [`ResourceDescriptor`](crate::descriptor::ResourceDescriptor)
//! into source text and project mutations:
//!
//! - **Model text** - a persistence-model block plus its companion structure
//!   model, merged into the schema document
//! - **Handler / route modules** - one directory per resource with `handlers.rs`,
//!   `routes.rs`, the structure endpoint pair and a `mod.rs`
//! - **Registration** - import and mount lines patched into the server
//!   bootstrap, `pub mod` entries into the resources module list
//!
//! All text comes from Askama templates under `templates/`:
//!
//! ```text
//! descriptor → template rendering → schema merge → file writes → bootstrap patch
//! ```
//!
//! The same templates seed a fresh project (`panelforge init`) through
//! [`scaffold_project`], so generated and seeded code share one shape. A
//! generated handler text is correct in both registry states: it resolves a
//! typed or raw access strategy per request instead of assuming the client
//! already knows the model.

mod resource;
mod scaffold;
pub mod templates;

pub use resource::{endpoints_map, generate_resource, GeneratedResource};
pub use scaffold::scaffold_project;
