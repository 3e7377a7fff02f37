//! # Schema Merge Engine
//!
//! Parses the managed project's Prisma-style schema document into named,
//! brace-balanced model blocks and performs structured merges against it.
//!
//! ## Overview
//!
//! The schema file is a shared, mutable source of truth: every generated
//! resource contributes a model block, the reset path removes blocks, and the
//! sync step pushes the result to the live database. All mutation goes
//! through [`SchemaDoc`]:
//!
//! - **parse once**: model headers are located and their spans computed via
//!   a forward brace-depth scan; nothing else touches raw byte offsets
//! - **merge**: an incoming model either appends (unknown name), replaces
//!   (same name, different fields), or no-ops (same name, same normalized
//!   field set). The no-op case is byte-identical, which is what makes
//!   repeated generation of the same resource safe.
//! - **remove**: the reset path drops every block not in its keep set and
//!   collapses the leftover blank runs
//!
//! Field comparison ignores ordering and the injected standard fields
//! (`id`, `createdAt`, `updatedAt`, `isPublished`); a field counts as changed
//! when its type or requiredness differs.
//!
//! Malformed input (unbalanced braces) is undefined behavior by contract:
//! the document is only ever written by this engine and the initial seed.

mod core;

pub use core::{
    extract_fields, model_name_of, MergeOutcome, ModelBlock, SchemaDoc, SchemaField,
    CANONICAL_PREAMBLE,
};

use crate::errors::{PanelError, PanelResult};
use std::path::Path;

/// Read-merge-write a model into the schema file at `path`.
///
/// Returns whether the document changed. The parent directory must exist.
pub fn merge_model_file(path: &Path, model_text: &str) -> PanelResult<bool> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| PanelError::Io(format!("read {}: {e}", path.display())))?;
    let mut doc = SchemaDoc::parse(text);
    let outcome = doc.merge_model(model_text)?;
    if outcome.changed() {
        std::fs::write(path, doc.text())
            .map_err(|e| PanelError::Io(format!("write {}: {e}", path.display())))?;
    }
    Ok(outcome.changed())
}
