//! Client ledger registry.
//!
//! The ledger (`client/schema.prisma`) is the copy of the schema taken the
//! last time client regeneration succeeded. A model present there is served
//! through the typed path; anything newer falls back to raw document
//! commands until the next successful regeneration refreshes the copy.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::schema::SchemaDoc;

pub struct ModelRegistry {
    ledger: PathBuf,
    models: RwLock<HashSet<String>>,
}

impl ModelRegistry {
    /// Load the ledger at `path`. A missing file is the pre-generation state
    /// and yields an empty registry, not an error.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let registry = Self {
            ledger: path.into(),
            models: RwLock::new(HashSet::new()),
        };
        registry.reload();
        registry
    }

    /// Re-read the ledger. Returns the number of models now covered.
    pub fn reload(&self) -> usize {
        let names: HashSet<String> = match std::fs::read_to_string(&self.ledger) {
            Ok(text) => SchemaDoc::parse(text).model_names().into_iter().collect(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(ledger = %self.ledger.display(), "client ledger absent, all access is raw");
                HashSet::new()
            }
            Err(err) => {
                warn!(ledger = %self.ledger.display(), %err, "client ledger unreadable, all access is raw");
                HashSet::new()
            }
        };
        let count = names.len();
        if let Ok(mut models) = self.models.write() {
            *models = names;
        }
        debug!(models = count, "model registry reloaded");
        count
    }

    /// Whether the generated client covers `model`.
    pub fn is_typed(&self, model: &str) -> bool {
        self.models
            .read()
            .map(|models| models.contains(model))
            .unwrap_or(false)
    }

    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .models
            .read()
            .map(|models| models.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}
