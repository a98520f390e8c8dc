//! JSON catalog-spec ingestion.
//!
//! The surrounding tooling ships the class catalog as JSON:
//!
//! ```json
//! {
//!   "classes": {
//!     "7": { "role": "kernel", "hazard_kind": "ATOMIC", "vocabulary": [] },
//!     "5": { "role": "core", "hazard_kind": "DECOMPOSABLE", "vocabulary": ["ed", "ok"] }
//!   },
//!   "forbidden_pairs": [[4, 9], [12, 3]]
//! }
//! ```
//!
//! This module is the only boundary adapter: everything past
//! [`load_catalog_str`] works with the validated in-memory
//! [`GrammarCatalog`].

use crate::{CatalogError, ClassId, ClassRecord, GrammarCatalog, HazardKind};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct CatalogManifest {
    pub classes: BTreeMap<String, ClassEntry>,
    pub forbidden_pairs: Vec<(ClassId, ClassId)>,
}

#[derive(Debug, Deserialize)]
pub struct ClassEntry {
    pub role: String,
    pub hazard_kind: HazardKind,
    #[serde(default)]
    pub vocabulary: BTreeSet<String>,
}

/// Parses a JSON catalog spec and validates it into a [`GrammarCatalog`].
pub fn load_catalog_str(json: &str) -> Result<GrammarCatalog, CatalogError> {
    let manifest: CatalogManifest = serde_json::from_str(json)?;
    catalog_from_manifest(manifest)
}

/// Reads and validates a catalog-spec file.
pub fn load_catalog_file(path: &Path) -> Result<GrammarCatalog, CatalogError> {
    let json = std::fs::read_to_string(path)?;
    load_catalog_str(&json)
}

fn catalog_from_manifest(manifest: CatalogManifest) -> Result<GrammarCatalog, CatalogError> {
    let mut classes = Vec::with_capacity(manifest.classes.len());
    for (key, entry) in manifest.classes {
        let id: ClassId = key
            .parse()
            .map_err(|_| CatalogError::BadClassKey(key.clone()))?;
        classes.push((
            id,
            ClassRecord {
                role: entry.role,
                hazard: entry.hazard_kind,
                vocabulary: entry.vocabulary,
            },
        ));
    }
    GrammarCatalog::new(classes, manifest.forbidden_pairs)
}
