//! Shared data model for the legality/reachability engine.
//!
//! **Core Types**:
//! - `GrammarCatalog`: immutable definition of the 49 instruction classes and
//!   the 17 forbidden transitions. Validated once at construction; every
//!   downstream crate shares it read-only.
//! - `HazardKind`: three-way hazard taxonomy. Atomic classes have no
//!   vocabulary dependency and can never be pruned by a projection.
//! - `LegalityField`: the vocabulary atoms available in one analysis context
//!   (an A-record, an AZC folio, or a synthetic bundle).
//! - `HazardOverlay`: copy-on-write view over a catalog that overrides a
//!   single class's hazard kind. Audits use it instead of mutating the
//!   shared catalog, so concurrent audits never interfere.

pub mod manifest;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Instruction-class identifier, always in `[1, CLASS_COUNT]`.
pub type ClassId = u8;

/// Number of instruction classes in the grammar. Fixed; classes are never
/// created or destroyed at runtime.
pub const CLASS_COUNT: usize = 49;

/// Number of forbidden class-pair transitions the catalog must define.
pub const FORBIDDEN_PAIR_COUNT: usize = 17;

/// Hazard classification of an instruction class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HazardKind {
    /// Not a hazard class.
    None,
    /// Vocabulary-independent: reachable in every context, never prunable.
    Atomic,
    /// Reachable only when some of its vocabulary survives the legality field.
    Decomposable,
}

/// One instruction class: free-form role tag, hazard kind, and the vocabulary
/// atoms (MIDDLEs) its reachability depends on. Atomic classes carry an empty
/// vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub role: String,
    pub hazard: HazardKind,
    pub vocabulary: BTreeSet<String>,
}

/// Errors raised when a catalog definition violates the grammar's fixed shape.
/// All of these are fatal configuration errors: the whole run depends on
/// catalog correctness, so nothing downstream attempts recovery.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog defines {0} classes, expected {expected}", expected = CLASS_COUNT)]
    ClassCount(usize),
    #[error("class id {0} outside [1, {max}]", max = CLASS_COUNT)]
    ClassIdOutOfRange(ClassId),
    #[error("duplicate class id {0}")]
    DuplicateClass(ClassId),
    #[error("catalog defines {0} forbidden pairs, expected {expected}", expected = FORBIDDEN_PAIR_COUNT)]
    ForbiddenPairCount(usize),
    #[error("forbidden pair ({0}, {1}) references an id outside [1, {max}]", max = CLASS_COUNT)]
    ForbiddenPairOutOfRange(ClassId, ClassId),
    #[error("duplicate forbidden pair ({0}, {1})")]
    DuplicateForbiddenPair(ClassId, ClassId),
    #[error("atomic class {0} carries a vocabulary dependency")]
    AtomicWithVocabulary(ClassId),
    #[error("class key {0:?} is not an integer id")]
    BadClassKey(String),
    #[error("catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read seam through which projections and aggregators consult a catalog.
///
/// Implemented by [`GrammarCatalog`] (the shared immutable base) and by
/// [`HazardOverlay`] (a per-audit view). Code generic over this trait never
/// observes whether it is running against the base or an overlay.
pub trait ClassCatalog {
    fn hazard(&self, id: ClassId) -> HazardKind;
    fn role(&self, id: ClassId) -> &str;
    fn vocabulary(&self, id: ClassId) -> &BTreeSet<String>;
    fn forbidden_pairs(&self) -> &[(ClassId, ClassId)];

    /// Ids of all classes with the given hazard kind, ascending.
    fn ids_with_hazard(&self, kind: HazardKind) -> Vec<ClassId> {
        class_ids().filter(|&id| self.hazard(id) == kind).collect()
    }
}

/// Iterator over all valid class ids, `1..=49`.
pub fn class_ids() -> impl Iterator<Item = ClassId> {
    1..=CLASS_COUNT as ClassId
}

/// Immutable definition of the instruction-class grammar.
///
/// Storage is a fixed-length vector indexed by `id - 1`, so lookups are O(1)
/// and the 49-class shape is guaranteed after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarCatalog {
    classes: Vec<ClassRecord>,
    forbidden: Vec<(ClassId, ClassId)>,
}

impl GrammarCatalog {
    /// Validates and seals a catalog definition.
    ///
    /// `classes` must cover every id in `[1, 49]` exactly once; `forbidden`
    /// must hold exactly 17 distinct in-range pairs; atomic classes must not
    /// declare vocabulary. Any violation is a fatal [`CatalogError`].
    pub fn new(
        classes: Vec<(ClassId, ClassRecord)>,
        forbidden: Vec<(ClassId, ClassId)>,
    ) -> Result<Self, CatalogError> {
        if classes.len() != CLASS_COUNT {
            return Err(CatalogError::ClassCount(classes.len()));
        }
        let mut slots: Vec<Option<ClassRecord>> = vec![None; CLASS_COUNT];
        for (id, record) in classes {
            if id < 1 || id as usize > CLASS_COUNT {
                return Err(CatalogError::ClassIdOutOfRange(id));
            }
            if record.hazard == HazardKind::Atomic && !record.vocabulary.is_empty() {
                return Err(CatalogError::AtomicWithVocabulary(id));
            }
            let slot = &mut slots[id as usize - 1];
            if slot.is_some() {
                return Err(CatalogError::DuplicateClass(id));
            }
            *slot = Some(record);
        }
        // len == CLASS_COUNT and no duplicates, so every slot is filled.
        let classes: Vec<ClassRecord> = slots.into_iter().flatten().collect();

        if forbidden.len() != FORBIDDEN_PAIR_COUNT {
            return Err(CatalogError::ForbiddenPairCount(forbidden.len()));
        }
        let mut seen: HashSet<(ClassId, ClassId)> = HashSet::with_capacity(FORBIDDEN_PAIR_COUNT);
        for &(from, to) in &forbidden {
            if from < 1 || from as usize > CLASS_COUNT || to < 1 || to as usize > CLASS_COUNT {
                return Err(CatalogError::ForbiddenPairOutOfRange(from, to));
            }
            if !seen.insert((from, to)) {
                return Err(CatalogError::DuplicateForbiddenPair(from, to));
            }
        }

        Ok(Self { classes, forbidden })
    }

    /// Builds a synthetic catalog for tests and experiments.
    ///
    /// `atomic` lists the vocabulary-independent classes; `vocab` assigns
    /// vocabulary atoms per class (those classes and all remaining ones are
    /// DECOMPOSABLE). Forbidden pairs are the fixed chain `(1,2)..(17,18)`.
    pub fn synthetic(atomic: &[ClassId], vocab: &[(ClassId, &[&str])]) -> Self {
        let atomic_set: HashSet<ClassId> = atomic.iter().copied().collect();
        let classes = class_ids()
            .map(|id| {
                let vocabulary: BTreeSet<String> = vocab
                    .iter()
                    .find(|(vid, _)| *vid == id)
                    .map(|(_, atoms)| atoms.iter().map(|a| a.to_string()).collect())
                    .unwrap_or_default();
                let record = if atomic_set.contains(&id) {
                    ClassRecord {
                        role: "kernel".to_string(),
                        hazard: HazardKind::Atomic,
                        vocabulary: BTreeSet::new(),
                    }
                } else {
                    ClassRecord {
                        role: "core".to_string(),
                        hazard: HazardKind::Decomposable,
                        vocabulary,
                    }
                };
                (id, record)
            })
            .collect();
        let forbidden = (1..=FORBIDDEN_PAIR_COUNT as ClassId)
            .map(|i| (i, i + 1))
            .collect();
        Self::new(classes, forbidden).expect("synthetic catalog is well formed")
    }

    pub fn class(&self, id: ClassId) -> &ClassRecord {
        &self.classes[id as usize - 1]
    }
}

impl ClassCatalog for GrammarCatalog {
    fn hazard(&self, id: ClassId) -> HazardKind {
        self.class(id).hazard
    }

    fn role(&self, id: ClassId) -> &str {
        &self.class(id).role
    }

    fn vocabulary(&self, id: ClassId) -> &BTreeSet<String> {
        &self.class(id).vocabulary
    }

    fn forbidden_pairs(&self) -> &[(ClassId, ClassId)] {
        &self.forbidden
    }
}

/// Copy-on-write catalog view overriding one class's hazard kind.
///
/// The base catalog is shared by reference and never touched; the overlay is
/// scoped to a single audit call.
#[derive(Debug, Clone, Copy)]
pub struct HazardOverlay<'a> {
    base: &'a GrammarCatalog,
    class: ClassId,
    hazard: HazardKind,
}

impl<'a> HazardOverlay<'a> {
    /// View in which `class` is treated as ATOMIC (immune to pruning).
    pub fn exempting(base: &'a GrammarCatalog, class: ClassId) -> Result<Self, CatalogError> {
        if class < 1 || class as usize > CLASS_COUNT {
            return Err(CatalogError::ClassIdOutOfRange(class));
        }
        Ok(Self {
            base,
            class,
            hazard: HazardKind::Atomic,
        })
    }

    pub fn candidate(&self) -> ClassId {
        self.class
    }
}

impl ClassCatalog for HazardOverlay<'_> {
    fn hazard(&self, id: ClassId) -> HazardKind {
        if id == self.class {
            self.hazard
        } else {
            self.base.hazard(id)
        }
    }

    fn role(&self, id: ClassId) -> &str {
        self.base.role(id)
    }

    fn vocabulary(&self, id: ClassId) -> &BTreeSet<String> {
        // Exemption makes the vocabulary irrelevant, not absent: projections
        // short-circuit on the hazard kind before consulting it.
        self.base.vocabulary(id)
    }

    fn forbidden_pairs(&self) -> &[(ClassId, ClassId)] {
        self.base.forbidden_pairs()
    }
}

/// Vocabulary atoms available in one analysis context.
///
/// Atoms with no match in any class vocabulary are inert: they contribute
/// nothing to reachability and are not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalityField {
    pub context_id: String,
    pub atoms: HashSet<String>,
}

impl LegalityField {
    pub fn new<I, S>(context_id: impl Into<String>, atoms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            context_id: context_id.into(),
            atoms: atoms.into_iter().map(Into::into).collect(),
        }
    }

    /// True if any atom of `vocabulary` is available in this field.
    pub fn supports(&self, vocabulary: &BTreeSet<String>) -> bool {
        vocabulary.iter().any(|atom| self.atoms.contains(atom))
    }
}
