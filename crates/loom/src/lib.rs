//! # Baseline grammar graph & legality projection
//!
//! Two-stage pipeline:
//! 1. **Baseline**: build the full 49-node instruction-class graph once —
//!    every ordered pair except the 17 forbidden transitions.
//! 2. **Projection**: per analysis context, subtract every class not
//!    supported by the context's legality field (atomic classes are exempt)
//!    along with its incident edges.
//!
//! The baseline is shared read-only across any number of concurrent
//! projections; a projection never mutates it and never adds an edge the
//! baseline does not have.

pub mod projection;

pub use projection::{project, ConditionedGraph, NodeDisposition};

use common::{CatalogError, ClassCatalog, ClassId, CLASS_COUNT, FORBIDDEN_PAIR_COUNT};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashSet;

/// The unconditioned instruction-class graph: 49 nodes and
/// `49 * 49 - 17` directed edges (self-loops included unless forbidden).
///
/// Built once per catalog, then shared read-only by every projection.
pub struct BaselineGraph {
    graph: DiGraph<ClassId, ()>,
    forbidden: HashSet<(ClassId, ClassId)>,
}

impl BaselineGraph {
    /// Builds the baseline from a validated catalog.
    ///
    /// Pure and deterministic. The forbidden-pair table is re-checked here
    /// because this is the last gate before thousands of projections depend
    /// on it; a violation is a fatal configuration error.
    pub fn build(catalog: &impl ClassCatalog) -> Result<Self, CatalogError> {
        let pairs = catalog.forbidden_pairs();
        if pairs.len() != FORBIDDEN_PAIR_COUNT {
            return Err(CatalogError::ForbiddenPairCount(pairs.len()));
        }
        for &(from, to) in pairs {
            if from < 1 || from as usize > CLASS_COUNT || to < 1 || to as usize > CLASS_COUNT {
                return Err(CatalogError::ForbiddenPairOutOfRange(from, to));
            }
        }
        let forbidden: HashSet<(ClassId, ClassId)> = pairs.iter().copied().collect();

        let mut graph = DiGraph::with_capacity(
            CLASS_COUNT,
            CLASS_COUNT * CLASS_COUNT - FORBIDDEN_PAIR_COUNT,
        );
        let mut index = vec![NodeIndex::end(); CLASS_COUNT + 1];
        for id in common::class_ids() {
            index[id as usize] = graph.add_node(id);
        }
        for from in common::class_ids() {
            for to in common::class_ids() {
                if !forbidden.contains(&(from, to)) {
                    graph.add_edge(index[from as usize], index[to as usize], ());
                }
            }
        }

        Ok(Self { graph, forbidden })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// O(1) edge membership: present iff both ids are in range and the pair
    /// is not forbidden.
    pub fn contains_edge(&self, from: ClassId, to: ClassId) -> bool {
        (1..=CLASS_COUNT as ClassId).contains(&from)
            && (1..=CLASS_COUNT as ClassId).contains(&to)
            && !self.forbidden.contains(&(from, to))
    }

    pub fn graph(&self) -> &DiGraph<ClassId, ()> {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::GrammarCatalog;

    #[test]
    fn baseline_has_fixed_shape() {
        let catalog = GrammarCatalog::synthetic(&[7, 9, 23], &[]);
        let baseline = BaselineGraph::build(&catalog).unwrap();
        assert_eq!(baseline.node_count(), 49);
        assert_eq!(baseline.edge_count(), 49 * 49 - FORBIDDEN_PAIR_COUNT);
    }

    #[test]
    fn baseline_excludes_exactly_the_forbidden_pairs() {
        let catalog = GrammarCatalog::synthetic(&[], &[]);
        let baseline = BaselineGraph::build(&catalog).unwrap();
        // Synthetic forbidden chain is (1,2)..(17,18).
        for i in 1..=17 {
            assert!(!baseline.contains_edge(i, i + 1));
            assert!(baseline.contains_edge(i + 1, i));
        }
        assert!(baseline.contains_edge(1, 1));
        assert!(baseline.contains_edge(49, 49));
        assert!(!baseline.contains_edge(0, 1));
        assert!(!baseline.contains_edge(1, 50));
    }

    #[test]
    fn build_rejects_bad_forbidden_table() {
        struct BadTable {
            base: GrammarCatalog,
            pairs: Vec<(ClassId, ClassId)>,
        }
        impl ClassCatalog for BadTable {
            fn hazard(&self, id: ClassId) -> common::HazardKind {
                self.base.hazard(id)
            }
            fn role(&self, id: ClassId) -> &str {
                self.base.role(id)
            }
            fn vocabulary(&self, id: ClassId) -> &std::collections::BTreeSet<String> {
                self.base.vocabulary(id)
            }
            fn forbidden_pairs(&self) -> &[(ClassId, ClassId)] {
                &self.pairs
            }
        }

        let bad = BadTable {
            base: GrammarCatalog::synthetic(&[], &[]),
            pairs: vec![(1, 2), (3, 4)],
        };
        assert!(matches!(
            BaselineGraph::build(&bad),
            Err(CatalogError::ForbiddenPairCount(2))
        ));

        let mut pairs: Vec<(ClassId, ClassId)> = (1..=16).map(|i| (i, i + 1)).collect();
        pairs.push((50, 1));
        let bad = BadTable {
            base: GrammarCatalog::synthetic(&[], &[]),
            pairs,
        };
        assert!(matches!(
            BaselineGraph::build(&bad),
            Err(CatalogError::ForbiddenPairOutOfRange(50, 1))
        ));
    }
}
