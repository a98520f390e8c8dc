//! Subtractive legality projection.
//!
//! A projection asks, per class: is this class supported by the context's
//! legality field? Atomic-hazard classes are vocabulary-independent and
//! always survive; every other class survives only if its vocabulary
//! intersects the field. Unsupported classes are pruned together with their
//! incident edges. Masking is strictly subtractive: the conditioned graph's
//! edge set is always a subset of the baseline's.

use crate::BaselineGraph;
use common::{ClassCatalog, ClassId, HazardKind, LegalityField, CLASS_COUNT};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::BTreeSet;

/// Reporting disposition of one class after a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeDisposition<'a> {
    /// Removed by the legality mask.
    Pruned,
    /// Survived; carries the role tag inherited unchanged from the catalog.
    Role(&'a str),
}

/// One context's view of the grammar: the baseline minus every class the
/// legality field cannot support.
///
/// Short-lived — created by [`project`], consumed by state computation, then
/// discarded. Never mutated after creation.
pub struct ConditionedGraph {
    graph: DiGraph<ClassId, ()>,
    index: Vec<NodeIndex>,
    reachable: BTreeSet<ClassId>,
    pruned: BTreeSet<ClassId>,
}

impl ConditionedGraph {
    /// Classes that survived the mask, ascending.
    pub fn reachable(&self) -> &BTreeSet<ClassId> {
        &self.reachable
    }

    /// Classes removed by the mask, ascending.
    pub fn pruned(&self) -> &BTreeSet<ClassId> {
        &self.pruned
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn graph(&self) -> &DiGraph<ClassId, ()> {
        &self.graph
    }

    pub fn node_index(&self, id: ClassId) -> Option<NodeIndex> {
        let idx = self.index[id as usize];
        (idx != NodeIndex::end()).then_some(idx)
    }

    /// Surviving edges as `(from, to)` class-id pairs.
    pub fn edges(&self) -> impl Iterator<Item = (ClassId, ClassId)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (self.graph[e.source()], self.graph[e.target()]))
    }

    /// True if the class survived and has at least one incident edge
    /// (in or out, self-loops included).
    pub fn has_incident_edges(&self, id: ClassId) -> bool {
        match self.node_index(id) {
            Some(idx) => {
                self.graph
                    .edges_directed(idx, Direction::Outgoing)
                    .next()
                    .is_some()
                    || self
                        .graph
                        .edges_directed(idx, Direction::Incoming)
                        .next()
                        .is_some()
            }
            None => false,
        }
    }

    /// Post-projection disposition of a class for downstream reporting.
    pub fn disposition<'a>(
        &self,
        id: ClassId,
        catalog: &'a impl ClassCatalog,
    ) -> NodeDisposition<'a> {
        if self.pruned.contains(&id) {
            NodeDisposition::Pruned
        } else {
            NodeDisposition::Role(catalog.role(id))
        }
    }

    /// The baseline itself viewed as a conditioned graph with nothing pruned.
    /// Used for unconditioned state queries.
    pub fn unmasked(baseline: &BaselineGraph) -> Self {
        let mut graph = DiGraph::with_capacity(baseline.node_count(), baseline.edge_count());
        let mut index = vec![NodeIndex::end(); CLASS_COUNT + 1];
        let mut reachable = BTreeSet::new();
        for id in common::class_ids() {
            index[id as usize] = graph.add_node(id);
            reachable.insert(id);
        }
        for edge in baseline.graph().edge_references() {
            let from = baseline.graph()[edge.source()];
            let to = baseline.graph()[edge.target()];
            graph.add_edge(index[from as usize], index[to as usize], ());
        }
        Self {
            graph,
            index,
            reachable,
            pruned: BTreeSet::new(),
        }
    }
}

/// Applies one legality field to the baseline.
///
/// A class survives iff it is atomic or its vocabulary intersects the field.
/// An empty field therefore yields exactly the atomic classes — never an
/// all-pruned graph. Atoms unknown to every class vocabulary are inert.
pub fn project(
    baseline: &BaselineGraph,
    field: &LegalityField,
    catalog: &impl ClassCatalog,
) -> ConditionedGraph {
    let mut reachable = BTreeSet::new();
    let mut pruned = BTreeSet::new();
    for id in common::class_ids() {
        let survives = catalog.hazard(id) == HazardKind::Atomic
            || field.supports(catalog.vocabulary(id));
        if survives {
            reachable.insert(id);
        } else {
            pruned.insert(id);
        }
    }
    debug_assert_eq!(reachable.len() + pruned.len(), CLASS_COUNT);

    let mut graph = DiGraph::with_capacity(reachable.len(), baseline.edge_count());
    let mut index = vec![NodeIndex::end(); CLASS_COUNT + 1];
    for &id in &reachable {
        index[id as usize] = graph.add_node(id);
    }
    // Surviving edges come only from baseline enumeration, so the result is
    // subtractive by construction.
    for edge in baseline.graph().edge_references() {
        let from = baseline.graph()[edge.source()];
        let to = baseline.graph()[edge.target()];
        let (src, dst) = (index[from as usize], index[to as usize]);
        if src != NodeIndex::end() && dst != NodeIndex::end() {
            graph.add_edge(src, dst, ());
        }
    }

    ConditionedGraph {
        graph,
        index,
        reachable,
        pruned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::GrammarCatalog;

    fn scenario_catalog() -> GrammarCatalog {
        // Classes 7, 9, 23 atomic; class 5 carries vocabulary {"x"};
        // all others decomposable with no vocabulary.
        GrammarCatalog::synthetic(&[7, 9, 23], &[(5, &["x"])])
    }

    #[test]
    fn end_to_end_scenario() {
        let catalog = scenario_catalog();
        let baseline = BaselineGraph::build(&catalog).unwrap();
        let field = LegalityField::new("a-record-1", ["x"]);
        let conditioned = project(&baseline, &field, &catalog);

        let expect: BTreeSet<ClassId> = [5, 7, 9, 23].into_iter().collect();
        assert_eq!(conditioned.reachable(), &expect);
        assert_eq!(conditioned.pruned().len(), 45);
        assert_eq!(conditioned.reachable().len() + conditioned.pruned().len(), 49);
    }

    #[test]
    fn empty_field_yields_atomic_classes_only() {
        let catalog = scenario_catalog();
        let baseline = BaselineGraph::build(&catalog).unwrap();
        let field = LegalityField::new("empty", Vec::<String>::new());
        let conditioned = project(&baseline, &field, &catalog);

        let expect: BTreeSet<ClassId> = [7, 9, 23].into_iter().collect();
        assert_eq!(conditioned.reachable(), &expect);
    }

    #[test]
    fn unknown_atoms_are_inert() {
        let catalog = scenario_catalog();
        let baseline = BaselineGraph::build(&catalog).unwrap();
        let with_junk = project(
            &baseline,
            &LegalityField::new("junk", ["x", "zzz", "qqq"]),
            &catalog,
        );
        let without = project(&baseline, &LegalityField::new("clean", ["x"]), &catalog);
        assert_eq!(with_junk.reachable(), without.reachable());
        assert_eq!(with_junk.edge_count(), without.edge_count());
    }

    #[test]
    fn masking_is_subtractive() {
        let catalog = scenario_catalog();
        let baseline = BaselineGraph::build(&catalog).unwrap();
        let field = LegalityField::new("f", ["x"]);
        let conditioned = project(&baseline, &field, &catalog);

        for (from, to) in conditioned.edges() {
            assert!(baseline.contains_edge(from, to));
        }
        assert!(conditioned.edge_count() <= baseline.edge_count());
    }

    #[test]
    fn monotonic_under_field_growth() {
        let catalog = GrammarCatalog::synthetic(
            &[7],
            &[(5, &["x"]), (11, &["y"]), (12, &["y", "z"])],
        );
        let baseline = BaselineGraph::build(&catalog).unwrap();

        let small = project(&baseline, &LegalityField::new("a", ["x"]), &catalog);
        let large = project(&baseline, &LegalityField::new("b", ["x", "y"]), &catalog);

        assert!(small.reachable().is_subset(large.reachable()));
        assert!(large.pruned().is_subset(small.pruned()));
    }

    #[test]
    fn disposition_marks_pruned_and_inherits_roles() {
        let catalog = scenario_catalog();
        let baseline = BaselineGraph::build(&catalog).unwrap();
        let conditioned = project(&baseline, &LegalityField::new("f", ["x"]), &catalog);

        assert_eq!(conditioned.disposition(6, &catalog), NodeDisposition::Pruned);
        assert_eq!(
            conditioned.disposition(7, &catalog),
            NodeDisposition::Role("kernel")
        );
        assert_eq!(
            conditioned.disposition(5, &catalog),
            NodeDisposition::Role("core")
        );
    }

    #[test]
    fn unmasked_mirrors_the_baseline() {
        let catalog = scenario_catalog();
        let baseline = BaselineGraph::build(&catalog).unwrap();
        let unmasked = ConditionedGraph::unmasked(&baseline);
        assert_eq!(unmasked.node_count(), baseline.node_count());
        assert_eq!(unmasked.edge_count(), baseline.edge_count());
        assert!(unmasked.pruned().is_empty());
    }
}
