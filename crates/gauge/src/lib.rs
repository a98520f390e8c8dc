//! # Graph-state metrics
//!
//! Aggregated metrics over one conditioned graph: reachable node/edge
//! counts, the hazard-suppression split, and the count of nontrivial
//! strongly-connected components.
//!
//! Pure computation over already-validated graphs — no I/O, no `Result`.
//! An inconsistency here is a programmer error in the projection, caught by
//! `debug_assert!` rather than recovered from.

use common::{ClassCatalog, ClassId, HazardKind, CLASS_COUNT, FORBIDDEN_PAIR_COUNT};
use loom::ConditionedGraph;
use petgraph::graph::{DiGraph, Neighbors, NodeIndex};
use petgraph::Direction;
use serde::Serialize;

/// Metrics snapshot for one conditioned graph. Never mutated after
/// construction; serialized as-is for the downstream JSON export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphState {
    /// 49 for an unconditioned query; otherwise the count of surviving
    /// classes with at least one incident edge. A surviving node with zero
    /// edges is present but not usable, and is not counted.
    pub reachable_classes: usize,
    pub reachable_edges: usize,
    /// Constant by definition: masking never changes the forbidden table.
    pub forbidden_edges: usize,
    /// Atomic-hazard classes in the catalog. They can never be suppressed.
    pub atomic_hazards: usize,
    /// Decomposable-hazard classes with nonzero total degree (in + out).
    pub decomposable_hazards_active: usize,
    pub decomposable_hazards_suppressed: usize,
    /// Strongly-connected components of size > 1, plus size-1 components
    /// with a self-loop. Singleton acyclic components are not cycles.
    pub scc_count: usize,
}

/// Computes the metrics snapshot for a conditioned graph.
///
/// `is_conditioned = false` answers the unconditioned/baseline query, where
/// all 49 classes count as reachable regardless of degree.
pub fn compute_state(
    conditioned: &ConditionedGraph,
    catalog: &impl ClassCatalog,
    is_conditioned: bool,
) -> GraphState {
    debug_assert!(conditioned
        .graph()
        .node_indices()
        .all(|n| (1..=CLASS_COUNT as ClassId).contains(&conditioned.graph()[n])));

    let reachable_classes = if is_conditioned {
        conditioned
            .reachable()
            .iter()
            .filter(|&&id| conditioned.has_incident_edges(id))
            .count()
    } else {
        CLASS_COUNT
    };

    let decomposable = catalog.ids_with_hazard(HazardKind::Decomposable);
    let decomposable_hazards_active = decomposable
        .iter()
        .filter(|&&id| conditioned.has_incident_edges(id))
        .count();

    GraphState {
        reachable_classes,
        reachable_edges: conditioned.edge_count(),
        forbidden_edges: FORBIDDEN_PAIR_COUNT,
        atomic_hazards: catalog.ids_with_hazard(HazardKind::Atomic).len(),
        decomposable_hazards_active,
        decomposable_hazards_suppressed: decomposable.len() - decomposable_hazards_active,
        scc_count: nontrivial_scc_count(conditioned.graph()),
    }
}

/// Counts nontrivial strongly-connected components via the iterative
/// two-pass (Kosaraju) algorithm.
///
/// Pass 1 is a stack-based post-order traversal of the forward graph to
/// obtain a finish ordering; pass 2 sweeps nodes in reverse finish order
/// over the reverse adjacency to extract components. Stack-based rather
/// than recursive, so denser future graphs cannot hit recursion limits.
pub fn nontrivial_scc_count(graph: &DiGraph<ClassId, ()>) -> usize {
    kosaraju_components(graph)
        .into_iter()
        .filter(|comp| comp.len() > 1 || graph.find_edge(comp[0], comp[0]).is_some())
        .count()
}

fn kosaraju_components(graph: &DiGraph<ClassId, ()>) -> Vec<Vec<NodeIndex>> {
    // Node indices are contiguous (the graph is built once, no removals),
    // so plain index-by-position bitmaps suffice.
    let n = graph.node_count();
    let mut finish: Vec<NodeIndex> = Vec::with_capacity(n);
    let mut visited = vec![false; n];

    for start in graph.node_indices() {
        if visited[start.index()] {
            continue;
        }
        visited[start.index()] = true;
        let mut stack: Vec<(NodeIndex, Neighbors<'_, ()>)> =
            vec![(start, graph.neighbors_directed(start, Direction::Outgoing))];
        loop {
            let next = match stack.last_mut() {
                Some((_, succ)) => succ.next(),
                None => break,
            };
            match next {
                Some(node) if !visited[node.index()] => {
                    visited[node.index()] = true;
                    stack.push((node, graph.neighbors_directed(node, Direction::Outgoing)));
                }
                Some(_) => {}
                None => {
                    if let Some((node, _)) = stack.pop() {
                        finish.push(node);
                    }
                }
            }
        }
    }

    let mut assigned = vec![false; n];
    let mut components = Vec::new();
    for &root in finish.iter().rev() {
        if assigned[root.index()] {
            continue;
        }
        assigned[root.index()] = true;
        let mut component = vec![root];
        let mut worklist = vec![root];
        while let Some(node) = worklist.pop() {
            for prev in graph.neighbors_directed(node, Direction::Incoming) {
                if !assigned[prev.index()] {
                    assigned[prev.index()] = true;
                    component.push(prev);
                    worklist.push(prev);
                }
            }
        }
        components.push(component);
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{GrammarCatalog, LegalityField};
    use loom::{project, BaselineGraph};
    use petgraph::algo::tarjan_scc;

    /// 6-node synthetic graph: a 2-cycle (0 <-> 1), a chain 2 -> 3 -> 4,
    /// a self-loop on 5.
    fn six_node_graph() -> DiGraph<ClassId, ()> {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (1..=6).map(|id| graph.add_node(id as ClassId)).collect();
        graph.add_edge(nodes[0], nodes[1], ());
        graph.add_edge(nodes[1], nodes[0], ());
        graph.add_edge(nodes[2], nodes[3], ());
        graph.add_edge(nodes[3], nodes[4], ());
        graph.add_edge(nodes[5], nodes[5], ());
        graph
    }

    #[test]
    fn kosaraju_matches_tarjan_reference() {
        let graph = six_node_graph();

        let ours = nontrivial_scc_count(&graph);
        let reference = tarjan_scc(&graph)
            .into_iter()
            .filter(|comp| comp.len() > 1 || graph.find_edge(comp[0], comp[0]).is_some())
            .count();

        // 2-cycle + self-loop singleton; the chain contributes nothing.
        assert_eq!(ours, 2);
        assert_eq!(ours, reference);
    }

    #[test]
    fn kosaraju_partitions_all_nodes() {
        let graph = six_node_graph();
        let components = kosaraju_components(&graph);
        let total: usize = components.iter().map(|c| c.len()).sum();
        assert_eq!(total, graph.node_count());
        // {0,1}, {2}, {3}, {4}, {5}
        assert_eq!(components.len(), 5);
    }

    #[test]
    fn empty_graph_has_no_components() {
        let graph = DiGraph::<ClassId, ()>::new();
        assert_eq!(nontrivial_scc_count(&graph), 0);
    }

    #[test]
    fn unconditioned_baseline_state() {
        let catalog = GrammarCatalog::synthetic(&[7, 9, 23], &[]);
        let baseline = BaselineGraph::build(&catalog).unwrap();
        let unmasked = loom::ConditionedGraph::unmasked(&baseline);
        let state = compute_state(&unmasked, &catalog, false);

        assert_eq!(state.reachable_classes, 49);
        assert_eq!(state.reachable_edges, 49 * 49 - 17);
        assert_eq!(state.forbidden_edges, 17);
        assert_eq!(state.atomic_hazards, 3);
        // The whole baseline is densely connected: one big component.
        assert_eq!(state.scc_count, 1);
    }

    #[test]
    fn hazard_split_follows_the_mask() {
        let catalog = GrammarCatalog::synthetic(&[7, 9, 23], &[(5, &["x"])]);
        let baseline = BaselineGraph::build(&catalog).unwrap();
        let conditioned = project(&baseline, &LegalityField::new("f", ["x"]), &catalog);
        let state = compute_state(&conditioned, &catalog, true);

        // Survivors {5,7,9,23} sit outside the forbidden chain (1,2)..(17,18)
        // except (5,6)/(6,7)/(8,9)/(9,10)/(22,23)/(23,24), none of which joins
        // two survivors, so the surviving subgraph is complete: 16 edges.
        assert_eq!(state.reachable_edges, 16);
        assert_eq!(state.reachable_classes, 4);
        assert_eq!(state.atomic_hazards, 3);
        // Only class 5 among the 46 decomposable classes kept any edges.
        assert_eq!(state.decomposable_hazards_active, 1);
        assert_eq!(state.decomposable_hazards_suppressed, 45);
        assert_eq!(state.scc_count, 1);
    }

    #[test]
    fn isolated_survivor_is_not_counted_reachable() {
        // Forbidden pairs sever class 1 from the surviving pair {1, 2}:
        // (1,1), (1,2), (2,1) all forbidden, leaving only (2,2).
        let mut forbidden: Vec<(ClassId, ClassId)> = vec![(1, 1), (1, 2), (2, 1)];
        forbidden.extend((30..44).map(|i| (i, i + 1)));
        assert_eq!(forbidden.len(), 17);

        let classes = common::class_ids()
            .map(|id| {
                let vocabulary = if id <= 2 {
                    ["x".to_string()].into_iter().collect()
                } else {
                    Default::default()
                };
                (
                    id,
                    common::ClassRecord {
                        role: "core".to_string(),
                        hazard: HazardKind::Decomposable,
                        vocabulary,
                    },
                )
            })
            .collect();
        let catalog = GrammarCatalog::new(classes, forbidden).unwrap();
        let baseline = BaselineGraph::build(&catalog).unwrap();
        let conditioned = project(&baseline, &LegalityField::new("f", ["x"]), &catalog);

        assert_eq!(conditioned.reachable().len(), 2);
        let state = compute_state(&conditioned, &catalog, true);
        // Class 1 survived the mask but is edgeless: present, not usable.
        assert_eq!(state.reachable_classes, 1);
        assert_eq!(state.reachable_edges, 1);
        // The lone (2,2) self-loop is a nontrivial singleton component.
        assert_eq!(state.scc_count, 1);
        assert_eq!(state.decomposable_hazards_active, 1);
        assert_eq!(state.decomposable_hazards_suppressed, 48);
    }
}
