//! # Cosurvival aggregation
//!
//! Runs the legality projection across a corpus of contexts (hundreds to
//! thousands) and aggregates what survives where:
//! - distinct survivor-set patterns and their frequency distribution;
//! - the always-survive core (classes reachable in every context);
//! - per-class survival rates;
//! - equivalence classes of classes that co-survive identically
//!   (pairwise Jaccard exactly 1.0) across all contexts.
//!
//! The batch is embarrassingly parallel: contexts are mapped with rayon,
//! each worker filling a private [`Tally`], and partials are merged once at
//! the end. No per-increment locking anywhere on the hot path.
//!
//! Per-context failures (a malformed field) are isolated: the context is
//! recorded as skipped and the batch continues. Projection-invariant
//! violations are different — they mean the aggregates would be corrupt, so
//! they halt the batch (assertion in debug builds, logged error in release).

use common::{ClassCatalog, ClassId, HazardKind, LegalityField, CLASS_COUNT};
use gauge::compute_state;
use loom::{project, BaselineGraph};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

/// Sorted reachable-class ids for one context. Hashable, so repeated
/// patterns across thousands of contexts collapse to one map entry.
pub type SurvivorPattern = Vec<ClassId>;

/// A context excluded from the batch, with the reason it was excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedContext {
    pub context_id: String,
    pub reason: String,
}

/// One distinct survivor pattern and how many contexts produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternCount {
    pub classes: SurvivorPattern,
    pub count: usize,
}

/// Aggregate results over one batch of contexts.
#[derive(Debug, Clone, Serialize)]
pub struct CosurvivalReport {
    /// Contexts that were projected and tallied.
    pub processed: usize,
    /// Contexts excluded from the batch, sorted by context id.
    pub skipped: Vec<SkippedContext>,
    /// Distinct survivor patterns, ascending by class set.
    pub patterns: Vec<PatternCount>,
    /// Classes reachable in every processed context. Empty over an empty
    /// batch.
    pub always_survive: BTreeSet<ClassId>,
    /// Fraction of processed contexts in which each class was reachable.
    /// 0.0 across the board over an empty batch.
    pub survival_rates: BTreeMap<ClassId, f64>,
    /// Buckets of classes with pairwise co-survival Jaccard exactly 1.0:
    /// always reachable together or always pruned together. Sorted within
    /// and across buckets.
    pub equivalence_classes: Vec<Vec<ClassId>>,
    /// Sum of surviving-edge counts across processed contexts.
    pub total_reachable_edges: u64,
    /// Sum of nontrivial SCC counts across processed contexts.
    pub total_scc_count: u64,
}

impl CosurvivalReport {
    pub fn distinct_patterns(&self) -> usize {
        self.patterns.len()
    }

    /// Total reachable-class count summed over all processed contexts.
    pub fn total_reachable(&self) -> u64 {
        self.patterns
            .iter()
            .map(|p| (p.classes.len() * p.count) as u64)
            .sum()
    }

    /// Patterns by descending frequency (ties broken by class set).
    pub fn pattern_histogram(&self) -> Vec<&PatternCount> {
        let mut ranked: Vec<&PatternCount> = self.patterns.iter().collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.classes.cmp(&b.classes)));
        ranked
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CensusError {
    /// An atomic-hazard class was not reachable in every context. Atomic
    /// classes are vocabulary-independent, so this is a catalog/data
    /// inconsistency, not a property of the corpus.
    #[error("atomic class {class} pruned in {lost} of {processed} contexts")]
    AtomicClassPruned {
        class: ClassId,
        lost: usize,
        processed: usize,
    },
    /// The projection produced a graph that breaks a structural invariant.
    /// Indicates a logic bug; the batch halts rather than emit corrupted
    /// aggregates.
    #[error("projection invariant violated for context {context_id:?}: {detail}")]
    InvariantViolation { context_id: String, detail: String },
}

/// Per-worker running tallies, merged pairwise at the end of the batch.
struct Tally {
    processed: usize,
    skipped: Vec<SkippedContext>,
    patterns: HashMap<SurvivorPattern, usize>,
    /// `survive[id]` = contexts in which class `id` was reachable.
    survive: [u32; CLASS_COUNT + 1],
    /// Flattened upper-triangle counts of contexts where both classes of a
    /// pair survived. Indexed through [`Tally::pair_slot`].
    both: Vec<u32>,
    total_reachable_edges: u64,
    total_scc_count: u64,
}

impl Tally {
    fn new() -> Self {
        Self {
            processed: 0,
            skipped: Vec::new(),
            patterns: HashMap::new(),
            survive: [0; CLASS_COUNT + 1],
            both: vec![0; (CLASS_COUNT + 1) * (CLASS_COUNT + 1)],
            total_reachable_edges: 0,
            total_scc_count: 0,
        }
    }

    fn pair_slot(low: ClassId, high: ClassId) -> usize {
        low as usize * (CLASS_COUNT + 1) + high as usize
    }

    fn both(&self, a: ClassId, b: ClassId) -> u32 {
        if a == b {
            self.survive[a as usize]
        } else {
            self.both[Self::pair_slot(a.min(b), a.max(b))]
        }
    }

    fn skip(&mut self, context_id: &str, reason: &str) {
        self.skipped.push(SkippedContext {
            context_id: context_id.to_string(),
            reason: reason.to_string(),
        });
    }

    fn record(
        &mut self,
        field: &LegalityField,
        baseline: &BaselineGraph,
        catalog: &(impl ClassCatalog + Sync),
    ) -> Result<(), CensusError> {
        let conditioned = project(baseline, field, catalog);
        verify_projection(&conditioned, baseline, catalog, &field.context_id)?;

        let state = compute_state(&conditioned, catalog, true);
        self.total_reachable_edges += state.reachable_edges as u64;
        self.total_scc_count += state.scc_count as u64;

        let survivors: SurvivorPattern = conditioned.reachable().iter().copied().collect();
        for (i, &a) in survivors.iter().enumerate() {
            self.survive[a as usize] += 1;
            for &b in &survivors[i + 1..] {
                self.both[Self::pair_slot(a, b)] += 1;
            }
        }
        *self.patterns.entry(survivors).or_insert(0) += 1;
        self.processed += 1;
        Ok(())
    }

    fn merge(mut self, other: Tally) -> Tally {
        self.processed += other.processed;
        self.skipped.extend(other.skipped);
        for (pattern, count) in other.patterns {
            *self.patterns.entry(pattern).or_insert(0) += count;
        }
        for id in 0..=CLASS_COUNT {
            self.survive[id] += other.survive[id];
        }
        for (slot, count) in self.both.iter_mut().zip(other.both) {
            *slot += count;
        }
        self.total_reachable_edges += other.total_reachable_edges;
        self.total_scc_count += other.total_scc_count;
        self
    }
}

/// Post-projection invariant checks. A failure here is a logic bug in the
/// projection, not a property of the corpus: the reachable/pruned sets must
/// partition the 49 classes, no atomic class may be pruned, and every
/// surviving edge must exist in the baseline.
fn verify_projection(
    conditioned: &loom::ConditionedGraph,
    baseline: &BaselineGraph,
    catalog: &impl ClassCatalog,
    context_id: &str,
) -> Result<(), CensusError> {
    let partition_ok = conditioned.reachable().len() + conditioned.pruned().len() == CLASS_COUNT;
    debug_assert!(partition_ok, "reachable/pruned do not partition the grammar");
    if !partition_ok {
        tracing::error!(context_id, "reachable/pruned do not partition the grammar");
        return Err(CensusError::InvariantViolation {
            context_id: context_id.to_string(),
            detail: "reachable + pruned != 49".to_string(),
        });
    }

    let pruned_atomic = conditioned
        .pruned()
        .iter()
        .find(|&&id| catalog.hazard(id) == HazardKind::Atomic);
    debug_assert!(pruned_atomic.is_none(), "atomic class pruned");
    if let Some(&id) = pruned_atomic {
        tracing::error!(context_id, class = id, "atomic class pruned");
        return Err(CensusError::InvariantViolation {
            context_id: context_id.to_string(),
            detail: format!("atomic class {} pruned", id),
        });
    }

    let foreign_edge = conditioned
        .edges()
        .find(|&(from, to)| !baseline.contains_edge(from, to));
    debug_assert!(foreign_edge.is_none(), "non-subtractive mask");
    if let Some((from, to)) = foreign_edge {
        tracing::error!(context_id, from, to, "conditioned edge absent from baseline");
        return Err(CensusError::InvariantViolation {
            context_id: context_id.to_string(),
            detail: format!("edge ({}, {}) absent from baseline", from, to),
        });
    }

    Ok(())
}

/// Aggregates projections over a batch of contexts.
pub fn aggregate(
    baseline: &BaselineGraph,
    catalog: &(impl ClassCatalog + Sync),
    contexts: &[LegalityField],
) -> Result<CosurvivalReport, CensusError> {
    aggregate_with_cancel(baseline, catalog, contexts, None)
}

/// [`aggregate`] with coarse-grained cancellation: the flag is checked once
/// per context, and contexts seen after it flips are recorded as skipped so
/// the partial run still reports accurate bookkeeping.
pub fn aggregate_with_cancel(
    baseline: &BaselineGraph,
    catalog: &(impl ClassCatalog + Sync),
    contexts: &[LegalityField],
    cancel: Option<&AtomicBool>,
) -> Result<CosurvivalReport, CensusError> {
    let tally = contexts
        .par_iter()
        .try_fold(Tally::new, |mut tally, field| {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                tally.skip(&field.context_id, "cancelled");
            } else if field.context_id.is_empty() {
                tally.skip(&field.context_id, "empty context id");
            } else {
                tally.record(field, baseline, catalog)?;
            }
            Ok(tally)
        })
        .try_reduce(Tally::new, |a, b| Ok(a.merge(b)))?;

    finalize(tally, catalog)
}

fn finalize(
    tally: Tally,
    catalog: &impl ClassCatalog,
) -> Result<CosurvivalReport, CensusError> {
    let processed = tally.processed;

    // Atomic classes are exempt from pruning by definition; anything less
    // than a 1.0 survival rate is a catalog/data inconsistency to surface.
    if processed > 0 {
        for id in catalog.ids_with_hazard(HazardKind::Atomic) {
            let survived = tally.survive[id as usize] as usize;
            if survived != processed {
                return Err(CensusError::AtomicClassPruned {
                    class: id,
                    lost: processed - survived,
                    processed,
                });
            }
        }
    }

    // Guarded ratio: zero contexts yields 0.0, never a division panic.
    let survival_rates: BTreeMap<ClassId, f64> = common::class_ids()
        .map(|id| {
            let rate = if processed == 0 {
                0.0
            } else {
                tally.survive[id as usize] as f64 / processed as f64
            };
            (id, rate)
        })
        .collect();

    let always_survive: BTreeSet<ClassId> = if processed == 0 {
        BTreeSet::new()
    } else {
        common::class_ids()
            .filter(|&id| tally.survive[id as usize] as usize == processed)
            .collect()
    };

    // Jaccard(i, j) == 1.0 iff |both| == |either|, i.e. the two classes
    // survived in exactly the same contexts (or were always pruned
    // together, 0 == 0). Set equality is transitive, so greedy grouping
    // against one representative per bucket is sound.
    let mut equivalence_classes: Vec<Vec<ClassId>> = Vec::new();
    for id in common::class_ids() {
        let bucket = equivalence_classes.iter_mut().find(|bucket| {
            let rep = bucket[0];
            let both = tally.both(rep, id);
            let either = tally.survive[rep as usize] + tally.survive[id as usize] - both;
            both == either
        });
        match bucket {
            Some(bucket) => bucket.push(id),
            None => equivalence_classes.push(vec![id]),
        }
    }

    let mut patterns: Vec<PatternCount> = tally
        .patterns
        .into_iter()
        .map(|(classes, count)| PatternCount { classes, count })
        .collect();
    patterns.sort_by(|a, b| a.classes.cmp(&b.classes));

    let mut skipped = tally.skipped;
    skipped.sort_by(|a, b| a.context_id.cmp(&b.context_id));

    tracing::debug!(
        processed,
        skipped = skipped.len(),
        distinct_patterns = patterns.len(),
        "cosurvival batch aggregated"
    );

    Ok(CosurvivalReport {
        processed,
        skipped,
        patterns,
        always_survive,
        survival_rates,
        equivalence_classes,
        total_reachable_edges: tally.total_reachable_edges,
        total_scc_count: tally.total_scc_count,
    })
}
