//! # Invariance auditor
//!
//! Tests whether a class behaves as hidden infrastructure: aggregate a
//! bundle sample with the unmodified catalog, re-aggregate with the
//! candidate temporarily treated as atomic (vocabulary-independent), and
//! report the marginal change in aggregate reachability.
//!
//! The "modification" is a [`HazardOverlay`] scoped to the single audit
//! call — the shared catalog is never touched, so audits of different
//! candidates can run concurrently without interfering.

use census::{aggregate, CensusError, CosurvivalReport};
use common::{CatalogError, ClassId, GrammarCatalog, HazardOverlay, LegalityField};
use loom::BaselineGraph;
use rayon::prelude::*;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Census(#[from] CensusError),
}

/// Marginal effect of exempting one candidate class from pruning,
/// measured over a sample of contexts.
#[derive(Debug, Clone, Serialize)]
pub struct ImmunityResult {
    pub candidate: ClassId,
    /// Contexts actually tallied (malformed ones are skipped either way).
    pub sample_size: usize,
    /// Candidate's survival rate before exemption — 1.0 here means the
    /// exemption can change nothing.
    pub candidate_survival_rate: f64,
    /// Reachable-class totals summed over the sample, before and after.
    pub baseline_total_reachable: u64,
    pub exempt_total_reachable: u64,
    pub reachable_delta: i64,
    /// Always-survive core sizes, before and after.
    pub baseline_core_size: usize,
    pub exempt_core_size: usize,
    pub core_delta: i64,
    /// Surviving-edge totals summed over the sample, before and after.
    pub baseline_total_edges: u64,
    pub exempt_total_edges: u64,
    pub edge_delta: i64,
}

impl ImmunityResult {
    fn from_reports(
        candidate: ClassId,
        baseline: &CosurvivalReport,
        exempt: &CosurvivalReport,
    ) -> Self {
        let baseline_total_reachable = baseline.total_reachable();
        let exempt_total_reachable = exempt.total_reachable();
        Self {
            candidate,
            sample_size: baseline.processed,
            candidate_survival_rate: baseline
                .survival_rates
                .get(&candidate)
                .copied()
                .unwrap_or(0.0),
            baseline_total_reachable,
            exempt_total_reachable,
            reachable_delta: exempt_total_reachable as i64 - baseline_total_reachable as i64,
            baseline_core_size: baseline.always_survive.len(),
            exempt_core_size: exempt.always_survive.len(),
            core_delta: exempt.always_survive.len() as i64 - baseline.always_survive.len() as i64,
            baseline_total_edges: baseline.total_reachable_edges,
            exempt_total_edges: exempt.total_reachable_edges,
            edge_delta: exempt.total_reachable_edges as i64
                - baseline.total_reachable_edges as i64,
        }
    }
}

/// Audits one candidate class over a sample of contexts.
pub fn audit_class(
    candidate: ClassId,
    sample_contexts: &[LegalityField],
    baseline: &BaselineGraph,
    catalog: &GrammarCatalog,
) -> Result<ImmunityResult, ProbeError> {
    let unmodified = aggregate(baseline, catalog, sample_contexts)?;

    let overlay = HazardOverlay::exempting(catalog, candidate)?;
    let exempt = aggregate(baseline, &overlay, sample_contexts)?;

    let result = ImmunityResult::from_reports(candidate, &unmodified, &exempt);
    tracing::debug!(
        candidate,
        delta = result.reachable_delta,
        "invariance audit complete"
    );
    Ok(result)
}

/// Audits several candidates in parallel. Each audit gets its own overlay
/// over the shared immutable catalog, so candidates never interfere.
pub fn audit_classes(
    candidates: &[ClassId],
    sample_contexts: &[LegalityField],
    baseline: &BaselineGraph,
    catalog: &GrammarCatalog,
) -> Result<Vec<ImmunityResult>, ProbeError> {
    candidates
        .par_iter()
        .map(|&candidate| audit_class(candidate, sample_contexts, baseline, catalog))
        .collect()
}
