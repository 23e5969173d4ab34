//! SSA-based partial redundancy elimination with profile-bounded speculation.
//!
//! The pass removes computations that are redundant on some or all paths by
//! saving the first computation into a temporary, reloading the temporary
//! at later computations, and inserting new computations where a path lacks
//! one. Runtime checks are handled the same way, except that a redundant
//! check is deleted instead of reloaded.
//!
//! # Candidates
//!
//! Every lexically distinct pure expression and every distinct check is a
//! candidate. Candidates are processed one at a time, each through the same
//! pipeline:
//!
//! ```text
//!   candidate
//!       │
//!       ▼
//!   phi insertion ──► rename ──► availability ──► hoisting ──► finalize ──► code motion
//!                                    │                            │
//!                          classical │ or min cut         critical│edge
//!                                    ▼                            ▼
//!                        down-safe / later         retry once with the
//!                        full avail / flow         classical rules
//! ```
//!
//! # Speculation
//!
//! Without a profile the classical rules never insert a computation on a
//! path that would not have evaluated it. With a profile and
//! [`PreConfig::enable_min_cut`] set, expression candidates may be inserted
//! speculatively: the occurrence graph is reduced to a flow network whose
//! edge capacities are execution counts, and a minimum cut picks the cheapest
//! set of insertions. Checks can fault, so they never speculate.
//!
//! # Results
//!
//! [`SsaPrePass::run_function`] returns a [`PreOutcome`] with the counters of
//! the run, per-candidate [`CandidateReport`]s, and the [`SsaUpdateTable`]
//! listing every temporary and the blocks defining it.

mod analysis;
mod candidate;
mod codemotion;
mod dataflow;
mod engine;
mod finalize;
mod hoist;
mod mincut;
mod occurrence;
mod phis;
mod rename;

use std::collections::BTreeSet;

pub use candidate::{CandidateKey, CandidateShape, CheckKind, ExprOp};
pub use codemotion::{SsaUpdateEntry, SsaUpdateTable};
pub use mincut::CutEdge;

use crate::{
    analysis::{FrequencyProfile, Provenance, SsaFunction},
    compiler::{
        config::PreConfig,
        context::{CompilerContext, FunctionId},
        events::{EventKind, EventLog},
        pass::SsaPass,
    },
    Result,
};

use self::{
    analysis::FunctionAnalysis,
    candidate::Worklist,
    codemotion::{Edit, MotionPlan},
    engine::CandidateEngine,
};

/// Counters of one or more redundancy elimination runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreStats {
    /// Candidates that went through the pipeline.
    pub candidates: usize,
    /// Computations whose value was copied into a temporary.
    pub saves: usize,
    /// Computations replaced by a read of a temporary.
    pub reloads: usize,
    /// Computations or checks inserted at the end of a predecessor.
    pub insertions: usize,
    /// Phis of temporaries.
    pub temp_phis: usize,
    /// Redundant checks deleted.
    pub removed_statements: usize,
    /// Occurrences moved to a control-dependence point.
    pub hoisted: usize,
    /// Candidates recomputed after hitting a critical edge.
    pub retries: usize,
    /// Candidates placed by min cut.
    pub min_cut_candidates: usize,
}

impl PreStats {
    /// Returns `true` if the run changed the function.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.saves + self.reloads + self.insertions + self.temp_phis + self.removed_statements > 0
    }

    /// Adds the counters of `other`.
    pub fn accumulate(&mut self, other: &PreStats) {
        self.candidates += other.candidates;
        self.saves += other.saves;
        self.reloads += other.reloads;
        self.insertions += other.insertions;
        self.temp_phis += other.temp_phis;
        self.removed_statements += other.removed_statements;
        self.hoisted += other.hoisted;
        self.retries += other.retries;
        self.min_cut_candidates += other.min_cut_candidates;
    }

    fn add_report(&mut self, report: &CandidateReport) {
        self.candidates += 1;
        self.saves += report.saves;
        self.reloads += report.reloads;
        self.insertions += report.insertions;
        self.temp_phis += report.temp_phis;
        self.removed_statements += report.removed_checks;
        self.hoisted += report.hoisted;
        self.retries += usize::from(report.retried);
        self.min_cut_candidates += usize::from(report.min_cut_applied);
    }
}

/// Final facts of one phi occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiReport {
    /// Block of the phi.
    pub block: usize,
    /// The candidate is computed on every path from the phi to an exit.
    pub down_safe: bool,
    /// The value can be made available without unsafe insertions.
    pub can_be_avail: bool,
    /// Insertions for the phi can be postponed.
    pub later: bool,
    /// Every path into the phi already computes the candidate.
    pub fully_avail: bool,
    /// Some path from the phi reaches a computation.
    pub partial_ant: bool,
    /// The temporary will be defined at the phi.
    pub will_be_avail: bool,
    /// The phi turned out unnecessary during finalization.
    pub extraneous: bool,
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReport {
    /// The candidate.
    pub key: CandidateKey,
    /// Availability was decided by min cut.
    pub min_cut_applied: bool,
    /// Value of the maximum flow, zero without min cut.
    pub max_flow: u64,
    /// Augmenting routes found by the flow search.
    pub routes: usize,
    /// Edges of the minimum cut.
    pub cut: Vec<CutEdge>,
    /// The cut capacity equals the flow.
    pub exact_cut: bool,
    /// Phi occurrences in dominator tree preorder.
    pub phis: Vec<PhiReport>,
    /// Save count.
    pub saves: usize,
    /// Reload count.
    pub reloads: usize,
    /// Insertion count, checks included.
    pub insertions: usize,
    /// Checks deleted.
    pub removed_checks: usize,
    /// Computations emitted at control-dependence points.
    pub hoisted_computes: usize,
    /// Phis of the temporary.
    pub temp_phis: usize,
    /// Occurrences relabeled to a hoisted computation.
    pub hoisted: usize,
    /// Compare instructions consuming the candidate.
    pub compares: usize,
    /// The candidate was recomputed after hitting a critical edge.
    pub retried: bool,
}

impl CandidateReport {
    /// Returns the facts of the phi in `block`.
    #[must_use]
    pub fn phi_at(&self, block: usize) -> Option<&PhiReport> {
        self.phis.iter().find(|phi| phi.block == block)
    }
}

/// Result of running the pass over one function.
#[derive(Debug, Clone, Default)]
pub struct PreOutcome {
    /// Counters of the run.
    pub stats: PreStats,
    /// Temporaries introduced by the run.
    pub updates: SsaUpdateTable,
    /// One report per processed candidate, in processing order.
    pub reports: Vec<CandidateReport>,
}

impl PreOutcome {
    /// Returns `true` if the function changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.stats.changed()
    }

    /// Returns the report of the first candidate with `shape`.
    #[must_use]
    pub fn report_for(&self, shape: CandidateShape) -> Option<&CandidateReport> {
        self.reports.iter().find(|report| report.key.shape == shape)
    }
}

/// Partial redundancy elimination over expressions and runtime checks.
///
/// # Example
///
/// ```rust,ignore
/// use ssapre::prelude::*;
///
/// let pass = SsaPrePass::new(PreConfig::default());
/// let events = EventLog::new();
/// let outcome = pass.run_function(&mut ssa, Some(&profile), &events)?;
/// println!("{} reloads", outcome.stats.reloads);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SsaPrePass {
    config: PreConfig,
}

impl SsaPrePass {
    /// Creates the pass with `config`.
    #[must_use]
    pub fn new(config: PreConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PreConfig {
        &self.config
    }

    /// Runs redundancy elimination over `ssa`.
    ///
    /// # Arguments
    ///
    /// * `ssa` - The function to transform.
    /// * `profile` - Execution counts. Without one, nothing speculates.
    /// * `events` - Receives one event per change.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the function refers to missing
    /// variables or a candidate's occurrence graph turns out inconsistent.
    /// Candidates completed before the failure keep their changes.
    pub fn run_function(
        &self,
        ssa: &mut SsaFunction,
        profile: Option<&FrequencyProfile>,
        events: &EventLog,
    ) -> Result<PreOutcome> {
        self.process(ssa, profile, None, events)
    }

    fn process(
        &self,
        ssa: &mut SsaFunction,
        profile: Option<&FrequencyProfile>,
        function: Option<FunctionId>,
        events: &EventLog,
    ) -> Result<PreOutcome> {
        let mut outcome = PreOutcome::default();
        if !self.config.any_enabled() || ssa.is_empty() {
            return Ok(outcome);
        }

        let profile = profile.filter(|profile| !profile.is_empty());
        let analysis = FunctionAnalysis::new(ssa);
        let mut done: BTreeSet<CandidateKey> = BTreeSet::new();
        let mut worklist = Worklist::build(ssa, &analysis, &self.config)?;
        let mut number: u32 = 0;

        while number < self.config.pre_limit {
            let Some(index) = worklist
                .candidates
                .iter()
                .position(|candidate| !done.contains(&candidate.key) && self.enabled(candidate.key.shape))
            else {
                break;
            };
            number += 1;

            let candidate = &worklist.candidates[index];
            done.insert(candidate.key.clone());
            let min_cut = candidate.is_expression()
                && profile.is_some()
                && self.config.enable_min_cut
                && number <= self.config.pre_use_profile_limit;

            let engine = CandidateEngine::new(ssa, &analysis, &self.config, profile, &worklist, candidate, min_cut);
            let Some(result) = engine.run()? else {
                continue;
            };

            self.record_candidate(&result.plan, &result.report, function, events);
            outcome.stats.add_report(&result.report);
            outcome.reports.push(result.report);

            if result.plan.is_empty() {
                continue;
            }
            result.plan.apply(ssa, &mut outcome.updates)?;
            // Instruction positions moved, so every remaining site is stale.
            worklist = Worklist::build(ssa, &analysis, &self.config)?;
        }

        Ok(outcome)
    }

    fn enabled(&self, shape: CandidateShape) -> bool {
        if shape.is_expression() {
            self.config.enable_expression_pre
        } else {
            self.config.enable_statement_pre
        }
    }

    fn record_candidate(
        &self,
        plan: &MotionPlan,
        report: &CandidateReport,
        function: Option<FunctionId>,
        events: &EventLog,
    ) {
        let record = |kind: EventKind, block: Option<usize>, message: String| {
            let mut builder = events.record(kind).pass(self.name()).message(message);
            if let Some(function) = function {
                builder = builder.function(function);
            }
            if let Some(block) = block {
                builder = builder.location(block);
            }
            drop(builder);
        };

        let key = &report.key;
        if report.retried {
            record(EventKind::CriticalEdgeRetry, None, format!("{key}: retried without speculation"));
        }
        if report.min_cut_applied {
            record(
                EventKind::MinCutApplied,
                None,
                format!("{key}: flow {} over {} routes, {} cut edges", report.max_flow, report.routes, report.cut.len()),
            );
        }

        for edit in plan.edits() {
            let (kind, block, message) = match edit {
                Edit::SaveAfter { block, instr, .. } => (EventKind::ExpressionSaved, *block, format!("{key} at B{block}:{instr}")),
                Edit::Reload { block, instr, .. } => (EventKind::ExpressionReloaded, *block, format!("{key} at B{block}:{instr}")),
                Edit::Compute {
                    block,
                    provenance: Provenance::Hoist,
                    ..
                } => (EventKind::ExpressionHoisted, *block, format!("{key} to end of B{block}")),
                Edit::Compute { block, .. } | Edit::InsertCheck { block, .. } => {
                    (EventKind::ComputationInserted, *block, format!("{key} at end of B{block}"))
                }
                Edit::RemoveCheck { block, instr } => (EventKind::StatementRemoved, *block, format!("{key} at B{block}:{instr}")),
            };
            record(kind, Some(block), message);
        }
        for phi in &plan.temp_phis {
            record(EventKind::TemporaryPhiInserted, Some(phi.block), format!("{key} merged at B{}", phi.block));
        }

        record(
            EventKind::CandidateProcessed,
            None,
            format!(
                "{key}: {} saves, {} reloads, {} insertions",
                report.saves, report.reloads, report.insertions
            ),
        );
    }
}

impl SsaPass for SsaPrePass {
    fn name(&self) -> &'static str {
        "ssapre"
    }

    fn description(&self) -> &'static str {
        "Partial redundancy elimination with profile-bounded speculation"
    }

    fn should_run(&self, _function: FunctionId, _ctx: &CompilerContext) -> bool {
        self.config.any_enabled()
    }

    fn run_on_function(&self, ssa: &mut SsaFunction, function: FunctionId, ctx: &CompilerContext) -> Result<bool> {
        let profile = ctx.profile(function);

        ctx.events
            .record(EventKind::FunctionProcessingStarted)
            .function(function)
            .pass(self.name());
        let outcome = self.process(ssa, profile.as_ref(), Some(function), &ctx.events)?;
        ctx.events
            .record(EventKind::FunctionProcessingCompleted)
            .function(function)
            .pass(self.name())
            .message(format!("{} candidates", outcome.stats.candidates));

        let changed = outcome.changed();
        ctx.record_stats(function, &outcome.stats);
        ctx.record_updates(function, outcome.updates);
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DefSite, SsaFunctionBuilder};

    /// Both arms of a diamond and the merge compute a + b.
    fn full_redundancy() -> SsaFunction {
        SsaFunctionBuilder::new(3, 0).build_with(|f| {
            let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |blk| blk.branch(c, 1, 2));
            f.block(1, |blk| {
                let _ = blk.add(a, b);
                blk.jump(3);
            });
            f.block(2, |blk| {
                let _ = blk.add(a, b);
                blk.jump(3);
            });
            f.block(3, |blk| {
                let s = blk.add(a, b);
                blk.ret_val(s);
            });
        })
    }

    #[test]
    fn test_full_redundancy_reloads_merge() {
        let mut ssa = full_redundancy();
        let events = EventLog::new();
        let outcome = SsaPrePass::new(PreConfig::classical())
            .run_function(&mut ssa, None, &events)
            .unwrap();

        assert_eq!(outcome.stats.candidates, 1);
        assert_eq!(outcome.stats.saves, 2);
        assert_eq!(outcome.stats.reloads, 1);
        assert_eq!(outcome.stats.insertions, 0);
        assert_eq!(outcome.stats.temp_phis, 1);
        assert_eq!(outcome.updates.len(), 1);
        assert_eq!(events.count_kind(EventKind::ExpressionReloaded), 1);
        assert_eq!(events.count_kind(EventKind::CandidateProcessed), 1);
        assert_eq!(ssa.block(3).unwrap().instructions()[0].provenance(), Provenance::Reload);
    }

    #[test]
    fn test_temporary_phi_covers_unreachable_predecessor() {
        // The dead block 4 also jumps into the merge.
        let mut ssa = SsaFunctionBuilder::new(3, 0).build_with(|f| {
            let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |blk| blk.branch(c, 1, 2));
            f.block(1, |blk| {
                let _ = blk.add(a, b);
                blk.jump(3);
            });
            f.block(2, |blk| {
                let _ = blk.add(a, b);
                blk.jump(3);
            });
            f.block(3, |blk| {
                let s = blk.add(a, b);
                blk.ret_val(s);
            });
            f.block(4, |blk| blk.jump(3));
        });
        let outcome = SsaPrePass::new(PreConfig::classical())
            .run_function(&mut ssa, None, &EventLog::new())
            .unwrap();
        assert_eq!(outcome.stats.reloads, 1);
        assert_eq!(outcome.stats.insertions, 0);

        for block in [1, 2, 4] {
            let instructions = ssa.block(block).unwrap().instructions();
            assert!(instructions.iter().all(|instr| instr.provenance() != Provenance::Insertion));
        }
        let phi = &ssa.block(3).unwrap().phi_nodes()[0];
        assert_eq!(phi.operand_count(), 3);
        let dead = phi.operand_from(4).unwrap().value();
        assert_eq!(ssa.variable(dead).unwrap().def_site(), DefSite::Entry);
        for pred in [1, 2] {
            let live = phi.operand_from(pred).unwrap().value();
            let site = ssa.variable(live).unwrap().def_site();
            assert!(matches!(site, DefSite::Instruction { block, .. } if block == pred));
        }
    }

    #[test]
    fn test_disabled_kinds_are_skipped() {
        let mut ssa = full_redundancy();
        let config = PreConfig {
            enable_expression_pre: false,
            ..PreConfig::default()
        };
        let outcome = SsaPrePass::new(config)
            .run_function(&mut ssa, None, &EventLog::new())
            .unwrap();
        assert_eq!(outcome.stats, PreStats::default());
        assert!(!outcome.changed());
    }

    #[test]
    fn test_pre_limit_stops_early() {
        let mut ssa = SsaFunctionBuilder::new(2, 0).build_with(|f| {
            let (a, b) = (f.arg(0), f.arg(1));
            f.block(0, |blk| {
                let x = blk.add(a, b);
                let y = blk.add(a, b);
                let p = blk.mul(a, b);
                let q = blk.mul(a, b);
                let s = blk.sub(x, y);
                let t = blk.sub(p, q);
                let r = blk.add(s, t);
                blk.ret_val(r);
            });
        });
        let config = PreConfig {
            pre_limit: 1,
            ..PreConfig::classical()
        };
        let outcome = SsaPrePass::new(config)
            .run_function(&mut ssa, None, &EventLog::new())
            .unwrap();
        assert_eq!(outcome.stats.candidates, 1);
        assert_eq!(outcome.stats.reloads, 1);
    }

    #[test]
    fn test_pass_records_results_in_context() {
        let ctx = CompilerContext::new();
        let id = ctx.add_function(full_redundancy());
        let pass = SsaPrePass::new(PreConfig::classical());

        let mut ssa = ctx.take_function(id).unwrap();
        assert!(pass.run_on_function(&mut ssa, id, &ctx).unwrap());
        ctx.ssa_functions.insert(id, ssa);

        assert_eq!(ctx.stats(id).reloads, 1);
        assert_eq!(ctx.updates(id).map(|table| table.len()), Some(1));
        assert!(ctx.events.has(EventKind::FunctionProcessingCompleted));

        // A second run finds only the temporary's copies.
        let mut ssa = ctx.take_function(id).unwrap();
        assert!(!pass.run_on_function(&mut ssa, id, &ctx).unwrap());
    }

    #[test]
    fn test_stats_accumulate() {
        let mut total = PreStats::default();
        let run = PreStats {
            candidates: 2,
            reloads: 3,
            ..PreStats::default()
        };
        total.accumulate(&run);
        total.accumulate(&run);
        assert_eq!(total.candidates, 4);
        assert_eq!(total.reloads, 6);
        assert!(total.changed());
    }
}
