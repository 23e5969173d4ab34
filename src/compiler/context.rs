//! Compiler context shared by the passes of a pipeline run.
//!
//! The [`CompilerContext`] owns every function under optimization together
//! with its frequency profile, the event log, and the per-function results
//! that redundancy elimination hands to later SSA maintenance.

use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use dashmap::{DashMap, DashSet};

use crate::{
    analysis::{FrequencyProfile, SsaFunction},
    compiler::{
        events::EventLog,
        passes::{PreStats, SsaUpdateTable},
    },
};

/// Identifies a function registered with a [`CompilerContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(usize);

impl FunctionId {
    /// Creates a function identifier from its index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Shared state for one optimization pipeline.
///
/// All maps are concurrent so that passes can process functions in parallel.
/// A pass removes the function it works on from [`ssa_functions`](Self::ssa_functions),
/// transforms it without holding a lock, and inserts it back.
pub struct CompilerContext {
    /// SSA form of every function, keyed by identifier.
    pub ssa_functions: DashMap<FunctionId, SsaFunction>,

    /// Execution profiles. Functions without an entry are optimized with the
    /// non-speculative rules.
    pub profiles: DashMap<FunctionId, FrequencyProfile>,

    /// Transformation and diagnostic events.
    pub events: EventLog,

    /// Functions changed by at least one pass.
    pub processed_functions: DashSet<FunctionId>,

    /// New temporaries and their definition blocks, for SSA maintenance.
    pub ssa_updates: DashMap<FunctionId, SsaUpdateTable>,

    /// Redundancy elimination counters per function, accumulated over runs.
    pub pre_stats: DashMap<FunctionId, PreStats>,

    next_id: AtomicUsize,

    start_time: Instant,
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ssa_functions: DashMap::new(),
            profiles: DashMap::new(),
            events: EventLog::new(),
            processed_functions: DashSet::new(),
            ssa_updates: DashMap::new(),
            pre_stats: DashMap::new(),
            next_id: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    // ── Function registry ───────────────────────────────────────────────

    /// Registers a function and returns its identifier.
    ///
    /// Identifiers are assigned densely in registration order.
    pub fn add_function(&self, ssa: SsaFunction) -> FunctionId {
        let id = FunctionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.ssa_functions.insert(id, ssa);
        id
    }

    /// Registers a function together with its execution profile.
    pub fn add_profiled_function(&self, ssa: SsaFunction, profile: FrequencyProfile) -> FunctionId {
        let id = self.add_function(ssa);
        self.profiles.insert(id, profile);
        id
    }

    /// Attaches or replaces the profile of `function`.
    pub fn set_profile(&self, function: FunctionId, profile: FrequencyProfile) {
        self.profiles.insert(function, profile);
    }

    /// Returns a copy of the profile of `function`, if any.
    #[must_use]
    pub fn profile(&self, function: FunctionId) -> Option<FrequencyProfile> {
        self.profiles.get(&function).map(|entry| entry.value().clone())
    }

    /// Returns all registered identifiers in ascending order.
    #[must_use]
    pub fn function_ids(&self) -> Vec<FunctionId> {
        let mut ids: Vec<FunctionId> = self.ssa_functions.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Returns a copy of the current SSA form of `function`.
    #[must_use]
    pub fn function(&self, function: FunctionId) -> Option<SsaFunction> {
        self.ssa_functions
            .get(&function)
            .map(|entry| entry.value().clone())
    }

    /// Removes a function from the context and returns it.
    pub fn take_function(&self, function: FunctionId) -> Option<SsaFunction> {
        self.ssa_functions.remove(&function).map(|(_, ssa)| ssa)
    }

    // ── Processing state ────────────────────────────────────────────────

    /// Marks `function` as changed.
    pub fn mark_processed(&self, function: FunctionId) {
        self.processed_functions.insert(function);
    }

    /// Returns `true` if some pass changed `function`.
    #[must_use]
    pub fn is_processed(&self, function: FunctionId) -> bool {
        self.processed_functions.contains(&function)
    }

    // ── Redundancy elimination results ──────────────────────────────────

    /// Merges a run's SSA update entries into those already recorded.
    pub fn record_updates(&self, function: FunctionId, updates: SsaUpdateTable) {
        if updates.is_empty() {
            return;
        }
        self.ssa_updates
            .entry(function)
            .or_default()
            .merge(updates);
    }

    /// Returns a copy of the SSA update entries of `function`.
    #[must_use]
    pub fn updates(&self, function: FunctionId) -> Option<SsaUpdateTable> {
        self.ssa_updates
            .get(&function)
            .map(|entry| entry.value().clone())
    }

    /// Adds a run's counters to those already recorded.
    pub fn record_stats(&self, function: FunctionId, stats: &PreStats) {
        self.pre_stats.entry(function).or_default().accumulate(stats);
    }

    /// Returns the accumulated counters of `function`.
    #[must_use]
    pub fn stats(&self, function: FunctionId) -> PreStats {
        self.pre_stats
            .get(&function)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SsaFunctionBuilder;

    fn trivial() -> SsaFunction {
        SsaFunctionBuilder::new(0, 0)
            .build_with(|f| {
                f.block(0, |b| b.ret());
            })
    }

    #[test]
    fn test_function_ids_are_dense() {
        let ctx = CompilerContext::new();
        let a = ctx.add_function(trivial());
        let b = ctx.add_profiled_function(trivial(), FrequencyProfile::new().with_block(0, 4));
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(ctx.function_ids(), vec![a, b]);
        assert!(ctx.profile(a).is_none());
        assert_eq!(ctx.profile(b).map(|p| p.block_frequency(0)), Some(4));
        assert_eq!(b.to_string(), "fn1");
    }

    #[test]
    fn test_take_and_processed() {
        let ctx = CompilerContext::new();
        let id = ctx.add_function(trivial());
        assert!(ctx.function(id).is_some());
        assert!(!ctx.is_processed(id));
        ctx.mark_processed(id);
        assert!(ctx.is_processed(id));
        assert!(ctx.take_function(id).is_some());
        assert!(ctx.function(id).is_none());
    }

    #[test]
    fn test_stats_default_to_zero() {
        let ctx = CompilerContext::new();
        let id = FunctionId::new(7);
        assert_eq!(ctx.stats(id), PreStats::default());
        assert!(ctx.updates(id).is_none());
    }
}
