//! Built-in SSA optimization passes.
//!
//! Each pass implements [`SsaPass`](crate::compiler::SsaPass) and records its
//! modifications in the [`EventLog`](crate::compiler::EventLog) of the
//! [`CompilerContext`](crate::compiler::CompilerContext).
//!
//! | Pass | Description |
//! |------|-------------|
//! | [`SsaPrePass`] | Partial redundancy elimination over expressions and runtime checks, with profile-bounded speculation |
//!
//! # Pass Execution
//!
//! Passes are executed by the [`PassScheduler`](crate::compiler::PassScheduler),
//! which repeats the pass sequence until no function changes. Redundancy
//! elimination can also be run directly on a single function through
//! [`SsaPrePass::run_function`].

mod ssapre;

pub use ssapre::{
    CandidateKey, CandidateReport, CandidateShape, CheckKind, CutEdge, ExprOp, PhiReport,
    PreOutcome, PreStats, SsaPrePass, SsaUpdateEntry, SsaUpdateTable,
};
