//! Compiler infrastructure for SSA-based code transformations.
//!
//! This module sits on top of the SSA form in [`crate::analysis`] and
//! provides everything needed to run redundancy elimination over a set of
//! functions:
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  CompilerContext              Shared state of one run            │
//! │    ├─ SSA functions           (per-function SSA and profile)     │
//! │    ├─ SSA update tables       (temporaries for SSA repair)       │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  PassScheduler               Fixpoint execution                  │
//! │    Functions run in parallel; the sequence repeats until stable  │
//! │                                                                  │
//! │  SsaPass trait               Interface for all passes            │
//! │    ├─ run_on_function()       Per-function transformation        │
//! │    ├─ initialize()            Setup before each iteration        │
//! │    └─ finalize()              Cleanup after each iteration       │
//! │                                                                  │
//! │  SsaPrePass                  Partial redundancy elimination      │
//! │    ├─ Expressions             save / reload / insert             │
//! │    ├─ Runtime checks          remove / insert                    │
//! │    └─ Speculation             min cut over profile counts        │
//! │                                                                  │
//! │  PreConfig                   Limits and feature switches         │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod context;
mod events;
mod pass;
mod passes;
mod scheduler;

pub use config::PreConfig;
pub use context::{CompilerContext, FunctionId};
pub use events::{Event, EventBuilder, EventKind, EventLog, EventLogIter};
pub use pass::SsaPass;
pub use passes::{
    CandidateKey, CandidateReport, CandidateShape, CheckKind, CutEdge, ExprOp, PhiReport,
    PreOutcome, PreStats, SsaPrePass, SsaUpdateEntry, SsaUpdateTable,
};
pub use scheduler::PassScheduler;
