//! # ssapre Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of the ssapre library. Import this module to get quick access to the types needed to
//! build SSA functions and run redundancy elimination over them.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all ssapre operations
pub use crate::Error;

/// The result type used throughout ssapre
pub use crate::Result;

// ================================================================================================
// SSA Representation
// ================================================================================================

/// Functions, blocks, instructions and variables
pub use crate::analysis::{
    BinaryOpKind, ConstValue, DefSite, PhiNode, PhiOperand, Provenance, SsaBlock, SsaCfg,
    SsaFunction, SsaInstruction, SsaOp, SsaType, SsaVarId, SsaVariable, UnaryOpKind,
    VariableOrigin,
};

/// Closure based construction of functions
pub use crate::analysis::{SsaBlockBuilder, SsaFunctionBuilder, SsaFunctionContext};

/// Execution counts of blocks and edges
pub use crate::analysis::FrequencyProfile;

// ================================================================================================
// Redundancy Elimination
// ================================================================================================

/// The pass, its configuration and its results
pub use crate::compiler::{
    CandidateKey, CandidateReport, CandidateShape, CheckKind, CutEdge, ExprOp, PhiReport,
    PreConfig, PreOutcome, PreStats, SsaPrePass, SsaUpdateEntry, SsaUpdateTable,
};

// ================================================================================================
// Pipeline Infrastructure
// ================================================================================================

/// Pass trait, scheduling and shared state
pub use crate::compiler::{CompilerContext, FunctionId, PassScheduler, SsaPass};

/// Event logging
pub use crate::compiler::{Event, EventKind, EventLog};
