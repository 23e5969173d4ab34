//! Program representation and analysis infrastructure.
//!
//! This module holds the SSA intermediate representation the optimizer
//! transforms. It builds upon the generic graph infrastructure in
//! [`crate::utils::graph`] for dominance and control dependence.
//!
//! # Architecture
//!
//! - [`ssa`] - SSA functions, blocks, operations, profiles and the CFG view
//!
//! # Usage
//!
//! ```rust,ignore
//! use ssapre::analysis::ssa::{SsaCfg, SsaFunctionBuilder};
//! use ssapre::utils::graph::algorithms::compute_dominators_rooted;
//!
//! let ssa = SsaFunctionBuilder::new(1, 0).build_with(|f| {
//!     let cond = f.arg(0);
//!     f.block(0, |b| b.branch(cond, 1, 2));
//!     f.block(1, |b| b.jump(3));
//!     f.block(2, |b| b.jump(3));
//!     f.block(3, |b| b.ret());
//! });
//!
//! let cfg = SsaCfg::from_ssa(&ssa);
//! let dominators = compute_dominators_rooted(&cfg);
//! ```

pub mod ssa;

// Re-export primary types at module level
pub use ssa::{
    BinaryOpKind, ConstValue, DefSite, FrequencyProfile, PhiNode, PhiOperand, Provenance, SsaBlock,
    SsaBlockBuilder, SsaCfg, SsaFunction, SsaFunctionBuilder, SsaFunctionContext, SsaInstruction, SsaOp,
    SsaType, SsaVarId, SsaVariable, UnaryOpKind, UseSite, VariableOrigin,
};
