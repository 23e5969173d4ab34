//! Static Single Assignment (SSA) form.
//!
//! This module provides the SSA intermediate representation the optimizer
//! works on. Every variable is assigned exactly once; merges of values at
//! control flow joins are expressed by phi nodes.
//!
//! # Architecture
//!
//! - [`variable`] - SSA variable representation and identifiers
//! - [`phi`] - Phi node representation for control flow merges
//! - [`instruction`] - SSA instructions with provenance
//! - [`block`] - SSA basic blocks containing phi nodes and instructions
//! - [`function`] - Complete SSA representation of a function
//! - [`builder`] - Closure-based construction of SSA functions
//! - [`cfg`] - Control flow graph view over a function
//! - [`profile`] - Block and edge execution counts
//! - [`types`] - Coarse value types
//! - [`ops`] - SSA operations
//!
//! ## Variable Origins
//!
//! Each SSA variable is a version of a symbol: an argument, a local, an
//! intermediate, or a temporary introduced by the optimizer. Phi nodes merge
//! versions of one symbol, which is what lets an expression be translated
//! from a merge block into each predecessor.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ssapre::analysis::ssa::{SsaCfg, SsaFunctionBuilder};
//!
//! let ssa = SsaFunctionBuilder::new(2, 0).build_with(|f| {
//!     let (a, b) = (f.arg(0), f.arg(1));
//!     f.block(0, |blk| {
//!         let sum = blk.add(a, b);
//!         blk.ret_val(sum);
//!     });
//! });
//!
//! let cfg = SsaCfg::from_ssa(&ssa);
//! assert_eq!(cfg.exits(), vec![0]);
//! ```
//!
//! # References
//!
//! - Cytron et al., "Efficiently Computing Static Single Assignment Form and the
//!   Control Dependence Graph", ACM TOPLAS 1991

mod block;
mod builder;
mod cfg;
mod function;
mod instruction;
mod ops;
mod phi;
mod profile;
mod types;
mod variable;

// Re-export primary types at module level
pub use block::SsaBlock;
pub use builder::{SsaBlockBuilder, SsaFunctionBuilder, SsaFunctionContext};
pub use cfg::SsaCfg;
pub use function::SsaFunction;
pub use instruction::{Provenance, SsaInstruction};
pub use ops::{BinaryOpKind, ConstValue, SsaOp, UnaryOpKind};
pub use phi::{PhiNode, PhiOperand};
pub use profile::FrequencyProfile;
pub use types::SsaType;
pub use variable::{DefSite, SsaVarId, SsaVariable, UseSite, VariableOrigin};
