//! Graph algorithms used by the optimizer.
//!
//! # Dominator Analysis
//!
//! - [`compute_dominators`] - dominator tree via Lengauer-Tarjan, with preorder numbering
//! - [`compute_post_dominators`] - post-dominator tree rooted at a virtual exit,
//!   including post-dominance frontiers
//! - [`compute_dominance_frontiers`] - dominance frontiers of every node
//! - [`iterated_dominance_frontier`] - closure of the frontier over a seed set
//!
//! | Algorithm | Time Complexity | Use Case |
//! |-----------|-----------------|----------|
//! | Dominators | O(V α(V)) | phi placement, occurrence ordering |
//! | Frontiers | O(V + E + Σ|DF|) | phi placement, control dependence |
//!
//! # Examples
//!
//! ```rust,ignore
//! use ssapre::{analysis::SsaCfg, utils::graph::{algorithms, NodeId}};
//!
//! let cfg = SsaCfg::from_ssa(&ssa);
//! let tree = algorithms::compute_dominators_rooted(&cfg);
//! assert!(tree.dominates(NodeId::new(0), NodeId::new(1)));
//! ```

mod dominators;

pub use dominators::{
    compute_dominance_frontiers, compute_dominators, compute_dominators_rooted,
    compute_post_dominators, iterated_dominance_frontier, DominatorIterator, DominatorTree,
    PostDominatorTree,
};
