//! Control flow graph view of SSA functions.
//!
//! [`SsaCfg`] derives control flow edges from block terminators and
//! implements the graph traits, so dominator and post-dominator computation
//! run directly on an SSA function.
//!
//! ```rust,ignore
//! use ssapre::analysis::ssa::SsaCfg;
//! use ssapre::utils::graph::algorithms::compute_dominators_rooted;
//!
//! let cfg = SsaCfg::from_ssa(&ssa);
//! let dom_tree = compute_dominators_rooted(&cfg);
//! ```

use crate::{
    analysis::ssa::SsaFunction,
    utils::graph::{GraphBase, NodeId, Predecessors, RootedGraph, Successors},
};

/// A control flow graph view of an SSA function.
///
/// Successor and predecessor lists are computed once on construction.
/// Duplicate edges (for example two switch cases targeting one block) are
/// collapsed, and targets outside the function are ignored.
#[derive(Debug)]
pub struct SsaCfg<'a> {
    ssa: &'a SsaFunction,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl<'a> SsaCfg<'a> {
    /// Creates a CFG view from an SSA function.
    #[must_use]
    pub fn from_ssa(ssa: &'a SsaFunction) -> Self {
        let block_count = ssa.block_count();
        let mut successors = vec![Vec::new(); block_count];
        let mut predecessors = vec![Vec::new(); block_count];

        for (block_idx, block) in ssa.blocks().iter().enumerate() {
            for succ in block.successors() {
                if succ < block_count {
                    successors[block_idx].push(succ);
                    predecessors[succ].push(block_idx);
                }
            }
        }

        Self {
            ssa,
            successors,
            predecessors,
        }
    }

    /// Returns the underlying function.
    #[must_use]
    pub const fn ssa(&self) -> &'a SsaFunction {
        self.ssa
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.successors.len()
    }

    /// Returns `true` if the function has no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    /// Returns the successors of `block_idx` in terminator order.
    #[must_use]
    pub fn block_successors(&self, block_idx: usize) -> &[usize] {
        self.successors.get(block_idx).map_or(&[], Vec::as_slice)
    }

    /// Returns the predecessors of `block_idx` in block order.
    #[must_use]
    pub fn block_predecessors(&self, block_idx: usize) -> &[usize] {
        self.predecessors.get(block_idx).map_or(&[], Vec::as_slice)
    }

    /// Returns the blocks without successors.
    #[must_use]
    pub fn exits(&self) -> Vec<usize> {
        (0..self.block_count())
            .filter(|&b| self.successors[b].is_empty())
            .collect()
    }

    /// Returns `true` if `from -> to` is a critical edge: `from` has several
    /// successors and `to` has several predecessors.
    #[must_use]
    pub fn is_critical_edge(&self, from: usize, to: usize) -> bool {
        self.block_successors(from).len() > 1 && self.block_predecessors(to).len() > 1
    }
}

impl GraphBase for SsaCfg<'_> {
    fn node_count(&self) -> usize {
        self.successors.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.successors.len()).map(NodeId::new)
    }
}

impl Successors for SsaCfg<'_> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.block_successors(node.index())
            .iter()
            .map(|&b| NodeId::new(b))
    }
}

impl Predecessors for SsaCfg<'_> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.block_predecessors(node.index())
            .iter()
            .map(|&b| NodeId::new(b))
    }
}

impl RootedGraph for SsaCfg<'_> {
    fn entry(&self) -> NodeId {
        NodeId::new(0)
    }
}
