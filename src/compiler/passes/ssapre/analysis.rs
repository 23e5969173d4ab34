//! Control flow facts shared by all candidates of a function.
//!
//! Redundancy elimination never changes the CFG, so the dominator trees and
//! frontiers are computed once per function and reused by every candidate.

use std::collections::HashSet;

use crate::{
    analysis::{SsaCfg, SsaFunction},
    utils::{
        graph::{
            algorithms::{
                compute_dominance_frontiers, compute_dominators_rooted, compute_post_dominators,
                iterated_dominance_frontier, DominatorTree, PostDominatorTree,
            },
            NodeId,
        },
        BitSet,
    },
};

/// Block graph, dominance and post-dominance of one function.
#[derive(Debug, Clone)]
pub(crate) struct FunctionAnalysis {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    unreachable_predecessors: Vec<Vec<usize>>,
    dom: DominatorTree,
    pdom: PostDominatorTree,
    frontiers: Vec<HashSet<NodeId>>,
    loop_headers: BitSet,
}

impl FunctionAnalysis {
    /// Computes the analysis for `ssa`. Block 0 is the entry.
    pub(crate) fn new(ssa: &SsaFunction) -> Self {
        let cfg = SsaCfg::from_ssa(ssa);
        let dom = compute_dominators_rooted(&cfg);
        let pdom = compute_post_dominators(&cfg);
        let frontiers = compute_dominance_frontiers(&cfg, &dom);

        let block_count = cfg.block_count();
        let successors: Vec<Vec<usize>> = (0..block_count)
            .map(|block| cfg.block_successors(block).to_vec())
            .collect();
        // Edges out of unreachable blocks never carry a value, so they get
        // no phi operand occurrence.
        let (predecessors, unreachable_predecessors): (Vec<Vec<usize>>, Vec<Vec<usize>>) = (0..block_count)
            .map(|block| {
                cfg.block_predecessors(block)
                    .iter()
                    .copied()
                    .partition::<Vec<usize>, _>(|&pred| dom.is_reachable(NodeId::new(pred)))
            })
            .unzip();

        let mut loop_headers = BitSet::new(block_count);
        for (block, preds) in predecessors.iter().enumerate() {
            let header = NodeId::new(block);
            if !dom.is_reachable(header) {
                continue;
            }
            if preds.iter().any(|&pred| dom.dominates(header, NodeId::new(pred))) {
                loop_headers.insert(block);
            }
        }

        Self {
            successors,
            predecessors,
            unreachable_predecessors,
            dom,
            pdom,
            frontiers,
            loop_headers,
        }
    }

    pub(crate) fn block_count(&self) -> usize {
        self.successors.len()
    }

    pub(crate) fn successors(&self, block: usize) -> &[usize] {
        self.successors.get(block).map(Vec::as_slice).unwrap_or_default()
    }

    pub(crate) fn predecessors(&self, block: usize) -> &[usize] {
        self.predecessors.get(block).map(Vec::as_slice).unwrap_or_default()
    }

    /// Predecessors of `block` that the entry cannot reach.
    pub(crate) fn unreachable_predecessors(&self, block: usize) -> &[usize] {
        self.unreachable_predecessors
            .get(block)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn successor_count(&self, block: usize) -> usize {
        self.successors(block).len()
    }

    /// Returns `true` if `a` dominates `b`. A block dominates itself.
    pub(crate) fn dominates(&self, a: usize, b: usize) -> bool {
        self.dom.dominates(NodeId::new(a), NodeId::new(b))
    }

    /// Returns `true` if `a` post-dominates `b`.
    pub(crate) fn post_dominates(&self, a: usize, b: usize) -> bool {
        self.pdom.post_dominates(NodeId::new(a), NodeId::new(b))
    }

    pub(crate) fn is_reachable(&self, block: usize) -> bool {
        self.dom.is_reachable(NodeId::new(block))
    }

    /// Dominator tree preorder number of `block`, or `usize::MAX` when the
    /// block is unreachable.
    pub(crate) fn dfn(&self, block: usize) -> usize {
        self.dom
            .preorder_index(NodeId::new(block))
            .unwrap_or(usize::MAX)
    }

    /// Reachable blocks in dominator tree preorder.
    pub(crate) fn preorder(&self) -> impl Iterator<Item = usize> + '_ {
        self.dom.preorder().iter().map(|node| node.index())
    }

    /// Children of `block` in the dominator tree.
    pub(crate) fn dom_children(&self, block: usize) -> impl Iterator<Item = usize> + '_ {
        self.dom
            .children(NodeId::new(block))
            .iter()
            .map(|node| node.index())
    }

    /// Iterated dominance frontier of `blocks`.
    pub(crate) fn iterated_frontier<I>(&self, blocks: I) -> BitSet
    where
        I: IntoIterator<Item = usize>,
    {
        iterated_dominance_frontier(&self.frontiers, blocks.into_iter().map(NodeId::new))
    }

    /// Blocks `block` is control dependent on.
    pub(crate) fn post_dominance_frontier(&self, block: usize) -> impl Iterator<Item = usize> + '_ {
        self.pdom
            .frontier(NodeId::new(block))
            .iter()
            .map(|node| node.index())
    }

    pub(crate) fn post_dominance_frontier_len(&self, block: usize) -> usize {
        self.pdom.frontier(NodeId::new(block)).len()
    }

    /// Returns `true` if some predecessor of `block` is reached through a
    /// back edge.
    pub(crate) fn is_loop_header(&self, block: usize) -> bool {
        self.loop_headers.contains(block)
    }

    /// Reachable blocks without successors.
    pub(crate) fn exits(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.block_count())
            .filter(|&block| self.successors(block).is_empty() && self.is_reachable(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SsaFunctionBuilder;

    fn diamond_with_loop() -> SsaFunction {
        // 0 -> {1, 2} -> 3 -> 4 -> {4, 5}
        SsaFunctionBuilder::new(1, 0).build_with(|f| {
            let a = f.arg(0);
            f.block(0, |b| b.branch(a, 1, 2));
            f.block(1, |b| b.jump(3));
            f.block(2, |b| b.jump(3));
            f.block(3, |b| b.jump(4));
            f.block(4, |b| b.branch(a, 4, 5));
            f.block(5, |b| b.ret());
        })
    }

    #[test]
    fn test_dominance_and_preorder() {
        let analysis = FunctionAnalysis::new(&diamond_with_loop());
        assert_eq!(analysis.block_count(), 6);
        assert!(analysis.dominates(0, 3));
        assert!(!analysis.dominates(1, 3));
        assert_eq!(analysis.dfn(0), 0);
        assert_eq!(analysis.preorder().count(), 6);
        assert_eq!(analysis.predecessors(3), &[1, 2]);
        assert_eq!(analysis.successor_count(4), 2);
    }

    #[test]
    fn test_frontiers() {
        let analysis = FunctionAnalysis::new(&diamond_with_loop());
        let idf = analysis.iterated_frontier([1]);
        assert!(idf.contains(3));
        assert_eq!(idf.count(), 1);

        let pdf: Vec<usize> = analysis.post_dominance_frontier(1).collect();
        assert_eq!(pdf, vec![0]);
        assert!(analysis.post_dominates(3, 1));
    }

    #[test]
    fn test_loop_headers_and_exits() {
        let analysis = FunctionAnalysis::new(&diamond_with_loop());
        assert!(analysis.is_loop_header(4));
        assert!(!analysis.is_loop_header(3));
        assert_eq!(analysis.exits().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_unreachable_block() {
        let ssa = SsaFunctionBuilder::new(0, 0).build_with(|f| {
            f.block(0, |b| b.ret());
            f.block(1, |b| b.jump(0));
        });
        let analysis = FunctionAnalysis::new(&ssa);
        assert!(!analysis.is_reachable(1));
        assert_eq!(analysis.dfn(1), usize::MAX);
        assert_eq!(analysis.exits().collect::<Vec<_>>(), vec![0]);
        assert!(analysis.predecessors(0).is_empty());
        assert_eq!(analysis.unreachable_predecessors(0), &[1]);
        assert!(!analysis.is_loop_header(0));
    }

    #[test]
    fn test_merge_with_unreachable_predecessor() {
        // 0 -> 2, and the dead block 1 -> 2.
        let ssa = SsaFunctionBuilder::new(0, 0).build_with(|f| {
            f.block(0, |b| b.jump(2));
            f.block(1, |b| b.jump(2));
            f.block(2, |b| b.ret());
        });
        let analysis = FunctionAnalysis::new(&ssa);
        assert_eq!(analysis.predecessors(2), &[0]);
        assert_eq!(analysis.unreachable_predecessors(2), &[1]);
        assert!(analysis.unreachable_predecessors(0).is_empty());
    }
}
