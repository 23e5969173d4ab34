//! Dominator and post-dominator computation.
//!
//! A node `d` dominates a node `n` if every path from the entry to `n` passes
//! through `d`. The immediate dominator of `n` is the unique strict dominator of
//! `n` that is dominated by every other strict dominator of `n`. Making each
//! node's immediate dominator its parent yields the dominator tree.
//!
//! Post-dominance is dominance on the reversed graph. Because a function may have
//! several exit blocks, [`compute_post_dominators`] roots the reversed graph at a
//! virtual exit node that every real exit flows into.
//!
//! # Algorithm
//!
//! Immediate dominators are computed with Lengauer-Tarjan and path compression.
//! The finished tree is numbered in preorder, which gives constant-time dominance
//! queries: `a` dominates `b` exactly when `b`'s preorder number falls inside the
//! range covered by `a`'s subtree.
//!
//! Dominance frontiers use the join-point walk of Cooper, Harvey and Kennedy.
//! Iterated frontiers are closed with a worklist.
//!
//! # Unreachable Nodes
//!
//! Nodes that cannot be reached from the root are not part of the tree. They have
//! no immediate dominator, no preorder number, dominate nothing and are dominated
//! by nothing but themselves.

use std::collections::HashSet;

use crate::utils::{
    graph::{GraphBase, NodeId, Predecessors, RootedGraph, Successors},
    BitSet,
};

const UNDEFINED: usize = usize::MAX;

/// A dominator tree with preorder numbering.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: NodeId,
    idom: Vec<Option<NodeId>>,
    children: Vec<Vec<NodeId>>,
    preorder: Vec<NodeId>,
    preorder_index: Vec<usize>,
    subtree_last: Vec<usize>,
    depth: Vec<usize>,
}

impl DominatorTree {
    fn from_idoms(entry: NodeId, idom: Vec<Option<NodeId>>, reachable: &[bool]) -> Self {
        let node_count = idom.len();
        let mut children = vec![Vec::new(); node_count];
        for (index, parent) in idom.iter().enumerate() {
            if let Some(parent) = parent {
                children[parent.index()].push(NodeId::new(index));
            }
        }

        let mut preorder = Vec::with_capacity(node_count);
        let mut preorder_index = vec![UNDEFINED; node_count];
        let mut depth = vec![0; node_count];
        if entry.index() < node_count && reachable[entry.index()] {
            let mut stack = vec![entry];
            while let Some(node) = stack.pop() {
                preorder_index[node.index()] = preorder.len();
                preorder.push(node);
                for &child in children[node.index()].iter().rev() {
                    depth[child.index()] = depth[node.index()] + 1;
                    stack.push(child);
                }
            }
        }

        // Preorder numbering makes every subtree a contiguous range.
        let mut subtree_last = preorder_index.clone();
        for &node in preorder.iter().rev() {
            if let Some(parent) = idom[node.index()] {
                let last = subtree_last[node.index()];
                if last > subtree_last[parent.index()] {
                    subtree_last[parent.index()] = last;
                }
            }
        }

        DominatorTree {
            entry,
            idom,
            children,
            preorder,
            preorder_index,
            subtree_last,
            depth,
        }
    }

    /// Returns the root of the tree.
    #[inline]
    #[must_use]
    pub const fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the number of nodes the tree was computed for, reachable or not.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.idom.len()
    }

    /// Returns `true` if `node` is reachable from the root.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.preorder_index
            .get(node.index())
            .is_some_and(|&index| index != UNDEFINED)
    }

    /// Returns the immediate dominator of `node`, or `None` for the root and for
    /// unreachable nodes.
    #[inline]
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        self.idom.get(node.index()).copied().flatten()
    }

    /// Returns `true` if `a` dominates `b`. Every node dominates itself.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let pre_a = self.preorder_index[a.index()];
        let pre_b = self.preorder_index[b.index()];
        pre_a <= pre_b && pre_b <= self.subtree_last[a.index()]
    }

    /// Returns `true` if `a` dominates `b` and `a != b`.
    #[inline]
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Iterates over `node` and all its dominators, walking up to the root.
    pub fn dominators(&self, node: NodeId) -> DominatorIterator<'_> {
        DominatorIterator {
            tree: self,
            current: Some(node),
        }
    }

    /// Returns the depth of `node` in the tree. The root has depth 0.
    #[must_use]
    pub fn depth(&self, node: NodeId) -> usize {
        self.depth.get(node.index()).copied().unwrap_or(0)
    }

    /// Returns the nodes immediately dominated by `node`, ordered by node index.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.children.get(node.index()).map_or(&[], Vec::as_slice)
    }

    /// Returns the reachable nodes in dominator-tree preorder.
    #[must_use]
    pub fn preorder(&self) -> &[NodeId] {
        &self.preorder
    }

    /// Returns the preorder number of `node`, or `None` if it is unreachable.
    #[must_use]
    pub fn preorder_index(&self, node: NodeId) -> Option<usize> {
        self.preorder_index
            .get(node.index())
            .copied()
            .filter(|&index| index != UNDEFINED)
    }
}

/// Iterator over a node and its dominators, ending at the root.
pub struct DominatorIterator<'a> {
    tree: &'a DominatorTree,
    current: Option<NodeId>,
}

impl Iterator for DominatorIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = self.tree.immediate_dominator(current);
        Some(current)
    }
}

/// Computes the dominator tree of `graph` rooted at `entry`.
pub fn compute_dominators<G>(graph: &G, entry: NodeId) -> DominatorTree
where
    G: Successors + Predecessors,
{
    let node_count = graph.node_count();
    if node_count == 0 || entry.index() >= node_count {
        return DominatorTree::from_idoms(entry, vec![None; node_count], &vec![false; node_count]);
    }

    let mut lt = LengauerTarjan::new(node_count);
    lt.compute(graph, entry.index());

    let reachable: Vec<bool> = lt.dfnum.iter().map(|&n| n != 0).collect();
    let idom = (0..node_count)
        .map(|node| {
            if node == entry.index() || !reachable[node] {
                None
            } else {
                Some(NodeId::new(lt.idom[node]))
            }
        })
        .collect();

    DominatorTree::from_idoms(entry, idom, &reachable)
}

/// Computes the dominator tree of a rooted graph from its own entry.
pub fn compute_dominators_rooted<G>(graph: &G) -> DominatorTree
where
    G: RootedGraph,
{
    compute_dominators(graph, graph.entry())
}

struct LengauerTarjan {
    dfnum: Vec<usize>,
    vertex: Vec<usize>,
    parent: Vec<usize>,
    semi: Vec<usize>,
    idom: Vec<usize>,
    ancestor: Vec<usize>,
    best: Vec<usize>,
    bucket: Vec<Vec<usize>>,
    counter: usize,
}

impl LengauerTarjan {
    fn new(n: usize) -> Self {
        Self {
            dfnum: vec![0; n],
            vertex: vec![UNDEFINED; n],
            parent: vec![UNDEFINED; n],
            semi: (0..n).collect(),
            idom: vec![UNDEFINED; n],
            ancestor: vec![UNDEFINED; n],
            best: (0..n).collect(),
            bucket: vec![Vec::new(); n],
            counter: 0,
        }
    }

    fn compute<G: Successors + Predecessors>(&mut self, graph: &G, entry: usize) {
        self.dfs(graph, entry);

        for i in (1..self.counter).rev() {
            let w = self.vertex[i];
            let parent_w = self.parent[w];

            for v in graph.predecessors(NodeId::new(w)) {
                let v = v.index();
                if self.dfnum[v] == 0 {
                    continue;
                }
                let u = self.eval(v);
                if self.dfnum[self.semi[u]] < self.dfnum[self.semi[w]] {
                    self.semi[w] = self.semi[u];
                }
            }

            let semi_w = self.semi[w];
            self.bucket[semi_w].push(w);
            self.ancestor[w] = parent_w;

            for v in std::mem::take(&mut self.bucket[parent_w]) {
                let u = self.eval(v);
                self.idom[v] = if self.semi[u] == self.semi[v] {
                    parent_w
                } else {
                    u
                };
            }
        }

        for i in 1..self.counter {
            let w = self.vertex[i];
            if self.idom[w] != self.semi[w] {
                self.idom[w] = self.idom[self.idom[w]];
            }
        }
        self.idom[entry] = entry;
    }

    fn dfs<G: Successors>(&mut self, graph: &G, entry: usize) {
        let mut stack = vec![entry];
        while let Some(node) = stack.pop() {
            if self.dfnum[node] != 0 {
                continue;
            }
            self.counter += 1;
            self.dfnum[node] = self.counter;
            self.vertex[self.counter - 1] = node;

            for succ in graph.successors(NodeId::new(node)) {
                let succ = succ.index();
                if self.dfnum[succ] == 0 {
                    self.parent[succ] = node;
                    stack.push(succ);
                }
            }
        }
    }

    fn eval(&mut self, v: usize) -> usize {
        if self.ancestor[v] == UNDEFINED {
            return v;
        }
        self.compress(v);
        self.best[v]
    }

    fn compress(&mut self, v: usize) {
        let ancestor_v = self.ancestor[v];
        if self.ancestor[ancestor_v] == UNDEFINED {
            return;
        }
        self.compress(ancestor_v);

        let best_ancestor = self.best[ancestor_v];
        if self.dfnum[self.semi[best_ancestor]] < self.dfnum[self.semi[self.best[v]]] {
            self.best[v] = best_ancestor;
        }
        self.ancestor[v] = self.ancestor[ancestor_v];
    }
}

/// The post-dominator tree of a graph, rooted at a virtual exit node.
///
/// The virtual exit has id `node_count` of the original graph and is the
/// successor of every node without successors. Nodes that cannot reach an exit
/// (infinite loops) are unreachable in this tree.
#[derive(Debug, Clone)]
pub struct PostDominatorTree {
    tree: DominatorTree,
    frontiers: Vec<HashSet<NodeId>>,
}

impl PostDominatorTree {
    /// Returns the id of the virtual exit node.
    #[must_use]
    pub const fn virtual_exit(&self) -> NodeId {
        self.tree.entry()
    }

    /// Returns `true` if `a` post-dominates `b`.
    #[must_use]
    pub fn post_dominates(&self, a: NodeId, b: NodeId) -> bool {
        self.tree.dominates(a, b)
    }

    /// Returns the immediate post-dominator of `node`, or `None` when it is the
    /// virtual exit or `node` cannot reach an exit.
    #[must_use]
    pub fn immediate_post_dominator(&self, node: NodeId) -> Option<NodeId> {
        self.tree
            .immediate_dominator(node)
            .filter(|&ipdom| ipdom != self.virtual_exit())
    }

    /// Returns the post-dominance frontier of `node`.
    ///
    /// A block `b` is in the frontier of `n` when `n` post-dominates a successor
    /// of `b` but does not strictly post-dominate `b`. Those are the branches
    /// `n` is control dependent on.
    #[must_use]
    pub fn frontier(&self, node: NodeId) -> &HashSet<NodeId> {
        static EMPTY: std::sync::OnceLock<HashSet<NodeId>> = std::sync::OnceLock::new();
        self.frontiers
            .get(node.index())
            .unwrap_or_else(|| EMPTY.get_or_init(HashSet::new))
    }

    /// Returns the underlying tree over the reversed graph.
    #[must_use]
    pub const fn tree(&self) -> &DominatorTree {
        &self.tree
    }
}

/// Reversed view of a graph with a virtual exit node appended.
struct ReversedWithExit<'g, G> {
    graph: &'g G,
    exits: Vec<NodeId>,
}

impl<G: GraphBase> ReversedWithExit<'_, G> {
    fn virtual_exit(&self) -> NodeId {
        NodeId::new(self.graph.node_count())
    }
}

impl<G: Successors + Predecessors> GraphBase for ReversedWithExit<'_, G> {
    fn node_count(&self) -> usize {
        self.graph.node_count() + 1
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.node_count()).map(NodeId::new)
    }
}

impl<G: Successors + Predecessors> Successors for ReversedWithExit<'_, G> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        let nodes: Vec<NodeId> = if node == self.virtual_exit() {
            self.exits.clone()
        } else {
            self.graph.predecessors(node).collect()
        };
        nodes.into_iter()
    }
}

impl<G: Successors + Predecessors> Predecessors for ReversedWithExit<'_, G> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        let mut nodes: Vec<NodeId> = Vec::new();
        if node != self.virtual_exit() {
            nodes.extend(self.graph.successors(node));
            if self.exits.contains(&node) {
                nodes.push(self.virtual_exit());
            }
        }
        nodes.into_iter()
    }
}

/// Computes the post-dominator tree of `graph` together with its post-dominance
/// frontiers.
pub fn compute_post_dominators<G>(graph: &G) -> PostDominatorTree
where
    G: Successors + Predecessors,
{
    let exits: Vec<NodeId> = graph
        .node_ids()
        .filter(|&node| graph.successors(node).next().is_none())
        .collect();
    let reversed = ReversedWithExit { graph, exits };
    let tree = compute_dominators(&reversed, reversed.virtual_exit());
    let mut frontiers = compute_dominance_frontiers(&reversed, &tree);
    frontiers.truncate(graph.node_count());
    for frontier in &mut frontiers {
        frontier.remove(&reversed.virtual_exit());
    }
    PostDominatorTree { tree, frontiers }
}

/// Computes the dominance frontier of every node.
///
/// The result is indexed by node. Unreachable nodes have empty frontiers and are
/// never members of a frontier.
pub fn compute_dominance_frontiers<G>(graph: &G, dom_tree: &DominatorTree) -> Vec<HashSet<NodeId>>
where
    G: Predecessors,
{
    let n = graph.node_count();
    let mut frontiers: Vec<HashSet<NodeId>> = vec![HashSet::new(); n];

    for node in graph.node_ids() {
        if !dom_tree.is_reachable(node) {
            continue;
        }
        let preds: Vec<NodeId> = graph
            .predecessors(node)
            .filter(|&pred| dom_tree.is_reachable(pred))
            .collect();
        if preds.len() < 2 {
            continue;
        }

        let idom_node = dom_tree.immediate_dominator(node);
        for pred in preds {
            let mut runner = Some(pred);
            while let Some(current) = runner {
                if Some(current) == idom_node {
                    break;
                }
                frontiers[current.index()].insert(node);
                runner = dom_tree.immediate_dominator(current);
            }
        }
    }

    frontiers
}

/// Computes the iterated dominance frontier of a set of nodes.
///
/// The result is the smallest set `S` containing the frontier of every seed and
/// the frontier of every member of `S`.
pub fn iterated_dominance_frontier<I>(frontiers: &[HashSet<NodeId>], seeds: I) -> BitSet
where
    I: IntoIterator<Item = NodeId>,
{
    let mut result = BitSet::new(frontiers.len());
    let mut worklist: Vec<NodeId> = seeds.into_iter().collect();
    let mut queued = BitSet::new(frontiers.len());
    for node in &worklist {
        if node.index() < frontiers.len() {
            queued.insert(node.index());
        }
    }

    while let Some(node) = worklist.pop() {
        let Some(frontier) = frontiers.get(node.index()) else {
            continue;
        };
        for &member in frontier {
            if !result.contains(member.index()) {
                result.insert(member.index());
                if !queued.contains(member.index()) {
                    queued.insert(member.index());
                    worklist.push(member);
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{SsaCfg, SsaFunction, SsaFunctionBuilder};

    /// A function whose block terminators realize `edges`.
    fn graph_from(nodes: usize, edges: &[(usize, usize)]) -> SsaFunction {
        SsaFunctionBuilder::new(1, 0).build_with(|f| {
            let selector = f.arg(0);
            for block in 0..nodes {
                let targets: Vec<usize> = edges
                    .iter()
                    .filter(|(from, _)| *from == block)
                    .map(|(_, to)| *to)
                    .collect();
                f.block(block, |blk| match targets.as_slice() {
                    [] => blk.ret(),
                    [target] => blk.jump(*target),
                    [on_true, on_false] => blk.branch(selector, *on_true, *on_false),
                    [cases @ .., default] => blk.switch(selector, cases.to_vec(), *default),
                });
            }
        })
    }

    fn n(index: usize) -> NodeId {
        NodeId::new(index)
    }

    #[test]
    fn test_dominator_empty_graph() {
        let ssa = SsaFunctionBuilder::new(0, 0).build_with(|_| {});
        let tree = compute_dominators(&SsaCfg::from_ssa(&ssa), n(0));
        assert_eq!(tree.node_count(), 0);
        assert!(tree.preorder().is_empty());
    }

    #[test]
    fn test_dominator_linear_chain() {
        let ssa = graph_from(4, &[(0, 1), (1, 2), (2, 3)]);
        let graph = SsaCfg::from_ssa(&ssa);
        let tree = compute_dominators(&graph, n(0));

        assert_eq!(tree.immediate_dominator(n(0)), None);
        assert_eq!(tree.immediate_dominator(n(1)), Some(n(0)));
        assert_eq!(tree.immediate_dominator(n(3)), Some(n(2)));
        assert!(tree.dominates(n(1), n(3)));
        assert!(!tree.dominates(n(3), n(1)));
        assert_eq!(tree.depth(n(3)), 3);
        assert_eq!(tree.preorder(), &[n(0), n(1), n(2), n(3)]);
    }

    #[test]
    fn test_dominator_diamond() {
        //      0
        //     / \
        //    1   2
        //     \ /
        //      3
        let ssa = graph_from(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let graph = SsaCfg::from_ssa(&ssa);
        let tree = compute_dominators(&graph, n(0));

        assert_eq!(tree.immediate_dominator(n(3)), Some(n(0)));
        assert!(!tree.strictly_dominates(n(1), n(3)));
        assert!(!tree.strictly_dominates(n(2), n(3)));
        assert_eq!(tree.children(n(0)), &[n(1), n(2), n(3)]);
        assert_eq!(tree.preorder_index(n(0)), Some(0));
        assert_eq!(tree.preorder_index(n(1)), Some(1));

        let doms: Vec<NodeId> = tree.dominators(n(3)).collect();
        assert_eq!(doms, vec![n(3), n(0)]);
    }

    #[test]
    fn test_dominator_loop() {
        // 0 -> 1 -> 2 -> 1, 2 -> 3
        let ssa = graph_from(4, &[(0, 1), (1, 2), (2, 1), (2, 3)]);
        let graph = SsaCfg::from_ssa(&ssa);
        let tree = compute_dominators(&graph, n(0));

        assert_eq!(tree.immediate_dominator(n(1)), Some(n(0)));
        assert_eq!(tree.immediate_dominator(n(2)), Some(n(1)));
        assert_eq!(tree.immediate_dominator(n(3)), Some(n(2)));
        assert!(tree.dominates(n(1), n(3)));
    }

    #[test]
    fn test_dominator_unreachable_node() {
        // 3 is unreachable and jumps into 2
        let ssa = graph_from(4, &[(0, 1), (1, 2), (3, 2)]);
        let graph = SsaCfg::from_ssa(&ssa);
        let tree = compute_dominators(&graph, n(0));

        assert!(!tree.is_reachable(n(3)));
        assert_eq!(tree.immediate_dominator(n(3)), None);
        assert_eq!(tree.preorder_index(n(3)), None);
        assert!(!tree.dominates(n(0), n(3)));
        assert!(!tree.dominates(n(3), n(2)));
        assert!(tree.dominates(n(3), n(3)));
        assert_eq!(tree.immediate_dominator(n(2)), Some(n(1)));
    }

    #[test]
    fn test_dominance_frontiers_diamond() {
        let ssa = graph_from(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let graph = SsaCfg::from_ssa(&ssa);
        let tree = compute_dominators(&graph, n(0));
        let df = compute_dominance_frontiers(&graph, &tree);

        assert!(df[0].is_empty());
        assert_eq!(df[1], HashSet::from([n(3)]));
        assert_eq!(df[2], HashSet::from([n(3)]));
        assert!(df[3].is_empty());
    }

    #[test]
    fn test_dominance_frontiers_loop_header() {
        let ssa = graph_from(4, &[(0, 1), (1, 2), (2, 1), (2, 3)]);
        let graph = SsaCfg::from_ssa(&ssa);
        let tree = compute_dominators(&graph, n(0));
        let df = compute_dominance_frontiers(&graph, &tree);

        assert_eq!(df[2], HashSet::from([n(1)]));
        assert_eq!(df[1], HashSet::from([n(1)]));
    }

    #[test]
    fn test_iterated_frontier_nested_diamonds() {
        //   0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3, 3 -> 4, 0 -> 5, 4 -> 6, 5 -> 6
        let ssa = graph_from(
            7,
            &[(0, 1), (0, 2), (1, 3), (2, 3), (3, 4), (0, 5), (4, 6), (5, 6)],
        );
        let graph = SsaCfg::from_ssa(&ssa);
        let tree = compute_dominators(&graph, n(0));
        let df = compute_dominance_frontiers(&graph, &tree);

        let idf = iterated_dominance_frontier(&df, [n(1)]);
        let members: Vec<usize> = idf.iter().collect();
        assert_eq!(members, vec![3, 6]);
    }

    #[test]
    fn test_post_dominators_diamond() {
        let ssa = graph_from(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let graph = SsaCfg::from_ssa(&ssa);
        let pdt = compute_post_dominators(&graph);

        assert_eq!(pdt.virtual_exit(), n(4));
        assert!(pdt.post_dominates(n(3), n(0)));
        assert!(!pdt.post_dominates(n(1), n(0)));
        assert_eq!(pdt.immediate_post_dominator(n(1)), Some(n(3)));
        assert_eq!(pdt.immediate_post_dominator(n(3)), None);

        // The arms are control dependent on the branch in 0
        assert_eq!(pdt.frontier(n(1)), &HashSet::from([n(0)]));
        assert_eq!(pdt.frontier(n(2)), &HashSet::from([n(0)]));
        assert!(pdt.frontier(n(3)).is_empty());
        assert!(pdt.frontier(n(0)).is_empty());
    }

    #[test]
    fn test_post_dominators_multiple_exits() {
        // 0 -> 1 (exit), 0 -> 2 (exit)
        let ssa = graph_from(3, &[(0, 1), (0, 2)]);
        let graph = SsaCfg::from_ssa(&ssa);
        let pdt = compute_post_dominators(&graph);

        assert_eq!(pdt.immediate_post_dominator(n(0)), None);
        assert!(!pdt.post_dominates(n(1), n(0)));
        assert_eq!(pdt.frontier(n(1)), &HashSet::from([n(0)]));
    }
}
