//! Trait definitions for graph abstractions.
//!
//! Graph algorithms in this crate are written against these traits rather than
//! a concrete graph type. The control flow view over an SSA function and the
//! reversed control flow used for post-dominance implement them.
//!
//! - [`GraphBase`] - node count and node iteration
//! - [`Successors`] - forward edge traversal
//! - [`Predecessors`] - backward edge traversal
//! - [`RootedGraph`] - graphs with a designated entry node

use crate::utils::graph::NodeId;

/// Core properties shared by every graph.
pub trait GraphBase {
    /// Returns the number of nodes. Node ids are `0..node_count()`.
    fn node_count(&self) -> usize;

    /// Returns an iterator over all node ids.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Forward traversal.
pub trait Successors: GraphBase {
    /// Returns the direct successors of `node`, in edge order.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Backward traversal.
pub trait Predecessors: GraphBase {
    /// Returns the direct predecessors of `node`, in edge order.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// A graph with a single designated entry node.
pub trait RootedGraph: Successors + Predecessors {
    /// Returns the entry node.
    fn entry(&self) -> NodeId;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EdgeList {
        nodes: usize,
        edges: Vec<(usize, usize)>,
    }

    impl GraphBase for EdgeList {
        fn node_count(&self) -> usize {
            self.nodes
        }

        fn node_ids(&self) -> impl Iterator<Item = NodeId> {
            (0..self.nodes).map(NodeId::new)
        }
    }

    impl Successors for EdgeList {
        fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.edges
                .iter()
                .filter(move |(src, _)| *src == node.index())
                .map(|(_, dst)| NodeId::new(*dst))
        }
    }

    impl Predecessors for EdgeList {
        fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.edges
                .iter()
                .filter(move |(_, dst)| *dst == node.index())
                .map(|(src, _)| NodeId::new(*src))
        }
    }

    #[test]
    fn test_adjacency_is_reported_in_edge_order() {
        let graph = EdgeList {
            nodes: 3,
            edges: vec![(0, 2), (0, 1), (1, 2)],
        };

        let succ: Vec<usize> = graph.successors(NodeId::new(0)).map(NodeId::index).collect();
        assert_eq!(succ, vec![2, 1]);

        let pred: Vec<usize> = graph
            .predecessors(NodeId::new(2))
            .map(NodeId::index)
            .collect();
        assert_eq!(pred, vec![0, 1]);
        assert_eq!(graph.node_ids().count(), 3);
    }
}
