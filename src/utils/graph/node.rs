//! Strongly-typed node identifiers.

use std::fmt;

/// Identifier of a node inside a graph.
///
/// A `NodeId` is a plain index. Control flow graphs use it as the block index,
/// the flow networks built during speculation analysis use it as the index of
/// a flow node. The wrapper keeps node indices from being mixed up with
/// edge indices or occurrence handles.
///
/// # Thread Safety
///
/// `NodeId` is [`Copy`], [`Send`], and [`Sync`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new `NodeId` from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index of this node.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<usize> for NodeId {
    #[inline]
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    #[inline]
    fn from(node: NodeId) -> Self {
        node.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_node_id_roundtrip() {
        let node = NodeId::new(7);
        assert_eq!(node.index(), 7);
        assert_eq!(usize::from(node), 7);
        assert_eq!(NodeId::from(7usize), node);
    }

    #[test]
    fn test_node_id_formatting() {
        let node = NodeId::new(3);
        assert_eq!(format!("{node}"), "n3");
        assert_eq!(format!("{node:?}"), "NodeId(3)");
    }

    #[test]
    fn test_node_id_ordering_follows_index() {
        let set: BTreeSet<NodeId> = [5, 1, 3].into_iter().map(NodeId::new).collect();
        let ordered: Vec<usize> = set.into_iter().map(NodeId::index).collect();
        assert_eq!(ordered, vec![1, 3, 5]);
    }
}
