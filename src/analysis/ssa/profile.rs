//! Execution frequency profiles.
//!
//! A [`FrequencyProfile`] records how often each block and each control flow
//! edge executed. Speculative redundancy elimination weighs insertion points
//! by these counts. Missing entries read as zero; a missing edge count falls
//! back to the frequency of its source block, which is exact whenever the
//! source has a single successor.

use std::collections::HashMap;

/// Block and edge execution counts for one function.
///
/// # Examples
///
/// ```rust,ignore
/// use ssapre::analysis::ssa::FrequencyProfile;
///
/// let profile = FrequencyProfile::new()
///     .with_block(0, 100)
///     .with_edge(0, 1, 90)
///     .with_edge(0, 2, 10);
/// assert_eq!(profile.edge_frequency(0, 2), 10);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyProfile {
    blocks: HashMap<usize, u64>,
    edges: HashMap<(usize, usize), u64>,
}

impl FrequencyProfile {
    /// Creates an empty profile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a profile from per-block counts indexed by block.
    #[must_use]
    pub fn from_block_counts(counts: &[u64]) -> Self {
        Self {
            blocks: counts.iter().copied().enumerate().collect(),
            edges: HashMap::new(),
        }
    }

    /// Sets the count of `block` and returns the profile.
    #[must_use]
    pub fn with_block(mut self, block: usize, frequency: u64) -> Self {
        self.blocks.insert(block, frequency);
        self
    }

    /// Sets the count of the edge `from -> to` and returns the profile.
    #[must_use]
    pub fn with_edge(mut self, from: usize, to: usize, frequency: u64) -> Self {
        self.edges.insert((from, to), frequency);
        self
    }

    /// Sets the count of `block`.
    pub fn set_block_frequency(&mut self, block: usize, frequency: u64) {
        self.blocks.insert(block, frequency);
    }

    /// Sets the count of the edge `from -> to`.
    pub fn set_edge_frequency(&mut self, from: usize, to: usize, frequency: u64) {
        self.edges.insert((from, to), frequency);
    }

    /// Returns how often `block` executed.
    #[must_use]
    pub fn block_frequency(&self, block: usize) -> u64 {
        self.blocks.get(&block).copied().unwrap_or(0)
    }

    /// Returns how often control moved from `from` to `to`.
    #[must_use]
    pub fn edge_frequency(&self, from: usize, to: usize) -> u64 {
        self.edges
            .get(&(from, to))
            .copied()
            .unwrap_or_else(|| self.block_frequency(from))
    }

    /// Returns `true` if no count has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.edges.is_empty()
    }
}
