//! Shared utilities: bit sets and graph infrastructure.

mod bitset;
pub mod graph;

pub use bitset::{BitSet, BitSetIter};
