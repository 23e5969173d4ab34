//! Generic directed graph infrastructure.
//!
//! # Architecture
//!
//! - **Core Types**: [`NodeId`]
//! - **Traits**: [`GraphBase`], [`Successors`], [`Predecessors`] and [`RootedGraph`]
//!   let algorithms run over any graph-shaped structure, including the control
//!   flow view of an SSA function
//! - **Algorithms**: dominators, post-dominators and dominance frontiers
//!
//! # Thread Safety
//!
//! All types are [`Send`] and [`Sync`]. Dominator and frontier results are
//! computed once and then only read.

mod node;
mod traits;

pub mod algorithms;

pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};
