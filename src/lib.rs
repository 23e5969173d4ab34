// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # ssapre
//!
//! SSA-based partial redundancy elimination with profile-bounded
//! speculative code motion.
//!
//! `ssapre` removes computations that are redundant along some or all paths
//! of a function in SSA form. Redundant expressions are replaced by reads of
//! a temporary, computations are inserted on paths that lack them, and
//! redundant runtime checks are deleted. When an execution profile is
//! available, insertions may be speculative: a minimum cut over a flow
//! network weighted by execution counts picks the placement with the lowest
//! dynamic cost.
//!
//! ## Features
//!
//! - **Classical SSAPRE** - Safe placement that never adds a computation to
//!   a path
//! - **Min-cut speculation** - Profile-driven placement that never executes
//!   more computations than the input on the profiled runs
//! - **Statement PRE** - Redundant null and bounds checks
//! - **Control-dependence hoisting** - Computations found in every arm of a
//!   branch move to the branch
//! - **Parallel pipeline** - Functions are optimized concurrently
//!
//! ## Quick Start
//!
//! ```rust
//! use ssapre::prelude::*;
//!
//! // 0 -> {1, 2} -> 3; B1 and B3 compute a + b.
//! let mut ssa = SsaFunctionBuilder::new(3, 0).build_with(|f| {
//!     let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
//!     f.block(0, |blk| blk.branch(c, 1, 2));
//!     f.block(1, |blk| {
//!         let _ = blk.add(a, b);
//!         blk.jump(3);
//!     });
//!     f.block(2, |blk| blk.jump(3));
//!     f.block(3, |blk| {
//!         let sum = blk.add(a, b);
//!         blk.ret_val(sum);
//!     });
//! });
//!
//! let pass = SsaPrePass::new(PreConfig::classical());
//! let outcome = pass.run_function(&mut ssa, None, &EventLog::new())?;
//!
//! assert_eq!(outcome.stats.insertions, 1);
//! assert_eq!(outcome.stats.reloads, 1);
//! # Ok::<(), ssapre::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`analysis`] - The SSA representation and execution profiles
//! - [`compiler`] - Passes, configuration, scheduling and event logging
//! - [`utils`] - Bit sets, graphs, dominance and frontiers
//! - [`Error`] and [`Result`] - Error handling
//!
//! ### Running many functions
//!
//! ```rust,no_run
//! use ssapre::prelude::*;
//!
//! # fn functions() -> Vec<(SsaFunction, FrequencyProfile)> { Vec::new() }
//! let ctx = CompilerContext::new();
//! for (ssa, profile) in functions() {
//!     ctx.add_profiled_function(ssa, profile);
//! }
//!
//! let mut scheduler = PassScheduler::default()
//!     .with_pass(Box::new(SsaPrePass::new(PreConfig::default())));
//! scheduler.run_pipeline(&ctx)?;
//! println!("{}", ctx.events.summary());
//! # Ok::<(), ssapre::Error>(())
//! ```

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// ```rust
/// use ssapre::prelude::*;
///
/// let pass = SsaPrePass::new(PreConfig::default());
/// assert_eq!(pass.name(), "ssapre");
/// ```
pub mod prelude;

/// SSA representation the optimizer works on.
///
/// Functions are built with [`analysis::SsaFunctionBuilder`], transformed in
/// place, and carry optional [`analysis::FrequencyProfile`]s.
pub mod analysis;

/// Optimization passes and the infrastructure running them.
pub mod compiler;

/// Bit sets, graph traits, dominator and post-dominator trees.
pub mod utils;

/// `ssapre` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `ssapre` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use ssapre::prelude::*;
///
/// let mut ssa = SsaFunctionBuilder::new(0, 0).build_with(|f| f.block(0, |b| b.ret()));
/// match SsaPrePass::default().run_function(&mut ssa, None, &EventLog::new()) {
///     Ok(outcome) => assert!(!outcome.changed()),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;
