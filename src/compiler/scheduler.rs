//! Pass scheduler for running SSA passes over every function of a context.
//!
//! The [`PassScheduler`] applies its passes in order to all registered
//! functions, processing functions in parallel, and repeats the sequence
//! until an iteration changes nothing or the iteration limit is reached.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::{
    compiler::{context::CompilerContext, events::EventKind, pass::SsaPass},
    Result,
};

/// Runs a sequence of passes to a fixpoint.
pub struct PassScheduler {
    /// Maximum iterations of the whole sequence.
    max_iterations: usize,
    /// Passes in execution order.
    pub passes: Vec<Box<dyn SsaPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(4)
    }
}

impl PassScheduler {
    /// Creates an empty scheduler.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Maximum iterations of the pass sequence.
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            passes: Vec::new(),
        }
    }

    /// Appends a pass and returns the scheduler.
    #[must_use]
    pub fn with_pass(mut self, pass: Box<dyn SsaPass>) -> Self {
        self.passes.push(pass);
        self
    }

    /// Appends a pass.
    pub fn add_pass(&mut self, pass: Box<dyn SsaPass>) {
        self.passes.push(pass);
    }

    /// Runs every pass once over all functions.
    ///
    /// Functions are processed in parallel. Each function is removed from
    /// the context while a pass works on it so that no lock is held during
    /// the transformation.
    fn run_passes_once(ctx: &CompilerContext, passes: &mut [Box<dyn SsaPass>]) -> Result<bool> {
        let any_changed = AtomicBool::new(false);

        for pass in passes.iter_mut() {
            pass.initialize(ctx)?;
        }

        let functions = ctx.function_ids();

        for pass in passes.iter() {
            ctx.events
                .record(EventKind::PassStarted)
                .pass(pass.name())
                .message(pass.description());

            functions.par_iter().for_each(|&function| {
                if !pass.should_run(function, ctx) {
                    return;
                }

                let Some((_, mut ssa)) = ctx.ssa_functions.remove(&function) else {
                    return;
                };

                let result = pass.run_on_function(&mut ssa, function, ctx);

                ctx.ssa_functions.insert(function, ssa);

                match result {
                    Ok(true) => {
                        any_changed.store(true, Ordering::Relaxed);
                        ctx.mark_processed(function);
                    }
                    Ok(false) => {}
                    Err(error) => {
                        ctx.events
                            .record(EventKind::Error)
                            .function(function)
                            .pass(pass.name())
                            .message(error.to_string());
                    }
                }
            });

            ctx.events
                .record(EventKind::PassCompleted)
                .pass(pass.name())
                .message(format!("{:?} elapsed", ctx.elapsed()));
        }

        for pass in passes.iter_mut() {
            pass.finalize(ctx)?;
        }

        Ok(any_changed.load(Ordering::Relaxed))
    }

    /// Runs the pass sequence until it stops changing any function.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The compiler context holding the functions.
    ///
    /// # Returns
    ///
    /// The number of iterations completed. Events are accumulated in `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error if a pass fails to initialize or finalize. Errors of
    /// individual functions are recorded as events instead.
    pub fn run_pipeline(&mut self, ctx: &CompilerContext) -> Result<usize> {
        let mut iterations = 0;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;
            if !Self::run_passes_once(ctx, &mut self.passes)? {
                break;
            }
        }

        Ok(iterations)
    }
}
