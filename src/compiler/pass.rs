//! The interface implemented by SSA optimization passes.

use crate::{
    analysis::SsaFunction,
    compiler::context::{CompilerContext, FunctionId},
    Result,
};

/// A transformation over the SSA form of individual functions.
///
/// Passes are shared across worker threads by the
/// [`PassScheduler`](crate::compiler::PassScheduler), so per-function state
/// must live on the stack of [`run_on_function`](Self::run_on_function) or in
/// the concurrent maps of the [`CompilerContext`].
pub trait SsaPass: Send + Sync {
    /// Short identifier used in events.
    fn name(&self) -> &'static str;

    /// Returns `false` to skip `function` in this iteration.
    fn should_run(&self, _function: FunctionId, _ctx: &CompilerContext) -> bool {
        true
    }

    /// Transforms one function.
    ///
    /// # Returns
    ///
    /// `true` if the function changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the function is malformed. The scheduler records
    /// the error and leaves the function as the pass left it.
    fn run_on_function(
        &self,
        ssa: &mut SsaFunction,
        function: FunctionId,
        ctx: &CompilerContext,
    ) -> Result<bool>;

    /// Called once before each scheduler iteration.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass cannot run at all.
    fn initialize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Called once after each scheduler iteration.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass cannot complete its bookkeeping.
    fn finalize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Human readable summary of the pass.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
