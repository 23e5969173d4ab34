use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every failure of the redundancy elimination pipeline surfaces through this enum. Most
/// variants are fatal for the function being optimized: the pass aborts and the function is
/// left as it was before the failing candidate started its code motion.
///
/// # Error Categories
///
/// ## Malformed Input and Broken Invariants
/// - [`Error::Malformed`] - The SSA input or an internal occurrence graph violates an invariant
/// - [`Error::UnknownFunction`] - A function id was not registered with the compiler context
///
/// ## Recoverable Conditions
/// - [`Error::CriticalEdge`] - An insertion landed on a critical edge; the candidate is retried
///   once without speculation
///
/// ## Analysis Errors
/// - [`Error::Error`] - Miscellaneous failures
///
/// # Examples
///
/// ```rust,ignore
/// use ssapre::{Error, compiler::SsaPrePass};
///
/// match pass.run_function(&mut ssa, None, &events) {
///     Ok(outcome) => println!("{} insertions", outcome.stats.insertions),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed input: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input or an internal structure is inconsistent.
    ///
    /// Raised for references to unknown variables, phi operands whose
    /// definition is not a phi during the second renaming step, a min cut
    /// that cannot be found for a computed flow, and similar broken
    /// invariants. The error includes the source location where the
    /// malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An insertion would have been placed on a critical edge.
    ///
    /// Insertions happen at the end of a predecessor block. When that block
    /// has more than one successor the computation would also execute on
    /// unrelated paths. The pass catches this condition internally and
    /// recomputes the candidate with the classical, non-speculative rules.
    #[error("Insertion for candidate {candidate} hit critical edge out of block {block}")]
    CriticalEdge {
        /// The predecessor block that has more than one successor
        block: usize,
        /// Index of the candidate being processed
        candidate: usize,
    },

    /// The requested function is not part of the compiler context.
    #[error("Unknown function - {0}")]
    UnknownFunction(usize),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Returns `true` if the pipeline recovers from this error on its own.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::CriticalEdge { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_error_records_location() {
        let err = malformed_error!("phi operand {} has no owner", 3);
        match &err {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "phi operand 3 has no owner");
                assert!(file.ends_with("error.rs"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_critical_edge_is_retryable() {
        let err = Error::CriticalEdge {
            block: 4,
            candidate: 0,
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("block 4"));
    }
}
