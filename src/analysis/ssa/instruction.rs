//! SSA-form instructions with provenance information.
//!
//! An [`SsaInstruction`] wraps an [`SsaOp`] and records where the instruction
//! came from. Instructions built from the input program carry
//! [`Provenance::Original`]; code motion tags everything it creates or rewrites
//! so that later passes and tests can tell saves, reloads, insertions and
//! hoisted computations apart.

use std::fmt;

use crate::analysis::ssa::{SsaOp, SsaVarId};

/// Where an instruction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Provenance {
    /// Part of the input program.
    #[default]
    Original,
    /// Copy of a computed value into a temporary.
    Save,
    /// Original computation replaced by a read of a temporary.
    Reload,
    /// Computation inserted at the end of a predecessor block.
    Insertion,
    /// Computation placed at a control-dependence point.
    Hoist,
}

/// An instruction in SSA form.
///
/// # Examples
///
/// ```rust,ignore
/// use ssapre::analysis::ssa::{SsaInstruction, SsaOp, SsaVarId};
///
/// let instr = SsaInstruction::new(SsaOp::Copy {
///     dest: SsaVarId::new(1),
///     src: SsaVarId::new(0),
/// });
/// assert_eq!(instr.def(), Some(SsaVarId::new(1)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SsaInstruction {
    op: SsaOp,
    provenance: Provenance,
}

impl SsaInstruction {
    /// Creates an instruction of the input program.
    #[must_use]
    pub fn new(op: SsaOp) -> Self {
        Self {
            op,
            provenance: Provenance::Original,
        }
    }

    /// Creates an instruction produced by a transformation.
    #[must_use]
    pub fn synthetic(op: SsaOp, provenance: Provenance) -> Self {
        Self { op, provenance }
    }

    /// Returns the operation.
    #[must_use]
    pub fn op(&self) -> &SsaOp {
        &self.op
    }

    /// Replaces the operation and records the new provenance.
    pub fn set_op(&mut self, op: SsaOp, provenance: Provenance) {
        self.op = op;
        self.provenance = provenance;
    }

    /// Returns the instruction's provenance.
    #[must_use]
    pub const fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Returns the variable defined by this instruction.
    #[must_use]
    pub fn def(&self) -> Option<SsaVarId> {
        self.op.dest()
    }

    /// Returns the variables read by this instruction.
    #[must_use]
    pub fn uses(&self) -> Vec<SsaVarId> {
        self.op.uses()
    }

    /// Returns `true` if this instruction ends its block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.op.is_terminator()
    }

    /// Returns the textual mnemonic.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.op.mnemonic()
    }
}

impl fmt::Display for SsaInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        if self.provenance != Provenance::Original {
            write!(f, "  ; {:?}", self.provenance)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_provenance() {
        let copy = SsaOp::Copy {
            dest: SsaVarId::new(1),
            src: SsaVarId::new(0),
        };
        let mut instr = SsaInstruction::new(copy.clone());
        assert_eq!(instr.provenance(), Provenance::Original);
        assert_eq!(instr.def(), Some(SsaVarId::new(1)));
        assert_eq!(format!("{instr}"), "v1 = v0");

        instr.set_op(copy, Provenance::Reload);
        assert_eq!(instr.provenance(), Provenance::Reload);
        assert_eq!(format!("{instr}"), "v1 = v0  ; Reload");
    }

    #[test]
    fn test_synthetic_terminator() {
        let instr = SsaInstruction::synthetic(SsaOp::Jump { target: 2 }, Provenance::Insertion);
        assert!(instr.is_terminator());
        assert!(instr.uses().is_empty());
        assert_eq!(instr.mnemonic(), "jmp");
    }
}
