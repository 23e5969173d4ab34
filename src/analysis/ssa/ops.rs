//! SSA operations.
//!
//! Every instruction is a single `result = op(operands)` operation over SSA
//! variables. Arithmetic is grouped into [`SsaOp::Binary`] and
//! [`SsaOp::Unary`] with an operator kind, which lets the redundancy
//! analysis key expressions by `(kind, operand symbols)` without a match arm
//! per operator.
//!
//! # Operation Categories
//!
//! - **Constants**: [`SsaOp::Const`]
//! - **Arithmetic and bitwise**: [`SsaOp::Binary`], [`SsaOp::Unary`]
//! - **Data movement**: [`SsaOp::Copy`]
//! - **Side effects**: [`SsaOp::Call`], [`SsaOp::MemoryBarrier`]
//! - **Runtime checks**: [`SsaOp::CheckNonNull`], [`SsaOp::CheckBounds`]
//! - **Control flow**: [`SsaOp::Jump`], [`SsaOp::Branch`], [`SsaOp::Switch`], [`SsaOp::Return`]
//!
//! # Field Documentation
//!
//! - `dest`: The destination SSA variable for the operation result
//! - `left`, `right`: Binary operands
//! - `operand`: Unary operand
//! - `target`, `true_target`, `false_target`: Branch targets (block indices)
//! - `unsigned`: Whether the operation treats values as unsigned

#![allow(missing_docs)]

use std::fmt;

use strum::{EnumCount, EnumIter};

use crate::analysis::ssa::SsaVarId;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, EnumCount)]
pub enum BinaryOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Lt,
    Gt,
}

impl BinaryOpKind {
    /// Returns `true` if operand order does not affect the result.
    #[must_use]
    pub const fn is_commutative(self) -> bool {
        matches!(self, Self::Add | Self::Mul | Self::And | Self::Or | Self::Xor | Self::Eq)
    }

    /// Returns `true` if the operation may fault at runtime.
    #[must_use]
    pub const fn may_trap(self) -> bool {
        matches!(self, Self::Div | Self::Rem)
    }

    /// Returns `true` for comparisons producing a boolean.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Lt | Self::Gt)
    }

    /// Returns the textual mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::Eq => "ceq",
            Self::Lt => "clt",
            Self::Gt => "cgt",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, EnumCount)]
pub enum UnaryOpKind {
    Neg,
    Not,
}

impl UnaryOpKind {
    /// Returns the textual mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Neg => "neg",
            Self::Not => "not",
        }
    }
}

/// A constant value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstValue {
    I32(i32),
    I64(i64),
    Bool(bool),
    Null,
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}L"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A single SSA operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SsaOp {
    // ========================================================================
    // Constants and data movement
    // ========================================================================
    Const {
        dest: SsaVarId,
        value: ConstValue,
    },

    Copy {
        dest: SsaVarId,
        src: SsaVarId,
    },

    // ========================================================================
    // Arithmetic
    // ========================================================================
    Binary {
        kind: BinaryOpKind,
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
        unsigned: bool,
    },

    Unary {
        kind: UnaryOpKind,
        dest: SsaVarId,
        operand: SsaVarId,
    },

    // ========================================================================
    // Side effects
    // ========================================================================
    /// Opaque call. Kills every runtime check that is available before it.
    Call {
        dest: Option<SsaVarId>,
        callee: u32,
        args: Vec<SsaVarId>,
    },

    /// Memory barrier. No computation moves across it.
    MemoryBarrier,

    // ========================================================================
    // Runtime checks
    // ========================================================================
    /// Faults if `value` is null.
    CheckNonNull {
        value: SsaVarId,
    },

    /// Faults unless `index < length`.
    CheckBounds {
        index: SsaVarId,
        length: SsaVarId,
    },

    // ========================================================================
    // Control flow
    // ========================================================================
    Jump {
        target: usize,
    },

    Branch {
        condition: SsaVarId,
        true_target: usize,
        false_target: usize,
    },

    Switch {
        value: SsaVarId,
        targets: Vec<usize>,
        default: usize,
    },

    Return {
        value: Option<SsaVarId>,
    },

    Nop,
}

impl SsaOp {
    /// Returns the destination variable if this operation produces one.
    #[must_use]
    pub fn dest(&self) -> Option<SsaVarId> {
        match self {
            Self::Const { dest, .. }
            | Self::Copy { dest, .. }
            | Self::Binary { dest, .. }
            | Self::Unary { dest, .. } => Some(*dest),
            Self::Call { dest, .. } => *dest,
            Self::MemoryBarrier
            | Self::CheckNonNull { .. }
            | Self::CheckBounds { .. }
            | Self::Jump { .. }
            | Self::Branch { .. }
            | Self::Switch { .. }
            | Self::Return { .. }
            | Self::Nop => None,
        }
    }

    /// Returns all variables read by this operation, in operand order.
    #[must_use]
    pub fn uses(&self) -> Vec<SsaVarId> {
        match self {
            Self::Const { .. }
            | Self::MemoryBarrier
            | Self::Jump { .. }
            | Self::Nop
            | Self::Return { value: None } => vec![],
            Self::Copy { src, .. } => vec![*src],
            Self::Binary { left, right, .. } => vec![*left, *right],
            Self::Unary { operand, .. } => vec![*operand],
            Self::Call { args, .. } => args.clone(),
            Self::CheckNonNull { value } => vec![*value],
            Self::CheckBounds { index, length } => vec![*index, *length],
            Self::Branch { condition, .. } => vec![*condition],
            Self::Switch { value, .. } => vec![*value],
            Self::Return { value: Some(value) } => vec![*value],
        }
    }

    /// Returns `true` if this operation ends a block.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Jump { .. } | Self::Branch { .. } | Self::Switch { .. } | Self::Return { .. }
        )
    }

    /// Returns the successor blocks named by a terminator, in order.
    #[must_use]
    pub fn successors(&self) -> Vec<usize> {
        match self {
            Self::Jump { target } => vec![*target],
            Self::Branch {
                true_target,
                false_target,
                ..
            } => vec![*true_target, *false_target],
            Self::Switch {
                targets, default, ..
            } => {
                let mut succs = targets.clone();
                succs.push(*default);
                succs
            }
            _ => vec![],
        }
    }

    /// Returns `true` if this is a runtime check.
    #[must_use]
    pub const fn is_check(&self) -> bool {
        matches!(self, Self::CheckNonNull { .. } | Self::CheckBounds { .. })
    }

    /// Returns `true` if executing this operation may fault.
    #[must_use]
    pub const fn may_throw(&self) -> bool {
        match self {
            Self::Binary { kind, .. } => kind.may_trap(),
            Self::Call { .. } | Self::CheckNonNull { .. } | Self::CheckBounds { .. } => true,
            _ => false,
        }
    }

    /// Returns `(kind, dest, left, right, unsigned)` for binary operations.
    #[must_use]
    pub const fn as_binary_op(&self) -> Option<(BinaryOpKind, SsaVarId, SsaVarId, SsaVarId, bool)> {
        match self {
            Self::Binary {
                kind,
                dest,
                left,
                right,
                unsigned,
            } => Some((*kind, *dest, *left, *right, *unsigned)),
            _ => None,
        }
    }

    /// Returns `(kind, dest, operand)` for unary operations.
    #[must_use]
    pub const fn as_unary_op(&self) -> Option<(UnaryOpKind, SsaVarId, SsaVarId)> {
        match self {
            Self::Unary {
                kind,
                dest,
                operand,
            } => Some((*kind, *dest, *operand)),
            _ => None,
        }
    }

    /// Returns the textual mnemonic.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::Const { .. } => "const",
            Self::Copy { .. } => "copy",
            Self::Binary { kind, .. } => kind.mnemonic(),
            Self::Unary { kind, .. } => kind.mnemonic(),
            Self::Call { .. } => "call",
            Self::MemoryBarrier => "membar",
            Self::CheckNonNull { .. } => "chknull",
            Self::CheckBounds { .. } => "chkbounds",
            Self::Jump { .. } => "jmp",
            Self::Branch { .. } => "br",
            Self::Switch { .. } => "switch",
            Self::Return { .. } => "ret",
            Self::Nop => "nop",
        }
    }
}

impl fmt::Display for SsaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const { dest, value } => write!(f, "{dest} = {value}"),
            Self::Copy { dest, src } => write!(f, "{dest} = {src}"),
            Self::Binary {
                kind,
                dest,
                left,
                right,
                unsigned,
            } => {
                let suffix = if *unsigned { ".un" } else { "" };
                write!(f, "{dest} = {}{suffix} {left}, {right}", kind.mnemonic())
            }
            Self::Unary {
                kind,
                dest,
                operand,
            } => write!(f, "{dest} = {} {operand}", kind.mnemonic()),
            Self::Call { dest, callee, args } => {
                if let Some(dest) = dest {
                    write!(f, "{dest} = ")?;
                }
                write!(f, "call f{callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::CheckNonNull { value } => write!(f, "chknull {value}"),
            Self::CheckBounds { index, length } => write!(f, "chkbounds {index}, {length}"),
            Self::Jump { target } => write!(f, "jmp B{target}"),
            Self::Branch {
                condition,
                true_target,
                false_target,
            } => write!(f, "br {condition}, B{true_target}, B{false_target}"),
            Self::Switch {
                value,
                targets,
                default,
            } => write!(f, "switch {value}, {targets:?}, B{default}"),
            Self::Return { value: Some(v) } => write!(f, "ret {v}"),
            Self::Return { value: None } => write!(f, "ret"),
            Self::MemoryBarrier | Self::Nop => write!(f, "{}", self.mnemonic()),
        }
    }
}
