//! Occurrence graph of a single candidate.
//!
//! Every occurrence of a candidate lives in one arena owned by the
//! candidate's engine and is addressed by an [`OccId`]. Links between
//! occurrences (`def`, phi operands, the phi owning an operand) are plain
//! handles into that arena.

use std::fmt;

use bitflags::bitflags;

use crate::analysis::SsaVarId;

/// Handle of an occurrence in a candidate's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct OccId(usize);

impl OccId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    pub(crate) const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for OccId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "occ{}", self.0)
    }
}

bitflags! {
    /// Lattice facts of a phi occurrence.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct PhiFlags: u16 {
        const DOWN_SAFE = 1 << 0;
        const SPECULATIVE_DOWN_SAFE = 1 << 1;
        const CAN_BE_AVAIL = 1 << 2;
        const LATER = 1 << 3;
        const EXTRANEOUS = 1 << 4;
        const REMOVED = 1 << 5;
        const PARTIAL_ANT = 1 << 6;
        const FULLY_AVAIL = 1 << 7;
        const MC_WILL_BE_AVAIL = 1 << 8;
    }
}

impl PhiFlags {
    /// Facts a phi starts with before any dataflow ran.
    pub(crate) const INITIAL: Self = Self::DOWN_SAFE
        .union(Self::CAN_BE_AVAIL)
        .union(Self::LATER)
        .union(Self::FULLY_AVAIL)
        .union(Self::MC_WILL_BE_AVAIL);
}

bitflags! {
    /// Facts of a phi operand occurrence.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct OpndFlags: u8 {
        const HAS_REAL_USE = 1 << 0;
        const PROCESSED = 1 << 1;
        const INSERTED = 1 << 2;
        const PHI_OPND_RELOAD = 1 << 3;
        const MC_INSERT = 1 << 4;
    }
}

/// What code motion does with a real occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum RealRole {
    #[default]
    Plain,
    /// The computed value is kept in the candidate's temporary.
    Save,
    /// The computation is replaced by a read of the temporary.
    Reload,
}

/// A computation of the candidate.
#[derive(Debug, Clone)]
pub(crate) struct RealOcc {
    /// Index of the instruction in its block. `None` for occurrences that
    /// exist only in the occurrence graph.
    pub instruction: Option<usize>,
    /// Operand versions in candidate key order.
    pub operands: Vec<SsaVarId>,
    /// Variable receiving the value, for expressions.
    pub dest: Option<SsaVarId>,
    pub role: RealRole,
    /// Created at a control-dependence point by hoisting.
    pub hoisted: bool,
}

/// A merge point of the candidate's value.
#[derive(Debug, Clone)]
pub(crate) struct PhiOcc {
    /// Operand occurrences in predecessor order.
    pub operands: Vec<OccId>,
    pub flags: PhiFlags,
}

/// The value of a phi occurrence along one incoming edge.
#[derive(Debug, Clone)]
pub(crate) struct PhiOpndOcc {
    /// The phi occurrence this operand belongs to.
    pub phi: OccId,
    /// Position among the phi's operands.
    pub position: usize,
    pub flags: OpndFlags,
    /// The candidate's operands as seen at the end of the predecessor.
    pub current_expr: Option<Vec<SsaVarId>>,
}

/// A computation created at the end of a predecessor block.
#[derive(Debug, Clone)]
pub(crate) struct InsertedOcc {
    pub operands: Vec<SsaVarId>,
}

/// Closed set of occurrence kinds.
#[derive(Debug, Clone)]
pub(crate) enum OccKind {
    Real(RealOcc),
    Phi(PhiOcc),
    PhiOpnd(PhiOpndOcc),
    /// Function exit. The candidate is not anticipated past it.
    Exit,
    Inserted(InsertedOcc),
    /// A compare consuming the value of a real occurrence.
    Compare { instruction: usize },
    /// A side effect a statement candidate may not move across.
    Use { instruction: usize },
    /// A memory barrier no candidate may move across.
    Membar { instruction: usize },
}

/// Discriminant of [`OccKind`], for dispatch while the arena is borrowed
/// mutably.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OccTag {
    Real,
    Phi,
    PhiOpnd,
    Exit,
    Inserted,
    Compare,
    Use,
    Membar,
}

impl OccKind {
    pub(crate) fn tag(&self) -> OccTag {
        match self {
            Self::Real(_) => OccTag::Real,
            Self::Phi(_) => OccTag::Phi,
            Self::PhiOpnd(_) => OccTag::PhiOpnd,
            Self::Exit => OccTag::Exit,
            Self::Inserted(_) => OccTag::Inserted,
            Self::Compare { .. } => OccTag::Compare,
            Self::Use { .. } => OccTag::Use,
            Self::Membar { .. } => OccTag::Membar,
        }
    }

    /// Position of the kind in the sorted merge of a block.
    ///
    /// Phis come first, operands of successor phis last.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Self::Phi(_) => 0,
            Self::Real(_)
            | Self::Use { .. }
            | Self::Membar { .. }
            | Self::Inserted(_)
            | Self::Compare { .. } => 1,
            Self::Exit => 2,
            Self::PhiOpnd(_) => 3,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Real(_) => "real",
            Self::Phi(_) => "phi",
            Self::PhiOpnd(_) => "phi-opnd",
            Self::Exit => "exit",
            Self::Inserted(_) => "inserted",
            Self::Compare { .. } => "compare",
            Self::Use { .. } => "use",
            Self::Membar { .. } => "membar",
        }
    }
}

/// One node of the occurrence graph.
#[derive(Debug, Clone)]
pub(crate) struct Occurrence {
    pub kind: OccKind,
    /// Block holding the occurrence. Phi operands sit in the predecessor.
    pub block: usize,
    /// Dominator tree preorder number of `block`.
    pub dfn: usize,
    /// Order within the block among occurrences of the same rank.
    pub seq: usize,
    /// Equivalence class. Zero until renaming assigns one.
    pub class_id: u32,
    pub def: Option<OccId>,
}

impl Occurrence {
    pub(crate) fn new(kind: OccKind, block: usize, dfn: usize, seq: usize) -> Self {
        Self {
            kind,
            block,
            dfn,
            seq,
            class_id: 0,
            def: None,
        }
    }

    /// Sort key of the merged occurrence list.
    pub(crate) fn sort_key(&self) -> (usize, u8, usize) {
        (self.dfn, self.kind.rank(), self.seq)
    }

    pub(crate) fn is_real(&self) -> bool {
        matches!(self.kind, OccKind::Real(_))
    }

    pub(crate) fn is_phi(&self) -> bool {
        matches!(self.kind, OccKind::Phi(_))
    }

    pub(crate) fn is_inserted(&self) -> bool {
        matches!(self.kind, OccKind::Inserted(_))
    }

    pub(crate) fn as_real(&self) -> Option<&RealOcc> {
        match &self.kind {
            OccKind::Real(real) => Some(real),
            _ => None,
        }
    }

    pub(crate) fn as_phi(&self) -> Option<&PhiOcc> {
        match &self.kind {
            OccKind::Phi(phi) => Some(phi),
            _ => None,
        }
    }

    pub(crate) fn as_opnd(&self) -> Option<&PhiOpndOcc> {
        match &self.kind {
            OccKind::PhiOpnd(opnd) => Some(opnd),
            _ => None,
        }
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} B{} class {}", self.kind.name(), self.block, self.class_id)?;
        if let Some(def) = self.def {
            write!(f, " def {def}")?;
        }
        Ok(())
    }
}
