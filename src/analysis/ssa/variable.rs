//! SSA variable representation and identifiers.
//!
//! Each SSA variable is one version of an underlying symbol. The symbol is
//! described by [`VariableOrigin`]; the version number tells the different
//! assignments of that symbol apart. Redundancy elimination keys expressions by
//! their operand *symbols* and compares occurrences by their operand *versions*,
//! so both halves of this split matter.
//!
//! # Address-Taken Variables
//!
//! Variables whose address escapes may be modified through pointers. Any
//! expression reading such a variable is never a redundancy candidate.

use std::fmt;

use crate::analysis::ssa::SsaType;

/// Unique identifier for an SSA variable.
///
/// This is a lightweight handle into the variable table of an
/// [`SsaFunction`](crate::analysis::ssa::SsaFunction). The identifier is unique
/// within a single function but not across functions.
///
/// # Examples
///
/// ```rust,ignore
/// use ssapre::analysis::ssa::SsaVarId;
///
/// let var_id = SsaVarId::new(0);
/// assert_eq!(var_id.index(), 0);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SsaVarId(usize);

impl SsaVarId {
    /// Creates a new SSA variable identifier.
    ///
    /// # Arguments
    ///
    /// * `index` - The index into the variable table
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index into the variable table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for SsaVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for SsaVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The symbol an SSA variable is a version of.
///
/// | Origin | Produced by |
/// |--------|-------------|
/// | `Argument(N)` | function parameters, version 0 defined at entry |
/// | `Local(N)` | named locals; merged through phi nodes |
/// | `Stack(N)` | single-assignment intermediate values |
/// | `Temp(N)` | temporaries introduced by redundancy elimination |
///
/// # Examples
///
/// ```rust,ignore
/// use ssapre::analysis::ssa::VariableOrigin;
///
/// let arg_origin = VariableOrigin::Argument(0);
/// let temp_origin = VariableOrigin::Temp(1);
/// assert_eq!(format!("{temp_origin}"), "tmp1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VariableOrigin {
    /// Function argument (parameter).
    Argument(u16),

    /// Local variable declared in the function.
    Local(u16),

    /// Intermediate value.
    Stack(u32),

    /// Temporary introduced to carry a saved expression value.
    Temp(u32),
}

impl VariableOrigin {
    /// Returns `true` if this is an argument origin.
    #[must_use]
    pub const fn is_argument(&self) -> bool {
        matches!(self, Self::Argument(_))
    }

    /// Returns `true` if this is a local variable origin.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Returns `true` if this is an intermediate value.
    #[must_use]
    pub const fn is_stack(&self) -> bool {
        matches!(self, Self::Stack(_))
    }

    /// Returns `true` if this symbol was introduced by redundancy elimination.
    #[must_use]
    pub const fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    /// Returns the argument index if this is an argument origin.
    #[must_use]
    pub const fn argument_index(&self) -> Option<u16> {
        match self {
            Self::Argument(idx) => Some(*idx),
            _ => None,
        }
    }

    /// Returns the local index if this is a local variable origin.
    #[must_use]
    pub const fn local_index(&self) -> Option<u16> {
        match self {
            Self::Local(idx) => Some(*idx),
            _ => None,
        }
    }
}

impl fmt::Display for VariableOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument(idx) => write!(f, "arg{idx}"),
            Self::Local(idx) => write!(f, "loc{idx}"),
            Self::Stack(slot) => write!(f, "stk{slot}"),
            Self::Temp(slot) => write!(f, "tmp{slot}"),
        }
    }
}

/// Where an SSA variable receives its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefSite {
    /// Defined on function entry (arguments and initial local values).
    Entry,
    /// Result of the phi node in the given block.
    Phi(usize),
    /// Destination of an instruction.
    Instruction {
        /// Block containing the instruction
        block: usize,
        /// Index of the instruction inside the block
        index: usize,
    },
}

impl DefSite {
    /// Creates an instruction definition site.
    #[must_use]
    pub const fn instruction(block: usize, index: usize) -> Self {
        Self::Instruction { block, index }
    }

    /// Returns the defining block, or `None` for entry definitions.
    #[must_use]
    pub const fn block(&self) -> Option<usize> {
        match self {
            Self::Entry => None,
            Self::Phi(block) | Self::Instruction { block, .. } => Some(*block),
        }
    }

    /// Returns `true` if this definition is a phi node.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        matches!(self, Self::Phi(_))
    }

    /// Returns `true` if this is an entry definition.
    #[must_use]
    pub const fn is_entry(&self) -> bool {
        matches!(self, Self::Entry)
    }
}

/// A location where an SSA variable is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseSite {
    /// Block containing the use.
    pub block: usize,
    /// Instruction index, or phi index when `is_phi_operand` is set.
    pub instruction: usize,
    /// Whether the use is a phi operand.
    pub is_phi_operand: bool,
}

impl UseSite {
    /// Creates an instruction use site.
    #[must_use]
    pub const fn instruction(block: usize, instr_idx: usize) -> Self {
        Self {
            block,
            instruction: instr_idx,
            is_phi_operand: false,
        }
    }

    /// Creates a phi operand use site.
    #[must_use]
    pub const fn phi_operand(block: usize, phi_idx: usize) -> Self {
        Self {
            block,
            instruction: phi_idx,
            is_phi_operand: true,
        }
    }
}

/// An SSA variable with its metadata.
#[derive(Debug, Clone)]
pub struct SsaVariable {
    id: SsaVarId,
    origin: VariableOrigin,
    version: u32,
    def_site: DefSite,
    var_type: SsaType,
    uses: Vec<UseSite>,
    address_taken: bool,
}

impl SsaVariable {
    /// Creates a new variable of unknown type.
    #[must_use]
    pub fn new(id: SsaVarId, origin: VariableOrigin, version: u32, def_site: DefSite) -> Self {
        Self::new_typed(id, origin, version, def_site, SsaType::Unknown)
    }

    /// Creates a new variable with a known type.
    #[must_use]
    pub fn new_typed(
        id: SsaVarId,
        origin: VariableOrigin,
        version: u32,
        def_site: DefSite,
        var_type: SsaType,
    ) -> Self {
        Self {
            id,
            origin,
            version,
            def_site,
            var_type,
            uses: Vec::new(),
            address_taken: false,
        }
    }

    /// Returns the variable's id.
    #[must_use]
    pub const fn id(&self) -> SsaVarId {
        self.id
    }

    /// Returns the symbol this variable is a version of.
    #[must_use]
    pub const fn origin(&self) -> VariableOrigin {
        self.origin
    }

    /// Returns the version number within the symbol.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Returns where the variable is defined.
    #[must_use]
    pub const fn def_site(&self) -> DefSite {
        self.def_site
    }

    /// Updates the definition site after instructions moved.
    pub fn set_def_site(&mut self, def_site: DefSite) {
        self.def_site = def_site;
    }

    /// Returns the variable's type.
    #[must_use]
    pub fn var_type(&self) -> &SsaType {
        &self.var_type
    }

    /// Sets the variable's type.
    pub fn set_type(&mut self, var_type: SsaType) {
        self.var_type = var_type;
    }

    /// Returns all use sites.
    #[must_use]
    pub fn uses(&self) -> &[UseSite] {
        &self.uses
    }

    /// Returns `true` if the address of this variable escapes.
    #[must_use]
    pub const fn is_address_taken(&self) -> bool {
        self.address_taken
    }

    /// Returns `true` if nothing reads this variable.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.uses.is_empty()
    }

    /// Records a use.
    pub fn add_use(&mut self, use_site: UseSite) {
        self.uses.push(use_site);
    }

    /// Forgets all recorded uses.
    pub fn clear_uses(&mut self) {
        self.uses.clear();
    }

    /// Marks the variable as address-taken.
    pub fn set_address_taken(&mut self) {
        self.address_taken = true;
    }
}

impl fmt::Display for SsaVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.origin, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssa_var_id_display() {
        let id = SsaVarId::new(5);
        assert_eq!(id.index(), 5);
        assert_eq!(format!("{id}"), "v5");
        assert_eq!(format!("{id:?}"), "v5");
    }

    #[test]
    fn test_variable_origin_predicates() {
        let origin = VariableOrigin::Argument(0);
        assert!(origin.is_argument());
        assert_eq!(origin.argument_index(), Some(0));
        assert_eq!(origin.local_index(), None);
        assert_eq!(format!("{origin}"), "arg0");

        let origin = VariableOrigin::Local(3);
        assert!(origin.is_local());
        assert_eq!(origin.local_index(), Some(3));
        assert_eq!(format!("{origin}"), "loc3");

        assert!(VariableOrigin::Stack(7).is_stack());
        assert!(VariableOrigin::Temp(1).is_temp());
        assert_eq!(format!("{}", VariableOrigin::Temp(1)), "tmp1");
    }

    #[test]
    fn test_def_site_blocks() {
        assert_eq!(DefSite::Entry.block(), None);
        assert!(DefSite::Entry.is_entry());
        assert_eq!(DefSite::Phi(3).block(), Some(3));
        assert!(DefSite::Phi(3).is_phi());
        assert_eq!(DefSite::instruction(2, 5).block(), Some(2));
        assert!(!DefSite::instruction(2, 5).is_phi());
    }

    #[test]
    fn test_variable_display_and_uses() {
        let mut var = SsaVariable::new(
            SsaVarId::new(0),
            VariableOrigin::Local(1),
            2,
            DefSite::instruction(0, 0),
        );
        assert_eq!(format!("{var}"), "loc1_2");
        assert!(var.is_dead());
        var.add_use(UseSite::instruction(1, 0));
        var.add_use(UseSite::phi_operand(2, 0));
        assert_eq!(var.uses().len(), 2);
        assert!(var.uses()[1].is_phi_operand);
        var.clear_uses();
        assert!(var.is_dead());
        assert!(!var.is_address_taken());
        var.set_address_taken();
        assert!(var.is_address_taken());
    }
}
