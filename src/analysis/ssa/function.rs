//! SSA function representation.
//!
//! # Structure
//!
//! ```text
//! SsaFunction
//! ├── blocks: Vec<SsaBlock>       // basic blocks; block 0 is the entry
//! ├── variables: Vec<SsaVariable> // all SSA variables
//! ├── num_args: usize             // number of arguments
//! └── num_locals: usize           // number of locals
//! ```
//!
//! Def/use information stored on the variables is derived data. Any
//! transformation that moves instructions calls
//! [`SsaFunction::rebuild_def_use`] afterwards.

use std::{collections::HashMap, fmt};

use crate::{
    analysis::ssa::{
        DefSite, PhiNode, Provenance, SsaBlock, SsaInstruction, SsaType, SsaVarId, SsaVariable,
        UseSite, VariableOrigin,
    },
    Result,
};

/// A function in SSA form.
///
/// # Examples
///
/// ```rust,ignore
/// use ssapre::analysis::ssa::{SsaFunction, SsaBlock};
///
/// let mut func = SsaFunction::new(2, 1);
/// func.add_block(SsaBlock::new(0));
/// assert_eq!(func.block_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SsaFunction {
    blocks: Vec<SsaBlock>,
    variables: Vec<SsaVariable>,
    num_args: usize,
    num_locals: usize,
    next_version: HashMap<VariableOrigin, u32>,
    temp_symbols: u32,
}

impl SsaFunction {
    /// Creates a new empty SSA function.
    #[must_use]
    pub fn new(num_args: usize, num_locals: usize) -> Self {
        Self {
            blocks: Vec::new(),
            variables: Vec::new(),
            num_args,
            num_locals,
            next_version: HashMap::new(),
            temp_symbols: 0,
        }
    }

    /// Returns the blocks.
    #[must_use]
    pub fn blocks(&self) -> &[SsaBlock] {
        &self.blocks
    }

    /// Returns the blocks mutably.
    pub fn blocks_mut(&mut self) -> &mut Vec<SsaBlock> {
        &mut self.blocks
    }

    /// Returns all variables.
    #[must_use]
    pub fn variables(&self) -> &[SsaVariable] {
        &self.variables
    }

    /// Returns the number of arguments.
    #[must_use]
    pub const fn num_args(&self) -> usize {
        self.num_args
    }

    /// Returns the number of locals.
    #[must_use]
    pub const fn num_locals(&self) -> usize {
        self.num_locals
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the number of variables.
    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Returns `true` if the function has no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the block at `index`.
    #[must_use]
    pub fn block(&self, index: usize) -> Option<&SsaBlock> {
        self.blocks.get(index)
    }

    /// Returns the block at `index` mutably.
    pub fn block_mut(&mut self, index: usize) -> Option<&mut SsaBlock> {
        self.blocks.get_mut(index)
    }

    /// Returns the variable with `id`.
    #[must_use]
    pub fn variable(&self, id: SsaVarId) -> Option<&SsaVariable> {
        self.variables.get(id.index())
    }

    /// Returns the variable with `id` mutably.
    pub fn variable_mut(&mut self, id: SsaVarId) -> Option<&mut SsaVariable> {
        self.variables.get_mut(id.index())
    }

    /// Appends a block.
    pub fn add_block(&mut self, block: SsaBlock) {
        self.blocks.push(block);
    }

    /// Registers a fully described variable and returns its id.
    ///
    /// The id stored in `variable` is replaced by its position in the table.
    pub fn add_variable(&mut self, variable: SsaVariable) -> SsaVarId {
        let id = SsaVarId::new(self.variables.len());
        let next = self.next_version.entry(variable.origin()).or_insert(0);
        *next = (*next).max(variable.version() + 1);
        if let VariableOrigin::Temp(slot) = variable.origin() {
            self.temp_symbols = self.temp_symbols.max(slot + 1);
        }
        let mut variable = variable;
        if variable.id() != id {
            variable = SsaVariable::new_typed(
                id,
                variable.origin(),
                variable.version(),
                variable.def_site(),
                *variable.var_type(),
            );
        }
        self.variables.push(variable);
        id
    }

    /// Creates the next version of `origin` and returns its id.
    pub fn create_variable(
        &mut self,
        origin: VariableOrigin,
        def_site: DefSite,
        var_type: SsaType,
    ) -> SsaVarId {
        let version = self.next_version.get(&origin).copied().unwrap_or(0);
        let id = SsaVarId::new(self.variables.len());
        self.add_variable(SsaVariable::new_typed(
            id, origin, version, def_site, var_type,
        ))
    }

    /// Reserves a fresh temporary symbol.
    pub fn allocate_temp_symbol(&mut self) -> VariableOrigin {
        let slot = self.temp_symbols;
        self.temp_symbols += 1;
        VariableOrigin::Temp(slot)
    }

    /// Iterates over all versions of the argument `arg_index`.
    pub fn variables_from_argument(&self, arg_index: u16) -> impl Iterator<Item = &SsaVariable> {
        self.variables
            .iter()
            .filter(move |v| v.origin() == VariableOrigin::Argument(arg_index))
    }

    /// Iterates over all versions of the local `local_index`.
    pub fn variables_from_local(&self, local_index: u16) -> impl Iterator<Item = &SsaVariable> {
        self.variables
            .iter()
            .filter(move |v| v.origin() == VariableOrigin::Local(local_index))
    }

    /// Returns the total number of phi nodes.
    #[must_use]
    pub fn total_phi_count(&self) -> usize {
        self.blocks.iter().map(|b| b.phi_nodes().len()).sum()
    }

    /// Returns the total number of instructions.
    #[must_use]
    pub fn total_instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions().len()).sum()
    }

    /// Iterates over all phi nodes.
    pub fn all_phi_nodes(&self) -> impl Iterator<Item = &PhiNode> {
        self.blocks.iter().flat_map(|b| b.phi_nodes().iter())
    }

    /// Iterates over all instructions.
    pub fn all_instructions(&self) -> impl Iterator<Item = &SsaInstruction> {
        self.blocks.iter().flat_map(|b| b.instructions().iter())
    }

    /// Iterates over `(block, instruction)` pairs with the given provenance.
    pub fn instructions_with_provenance(
        &self,
        provenance: Provenance,
    ) -> impl Iterator<Item = (usize, &SsaInstruction)> {
        self.blocks.iter().enumerate().flat_map(move |(idx, b)| {
            b.instructions()
                .iter()
                .filter(move |i| i.provenance() == provenance)
                .map(move |i| (idx, i))
        })
    }

    /// Recomputes definition sites and use lists from the block contents.
    ///
    /// Variables that are not defined by any phi or instruction are treated
    /// as entry definitions.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if an instruction or phi refers to a
    /// variable that does not exist, or if a variable is defined twice.
    pub fn rebuild_def_use(&mut self) -> Result<()> {
        let count = self.variables.len();
        let mut defs: Vec<Option<DefSite>> = vec![None; count];
        let mut uses: Vec<Vec<UseSite>> = vec![Vec::new(); count];

        let check = |var: SsaVarId| -> Result<usize> {
            if var.index() < count {
                Ok(var.index())
            } else {
                Err(malformed_error!("reference to unknown variable {}", var))
            }
        };

        for (block_idx, block) in self.blocks.iter().enumerate() {
            for (phi_idx, phi) in block.phi_nodes().iter().enumerate() {
                let result = check(phi.result())?;
                if defs[result].replace(DefSite::Phi(block_idx)).is_some() {
                    return Err(malformed_error!("variable {} defined twice", phi.result()));
                }
                for operand in phi.operands() {
                    let used = check(operand.value())?;
                    uses[used].push(UseSite::phi_operand(block_idx, phi_idx));
                }
            }
            for (instr_idx, instr) in block.instructions().iter().enumerate() {
                if let Some(dest) = instr.def() {
                    let dest_idx = check(dest)?;
                    if defs[dest_idx]
                        .replace(DefSite::instruction(block_idx, instr_idx))
                        .is_some()
                    {
                        return Err(malformed_error!("variable {} defined twice", dest));
                    }
                }
                for used in instr.uses() {
                    let used_idx = check(used)?;
                    uses[used_idx].push(UseSite::instruction(block_idx, instr_idx));
                }
            }
        }

        for ((variable, def), var_uses) in self.variables.iter_mut().zip(defs).zip(uses) {
            variable.set_def_site(def.unwrap_or(DefSite::Entry));
            variable.clear_uses();
            for site in var_uses {
                variable.add_use(site);
            }
        }
        Ok(())
    }
}

impl fmt::Display for SsaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "SSA Function ({} args, {} locals):",
            self.num_args, self.num_locals
        )?;
        writeln!(f, "  Variables: {}", self.variables.len())?;
        writeln!(f, "  Blocks: {}", self.blocks.len())?;
        writeln!(f)?;

        for block in &self.blocks {
            write!(f, "{block}")?;
        }

        Ok(())
    }
}
