//! SSA basic blocks containing phi nodes and instructions.
//!
//! # Block Structure
//!
//! ```text
//! Block B:
//!   // Phi nodes (executed "simultaneously" at block entry)
//!   v3 = phi(v1 from B0, v2 from B1)
//!
//!   // Instructions (executed sequentially)
//!   v7 = add v3, v6
//!   br v7, B2, B3
//! ```
//!
//! A block ends in at most one terminator. A block without a terminator has
//! no successors and exits the function.

use std::fmt;

use crate::analysis::ssa::{PhiNode, SsaInstruction, SsaVarId};

/// An SSA basic block with phi nodes and instructions.
#[derive(Debug, Clone)]
pub struct SsaBlock {
    id: usize,
    phi_nodes: Vec<PhiNode>,
    instructions: Vec<SsaInstruction>,
}

impl SsaBlock {
    /// Creates a new empty SSA block.
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self {
            id,
            phi_nodes: Vec::new(),
            instructions: Vec::new(),
        }
    }

    /// Returns the block index.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Returns the phi nodes.
    #[must_use]
    pub fn phi_nodes(&self) -> &[PhiNode] {
        &self.phi_nodes
    }

    /// Returns the phi nodes mutably.
    pub fn phi_nodes_mut(&mut self) -> &mut Vec<PhiNode> {
        &mut self.phi_nodes
    }

    /// Returns the instructions.
    #[must_use]
    pub fn instructions(&self) -> &[SsaInstruction] {
        &self.instructions
    }

    /// Returns the instructions mutably.
    pub fn instructions_mut(&mut self) -> &mut Vec<SsaInstruction> {
        &mut self.instructions
    }

    /// Returns `true` if the block has no phis and no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phi_nodes.is_empty() && self.instructions.is_empty()
    }

    /// Appends a phi node.
    pub fn add_phi(&mut self, phi: PhiNode) {
        self.phi_nodes.push(phi);
    }

    /// Appends an instruction.
    pub fn add_instruction(&mut self, instr: SsaInstruction) {
        self.instructions.push(instr);
    }

    /// Returns the instruction at `index`.
    #[must_use]
    pub fn instruction(&self, index: usize) -> Option<&SsaInstruction> {
        self.instructions.get(index)
    }

    /// Returns the instruction at `index` mutably.
    pub fn instruction_mut(&mut self, index: usize) -> Option<&mut SsaInstruction> {
        self.instructions.get_mut(index)
    }

    /// Returns the phi node defining `var`.
    #[must_use]
    pub fn find_phi_defining(&self, var: SsaVarId) -> Option<&PhiNode> {
        self.phi_nodes.iter().find(|phi| phi.result() == var)
    }

    /// Returns the terminator, if the block has one.
    #[must_use]
    pub fn terminator(&self) -> Option<&SsaInstruction> {
        self.instructions.last().filter(|instr| instr.is_terminator())
    }

    /// Returns the position at which code placed "at the end" of the block goes:
    /// right before the terminator, or after the last instruction.
    #[must_use]
    pub fn insertion_point(&self) -> usize {
        match self.terminator() {
            Some(_) => self.instructions.len() - 1,
            None => self.instructions.len(),
        }
    }

    /// Returns the successor blocks in terminator order, without duplicates.
    #[must_use]
    pub fn successors(&self) -> Vec<usize> {
        let mut succs = Vec::new();
        if let Some(term) = self.terminator() {
            for target in term.op().successors() {
                if !succs.contains(&target) {
                    succs.push(target);
                }
            }
        }
        succs
    }

    /// Iterates over all variables defined in this block.
    pub fn defined_variables(&self) -> impl Iterator<Item = SsaVarId> + '_ {
        self.phi_nodes
            .iter()
            .map(PhiNode::result)
            .chain(self.instructions.iter().filter_map(SsaInstruction::def))
    }
}

impl fmt::Display for SsaBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "B{}:", self.id)?;
        for phi in &self.phi_nodes {
            writeln!(f, "  {phi}")?;
        }
        for instr in &self.instructions {
            writeln!(f, "  {instr}")?;
        }
        Ok(())
    }
}
