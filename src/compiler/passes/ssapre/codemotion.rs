//! Code motion: turning the finalized occurrence graph into IR edits.
//!
//! Planning happens while the function is still borrowed by the candidate
//! engine and yields a self-contained [`MotionPlan`]. Applying the plan
//! mutates the function:
//!
//! - a saved computation keeps its instruction and copies the result into
//!   a fresh version of the candidate's temporary right after it;
//! - a reload turns into a copy from the temporary version reaching it;
//! - insertions and hoisted computations write a fresh version at the end
//!   of their block, before the terminator;
//! - available phis that survived finalization become phis of the
//!   temporary.
//!
//! Statement candidates have no value to carry. Their reloads are deleted
//! and their insertions are copies of the check.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet, HashMap},
};

use crate::{
    analysis::{DefSite, PhiNode, PhiOperand, Provenance, SsaFunction, SsaInstruction, SsaOp, SsaType, SsaVarId, VariableOrigin},
    compiler::passes::ssapre::{
        candidate::CandidateKey,
        engine::CandidateEngine,
        occurrence::{OccId, OccKind, OccTag, OpndFlags, PhiFlags, RealRole},
    },
    Result,
};

/// One change to a block. `version` indexes the plan's temporary
/// versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Edit {
    /// Copy the result of instruction `instr` into the temporary.
    SaveAfter {
        block: usize,
        instr: usize,
        version: usize,
        src: SsaVarId,
    },
    /// Replace instruction `instr` by a read of the temporary.
    Reload {
        block: usize,
        instr: usize,
        dest: SsaVarId,
        version: usize,
    },
    /// Compute the candidate into the temporary at the end of `block`.
    Compute {
        block: usize,
        version: usize,
        operands: Vec<SsaVarId>,
        provenance: Provenance,
    },
    /// Delete the redundant check `instr`.
    RemoveCheck { block: usize, instr: usize },
    /// Add the check at the end of `block`.
    InsertCheck { block: usize, operands: Vec<SsaVarId> },
}

impl Edit {
    fn block(&self) -> usize {
        match self {
            Self::SaveAfter { block, .. }
            | Self::Reload { block, .. }
            | Self::Compute { block, .. }
            | Self::RemoveCheck { block, .. }
            | Self::InsertCheck { block, .. } => *block,
        }
    }

    /// Index the edit applies at in the unmodified block, and whether it
    /// inserts a new instruction there.
    fn position(&self, ssa: &SsaFunction) -> Result<(usize, bool)> {
        let end = |block: usize| {
            ssa.block(block)
                .map(|b| b.insertion_point())
                .ok_or_else(|| malformed_error!("code motion into missing block {}", block))
        };
        Ok(match self {
            Self::SaveAfter { instr, .. } => (instr + 1, true),
            Self::Reload { instr, .. } | Self::RemoveCheck { instr, .. } => (*instr, false),
            Self::Compute { block, .. } | Self::InsertCheck { block, .. } => (end(*block)?, true),
        })
    }
}

/// A phi of the temporary at the block of an available phi occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TempPhi {
    pub block: usize,
    pub version: usize,
    /// Predecessor and the version flowing in from it. `None` where the
    /// temporary is undefined on that edge.
    pub operands: Vec<(usize, Option<usize>)>,
}

/// Edits of one candidate, ready to be applied.
#[derive(Debug, Clone)]
pub(crate) struct MotionPlan {
    key: CandidateKey,
    result_type: SsaType,
    versions: usize,
    edits: Vec<Edit>,
    pub temp_phis: Vec<TempPhi>,
}

impl MotionPlan {
    fn new(key: CandidateKey, result_type: SsaType) -> Self {
        Self {
            key,
            result_type,
            versions: 0,
            edits: Vec::new(),
            temp_phis: Vec::new(),
        }
    }

    fn next_version(&mut self) -> usize {
        let version = self.versions;
        self.versions += 1;
        version
    }

    pub(crate) fn edits(&self) -> &[Edit] {
        &self.edits
    }

    /// Returns `true` if applying the plan changes nothing.
    pub(crate) fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.temp_phis.is_empty()
    }

    pub(crate) fn saves(&self) -> usize {
        self.count(|edit| matches!(edit, Edit::SaveAfter { .. }))
    }

    pub(crate) fn reloads(&self) -> usize {
        self.count(|edit| matches!(edit, Edit::Reload { .. }))
    }

    pub(crate) fn removed_checks(&self) -> usize {
        self.count(|edit| matches!(edit, Edit::RemoveCheck { .. }))
    }

    /// Computations added at phi operands, including checks.
    pub(crate) fn insertions(&self) -> usize {
        self.count(|edit| {
            matches!(
                edit,
                Edit::Compute {
                    provenance: Provenance::Insertion,
                    ..
                } | Edit::InsertCheck { .. }
            )
        })
    }

    pub(crate) fn hoisted_computes(&self) -> usize {
        self.count(|edit| {
            matches!(
                edit,
                Edit::Compute {
                    provenance: Provenance::Hoist,
                    ..
                }
            )
        })
    }

    /// Blocks receiving a definition of the temporary.
    pub(crate) fn def_blocks(&self) -> BTreeSet<usize> {
        self.edits
            .iter()
            .filter(|edit| matches!(edit, Edit::SaveAfter { .. } | Edit::Compute { .. }))
            .map(Edit::block)
            .chain(self.temp_phis.iter().map(|phi| phi.block))
            .collect()
    }

    fn count(&self, f: impl Fn(&Edit) -> bool) -> usize {
        self.edits.iter().filter(|edit| f(edit)).count()
    }

    /// Applies the plan to `ssa` and records the new temporary in `table`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if an edit refers to a block or
    /// instruction that does not exist, or if the candidate cannot be built
    /// over the planned operands.
    pub(crate) fn apply(&self, ssa: &mut SsaFunction, table: &mut SsaUpdateTable) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let mut temp = None;
        let mut vars = Vec::new();
        if self.versions > 0 {
            let origin = ssa.allocate_temp_symbol();
            vars = (0..self.versions)
                .map(|_| ssa.create_variable(origin, DefSite::Entry, self.result_type))
                .collect();
            temp = Some(origin);
        }
        let var = |version: usize| {
            vars.get(version)
                .copied()
                .ok_or_else(|| malformed_error!("temporary version {} was never planned", version))
        };

        let mut per_block: BTreeMap<usize, Vec<(usize, bool, usize)>> = BTreeMap::new();
        for (seq, edit) in self.edits.iter().enumerate() {
            let (pos, inserts) = edit.position(ssa)?;
            per_block.entry(edit.block()).or_default().push((pos, inserts, seq));
        }

        for (block_idx, mut order) in per_block {
            order.sort_by_key(|&(pos, inserts, seq)| (Reverse(pos), inserts, Reverse(seq)));
            for (pos, _, seq) in order {
                let instruction = match &self.edits[seq] {
                    Edit::SaveAfter { version, src, .. } => Some(SsaInstruction::synthetic(
                        SsaOp::Copy {
                            dest: var(*version)?,
                            src: *src,
                        },
                        Provenance::Save,
                    )),
                    Edit::Compute {
                        version,
                        operands,
                        provenance,
                        ..
                    } => {
                        let op = self
                            .key
                            .shape
                            .build_op(Some(var(*version)?), operands)
                            .ok_or_else(|| malformed_error!("{} cannot be built over {:?}", self.key, operands))?;
                        Some(SsaInstruction::synthetic(op, *provenance))
                    }
                    Edit::InsertCheck { operands, .. } => {
                        let op = self
                            .key
                            .shape
                            .build_op(None, operands)
                            .ok_or_else(|| malformed_error!("{} cannot be built over {:?}", self.key, operands))?;
                        Some(SsaInstruction::synthetic(op, Provenance::Insertion))
                    }
                    Edit::Reload { .. } | Edit::RemoveCheck { .. } => None,
                };

                let block = ssa
                    .block_mut(block_idx)
                    .ok_or_else(|| malformed_error!("code motion into missing block {}", block_idx))?;
                let instructions = block.instructions_mut();
                if pos > instructions.len() {
                    return Err(malformed_error!("B{} has no position {}", block_idx, pos));
                }
                match (&self.edits[seq], instruction) {
                    (_, Some(instruction)) => instructions.insert(pos, instruction),
                    (Edit::Reload { dest, version, .. }, None) => {
                        let src = var(*version)?;
                        let target = instructions
                            .get_mut(pos)
                            .ok_or_else(|| malformed_error!("reload of missing B{}:{}", block_idx, pos))?;
                        target.set_op(SsaOp::Copy { dest: *dest, src }, Provenance::Reload);
                    }
                    (Edit::RemoveCheck { .. }, None) => {
                        if pos >= instructions.len() {
                            return Err(malformed_error!("removal of missing B{}:{}", block_idx, pos));
                        }
                        instructions.remove(pos);
                    }
                    _ => {}
                }
            }
        }

        if let Some(origin) = temp {
            for temp_phi in &self.temp_phis {
                let mut phi = PhiNode::new(var(temp_phi.version)?, origin);
                for &(pred, version) in &temp_phi.operands {
                    let value = match version {
                        Some(version) => var(version)?,
                        None => ssa.create_variable(origin, DefSite::Entry, self.result_type),
                    };
                    phi.add_operand(PhiOperand::new(value, pred));
                }
                ssa.block_mut(temp_phi.block)
                    .ok_or_else(|| malformed_error!("temporary phi in missing block {}", temp_phi.block))?
                    .add_phi(phi);
            }
            table.record(origin, self.key.clone(), self.def_blocks());
        }

        ssa.rebuild_def_use()
    }
}

/// Symbols introduced by redundancy elimination that a later SSA repair
/// has to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaUpdateEntry {
    /// The candidate the temporary carries.
    pub candidate: CandidateKey,
    /// Blocks holding a definition of the temporary.
    pub def_blocks: BTreeSet<usize>,
}

/// Side table of temporaries, keyed by symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SsaUpdateTable {
    entries: BTreeMap<VariableOrigin, SsaUpdateEntry>,
}

impl SsaUpdateTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no temporary was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of recorded temporaries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the entry of `symbol`.
    #[must_use]
    pub fn get(&self, symbol: VariableOrigin) -> Option<&SsaUpdateEntry> {
        self.entries.get(&symbol)
    }

    /// Iterates over the temporaries in symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (&VariableOrigin, &SsaUpdateEntry)> {
        self.entries.iter()
    }

    /// Records definitions of `symbol` in `blocks`.
    pub fn record(&mut self, symbol: VariableOrigin, candidate: CandidateKey, blocks: BTreeSet<usize>) {
        self.entries
            .entry(symbol)
            .or_insert_with(|| SsaUpdateEntry {
                candidate,
                def_blocks: BTreeSet::new(),
            })
            .def_blocks
            .extend(blocks);
    }

    /// Adds all entries of `other`.
    pub fn merge(&mut self, other: SsaUpdateTable) {
        for (symbol, entry) in other.entries {
            self.record(symbol, entry.candidate, entry.def_blocks);
        }
    }
}

impl CandidateEngine<'_> {
    /// Plans the edits realizing the finalized occurrence graph.
    pub(super) fn plan_motion(&self) -> Result<MotionPlan> {
        let mut plan = MotionPlan::new(self.candidate.key.clone(), self.candidate.result_type);
        if self.candidate.is_expression() {
            self.plan_expression(&mut plan)?;
        } else {
            self.plan_statement(&mut plan)?;
        }
        Ok(plan)
    }

    fn plan_expression(&self, plan: &mut MotionPlan) -> Result<()> {
        let mut saved: HashMap<OccId, usize> = HashMap::new();
        let mut phis = Vec::new();

        for &id in &self.all_occs {
            let occ = self.occ(id);
            match occ.kind.tag() {
                OccTag::Real => {
                    let real = self.real(id)?;
                    if real.role != RealRole::Save {
                        continue;
                    }
                    let version = plan.next_version();
                    saved.insert(id, version);
                    match (real.instruction, real.dest) {
                        (Some(instr), Some(src)) => plan.edits.push(Edit::SaveAfter {
                            block: occ.block,
                            instr,
                            version,
                            src,
                        }),
                        (None, _) if real.hoisted => plan.edits.push(Edit::Compute {
                            block: occ.block,
                            version,
                            operands: real.operands.clone(),
                            provenance: Provenance::Hoist,
                        }),
                        _ => return Err(malformed_error!("saved {} has nothing to save", id)),
                    }
                }
                OccTag::PhiOpnd => {
                    let opnd = self.opnd(id)?;
                    if !self.will_be_avail(opnd.phi)? || opnd.flags.contains(OpndFlags::PHI_OPND_RELOAD) {
                        continue;
                    }
                    let Some(def) = occ.def.filter(|&def| self.occ(def).is_inserted()) else {
                        continue;
                    };
                    if saved.contains_key(&def) {
                        continue;
                    }
                    let operands = match &self.occ(def).kind {
                        OccKind::Inserted(inserted) => {
                            inserted.operands.clone()
                        }
                        _ => continue,
                    };
                    let version = plan.next_version();
                    saved.insert(def, version);
                    plan.edits.push(Edit::Compute {
                        block: self.occ(def).block,
                        version,
                        operands,
                        provenance: Provenance::Insertion,
                    });
                }
                OccTag::Phi => {
                    if !self.will_be_avail(id)? || self.phi_has(id, PhiFlags::EXTRANEOUS)? {
                        continue;
                    }
                    let version = plan.next_version();
                    saved.insert(id, version);
                    phis.push((id, version));
                }
                _ => {}
            }
        }

        for &id in &self.all_occs {
            let Some(real) = self.occ(id).as_real() else {
                continue;
            };
            if real.role != RealRole::Reload {
                continue;
            }
            let (Some(instr), Some(dest)) = (real.instruction, real.dest) else {
                continue;
            };
            let def = self
                .occ(id)
                .def
                .ok_or_else(|| malformed_error!("reload {} has no definition", id))?;
            let version = saved
                .get(&def)
                .copied()
                .ok_or_else(|| malformed_error!("reload {} reads {} which was never saved", id, def))?;
            plan.edits.push(Edit::Reload {
                block: self.occ(id).block,
                instr,
                dest,
                version,
            });
        }

        for (phi, version) in phis {
            let mut operands = Vec::new();
            for opnd in self.phi_operands(phi)? {
                let pred = self.occ(opnd).block;
                let value = self.occ(opnd).def.and_then(|def| saved.get(&def).copied());
                operands.push((pred, value));
            }
            let block = self.occ(phi).block;
            operands.extend(self.analysis.unreachable_predecessors(block).iter().map(|&pred| (pred, None)));
            plan.temp_phis.push(TempPhi {
                block,
                version,
                operands,
            });
        }
        Ok(())
    }

    fn plan_statement(&self, plan: &mut MotionPlan) -> Result<()> {
        for &id in &self.all_occs {
            let occ = self.occ(id);
            match &occ.kind {
                OccKind::Real(real) => {
                    if let (RealRole::Reload, Some(instr)) = (real.role, real.instruction) {
                        plan.edits.push(Edit::RemoveCheck {
                            block: occ.block,
                            instr,
                        });
                    }
                }
                OccKind::PhiOpnd(opnd) => {
                    if !self.will_be_avail(opnd.phi)? || opnd.flags.contains(OpndFlags::PHI_OPND_RELOAD) {
                        continue;
                    }
                    let Some(def) = occ.def.filter(|&def| self.occ(def).is_inserted()) else {
                        continue;
                    };
                    if let OccKind::Inserted(inserted) = &self.occ(def).kind {
                        plan.edits.push(Edit::InsertCheck {
                            block: self.occ(def).block,
                            operands: inserted.operands.clone(),
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{BinaryOpKind, SsaFunctionBuilder},
        compiler::passes::ssapre::candidate::{CandidateShape, ExprOp},
    };

    fn add_key() -> CandidateKey {
        CandidateKey {
            shape: CandidateShape::Expression(ExprOp::Binary {
                kind: BinaryOpKind::Add,
                unsigned: false,
            }),
            symbols: vec![VariableOrigin::Argument(0), VariableOrigin::Argument(1)],
        }
    }

    #[test]
    fn test_save_and_reload_in_one_block() {
        let mut ssa = SsaFunctionBuilder::new(2, 0).build_with(|f| {
            let (a, b) = (f.arg(0), f.arg(1));
            f.block(0, |blk| {
                let x = blk.add(a, b);
                let y = blk.add(a, b);
                let z = blk.mul(x, y);
                blk.ret_val(z);
            });
        });
        let block = ssa.block(0).unwrap();
        let x = block.instructions()[0].def().unwrap();
        let y = block.instructions()[1].def().unwrap();

        let mut plan = MotionPlan::new(add_key(), SsaType::I32);
        let version = plan.next_version();
        plan.edits.push(Edit::SaveAfter {
            block: 0,
            instr: 0,
            version,
            src: x,
        });
        plan.edits.push(Edit::Reload {
            block: 0,
            instr: 1,
            dest: y,
            version,
        });

        let mut table = SsaUpdateTable::new();
        plan.apply(&mut ssa, &mut table).unwrap();

        let instructions = ssa.block(0).unwrap().instructions();
        assert_eq!(instructions.len(), 5);
        assert_eq!(instructions[1].provenance(), Provenance::Save);
        assert_eq!(instructions[2].provenance(), Provenance::Reload);
        assert!(matches!(instructions[2].op(), SsaOp::Copy { dest, .. } if *dest == y));
        assert_eq!(table.len(), 1);
        let (_, entry) = table.iter().next().unwrap();
        assert_eq!(entry.def_blocks, BTreeSet::from([0]));
    }

    #[test]
    fn test_insertion_goes_before_terminator() {
        let mut ssa = SsaFunctionBuilder::new(3, 0).build_with(|f| {
            let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |blk| blk.branch(c, 1, 2));
            f.block(1, |blk| blk.jump(2));
            f.block(2, |blk| {
                let s = blk.add(a, b);
                blk.ret_val(s);
            });
        });
        let a = ssa.variables_from_argument(0).next().unwrap().id();
        let b = ssa.variables_from_argument(1).next().unwrap().id();
        let mut plan = MotionPlan::new(add_key(), SsaType::I32);
        let version = plan.next_version();
        plan.edits.push(Edit::Compute {
            block: 1,
            version,
            operands: vec![a, b],
            provenance: Provenance::Insertion,
        });
        let mut table = SsaUpdateTable::new();
        plan.apply(&mut ssa, &mut table).unwrap();

        let instructions = ssa.block(1).unwrap().instructions();
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].provenance(), Provenance::Insertion);
        assert!(instructions[1].is_terminator());
        assert_eq!(plan.insertions(), 1);
    }

    #[test]
    fn test_empty_plan_leaves_function_alone() {
        let mut ssa = SsaFunctionBuilder::new(0, 0).build_with(|f| f.block(0, |blk| blk.ret()));
        let before = ssa.variable_count();
        let plan = MotionPlan::new(add_key(), SsaType::I32);
        let mut table = SsaUpdateTable::new();
        plan.apply(&mut ssa, &mut table).unwrap();
        assert!(table.is_empty());
        assert_eq!(ssa.variable_count(), before);
    }

    #[test]
    fn test_table_merge_unions_blocks() {
        let mut left = SsaUpdateTable::new();
        left.record(VariableOrigin::Temp(0), add_key(), BTreeSet::from([1]));
        let mut right = SsaUpdateTable::new();
        right.record(VariableOrigin::Temp(0), add_key(), BTreeSet::from([3]));
        right.record(VariableOrigin::Temp(1), add_key(), BTreeSet::from([2]));
        left.merge(right);
        assert_eq!(left.len(), 2);
        assert_eq!(
            left.get(VariableOrigin::Temp(0)).unwrap().def_blocks,
            BTreeSet::from([1, 3])
        );
    }
}
