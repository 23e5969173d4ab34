//! Finalization: deciding saves, reloads and insertions.
//!
//! The first pass walks the occurrences in dominator tree preorder and
//! tracks the available definition of each class. Real occurrences covered
//! by an available definition become reloads, operands of available phis
//! either get an insertion or point at the available definition.
//!
//! The second pass keeps only what the reloads need: definitions reached
//! from a reload are saved, and available phis that no saved value flows
//! into are extraneous and get replaced by one of their operands.

use crate::{
    compiler::passes::ssapre::{
        engine::CandidateEngine,
        occurrence::{InsertedOcc, OccId, OccKind, OccTag, Occurrence, OpndFlags, PhiFlags, RealRole},
    },
    Error, Result,
};

impl CandidateEngine<'_> {
    /// Returns `true` if finalization inserts the computation for the phi
    /// operand `opnd` of an available phi.
    pub(super) fn ok_to_insert(&self, opnd: OccId) -> Result<bool> {
        let Some(def) = self.occ(opnd).def else {
            return Ok(true);
        };
        if self.opnd_has(opnd, OpndFlags::HAS_REAL_USE)? {
            return Ok(false);
        }
        Ok(self.occ(def).is_phi() && !self.will_be_avail(def)?)
    }

    /// Assigns reloads and insertions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CriticalEdge`] when an insertion would land in a
    /// block with several successors, and [`Error::Malformed`] if that
    /// happens again after the classical retry.
    pub(super) fn finalize1(&mut self) -> Result<()> {
        let mut avail_def: Vec<Option<OccId>> = vec![None; self.class_count as usize];

        for pos in 0..self.all_occs.len() {
            let id = self.all_occs[pos];
            let class = self.occ(id).class_id as usize;
            if class >= avail_def.len() {
                avail_def.resize(class + 1, None);
            }

            match self.occ(id).kind.tag() {
                OccTag::Phi => {
                    if self.will_be_avail(id)? {
                        avail_def[class] = Some(id);
                    }
                }
                OccTag::Real => match avail_def[class].filter(|&def| self.occ_dominates(def, id)) {
                    None => {
                        self.real_mut(id)?.role = RealRole::Plain;
                        avail_def[class] = Some(id);
                    }
                    Some(def) => {
                        self.real_mut(id)?.role = RealRole::Reload;
                        self.occ_mut(id).def = Some(def);
                    }
                },
                OccTag::PhiOpnd => {
                    let phi = self.opnd(id)?.phi;
                    if !self.will_be_avail(phi)? {
                        continue;
                    }
                    if self.ok_to_insert(id)? {
                        self.insert_at_operand(id)?;
                    } else {
                        let def = avail_def[class]
                            .ok_or_else(|| malformed_error!("{} of an available phi has no available def", id))?;
                        self.occ_mut(id).def = Some(def);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn insert_at_operand(&mut self, opnd_id: OccId) -> Result<()> {
        let block = self.occ(opnd_id).block;
        if self.analysis.successor_count(block) > 1 {
            if self.redo_critical_edges {
                return Err(malformed_error!(
                    "insertion for {} on a critical edge out of B{} after the classical retry",
                    self.candidate.key,
                    block
                ));
            }
            return Err(Error::CriticalEdge {
                block,
                candidate: self.candidate_index(),
            });
        }

        let operands = self
            .opnd(opnd_id)?
            .current_expr
            .clone()
            .ok_or_else(|| malformed_error!("{} needs an insertion but was never renamed", opnd_id))?;
        let class = self.next_class();
        let mut inserted = Occurrence::new(
            OccKind::Inserted(InsertedOcc { operands }),
            block,
            self.analysis.dfn(block),
            usize::MAX,
        );
        inserted.class_id = class;
        let inserted = self.new_occ(inserted);

        let opnd = self.occ_mut(opnd_id);
        opnd.def = Some(inserted);
        opnd.class_id = class;
        self.set_opnd_flag(opnd_id, OpndFlags::INSERTED, true)
    }

    fn candidate_index(&self) -> usize {
        self.worklist
            .candidates
            .iter()
            .position(|candidate| candidate.key == self.candidate.key)
            .unwrap_or_default()
    }

    /// Marks saved definitions and removes extraneous phis.
    pub(super) fn finalize2(&mut self) -> Result<()> {
        let phis = self.phi_occs.clone();
        for &phi in &phis {
            let available = self.will_be_avail(phi)?;
            self.set_phi_flag(phi, PhiFlags::EXTRANEOUS, available)?;
            for opnd in self.phi_operands(phi)? {
                self.set_opnd_flag(opnd, OpndFlags::PROCESSED, false)?;
            }
        }

        for real in self.real_occs.clone() {
            if self.real(real)?.role != RealRole::Reload {
                continue;
            }
            let def = self
                .occ(real)
                .def
                .ok_or_else(|| malformed_error!("reload {} has no definition", real))?;
            self.set_save(def)?;
        }

        for &phi in &phis {
            let flags = self.phi(phi)?.flags;
            if flags.contains(PhiFlags::REMOVED) || !flags.contains(PhiFlags::EXTRANEOUS) {
                continue;
            }
            if !self.will_be_avail(phi)? {
                self.set_phi_flag(phi, PhiFlags::REMOVED, true)?;
                continue;
            }
            for opnd in self.phi_operands(phi)? {
                let def = self
                    .occ(opnd)
                    .def
                    .ok_or_else(|| malformed_error!("{} of an available phi has no definition", opnd))?;
                let replaces = match self.occ(def).kind.tag() {
                    OccTag::Real | OccTag::Inserted => true,
                    OccTag::Phi => !self.phi_has(def, PhiFlags::EXTRANEOUS)?,
                    other => {
                        return Err(malformed_error!("{} defined by a {:?} occurrence", opnd, other));
                    }
                };
                if replaces {
                    self.set_replacement(phi, def)?;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Saves every definition reaching `start` and keeps the available phis
    /// on the way alive.
    fn set_save(&mut self, start: OccId) -> Result<()> {
        let mut pending = vec![start];
        while let Some(def) = pending.pop() {
            let tag = self.occ(def).kind.tag();
            match tag {
                OccTag::Real => {
                    let real = self.real_mut(def)?;
                    if real.role == RealRole::Reload {
                        return Err(malformed_error!("reload {} cannot be saved", def));
                    }
                    real.role = RealRole::Save;
                }
                OccTag::Phi => {
                    for opnd in self.phi_operands(def)? {
                        if self.opnd_has(opnd, OpndFlags::PROCESSED)? {
                            continue;
                        }
                        self.set_opnd_flag(opnd, OpndFlags::PROCESSED, true)?;
                        let opnd_def = self
                            .occ(opnd)
                            .def
                            .ok_or_else(|| malformed_error!("{} reaches a save without a definition", opnd))?;
                        pending.push(opnd_def);
                    }
                }
                _ => {}
            }

            if matches!(tag, OccTag::Real | OccTag::Inserted) {
                let frontier = self.analysis.iterated_frontier([self.occ(def).block]);
                for phi in self.phi_occs.clone() {
                    if frontier.contains(self.occ(phi).block) && self.will_be_avail(phi)? {
                        self.set_phi_flag(phi, PhiFlags::EXTRANEOUS, false)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Removes the extraneous phi `occg`, redirecting its uses to `rep`.
    fn set_replacement(&mut self, occg: OccId, rep: OccId) -> Result<()> {
        let rep_class = self.occ(rep).class_id;
        self.set_phi_flag(occg, PhiFlags::REMOVED, true)?;
        let mut pending = vec![occg];

        while let Some(g) = pending.pop() {
            for phi in self.phi_occs.clone() {
                if self.phi_has(phi, PhiFlags::REMOVED)? {
                    continue;
                }
                let extraneous = self.phi_has(phi, PhiFlags::EXTRANEOUS)?;
                for opnd in self.phi_operands(phi)? {
                    if self.occ(opnd).def != Some(g) {
                        continue;
                    }
                    if extraneous {
                        self.set_phi_flag(phi, PhiFlags::REMOVED, true)?;
                        pending.push(phi);
                        break;
                    }
                    let occ = self.occ_mut(opnd);
                    occ.def = Some(rep);
                    occ.class_id = rep_class;
                    self.set_opnd_flag(opnd, OpndFlags::PHI_OPND_RELOAD, true)?;
                }
            }

            for real in self.real_occs.clone() {
                if self.real(real)?.role == RealRole::Reload && self.occ(real).def == Some(g) {
                    let occ = self.occ_mut(real);
                    occ.def = Some(rep);
                    occ.class_id = rep_class;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        analysis::{SsaFunction, SsaFunctionBuilder},
        compiler::{
            config::PreConfig,
            passes::ssapre::{
                analysis::FunctionAnalysis,
                candidate::Worklist,
                engine::CandidateEngine,
                occurrence::{OccTag, OpndFlags, PhiFlags, RealRole},
            },
        },
        Error,
    };

    fn prepared(ssa: &SsaFunction, check: impl FnOnce(&mut CandidateEngine<'_>)) {
        let analysis = FunctionAnalysis::new(ssa);
        let config = PreConfig::classical();
        let worklist = Worklist::build(ssa, &analysis, &config).unwrap();
        let mut engine =
            CandidateEngine::new(ssa, &analysis, &config, None, &worklist, &worklist.candidates[0], false);
        assert!(engine.build_occurrences().unwrap());
        engine.rename1().unwrap();
        engine.rename2().unwrap();
        engine.compute_classical_avail().unwrap();
        check(&mut engine);
    }

    fn roles(engine: &CandidateEngine<'_>) -> Vec<RealRole> {
        engine
            .real_occs
            .iter()
            .filter(|&&id| engine.occ(id).as_real().is_some_and(|real| real.instruction.is_some()))
            .map(|&id| engine.occ(id).as_real().unwrap().role)
            .collect()
    }

    #[test]
    fn test_partial_redundancy_saves_reloads_and_inserts() {
        // 0 -> {1, 2} -> 3, a + b in B1 and B3
        let ssa = SsaFunctionBuilder::new(3, 0).build_with(|f| {
            let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |blk| blk.branch(c, 1, 2));
            f.block(1, |blk| {
                let _ = blk.add(a, b);
                blk.jump(3);
            });
            f.block(2, |blk| blk.jump(3));
            f.block(3, |blk| {
                let sum = blk.add(a, b);
                blk.ret_val(sum);
            });
        });
        prepared(&ssa, |engine| {
            engine.finalize1().unwrap();
            engine.finalize2().unwrap();
            assert_eq!(roles(engine), vec![RealRole::Save, RealRole::Reload]);

            let phi = engine.phi_occs[0];
            assert!(!engine.phi_has(phi, PhiFlags::EXTRANEOUS).unwrap());
            let opnds = engine.phi_operands(phi).unwrap();
            assert!(engine.opnd_has(opnds[1], OpndFlags::INSERTED).unwrap());
            let inserted = engine.occ(opnds[1]).def.unwrap();
            assert_eq!(engine.occ(inserted).kind.tag(), OccTag::Inserted);
            assert_eq!(engine.occ(inserted).block, 2);
        });
    }

    #[test]
    fn test_full_redundancy_in_one_block() {
        let ssa = SsaFunctionBuilder::new(2, 0).build_with(|f| {
            let (a, b) = (f.arg(0), f.arg(1));
            f.block(0, |blk| {
                let x = blk.add(a, b);
                let y = blk.add(a, b);
                let z = blk.mul(x, y);
                blk.ret_val(z);
            });
        });
        prepared(&ssa, |engine| {
            engine.finalize1().unwrap();
            engine.finalize2().unwrap();
            assert_eq!(roles(engine), vec![RealRole::Save, RealRole::Reload]);
        });
    }

    #[test]
    fn test_unused_phi_is_extraneous() {
        // Both arms compute a + b, the merge only returns.
        let ssa = SsaFunctionBuilder::new(3, 0).build_with(|f| {
            let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |blk| blk.branch(c, 1, 2));
            f.block(1, |blk| {
                let _ = blk.add(a, b);
                blk.jump(3);
            });
            f.block(2, |blk| {
                let _ = blk.add(a, b);
                blk.jump(3);
            });
            f.block(3, |blk| blk.ret());
        });
        prepared(&ssa, |engine| {
            engine.finalize1().unwrap();
            engine.finalize2().unwrap();
            assert_eq!(roles(engine), vec![RealRole::Plain, RealRole::Plain]);
            let phi = engine.phi_occs[0];
            assert!(!engine.will_be_avail(phi).unwrap() || engine.phi_has(phi, PhiFlags::EXTRANEOUS).unwrap());
        });
    }

    #[test]
    fn test_insertion_on_critical_edge_is_reported() {
        // B2 branches to B3 and B4, so its edge into B3 is critical.
        let ssa = SsaFunctionBuilder::new(4, 0).build_with(|f| {
            let (a, b, c, d) = (f.arg(0), f.arg(1), f.arg(2), f.arg(3));
            f.block(0, |blk| blk.branch(c, 1, 2));
            f.block(1, |blk| {
                let _ = blk.add(a, b);
                blk.jump(3);
            });
            f.block(2, |blk| blk.branch(d, 3, 4));
            f.block(3, |blk| {
                let sum = blk.add(a, b);
                blk.ret_val(sum);
            });
            f.block(4, |blk| blk.ret());
        });
        prepared(&ssa, |engine| {
            match engine.finalize1() {
                Err(Error::CriticalEdge { block, .. }) => assert_eq!(block, 2),
                other => panic!("expected a critical edge, got {other:?}"),
            }
        });
    }
}
