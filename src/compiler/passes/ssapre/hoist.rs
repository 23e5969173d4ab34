//! Hoisting to control-dependence points.
//!
//! A block whose post-dominance frontier is a single block `cd` that also
//! dominates it is reached from `cd` through one particular successor edge.
//! When every successor of `cd` leads to a computation of the candidate (or
//! to an insertion the placement already wants), the computations can be
//! replaced by one occurrence at the end of `cd`.
//!
//! Hoisting runs after availability is known and before the first
//! finalization, so it only relabels the occurrence graph. Code is emitted
//! later for hoisted occurrences that end up saved.

use crate::{
    analysis::{DefSite, SsaVarId},
    compiler::passes::ssapre::{
        engine::CandidateEngine,
        occurrence::{OccId, OccKind, OccTag, Occurrence, OpndFlags, RealOcc, RealRole},
    },
    Result,
};

#[derive(Debug, Clone, Copy)]
struct ControlDep {
    block: usize,
    /// Successor of `block` leading to the dependent block.
    which_succ: usize,
}

#[derive(Debug, Clone, Default)]
struct HoistSummary {
    cd: Option<ControlDep>,
    succ_mask: u32,
    active: bool,
    /// Successors not yet known to reach the candidate.
    succ_left: u32,
    occ: Option<OccId>,
    hoisted: Option<OccId>,
}

impl HoistSummary {
    fn activate(&mut self) {
        if !self.active {
            self.active = true;
            self.succ_left = self.succ_mask;
        }
    }

    fn fully_anticipated(&self) -> bool {
        self.active && self.succ_left == 0
    }
}

struct Hoister {
    summaries: Vec<HoistSummary>,
    worklist: Vec<usize>,
}

impl CandidateEngine<'_> {
    /// Moves computations that every successor of a control-dependence
    /// point performs up to that point.
    pub(super) fn hoist(&mut self) -> Result<()> {
        let mut hoister = Hoister {
            summaries: self.hoist_summaries(),
            worklist: Vec::new(),
        };
        let occs = self.all_occs.clone();

        for &id in &occs {
            let Some(real) = self.occ(id).as_real() else {
                continue;
            };
            let block = self.occ(id).block;
            let def = self.occ(id).def;
            let expr = real.operands.clone();
            let hs = &mut hoister.summaries[block];
            hs.activate();
            let Some(cd) = hs.cd else {
                continue;
            };
            if hs.occ.is_some() || !self.available_at(cd.block, &expr)? || !self.def_allows_hoist(cd.block, def) {
                continue;
            }
            hoister.summaries[block].occ = Some(id);
            hoister.worklist.push(block);
            self.update_succ_count(&mut hoister, cd, &expr, Some(id))?;
        }

        for &id in &occs {
            let Some(opnd) = self.occ(id).as_opnd() else {
                continue;
            };
            let block = self.occ(id).block;
            let def = self.occ(id).def;
            let Some(expr) = opnd.current_expr.clone() else {
                continue;
            };
            hoister.summaries[block].activate();
            if !self.will_be_avail(opnd.phi)? || !self.ok_to_insert(id)? {
                continue;
            }
            let hs = &hoister.summaries[block];
            let Some(cd) = hs.cd else {
                continue;
            };
            if hs.occ.is_some()
                || hoister.summaries[cd.block].occ.is_none()
                || !self.available_at(cd.block, &expr)?
                || !self.def_allows_hoist(cd.block, def)
            {
                continue;
            }
            hoister.summaries[block].occ = Some(id);
            hoister.worklist.push(block);
            self.update_succ_count(&mut hoister, cd, &expr, None)?;
        }

        let worklist = hoister.worklist.clone();
        for &block in &worklist {
            let Some(real_id) = hoister.summaries[block].occ.filter(|&occ| self.occ(occ).is_real()) else {
                continue;
            };
            let Some(cd) = self.ready_cd(&hoister, block) else {
                continue;
            };
            let expr = self.real(real_id)?.operands.clone();
            if let Some(existing) = hoister.summaries[cd.block].hoisted {
                if self.occ(existing).is_real() && self.real(existing)?.operands != expr {
                    continue;
                }
            }

            let def = self.occ(real_id).def;
            let hoisted = self.hoisted_occ(&mut hoister, cd.block, &expr, def)?;
            let hoisted_def = self.hoisted_def(hoisted);
            let new_class = self.occ(hoisted_def).class_id;
            let old_class = self.occ(real_id).class_id;
            if new_class == old_class {
                continue;
            }
            let start = self
                .all_occs
                .iter()
                .position(|&occ| occ == real_id)
                .ok_or_else(|| malformed_error!("{} missing from the occurrence list", real_id))?;
            for pos in start..self.all_occs.len() {
                let occ = self.all_occs[pos];
                if pos != start && (self.occ(occ).block != block || self.occ(occ).class_id != old_class) {
                    break;
                }
                let relabeled = self.occ_mut(occ);
                relabeled.class_id = new_class;
                relabeled.def = Some(hoisted_def);
                self.hoisted += 1;
            }
        }

        for &block in &worklist {
            let Some(opnd_id) = hoister.summaries[block]
                .occ
                .filter(|&occ| self.occ(occ).kind.tag() == OccTag::PhiOpnd)
            else {
                continue;
            };
            let Some(cd) = self.ready_cd(&hoister, block) else {
                continue;
            };
            let Some(expr) = self.opnd(opnd_id)?.current_expr.clone() else {
                continue;
            };
            if let Some(existing) = hoister.summaries[cd.block].hoisted {
                if self.occ(existing).is_real() && self.real(existing)?.operands != expr {
                    continue;
                }
            }

            let hoisted = self.hoisted_occ(&mut hoister, cd.block, &expr, None)?;
            let hoisted_def = self.hoisted_def(hoisted);
            let class = self.occ(hoisted_def).class_id;
            let opnd = self.occ_mut(opnd_id);
            opnd.def = Some(hoisted_def);
            opnd.class_id = class;
            self.set_opnd_flag(opnd_id, OpndFlags::HAS_REAL_USE, true)?;
            self.hoisted += 1;
        }

        // Operands skipped above may still carry the class of a relabeled def.
        for &id in &self.all_occs.clone() {
            if self.occ(id).kind.tag() != OccTag::PhiOpnd {
                continue;
            }
            if let Some(def) = self.occ(id).def {
                let class = self.occ(def).class_id;
                self.occ_mut(id).class_id = class;
            }
        }
        Ok(())
    }

    /// Control-dependence information of every block.
    fn hoist_summaries(&self) -> Vec<HoistSummary> {
        let analysis = self.analysis;
        (0..analysis.block_count())
            .map(|block| {
                let succs = analysis.successor_count(block);
                let succ_mask = if succs >= 32 { u32::MAX } else { (1u32 << succs) - 1 };
                HoistSummary {
                    cd: self.control_dependence(block),
                    succ_mask,
                    ..HoistSummary::default()
                }
            })
            .collect()
    }

    fn control_dependence(&self, block: usize) -> Option<ControlDep> {
        let analysis = self.analysis;
        if !analysis.is_reachable(block) || analysis.post_dominance_frontier_len(block) != 1 {
            return None;
        }
        let cd = analysis.post_dominance_frontier(block).next()?;
        if !analysis.dominates(cd, block) || analysis.successor_count(cd) >= self.config.max_hoist_successors {
            return None;
        }
        let which_succ = analysis
            .successors(cd)
            .iter()
            .position(|&succ| analysis.post_dominates(block, succ))?;
        Some(ControlDep { block: cd, which_succ })
    }

    /// The control-dependence point of `block`, once all its successors
    /// reach the candidate.
    fn ready_cd(&self, hoister: &Hoister, block: usize) -> Option<ControlDep> {
        hoister.summaries[block]
            .cd
            .filter(|cd| hoister.summaries[cd.block].fully_anticipated())
    }

    /// Returns `true` if every operand of `expr` is defined at the end of
    /// `cd`.
    fn available_at(&self, cd: usize, expr: &[SsaVarId]) -> Result<bool> {
        for &var in expr {
            let variable = self
                .ssa
                .variable(var)
                .ok_or_else(|| malformed_error!("operand {} has no definition", var))?;
            let available = match variable.def_site() {
                DefSite::Entry => true,
                DefSite::Phi(block) | DefSite::Instruction { block, .. } => self.analysis.dominates(block, cd),
            };
            if !available {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn def_allows_hoist(&self, cd: usize, def: Option<OccId>) -> bool {
        match def {
            Some(def) if self.occ(def).is_phi() => self.analysis.dominates(self.occ(def).block, cd),
            _ => true,
        }
    }

    /// Records that successor `which_succ` of the control-dependence point
    /// reaches the candidate, climbing further up while points become fully
    /// anticipated.
    fn update_succ_count(
        &self,
        hoister: &mut Hoister,
        mut cd: ControlDep,
        expr: &[SsaVarId],
        occ: Option<OccId>,
    ) -> Result<()> {
        loop {
            let hs = &mut hoister.summaries[cd.block];
            hs.activate();
            if hs.occ.is_none() && occ.is_some() {
                hs.occ = occ;
            }
            let bit = 1u32.checked_shl(cd.which_succ as u32).unwrap_or(0);
            if hs.succ_left & bit == 0 {
                return Ok(());
            }
            hs.succ_left &= !bit;
            if hs.succ_left != 0 {
                return Ok(());
            }
            let Some(next) = hs.cd else {
                return Ok(());
            };
            let reached = occ.is_some() || hoister.summaries[next.block].occ.is_some();
            if !reached || !self.available_at(next.block, expr)? || !self.def_allows_hoist(next.block, occ) {
                return Ok(());
            }
            cd = next;
        }
    }

    /// The occurrence standing for the candidate at the end of `block`,
    /// creating one if needed.
    fn hoisted_occ(
        &mut self,
        hoister: &mut Hoister,
        block: usize,
        expr: &[SsaVarId],
        def: Option<OccId>,
    ) -> Result<OccId> {
        if let Some(hoisted) = hoister.summaries[block].hoisted {
            return Ok(hoisted);
        }

        let climb = match hoister.summaries[block].cd {
            Some(cd) => {
                let parent = &hoister.summaries[cd.block];
                let same_expr = match parent.occ {
                    None => true,
                    Some(occ) => self.occ_expr(occ) == Some(expr),
                };
                (parent.fully_anticipated() && same_expr && self.def_allows_hoist(cd.block, def)).then_some(cd)
            }
            None => None,
        };

        let hoisted = if let Some(cd) = climb {
            self.hoisted_occ(hoister, cd.block, expr, def)?
        } else {
            let reusable = match def {
                Some(d) if self.analysis.dominates(self.occ(d).block, block) => match self.occ(d).kind.tag() {
                    OccTag::Real => true,
                    OccTag::Phi => self.will_be_avail(d)?,
                    _ => false,
                },
                _ => false,
            };
            if let (true, Some(d)) = (reusable, def) {
                d
            } else {
                self.create_hoisted_real(block, expr, def)
            }
        };
        hoister.summaries[block].hoisted = Some(hoisted);
        Ok(hoisted)
    }

    fn create_hoisted_real(&mut self, block: usize, expr: &[SsaVarId], def: Option<OccId>) -> OccId {
        let dfn = self.analysis.dfn(block);
        let mut occ = Occurrence::new(
            OccKind::Real(RealOcc {
                instruction: None,
                operands: expr.to_vec(),
                dest: None,
                role: RealRole::Plain,
                hoisted: true,
            }),
            block,
            dfn,
            usize::MAX,
        );
        match def.filter(|&d| self.occ(d).is_phi() && self.analysis.dominates(self.occ(d).block, block)) {
            Some(phi) => {
                occ.class_id = self.occ(phi).class_id;
                occ.def = Some(phi);
            }
            None => occ.class_id = self.next_class(),
        }
        let id = self.new_occ(occ);

        // Before the first occurrence in a block strictly dominated by the
        // hoisting point.
        let position = self.all_occs.iter().position(|&other| {
            let other_block = self.occ(other).block;
            self.occ(other).dfn >= dfn
                && !self.analysis.dominates(other_block, block)
                && self.analysis.dominates(block, other_block)
        });
        match position {
            Some(pos) => self.all_occs.insert(pos, id),
            None => self.all_occs.push(id),
        }
        self.real_occs.push(id);
        id
    }

    fn hoisted_def(&self, hoisted: OccId) -> OccId {
        match self.occ(hoisted).def {
            Some(def) if self.occ(hoisted).is_real() => def,
            _ => hoisted,
        }
    }

    fn occ_expr(&self, id: OccId) -> Option<&[SsaVarId]> {
        match &self.occ(id).kind {
            OccKind::Real(real) => Some(&real.operands),
            OccKind::PhiOpnd(opnd) => opnd.current_expr.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        analysis::{SsaFunction, SsaFunctionBuilder},
        compiler::{
            config::PreConfig,
            passes::ssapre::{analysis::FunctionAnalysis, candidate::Worklist, engine::CandidateEngine},
        },
    };

    /// 0 -> {1, 2} -> 3; both arms compute a + b, B3 does not.
    fn both_arms() -> SsaFunction {
        SsaFunctionBuilder::new(3, 0).build_with(|f| {
            let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |blk| blk.branch(c, 1, 2));
            f.block(1, |blk| {
                let x = blk.add(a, b);
                blk.ret_val(x);
            });
            f.block(2, |blk| {
                let y = blk.add(a, b);
                blk.ret_val(y);
            });
        })
    }

    fn hoisted(ssa: &SsaFunction) -> (usize, usize, Vec<u32>) {
        let analysis = FunctionAnalysis::new(ssa);
        let config = PreConfig::default();
        let worklist = Worklist::build(ssa, &analysis, &config).unwrap();
        let mut engine =
            CandidateEngine::new(ssa, &analysis, &config, None, &worklist, &worklist.candidates[0], false);
        assert!(engine.build_occurrences().unwrap());
        engine.rename1().unwrap();
        engine.rename2().unwrap();
        engine.compute_classical_avail().unwrap();
        engine.hoist().unwrap();
        let classes = engine
            .real_occs
            .iter()
            .filter(|&&id| !engine.occ(id).as_real().unwrap().hoisted)
            .map(|&id| engine.occ(id).class_id)
            .collect();
        let created = engine
            .real_occs
            .iter()
            .filter(|&&id| engine.occ(id).as_real().unwrap().hoisted)
            .count();
        (engine.hoisted, created, classes)
    }

    #[test]
    fn test_both_arms_hoist_into_branch_block() {
        let (count, created, classes) = hoisted(&both_arms());
        assert_eq!(created, 1);
        assert_eq!(count, 2);
        assert_eq!(classes[0], classes[1]);
    }

    #[test]
    fn test_single_arm_is_not_hoisted() {
        let ssa = SsaFunctionBuilder::new(3, 0).build_with(|f| {
            let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |blk| blk.branch(c, 1, 2));
            f.block(1, |blk| {
                let x = blk.add(a, b);
                blk.ret_val(x);
            });
            f.block(2, |blk| blk.ret());
        });
        let (count, created, _) = hoisted(&ssa);
        assert_eq!(count, 0);
        assert_eq!(created, 0);
    }

    #[test]
    fn test_arm_local_operand_is_not_hoisted() {
        let ssa = SsaFunctionBuilder::new(3, 0).build_with(|f| {
            let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |blk| blk.branch(c, 1, 2));
            f.block(1, |blk| {
                let d = blk.neg(a);
                let x = blk.add(d, b);
                blk.ret_val(x);
            });
            f.block(2, |blk| {
                let y = blk.add(a, b);
                blk.ret_val(y);
            });
        });
        let analysis = FunctionAnalysis::new(&ssa);
        let config = PreConfig::default();
        let worklist = Worklist::build(&ssa, &analysis, &config).unwrap();
        let candidate = worklist
            .candidates
            .iter()
            .find(|c| c.key.to_string().starts_with("add") && c.reals.len() == 1 && c.reals[0].block == 1)
            .unwrap();
        let mut engine = CandidateEngine::new(&ssa, &analysis, &config, None, &worklist, candidate, false);
        assert!(engine.build_occurrences().unwrap());
        engine.rename1().unwrap();
        engine.rename2().unwrap();
        engine.compute_classical_avail().unwrap();
        engine.hoist().unwrap();
        assert_eq!(engine.hoisted, 0);
    }
}
