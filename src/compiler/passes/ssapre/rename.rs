//! Renaming: assigning equivalence classes to occurrences.
//!
//! The first pass walks the sorted occurrence list with a stack, the
//! candidate's analogue of SSA renaming for variables. Occurrences that
//! compute the same value share a class and point at the occurrence that
//! defines it.
//!
//! A real occurrence defined by a phi only knows that its operands are not
//! redefined between the two. The second pass checks, per incoming edge,
//! whether the value flowing into the phi is really the same computation.

use crate::{
    compiler::passes::ssapre::{
        engine::CandidateEngine,
        occurrence::{OccId, OccKind, OccTag, Occurrence, OpndFlags, PhiFlags, RealOcc, RealRole},
    },
    Result,
};

impl CandidateEngine<'_> {
    /// Stack-based renaming over the sorted occurrence list.
    pub(super) fn rename1(&mut self) -> Result<()> {
        self.class_count = 1;
        self.rename2_set.clear();
        let mut stack: Vec<OccId> = Vec::new();

        for pos in 0..self.all_occs.len() {
            let id = self.all_occs[pos];
            while let Some(&top) = stack.last() {
                if self.occ_dominates(top, id) {
                    break;
                }
                stack.pop();
            }

            match self.occ(id).kind.tag() {
                OccTag::Real => self.rename_real(id, &mut stack)?,
                OccTag::Phi => {
                    let class = self.next_class();
                    self.occ_mut(id).class_id = class;
                    stack.push(id);
                }
                OccTag::PhiOpnd => self.rename_phi_opnd(id, &mut stack)?,
                OccTag::Exit => {
                    if let Some(&top) = stack.last() {
                        if self.occ(top).is_phi() {
                            self.clear_down_safe(top)?;
                        }
                    }
                }
                tag @ (OccTag::Use | OccTag::Membar) => match stack.last() {
                    None => stack.push(id),
                    Some(&top) => {
                        let top_tag = self.occ(top).kind.tag();
                        if top_tag == OccTag::Phi {
                            self.set_phi_flag(top, PhiFlags::DOWN_SAFE, false)?;
                        } else if top_tag != tag {
                            stack.push(id);
                        }
                    }
                },
                OccTag::Inserted | OccTag::Compare => {
                    return Err(malformed_error!(
                        "{} occurrence {} in renaming order",
                        self.occ(id).kind.name(),
                        id
                    ));
                }
            }
        }
        Ok(())
    }

    fn rename_real(&mut self, id: OccId, stack: &mut Vec<OccId>) -> Result<()> {
        let Some(&top) = stack.last() else {
            let class = self.next_class();
            self.occ_mut(id).class_id = class;
            stack.push(id);
            return Ok(());
        };

        match self.occ(top).kind.tag() {
            OccTag::Use | OccTag::Membar => {
                let class = self.next_class();
                self.occ_mut(id).class_id = class;
                stack.push(id);
            }
            OccTag::Real => {
                if self.real(top)?.operands == self.real(id)?.operands {
                    let (class, def) = {
                        let top_occ = self.occ(top);
                        (top_occ.class_id, top_occ.def.unwrap_or(top))
                    };
                    let occ = self.occ_mut(id);
                    occ.class_id = class;
                    occ.def = Some(def);
                } else {
                    let class = self.next_class();
                    self.occ_mut(id).class_id = class;
                    stack.push(id);
                }
            }
            OccTag::Phi => {
                let phi_block = self.occ(top).block;
                let mut all_dominate = true;
                for &var in &self.real(id)?.operands {
                    if !self.def_var_dominates(var, phi_block)? {
                        all_dominate = false;
                    }
                }

                if all_dominate {
                    let class = self.occ(top).class_id;
                    let occ = self.occ_mut(id);
                    occ.class_id = class;
                    occ.def = Some(top);
                    self.rename2_set.insert(id);
                    stack.push(id);
                    self.set_phi_flag(top, PhiFlags::PARTIAL_ANT, true)?;
                    if self.candidate.is_expression()
                        && self.config.speculate_loop_headers
                        && self.analysis.is_loop_header(phi_block)
                    {
                        self.set_phi_flag(
                            top,
                            PhiFlags::SPECULATIVE_DOWN_SAFE | PhiFlags::DOWN_SAFE,
                            true,
                        )?;
                    }
                } else {
                    self.clear_down_safe(top)?;
                    let class = self.next_class();
                    self.occ_mut(id).class_id = class;
                    stack.push(id);
                }
            }
            other => {
                return Err(malformed_error!(
                    "real occurrence {} below a {:?} occurrence on the rename stack",
                    id,
                    other
                ));
            }
        }
        Ok(())
    }

    fn rename_phi_opnd(&mut self, id: OccId, stack: &mut Vec<OccId>) -> Result<()> {
        // Uses only block statement motion; the operand looks past them.
        let mut stowed = None;
        if let Some(&top) = stack.last() {
            if self.occ(top).kind.tag() == OccTag::Use {
                stowed = stack.pop();
                if stack
                    .last()
                    .is_some_and(|&below| self.occ(below).kind.tag() == OccTag::Use)
                {
                    return Err(malformed_error!("two consecutive use occurrences on the rename stack"));
                }
            }
        }

        match stack.last() {
            Some(&top) if self.occ(top).kind.tag() != OccTag::Membar => {
                let (class, is_real) = {
                    let top_occ = self.occ(top);
                    (top_occ.class_id, top_occ.is_real())
                };
                let occ = self.occ_mut(id);
                occ.def = Some(top);
                occ.class_id = class;
                if is_real {
                    self.set_opnd_flag(id, OpndFlags::HAS_REAL_USE, true)?;
                }
            }
            _ => self.occ_mut(id).def = None,
        }

        if let Some(use_occ) = stowed {
            stack.push(use_occ);
        }
        Ok(())
    }

    /// Validates the phi operands of phis that define real occurrences.
    ///
    /// Each such operand learns the candidate's operands as seen at the end
    /// of its predecessor. An operand defined by a real occurrence computing
    /// something else loses its definition; one defined by a phi spawns a
    /// manufactured real occurrence that is checked in turn.
    pub(super) fn rename2(&mut self) -> Result<()> {
        while let Some(real_id) = self.rename2_set.pop_first() {
            let def = self
                .occ(real_id)
                .def
                .filter(|&def| self.occ(def).is_phi())
                .ok_or_else(|| malformed_error!("{} in rename set is not defined by a phi", real_id))?;

            let phi_block = self.occ(def).block;
            let operands = self.real(real_id)?.operands.clone();
            let opnds = self.phi_operands(def)?;

            for (position, opnd_id) in opnds.into_iter().enumerate() {
                if self.opnd_has(opnd_id, OpndFlags::PROCESSED)? {
                    continue;
                }
                self.set_opnd_flag(opnd_id, OpndFlags::PROCESSED, true)?;

                let pred = self
                    .analysis
                    .predecessors(phi_block)
                    .get(position)
                    .copied()
                    .ok_or_else(|| malformed_error!("phi in B{} has no predecessor {}", phi_block, position))?;
                let expr_y = self.translate(&operands, phi_block, pred)?;
                self.opnd_mut(opnd_id)?.current_expr = Some(expr_y.clone());

                let Some(def_x) = self.occ(opnd_id).def else {
                    continue;
                };

                match self.occ(def_x).kind.tag() {
                    OccTag::Real => {
                        if self.real(def_x)?.operands != expr_y {
                            self.occ_mut(opnd_id).def = None;
                            self.set_opnd_flag(opnd_id, OpndFlags::HAS_REAL_USE, false)?;
                        }
                    }
                    OccTag::Phi => {
                        let def_block = self.occ(def_x).block;
                        let mut all_dominate = true;
                        for &var in &expr_y {
                            if !self.def_var_dominates(var, def_block)? {
                                all_dominate = false;
                            }
                        }

                        if all_dominate {
                            let class = self.occ(def_x).class_id;
                            let mut manufactured = Occurrence::new(
                                OccKind::Real(RealOcc {
                                    instruction: None,
                                    operands: expr_y,
                                    dest: None,
                                    role: RealRole::Plain,
                                    hoisted: false,
                                }),
                                def_block,
                                self.analysis.dfn(def_block),
                                0,
                            );
                            manufactured.class_id = class;
                            manufactured.def = Some(def_x);
                            let occ_y = self.new_occ(manufactured);
                            self.real_occs.push(occ_y);
                            self.rename2_set.insert(occ_y);
                            self.set_phi_flag(def_x, PhiFlags::PARTIAL_ANT, true)?;
                        } else {
                            self.occ_mut(opnd_id).def = None;
                            self.set_opnd_flag(opnd_id, OpndFlags::HAS_REAL_USE, false)?;
                            self.clear_down_safe(def_x)?;
                        }
                    }
                    other => {
                        return Err(malformed_error!(
                            "phi operand {} defined by a {:?} occurrence",
                            opnd_id,
                            other
                        ));
                    }
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
                occurrence::{OpndFlags, PhiFlags},
            },
        },
    };

    fn run_rename(ssa: &SsaFunction, check: impl FnOnce(&CandidateEngine<'_>)) {
        let analysis = FunctionAnalysis::new(ssa);
        let config = PreConfig::default();
        let worklist = Worklist::build(ssa, &analysis, &config).unwrap();
        let candidate = worklist
            .candidates
            .iter()
            .find(|c| c.key.to_string().starts_with("add"))
            .unwrap();
        let mut engine = CandidateEngine::new(ssa, &analysis, &config, None, &worklist, candidate, false);
        assert!(engine.build_occurrences().unwrap());
        engine.rename1().unwrap();
        engine.rename2().unwrap();
        check(&engine);
    }

    #[test]
    fn test_same_versions_share_class() {
        let ssa = SsaFunctionBuilder::new(2, 0).build_with(|f| {
            let (a, b) = (f.arg(0), f.arg(1));
            f.block(0, |blk| {
                let _ = blk.add(a, b);
                let _ = blk.add(a, b);
                blk.ret();
            });
        });
        run_rename(&ssa, |engine| {
            let first = engine.real_occs[0];
            let second = engine.real_occs[1];
            assert_eq!(engine.occ(first).class_id, engine.occ(second).class_id);
            assert_eq!(engine.occ(second).def, Some(first));
            assert_eq!(engine.occ(first).def, None);
        });
    }

    #[test]
    fn test_diamond_operands_defined_by_reals() {
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
            f.block(3, |blk| {
                let sum = blk.add(a, b);
                blk.ret_val(sum);
            });
        });
        run_rename(&ssa, |engine| {
            let phi = engine.phi_occs[0];
            let merge_real = engine.real_occs[2];
            assert_eq!(engine.occ(merge_real).def, Some(phi));
            assert!(engine.phi_has(phi, PhiFlags::PARTIAL_ANT).unwrap());
            assert!(engine.phi_has(phi, PhiFlags::DOWN_SAFE).unwrap());
            for opnd in engine.phi_operands(phi).unwrap() {
                assert!(engine.occ(opnd).def.is_some());
                assert!(engine.opnd_has(opnd, OpndFlags::HAS_REAL_USE).unwrap());
                assert!(engine.opnd_has(opnd, OpndFlags::PROCESSED).unwrap());
            }
        });
    }

    #[test]
    fn test_translation_through_variable_phi() {
        // B1 computes x1 + a, B3 computes x2 + a with x2 = phi(x1, x0).
        let ssa = SsaFunctionBuilder::new(2, 1).build_with(|f| {
            let (a, c) = (f.arg(0), f.arg(1));
            let x0 = f.local(0);
            let x1 = f.local_version(0);
            let x2 = f.local_version(0);
            f.block(0, |blk| blk.branch(c, 1, 2));
            f.block(1, |blk| {
                blk.copy_into(x1, c);
                let _ = blk.add(x1, a);
                blk.jump(3);
            });
            f.block(2, |blk| blk.jump(3));
            f.block(3, |blk| {
                blk.phi_into(x2, &[(1, x1), (2, x0)]);
                let sum = blk.add(x2, a);
                blk.ret_val(sum);
            });
        });
        run_rename(&ssa, |engine| {
            let phi = engine.phi_occs[0];
            let opnds = engine.phi_operands(phi).unwrap();
            // Along B1 the translated expression matches the real in B1.
            assert!(engine.occ(opnds[0]).def.is_some());
            assert!(engine.opnd(opnds[0]).unwrap().current_expr.is_some());
            // Along B2 nothing computes x0 + a.
            assert!(engine.occ(opnds[1]).def.is_none());
        });
    }

    #[test]
    fn test_exit_clears_down_safety() {
        let ssa = SsaFunctionBuilder::new(3, 0).build_with(|f| {
            let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |blk| blk.branch(c, 1, 2));
            f.block(1, |blk| {
                let _ = blk.add(a, b);
                blk.jump(3);
            });
            f.block(2, |blk| blk.jump(3));
            f.block(3, |blk| blk.ret());
        });
        run_rename(&ssa, |engine| {
            let phi = engine.phi_occs[0];
            assert!(!engine.phi_has(phi, PhiFlags::DOWN_SAFE).unwrap());
            assert!(!engine.phi_has(phi, PhiFlags::PARTIAL_ANT).unwrap());
        });
    }
}
