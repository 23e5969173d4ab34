//! Phi insertion and the sorted occurrence list.
//!
//! Phi occurrences of a candidate go to the iterated dominance frontier of
//! its real occurrences, plus every block holding a variable phi that one of
//! the operands reaches through other variable phis. The latter catch merges
//! where the operands change version while no computation sits below.

use crate::{
    analysis::{DefSite, SsaVarId},
    compiler::passes::ssapre::{
        engine::CandidateEngine,
        occurrence::{OccId, OccKind, Occurrence, OpndFlags, PhiFlags, PhiOcc, PhiOpndOcc, RealOcc, RealRole},
    },
    utils::BitSet,
    Result,
};

const ENTRY_BLOCK: usize = 0;

impl CandidateEngine<'_> {
    /// Creates every occurrence of the candidate and sorts them into
    /// renaming order.
    ///
    /// Returns `false` if the candidate has no real occurrence.
    pub(super) fn build_occurrences(&mut self) -> Result<bool> {
        let candidate = self.candidate;
        let analysis = self.analysis;

        for site in &candidate.reals {
            let occ = Occurrence::new(
                OccKind::Real(RealOcc {
                    instruction: Some(site.instruction),
                    operands: site.operands.clone(),
                    dest: site.dest,
                    role: RealRole::Plain,
                    hoisted: false,
                }),
                site.block,
                analysis.dfn(site.block),
                site.instruction,
            );
            let id = self.new_occ(occ);
            self.real_occs.push(id);
        }
        if self.real_occs.is_empty() {
            return Ok(false);
        }

        let mut phi_blocks = analysis.iterated_frontier(candidate.reals.iter().map(|site| site.block));
        phi_blocks.union_with(&self.var_phi_blocks()?);

        // The entry also merges the function's own entry edge, along which
        // nothing is available, so it never gets a phi occurrence.
        let mut ordered: Vec<usize> = phi_blocks
            .iter()
            .filter(|&block| block != ENTRY_BLOCK && analysis.is_reachable(block))
            .collect();
        ordered.sort_by_key(|&block| analysis.dfn(block));

        let mut opnd_seq = 0;
        let mut opnd_ids = Vec::new();
        for block in ordered {
            let phi = self.new_occ(Occurrence::new(
                OccKind::Phi(PhiOcc {
                    operands: Vec::new(),
                    flags: PhiFlags::INITIAL,
                }),
                block,
                analysis.dfn(block),
                0,
            ));
            let mut operands = Vec::new();
            for (position, &pred) in analysis.predecessors(block).iter().enumerate() {
                let opnd = self.new_occ(Occurrence::new(
                    OccKind::PhiOpnd(PhiOpndOcc {
                        phi,
                        position,
                        flags: OpndFlags::empty(),
                        current_expr: None,
                    }),
                    pred,
                    analysis.dfn(pred),
                    opnd_seq,
                ));
                opnd_seq += 1;
                operands.push(opnd);
            }
            opnd_ids.extend_from_slice(&operands);
            self.phi_mut(phi)?.operands = operands;
            self.phi_occs.push(phi);
        }

        let mut others = Vec::new();
        for exit in analysis.exits() {
            others.push(Occurrence::new(OccKind::Exit, exit, analysis.dfn(exit), 0));
        }
        if !candidate.is_expression() {
            for &(block, instruction) in &self.worklist.calls {
                others.push(Occurrence::new(
                    OccKind::Use { instruction },
                    block,
                    analysis.dfn(block),
                    instruction,
                ));
            }
        }
        for &(block, instruction) in &self.worklist.barriers {
            others.push(Occurrence::new(
                OccKind::Membar { instruction },
                block,
                analysis.dfn(block),
                instruction,
            ));
        }
        let other_ids: Vec<OccId> = others.into_iter().map(|occ| self.new_occ(occ)).collect();

        for &(block, instruction) in &candidate.compares {
            let id = self.new_occ(Occurrence::new(
                OccKind::Compare { instruction },
                block,
                analysis.dfn(block),
                instruction,
            ));
            self.compare_occs.push(id);
        }

        let mut all = Vec::with_capacity(self.occs.len());
        all.extend_from_slice(&self.real_occs);
        all.extend_from_slice(&self.phi_occs);
        all.extend(opnd_ids);
        all.extend(other_ids);
        all.sort_by_key(|&id| self.occ(id).sort_key());
        self.all_occs = all;
        Ok(true)
    }

    /// Blocks of the variable phis reachable from the operands of the real
    /// occurrences through phi operands.
    fn var_phi_blocks(&self) -> Result<BitSet> {
        let mut blocks = BitSet::new(self.analysis.block_count());
        let mut pending: Vec<SsaVarId> = self
            .candidate
            .reals
            .iter()
            .flat_map(|site| site.operands.iter().copied())
            .collect();

        while let Some(var) = pending.pop() {
            let variable = self
                .ssa
                .variable(var)
                .ok_or_else(|| malformed_error!("operand {} has no definition", var))?;
            let DefSite::Phi(block) = variable.def_site() else {
                continue;
            };
            if blocks.contains(block) || !self.analysis.is_reachable(block) {
                continue;
            }
            blocks.insert(block);
            let phi = self
                .ssa
                .block(block)
                .and_then(|b| b.find_phi_defining(var))
                .ok_or_else(|| malformed_error!("{} claims a phi definition in B{}", var, block))?;
            pending.extend(phi.used_variables());
        }
        Ok(blocks)
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
                occurrence::{OccKind, OccTag},
            },
        },
    };

    fn diamond() -> SsaFunction {
        // 0 -> {1, 2} -> 3, a + b in B1 and B3
        SsaFunctionBuilder::new(3, 0).build_with(|f| {
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
        })
    }

    #[test]
    fn test_phi_at_merge_with_operands_in_preds() {
        let ssa = diamond();
        let analysis = FunctionAnalysis::new(&ssa);
        let config = PreConfig::default();
        let worklist = Worklist::build(&ssa, &analysis, &config).unwrap();
        let candidate = &worklist.candidates[0];
        let mut engine = CandidateEngine::new(&ssa, &analysis, &config, None, &worklist, candidate, false);

        assert!(engine.build_occurrences().unwrap());
        assert_eq!(engine.real_occs.len(), 2);
        assert_eq!(engine.phi_occs.len(), 1);

        let phi = engine.phi_occs[0];
        assert_eq!(engine.occ(phi).block, 3);
        let operands = engine.phi_operands(phi).unwrap();
        let blocks: Vec<usize> = operands.iter().map(|&id| engine.occ(id).block).collect();
        assert_eq!(blocks, vec![1, 2]);

        let tags: Vec<OccTag> = engine
            .all_occs
            .iter()
            .map(|&id| engine.occ(id).kind.tag())
            .collect();
        // B0, B1 (real, opnd), B2 (opnd), B3 (phi, real, exit)
        assert_eq!(
            tags,
            vec![
                OccTag::Real,
                OccTag::PhiOpnd,
                OccTag::PhiOpnd,
                OccTag::Phi,
                OccTag::Real,
                OccTag::Exit
            ]
        );
    }

    #[test]
    fn test_variable_phi_places_occurrence_phi() {
        // x changes version at the merge, only B3 computes x + a.
        let ssa = SsaFunctionBuilder::new(2, 1).build_with(|f| {
            let (a, c) = (f.arg(0), f.arg(1));
            let x0 = f.local(0);
            let x1 = f.local_version(0);
            let x2 = f.local_version(0);
            f.block(0, |blk| blk.branch(c, 1, 2));
            f.block(1, |blk| {
                blk.copy_into(x1, a);
                blk.jump(3);
            });
            f.block(2, |blk| blk.jump(3));
            f.block(3, |blk| {
                blk.phi_into(x2, &[(1, x1), (2, x0)]);
                let sum = blk.add(x2, a);
                blk.ret_val(sum);
            });
        });
        let analysis = FunctionAnalysis::new(&ssa);
        let config = PreConfig::default();
        let worklist = Worklist::build(&ssa, &analysis, &config).unwrap();
        let candidate = worklist
            .candidates
            .iter()
            .find(|c| c.key.to_string().starts_with("add"))
            .unwrap();
        let mut engine = CandidateEngine::new(&ssa, &analysis, &config, None, &worklist, candidate, false);
        assert!(engine.build_occurrences().unwrap());
        assert_eq!(engine.phi_occs.len(), 1);
        assert!(matches!(engine.occ(engine.phi_occs[0]).kind, OccKind::Phi(_)));
        assert_eq!(engine.occ(engine.phi_occs[0]).block, 3);
    }

    #[test]
    fn test_statement_candidates_see_calls() {
        let ssa = SsaFunctionBuilder::new(1, 0).build_with(|f| {
            let a = f.arg(0);
            f.block(0, |blk| {
                blk.check_null(a);
                blk.call_void(7, &[]);
                blk.check_null(a);
                blk.ret();
            });
        });
        let analysis = FunctionAnalysis::new(&ssa);
        let config = PreConfig::default();
        let worklist = Worklist::build(&ssa, &analysis, &config).unwrap();
        let mut engine =
            CandidateEngine::new(&ssa, &analysis, &config, None, &worklist, &worklist.candidates[0], false);
        assert!(engine.build_occurrences().unwrap());
        let tags: Vec<OccTag> = engine
            .all_occs
            .iter()
            .map(|&id| engine.occ(id).kind.tag())
            .collect();
        assert_eq!(tags, vec![OccTag::Real, OccTag::Use, OccTag::Real, OccTag::Exit]);
    }

    fn engine_test(ssa: &SsaFunction, check: impl FnOnce(&mut CandidateEngine<'_>)) {
        let analysis = FunctionAnalysis::new(ssa);
        let config = PreConfig::default();
        let worklist = Worklist::build(ssa, &analysis, &config).unwrap();
        let mut engine =
            CandidateEngine::new(ssa, &analysis, &config, None, &worklist, &worklist.candidates[0], false);
        assert!(engine.build_occurrences().unwrap());
        check(&mut engine);
    }

    #[test]
    fn test_unreachable_predecessor_gets_no_operand() {
        // 0 -> {2, 3} -> 4 and the dead block 1 -> 4; B2 and B4 compute a + b.
        let ssa = SsaFunctionBuilder::new(3, 0).build_with(|f| {
            let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |blk| blk.branch(c, 2, 3));
            f.block(1, |blk| blk.jump(4));
            f.block(2, |blk| {
                let _ = blk.add(a, b);
                blk.jump(4);
            });
            f.block(3, |blk| blk.jump(4));
            f.block(4, |blk| {
                let sum = blk.add(a, b);
                blk.ret_val(sum);
            });
        });
        engine_test(&ssa, |engine| {
            assert_eq!(engine.phi_occs.len(), 1);
            let phi = engine.phi_occs[0];
            assert_eq!(engine.occ(phi).block, 4);
            let blocks: Vec<usize> = engine
                .phi_operands(phi)
                .unwrap()
                .iter()
                .map(|&id| engine.occ(id).block)
                .collect();
            assert_eq!(blocks, vec![2, 3]);
        });
    }

    #[test]
    fn test_entry_with_back_edge_gets_no_phi() {
        // 0 -> {0, 1}; both blocks compute a + b.
        let ssa = SsaFunctionBuilder::new(3, 0).build_with(|f| {
            let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |blk| {
                let _ = blk.add(a, b);
                blk.branch(c, 0, 1);
            });
            f.block(1, |blk| {
                let sum = blk.add(a, b);
                blk.ret_val(sum);
            });
        });
        engine_test(&ssa, |engine| {
            assert_eq!(engine.real_occs.len(), 2);
            assert!(engine.phi_occs.is_empty());
        });
    }
}
