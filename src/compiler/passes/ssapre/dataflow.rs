//! Availability dataflow over phi occurrences.
//!
//! Two rule sets decide where the candidate will be available:
//!
//! - the classical rules propagate non-down-safety up and
//!   non-availability down the occurrence graph, then push insertions as
//!   late as possible;
//! - the speculative rules compute full availability and partial
//!   anticipation here and let the min cut in [`super::mincut`] decide the
//!   rest.
//!
//! All propagation uses explicit worklists. A fact is only ever cleared
//! once, so each worklist terminates.

use crate::{
    compiler::passes::ssapre::{
        engine::CandidateEngine,
        occurrence::{OccId, OpndFlags, PhiFlags},
    },
    Result,
};

impl CandidateEngine<'_> {
    /// Clears down-safety of phis whose value reaches a non-down-safe phi
    /// without passing through a real occurrence.
    pub(super) fn compute_down_safety(&mut self) -> Result<()> {
        let phis = self.phi_occs.clone();
        for phi in phis {
            if self.phi_has(phi, PhiFlags::DOWN_SAFE)? {
                continue;
            }
            let mut pending = self.phi_operands(phi)?;
            while let Some(opnd) = pending.pop() {
                if self.opnd_has(opnd, OpndFlags::HAS_REAL_USE)? {
                    continue;
                }
                let Some(def) = self.occ(opnd).def.filter(|&def| self.occ(def).is_phi()) else {
                    continue;
                };
                let flags = self.phi(def)?.flags;
                if flags.contains(PhiFlags::SPECULATIVE_DOWN_SAFE) || !flags.contains(PhiFlags::DOWN_SAFE) {
                    continue;
                }
                self.set_phi_flag(def, PhiFlags::DOWN_SAFE, false)?;
                pending.extend(self.phi_operands(def)?);
            }
        }
        Ok(())
    }

    /// Clears can-be-available of phis that would need an insertion while
    /// not being down-safe, and of everything that depends on them.
    pub(super) fn compute_can_be_avail(&mut self) -> Result<()> {
        let phis = self.phi_occs.clone();
        for phi in phis {
            let flags = self.phi(phi)?.flags;
            if !flags.contains(PhiFlags::DOWN_SAFE)
                && flags.contains(PhiFlags::CAN_BE_AVAIL)
                && self.has_undefined_operand(phi)?
            {
                self.reset_can_be_avail(phi)?;
            }

            if self.redo_critical_edges && self.phi_has(phi, PhiFlags::CAN_BE_AVAIL)? {
                let block = self.occ(phi).block;
                let critical = self
                    .analysis
                    .predecessors(block)
                    .iter()
                    .any(|&pred| self.analysis.successor_count(pred) > 1);
                if critical {
                    self.reset_can_be_avail(phi)?;
                }
            }
        }
        Ok(())
    }

    fn reset_can_be_avail(&mut self, start: OccId) -> Result<()> {
        let mut pending = vec![start];
        while let Some(g) = pending.pop() {
            self.set_phi_flag(g, PhiFlags::CAN_BE_AVAIL, false)?;
            for &phi in &self.phi_occs {
                for opnd in self.phi_operands(phi)? {
                    if self.occ(opnd).def != Some(g) || self.opnd_has(opnd, OpndFlags::HAS_REAL_USE)? {
                        continue;
                    }
                    let flags = self.phi(phi)?.flags;
                    if !flags.contains(PhiFlags::DOWN_SAFE) && flags.contains(PhiFlags::CAN_BE_AVAIL) {
                        pending.push(phi);
                    }
                }
            }
        }
        Ok(())
    }

    /// Marks as later the available phis whose insertions can be delayed
    /// because no real occurrence needs their value yet.
    pub(super) fn compute_later(&mut self) -> Result<()> {
        let phis = self.phi_occs.clone();
        for &phi in &phis {
            let can_be_avail = self.phi_has(phi, PhiFlags::CAN_BE_AVAIL)?;
            self.set_phi_flag(phi, PhiFlags::LATER, can_be_avail)?;
        }

        for &phi in &phis {
            if !self.phi_has(phi, PhiFlags::LATER)? {
                continue;
            }
            let mut real_use = false;
            for opnd in self.phi_operands(phi)? {
                if self.occ(opnd).def.is_some() && self.opnd_has(opnd, OpndFlags::HAS_REAL_USE)? {
                    real_use = true;
                    break;
                }
            }
            if real_use || self.phi_has(phi, PhiFlags::SPECULATIVE_DOWN_SAFE)? {
                self.reset_later(phi)?;
            }
        }
        Ok(())
    }

    fn reset_later(&mut self, start: OccId) -> Result<()> {
        let mut pending = vec![start];
        while let Some(g) = pending.pop() {
            self.set_phi_flag(g, PhiFlags::LATER, false)?;
            for &phi in &self.phi_occs {
                if !self.phi_has(phi, PhiFlags::LATER)? {
                    continue;
                }
                let uses_g = self
                    .phi(phi)?
                    .operands
                    .iter()
                    .any(|&opnd| self.occ(opnd).def == Some(g));
                if uses_g {
                    pending.push(phi);
                }
            }
        }
        Ok(())
    }

    /// Clears full availability of phis reached by an undefined operand.
    pub(super) fn compute_full_avail(&mut self) -> Result<()> {
        let phis = self.phi_occs.clone();
        for phi in phis {
            if self.has_undefined_operand(phi)? {
                self.reset_full_avail(phi)?;
            }
        }
        Ok(())
    }

    fn reset_full_avail(&mut self, start: OccId) -> Result<()> {
        let mut pending = vec![start];
        while let Some(occ) = pending.pop() {
            if !self.phi_has(occ, PhiFlags::FULLY_AVAIL)? {
                continue;
            }
            self.set_phi_flag(occ, PhiFlags::FULLY_AVAIL, false)?;
            for &phi in &self.phi_occs {
                if !self.phi_has(phi, PhiFlags::FULLY_AVAIL)? {
                    continue;
                }
                for &opnd in &self.phi(phi)?.operands {
                    if self.occ(opnd).def == Some(occ) && !self.opnd_has(opnd, OpndFlags::HAS_REAL_USE)? {
                        pending.push(phi);
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Propagates partial anticipation from phis defining real occurrences
    /// to the phis feeding them.
    pub(super) fn compute_partial_ant(&mut self) -> Result<()> {
        let phis = self.phi_occs.clone();
        for phi in phis {
            if !self.phi_has(phi, PhiFlags::PARTIAL_ANT)? {
                continue;
            }
            let mut pending = self.phi_operands(phi)?;
            while let Some(opnd) = pending.pop() {
                let Some(def) = self.occ(opnd).def.filter(|&def| self.occ(def).is_phi()) else {
                    continue;
                };
                if self.phi_has(def, PhiFlags::PARTIAL_ANT)? {
                    continue;
                }
                self.set_phi_flag(def, PhiFlags::PARTIAL_ANT, true)?;
                pending.extend(self.phi_operands(def)?);
            }
        }
        Ok(())
    }

    pub(super) fn has_undefined_operand(&self, phi: OccId) -> Result<bool> {
        Ok(self
            .phi(phi)?
            .operands
            .iter()
            .any(|&opnd| self.occ(opnd).def.is_none()))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        analysis::{SsaFunction, SsaFunctionBuilder},
        compiler::{
            config::PreConfig,
            passes::ssapre::{
                analysis::FunctionAnalysis, candidate::Worklist, engine::CandidateEngine,
                occurrence::PhiFlags,
            },
        },
    };

    fn analyzed(ssa: &SsaFunction, check: impl FnOnce(&mut CandidateEngine<'_>)) {
        let analysis = FunctionAnalysis::new(ssa);
        let config = PreConfig::classical();
        let worklist = Worklist::build(ssa, &analysis, &config).unwrap();
        let mut engine =
            CandidateEngine::new(ssa, &analysis, &config, None, &worklist, &worklist.candidates[0], false);
        assert!(engine.build_occurrences().unwrap());
        engine.rename1().unwrap();
        engine.rename2().unwrap();
        check(&mut engine);
    }

    /// 0 -> {1, 2} -> 3. B1 computes a + b and so does B3; B2 does when
    /// `both` is set.
    fn diamond(both: bool) -> SsaFunction {
        SsaFunctionBuilder::new(3, 0).build_with(|f| {
            let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |blk| blk.branch(c, 1, 2));
            f.block(1, |blk| {
                let _ = blk.add(a, b);
                blk.jump(3);
            });
            f.block(2, |blk| {
                if both {
                    let _ = blk.add(a, b);
                }
                blk.jump(3);
            });
            f.block(3, |blk| {
                let sum = blk.add(a, b);
                blk.ret_val(sum);
            });
        })
    }

    #[test]
    fn test_partial_redundancy_is_available_and_not_later() {
        analyzed(&diamond(false), |engine| {
            engine.compute_classical_avail().unwrap();
            let phi = engine.phi_occs[0];
            assert!(engine.phi_has(phi, PhiFlags::DOWN_SAFE).unwrap());
            assert!(engine.phi_has(phi, PhiFlags::CAN_BE_AVAIL).unwrap());
            assert!(!engine.phi_has(phi, PhiFlags::LATER).unwrap());
            assert!(engine.will_be_avail(phi).unwrap());
        });
    }

    #[test]
    fn test_full_availability() {
        analyzed(&diamond(true), |engine| {
            engine.compute_full_avail().unwrap();
            engine.compute_partial_ant().unwrap();
            let phi = engine.phi_occs[0];
            assert!(engine.phi_has(phi, PhiFlags::FULLY_AVAIL).unwrap());
            assert!(engine.phi_has(phi, PhiFlags::PARTIAL_ANT).unwrap());
        });
        analyzed(&diamond(false), |engine| {
            engine.compute_full_avail().unwrap();
            assert!(!engine.phi_has(engine.phi_occs[0], PhiFlags::FULLY_AVAIL).unwrap());
        });
    }

    #[test]
    fn test_not_down_safe_phi_cannot_be_avail() {
        // The merge block does not compute a + b.
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
        analyzed(&ssa, |engine| {
            engine.compute_classical_avail().unwrap();
            let phi = engine.phi_occs[0];
            assert!(!engine.phi_has(phi, PhiFlags::DOWN_SAFE).unwrap());
            assert!(!engine.phi_has(phi, PhiFlags::CAN_BE_AVAIL).unwrap());
            assert!(!engine.will_be_avail(phi).unwrap());
        });
    }

    #[test]
    fn test_critical_edge_redo_excludes_phi() {
        analyzed(&diamond(false), |engine| {
            engine.redo_critical_edges = true;
            engine.compute_classical_avail().unwrap();
            // Preds of B3 have one successor each, so nothing changes.
            assert!(engine.will_be_avail(engine.phi_occs[0]).unwrap());
        });
    }
}
