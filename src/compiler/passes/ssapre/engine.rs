//! Per-candidate state shared by all phases.
//!
//! A [`CandidateEngine`] owns the occurrence arena of one candidate and the
//! counters threaded through the phases. The phases themselves live in
//! sibling modules as further `impl` blocks on the engine; this module holds
//! the driver sequence and the accessors they share.

use std::collections::BTreeSet;

use crate::{
    analysis::{DefSite, FrequencyProfile, SsaFunction, SsaVarId},
    compiler::{
        config::PreConfig,
        passes::ssapre::{
            analysis::FunctionAnalysis,
            candidate::{Candidate, Worklist},
            codemotion::MotionPlan,
            mincut::FlowSummary,
            occurrence::{OccId, OccKind, Occurrence, OpndFlags, PhiFlags, PhiOcc, PhiOpndOcc, RealOcc},
            CandidateReport, PhiReport,
        },
    },
    Error, Result,
};

/// Result of running one candidate through the pipeline.
#[derive(Debug)]
pub(crate) struct CandidateOutcome {
    pub plan: MotionPlan,
    pub report: CandidateReport,
}

/// Occurrence graph and phase state of one candidate.
pub(crate) struct CandidateEngine<'a> {
    pub(super) ssa: &'a SsaFunction,
    pub(super) analysis: &'a FunctionAnalysis,
    pub(super) config: &'a PreConfig,
    pub(super) profile: Option<&'a FrequencyProfile>,
    pub(super) worklist: &'a Worklist,
    pub(super) candidate: &'a Candidate,

    /// Arena of every occurrence created for the candidate.
    pub(super) occs: Vec<Occurrence>,
    /// Occurrences in dominator tree preorder, as renaming visits them.
    pub(super) all_occs: Vec<OccId>,
    /// Real occurrences, including those manufactured by renaming.
    pub(super) real_occs: Vec<OccId>,
    /// Phi occurrences in dominator tree preorder.
    pub(super) phi_occs: Vec<OccId>,
    pub(super) compare_occs: Vec<OccId>,

    pub(super) class_count: u32,
    /// Reals defined by a phi whose phi operands still need renaming.
    pub(super) rename2_set: BTreeSet<OccId>,

    pub(super) apply_min_cut: bool,
    pub(super) redo_critical_edges: bool,
    pub(super) flow: Option<FlowSummary>,
    pub(super) hoisted: usize,
}

impl<'a> CandidateEngine<'a> {
    pub(crate) fn new(
        ssa: &'a SsaFunction,
        analysis: &'a FunctionAnalysis,
        config: &'a PreConfig,
        profile: Option<&'a FrequencyProfile>,
        worklist: &'a Worklist,
        candidate: &'a Candidate,
        apply_min_cut: bool,
    ) -> Self {
        Self {
            ssa,
            analysis,
            config,
            profile,
            worklist,
            candidate,
            occs: Vec::new(),
            all_occs: Vec::new(),
            real_occs: Vec::new(),
            phi_occs: Vec::new(),
            compare_occs: Vec::new(),
            class_count: 1,
            rename2_set: BTreeSet::new(),
            apply_min_cut,
            redo_critical_edges: false,
            flow: None,
            hoisted: 0,
        }
    }

    /// Runs the full pipeline for the candidate.
    ///
    /// Returns `Ok(None)` if the candidate has no real occurrence left and
    /// nothing can change.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the occurrence graph is inconsistent,
    /// including a second critical edge hit after the classical retry.
    pub(crate) fn run(mut self) -> Result<Option<CandidateOutcome>> {
        if !self.build_occurrences()? {
            return Ok(None);
        }

        self.rename1()?;
        self.rename2()?;

        if !self.phi_occs.is_empty() {
            if self.apply_min_cut {
                if !self.compute_min_cut_avail()? {
                    // Flow search exceeded its route budget.
                    self.apply_min_cut = false;
                    self.compute_classical_avail()?;
                }
            } else {
                self.compute_classical_avail()?;
            }
        }

        if self.candidate.is_expression() && self.config.enable_hoisting {
            self.hoist()?;
        }

        let mut retried = false;
        match self.finalize1() {
            Ok(()) => {}
            Err(Error::CriticalEdge { .. }) => {
                retried = true;
                self.redo_for_critical_edges()?;
            }
            Err(error) => return Err(error),
        }

        self.finalize2()?;
        let plan = self.plan_motion()?;
        let report = self.report(&plan, retried);
        Ok(Some(CandidateOutcome { plan, report }))
    }

    /// Downsafety, can-be-available and later, the non-speculative rules.
    pub(super) fn compute_classical_avail(&mut self) -> Result<()> {
        self.compute_down_safety()?;
        self.compute_can_be_avail()?;
        self.compute_later()
    }

    /// Reruns the candidate with the classical rules, keeping phis next to
    /// critical edges out of availability.
    fn redo_for_critical_edges(&mut self) -> Result<()> {
        self.apply_min_cut = false;
        self.redo_critical_edges = true;

        // Hoisted reals belong to the abandoned placement.
        let hoisted: BTreeSet<OccId> = self
            .real_occs
            .iter()
            .copied()
            .filter(|&id| self.occ(id).as_real().is_some_and(|real| real.hoisted))
            .collect();
        if !hoisted.is_empty() {
            self.all_occs.retain(|id| !hoisted.contains(id));
            self.real_occs.retain(|id| !hoisted.contains(id));
        }
        self.hoisted = 0;

        for &id in &self.all_occs {
            let occ = &mut self.occs[id.index()];
            occ.def = None;
            if let OccKind::PhiOpnd(opnd) = &mut occ.kind {
                opnd.flags.remove(OpndFlags::PROCESSED | OpndFlags::INSERTED);
            }
        }

        self.rename1()?;
        self.rename2()?;
        self.compute_classical_avail()?;
        self.finalize1()
    }

    /// Adds `occ` to the arena.
    pub(super) fn new_occ(&mut self, occ: Occurrence) -> OccId {
        let id = OccId::new(self.occs.len());
        self.occs.push(occ);
        id
    }

    pub(super) fn next_class(&mut self) -> u32 {
        let class = self.class_count;
        self.class_count += 1;
        class
    }

    pub(super) fn occ(&self, id: OccId) -> &Occurrence {
        &self.occs[id.index()]
    }

    pub(super) fn occ_mut(&mut self, id: OccId) -> &mut Occurrence {
        &mut self.occs[id.index()]
    }

    pub(super) fn phi(&self, id: OccId) -> Result<&PhiOcc> {
        self.occ(id)
            .as_phi()
            .ok_or_else(|| malformed_error!("{} is not a phi occurrence", id))
    }

    pub(super) fn phi_mut(&mut self, id: OccId) -> Result<&mut PhiOcc> {
        match &mut self.occ_mut(id).kind {
            OccKind::Phi(phi) => Ok(phi),
            _ => Err(malformed_error!("{} is not a phi occurrence", id)),
        }
    }

    pub(super) fn opnd(&self, id: OccId) -> Result<&PhiOpndOcc> {
        self.occ(id)
            .as_opnd()
            .ok_or_else(|| malformed_error!("{} is not a phi operand occurrence", id))
    }

    pub(super) fn opnd_mut(&mut self, id: OccId) -> Result<&mut PhiOpndOcc> {
        match &mut self.occ_mut(id).kind {
            OccKind::PhiOpnd(opnd) => Ok(opnd),
            _ => Err(malformed_error!("{} is not a phi operand occurrence", id)),
        }
    }

    pub(super) fn real(&self, id: OccId) -> Result<&RealOcc> {
        self.occ(id)
            .as_real()
            .ok_or_else(|| malformed_error!("{} is not a real occurrence", id))
    }

    pub(super) fn real_mut(&mut self, id: OccId) -> Result<&mut RealOcc> {
        match &mut self.occ_mut(id).kind {
            OccKind::Real(real) => Ok(real),
            _ => Err(malformed_error!("{} is not a real occurrence", id)),
        }
    }

    /// Operand occurrences of the phi `id`.
    pub(super) fn phi_operands(&self, id: OccId) -> Result<Vec<OccId>> {
        Ok(self.phi(id)?.operands.clone())
    }

    pub(super) fn phi_has(&self, id: OccId, flag: PhiFlags) -> Result<bool> {
        Ok(self.phi(id)?.flags.contains(flag))
    }

    pub(super) fn set_phi_flag(&mut self, id: OccId, flag: PhiFlags, value: bool) -> Result<()> {
        self.phi_mut(id)?.flags.set(flag, value);
        Ok(())
    }

    pub(super) fn opnd_has(&self, id: OccId, flag: OpndFlags) -> Result<bool> {
        Ok(self.opnd(id)?.flags.contains(flag))
    }

    pub(super) fn set_opnd_flag(&mut self, id: OccId, flag: OpndFlags, value: bool) -> Result<()> {
        self.opnd_mut(id)?.flags.set(flag, value);
        Ok(())
    }

    /// Clears down-safety of `phi` unless it is speculatively down-safe.
    pub(super) fn clear_down_safe(&mut self, phi: OccId) -> Result<()> {
        let flags = &mut self.phi_mut(phi)?.flags;
        if !flags.contains(PhiFlags::SPECULATIVE_DOWN_SAFE) {
            flags.remove(PhiFlags::DOWN_SAFE);
        }
        Ok(())
    }

    /// Final availability of a phi under the active rules.
    pub(super) fn will_be_avail(&self, phi: OccId) -> Result<bool> {
        let flags = self.phi(phi)?.flags;
        Ok(if self.apply_min_cut {
            flags.contains(PhiFlags::MC_WILL_BE_AVAIL)
        } else {
            flags.contains(PhiFlags::CAN_BE_AVAIL) && !flags.contains(PhiFlags::LATER)
        })
    }

    /// Returns `true` if the block of `a` dominates the block of `b`.
    pub(super) fn occ_dominates(&self, a: OccId, b: OccId) -> bool {
        self.analysis.dominates(self.occ(a).block, self.occ(b).block)
    }

    /// Returns `true` if the definition of `var` dominates a phi occurrence
    /// located in `phi_block`.
    pub(super) fn def_var_dominates(&self, var: SsaVarId, phi_block: usize) -> Result<bool> {
        let variable = self
            .ssa
            .variable(var)
            .ok_or_else(|| malformed_error!("operand {} has no definition", var))?;
        Ok(match variable.def_site() {
            DefSite::Entry => true,
            DefSite::Instruction { block, .. } => {
                block != phi_block && self.analysis.dominates(block, phi_block)
            }
            DefSite::Phi(block) => block == phi_block || self.analysis.dominates(block, phi_block),
        })
    }

    /// Translates `operands` from the entry of `phi_block` to the end of
    /// `pred` through the variable phis of `phi_block`.
    pub(super) fn translate(
        &self,
        operands: &[SsaVarId],
        phi_block: usize,
        pred: usize,
    ) -> Result<Vec<SsaVarId>> {
        let block = self
            .ssa
            .block(phi_block)
            .ok_or_else(|| malformed_error!("phi occurrence in missing block {}", phi_block))?;
        operands
            .iter()
            .map(|&var| {
                let variable = self
                    .ssa
                    .variable(var)
                    .ok_or_else(|| malformed_error!("operand {} has no definition", var))?;
                if variable.def_site() != DefSite::Phi(phi_block) {
                    return Ok(var);
                }
                block
                    .find_phi_defining(var)
                    .and_then(|phi| phi.operand_from(pred))
                    .map(|operand| operand.value())
                    .ok_or_else(|| {
                        malformed_error!("phi of {} in B{} has no operand from B{}", var, phi_block, pred)
                    })
            })
            .collect()
    }

    /// Execution count of `block`, zero without a profile.
    pub(super) fn block_frequency(&self, block: usize) -> u64 {
        self.profile.map_or(0, |profile| profile.block_frequency(block))
    }

    /// Execution count of the edge `from -> to`, zero without a profile.
    pub(super) fn edge_frequency(&self, from: usize, to: usize) -> u64 {
        self.profile.map_or(0, |profile| profile.edge_frequency(from, to))
    }

    fn report(&self, plan: &MotionPlan, retried: bool) -> CandidateReport {
        let phis = self
            .phi_occs
            .iter()
            .filter_map(|&id| {
                let occ = self.occ(id);
                let phi = occ.as_phi()?;
                Some(PhiReport {
                    block: occ.block,
                    down_safe: phi.flags.contains(PhiFlags::DOWN_SAFE),
                    can_be_avail: phi.flags.contains(PhiFlags::CAN_BE_AVAIL),
                    later: phi.flags.contains(PhiFlags::LATER),
                    fully_avail: phi.flags.contains(PhiFlags::FULLY_AVAIL),
                    partial_ant: phi.flags.contains(PhiFlags::PARTIAL_ANT),
                    will_be_avail: self.will_be_avail(id).unwrap_or(false),
                    extraneous: phi.flags.contains(PhiFlags::EXTRANEOUS),
                })
            })
            .collect();

        let flow = self.flow.clone().unwrap_or_default();
        CandidateReport {
            key: self.candidate.key.clone(),
            min_cut_applied: self.apply_min_cut,
            max_flow: flow.max_flow,
            routes: flow.routes,
            cut: flow.cut,
            exact_cut: flow.exact,
            phis,
            saves: plan.saves(),
            reloads: plan.reloads(),
            insertions: plan.insertions(),
            removed_checks: plan.removed_checks(),
            hoisted_computes: plan.hoisted_computes(),
            temp_phis: plan.temp_phis.len(),
            hoisted: self.hoisted,
            compares: self.compare_occs.len(),
            retried,
        }
    }
}
