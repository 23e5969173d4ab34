//! Builder pattern for programmatic SSA construction.
//!
//! The builder uses a closure-based API where all blocks are defined within
//! a single expression, making the CFG structure visually clear:
//!
//! ```rust,ignore
//! let ssa = SsaFunctionBuilder::new(2, 0).build_with(|f| {
//!     let (a, b) = (f.arg(0), f.arg(1));
//!     let cond = f.arg(0);
//!
//!     f.block(0, |blk| blk.branch(cond, 1, 2));
//!     f.block(1, |blk| {
//!         let _ = blk.add(a, b);
//!         blk.jump(3);
//!     });
//!     f.block(2, |blk| blk.jump(3));
//!     f.block(3, |blk| {
//!         let sum = blk.add(a, b);
//!         blk.ret_val(sum);
//!     });
//! });
//! ```
//!
//! # Variable Management
//!
//! Arguments and locals get a version 0 defined at entry. Operations that
//! produce values allocate a fresh intermediate and return it. New versions
//! of a local are reserved with [`SsaFunctionContext::local_version`] and
//! defined later through the `*_into` helpers or [`SsaBlockBuilder::phi_into`],
//! which is how loops and merges of named variables are written.

use std::collections::HashMap;

use crate::analysis::ssa::{
    BinaryOpKind, ConstValue, DefSite, PhiNode, PhiOperand, SsaBlock, SsaFunction,
    SsaInstruction, SsaOp, SsaType, SsaVarId, UnaryOpKind, VariableOrigin,
};

/// Builder for constructing SSA functions programmatically.
#[derive(Debug)]
pub struct SsaFunctionBuilder {
    func: SsaFunction,
    next_stack_slot: u32,
    arg_vars: Vec<SsaVarId>,
    local_vars: Vec<SsaVarId>,
    blocks: HashMap<usize, SsaBlock>,
    max_block_id: usize,
}

impl SsaFunctionBuilder {
    /// Creates a new builder with the specified number of arguments and locals.
    #[must_use]
    pub fn new(num_args: usize, num_locals: usize) -> Self {
        let mut builder = Self {
            func: SsaFunction::new(num_args, num_locals),
            next_stack_slot: 0,
            arg_vars: Vec::with_capacity(num_args),
            local_vars: Vec::with_capacity(num_locals),
            blocks: HashMap::new(),
            max_block_id: 0,
        };

        for i in 0..num_args {
            // Argument indices are bounded by signature limits (< 65535)
            #[allow(clippy::cast_possible_truncation)]
            let origin = VariableOrigin::Argument(i as u16);
            let id = builder
                .func
                .create_variable(origin, DefSite::Entry, SsaType::I32);
            builder.arg_vars.push(id);
        }

        for i in 0..num_locals {
            #[allow(clippy::cast_possible_truncation)]
            let origin = VariableOrigin::Local(i as u16);
            let id = builder
                .func
                .create_variable(origin, DefSite::Entry, SsaType::I32);
            builder.local_vars.push(id);
        }

        builder
    }

    fn alloc_stack_var(&mut self, def_site: DefSite) -> SsaVarId {
        let slot = self.next_stack_slot;
        self.next_stack_slot += 1;
        self.func
            .create_variable(VariableOrigin::Stack(slot), def_site, SsaType::I32)
    }

    /// Builds the SSA function using a closure that defines all blocks.
    ///
    /// Blocks that were never defined are filled in as empty blocks. Use
    /// lists are left empty; consumers derive them with
    /// [`SsaFunction::rebuild_def_use`].
    pub fn build_with<F>(mut self, f: F) -> SsaFunction
    where
        F: FnOnce(&mut SsaFunctionContext<'_>),
    {
        let mut ctx = SsaFunctionContext { builder: &mut self };
        f(&mut ctx);
        self.build()
    }

    fn build(mut self) -> SsaFunction {
        if self.blocks.is_empty() {
            return self.func;
        }
        for id in 0..=self.max_block_id {
            let block = self.blocks.remove(&id).unwrap_or_else(|| SsaBlock::new(id));
            self.func.add_block(block);
        }
        self.func
    }
}

/// Context passed to the build closure for defining blocks.
pub struct SsaFunctionContext<'a> {
    builder: &'a mut SsaFunctionBuilder,
}

impl SsaFunctionContext<'_> {
    /// Gets the argument variable at the specified index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= num_args`.
    #[must_use]
    pub fn arg(&self, index: usize) -> SsaVarId {
        self.builder.arg_vars[index]
    }

    /// Gets version 0 of the local at the specified index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= num_locals`.
    #[must_use]
    pub fn local(&self, index: usize) -> SsaVarId {
        self.builder.local_vars[index]
    }

    /// Reserves the next version of local `index`. Its definition site is
    /// recorded when a block defines it.
    #[must_use]
    pub fn local_version(&mut self, index: u16) -> SsaVarId {
        self.builder
            .func
            .create_variable(VariableOrigin::Local(index), DefSite::Entry, SsaType::I32)
    }

    /// Allocates a fresh intermediate variable to be defined later.
    #[must_use]
    pub fn var(&mut self) -> SsaVarId {
        self.builder.alloc_stack_var(DefSite::Entry)
    }

    /// Sets the type of `var`.
    pub fn set_type(&mut self, var: SsaVarId, var_type: SsaType) {
        if let Some(variable) = self.builder.func.variable_mut(var) {
            variable.set_type(var_type);
        }
    }

    /// Marks `var` as address-taken.
    pub fn mark_address_taken(&mut self, var: SsaVarId) {
        if let Some(variable) = self.builder.func.variable_mut(var) {
            variable.set_address_taken();
        }
    }

    /// Defines a block with the given ID using a closure.
    pub fn block<F>(&mut self, id: usize, f: F)
    where
        F: FnOnce(&mut SsaBlockBuilder<'_>),
    {
        if id > self.builder.max_block_id {
            self.builder.max_block_id = id;
        }

        let mut block = SsaBlock::new(id);
        let mut block_builder = SsaBlockBuilder {
            builder: self.builder,
            block: &mut block,
            block_id: id,
        };

        f(&mut block_builder);

        self.builder.blocks.insert(id, block);
    }
}

/// Builder for constructing individual SSA blocks.
///
/// Operations that produce values return the allocated `SsaVarId`.
pub struct SsaBlockBuilder<'a> {
    builder: &'a mut SsaFunctionBuilder,
    block: &'a mut SsaBlock,
    block_id: usize,
}

impl SsaBlockBuilder<'_> {
    fn next_site(&self) -> DefSite {
        DefSite::instruction(self.block_id, self.block.instructions().len())
    }

    fn define(&mut self, var: SsaVarId, site: DefSite) {
        if let Some(variable) = self.builder.func.variable_mut(var) {
            variable.set_def_site(site);
        }
    }

    fn push(&mut self, op: SsaOp) {
        if let Some(dest) = op.dest() {
            let site = self.next_site();
            self.define(dest, site);
        }
        self.block.add_instruction(SsaInstruction::new(op));
    }

    /// Adds: dest = const i32
    #[must_use]
    pub fn const_i32(&mut self, value: i32) -> SsaVarId {
        let dest = self.builder.alloc_stack_var(self.next_site());
        self.push(SsaOp::Const {
            dest,
            value: ConstValue::I32(value),
        });
        dest
    }

    /// Adds: dest = null
    #[must_use]
    pub fn const_null(&mut self) -> SsaVarId {
        let dest = self.builder.alloc_stack_var(self.next_site());
        if let Some(variable) = self.builder.func.variable_mut(dest) {
            variable.set_type(SsaType::Ref);
        }
        self.push(SsaOp::Const {
            dest,
            value: ConstValue::Null,
        });
        dest
    }

    /// Adds: dest = left <kind> right
    #[must_use]
    pub fn binary(&mut self, kind: BinaryOpKind, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        let dest = self.builder.alloc_stack_var(self.next_site());
        self.binary_into(dest, kind, left, right);
        dest
    }

    /// Adds: dest = left <kind> right, with a caller-chosen destination.
    pub fn binary_into(
        &mut self,
        dest: SsaVarId,
        kind: BinaryOpKind,
        left: SsaVarId,
        right: SsaVarId,
    ) {
        self.push(SsaOp::Binary {
            kind,
            dest,
            left,
            right,
            unsigned: false,
        });
    }

    /// Adds: dest = left + right
    #[must_use]
    pub fn add(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.binary(BinaryOpKind::Add, left, right)
    }

    /// Adds: dest = left - right
    #[must_use]
    pub fn sub(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.binary(BinaryOpKind::Sub, left, right)
    }

    /// Adds: dest = left * right
    #[must_use]
    pub fn mul(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.binary(BinaryOpKind::Mul, left, right)
    }

    /// Adds: dest = left / right
    #[must_use]
    pub fn div(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.binary(BinaryOpKind::Div, left, right)
    }

    /// Adds: dest = left < right
    #[must_use]
    pub fn clt(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.binary(BinaryOpKind::Lt, left, right)
    }

    /// Adds: dest = -operand
    #[must_use]
    pub fn neg(&mut self, operand: SsaVarId) -> SsaVarId {
        let dest = self.builder.alloc_stack_var(self.next_site());
        self.push(SsaOp::Unary {
            kind: UnaryOpKind::Neg,
            dest,
            operand,
        });
        dest
    }

    /// Adds: dest = src
    #[must_use]
    pub fn copy(&mut self, src: SsaVarId) -> SsaVarId {
        let dest = self.builder.alloc_stack_var(self.next_site());
        self.copy_into(dest, src);
        dest
    }

    /// Adds: dest = src, with a caller-chosen destination.
    pub fn copy_into(&mut self, dest: SsaVarId, src: SsaVarId) {
        self.push(SsaOp::Copy { dest, src });
    }

    /// Adds a null check of `value`.
    pub fn check_null(&mut self, value: SsaVarId) {
        self.push(SsaOp::CheckNonNull { value });
    }

    /// Adds a bounds check `index < length`.
    pub fn check_bounds(&mut self, index: SsaVarId, length: SsaVarId) {
        self.push(SsaOp::CheckBounds { index, length });
    }

    /// Adds a call returning a value.
    #[must_use]
    pub fn call(&mut self, callee: u32, args: &[SsaVarId]) -> SsaVarId {
        let dest = self.builder.alloc_stack_var(self.next_site());
        self.push(SsaOp::Call {
            dest: Some(dest),
            callee,
            args: args.to_vec(),
        });
        dest
    }

    /// Adds a call without result.
    pub fn call_void(&mut self, callee: u32, args: &[SsaVarId]) {
        self.push(SsaOp::Call {
            dest: None,
            callee,
            args: args.to_vec(),
        });
    }

    /// Adds a memory barrier.
    pub fn membar(&mut self) {
        self.push(SsaOp::MemoryBarrier);
    }

    /// Adds an unconditional jump.
    pub fn jump(&mut self, target: usize) {
        self.push(SsaOp::Jump { target });
    }

    /// Adds a two-way branch.
    pub fn branch(&mut self, condition: SsaVarId, true_target: usize, false_target: usize) {
        self.push(SsaOp::Branch {
            condition,
            true_target,
            false_target,
        });
    }

    /// Adds a multi-way branch.
    pub fn switch(&mut self, value: SsaVarId, targets: Vec<usize>, default: usize) {
        self.push(SsaOp::Switch {
            value,
            targets,
            default,
        });
    }

    /// Adds a return without value.
    pub fn ret(&mut self) {
        self.push(SsaOp::Return { value: None });
    }

    /// Adds a return of `value`.
    pub fn ret_val(&mut self, value: SsaVarId) {
        self.push(SsaOp::Return { value: Some(value) });
    }

    /// Adds a phi node over intermediates and returns its result.
    #[must_use]
    pub fn phi(&mut self, operands: &[(usize, SsaVarId)]) -> SsaVarId {
        let result = self.builder.alloc_stack_var(DefSite::Phi(self.block_id));
        self.phi_into(result, operands);
        result
    }

    /// Adds a phi node defining the reserved variable `dest`.
    pub fn phi_into(&mut self, dest: SsaVarId, operands: &[(usize, SsaVarId)]) {
        let origin = self
            .builder
            .func
            .variable(dest)
            .map_or(VariableOrigin::Stack(u32::MAX), |v| v.origin());
        let mut phi = PhiNode::new(dest, origin);
        for &(pred, val) in operands {
            phi.add_operand(PhiOperand::new(val, pred));
        }
        self.define(dest, DefSite::Phi(self.block_id));
        self.block.add_phi(phi);
    }

    /// Adds a raw operation.
    pub fn op(&mut self, op: SsaOp) {
        self.push(op);
    }

    /// Adds a nop instruction.
    pub fn nop(&mut self) {
        self.push(SsaOp::Nop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_function() {
        let ssa = SsaFunctionBuilder::new(2, 0).build_with(|f| {
            let (a, b) = (f.arg(0), f.arg(1));
            f.block(0, |blk| {
                let sum = blk.add(a, b);
                blk.ret_val(sum);
            });
        });

        assert_eq!(ssa.num_args(), 2);
        assert_eq!(ssa.block_count(), 1);
        assert_eq!(ssa.block(0).unwrap().instructions().len(), 2);
        let sum = ssa.block(0).unwrap().instructions()[0].def().unwrap();
        assert_eq!(
            ssa.variable(sum).unwrap().def_site(),
            DefSite::instruction(0, 0)
        );
    }

    #[test]
    fn test_loop_with_local_versions() {
        let ssa = SsaFunctionBuilder::new(1, 1).build_with(|f| {
            let n = f.arg(0);
            let i0 = f.local(0);
            let i1 = f.local_version(0);
            let i2 = f.local_version(0);

            f.block(0, |b| b.jump(1));
            f.block(1, |b| {
                b.phi_into(i1, &[(0, i0), (2, i2)]);
                let c = b.clt(i1, n);
                b.branch(c, 2, 3);
            });
            f.block(2, |b| {
                let one = b.const_i32(1);
                b.binary_into(i2, BinaryOpKind::Add, i1, one);
                b.jump(1);
            });
            f.block(3, |b| b.ret());
        });

        let phi = &ssa.block(1).unwrap().phi_nodes()[0];
        assert_eq!(phi.origin(), VariableOrigin::Local(0));
        let i1 = phi.result();
        assert_eq!(ssa.variable(i1).unwrap().version(), 1);
        assert_eq!(ssa.variable(i1).unwrap().def_site(), DefSite::Phi(1));
        let i2 = phi.operand_from(2).unwrap().value();
        assert_eq!(
            ssa.variable(i2).unwrap().def_site(),
            DefSite::instruction(2, 1)
        );
    }

    #[test]
    fn test_gap_blocks_are_filled() {
        let ssa = SsaFunctionBuilder::new(0, 0).build_with(|f| {
            f.block(0, |b| b.jump(2));
            f.block(2, |b| b.ret());
        });
        assert_eq!(ssa.block_count(), 3);
        assert!(ssa.block(1).unwrap().is_empty());
    }

    #[test]
    fn test_address_taken_and_types() {
        let ssa = SsaFunctionBuilder::new(1, 0).build_with(|f| {
            let a = f.arg(0);
            f.mark_address_taken(a);
            f.set_type(a, SsaType::Struct(1));
            f.block(0, |b| b.ret());
        });
        let a = ssa.variable(SsaVarId::new(0)).unwrap();
        assert!(a.is_address_taken());
        assert!(a.var_type().is_aggregate());
    }
}
