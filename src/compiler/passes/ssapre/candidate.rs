//! Candidate discovery.
//!
//! A candidate is one lexical computation: an operator applied to a list of
//! symbols, independent of the SSA versions involved. Discovery walks the
//! dominator tree once, keeps a version stack per symbol, and collects every
//! computation whose operands are the live versions of their symbols.

use std::{collections::HashMap, fmt};

use crate::{
    analysis::{BinaryOpKind, SsaFunction, SsaOp, SsaType, SsaVarId, UnaryOpKind, VariableOrigin},
    compiler::{config::PreConfig, passes::ssapre::analysis::FunctionAnalysis},
    Result,
};

/// Operator of an expression candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExprOp {
    /// A pure binary operation.
    Binary {
        /// The operator.
        kind: BinaryOpKind,
        /// Unsigned interpretation of the operands.
        unsigned: bool,
    },
    /// A pure unary operation.
    Unary(UnaryOpKind),
}

/// Kind of a runtime check candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CheckKind {
    /// `CheckNonNull { value }`.
    NonNull,
    /// `CheckBounds { index, length }`.
    Bounds,
}

/// What a candidate computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CandidateShape {
    /// A value producing computation.
    Expression(ExprOp),
    /// A whole statement without a result.
    Check(CheckKind),
}

impl CandidateShape {
    /// Returns `true` for expression candidates.
    #[must_use]
    pub const fn is_expression(&self) -> bool {
        matches!(self, Self::Expression(_))
    }

    /// Builds the operation computing this shape over `operands`.
    ///
    /// Returns `None` if the operand count does not fit the shape or if an
    /// expression has no destination.
    pub(crate) fn build_op(&self, dest: Option<SsaVarId>, operands: &[SsaVarId]) -> Option<SsaOp> {
        match (*self, operands) {
            (Self::Expression(ExprOp::Binary { kind, unsigned }), &[left, right]) => {
                Some(SsaOp::Binary {
                    kind,
                    dest: dest?,
                    left,
                    right,
                    unsigned,
                })
            }
            (Self::Expression(ExprOp::Unary(kind)), &[operand]) => Some(SsaOp::Unary {
                kind,
                dest: dest?,
                operand,
            }),
            (Self::Check(CheckKind::NonNull), &[value]) => Some(SsaOp::CheckNonNull { value }),
            (Self::Check(CheckKind::Bounds), &[index, length]) => {
                Some(SsaOp::CheckBounds { index, length })
            }
            _ => None,
        }
    }
}

impl fmt::Display for CandidateShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expression(ExprOp::Binary { kind, unsigned }) => {
                write!(f, "{}", kind.mnemonic())?;
                if *unsigned {
                    write!(f, ".un")?;
                }
                Ok(())
            }
            Self::Expression(ExprOp::Unary(kind)) => write!(f, "{}", kind.mnemonic()),
            Self::Check(CheckKind::NonNull) => write!(f, "check.null"),
            Self::Check(CheckKind::Bounds) => write!(f, "check.bounds"),
        }
    }
}

/// Identity of a candidate: its shape and the symbols of its operands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateKey {
    /// Operator or check kind.
    pub shape: CandidateShape,
    /// Operand symbols in normalized order.
    pub symbols: Vec<VariableOrigin>,
}

impl fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.shape)?;
        for (i, symbol) in self.symbols.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{symbol}")?;
        }
        write!(f, ")")
    }
}

/// One computation of a candidate in the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RealSite {
    pub block: usize,
    pub instruction: usize,
    /// Operand versions in key order.
    pub operands: Vec<SsaVarId>,
    pub dest: Option<SsaVarId>,
}

/// A candidate and all of its computations.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub key: CandidateKey,
    /// Computations in dominator tree preorder.
    pub reals: Vec<RealSite>,
    /// Compare instructions consuming a computed value, as `(block, index)`.
    pub compares: Vec<(usize, usize)>,
    /// Type of the computed value.
    pub result_type: SsaType,
}

impl Candidate {
    pub(crate) fn is_expression(&self) -> bool {
        self.key.shape.is_expression()
    }
}

/// All candidates of a function plus the program points that limit motion.
#[derive(Debug, Clone, Default)]
pub(crate) struct Worklist {
    /// Candidates in order of their first computation.
    pub candidates: Vec<Candidate>,
    /// Side-effecting calls as `(block, index)`.
    pub calls: Vec<(usize, usize)>,
    /// Memory barriers as `(block, index)`.
    pub barriers: Vec<(usize, usize)>,
}

enum Walk {
    Enter(usize),
    Leave(Vec<VariableOrigin>),
}

impl Worklist {
    /// Collects the candidates of `ssa`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if an instruction refers to a
    /// variable missing from the function.
    pub(crate) fn build(
        ssa: &SsaFunction,
        analysis: &FunctionAnalysis,
        config: &PreConfig,
    ) -> Result<Self> {
        let mut worklist = Worklist::default();
        let mut index: HashMap<CandidateKey, usize> = HashMap::new();
        let mut stacks: HashMap<VariableOrigin, Vec<SsaVarId>> = HashMap::new();

        for variable in ssa.variables() {
            if variable.def_site().is_entry() {
                stacks.entry(variable.origin()).or_default().push(variable.id());
            }
        }

        let mut walk = vec![Walk::Enter(0)];
        while let Some(step) = walk.pop() {
            let block_idx = match step {
                Walk::Enter(block_idx) => block_idx,
                Walk::Leave(pushed) => {
                    for origin in pushed {
                        if let Some(stack) = stacks.get_mut(&origin) {
                            stack.pop();
                        }
                    }
                    continue;
                }
            };
            let Some(block) = ssa.block(block_idx) else {
                continue;
            };
            if !analysis.is_reachable(block_idx) {
                continue;
            }

            let mut pushed = Vec::new();
            for phi in block.phi_nodes() {
                let origin = origin_of(ssa, phi.result())?;
                stacks.entry(origin).or_default().push(phi.result());
                pushed.push(origin);
            }

            for (instr_idx, instr) in block.instructions().iter().enumerate() {
                let op = instr.op();
                match op {
                    SsaOp::Call { .. } => worklist.calls.push((block_idx, instr_idx)),
                    SsaOp::MemoryBarrier => worklist.barriers.push((block_idx, instr_idx)),
                    _ => {}
                }

                if let Some((shape, operands, dest)) = classify(op, config) {
                    if let Some(site) = screen(ssa, &stacks, shape, operands, dest, block_idx, instr_idx)? {
                        let (key, site, result_type) = site;
                        let slot = *index.entry(key.clone()).or_insert_with(|| {
                            worklist.candidates.push(Candidate {
                                key,
                                reals: Vec::new(),
                                compares: Vec::new(),
                                result_type,
                            });
                            worklist.candidates.len() - 1
                        });
                        worklist.candidates[slot].reals.push(site);
                    }
                }

                if let Some(dest) = op.dest() {
                    let origin = origin_of(ssa, dest)?;
                    stacks.entry(origin).or_default().push(dest);
                    pushed.push(origin);
                }
            }

            walk.push(Walk::Leave(pushed));
            let children: Vec<usize> = analysis.dom_children(block_idx).collect();
            for child in children.into_iter().rev() {
                walk.push(Walk::Enter(child));
            }
        }

        worklist.collect_compares(ssa, analysis);
        Ok(worklist)
    }

    fn collect_compares(&mut self, ssa: &SsaFunction, analysis: &FunctionAnalysis) {
        let mut producers: HashMap<SsaVarId, usize> = HashMap::new();
        for (slot, candidate) in self.candidates.iter().enumerate() {
            for site in &candidate.reals {
                if let Some(dest) = site.dest {
                    producers.insert(dest, slot);
                }
            }
        }
        if producers.is_empty() {
            return;
        }

        for block_idx in analysis.preorder() {
            let Some(block) = ssa.block(block_idx) else {
                continue;
            };
            for (instr_idx, instr) in block.instructions().iter().enumerate() {
                let Some((kind, _, left, right, _)) = instr.op().as_binary_op() else {
                    continue;
                };
                if !kind.is_comparison() {
                    continue;
                }
                let mut consumers: Vec<usize> = [left, right]
                    .iter()
                    .filter_map(|operand| producers.get(operand).copied())
                    .collect();
                consumers.dedup();
                for slot in consumers {
                    self.candidates[slot].compares.push((block_idx, instr_idx));
                }
            }
        }
    }
}

fn origin_of(ssa: &SsaFunction, var: SsaVarId) -> Result<VariableOrigin> {
    ssa.variable(var)
        .map(|v| v.origin())
        .ok_or_else(|| malformed_error!("instruction refers to unknown variable {}", var))
}

/// Returns the shape, operands and destination of a candidate computation.
fn classify(op: &SsaOp, config: &PreConfig) -> Option<(CandidateShape, Vec<SsaVarId>, Option<SsaVarId>)> {
    match op {
        SsaOp::Binary {
            kind,
            dest,
            left,
            right,
            unsigned,
        } if config.enable_expression_pre && !kind.may_trap() => Some((
            CandidateShape::Expression(ExprOp::Binary {
                kind: *kind,
                unsigned: *unsigned,
            }),
            vec![*left, *right],
            Some(*dest),
        )),
        SsaOp::Unary {
            kind,
            dest,
            operand,
        } if config.enable_expression_pre => Some((
            CandidateShape::Expression(ExprOp::Unary(*kind)),
            vec![*operand],
            Some(*dest),
        )),
        SsaOp::CheckNonNull { value } if config.enable_statement_pre => {
            Some((CandidateShape::Check(CheckKind::NonNull), vec![*value], None))
        }
        SsaOp::CheckBounds { index, length } if config.enable_statement_pre => Some((
            CandidateShape::Check(CheckKind::Bounds),
            vec![*index, *length],
            None,
        )),
        _ => None,
    }
}

type Screened = (CandidateKey, RealSite, SsaType);

/// Checks that a computation qualifies and builds its key.
///
/// Returns `Ok(None)` for computations that cannot take part: an operand
/// that is address-taken or is not the live version of its symbol, or an
/// aggregate result.
fn screen(
    ssa: &SsaFunction,
    stacks: &HashMap<VariableOrigin, Vec<SsaVarId>>,
    shape: CandidateShape,
    mut operands: Vec<SsaVarId>,
    dest: Option<SsaVarId>,
    block: usize,
    instruction: usize,
) -> Result<Option<Screened>> {
    let mut symbols = Vec::with_capacity(operands.len());
    for &operand in &operands {
        let variable = ssa
            .variable(operand)
            .ok_or_else(|| malformed_error!("operand {} of B{}:{} does not exist", operand, block, instruction))?;
        if variable.is_address_taken() {
            return Ok(None);
        }
        let live = stacks
            .get(&variable.origin())
            .and_then(|stack| stack.last())
            .is_some_and(|&top| top == operand);
        if !live {
            return Ok(None);
        }
        symbols.push(variable.origin());
    }

    let mut result_type = SsaType::Unknown;
    if let Some(dest) = dest {
        let variable = ssa
            .variable(dest)
            .ok_or_else(|| malformed_error!("result {} of B{}:{} does not exist", dest, block, instruction))?;
        if variable.var_type().is_aggregate() {
            return Ok(None);
        }
        result_type = *variable.var_type();
    }

    if let CandidateShape::Expression(ExprOp::Binary { kind, .. }) = shape {
        if kind.is_commutative() && symbols[0] > symbols[1] {
            symbols.swap(0, 1);
            operands.swap(0, 1);
        }
    }

    Ok(Some((
        CandidateKey { shape, symbols },
        RealSite {
            block,
            instruction,
            operands,
            dest,
        },
        result_type,
    )))
}
