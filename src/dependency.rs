//! Backward data-dependency analysis.
//!
//! For every program point, the analysis maintains a conditional set of
//! *watched lvalues*: the storage locations whose content, at that point,
//! may influence the seeds. Sets are propagated backward along arrows by
//! [`DataDependencyLocalContext::run_backward`] and joined at merge points
//! until no context changes any more.

use std::collections::{BTreeMap, VecDeque};

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::microcode::{EdgeId, Microcode, MicrocodeAddress, ProgramPoint, Statement, StmtArrow, Target};
use crate::parser::parse_lvalue;
use crate::reference::TermRef;
use crate::term::Terms;

/// Analysis options, fixed for the lifetime of a [`DataDependency`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DataDependencyConfig {
    /// Conjoin the guard of every traversed arrow to the dependency set.
    pub consider_jump_cond: bool,
    /// Flatten dependency sets to plain disjunctions of membership atoms
    /// after every step.
    pub only_simple_sets: bool,
}

impl DataDependencyConfig {
    /// The configuration used for slicing: both options enabled.
    pub const fn slicing() -> Self {
        Self {
            consider_jump_cond: true,
            only_simple_sets: true,
        }
    }

    pub const fn with_consider_jump_cond(mut self, value: bool) -> Self {
        self.consider_jump_cond = value;
        self
    }

    pub const fn with_only_simple_sets(mut self, value: bool) -> Self {
        self.only_simple_sets = value;
        self
    }

    /// Guards are only folded into conditional sets that keep their
    /// conditions; flattening would drop them immediately.
    fn folds_guards(&self) -> bool {
        self.consider_jump_cond && !self.only_simple_sets
    }
}

/// A lvalue observed at a program point.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LocatedLValue {
    pub address: MicrocodeAddress,
    pub lvalue: TermRef,
}

impl LocatedLValue {
    pub fn new(terms: &Terms, address: MicrocodeAddress, lvalue: TermRef) -> Result<Self> {
        if terms.is_lvalue(lvalue) {
            Ok(Self { address, lvalue })
        } else {
            Err(Error::NotAnLvalue(terms.pretty(lvalue)))
        }
    }

    pub fn parse(terms: &Terms, address: MicrocodeAddress, text: &str) -> Result<Self> {
        let lvalue = parse_lvalue(terms, text)?;
        Ok(Self { address, lvalue })
    }
}

/// The lvalues an expression reads directly: outermost lvalues only, so
/// that `[%r1 + 4]` is one dependency and `%r1` is not.
pub fn dependencies(terms: &Terms, e: TermRef) -> Vec<TermRef> {
    fn go(terms: &Terms, t: TermRef, acc: &mut Vec<TermRef>) {
        if terms.is_lvalue(t) {
            if !acc.contains(&t) {
                acc.push(t);
            }
            return;
        }
        for c in terms.children(t) {
            go(terms, c, acc);
        }
    }
    let mut acc = Vec::new();
    go(terms, e, &mut acc);
    acc
}

/// Every lvalue occurring in `e`, including those inside memory addresses.
pub fn nested_dependencies(terms: &Terms, e: TermRef) -> Vec<TermRef> {
    terms.lvalues(e)
}

/// The per-point state of the analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDependencyLocalContext {
    the_lvalues: TermRef,
}

impl DataDependencyLocalContext {
    pub fn new(terms: &Terms) -> Self {
        Self {
            the_lvalues: terms.cs_empty(),
        }
    }

    /// The conditional set of watched lvalues.
    pub fn watched_lvalues(&self) -> TermRef {
        self.the_lvalues
    }

    /// Watch `lvalue` unconditionally.
    pub fn add(&mut self, terms: &Terms, lvalue: TermRef) {
        self.the_lvalues = terms.cs_add(self.the_lvalues, lvalue);
    }

    /// Join `other` into `self`. Returns whether `self` changed.
    pub fn merge(&mut self, terms: &Terms, other: &DataDependencyLocalContext) -> bool {
        terms.cs_union(&mut self.the_lvalues, other.the_lvalues)
    }

    /// The context holding at the source of `arrow`, given that `self`
    /// holds at its target.
    pub fn run_backward(&self, terms: &Terms, arrow: &StmtArrow, config: &DataDependencyConfig) -> Self {
        let mut phi = self.the_lvalues;

        match arrow.stmt() {
            Statement::Assignment { lval, rval } => {
                let (lval, rval) = (*lval, *rval);
                let deps = dependencies(terms, rval)
                    .into_iter()
                    .fold(terms.cs_empty(), |set, d| terms.cs_add(set, d));

                if terms.is_register(lval) {
                    // Watching `lval` becomes watching its dependencies; any
                    // other read of `lval` (e.g. in an address) reads `rval`.
                    let placeholder = terms.fresh_var("TMP");
                    phi = terms.replace(phi, terms.cs_member(lval), placeholder);
                    phi = terms.replace(phi, lval, rval);
                    phi = terms.replace(phi, placeholder, deps);
                } else if let Some(addr) = terms.memcell_addr(lval) {
                    let x = terms.fresh_var("X");
                    let elt_addr = terms.fresh_var("ELT_ADDR");
                    let watched_cell = terms.cs_member(terms.mk_memcell(x));
                    let tagged = terms.mk_eq(elt_addr, x);

                    phi = terms.rewrite_pattern(watched_cell, &[x], tagged, phi).0;
                    phi = terms.conditional_rewrite_memref(addr, rval, phi).0;
                    let resolved = terms.mk_ite(terms.mk_eq(addr, x), deps, watched_cell);
                    phi = terms.rewrite_pattern(tagged, &[x], resolved, phi).0;
                } else {
                    panic!("Assignment to a non-lvalue: {}", terms.pretty(lval));
                }

                phi = fold_guard(terms, arrow, config, phi);
                phi = terms.simplify_level0(phi);
                phi = terms.disjunctive_normal_form(phi);
                if config.only_simple_sets {
                    phi = terms.cs_flatten(phi);
                }
            }
            Statement::Jump | Statement::Skip | Statement::External(_) => {
                phi = fold_guard(terms, arrow, config, phi);
            }
        }

        trace!("{} : {} ~> {}", arrow.pretty(terms), terms.pretty(self.the_lvalues), terms.pretty(phi));
        Self { the_lvalues: phi }
    }
}

fn fold_guard(terms: &Terms, arrow: &StmtArrow, config: &DataDependencyConfig, phi: TermRef) -> TermRef {
    match arrow.guard() {
        Some(guard) if config.folds_guards() && !terms.is_true(guard) => terms.mk_and2(terms.as_formula(guard), phi),
        _ => phi,
    }
}

/// The fixpoint driver: one context per visited program point and a FIFO
/// worklist of arrows still to be propagated backward.
#[derive(Debug)]
pub struct DataDependency<'a> {
    terms: &'a Terms,
    program: &'a Microcode,
    config: DataDependencyConfig,
    fixpoint: BTreeMap<ProgramPoint, DataDependencyLocalContext>,
    pending: VecDeque<EdgeId>,
    fixpoint_reached: bool,
    steps: usize,
}

impl<'a> DataDependency<'a> {
    pub fn new(terms: &'a Terms, program: &'a Microcode, config: DataDependencyConfig, seeds: &[LocatedLValue]) -> Self {
        let mut dd = Self {
            terms,
            program,
            config,
            fixpoint: BTreeMap::new(),
            pending: VecDeque::new(),
            fixpoint_reached: true,
            steps: 0,
        };
        for seed in seeds {
            dd.seed(seed.address.into(), seed.lvalue);
        }
        dd
    }

    pub fn config(&self) -> &DataDependencyConfig {
        &self.config
    }

    /// Watch `lvalue` at `point`.
    pub fn seed(&mut self, point: ProgramPoint, lvalue: TermRef) {
        debug!("seed {} at {}", self.terms.pretty(lvalue), point);
        let terms = self.terms;
        self.fixpoint
            .entry(point)
            .or_insert_with(|| DataDependencyLocalContext::new(terms))
            .add(terms, lvalue);
        self.enqueue_predecessors(point);
    }

    fn enqueue_predecessors(&mut self, point: ProgramPoint) {
        let program = self.program;
        for &e in program.predecessors(point.address()) {
            let arrow = program.edge(e);
            if arrow.is_dynamic() {
                warn!("ignoring dynamic predecessor {}", arrow.pretty(self.terms));
                continue;
            }
            if !self.pending.contains(&e) {
                self.pending.push_back(e);
            }
        }
        self.fixpoint_reached = self.pending.is_empty();
    }

    /// Propagate one pending arrow. Returns whether the worklist is empty.
    ///
    /// # Panics
    ///
    /// Panics if the target of the arrow has no context, which the
    /// enqueuing protocol rules out.
    pub fn step(&mut self) -> bool {
        let Some(e) = self.pending.pop_front() else {
            self.fixpoint_reached = true;
            return true;
        };
        self.steps += 1;

        let program = self.program;
        let arrow = program.edge(e);
        let target = match arrow.target() {
            Target::Static(addr) => ProgramPoint::from(*addr),
            Target::Dynamic(_) => panic!("Dynamic arrow in worklist: {}", arrow.pretty(self.terms)),
        };
        let context = self
            .fixpoint
            .get(&target)
            .unwrap_or_else(|| panic!("No context at {}", target));

        let candidate = context.run_backward(self.terms, arrow, &self.config);
        let origin = ProgramPoint::from(arrow.src());

        let changed = match self.fixpoint.get_mut(&origin) {
            Some(existing) => existing.merge(self.terms, &candidate),
            None => {
                self.fixpoint.insert(origin, candidate);
                true
            }
        };
        if changed {
            debug!(
                "step {}: {} = {}",
                self.steps,
                origin,
                self.terms.pretty(self.fixpoint[&origin].watched_lvalues())
            );
            self.enqueue_predecessors(origin);
        }

        self.fixpoint_reached = self.pending.is_empty();
        self.fixpoint_reached
    }

    /// Step until the worklist is empty, at most `max_steps` times.
    /// Returns whether the fixpoint was reached.
    pub fn compute_fixpoint(&mut self, max_steps: usize) -> bool {
        let mut remaining = max_steps;
        while !self.pending.is_empty() {
            if remaining == 0 {
                warn!(
                    "fixpoint not reached after {} steps, {} arrows pending",
                    max_steps,
                    self.pending.len()
                );
                break;
            }
            remaining -= 1;
            self.step();
        }
        self.fixpoint_reached = self.pending.is_empty();
        debug!(
            "fixpoint {} after {} steps",
            if self.fixpoint_reached { "reached" } else { "bounded" },
            self.steps
        );
        self.fixpoint_reached
    }

    /// The watched lvalues at `point` after running the fixpoint; the empty
    /// set if `point` was never reached.
    pub fn get_dependencies(&mut self, point: ProgramPoint, max_steps: usize) -> TermRef {
        self.compute_fixpoint(max_steps);
        self.dependencies(point)
    }

    /// Like [`get_dependencies`][Self::get_dependencies], dropping the
    /// conditions: the possible watched lvalues.
    pub fn get_simple_dependencies(&mut self, point: ProgramPoint, max_steps: usize) -> Vec<TermRef> {
        let deps = self.get_dependencies(point, max_steps);
        self.terms.cs_possible_values(deps)
    }

    /// The current watched lvalues at `point`, without stepping.
    pub fn dependencies(&self, point: ProgramPoint) -> TermRef {
        self.fixpoint
            .get(&point)
            .map(|c| c.watched_lvalues())
            .unwrap_or_else(|| self.terms.cs_empty())
    }

    pub fn context(&self, point: ProgramPoint) -> Option<&DataDependencyLocalContext> {
        self.fixpoint.get(&point)
    }

    pub fn step_count(&self) -> usize {
        self.steps
    }

    pub fn is_fixpoint_reached(&self) -> bool {
        self.fixpoint_reached
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
