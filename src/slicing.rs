//! Program slicing and dead assignment detection.

use std::collections::VecDeque;

use log::{debug, warn};

use crate::dependency::{DataDependency, DataDependencyConfig};
use crate::microcode::{EdgeId, Microcode, MicrocodeAddress, ProgramPoint, Statement, Target};
use crate::reference::TermRef;
use crate::term::Terms;

pub use crate::dependency::{dependencies, nested_dependencies, LocatedLValue};

/// The assignments that may influence the value of `seed` at `address`.
///
/// Every lvalue occurring in `seed`, including those inside memory
/// addresses, is watched.
pub fn compute_slice(terms: &Terms, program: &Microcode, address: MicrocodeAddress, seed: TermRef) -> Vec<EdgeId> {
    let seeds: Vec<LocatedLValue> = nested_dependencies(terms, seed)
        .into_iter()
        .map(|lvalue| LocatedLValue { address, lvalue })
        .collect();
    compute_slice_from(terms, program, &seeds)
}

/// The assignments that may influence any of `seeds`, in node order and
/// then successor order.
///
/// An assignment belongs to the slice when, at its target, some watched
/// lvalue contains the assigned lvalue, or when both are memory cells.
/// Assignments without a concrete target are left out.
///
/// Every lookup resumes the fixpoint for up to `node_count` more steps, so
/// a worklist that outlasts a single bound keeps draining while the
/// slice is collected.
pub fn compute_slice_from(terms: &Terms, program: &Microcode, seeds: &[LocatedLValue]) -> Vec<EdgeId> {
    let max_steps = program.node_count();
    let mut dd = DataDependency::new(terms, program, DataDependencyConfig::slicing(), seeds);
    dd.compute_fixpoint(max_steps);

    let mut slice = Vec::new();
    for e in program.edges() {
        let arrow = program.edge(e);
        let Statement::Assignment { lval, .. } = *arrow.stmt() else {
            continue;
        };
        let Some(target) = arrow.extract_target(terms) else {
            continue;
        };

        let deps = dd.get_simple_dependencies(target.into(), max_steps);
        let lval_is_cell = terms.is_memcell(lval);
        if deps
            .iter()
            .any(|&d| terms.contains(d, lval) || (lval_is_cell && terms.is_memcell(d)))
        {
            slice.push(e);
        }
    }

    if !dd.is_fixpoint_reached() {
        warn!("slice of {} seeds computed before the fixpoint", seeds.len());
    }
    debug!("slice of {} seeds: {} arrows", seeds.len(), slice.len());
    slice
}

/// Whether the value assigned by `edge` may be read later.
///
/// Only register assignments are analysed: any other arrow is reported as
/// used. The register is searched forward from the target of `edge`, along
/// paths where it is not overwritten. Overwriting part of the register,
/// reading it in an expression, a guard or a jump target, or reaching an
/// unresolved dynamic jump, counts as a use.
pub fn statement_used(terms: &Terms, program: &Microcode, edge: EdgeId) -> bool {
    let Statement::Assignment { lval: reg, .. } = *program.edge(edge).stmt() else {
        return true;
    };
    if !terms.is_register(reg) {
        return true;
    }
    let Some(start) = program.edge(edge).extract_target(terms) else {
        return true;
    };
    let Ok(node) = program.get_node(start) else {
        return true;
    };

    let mut explored: Vec<EdgeId> = Vec::new();
    let mut pending: VecDeque<EdgeId> = VecDeque::new();
    let explore = |e: EdgeId, explored: &mut Vec<EdgeId>, pending: &mut VecDeque<EdgeId>| {
        let arrow = program.edge(e);
        if !explored.iter().any(|&x| program.edge(x) == arrow) {
            explored.push(e);
            pending.push_back(e);
        }
    };
    for &e in node.successors() {
        explore(e, &mut explored, &mut pending);
    }

    while let Some(e) = pending.pop_front() {
        let arrow = program.edge(e);

        if let Some(guard) = arrow.guard() {
            if terms.reads_register(guard, reg) {
                return true;
            }
        }

        if let Statement::Assignment { lval, rval } = *arrow.stmt() {
            if terms.reads_register(rval, reg) {
                return true;
            }
            if lval == reg {
                continue;
            }
            if terms.reads_register(lval, reg) {
                return true;
            }
        }

        let next = match *arrow.target() {
            Target::Static(addr) => addr,
            Target::Dynamic(t) => {
                if terms.reads_register(t, reg) {
                    return true;
                }
                match arrow.extract_target(terms) {
                    Some(addr) => addr,
                    None => return true,
                }
            }
        };
        if let Ok(node) = program.get_node(next) {
            for &s in node.successors() {
                explore(s, &mut explored, &mut pending);
            }
        }
    }

    false
}

/// Assignments whose value is never read, in node order.
pub fn find_useless_statements(terms: &Terms, program: &Microcode) -> Vec<EdgeId> {
    program
        .edges()
        .filter(|&e| !statement_used(terms, program, e))
        .collect()
}

/// The conditional set of lvalues watched at `point` once `seeds` have
/// been propagated for at most `max_steps` steps.
pub fn dependencies_at(
    terms: &Terms,
    program: &Microcode,
    config: DataDependencyConfig,
    seeds: &[LocatedLValue],
    point: MicrocodeAddress,
    max_steps: usize,
) -> TermRef {
    let mut dd = DataDependency::new(terms, program, config, seeds);
    dd.get_dependencies(ProgramPoint::from(point), max_steps)
}

/// Like [`dependencies_at`], as a plain list of lvalues.
pub fn possible_values_at(
    terms: &Terms,
    program: &Microcode,
    config: DataDependencyConfig,
    seeds: &[LocatedLValue],
    point: MicrocodeAddress,
    max_steps: usize,
) -> Vec<TermRef> {
    let mut dd = DataDependency::new(terms, program, config, seeds);
    dd.get_simple_dependencies(ProgramPoint::from(point), max_steps)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::parser::parse_term;

    fn addr(global: u64) -> MicrocodeAddress {
        MicrocodeAddress::new(global, 0)
    }

    fn assign(terms: &Terms, mc: &mut Microcode, src: u64, tgt: u64, lval: &str, rval: &str) -> EdgeId {
        let lval = parse_term(terms, lval).unwrap();
        let rval = parse_term(terms, rval).unwrap();
        mc.add_assignment(terms, addr(src), addr(tgt), lval, rval, None)
            .unwrap()
    }

    #[test]
    fn test_slice_through_memory() {
        let terms = Terms::default();
        let mut mc = Microcode::new();
        let store = assign(&terms, &mut mc, 0, 1, "[%sp]", "%r1");
        let other = assign(&terms, &mut mc, 1, 2, "%r5", "%r6");
        let load = assign(&terms, &mut mc, 2, 3, "%r2", "[%sp]");

        let slice = compute_slice(&terms, &mc, addr(3), terms.mk_register("r2"));
        assert_eq!(slice, vec![store, load]);
        assert!(!slice.contains(&other));
    }

    #[test]
    fn test_slice_seed_expression_watches_addresses() {
        let terms = Terms::default();
        let mut mc = Microcode::new();
        let base = assign(&terms, &mut mc, 0, 1, "%r1", "0x1000");
        let unrelated = assign(&terms, &mut mc, 1, 2, "%r2", "3");

        let seed = parse_term(&terms, "[%r1 + 4]").unwrap();
        let slice = compute_slice(&terms, &mc, addr(2), seed);
        assert_eq!(slice, vec![base]);
        assert!(!slice.contains(&unrelated));
    }

    #[test]
    fn test_slice_skips_unresolved_targets() {
        let terms = Terms::default();
        let mut mc = Microcode::new();
        let r1 = terms.mk_register("r1");
        let stmt = Statement::Assignment {
            lval: r1,
            rval: terms.mk_const(1),
        };
        mc.add_dynamic_successor(addr(0), terms.mk_register("eax"), stmt, None);
        let seed = LocatedLValue::new(&terms, addr(0), r1).unwrap();
        assert!(compute_slice_from(&terms, &mc, &[seed]).is_empty());
    }

    #[test]
    fn test_partial_overwrite_is_a_use() {
        let terms = Terms::default();
        let mut mc = Microcode::new();
        let first = assign(&terms, &mut mc, 0, 1, "%eax", "1");
        assign(&terms, &mut mc, 1, 2, "%eax{0;8}", "2");
        assert!(statement_used(&terms, &mc, first));
    }

    #[test]
    fn test_guard_read_is_a_use() {
        let terms = Terms::default();
        let mut mc = Microcode::new();
        let first = assign(&terms, &mut mc, 0, 1, "%r1", "1");
        let guard = parse_term(&terms, "%r1 == 0").unwrap();
        mc.add_skip(addr(1), addr(2), Some(guard));
        assert!(statement_used(&terms, &mc, first));
    }

    #[test]
    fn test_unresolved_jump_is_a_use() {
        let terms = Terms::default();
        let mut mc = Microcode::new();
        let first = assign(&terms, &mut mc, 0, 1, "%r1", "1");
        mc.add_dynamic_successor(addr(1), terms.mk_register("r2"), Statement::Jump, None);
        assert!(statement_used(&terms, &mc, first));
    }

    #[test]
    fn test_unused_in_loop() {
        let terms = Terms::default();
        let mut mc = Microcode::new();
        let first = assign(&terms, &mut mc, 0, 1, "%r1", "1");
        mc.add_skip(addr(1), addr(2), None);
        mc.add_skip(addr(2), addr(1), None);
        assert!(!statement_used(&terms, &mc, first));
        assert_eq!(find_useless_statements(&terms, &mc), vec![first]);
    }

    #[test]
    fn test_memory_and_other_statements_are_used() {
        let terms = Terms::default();
        let mut mc = Microcode::new();
        let store = assign(&terms, &mut mc, 0, 1, "[%sp]", "1");
        let skip = mc.add_skip(addr(1), addr(2), None);
        assert!(statement_used(&terms, &mc, store));
        assert!(statement_used(&terms, &mc, skip));
        assert!(find_useless_statements(&terms, &mc).is_empty());
    }
}
