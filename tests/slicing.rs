use test_log::test;

use microslice::dependency::{DataDependency, DataDependencyConfig, DataDependencyLocalContext, LocatedLValue};
use microslice::microcode::{EdgeId, Microcode, MicrocodeAddress, ProgramPoint};
use microslice::parser::parse_term;
use microslice::reference::TermRef;
use microslice::slicing::{compute_slice, dependencies_at, find_useless_statements, possible_values_at, statement_used};
use microslice::term::Terms;

fn p(i: u64) -> MicrocodeAddress {
    MicrocodeAddress::new(i, 0)
}

fn assign(terms: &Terms, mc: &mut Microcode, src: u64, tgt: u64, lval: &str, rval: &str) -> EdgeId {
    let lval = parse_term(terms, lval).unwrap();
    let rval = parse_term(terms, rval).unwrap();
    mc.add_assignment(terms, p(src), p(tgt), lval, rval, None).unwrap()
}

fn seed(terms: &Terms, at: u64, text: &str) -> LocatedLValue {
    LocatedLValue::parse(terms, p(at), text).unwrap()
}

#[test]
fn test_slice_example() {
    let terms = Terms::default();
    let mut mc = Microcode::new();
    let e1 = assign(&terms, &mut mc, 0, 1, "%r1", "5");
    let e4 = assign(&terms, &mut mc, 1, 2, "%r4", "7");
    let e2 = assign(&terms, &mut mc, 2, 3, "%r2", "%r1 + 1");
    let e3 = assign(&terms, &mut mc, 3, 4, "%r3", "%r2");

    let slice = compute_slice(&terms, &mc, p(4), terms.mk_register("r3"));
    assert_eq!(slice, vec![e1, e2, e3]);
    assert!(!slice.contains(&e4));
}

#[test]
fn test_dead_code_example() {
    let terms = Terms::default();
    let mut mc = Microcode::new();
    let first = assign(&terms, &mut mc, 0, 1, "%r1", "1");
    let second = assign(&terms, &mut mc, 1, 2, "%r1", "2");
    assign(&terms, &mut mc, 2, 3, "%r2", "%r1");

    assert!(!statement_used(&terms, &mc, first));
    assert!(statement_used(&terms, &mc, second));

    let useless = find_useless_statements(&terms, &mc);
    assert!(useless.contains(&first));
    assert!(!useless.contains(&second));
}

#[test]
fn test_register_substitution() {
    let terms = Terms::default();
    let mut mc = Microcode::new();
    assign(&terms, &mut mc, 1, 2, "%r", "%a + %b");

    let seeds = [seed(&terms, 2, "%r")];
    for config in [DataDependencyConfig::default(), DataDependencyConfig::slicing()] {
        let values = possible_values_at(&terms, &mc, config, &seeds, p(1), mc.node_count());
        assert!(values.contains(&terms.mk_register("a")));
        assert!(values.contains(&terms.mk_register("b")));
        assert!(!values.contains(&terms.mk_register("r")));
    }
}

/// Substitute `atom` by a boolean and simplify.
fn assume(terms: &Terms, phi: TermRef, atom: TermRef, value: bool) -> TermRef {
    let phi = terms.replace(phi, atom, terms.mk_bool(value));
    terms.simplify_level0(phi)
}

#[test]
fn test_memory_aliasing() {
    let terms = Terms::default();
    let mut mc = Microcode::new();
    assign(&terms, &mut mc, 1, 2, "[y]", "%v");

    let seeds = [seed(&terms, 2, "[x]")];
    let deps = dependencies_at(&terms, &mc, DataDependencyConfig::default(), &seeds, p(1), 10);

    let x = terms.mk_var("x");
    let y = terms.mk_var("y");
    let v = terms.mk_register("v");
    let mx = terms.mk_memcell(x);

    // Neither simply `v` nor simply `[x]`.
    assert_ne!(deps, terms.cs_member(v));
    assert_ne!(deps, terms.cs_member(mx));
    assert_eq!(terms.cs_possible_values(deps), vec![v, mx]);

    let alias = terms.mk_eq(y, x);
    assert!(terms.contains(deps, alias));
    assert_eq!(assume(&terms, deps, alias, true), terms.cs_member(v));
    assert_eq!(assume(&terms, deps, alias, false), terms.cs_member(mx));
}

#[test]
fn test_memory_store_through_register() {
    let terms = Terms::default();
    let mut mc = Microcode::new();
    assign(&terms, &mut mc, 0, 1, "%r1", "%sp + 8");
    let store = assign(&terms, &mut mc, 1, 2, "[%r1]", "%r2");
    let load = assign(&terms, &mut mc, 2, 3, "%r3", "[%sp + 8]");

    let slice = compute_slice(&terms, &mc, p(3), terms.mk_register("r3"));
    assert!(slice.contains(&store));
    assert!(slice.contains(&load));

    let values = possible_values_at(&terms, &mc, DataDependencyConfig::slicing(), &[seed(&terms, 3, "%r3")], p(0), 10);
    assert!(values.contains(&terms.mk_register("r2")));
}

#[test]
fn test_monotonicity() {
    let terms = Terms::default();
    let mut mc = Microcode::new();
    assign(&terms, &mut mc, 0, 1, "%a", "%b + %c");
    assign(&terms, &mut mc, 1, 2, "%b", "%a");
    mc.add_skip(p(2), p(0), None);
    mc.add_skip(p(2), p(3), None);

    let mut dd = DataDependency::new(&terms, &mc, DataDependencyConfig::slicing(), &[seed(&terms, 3, "%b")]);
    let points: Vec<ProgramPoint> = mc.nodes().map(|n| n.loc().into()).collect();
    let mut previous: Vec<Vec<TermRef>> = points.iter().map(|_| Vec::new()).collect();

    for _ in 0..100 {
        let done = dd.step();
        for (point, before) in points.iter().zip(previous.iter_mut()) {
            let now = terms.cs_possible_values(dd.dependencies(*point));
            assert!(before.iter().all(|v| now.contains(v)), "context at {} shrank", point);
            *before = now;
        }
        if done {
            break;
        }
    }
    assert!(dd.is_fixpoint_reached());
}

#[test]
fn test_idempotent_merge() {
    let terms = Terms::default();
    let c = terms.mk_var("c");

    let mut ctx = DataDependencyLocalContext::new(&terms);
    ctx.add(&terms, terms.mk_register("a"));
    ctx.add(&terms, terms.mk_memcell(terms.mk_register("sp")));
    let copy = ctx.clone();
    assert!(!ctx.merge(&terms, &copy));
    assert_eq!(ctx, copy);

    let mut sub = DataDependencyLocalContext::new(&terms);
    sub.add(&terms, terms.mk_register("a"));
    assert!(!ctx.merge(&terms, &sub));
    assert_eq!(ctx, copy);

    // A conditional member is not absorbed by the unconditional set.
    let mut guarded = DataDependencyLocalContext::new(&terms);
    guarded.add(&terms, terms.mk_register("z"));
    let guarded_set = terms.mk_and2(c, guarded.watched_lvalues());
    let mut set = ctx.watched_lvalues();
    assert!(terms.cs_union(&mut set, guarded_set));
    assert!(!terms.cs_union(&mut set, guarded_set));
}

#[test]
fn test_bounded_termination_on_cycles() {
    let terms = Terms::default();
    let mut mc = Microcode::new();
    // A dense cyclic graph where every point mixes registers.
    let regs = ["%a", "%b", "%c", "%d"];
    for i in 0..8u64 {
        let lval = regs[i as usize % 4];
        let rval = format!("{} + {}", regs[(i as usize + 1) % 4], regs[(i as usize + 2) % 4]);
        assign(&terms, &mut mc, i, (i + 1) % 8, lval, &rval);
        mc.add_skip(p(i), p((i + 3) % 8), None);
    }

    let seeds = [seed(&terms, 0, "%a")];
    let mut dd = DataDependency::new(&terms, &mc, DataDependencyConfig::slicing(), &seeds);
    dd.compute_fixpoint(mc.node_count());
    assert!(dd.step_count() <= mc.node_count());

    // Flattened sets range over finitely many lvalues, so enough steps converge.
    assert!(dd.compute_fixpoint(10_000));
    assert_eq!(dd.pending_len(), 0);
}

#[test]
fn test_slice_outlasting_the_step_bound() {
    let terms = Terms::default();
    let mut mc = Microcode::new();
    // More parallel arrows than program points.
    let def = assign(&terms, &mut mc, 0, 1, "%x4", "1");
    let moves: Vec<EdgeId> = (0..5)
        .map(|i| assign(&terms, &mut mc, 1, 2, &format!("%a{}", i), &format!("%x{}", i)))
        .collect();
    let sum = assign(&terms, &mut mc, 2, 3, "%r", "%a0 + %a1 + %a2 + %a3 + %a4");
    assert_eq!(mc.node_count(), 4);

    let seeds = [seed(&terms, 3, "%r")];
    let mut dd = DataDependency::new(&terms, &mc, DataDependencyConfig::slicing(), &seeds);
    assert!(!dd.compute_fixpoint(mc.node_count()));

    let slice = compute_slice(&terms, &mc, p(3), terms.mk_register("r"));
    let mut expected = vec![def];
    expected.extend(moves);
    expected.push(sum);
    assert_eq!(slice, expected);
}

#[test]
fn test_guards_are_kept_with_jump_conditions() {
    let terms = Terms::default();
    let mut mc = Microcode::new();
    let guard = parse_term(&terms, "%f == 0").unwrap();
    mc.add_skip(p(0), p(1), Some(guard));
    assign(&terms, &mut mc, 1, 2, "%r", "%a");

    let config = DataDependencyConfig::default().with_consider_jump_cond(true);
    let deps = dependencies_at(&terms, &mc, config, &[seed(&terms, 2, "%r")], p(0), 10);
    assert_eq!(deps, terms.mk_and2(guard, terms.cs_member(terms.mk_register("a"))));

    let flat = dependencies_at(&terms, &mc, DataDependencyConfig::slicing(), &[seed(&terms, 2, "%r")], p(0), 10);
    assert_eq!(flat, terms.cs_member(terms.mk_register("a")));
}

#[test]
fn test_unvisited_point_is_empty() {
    let terms = Terms::default();
    let mut mc = Microcode::new();
    assign(&terms, &mut mc, 0, 1, "%r", "%a");
    assign(&terms, &mut mc, 5, 6, "%s", "%b");

    let deps = dependencies_at(&terms, &mc, DataDependencyConfig::default(), &[seed(&terms, 1, "%r")], p(5), 10);
    assert!(terms.is_false(deps));
}
