//! Formula normalization: level-0 simplification and disjunctive normal form.

use std::collections::HashMap;

use log::trace;

use crate::reference::TermRef;
use crate::term::{TermNode, Terms};

/// A conjunction of literals.
type Clause = Vec<TermRef>;

impl Terms {
    /// Fold every statically decidable subterm.
    ///
    /// "Level 0" means purely syntactic: constant operands, identical
    /// handles, and the boolean identities of the connectives. No
    /// arithmetic reasoning is attempted.
    pub fn simplify_level0(&self, t: TermRef) -> TermRef {
        let mut memo = HashMap::new();
        self.simplify_rec(t, &mut memo)
    }

    fn simplify_rec(&self, t: TermRef, memo: &mut HashMap<TermRef, TermRef>) -> TermRef {
        if let Some(&r) = memo.get(&t) {
            return r;
        }
        let node = self.node(t);
        let children: Vec<TermRef> = node.children().iter().map(|&c| self.simplify_rec(c, memo)).collect();

        let result = match node {
            TermNode::Unary(op, _) => match self.constant_value(children[0]) {
                Some(a) => self.mk_const(op.eval(a)),
                None => self.mk_unary(op, children[0]),
            },
            TermNode::Binary(op, _, _) => {
                match (self.constant_value(children[0]), self.constant_value(children[1])) {
                    (Some(a), Some(b)) => match op.eval(a, b) {
                        Some(r) => self.mk_const(r),
                        None => self.mk_binary(op, children[0], children[1]),
                    },
                    _ => self.mk_binary(op, children[0], children[1]),
                }
            }
            TermNode::Equality(_, _) => {
                let (a, b) = (children[0], children[1]);
                if a == b {
                    self.mk_true()
                } else if let (Some(x), Some(y)) = (self.constant_value(a), self.constant_value(b)) {
                    self.mk_bool(x == y)
                } else if let (TermNode::Bool(x), TermNode::Bool(y)) = (self.node(a), self.node(b)) {
                    self.mk_bool(x == y)
                } else {
                    self.mk_eq(a, b)
                }
            }
            TermNode::Ite(_, _, _) => {
                let cond = self.as_formula(children[0]);
                if self.is_true(cond) {
                    children[1]
                } else if self.is_false(cond) {
                    children[2]
                } else if children[1] == children[2] {
                    children[1]
                } else {
                    self.mk_ite(cond, children[1], children[2])
                }
            }
            TermNode::Quantified { .. } => {
                let body = self.as_formula(children[1]);
                if matches!(self.node(body), TermNode::Bool(_)) {
                    body
                } else {
                    self.rebuild(t, &[children[0], body])
                }
            }
            _ => self.rebuild(t, &children),
        };

        memo.insert(t, result);
        result
    }

    /// Convert a formula to disjunctive normal form.
    ///
    /// Negations are pushed down to atoms, `if c then a else b` becomes
    /// `(c && a) || (!c && b)`, and conjunctions are distributed over
    /// disjunctions. Equalities, expressions and quantified formulas are atoms.
    /// The result may be exponentially larger than the input.
    pub fn disjunctive_normal_form(&self, t: TermRef) -> TermRef {
        let clauses = self.dnf_clauses(t, false);
        let result = self.mk_or(clauses.into_iter().map(|c| self.mk_and(c)));
        trace!("dnf({}) = {}", self.pretty(t), self.pretty(result));
        result
    }

    fn dnf_clauses(&self, t: TermRef, negated: bool) -> Vec<Clause> {
        let t = self.as_formula(t);
        match self.node(t) {
            TermNode::Bool(b) => {
                if b != negated {
                    vec![vec![]]
                } else {
                    vec![]
                }
            }
            TermNode::Not(a) => self.dnf_clauses(a, !negated),
            TermNode::And(xs) if !negated => self.dnf_product(xs.iter().map(|&x| self.dnf_clauses(x, false))),
            TermNode::And(xs) => self.dnf_sum(xs.iter().map(|&x| self.dnf_clauses(x, true))),
            TermNode::Or(xs) if !negated => self.dnf_sum(xs.iter().map(|&x| self.dnf_clauses(x, false))),
            TermNode::Or(xs) => self.dnf_product(xs.iter().map(|&x| self.dnf_clauses(x, true))),
            TermNode::Ite(c, a, b) => {
                let pos = self.dnf_product([self.dnf_clauses(c, false), self.dnf_clauses(a, negated)]);
                let neg = self.dnf_product([self.dnf_clauses(c, true), self.dnf_clauses(b, negated)]);
                self.dnf_sum([pos, neg])
            }
            _ => {
                let literal = if negated { self.mk_not(t) } else { t };
                vec![vec![literal]]
            }
        }
    }

    fn dnf_sum(&self, parts: impl IntoIterator<Item = Vec<Clause>>) -> Vec<Clause> {
        let mut result: Vec<Clause> = Vec::new();
        for part in parts {
            for clause in part {
                if !result.contains(&clause) {
                    result.push(clause);
                }
            }
        }
        result
    }

    fn dnf_product(&self, parts: impl IntoIterator<Item = Vec<Clause>>) -> Vec<Clause> {
        let mut result: Vec<Clause> = vec![vec![]];
        for part in parts {
            let mut next = Vec::new();
            for prefix in &result {
                for clause in &part {
                    let mut merged = prefix.clone();
                    for &lit in clause {
                        if !merged.contains(&lit) {
                            merged.push(lit);
                        }
                    }
                    if !next.contains(&merged) {
                        next.push(merged);
                    }
                }
            }
            result = next;
            if result.is_empty() {
                break;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::term::BinaryOp;

    #[test]
    fn test_fold_constants() {
        let terms = Terms::default();
        let e = terms.mk_binary(BinaryOp::Add, terms.mk_const(2), terms.mk_const(3));
        assert_eq!(terms.simplify_level0(e), terms.mk_const(5));

        let div = terms.mk_binary(BinaryOp::UDiv, terms.mk_const(2), terms.mk_const(0));
        assert_eq!(terms.simplify_level0(div), div);
    }

    #[test]
    fn test_fold_equalities() {
        let terms = Terms::default();
        let r1 = terms.mk_register("r1");
        let x = terms.mk_var("x");

        assert!(terms.is_true(terms.simplify_level0(terms.mk_eq(r1, r1))));
        let c = terms.mk_eq(terms.mk_const(4), terms.mk_const(8));
        assert!(terms.is_false(terms.simplify_level0(c)));

        // (r1 == r1) && x  ~>  x
        let f = terms.mk_and2(terms.mk_eq(r1, r1), x);
        assert_eq!(terms.simplify_level0(f), x);
    }

    #[test]
    fn test_fold_ite() {
        let terms = Terms::default();
        let a = terms.mk_var("a");
        let b = terms.mk_var("b");
        let c = terms.mk_eq(terms.mk_const(1), terms.mk_const(1));
        assert_eq!(terms.simplify_level0(terms.mk_ite(c, a, b)), a);
        let c = terms.mk_var("c");
        assert_eq!(terms.simplify_level0(terms.mk_ite(c, a, a)), a);
    }

    #[test]
    fn test_dnf_distributes() {
        let terms = Terms::default();
        let a = terms.mk_var("a");
        let b = terms.mk_var("b");
        let c = terms.mk_var("c");

        // a && (b || c)  ~>  (a && b) || (a && c)
        let f = terms.mk_and2(a, terms.mk_or2(b, c));
        let dnf = terms.disjunctive_normal_form(f);
        assert_eq!(dnf, terms.mk_or2(terms.mk_and2(a, b), terms.mk_and2(a, c)));
    }

    #[test]
    fn test_dnf_ite_and_negation() {
        let terms = Terms::default();
        let a = terms.mk_var("a");
        let b = terms.mk_var("b");
        let c = terms.mk_var("c");

        let f = terms.mk_ite(c, a, b);
        let dnf = terms.disjunctive_normal_form(f);
        assert_eq!(
            dnf,
            terms.mk_or2(terms.mk_and2(c, a), terms.mk_and2(terms.mk_not(c), b))
        );

        // !(a || b)  ~>  !a && !b
        let f = terms.mk_not(terms.mk_or2(a, b));
        let dnf = terms.disjunctive_normal_form(f);
        assert_eq!(dnf, terms.mk_and2(terms.mk_not(a), terms.mk_not(b)));
    }

    #[test]
    fn test_dnf_constants() {
        let terms = Terms::default();
        assert!(terms.is_false(terms.disjunctive_normal_form(terms.mk_false())));
        assert!(terms.is_true(terms.disjunctive_normal_form(terms.mk_true())));
        let a = terms.mk_var("a");
        assert!(terms.is_false(terms.disjunctive_normal_form(terms.mk_and2(a, terms.mk_false()))));
    }
}
