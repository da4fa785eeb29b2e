//! Alias-aware substitution of memory cells.
//!
//! After a store `[a] := v`, a later read `[x]` yields `v` when `x == a`
//! and the old content of `[x]` otherwise. Since `x == a` is generally not
//! decidable syntactically, every read is replaced by a case split on the
//! alias condition. Case splits inside expressions are lifted through the
//! enclosing operators up to the nearest formula, so that formulas stay
//! free of "expression-valued" conditionals:
//!
//! ```text
//! [x] + 1 == 0   ~>   if (a == x) then (v + 1 == 0) else ([x] + 1 == 0)
//! ```

use log::trace;

use crate::reference::TermRef;
use crate::term::{TermNode, Terms};

/// A case tree whose leaves are expressions.
#[derive(Debug, Clone)]
enum Cases {
    Leaf(TermRef),
    Split {
        cond: TermRef,
        then: Box<Cases>,
        other: Box<Cases>,
    },
}

impl Cases {
    fn map<F>(self, f: &mut F) -> Cases
    where
        F: FnMut(TermRef) -> TermRef,
    {
        match self {
            Cases::Leaf(t) => Cases::Leaf(f(t)),
            Cases::Split { cond, then, other } => Cases::Split {
                cond,
                then: Box::new((*then).map(f)),
                other: Box::new((*other).map(f)),
            },
        }
    }

    /// Pair every leaf of `self` with every leaf of `rhs` under `f`.
    fn combine<F>(self, rhs: &Cases, f: &mut F) -> Cases
    where
        F: FnMut(TermRef, TermRef) -> TermRef,
    {
        match self {
            Cases::Leaf(l) => rhs.clone().map(&mut |r| f(l, r)),
            Cases::Split { cond, then, other } => Cases::Split {
                cond,
                then: Box::new((*then).combine(rhs, f)),
                other: Box::new((*other).combine(rhs, f)),
            },
        }
    }

    fn into_term(self, terms: &Terms) -> TermRef {
        match self {
            Cases::Leaf(t) => t,
            Cases::Split { cond, then, other } => {
                let then = (*then).into_term(terms);
                let other = (*other).into_term(terms);
                terms.mk_ite(cond, then, other)
            }
        }
    }
}

impl Terms {
    /// Replace every memory read `[x]` in `phi` by
    /// `if (addr == x) then value else [x]`, lifting the case splits up to
    /// the enclosing formulas. Returns the new formula and whether any
    /// memory cell was found.
    ///
    /// Addresses themselves are not rewritten: `[[y]]` splits on
    /// `addr == [y]` only.
    pub fn conditional_rewrite_memref(&self, addr: TermRef, value: TermRef, phi: TermRef) -> (TermRef, bool) {
        let (result, modified) = self.memref_formula(addr, value, phi);
        if modified {
            trace!(
                "memref([{}] := {}) on {} => {}",
                self.pretty(addr),
                self.pretty(value),
                self.pretty(phi),
                self.pretty(result)
            );
        }
        (result, modified)
    }

    fn memref_formula(&self, addr: TermRef, value: TermRef, phi: TermRef) -> (TermRef, bool) {
        let node = self.node(phi);
        if node.is_expr() {
            let (cases, modified) = self.memref_expr(addr, value, phi);
            return if modified {
                (cases.into_term(self), true)
            } else {
                (phi, false)
            };
        }

        match node {
            TermNode::Equality(a, b) => {
                let (ca, ma) = self.memref_expr(addr, value, a);
                let (cb, mb) = self.memref_expr(addr, value, b);
                if !ma && !mb {
                    return (phi, false);
                }
                let cases = ca.combine(&cb, &mut |x, y| self.mk_eq(x, y));
                (cases.into_term(self), true)
            }
            TermNode::Quantified { var, body, .. } => {
                let (body, modified) = self.memref_formula(addr, value, body);
                if modified {
                    (self.rebuild(phi, &[var, body]), true)
                } else {
                    (phi, false)
                }
            }
            _ => {
                let children = node.children();
                let mut modified = false;
                let new_children: Vec<TermRef> = children
                    .iter()
                    .map(|&c| {
                        let (c, m) = self.memref_formula(addr, value, c);
                        modified |= m;
                        c
                    })
                    .collect();
                if modified {
                    (self.rebuild(phi, &new_children), true)
                } else {
                    (phi, false)
                }
            }
        }
    }

    fn memref_expr(&self, addr: TermRef, value: TermRef, e: TermRef) -> (Cases, bool) {
        match self.node(e) {
            TermNode::MemCell(x) => {
                let cases = Cases::Split {
                    cond: self.mk_eq(addr, x),
                    then: Box::new(Cases::Leaf(value)),
                    other: Box::new(Cases::Leaf(e)),
                };
                (cases, true)
            }
            TermNode::Unary(op, a) => {
                let (ca, modified) = self.memref_expr(addr, value, a);
                if !modified {
                    return (Cases::Leaf(e), false);
                }
                (ca.map(&mut |x| self.mk_unary(op, x)), true)
            }
            TermNode::Binary(op, a, b) => {
                let (ca, ma) = self.memref_expr(addr, value, a);
                let (cb, mb) = self.memref_expr(addr, value, b);
                if !ma && !mb {
                    return (Cases::Leaf(e), false);
                }
                (ca.combine(&cb, &mut |x, y| self.mk_binary(op, x, y)), true)
            }
            _ => (Cases::Leaf(e), false),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::term::BinaryOp;

    #[test]
    fn test_no_memory_is_untouched() {
        let terms = Terms::default();
        let a = terms.mk_register("a");
        let v = terms.mk_register("v");
        let phi = terms.mk_eq(terms.elt(), terms.mk_register("r1"));
        let (result, modified) = terms.conditional_rewrite_memref(a, v, phi);
        assert!(!modified);
        assert_eq!(result, phi);
    }

    #[test]
    fn test_single_read() {
        let terms = Terms::default();
        let a = terms.mk_register("a");
        let x = terms.mk_register("x");
        let v = terms.mk_register("v");
        let zero = terms.mk_const(0);
        let mx = terms.mk_memcell(x);

        let phi = terms.mk_eq(mx, zero);
        let (result, modified) = terms.conditional_rewrite_memref(a, v, phi);
        assert!(modified);
        let expected = terms.mk_ite(terms.mk_eq(a, x), terms.mk_eq(v, zero), terms.mk_eq(mx, zero));
        assert_eq!(result, expected);
    }

    #[test]
    fn test_lift_through_binary() {
        let terms = Terms::default();
        let a = terms.mk_register("a");
        let x = terms.mk_register("x");
        let y = terms.mk_register("y");
        let v = terms.mk_register("v");
        let mx = terms.mk_memcell(x);
        let my = terms.mk_memcell(y);

        // [x] + [y] as a guard expression: four cases.
        let phi = terms.mk_binary(BinaryOp::Add, mx, my);
        let (result, _) = terms.conditional_rewrite_memref(a, v, phi);

        let ax = terms.mk_eq(a, x);
        let ay = terms.mk_eq(a, y);
        let add = |l, r| terms.mk_binary(BinaryOp::Add, l, r);
        let expected = terms.mk_ite(
            ax,
            terms.mk_ite(ay, add(v, v), add(v, my)),
            terms.mk_ite(ay, add(mx, v), add(mx, my)),
        );
        assert_eq!(result, expected);
    }

    #[test]
    fn test_rewrite_inside_connectives() {
        let terms = Terms::default();
        let a = terms.mk_register("a");
        let x = terms.mk_register("x");
        let v = terms.mk_register("v");
        let c = terms.mk_var("c");
        let mx = terms.mk_memcell(x);

        let phi = terms.mk_and2(c, terms.mk_not(terms.mk_eq(mx, v)));
        let (result, modified) = terms.conditional_rewrite_memref(a, v, phi);
        assert!(modified);
        let lifted = terms.mk_ite(terms.mk_eq(a, x), terms.mk_eq(v, v), terms.mk_eq(mx, v));
        assert_eq!(result, terms.mk_and2(c, terms.mk_not(lifted)));
    }
}
