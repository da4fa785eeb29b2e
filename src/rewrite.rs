//! Syntactic pattern matching and rewriting.
//!
//! A pattern is an ordinary term together with a list of *free* variables.
//! Matching a pattern against a term fills an explicit [`Bindings`] map;
//! instantiating a replacement substitutes the bound variables.
//!
//! ```
//! use microslice::term::Terms;
//!
//! let terms = Terms::default();
//! let x = terms.mk_var("X");
//! let r1 = terms.mk_register("r1");
//! let r2 = terms.mk_register("r2");
//!
//! // Rewrite every `[X]` into `[X + 4]`.
//! let pattern = terms.mk_memcell(x);
//! let four = terms.mk_const(4);
//! let replacement = terms.mk_memcell(terms.mk_binary(microslice::term::BinaryOp::Add, x, four));
//!
//! let target = terms.mk_eq(terms.mk_memcell(r1), r2);
//! let (result, changed) = terms.rewrite_pattern(pattern, &[x], replacement, target);
//! assert!(changed);
//! assert_eq!(terms.pretty(result), "([(%r1 + 4)] == %r2)");
//! ```

use std::collections::HashMap;

use log::trace;

use crate::reference::TermRef;
use crate::term::{TermNode, Terms};

/// Values bound to the free variables of a pattern.
pub type Bindings = HashMap<TermRef, TermRef>;

impl Terms {
    /// Match `pattern` against `t`, extending `bindings`.
    ///
    /// A free variable matches any term, but every occurrence of the same
    /// variable must match the same term. On failure `bindings` may hold
    /// partial results and should be discarded.
    pub fn match_pattern(&self, pattern: TermRef, free: &[TermRef], t: TermRef, bindings: &mut Bindings) -> bool {
        if free.contains(&pattern) {
            return match bindings.get(&pattern) {
                Some(&bound) => bound == t,
                None => {
                    bindings.insert(pattern, t);
                    true
                }
            };
        }
        if pattern == t {
            return true;
        }

        let p = self.node(pattern);
        let n = self.node(t);
        let same_head = match (&p, &n) {
            (TermNode::Unary(o1, _), TermNode::Unary(o2, _)) => o1 == o2,
            (TermNode::Binary(o1, _, _), TermNode::Binary(o2, _, _)) => o1 == o2,
            (TermNode::Quantified { exists: e1, .. }, TermNode::Quantified { exists: e2, .. }) => e1 == e2,
            (TermNode::MemCell(_), TermNode::MemCell(_))
            | (TermNode::Equality(_, _), TermNode::Equality(_, _))
            | (TermNode::Not(_), TermNode::Not(_))
            | (TermNode::And(_), TermNode::And(_))
            | (TermNode::Or(_), TermNode::Or(_))
            | (TermNode::Ite(_, _, _), TermNode::Ite(_, _, _)) => true,
            // Leaves only match themselves, which was checked above.
            _ => false,
        };
        if !same_head {
            return false;
        }

        let pc = p.children();
        let nc = n.children();
        pc.len() == nc.len()
            && pc
                .into_iter()
                .zip(nc)
                .all(|(pc, nc)| self.match_pattern(pc, free, nc, bindings))
    }

    /// Substitute bound variables in `t`.
    pub fn instantiate(&self, t: TermRef, bindings: &Bindings) -> TermRef {
        if bindings.is_empty() {
            return t;
        }
        if let Some(&value) = bindings.get(&t) {
            return value;
        }
        let children = self.children(t);
        if children.is_empty() {
            return t;
        }
        let new_children: Vec<TermRef> = children.iter().map(|&c| self.instantiate(c, bindings)).collect();
        if new_children == children {
            t
        } else {
            self.rebuild(t, &new_children)
        }
    }

    /// Replace, bottom-up, every match of `pattern` in `target` with the
    /// instantiated `replacement`.
    ///
    /// Subterms are rewritten before their parent is matched. A replacement
    /// is never matched again, so a replacement containing the pattern does
    /// not loop. Returns the new term and whether anything was replaced.
    pub fn rewrite_pattern(
        &self,
        pattern: TermRef,
        free: &[TermRef],
        replacement: TermRef,
        target: TermRef,
    ) -> (TermRef, bool) {
        let mut memo = HashMap::new();
        let mut changed = false;
        let result = self.rewrite_rec(pattern, free, replacement, target, &mut memo, &mut changed);
        trace!(
            "rewrite_pattern({} ~> {}) on {} => {}",
            self.pretty(pattern),
            self.pretty(replacement),
            self.pretty(target),
            self.pretty(result)
        );
        (result, changed)
    }

    fn rewrite_rec(
        &self,
        pattern: TermRef,
        free: &[TermRef],
        replacement: TermRef,
        t: TermRef,
        memo: &mut HashMap<TermRef, TermRef>,
        changed: &mut bool,
    ) -> TermRef {
        if let Some(&r) = memo.get(&t) {
            if r != t {
                *changed = true;
            }
            return r;
        }

        let children = self.children(t);
        let new_children: Vec<TermRef> = children
            .iter()
            .map(|&c| self.rewrite_rec(pattern, free, replacement, c, memo, changed))
            .collect();
        let rebuilt = if new_children == children {
            t
        } else {
            self.rebuild(t, &new_children)
        };

        let mut bindings = Bindings::new();
        let result = if self.match_pattern(pattern, free, rebuilt, &mut bindings) {
            *changed = true;
            self.instantiate(replacement, &bindings)
        } else {
            rebuilt
        };

        memo.insert(t, result);
        result
    }

    /// Replace every occurrence of `from` in `target` by `to`.
    pub fn replace(&self, target: TermRef, from: TermRef, to: TermRef) -> TermRef {
        self.rewrite_pattern(from, &[], to, target).0
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::term::BinaryOp;

    #[test]
    fn test_match_binds_consistently() {
        let terms = Terms::default();
        let x = terms.mk_var("X");
        let r1 = terms.mk_register("r1");
        let r2 = terms.mk_register("r2");

        let pattern = terms.mk_binary(BinaryOp::Add, x, x);

        let mut b = Bindings::new();
        assert!(terms.match_pattern(pattern, &[x], terms.mk_binary(BinaryOp::Add, r1, r1), &mut b));
        assert_eq!(b[&x], r1);

        let mut b = Bindings::new();
        assert!(!terms.match_pattern(pattern, &[x], terms.mk_binary(BinaryOp::Add, r1, r2), &mut b));

        let mut b = Bindings::new();
        assert!(!terms.match_pattern(pattern, &[x], terms.mk_binary(BinaryOp::Sub, r1, r1), &mut b));
    }

    #[test]
    fn test_non_free_variable_is_literal() {
        let terms = Terms::default();
        let x = terms.mk_var("X");
        let r1 = terms.mk_register("r1");
        let mut b = Bindings::new();
        assert!(!terms.match_pattern(x, &[], r1, &mut b));
        assert!(terms.match_pattern(x, &[], x, &mut b));
    }

    #[test]
    fn test_replace_is_not_reapplied() {
        let terms = Terms::default();
        let r1 = terms.mk_register("r1");
        let one = terms.mk_const(1);
        let inc = terms.mk_binary(BinaryOp::Add, r1, one);
        let target = terms.mk_memcell(r1);

        let result = terms.replace(target, r1, inc);
        assert_eq!(result, terms.mk_memcell(inc));
    }

    #[test]
    fn test_rewrite_reports_unchanged() {
        let terms = Terms::default();
        let r1 = terms.mk_register("r1");
        let r2 = terms.mk_register("r2");
        let target = terms.mk_eq(terms.elt(), r2);
        let (result, changed) = terms.rewrite_pattern(r1, &[], r2, target);
        assert!(!changed);
        assert_eq!(result, target);
    }

    #[test]
    fn test_rewrite_shared_subterm_marks_changed() {
        let terms = Terms::default();
        let r1 = terms.mk_register("r1");
        let r2 = terms.mk_register("r2");
        // r1 occurs twice; the second visit comes from the memo.
        let target = terms.mk_and2(terms.mk_eq(r1, r2), terms.mk_not(terms.mk_eq(r1, r2)));
        let (result, changed) = terms.rewrite_pattern(r1, &[], r2, target);
        assert!(changed);
        let eq = terms.mk_eq(r2, r2);
        assert_eq!(result, terms.mk_and2(eq, terms.mk_not(eq)));
    }
}
