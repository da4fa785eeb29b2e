//! Conditional sets.
//!
//! A conditional set `S` of expressions is not a container but a formula
//! `φ(ELT)` over the distinguished marker [`Terms::elt`]: `e ∈ S` holds
//! exactly when `φ(e)` holds. Membership can therefore depend on path
//! conditions, e.g. `(c && ELT == %r1) || ELT == %r2` contains `%r1` only
//! when `c` holds.
//!
//! The *explicit* shape of a set is a disjunction of membership atoms
//! `ELT == e`. [`Terms::cs_flatten`] forces a set into that shape, trading
//! path conditions for a bounded size.
//!
//! ```
//! use microslice::term::Terms;
//!
//! let terms = Terms::default();
//! let r1 = terms.mk_register("r1");
//! let r2 = terms.mk_register("r2");
//!
//! let s = terms.cs_empty();
//! let s = terms.cs_add(s, r1);
//! let s = terms.cs_add(s, r2);
//! assert_eq!(terms.cs_possible_values(s), vec![r1, r2]);
//! ```

use crate::reference::TermRef;
use crate::term::{TermNode, Terms};

impl Terms {
    /// The empty set, `false`.
    pub fn cs_empty(&self) -> TermRef {
        self.mk_false()
    }

    /// The membership atom `ELT == e`.
    pub fn cs_member(&self, e: TermRef) -> TermRef {
        self.mk_eq(self.elt(), e)
    }

    /// `S ∪ {e}`, unconditionally.
    pub fn cs_add(&self, set: TermRef, e: TermRef) -> TermRef {
        self.mk_or2(set, self.cs_member(e))
    }

    /// `S ∪ other`, in place. Returns whether `set` changed.
    pub fn cs_union(&self, set: &mut TermRef, other: TermRef) -> bool {
        let merged = self.mk_or2(*set, other);
        if merged == *set {
            false
        } else {
            *set = merged;
            true
        }
    }

    /// If `t` is a membership atom `ELT == e`, return `e`.
    pub fn cs_member_value(&self, t: TermRef) -> Option<TermRef> {
        let elt = self.elt();
        self.with_node(t, |n| match *n {
            TermNode::Equality(a, e) if a == elt => Some(e),
            TermNode::Equality(e, a) if a == elt => Some(e),
            _ => None,
        })
    }

    /// The elements that may belong to `set`, in order of first occurrence.
    ///
    /// This is an upper bound: every membership atom found in positive
    /// position is collected, regardless of the conditions guarding it.
    /// Atoms under a negation are skipped since they exclude elements.
    pub fn cs_possible_values(&self, set: TermRef) -> Vec<TermRef> {
        let mut acc = Vec::new();
        self.collect_members(set, &mut acc);
        acc
    }

    fn collect_members(&self, t: TermRef, acc: &mut Vec<TermRef>) {
        if let Some(e) = self.cs_member_value(t) {
            if !acc.contains(&e) {
                acc.push(e);
            }
            return;
        }
        self.with_node(t, |n| match n {
            TermNode::And(xs) | TermNode::Or(xs) => {
                for &x in xs {
                    self.collect_members(x, acc);
                }
            }
            TermNode::Ite(_, a, b) => {
                self.collect_members(*a, acc);
                self.collect_members(*b, acc);
            }
            TermNode::Quantified { body, .. } => self.collect_members(*body, acc),
            _ => {}
        })
    }

    /// Whether `e` is among the possible values of `set`.
    pub fn cs_contains(&self, set: TermRef, e: TermRef) -> bool {
        self.cs_possible_values(set).contains(&e)
    }

    /// Drop every path condition: the disjunction of `ELT == e` over the
    /// possible values. Always a superset of `set`.
    pub fn cs_flatten(&self, set: TermRef) -> TermRef {
        let members: Vec<TermRef> = self
            .cs_possible_values(set)
            .into_iter()
            .map(|e| self.cs_member(e))
            .collect();
        self.mk_or(members)
    }
}
