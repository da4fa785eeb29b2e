//! # microslice: backward data dependencies and slicing for microcode
//!
//! **`microslice`** computes, for a set of observed storage locations at
//! given program points, which earlier assignments of a microcode program
//! may influence them. On top of this analysis it extracts program slices
//! and detects dead register assignments.
//!
//! ## Key Ideas
//!
//! - **Hash-consed terms**: expressions and formulas live in a [`Terms`][crate::term::Terms]
//!   manager and are referenced by lightweight [`TermRef`][crate::reference::TermRef] handles.
//!   Syntactic equality is handle equality.
//! - **Conditional sets**: a set of expressions is a formula over a distinguished
//!   element marker, so membership may depend on path conditions
//!   (see [`conditional_set`]).
//! - **Alias-aware rewriting**: a store to `[a]` rewrites every read `[x]` into a
//!   case split on `a == x` instead of guessing (see [`memref`]).
//! - **Worklist fixpoint**: contexts are propagated backward along the arrows of the
//!   program until they stabilize or a step bound is hit (see [`dependency`]).
//!
//! ## Basic Usage
//!
//! ```rust
//! use microslice::microcode::{Microcode, MicrocodeAddress};
//! use microslice::parser::parse_term;
//! use microslice::slicing::compute_slice;
//! use microslice::term::Terms;
//!
//! let terms = Terms::default();
//! let mut program = Microcode::new();
//! let p = |i| MicrocodeAddress::new(i, 0);
//!
//! // r1 := 5; r4 := 7; r2 := r1 + 1
//! let r1 = terms.mk_register("r1");
//! let r2 = terms.mk_register("r2");
//! let r4 = terms.mk_register("r4");
//! let e1 = program.add_assignment(&terms, p(0), p(1), r1, terms.mk_const(5), None).unwrap();
//! let e2 = program.add_assignment(&terms, p(1), p(2), r4, terms.mk_const(7), None).unwrap();
//! let e3 = program
//!     .add_assignment(&terms, p(2), p(3), r2, parse_term(&terms, "%r1 + 1").unwrap(), None)
//!     .unwrap();
//!
//! let slice = compute_slice(&terms, &program, p(3), r2);
//! assert_eq!(slice, vec![e1, e3]);
//! assert!(!slice.contains(&e2));
//! ```
//!
//! ## Core Components
//!
//! - **[`term`]**: the term manager, constructors and structural queries.
//! - **[`microcode`]**: the control-flow graph of program points and arrows.
//! - **[`dependency`]**: the backward transfer function and the fixpoint driver.
//! - **[`slicing`]**: slices and useless statements.

pub mod conditional_set;
pub mod dependency;
pub mod error;
pub mod memref;
pub mod microcode;
pub mod normalize;
pub mod parser;
pub mod reference;
pub mod rewrite;
pub mod slicing;
pub mod table;
pub mod term;
pub mod utils;

pub use error::{Error, Result};
