//! Terms: expressions and formulas over microcode values.
//!
//! Expressions and formulas share a single hash-consed arena owned by the
//! [`Terms`] manager. A [`TermRef`] is a cheap copyable handle; the manager
//! never frees terms, so handles stay valid as long as the manager lives.
//!
//! Because construction always goes through the unique table, two terms are
//! syntactically equal exactly when their handles are equal. There is no
//! decision procedure: "equal" always means syntactically equal.
//!
//! # Examples
//!
//! ```
//! use microslice::term::{BinaryOp, Terms};
//!
//! let terms = Terms::default();
//! let r1 = terms.mk_register("r1");
//! let one = terms.mk_const(1);
//! let e = terms.mk_binary(BinaryOp::Add, r1, one);
//!
//! // Hash-consing: the same structure gives the same handle.
//! assert_eq!(e, terms.mk_binary(BinaryOp::Add, r1, one));
//! assert!(terms.contains(e, r1));
//! assert_eq!(terms.pretty(e), "(%r1 + 1)");
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

use crate::reference::TermRef;
use crate::table::Table;
use crate::utils::{pairing2, pairing3, pairing_seq, MyHash};

/// Interned name of a variable or register.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Symbol(u32);

impl Symbol {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UnaryOp {
    /// Two's complement negation.
    Neg,
    /// Bitwise complement.
    Not,
}

impl UnaryOp {
    pub fn eval(self, a: u64) -> u64 {
        match self {
            UnaryOp::Neg => a.wrapping_neg(),
            UnaryOp::Not => !a,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "~",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    UDiv,
    UMod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    /// Unsigned `<`, yields 0 or 1.
    LtU,
    /// Unsigned `<=`, yields 0 or 1.
    LeU,
    /// Signed `<`, yields 0 or 1.
    LtS,
    /// Signed `<=`, yields 0 or 1.
    LeS,
}

impl BinaryOp {
    /// Fold the operator over two constants.
    ///
    /// Returns `None` when the result is undefined (division by zero).
    pub fn eval(self, a: u64, b: u64) -> Option<u64> {
        let r = match self {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::UDiv => a.checked_div(b)?,
            BinaryOp::UMod => a.checked_rem(b)?,
            BinaryOp::And => a & b,
            BinaryOp::Or => a | b,
            BinaryOp::Xor => a ^ b,
            BinaryOp::Shl => a.checked_shl(b as u32).unwrap_or(0),
            BinaryOp::Shr => a.checked_shr(b as u32).unwrap_or(0),
            BinaryOp::LtU => (a < b) as u64,
            BinaryOp::LeU => (a <= b) as u64,
            BinaryOp::LtS => ((a as i64) < (b as i64)) as u64,
            BinaryOp::LeS => ((a as i64) <= (b as i64)) as u64,
        };
        Some(r)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::UDiv => "/",
            BinaryOp::UMod => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::LtU => "<u",
            BinaryOp::LeU => "<=u",
            BinaryOp::LtS => "<s",
            BinaryOp::LeS => "<=s",
        }
    }

    fn tag(self) -> u64 {
        self as u64
    }
}

/// A node of the term arena.
///
/// The first six variants are expressions, the remaining ones formulas.
/// Expressions may appear wherever a formula is expected and then stand for
/// "the value is non-zero".
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TermNode {
    Constant(u64),
    Variable(Symbol),
    /// Register cell: bits `offset..offset+size` of a register, `size == 0`
    /// meaning the whole register.
    Register {
        name: Symbol,
        offset: u16,
        size: u16,
    },
    MemCell(TermRef),
    Unary(UnaryOp, TermRef),
    Binary(BinaryOp, TermRef, TermRef),

    Bool(bool),
    Equality(TermRef, TermRef),
    Not(TermRef),
    And(Vec<TermRef>),
    Or(Vec<TermRef>),
    Quantified {
        exists: bool,
        var: TermRef,
        body: TermRef,
    },
    Ite(TermRef, TermRef, TermRef),
}

impl Default for TermNode {
    fn default() -> Self {
        TermNode::Bool(false)
    }
}

impl TermNode {
    pub fn is_expr(&self) -> bool {
        matches!(
            self,
            TermNode::Constant(_)
                | TermNode::Variable(_)
                | TermNode::Register { .. }
                | TermNode::MemCell(_)
                | TermNode::Unary(..)
                | TermNode::Binary(..)
        )
    }

    pub fn is_lvalue(&self) -> bool {
        matches!(self, TermNode::Register { .. } | TermNode::MemCell(_))
    }

    /// Direct subterms, in a fixed order.
    pub fn children(&self) -> Vec<TermRef> {
        match self {
            TermNode::Constant(_) | TermNode::Variable(_) | TermNode::Register { .. } | TermNode::Bool(_) => vec![],
            TermNode::MemCell(a) | TermNode::Unary(_, a) | TermNode::Not(a) => vec![*a],
            TermNode::Binary(_, a, b) | TermNode::Equality(a, b) => vec![*a, *b],
            TermNode::And(xs) | TermNode::Or(xs) => xs.clone(),
            TermNode::Quantified { var, body, .. } => vec![*var, *body],
            TermNode::Ite(c, t, e) => vec![*c, *t, *e],
        }
    }
}

impl MyHash for TermNode {
    fn hash(&self) -> u64 {
        match self {
            TermNode::Constant(c) => pairing2(1, *c),
            TermNode::Variable(s) => pairing2(2, s.0 as u64),
            TermNode::Register { name, offset, size } => pairing_seq(3, [name.0 as u64, *offset as u64, *size as u64]),
            TermNode::MemCell(a) => pairing2(4, a.get() as u64),
            TermNode::Unary(op, a) => pairing3(5, *op as u64, a.get() as u64),
            TermNode::Binary(op, a, b) => pairing_seq(6, [op.tag(), a.get() as u64, b.get() as u64]),
            TermNode::Bool(b) => pairing2(7, *b as u64),
            TermNode::Equality(a, b) => pairing3(8, a.get() as u64, b.get() as u64),
            TermNode::Not(a) => pairing2(9, a.get() as u64),
            TermNode::And(xs) => pairing_seq(10, xs.iter().map(|x| x.get() as u64)),
            TermNode::Or(xs) => pairing_seq(11, xs.iter().map(|x| x.get() as u64)),
            TermNode::Quantified { exists, var, body } => {
                pairing_seq(12, [*exists as u64, var.get() as u64, body.get() as u64])
            }
            TermNode::Ite(c, t, e) => pairing_seq(13, [c.get() as u64, t.get() as u64, e.get() as u64]),
        }
    }
}

#[derive(Default)]
struct SymbolTable {
    names: Vec<String>,
    index: HashMap<String, Symbol>,
}

impl SymbolTable {
    fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&s) = self.index.get(name) {
            return s;
        }
        let s = Symbol(self.names.len() as u32);
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), s);
        s
    }
}

/// The term manager.
pub struct Terms {
    table: RefCell<Table<TermNode>>,
    symbols: RefCell<SymbolTable>,
    fresh: Cell<u32>,
    elt: TermRef,
    tt: TermRef,
    ff: TermRef,
}

impl Terms {
    pub fn new(bits: usize) -> Self {
        let mut table = Table::new(bits);
        let mut symbols = SymbolTable::default();

        let ff = TermRef::new(table.put(TermNode::Bool(false)) as u32);
        let tt = TermRef::new(table.put(TermNode::Bool(true)) as u32);
        // '#' cannot appear in parsed identifiers, so the marker is never captured.
        let elt = TermRef::new(table.put(TermNode::Variable(symbols.intern("ELT#"))) as u32);

        Self {
            table: RefCell::new(table),
            symbols: RefCell::new(symbols),
            fresh: Cell::new(0),
            elt,
            tt,
            ff,
        }
    }
}

impl Default for Terms {
    fn default() -> Self {
        Terms::new(16)
    }
}

impl fmt::Debug for Terms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Terms")
            .field("size", &self.table.borrow().size())
            .field("symbols", &self.symbols.borrow().names.len())
            .finish()
    }
}

impl Terms {
    /// Number of distinct terms built so far.
    pub fn size(&self) -> usize {
        self.table.borrow().size()
    }

    /// A copy of the node behind `t`. Prefer [`Terms::with_node`] for queries.
    pub fn node(&self, t: TermRef) -> TermNode {
        self.with_node(t, TermNode::clone)
    }

    /// Apply `f` to the node behind `t` without copying it.
    ///
    /// `f` must not build terms: the arena stays borrowed while it runs.
    pub fn with_node<R>(&self, t: TermRef, f: impl FnOnce(&TermNode) -> R) -> R {
        f(&self.table.borrow()[t.index()])
    }

    pub fn intern(&self, name: &str) -> Symbol {
        self.symbols.borrow_mut().intern(name)
    }

    pub fn symbol_name(&self, s: Symbol) -> String {
        self.symbols.borrow().names[s.0 as usize].clone()
    }

    fn mk(&self, node: TermNode) -> TermRef {
        TermRef::new(self.table.borrow_mut().put(node) as u32)
    }

    /// The distinguished element marker of conditional sets.
    pub fn elt(&self) -> TermRef {
        self.elt
    }

    pub fn mk_true(&self) -> TermRef {
        self.tt
    }
    pub fn mk_false(&self) -> TermRef {
        self.ff
    }
    pub fn mk_bool(&self, b: bool) -> TermRef {
        if b {
            self.tt
        } else {
            self.ff
        }
    }
    pub fn is_true(&self, t: TermRef) -> bool {
        t == self.tt
    }
    pub fn is_false(&self, t: TermRef) -> bool {
        t == self.ff
    }

    pub fn mk_const(&self, value: u64) -> TermRef {
        self.mk(TermNode::Constant(value))
    }

    pub fn mk_var(&self, name: &str) -> TermRef {
        let s = self.intern(name);
        self.mk(TermNode::Variable(s))
    }

    /// Create a variable that no other call (and no parsed text) can produce.
    pub fn fresh_var(&self, prefix: &str) -> TermRef {
        let n = self.fresh.get();
        self.fresh.set(n + 1);
        self.mk_var(&format!("{}#{}", prefix, n))
    }

    pub fn mk_register(&self, name: &str) -> TermRef {
        self.mk_register_slice(name, 0, 0)
    }

    pub fn mk_register_slice(&self, name: &str, offset: u16, size: u16) -> TermRef {
        let name = self.intern(name);
        self.mk(TermNode::Register { name, offset, size })
    }

    pub fn mk_memcell(&self, addr: TermRef) -> TermRef {
        self.mk(TermNode::MemCell(addr))
    }

    pub fn mk_unary(&self, op: UnaryOp, a: TermRef) -> TermRef {
        self.mk(TermNode::Unary(op, a))
    }

    pub fn mk_binary(&self, op: BinaryOp, a: TermRef, b: TermRef) -> TermRef {
        self.mk(TermNode::Binary(op, a, b))
    }

    pub fn mk_eq(&self, a: TermRef, b: TermRef) -> TermRef {
        self.mk(TermNode::Equality(a, b))
    }

    /// Read a term in formula position: constant expressions become booleans.
    pub fn as_formula(&self, t: TermRef) -> TermRef {
        match self.constant_value(t) {
            Some(c) => self.mk_bool(c != 0),
            None => t,
        }
    }

    pub fn mk_not(&self, a: TermRef) -> TermRef {
        let a = self.as_formula(a);
        match self.node(a) {
            TermNode::Bool(b) => self.mk_bool(!b),
            TermNode::Not(inner) => inner,
            _ => self.mk(TermNode::Not(a)),
        }
    }

    /// N-ary conjunction, flattened and deduplicated.
    pub fn mk_and(&self, operands: impl IntoIterator<Item = TermRef>) -> TermRef {
        let mut clauses = Vec::new();
        for x in operands {
            let x = self.as_formula(x);
            match self.node(x) {
                TermNode::Bool(true) => {}
                TermNode::Bool(false) => return self.ff,
                TermNode::And(xs) => {
                    for y in xs {
                        if !clauses.contains(&y) {
                            clauses.push(y);
                        }
                    }
                }
                _ => {
                    if !clauses.contains(&x) {
                        clauses.push(x);
                    }
                }
            }
        }
        match clauses.len() {
            0 => self.tt,
            1 => clauses[0],
            _ => self.mk(TermNode::And(clauses)),
        }
    }

    /// N-ary disjunction, flattened and deduplicated.
    pub fn mk_or(&self, operands: impl IntoIterator<Item = TermRef>) -> TermRef {
        let mut clauses = Vec::new();
        for x in operands {
            let x = self.as_formula(x);
            match self.node(x) {
                TermNode::Bool(false) => {}
                TermNode::Bool(true) => return self.tt,
                TermNode::Or(xs) => {
                    for y in xs {
                        if !clauses.contains(&y) {
                            clauses.push(y);
                        }
                    }
                }
                _ => {
                    if !clauses.contains(&x) {
                        clauses.push(x);
                    }
                }
            }
        }
        match clauses.len() {
            0 => self.ff,
            1 => clauses[0],
            _ => self.mk(TermNode::Or(clauses)),
        }
    }

    pub fn mk_and2(&self, a: TermRef, b: TermRef) -> TermRef {
        self.mk_and([a, b])
    }

    pub fn mk_or2(&self, a: TermRef, b: TermRef) -> TermRef {
        self.mk_or([a, b])
    }

    pub fn mk_exists(&self, var: TermRef, body: TermRef) -> TermRef {
        assert!(self.is_variable(var), "Quantified term must be a variable");
        self.mk(TermNode::Quantified { exists: true, var, body })
    }

    pub fn mk_forall(&self, var: TermRef, body: TermRef) -> TermRef {
        assert!(self.is_variable(var), "Quantified term must be a variable");
        self.mk(TermNode::Quantified { exists: false, var, body })
    }

    pub fn mk_ite(&self, cond: TermRef, then: TermRef, other: TermRef) -> TermRef {
        self.mk(TermNode::Ite(cond, then, other))
    }
}

impl Terms {
    pub fn is_lvalue(&self, t: TermRef) -> bool {
        self.with_node(t, TermNode::is_lvalue)
    }

    pub fn is_register(&self, t: TermRef) -> bool {
        self.with_node(t, |n| matches!(n, TermNode::Register { .. }))
    }

    pub fn is_variable(&self, t: TermRef) -> bool {
        self.with_node(t, |n| matches!(n, TermNode::Variable(_)))
    }

    pub fn is_memcell(&self, t: TermRef) -> bool {
        self.with_node(t, |n| matches!(n, TermNode::MemCell(_)))
    }

    pub fn is_constant(&self, t: TermRef) -> bool {
        self.with_node(t, |n| matches!(n, TermNode::Constant(_)))
    }

    pub fn constant_value(&self, t: TermRef) -> Option<u64> {
        self.with_node(t, |n| match *n {
            TermNode::Constant(c) => Some(c),
            _ => None,
        })
    }

    pub fn memcell_addr(&self, t: TermRef) -> Option<TermRef> {
        self.with_node(t, |n| match *n {
            TermNode::MemCell(a) => Some(a),
            _ => None,
        })
    }

    pub fn children(&self, t: TermRef) -> Vec<TermRef> {
        self.with_node(t, TermNode::children)
    }

    fn register_cell(&self, t: TermRef) -> Option<(Symbol, u16, u16)> {
        self.with_node(t, |n| match *n {
            TermNode::Register { name, offset, size } => Some((name, offset, size)),
            _ => None,
        })
    }

    /// Rebuild `t` with new direct subterms (same arity and order as [`Terms::children`]).
    ///
    /// Formula connectives go through the smart constructors, so the result
    /// may be simpler than a plain copy.
    pub fn rebuild(&self, t: TermRef, children: &[TermRef]) -> TermRef {
        let node = self.node(t);
        match node {
            TermNode::Constant(_) | TermNode::Variable(_) | TermNode::Register { .. } | TermNode::Bool(_) => t,
            TermNode::MemCell(_) => self.mk_memcell(children[0]),
            TermNode::Unary(op, _) => self.mk_unary(op, children[0]),
            TermNode::Binary(op, _, _) => self.mk_binary(op, children[0], children[1]),
            TermNode::Equality(_, _) => self.mk_eq(children[0], children[1]),
            TermNode::Not(_) => self.mk_not(children[0]),
            TermNode::And(_) => self.mk_and(children.iter().copied()),
            TermNode::Or(_) => self.mk_or(children.iter().copied()),
            TermNode::Quantified { exists, .. } => self.mk(TermNode::Quantified {
                exists,
                var: children[0],
                body: children[1],
            }),
            TermNode::Ite(_, _, _) => self.mk_ite(children[0], children[1], children[2]),
        }
    }

    /// Whether `sub` occurs syntactically in `t` (including `t == sub`).
    pub fn contains(&self, t: TermRef, sub: TermRef) -> bool {
        if t == sub {
            return true;
        }
        self.children(t).into_iter().any(|c| self.contains(c, sub))
    }

    /// All lvalue subterms of `t`, outermost first, deduplicated.
    pub fn lvalues(&self, t: TermRef) -> Vec<TermRef> {
        fn go(terms: &Terms, t: TermRef, acc: &mut Vec<TermRef>) {
            if terms.is_lvalue(t) && !acc.contains(&t) {
                acc.push(t);
            }
            for c in terms.children(t) {
                go(terms, c, acc);
            }
        }
        let mut acc = Vec::new();
        go(self, t, &mut acc);
        acc
    }

    /// Whether two register cells share storage.
    pub fn registers_overlap(&self, a: TermRef, b: TermRef) -> bool {
        match (self.register_cell(a), self.register_cell(b)) {
            (Some((n1, o1, s1)), Some((n2, o2, s2))) => {
                if n1 != n2 {
                    return false;
                }
                if s1 == 0 || s2 == 0 {
                    return true;
                }
                let (o1, o2) = (o1 as u32, o2 as u32);
                o1 < o2 + s2 as u32 && o2 < o1 + s1 as u32
            }
            _ => false,
        }
    }

    /// Whether evaluating `t` reads any part of register `reg`.
    pub fn reads_register(&self, t: TermRef, reg: TermRef) -> bool {
        if self.registers_overlap(t, reg) {
            return true;
        }
        self.children(t).into_iter().any(|c| self.reads_register(c, reg))
    }
}

impl Terms {
    /// Render a term in the syntax accepted by [`parse_term`][crate::parser::parse_term].
    pub fn pretty(&self, t: TermRef) -> String {
        match self.node(t) {
            TermNode::Constant(c) => {
                if c < 10 {
                    format!("{}", c)
                } else {
                    format!("0x{:x}", c)
                }
            }
            TermNode::Variable(s) => self.symbol_name(s),
            TermNode::Register { name, offset, size } => {
                if size == 0 {
                    format!("%{}", self.symbol_name(name))
                } else {
                    format!("%{}{{{};{}}}", self.symbol_name(name), offset, size)
                }
            }
            TermNode::MemCell(a) => format!("[{}]", self.pretty(a)),
            TermNode::Unary(op, a) => format!("{}{}", op.symbol(), self.pretty(a)),
            TermNode::Binary(op, a, b) => format!("({} {} {})", self.pretty(a), op.symbol(), self.pretty(b)),
            TermNode::Bool(b) => format!("{}", b),
            TermNode::Equality(a, b) => format!("({} == {})", self.pretty(a), self.pretty(b)),
            TermNode::Not(a) => match self.node(a) {
                TermNode::Equality(x, y) => format!("({} != {})", self.pretty(x), self.pretty(y)),
                _ => format!("!{}", self.pretty(a)),
            },
            TermNode::And(xs) => self.pretty_nary(&xs, " && "),
            TermNode::Or(xs) => self.pretty_nary(&xs, " || "),
            TermNode::Quantified { exists, var, body } => format!(
                "({} {}. {})",
                if exists { "exists" } else { "forall" },
                self.pretty(var),
                self.pretty(body)
            ),
            TermNode::Ite(c, a, b) => format!(
                "(if {} then {} else {})",
                self.pretty(c),
                self.pretty(a),
                self.pretty(b)
            ),
        }
    }

    fn pretty_nary(&self, xs: &[TermRef], sep: &str) -> String {
        let parts: Vec<String> = xs.iter().map(|&x| self.pretty(x)).collect();
        format!("({})", parts.join(sep))
    }
}
