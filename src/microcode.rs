//! Microcode control-flow graphs.
//!
//! A [`Microcode`] program is a graph of [`MicrocodeNode`]s (program points)
//! connected by [`StmtArrow`]s. Every arrow carries one [`Statement`] and an
//! optional guard, and leads either to a fixed address ([`Target::Static`])
//! or to an address computed at runtime ([`Target::Dynamic`]).
//!
//! Nodes and arrows live in two arenas owned by the program. A node lists
//! its outgoing arrows; the predecessor lists are a derived index, kept up
//! to date by the `add_*` methods and recomputable with
//! [`Microcode::rebuild_predecessors`].

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

use crate::error::{Error, Result};
use crate::reference::TermRef;
use crate::term::Terms;

/// Address of a program point: the address of the machine instruction and
/// the index of the micro-step within it.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MicrocodeAddress {
    pub global: u64,
    pub local: u32,
}

impl MicrocodeAddress {
    pub const fn new(global: u64, local: u32) -> Self {
        Self { global, local }
    }

    /// The next micro-step of the same instruction.
    pub const fn next_local(self) -> Self {
        Self::new(self.global, self.local + 1)
    }
}

impl From<u64> for MicrocodeAddress {
    fn from(global: u64) -> Self {
        Self::new(global, 0)
    }
}

impl fmt::Display for MicrocodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:x},{}]", self.global, self.local)
    }
}

/// A program point used as a map key by the analyses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramPoint(MicrocodeAddress);

impl ProgramPoint {
    pub const fn new(address: MicrocodeAddress) -> Self {
        Self(address)
    }

    pub const fn address(self) -> MicrocodeAddress {
        self.0
    }
}

impl From<MicrocodeAddress> for ProgramPoint {
    fn from(address: MicrocodeAddress) -> Self {
        Self(address)
    }
}

impl fmt::Display for ProgramPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl EdgeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Statement {
    /// `lval := rval`, where `lval` is a register or a memory cell.
    Assignment { lval: TermRef, rval: TermRef },
    Jump,
    Skip,
    /// Call to code outside of the program, identified by name.
    External(String),
}

impl Statement {
    pub fn is_assignment(&self) -> bool {
        matches!(self, Statement::Assignment { .. })
    }

    pub fn pretty(&self, terms: &Terms) -> String {
        match self {
            Statement::Assignment { lval, rval } => format!("{} := {}", terms.pretty(*lval), terms.pretty(*rval)),
            Statement::Jump => "jmp".to_string(),
            Statement::Skip => "skip".to_string(),
            Statement::External(name) => format!("external {}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Static(MicrocodeAddress),
    /// Target computed at runtime from an expression.
    Dynamic(TermRef),
}

/// An edge of the microcode graph.
#[derive(Debug, Clone)]
pub struct StmtArrow {
    src: MicrocodeAddress,
    target: Target,
    stmt: Statement,
    guard: Option<TermRef>,
    /// Concrete targets found for a dynamic arrow after the fact.
    solved_jumps: BTreeSet<MicrocodeAddress>,
}

impl StmtArrow {
    pub fn src(&self) -> MicrocodeAddress {
        self.src
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn stmt(&self) -> &Statement {
        &self.stmt
    }

    /// The guard of the arrow; `None` stands for `true`.
    pub fn guard(&self) -> Option<TermRef> {
        self.guard
    }

    pub fn is_static(&self) -> bool {
        matches!(self.target, Target::Static(_))
    }

    pub fn is_dynamic(&self) -> bool {
        !self.is_static()
    }

    pub fn solved_jumps(&self) -> &BTreeSet<MicrocodeAddress> {
        &self.solved_jumps
    }

    /// The concrete target address, if known.
    ///
    /// A dynamic arrow has one only when its target is a literal constant.
    pub fn extract_target(&self, terms: &Terms) -> Option<MicrocodeAddress> {
        match self.target {
            Target::Static(addr) => Some(addr),
            Target::Dynamic(t) => terms.constant_value(t).map(MicrocodeAddress::from),
        }
    }

    pub fn pretty(&self, terms: &Terms) -> String {
        let mut s = format!("{} ", self.src);
        if let Some(g) = self.guard {
            s.push_str(&format!("<<{}>> ", terms.pretty(g)));
        }
        s.push_str(&self.stmt.pretty(terms));
        match self.target {
            Target::Static(addr) => s.push_str(&format!(" --> {}", addr)),
            Target::Dynamic(t) => s.push_str(&format!(" --> @({})", terms.pretty(t))),
        }
        s
    }
}

/// Arrows are equal when they have the same source, guard, statement and
/// target. Solved-jump annotations are ignored.
impl PartialEq for StmtArrow {
    fn eq(&self, other: &Self) -> bool {
        self.src == other.src && self.guard == other.guard && self.stmt == other.stmt && self.target == other.target
    }
}

impl Eq for StmtArrow {}

#[derive(Debug, Clone)]
pub struct MicrocodeNode {
    loc: MicrocodeAddress,
    successors: Vec<EdgeId>,
    predecessors: Vec<EdgeId>,
}

impl MicrocodeNode {
    fn new(loc: MicrocodeAddress) -> Self {
        Self {
            loc,
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }

    pub fn loc(&self) -> MicrocodeAddress {
        self.loc
    }

    pub fn successors(&self) -> &[EdgeId] {
        &self.successors
    }

    pub fn predecessors(&self) -> &[EdgeId] {
        &self.predecessors
    }
}

#[derive(Debug, Clone, Default)]
pub struct Microcode {
    nodes: Vec<MicrocodeNode>,
    edges: Vec<StmtArrow>,
    index: HashMap<MicrocodeAddress, NodeId>,
    entry: Option<MicrocodeAddress>,
}

impl Microcode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the entry point: the one set explicitly, or else the
    /// first node created.
    pub fn entry(&self) -> Option<MicrocodeAddress> {
        self.entry.or_else(|| self.nodes.first().map(|n| n.loc))
    }

    pub fn set_entry(&mut self, entry: MicrocodeAddress) {
        self.add_node(entry);
        self.entry = Some(entry);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The node at `addr`, created if absent.
    pub fn add_node(&mut self, addr: MicrocodeAddress) -> NodeId {
        if let Some(&id) = self.index.get(&addr) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(MicrocodeNode::new(addr));
        self.index.insert(addr, id);
        id
    }

    pub fn has_node(&self, addr: MicrocodeAddress) -> bool {
        self.index.contains_key(&addr)
    }

    pub fn get_node(&self, addr: MicrocodeAddress) -> Result<&MicrocodeNode> {
        self.index
            .get(&addr)
            .map(|&id| &self.nodes[id.0])
            .ok_or(Error::UnknownNode(addr))
    }

    pub fn node(&self, id: NodeId) -> &MicrocodeNode {
        &self.nodes[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &StmtArrow {
        &self.edges[id.0]
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &MicrocodeNode> + '_ {
        self.nodes.iter()
    }

    /// Edges grouped by source node in creation order, then in successor order.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.nodes.iter().flat_map(|n| n.successors.iter().copied())
    }

    /// Arrows leading to `addr`. Empty for unknown addresses.
    pub fn predecessors(&self, addr: MicrocodeAddress) -> &[EdgeId] {
        match self.index.get(&addr) {
            Some(&id) => &self.nodes[id.0].predecessors,
            None => &[],
        }
    }

    fn add_edge(&mut self, arrow: StmtArrow) -> EdgeId {
        let src = self.add_node(arrow.src);
        if let Some(&existing) = self.nodes[src.0]
            .successors
            .iter()
            .find(|&&e| self.edges[e.0] == arrow)
        {
            return existing;
        }

        let id = EdgeId(self.edges.len());
        let target = match arrow.target {
            Target::Static(addr) => Some(addr),
            Target::Dynamic(_) => None,
        };
        self.edges.push(arrow);
        self.nodes[src.0].successors.push(id);
        if let Some(addr) = target {
            let tgt = self.add_node(addr);
            self.register_predecessor(tgt, id);
        }
        id
    }

    fn register_predecessor(&mut self, node: NodeId, edge: EdgeId) {
        let arrow = &self.edges[edge.0];
        let known = self.nodes[node.0]
            .predecessors
            .iter()
            .any(|&p| self.edges[p.0] == *arrow);
        if !known {
            self.nodes[node.0].predecessors.push(edge);
        }
    }

    /// Add an arrow `src --stmt--> tgt`. Adding an arrow equal to an
    /// existing one returns the existing arrow.
    pub fn add_static_successor(
        &mut self,
        src: MicrocodeAddress,
        tgt: MicrocodeAddress,
        stmt: Statement,
        guard: Option<TermRef>,
    ) -> EdgeId {
        self.add_edge(StmtArrow {
            src,
            target: Target::Static(tgt),
            stmt,
            guard,
            solved_jumps: BTreeSet::new(),
        })
    }

    /// Add an arrow whose target is computed from `target`.
    pub fn add_dynamic_successor(
        &mut self,
        src: MicrocodeAddress,
        target: TermRef,
        stmt: Statement,
        guard: Option<TermRef>,
    ) -> EdgeId {
        self.add_edge(StmtArrow {
            src,
            target: Target::Dynamic(target),
            stmt,
            guard,
            solved_jumps: BTreeSet::new(),
        })
    }

    /// Add the arrow `src --(lval := rval)--> tgt`.
    pub fn add_assignment(
        &mut self,
        terms: &Terms,
        src: MicrocodeAddress,
        tgt: MicrocodeAddress,
        lval: TermRef,
        rval: TermRef,
        guard: Option<TermRef>,
    ) -> Result<EdgeId> {
        if !terms.is_lvalue(lval) {
            return Err(Error::NotAnLvalue(terms.pretty(lval)));
        }
        Ok(self.add_static_successor(src, tgt, Statement::Assignment { lval, rval }, guard))
    }

    pub fn add_skip(&mut self, src: MicrocodeAddress, tgt: MicrocodeAddress, guard: Option<TermRef>) -> EdgeId {
        self.add_static_successor(src, tgt, Statement::Skip, guard)
    }

    /// Record `tgt` as a concrete target of the dynamic arrow `edge`, and
    /// register the arrow as a predecessor of `tgt`.
    ///
    /// Returns `false` if the target was already known.
    ///
    /// # Panics
    ///
    /// Panics if `edge` is a static arrow.
    pub fn add_solved_jump(&mut self, edge: EdgeId, tgt: MicrocodeAddress) -> bool {
        assert!(self.edges[edge.0].is_dynamic(), "Solved jumps only apply to dynamic arrows");
        if !self.edges[edge.0].solved_jumps.insert(tgt) {
            return false;
        }
        let node = self.add_node(tgt);
        self.register_predecessor(node, edge);
        true
    }

    /// Recompute every predecessor list from the successor lists and the
    /// solved jumps.
    pub fn rebuild_predecessors(&mut self) {
        for node in self.nodes.iter_mut() {
            node.predecessors.clear();
        }
        let mut links = Vec::new();
        for node in &self.nodes {
            for &e in &node.successors {
                let arrow = &self.edges[e.0];
                match arrow.target {
                    Target::Static(addr) => links.push((addr, e)),
                    Target::Dynamic(_) => links.extend(arrow.solved_jumps.iter().map(|&addr| (addr, e))),
                }
            }
        }
        for (addr, e) in links {
            let node = self.add_node(addr);
            self.register_predecessor(node, e);
        }
    }

    /// The first micro-steps (local index 0) of the same instruction from
    /// which `addr` is reachable through arrows internal to that instruction.
    pub fn global_parents(&self, addr: MicrocodeAddress) -> Vec<MicrocodeAddress> {
        let mut result = Vec::new();
        let mut done = BTreeSet::from([addr]);
        let mut todo = VecDeque::from([addr]);

        while let Some(current) = todo.pop_front() {
            for &e in self.predecessors(current) {
                let src = self.edges[e.0].src;
                if src.global != addr.global {
                    continue;
                }
                if src.local == 0 && !result.contains(&src) {
                    result.push(src);
                }
                if done.insert(src) {
                    todo.push_back(src);
                }
            }
        }

        result
    }

    pub fn pretty(&self, terms: &Terms) -> String {
        let mut s = String::new();
        for node in &self.nodes {
            if node.successors.is_empty() {
                s.push_str(&format!("{}\n", node.loc));
            }
            for &e in &node.successors {
                s.push_str(&self.edges[e.0].pretty(terms));
                s.push('\n');
            }
        }
        s
    }
}
