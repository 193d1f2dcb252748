// liveness.rs — Backward live-variable analysis over statement graphs.
//
// Seeds every statement with `use`/`defs` sets, then iterates
//
//   out(n) = ∪ inp(s) for s in succ(n)
//   inp(n) = use(n) ∪ (out(n) - defs(n))
//
// to a fixed point, visiting each definition's statements in reverse
// preorder. Sets only ever grow; a shrinking set means a transfer
// function bug, and the fixed point asserts on it rather than looping
// forever.
//
// Identity is name-based: two occurrences of `x` are the same variable
// regardless of which symbol resolution produced them. Each set entry
// keeps the symbol of the first occurrence so later passes can consult
// scope and type.
//
// Preconditions: control-flow side tables built for every definition.
// Postconditions: inp/out populated for every statement in visit order.
// Failure modes: panics if the fixed point loses elements.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::ast::{Elem, Expr, Name, Program, StmtArena, StmtId, StmtKind, SymId};
use crate::cfg::{Cfg, CfgTable};

// ── Variable sets ──

/// An insertion-ordered set of variables, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarSet {
    items: IndexMap<String, SymId>,
}

impl VarSet {
    pub fn new() -> Self {
        VarSet::default()
    }

    /// Insert an occurrence. Returns true if the name was new.
    pub fn insert(&mut self, name: &Name) -> bool {
        if self.items.contains_key(&name.name) {
            false
        } else {
            self.items.insert(name.name.clone(), name.sym);
            true
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn sym(&self, name: &str) -> Option<SymId> {
        self.items.get(name).copied()
    }

    /// Union in another set. Returns true if anything was added.
    pub fn union_with(&mut self, other: &VarSet) -> bool {
        let before = self.items.len();
        for (name, sym) in &other.items {
            self.items.entry(name.clone()).or_insert(*sym);
        }
        self.items.len() != before
    }

    pub fn intersect(&self, other: &VarSet) -> VarSet {
        let items = self
            .items
            .iter()
            .filter(|(name, _)| other.contains(name))
            .map(|(n, s)| (n.clone(), *s))
            .collect();
        VarSet { items }
    }

    pub fn minus(&self, other: &VarSet) -> VarSet {
        let items = self
            .items
            .iter()
            .filter(|(name, _)| !other.contains(name))
            .map(|(n, s)| (n.clone(), *s))
            .collect();
        VarSet { items }
    }

    pub fn remove(&mut self, name: &str) {
        self.items.shift_remove(name);
    }

    pub fn is_superset_of(&self, other: &VarSet) -> bool {
        other.items.keys().all(|k| self.items.contains_key(k))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SymId)> {
        self.items.iter().map(|(n, s)| (n.as_str(), *s))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }
}

impl FromIterator<(String, SymId)> for VarSet {
    fn from_iter<T: IntoIterator<Item = (String, SymId)>>(iter: T) -> Self {
        VarSet {
            items: iter.into_iter().collect(),
        }
    }
}

// ── use/defs seeds ──

fn expr_vars(expr: &Expr, set: &mut VarSet) {
    match expr {
        Expr::Single(elem) | Expr::Unary { elem, .. } => elem_vars(elem, set),
        Expr::Binop { lhs, rhs, .. } => {
            elem_vars(lhs, set);
            expr_vars(rhs, set);
        }
    }
}

fn elem_vars(elem: &Elem, set: &mut VarSet) {
    match elem {
        Elem::Id(name) => {
            set.insert(name);
        }
        Elem::Sub { name, index } => {
            set.insert(name);
            expr_vars(index, set);
        }
        Elem::Slice { name, base, count } => {
            set.insert(name);
            expr_vars(base, set);
            expr_vars(count, set);
        }
        Elem::Group(inner) => expr_vars(inner, set),
        Elem::Fcall { args, .. } => {
            for a in args {
                expr_vars(a, set);
            }
        }
        Elem::Num(_) | Elem::Bool(_) => {}
    }
}

/// Variables occurring in an element's subscript positions, excluding
/// the base name itself.
fn elem_index_vars(elem: &Elem, set: &mut VarSet) {
    match elem {
        Elem::Sub { index, .. } => expr_vars(index, set),
        Elem::Slice { base, count, .. } => {
            expr_vars(base, set);
            expr_vars(count, set);
        }
        _ => {}
    }
}

/// Variables a statement reads before executing its successors.
pub fn uses(kind: &StmtKind) -> VarSet {
    let mut set = VarSet::new();
    match kind {
        StmtKind::Skip | StmtKind::Seq(_) | StmtKind::Par(_) => {}
        StmtKind::Rep { indices, .. } => {
            for ix in indices {
                expr_vars(&ix.base, &mut set);
                expr_vars(&ix.count, &mut set);
            }
        }
        StmtKind::For { index, .. } => {
            expr_vars(&index.base, &mut set);
            expr_vars(&index.count, &mut set);
        }
        StmtKind::On { target, .. } => expr_vars(target, &mut set),
        StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => expr_vars(cond, &mut set),
        StmtKind::Call { args, .. } => {
            for a in args {
                expr_vars(a, &mut set);
            }
        }
        StmtKind::Ass { dst, src } => {
            elem_index_vars(dst, &mut set);
            expr_vars(src, &mut set);
        }
        StmtKind::In { chan, dst } => {
            elem_vars(chan, &mut set);
            elem_index_vars(dst, &mut set);
        }
        StmtKind::Out { chan, src } => {
            elem_vars(chan, &mut set);
            expr_vars(src, &mut set);
        }
        StmtKind::Alias { slice, .. } => elem_vars(slice, &mut set),
        StmtKind::Connect { chanend, target } => {
            elem_vars(chanend, &mut set);
            if let Some(t) = target {
                expr_vars(t, &mut set);
            }
        }
        StmtKind::Return { expr } => expr_vars(expr, &mut set),
    }
    set
}

/// Variables a statement writes.
pub fn defs(kind: &StmtKind) -> VarSet {
    let mut set = VarSet::new();
    match kind {
        StmtKind::Rep { indices, .. } => {
            for ix in indices {
                set.insert(&Name::new(ix.name.clone(), ix.sym));
            }
        }
        StmtKind::For { index, .. } => {
            set.insert(&Name::new(index.name.clone(), index.sym));
        }
        StmtKind::Ass { dst, .. } | StmtKind::In { dst, .. } => {
            if let Some(name) = dst.base_name() {
                set.insert(name);
            }
        }
        StmtKind::Alias { dst, .. } => {
            set.insert(dst);
        }
        _ => {}
    }
    set
}

/// Every variable occurring anywhere in a subtree, reads and writes
/// alike. Intersected with the live boundary (`inp` plus region
/// live-out) this gives the capture context when a subtree is
/// materialized into a process definition.
pub fn allvars(arena: &StmtArena, root: StmtId) -> VarSet {
    let mut set = VarSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        set.union_with(&uses(&arena[id].kind));
        set.union_with(&defs(&arena[id].kind));
        let mut children = arena.children(id);
        children.reverse();
        stack.extend(children);
    }
    set
}

// ── Fixed point ──

/// Live-variable facts for every statement of every definition.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    pub use_sets: HashMap<StmtId, VarSet>,
    pub def_sets: HashMap<StmtId, VarSet>,
    pub inp: HashMap<StmtId, VarSet>,
    pub out: HashMap<StmtId, VarSet>,
}

impl Liveness {
    pub fn compute(program: &Program, cfgs: &CfgTable) -> Liveness {
        let mut lv = Liveness::default();
        for (name, cfg) in &cfgs.defs {
            let _span = tracing::debug_span!("liveness", def = %name).entered();
            lv.run_def(&program.arena, cfg);
        }
        lv
    }

    fn run_def(&mut self, arena: &StmtArena, cfg: &Cfg) {
        for &id in &cfg.order {
            self.use_sets.insert(id, uses(&arena[id].kind));
            self.def_sets.insert(id, defs(&arena[id].kind));
            self.inp.insert(id, VarSet::new());
            self.out.insert(id, VarSet::new());
        }

        let mut rounds = 0usize;
        loop {
            let mut changed = false;
            for &id in cfg.order.iter().rev() {
                let mut new_out = VarSet::new();
                for edge in cfg.succs_of(id) {
                    new_out.union_with(&self.inp[&edge.to]);
                }
                let mut new_inp = self.use_sets[&id].clone();
                new_inp.union_with(&new_out.minus(&self.def_sets[&id]));

                assert!(
                    new_inp.is_superset_of(&self.inp[&id])
                        && new_out.is_superset_of(&self.out[&id]),
                    "live sets shrank at {}; transfer function is not monotone",
                    id
                );

                if new_inp != self.inp[&id] || new_out != self.out[&id] {
                    changed = true;
                    self.inp.insert(id, new_inp);
                    self.out.insert(id, new_out);
                }
            }
            rounds += 1;
            if !changed {
                break;
            }
        }
        tracing::debug!(rounds, statements = cfg.order.len(), "fixed point");
    }

    pub fn live_in(&self, id: StmtId) -> &VarSet {
        &self.inp[&id]
    }

    /// Variables live on the forward exits of a statement subtree: the
    /// union of `inp` over edges that leave the subtree, back edges
    /// excluded so a loop-carried variable does not count. For a
    /// statement lifted into its own definition this is the set whose
    /// writes must escape by reference.
    pub fn live_out(&self, arena: &StmtArena, cfg: &Cfg, root: StmtId) -> VarSet {
        let mut region = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            region.insert(id);
            stack.extend(arena.children(id));
        }

        let mut set = VarSet::new();
        for &id in &region {
            for edge in cfg.succs_of(id) {
                if !edge.back && !region.contains(&edge.to) {
                    set.union_with(&self.inp[&edge.to]);
                }
            }
        }
        set
    }
}
