// chans.rs — Channel-use expansion and the per-definition topology.
//
// Builds, for every definition, the table that later passes read to
// form connections: which channel elements are used, from which cores,
// and through which chanend each side will talk.
//
// A channel *use* is a textual occurrence (`c` or `c[e]`) at an input,
// output, or call argument. Uses bubble up the statement tree to the
// nearest *boundary* (replicator, `on`, `par` branch, or the definition
// body) and are expanded there: the boundary's location expression and
// the use's subscript are evaluated at every index tuple of the
// enclosing replicators, yielding one element per concrete (index,
// core) pair. The first boundary to reach a channel element becomes its
// master end; the second its slave.
//
// Only channels declared in the definition itself are expanded here.
// Channel formals are the caller's responsibility: the caller sees the
// declaration, so the use is recorded at the call site.
//
// Preconditions: replicator bounds folded and every statement labelled
//   with a location.
// Postconditions: a `Topology` with one `ProcChans` per definition;
//   chanend symbols minted in the program symbol arena.
// Failure modes: subscripts or locations that do not reduce to
//   constants, channels with a missing, single, or over-subscribed
//   endpoint.
// Side effects: diagnostics; extends the symbol arena.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::ast::{
    Decl, Elem, Expr, Form, ProcDef, Program, RepIndex, ScopeTag, Spec, StmtId, StmtKind, SymId,
    Symbol, Type,
};
use crate::diag::{codes, Diagnostic, Diagnostics};
use crate::eval;
use crate::indices;
use crate::printer::expr_text;
use crate::subst;

// ── Identifiers ────────────────────────────────────────────────────────

/// Handle of a [`ChanElemSet`] within its definition's `ProcChans`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChanSetId(pub u32);

/// Identifier shared by the two ends of one connection. Both sides
/// present it at runtime so the switch can pair them up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u32);

// ── Channel uses ───────────────────────────────────────────────────────

/// A channel occurrence as written: name plus optional subscript.
#[derive(Debug, Clone)]
pub struct ChanUse {
    pub name: String,
    pub sym: SymId,
    pub index: Option<Expr>,
}

/// Uses collected beneath a statement, deduplicated by name and
/// structurally-equal subscript.
#[derive(Debug, Default)]
pub struct ChanUseSet {
    uses: Vec<ChanUse>,
}

impl ChanUseSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, u: ChanUse) {
        let dup = self.uses.iter().any(|v| {
            v.name == u.name
                && match (&v.index, &u.index) {
                    (None, None) => true,
                    (Some(a), Some(b)) => eval::same_expr(a, b),
                    _ => false,
                }
        });
        if !dup {
            self.uses.push(u);
        }
    }

    pub fn update(&mut self, other: ChanUseSet) {
        for u in other.uses {
            self.add(u);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.uses.is_empty()
    }
}

// ── Element sets ───────────────────────────────────────────────────────

/// One expanded instance of a use: a concrete subscript (if any), the
/// core it runs on, and the position of the producing index tuple
/// within its replicator block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChanElem {
    pub index: Option<i64>,
    pub location: i64,
    pub position: Option<i64>,
}

/// All elements a single use expands to at one boundary. The set owns
/// the chanend this side will communicate through; connection colouring
/// fills in `connid` later.
#[derive(Debug, Clone)]
pub struct ChanElemSet {
    pub name: String,
    pub sym: SymId,
    /// The subscript as written, before expansion.
    pub expr: Option<Expr>,
    /// Replicators enclosing the boundary, outermost first.
    pub indices: Vec<RepIndex>,
    /// Location expression of the boundary the set was expanded at.
    pub location: Expr,
    pub chanend: String,
    pub chanend_sym: SymId,
    pub elems: Vec<ChanElem>,
    pub connid: Option<ConnId>,
}

// ── The channel table ──────────────────────────────────────────────────

/// A concrete channel element: scalar channel or one slot of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChanKey {
    pub name: String,
    pub index: Option<i64>,
}

/// The boundaries that reached one channel element, in discovery
/// order: index 0 is the master end, index 1 the slave.
#[derive(Debug, Clone, Default)]
pub struct ChanEntry {
    pub locations: Vec<i64>,
    pub chanends: Vec<String>,
    pub sets: Vec<ChanSetId>,
    pub connid: Option<ConnId>,
}

impl ChanEntry {
    pub fn is_master(&self, set: ChanSetId) -> bool {
        self.sets.first() == Some(&set)
    }

    /// The set holding the opposite end, if both ends were seen.
    pub fn partner_of(&self, set: ChanSetId) -> Option<ChanSetId> {
        if self.is_master(set) {
            self.sets.get(1).copied()
        } else {
            self.sets.first().copied()
        }
    }

    pub fn master_location(&self) -> Option<i64> {
        self.locations.first().copied()
    }

    pub fn slave_location(&self) -> Option<i64> {
        self.locations.get(1).copied()
    }
}

/// Per-definition map from channel element to its two ends.
#[derive(Debug, Clone, Default)]
pub struct ChanTable {
    entries: IndexMap<ChanKey, ChanEntry>,
}

impl ChanTable {
    pub fn insert(
        &mut self,
        name: &str,
        index: Option<i64>,
        location: i64,
        chanend: &str,
        set: ChanSetId,
    ) {
        let key = ChanKey {
            name: name.to_string(),
            index,
        };
        let entry = self.entries.entry(key).or_default();
        entry.locations.push(location);
        entry.chanends.push(chanend.to_string());
        entry.sets.push(set);
    }

    pub fn lookup(&self, name: &str, index: Option<i64>) -> Option<&ChanEntry> {
        self.entries.get(&ChanKey {
            name: name.to_string(),
            index,
        })
    }

    pub fn lookup_mut(&mut self, name: &str, index: Option<i64>) -> Option<&mut ChanEntry> {
        self.entries.get_mut(&ChanKey {
            name: name.to_string(),
            index,
        })
    }

    /// Subscripts of `name` present in the table, in discovery order.
    pub fn indices_for(&self, name: &str) -> Vec<Option<i64>> {
        self.entries
            .keys()
            .filter(|k| k.name == name)
            .map(|k| k.index)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChanKey, &ChanEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Per-definition topology ────────────────────────────────────────────

/// Channel analysis of one definition: the element sets, the table
/// pairing their ends, and which boundary each set was expanded at.
#[derive(Debug, Default)]
pub struct ProcChans {
    pub sets: Vec<ChanElemSet>,
    pub table: ChanTable,
    /// Sets expanded at the definition body.
    pub proc_sets: Vec<ChanSetId>,
    /// Sets expanded at a replicator, keyed by the `rep` statement.
    pub rep_sets: HashMap<StmtId, Vec<ChanSetId>>,
    /// Sets expanded at an `on`, keyed by the `on` statement.
    pub on_sets: HashMap<StmtId, Vec<ChanSetId>>,
    /// Per-branch sets of a `par`, keyed by the `par` statement.
    pub par_sets: HashMap<StmtId, Vec<Vec<ChanSetId>>>,
    chanend_count: u32,
}

impl ProcChans {
    pub fn set(&self, id: ChanSetId) -> &ChanElemSet {
        &self.sets[id.0 as usize]
    }

    pub fn set_mut(&mut self, id: ChanSetId) -> &mut ChanElemSet {
        &mut self.sets[id.0 as usize]
    }

    pub fn set_ids(&self) -> impl Iterator<Item = ChanSetId> {
        (0..self.sets.len() as u32).map(ChanSetId)
    }
}

/// Channel topology of the whole program, one entry per definition.
#[derive(Debug, Default)]
pub struct Topology {
    pub procs: IndexMap<String, ProcChans>,
}

impl Topology {
    pub fn proc(&self, name: &str) -> Option<&ProcChans> {
        self.procs.get(name)
    }

    pub fn proc_mut(&mut self, name: &str) -> Option<&mut ProcChans> {
        self.procs.get_mut(name)
    }

    /// Whether the definition owns any channel elements.
    pub fn has_chans(&self, name: &str) -> bool {
        self.procs.get(name).is_some_and(|pc| !pc.table.is_empty())
    }
}

// ── Expansion ──────────────────────────────────────────────────────────

/// Collect and expand channel uses for every definition.
///
/// Boundaries are expanded bottom-up, so the deepest holder of a use
/// claims it first and becomes the master end where the two sides sit
/// at equal depth in different branches, the earlier branch wins.
pub fn label_chans(p: &mut Program, diags: &mut Diagnostics) -> Topology {
    let mut topo = Topology::default();
    for i in 0..p.defs.len() {
        let name = p.defs[i].name.clone();
        let body = p.defs[i].body;
        let declared: HashMap<String, SymId> = p.defs[i]
            .decls
            .iter()
            .filter(|d| d.ty.spec == Spec::Chan)
            .map(|d| (d.name.clone(), d.sym))
            .collect();

        let mut ex = Expander {
            diags,
            declared,
            pc: ProcChans::default(),
        };
        let uses = ex.stmt(p, body, &[]);
        ex.pc.proc_sets = ex.expand_uses(p, uses, &[], body);
        ex.check_chans(&p.defs[i]);

        if !ex.pc.sets.is_empty() {
            tracing::debug!(
                def = %name,
                sets = ex.pc.sets.len(),
                elements = ex.pc.table.len(),
                "channel topology built"
            );
        }
        topo.procs.insert(name, ex.pc);
    }
    topo
}

struct Expander<'a> {
    diags: &'a mut Diagnostics,
    /// Channels declared by the current definition, the only ones
    /// expanded at its boundaries.
    declared: HashMap<String, SymId>,
    pc: ProcChans,
}

impl Expander<'_> {
    /// Returns the uses beneath `id` that no inner boundary claimed.
    fn stmt(&mut self, p: &mut Program, id: StmtId, indices: &[RepIndex]) -> ChanUseSet {
        match p.arena[id].kind.clone() {
            StmtKind::In { chan, .. } | StmtKind::Out { chan, .. } => self.use_of(p, &chan),
            StmtKind::Call { args, .. } => {
                let mut uses = ChanUseSet::new();
                for arg in &args {
                    if let Expr::Single(elem) = arg {
                        uses.update(self.use_of(p, elem));
                    }
                }
                uses
            }
            StmtKind::Seq(stmts) => {
                let mut uses = ChanUseSet::new();
                for s in stmts {
                    uses.update(self.stmt(p, s, indices));
                }
                uses
            }
            StmtKind::If {
                then_stmt,
                else_stmt,
                ..
            } => {
                let mut uses = self.stmt(p, then_stmt, indices);
                uses.update(self.stmt(p, else_stmt, indices));
                uses
            }
            StmtKind::While { body, .. } | StmtKind::For { body, .. } => {
                self.stmt(p, body, indices)
            }
            StmtKind::Rep {
                indices: rep_ix,
                body,
            } => {
                let mut all = indices.to_vec();
                all.extend(rep_ix.iter().cloned());
                let uses = self.stmt(p, body, &all);
                let sets = self.expand_uses(p, uses, &all, body);
                self.pc.rep_sets.insert(id, sets);
                ChanUseSet::new()
            }
            StmtKind::On { body, .. } => {
                let uses = self.stmt(p, body, indices);
                let sets = self.expand_uses(p, uses, indices, body);
                self.pc.on_sets.insert(id, sets);
                ChanUseSet::new()
            }
            StmtKind::Par(branches) => {
                let mut per_branch = Vec::with_capacity(branches.len());
                for b in branches {
                    let uses = self.stmt(p, b, indices);
                    per_branch.push(self.expand_uses(p, uses, indices, b));
                }
                self.pc.par_sets.insert(id, per_branch);
                ChanUseSet::new()
            }
            _ => ChanUseSet::new(),
        }
    }

    fn use_of(&mut self, p: &Program, elem: &Elem) -> ChanUseSet {
        let mut uses = ChanUseSet::new();
        match elem {
            Elem::Id(name) if self.declared.contains_key(&name.name) => {
                // Whole-array occurrences carry no subscript to expand.
                if p.syms.get(name.sym).ty.form == Form::Single {
                    uses.add(ChanUse {
                        name: name.name.clone(),
                        sym: name.sym,
                        index: None,
                    });
                }
            }
            Elem::Sub { name, index } if self.declared.contains_key(&name.name) => {
                uses.add(ChanUse {
                    name: name.name.clone(),
                    sym: name.sym,
                    index: Some((**index).clone()),
                });
            }
            _ => {}
        }
        uses
    }

    /// Expand each use at the boundary statement `at`, minting a
    /// chanend per set and recording every element in the table.
    fn expand_uses(
        &mut self,
        p: &mut Program,
        uses: ChanUseSet,
        indices: &[RepIndex],
        at: StmtId,
    ) -> Vec<ChanSetId> {
        let mut out = Vec::new();
        let location = p.arena[at]
            .location
            .clone()
            .expect("locations labelled before channel expansion");
        for u in uses.uses {
            let chanend = format!("_c{}", self.pc.chanend_count);
            self.pc.chanend_count += 1;
            let chanend_sym = p.syms.insert(Symbol::new(
                chanend.clone(),
                Type::new(Spec::ChanEnd, Form::Single),
                ScopeTag::Proc,
            ));
            let sid = ChanSetId(self.pc.sets.len() as u32);
            self.pc.sets.push(ChanElemSet {
                name: u.name.clone(),
                sym: u.sym,
                expr: u.index.clone(),
                indices: indices.to_vec(),
                location: location.clone(),
                chanend: chanend.clone(),
                chanend_sym,
                elems: Vec::new(),
                connid: None,
            });
            let elems = self.expand_set(p, &u, indices, at, &location, &chanend, sid);
            tracing::debug!(
                chan = %u.name,
                chanend = %chanend,
                elems = elems.len(),
                "channel use expanded"
            );
            self.pc.sets[sid.0 as usize].elems = elems;
            out.push(sid);
        }
        out
    }

    fn expand_set(
        &mut self,
        p: &Program,
        u: &ChanUse,
        indices: &[RepIndex],
        at: StmtId,
        location: &Expr,
        chanend: &str,
        sid: ChanSetId,
    ) -> Vec<ChanElem> {
        if indices.is_empty() {
            let index = match &u.index {
                None => None,
                Some(sub) => match eval::fold(sub, &p.syms) {
                    Some(v) => Some(v),
                    None => {
                        self.unfoldable(p, at, &u.name, sub);
                        return Vec::new();
                    }
                },
            };
            let Some(core) = eval::fold(location, &p.syms) else {
                self.unfoldable(p, at, &u.name, location);
                return Vec::new();
            };
            self.pc.table.insert(&u.name, index, core, chanend, sid);
            return vec![ChanElem {
                index,
                location: core,
                position: None,
            }];
        }

        let mut elems = Vec::new();
        for tuple in indices::index_tuples(indices) {
            let mut sub = u.index.clone();
            let mut loc = location.clone();
            for (ix, v) in indices.iter().zip(&tuple) {
                let old = Elem::id(ix.name.clone(), ix.sym);
                let new = Elem::Num(*v);
                if let Some(s) = sub.as_mut() {
                    subst::replace_elem_in_expr(s, &old, &new);
                }
                subst::replace_elem_in_expr(&mut loc, &old, &new);
            }
            let index = match &sub {
                None => None,
                Some(s) => match eval::fold(s, &p.syms) {
                    Some(v) => Some(v),
                    None => {
                        self.unfoldable(p, at, &u.name, s);
                        return elems;
                    }
                },
            };
            let Some(core) = eval::fold(&loc, &p.syms) else {
                self.unfoldable(p, at, &u.name, &loc);
                return elems;
            };
            self.pc.table.insert(&u.name, index, core, chanend, sid);
            elems.push(ChanElem {
                index,
                location: core,
                position: Some(indices::indices_value(indices, &tuple)),
            });
        }
        elems
    }

    fn unfoldable(&mut self, p: &Program, at: StmtId, name: &str, expr: &Expr) {
        self.diags.report(
            Diagnostic::error(
                p.arena[at].coord,
                format!("cannot resolve a static endpoint for channel '{name}'"),
            )
            .with_code(codes::CHAN_UNFOLDABLE)
            .with_hint(format!(
                "'{}' does not reduce to a constant here",
                expr_text(expr)
            )),
        );
    }

    // ── Validation ─────────────────────────────────────────────────────

    /// Every declared channel element must have exactly two ends.
    fn check_chans(&mut self, def: &ProcDef) {
        for d in &def.decls {
            if d.ty.spec != Spec::Chan {
                continue;
            }
            match d.ty.form {
                Form::Single => self.check_chan(d, None),
                Form::Array => {
                    let present = self.pc.table.indices_for(&d.name);
                    if present.is_empty() {
                        self.unused(d, &d.name);
                    } else {
                        for index in present {
                            self.check_chan(d, index);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn check_chan(&mut self, d: &Decl, index: Option<i64>) {
        let display = match index {
            None => d.name.clone(),
            Some(i) => format!("{}[{}]", d.name, i),
        };
        let ends = match self.pc.table.lookup(&d.name, index) {
            Some(entry) => entry.locations.len(),
            None => {
                self.unused(d, &display);
                return;
            }
        };
        if ends == 1 {
            self.diags.report(
                Diagnostic::error(
                    d.coord,
                    format!("channel '{display}' has no slave connection"),
                )
                .with_code(codes::CHAN_NO_SLAVE)
                .with_hint("a channel needs a second process using the other end"),
            );
        } else if ends > 2 {
            self.diags.report(
                Diagnostic::error(
                    d.coord,
                    format!("channel '{display}' is used by {ends} parallel processes"),
                )
                .with_code(codes::CHAN_MULTIPLE_SLAVES)
                .with_hint("a channel connects exactly two processes"),
            );
        }
    }

    fn unused(&mut self, d: &Decl, display: &str) {
        self.diags.report(
            Diagnostic::warning(d.coord, format!("channel '{display}' is not used"))
                .with_code(codes::CHAN_UNUSED),
        );
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
