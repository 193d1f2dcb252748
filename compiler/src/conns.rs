// conns.rs — Connection colouring, insertion, and channel renaming.
//
// Three passes over the topology built by channel labelling:
//
//   label_conns — gives the two ends of every logical channel a shared
//     connection id by greedy colouring of the element sets.
//   insert_conns — prepends a `connect` for each element set at its
//     boundary and declares the chanends in the procedure scope.
//   rename_chans — rewrites channel occurrences to their chanend and
//     removes the now-dead channel declarations.
//
// A master end connects towards the slave's core; a slave end connects
// with no target and waits to be matched. Sets whose expansion spans
// several elements dispatch on the subscript value, so each replicator
// instance connects only its own element.
//
// Preconditions: channel topology built, `_pid` declared in every
//   definition that owns connections.
// Postconditions: every set and table entry coloured; `connect`
//   statements and chanend declarations in place; no channel-typed
//   occurrence or declaration left in any definition.
// Side effects: allocates connect wrapper nodes; rewrites symbols of
//   remaining channel formals to chanends.

use crate::ast::{
    BinOp, Coord, Decl, Elem, Expr, Form, Name, Program, Spec, Stmt, StmtId, StmtKind, Symbols,
    Type,
};
use crate::chans::{ChanElem, ChanElemSet, ChanSetId, ConnId, ProcChans, Topology};
use crate::eval;
use crate::place;
use crate::sig;

// ── Connection colouring ───────────────────────────────────────────────

/// Assign connection ids, visiting boundaries top-down in each
/// definition and colouring whole partner components at once.
///
/// The counter is program-wide: definitions may run concurrently, so
/// ids must not collide across them.
pub fn label_conns(p: &Program, topo: &mut Topology) {
    let mut next = 0u32;
    for def in &p.defs {
        let Some(pc) = topo.proc_mut(&def.name) else {
            continue;
        };
        let proc_sets = pc.proc_sets.clone();
        assign(pc, &proc_sets, &mut next);
        walk_assign(p, pc, def.body, &mut next);
    }
}

fn walk_assign(p: &Program, pc: &mut ProcChans, id: StmtId, next: &mut u32) {
    match &p.arena[id].kind {
        StmtKind::Rep { body, .. } => {
            if let Some(sets) = pc.rep_sets.get(&id).cloned() {
                assign(pc, &sets, next);
            }
            walk_assign(p, pc, *body, next);
        }
        StmtKind::On { body, .. } => {
            if let Some(sets) = pc.on_sets.get(&id).cloned() {
                assign(pc, &sets, next);
            }
            walk_assign(p, pc, *body, next);
        }
        StmtKind::Par(branches) => {
            if let Some(groups) = pc.par_sets.get(&id).cloned() {
                for group in &groups {
                    assign(pc, group, next);
                }
            }
            for b in branches {
                walk_assign(p, pc, *b, next);
            }
        }
        _ => {
            for c in p.arena.children(id) {
                walk_assign(p, pc, c, next);
            }
        }
    }
}

fn assign(pc: &mut ProcChans, sets: &[ChanSetId], next: &mut u32) {
    for &sid in sets {
        if pc.set(sid).connid.is_some() {
            continue;
        }
        // A partner reached from an earlier boundary may have coloured
        // this set's elements already; reuse its id.
        let id = match adopted_id(pc, sid) {
            Some(id) => id,
            None => {
                let id = ConnId(*next);
                *next += 1;
                id
            }
        };
        fill(pc, sid, id);
    }
}

fn adopted_id(pc: &ProcChans, sid: ChanSetId) -> Option<ConnId> {
    let set = pc.set(sid);
    set.elems
        .iter()
        .find_map(|e| pc.table.lookup(&set.name, e.index).and_then(|en| en.connid))
}

/// Colour `sid` and, through each of its elements, the partner set on
/// the other end. Recursion covers sets linked over several elements.
fn fill(pc: &mut ProcChans, sid: ChanSetId, id: ConnId) {
    if pc.set(sid).connid.is_some() {
        return;
    }
    pc.set_mut(sid).connid = Some(id);
    tracing::trace!(chanend = %pc.set(sid).chanend, connid = id.0, "coloured");
    let name = pc.set(sid).name.clone();
    let elems: Vec<Option<i64>> = pc.set(sid).elems.iter().map(|e| e.index).collect();
    for index in elems {
        let Some(entry) = pc.table.lookup_mut(&name, index) else {
            continue;
        };
        entry.connid = Some(id);
        if let Some(partner) = entry.partner_of(sid) {
            fill(pc, partner, id);
        }
    }
}

// ── Connection insertion ───────────────────────────────────────────────

/// Wrap every boundary owning element sets in a sequence that first
/// connects each set's chanend, and declare the chanends.
pub fn insert_conns(p: &mut Program, topo: &Topology, cores: i64) {
    for i in 0..p.defs.len() {
        let name = p.defs[i].name.clone();
        let Some(pc) = topo.proc(&name) else {
            continue;
        };
        if pc.sets.is_empty() {
            continue;
        }
        let pid_sym = p.defs[i]
            .decls
            .iter()
            .find(|d| d.name == sig::PROC_ID_NAME)
            .map(|d| d.sym)
            .expect("procedure id declared before connection insertion");
        let pid = Elem::id(sig::PROC_ID_NAME, pid_sym);

        let body = p.defs[i].body;
        walk_insert(p, pc, &pid, body, cores);
        if !pc.proc_sets.is_empty() {
            p.defs[i].body = wrap(p, pc, &pid, body, &pc.proc_sets, cores);
        }

        for set in &pc.sets {
            p.defs[i].decls.push(Decl {
                name: set.chanend.clone(),
                sym: set.chanend_sym,
                ty: Type::new(Spec::ChanEnd, Form::Single),
                expr: None,
                coord: Coord::none(),
            });
        }
        tracing::debug!(def = %name, chanends = pc.sets.len(), "connections inserted");
    }
}

fn walk_insert(p: &mut Program, pc: &ProcChans, pid: &Elem, id: StmtId, cores: i64) {
    match p.arena[id].kind.clone() {
        StmtKind::Rep { body, .. } => {
            walk_insert(p, pc, pid, body, cores);
            if let Some(sets) = pc.rep_sets.get(&id) {
                let wrapped = wrap(p, pc, pid, body, sets, cores);
                if let StmtKind::Rep { body: b, .. } = &mut p.arena[id].kind {
                    *b = wrapped;
                }
            }
        }
        StmtKind::On { body, .. } => {
            walk_insert(p, pc, pid, body, cores);
            if let Some(sets) = pc.on_sets.get(&id) {
                let wrapped = wrap(p, pc, pid, body, sets, cores);
                if let StmtKind::On { body: b, .. } = &mut p.arena[id].kind {
                    *b = wrapped;
                }
            }
        }
        StmtKind::Par(branches) => {
            for b in &branches {
                walk_insert(p, pc, pid, *b, cores);
            }
            if let Some(groups) = pc.par_sets.get(&id).cloned() {
                for (i, group) in groups.iter().enumerate() {
                    let wrapped = wrap(p, pc, pid, branches[i], group, cores);
                    if let StmtKind::Par(bs) = &mut p.arena[id].kind {
                        bs[i] = wrapped;
                    }
                }
            }
        }
        _ => {
            for c in p.arena.children(id) {
                walk_insert(p, pc, pid, c, cores);
            }
        }
    }
}

/// `seq { connect ..; stmt }`, keeping the wrapped statement's coord
/// and location on the wrapper. No sets, no wrapper.
fn wrap(
    p: &mut Program,
    pc: &ProcChans,
    pid: &Elem,
    stmt: StmtId,
    sets: &[ChanSetId],
    cores: i64,
) -> StmtId {
    if sets.is_empty() {
        return stmt;
    }
    let mut items = Vec::with_capacity(sets.len() + 1);
    for &sid in sets {
        items.push(connect_for(p, pc, pid, sid, cores));
    }
    let coord = p.arena[stmt].coord;
    let location = p.arena[stmt].location.clone();
    items.push(stmt);
    let seq = p.arena.alloc(Stmt::new(StmtKind::Seq(items), coord));
    p.arena[seq].location = location;
    seq
}

/// The connect statement for one element set: a single connect when
/// the expansion has one element, otherwise a dispatch chain testing
/// the subscript so each instance connects its own element.
fn connect_for(
    p: &mut Program,
    pc: &ProcChans,
    pid: &Elem,
    sid: ChanSetId,
    cores: i64,
) -> StmtId {
    let set = pc.set(sid);
    if let [elem] = set.elems.as_slice() {
        return connect_stmt(p, pc, pid, set, sid, elem, cores);
    }
    let mut acc = p.arena.alloc(Stmt::synth(StmtKind::Skip));
    for elem in set.elems.iter().rev() {
        let conn = connect_stmt(p, pc, pid, set, sid, elem, cores);
        let cond = dispatch_cond(set, elem);
        acc = p.arena.alloc(Stmt::synth(StmtKind::If {
            cond,
            then_stmt: conn,
            else_stmt: acc,
        }));
    }
    acc
}

fn connect_stmt(
    p: &mut Program,
    pc: &ProcChans,
    pid: &Elem,
    set: &ChanElemSet,
    sid: ChanSetId,
    elem: &ChanElem,
    cores: i64,
) -> StmtId {
    let target = pc
        .table
        .lookup(&set.name, elem.index)
        .filter(|entry| entry.is_master(sid))
        .and_then(|entry| entry.slave_location())
        .map(|loc| place::form_location(pid.clone(), Expr::num(loc), cores));
    let chanend = Elem::Id(Name::new(set.chanend.clone(), set.chanend_sym));
    p.arena.alloc(Stmt::synth(StmtKind::Connect { chanend, target }))
}

fn dispatch_cond(set: &ChanElemSet, elem: &ChanElem) -> Expr {
    match (&set.expr, elem.index) {
        (Some(sub), Some(i)) => Expr::binop(
            BinOp::Eq,
            Elem::Group(Box::new(sub.clone())),
            Expr::num(i),
        ),
        // Scalar sets spanning several elements can only differ by
        // core, so dispatch on the boundary's location instead.
        _ => Expr::binop(
            BinOp::Eq,
            Elem::Group(Box::new(set.location.clone())),
            Expr::num(elem.location),
        ),
    }
}

// ── Channel renaming ───────────────────────────────────────────────────

/// Replace channel occurrences with their chanend, drop channel
/// declarations, and retype channel formals that survived inlining to
/// chanends, since callers now pass a connected end.
pub fn rename_chans(p: &mut Program, topo: &Topology) {
    for i in 0..p.defs.len() {
        let name = p.defs[i].name.clone();
        let Some(pc) = topo.proc(&name) else {
            continue;
        };
        let body = p.defs[i].body;
        let proc_sets = pc.proc_sets.clone();
        rename_walk(p, pc, body, &proc_sets);

        p.defs[i].decls.retain(|d| d.ty.spec != Spec::Chan);
        for j in 0..p.defs[i].formals.len() {
            if p.defs[i].formals[j].ty.spec == Spec::Chan {
                let ty = Type::new(Spec::ChanEnd, p.defs[i].formals[j].ty.form);
                p.defs[i].formals[j].ty = ty;
                let sym = p.defs[i].formals[j].sym;
                p.syms.get_mut(sym).ty = ty;
            }
        }
    }
}

/// Walk with the element sets of the nearest enclosing boundary, the
/// only sets an occurrence at this depth can belong to.
fn rename_walk(p: &mut Program, pc: &ProcChans, id: StmtId, chans: &[ChanSetId]) {
    match p.arena[id].kind.clone() {
        StmtKind::Rep { body, .. } => {
            let own = pc.rep_sets.get(&id).cloned().unwrap_or_default();
            rename_walk(p, pc, body, &own);
        }
        StmtKind::On { body, .. } => {
            let own = pc.on_sets.get(&id).cloned().unwrap_or_default();
            rename_walk(p, pc, body, &own);
        }
        StmtKind::Par(branches) => {
            let groups = pc.par_sets.get(&id).cloned().unwrap_or_default();
            for (i, b) in branches.iter().enumerate() {
                let own = groups.get(i).cloned().unwrap_or_default();
                rename_walk(p, pc, *b, &own);
            }
        }
        StmtKind::In { .. } => {
            if let StmtKind::In { chan, .. } = &mut p.arena[id].kind {
                rename_elem(chan, pc, chans, &p.syms);
            }
        }
        StmtKind::Out { .. } => {
            if let StmtKind::Out { chan, .. } = &mut p.arena[id].kind {
                rename_elem(chan, pc, chans, &p.syms);
            }
        }
        StmtKind::Call { .. } => {
            if let StmtKind::Call { args, .. } = &mut p.arena[id].kind {
                for arg in args {
                    if let Expr::Single(elem) = arg {
                        rename_elem(elem, pc, chans, &p.syms);
                    }
                }
            }
        }
        _ => {
            for c in p.arena.children(id) {
                rename_walk(p, pc, c, chans);
            }
        }
    }
}

fn rename_elem(elem: &mut Elem, pc: &ProcChans, chans: &[ChanSetId], syms: &Symbols) {
    let replacement = match elem {
        Elem::Id(name) if syms.get(name.sym).ty.spec == Spec::Chan => chans
            .iter()
            .map(|&sid| pc.set(sid))
            .find(|s| s.name == name.name && s.expr.is_none())
            .map(|s| Elem::Id(Name::new(s.chanend.clone(), s.chanend_sym))),
        Elem::Sub { name, index } if syms.get(name.sym).ty.spec == Spec::Chan => chans
            .iter()
            .map(|&sid| pc.set(sid))
            .find(|s| {
                s.name == name.name
                    && s.expr.as_ref().is_some_and(|e| eval::same_expr(e, index))
            })
            .map(|s| Elem::Id(Name::new(s.chanend.clone(), s.chanend_sym))),
        _ => None,
    };
    if let Some(r) = replacement {
        *elem = r;
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
