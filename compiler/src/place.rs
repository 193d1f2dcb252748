// place.rs — Static placement of processes onto cores.
//
// Three passes plus the location-forming helper the later stages share:
//
//   insert_ons — wraps unplaced `par` branches in `on` prefixes so that
//     sibling processes land on distinct cores, folds replicator bounds,
//     and checks the program's thread total against the core budget.
//   label_locs — attaches a location expression to every statement,
//     relative to the enclosing definition's entry core.
//   insert_ids — gives every definition that owns channel connections
//     a `_pid` variable holding its own core id, assigned at entry.
//
// Locations are relative: a definition body starts at 0 and `on` targets
// offset from there. `form_location` turns an offset into an absolute
// core number by adding the holder's `_pid` and wrapping at the core
// count.
//
// Preconditions: calls flattened and nested `par`s spliced.
// Postconditions: every replicator bound carries its folded value, every
//   statement carries a location, `_pid` declared where later passes
//   reference it.
// Failure modes: unfoldable replicator bounds, mixed explicit/implicit
//   placement, core budget exceeded, unresolvable `on` targets.
// Side effects: diagnostics; allocates `on` wrapper and `_pid` nodes.

use std::collections::HashMap;

use crate::ast::{
    BinOp, Coord, Decl, Elem, Expr, Form, Name, Program, RepIndex, ScopeTag, Spec, Stmt, StmtId,
    StmtKind, Symbol, Symbols, Type, MAIN_NAME,
};
use crate::chans::Topology;
use crate::diag::{codes, Diagnostic, Diagnostics};
use crate::eval;
use crate::indices;
use crate::printer::expr_text;
use crate::sig;

// ── Synthetic placement ────────────────────────────────────────────────

/// Wrap unplaced `par` branches in `on` prefixes and check the thread
/// total against `cores`.
///
/// Branch 0 keeps its parent's core; branches 1.. are placed at the
/// next free offset, where "free" accounts for the threads the earlier
/// branches spawn beneath themselves. A `par` whose later branches all
/// carry explicit `on` prefixes is left alone; a mixture of placed and
/// unplaced branches is an error.
///
/// Definitions are visited in declaration order, so a call's thread
/// width is the already-computed width of its callee.
pub fn insert_ons(p: &mut Program, cores: i64, diags: &mut Diagnostics) {
    let mut placer = Placer {
        diags,
        widths: HashMap::new(),
    };
    let mut main_width = None;
    let mut main_coord = Coord::none();
    for i in 0..p.defs.len() {
        let name = p.defs[i].name.clone();
        let body = p.defs[i].body;
        let w = placer.width(p, body, 0);
        if name == MAIN_NAME {
            main_width = Some(w);
            main_coord = p.defs[i].coord;
        }
        placer.widths.insert(name, w);
    }
    if let Some(w) = main_width {
        tracing::debug!(required = w, available = cores, "placement thread count");
        if w > cores {
            placer.diags.report(
                Diagnostic::error(
                    main_coord,
                    format!("insufficient cores: {} required, {} available", w, cores),
                )
                .with_code(codes::INSUFFICIENT_CORES),
            );
        }
    }
}

struct Placer<'a> {
    diags: &'a mut Diagnostics,
    /// Thread widths of definitions visited so far.
    widths: HashMap<String, i64>,
}

impl Placer<'_> {
    /// Number of cores the subtree at `id` occupies when started at
    /// offset `d` from the definition's entry core.
    fn width(&mut self, p: &mut Program, id: StmtId, d: i64) -> i64 {
        // The kind is taken by clone so the arena stays free for the
        // wrapping and bound-folding the recursion performs.
        match p.arena[id].kind.clone() {
            StmtKind::Seq(stmts) => {
                let mut m = 1;
                for s in stmts {
                    m = m.max(self.width(p, s, d));
                }
                m
            }
            StmtKind::Par(stmts) => self.par(p, id, &stmts, d),
            StmtKind::Rep { body, .. } => {
                let extent = self.fold_bounds(p, id);
                self.width(p, body, d) * extent
            }
            StmtKind::On { body, .. }
            | StmtKind::While { body, .. }
            | StmtKind::For { body, .. } => self.width(p, body, d),
            StmtKind::If {
                then_stmt,
                else_stmt,
                ..
            } => self.width(p, then_stmt, d).max(self.width(p, else_stmt, d)),
            StmtKind::Call { name, .. } => {
                if sig::is_builtin(&name.name) {
                    1
                } else {
                    self.widths.get(&name.name).copied().unwrap_or(1)
                }
            }
            _ => 1,
        }
    }

    fn par(&mut self, p: &mut Program, id: StmtId, branches: &[StmtId], d: i64) -> i64 {
        let placed = branches
            .iter()
            .filter(|&&b| matches!(p.arena[b].kind, StmtKind::On { .. }))
            .count();
        if placed > 0 {
            // Explicit placement: every branch after the first carries
            // its own target. Anything partial is an error, but keep
            // visiting to collect further diagnostics.
            let explicit = branches
                .iter()
                .skip(1)
                .all(|&b| matches!(p.arena[b].kind, StmtKind::On { .. }));
            if !explicit {
                let coord = p.arena[id].coord;
                self.diags.report(
                    Diagnostic::error(
                        coord,
                        "parallel composition mixes explicit and implicit placement",
                    )
                    .with_code(codes::MIXED_PLACEMENT),
                );
            }
            let mut e = 0;
            for &b in branches {
                e += self.width(p, b, d + e);
            }
            return e;
        }

        let Some(&first) = branches.first() else {
            return 0;
        };
        let mut e = self.width(p, first, d);
        for i in 1..branches.len() {
            let b = branches[i];
            let coord = p.arena[b].coord;
            let on = p.arena.alloc(Stmt::new(
                StmtKind::On {
                    target: Expr::num(d + e),
                    body: b,
                },
                coord,
            ));
            if let StmtKind::Par(stmts) = &mut p.arena[id].kind {
                stmts[i] = on;
            }
            e += self.width(p, b, d + e);
        }
        e
    }

    /// Fold a replicator's bounds into their value slots and return the
    /// extent product. An unfoldable or non-positive bound is an error
    /// and counts 1 so the walk can continue.
    fn fold_bounds(&mut self, p: &mut Program, id: StmtId) -> i64 {
        let coord = p.arena[id].coord;
        let folds: Vec<(String, Option<i64>, Option<i64>)> = match &p.arena[id].kind {
            StmtKind::Rep { indices, .. } => indices
                .iter()
                .map(|ix| {
                    (
                        ix.name.clone(),
                        eval::fold(&ix.base, &p.syms),
                        eval::fold(&ix.count, &p.syms),
                    )
                })
                .collect(),
            _ => return 1,
        };
        let mut extent = 1;
        for (name, base, count) in &folds {
            match count {
                Some(n) if *n >= 1 => extent *= n,
                Some(_) => self.diags.report(
                    Diagnostic::error(
                        coord,
                        format!("replicator count for '{}' must be at least 1", name),
                    )
                    .with_code(codes::REP_UNBOUNDED),
                ),
                None => self.diags.report(
                    Diagnostic::error(
                        coord,
                        format!("replicator count for '{}' is not a compile-time constant", name),
                    )
                    .with_code(codes::REP_UNBOUNDED),
                ),
            }
            if base.is_none() {
                self.diags.report(
                    Diagnostic::error(
                        coord,
                        format!("replicator base for '{}' is not a compile-time constant", name),
                    )
                    .with_code(codes::REP_UNBOUNDED),
                );
            }
        }
        if let StmtKind::Rep { indices, .. } = &mut p.arena[id].kind {
            for (ix, (_, base, count)) in indices.iter_mut().zip(&folds) {
                ix.base_value = *base;
                ix.count_value = *count;
            }
        }
        extent
    }
}

// ── Location labelling ─────────────────────────────────────────────────

/// Attach a location expression to every statement.
///
/// A definition body starts at location 0. `on` statements place
/// themselves at their folded target; replicator bodies add the
/// mixed-radix position of the index tuple; everything else inherits.
/// An `on` target that neither folds nor depends on an enclosing
/// replicator index can never be resolved and is reported.
pub fn label_locs(p: &mut Program, diags: &mut Diagnostics) {
    let mut labeler = Labeler {
        diags,
        rep_names: Vec::new(),
    };
    for i in 0..p.defs.len() {
        let body = p.defs[i].body;
        labeler.label(p, body, &Expr::num(0));
    }
}

struct Labeler<'a> {
    diags: &'a mut Diagnostics,
    /// Index variables of the replicators enclosing the current walk.
    rep_names: Vec<String>,
}

impl Labeler<'_> {
    fn label(&mut self, p: &mut Program, id: StmtId, l: &Expr) {
        // `on` nodes place themselves; everything else inherits.
        let here = match &p.arena[id].kind {
            StmtKind::On { target, .. } => match eval::fold(target, &p.syms) {
                Some(v) => Expr::num(v),
                None => {
                    if !expr_mentions(target, &self.rep_names) {
                        let coord = p.arena[id].coord;
                        self.diags.report(
                            Diagnostic::error(
                                coord,
                                format!(
                                    "placement target '{}' cannot be resolved at compile time",
                                    expr_text(target)
                                ),
                            )
                            .with_code(codes::UNFOLDABLE_TARGET),
                        );
                    }
                    target.clone()
                }
            },
            _ => l.clone(),
        };
        p.arena[id].location = Some(here.clone());

        match p.arena[id].kind.clone() {
            StmtKind::Seq(stmts) | StmtKind::Par(stmts) => {
                for s in stmts {
                    self.label(p, s, &here);
                }
            }
            StmtKind::Rep { indices, body } => {
                let inner = rep_body_location(&here, &indices, &p.syms);
                let depth = self.rep_names.len();
                self.rep_names.extend(indices.into_iter().map(|ix| ix.name));
                self.label(p, body, &inner);
                self.rep_names.truncate(depth);
            }
            StmtKind::On { body, .. }
            | StmtKind::While { body, .. }
            | StmtKind::For { body, .. } => {
                self.label(p, body, &here);
            }
            StmtKind::If {
                then_stmt,
                else_stmt,
                ..
            } => {
                self.label(p, then_stmt, &here);
                self.label(p, else_stmt, &here);
            }
            _ => {}
        }
    }
}

/// Location of a replicator body: parent location plus the mixed-radix
/// position of the index tuple. A parent at 0 contributes nothing.
fn rep_body_location(l: &Expr, indices: &[RepIndex], syms: &Symbols) -> Expr {
    let Some(k) = indices::indices_expr(indices) else {
        return l.clone();
    };
    match eval::fold(l, syms) {
        Some(0) => k,
        Some(n) => Expr::binop(BinOp::Add, Elem::Num(n), k),
        None => {
            let lhs = match l.clone() {
                Expr::Single(elem) => elem,
                other => other.group(),
            };
            Expr::binop(BinOp::Add, lhs, k)
        }
    }
}

fn expr_mentions(e: &Expr, names: &[String]) -> bool {
    match e {
        Expr::Single(elem) | Expr::Unary { elem, .. } => elem_mentions(elem, names),
        Expr::Binop { lhs, rhs, .. } => elem_mentions(lhs, names) || expr_mentions(rhs, names),
    }
}

fn elem_mentions(elem: &Elem, names: &[String]) -> bool {
    match elem {
        Elem::Id(name) => names.iter().any(|n| *n == name.name),
        Elem::Sub { index, .. } => expr_mentions(index, names),
        Elem::Slice { base, count, .. } => {
            expr_mentions(base, names) || expr_mentions(count, names)
        }
        Elem::Group(inner) => expr_mentions(inner, names),
        Elem::Fcall { args, .. } => args.iter().any(|a| expr_mentions(a, names)),
        Elem::Num(_) | Elem::Bool(_) => false,
    }
}

// ── Procedure ids ──────────────────────────────────────────────────────

/// Declare `_pid` and assign it from `procid()` at the entry of every
/// definition that owns channel connections.
///
/// Master connection targets compute absolute cores from `_pid`, so it
/// must exist before they are synthesized. Distribution trees read
/// `procid()` at each node instead and need no stored id.
pub fn insert_ids(p: &mut Program, topo: &Topology) {
    let procid = procid_name(p);
    for i in 0..p.defs.len() {
        let body = p.defs[i].body;
        if !topo.has_chans(&p.defs[i].name) {
            continue;
        }
        tracing::debug!(def = %p.defs[i].name, "inserting procedure id");

        let ty = Type::new(Spec::Var, Form::Single);
        let sym = p.syms.insert(Symbol::new(sig::PROC_ID_NAME, ty, ScopeTag::Proc));
        p.defs[i].decls.push(Decl {
            name: sig::PROC_ID_NAME.to_string(),
            sym,
            ty,
            expr: None,
            coord: Coord::none(),
        });

        let ass = p.arena.alloc(Stmt::synth(StmtKind::Ass {
            dst: Elem::id(sig::PROC_ID_NAME, sym),
            src: Expr::single(Elem::Fcall {
                name: procid.clone(),
                args: Vec::new(),
            }),
        }));
        if matches!(p.arena[body].kind, StmtKind::Seq(_)) {
            if let StmtKind::Seq(stmts) = &mut p.arena[body].kind {
                stmts.insert(0, ass);
            }
        } else {
            let seq = p.arena.alloc(Stmt::synth(StmtKind::Seq(vec![ass, body])));
            p.defs[i].body = seq;
        }
    }
}

/// Resolved name of the `procid` builtin, registering it if the front
/// end never did. Replicator distribution needs it too.
pub(crate) fn procid_name(p: &mut Program) -> Name {
    let found = p
        .syms
        .iter()
        .find(|(_, s)| s.name == "procid")
        .map(|(id, _)| id);
    let sym = match found {
        Some(id) => id,
        None => p.syms.insert(Symbol::new(
            "procid",
            Type::new(Spec::Func, Form::Procedure),
            ScopeTag::Program,
        )),
    };
    Name::new("procid", sym)
}

// ── Absolute locations ─────────────────────────────────────────────────

/// Expression for the core an offset lands on: `(origin + offset) rem
/// cores`. Used by connection insertion and replicator distribution,
/// with `origin` the holder's `_pid`.
pub fn form_location(origin: Elem, offset: Expr, cores: i64) -> Expr {
    let off = match offset {
        Expr::Single(elem) => Expr::Single(elem),
        other => Expr::Single(other.group()),
    };
    let sum = Expr::binop(BinOp::Add, origin, off);
    Expr::binop(BinOp::Rem, sum.group(), Expr::num(cores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SymId;
    use crate::builder::ProgramBuilder;
    use crate::printer::Printer;

    fn print_stmt(p: &Program, id: StmtId) -> String {
        let mut out = String::new();
        Printer::new().stmt(&mut out, p, id, 0);
        out
    }

    #[test]
    fn par_branches_receive_on_prefixes() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        let s1 = main.skip();
        let s2 = main.skip();
        let s3 = main.skip();
        let par = main.par(vec![s1, s2, s3]);
        main.done(par);
        let mut p = b.build();

        let mut diags = Diagnostics::new();
        insert_ons(&mut p, 4, &mut diags);

        assert!(!diags.has_errors());
        assert_eq!(
            print_stmt(&p, par),
            "par {\n  skip\n  on 1 do\n    skip\n  on 2 do\n    skip\n}\n"
        );
    }

    #[test]
    fn replicated_branch_offsets_later_siblings() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        let s1 = main.skip();
        let ix = main.index("i", Expr::num(0), Expr::num(4));
        let body = main.skip();
        let rep = main.rep(vec![ix], body);
        let s3 = main.skip();
        let par = main.par(vec![s1, rep, s3]);
        main.done(par);
        let mut p = b.build();

        let mut diags = Diagnostics::new();
        insert_ons(&mut p, 8, &mut diags);

        assert!(!diags.has_errors());
        assert_eq!(
            print_stmt(&p, par),
            "par {\n  skip\n  on 1 do\n    par i in [0 for 4] do\n      skip\n  on 5 do\n    skip\n}\n"
        );
    }

    #[test]
    fn thread_total_checked_against_cores() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        let ix = main.index("i", Expr::num(0), Expr::num(16));
        let body = main.skip();
        let rep = main.rep(vec![ix], body);
        main.done(rep);
        let mut p = b.build();

        let mut diags = Diagnostics::new();
        insert_ons(&mut p, 4, &mut diags);

        assert_eq!(diags.error_count(), 1);
        let d = diags.iter().next().unwrap();
        assert_eq!(d.code, Some(codes::INSUFFICIENT_CORES));
        assert!(d.message.contains("16 required"));
    }

    #[test]
    fn mixed_placement_is_an_error() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        let s1 = main.skip();
        let s2 = main.skip();
        let on = main.on(Expr::num(3), s2);
        let s3 = main.skip();
        let par = main.par(vec![s1, on, s3]);
        main.done(par);
        let mut p = b.build();

        let mut diags = Diagnostics::new();
        insert_ons(&mut p, 4, &mut diags);

        assert_eq!(diags.error_count(), 1);
        assert_eq!(
            diags.iter().next().unwrap().code,
            Some(codes::MIXED_PLACEMENT)
        );
    }

    #[test]
    fn unbounded_replicator_is_an_error() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        main.var("n");
        let ix = main.index("i", Expr::num(0), main.expr_id("n"));
        let body = main.skip();
        let rep = main.rep(vec![ix], body);
        main.done(rep);
        let mut p = b.build();

        let mut diags = Diagnostics::new();
        insert_ons(&mut p, 4, &mut diags);

        assert_eq!(diags.error_count(), 1);
        assert_eq!(
            diags.iter().next().unwrap().code,
            Some(codes::REP_UNBOUNDED)
        );
    }

    #[test]
    fn zero_count_replicator_is_an_error() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        let ix = main.index("i", Expr::num(0), Expr::num(0));
        let body = main.skip();
        let rep = main.rep(vec![ix], body);
        main.done(rep);
        let mut p = b.build();

        let mut diags = Diagnostics::new();
        insert_ons(&mut p, 4, &mut diags);

        assert_eq!(diags.error_count(), 1);
        let d = diags.iter().next().unwrap();
        assert_eq!(d.code, Some(codes::REP_UNBOUNDED));
        assert!(d.message.contains("at least 1"));
    }

    #[test]
    fn locations_inherit_and_offset() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        let s1 = main.skip();
        let ix = main.index("i", Expr::num(0), Expr::num(4));
        let body = main.skip();
        let rep = main.rep(vec![ix], body);
        let par = main.par(vec![s1, rep]);
        main.done(par);
        let mut p = b.build();

        let mut diags = Diagnostics::new();
        insert_ons(&mut p, 8, &mut diags);
        label_locs(&mut p, &mut diags);
        assert!(!diags.has_errors());

        let loc = |id: StmtId| expr_text(p.arena[id].location.as_ref().unwrap());
        assert_eq!(loc(par), "0");
        assert_eq!(loc(s1), "0");
        assert_eq!(loc(body), "1 + i");
    }

    #[test]
    fn multi_index_body_location_is_mixed_radix() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        let i = main.index("i", Expr::num(0), Expr::num(2));
        let j = main.index("j", Expr::num(0), Expr::num(3));
        let body = main.skip();
        let rep = main.rep(vec![i, j], body);
        main.done(rep);
        let mut p = b.build();

        let mut diags = Diagnostics::new();
        insert_ons(&mut p, 8, &mut diags);
        label_locs(&mut p, &mut diags);
        assert!(!diags.has_errors());

        let loc = expr_text(p.arena[body].location.as_ref().unwrap());
        assert_eq!(loc, "(i * 3) + j");
    }

    #[test]
    fn unresolvable_on_target_is_an_error() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        main.var("x");
        let s = main.skip();
        let on = main.on(main.expr_id("x"), s);
        main.done(on);
        let mut p = b.build();

        let mut diags = Diagnostics::new();
        insert_ons(&mut p, 4, &mut diags);
        label_locs(&mut p, &mut diags);

        assert_eq!(diags.error_count(), 1);
        assert_eq!(
            diags.iter().next().unwrap().code,
            Some(codes::UNFOLDABLE_TARGET)
        );
    }

    #[test]
    fn index_dependent_on_target_is_deferred() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        let ix = main.index("i", Expr::num(0), Expr::num(4));
        let s = main.skip();
        let target = crate::builder::bin(BinOp::Add, main.expr_id("i"), Expr::num(1));
        let on = main.on(target, s);
        let rep = main.rep(vec![ix], on);
        main.done(rep);
        let mut p = b.build();

        let mut diags = Diagnostics::new();
        insert_ons(&mut p, 8, &mut diags);
        label_locs(&mut p, &mut diags);

        assert!(!diags.has_errors());
        assert_eq!(expr_text(p.arena[s].location.as_ref().unwrap()), "i + 1");
    }

    #[test]
    fn form_location_wraps_at_core_count() {
        let e = form_location(Elem::id("_pid", SymId(0)), Expr::num(3), 4);
        assert_eq!(expr_text(&e), "(_pid + 3) rem 4");

        let off = Expr::binop(BinOp::Add, Elem::id("_t", SymId(1)), Expr::num(2));
        let e = form_location(Elem::id("_pid", SymId(0)), off, 16);
        assert_eq!(expr_text(&e), "(_pid + (_t + 2)) rem 16");
    }
}
