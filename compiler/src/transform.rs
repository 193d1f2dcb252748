// transform.rs — Process materialization and replicator distribution.
//
// Two rewrites that turn inline parallelism into standalone definitions
// the code generator can spawn:
//
//   transform_par — every `par` branch and every replicator body that
//     is not already a bare call is lifted into a fresh definition and
//     replaced by a call to it. Formals capture the variables crossing
//     the boundary, live on entry or escaping on a forward exit, with
//     storage classes taken from the declared types; anything else the
//     subtree touches moves into the new definition as a local.
//   transform_rep — every replicated call distributes over its extent
//     as a binary spawn tree: `Q(t, n)` calls the leaf when `n = 1` and
//     otherwise forks `Q(t, n/2)` on its own core and `Q(t + n/2,
//     n - n/2)` on the core `n/2` places along. Any one composition
//     then forks at most two siblings and the tree bottoms out at depth
//     ⌈log2 n⌉.
//
// Preconditions: placement and topology resolved, channel uses renamed
//   to chanends, control flow and liveness computed on the current
//   tree.
// Postconditions: every `par` branch and every replicator body is a
//   single call; no replicator with an extent above one remains.
// Failure modes: a replicator body that is still not a call, and a
//   capture set over the runtime argument limit.
// Side effects: allocates statements, symbols and definitions; reports
//   diagnostics.

use crate::ast::{
    BinOp, Coord, Decl, Elem, Expr, Form, Name, Param, ProcDef, Program, RepIndex, ScopeTag, Spec,
    Stmt, StmtId, StmtKind, SymId, Symbol, Symbols, Type,
};
use crate::cfg::{Cfg, CfgTable};
use crate::diag::{codes, Diagnostic, Diagnostics};
use crate::indices;
use crate::liveness::{self, Liveness, VarSet};
use crate::place;
use crate::sig::{self, NameAlloc};
use crate::subst;

// ── Capture contexts ───────────────────────────────────────────────────

/// Declarations visible from the definition a subtree is lifted out of.
/// Captured arrays need their declared bound on the new formal, and
/// variables that stay behind need their declaration moved across.
struct DefScope {
    decls: Vec<Decl>,
    formals: Vec<Param>,
}

impl DefScope {
    fn of(p: &Program, def: &ProcDef) -> DefScope {
        let mut decls = def.decls.clone();
        decls.extend(p.decls.iter().cloned());
        DefScope {
            decls,
            formals: def.formals.clone(),
        }
    }

    fn bound(&self, name: &str) -> Option<Expr> {
        self.decls
            .iter()
            .find(|d| d.name == name)
            .and_then(|d| d.expr.clone())
            .or_else(|| {
                self.formals
                    .iter()
                    .find(|f| f.name == name)
                    .and_then(|f| f.expr.clone())
            })
    }

    fn decl(&self, name: &str) -> Option<&Decl> {
        self.decls.iter().find(|d| d.name == name)
    }
}

/// Remove program-scope names from a capture set. They are visible
/// from every definition, so a lifted body references them directly.
fn drop_program_scoped(syms: &Symbols, set: &mut VarSet) {
    let global: Vec<String> = set
        .iter()
        .filter(|(_, sym)| syms.get(*sym).scope == ScopeTag::Program)
        .map(|(name, _)| name.to_string())
        .collect();
    for name in &global {
        set.remove(name);
    }
}

/// Formal storage class for a variable captured by a lifted process:
/// scalars keep their reference, arrays pass an alias, channel ends
/// stay channel ends.
fn var_to_param(ty: Type) -> Type {
    match ty.spec {
        Spec::Chan | Spec::ChanEnd => Type::new(Spec::ChanEnd, ty.form),
        Spec::Val => ty,
        _ => Type::new(Spec::Ref, ty.form),
    }
}

/// Capture class under a replicator, where every instance gets its own
/// copy of a captured scalar rather than a shared reference.
fn rep_var_to_param(ty: Type) -> Type {
    match (ty.spec, ty.form) {
        (Spec::Chan, form) | (Spec::ChanEnd, form) => Type::new(Spec::ChanEnd, form),
        (Spec::Val, _) => ty,
        (_, Form::Single) => Type::new(Spec::Val, Form::Single),
        (_, form) => Type::new(Spec::Ref, form),
    }
}

// ── Parallel materialization ───────────────────────────────────────────

/// Lift every `par` branch and replicator body that is not a bare call
/// into its own definition. New definitions go to the front of the
/// program so `main` stays last.
pub fn transform_par(
    p: &mut Program,
    cfgs: &CfgTable,
    live: &Liveness,
    names: &mut NameAlloc,
    diags: &mut Diagnostics,
) {
    let mut minted: Vec<ProcDef> = Vec::new();
    for i in 0..p.defs.len() {
        let scope = DefScope::of(p, &p.defs[i]);
        let name = p.defs[i].name.clone();
        let body = p.defs[i].body;
        let cfg = match cfgs.get(&name) {
            Some(cfg) => cfg,
            None => continue,
        };
        materialize_in(p, cfg, live, names, diags, &scope, body, &mut minted);
    }
    for def in minted.into_iter().rev() {
        p.defs.insert(0, def);
    }
}

fn materialize_in(
    p: &mut Program,
    cfg: &Cfg,
    live: &Liveness,
    names: &mut NameAlloc,
    diags: &mut Diagnostics,
    scope: &DefScope,
    id: StmtId,
    minted: &mut Vec<ProcDef>,
) {
    match p.arena[id].kind.clone() {
        StmtKind::Par(branches) => {
            let mut rewritten = branches.clone();
            for (i, &branch) in branches.iter().enumerate() {
                if matches!(p.arena[branch].kind, StmtKind::Call { .. }) {
                    continue;
                }
                rewritten[i] = materialize(p, cfg, live, names, diags, scope, branch, minted);
            }
            if let StmtKind::Par(items) = &mut p.arena[id].kind {
                *items = rewritten;
            }
        }
        StmtKind::Rep { body, .. } => {
            if !matches!(p.arena[body].kind, StmtKind::Call { .. }) {
                let call = materialize(p, cfg, live, names, diags, scope, body, minted);
                if let StmtKind::Rep { body: slot, .. } = &mut p.arena[id].kind {
                    *slot = call;
                }
            }
        }
        _ => {
            for child in p.arena.children(id) {
                materialize_in(p, cfg, live, names, diags, scope, child, minted);
            }
        }
    }
}

/// Turn one statement into a definition plus the call that replaces it.
/// Returns the call's node.
#[allow(clippy::too_many_arguments)]
fn materialize(
    p: &mut Program,
    cfg: &Cfg,
    live: &Liveness,
    names: &mut NameAlloc,
    diags: &mut Diagnostics,
    scope: &DefScope,
    id: StmtId,
    minted: &mut Vec<ProcDef>,
) -> StmtId {
    let coord = p.arena[id].coord;
    let location = p.arena[id].location.clone();

    // Everything the subtree touches, split into what crosses the
    // boundary (formals) and what is private to it (locals).
    let mut vars = liveness::allvars(&p.arena, id);
    drop_program_scoped(&p.syms, &mut vars);
    let mut boundary = live.live_in(id).clone();
    boundary.union_with(&live.live_out(&p.arena, cfg, id));
    let context = vars.intersect(&boundary);

    let name = names.proc_name();
    let captured: Vec<(String, SymId)> =
        context.iter().map(|(n, s)| (n.to_string(), s)).collect();
    let mut formals = Vec::with_capacity(captured.len());
    let mut actuals = Vec::with_capacity(captured.len());
    for (var, sym) in &captured {
        let fty = var_to_param(p.syms.get(*sym).ty);
        let fsym = p.syms.insert(Symbol::new(var.as_str(), fty, ScopeTag::Proc));
        formals.push(Param {
            name: var.clone(),
            sym: fsym,
            ty: fty,
            expr: scope.bound(var),
        });
        actuals.push(Expr::id(var.as_str(), *sym));
        subst::rename_in_stmt(&mut p.arena, id, var, &Name::new(var.as_str(), fsym));
    }
    check_params(diags, coord, &name, formals.len());

    let private = vars.minus(&context);
    let decls: Vec<Decl> = private
        .names()
        .filter_map(|n| scope.decl(n))
        .cloned()
        .collect();

    let proc_ty = Type::new(Spec::Proc, Form::Procedure);
    let dsym = p
        .syms
        .insert(Symbol::new(name.as_str(), proc_ty, ScopeTag::Program));
    let def = ProcDef {
        name: name.clone(),
        sym: dsym,
        ty: proc_ty,
        formals,
        decls,
        body: id,
        coord,
    };
    let mut call = Stmt::new(
        StmtKind::Call {
            name: Name::new(name.as_str(), dsym),
            args: actuals,
        },
        coord,
    );
    call.location = location;
    let call_id = p.arena.alloc(call);
    tracing::debug!(process = %name, captures = captured.len(), "branch materialised");

    // Compositions nested inside the lifted subtree get their own
    // definitions, resolved against the new scope.
    let inner = DefScope::of(p, &def);
    materialize_in(p, cfg, live, names, diags, &inner, def.body, minted);
    minted.push(def);
    call_id
}

fn check_params(diags: &mut Diagnostics, coord: Coord, name: &str, count: usize) {
    if count > sig::MAX_PROC_PARAMETERS {
        diags.report(
            Diagnostic::error(
                coord,
                format!("process '{}' takes {} parameters", name, count),
            )
            .with_code(codes::TOO_MANY_PARAMS)
            .with_hint(format!(
                "the runtime forks with at most {} arguments",
                sig::MAX_PROC_PARAMETERS
            )),
        );
    }
}

// ── Replicator distribution ────────────────────────────────────────────

/// Replace every replicated call with a bounded-fan-out spawn tree.
/// Generated definitions are inserted just before the definition they
/// came from, so `main` stays last.
pub fn transform_rep(
    p: &mut Program,
    cores: i64,
    names: &mut NameAlloc,
    diags: &mut Diagnostics,
) {
    let mut i = 0;
    while i < p.defs.len() {
        let scope = DefScope::of(p, &p.defs[i]);
        let body = p.defs[i].body;
        let mut minted: Vec<ProcDef> = Vec::new();
        distribute_in(p, cores, names, diags, &scope, body, &mut minted);
        let count = minted.len();
        for def in minted.into_iter().rev() {
            p.defs.insert(i, def);
        }
        i += count + 1;
    }
}

fn distribute_in(
    p: &mut Program,
    cores: i64,
    names: &mut NameAlloc,
    diags: &mut Diagnostics,
    scope: &DefScope,
    id: StmtId,
    minted: &mut Vec<ProcDef>,
) {
    if let StmtKind::Rep { indices, body } = p.arena[id].kind.clone() {
        if matches!(p.arena[body].kind, StmtKind::Call { .. }) {
            distribute(p, cores, names, diags, scope, id, body, &indices, minted);
        } else {
            diags.report(
                Diagnostic::error(
                    p.arena[id].coord,
                    "replicator body is not a process call".to_string(),
                )
                .with_code(codes::REP_NOT_CALL)
                .with_hint("parallel materialisation should have produced one".to_string()),
            );
            distribute_in(p, cores, names, diags, scope, body, minted);
        }
        return;
    }
    for child in p.arena.children(id) {
        distribute_in(p, cores, names, diags, scope, child, minted);
    }
}

/// Rewrite one replicated call. The replicator node is overwritten with
/// the root call of the tree; the tree process is pushed onto `minted`.
#[allow(clippy::too_many_arguments)]
fn distribute(
    p: &mut Program,
    cores: i64,
    names: &mut NameAlloc,
    diags: &mut Diagnostics,
    scope: &DefScope,
    rep_id: StmtId,
    body: StmtId,
    indices: &[RepIndex],
    minted: &mut Vec<ProcDef>,
) {
    // Unfoldable bounds were reported during placement.
    if indices
        .iter()
        .any(|ix| ix.base_value.is_none() || ix.count_value.is_none())
    {
        return;
    }
    let coord = p.arena[rep_id].coord;
    let (target, args) = match p.arena[body].kind.clone() {
        StmtKind::Call { name, args } => (name, args),
        _ => return,
    };
    let m = indices::extent_product(indices);

    // A singleton replicates nothing; substitute the one index tuple
    // and call directly.
    if m == 1 {
        let values = indices::index_tuples(indices).remove(0);
        let mut leaf_args = args.clone();
        for (ix, v) in indices.iter().zip(&values) {
            for arg in &mut leaf_args {
                subst::replace_elem_in_expr(
                    arg,
                    &Elem::id(ix.name.as_str(), ix.sym),
                    &Elem::Num(*v),
                );
            }
        }
        p.arena[rep_id].kind = StmtKind::Call {
            name: target,
            args: leaf_args,
        };
        return;
    }

    // Variables the distributed call carries besides the position pair.
    // Index variables are recovered from the position at the leaves.
    let mut context = liveness::uses(&p.arena[body].kind);
    for ix in indices {
        context.remove(&ix.name);
    }
    drop_program_scoped(&p.syms, &mut context);
    let captured: Vec<(String, SymId)> =
        context.iter().map(|(n, s)| (n.to_string(), s)).collect();

    let procid = place::procid_name(p);
    let qname = names.proc_name();
    let val_single = Type::new(Spec::Val, Form::Single);
    let tsym = p.syms.insert(Symbol::new("_t", val_single, ScopeTag::Proc));
    let nsym = p.syms.insert(Symbol::new("_n", val_single, ScopeTag::Proc));

    let mut formals = vec![
        Param {
            name: "_t".to_string(),
            sym: tsym,
            ty: val_single,
            expr: None,
        },
        Param {
            name: "_n".to_string(),
            sym: nsym,
            ty: val_single,
            expr: None,
        },
    ];
    let mut passed: Vec<(String, SymId)> = Vec::with_capacity(captured.len());
    for (var, sym) in &captured {
        let fty = rep_var_to_param(p.syms.get(*sym).ty);
        let fsym = p.syms.insert(Symbol::new(var.as_str(), fty, ScopeTag::Proc));
        formals.push(Param {
            name: var.clone(),
            sym: fsym,
            ty: fty,
            expr: scope.bound(var),
        });
        passed.push((var.clone(), fsym));
    }
    check_params(diags, coord, &qname, formals.len());

    let proc_ty = Type::new(Spec::Proc, Form::Procedure);
    let qsym = p
        .syms
        .insert(Symbol::new(qname.as_str(), proc_ty, ScopeTag::Program));
    let var_single = Type::new(Spec::Var, Form::Single);
    let xsym = p.syms.insert(Symbol::new("_x", var_single, ScopeTag::Proc));

    // Leaf: the original call with each index variable replaced by its
    // decoded position.
    let decodes = indices::decode_exprs(indices, &Elem::id("_t", tsym));
    let mut leaf_args = args.clone();
    for (ix, decoded) in indices.iter().zip(&decodes) {
        for arg in &mut leaf_args {
            substitute_index(arg, ix, decoded);
        }
    }
    let leaf = p.arena.alloc(Stmt::synth(StmtKind::Call {
        name: target,
        args: leaf_args,
    }));

    // Split: halve, keep the low half here, send the high half to the
    // core the low half ends at.
    let half = p.arena.alloc(Stmt::synth(StmtKind::Ass {
        dst: Elem::id("_x", xsym),
        src: Expr::binop(BinOp::Rshift, Elem::id("_n", nsym), Expr::num(1)),
    }));
    let mut hi_args = vec![
        Expr::binop(BinOp::Add, Elem::id("_t", tsym), Expr::id("_x", xsym)),
        Expr::binop(BinOp::Sub, Elem::id("_n", nsym), Expr::id("_x", xsym)),
    ];
    let mut lo_args = vec![Expr::id("_t", tsym), Expr::id("_x", xsym)];
    for (var, fsym) in &passed {
        hi_args.push(Expr::id(var.as_str(), *fsym));
        lo_args.push(Expr::id(var.as_str(), *fsym));
    }
    let hi_call = p.arena.alloc(Stmt::synth(StmtKind::Call {
        name: Name::new(qname.as_str(), qsym),
        args: hi_args,
    }));
    let hi = p.arena.alloc(Stmt::synth(StmtKind::On {
        target: place::form_location(
            Elem::Fcall {
                name: procid,
                args: Vec::new(),
            },
            Expr::id("_x", xsym),
            cores,
        ),
        body: hi_call,
    }));
    let lo = p.arena.alloc(Stmt::synth(StmtKind::Call {
        name: Name::new(qname.as_str(), qsym),
        args: lo_args,
    }));
    let fork = p.arena.alloc(Stmt::synth(StmtKind::Par(vec![hi, lo])));
    let split = p.arena.alloc(Stmt::synth(StmtKind::Seq(vec![half, fork])));
    let qbody = p.arena.alloc(Stmt::synth(StmtKind::If {
        cond: Expr::binop(BinOp::Eq, Elem::id("_n", nsym), Expr::num(1)),
        then_stmt: leaf,
        else_stmt: split,
    }));

    minted.push(ProcDef {
        name: qname.clone(),
        sym: qsym,
        ty: proc_ty,
        formals,
        decls: vec![Decl {
            name: "_x".to_string(),
            sym: xsym,
            ty: var_single,
            expr: None,
            coord: Coord::none(),
        }],
        body: qbody,
        coord,
    });

    let mut root_args = vec![Expr::num(0), Expr::num(m)];
    for (var, sym) in &captured {
        root_args.push(Expr::id(var.as_str(), *sym));
    }
    p.arena[rep_id].kind = StmtKind::Call {
        name: Name::new(qname.as_str(), qsym),
        args: root_args,
    };
    tracing::debug!(process = %qname, extent = m, "replicator distributed");
}

/// Substitute a decoded position for an index variable in a call
/// argument. A bare occurrence takes the expression as is; anything
/// nested gets it parenthesized.
fn substitute_index(arg: &mut Expr, ix: &RepIndex, decoded: &Expr) {
    if let Expr::Single(Elem::Id(n)) = arg {
        if n.name == ix.name {
            *arg = decoded.clone();
            return;
        }
    }
    subst::replace_elem_in_expr(
        arg,
        &Elem::id(ix.name.as_str(), ix.sym),
        &decoded.clone().group(),
    );
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::MAIN_NAME;
    use crate::builder::{bin, ProgramBuilder};
    use crate::cfg;
    use crate::chans;
    use crate::conns;
    use crate::printer::Printer;

    /// The full pass chain up to and including both transformations.
    fn transformed(p: &mut Program, cores: i64) -> Diagnostics {
        let mut diags = Diagnostics::new();
        place::insert_ons(p, cores, &mut diags);
        place::label_locs(p, &mut diags);
        let mut topo = chans::label_chans(p, &mut diags);
        assert!(!diags.has_errors(), "{:?}", diags.iter().collect::<Vec<_>>());
        conns::label_conns(p, &mut topo);
        place::insert_ids(p, &topo);
        conns::insert_conns(p, &topo, cores);
        conns::rename_chans(p, &topo);

        let cfgs = cfg::build(p);
        let live = Liveness::compute(p, &cfgs);
        let mut names = NameAlloc::new();
        transform_par(p, &cfgs, &live, &mut names, &mut diags);
        transform_rep(p, cores, &mut names, &mut diags);
        diags
    }

    #[test]
    fn sequential_branch_becomes_a_process() {
        let mut b = ProgramBuilder::new();
        let mut m = b.proc(MAIN_NAME);
        m.var("a");
        m.var("w");
        let init = m.ass(m.id("a"), Expr::num(3));
        let w1 = m.ass(m.id("w"), bin(BinOp::Add, m.expr_id("a"), Expr::num(1)));
        let pw = m.call("printvalln", vec![m.expr_id("w")]);
        let branch = m.seq(vec![w1, pw]);
        let other = m.call("printval", vec![m.expr_id("a")]);
        let par = m.par(vec![branch, other]);
        let top = m.seq(vec![init, par]);
        m.done(top);
        let mut p = b.build();

        let diags = transformed(&mut p, 4);
        assert!(!diags.has_errors());

        let expected = "proc _p0(var a) is
  var w
  seq {
    w := a + 1
    printvalln(w)
  }

proc _p1(var a) is
  on 1 do
    printval(a)

proc main() is
  var a
  var w
  seq {
    a := 3
    par {
      _p0(a)
      _p1(a)
    }
  }
";
        assert_eq!(Printer::new().program(&p), expected);
    }

    #[test]
    fn written_branch_variable_escapes_by_reference() {
        let mut b = ProgramBuilder::new();
        let mut m = b.proc(MAIN_NAME);
        m.var("r");
        let write = m.ass(m.id("r"), Expr::num(5));
        let other = m.call("printval", vec![Expr::num(1)]);
        let par = m.par(vec![write, other]);
        let read = m.call("printval", vec![m.expr_id("r")]);
        let top = m.seq(vec![par, read]);
        m.done(top);
        let mut p = b.build();

        let diags = transformed(&mut p, 4);
        assert!(!diags.has_errors());

        let expected = "proc _p0(var r) is
  r := 5

proc _p1() is
  on 1 do
    printval(1)

proc main() is
  var r
  seq {
    par {
      _p0(r)
      _p1()
    }
    printval(r)
  }
";
        assert_eq!(Printer::new().program(&p), expected);
    }

    #[test]
    fn replicated_call_distributes_as_a_binary_tree() {
        let mut b = ProgramBuilder::new();
        let mut w = b.proc("worker");
        w.formal_val("i");
        let s = w.call("printval", vec![w.expr_id("i")]);
        w.done(s);

        let mut m = b.proc(MAIN_NAME);
        let ix = m.index("i", Expr::num(0), Expr::num(8));
        let call = m.call("worker", vec![m.expr_id("i")]);
        let rep = m.rep(vec![ix], call);
        m.done(rep);
        let mut p = b.build();

        let diags = transformed(&mut p, 8);
        assert!(!diags.has_errors());

        let expected = "proc worker(val i) is
  printval(i)

proc _p0(val _t, val _n) is
  var _x
  if _n = 1 then
    worker((_t / 1) rem 8)
  else
    seq {
      _x := _n >> 1
      par {
        on (procid() + _x) rem 8 do
          _p0(_t + _x, _n - _x)
        _p0(_t, _x)
      }
    }

proc main() is
  _p0(0, 8)
";
        assert_eq!(Printer::new().program(&p), expected);

        // The tree process carries the position pair and nothing else.
        let q = p.def("_p0").unwrap();
        assert_eq!(q.formals.len(), 2);
    }

    #[test]
    fn materialised_replicator_body_feeds_distribution() {
        let mut b = ProgramBuilder::new();
        let mut m = b.proc(MAIN_NAME);
        m.var("d");
        let init = m.ass(m.id("d"), Expr::num(7));
        let ix = m.index("j", Expr::num(0), Expr::num(4));
        let s1 = m.call("printval", vec![m.expr_id("j")]);
        let s2 = m.call("printvalln", vec![m.expr_id("d")]);
        let body = m.seq(vec![s1, s2]);
        let rep = m.rep(vec![ix], body);
        let top = m.seq(vec![init, rep]);
        m.done(top);
        let mut p = b.build();

        let diags = transformed(&mut p, 4);
        assert!(!diags.has_errors());

        let expected = "proc _p0(val j, var d) is
  seq {
    printval(j)
    printvalln(d)
  }

proc _p1(val _t, val _n, val d) is
  var _x
  if _n = 1 then
    _p0((_t / 1) rem 4, d)
  else
    seq {
      _x := _n >> 1
      par {
        on (procid() + _x) rem 4 do
          _p1(_t + _x, _n - _x, d)
        _p1(_t, _x, d)
      }
    }

proc main() is
  var d
  seq {
    d := 7
    _p1(0, 4, d)
  }
";
        assert_eq!(Printer::new().program(&p), expected);
    }

    #[test]
    fn program_scope_values_stay_global() {
        let mut b = ProgramBuilder::new();
        b.val("size", Expr::num(100));

        let mut w = b.proc("worker");
        w.formal_val("i");
        let s = w.call("printval", vec![w.expr_id("i")]);
        w.done(s);

        let mut m = b.proc(MAIN_NAME);
        m.var("a");
        let init = m.ass(m.id("a"), bin(BinOp::Add, m.expr_id("size"), Expr::num(1)));
        let pr = m.call("printvalln", vec![m.expr_id("a")]);
        let branch = m.seq(vec![init, pr]);
        let other = m.call("printval", vec![m.expr_id("size")]);
        let par = m.par(vec![branch, other]);
        let ix = m.index("i", Expr::num(0), Expr::num(4));
        let wcall = m.call("worker", vec![m.expr_id("size")]);
        let rep = m.rep(vec![ix], wcall);
        let top = m.seq(vec![par, rep]);
        m.done(top);
        let mut p = b.build();

        let diags = transformed(&mut p, 4);
        assert!(!diags.has_errors());

        // `size` is visible from every definition: no formal, no local,
        // no extra tree argument.
        let expected = "val size is 100

proc _p0() is
  var a
  seq {
    a := size + 1
    printvalln(a)
  }

proc _p1() is
  on 1 do
    printval(size)

proc worker(val i) is
  printval(i)

proc _p2(val _t, val _n) is
  var _x
  if _n = 1 then
    worker(size)
  else
    seq {
      _x := _n >> 1
      par {
        on (procid() + _x) rem 4 do
          _p2(_t + _x, _n - _x)
        _p2(_t, _x)
      }
    }

proc main() is
  var a
  seq {
    par {
      _p0()
      _p1()
    }
    _p2(0, 4)
  }
";
        assert_eq!(Printer::new().program(&p), expected);
    }

    #[test]
    fn singleton_replicator_degenerates_to_a_call() {
        let mut b = ProgramBuilder::new();
        let mut w = b.proc("worker");
        w.formal_val("i");
        let s = w.call("printval", vec![w.expr_id("i")]);
        w.done(s);

        let mut m = b.proc(MAIN_NAME);
        let ix = m.index("i", Expr::num(2), Expr::num(1));
        let call = m.call("worker", vec![m.expr_id("i")]);
        let rep = m.rep(vec![ix], call);
        m.done(rep);
        let mut p = b.build();

        let diags = transformed(&mut p, 4);
        assert!(!diags.has_errors());
        assert_eq!(p.defs.len(), 2);

        let text = Printer::new().program(&p);
        assert!(text.contains("worker(2)"), "{}", text);
        assert!(!text.contains("par"), "{}", text);
    }

    #[test]
    fn replicator_body_must_be_a_call() {
        let mut b = ProgramBuilder::new();
        let mut m = b.proc(MAIN_NAME);
        m.var("d");
        let ix = m.index("i", Expr::num(0), Expr::num(4));
        let s = m.ass(m.id("d"), m.expr_id("i"));
        let body = m.seq(vec![s]);
        let rep = m.rep(vec![ix], body);
        m.done(rep);
        let mut p = b.build();

        let mut diags = Diagnostics::new();
        place::insert_ons(&mut p, 4, &mut diags);
        place::label_locs(&mut p, &mut diags);
        let mut names = NameAlloc::new();
        transform_rep(&mut p, 4, &mut names, &mut diags);

        assert!(diags.iter().any(|d| d.code == Some(codes::REP_NOT_CALL)));
        assert_eq!(p.defs.len(), 1);
    }

    #[test]
    fn oversized_capture_set_is_an_error() {
        let mut b = ProgramBuilder::new();
        let mut m = b.proc(MAIN_NAME);
        let mut reads = Vec::new();
        for k in 0..11 {
            let name = format!("v{}", k);
            m.var(&name);
            reads.push(m.call("printval", vec![m.expr_id(&name)]));
        }
        let branch = m.seq(reads);
        let other = m.call("printvalln", vec![Expr::num(0)]);
        let par = m.par(vec![branch, other]);
        m.done(par);
        let mut p = b.build();

        let diags = transformed(&mut p, 4);
        assert!(diags.iter().any(|d| d.code == Some(codes::TOO_MANY_PARAMS)));
    }
}
