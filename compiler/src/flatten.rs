// flatten.rs — Call-wrapper elimination and par flattening.
//
// Two small normalizations that run before anything else:
//
// `flatten_calls` removes wrapper indirection: a definition whose whole
// body is one call to another process is never worth keeping at call
// sites, so calls to it are rewritten to call the target directly, with
// the wrapper's actuals substituted through. Wrapper chains resolve in
// successive rounds; definitions are acyclic so the round count is
// bounded by the definition count. The wrapper definitions themselves
// are left in place for dead-definition elimination downstream.
//
// `flatten_par` splices directly nested parallel compositions into
// their parent, so placement sees one flat branch list per composition.

use std::collections::HashMap;

use crate::ast::{Expr, Name, Program, StmtArena, StmtId, StmtKind, MAIN_NAME};
use crate::subst::{actual_to_elem, replace_elem_in_expr};

// ── flatten_calls ──

#[derive(Debug, Clone)]
struct Wrapper {
    target: Name,
    inner_args: Vec<Expr>,
    formals: Vec<Name>,
}

pub fn flatten_calls(p: &mut Program) {
    let wrappers = collect_wrappers(p);
    if wrappers.is_empty() {
        return;
    }
    tracing::debug!(wrappers = wrappers.len(), "flattening call wrappers");

    // Chains like V -> W -> T settle one link per round.
    let max_rounds = p.defs.len() + 1;
    for _ in 0..max_rounds {
        let mut changed = false;
        for i in 0..p.defs.len() {
            let body = p.defs[i].body;
            changed |= rewrite_calls(&mut p.arena, body, &wrappers);
        }
        if !changed {
            break;
        }
    }
}

fn collect_wrappers(p: &Program) -> HashMap<String, Wrapper> {
    let mut wrappers = HashMap::new();
    for def in &p.defs {
        if def.name == MAIN_NAME || !def.decls.is_empty() {
            continue;
        }
        if let StmtKind::Call { name, args } = &p.arena[def.body].kind {
            if name.name == def.name {
                continue;
            }
            wrappers.insert(
                def.name.clone(),
                Wrapper {
                    target: name.clone(),
                    inner_args: args.clone(),
                    formals: def
                        .formals
                        .iter()
                        .map(|f| Name::new(f.name.clone(), f.sym))
                        .collect(),
                },
            );
        }
    }
    wrappers
}

fn rewrite_calls(arena: &mut StmtArena, id: StmtId, wrappers: &HashMap<String, Wrapper>) -> bool {
    let mut changed = false;
    for child in arena.children(id) {
        changed |= rewrite_calls(arena, child, wrappers);
    }

    let replacement = match &arena[id].kind {
        StmtKind::Call { name, args } => wrappers.get(&name.name).map(|w| {
            let mut new_args = w.inner_args.clone();
            for (formal, actual) in w.formals.iter().zip(args) {
                let old = crate::ast::Elem::Id(formal.clone());
                let new = actual_to_elem(actual);
                for a in &mut new_args {
                    replace_elem_in_expr(a, &old, &new);
                }
            }
            StmtKind::Call {
                name: w.target.clone(),
                args: new_args,
            }
        }),
        _ => None,
    };

    if let Some(kind) = replacement {
        arena[id].kind = kind;
        changed = true;
    }
    changed
}

// ── flatten_par ──

pub fn flatten_par(p: &mut Program) {
    for i in 0..p.defs.len() {
        let body = p.defs[i].body;
        flatten_par_stmt(&mut p.arena, body);
    }
}

fn flatten_par_stmt(arena: &mut StmtArena, id: StmtId) {
    for child in arena.children(id) {
        flatten_par_stmt(arena, child);
    }

    if let StmtKind::Par(items) = &arena[id].kind {
        let items = items.clone();
        let mut flat = Vec::with_capacity(items.len());
        let mut spliced = false;
        for item in items {
            match &arena[item].kind {
                StmtKind::Par(nested) => {
                    flat.extend(nested.iter().copied());
                    spliced = true;
                }
                _ => flat.push(item),
            }
        }
        if spliced {
            arena[id].kind = StmtKind::Par(flat);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinOp;
    use crate::builder::{bin, ProgramBuilder};
    use crate::printer::Printer;

    #[test]
    fn wrapper_calls_substitute_through() {
        let mut b = ProgramBuilder::new();

        let mut target = b.proc("target");
        target.formal_val("p");
        target.formal_val("q");
        let s = target.skip();
        target.done(s);

        // wrap(a, b) is target(b + 1, a)
        let mut wrap = b.proc("wrap");
        wrap.formal_val("a");
        wrap.formal_val("b");
        let call = wrap.call(
            "target",
            vec![
                bin(BinOp::Add, wrap.expr_id("b"), Expr::num(1)),
                wrap.expr_id("a"),
            ],
        );
        wrap.done(call);

        let mut main = b.proc(MAIN_NAME);
        main.var("x");
        let c = main.call("wrap", vec![main.expr_id("x"), Expr::num(2)]);
        main.done(c);
        let mut p = b.build();

        flatten_calls(&mut p);

        let main_body = p.main().unwrap().body;
        match &p.arena[main_body].kind {
            StmtKind::Call { name, args } => {
                assert_eq!(name.name, "target");
                assert_eq!(crate::printer::expr_text(&args[0]), "2 + 1");
                assert_eq!(crate::printer::expr_text(&args[1]), "x");
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn wrapper_chains_resolve() {
        let mut b = ProgramBuilder::new();

        let mut target = b.proc("target");
        target.formal_val("p");
        let s = target.skip();
        target.done(s);

        let mut inner = b.proc("inner");
        inner.formal_val("a");
        let c = inner.call("target", vec![inner.expr_id("a")]);
        inner.done(c);

        let mut outer = b.proc("outer");
        outer.formal_val("a");
        let c = outer.call("inner", vec![outer.expr_id("a")]);
        outer.done(c);

        let mut main = b.proc(MAIN_NAME);
        let c = main.call("outer", vec![Expr::num(7)]);
        main.done(c);
        let mut p = b.build();

        flatten_calls(&mut p);

        let main_body = p.main().unwrap().body;
        match &p.arena[main_body].kind {
            StmtKind::Call { name, args } => {
                assert_eq!(name.name, "target");
                assert_eq!(args[0].as_num(), Some(7));
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn nested_pars_splice() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        let a = main.skip();
        let c = main.skip();
        let d = main.skip();
        let inner = main.par(vec![c, d]);
        let outer = main.par(vec![a, inner]);
        main.done(outer);
        let mut p = b.build();

        flatten_par(&mut p);

        match &p.arena[outer].kind {
            StmtKind::Par(items) => assert_eq!(items, &vec![a, c, d]),
            other => panic!("unexpected kind {:?}", other),
        }

        let mut out = String::new();
        Printer::new().stmt(&mut out, &p, outer, 0);
        assert_eq!(out, "par {\n  skip\n  skip\n  skip\n}\n");
    }
}
