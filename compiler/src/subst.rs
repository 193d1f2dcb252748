// subst.rs — Subtree cloning and substitution over arena statements.
//
// The inlining passes substitute actual parameters for formals, local
// renaming rewrites declared names, and replicator distribution
// substitutes index variables with spawn-tree arithmetic. All three are
// expressed with the walkers here.
//
// Substitution matches structurally (see eval::same_elem), so a formal
// `x` replaces both `x` and subscript bases named `x`. Shadowing is not
// handled; the frontend guarantees names are unique within a definition.

use crate::ast::{Elem, Expr, Name, Stmt, StmtArena, StmtId, StmtKind};
use crate::eval::same_elem;

// ── Cloning ──

/// Deep-clone a statement subtree into fresh arena nodes.
///
/// The clone shares nothing with the original: every statement gets a
/// new id, so the caller may mutate either copy freely.
pub fn clone_subtree(arena: &mut StmtArena, root: StmtId) -> StmtId {
    let Stmt {
        kind,
        coord,
        location,
    } = arena[root].clone();

    let kind = match kind {
        StmtKind::Seq(items) => {
            StmtKind::Seq(items.iter().map(|s| clone_subtree(arena, *s)).collect())
        }
        StmtKind::Par(items) => {
            StmtKind::Par(items.iter().map(|s| clone_subtree(arena, *s)).collect())
        }
        StmtKind::Rep { indices, body } => StmtKind::Rep {
            indices,
            body: clone_subtree(arena, body),
        },
        StmtKind::On { target, body } => StmtKind::On {
            target,
            body: clone_subtree(arena, body),
        },
        StmtKind::If {
            cond,
            then_stmt,
            else_stmt,
        } => StmtKind::If {
            cond,
            then_stmt: clone_subtree(arena, then_stmt),
            else_stmt: clone_subtree(arena, else_stmt),
        },
        StmtKind::While { cond, body } => StmtKind::While {
            cond,
            body: clone_subtree(arena, body),
        },
        StmtKind::For { index, body } => StmtKind::For {
            index,
            body: clone_subtree(arena, body),
        },
        leaf @ (StmtKind::Skip
        | StmtKind::Call { .. }
        | StmtKind::Ass { .. }
        | StmtKind::In { .. }
        | StmtKind::Out { .. }
        | StmtKind::Alias { .. }
        | StmtKind::Connect { .. }
        | StmtKind::Return { .. }) => leaf,
    };

    arena.alloc(Stmt {
        kind,
        coord,
        location,
    })
}

// ── Element substitution ──

/// Convert an actual-parameter expression into an element suitable for
/// substitution into a formal's occurrence sites.
pub fn actual_to_elem(actual: &Expr) -> Elem {
    match actual {
        Expr::Single(elem) => elem.clone(),
        other => Elem::Group(Box::new(other.clone())),
    }
}

/// Replace every occurrence of `old` in an expression with `new`.
pub fn replace_elem_in_expr(expr: &mut Expr, old: &Elem, new: &Elem) {
    match expr {
        Expr::Single(elem) | Expr::Unary { elem, .. } => replace_elem(elem, old, new),
        Expr::Binop { lhs, rhs, .. } => {
            replace_elem(lhs, old, new);
            replace_elem_in_expr(rhs, old, new);
        }
    }
}

fn replace_elem(elem: &mut Elem, old: &Elem, new: &Elem) {
    if same_elem(elem, old) {
        *elem = new.clone();
        return;
    }
    match elem {
        Elem::Sub { index, .. } => replace_elem_in_expr(index, old, new),
        Elem::Slice { base, count, .. } => {
            replace_elem_in_expr(base, old, new);
            replace_elem_in_expr(count, old, new);
        }
        Elem::Group(inner) => replace_elem_in_expr(inner, old, new),
        Elem::Fcall { args, .. } => {
            for a in args {
                replace_elem_in_expr(a, old, new);
            }
        }
        Elem::Id(_) | Elem::Num(_) | Elem::Bool(_) => {}
    }
}

/// Replace every occurrence of `old` throughout a statement subtree,
/// including subscripts, bounds, and attached location expressions.
pub fn replace_elem_in_stmt(arena: &mut StmtArena, root: StmtId, old: &Elem, new: &Elem) {
    let children = arena.children(root);
    let stmt = &mut arena[root];

    if let Some(loc) = &mut stmt.location {
        replace_elem_in_expr(loc, old, new);
    }
    match &mut stmt.kind {
        StmtKind::Rep { indices, .. } => {
            for ix in indices {
                replace_elem_in_expr(&mut ix.base, old, new);
                replace_elem_in_expr(&mut ix.count, old, new);
            }
        }
        StmtKind::On { target, .. } => replace_elem_in_expr(target, old, new),
        StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => {
            replace_elem_in_expr(cond, old, new)
        }
        StmtKind::For { index, .. } => {
            replace_elem_in_expr(&mut index.base, old, new);
            replace_elem_in_expr(&mut index.count, old, new);
        }
        StmtKind::Call { args, .. } => {
            for a in args {
                replace_elem_in_expr(a, old, new);
            }
        }
        StmtKind::Ass { dst, src } => {
            replace_elem(dst, old, new);
            replace_elem_in_expr(src, old, new);
        }
        StmtKind::In { chan, dst } => {
            replace_elem(chan, old, new);
            replace_elem(dst, old, new);
        }
        StmtKind::Out { chan, src } => {
            replace_elem(chan, old, new);
            replace_elem_in_expr(src, old, new);
        }
        StmtKind::Alias { slice, .. } => replace_elem(slice, old, new),
        StmtKind::Connect { chanend, target } => {
            replace_elem(chanend, old, new);
            if let Some(t) = target {
                replace_elem_in_expr(t, old, new);
            }
        }
        StmtKind::Return { expr } => replace_elem_in_expr(expr, old, new),
        StmtKind::Skip | StmtKind::Seq(_) | StmtKind::Par(_) => {}
    }

    for child in children {
        replace_elem_in_stmt(arena, child, old, new);
    }
}

// ── Renaming ──

/// Rewrite every occurrence of a declared name in an expression.
///
/// Unlike element substitution this keeps the occurrence's shape: a
/// subscript `a[e]` renamed to `b` becomes `b[e]`.
pub fn rename_in_expr(expr: &mut Expr, old_name: &str, new: &Name) {
    match expr {
        Expr::Single(elem) | Expr::Unary { elem, .. } => rename_elem(elem, old_name, new),
        Expr::Binop { lhs, rhs, .. } => {
            rename_elem(lhs, old_name, new);
            rename_in_expr(rhs, old_name, new);
        }
    }
}

fn rename_elem(elem: &mut Elem, old_name: &str, new: &Name) {
    match elem {
        Elem::Id(name) => {
            if name.name == old_name {
                *name = new.clone();
            }
        }
        Elem::Sub { name, index } => {
            if name.name == old_name {
                *name = new.clone();
            }
            rename_in_expr(index, old_name, new);
        }
        Elem::Slice { name, base, count } => {
            if name.name == old_name {
                *name = new.clone();
            }
            rename_in_expr(base, old_name, new);
            rename_in_expr(count, old_name, new);
        }
        Elem::Group(inner) => rename_in_expr(inner, old_name, new),
        Elem::Fcall { name, args } => {
            if name.name == old_name {
                *name = new.clone();
            }
            for a in args {
                rename_in_expr(a, old_name, new);
            }
        }
        Elem::Num(_) | Elem::Bool(_) => {}
    }
}

/// Rewrite every occurrence of a declared name throughout a subtree.
pub fn rename_in_stmt(arena: &mut StmtArena, root: StmtId, old_name: &str, new: &Name) {
    let children = arena.children(root);
    let stmt = &mut arena[root];

    if let Some(loc) = &mut stmt.location {
        rename_in_expr(loc, old_name, new);
    }
    match &mut stmt.kind {
        StmtKind::Rep { indices, .. } => {
            for ix in indices {
                rename_in_expr(&mut ix.base, old_name, new);
                rename_in_expr(&mut ix.count, old_name, new);
            }
        }
        StmtKind::On { target, .. } => rename_in_expr(target, old_name, new),
        StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => {
            rename_in_expr(cond, old_name, new)
        }
        StmtKind::For { index, .. } => {
            rename_in_expr(&mut index.base, old_name, new);
            rename_in_expr(&mut index.count, old_name, new);
        }
        StmtKind::Call { args, .. } => {
            for a in args {
                rename_in_expr(a, old_name, new);
            }
        }
        StmtKind::Ass { dst, src } => {
            rename_elem(dst, old_name, new);
            rename_in_expr(src, old_name, new);
        }
        StmtKind::In { chan, dst } => {
            rename_elem(chan, old_name, new);
            rename_elem(dst, old_name, new);
        }
        StmtKind::Out { chan, src } => {
            rename_elem(chan, old_name, new);
            rename_in_expr(src, old_name, new);
        }
        StmtKind::Alias { dst, slice } => {
            if dst.name == old_name {
                *dst = new.clone();
            }
            rename_elem(slice, old_name, new);
        }
        StmtKind::Connect { chanend, target } => {
            rename_elem(chanend, old_name, new);
            if let Some(t) = target {
                rename_in_expr(t, old_name, new);
            }
        }
        StmtKind::Return { expr } => rename_in_expr(expr, old_name, new),
        StmtKind::Skip | StmtKind::Seq(_) | StmtKind::Par(_) => {}
    }

    for child in children {
        rename_in_stmt(arena, child, old_name, new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Stmt, SymId};

    fn sid(n: u32) -> SymId {
        SymId(n)
    }

    #[test]
    fn clone_is_disjoint() {
        let mut arena = StmtArena::new();
        let inner = arena.alloc(Stmt::synth(StmtKind::Skip));
        let root = arena.alloc(Stmt::synth(StmtKind::Seq(vec![inner])));

        let copy = clone_subtree(&mut arena, root);
        assert_ne!(copy, root);
        let copied_children = arena.children(copy);
        assert_eq!(copied_children.len(), 1);
        assert_ne!(copied_children[0], inner);

        arena[copied_children[0]].kind = StmtKind::Return {
            expr: Expr::num(1),
        };
        assert!(matches!(arena[inner].kind, StmtKind::Skip));
    }

    #[test]
    fn substitutes_formal_with_actual() {
        let mut arena = StmtArena::new();
        // x := x + 1, substituting x -> (n - 1)
        let stmt = arena.alloc(Stmt::synth(StmtKind::Ass {
            dst: Elem::id("x", sid(0)),
            src: Expr::binop(BinOp::Add, Elem::id("x", sid(0)), Expr::num(1)),
        }));

        let actual = Expr::binop(BinOp::Sub, Elem::id("n", sid(1)), Expr::num(1));
        let new = actual_to_elem(&actual);
        assert!(matches!(new, Elem::Group(_)));

        replace_elem_in_stmt(&mut arena, stmt, &Elem::id("x", sid(0)), &new);
        match &arena[stmt].kind {
            StmtKind::Ass { dst, src } => {
                assert!(matches!(dst, Elem::Group(_)));
                match src {
                    Expr::Binop { lhs, .. } => assert!(matches!(lhs, Elem::Group(_))),
                    other => panic!("unexpected src {:?}", other),
                }
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn substitution_reaches_subscripts() {
        let mut arena = StmtArena::new();
        // c[i] ! v, substituting i -> 0
        let stmt = arena.alloc(Stmt::synth(StmtKind::Out {
            chan: Elem::sub("c", sid(0), Expr::id("i", sid(1))),
            src: Expr::id("v", sid(2)),
        }));

        replace_elem_in_stmt(&mut arena, stmt, &Elem::id("i", sid(1)), &Elem::num(0));
        match &arena[stmt].kind {
            StmtKind::Out { chan, .. } => match chan {
                Elem::Sub { index, .. } => assert_eq!(index.as_num(), Some(0)),
                other => panic!("unexpected chan {:?}", other),
            },
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn renaming_keeps_subscript_shape() {
        let mut arena = StmtArena::new();
        let stmt = arena.alloc(Stmt::synth(StmtKind::Out {
            chan: Elem::sub("c", sid(0), Expr::id("i", sid(1))),
            src: Expr::num(0),
        }));

        let fresh = Name::new("_main0_c", sid(7));
        rename_in_stmt(&mut arena, stmt, "c", &fresh);
        match &arena[stmt].kind {
            StmtKind::Out { chan, .. } => match chan {
                Elem::Sub { name, index } => {
                    assert_eq!(name.name, "_main0_c");
                    assert_eq!(name.sym, sid(7));
                    assert!(matches!(**index, Expr::Single(Elem::Id(_))));
                }
                other => panic!("unexpected chan {:?}", other),
            },
            other => panic!("unexpected kind {:?}", other),
        }
    }
}
