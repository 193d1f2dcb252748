// eval.rs — Constant folding and structural comparison of expressions.
//
// Folding is best-effort: it returns `None` for anything that is not a
// compile-time constant (subscripts, function calls, unbound names,
// division by zero, overflow). Placement checking and replicator
// distribution only proceed where folding succeeds, and report a
// diagnostic otherwise.
//
// Division and remainder follow floor semantics, so `(-7) / 2` folds to
// `-4` and `x rem n` is non-negative for positive `n`. The spawn-tree
// arithmetic in transform.rs depends on this.

use crate::ast::{BinOp, Elem, Expr, Spec, Symbols, UnOp};

/// Fold an expression to a constant, if it is one.
pub fn fold(expr: &Expr, syms: &Symbols) -> Option<i64> {
    match expr {
        Expr::Single(elem) => fold_elem(elem, syms),
        Expr::Unary { op, elem } => {
            let v = fold_elem(elem, syms)?;
            match op {
                UnOp::Neg => v.checked_neg(),
                UnOp::Not => Some(!v),
            }
        }
        Expr::Binop { op, lhs, rhs } => {
            let a = fold_elem(lhs, syms)?;
            let b = fold(rhs, syms)?;
            fold_binop(*op, a, b)
        }
    }
}

/// Fold an element to a constant, if it is one.
///
/// Identifiers fold through the symbol arena when they name a `val`
/// binding whose value is known. Everything else that is not a literal
/// or a group stays symbolic.
pub fn fold_elem(elem: &Elem, syms: &Symbols) -> Option<i64> {
    match elem {
        Elem::Num(n) => Some(*n),
        Elem::Bool(b) => Some(if *b { 1 } else { 0 }),
        Elem::Group(inner) => fold(inner, syms),
        Elem::Id(name) => {
            let sym = &syms[name.sym];
            if sym.ty.spec == Spec::Val {
                sym.value
            } else {
                None
            }
        }
        Elem::Sub { .. } | Elem::Slice { .. } | Elem::Fcall { .. } => None,
    }
}

fn fold_binop(op: BinOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => floor_div(a, b),
        BinOp::Rem => floor_rem(a, b),
        BinOp::Or => Some(a | b),
        BinOp::And => Some(a & b),
        BinOp::Xor => Some(a ^ b),
        BinOp::Lshift => {
            if (0..64).contains(&b) {
                a.checked_shl(b as u32)
            } else {
                None
            }
        }
        BinOp::Rshift => {
            if (0..64).contains(&b) {
                a.checked_shr(b as u32)
            } else {
                None
            }
        }
        BinOp::Lt => Some((a < b) as i64),
        BinOp::Gt => Some((a > b) as i64),
        BinOp::Le => Some((a <= b) as i64),
        BinOp::Ge => Some((a >= b) as i64),
        BinOp::Eq => Some((a == b) as i64),
        BinOp::Ne => Some((a != b) as i64),
    }
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    if b == 0 {
        return None;
    }
    let q = a.checked_div(b)?;
    if a % b != 0 && (a < 0) != (b < 0) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

fn floor_rem(a: i64, b: i64) -> Option<i64> {
    let q = floor_div(a, b)?;
    Some(a - b * q)
}

// ── Structural comparison ──

/// Structural equality of expressions.
///
/// Compares names, operators, and literals; symbol ids are ignored so
/// that occurrences resolved at different times still compare equal.
pub fn same_expr(a: &Expr, b: &Expr) -> bool {
    match (a, b) {
        (Expr::Single(x), Expr::Single(y)) => same_elem(x, y),
        (Expr::Unary { op: oa, elem: ea }, Expr::Unary { op: ob, elem: eb }) => {
            oa == ob && same_elem(ea, eb)
        }
        (
            Expr::Binop {
                op: oa,
                lhs: la,
                rhs: ra,
            },
            Expr::Binop {
                op: ob,
                lhs: lb,
                rhs: rb,
            },
        ) => oa == ob && same_elem(la, lb) && same_expr(ra, rb),
        _ => false,
    }
}

/// Structural equality of elements. See [`same_expr`].
pub fn same_elem(a: &Elem, b: &Elem) -> bool {
    match (a, b) {
        (Elem::Id(x), Elem::Id(y)) => x.name == y.name,
        (Elem::Sub { name: na, index: ia }, Elem::Sub { name: nb, index: ib }) => {
            na.name == nb.name && same_expr(ia, ib)
        }
        (
            Elem::Slice {
                name: na,
                base: ba,
                count: ca,
            },
            Elem::Slice {
                name: nb,
                base: bb,
                count: cb,
            },
        ) => na.name == nb.name && same_expr(ba, bb) && same_expr(ca, cb),
        (Elem::Group(x), Elem::Group(y)) => same_expr(x, y),
        (Elem::Fcall { name: na, args: aa }, Elem::Fcall { name: nb, args: ab }) => {
            na.name == nb.name
                && aa.len() == ab.len()
                && aa.iter().zip(ab).all(|(x, y)| same_expr(x, y))
        }
        (Elem::Num(x), Elem::Num(y)) => x == y,
        (Elem::Bool(x), Elem::Bool(y)) => x == y,
        _ => false,
    }
}
