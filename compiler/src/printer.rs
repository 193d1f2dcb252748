// printer.rs — Canonical text form of Weft programs.
//
// One statement per line, two-space indentation, deterministic ordering
// (decls, then defs, in declaration order). The pipeline fingerprints
// this text to detect divergence between runs, and the snapshot tests
// assert on it, so the format must stay stable: change it deliberately
// or not at all.

use std::fmt::Write as _;

use crate::ast::{
    Decl, Elem, Expr, Form, Param, ProcDef, Program, RepIndex, Spec, StmtId, StmtKind,
};

/// Pretty-printer. `locations` additionally prints each placed
/// statement's location expression as an `@` suffix.
#[derive(Debug, Clone, Default)]
pub struct Printer {
    pub locations: bool,
}

impl Printer {
    pub fn new() -> Self {
        Printer { locations: false }
    }

    pub fn with_locations() -> Self {
        Printer { locations: true }
    }

    pub fn program(&self, p: &Program) -> String {
        let mut out = String::new();
        for d in &p.decls {
            let _ = writeln!(out, "{}", decl_text(d));
        }
        if !p.decls.is_empty() {
            out.push('\n');
        }
        for (i, def) in p.defs.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            self.def(&mut out, p, def);
        }
        out
    }

    fn def(&self, out: &mut String, p: &Program, def: &ProcDef) {
        let kw = if def.ty.spec == Spec::Func {
            "func"
        } else {
            "proc"
        };
        let formals = def
            .formals
            .iter()
            .map(param_text)
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "{} {}({}) is", kw, def.name, formals);
        for d in &def.decls {
            let _ = writeln!(out, "  {}", decl_text(d));
        }
        self.stmt(out, p, def.body, 1);
    }

    /// Render a single statement subtree at the given indent level.
    pub fn stmt(&self, out: &mut String, p: &Program, id: StmtId, level: usize) {
        let pad = "  ".repeat(level);
        let stmt = &p.arena[id];
        let loc = if self.locations {
            match &stmt.location {
                Some(e) => format!("  @ {}", expr_text(e)),
                None => String::new(),
            }
        } else {
            String::new()
        };

        match &stmt.kind {
            StmtKind::Skip => {
                let _ = writeln!(out, "{}skip{}", pad, loc);
            }
            StmtKind::Seq(items) => {
                let _ = writeln!(out, "{}seq {{{}", pad, loc);
                for s in items {
                    self.stmt(out, p, *s, level + 1);
                }
                let _ = writeln!(out, "{}}}", pad);
            }
            StmtKind::Par(items) => {
                let _ = writeln!(out, "{}par {{{}", pad, loc);
                for s in items {
                    self.stmt(out, p, *s, level + 1);
                }
                let _ = writeln!(out, "{}}}", pad);
            }
            StmtKind::Rep { indices, body } => {
                let _ = writeln!(out, "{}par {} do{}", pad, indices_text(indices), loc);
                self.stmt(out, p, *body, level + 1);
            }
            StmtKind::On { target, body } => {
                let _ = writeln!(out, "{}on {} do{}", pad, expr_text(target), loc);
                self.stmt(out, p, *body, level + 1);
            }
            StmtKind::If {
                cond,
                then_stmt,
                else_stmt,
            } => {
                let _ = writeln!(out, "{}if {} then{}", pad, expr_text(cond), loc);
                self.stmt(out, p, *then_stmt, level + 1);
                let _ = writeln!(out, "{}else", pad);
                self.stmt(out, p, *else_stmt, level + 1);
            }
            StmtKind::While { cond, body } => {
                let _ = writeln!(out, "{}while {} do{}", pad, expr_text(cond), loc);
                self.stmt(out, p, *body, level + 1);
            }
            StmtKind::For { index, body } => {
                let _ = writeln!(out, "{}for {} do{}", pad, index_text(index), loc);
                self.stmt(out, p, *body, level + 1);
            }
            StmtKind::Call { name, args } => {
                let args = args
                    .iter()
                    .map(expr_text)
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(out, "{}{}({}){}", pad, name.name, args, loc);
            }
            StmtKind::Ass { dst, src } => {
                let _ = writeln!(out, "{}{} := {}{}", pad, elem_text(dst), expr_text(src), loc);
            }
            StmtKind::In { chan, dst } => {
                let _ = writeln!(out, "{}{} ? {}{}", pad, elem_text(chan), elem_text(dst), loc);
            }
            StmtKind::Out { chan, src } => {
                let _ = writeln!(out, "{}{} ! {}{}", pad, elem_text(chan), expr_text(src), loc);
            }
            StmtKind::Alias { dst, slice } => {
                let _ = writeln!(out, "{}{} aliases {}{}", pad, dst.name, elem_text(slice), loc);
            }
            StmtKind::Connect { chanend, target } => match target {
                Some(t) => {
                    let _ = writeln!(
                        out,
                        "{}connect {} to {}{}",
                        pad,
                        elem_text(chanend),
                        expr_text(t),
                        loc
                    );
                }
                None => {
                    let _ = writeln!(out, "{}connect {}{}", pad, elem_text(chanend), loc);
                }
            },
            StmtKind::Return { expr } => {
                let _ = writeln!(out, "{}return {}{}", pad, expr_text(expr), loc);
            }
        }
    }
}

// ── Fragment renderers ──

pub fn decl_text(d: &Decl) -> String {
    match (d.ty.spec, d.ty.form) {
        (Spec::Val, _) => match &d.expr {
            Some(e) => format!("val {} is {}", d.name, expr_text(e)),
            None => format!("val {}", d.name),
        },
        (Spec::Chan, Form::Array) => match &d.expr {
            Some(e) => format!("chan {}[{}]", d.name, expr_text(e)),
            None => format!("chan {}[]", d.name),
        },
        (Spec::Chan, _) => format!("chan {}", d.name),
        (Spec::ChanEnd, _) => format!("chanend {}", d.name),
        (_, Form::Array) => match &d.expr {
            Some(e) => format!("var {}[{}]", d.name, expr_text(e)),
            None => format!("var {}[]", d.name),
        },
        _ => format!("var {}", d.name),
    }
}

pub fn param_text(p: &Param) -> String {
    let bound = |p: &Param| match &p.expr {
        Some(e) => format!("[{}]", expr_text(e)),
        None => "[]".to_string(),
    };
    match (p.ty.spec, p.ty.form) {
        (Spec::Val, Form::Single) => format!("val {}", p.name),
        (Spec::Chan, Form::Array) => format!("chan {}{}", p.name, bound(p)),
        (Spec::Chan, _) => format!("chan {}", p.name),
        (Spec::ChanEnd, Form::Array) => format!("chanend {}{}", p.name, bound(p)),
        (Spec::ChanEnd, _) => format!("chanend {}", p.name),
        (Spec::Core, _) => format!("core {}", p.name),
        (_, Form::Array) => format!("var {}{}", p.name, bound(p)),
        _ => format!("var {}", p.name),
    }
}

fn indices_text(indices: &[RepIndex]) -> String {
    indices
        .iter()
        .map(index_text)
        .collect::<Vec<_>>()
        .join(", ")
}

fn index_text(ix: &RepIndex) -> String {
    format!(
        "{} in [{} for {}]",
        ix.name,
        expr_text(&ix.base),
        expr_text(&ix.count)
    )
}

pub fn expr_text(e: &Expr) -> String {
    match e {
        Expr::Single(elem) => elem_text(elem),
        Expr::Unary { op, elem } => format!("{}{}", op.symbol(), elem_text(elem)),
        Expr::Binop { op, lhs, rhs } => {
            format!("{} {} {}", elem_text(lhs), op.symbol(), expr_text(rhs))
        }
    }
}

pub fn elem_text(e: &Elem) -> String {
    match e {
        Elem::Id(name) => name.name.clone(),
        Elem::Sub { name, index } => format!("{}[{}]", name.name, expr_text(index)),
        Elem::Slice { name, base, count } => format!(
            "{}[{} for {}]",
            name.name,
            expr_text(base),
            expr_text(count)
        ),
        Elem::Group(inner) => format!("({})", expr_text(inner)),
        Elem::Fcall { name, args } => {
            let args = args.iter().map(expr_text).collect::<Vec<_>>().join(", ");
            format!("{}({})", name.name, args)
        }
        Elem::Num(n) => n.to_string(),
        Elem::Bool(b) => b.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, SymId};

    #[test]
    fn expressions_render_right_leaning() {
        let e = Expr::binop(
            BinOp::Add,
            Elem::id("a", SymId(0)),
            Expr::binop(BinOp::Mul, Elem::id("b", SymId(1)), Expr::num(2)),
        );
        assert_eq!(expr_text(&e), "a + b * 2");

        let grouped = Expr::binop(
            BinOp::Rem,
            Expr::binop(BinOp::Add, Elem::id("x", SymId(2)), Expr::num(1)).group(),
            Expr::num(4),
        );
        assert_eq!(expr_text(&grouped), "(x + 1) rem 4");
    }

    #[test]
    fn elements_render() {
        let sub = Elem::sub("c", SymId(0), Expr::id("i", SymId(1)));
        assert_eq!(elem_text(&sub), "c[i]");

        let slice = Elem::Slice {
            name: crate::ast::Name::new("a", SymId(2)),
            base: Box::new(Expr::num(0)),
            count: Box::new(Expr::num(8)),
        };
        assert_eq!(elem_text(&slice), "a[0 for 8]");
    }
}
