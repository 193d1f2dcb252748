// children.rs — transitive descendant sets per process definition.
//
// After distribution every process the runtime can fork is a named
// definition called somewhere in the tree. Code generation sizes per-core
// closure and jump tables from the set of definitions reachable from each
// entry point, so the final pass records, for every definition, the names
// of all definitions and mobile builtins its body reaches through process
// calls and function-call elements.
//
// Preconditions: materialisation and distribution have run, so every
//   reachable process is a named definition or a builtin.
// Postconditions: the returned table maps every definition name to its
//   descendant names, duplicate-free, in first-encounter order.
// Failure modes: none. The walk is total and the closure terminates
//   because the name universe is finite and lists only grow.
// Side effects: none. The program is read, never changed.

use indexmap::IndexMap;

use crate::ast::{Elem, Expr, Program, StmtId, StmtKind};
use crate::sig;

/// Descendant names per process definition.
///
/// Mobile builtins appear as descendants but have no entry of their own;
/// non-mobile builtins are host services and never travel with a process,
/// so they are left out entirely.
#[derive(Debug, Default)]
pub struct ChildTable {
    pub procs: IndexMap<String, Vec<String>>,
}

impl ChildTable {
    pub fn of(&self, name: &str) -> &[String] {
        self.procs.get(name).map_or(&[], |v| v.as_slice())
    }
}

/// Collect the descendant set of every definition and close it
/// transitively.
pub fn children(p: &Program) -> ChildTable {
    let mut table = ChildTable::default();
    for def in &p.defs {
        let mut kids = Vec::new();
        collect(p, def.body, &def.name, &mut kids);
        tracing::debug!(process = %def.name, immediate = kids.len(), "children collected");
        table.procs.insert(def.name.clone(), kids);
    }
    close(&mut table);
    table
}

// ── Immediate children ──

fn collect(p: &Program, id: StmtId, parent: &str, kids: &mut Vec<String>) {
    stmt_calls(&p.arena[id].kind, parent, kids);
    for child in p.arena.children(id) {
        collect(p, child, parent, kids);
    }
}

fn stmt_calls(kind: &StmtKind, parent: &str, kids: &mut Vec<String>) {
    match kind {
        StmtKind::Skip | StmtKind::Seq(_) | StmtKind::Par(_) => {}
        StmtKind::Rep { indices, .. } => {
            for ix in indices {
                expr_calls(&ix.base, parent, kids);
                expr_calls(&ix.count, parent, kids);
            }
        }
        StmtKind::For { index, .. } => {
            expr_calls(&index.base, parent, kids);
            expr_calls(&index.count, parent, kids);
        }
        StmtKind::On { target, .. } => expr_calls(target, parent, kids),
        StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => {
            expr_calls(cond, parent, kids)
        }
        StmtKind::Call { name, args } => {
            add_child(parent, &name.name, kids);
            for a in args {
                expr_calls(a, parent, kids);
            }
        }
        StmtKind::Ass { dst, src } => {
            elem_calls(dst, parent, kids);
            expr_calls(src, parent, kids);
        }
        StmtKind::In { chan, dst } => {
            elem_calls(chan, parent, kids);
            elem_calls(dst, parent, kids);
        }
        StmtKind::Out { chan, src } => {
            elem_calls(chan, parent, kids);
            expr_calls(src, parent, kids);
        }
        StmtKind::Alias { slice, .. } => elem_calls(slice, parent, kids),
        StmtKind::Connect { chanend, target } => {
            elem_calls(chanend, parent, kids);
            if let Some(t) = target {
                expr_calls(t, parent, kids);
            }
        }
        StmtKind::Return { expr } => expr_calls(expr, parent, kids),
    }
}

fn expr_calls(expr: &Expr, parent: &str, kids: &mut Vec<String>) {
    match expr {
        Expr::Single(elem) | Expr::Unary { elem, .. } => elem_calls(elem, parent, kids),
        Expr::Binop { lhs, rhs, .. } => {
            elem_calls(lhs, parent, kids);
            expr_calls(rhs, parent, kids);
        }
    }
}

fn elem_calls(elem: &Elem, parent: &str, kids: &mut Vec<String>) {
    match elem {
        Elem::Fcall { name, args } => {
            add_child(parent, &name.name, kids);
            for a in args {
                expr_calls(a, parent, kids);
            }
        }
        Elem::Sub { index, .. } => expr_calls(index, parent, kids),
        Elem::Slice { base, count, .. } => {
            expr_calls(base, parent, kids);
            expr_calls(count, parent, kids);
        }
        Elem::Group(inner) => expr_calls(inner, parent, kids),
        Elem::Id(_) | Elem::Num(_) | Elem::Bool(_) => {}
    }
}

/// Record one child, skipping self-recursion, duplicates and non-mobile
/// builtins.
fn add_child(parent: &str, name: &str, kids: &mut Vec<String>) {
    if name == parent {
        return;
    }
    if let Some(b) = sig::builtin(name) {
        if !b.mobile {
            return;
        }
    }
    if !kids.iter().any(|k| k == name) {
        kids.push(name.to_string());
    }
}

// ── Transitive closure ──

/// Grow each list with its children's children until nothing new appears.
fn close(table: &mut ChildTable) {
    let names: Vec<String> = table.procs.keys().cloned().collect();
    loop {
        let mut grown = false;
        for x in &names {
            let mut added: Vec<String> = Vec::new();
            let kids = &table.procs[x.as_str()];
            for y in kids {
                // Mobile builtins have no definition and no entry.
                let Some(grand) = table.procs.get(y.as_str()) else {
                    continue;
                };
                for z in grand {
                    if z != x && !kids.contains(z) && !added.contains(z) {
                        added.push(z.clone());
                    }
                }
            }
            if !added.is_empty() {
                grown = true;
                table.procs[x.as_str()].extend(added);
            }
        }
        if !grown {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::MAIN_NAME;
    use crate::builder::ProgramBuilder;

    #[test]
    fn call_chain_closes_transitively() {
        let mut b = ProgramBuilder::new();
        let mut s = b.proc("sink");
        let body = s.call("printval", vec![Expr::num(1)]);
        s.done(body);

        let mut r = b.proc("relay");
        let body = r.call("sink", vec![]);
        r.done(body);

        let mut m = b.proc(MAIN_NAME);
        let body = m.call("relay", vec![]);
        m.done(body);
        let p = b.build();

        let table = children(&p);
        assert_eq!(table.of(MAIN_NAME), ["relay", "sink"]);
        assert_eq!(table.of("relay"), ["sink"]);
        // printval is a host service, not a descendant.
        assert!(table.of("sink").is_empty());
    }

    #[test]
    fn function_call_elements_count_as_children() {
        let mut b = ProgramBuilder::new();
        let mut w = b.proc("worker");
        w.formal_val("i");
        let body = w.skip();
        w.done(body);

        let mut m = b.proc(MAIN_NAME);
        let arg = Expr::Single(m.fcall("procid", vec![]));
        let body = m.call("worker", vec![arg]);
        m.done(body);
        let p = b.build();

        let table = children(&p);
        assert_eq!(table.of(MAIN_NAME), ["worker", "procid"]);
        assert!(table.of("worker").is_empty());
    }

    #[test]
    fn recursion_does_not_list_itself() {
        let mut b = ProgramBuilder::new();
        let mut f = b.proc("ping");
        let again = f.call("ping", vec![]);
        let out = f.call("printvalln", vec![Expr::num(0)]);
        let body = f.seq(vec![out, again]);
        f.done(body);

        let mut m = b.proc(MAIN_NAME);
        let body = m.call("ping", vec![]);
        m.done(body);
        let p = b.build();

        let table = children(&p);
        assert!(table.of("ping").is_empty());
        assert_eq!(table.of(MAIN_NAME), ["ping"]);
    }
}
