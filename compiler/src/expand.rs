// expand.rs — Bounded inline expansion of process bodies.
//
// Calls to small process definitions are replaced by a copy of the
// callee's body: locals are renamed apart and hoisted into the caller,
// actuals are substituted for formals. Definitions are processed in
// declaration order and callees precede callers, so each body is fully
// expanded before anything inlines it; one pass suffices.
//
// Bodies above the size limit keep their call, which distribution later
// moves as a unit. Inlining exists to keep the generated process count
// and call indirection bounded, not to flatten the whole program.

use crate::ast::{Elem, Name, Program, ScopeTag, StmtKind, MAIN_NAME};
use crate::sig;
use crate::subst::{actual_to_elem, clone_subtree, rename_in_stmt, replace_elem_in_stmt};

/// Default largest body, in statement nodes, that will be inlined at a
/// call site.
pub const MAX_INLINE_STMTS: usize = 16;

pub fn expand_procs(p: &mut Program, limit: usize) {
    let mut expander = Expander { count: 0, limit };
    for i in 0..p.defs.len() {
        let body = p.defs[i].body;
        expander.stmt(p, i, body);
    }
}

struct Expander {
    /// Monotone counter making each expansion's renamed locals unique.
    count: u32,
    limit: usize,
}

impl Expander {
    fn stmt(&mut self, p: &mut Program, def_idx: usize, id: crate::ast::StmtId) {
        for child in p.arena.children(id) {
            self.stmt(p, def_idx, child);
        }

        let callee = match &p.arena[id].kind {
            StmtKind::Call { name, args } => {
                if sig::is_builtin(&name.name) || name.name == MAIN_NAME {
                    return;
                }
                match p.def_index(&name.name) {
                    Some(idx) if idx != def_idx => Some((idx, args.clone())),
                    _ => None,
                }
            }
            _ => None,
        };
        let Some((callee_idx, actuals)) = callee else {
            return;
        };

        if p.arena.subtree_size(p.defs[callee_idx].body) > self.limit {
            return;
        }

        let callee_name = p.defs[callee_idx].name.clone();
        let callee_body = p.defs[callee_idx].body;
        let callee_decls = p.defs[callee_idx].decls.clone();
        let callee_formals = p.defs[callee_idx].formals.clone();
        tracing::debug!(callee = %callee_name, "inlining call");

        let copy = clone_subtree(&mut p.arena, callee_body);
        let k = self.count;
        self.count += 1;

        // Rename locals apart before substituting, so actuals cannot
        // capture the callee's declarations.
        for d in &callee_decls {
            let fresh_name = format!("_{}{}_{}", callee_name, k, d.name);
            let mut sym = p.syms[d.sym].clone();
            sym.name = fresh_name.clone();
            sym.scope = ScopeTag::Block;
            let fresh_sym = p.syms.insert(sym);
            let fresh = Name::new(fresh_name.clone(), fresh_sym);
            rename_in_stmt(&mut p.arena, copy, &d.name, &fresh);

            let mut hoisted = d.clone();
            hoisted.name = fresh_name;
            hoisted.sym = fresh_sym;
            p.defs[def_idx].decls.push(hoisted);
        }

        for (formal, actual) in callee_formals.iter().zip(&actuals) {
            let old = Elem::id(formal.name.clone(), formal.sym);
            let new = actual_to_elem(actual);
            replace_elem_in_stmt(&mut p.arena, copy, &old, &new);
        }

        p.arena[id] = p.arena[copy].clone();
    }
}
