// cfg.rs — Per-statement control-flow side tables.
//
// Builds, for each definition, the pred/succ relation liveness iterates
// over. Edges live here rather than on the statement nodes so that the
// transformation passes can re-home subtrees without invalidating the
// graph (they rebuild it instead; see the pass schedule in pipeline.rs).
//
// Compound statements are region headers: control enters the compound
// node itself and flows to its interior, so a fixed point at the node
// describes the whole region. Loop bodies flow back to their header
// through an edge marked `back`; forward-only queries (live_out) skip
// those.
//
// Preconditions: none beyond a well-formed program.
// Postconditions: every statement reachable from a definition body
//   appears exactly once in that definition's visit order.
// Failure modes: none (graph construction is total).
// Side effects: none.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::ast::{Program, StmtArena, StmtId, StmtKind};

/// A forward control-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub to: StmtId,
    pub back: bool,
}

impl Edge {
    fn forward(to: StmtId) -> Self {
        Edge { to, back: false }
    }

    fn backward(to: StmtId) -> Self {
        Edge { to, back: true }
    }
}

/// Control-flow graph of one definition body.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    /// Preorder visit order; liveness iterates this reversed.
    pub order: Vec<StmtId>,
    pub preds: HashMap<StmtId, Vec<StmtId>>,
    pub succs: HashMap<StmtId, Vec<Edge>>,
}

impl Cfg {
    pub fn succs_of(&self, id: StmtId) -> &[Edge] {
        self.succs.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn preds_of(&self, id: StmtId) -> &[StmtId] {
        self.preds.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Control-flow graphs for every definition, in definition order.
#[derive(Debug, Clone, Default)]
pub struct CfgTable {
    pub defs: IndexMap<String, Cfg>,
}

impl CfgTable {
    pub fn get(&self, def: &str) -> Option<&Cfg> {
        self.defs.get(def)
    }
}

/// Build control-flow side tables for all definitions.
pub fn build(program: &Program) -> CfgTable {
    let mut table = CfgTable::default();
    for def in &program.defs {
        let mut b = Builder {
            arena: &program.arena,
            cfg: Cfg::default(),
        };
        b.visit(def.body, &[]);
        b.finish_preds();
        table.defs.insert(def.name.clone(), b.cfg);
    }
    table
}

struct Builder<'a> {
    arena: &'a StmtArena,
    cfg: Cfg,
}

impl Builder<'_> {
    /// Wire up `node` and its interior. `after` is the edge set control
    /// takes once the whole statement has completed.
    fn visit(&mut self, node: StmtId, after: &[Edge]) {
        self.cfg.order.push(node);

        match &self.arena[node].kind {
            StmtKind::Seq(items) => {
                match items.first() {
                    Some(first) => {
                        self.set_succs(node, vec![Edge::forward(*first)]);
                        for (i, item) in items.iter().enumerate() {
                            let next = match items.get(i + 1) {
                                Some(n) => vec![Edge::forward(*n)],
                                None => after.to_vec(),
                            };
                            self.visit(*item, &next);
                        }
                    }
                    None => self.set_succs(node, after.to_vec()),
                }
            }
            StmtKind::Par(items) => {
                // Branches join at whatever follows the composition.
                self.set_succs(node, items.iter().map(|s| Edge::forward(*s)).collect());
                for item in items {
                    self.visit(*item, after);
                }
            }
            StmtKind::If {
                then_stmt,
                else_stmt,
                ..
            } => {
                let (t, e) = (*then_stmt, *else_stmt);
                self.set_succs(node, vec![Edge::forward(t), Edge::forward(e)]);
                self.visit(t, after);
                self.visit(e, after);
            }
            StmtKind::While { body, .. } | StmtKind::For { body, .. } => {
                let body = *body;
                let mut succs = vec![Edge::forward(body)];
                succs.extend_from_slice(after);
                self.set_succs(node, succs);
                self.visit(body, &[Edge::backward(node)]);
            }
            StmtKind::Rep { body, .. } | StmtKind::On { body, .. } => {
                let body = *body;
                self.set_succs(node, vec![Edge::forward(body)]);
                self.visit(body, after);
            }
            StmtKind::Skip
            | StmtKind::Call { .. }
            | StmtKind::Ass { .. }
            | StmtKind::In { .. }
            | StmtKind::Out { .. }
            | StmtKind::Alias { .. }
            | StmtKind::Connect { .. }
            | StmtKind::Return { .. } => {
                self.set_succs(node, after.to_vec());
            }
        }
    }

    fn set_succs(&mut self, node: StmtId, succs: Vec<Edge>) {
        self.cfg.succs.insert(node, succs);
    }

    fn finish_preds(&mut self) {
        for &n in &self.cfg.order {
            self.cfg.preds.entry(n).or_default();
        }
        for (&from, edges) in &self.cfg.succs {
            for e in edges {
                if let Some(p) = self.cfg.preds.get_mut(&e.to) {
                    p.push(from);
                }
            }
        }
        for p in self.cfg.preds.values_mut() {
            p.sort();
            p.dedup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, MAIN_NAME};
    use crate::builder::ProgramBuilder;

    #[test]
    fn seq_chains_in_order() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        main.var("x");
        let a = main.ass(main.id("x"), Expr::num(1));
        let c = main.ass(main.id("x"), Expr::num(2));
        let seq = main.seq(vec![a, c]);
        main.done(seq);
        let p = b.build();

        let cfgs = build(&p);
        let cfg = cfgs.get(MAIN_NAME).unwrap();
        assert_eq!(cfg.succs_of(seq), &[Edge::forward(a)]);
        assert_eq!(cfg.succs_of(a), &[Edge::forward(c)]);
        assert!(cfg.succs_of(c).is_empty());
        assert_eq!(cfg.preds_of(c), &[a]);
    }

    #[test]
    fn while_body_has_back_edge() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        main.var("x");
        let body = main.ass(main.id("x"), Expr::num(1));
        let w = main.while_stmt(main.expr_id("x"), body);
        let tail = main.ass(main.id("x"), Expr::num(0));
        let seq = main.seq(vec![w, tail]);
        main.done(seq);
        let p = b.build();

        let cfgs = build(&p);
        let cfg = cfgs.get(MAIN_NAME).unwrap();
        assert_eq!(
            cfg.succs_of(w),
            &[Edge::forward(body), Edge::forward(tail)]
        );
        assert_eq!(cfg.succs_of(body), &[Edge::backward(w)]);
    }

    #[test]
    fn par_branches_join_after() {
        let mut b = ProgramBuilder::new();
        let mut main = b.proc(MAIN_NAME);
        main.var("x");
        let b1 = main.skip();
        let b2 = main.skip();
        let par = main.par(vec![b1, b2]);
        let tail = main.ass(main.id("x"), Expr::num(0));
        let seq = main.seq(vec![par, tail]);
        main.done(seq);
        let p = b.build();

        let cfgs = build(&p);
        let cfg = cfgs.get(MAIN_NAME).unwrap();
        assert_eq!(
            cfg.succs_of(par),
            &[Edge::forward(b1), Edge::forward(b2)]
        );
        assert_eq!(cfg.succs_of(b1), &[Edge::forward(tail)]);
        assert_eq!(cfg.succs_of(b2), &[Edge::forward(tail)]);
    }
}
