// builder.rs — Program construction API.
//
// The frontend hands us fully resolved programs through this interface;
// the test suites use it directly. The builder owns name resolution:
// every identifier mentioned through it is resolved against the builtin
// table, program-level declarations, and the current definition's
// formals, locals, and replicator indices, in that order of shadowing.
//
// Construction is bottom-up: allocate leaf statements first, then the
// compounds that reference them. `val` bindings and array bounds are
// constant-folded as they are declared, so downstream passes can rely
// on `Symbol::value`.
//
// Panics on unresolved names and malformed nesting; the API contract is
// that the caller only feeds well-formed, resolved programs.

use std::collections::HashMap;

use crate::ast::{
    Coord, Decl, Elem, Expr, Form, Name, Param, ProcDef, Program, RepIndex, ScopeTag, Spec, Stmt,
    StmtArena, StmtId, StmtKind, SymId, Symbol, Symbols, Type,
};
use crate::eval;
use crate::sig;

/// Join two expressions with a binary operator, grouping a compound
/// left operand to preserve the right-leaning expression shape.
pub fn bin(op: crate::ast::BinOp, lhs: Expr, rhs: Expr) -> Expr {
    let lhs = match lhs {
        Expr::Single(elem) => elem,
        other => other.group(),
    };
    Expr::binop(op, lhs, rhs)
}

// ── Program builder ──

#[derive(Debug)]
pub struct ProgramBuilder {
    decls: Vec<Decl>,
    defs: Vec<ProcDef>,
    syms: Symbols,
    arena: StmtArena,
    program_scope: HashMap<String, SymId>,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        let mut syms = Symbols::new();
        let mut program_scope = HashMap::new();
        for b in sig::BUILTINS {
            let id = syms.insert(Symbol::new(
                b.name,
                Type::new(b.spec, Form::Procedure),
                ScopeTag::Program,
            ));
            program_scope.insert(b.name.to_string(), id);
        }
        ProgramBuilder {
            decls: Vec::new(),
            defs: Vec::new(),
            syms,
            arena: StmtArena::new(),
            program_scope,
        }
    }

    /// Declare a program-level `val` binding. The bound expression must
    /// fold to a constant.
    pub fn val(&mut self, name: &str, expr: Expr) -> SymId {
        let value = eval::fold(&expr, &self.syms);
        let mut sym = Symbol::new(name, Type::new(Spec::Val, Form::Single), ScopeTag::Program);
        sym.value = value;
        let id = self.syms.insert(sym);
        self.program_scope.insert(name.to_string(), id);
        self.decls.push(Decl {
            name: name.to_string(),
            sym: id,
            ty: Type::new(Spec::Val, Form::Single),
            expr: Some(expr),
            coord: Coord::none(),
        });
        id
    }

    /// Begin a process definition. Finish it with [`ProcBuilder::done`].
    pub fn proc(&mut self, name: &str) -> ProcBuilder<'_> {
        ProcBuilder::new(self, name, Spec::Proc)
    }

    /// Begin a function definition.
    pub fn func(&mut self, name: &str) -> ProcBuilder<'_> {
        ProcBuilder::new(self, name, Spec::Func)
    }

    pub fn build(self) -> Program {
        Program {
            decls: self.decls,
            defs: self.defs,
            syms: self.syms,
            arena: self.arena,
        }
    }
}

// ── Definition builder ──

/// Builder for one process or function definition.
///
/// Holds the program builder mutably until [`done`](Self::done) is
/// called, which pushes the finished definition.
#[derive(Debug)]
pub struct ProcBuilder<'a> {
    prog: &'a mut ProgramBuilder,
    name: String,
    sym: SymId,
    spec: Spec,
    formals: Vec<Param>,
    decls: Vec<Decl>,
    local_scope: HashMap<String, SymId>,
}

impl<'a> ProcBuilder<'a> {
    fn new(prog: &'a mut ProgramBuilder, name: &str, spec: Spec) -> Self {
        let sym = prog.syms.insert(Symbol::new(
            name,
            Type::new(spec, Form::Procedure),
            ScopeTag::Program,
        ));
        prog.program_scope.insert(name.to_string(), sym);
        ProcBuilder {
            prog,
            name: name.to_string(),
            sym,
            spec,
            formals: Vec::new(),
            decls: Vec::new(),
            local_scope: HashMap::new(),
        }
    }

    // ── Formals ──

    fn formal(&mut self, name: &str, ty: Type, expr: Option<Expr>) -> SymId {
        let id = self.prog.syms.insert(Symbol::new(name, ty, ScopeTag::Proc));
        self.local_scope.insert(name.to_string(), id);
        self.formals.push(Param {
            name: name.to_string(),
            sym: id,
            ty,
            expr,
        });
        id
    }

    pub fn formal_val(&mut self, name: &str) -> SymId {
        self.formal(name, Type::new(Spec::Val, Form::Single), None)
    }

    pub fn formal_var(&mut self, name: &str) -> SymId {
        self.formal(name, Type::new(Spec::Var, Form::Single), None)
    }

    pub fn formal_array(&mut self, name: &str, bound: Expr) -> SymId {
        self.formal(name, Type::new(Spec::Ref, Form::Array), Some(bound))
    }

    pub fn formal_chan(&mut self, name: &str) -> SymId {
        self.formal(name, Type::new(Spec::Chan, Form::Single), None)
    }

    pub fn formal_chanend(&mut self, name: &str) -> SymId {
        self.formal(name, Type::new(Spec::ChanEnd, Form::Single), None)
    }

    pub fn formal_chan_array(&mut self, name: &str, bound: Expr) -> SymId {
        self.formal(name, Type::new(Spec::Chan, Form::Array), Some(bound))
    }

    // ── Local declarations ──

    fn decl(&mut self, name: &str, ty: Type, expr: Option<Expr>) -> SymId {
        let value = expr.as_ref().and_then(|e| eval::fold(e, &self.prog.syms));
        let mut sym = Symbol::new(name, ty, ScopeTag::Proc);
        sym.value = value;
        let id = self.prog.syms.insert(sym);
        self.local_scope.insert(name.to_string(), id);
        self.decls.push(Decl {
            name: name.to_string(),
            sym: id,
            ty,
            expr,
            coord: Coord::none(),
        });
        id
    }

    pub fn var(&mut self, name: &str) -> SymId {
        self.decl(name, Type::new(Spec::Var, Form::Single), None)
    }

    pub fn array(&mut self, name: &str, bound: Expr) -> SymId {
        self.decl(name, Type::new(Spec::Var, Form::Array), Some(bound))
    }

    pub fn chan(&mut self, name: &str) -> SymId {
        self.decl(name, Type::new(Spec::Chan, Form::Single), None)
    }

    /// Declare an array of channels. The bound must fold to a constant
    /// so channel-topology resolution can enumerate the slots.
    pub fn chan_array(&mut self, name: &str, bound: Expr) -> SymId {
        self.decl(name, Type::new(Spec::Chan, Form::Array), Some(bound))
    }

    // ── Name resolution ──

    pub fn lookup(&self, name: &str) -> SymId {
        self.local_scope
            .get(name)
            .or_else(|| self.prog.program_scope.get(name))
            .copied()
            .unwrap_or_else(|| panic!("undefined name '{}' in '{}'", name, self.name))
    }

    pub fn id(&self, name: &str) -> Elem {
        Elem::id(name, self.lookup(name))
    }

    pub fn sub(&self, name: &str, index: Expr) -> Elem {
        Elem::sub(name, self.lookup(name), index)
    }

    pub fn slice(&self, name: &str, base: Expr, count: Expr) -> Elem {
        Elem::Slice {
            name: Name::new(name, self.lookup(name)),
            base: Box::new(base),
            count: Box::new(count),
        }
    }

    pub fn expr_id(&self, name: &str) -> Expr {
        Expr::Single(self.id(name))
    }

    pub fn fcall(&self, name: &str, args: Vec<Expr>) -> Elem {
        Elem::Fcall {
            name: Name::new(name, self.lookup(name)),
            args,
        }
    }

    /// Bind a replicator or loop index. Call before building the body
    /// that uses it.
    pub fn index(&mut self, name: &str, base: Expr, count: Expr) -> RepIndex {
        let id = self
            .prog
            .syms
            .insert(Symbol::new(name, Type::new(Spec::Val, Form::Single), ScopeTag::Proc));
        self.local_scope.insert(name.to_string(), id);
        RepIndex::new(name, id, base, count)
    }

    // ── Statements ──

    fn alloc(&mut self, kind: StmtKind) -> StmtId {
        self.prog.arena.alloc(Stmt::synth(kind))
    }

    pub fn skip(&mut self) -> StmtId {
        self.alloc(StmtKind::Skip)
    }

    pub fn seq(&mut self, items: Vec<StmtId>) -> StmtId {
        self.alloc(StmtKind::Seq(items))
    }

    pub fn par(&mut self, items: Vec<StmtId>) -> StmtId {
        self.alloc(StmtKind::Par(items))
    }

    pub fn rep(&mut self, indices: Vec<RepIndex>, body: StmtId) -> StmtId {
        self.alloc(StmtKind::Rep { indices, body })
    }

    pub fn on(&mut self, target: Expr, body: StmtId) -> StmtId {
        self.alloc(StmtKind::On { target, body })
    }

    pub fn if_stmt(&mut self, cond: Expr, then_stmt: StmtId, else_stmt: StmtId) -> StmtId {
        self.alloc(StmtKind::If {
            cond,
            then_stmt,
            else_stmt,
        })
    }

    pub fn while_stmt(&mut self, cond: Expr, body: StmtId) -> StmtId {
        self.alloc(StmtKind::While { cond, body })
    }

    pub fn for_stmt(&mut self, index: RepIndex, body: StmtId) -> StmtId {
        self.alloc(StmtKind::For { index, body })
    }

    /// A process call, resolved against definitions built so far and
    /// the builtin table.
    pub fn call(&mut self, name: &str, args: Vec<Expr>) -> StmtId {
        let sym = self.lookup(name);
        self.alloc(StmtKind::Call {
            name: Name::new(name, sym),
            args,
        })
    }

    pub fn ass(&mut self, dst: Elem, src: Expr) -> StmtId {
        self.alloc(StmtKind::Ass { dst, src })
    }

    pub fn input(&mut self, chan: Elem, dst: Elem) -> StmtId {
        self.alloc(StmtKind::In { chan, dst })
    }

    pub fn output(&mut self, chan: Elem, src: Expr) -> StmtId {
        self.alloc(StmtKind::Out { chan, src })
    }

    pub fn alias(&mut self, dst: &str, slice: Elem) -> StmtId {
        let sym = self.lookup(dst);
        self.alloc(StmtKind::Alias {
            dst: Name::new(dst, sym),
            slice,
        })
    }

    pub fn ret(&mut self, expr: Expr) -> StmtId {
        self.alloc(StmtKind::Return { expr })
    }

    /// Finish the definition with the given body.
    pub fn done(self, body: StmtId) {
        let def = ProcDef {
            name: self.name,
            sym: self.sym,
            ty: Type::new(self.spec, Form::Procedure),
            formals: self.formals,
            decls: self.decls,
            body,
            coord: Coord::none(),
        };
        self.prog.defs.push(def);
    }
}
