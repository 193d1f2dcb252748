// ast.rs — Core syntax tree for Weft programs.
//
// Statements live in a program-wide arena and are referenced by integer
// `StmtId` handles, so transformation passes can re-home whole subtrees
// (e.g. when a par branch is materialized into a fresh process definition)
// without moving nodes or rebuilding parent links. Control-flow edges are
// kept in side tables (see cfg.rs), never on the nodes themselves.
//
// Expressions are right-leaning: a binary operator always has an element
// on the left and a full expression on the right. The printer and the
// constant folder both rely on this shape.

use std::fmt;
use std::ops::{Index, IndexMut};

// ── Source coordinates ──

/// A line/column position in the source the frontend handed us.
///
/// Synthetic nodes minted by transformation passes carry `Coord::none()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coord {
    pub line: u32,
    pub col: u32,
}

impl Coord {
    pub const fn new(line: u32, col: u32) -> Self {
        Coord { line, col }
    }

    /// Coordinate for nodes with no source position.
    pub const fn none() -> Self {
        Coord { line: 0, col: 0 }
    }

    pub fn is_none(&self) -> bool {
        self.line == 0 && self.col == 0
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "<generated>")
        } else {
            write!(f, "{}:{}", self.line, self.col)
        }
    }
}

// ── Types ──

/// What kind of thing a name denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spec {
    Proc,
    Func,
    Val,
    Var,
    Ref,
    Chan,
    ChanEnd,
    Core,
}

/// The shape of the denoted thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Form {
    Single,
    Array,
    Sub,
    Procedure,
}

/// A type is a specifier and a form, e.g. `chan array` or `val single`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type {
    pub spec: Spec,
    pub form: Form,
}

impl Type {
    pub const fn new(spec: Spec, form: Form) -> Self {
        Type { spec, form }
    }

    pub fn is_chan(&self) -> bool {
        self.spec == Spec::Chan
    }

    pub fn is_chanend(&self) -> bool {
        self.spec == Spec::ChanEnd
    }

    pub fn is_array(&self) -> bool {
        self.form == Form::Array
    }

    pub fn is_single(&self) -> bool {
        self.form == Form::Single
    }

    /// Same specifier, array form.
    pub fn as_array(&self) -> Type {
        Type::new(self.spec, Form::Array)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spec = match self.spec {
            Spec::Proc => "proc",
            Spec::Func => "func",
            Spec::Val => "val",
            Spec::Var => "var",
            Spec::Ref => "ref",
            Spec::Chan => "chan",
            Spec::ChanEnd => "chanend",
            Spec::Core => "core",
        };
        let form = match self.form {
            Form::Single => "single",
            Form::Array => "array",
            Form::Sub => "sub",
            Form::Procedure => "procedure",
        };
        write!(f, "{} {}", spec, form)
    }
}

// ── Symbols ──

/// Handle into the program's symbol arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymId(pub u32);

/// Where a name was introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTag {
    /// Program-level declarations and builtins. Never captured.
    Program,
    /// Process formals and locals.
    Proc,
    /// Declarations introduced by transformation passes.
    Block,
    /// Server-side declarations. Accepted from upstream; no pass mints these.
    Server,
    /// Client-side declarations. Accepted from upstream; no pass mints these.
    Client,
}

/// An entry in the symbol arena.
///
/// `value` is the folded constant for `val` bindings and array bounds,
/// filled in at construction time when the binding folds to a literal.
/// Channel-use expansion and replicator distribution both require these
/// values to be present.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub scope: ScopeTag,
    pub value: Option<i64>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, ty: Type, scope: ScopeTag) -> Self {
        Symbol {
            name: name.into(),
            ty,
            scope,
            value: None,
        }
    }
}

/// Program-wide symbol arena.
///
/// Transformation passes mint fresh symbols for the variables they
/// introduce (`_pid`, chanends, spawn-tree counters); ids are never
/// reused or removed.
#[derive(Debug, Clone, Default)]
pub struct Symbols {
    entries: Vec<Symbol>,
}

impl Symbols {
    pub fn new() -> Self {
        Symbols::default()
    }

    pub fn insert(&mut self, sym: Symbol) -> SymId {
        let id = SymId(self.entries.len() as u32);
        self.entries.push(sym);
        id
    }

    pub fn get(&self, id: SymId) -> &Symbol {
        &self.entries[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymId) -> &mut Symbol {
        &mut self.entries[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymId, &Symbol)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, s)| (SymId(i as u32), s))
    }
}

impl Index<SymId> for Symbols {
    type Output = Symbol;

    fn index(&self, id: SymId) -> &Symbol {
        self.get(id)
    }
}

impl IndexMut<SymId> for Symbols {
    fn index_mut(&mut self, id: SymId) -> &mut Symbol {
        self.get_mut(id)
    }
}

// ── Elements ──

/// A named occurrence: identifier plus its symbol.
#[derive(Debug, Clone)]
pub struct Name {
    pub name: String,
    pub sym: SymId,
}

impl Name {
    pub fn new(name: impl Into<String>, sym: SymId) -> Self {
        Name {
            name: name.into(),
            sym,
        }
    }
}

/// The atomic operands of expressions.
#[derive(Debug, Clone)]
pub enum Elem {
    /// A variable or channel occurrence.
    Id(Name),
    /// A subscripted array occurrence `a[e]`.
    Sub { name: Name, index: Box<Expr> },
    /// An array slice `a[base for count]`.
    Slice {
        name: Name,
        base: Box<Expr>,
        count: Box<Expr>,
    },
    /// A parenthesized expression.
    Group(Box<Expr>),
    /// A function call in expression position.
    Fcall { name: Name, args: Vec<Expr> },
    /// An integer literal.
    Num(i64),
    /// A boolean literal.
    Bool(bool),
}

impl Elem {
    pub fn id(name: impl Into<String>, sym: SymId) -> Self {
        Elem::Id(Name::new(name, sym))
    }

    pub fn sub(name: impl Into<String>, sym: SymId, index: Expr) -> Self {
        Elem::Sub {
            name: Name::new(name, sym),
            index: Box::new(index),
        }
    }

    pub fn num(value: i64) -> Self {
        Elem::Num(value)
    }

    /// The identifier this element names, if it names one.
    pub fn base_name(&self) -> Option<&Name> {
        match self {
            Elem::Id(n) => Some(n),
            Elem::Sub { name, .. } => Some(name),
            Elem::Slice { name, .. } => Some(name),
            Elem::Fcall { name, .. } => Some(name),
            Elem::Group(_) | Elem::Num(_) | Elem::Bool(_) => None,
        }
    }
}

// ── Expressions ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

impl UnOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Or,
    And,
    Xor,
    Lshift,
    Rshift,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "rem",
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Xor => "xor",
            BinOp::Lshift => "<<",
            BinOp::Rshift => ">>",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Eq => "=",
            BinOp::Ne => "~=",
        }
    }
}

/// Right-leaning expression: binary operators chain through `rhs`.
#[derive(Debug, Clone)]
pub enum Expr {
    Single(Elem),
    Unary { op: UnOp, elem: Elem },
    Binop { op: BinOp, lhs: Elem, rhs: Box<Expr> },
}

impl Expr {
    pub fn single(elem: Elem) -> Self {
        Expr::Single(elem)
    }

    pub fn num(value: i64) -> Self {
        Expr::Single(Elem::Num(value))
    }

    pub fn id(name: impl Into<String>, sym: SymId) -> Self {
        Expr::Single(Elem::id(name, sym))
    }

    pub fn binop(op: BinOp, lhs: Elem, rhs: Expr) -> Self {
        Expr::Binop {
            op,
            lhs,
            rhs: Box::new(rhs),
        }
    }

    /// Wrap in a group element, for use as a binop operand.
    pub fn group(self) -> Elem {
        Elem::Group(Box::new(self))
    }

    /// The literal value, if this is a bare number.
    pub fn as_num(&self) -> Option<i64> {
        match self {
            Expr::Single(Elem::Num(n)) => Some(*n),
            _ => None,
        }
    }
}

// ── Replicator indices ──

/// One index of a replicator or for loop: `name in [base for count]`.
///
/// `base_value` and `count_value` are the folded bounds, filled in during
/// placement checking. Distribution requires them to be known.
#[derive(Debug, Clone)]
pub struct RepIndex {
    pub name: String,
    pub sym: SymId,
    pub base: Expr,
    pub count: Expr,
    pub base_value: Option<i64>,
    pub count_value: Option<i64>,
}

impl RepIndex {
    pub fn new(name: impl Into<String>, sym: SymId, base: Expr, count: Expr) -> Self {
        RepIndex {
            name: name.into(),
            sym,
            base,
            count,
            base_value: None,
            count_value: None,
        }
    }
}

// ── Statements ──

/// Handle into the statement arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub u32);

impl fmt::Display for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Skip,
    Seq(Vec<StmtId>),
    Par(Vec<StmtId>),
    Rep {
        indices: Vec<RepIndex>,
        body: StmtId,
    },
    On {
        target: Expr,
        body: StmtId,
    },
    If {
        cond: Expr,
        then_stmt: StmtId,
        else_stmt: StmtId,
    },
    While {
        cond: Expr,
        body: StmtId,
    },
    For {
        index: RepIndex,
        body: StmtId,
    },
    /// A process call.
    Call {
        name: Name,
        args: Vec<Expr>,
    },
    Ass {
        dst: Elem,
        src: Expr,
    },
    /// Channel input `chan ? dst`.
    In {
        chan: Elem,
        dst: Elem,
    },
    /// Channel output `chan ! src`.
    Out {
        chan: Elem,
        src: Expr,
    },
    /// Array alias `dst aliases src[base for count]`.
    Alias {
        dst: Name,
        slice: Elem,
    },
    /// Connect a chanend, as master (`target` set) or slave.
    Connect {
        chanend: Elem,
        target: Option<Expr>,
    },
    Return {
        expr: Expr,
    },
}

/// A statement node: kind, source coordinate, and the placement
/// expression attached by location labelling (relative to the placement
/// of the enclosing scope).
#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub coord: Coord,
    pub location: Option<Expr>,
}

impl Stmt {
    pub fn new(kind: StmtKind, coord: Coord) -> Self {
        Stmt {
            kind,
            coord,
            location: None,
        }
    }

    /// Synthetic statement with no source position.
    pub fn synth(kind: StmtKind) -> Self {
        Stmt::new(kind, Coord::none())
    }
}

// ── Statement arena ──

/// Program-wide statement storage.
///
/// Nodes are never removed; a pass that replaces a statement overwrites
/// the node in place (so parent references stay valid) or re-points the
/// parent at a freshly allocated node. Orphaned nodes are harmless.
#[derive(Debug, Clone, Default)]
pub struct StmtArena {
    nodes: Vec<Stmt>,
}

impl StmtArena {
    pub fn new() -> Self {
        StmtArena::default()
    }

    pub fn alloc(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(self.nodes.len() as u32);
        self.nodes.push(stmt);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of statement nodes in a subtree, the root included.
    pub fn subtree_size(&self, id: StmtId) -> usize {
        1 + self
            .children(id)
            .into_iter()
            .map(|c| self.subtree_size(c))
            .sum::<usize>()
    }

    /// Immediate child statements of a node, in syntactic order.
    pub fn children(&self, id: StmtId) -> Vec<StmtId> {
        match &self[id].kind {
            StmtKind::Seq(items) | StmtKind::Par(items) => items.clone(),
            StmtKind::Rep { body, .. }
            | StmtKind::On { body, .. }
            | StmtKind::While { body, .. }
            | StmtKind::For { body, .. } => vec![*body],
            StmtKind::If {
                then_stmt,
                else_stmt,
                ..
            } => vec![*then_stmt, *else_stmt],
            StmtKind::Skip
            | StmtKind::Call { .. }
            | StmtKind::Ass { .. }
            | StmtKind::In { .. }
            | StmtKind::Out { .. }
            | StmtKind::Alias { .. }
            | StmtKind::Connect { .. }
            | StmtKind::Return { .. } => Vec::new(),
        }
    }
}

impl Index<StmtId> for StmtArena {
    type Output = Stmt;

    fn index(&self, id: StmtId) -> &Stmt {
        &self.nodes[id.0 as usize]
    }
}

impl IndexMut<StmtId> for StmtArena {
    fn index_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.nodes[id.0 as usize]
    }
}

// ── Declarations and definitions ──

/// A variable, value, or channel declaration.
#[derive(Debug, Clone)]
pub struct Decl {
    pub name: String,
    pub sym: SymId,
    pub ty: Type,
    /// Array bound or `val` binding expression.
    pub expr: Option<Expr>,
    pub coord: Coord,
}

/// A formal parameter of a process or function definition.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub sym: SymId,
    pub ty: Type,
    /// Bound expression for array formals.
    pub expr: Option<Expr>,
}

/// A process or function definition.
#[derive(Debug, Clone)]
pub struct ProcDef {
    pub name: String,
    pub sym: SymId,
    pub ty: Type,
    pub formals: Vec<Param>,
    pub decls: Vec<Decl>,
    pub body: StmtId,
    pub coord: Coord,
}

/// The entry process. Always the last definition in a program.
pub const MAIN_NAME: &str = "main";

/// A complete program: value declarations, process definitions, and the
/// arenas backing them.
#[derive(Debug, Clone)]
pub struct Program {
    pub decls: Vec<Decl>,
    pub defs: Vec<ProcDef>,
    pub syms: Symbols,
    pub arena: StmtArena,
}

impl Program {
    pub fn main(&self) -> Option<&ProcDef> {
        self.defs.iter().find(|d| d.name == MAIN_NAME)
    }

    pub fn def(&self, name: &str) -> Option<&ProcDef> {
        self.defs.iter().find(|d| d.name == name)
    }

    pub fn def_index(&self, name: &str) -> Option<usize> {
        self.defs.iter().position(|d| d.name == name)
    }
}
