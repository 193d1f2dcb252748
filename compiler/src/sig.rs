// sig.rs — Builtin signatures and fresh-name allocation.
//
// Builtins are resolved by name at program construction; the `mobile`
// flag marks the ones that may run on any core. Child analysis excludes
// non-mobile builtins from the mobile-process closure, and replicator
// distribution relies on `procid` to recover a definition's home core.

use crate::ast::Spec;

/// Ceiling on formal parameters of any process definition, including
/// the ones minted by distribution. The runtime calling convention
/// cannot move more than this many arguments to a remote core.
pub const MAX_PROC_PARAMETERS: usize = 10;

/// Name of the per-definition core id variable assigned at entry.
pub const PROC_ID_NAME: &str = "_pid";

/// A builtin process or function known to the compiler.
#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub spec: Spec,
    /// Whether calls may be placed on a core other than the caller's.
    pub mobile: bool,
}

pub const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "procid",
        spec: Spec::Func,
        mobile: true,
    },
    Builtin {
        name: "mulf8_24",
        spec: Spec::Func,
        mobile: true,
    },
    Builtin {
        name: "divf8_24",
        spec: Spec::Func,
        mobile: true,
    },
    Builtin {
        name: "printval",
        spec: Spec::Proc,
        mobile: false,
    },
    Builtin {
        name: "printvalln",
        spec: Spec::Proc,
        mobile: false,
    },
    Builtin {
        name: "exit",
        spec: Spec::Proc,
        mobile: false,
    },
];

pub fn builtin(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

pub fn is_builtin(name: &str) -> bool {
    builtin(name).is_some()
}

/// Allocator for the names of processes minted by distribution.
///
/// Shared by transform_par and transform_rep so generated names are
/// unique program-wide and deterministic in visit order.
#[derive(Debug, Default)]
pub struct NameAlloc {
    next_proc: u32,
}

impl NameAlloc {
    pub fn new() -> Self {
        NameAlloc::default()
    }

    pub fn proc_name(&mut self) -> String {
        let name = format!("_p{}", self.next_proc);
        self.next_proc += 1;
        name
    }
}
