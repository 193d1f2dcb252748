// pass.rs — pass metadata, dependency edges, artifact identifiers.
//
// Declares the pipeline's 15 passes, the artifacts they produce and the
// passes whose outputs they consume. The runner uses the dependency
// edges to compute the minimal pass subset for a requested terminal: a
// caller that only wants liveness does not pay for distribution.

use std::collections::HashSet;

// ── Pass and artifact identifiers ──────────────────────────────────────

/// Identifies each pipeline pass (parsing and symbol construction happen
/// upstream and are not scheduled here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    FlattenCalls,
    ExpandProcs,
    FlattenPar,
    InsertOns,
    LabelLocs,
    LabelChans,
    LabelConns,
    InsertIds,
    InsertConns,
    RenameChans,
    BuildCfg,
    Liveness,
    TransformPar,
    TransformRep,
    Children,
}

/// Machine-readable artifact identifiers. Each maps to a concrete field
/// of the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Program,  // the shared Program, reshaped in place
    Cfg,      // CfgTable
    Liveness, // Liveness
    Topology, // Topology
    Children, // ChildTable
}

// ── Pass descriptor ────────────────────────────────────────────────────

/// Static metadata about a pipeline pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics and logging.
    pub name: &'static str,
    /// Passes whose outputs this pass consumes.
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces or refreshes.
    pub outputs: &'static [ArtifactId],
    /// The property that holds once the pass has run.
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::FlattenCalls => PassDescriptor {
            name: "flatten_calls",
            inputs: &[],
            outputs: &[ArtifactId::Program],
            invariants: "wrapper definitions inlined at every call site",
        },
        PassId::ExpandProcs => PassDescriptor {
            name: "expand_procs",
            inputs: &[PassId::FlattenCalls],
            outputs: &[ArtifactId::Program],
            invariants: "small bodies expanded, locals renamed per instantiation",
        },
        PassId::FlattenPar => PassDescriptor {
            name: "flatten_par",
            inputs: &[PassId::ExpandProcs],
            outputs: &[ArtifactId::Program],
            invariants: "no par nested directly under par",
        },
        PassId::InsertOns => PassDescriptor {
            name: "insert_ons",
            inputs: &[PassId::FlattenPar],
            outputs: &[ArtifactId::Program],
            invariants: "every par branch placed, core budget checked",
        },
        PassId::LabelLocs => PassDescriptor {
            name: "label_locs",
            inputs: &[PassId::InsertOns],
            outputs: &[ArtifactId::Program],
            invariants: "every statement carries a location expression",
        },
        PassId::LabelChans => PassDescriptor {
            name: "label_chans",
            inputs: &[PassId::LabelLocs],
            outputs: &[ArtifactId::Topology],
            invariants: "channel uses expanded, master/slave pairing validated",
        },
        PassId::LabelConns => PassDescriptor {
            name: "label_conns",
            inputs: &[PassId::LabelChans],
            outputs: &[ArtifactId::Topology],
            invariants: "paired element sets share a connection id",
        },
        PassId::InsertIds => PassDescriptor {
            name: "insert_ids",
            inputs: &[PassId::LabelChans],
            outputs: &[ArtifactId::Program],
            invariants: "_pid declared and assigned wherever connections form",
        },
        PassId::InsertConns => PassDescriptor {
            name: "insert_conns",
            inputs: &[PassId::LabelConns, PassId::InsertIds],
            outputs: &[ArtifactId::Program],
            invariants: "connect statements and chanend declarations in place",
        },
        PassId::RenameChans => PassDescriptor {
            name: "rename_chans",
            inputs: &[PassId::InsertConns],
            outputs: &[ArtifactId::Program],
            invariants: "channel uses renamed to chanends, chan declarations dropped",
        },
        PassId::BuildCfg => PassDescriptor {
            name: "build_cfg",
            inputs: &[PassId::RenameChans],
            outputs: &[ArtifactId::Cfg],
            invariants: "pred/succ threaded, use/defs seeded",
        },
        PassId::Liveness => PassDescriptor {
            name: "liveness",
            inputs: &[PassId::BuildCfg],
            outputs: &[ArtifactId::Liveness],
            invariants: "inp/out at the backward fixed point",
        },
        PassId::TransformPar => PassDescriptor {
            name: "transform_par",
            inputs: &[PassId::Liveness],
            outputs: &[ArtifactId::Program],
            invariants: "every par branch and replicator body is a process call",
        },
        PassId::TransformRep => PassDescriptor {
            name: "transform_rep",
            inputs: &[PassId::TransformPar],
            outputs: &[ArtifactId::Program],
            invariants: "replicators rewritten to binary spawn trees",
        },
        PassId::Children => PassDescriptor {
            name: "children",
            inputs: &[PassId::TransformRep],
            outputs: &[ArtifactId::Children],
            invariants: "descendant sets transitively closed",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────

/// All 15 pass IDs in execution order (used for iteration).
pub const ALL_PASSES: [PassId; 15] = [
    PassId::FlattenCalls,
    PassId::ExpandProcs,
    PassId::FlattenPar,
    PassId::InsertOns,
    PassId::LabelLocs,
    PassId::LabelChans,
    PassId::LabelConns,
    PassId::InsertIds,
    PassId::InsertConns,
    PassId::RenameChans,
    PassId::BuildCfg,
    PassId::Liveness,
    PassId::TransformPar,
    PassId::TransformRep,
    PassId::Children,
];

/// Compute the minimal ordered set of passes needed to produce
/// `terminal`. Returns passes in execution order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_passes_insert_ids_skips_colouring() {
        let passes = required_passes(PassId::InsertIds);
        assert_eq!(
            passes,
            vec![
                PassId::FlattenCalls,
                PassId::ExpandProcs,
                PassId::FlattenPar,
                PassId::InsertOns,
                PassId::LabelLocs,
                PassId::LabelChans,
                PassId::InsertIds,
            ]
        );
        assert!(!passes.contains(&PassId::LabelConns));
    }

    #[test]
    fn required_passes_insert_conns_orders_the_diamond() {
        let passes = required_passes(PassId::InsertConns);
        assert_eq!(
            passes,
            vec![
                PassId::FlattenCalls,
                PassId::ExpandProcs,
                PassId::FlattenPar,
                PassId::InsertOns,
                PassId::LabelLocs,
                PassId::LabelChans,
                PassId::LabelConns,
                PassId::InsertIds,
                PassId::InsertConns,
            ]
        );
    }

    #[test]
    fn required_passes_children_includes_all() {
        let passes = required_passes(PassId::Children);
        assert_eq!(passes.len(), 15);
        assert_eq!(passes, ALL_PASSES.to_vec());
    }

    #[test]
    fn required_passes_flatten_calls_is_minimal() {
        let passes = required_passes(PassId::FlattenCalls);
        assert_eq!(passes, vec![PassId::FlattenCalls]);
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(
                !desc.outputs.is_empty(),
                "pass {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            for dep in desc.inputs {
                let dep_passes = required_passes(*pass);
                let dep_pos = dep_passes.iter().position(|p| p == dep);
                let self_pos = dep_passes.iter().position(|p| p == pass);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later in execution order",
                    pass,
                    dep
                );
            }
        }
    }
}
