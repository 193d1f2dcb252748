// report.rs — serializable summary of the resolved topology.
//
// Code generation and the build tooling around it run outside this
// crate; they consume a JSON report of what the pipeline resolved rather
// than the live arenas. The report carries the target shape, every
// definition's paired channel elements with their connection ids, and
// the descendant sets distribution produced.

use serde::Serialize;

use crate::ast::Program;
use crate::chans::Topology;
use crate::children::ChildTable;

/// One resolved channel element of a definition. Scalar channels have no
/// index; array channels get one entry per expanded slot.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelReport {
    pub name: String,
    pub index: Option<i64>,
    pub conn: Option<u32>,
    pub master_core: Option<i64>,
    pub slave_core: Option<i64>,
    pub chanends: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcReport {
    pub name: String,
    pub channels: Vec<ChannelReport>,
    pub children: Vec<String>,
}

/// The report surface handed to code generation.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyReport {
    pub cores: i64,
    pub procs: Vec<ProcReport>,
}

impl TopologyReport {
    /// Flatten the per-definition channel tables and descendant sets
    /// into report form, in definition order (`main` last).
    pub fn assemble(p: &Program, topo: &Topology, kids: &ChildTable, cores: i64) -> TopologyReport {
        let mut procs = Vec::with_capacity(p.defs.len());
        for def in &p.defs {
            let mut channels = Vec::new();
            if let Some(pc) = topo.proc(&def.name) {
                for (key, entry) in pc.table.iter() {
                    channels.push(ChannelReport {
                        name: key.name.clone(),
                        index: key.index,
                        conn: entry.connid.map(|c| c.0),
                        master_core: entry.master_location(),
                        slave_core: entry.slave_location(),
                        chanends: entry.chanends.clone(),
                    });
                }
            }
            procs.push(ProcReport {
                name: def.name.clone(),
                channels,
                children: kids.of(&def.name).to_vec(),
            });
        }
        TopologyReport { cores, procs }
    }

    /// Compact JSON with a stable field order, fit for fingerprinting.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).expect("report serialization cannot fail")
    }

    /// Indented JSON for human consumption.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).expect("report serialization cannot fail")
    }
}
