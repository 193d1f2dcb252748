// pipeline.rs — compilation state and pass orchestration.
//
// Holds the shared program, the side tables passes produce, and the
// accumulated diagnostics, and runs the minimal pass set for a given
// terminal. Pass functions stay free functions in their own modules;
// this file only sequences them and keeps the bookkeeping honest.
//
// Preconditions: the program comes from `ast::ProgramBuilder` with
//   resolved symbols and `main` as the last definition.
// Postconditions: artifacts for every pass in `required_passes(terminal)`
//   are populated, or `has_error` is set and the failing pass returned.
// Failure modes: any pass recording an error-level diagnostic. Each pass
//   finishes visiting before the runner stops, so one run reports every
//   problem the failing pass can see.
// Side effects: per-pass timings recorded on the state; tracing output.

use std::time::{Duration, Instant};

use crate::ast::Program;
use crate::cfg::{self, CfgTable};
use crate::chans::{self, Topology};
use crate::children::{self, ChildTable};
use crate::conns;
use crate::diag::Diagnostics;
use crate::expand;
use crate::flatten;
use crate::liveness::Liveness;
use crate::pass::{descriptor, required_passes, PassId};
use crate::place;
use crate::printer::Printer;
use crate::report::TopologyReport;
use crate::sig::NameAlloc;
use crate::transform;

// ── Configuration ──────────────────────────────────────────────────────

/// The core array a program is resolved against.
#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub cores: i64,
}

/// Knobs for the structural pre-passes.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Largest body, in statement nodes, inline expansion will copy.
    pub inline_limit: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            inline_limit: expand::MAX_INLINE_STMTS,
        }
    }
}

// ── Compilation state ──────────────────────────────────────────────────

/// Holds the program, all pass artifacts and accumulated diagnostics.
/// Single use: the passes are not restartable, so a state that has been
/// run is not run again.
pub struct CompilationState {
    pub program: Program,
    pub target: Target,
    pub cfgs: Option<CfgTable>,
    pub live: Option<Liveness>,
    pub topology: Option<Topology>,
    pub children: Option<ChildTable>,
    pub diagnostics: Diagnostics,
    pub has_error: bool,
    pub timings: Vec<(PassId, Duration)>,
    pub provenance: Option<Provenance>,
}

impl CompilationState {
    pub fn new(program: Program, target: Target) -> Self {
        CompilationState {
            program,
            target,
            cfgs: None,
            live: None,
            topology: None,
            children: None,
            diagnostics: Diagnostics::new(),
            has_error: false,
            timings: Vec::new(),
            provenance: None,
        }
    }

    /// The report surface handed to code generation. Refused while any
    /// error-level diagnostic is recorded.
    pub fn report(&self) -> Option<TopologyReport> {
        if self.has_error {
            return None;
        }
        let topo = self.topology.as_ref()?;
        let kids = self.children.as_ref()?;
        Some(TopologyReport::assemble(
            &self.program,
            topo,
            kids,
            self.target.cores,
        ))
    }
}

// ── Error type ─────────────────────────────────────────────────────────

/// Pipeline execution stopped on error-level diagnostics in a pass. The
/// diagnostics themselves stay on `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
}

/// Record the pass timing and stop the run if the pass reported errors.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    errors_before: usize,
    elapsed: Duration,
) -> Result<(), PipelineError> {
    state.timings.push((pass_id, elapsed));
    tracing::debug!(
        pass = descriptor(pass_id).name,
        ms = elapsed.as_secs_f64() * 1000.0,
        "pass complete"
    );
    if state.diagnostics.error_count() > errors_before {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

// ── Pipeline runner ────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Materialisation and distribution share one name allocator, so minted
/// definitions stay unique across both.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &PipelineOptions,
) -> Result<(), PipelineError> {
    let passes = required_passes(terminal);
    let cores = state.target.cores;
    let mut names = NameAlloc::new();

    for &pass_id in &passes {
        let errors_before = state.diagnostics.error_count();
        let t = Instant::now();
        match pass_id {
            PassId::FlattenCalls => flatten::flatten_calls(&mut state.program),
            PassId::ExpandProcs => {
                expand::expand_procs(&mut state.program, options.inline_limit)
            }
            PassId::FlattenPar => flatten::flatten_par(&mut state.program),
            PassId::InsertOns => {
                place::insert_ons(&mut state.program, cores, &mut state.diagnostics)
            }
            PassId::LabelLocs => place::label_locs(&mut state.program, &mut state.diagnostics),
            PassId::LabelChans => {
                let topo = chans::label_chans(&mut state.program, &mut state.diagnostics);
                state.topology = Some(topo);
            }
            PassId::LabelConns => {
                let topo = state
                    .topology
                    .as_mut()
                    .expect("label_chans runs before label_conns");
                conns::label_conns(&state.program, topo);
            }
            PassId::InsertIds => {
                let topo = state
                    .topology
                    .as_ref()
                    .expect("label_chans runs before insert_ids");
                place::insert_ids(&mut state.program, topo);
            }
            PassId::InsertConns => {
                let topo = state
                    .topology
                    .as_ref()
                    .expect("label_conns runs before insert_conns");
                conns::insert_conns(&mut state.program, topo, cores);
            }
            PassId::RenameChans => {
                let topo = state
                    .topology
                    .as_ref()
                    .expect("insert_conns runs before rename_chans");
                conns::rename_chans(&mut state.program, topo);
            }
            PassId::BuildCfg => state.cfgs = Some(cfg::build(&state.program)),
            PassId::Liveness => {
                let cfgs = state.cfgs.as_ref().expect("build_cfg runs before liveness");
                state.live = Some(Liveness::compute(&state.program, cfgs));
            }
            PassId::TransformPar => {
                let cfgs = state
                    .cfgs
                    .as_ref()
                    .expect("build_cfg runs before transform_par");
                let live = state
                    .live
                    .as_ref()
                    .expect("liveness runs before transform_par");
                transform::transform_par(
                    &mut state.program,
                    cfgs,
                    live,
                    &mut names,
                    &mut state.diagnostics,
                );
            }
            PassId::TransformRep => transform::transform_rep(
                &mut state.program,
                cores,
                &mut names,
                &mut state.diagnostics,
            ),
            PassId::Children => state.children = Some(children::children(&state.program)),
        }
        let elapsed = t.elapsed();
        finish_pass(state, pass_id, errors_before, elapsed)?;
    }
    Ok(())
}

/// Run every pass and, on a clean run, stamp provenance.
pub fn compile(program: Program, target: Target, options: &PipelineOptions) -> CompilationState {
    let mut state = CompilationState::new(program, target);
    if run_pipeline(&mut state, PassId::Children, options).is_err() {
        return state;
    }
    if let Some(report) = state.report() {
        state.provenance = Some(compute_provenance(&state.program, &report));
    }
    state
}

// ── Provenance ─────────────────────────────────────────────────────────

/// Provenance metadata for hermetic builds and cache-key use.
///
/// `program_hash`: SHA-256 of the canonical printed program.
/// `topology_fingerprint`: SHA-256 of the report's compact canonical JSON.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub program_hash: [u8; 32],
    pub topology_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the program hash (64 characters).
    pub fn program_hash_hex(&self) -> String {
        bytes_to_hex(&self.program_hash)
    }

    /// Hex string of the topology fingerprint (64 characters).
    pub fn topology_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.topology_fingerprint)
    }

    /// Serialize provenance as a JSON string for build tooling.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"program_hash\": \"{}\",\n  \"topology_fingerprint\": \"{}\",\n  \"compiler_version\": \"{}\"\n}}\n",
            self.program_hash_hex(),
            self.topology_fingerprint_hex(),
            self.compiler_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(text: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance from the resolved program and its report.
///
/// Both hashes are SHA-256. The topology fingerprint hashes the compact
/// canonical JSON so it is stable independent of display formatting.
pub fn compute_provenance(p: &Program, report: &TopologyReport) -> Provenance {
    let printed = Printer::new().program(p);
    Provenance {
        program_hash: sha256(&printed),
        topology_fingerprint: sha256(&report.canonical_json()),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, MAIN_NAME};
    use crate::builder::ProgramBuilder;
    use crate::diag::codes;

    /// An 8-wide replicated call whose callee is small enough to be
    /// inlined, so the run exercises expansion, materialisation and
    /// distribution together.
    fn replicated_printer() -> Program {
        let mut b = ProgramBuilder::new();
        let mut w = b.proc("worker");
        w.formal_val("x");
        let a = w.call("printval", vec![w.expr_id("x")]);
        let c = w.call("printvalln", vec![w.expr_id("x")]);
        let body = w.seq(vec![a, c]);
        w.done(body);

        let mut m = b.proc(MAIN_NAME);
        let ix = m.index("i", Expr::num(0), Expr::num(8));
        let call = m.call("worker", vec![m.expr_id("i")]);
        let rep = m.rep(vec![ix], call);
        m.done(rep);
        b.build()
    }

    #[test]
    fn full_run_populates_every_artifact() {
        let state = compile(
            replicated_printer(),
            Target { cores: 8 },
            &PipelineOptions::default(),
        );
        assert!(!state.has_error);
        assert!(state.cfgs.is_some());
        assert!(state.live.is_some());
        assert!(state.topology.is_some());
        assert_eq!(state.timings.len(), 15);

        // Expansion turned the replicator body into a compound, so the
        // run materialises it (_p0) and then distributes (_p1).
        let text = Printer::new().program(&state.program);
        assert!(text.contains("_p1(0, 8)"), "{}", text);
        assert_eq!(state.program.defs.last().map(|d| d.name.as_str()), Some(MAIN_NAME));

        let kids = state.children.as_ref().unwrap();
        assert_eq!(kids.of(MAIN_NAME), ["_p1", "_p0", "procid"]);

        let report = state.report().unwrap();
        assert_eq!(report.cores, 8);
        assert_eq!(report.procs.last().map(|p| p.name.as_str()), Some(MAIN_NAME));
    }

    #[test]
    fn core_budget_failure_stops_and_refuses_the_report() {
        let mut state = CompilationState::new(replicated_printer(), Target { cores: 4 });
        let err = run_pipeline(&mut state, PassId::Children, &PipelineOptions::default())
            .unwrap_err();
        assert_eq!(err.failing_pass, PassId::InsertOns);
        assert!(state.has_error);
        assert!(state
            .diagnostics
            .iter()
            .any(|d| d.code == Some(codes::INSUFFICIENT_CORES)));
        assert!(state.report().is_none());
    }

    #[test]
    fn terminal_limits_the_schedule() {
        let mut state = CompilationState::new(replicated_printer(), Target { cores: 8 });
        run_pipeline(&mut state, PassId::Liveness, &PipelineOptions::default()).unwrap();
        assert!(state.live.is_some());
        assert!(state.children.is_none());
        assert_eq!(state.timings.len(), 12);

        // No transformation pass ran, so nothing was minted.
        let text = Printer::new().program(&state.program);
        assert!(!text.contains("_p0"), "{}", text);
    }

    #[test]
    fn provenance_is_reproducible() {
        let a = compile(
            replicated_printer(),
            Target { cores: 8 },
            &PipelineOptions::default(),
        );
        let b = compile(
            replicated_printer(),
            Target { cores: 8 },
            &PipelineOptions::default(),
        );
        let pa = a.provenance.as_ref().unwrap();
        let pb = b.provenance.as_ref().unwrap();
        assert_eq!(pa.program_hash_hex(), pb.program_hash_hex());
        assert_eq!(pa.topology_fingerprint_hex(), pb.topology_fingerprint_hex());
        assert_eq!(pa.program_hash_hex().len(), 64);

        let v: serde_json::Value = serde_json::from_str(&pa.to_json()).unwrap();
        assert_eq!(v["compiler_version"], env!("CARGO_PKG_VERSION"));
    }
}
