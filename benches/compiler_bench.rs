use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use weftc::ast::{Expr, Program, MAIN_NAME};
use weftc::builder::ProgramBuilder;
use weftc::pass::PassId;
use weftc::pipeline::{compile, run_pipeline, CompilationState, PipelineOptions, Target};

// Latency benchmarks over built programs.
// Scenarios cover the three structural shapes the pipeline rewrites:
// a channel pair, compound par branches, and a replicated call.

fn pair_program() -> Program {
    let mut b = ProgramBuilder::new();
    let mut m = b.proc(MAIN_NAME);
    m.chan("c");
    m.var("v");
    let out = m.output(m.id("c"), Expr::num(1));
    let dst = m.id("v");
    let inp = m.input(m.id("c"), dst);
    let par = m.par(vec![out, inp]);
    m.done(par);
    b.build()
}

fn branch_program() -> Program {
    let mut b = ProgramBuilder::new();
    let mut m = b.proc(MAIN_NAME);
    m.var("a");
    m.var("w");
    let init = m.ass(m.id("a"), Expr::num(3));
    let w1 = m.ass(m.id("w"), m.expr_id("a"));
    let pw = m.call("printvalln", vec![m.expr_id("w")]);
    let branch = m.seq(vec![w1, pw]);
    let other = m.call("printval", vec![m.expr_id("a")]);
    let par = m.par(vec![branch, other]);
    let top = m.seq(vec![init, par]);
    m.done(top);
    b.build()
}

fn replicator_program(extent: i64) -> Program {
    let mut b = ProgramBuilder::new();
    let mut w = b.proc("worker");
    w.formal_val("i");
    let s1 = w.call("printval", vec![w.expr_id("i")]);
    let s2 = w.call("printvalln", vec![w.expr_id("i")]);
    let body = w.seq(vec![s1, s2]);
    w.done(body);

    let mut m = b.proc(MAIN_NAME);
    let ix = m.index("i", Expr::num(0), Expr::num(extent));
    let call = m.call("worker", vec![m.expr_id("i")]);
    let rep = m.rep(vec![ix], call);
    m.done(rep);
    b.build()
}

fn replicator8() -> Program {
    replicator_program(8)
}

fn scenarios() -> [(&'static str, i64, fn() -> Program); 3] {
    [
        ("pair", 4, pair_program as fn() -> Program),
        ("branches", 4, branch_program as fn() -> Program),
        ("replicator", 8, replicator8 as fn() -> Program),
    ]
}

// Full pipeline latency, program construction excluded.
fn bench_full_compile_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_compile_latency");
    let opts = PipelineOptions::default();

    for (name, cores, build) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &cores, |b, &cores| {
            b.iter_batched(
                build,
                |p| {
                    let state = compile(black_box(p), Target { cores }, &opts);
                    assert!(!state.has_error);
                    black_box(state.report());
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// Cumulative latency up to each pipeline terminal on the replicator
// scenario, so regressions point at the pass group that caused them.
fn bench_pipeline_prefix_latency(c: &mut Criterion) {
    let opts = PipelineOptions::default();
    let terminals: [(&str, PassId); 5] = [
        ("normalise", PassId::FlattenPar),
        ("channels", PassId::RenameChans),
        ("liveness", PassId::Liveness),
        ("distribute", PassId::TransformRep),
        ("full", PassId::Children),
    ];

    let mut group = c.benchmark_group("pipeline_prefix_latency");
    for (name, terminal) in terminals {
        group.bench_function(name, |b| {
            b.iter_batched(
                || replicator_program(8),
                |p| {
                    let mut state = CompilationState::new(p, Target { cores: 8 });
                    let r = run_pipeline(&mut state, black_box(terminal), &opts);
                    assert!(r.is_ok());
                    black_box(&state.program);
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

// Distribution scaling vs replicator extent.
fn bench_distribution_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("distribution_scaling");
    let opts = PipelineOptions::default();

    for extent in [1_i64, 4, 16, 64] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}wide", extent)),
            &extent,
            |b, &extent| {
                b.iter_batched(
                    || replicator_program(extent),
                    |p| {
                        let state = compile(black_box(p), Target { cores: 64 }, &opts);
                        assert!(!state.has_error);
                        black_box(&state.program);
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_full_compile_latency,
    bench_pipeline_prefix_latency,
    bench_distribution_scaling,
);
criterion_main!(benches);
