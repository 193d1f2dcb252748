// Snapshot tests over the printed program after the full pipeline.
//
// The printed form is the observable surface of every transformation,
// so these lock the exact output shape for the three structural cases:
// a materialised par branch, a distributed replicator, and a resolved
// channel pair. Review drift with `cargo insta review`.

use weftc::ast::{BinOp, Expr, MAIN_NAME};
use weftc::builder::{bin, ProgramBuilder};
use weftc::pipeline::{compile, PipelineOptions, Target};
use weftc::printer::Printer;

fn compiled(b: ProgramBuilder, cores: i64) -> String {
    let state = compile(b.build(), Target { cores }, &PipelineOptions::default());
    assert!(!state.has_error, "unexpected diagnostics");
    Printer::new().program(&state.program)
}

/// A compound par branch becomes its own definition carrying the
/// crossing variables; the sibling call is lifted with its `on` intact.
#[test]
fn materialised_par_branches() {
    let mut b = ProgramBuilder::new();
    let mut m = b.proc(MAIN_NAME);
    m.var("a");
    m.var("w");
    let init = m.ass(m.id("a"), Expr::num(3));
    let w1 = m.ass(m.id("w"), bin(BinOp::Add, m.expr_id("a"), Expr::num(1)));
    let pw = m.call("printvalln", vec![m.expr_id("w")]);
    let branch = m.seq(vec![w1, pw]);
    let other = m.call("printval", vec![m.expr_id("a")]);
    let par = m.par(vec![branch, other]);
    let top = m.seq(vec![init, par]);
    m.done(top);

    insta::assert_snapshot!(compiled(b, 4), @r"
proc _p0(var a) is
  var w
  seq {
    w := a + 1
    printvalln(w)
  }

proc _p1(var a) is
  on 1 do
    printval(a)

proc main() is
  var a
  var w
  seq {
    a := 3
    par {
      _p0(a)
      _p1(a)
    }
  }
");
}

/// An inlined two-statement worker under a replicator: the body is
/// materialised, then the replicator becomes a halving spawn tree.
#[test]
fn distributed_replicator() {
    let mut b = ProgramBuilder::new();
    let mut w = b.proc("worker");
    w.formal_val("i");
    let s1 = w.call("printval", vec![w.expr_id("i")]);
    let s2 = w.call("printvalln", vec![w.expr_id("i")]);
    let body = w.seq(vec![s1, s2]);
    w.done(body);

    let mut m = b.proc(MAIN_NAME);
    let ix = m.index("i", Expr::num(0), Expr::num(8));
    let call = m.call("worker", vec![m.expr_id("i")]);
    let rep = m.rep(vec![ix], call);
    m.done(rep);

    insta::assert_snapshot!(compiled(b, 8), @r"
proc _p0(val i) is
  seq {
    printval(i)
    printvalln(i)
  }

proc worker(val i) is
  seq {
    printval(i)
    printvalln(i)
  }

proc _p1(val _t, val _n) is
  var _x
  if _n = 1 then
    _p0((_t / 1) rem 8)
  else
    seq {
      _x := _n >> 1
      par {
        on (procid() + _x) rem 8 do
          _p1(_t + _x, _n - _x)
        _p1(_t, _x)
      }
    }

proc main() is
  _p1(0, 8)
");
}

/// One scalar channel across a par: ends split, connections paired,
/// and both branches materialised with their captures.
#[test]
fn resolved_channel_pair() {
    let mut b = ProgramBuilder::new();
    let mut m = b.proc(MAIN_NAME);
    m.chan("c");
    m.var("v");
    let out = m.output(m.id("c"), Expr::num(1));
    let dst = m.id("v");
    let inp = m.input(m.id("c"), dst);
    let par = m.par(vec![out, inp]);
    m.done(par);

    insta::assert_snapshot!(compiled(b, 4), @r"
proc _p0(chanend _c0, var _pid) is
  seq {
    connect _c0 to (_pid + 1) rem 4
    _c0 ! 1
  }

proc _p1(chanend _c1) is
  var v
  on 1 do
    seq {
      connect _c1
      _c1 ? v
    }

proc main() is
  var v
  var _pid
  chanend _c0
  chanend _c1
  seq {
    _pid := procid()
    par {
      _p0(_c0, _pid)
      _p1(_c1)
    }
  }
");
}
