// weftc — Weft compiler middle end
//
// Resolves placement and communication topology for channel-based
// parallel programs: liveness, static placement, channel expansion,
// connection labelling, and the rewrites that turn inline parallelism
// into bounded spawn trees. `pipeline` runs the passes in order.

pub mod ast;
pub mod builder;
pub mod cfg;
pub mod chans;
pub mod children;
pub mod conns;
pub mod diag;
pub mod eval;
pub mod expand;
pub mod flatten;
pub mod indices;
pub mod liveness;
pub mod pass;
pub mod pipeline;
pub mod place;
pub mod printer;
pub mod report;
pub mod sig;
pub mod subst;
pub mod transform;
