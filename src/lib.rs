//! `taintrank`: guilt-by-association scoring over directed, weighted graphs.
//!
//! A handful of known-bad nodes (the *seeds*) leak "suspicion" along outgoing edges. Nodes that
//! are strongly reachable from the seeds end up with high scores.
//!
//! Pipeline:
//! - [`CsrGraphBuilder`] turns an edge list into an immutable [`CsrGraph`].
//! - [`personalized_pagerank_run`] computes the exact fixed point by power iteration.
//! - [`monte_carlo_run`] approximates the same distribution with random walks.
//! - [`report`] and [`sweep`] rank scores and run both engines over several damping factors.
//!
//! Public invariants (must not drift):
//! - **Node order**: score vectors are indexed by node id \(0..n-1\) of the input graph.
//! - **Determinism**: the PPR engine is bit-reproducible given identical inputs + configs; the
//!   Monte Carlo engine is reproducible given an identically seeded generator.
//! - **No silent repair**: out-of-range ids, non-positive weights and out-of-range seeds are
//!   errors. Weight sanitization happens once, at the loader boundary ([`sanitize_weight`]).
//! - **Dead-end mass**: mass sitting on dangling nodes is returned to the seeds through the
//!   personalization vector, never dropped.
//!
//! Swappable (allowed to change without breaking the contract):
//! - iteration strategy (serial vs parallel)
//! - within-row edge order of the CSR encoding

pub mod cancel;
pub mod graph;
pub mod ids;
pub mod io;
pub mod montecarlo;
pub mod ppr;
pub mod report;
pub mod seeds;
pub mod sweep;

pub use cancel::Cancel;
pub use graph::{sanitize_weight, CsrGraph, CsrGraphBuilder, ZERO_WEIGHT_EPSILON};
pub use ids::NodeIds;
pub use io::{load_edge_list, read_edge_list, EdgeList};
#[cfg(feature = "parallel")]
pub use montecarlo::monte_carlo_run_parallel;
pub use montecarlo::{monte_carlo_run, monte_carlo_run_with_cancel, MonteCarloConfig, WalkRun};
pub use ppr::{
    personalized_pagerank, personalized_pagerank_run, personalized_pagerank_run_with_cancel,
    PprConfig, PprRun,
};
pub use report::{rank_scores, write_csv, RankedNode, ReportConfig, Status};
pub use seeds::SeedSet;
pub use sweep::{run_sweep, write_reports, Algorithm, SweepConfig, SweepEntry};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("edge {src} -> {dst} out of bounds (num_nodes={num_nodes})")]
    InvalidEdge {
        src: usize,
        dst: usize,
        num_nodes: usize,
    },
    #[error("edge {src} -> {dst} has non-positive or non-finite weight {weight}")]
    InvalidWeight { src: usize, dst: usize, weight: f64 },
    #[error("seed {seed} out of bounds (num_nodes={num_nodes})")]
    InvalidSeed { seed: usize, num_nodes: usize },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
