//! Monte Carlo approximation of personalized PageRank.
//!
//! A walk starts at a uniformly chosen seed, records a visit at every node it stands on, and
//! at each step stops with probability `alpha` (restart) or when it stands on a dangling node.
//! Otherwise it follows an outgoing edge with probability proportional to its weight.
//!
//! Normalized visit counts converge to the same fixed point as [`crate::ppr`]: a walk ending on a
//! dead end is exactly a restart at a seed, which is what the PPR dead-mass term encodes.
//! Sampling error shrinks as \(O(1/\sqrt{\text{walks}})\).

use std::time::{Duration, Instant};

use rand::Rng;

use crate::cancel::Cancel;
use crate::graph::CsrGraph;
use crate::ppr::{check_seeds, validate_alpha};
use crate::seeds::SeedSet;
use crate::Result;

/// Walks between two polls of the cancellation token.
pub const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Conventional walk budget per graph node.
pub const WALKS_PER_NODE: usize = 500;

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonteCarloConfig {
    /// Per-step stop (restart) probability, in `(0, 1]`.
    pub alpha: f64,
    pub total_walks: usize,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            alpha: 0.15,
            total_walks: 100_000,
        }
    }
}

impl MonteCarloConfig {
    /// `total_walks = num_nodes * WALKS_PER_NODE`.
    pub fn for_graph(graph: &CsrGraph, alpha: f64) -> Self {
        Self {
            alpha,
            total_walks: graph.num_nodes().saturating_mul(WALKS_PER_NODE),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_alpha(self.alpha)
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WalkRun {
    /// `visits[i] / total_visits`, all zero when nothing was visited.
    pub scores: Vec<f64>,
    pub visits: Vec<u64>,
    pub total_visits: u64,
    /// Walks actually performed (less than requested only when cancelled).
    pub walks: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

pub fn monte_carlo_run<R: Rng>(
    graph: &CsrGraph,
    seeds: &SeedSet,
    config: MonteCarloConfig,
    rng: &mut R,
) -> Result<WalkRun> {
    run(graph, seeds, config, rng, None)
}

/// Like [`monte_carlo_run`], polling `cancel` every [`CANCEL_CHECK_INTERVAL`] walks.
pub fn monte_carlo_run_with_cancel<R: Rng>(
    graph: &CsrGraph,
    seeds: &SeedSet,
    config: MonteCarloConfig,
    rng: &mut R,
    cancel: &Cancel,
) -> Result<WalkRun> {
    run(graph, seeds, config, rng, Some(cancel))
}

fn run<R: Rng>(
    graph: &CsrGraph,
    seeds: &SeedSet,
    config: MonteCarloConfig,
    rng: &mut R,
    cancel: Option<&Cancel>,
) -> Result<WalkRun> {
    config.validate()?;
    check_seeds(graph, seeds)?;
    let start = Instant::now();
    let mut visits = vec![0u64; graph.num_nodes()];
    if seeds.is_empty() {
        return Ok(finish(visits, 0, false, start.elapsed()));
    }

    let (walks, cancelled) = walk_block(
        graph,
        seeds,
        config.alpha,
        config.total_walks,
        rng,
        cancel,
        &mut visits,
    );
    let run = finish(visits, walks, cancelled, start.elapsed());
    tracing::debug!(
        alpha = config.alpha,
        walks = run.walks,
        total_visits = run.total_visits,
        cancelled,
        "monte carlo finished"
    );
    Ok(run)
}

/// Walks per parallel work unit. Each unit owns one RNG stream.
#[cfg(feature = "parallel")]
pub const PARALLEL_CHUNK_WALKS: usize = 16_384;

/// Parallel Monte Carlo.
///
/// The budget is cut into [`PARALLEL_CHUNK_WALKS`]-sized chunks; chunk `k` draws from
/// `ChaCha8Rng::seed_from_u64(seed)` on stream `k`, and keeps private visit counters that are
/// summed at the end. The result depends only on `seed`, never on the thread count.
#[cfg(feature = "parallel")]
pub fn monte_carlo_run_parallel(
    graph: &CsrGraph,
    seeds: &SeedSet,
    config: MonteCarloConfig,
    seed: u64,
    cancel: Option<&Cancel>,
) -> Result<WalkRun> {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rayon::prelude::*;

    config.validate()?;
    check_seeds(graph, seeds)?;
    let start = Instant::now();
    let n = graph.num_nodes();
    if seeds.is_empty() {
        return Ok(finish(vec![0u64; n], 0, false, start.elapsed()));
    }

    let chunks = config.total_walks.div_ceil(PARALLEL_CHUNK_WALKS);
    let (visits, walks, cancelled) = (0..chunks)
        .into_par_iter()
        .map(|k| {
            let lo = k * PARALLEL_CHUNK_WALKS;
            let budget = (config.total_walks - lo).min(PARALLEL_CHUNK_WALKS);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(k as u64);
            let mut local = vec![0u64; n];
            let (done, cancelled) = walk_block(
                graph,
                seeds,
                config.alpha,
                budget,
                &mut rng,
                cancel,
                &mut local,
            );
            (local, done, cancelled)
        })
        .reduce(
            || (vec![0u64; n], 0usize, false),
            |(mut acc, wa, ca), (local, wb, cb)| {
                for (a, b) in acc.iter_mut().zip(local) {
                    *a += b;
                }
                (acc, wa + wb, ca || cb)
            },
        );

    let run = finish(visits, walks, cancelled, start.elapsed());
    tracing::debug!(
        alpha = config.alpha,
        walks = run.walks,
        chunks,
        cancelled,
        "parallel monte carlo finished"
    );
    Ok(run)
}

/// Perform up to `budget` walks into `visits`. Returns `(walks_done, cancelled)`.
fn walk_block<R: Rng>(
    graph: &CsrGraph,
    seeds: &SeedSet,
    alpha: f64,
    budget: usize,
    rng: &mut R,
    cancel: Option<&Cancel>,
    visits: &mut [u64],
) -> (usize, bool) {
    let starts = seeds.ids();
    for done in 0..budget {
        if done % CANCEL_CHECK_INTERVAL == 0 && cancel.is_some_and(Cancel::is_cancelled) {
            return (done, true);
        }
        let mut curr = starts[rng.random_range(0..starts.len())];
        loop {
            visits[curr] += 1;
            if rng.random::<f64>() < alpha {
                break;
            }
            let ws = graph.out_weight_sum(curr);
            if ws == 0.0 {
                break;
            }
            curr = sample_edge(graph, curr, rng.random::<f64>() * ws);
        }
    }
    (budget, false)
}

/// First destination whose cumulative weight reaches `target`.
///
/// `target` is in `[0, out_weight_sum)`; the last edge covers any rounding shortfall.
#[inline]
fn sample_edge(graph: &CsrGraph, node: usize, target: f64) -> usize {
    let cols = graph.neighbors(node);
    let weights = graph.weights(node);
    let mut acc = 0.0;
    for (&v, &w) in cols.iter().zip(weights) {
        acc += w;
        if acc >= target {
            return v;
        }
    }
    cols[cols.len() - 1]
}

fn finish(visits: Vec<u64>, walks: usize, cancelled: bool, elapsed: Duration) -> WalkRun {
    let total_visits: u64 = visits.iter().sum();
    let scores = if total_visits == 0 {
        vec![0.0; visits.len()]
    } else {
        let total = total_visits as f64;
        visits.iter().map(|&c| c as f64 / total).collect()
    };
    WalkRun {
        scores,
        visits,
        total_visits,
        walks,
        cancelled,
        elapsed,
    }
}
