//! Damping-factor sweeps: both engines, several alphas, one shared graph.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::graph::CsrGraph;
use crate::ids::NodeIds;
use crate::montecarlo::{monte_carlo_run, MonteCarloConfig, WALKS_PER_NODE};
use crate::ppr::{personalized_pagerank_run, PprConfig};
use crate::report::{rank_scores, write_csv, ReportConfig};
use crate::seeds::SeedSet;
use crate::{Error, Result};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Algorithm {
    PowerIteration,
    MonteCarlo,
}

impl Algorithm {
    pub fn slug(self) -> &'static str {
        match self {
            Algorithm::PowerIteration => "ppr",
            Algorithm::MonteCarlo => "montecarlo",
        }
    }

    /// Engine tag used in report file names.
    pub fn report_tag(self) -> &'static str {
        match self {
            Algorithm::PowerIteration => "PPR",
            Algorithm::MonteCarlo => "MC",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SweepConfig {
    pub alphas: Vec<f64>,
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Monte Carlo budget is `num_nodes * walks_per_node`.
    pub walks_per_node: usize,
    /// Base seed; the walk for `alphas[i]` uses stream `i` of this seed.
    pub seed: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        let ppr = PprConfig::default();
        Self {
            alphas: vec![0.15, 0.50, 0.85],
            tolerance: ppr.tolerance,
            max_iterations: ppr.max_iterations,
            walks_per_node: WALKS_PER_NODE,
            seed: 0,
        }
    }
}

impl SweepConfig {
    fn ppr(&self, alpha: f64) -> PprConfig {
        PprConfig {
            alpha,
            tolerance: self.tolerance,
            max_iterations: self.max_iterations,
        }
    }

    fn monte_carlo(&self, graph: &CsrGraph, alpha: f64) -> MonteCarloConfig {
        MonteCarloConfig {
            alpha,
            total_walks: graph.num_nodes().saturating_mul(self.walks_per_node),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.alphas.is_empty() {
            return Err(Error::InvalidParameter(
                "alphas must be non-empty".to_string(),
            ));
        }
        for &alpha in &self.alphas {
            self.ppr(alpha).validate()?;
        }
        Ok(())
    }
}

/// One engine/alpha result.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SweepEntry {
    pub algorithm: Algorithm,
    pub alpha: f64,
    pub scores: Vec<f64>,
    /// Sweeps for power iteration, walks for Monte Carlo.
    pub work: usize,
    /// Always `true` for Monte Carlo.
    pub converged: bool,
    pub elapsed: Duration,
}

impl SweepEntry {
    /// `results_{PPR|MC}_alpha_{NN}.csv` with `NN = round(alpha * 100)`, e.g.
    /// `results_PPR_alpha_15.csv`.
    pub fn report_file_name(&self) -> String {
        let percent = (self.alpha * 100.0).round() as u64;
        format!("results_{}_alpha_{percent}.csv", self.algorithm.report_tag())
    }
}

/// Run power iteration and Monte Carlo for every alpha.
///
/// Entries come back ordered by alpha position, power iteration first.
pub fn run_sweep(
    graph: &CsrGraph,
    seeds: &SeedSet,
    config: &SweepConfig,
) -> Result<Vec<SweepEntry>> {
    config.validate()?;

    #[cfg(feature = "parallel")]
    let per_alpha: Vec<Result<[SweepEntry; 2]>> = config
        .alphas
        .par_iter()
        .enumerate()
        .map(|(i, &alpha)| run_alpha(graph, seeds, config, i, alpha))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let per_alpha: Vec<Result<[SweepEntry; 2]>> = config
        .alphas
        .iter()
        .enumerate()
        .map(|(i, &alpha)| run_alpha(graph, seeds, config, i, alpha))
        .collect();

    let mut entries = Vec::with_capacity(config.alphas.len() * 2);
    for pair in per_alpha {
        entries.extend(pair?);
    }
    Ok(entries)
}

fn run_alpha(
    graph: &CsrGraph,
    seeds: &SeedSet,
    config: &SweepConfig,
    index: usize,
    alpha: f64,
) -> Result<[SweepEntry; 2]> {
    let ppr = personalized_pagerank_run(graph, seeds, config.ppr(alpha))?;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    rng.set_stream(index as u64);
    let mc = monte_carlo_run(graph, seeds, config.monte_carlo(graph, alpha), &mut rng)?;

    tracing::info!(
        alpha,
        ppr_iterations = ppr.iterations,
        ppr_converged = ppr.converged,
        ppr_ms = ppr.elapsed.as_millis() as u64,
        walks = mc.walks,
        mc_ms = mc.elapsed.as_millis() as u64,
        "sweep step done"
    );

    Ok([
        SweepEntry {
            algorithm: Algorithm::PowerIteration,
            alpha,
            scores: ppr.scores,
            work: ppr.iterations,
            converged: ppr.converged,
            elapsed: ppr.elapsed,
        },
        SweepEntry {
            algorithm: Algorithm::MonteCarlo,
            alpha,
            scores: mc.scores,
            work: mc.walks,
            converged: true,
            elapsed: mc.elapsed,
        },
    ])
}

/// Rank every entry and write one CSV per entry into `dir`. Returns the written paths.
pub fn write_reports(
    dir: &Path,
    entries: &[SweepEntry],
    seeds: &SeedSet,
    ids: Option<&NodeIds>,
    config: ReportConfig,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(entries.len());
    for entry in entries {
        let rows = rank_scores(&entry.scores, seeds, config)?;
        let path = dir.join(entry.report_file_name());
        let file = std::fs::File::create(&path)?;
        write_csv(std::io::BufWriter::new(file), &rows, ids)?;
        tracing::debug!(path = %path.display(), rows = rows.len(), "wrote report");
        written.push(path);
    }
    Ok(written)
}
