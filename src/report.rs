//! Ranking and CSV reporting of score vectors.

use std::borrow::Cow;
use std::fmt;
use std::io::Write;

use crate::ids::NodeIds;
use crate::seeds::SeedSet;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    Seed,
    Suspicious,
    Safe,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Seed => "Seed",
            Status::Suspicious => "Suspicious",
            Status::Safe => "Safe",
        })
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReportConfig {
    /// Non-seed nodes scoring strictly above this are `Suspicious`.
    pub suspicion_threshold: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            suspicion_threshold: 1e-4,
        }
    }
}

impl ReportConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.suspicion_threshold.is_finite() {
            return Err(Error::InvalidParameter(
                "suspicion_threshold must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RankedNode {
    /// 1-based.
    pub rank: usize,
    pub node: usize,
    pub score: f64,
    pub status: Status,
}

/// Sort nodes by descending score (ties by ascending id) and classify them.
pub fn rank_scores(
    scores: &[f64],
    seeds: &SeedSet,
    config: ReportConfig,
) -> Result<Vec<RankedNode>> {
    config.validate()?;
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    Ok(order
        .into_iter()
        .enumerate()
        .map(|(i, node)| {
            let score = scores[node];
            let status = if seeds.contains(node) {
                Status::Seed
            } else if score > config.suspicion_threshold {
                Status::Suspicious
            } else {
                Status::Safe
            };
            RankedNode {
                rank: i + 1,
                node,
                score,
                status,
            }
        })
        .collect())
}

/// Write `Rank,NodeID,Score,Status` rows.
///
/// `NodeID` is the original name when `ids` is given and knows the node, else the integer id.
pub fn write_csv<W: Write>(mut out: W, rows: &[RankedNode], ids: Option<&NodeIds>) -> Result<()> {
    writeln!(out, "Rank,NodeID,Score,Status")?;
    for row in rows {
        let id = match ids.and_then(|ids| ids.name_of(row.node)) {
            Some(name) => csv_field(name),
            None => Cow::Owned(row.node.to_string()),
        };
        writeln!(out, "{},{},{:e},{}", row.rank, id, row.score, row.status)?;
    }
    out.flush()?;
    Ok(())
}

fn csv_field(s: &str) -> Cow<'_, str> {
    if s.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}
