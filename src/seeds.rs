//! Seed (known-bad) node sets and the personalization vector they induce.

use crate::{Error, Result};

/// A deduplicated, sorted set of seed ids, validated against a node count.
///
/// Empty sets are allowed: both engines treat them as a degenerate all-zero result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeedSet {
    ids: Vec<usize>,
}

impl SeedSet {
    /// Rejects any id outside `[0, num_nodes)` with [`Error::InvalidSeed`]; duplicates collapse.
    pub fn new<I: IntoIterator<Item = usize>>(ids: I, num_nodes: usize) -> Result<Self> {
        let mut ids: Vec<usize> = ids.into_iter().collect();
        if let Some(&seed) = ids.iter().find(|&&s| s >= num_nodes) {
            return Err(Error::InvalidSeed { seed, num_nodes });
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(Self { ids })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, node: usize) -> bool {
        self.ids.binary_search(&node).is_ok()
    }

    /// `p[i] = 1/|seeds|` on seeds, `0` elsewhere; all-zero when empty.
    pub fn personalization(&self, num_nodes: usize) -> Vec<f64> {
        let mut p = vec![0.0; num_nodes];
        if self.ids.is_empty() {
            return p;
        }
        let mass = 1.0 / self.ids.len() as f64;
        for &s in &self.ids {
            p[s] = mass;
        }
        p
    }
}
