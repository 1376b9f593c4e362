//! Immutable compressed sparse-row (CSR) graph.
//!
//! Invariants (checked by tests, relied on by both engines):
//! - `row_ptr.len() == num_nodes + 1`, `row_ptr[0] == 0`, `row_ptr[num_nodes] == num_edges`,
//!   and `row_ptr` is non-decreasing.
//! - every edge weight is finite and `> 0`.
//! - `out_weight_sum[u]` equals the sum of the weights in `u`'s outgoing range.
//!
//! Weights are stored raw. Engines divide by `out_weight_sum[u]` themselves: PPR wants the
//! normalized fraction, Monte Carlo samples against cumulative raw weights.

use crate::{Error, Result};

/// Replacement for an input weight of exactly zero.
pub const ZERO_WEIGHT_EPSILON: f64 = 1e-4;

/// Loader-side weight cleanup: absolute value, and `0` becomes [`ZERO_WEIGHT_EPSILON`].
///
/// The builder does not call this; it rejects anything this would have changed.
pub fn sanitize_weight(weight: f64) -> f64 {
    let w = weight.abs();
    if w == 0.0 {
        ZERO_WEIGHT_EPSILON
    } else {
        w
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CsrGraph {
    num_nodes: usize,
    row_ptr: Vec<usize>,
    col_indices: Vec<usize>,
    edge_weights: Vec<f64>,
    out_weight_sum: Vec<f64>,
}

impl CsrGraph {
    /// Build with the node count inferred as `max id + 1` (0 for an empty edge list).
    ///
    /// An id of `usize::MAX` has no valid node count and is [`Error::InvalidEdge`].
    pub fn from_edges_inferred(edges: &[(usize, usize, f64)]) -> Result<Self> {
        let mut num_nodes = 0usize;
        for &(u, v, _) in edges {
            let Some(count) = u.max(v).checked_add(1) else {
                return Err(Error::InvalidEdge {
                    src: u,
                    dst: v,
                    num_nodes: usize::MAX,
                });
            };
            num_nodes = num_nodes.max(count);
        }
        CsrGraphBuilder::new(num_nodes).build(edges)
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_edges(&self) -> usize {
        self.col_indices.len()
    }

    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    pub fn edge_weights(&self) -> &[f64] {
        &self.edge_weights
    }

    pub fn out_weight_sums(&self) -> &[f64] {
        &self.out_weight_sum
    }

    /// Half-open edge range of `node` into [`Self::col_indices`] / [`Self::edge_weights`].
    #[inline]
    pub fn edge_range(&self, node: usize) -> std::ops::Range<usize> {
        self.row_ptr[node]..self.row_ptr[node + 1]
    }

    #[inline]
    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.col_indices[self.edge_range(node)]
    }

    #[inline]
    pub fn weights(&self, node: usize) -> &[f64] {
        &self.edge_weights[self.edge_range(node)]
    }

    #[inline]
    pub fn out_degree(&self, node: usize) -> usize {
        self.row_ptr[node + 1] - self.row_ptr[node]
    }

    #[inline]
    pub fn out_weight_sum(&self, node: usize) -> f64 {
        self.out_weight_sum[node]
    }

    /// A node with no outgoing weight. Its mass is a dead end for both engines.
    #[inline]
    pub fn is_dangling(&self, node: usize) -> bool {
        self.out_weight_sum[node] == 0.0
    }

    pub fn dangling_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_nodes).filter(move |&u| self.is_dangling(u))
    }
}

/// Two-pass CSR construction from an ordered `(source, destination, weight)` edge list.
#[derive(Debug, Clone, Copy)]
pub struct CsrGraphBuilder {
    num_nodes: usize,
}

impl CsrGraphBuilder {
    pub fn new(num_nodes: usize) -> Self {
        Self { num_nodes }
    }

    /// Build the graph.
    ///
    /// Errors:
    /// - [`Error::InvalidEdge`] if an endpoint is outside `[0, num_nodes)`.
    /// - [`Error::InvalidWeight`] if a weight is non-finite or `<= 0`; run input through
    ///   [`sanitize_weight`] first.
    ///
    /// Parallel edges are kept as separate entries. Within a row, edges keep input order.
    pub fn build(&self, edges: &[(usize, usize, f64)]) -> Result<CsrGraph> {
        let n = self.num_nodes;

        // Pass 1: validate and count out-degrees.
        let mut row_ptr = vec![0usize; n + 1];
        for &(u, v, w) in edges {
            if u >= n || v >= n {
                return Err(Error::InvalidEdge {
                    src: u,
                    dst: v,
                    num_nodes: n,
                });
            }
            if !w.is_finite() || w <= 0.0 {
                return Err(Error::InvalidWeight {
                    src: u,
                    dst: v,
                    weight: w,
                });
            }
            row_ptr[u + 1] += 1;
        }
        for i in 0..n {
            row_ptr[i + 1] += row_ptr[i];
        }

        // Pass 2: scatter into rows, using a copy of row_ptr as write cursors.
        let nnz = edges.len();
        let mut col_indices = vec![0usize; nnz];
        let mut edge_weights = vec![0.0f64; nnz];
        let mut out_weight_sum = vec![0.0f64; n];
        let mut cursor = row_ptr.clone();
        for &(u, v, w) in edges {
            let at = cursor[u];
            col_indices[at] = v;
            edge_weights[at] = w;
            out_weight_sum[u] += w;
            cursor[u] += 1;
        }

        tracing::debug!(num_nodes = n, num_edges = nnz, "built csr graph");

        Ok(CsrGraph {
            num_nodes: n,
            row_ptr,
            col_indices,
            edge_weights,
            out_weight_sum,
        })
    }
}

#[cfg(feature = "petgraph")]
impl<N, Ix> TryFrom<&petgraph::Graph<N, f64, petgraph::Directed, Ix>> for CsrGraph
where
    Ix: petgraph::graph::IndexType,
{
    type Error = Error;

    /// Node ids follow `NodeIndex::index()`; edge weights must already be sanitized.
    fn try_from(g: &petgraph::Graph<N, f64, petgraph::Directed, Ix>) -> Result<Self> {
        use petgraph::visit::EdgeRef;
        let edges: Vec<(usize, usize, f64)> = g
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), *e.weight()))
            .collect();
        CsrGraphBuilder::new(g.node_count()).build(&edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_csr_invariants(g: &CsrGraph) {
        let rp = g.row_ptr();
        assert_eq!(rp.len(), g.num_nodes() + 1);
        assert_eq!(rp[0], 0);
        assert_eq!(rp[g.num_nodes()], g.num_edges());
        assert!(rp.windows(2).all(|w| w[0] <= w[1]));
        for u in 0..g.num_nodes() {
            let s: f64 = g.weights(u).iter().sum();
            assert_eq!(s, g.out_weight_sum(u), "node {u}");
            assert!(g.weights(u).iter().all(|&w| w > 0.0));
        }
    }

    #[test]
    fn builds_rows_and_weight_sums() {
        // 0 -> 1 (2.0), 0 -> 2 (1.0), 1 -> 2 (1.0), 2 -> 3 (1.0), 3 dangling
        let edges = vec![(0, 1, 2.0), (2, 3, 1.0), (0, 2, 1.0), (1, 2, 1.0)];
        let g = CsrGraphBuilder::new(4).build(&edges).unwrap();
        assert_csr_invariants(&g);
        assert_eq!(g.row_ptr(), &[0, 2, 3, 4, 4]);
        assert_eq!(g.neighbors(0), &[1, 2]);
        assert_eq!(g.weights(0), &[2.0, 1.0]);
        assert_eq!(g.out_weight_sum(0), 3.0);
        assert!(g.is_dangling(3));
        assert_eq!(g.dangling_nodes().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn isolated_trailing_nodes_are_dangling() {
        let g = CsrGraphBuilder::new(5).build(&[(0, 1, 1.0)]).unwrap();
        assert_csr_invariants(&g);
        assert_eq!(g.dangling_nodes().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn rejects_out_of_range_endpoint() {
        let err = CsrGraphBuilder::new(2).build(&[(0, 2, 1.0)]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidEdge {
                src: 0,
                dst: 2,
                num_nodes: 2
            }
        ));
    }

    #[test]
    fn rejects_unsanitized_weights() {
        for w in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = CsrGraphBuilder::new(2).build(&[(0, 1, w)]).unwrap_err();
            assert!(matches!(err, Error::InvalidWeight { .. }), "w={w}");
        }
    }

    #[test]
    fn sanitized_weights_land_in_graph() {
        let edges: Vec<_> = [(0, 1, 0.0), (1, 0, -2.5)]
            .into_iter()
            .map(|(u, v, w)| (u, v, sanitize_weight(w)))
            .collect();
        let g = CsrGraphBuilder::new(2).build(&edges).unwrap();
        assert_eq!(g.weights(0), &[1e-4]);
        assert_eq!(g.weights(1), &[2.5]);
    }

    #[test]
    fn inferred_node_count() {
        let g = CsrGraph::from_edges_inferred(&[(0, 4, 1.0)]).unwrap();
        assert_eq!(g.num_nodes(), 5);
        let empty = CsrGraph::from_edges_inferred(&[]).unwrap();
        assert_eq!(empty.num_nodes(), 0);
        assert_eq!(empty.row_ptr(), &[0]);
    }

    #[test]
    fn inferred_node_count_rejects_max_id() {
        let err = CsrGraph::from_edges_inferred(&[(0, usize::MAX, 1.0)]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidEdge {
                src: 0,
                dst: usize::MAX,
                ..
            }
        ));
    }

    proptest! {
        #[test]
        fn prop_csr_invariants_hold(
            n in 1usize..20,
            edges in proptest::collection::vec((0usize..20, 0usize..20, 0.001f64..10.0), 0..80),
        ) {
            let edges: Vec<_> = edges.into_iter().filter(|&(u, v, _)| u < n && v < n).collect();
            let g = CsrGraphBuilder::new(n).build(&edges).unwrap();
            prop_assert_eq!(g.num_edges(), edges.len());
            assert_csr_invariants(&g);
            for u in 0..n {
                let expected = edges.iter().filter(|e| e.0 == u).count();
                prop_assert_eq!(g.out_degree(u), expected);
            }
        }
    }
}
