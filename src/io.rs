//! Edge-list loading.
//!
//! Format: one edge per line, `source destination [weight]`, whitespace-separated.
//! - blank lines and lines starting with `#` or `%` are ignored
//! - lines with fewer than two tokens are skipped
//! - a missing weight is `1.0`; weights go through [`sanitize_weight`]
//!
//! Node tokens are names, not ids: they are interned through [`NodeIds`], so `"17"` and
//! `"alice"` are handled the same way.

use std::io::BufRead;
use std::path::Path;

use crate::graph::{sanitize_weight, CsrGraph, CsrGraphBuilder};
use crate::ids::NodeIds;
use crate::{Error, Result};

/// Parsed, sanitized edges plus the name table that produced their ids.
#[derive(Debug, Clone, Default)]
pub struct EdgeList {
    pub ids: NodeIds,
    pub edges: Vec<(usize, usize, f64)>,
    /// Lines dropped for having fewer than two tokens.
    pub skipped_lines: usize,
}

impl EdgeList {
    pub fn num_nodes(&self) -> usize {
        self.ids.len()
    }

    pub fn to_graph(&self) -> Result<CsrGraph> {
        CsrGraphBuilder::new(self.ids.len()).build(&self.edges)
    }
}

pub fn read_edge_list<R: BufRead>(reader: R) -> Result<EdgeList> {
    let mut out = EdgeList::default();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('%') {
            continue;
        }
        let mut it = line.split_whitespace();
        let (Some(a), Some(b)) = (it.next(), it.next()) else {
            out.skipped_lines += 1;
            continue;
        };
        let weight = match it.next() {
            None => 1.0,
            Some(tok) => tok.parse::<f64>().map_err(|e| Error::Parse {
                line: line_no + 1,
                message: format!("bad weight '{tok}': {e}"),
            })?,
        };
        if !weight.is_finite() {
            return Err(Error::Parse {
                line: line_no + 1,
                message: format!("weight must be finite, got '{weight}'"),
            });
        }
        let u = out.ids.get_or_insert(a);
        let v = out.ids.get_or_insert(b);
        out.edges.push((u, v, sanitize_weight(weight)));
    }
    if out.skipped_lines > 0 {
        tracing::warn!(skipped = out.skipped_lines, "skipped malformed edge lines");
    }
    let (nodes, edges) = (out.ids.len(), out.edges.len());
    tracing::debug!(nodes, edges, "read edge list");
    Ok(out)
}

/// Open and read `path`. A missing or unreadable file is [`Error::Io`].
pub fn load_edge_list(path: &Path) -> Result<EdgeList> {
    let file = std::fs::File::open(path)?;
    read_edge_list(std::io::BufReader::new(file))
}
