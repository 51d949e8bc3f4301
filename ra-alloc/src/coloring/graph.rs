//! Interference graph and its text exchange format
//!
//! One line per node: the node id followed by the ids of its neighbors, all
//! separated by whitespace. Node ids are virtual register ids.

use crate::live::LiveIntervals;
use log::debug;
use ra_common::{AllocError, VirtReg};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub type NodeId = u32;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterferenceGraph {
    adj: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl InterferenceGraph {
    /// Graph over the non-empty ranges among `vregs`; two nodes are adjacent
    /// when their live ranges overlap
    pub fn build(lis: &LiveIntervals, vregs: &[VirtReg]) -> Self {
        let live: Vec<_> = vregs
            .iter()
            .filter_map(|v| lis.get(*v))
            .filter(|li| !li.is_empty())
            .collect();
        let mut adj: BTreeMap<NodeId, BTreeSet<NodeId>> =
            live.iter().map(|li| (li.reg.id(), BTreeSet::new())).collect();
        for (i, a) in live.iter().enumerate() {
            for b in &live[i + 1..] {
                if a.overlaps(b) {
                    adj.entry(a.reg.id()).or_default().insert(b.reg.id());
                    adj.entry(b.reg.id()).or_default().insert(a.reg.id());
                }
            }
        }
        let graph = Self { adj };
        debug!("interference graph: {} nodes, {} edges", graph.len(), graph.edge_count());
        graph
    }

    pub fn from_adjacency(adj: BTreeMap<NodeId, BTreeSet<NodeId>>) -> Self {
        Self { adj }
    }

    pub fn adjacency(&self) -> &BTreeMap<NodeId, BTreeSet<NodeId>> {
        &self.adj
    }

    pub fn len(&self) -> usize {
        self.adj.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.adj.contains_key(&node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.adj.keys().copied()
    }

    pub fn neighbors(&self, node: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.adj.get(&node)
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.adj.get(&node).map_or(0, BTreeSet::len)
    }

    pub fn edge_count(&self) -> usize {
        self.adj.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Remove `node` and every edge touching it
    pub fn remove(&mut self, node: NodeId) {
        if let Some(neighbors) = self.adj.remove(&node) {
            for n in neighbors {
                if let Some(set) = self.adj.get_mut(&n) {
                    set.remove(&node);
                }
            }
        }
    }

    pub fn export(&self) -> String {
        let mut out = String::new();
        for (node, neighbors) in &self.adj {
            let _ = write!(out, "{node}");
            for n in neighbors {
                let _ = write!(out, " {n}");
            }
            out.push('\n');
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> Result<(), AllocError> {
        fs::write(path, self.export())?;
        debug!("exported interference graph to {}", path.display());
        Ok(())
    }

    /// Parse the exchange format. Every neighbor must itself be listed as a
    /// node.
    pub fn parse(text: &str) -> Result<Self, AllocError> {
        let mut adj: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        let mut mentioned: Vec<(usize, NodeId)> = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let lineno = idx + 1;
            let mut tokens = line.split_whitespace();
            let Some(first) = tokens.next() else {
                continue;
            };
            let node = parse_id(first, lineno)?;
            if adj.contains_key(&node) {
                return Err(AllocError::graph_format(lineno, format!("node {node} listed twice")));
            }
            let mut neighbors = BTreeSet::new();
            for tok in tokens {
                let n = parse_id(tok, lineno)?;
                if n == node {
                    return Err(AllocError::graph_format(lineno, format!("node {node} is its own neighbor")));
                }
                neighbors.insert(n);
                mentioned.push((lineno, n));
            }
            adj.insert(node, neighbors);
        }
        if let Some((lineno, n)) = mentioned.into_iter().find(|(_, n)| !adj.contains_key(n)) {
            return Err(AllocError::graph_format(lineno, format!("unknown node {n}")));
        }
        Ok(Self { adj })
    }
}

pub(crate) fn parse_id(tok: &str, line: usize) -> Result<NodeId, AllocError> {
    tok.parse()
        .map_err(|_| AllocError::graph_format(line, format!("'{tok}' is not a node id")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Block, Function, UseSlot, VRegDesc};
    use pretty_assertions::assert_eq;
    use ra_common::{RegClassId, Segment};

    fn lis() -> LiveIntervals {
        let mut func = Function::new("g");
        func.blocks = vec![Block::new(0, 50, 1.0)];
        for (id, start, end) in [(0, 0, 10), (1, 5, 15), (2, 12, 20), (3, 30, 30)] {
            func.vregs.push(VRegDesc {
                id: VirtReg::new(id),
                class: RegClassId(0),
                segments: if end > start { vec![Segment::new(start, end)] } else { Vec::new() },
                uses: vec![UseSlot::def(start)],
                hints: Vec::new(),
            });
        }
        LiveIntervals::new(&func)
    }

    #[test]
    fn test_build_and_export() {
        let lis = lis();
        let graph = InterferenceGraph::build(&lis, &lis.vregs());
        // The empty range is not a node
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.export(), "0 1\n1 0 2\n2 1\n");
    }

    #[test]
    fn test_parse_ignores_order_and_spacing() {
        let graph = InterferenceGraph::parse("2   1\n\n1 2 0\n0 1\n").unwrap();
        let lis = lis();
        assert_eq!(graph, InterferenceGraph::build(&lis, &lis.vregs()));
    }

    #[test]
    fn test_from_adjacency_matches_parsed_text() {
        let adj: BTreeMap<NodeId, BTreeSet<NodeId>> = [
            (0, BTreeSet::from([1])),
            (1, BTreeSet::from([0, 2])),
            (2, BTreeSet::from([1])),
            (7, BTreeSet::new()),
        ]
        .into_iter()
        .collect();
        let graph = InterferenceGraph::from_adjacency(adj.clone());
        assert_eq!(graph.adjacency(), &adj);
        assert_eq!(graph.degree(1), 2);
        assert_eq!(InterferenceGraph::parse(&graph.export()).unwrap(), graph);
    }

    #[test]
    fn test_parse_errors() {
        let err = InterferenceGraph::parse("0 1\n1 x\n").unwrap_err();
        assert_eq!(err, AllocError::graph_format(2, "'x' is not a node id"));
        assert!(InterferenceGraph::parse("0 7\n").is_err());
        assert!(InterferenceGraph::parse("0 0\n").is_err());
        assert!(InterferenceGraph::parse("0\n0\n").is_err());
    }

    #[test]
    fn test_remove_node() {
        let lis = lis();
        let mut graph = InterferenceGraph::build(&lis, &lis.vregs());
        graph.remove(1);
        assert_eq!(graph.export(), "0\n2\n");
    }
}
