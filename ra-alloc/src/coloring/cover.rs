//! Vertex-cover sources

use super::graph::{parse_id, InterferenceGraph, NodeId};
use log::{debug, warn};
use ra_common::AllocError;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Supplies the nodes that are NOT colored this iteration
pub trait VertexCoverSource {
    fn cover(&mut self, unit: &str, graph: &InterferenceGraph, iteration: usize) -> Result<BTreeSet<NodeId>, AllocError>;
}

/// Node ids on the first line of the text
pub fn parse_cover(text: &str) -> Result<BTreeSet<NodeId>, AllocError> {
    let Some(line) = text.lines().next() else {
        return Ok(BTreeSet::new());
    };
    line.split_whitespace().map(|tok| parse_id(tok, 1)).collect()
}

/// Reads `<dir>/<unit>.cover.<iteration>`, written by an external solver
/// from the matching graph export. A missing file covers everything.
#[derive(Debug, Clone)]
pub struct FileCover {
    dir: PathBuf,
}

impl FileCover {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, unit: &str, iteration: usize) -> PathBuf {
        self.dir.join(format!("{unit}.cover.{iteration}"))
    }
}

impl VertexCoverSource for FileCover {
    fn cover(&mut self, unit: &str, graph: &InterferenceGraph, iteration: usize) -> Result<BTreeSet<NodeId>, AllocError> {
        let path = self.path_for(unit, iteration);
        match fs::read_to_string(&path) {
            Ok(text) => parse_cover(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("no vertex cover at {}, nothing is colored this round", path.display());
                Ok(graph.nodes().collect())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Max-degree heuristic: keep moving the most connected node into the cover
/// until no edges remain
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyCover;

impl GreedyCover {
    pub fn compute(graph: &InterferenceGraph) -> BTreeSet<NodeId> {
        let mut rest = graph.clone();
        let mut cover = BTreeSet::new();
        loop {
            let isolated: Vec<NodeId> = rest.nodes().filter(|n| rest.degree(*n) == 0).collect();
            for n in isolated {
                rest.remove(n);
            }
            // Highest degree, lowest id on ties
            let Some(node) = rest.nodes().max_by_key(|n| (rest.degree(*n), std::cmp::Reverse(*n))) else {
                break;
            };
            cover.insert(node);
            rest.remove(node);
        }
        debug!("greedy cover takes {} of {} nodes", cover.len(), graph.len());
        cover
    }
}

impl VertexCoverSource for GreedyCover {
    fn cover(&mut self, _unit: &str, graph: &InterferenceGraph, _iteration: usize) -> Result<BTreeSet<NodeId>, AllocError> {
        Ok(Self::compute(graph))
    }
}

/// The same cover every iteration
#[derive(Debug, Clone, Default)]
pub struct FixedCover(pub BTreeSet<NodeId>);

impl VertexCoverSource for FixedCover {
    fn cover(&mut self, _unit: &str, _graph: &InterferenceGraph, _iteration: usize) -> Result<BTreeSet<NodeId>, AllocError> {
        Ok(self.0.clone())
    }
}
