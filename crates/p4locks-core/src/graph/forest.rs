//! Blocking trees rooted at processes that are not themselves blocked.
//!
//! Trees are grown breadth-first and stored flat, so neither building nor
//! dropping one recurses, whatever the length of the chain. Each pid enters
//! a tree once, at its shortest hop from the root.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, trace, warn};

use super::{BlockingGraph, is_cycle_marker};
use crate::model::Blocker;

/// One process in a blocking tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockingNode {
    pub pid: String,
    /// Hops from the root; the root itself is 0.
    pub depth: usize,
    /// Index of the parent in [`BlockingTree::nodes`], `None` for the root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    /// Set when this pid already appears higher up the same branch; the
    /// branch is cut here.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub repeated: bool,
}

impl BlockingNode {
    fn new(pid: impl Into<String>, depth: usize, parent: Option<usize>) -> Self {
        Self {
            pid: pid.into(),
            depth,
            parent,
            repeated: false,
        }
    }

    /// Whether this node stands for a real blocked process.
    ///
    /// Cycle markers and repeated ancestors are kept in the tree for the
    /// record but are not counted.
    pub fn is_counted(&self) -> bool {
        !self.repeated && !is_cycle_marker(&self.pid)
    }
}

/// One blocking tree in breadth-first order. The root is always the first node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockingTree {
    nodes: Vec<BlockingNode>,
}

impl BlockingTree {
    /// Pid of the root.
    pub fn pid(&self) -> &str {
        &self.nodes[0].pid
    }

    pub fn nodes(&self) -> &[BlockingNode] {
        &self.nodes
    }

    /// The node entered for `pid`, skipping repeated-ancestor leaves.
    pub fn find(&self, pid: &str) -> Option<&BlockingNode> {
        self.nodes.iter().find(|n| n.pid == pid && !n.repeated)
    }

    /// Nodes directly below `pid`, in edge order.
    pub fn children(&self, pid: &str) -> Vec<&BlockingNode> {
        let Some(idx) = self.nodes.iter().position(|n| n.pid == pid && !n.repeated) else {
            return Vec::new();
        };
        self.nodes
            .iter()
            .filter(|n| n.parent == Some(idx))
            .collect()
    }

    /// True if node `ancestor` lies on the path from the root to node `idx`.
    fn is_ancestor(&self, ancestor: usize, mut idx: usize) -> bool {
        let floor = self.nodes[ancestor].depth;
        loop {
            if idx == ancestor {
                return true;
            }
            match self.nodes[idx].parent {
                Some(parent) if self.nodes[idx].depth > floor => idx = parent,
                _ => return false,
            }
        }
    }

    /// Grows the tree below `root`, recording every pid entered in `reached`.
    fn grow<'g>(graph: &'g BlockingGraph, root: &'g str, reached: &mut HashSet<String>) -> Self {
        let mut tree = Self {
            nodes: vec![BlockingNode::new(root, 0, None)],
        };
        let mut entered: HashMap<&'g str, usize> = HashMap::from([(root, 0)]);
        let mut queue: VecDeque<(usize, &'g str)> = VecDeque::from([(0, root)]);

        while let Some((idx, pid)) = queue.pop_front() {
            let depth = tree.nodes[idx].depth + 1;
            for child in graph.blocked_by(pid) {
                match entered.get(child.as_str()) {
                    Some(&seen) if tree.is_ancestor(seen, idx) => {
                        warn!(
                            "blocking cycle: pid {} is already an ancestor of pid {}, not descending",
                            child, pid
                        );
                        tree.nodes.push(BlockingNode {
                            repeated: true,
                            ..BlockingNode::new(child.as_str(), depth, Some(idx))
                        });
                    }
                    Some(_) => {
                        trace!("pid {} already reached below root {}", child, root);
                    }
                    None => {
                        let next = tree.nodes.len();
                        entered.insert(child.as_str(), next);
                        tree.nodes.push(BlockingNode::new(child.as_str(), depth, Some(idx)));
                        queue.push_back((next, child.as_str()));
                    }
                }
            }
        }

        reached.extend(entered.into_keys().map(String::from));
        tree
    }
}

/// All blocking trees of one snapshot, in root pid order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BlockingForest {
    pub roots: Vec<BlockingTree>,
}

impl BlockingForest {
    /// Grows a tree from every root of `graph`.
    ///
    /// Blockers that are unreachable from any root (components that are one
    /// big cycle) get the lowest pid of the component as an extra root, so
    /// every blocker appears somewhere in the forest.
    pub fn from_graph(graph: &BlockingGraph) -> Self {
        let mut reached: HashSet<String> = HashSet::new();
        let mut roots = Vec::new();

        for root in graph.roots() {
            roots.push(BlockingTree::grow(graph, root, &mut reached));
        }

        for pid in graph.blockers() {
            if reached.contains(pid) {
                continue;
            }
            warn!(
                "pid {} is blocked only from within a blocking cycle, reporting it as a root",
                pid
            );
            roots.push(BlockingTree::grow(graph, pid, &mut reached));
        }

        debug!("built blocking forest with {} roots", roots.len());
        Self { roots }
    }

    pub fn root(&self, pid: &str) -> Option<&BlockingTree> {
        self.roots.iter().find(|r| r.pid() == pid)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Builds the blocking forest for a snapshot's blockers, repairing
/// pairwise cycles first.
pub fn build_forest(blockers: &BTreeMap<String, Blocker>) -> BlockingForest {
    let mut graph = BlockingGraph::from_blockers(blockers);
    let repaired = graph.repair_cycles();
    if repaired > 0 {
        debug!("rewrote {} cyclic blocking edges", repaired);
    }
    BlockingForest::from_graph(&graph)
}
