//! Blocking graph analysis.
//!
//! ```text
//!   MonitorMetrics.blocking_commands
//!              │
//!       ┌──────▼───────┐   repair_cycles()
//!       │ BlockingGraph│ ──────────────────┐
//!       └──────┬───────┘ <─────────────────┘
//!              │ BlockingForest::from_graph()   (breadth-first)
//!       ┌──────▼────────┐
//!       │ BlockingForest│  one flat BlockingTree per root;
//!       └──────┬────────┘  roots = blockers nobody blocks
//!              │ count_levels()
//!       pid -> [hop1, hop2, ...]
//! ```
//!
//! Lock data is sampled from two independent listings, so the graph can
//! contain cycles. Pairwise cycles are rewritten to point at a marker node;
//! anything longer is cut during tree construction, where every pid is
//! entered at most once per tree. That bound, not the pairwise repair, is
//! what guarantees termination.

mod forest;
mod levels;

pub use forest::{BlockingForest, BlockingNode, BlockingTree, build_forest};
pub use levels::{MAX_DEPTH, blocking_levels, count_levels};

use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use crate::model::Blocker;
use crate::util::compare_pids;

/// Prefix of the synthetic pid that replaces the back edge of a 2-cycle.
pub const CYCLE_MARKER_PREFIX: &str = "cyclic_dependency_";

/// Returns the marker pid used when an edge back to `pid` is removed.
pub fn cycle_marker(pid: &str) -> String {
    format!("{}{}", CYCLE_MARKER_PREFIX, pid)
}

pub fn is_cycle_marker(pid: &str) -> bool {
    pid.starts_with(CYCLE_MARKER_PREFIX)
}

/// Directed "blocker -> blocked" adjacency, owned separately from the metrics
/// so repairs never touch the reported edge counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockingGraph {
    edges: BTreeMap<String, Vec<String>>,
}

impl BlockingGraph {
    pub fn from_blockers(blockers: &BTreeMap<String, Blocker>) -> Self {
        let edges = blockers
            .iter()
            .map(|(pid, b)| (pid.clone(), b.blocked_pids.clone()))
            .collect();
        Self { edges }
    }

    /// Adds an edge, ignoring duplicates.
    pub fn add_edge(&mut self, blocker: &str, blocked: &str) {
        let list = self.edges.entry(blocker.to_string()).or_default();
        if !list.iter().any(|p| p == blocked) {
            list.push(blocked.to_string());
        }
    }

    /// Pids directly blocked by `pid`, in first-seen order.
    pub fn blocked_by(&self, pid: &str) -> &[String] {
        self.edges.get(pid).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_blocker(&self, pid: &str) -> bool {
        self.edges.contains_key(pid)
    }

    /// All blocker pids in pid order.
    pub fn blockers(&self) -> Vec<&str> {
        let mut pids: Vec<&str> = self.edges.keys().map(String::as_str).collect();
        pids.sort_by(|a, b| compare_pids(a, b));
        pids
    }

    /// Blockers that no other blocker holds up, in pid order.
    pub fn roots(&self) -> Vec<&str> {
        let blocked: HashSet<&str> = self
            .edges
            .iter()
            .flat_map(|(blocker, list)| {
                list.iter()
                    .filter(move |pid| *pid != blocker)
                    .map(String::as_str)
            })
            .collect();
        self.blockers()
            .into_iter()
            .filter(|pid| !blocked.contains(pid))
            .collect()
    }

    /// Breaks every 2-cycle (and self-loop) by replacing the back edge with a
    /// marker node. Returns the number of edges rewritten.
    ///
    /// Pairs are visited in pid order; for `p <-> q` with `p` visited first,
    /// `p -> q` is kept and `q -> p` becomes `q -> cyclic_dependency_<p>`.
    pub fn repair_cycles(&mut self) -> usize {
        let pids: Vec<String> = self.blockers().into_iter().map(String::from).collect();
        let mut repaired = 0;

        for p in &pids {
            let children = self.blocked_by(p).to_vec();
            for q in &children {
                let Some(back_edges) = self.edges.get_mut(q) else {
                    continue;
                };
                let Some(pos) = back_edges.iter().position(|x| x == p) else {
                    continue;
                };

                let marker = cycle_marker(p);
                if back_edges.contains(&marker) {
                    back_edges.remove(pos);
                } else {
                    back_edges[pos] = marker;
                }
                repaired += 1;

                if p == q {
                    warn!("pid {} is recorded as blocking itself", p);
                } else {
                    warn!("blocking cycle between pids {} and {}, dropped edge {} -> {}", p, q, q, p);
                }
            }
        }

        repaired
    }

    /// True if any pid can reach itself by following edges.
    pub fn has_cycle(&self) -> bool {
        // Iterative three-colour DFS.
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();

        for start in self.edges.keys() {
            if marks.contains_key(start.as_str()) {
                continue;
            }
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            marks.insert(start.as_str(), Mark::Visiting);

            while let Some(top) = stack.last_mut() {
                let (pid, next) = *top;
                let children = self.blocked_by(pid);
                if next >= children.len() {
                    marks.insert(pid, Mark::Done);
                    stack.pop();
                    continue;
                }
                top.1 += 1;
                let child = children[next].as_str();
                match marks.get(child) {
                    Some(Mark::Visiting) => return true,
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(child, Mark::Visiting);
                        stack.push((child, 0));
                    }
                }
            }
        }
        false
    }
}
