//! Per-hop counts of blocked processes below each root.

use std::collections::BTreeMap;

use super::{BlockingForest, BlockingTree};

/// Deepest hop reported separately. Anything further down is added to this
/// last bucket.
pub const MAX_DEPTH: usize = 9;

/// Counts pids blocked below the root of `tree` at each hop.
///
/// Index `i` holds the count at hop `i + 1`. Every pid is counted once, at
/// its shortest hop. Trailing zero entries are dropped, and pids more than
/// [`MAX_DEPTH`] hops away are folded into the last entry, so
/// `levels.iter().sum()` is the full descendant count.
pub fn count_levels(tree: &BlockingTree) -> Vec<u64> {
    let mut levels = vec![0u64; MAX_DEPTH];
    for node in tree.nodes().iter().filter(|n| n.depth > 0 && n.is_counted()) {
        levels[node.depth.min(MAX_DEPTH) - 1] += 1;
    }

    while levels.last() == Some(&0) {
        levels.pop();
    }
    levels
}

/// Applies [`count_levels`] to every root of the forest.
pub fn blocking_levels(forest: &BlockingForest) -> BTreeMap<String, Vec<u64>> {
    forest
        .roots
        .iter()
        .map(|root| (root.pid().to_string(), count_levels(root)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BlockingGraph, build_forest};
    use crate::model::Blocker;

    fn chain(len: usize) -> BlockingTree {
        let mut graph = BlockingGraph::default();
        for i in 1..len {
            graph.add_edge(&i.to_string(), &(i + 1).to_string());
        }
        BlockingForest::from_graph(&graph).roots.remove(0)
    }

    #[test]
    fn test_chain_of_four() {
        let mut blockers = BTreeMap::new();
        for (blocker, blocked) in [("900", "921"), ("921", "920"), ("920", "910")] {
            blockers
                .entry(blocker.to_string())
                .or_insert_with(|| Blocker::new(blocker, "u", "c", "00:00:01", "db.have"))
                .add_blocked(blocked);
        }
        let forest = build_forest(&blockers);
        let levels = blocking_levels(&forest);
        assert_eq!(levels.len(), 1);
        assert_eq!(levels["900"], vec![1, 1, 1]);
        assert_eq!(levels["900"].iter().sum::<u64>(), 3);
    }

    #[test]
    fn test_fan_out() {
        let mut graph = BlockingGraph::default();
        graph.add_edge("1", "2");
        graph.add_edge("1", "3");
        graph.add_edge("1", "4");
        graph.add_edge("3", "5");
        graph.add_edge("3", "6");
        let forest = BlockingForest::from_graph(&graph);
        assert_eq!(count_levels(&forest.roots[0]), vec![3, 2]);
    }

    #[test]
    fn test_depth_cap() {
        let root = chain(15);
        let levels = count_levels(&root);
        assert_eq!(levels.len(), MAX_DEPTH);
        assert_eq!(levels, vec![1, 1, 1, 1, 1, 1, 1, 1, 6]);
        assert_eq!(levels.iter().sum::<u64>(), 14);
    }

    #[test]
    fn test_exactly_max_depth() {
        let levels = count_levels(&chain(MAX_DEPTH + 1));
        assert_eq!(levels, vec![1; MAX_DEPTH]);
    }

    #[test]
    fn test_markers_and_repeats_not_counted() {
        let mut graph = BlockingGraph::default();
        graph.add_edge("10", "20");
        graph.add_edge("20", "10");
        graph.repair_cycles();
        let forest = BlockingForest::from_graph(&graph);
        assert_eq!(count_levels(&forest.roots[0]), vec![1]);

        let mut graph = BlockingGraph::default();
        graph.add_edge("1", "2");
        graph.add_edge("2", "3");
        graph.add_edge("3", "1");
        let forest = BlockingForest::from_graph(&graph);
        assert_eq!(count_levels(&forest.roots[0]), vec![1, 1]);
    }

    #[test]
    fn test_diamond_counts_pids_once() {
        let mut graph = BlockingGraph::default();
        graph.add_edge("1", "2");
        graph.add_edge("1", "3");
        graph.add_edge("2", "4");
        graph.add_edge("3", "4");
        let forest = BlockingForest::from_graph(&graph);
        assert_eq!(count_levels(&forest.roots[0]), vec![2, 1]);
    }

    #[test]
    fn test_layered_sharing_stays_linear() {
        // 40 layers of two pids, each blocking both pids of the next layer.
        let mut graph = BlockingGraph::default();
        graph.add_edge("0", "1");
        graph.add_edge("0", "2");
        for layer in 0..40u32 {
            for from in [2 * layer + 1, 2 * layer + 2] {
                for to in [2 * layer + 3, 2 * layer + 4] {
                    graph.add_edge(&from.to_string(), &to.to_string());
                }
            }
        }
        let forest = BlockingForest::from_graph(&graph);
        let levels = count_levels(&forest.roots[0]);
        assert_eq!(levels, vec![2, 2, 2, 2, 2, 2, 2, 2, 2 * 33]);
        assert_eq!(levels.iter().sum::<u64>(), 82);
    }

    #[test]
    fn test_root_without_counted_children() {
        let mut graph = BlockingGraph::default();
        graph.add_edge("7", "7");
        graph.repair_cycles();
        let forest = BlockingForest::from_graph(&graph);
        assert!(count_levels(&forest.roots[0]).is_empty());
    }
}
