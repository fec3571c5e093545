//! The fringe entry: a scored node for the dispatch min-heap.

use core::cmp::Ordering;

use crate::node::NodeId;

/// A candidate node in the dispatch fringe.
///
/// Compares in reverse order so a `BinaryHeap` pops the entry with the
/// least `(distance, wait flag, id)` triple: among equal distances, nodes
/// that do not wait for inputs come first, then ids break the tie. The
/// distance uses `f64::total_cmp`, so the order is total even for float
/// scores.
#[derive(Clone, Debug)]
pub(crate) struct MinScored {
    pub(crate) dist: f64,
    pub(crate) wait: bool,
    pub(crate) node: NodeId,
}

impl PartialEq for MinScored {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MinScored {}

impl PartialOrd for MinScored {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MinScored {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.wait.cmp(&self.wait))
            .then_with(|| other.node.cmp(&self.node))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::MinScored;
    use crate::node::NodeId;

    fn entry(dist: f64, wait: bool, node: &str) -> MinScored {
        MinScored {
            dist,
            wait,
            node: NodeId::from(node),
        }
    }

    #[test]
    fn pops_by_distance_then_wait_then_id() {
        let mut heap = BinaryHeap::new();
        heap.push(entry(2.0, false, "a"));
        heap.push(entry(1.0, true, "b"));
        heap.push(entry(1.0, false, "d"));
        heap.push(entry(1.0, false, "c"));

        let order: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|e| (e.node.as_str().to_owned(), e.wait))
            .collect();
        assert_eq!(
            order,
            vec![
                ("c".to_owned(), false),
                ("d".to_owned(), false),
                ("b".to_owned(), true),
                ("a".to_owned(), false),
            ]
        );
    }
}
