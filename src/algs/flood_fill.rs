//! Breadth-first connected-component labelling.
//!
//! Components are numbered in the order of their smallest member: seeds are
//! taken in ascending node index and neighbours are visited in the order the
//! adjacency yields them. Identical inputs give identical labels on every rank.

use std::collections::VecDeque;

/// Label the components of the subgraph of `active` nodes where an edge
/// `(a, b)` only counts if `same(a, b)`.
///
/// Returns one entry per node: `Some(component)` for active nodes, `None`
/// otherwise, plus the number of components.
pub fn flood_fill<I>(
    num_nodes: usize,
    neighbors: impl Fn(usize) -> I,
    active: impl Fn(usize) -> bool,
    same: impl Fn(usize, usize) -> bool,
) -> (Vec<Option<usize>>, usize)
where
    I: IntoIterator<Item = usize>,
{
    let mut label: Vec<Option<usize>> = vec![None; num_nodes];
    let mut count = 0;
    let mut queue = VecDeque::new();
    for seed in 0..num_nodes {
        if label[seed].is_some() || !active(seed) {
            continue;
        }
        label[seed] = Some(count);
        queue.push_back(seed);
        while let Some(p) = queue.pop_front() {
            for q in neighbors(p) {
                if q < num_nodes && label[q].is_none() && active(q) && same(p, q) {
                    label[q] = Some(count);
                    queue.push_back(q);
                }
            }
        }
        count += 1;
    }
    (label, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_follow_smallest_member() {
        // path 0-1-2-3-4 with colors a a b a a
        let adj = [vec![1], vec![0, 2], vec![1, 3], vec![2, 4], vec![3]];
        let color = ['a', 'a', 'b', 'a', 'a'];
        let (labels, n) = flood_fill(5, |p| adj[p].clone(), |_| true, |p, q| color[p] == color[q]);
        assert_eq!(n, 3);
        assert_eq!(labels, vec![Some(0), Some(0), Some(1), Some(2), Some(2)]);
    }

    #[test]
    fn inactive_nodes_break_connectivity() {
        let adj = [vec![1], vec![0, 2], vec![1]];
        let (labels, n) = flood_fill(3, |p| adj[p].clone(), |p| p != 1, |_, _| true);
        assert_eq!(n, 2);
        assert_eq!(labels, vec![Some(0), None, Some(1)]);
    }
}
