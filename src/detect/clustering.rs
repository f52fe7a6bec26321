//! Pairwise clustering over a match predicate.
//!
//! Every pair is compared once and matching pairs are merged with a
//! disjoint-set, so the resulting partition is the connected components of
//! the match graph and does not depend on the input order.

/// Disjoint-set with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Returns `false` if both were already in the same set.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }
}

/// A connected component with at least two items.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Item indices, ascending.
    pub members: Vec<usize>,
    /// Largest distance among the matched pairs inside the cluster.
    pub worst: f32,
}

/// Compare all pairs of `n` items and return the clusters of size >= 2,
/// ordered by their first member.
///
/// `compare(i, j)` returns the pair's distance when it matches, `None`
/// otherwise. `on_row(i)` is called after item `i` has been compared with all
/// later items.
pub fn cluster<F, R>(n: usize, mut compare: F, mut on_row: R) -> Vec<Cluster>
where
    F: FnMut(usize, usize) -> Option<f32>,
    R: FnMut(usize),
{
    let mut sets = DisjointSet::new(n);
    let mut edges: Vec<(usize, f32)> = Vec::new();

    for i in 0..n {
        for j in (i + 1)..n {
            if let Some(distance) = compare(i, j) {
                sets.union(i, j);
                edges.push((i, distance));
            }
        }
        on_row(i);
    }

    let mut root_slot: Vec<Option<usize>> = vec![None; n];
    let mut clusters: Vec<Cluster> = Vec::new();
    for i in 0..n {
        let root = sets.find(i);
        match root_slot[root] {
            Some(slot) => clusters[slot].members.push(i),
            None => {
                root_slot[root] = Some(clusters.len());
                clusters.push(Cluster {
                    members: vec![i],
                    worst: 0.0,
                });
            }
        }
    }

    for (i, distance) in edges {
        let root = sets.find(i);
        if let Some(slot) = root_slot[root] {
            let cluster = &mut clusters[slot];
            cluster.worst = cluster.worst.max(distance);
        }
    }

    clusters.retain(|c| c.members.len() >= 2);
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disjoint_set() {
        let mut sets = DisjointSet::new(5);
        assert!(sets.union(0, 1));
        assert!(sets.union(3, 4));
        assert!(!sets.union(1, 0));
        assert_eq!(sets.find(0), sets.find(1));
        assert_ne!(sets.find(1), sets.find(3));
        assert!(sets.union(1, 4));
        assert_eq!(sets.find(0), sets.find(3));
        assert_ne!(sets.find(2), sets.find(0));
    }

    #[test]
    fn test_cluster_is_transitive() {
        // 0~1 and 1~2 but not 0~2: one cluster of three.
        let values = [0.0f32, 10.0, 20.0, 100.0];
        let clusters = cluster(
            values.len(),
            |i, j| {
                let d = (values[i] - values[j]).abs();
                (d < 15.0).then_some(d)
            },
            |_| {},
        );
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![0, 1, 2]);
        assert_eq!(clusters[0].worst, 10.0);
    }

    #[test]
    fn test_cluster_order_independent() {
        let forward = [0.0f32, 10.0, 20.0];
        let reversed = [20.0f32, 10.0, 0.0];
        let run = |values: &[f32]| {
            cluster(
                values.len(),
                |i, j| ((values[i] - values[j]).abs() < 15.0).then_some(0.0),
                |_| {},
            )
        };
        assert_eq!(run(&forward)[0].members.len(), 3);
        assert_eq!(run(&reversed)[0].members.len(), 3);
    }

    #[test]
    fn test_singletons_dropped_and_rows_reported() {
        let mut rows = Vec::new();
        let clusters = cluster(3, |_, _| None, |i| rows.push(i));
        assert!(clusters.is_empty());
        assert_eq!(rows, vec![0, 1, 2]);
    }

    #[test]
    fn test_clusters_ordered_by_first_member() {
        // pairs (1,3) and (0,2)
        let clusters = cluster(
            4,
            |i, j| matches!((i, j), (1, 3) | (0, 2)).then_some(1.0),
            |_| {},
        );
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members, vec![0, 2]);
        assert_eq!(clusters[1].members, vec![1, 3]);
    }
}
