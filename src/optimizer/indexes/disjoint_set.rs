use std::collections::{BTreeSet, HashMap};

/// Union-find over string ids with path compression and union by rank.
///
/// Every representative also owns the materialized member set of its
/// cluster, merged on each union.
#[derive(Debug, Clone, Default)]
pub struct DisjointSet {
    index: HashMap<String, usize>,
    ids: Vec<String>,
    parent: Vec<usize>,
    rank: Vec<u32>,
    members: HashMap<usize, BTreeSet<String>>,
}

impl DisjointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` as a singleton cluster; returns false if it already exists
    pub fn make_set(&mut self, id: &str) -> bool {
        if self.index.contains_key(id) {
            return false;
        }
        let slot = self.ids.len();
        self.index.insert(id.to_string(), slot);
        self.ids.push(id.to_string());
        self.parent.push(slot);
        self.rank.push(0);
        self.members.insert(slot, BTreeSet::from([id.to_string()]));
        true
    }

    fn find_slot(&mut self, slot: usize) -> usize {
        let mut root = slot;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = slot;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    /// Representative id of the cluster containing `id`
    pub fn find(&mut self, id: &str) -> Option<String> {
        let slot = *self.index.get(id)?;
        let root = self.find_slot(slot);
        Some(self.ids[root].clone())
    }

    /// Merge the clusters of `a` and `b`, creating either set if missing.
    ///
    /// Returns false when both already share a cluster.
    pub fn union(&mut self, a: &str, b: &str) -> bool {
        self.make_set(a);
        self.make_set(b);

        let root_a = self.find_slot(self.index[a]);
        let root_b = self.find_slot(self.index[b]);
        if root_a == root_b {
            return false;
        }

        let (root, child) = match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => (root_b, root_a),
            std::cmp::Ordering::Greater => (root_a, root_b),
            std::cmp::Ordering::Equal => {
                self.rank[root_a] += 1;
                (root_a, root_b)
            }
        };

        self.parent[child] = root;
        let moved = self.members.remove(&child).unwrap_or_default();
        self.members.entry(root).or_default().extend(moved);
        true
    }

    pub fn connected(&mut self, a: &str, b: &str) -> bool {
        match (self.index.get(a).copied(), self.index.get(b).copied()) {
            (Some(x), Some(y)) => self.find_slot(x) == self.find_slot(y),
            _ => false,
        }
    }

    /// Sorted members of the cluster containing `id`; empty if unknown
    pub fn cluster(&mut self, id: &str) -> Vec<String> {
        let Some(&slot) = self.index.get(id) else {
            return Vec::new();
        };
        let root = self.find_slot(slot);
        self.members
            .get(&root)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn cluster_count(&self) -> usize {
        self.members.len()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        self.members.values().map(BTreeSet::len).collect()
    }
}
