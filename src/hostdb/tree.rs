/* This file is part of Stornet (https://stornet.network)
 *
 * Copyright (C) 2024-2026 Stornet developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::collections::HashMap;

use rand::Rng;
use url::Url;

use crate::{Error, Result};

pub type NodeIndex = usize;

/// One slot of the tree arena. All links are indices into the arena,
/// so the structure carries no shared ownership or back-pointers.
#[derive(Clone, Debug)]
struct Node {
    parent: Option<NodeIndex>,
    left: Option<NodeIndex>,
    right: Option<NodeIndex>,
    /// Number of nodes in this subtree, including this one
    count: usize,
    /// This host's own weight
    weight: f64,
    /// Sum of weights over the whole subtree
    subtree_weight: f64,
    addr: Url,
}

/// An unsorted binary tree supporting weighted random selection in
/// O(log n). Each node accumulates the weight of its subtree; picking
/// draws a uniform value below the root's total and descends. Inserts
/// fill the emptier side first, which keeps leaf depths within one of
/// each other.
#[derive(Default)]
pub struct HostTree {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeIndex>,
    root: Option<NodeIndex>,
    index: HashMap<Url, NodeIndex>,
}

impl HostTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, addr: &Url) -> bool {
        self.index.contains_key(addr)
    }

    pub fn weight_of(&self, addr: &Url) -> Option<f64> {
        self.index.get(addr).map(|&i| self.node(i).weight)
    }

    pub fn total_weight(&self) -> f64 {
        match self.root {
            Some(root) => self.node(root).subtree_weight,
            None => 0.0,
        }
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Url> {
        self.index.keys()
    }

    /// Add a host. If the address is already present, only its weight
    /// is updated.
    pub fn insert(&mut self, addr: &Url, weight: f64) {
        if self.contains(addr) {
            self.update_weight(addr, weight);
            return
        }

        let idx = self.alloc(Node {
            parent: None,
            left: None,
            right: None,
            count: 1,
            weight,
            subtree_weight: weight,
            addr: addr.clone(),
        });
        self.index.insert(addr.clone(), idx);

        let Some(root) = self.root else {
            self.root = Some(idx);
            return
        };

        // Descend toward the side with fewer descendants, ties left.
        let mut cur = root;
        loop {
            let node = self.node(cur);
            match (node.left, node.right) {
                (None, _) => {
                    self.node_mut(cur).left = Some(idx);
                    break
                }
                (_, None) => {
                    self.node_mut(cur).right = Some(idx);
                    break
                }
                (Some(l), Some(r)) => {
                    cur = if self.node(l).count <= self.node(r).count { l } else { r };
                }
            }
        }
        self.node_mut(idx).parent = Some(cur);

        let mut up = Some(cur);
        while let Some(i) = up {
            let node = self.node_mut(i);
            node.count += 1;
            node.subtree_weight += weight;
            up = node.parent;
        }
    }

    /// Remove a host, returning its weight. The removed node's slot is
    /// filled by a leaf from its own subtree, so leaf depths stay
    /// within one of each other.
    pub fn remove(&mut self, addr: &Url) -> Option<f64> {
        let idx = self.index.remove(addr)?;
        let target_weight = self.node(idx).weight;

        // Find a leaf below the target, descending into the larger side.
        let mut leaf = idx;
        loop {
            let node = self.node(leaf);
            match (node.left, node.right) {
                (None, None) => break,
                (Some(l), None) => leaf = l,
                (None, Some(r)) => leaf = r,
                (Some(l), Some(r)) => {
                    leaf = if self.node(l).count >= self.node(r).count { l } else { r };
                }
            }
        }

        let leaf_weight = self.node(leaf).weight;
        let leaf_addr = self.node(leaf).addr.clone();

        // Detach the leaf and settle count and weight along its path.
        let parent = self.node(leaf).parent;
        if let Some(p) = parent {
            let pn = self.node_mut(p);
            if pn.left == Some(leaf) {
                pn.left = None
            } else {
                pn.right = None
            }
        }
        let mut up = parent;
        while let Some(i) = up {
            let node = self.node_mut(i);
            node.count -= 1;
            node.subtree_weight -= leaf_weight;
            up = node.parent;
        }

        if leaf == idx {
            // The target was that leaf.
            if self.root == Some(idx) {
                self.root = None;
            }
            self.dealloc(idx);
            return Some(target_weight)
        }

        // Move the leaf's host into the target's slot.
        let delta = leaf_weight - target_weight;
        {
            let node = self.node_mut(idx);
            node.weight = leaf_weight;
            node.addr = leaf_addr.clone();
        }
        let mut up = Some(idx);
        while let Some(i) = up {
            let node = self.node_mut(i);
            node.subtree_weight += delta;
            up = node.parent;
        }
        self.index.insert(leaf_addr, idx);
        self.dealloc(leaf);

        Some(target_weight)
    }

    /// Change a host's weight in place, propagating the delta to the
    /// root.
    pub fn update_weight(&mut self, addr: &Url, new_weight: f64) -> bool {
        let Some(&idx) = self.index.get(addr) else { return false };

        let delta = new_weight - self.node(idx).weight;
        self.node_mut(idx).weight = new_weight;

        let mut up = Some(idx);
        while let Some(i) = up {
            let node = self.node_mut(i);
            node.subtree_weight += delta;
            up = node.parent;
        }
        true
    }

    /// Select a host at random with probability proportional to its
    /// weight.
    pub fn pick<R: Rng>(&self, rng: &mut R) -> Result<Url> {
        let root = self.root.ok_or(Error::NoHosts)?;
        let total = self.node(root).subtree_weight;
        if total <= 0.0 {
            return Err(Error::NoHosts)
        }

        let mut x = rng.gen_range(0.0..total);
        let mut cur = root;
        loop {
            let node = self.node(cur);
            if let Some(l) = node.left {
                let left_weight = self.node(l).subtree_weight;
                if x < left_weight {
                    cur = l;
                    continue
                }
                x -= left_weight;
            }
            if x < node.weight {
                return Ok(node.addr.clone())
            }
            x -= node.weight;
            match node.right {
                Some(r) => cur = r,
                // Accumulated float error can leave a sliver of x
                // with nowhere to go; it belongs to this node.
                None => return Ok(node.addr.clone()),
            }
        }
    }

    fn node(&self, idx: NodeIndex) -> &Node {
        self.nodes[idx].as_ref().unwrap()
    }

    fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        self.nodes[idx].as_mut().unwrap()
    }

    fn alloc(&mut self, node: Node) -> NodeIndex {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn dealloc(&mut self, idx: NodeIndex) {
        self.nodes[idx] = None;
        self.free.push(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn addr(n: usize) -> Url {
        Url::parse(&format!("tcp://host{}.example:9981", n)).unwrap()
    }

    /// Recompute every node's invariants from scratch.
    fn check_invariants(tree: &HostTree) {
        fn walk(tree: &HostTree, idx: NodeIndex, parent: Option<NodeIndex>) -> (usize, f64) {
            let node = tree.node(idx);
            assert_eq!(node.parent, parent);

            let mut count = 1;
            let mut weight = node.weight;
            for child in [node.left, node.right].into_iter().flatten() {
                let (c, w) = walk(tree, child, Some(idx));
                count += c;
                weight += w;
            }

            assert_eq!(node.count, count);
            assert!(
                (node.subtree_weight - weight).abs() < 1e-6 * weight.max(1.0),
                "subtree weight drifted: {} vs {}",
                node.subtree_weight,
                weight
            );
            (count, weight)
        }

        if let Some(root) = tree.root {
            let (count, _) = walk(tree, root, None);
            assert_eq!(count, tree.len());
        } else {
            assert_eq!(tree.len(), 0);
        }
    }

    fn depths(tree: &HostTree) -> (usize, usize) {
        fn walk(tree: &HostTree, idx: NodeIndex, depth: usize, min: &mut usize, max: &mut usize) {
            let node = tree.node(idx);
            if node.left.is_none() && node.right.is_none() {
                *min = (*min).min(depth);
                *max = (*max).max(depth);
                return
            }
            for child in [node.left, node.right].into_iter().flatten() {
                walk(tree, child, depth + 1, min, max);
            }
        }
        let (mut min, mut max) = (usize::MAX, 0);
        walk(tree, tree.root.unwrap(), 0, &mut min, &mut max);
        (min, max)
    }

    #[test]
    fn test_insert_remove_update() {
        let mut tree = HostTree::new();

        for i in 0..100 {
            tree.insert(&addr(i), (i + 1) as f64);
            check_invariants(&tree);
        }
        assert_eq!(tree.len(), 100);

        // Weight updates propagate.
        for i in 0..100 {
            tree.update_weight(&addr(i), (100 - i) as f64);
        }
        check_invariants(&tree);
        assert_eq!(tree.weight_of(&addr(0)), Some(100.0));

        // Remove every other host.
        for i in (0..100).step_by(2) {
            assert_eq!(tree.remove(&addr(i)), Some((100 - i) as f64));
            check_invariants(&tree);
        }
        assert_eq!(tree.len(), 50);
        assert!(!tree.contains(&addr(0)));
        assert!(tree.contains(&addr(1)));

        // Drain completely.
        for i in (1..100).step_by(2) {
            assert!(tree.remove(&addr(i)).is_some());
        }
        assert!(tree.is_empty());
        assert_eq!(tree.total_weight(), 0.0);
        assert!(tree.pick(&mut OsRng).is_err());
    }

    #[test]
    fn test_remove_missing() {
        let mut tree = HostTree::new();
        tree.insert(&addr(1), 5.0);
        assert_eq!(tree.remove(&addr(2)), None);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_balance() {
        let mut tree = HostTree::new();
        for i in 0..257 {
            tree.insert(&addr(i), 1.0);
        }
        let (min, max) = depths(&tree);
        assert!(max - min <= 1, "leaf depths {} and {} diverged", min, max);

        // Removals swap in a leaf from the removed node's own subtree,
        // which keeps depths close even after heavy churn.
        for i in 0..128 {
            tree.remove(&addr(i * 2));
        }
        check_invariants(&tree);
        let (min, max) = depths(&tree);
        assert!(max - min <= 2, "leaf depths {} and {} diverged", min, max);
    }

    #[test]
    fn test_pick_two_hosts() {
        let mut tree = HostTree::new();
        tree.insert(&addr(1), 1.0);
        tree.insert(&addr(2), 3.0);

        let picks = 100_000;
        let mut second = 0usize;
        for _ in 0..picks {
            if tree.pick(&mut OsRng).unwrap() == addr(2) {
                second += 1;
            }
        }

        // Expected share 0.75; 100k picks keep the sample within half
        // a percent except with negligible probability.
        let share = second as f64 / picks as f64;
        assert!((0.745..=0.755).contains(&share), "share was {}", share);
    }

    #[test]
    fn test_pick_distribution() {
        let mut tree = HostTree::new();
        let weights = [5.0, 1.0, 8.0, 2.0, 2.0, 6.0, 3.0, 1.0, 4.0, 8.0];
        let total: f64 = weights.iter().sum();
        for (i, w) in weights.iter().enumerate() {
            tree.insert(&addr(i), *w);
        }

        // N = 10 * |hosts| / min weight fraction
        let min_fraction = 1.0 / total;
        let picks = (10.0 * weights.len() as f64 / min_fraction) as usize;

        let mut observed = vec![0usize; weights.len()];
        for _ in 0..picks {
            let picked = tree.pick(&mut OsRng).unwrap();
            let i: usize = picked.host_str().unwrap()[4..5].parse().unwrap();
            observed[i] += 1;
        }

        let mut chi2 = 0.0;
        for (i, w) in weights.iter().enumerate() {
            let expected = picks as f64 * w / total;
            let diff = observed[i] as f64 - expected;
            chi2 += diff * diff / expected;
        }

        // 0.999 quantile of chi-square with 9 degrees of freedom
        assert!(chi2 < 27.88, "chi-square {} too large: {:?}", chi2, observed);
    }

    #[test]
    fn test_pick_respects_updates() {
        let mut tree = HostTree::new();
        tree.insert(&addr(1), 1.0);
        tree.insert(&addr(2), 1.0);
        tree.update_weight(&addr(1), 0.0);

        for _ in 0..100 {
            assert_eq!(tree.pick(&mut OsRng).unwrap(), addr(2));
        }
    }
}
