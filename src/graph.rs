//! Directed graph over policy types with path search.
//!
//! Both the information flow and the domain transition analyses build a
//! [`TypeGraph`]: nodes are [`TypeId`]s, each ordered pair of nodes has at
//! most one edge, and the edge carries analysis-specific data. Adjacency is
//! kept in ordered maps so traversal order, and therefore result order, is
//! stable across runs.
//!
//! # Algorithms
//!
//! - [`TypeGraph::shortest_path`]: BFS, one path with the fewest edges.
//! - [`TypeGraph::all_shortest_paths`]: BFS predecessor lists, then a lazy
//!   backtracking walk from the target.
//! - [`TypeGraph::all_simple_paths`]: lazy iterative DFS with an edge-count
//!   cutoff; no node repeats within a path.
//!
//! All path iterators yield nothing when either endpoint is missing or
//! when source and target are the same node.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use fixedbitset::FixedBitSet;
use rustc_hash::FxHashMap;

use crate::policy::TypeId;

/// Directed graph keyed by type with edge payload `E`.
#[derive(Debug, Clone)]
pub struct TypeGraph<E> {
    /// node -> successor -> edge
    succ: BTreeMap<TypeId, BTreeMap<TypeId, E>>,
    /// node -> predecessors
    pred: BTreeMap<TypeId, BTreeSet<TypeId>>,
}

impl<E> Default for TypeGraph<E> {
    fn default() -> Self {
        Self {
            succ: BTreeMap::new(),
            pred: BTreeMap::new(),
        }
    }
}

impl<E> TypeGraph<E> {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Structure
    // =========================================================================

    pub fn add_node(&mut self, node: TypeId) {
        self.succ.entry(node).or_default();
        self.pred.entry(node).or_default();
    }

    pub fn contains_node(&self, node: TypeId) -> bool {
        self.succ.contains_key(&node)
    }

    pub fn node_count(&self) -> usize {
        self.succ.len()
    }

    pub fn edge_count(&self) -> usize {
        self.succ.values().map(BTreeMap::len).sum()
    }

    pub fn nodes(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.succ.keys().copied()
    }

    pub fn edge(&self, source: TypeId, target: TypeId) -> Option<&E> {
        self.succ.get(&source)?.get(&target)
    }

    pub fn edge_mut(&mut self, source: TypeId, target: TypeId) -> Option<&mut E> {
        self.succ.get_mut(&source)?.get_mut(&target)
    }

    /// Existing edge, or a new default edge (adding both nodes).
    pub fn edge_or_default(&mut self, source: TypeId, target: TypeId) -> &mut E
    where
        E: Default,
    {
        self.add_node(target);
        self.pred.entry(target).or_default().insert(source);
        self.succ
            .entry(source)
            .or_default()
            .entry(target)
            .or_default()
    }

    pub fn insert_edge(&mut self, source: TypeId, target: TypeId, data: E) {
        self.add_node(source);
        self.add_node(target);
        self.pred.entry(target).or_default().insert(source);
        self.succ.entry(source).or_default().insert(target, data);
    }

    pub fn remove_edge(&mut self, source: TypeId, target: TypeId) -> Option<E> {
        let removed = self.succ.get_mut(&source)?.remove(&target);
        if removed.is_some() {
            if let Some(preds) = self.pred.get_mut(&target) {
                preds.remove(&source);
            }
        }
        removed
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, node: TypeId) {
        if let Some(targets) = self.succ.remove(&node) {
            for target in targets.keys() {
                if let Some(preds) = self.pred.get_mut(target) {
                    preds.remove(&node);
                }
            }
        }
        if let Some(sources) = self.pred.remove(&node) {
            for source in sources {
                if let Some(targets) = self.succ.get_mut(&source) {
                    targets.remove(&node);
                }
            }
        }
    }

    /// Keep only the edges for which `keep` returns true. Nodes stay.
    pub fn retain_edges(&mut self, mut keep: impl FnMut(TypeId, TypeId, &mut E) -> bool) {
        let mut dropped = Vec::new();
        for (source, targets) in self.succ.iter_mut() {
            targets.retain(|target, data| {
                let kept = keep(*source, *target, data);
                if !kept {
                    dropped.push((*source, *target));
                }
                kept
            });
        }
        for (source, target) in dropped {
            if let Some(preds) = self.pred.get_mut(&target) {
                preds.remove(&source);
            }
        }
    }

    pub fn successors(&self, node: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.succ
            .get(&node)
            .into_iter()
            .flat_map(|targets| targets.keys().copied())
    }

    pub fn predecessors(&self, node: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.pred
            .get(&node)
            .into_iter()
            .flat_map(|sources| sources.iter().copied())
    }

    /// Outgoing edges of a node.
    pub fn out_edges(&self, node: TypeId) -> impl Iterator<Item = (TypeId, &E)> + '_ {
        self.succ
            .get(&node)
            .into_iter()
            .flat_map(|targets| targets.iter().map(|(t, e)| (*t, e)))
    }

    /// Incoming edges of a node, as (source, edge).
    pub fn in_edges(&self, node: TypeId) -> impl Iterator<Item = (TypeId, &E)> + '_ {
        self.predecessors(node)
            .filter_map(move |source| self.edge(source, node).map(|e| (source, e)))
    }

    /// Every edge as (source, target, edge).
    pub fn edges(&self) -> impl Iterator<Item = (TypeId, TypeId, &E)> + '_ {
        self.succ
            .iter()
            .flat_map(|(s, targets)| targets.iter().map(move |(t, e)| (*s, *t, e)))
    }

    /// Copy with every edge reversed.
    pub fn reversed(&self) -> Self
    where
        E: Clone,
    {
        let mut graph = Self::new();
        for node in self.nodes() {
            graph.add_node(node);
        }
        for (source, target, data) in self.edges() {
            graph.insert_edge(target, source, data.clone());
        }
        graph
    }

    fn bitset(&self) -> FixedBitSet {
        let size = self.succ.keys().next_back().map_or(0, |n| n.index() + 1);
        FixedBitSet::with_capacity(size)
    }

    // =========================================================================
    // Path search
    // =========================================================================

    /// One path with the fewest edges, as a node list.
    pub fn shortest_path(&self, source: TypeId, target: TypeId) -> Option<Vec<TypeId>> {
        if source == target || !self.contains_node(source) || !self.contains_node(target) {
            return None;
        }

        let mut visited = self.bitset();
        let mut parent: FxHashMap<TypeId, TypeId> = FxHashMap::default();
        let mut queue = VecDeque::new();
        visited.insert(source.index());
        queue.push_back(source);

        while let Some(node) = queue.pop_front() {
            for next in self.successors(node) {
                if visited.contains(next.index()) {
                    continue;
                }
                visited.insert(next.index());
                parent.insert(next, node);
                if next == target {
                    let mut path = vec![target];
                    let mut cur = target;
                    while let Some(&p) = parent.get(&cur) {
                        path.push(p);
                        cur = p;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    /// Every path with the fewest edges.
    pub fn all_shortest_paths(&self, source: TypeId, target: TypeId) -> AllShortestPaths {
        if source == target || !self.contains_node(source) || !self.contains_node(target) {
            return AllShortestPaths::empty();
        }

        // BFS recording every predecessor on a shortest path
        let mut dist: FxHashMap<TypeId, usize> = FxHashMap::default();
        let mut preds: FxHashMap<TypeId, Vec<TypeId>> = FxHashMap::default();
        let mut level = vec![source];
        dist.insert(source, 0);
        let mut depth = 0;

        while !level.is_empty() && !dist.contains_key(&target) {
            depth += 1;
            let mut next_level = Vec::new();
            for node in level {
                for next in self.successors(node) {
                    match dist.get(&next) {
                        None => {
                            dist.insert(next, depth);
                            preds.insert(next, vec![node]);
                            next_level.push(next);
                        }
                        Some(&d) if d == depth => {
                            preds.entry(next).or_default().push(node);
                        }
                        Some(_) => {}
                    }
                }
            }
            level = next_level;
        }

        if !dist.contains_key(&target) {
            return AllShortestPaths::empty();
        }

        AllShortestPaths {
            source,
            preds,
            stack: vec![(target, 0)],
        }
    }

    /// Every simple path of at most `cutoff` edges.
    pub fn all_simple_paths(&self, source: TypeId, target: TypeId, cutoff: usize) -> AllSimplePaths<'_, E> {
        let valid = cutoff > 0
            && source != target
            && self.contains_node(source)
            && self.contains_node(target);

        let mut on_path = self.bitset();
        let (visited, stack) = if valid {
            on_path.insert(source.index());
            (vec![source], vec![self.successors(source).collect::<Vec<_>>().into_iter()])
        } else {
            (Vec::new(), Vec::new())
        };

        AllSimplePaths {
            graph: self,
            target,
            cutoff,
            visited,
            on_path,
            stack,
        }
    }
}

/// Lazy iterator over all shortest paths; see [`TypeGraph::all_shortest_paths`].
#[derive(Debug)]
pub struct AllShortestPaths {
    source: TypeId,
    preds: FxHashMap<TypeId, Vec<TypeId>>,
    /// (node, index of the next predecessor to try), target at the bottom
    stack: Vec<(TypeId, usize)>,
}

impl AllShortestPaths {
    fn empty() -> Self {
        Self {
            source: TypeId::from_index(0),
            preds: FxHashMap::default(),
            stack: Vec::new(),
        }
    }
}

impl Iterator for AllShortestPaths {
    type Item = Vec<TypeId>;

    fn next(&mut self) -> Option<Vec<TypeId>> {
        while let Some(&(node, index)) = self.stack.last() {
            if node == self.source {
                let path: Vec<TypeId> = self.stack.iter().rev().map(|(n, _)| *n).collect();
                self.backtrack();
                return Some(path);
            }

            match self.preds.get(&node).and_then(|p| p.get(index)) {
                Some(&pred) => self.stack.push((pred, 0)),
                None => self.backtrack(),
            }
        }
        None
    }
}

impl AllShortestPaths {
    /// Pop the top and advance its parent to the next predecessor.
    fn backtrack(&mut self) {
        self.stack.pop();
        if let Some(top) = self.stack.last_mut() {
            top.1 += 1;
        }
    }
}

/// Lazy iterator over simple paths; see [`TypeGraph::all_simple_paths`].
pub struct AllSimplePaths<'g, E> {
    graph: &'g TypeGraph<E>,
    target: TypeId,
    cutoff: usize,
    visited: Vec<TypeId>,
    on_path: FixedBitSet,
    stack: Vec<std::vec::IntoIter<TypeId>>,
}

impl<E> AllSimplePaths<'_, E> {
    fn pop(&mut self) {
        self.stack.pop();
        if let Some(node) = self.visited.pop() {
            self.on_path.set(node.index(), false);
        }
    }
}

impl<E> Iterator for AllSimplePaths<'_, E> {
    type Item = Vec<TypeId>;

    fn next(&mut self) -> Option<Vec<TypeId>> {
        loop {
            let children = self.stack.last_mut()?;

            let Some(child) = children.next() else {
                self.pop();
                continue;
            };

            if self.visited.len() < self.cutoff {
                if child == self.target {
                    let mut path = self.visited.clone();
                    path.push(child);
                    return Some(path);
                }
                if !self.on_path.contains(child.index()) {
                    self.visited.push(child);
                    self.on_path.insert(child.index());
                    self.stack
                        .push(self.graph.successors(child).collect::<Vec<_>>().into_iter());
                }
            } else {
                // at the cutoff only a direct edge to the target can complete a path
                let found = child == self.target || children.any(|c| c == self.target);
                let path = found.then(|| {
                    let mut path = self.visited.clone();
                    path.push(self.target);
                    path
                });
                self.pop();
                if path.is_some() {
                    return path;
                }
            }
        }
    }
}
