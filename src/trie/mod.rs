//! # trie
//!
//! A 4-ary prefix tree over nucleotide sequences supporting edit-distance search.
//!
//! Nodes live in an arena and refer to their children by `u32` index, so cloning
//! a trie is a plain vector copy and inserting into a clone never disturbs the
//! original. Index `0` is the root, which is never anybody's child, so `0` doubles
//! as the "no child" marker.
//!
//! Searches compute the Levenshtein DP one row per trie level: the row of a node
//! is derived from its parent's row, and a subtree is skipped as soon as the
//! smallest entry of its row exceeds the distance bound. Every search takes a
//! [`SearchCtx`] whose deadline is consulted every [`CHECK_TIME_COUNT`] cells;
//! once it expires the search unwinds and reports no match.

mod deadline;

use std::collections::HashMap;

pub use deadline::{SearchCtx, CHECK_TIME_COUNT};

use crate::error::TableError;
use crate::oligo::{Nt, ShortOligo};

const NONE: u32 = 0;

#[derive(Debug, Clone, Default)]
struct Node {
    children: [u32; 4],
    /// Longest path below this node
    depth: u32,
    /// Value of a sequence ending here
    terminal: Option<u32>,
    /// Value of a first-level word whose leaf was joined to a second level by [`Trie::concat`]
    junction: Option<u32>,
}

/// A sequence found by a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// The stored sequence (the whole path for concatenated tries)
    pub seq: Vec<Nt>,
    /// Values along the path: one per joined word, the final word last
    pub values: Vec<u32>,
    /// Edit distance to the query
    pub dist: usize,
}
impl Match {
    /// Value of the final word on the path
    #[must_use]
    pub fn value(&self) -> u32 {
        self.values.last().copied().unwrap_or_default()
    }
}

/// Arena-backed prefix tree
#[derive(Debug, Clone)]
pub struct Trie {
    nodes: Vec<Node>,
    size: usize,
    read_only: bool,
}
impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}
impl Trie {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            size: 0,
            read_only: false,
        }
    }

    /// Number of stored sequences (for concatenated tries: number of first-level words)
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Longest stored sequence
    #[must_use]
    pub fn depth(&self) -> usize {
        self.nodes[0].depth as usize
    }

    /// Inserts a sequence with an associated value
    ///
    /// Inserting a sequence that is already present keeps the first value.
    /// Fails only on a read-only trie produced by [`Trie::concat`].
    pub fn add(&mut self, seq: &[Nt], value: u32) -> Result<(), TableError> {
        if self.read_only {
            return Err(TableError::ReadOnlyTrie);
        }
        let mut cur = 0usize;
        for (i, &nt) in seq.iter().enumerate() {
            let remaining = (seq.len() - i) as u32;
            self.nodes[cur].depth = self.nodes[cur].depth.max(remaining);
            let next = self.nodes[cur].children[nt as usize];
            cur = if next == NONE {
                self.nodes.push(Node::default());
                let idx = (self.nodes.len() - 1) as u32;
                self.nodes[cur].children[nt as usize] = idx;
                idx as usize
            } else {
                next as usize
            };
        }
        if self.nodes[cur].terminal.is_none() {
            self.nodes[cur].terminal = Some(value);
            self.size += 1;
        }
        Ok(())
    }

    /// Exact lookup
    #[must_use]
    pub fn get(&self, seq: &[Nt]) -> Option<u32> {
        let mut cur = 0usize;
        for &nt in seq {
            let next = self.nodes[cur].children[nt as usize];
            if next == NONE {
                return None;
            }
            cur = next as usize;
        }
        self.nodes[cur].terminal
    }

    /// All stored sequences within `maxdist` edits of `seq`
    ///
    /// Returns an empty list if the deadline elapses; check [`SearchCtx::is_dead`].
    pub fn search_all(&self, seq: &[Nt], maxdist: usize, ctx: &mut SearchCtx) -> Vec<Match> {
        let mut search = Search::new(self, seq, maxdist, Mode::All);
        search.run(ctx);
        if ctx.is_dead() {
            return Vec::new();
        }
        search.found
    }

    /// The stored sequence closest to `seq`
    pub fn search_min(&self, seq: &[Nt], ctx: &mut SearchCtx) -> Option<Match> {
        let bound = seq.len().max(self.depth());
        let mut search = Search::new(self, seq, bound, Mode::Min);
        search.run(ctx);
        if ctx.is_dead() {
            return None;
        }
        search.found.pop()
    }

    /// Whether every stored sequence is at least `d` edits away from `seq`
    ///
    /// Stops at the first sequence closer than `d`. An expired deadline counts
    /// as "not proven", i.e. `false`.
    pub fn search_at_least(&self, seq: &[Nt], d: usize, ctx: &mut SearchCtx) -> bool {
        if d == 0 {
            return true;
        }
        let mut search = Search::new(self, seq, d - 1, Mode::Any);
        search.run(ctx);
        !ctx.is_dead() && search.found.is_empty()
    }

    /// Joins word tries into a two-level read-only DAG
    ///
    /// `self` is a trie of words that follow `prefix`. For every stored word `w`
    /// the leaf is given the children of `tries[t]`, where `t` is the packed value
    /// of the last `prefix_len` nucleotides of `prefix ‖ w`. Each second-level trie
    /// is copied once and shared by all leaves that select it.
    pub fn concat(&self, prefix_len: usize, prefix: &[Nt], tries: &[Trie]) -> Result<Trie, TableError> {
        let mut out = Trie {
            nodes: vec![Node::default()],
            size: self.size,
            read_only: true,
        };

        // copy the first level, remembering which copies were leaves
        let mut remap = vec![NONE; self.nodes.len()];
        remap[0] = 0;
        let mut leaves = Vec::new();
        let mut stack = vec![(0usize, prefix.to_vec())];
        while let Some((src, path)) = stack.pop() {
            let dst = remap[src] as usize;
            out.nodes[dst].terminal = None;
            if let Some(value) = self.nodes[src].terminal {
                out.nodes[dst].junction = Some(value);
                leaves.push((dst, path.clone()));
            }
            for (c, &child) in self.nodes[src].children.iter().enumerate() {
                if child == NONE {
                    continue;
                }
                out.nodes.push(Node::default());
                let idx = (out.nodes.len() - 1) as u32;
                remap[child as usize] = idx;
                out.nodes[dst].children[c] = idx;
                let mut child_path = path.clone();
                child_path.push(Nt::ALL[c]);
                stack.push((child as usize, child_path));
            }
        }

        // attach second-level copies
        let mut copies: HashMap<usize, u32> = HashMap::new();
        for (leaf, path) in leaves {
            let tail_start = path.len().saturating_sub(prefix_len);
            let key = ShortOligo::from_nts(&path[tail_start..])
                .map_err(|_| TableError::NoTable(format!("{path:?}")))?
                .value() as usize;
            let source = tries
                .get(key)
                .ok_or_else(|| TableError::NoTable(format!("{key}")))?;
            let root = match copies.get(&key) {
                Some(&root) => root,
                None => {
                    let root = out.graft(source);
                    copies.insert(key, root);
                    root
                }
            };
            out.nodes[leaf].children = out.nodes[root as usize].children;
        }
        out.recompute_depth(0, &mut vec![None; out.nodes.len()]);
        Ok(out)
    }

    /// Appends a copy of `other`'s nodes, returning the index of the copied root
    fn graft(&mut self, other: &Trie) -> u32 {
        let offset = self.nodes.len() as u32;
        for node in &other.nodes {
            let mut node = node.clone();
            for child in &mut node.children {
                if *child != NONE {
                    *child += offset;
                }
            }
            self.nodes.push(node);
        }
        offset
    }

    fn recompute_depth(&mut self, idx: usize, memo: &mut Vec<Option<u32>>) -> u32 {
        if memo.len() < self.nodes.len() {
            memo.resize(self.nodes.len(), None);
        }
        if let Some(depth) = memo[idx] {
            return depth;
        }
        let children = self.nodes[idx].children;
        let mut depth = 0;
        for child in children {
            if child != NONE {
                depth = depth.max(1 + self.recompute_depth(child as usize, memo));
            }
        }
        self.nodes[idx].depth = depth;
        memo[idx] = Some(depth);
        depth
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    All,
    Min,
    Any,
}

/// State of one recursive search
struct Search<'a> {
    trie: &'a Trie,
    query: &'a [Nt],
    maxdist: usize,
    mode: Mode,
    rows: Vec<Vec<usize>>,
    path: Vec<Nt>,
    values: Vec<u32>,
    found: Vec<Match>,
    done: bool,
}
impl<'a> Search<'a> {
    fn new(trie: &'a Trie, query: &'a [Nt], maxdist: usize, mode: Mode) -> Self {
        let first: Vec<usize> = (0..=query.len()).collect();
        Self {
            trie,
            query,
            maxdist,
            mode,
            rows: vec![first],
            path: Vec::new(),
            values: Vec::new(),
            found: Vec::new(),
            done: false,
        }
    }

    fn run(&mut self, ctx: &mut SearchCtx) {
        self.visit(0, 0, ctx);
    }

    fn visit(&mut self, node: usize, level: usize, ctx: &mut SearchCtx) {
        let n = self.query.len();
        let depth = self.trie.nodes[node].depth as usize;
        if level + depth + self.maxdist < n {
            // even the deepest leaf below is too short
            return;
        }
        if let Some(value) = self.trie.nodes[node].junction {
            self.values.push(value);
        }
        if let Some(value) = self.trie.nodes[node].terminal {
            let dist = self.rows[level][n];
            if dist <= self.maxdist {
                let mut values = self.values.clone();
                values.push(value);
                let m = Match {
                    seq: self.path.clone(),
                    values,
                    dist,
                };
                match self.mode {
                    Mode::All => self.found.push(m),
                    Mode::Any => {
                        self.found.push(m);
                        self.done = true;
                    }
                    Mode::Min => {
                        // later matches only get here if strictly closer
                        self.maxdist = dist.saturating_sub(1);
                        self.found.push(m);
                        if dist == 0 {
                            self.done = true;
                        }
                    }
                }
            }
        }

        let children = self.trie.nodes[node].children;
        for (c, &child) in children.iter().enumerate() {
            if self.done || child == NONE {
                continue;
            }
            if self.rows.len() <= level + 1 {
                self.rows.push(vec![0; n + 1]);
            }
            let nt = Nt::ALL[c];
            let (head, tail) = self.rows.split_at_mut(level + 1);
            let prev = &head[level];
            let cur = &mut tail[0];
            cur[0] = prev[0] + 1;
            let mut rowmin = cur[0];
            for j in 1..=n {
                let sub = prev[j - 1] + usize::from(self.query[j - 1] != nt);
                cur[j] = sub.min(prev[j] + 1).min(cur[j - 1] + 1);
                rowmin = rowmin.min(cur[j]);
            }
            if !ctx.tick((n + 1) as u64) {
                self.done = true;
                break;
            }
            if rowmin > self.maxdist {
                continue;
            }
            self.path.push(nt);
            self.visit(child as usize, level + 1, ctx);
            self.path.pop();
        }

        if self.trie.nodes[node].junction.is_some() {
            self.values.pop();
        }
    }
}
