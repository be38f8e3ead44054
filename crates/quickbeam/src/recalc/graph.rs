//! Static dependency graph between named formulas

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

/// Edges "formula reads name", kept in definition order.
///
/// Only formulas have outgoing edges. Variables appear as targets.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    reads: IndexMap<Arc<str>, IndexSet<Arc<str>>>,
}

impl DependencyGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a formula and the names it reads.
    pub fn add(&mut self, formula: Arc<str>, reads: IndexSet<Arc<str>>) {
        self.reads.insert(formula, reads);
    }

    /// Forget a formula. Definition order of the others is kept.
    pub fn remove(&mut self, formula: &str) {
        self.reads.shift_remove(formula);
    }

    /// Whether `formula` is registered.
    pub fn contains(&self, formula: &str) -> bool {
        self.reads.contains_key(formula)
    }

    /// Names `formula` reads directly.
    pub fn reads(&self, formula: &str) -> Option<&IndexSet<Arc<str>>> {
        self.reads.get(formula)
    }

    /// Formulas that read `name` directly, in definition order.
    pub fn dependents(&self, name: &str) -> Vec<Arc<str>> {
        self.reads
            .iter()
            .filter(|(_, reads)| reads.contains(name))
            .map(|(formula, _)| formula.clone())
            .collect()
    }

    /// Path from `from` to `to` following read edges, both ends included.
    pub fn path(&self, from: &str, to: &str) -> Option<Vec<Arc<str>>> {
        let mut parent: HashMap<Arc<str>, Arc<str>> = HashMap::new();
        let mut seen: HashSet<Arc<str>> = HashSet::new();
        let mut queue = VecDeque::new();
        let start: Arc<str> = Arc::from(from);
        seen.insert(start.clone());
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            if &*current == to {
                let mut path = vec![current.clone()];
                let mut at = current;
                while let Some(prev) = parent.get(&at) {
                    path.push(prev.clone());
                    at = prev.clone();
                }
                path.reverse();
                return Some(path);
            }
            for next in self.reads.get(&current).into_iter().flatten() {
                if seen.insert(next.clone()) {
                    parent.insert(next.clone(), current.clone());
                    queue.push_back(next.clone());
                }
            }
        }
        None
    }

    /// Cycle that adding `formula` with `reads` would close, if any.
    pub fn cycle_through(&self, formula: &str, reads: &IndexSet<Arc<str>>) -> Option<Vec<String>> {
        reads.iter().find_map(|read| {
            let tail = if &**read == formula {
                Some(vec![read.clone()])
            } else {
                self.path(read, formula)
            }?;
            let mut cycle = vec![formula.to_string()];
            cycle.extend(tail.iter().map(|n| n.to_string()));
            Some(cycle)
        })
    }

    /// Formulas to recompute after `changed`, in evaluation order.
    ///
    /// Every formula that transitively reads a changed name appears once,
    /// after all affected formulas it reads. Among formulas that are ready
    /// at the same time the one defined first goes first. Changed names
    /// themselves are not included.
    pub fn affected<'a>(&self, changed: impl IntoIterator<Item = &'a str>) -> Vec<Arc<str>> {
        let mut affected: IndexSet<usize> = IndexSet::new();
        let mut frontier: VecDeque<Arc<str>> = changed.into_iter().map(Arc::from).collect();
        while let Some(name) = frontier.pop_front() {
            for (i, (formula, reads)) in self.reads.iter().enumerate() {
                if reads.contains(&name) && affected.insert(i) {
                    frontier.push_back(formula.clone());
                }
            }
        }

        // Kahn's algorithm restricted to the affected set
        let mut pending: HashMap<usize, usize> = HashMap::new();
        for &i in &affected {
            let reads = &self.reads[i];
            let inside = reads
                .iter()
                .filter(|r| {
                    self.reads
                        .get_index_of(&**r)
                        .is_some_and(|j| affected.contains(&j))
                })
                .count();
            pending.insert(i, inside);
        }
        let mut ready: BTreeSet<usize> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(i, _)| *i)
            .collect();

        let mut order = Vec::with_capacity(affected.len());
        while let Some(i) = ready.pop_first() {
            let Some((name, _)) = self.reads.get_index(i) else {
                continue;
            };
            let name = name.clone();
            for &j in &affected {
                if self.reads[j].contains(&name) {
                    if let Some(n) = pending.get_mut(&j) {
                        *n -= 1;
                        if *n == 0 {
                            ready.insert(j);
                        }
                    }
                }
            }
            order.push(name);
        }
        order
    }
}
