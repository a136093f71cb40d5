//! ## availsim-engine::graph
//! **Immutable producer topology**
//!
//! Producers live in an arena and are addressed by index everywhere inside
//! the engine. Ids are only used at the edges: building, subscribing and
//! reporting.

use std::collections::{HashMap, VecDeque};

use availsim_core::events::ProducerId;

use crate::error::BuildError;

#[derive(Debug)]
pub(crate) struct Graph {
    ids: Vec<ProducerId>,
    index: HashMap<ProducerId, usize>,
    /// Per node, dependency indices in the order they were added.
    dependencies: Vec<Vec<usize>>,
    /// Per node, `(dependent, position of this node in the dependent's list)`.
    dependents: Vec<Vec<(usize, usize)>>,
    /// Topological order, dependencies first.
    order: Vec<usize>,
}

impl Graph {
    /// Validates acyclicity and freezes the topology.
    pub(crate) fn new(
        ids: Vec<ProducerId>,
        dependencies: Vec<Vec<usize>>,
    ) -> Result<Self, BuildError> {
        let n = ids.len();
        let mut dependents = vec![Vec::new(); n];
        for (node, deps) in dependencies.iter().enumerate() {
            for (position, &dep) in deps.iter().enumerate() {
                dependents[dep].push((node, position));
            }
        }

        let order = topological_order(&dependencies, &dependents)
            .map_err(|stuck| BuildError::Cycle(find_cycle(&ids, &dependencies, &stuck)))?;

        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        Ok(Self {
            ids,
            index,
            dependencies,
            dependents,
            order,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn id(&self, node: usize) -> &ProducerId {
        &self.ids[node]
    }

    pub(crate) fn lookup(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn dependencies(&self, node: usize) -> &[usize] {
        &self.dependencies[node]
    }

    pub(crate) fn dependents(&self, node: usize) -> &[(usize, usize)] {
        &self.dependents[node]
    }

    pub(crate) fn order(&self) -> &[usize] {
        &self.order
    }
}

/// Kahn's algorithm. On failure returns the nodes left with unresolved
/// dependencies, all of which sit on or behind a cycle.
fn topological_order(
    dependencies: &[Vec<usize>],
    dependents: &[Vec<(usize, usize)>],
) -> Result<Vec<usize>, Vec<bool>> {
    let n = dependencies.len();
    let mut remaining: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut queue: VecDeque<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &(dependent, _) in &dependents[node] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err(remaining.iter().map(|&r| r > 0).collect())
    }
}

/// Walks unresolved dependencies from the first stuck node until a node
/// repeats, and returns that loop closed on itself.
fn find_cycle(ids: &[ProducerId], dependencies: &[Vec<usize>], stuck: &[bool]) -> Vec<ProducerId> {
    let Some(start) = stuck.iter().position(|&s| s) else {
        return Vec::new();
    };
    let mut seen_at = vec![None; ids.len()];
    let mut path: Vec<usize> = Vec::new();
    let mut node = start;
    loop {
        if let Some(at) = seen_at[node] {
            let mut cycle: Vec<ProducerId> = path[at..].iter().map(|&i| ids[i].clone()).collect();
            cycle.push(ids[node].clone());
            return cycle;
        }
        seen_at[node] = Some(path.len());
        path.push(node);
        match dependencies[node].iter().find(|&&dep| stuck[dep]) {
            Some(&next) => node = next,
            None => return path.iter().map(|&i| ids[i].clone()).collect(),
        }
    }
}
