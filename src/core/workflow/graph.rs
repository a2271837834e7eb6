//! Dependency graph analysis shared by registration, start-up checks and the
//! scheduler.

use crate::core::error::EngineError;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use std::collections::{HashMap, HashSet, VecDeque};

/// Directed graph with an edge from each dependency to its dependent.
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
    unknown: Vec<(String, String)>,
}

impl DependencyGraph {
    /// Build from `(task name, dependency names)` pairs in definition order.
    pub fn build<'a, I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let tasks: Vec<(&str, &[String])> = tasks.into_iter().collect();
        let mut graph = DiGraph::<String, ()>::new();
        let mut nodes = HashMap::new();
        for (name, _) in &tasks {
            if !nodes.contains_key(*name) {
                let idx = graph.add_node((*name).to_string());
                nodes.insert((*name).to_string(), idx);
            }
        }

        let mut unknown = Vec::new();
        for (name, dependencies) in &tasks {
            let to = nodes[*name];
            for dependency in dependencies.iter() {
                match nodes.get(dependency) {
                    Some(&from) => {
                        graph.update_edge(from, to, ());
                    }
                    None => unknown.push((name.to_string(), dependency.clone())),
                }
            }
        }

        Self {
            graph,
            nodes,
            unknown,
        }
    }

    /// `(task, dependency)` pairs naming tasks that do not exist.
    pub fn unknown_dependencies(&self) -> &[(String, String)] {
        &self.unknown
    }

    /// Every cycle as a closed path, e.g. `[a, b, a]`.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        for component in tarjan_scc(&self.graph) {
            let is_cycle = if component.len() > 1 {
                true
            } else {
                let idx = component[0];
                self.graph.find_edge(idx, idx).is_some()
            };
            if !is_cycle {
                continue;
            }
            let members: HashSet<NodeIndex> = component.iter().copied().collect();
            let start = component.iter().copied().min().unwrap_or(component[0]);
            cycles.push(self.closed_path(start, &members));
        }
        cycles.sort();
        cycles
    }

    /// Shortest path from `start` back to itself inside one strongly connected component.
    fn closed_path(&self, start: NodeIndex, members: &HashSet<NodeIndex>) -> Vec<String> {
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut seen = HashSet::from([start]);
        let mut last = start;

        'search: while let Some(current) = queue.pop_front() {
            for next in self.graph.neighbors(current) {
                if next == start {
                    last = current;
                    break 'search;
                }
                if members.contains(&next) && seen.insert(next) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }

        let mut path = vec![last];
        let mut cursor = last;
        while let Some(&prev) = parent.get(&cursor) {
            path.push(prev);
            cursor = prev;
        }
        path.reverse();
        path.push(start);
        path.into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    /// First structural error: unknown dependency names, then cycles.
    pub fn check(&self) -> Result<(), EngineError> {
        if let Some((task, dependency)) = self.unknown.first() {
            return Err(EngineError::InvalidDependency {
                task: task.clone(),
                dependency: dependency.clone(),
            });
        }
        if let Some(cycle) = self.cycles().into_iter().next() {
            return Err(EngineError::CircularDependency { tasks: cycle });
        }
        Ok(())
    }

    /// Transitive dependencies of `name`, excluding the task itself.
    pub fn ancestors(&self, name: &str) -> HashSet<String> {
        let mut out = HashSet::new();
        let Some(&start) = self.nodes.get(name) else {
            return out;
        };
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        while let Some(idx) = dfs.next(reversed) {
            if idx != start {
                out.insert(self.graph[idx].clone());
            }
        }
        out
    }
}
