//! Task dependency graph
//!
//! Dependency edges are stage-local: a task may only depend on sibling tasks
//! of the same stage, referenced by name.

use keel_core::domain::task::Task;
use keel_core::dto::pipeline::TaskCreate;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate task name '{0}'")]
    DuplicateTask(String),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("circular dependency detected between tasks: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Anything that can be placed in the graph
pub trait Node {
    fn name(&self) -> &str;
    fn depends_on(&self) -> &[String];
}

impl Node for Task {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
}

impl Node for TaskCreate {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
}

/// Directed acyclic graph over node indices
#[derive(Debug)]
pub struct DependencyGraph {
    len: usize,
    /// dependency -> dependents
    dependents: HashMap<usize, Vec<usize>>,
    /// dependent -> dependencies
    dependencies: HashMap<usize, Vec<usize>>,
}

impl DependencyGraph {
    /// Builds the graph of `nodes`, rejecting duplicates, dangling references
    /// and cycles
    pub fn build<T: Node>(nodes: &[T]) -> Result<Self, GraphError> {
        let mut indices: HashMap<&str, usize> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if indices.insert(node.name(), i).is_some() {
                return Err(GraphError::DuplicateTask(node.name().to_string()));
            }
        }

        let mut graph = Self {
            len: nodes.len(),
            dependents: HashMap::new(),
            dependencies: HashMap::new(),
        };

        for (i, node) in nodes.iter().enumerate() {
            for dependency in node.depends_on() {
                let &from = indices.get(dependency.as_str()).ok_or_else(|| {
                    GraphError::UnknownDependency {
                        task: node.name().to_string(),
                        dependency: dependency.clone(),
                    }
                })?;
                graph.add_dependency(from, i);
            }
        }

        if let Err(remaining) = graph.topological_sort() {
            let names = remaining
                .into_iter()
                .map(|i| nodes[i].name().to_string())
                .collect();
            return Err(GraphError::Cycle(names));
        }

        Ok(graph)
    }

    fn add_dependency(&mut self, from: usize, to: usize) {
        self.dependents.entry(from).or_default().push(to);
        self.dependencies.entry(to).or_default().push(from);
    }

    /// Topological order using Kahn's algorithm.
    ///
    /// On a cycle, returns the nodes that could not be ordered.
    pub fn topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degree: Vec<usize> = (0..self.len)
            .map(|i| self.dependencies(i).len())
            .collect();

        let mut queue: VecDeque<usize> = (0..self.len).filter(|&i| in_degree[i] == 0).collect();
        let mut result = Vec::with_capacity(self.len);

        while let Some(node) = queue.pop_front() {
            result.push(node);

            for &dependent in self.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if result.len() != self.len {
            let remaining = (0..self.len).filter(|&i| in_degree[i] > 0).collect();
            return Err(remaining);
        }

        Ok(result)
    }

    /// Direct dependencies of a node
    pub fn dependencies(&self, node: usize) -> &[usize] {
        self.dependencies.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct dependents of a node
    pub fn dependents(&self, node: usize) -> &[usize] {
        self.dependents.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct N(&'static str, Vec<String>);

    impl Node for N {
        fn name(&self) -> &str {
            self.0
        }

        fn depends_on(&self) -> &[String] {
            &self.1
        }
    }

    fn n(name: &'static str, deps: &[&str]) -> N {
        N(name, deps.iter().map(|d| d.to_string()).collect())
    }

    #[test]
    fn test_simple_dependency() {
        let graph = DependencyGraph::build(&[n("c", &["b"]), n("a", &[]), n("b", &["a"])]).unwrap();

        let sorted = graph.topological_sort().unwrap();
        assert_eq!(sorted, vec![1, 2, 0]);
        assert_eq!(graph.dependencies(0), &[2]);
        assert_eq!(graph.dependents(1), &[2]);
    }

    #[test]
    fn test_parallel_dependencies() {
        let graph = DependencyGraph::build(&[
            n("a", &[]),
            n("b", &[]),
            n("c", &["a", "b"]),
            n("d", &["c"]),
        ])
        .unwrap();

        let sorted = graph.topological_sort().unwrap();
        assert_eq!(&sorted[..2], &[0, 1]);
        assert_eq!(graph.dependencies(2), &[0, 1]);
    }

    #[test]
    fn test_circular_dependency() {
        let err = DependencyGraph::build(&[
            n("a", &["c"]),
            n("b", &["a"]),
            n("c", &["b"]),
            n("d", &[]),
        ])
        .unwrap_err();

        assert_eq!(
            err,
            GraphError::Cycle(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn test_self_dependency() {
        let err = DependencyGraph::build(&[n("a", &["a"])]).unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));
    }

    #[test]
    fn test_unknown_dependency() {
        let err = DependencyGraph::build(&[n("a", &["missing"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownDependency {
                task: "a".to_string(),
                dependency: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_task() {
        let err = DependencyGraph::build(&[n("a", &[]), n("a", &[])]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateTask("a".to_string()));
    }
}
