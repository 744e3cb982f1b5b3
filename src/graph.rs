use crate::error::{DagError, Result};
use crate::model::{MacrotaskContext, Monotask, MonotaskId};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Fully wired monotask graph for one macrotask attempt.
///
/// Dependency and dependent links are adjacency sets keyed by monotask id;
/// the monotasks themselves stay behind `Arc` and never point at each other,
/// so the bidirectional graph carries no ownership cycles.
pub struct MonotaskGraph {
    pub(crate) context: Arc<MacrotaskContext>,
    pub(crate) monotasks: Vec<Arc<dyn Monotask>>,
    pub(crate) dependencies: HashMap<MonotaskId, HashSet<MonotaskId>>,
    pub(crate) dependents: HashMap<MonotaskId, HashSet<MonotaskId>>,
}

impl std::fmt::Debug for MonotaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonotaskGraph")
            .field("context", &self.context)
            .field(
                "monotasks",
                &self.monotasks.iter().map(|m| m.id()).collect::<Vec<_>>(),
            )
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .finish()
    }
}

impl MonotaskGraph {
    pub fn context(&self) -> &Arc<MacrotaskContext> {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.monotasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monotasks.is_empty()
    }

    /// Ids of the monotasks that are ready at submission time.
    pub fn roots(&self) -> Vec<MonotaskId> {
        self.monotasks
            .iter()
            .map(|m| m.id())
            .filter(|id| self.dependencies.get(id).map_or(true, HashSet::is_empty))
            .collect()
    }
}

/// Builds and validates a [`MonotaskGraph`].
///
/// Validation: ids unique within the graph, every dependency refers to a
/// sibling monotask, every monotask shares the builder's macrotask context,
/// and the dependency relation is acyclic.
pub struct MonotaskGraphBuilder {
    context: Arc<MacrotaskContext>,
    monotasks: Vec<Arc<dyn Monotask>>,
    dependencies: HashMap<MonotaskId, HashSet<MonotaskId>>,
}

impl MonotaskGraphBuilder {
    pub fn new(context: Arc<MacrotaskContext>) -> Self {
        Self {
            context,
            monotasks: Vec::new(),
            dependencies: HashMap::new(),
        }
    }

    /// Adds a monotask with the ids of the monotasks it depends on.
    pub fn add(mut self, monotask: Arc<dyn Monotask>, dependencies: &[MonotaskId]) -> Self {
        self.dependencies
            .insert(monotask.id(), dependencies.iter().copied().collect());
        self.monotasks.push(monotask);
        self
    }

    pub fn build(self) -> Result<MonotaskGraph> {
        let attempt_id = self.context.attempt_id();
        let mut indices: HashMap<MonotaskId, NodeIndex> = HashMap::new();
        let mut dag = DiGraph::<MonotaskId, ()>::new();

        for monotask in &self.monotasks {
            let id = monotask.id();
            if monotask.context().attempt_id() != attempt_id {
                return Err(DagError::MixedMacrotask {
                    monotask_id: id,
                    found: monotask.context().attempt_id(),
                    expected: attempt_id,
                });
            }
            if indices.insert(id, dag.add_node(id)).is_some() {
                return Err(DagError::DuplicateMonotask {
                    monotask_id: id,
                    attempt_id,
                });
            }
        }

        let mut dependents: HashMap<MonotaskId, HashSet<MonotaskId>> = HashMap::new();
        for (id, deps) in &self.dependencies {
            for dep_id in deps {
                if dep_id == id {
                    return Err(DagError::SelfDependency { monotask_id: *id });
                }
                let dep_index = *indices.get(dep_id).ok_or(DagError::UnknownDependency {
                    monotask_id: *id,
                    dependency_id: *dep_id,
                })?;
                dag.add_edge(dep_index, indices[id], ());
                dependents.entry(*dep_id).or_default().insert(*id);
            }
        }

        if is_cyclic_directed(&dag) {
            return Err(DagError::CircularDependency { attempt_id });
        }

        debug!(
            attempt_id,
            monotasks = self.monotasks.len(),
            edges = dag.edge_count(),
            "monotask graph validated"
        );

        Ok(MonotaskGraph {
            context: self.context,
            monotasks: self.monotasks,
            dependencies: self.dependencies,
            dependents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use async_trait::async_trait;

    struct NoopMonotask {
        id: MonotaskId,
        context: Arc<MacrotaskContext>,
    }

    #[async_trait]
    impl Monotask for NoopMonotask {
        fn id(&self) -> MonotaskId {
            self.id
        }

        fn kind(&self) -> ResourceKind {
            ResourceKind::Compute
        }

        fn context(&self) -> &Arc<MacrotaskContext> {
            &self.context
        }

        async fn execute(&self) -> bool {
            true
        }
    }

    fn noop(id: MonotaskId, context: &Arc<MacrotaskContext>) -> Arc<dyn Monotask> {
        Arc::new(NoopMonotask {
            id,
            context: context.clone(),
        })
    }

    #[test]
    fn test_build_derives_dependents_and_roots() {
        let ctx = Arc::new(MacrotaskContext::new(1));
        let graph = MonotaskGraphBuilder::new(ctx.clone())
            .add(noop(1, &ctx), &[])
            .add(noop(2, &ctx), &[1])
            .add(noop(3, &ctx), &[1, 2])
            .build()
            .unwrap();

        assert_eq!(graph.len(), 3);
        let mut roots = graph.roots();
        roots.sort_unstable();
        assert_eq!(roots, vec![1]);
        assert!(graph.dependents[&1].contains(&2));
        assert!(graph.dependents[&1].contains(&3));
        assert!(graph.dependents[&2].contains(&3));
        assert!(!graph.dependents.contains_key(&3));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let ctx = Arc::new(MacrotaskContext::new(1));
        let err = MonotaskGraphBuilder::new(ctx.clone())
            .add(noop(1, &ctx), &[])
            .add(noop(1, &ctx), &[])
            .build()
            .unwrap_err();
        assert!(matches!(err, DagError::DuplicateMonotask { monotask_id: 1, .. }));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let ctx = Arc::new(MacrotaskContext::new(1));
        let err = MonotaskGraphBuilder::new(ctx.clone())
            .add(noop(1, &ctx), &[99])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DagError::UnknownDependency {
                monotask_id: 1,
                dependency_id: 99
            }
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let ctx = Arc::new(MacrotaskContext::new(1));
        let err = MonotaskGraphBuilder::new(ctx.clone())
            .add(noop(1, &ctx), &[2])
            .add(noop(2, &ctx), &[1])
            .build()
            .unwrap_err();
        assert!(matches!(err, DagError::CircularDependency { attempt_id: 1 }));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let ctx = Arc::new(MacrotaskContext::new(1));
        let err = MonotaskGraphBuilder::new(ctx.clone())
            .add(noop(1, &ctx), &[1])
            .build()
            .unwrap_err();
        assert!(matches!(err, DagError::SelfDependency { monotask_id: 1 }));
    }

    #[test]
    fn test_mixed_context_rejected() {
        let ctx = Arc::new(MacrotaskContext::new(1));
        let other = Arc::new(MacrotaskContext::new(2));
        let err = MonotaskGraphBuilder::new(ctx.clone())
            .add(noop(1, &ctx), &[])
            .add(noop(2, &other), &[1])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DagError::MixedMacrotask {
                monotask_id: 2,
                found: 2,
                expected: 1
            }
        ));
    }
}
