//! Dependency resolution between resource types.
//!
//! Declared `depends_on` edges are turned into an arena graph and sorted with
//! Kahn's algorithm. For `A depends_on B`, `B` is ordered before `A`.

use crate::error::RegistryError;
use crate::resources::ResourceTypeRegistry;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Dependency graph over registry indices.
struct DependencyGraph {
    /// `prerequisites[a]` = types that must go before `a`.
    prerequisites: Vec<Vec<usize>>,
    /// `dependents[b]` = types waiting on `b`.
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    fn build(registry: &ResourceTypeRegistry) -> Result<Self, RegistryError> {
        let count = registry.len();
        let mut prerequisites = vec![Vec::new(); count];
        let mut dependents = vec![Vec::new(); count];

        for (index, descriptor) in registry.descriptors().iter().enumerate() {
            for dependency in descriptor.dependencies() {
                let target = registry.index_of(dependency).ok_or_else(|| {
                    RegistryError::UnknownDependency {
                        type_name: descriptor.name().to_string(),
                        dependency: dependency.clone(),
                    }
                })?;

                // An alias and its canonical name may both be listed.
                if !prerequisites[index].contains(&target) {
                    prerequisites[index].push(target);
                    dependents[target].push(index);
                }
            }
        }

        for list in &mut prerequisites {
            list.sort_unstable();
        }

        Ok(Self {
            prerequisites,
            dependents,
        })
    }

    /// Kahn's algorithm, always taking the lowest registration index among the
    /// ready nodes. Returns the nodes left over when a cycle blocks progress.
    fn sort(&self) -> Result<Vec<usize>, Vec<bool>> {
        let count = self.prerequisites.len();
        let mut in_degree: Vec<usize> = self.prerequisites.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &dependent in &self.dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() == count {
            Ok(order)
        } else {
            Err(in_degree.iter().map(|d| *d > 0).collect())
        }
    }

    /// Walk prerequisite edges among blocked nodes until one repeats.
    ///
    /// Every blocked node has at least one blocked prerequisite, so the walk
    /// always closes a cycle.
    fn find_cycle(&self, blocked: &[bool]) -> Vec<usize> {
        let Some(start) = blocked.iter().position(|b| *b) else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut seen: HashMap<usize, usize> = HashMap::from([(start, 0)]);
        let mut current = start;

        loop {
            let Some(&next) = self.prerequisites[current].iter().find(|p| blocked[**p]) else {
                return path;
            };
            if let Some(&position) = seen.get(&next) {
                let mut cycle = path.split_off(position);
                cycle.push(next);
                return cycle;
            }
            seen.insert(next, path.len());
            path.push(next);
            current = next;
        }
    }
}

/// Total order in which resource types are processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOrder {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ExecutionOrder {
    /// Canonical type names, earliest first.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of a canonical type name in the order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Compute the processing order for every registered type.
///
/// Ties between unconstrained types are broken by registration order, so the
/// same registry always yields the same order.
pub fn resolve_order(registry: &ResourceTypeRegistry) -> Result<ExecutionOrder, RegistryError> {
    let graph = DependencyGraph::build(registry)?;
    let descriptors = registry.descriptors();

    match graph.sort() {
        Ok(indices) => {
            let names: Vec<String> = indices
                .into_iter()
                .map(|i| descriptors[i].name().to_string())
                .collect();
            let positions = names
                .iter()
                .enumerate()
                .map(|(pos, name)| (name.clone(), pos))
                .collect();

            tracing::debug!(types = names.len(), "Resolved resource type order");
            Ok(ExecutionOrder { names, positions })
        }
        Err(blocked) => {
            // Reported in dependency direction: A -> B means A depends on B.
            let cycle: Vec<String> = graph
                .find_cycle(&blocked)
                .into_iter()
                .map(|i| descriptors[i].name().to_string())
                .collect();

            tracing::error!(cycle = %cycle.join(" -> "), "Cyclic resource type dependency");
            Err(RegistryError::CyclicDependency { cycle })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ListError;
    use crate::resources::{ResourceHandle, ResourceTypeDescriptor, ScanContext, Scope};

    fn none(_: &ScanContext) -> Result<Vec<Box<dyn ResourceHandle>>, ListError> {
        Ok(Vec::new())
    }

    fn descriptor(name: &str, deps: &[&str]) -> ResourceTypeDescriptor {
        ResourceTypeDescriptor::new(name, Scope::Region, none).depends_on(deps.iter().copied())
    }

    fn registry(descriptors: Vec<ResourceTypeDescriptor>) -> ResourceTypeRegistry {
        ResourceTypeRegistry::from_descriptors(descriptors).unwrap()
    }

    #[test]
    fn test_chain_is_ordered_dependencies_first() {
        let registry = registry(vec![
            descriptor("A", &["B"]),
            descriptor("B", &["C"]),
            descriptor("C", &[]),
        ]);

        let order = resolve_order(&registry).unwrap();
        assert_eq!(order.names(), &["C", "B", "A"]);
        assert_eq!(order.position("C"), Some(0));
        assert_eq!(order.position("A"), Some(2));
    }

    #[test]
    fn test_unconstrained_types_keep_registration_order() {
        let registry = registry(vec![
            descriptor("Zeta", &[]),
            descriptor("Alpha", &[]),
            descriptor("Mid", &[]),
        ]);

        let order = resolve_order(&registry).unwrap();
        assert_eq!(order.names(), &["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_ready_nodes_taken_by_registration_index() {
        // D is registered first but must wait for E.
        let registry = registry(vec![
            descriptor("D", &["E"]),
            descriptor("X", &[]),
            descriptor("E", &[]),
        ]);

        let order = resolve_order(&registry).unwrap();
        assert_eq!(order.names(), &["X", "E", "D"]);
    }

    #[test]
    fn test_every_edge_respected_in_diamond() {
        let registry = registry(vec![
            descriptor("VPC", &["Subnet", "RouteTable", "InternetGatewayAttachment"]),
            descriptor("Subnet", &["Instance"]),
            descriptor("RouteTable", &["Subnet"]),
            descriptor("InternetGatewayAttachment", &[]),
            descriptor("Instance", &[]),
        ]);

        let order = resolve_order(&registry).unwrap();
        for d in registry.descriptors() {
            for dep in d.dependencies() {
                assert!(
                    order.position(dep).unwrap() < order.position(d.name()).unwrap(),
                    "{dep} must precede {}",
                    d.name()
                );
            }
        }
    }

    #[test]
    fn test_alias_edges_resolve_to_canonical_type() {
        let registry = registry(vec![
            descriptor("IAMUser", &["IamUserAccessKey"]),
            ResourceTypeDescriptor::new("IAMUserAccessKey", Scope::Account, none)
                .deprecated_aliases(["IamUserAccessKey"]),
        ]);

        let order = resolve_order(&registry).unwrap();
        assert_eq!(order.names(), &["IAMUserAccessKey", "IAMUser"]);
    }

    #[test]
    fn test_cycle_is_named() {
        let registry = registry(vec![
            descriptor("A", &["B"]),
            descriptor("B", &["C"]),
            descriptor("C", &["A"]),
            descriptor("Free", &[]),
        ]);

        let err = resolve_order(&registry).unwrap_err();
        assert_eq!(
            err,
            RegistryError::CyclicDependency {
                cycle: vec!["A".into(), "B".into(), "C".into(), "A".into()]
            }
        );
    }

    #[test]
    fn test_cycle_downstream_of_acyclic_prefix() {
        // Top depends on a cycle it is not part of.
        let registry = registry(vec![
            descriptor("Top", &["Left"]),
            descriptor("Left", &["Right"]),
            descriptor("Right", &["Left"]),
        ]);

        let err = resolve_order(&registry).unwrap_err();
        match err {
            RegistryError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["Left", "Right", "Left"]);
            }
            other => panic!("Expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let registry = registry(vec![descriptor("Loop", &["Loop"])]);

        let err = resolve_order(&registry).unwrap_err();
        assert_eq!(
            err,
            RegistryError::CyclicDependency {
                cycle: vec!["Loop".into(), "Loop".into()]
            }
        );
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let registry = registry(vec![descriptor("EC2RouteTable", &["EC2Subnet"])]);

        let err = resolve_order(&registry).unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownDependency {
                type_name: "EC2RouteTable".into(),
                dependency: "EC2Subnet".into()
            }
        );
    }

    #[test]
    fn test_empty_registry() {
        let order = resolve_order(&ResourceTypeRegistry::new()).unwrap();
        assert!(order.is_empty());
        assert_eq!(order.len(), 0);
    }
}
