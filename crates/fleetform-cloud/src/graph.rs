//! Dependency graph over declared resources
//!
//! Every reference (and explicit `depends-on`) becomes an edge from the
//! referenced resource to the referencing one. The graph is always acyclic;
//! building it fails otherwise.

use crate::error::ConfigurationError;
use fleetform_core::{Manifest, OutputDeclaration, ResourceAddress, ResourceDeclaration};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A declared resource with its resolved edges.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    declaration: Arc<ResourceDeclaration>,
    dependencies: BTreeSet<ResourceAddress>,
    dependents: BTreeSet<ResourceAddress>,
}

impl ResourceNode {
    pub fn address(&self) -> ResourceAddress {
        self.declaration.address()
    }

    pub fn declaration(&self) -> &Arc<ResourceDeclaration> {
        &self.declaration
    }

    /// Incoming edges: resources this one needs.
    pub fn dependencies(&self) -> &BTreeSet<ResourceAddress> {
        &self.dependencies
    }

    /// Outgoing edges: resources that need this one.
    pub fn dependents(&self) -> &BTreeSet<ResourceAddress> {
        &self.dependents
    }
}

/// Directed acyclic graph of declared resources.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    nodes: BTreeMap<ResourceAddress, ResourceNode>,
    /// Dependencies always precede their dependents.
    order: Vec<ResourceAddress>,
}

impl ResourceGraph {
    /// Build the graph, resolving references into edges.
    ///
    /// Roots are visited in declaration order so the resulting topological
    /// order stays close to how the resources were written.
    pub fn build<I>(declarations: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = ResourceDeclaration>,
    {
        let mut nodes = BTreeMap::new();
        let mut declared = Vec::new();

        for declaration in declarations {
            let address = declaration.address();
            if nodes.contains_key(&address) {
                return Err(ConfigurationError::DuplicateResource(address));
            }
            let dependencies = declaration.dependencies();
            nodes.insert(
                address.clone(),
                ResourceNode {
                    declaration: Arc::new(declaration),
                    dependencies,
                    dependents: BTreeSet::new(),
                },
            );
            declared.push(address);
        }

        let mut edges = Vec::new();
        for (address, node) in &nodes {
            for dependency in &node.dependencies {
                if !nodes.contains_key(dependency) {
                    return Err(ConfigurationError::UnresolvedReference {
                        resource: address.clone(),
                        target: dependency.clone(),
                    });
                }
                edges.push((dependency.clone(), address.clone()));
            }
        }
        for (from, to) in edges {
            if let Some(node) = nodes.get_mut(&from) {
                node.dependents.insert(to);
            }
        }

        let dependency_map: BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>> = nodes
            .iter()
            .map(|(address, node)| (address.clone(), node.dependencies.clone()))
            .collect();
        let order = topological_sort(&declared, &dependency_map)?;

        tracing::debug!(resources = nodes.len(), "Built resource graph");
        Ok(Self { nodes, order })
    }

    pub fn from_manifest(manifest: &Manifest) -> Result<Self, ConfigurationError> {
        let graph = Self::build(manifest.resources.iter().cloned())?;
        graph.validate_outputs(&manifest.outputs)?;
        Ok(graph)
    }

    /// Check that every output points at a declared resource.
    pub fn validate_outputs(&self, outputs: &[OutputDeclaration]) -> Result<(), ConfigurationError> {
        for output in outputs {
            let target = output.value.target();
            if !self.contains(&target) {
                return Err(ConfigurationError::UnresolvedOutput {
                    output: output.name.clone(),
                    target,
                });
            }
        }
        Ok(())
    }

    pub fn node(&self, address: &ResourceAddress) -> Option<&ResourceNode> {
        self.nodes.get(address)
    }

    pub fn contains(&self, address: &ResourceAddress) -> bool {
        self.nodes.contains_key(address)
    }

    /// Nodes in topological order.
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.order.iter().filter_map(|a| self.nodes.get(a))
    }

    pub fn topological_order(&self) -> &[ResourceAddress] {
        &self.order
    }

    /// All edges as `(dependency, dependent)` pairs.
    pub fn edges(&self) -> BTreeSet<(ResourceAddress, ResourceAddress)> {
        self.nodes
            .iter()
            .flat_map(|(address, node)| {
                node.dependencies
                    .iter()
                    .map(move |dep| (dep.clone(), address.clone()))
            })
            .collect()
    }

    /// Nodes with no dependencies.
    pub fn entry_points(&self) -> Vec<&ResourceAddress> {
        self.order
            .iter()
            .filter(|a| self.nodes.get(*a).is_some_and(|n| n.dependencies.is_empty()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first topological sort with three-colour marking.
///
/// `dependencies` maps each node to the nodes it needs; edges to nodes
/// outside the map are ignored. Returns dependencies before dependents,
/// or `Cycle` naming every node on the first cycle found.
pub(crate) fn topological_sort(
    roots: &[ResourceAddress],
    dependencies: &BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>>,
) -> Result<Vec<ResourceAddress>, ConfigurationError> {
    let mut marks: BTreeMap<&ResourceAddress, Mark> =
        dependencies.keys().map(|a| (a, Mark::Unvisited)).collect();
    let mut order = Vec::with_capacity(dependencies.len());
    let mut path = Vec::new();

    let remaining: Vec<&ResourceAddress> = dependencies.keys().collect();
    for address in roots.iter().chain(remaining) {
        if let Some((key, _)) = dependencies.get_key_value(address) {
            visit(key, dependencies, &mut marks, &mut path, &mut order)?;
        }
    }

    Ok(order)
}

fn visit<'a>(
    address: &'a ResourceAddress,
    dependencies: &'a BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>>,
    marks: &mut BTreeMap<&'a ResourceAddress, Mark>,
    path: &mut Vec<&'a ResourceAddress>,
    order: &mut Vec<ResourceAddress>,
) -> Result<(), ConfigurationError> {
    match marks.get(&address).copied().unwrap_or(Mark::Done) {
        Mark::Done => return Ok(()),
        Mark::InProgress => {
            let start = path.iter().position(|a| *a == address).unwrap_or(0);
            let resources = path[start..].iter().map(|a| (*a).clone()).collect();
            return Err(ConfigurationError::Cycle { resources });
        }
        Mark::Unvisited => {}
    }

    marks.insert(address, Mark::InProgress);
    path.push(address);

    if let Some(needs) = dependencies.get(address) {
        for dependency in needs {
            if let Some((key, _)) = dependencies.get_key_value(dependency) {
                visit(key, dependencies, marks, path, order)?;
            }
        }
    }

    path.pop();
    marks.insert(address, Mark::Done);
    order.push(address.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetform_core::Reference;

    fn addr(s: &str) -> ResourceAddress {
        s.parse().unwrap()
    }

    fn refs(kind: &str, name: &str, targets: &[&str]) -> ResourceDeclaration {
        let mut decl = ResourceDeclaration::new(kind, name);
        for (i, target) in targets.iter().enumerate() {
            let target = addr(target);
            decl = decl.with_reference(
                format!("ref_{}", i),
                Reference::new(target.kind, target.name, "id"),
            );
        }
        decl
    }

    fn topology() -> Vec<ResourceDeclaration> {
        vec![
            refs("network", "n", &[]),
            refs("subnet", "s", &["network.n"]),
            refs("server", "x", &["subnet.s"]),
            refs("server", "y", &["subnet.s"]),
        ]
    }

    fn position(graph: &ResourceGraph, a: &str) -> usize {
        graph
            .topological_order()
            .iter()
            .position(|x| *x == addr(a))
            .unwrap()
    }

    #[test]
    fn test_edges_equal_reference_relation() {
        let graph = ResourceGraph::build(topology()).unwrap();

        let expected: BTreeSet<_> = [
            (addr("network.n"), addr("subnet.s")),
            (addr("subnet.s"), addr("server.x")),
            (addr("subnet.s"), addr("server.y")),
        ]
        .into_iter()
        .collect();
        assert_eq!(graph.edges(), expected);

        let subnet = graph.node(&addr("subnet.s")).unwrap();
        assert_eq!(subnet.dependencies().len(), 1);
        assert_eq!(subnet.dependents().len(), 2);
        assert_eq!(graph.entry_points(), vec![&addr("network.n")]);
    }

    #[test]
    fn test_topological_order() {
        let graph = ResourceGraph::build(topology()).unwrap();
        let order: Vec<String> = graph
            .topological_order()
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(order, vec!["network.n", "subnet.s", "server.x", "server.y"]);
    }

    #[test]
    fn test_declaration_order_does_not_matter_for_validity() {
        let mut reversed = topology();
        reversed.reverse();
        let graph = ResourceGraph::build(reversed).unwrap();

        assert!(position(&graph, "network.n") < position(&graph, "subnet.s"));
        assert!(position(&graph, "subnet.s") < position(&graph, "server.x"));
        assert!(position(&graph, "subnet.s") < position(&graph, "server.y"));
    }

    #[test]
    fn test_mutual_reference_is_cycle() {
        let err = ResourceGraph::build(vec![
            refs("a", "one", &["b.two"]),
            refs("b", "two", &["a.one"]),
        ])
        .unwrap_err();

        match err {
            ConfigurationError::Cycle { resources } => {
                let names: BTreeSet<_> = resources.iter().map(|a| a.to_string()).collect();
                let expected: BTreeSet<String> =
                    ["a.one", "b.two"].into_iter().map(String::from).collect();
                assert_eq!(names, expected);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_names_every_resource_on_it() {
        // entry -> a -> b -> c -> a, entry is not part of the cycle
        let err = ResourceGraph::build(vec![
            refs("r", "entry", &["r.a"]),
            refs("r", "a", &["r.b"]),
            refs("r", "b", &["r.c"]),
            refs("r", "c", &["r.a"]),
        ])
        .unwrap_err();

        let ConfigurationError::Cycle { resources } = err else {
            panic!("expected cycle");
        };
        let names: BTreeSet<_> = resources.iter().map(|a| a.to_string()).collect();
        let expected: BTreeSet<_> = ["r.a", "r.b", "r.c"].into_iter().map(String::from).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let err = ResourceGraph::build(vec![refs("r", "loop", &["r.loop"])]).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::Cycle {
                resources: vec![addr("r.loop")]
            }
        );
    }

    #[test]
    fn test_cycle_via_depends_on() {
        let err = ResourceGraph::build(vec![
            ResourceDeclaration::new("r", "a").with_dependency(addr("r.b")),
            refs("r", "b", &["r.a"]),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::Cycle { .. }));
    }

    #[test]
    fn test_unresolved_reference() {
        let err = ResourceGraph::build(vec![refs("subnet", "s", &["network.missing"])]).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnresolvedReference {
                resource: addr("subnet.s"),
                target: addr("network.missing"),
            }
        );
    }

    #[test]
    fn test_duplicate_resource() {
        let err = ResourceGraph::build(vec![refs("a", "x", &[]), refs("a", "x", &[])]).unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateResource(addr("a.x")));
    }

    #[test]
    fn test_output_must_target_declared_resource() {
        let manifest = Manifest {
            resources: topology(),
            outputs: vec![OutputDeclaration {
                name: "endpoint".to_string(),
                value: Reference::new("lb", "web", "dns_name"),
                description: None,
            }],
        };
        let err = ResourceGraph::from_manifest(&manifest).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnresolvedOutput { .. }));
    }

    #[test]
    fn test_empty_graph() {
        let graph = ResourceGraph::build(Vec::new()).unwrap();
        assert!(graph.is_empty());
        assert!(graph.topological_order().is_empty());
    }
}
