//! Plan and apply the demo topology against the local provider

use fleetform_cloud::{
    Action, Executor, ExecutorConfig, FileStateStore, PlanMode, Planner, ProviderRegistry,
    ResourceGraph, StateStore,
};
use fleetform_cloud_local::LocalProvider;
use fleetform_core::{ResourceAddress, parse_manifest_str};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const TOPOLOGY: &str = include_str!("../../../demos/topology.kdl");

#[tokio::test]
async fn test_demo_topology_converges() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = parse_manifest_str(TOPOLOGY).unwrap();
    let graph = ResourceGraph::from_manifest(&manifest).unwrap();

    let provider = Arc::new(LocalProvider::persistent(dir.path().join("local"), "local-1"));
    let registry = Arc::new(ProviderRegistry::new().with_fallback(provider.clone()));
    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(dir.path()));
    let planner = Planner::new(registry.clone());

    let plan = planner
        .plan(&graph, &manifest.outputs, store.as_ref(), PlanMode::Apply)
        .await
        .unwrap();
    assert_eq!(plan.summary().create, manifest.len());

    let result = Executor::new(registry.clone(), ExecutorConfig::default())
        .apply(plan.approve(), store.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert!(result.is_success(), "{:?}", result.failed());
    assert!(
        result.outputs["lb_dns_name"]
            .as_str()
            .unwrap()
            .ends_with(".elb.fleetform.local")
    );
    assert!(
        result.outputs["db_endpoint"]
            .as_str()
            .unwrap()
            .ends_with(":5432")
    );
    assert_eq!(provider.inventory().await.unwrap().len(), manifest.len());

    // Second run is a no-op
    let plan = planner
        .plan(&graph, &manifest.outputs, store.as_ref(), PlanMode::Apply)
        .await
        .unwrap();
    assert!(!plan.has_changes());

    // Changing the VPC CIDR recreates the VPC
    let changed = TOPOLOGY.replacen("10.0.0.0/16", "10.1.0.0/16", 1);
    let manifest = parse_manifest_str(&changed).unwrap();
    let graph = ResourceGraph::from_manifest(&manifest).unwrap();
    let plan = planner
        .plan(&graph, &manifest.outputs, store.as_ref(), PlanMode::Apply)
        .await
        .unwrap();
    let vpc = ResourceAddress::new("aws_vpc", "main");
    assert_eq!(plan.step(&vpc).unwrap().action, Action::Replace);
    assert_eq!(
        plan.step(&ResourceAddress::new("aws_subnet", "public_a"))
            .unwrap()
            .action,
        Action::Update
    );
}
