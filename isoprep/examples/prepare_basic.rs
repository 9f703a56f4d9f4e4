//! Basic preparation example with the scripted test partitioner.
//!
//! Reads the configuration from a flat JSON document, prepares one graph,
//! prints the lifecycle events and the completion record, then shows how a
//! failing graph stops the run.
//!
//! Run with `RUST_LOG=isoprep=debug` to see the spans of every job.

use std::sync::Arc;

use isoprep::*;
use isoprep_testkit::{MockPartitioner, TestFilter, TestGraph};
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"{
    "prepare.fastisochrone.threads": 2,
    "prepare.fastisochrone.maxcellnodes": 3000,
    "prepare.fastisochrone.weightings": "fastest,shortest",
    "routing.fastisochrone.init_disabling_allowed": true
}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("isoprep=info")),
        )
        .init();

    let source = MapConfigSource::from_json(CONFIG)?;
    let partitioner = MockPartitioner::new();
    let mut orchestrator = PreparationOrchestratorBuilder::new()
        .with_source(&source)?
        .with_partitioner(Arc::new(partitioner.clone()))
        .build()?;

    println!(
        "[SETUP] profiles: {:?}, threads: {}",
        orchestrator.registry().profiles().collect::<Vec<_>>(),
        orchestrator.preparation_threads()
    );

    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[EVENT] {:?}", event.payload);
        }
    });

    orchestrator.create_job(
        Arc::new(TestGraph::slow("berlin", 200)),
        Arc::new(TestFilter::new("car")),
    );

    let properties = Arc::new(InMemoryProperties::new());
    orchestrator.prepare(properties.clone()).await?;

    for (key, value) in properties.entries() {
        println!("[PROPERTIES] {key} = {value}");
    }
    if let Some(artifacts) = orchestrator.current_artifacts() {
        println!("[HANDOFF] node storage: {:?}", artifacts.node_storage);
        println!("[HANDOFF] cell storage: {:?}", artifacts.cell_storage);
    }

    // A second run needs a fresh pool. Only the new broken job runs; berlin
    // is already completed.
    orchestrator.set_preparation_threads(2)?;
    orchestrator.add_job(
        "PrepareBroken",
        Arc::new(TestGraph::failing("broken", "graph is not connected")),
        Arc::new(TestFilter::new("car")),
    );
    match orchestrator.prepare(properties).await {
        Ok(()) => println!("[RESULT] unexpected success"),
        Err(err) => println!("[RESULT] {err}"),
    }
    println!(
        "[RESULT] partitioning runs started: {}, state: {:?}",
        partitioner.started(),
        orchestrator.state()
    );

    drop(orchestrator);
    printer.await?;
    Ok(())
}
