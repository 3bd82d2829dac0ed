use dynasweep_core::prelude::*;
use dynasweep_core::{Budgets, StageFiles};
use dynasweep_test_utils::{state, FakeSimulator};
use std::path::Path;
use std::sync::Arc;

fn campaign(root: &Path, sim: &FakeSimulator, processes: usize) -> Campaign {
    let config = CampaignConfig::new(root)
        .with_variable("N", [StateValue::Int(4), StateValue::Int(8)])
        .with_restarts(2)
        .with_processes(processes)
        .with_property("p")
        .with_budgets(Budgets::new(10, 1000, 300))
        .with_poll_interval_ms(10);
    Campaign::new(
        config,
        Arc::new(sim.clone()),
        &PropertyRegistry::with_defaults(),
        VariableCatalog::with_defaults(),
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_run_simulates_nothing() {
    let root = tempfile::tempdir().unwrap();
    let sim = FakeSimulator::new();

    let first = campaign(root.path(), &sim, 3);
    let summary = first.run().await.unwrap();
    assert_eq!(summary.completed, 16);
    assert_eq!(summary.waves, 4);
    assert_eq!(sim.setup_count(), 4);
    // equilibration plus four blocks (300, 600, 900, 1200 >= 1000) per item
    assert_eq!(sim.runs().len(), 4 * 5);
    let before = first.fetch_data().unwrap();

    sim.reset();
    let second = campaign(root.path(), &sim, 3);
    second.run().await.unwrap();
    assert_eq!(sim.setup_count(), 0);
    assert!(sim.runs().is_empty());
    assert_eq!(second.fetch_data().unwrap(), before);
}

#[tokio::test]
async fn sequential_mode_matches_parallel_layout() {
    let root = tempfile::tempdir().unwrap();
    let sim = FakeSimulator::new();
    let campaign = campaign(root.path(), &sim, 1);
    campaign.run().await.unwrap();

    let files = StageFiles::new(true);
    for item in campaign.work_items().unwrap() {
        assert!(files.is_complete(&item.dir, 0));
        assert_eq!(files.production_stages(&item.dir), 4);
        assert!(!files.is_complete(&item.dir, 5));
    }
}

#[tokio::test]
async fn interrupted_stage_is_redone_alone() {
    let root = tempfile::tempdir().unwrap();
    let sim = FakeSimulator::new();
    let campaign = campaign(root.path(), &sim, 1);
    campaign.run().await.unwrap();

    let items = campaign.work_items().unwrap();
    let victim = &items[1];
    let files = StageFiles::new(true);
    std::fs::write(files.data(&victim.dir, 3), b"truncated").unwrap();

    sim.reset();
    campaign.run().await.unwrap();

    let runs = sim.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].dir, victim.dir);
    assert_eq!(runs[0].stage, 3);
    assert_eq!(runs[0].events, 4 * 300);
    assert_eq!(sim.setup_count(), 0);
}

#[tokio::test]
async fn lost_initial_configuration_triggers_setup_only() {
    let root = tempfile::tempdir().unwrap();
    let sim = FakeSimulator::new();
    let campaign = campaign(root.path(), &sim, 1);
    campaign.run().await.unwrap();

    let item = &campaign.work_items().unwrap()[0];
    std::fs::remove_file(StageFiles::new(true).start_config(&item.dir)).unwrap();

    sim.reset();
    campaign.run().await.unwrap();
    assert_eq!(sim.setup_count(), 1);
    assert!(sim.runs().is_empty());
}

#[tokio::test]
async fn equilibration_budget_scales_with_particles() {
    let root = tempfile::tempdir().unwrap();
    let sim = FakeSimulator::new();
    campaign(root.path(), &sim, 1).run().await.unwrap();

    let dir = root.path().join("N_8_0");
    let runs = sim.runs_in(&dir);
    assert_eq!(runs[0].stage, 0);
    assert_eq!(runs[0].events, 8 * 10);
    assert!(runs[1..].iter().all(|r| r.events == 8 * 300));
    assert!(runs.iter().all(|r| r.options.is_empty()));

    let snapshot = campaign(root.path(), &sim, 1)
        .resolver()
        .read_snapshot(&dir)
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.state, state([("N", StateValue::Int(8))]));
}
