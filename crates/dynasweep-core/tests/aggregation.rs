use dynasweep_core::aggregate::{EVENTS_COLUMN, TIME_COLUMN};
use dynasweep_core::prelude::*;
use dynasweep_core::PropertyValue;
use dynasweep_test_utils::{state, FakeSimulator};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

fn build(config: CampaignConfig, sim: &FakeSimulator) -> Result<Campaign> {
    Campaign::new(
        config,
        Arc::new(sim.clone()),
        &PropertyRegistry::with_defaults(),
        VariableCatalog::with_defaults(),
    )
}

fn config(root: &Path) -> CampaignConfig {
    CampaignConfig::new(root)
        .with_variable("N", [StateValue::Int(4)])
        .with_processes(1)
        .with_budgets(Budgets::new(5, 20, 10))
}

#[tokio::test]
async fn stages_are_weighted_by_elapsed_time() {
    let root = tempfile::tempdir().unwrap();
    let sim = FakeSimulator::new()
        .with_pressure(|_, stage| match stage {
            0 => 100.0,
            1 => 2.0,
            _ => 4.0,
        })
        .with_time(|_, stage| if stage == 1 { 10.0 } else { 30.0 });
    let campaign = build(config(root.path()).with_property("p"), &sim).unwrap();
    campaign.run().await.unwrap();

    let table = campaign.fetch_data().unwrap();
    let four = state([("N", StateValue::Int(4))]);
    assert_eq!(table.columns, vec!["N", EVENTS_COLUMN, TIME_COLUMN, "p"]);
    assert_eq!(table.len(), 1);

    match table.value(&four, "p") {
        Some(PropertyValue::Estimate(e)) => assert_eq!(e.value, 3.5),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(table.value(&four, TIME_COLUMN), Some(&PropertyValue::Total(40.0)));
    // two production stages of 10 events per particle for 4 particles
    assert_eq!(table.value(&four, EVENTS_COLUMN), Some(&PropertyValue::Total(80.0)));
}

#[tokio::test]
async fn run_options_reach_the_simulator_and_absent_data_is_missing() {
    let root = tempfile::tempdir().unwrap();
    let sim = FakeSimulator::new();
    let campaign = build(config(root.path()).with_property("MSD"), &sim).unwrap();
    assert_eq!(campaign.properties().run_options(), ["-LMSD".to_string()]);

    campaign.run().await.unwrap();
    assert!(sim.runs().iter().all(|r| r.options == ["-LMSD"]));

    let table = campaign.fetch_data().unwrap();
    let four = state([("N", StateValue::Int(4))]);
    assert_eq!(table.value(&four, "MSD"), Some(&PropertyValue::Missing));
    assert!(table.to_string().lines().nth(1).unwrap().ends_with('-'));
}

#[tokio::test]
async fn fetch_before_any_production_is_empty() {
    let root = tempfile::tempdir().unwrap();
    let sim = FakeSimulator::new();
    let campaign = build(
        config(root.path())
            .with_property("p")
            .with_budgets(Budgets::new(5, 0, 10)),
        &sim,
    )
    .unwrap();

    let summary = campaign.run().await.unwrap();
    assert_eq!(summary.executed, 0);
    assert!(sim.runs().is_empty());
    assert!(campaign.fetch_data().unwrap().is_empty());
}

#[test]
fn unknown_property_fails_before_touching_disk() {
    let root = tempfile::tempdir().unwrap();
    let campaign_root = root.path().join("campaign");
    let err = build(config(&campaign_root).with_property("viscosity"), &FakeSimulator::new())
        .unwrap_err();

    assert!(matches!(err, Error::UnknownProperty(ref name) if name == "viscosity"));
    assert!(err.is_configuration());
    assert!(!campaign_root.exists());
}

#[test]
fn property_dependencies_must_be_declared() {
    let root = tempfile::tempdir().unwrap();
    let err = build(config(root.path()).with_property("NeventsSO"), &FakeSimulator::new())
        .unwrap_err();
    match err {
        Error::MissingStateVariable { property, variable } => {
            assert_eq!(property, "NeventsSO");
            assert_eq!(variable, "Rso");
        }
        other => panic!("unexpected {other:?}"),
    }

    let with_rso = config(root.path())
        .with_variable("Rso", [StateValue::float(1.5)])
        .with_property("NeventsSO");
    assert!(build(with_rso, &FakeSimulator::new()).is_ok());
}

#[test]
fn missing_tool_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let sim = FakeSimulator::new().with_missing_tool("dynarun");
    let err = build(config(root.path()), &sim).unwrap_err();
    assert!(matches!(err, Error::MissingTool(ref tool) if tool == "dynarun"));
    assert!(err.to_string().contains("dynarun"));
}

#[test]
fn configuration_round_trips_through_toml() {
    let root = tempfile::tempdir().unwrap();
    let text = format!(
        r#"
root = "{}"
restarts = 2
processes = 1
properties = ["p", "T"]

[[variables]]
name = "N"
values = [4, 8]

[budgets]
production_events_per_particle = 20
block_events_per_particle = 10
"#,
        root.path().display()
    );
    let config = CampaignConfig::from_toml_str(&text).unwrap();
    let campaign = build(config, &FakeSimulator::new()).unwrap();
    assert_eq!(campaign.space().len(), 4);
    assert_eq!(campaign.properties().names().collect::<Vec<_>>(), ["T", "p"]);
    assert_eq!(campaign.config().budgets.equilibration_events_per_particle, 1000);
}
