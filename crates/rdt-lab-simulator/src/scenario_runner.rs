use anyhow::{Context, anyhow, bail};
use std::fs;
use std::path::Path;
use tracing::info;

use rdt_lab_abstract::{SimConfig, TestAction, TestAssertion, TestScenario};

use crate::engine::Simulator;
use crate::trace::SimulationReport;

pub fn load_scenario(path: &Path) -> anyhow::Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let scenario: TestScenario = toml::from_str(&content)
        .with_context(|| format!("Failed to parse scenario file {}", path.display()))?;
    Ok(scenario)
}

pub fn run_scenario(path: &Path) -> anyhow::Result<SimulationReport> {
    let scenario = load_scenario(path)?;
    run(&scenario)
}

/// Run `scenario` with the built-in protocol it selects and check its assertions.
pub fn run(scenario: &TestScenario) -> anyhow::Result<SimulationReport> {
    let sim = build(scenario)?;
    execute(scenario, sim)
}

/// Apply the scenario's overrides and faults to a fresh simulator without running it.
pub fn build(scenario: &TestScenario) -> anyhow::Result<Simulator> {
    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);

    // A max_duration assertion doubles as the time limit, so a stuck run fails
    // instead of spinning forever.
    let max_duration = scenario.assertions.iter().find_map(|a| match a {
        TestAssertion::MaxDuration { time } => Some(*time),
        _ => None,
    });
    if config.time_limit.is_none() {
        config.time_limit = max_duration;
    }
    config
        .validate()
        .with_context(|| format!("Invalid configuration in scenario '{}'", scenario.name))?;

    let mut sim = Simulator::with_protocol(config);
    for action in &scenario.actions {
        match action {
            TestAction::DropNextFromSenderSeq { seq } => sim.add_drop_sender_seq_once(*seq),
            TestAction::DropNextFromReceiverAck { ack } => sim.add_drop_receiver_ack_once(*ack),
        }
    }
    Ok(sim)
}

/// Run a simulator prepared by [`build`] and check the scenario's assertions.
pub fn execute(scenario: &TestScenario, mut sim: Simulator) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let report = sim.run();

    if sim.timed_out() {
        bail!(
            "Test timed out after {} time units with {} events pending",
            report.elapsed,
            sim.remaining_events()
        );
    }

    for assertion in &scenario.assertions {
        check(assertion, &report)?;
    }

    info!("Test Scenario Passed!");
    Ok(report)
}

fn check(assertion: &TestAssertion, report: &SimulationReport) -> anyhow::Result<()> {
    let stats = &report.stats;
    match assertion {
        TestAssertion::DeliveredCount { min, max } => within("Messages delivered at B", stats.delivered_by_b, *min, *max),
        TestAssertion::DeliveredInOrder => {
            if !report.delivered_in_order() {
                bail!("Assertion Failed: B delivered messages out of order or more than once");
            }
            Ok(())
        }
        TestAssertion::SenderPacketCount { min, max } => within("Packets sent by A", stats.sent_by_a, *min, *max),
        TestAssertion::LostCount { min, max } => within("Packets lost", stats.lost, *min, *max),
        TestAssertion::MaxOutstanding { max } => {
            if report.peak_outstanding > *max {
                bail!(
                    "Assertion Failed: A had {} packets outstanding, expected max {}",
                    report.peak_outstanding,
                    max
                );
            }
            Ok(())
        }
        TestAssertion::MaxDuration { time } => {
            if report.elapsed > *time {
                bail!("Assertion Failed: run took {} time units, expected max {}", report.elapsed, time);
            }
            Ok(())
        }
    }
}

fn within(what: &str, actual: u64, min: u64, max: Option<u64>) -> anyhow::Result<()> {
    if actual < min {
        return Err(anyhow!("Assertion Failed: {what}: {actual}, expected min {min}"));
    }
    if let Some(max) = max
        && actual > max
    {
        return Err(anyhow!("Assertion Failed: {what}: {actual}, expected max {max}"));
    }
    Ok(())
}
