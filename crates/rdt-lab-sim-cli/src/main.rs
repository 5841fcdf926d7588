use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{Level, info};

use rdt_lab_abstract::{SimConfig, StopPolicy};
use rdt_lab_protocols::protocol_by_name;
use rdt_lab_simulator::{SimulationReport, Simulator, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Reliable data transfer simulator (alternating-bit and go-back-N)")]
struct Args {
    /// Protocol driving entities A and B: abp or gbn.
    #[arg(short = 'p', long, default_value = "gbn")]
    protocol: String,

    /// Number of layer 5 messages to provide to A.
    #[arg(short = 'n', long = "num-msgs", default_value_t = 10)]
    num_msgs: u64,

    /// Average time between layer 5 messages.
    #[arg(short = 'd', long = "interarrival", default_value_t = 100.0)]
    interarrival_time: f64,

    /// Sequence number limit; go-back-N uses a window of half of it.
    #[arg(short = 'z', long = "seqnum-limit", default_value_t = 16)]
    seqnum_limit: u32,

    /// Layer 3 packet loss probability.
    #[arg(short = 'l', long = "loss", default_value_t = 0.0)]
    loss_prob: f64,

    /// Layer 3 packet corruption probability.
    #[arg(short = 'c', long = "corrupt", default_value_t = 0.0)]
    corrupt_prob: f64,

    /// Random seed; defaults to the wall clock.
    #[arg(short = 's', long)]
    seed: Option<u64>,

    /// Trace level: 0 warnings only, 1 entity logs, 2 events, 3 everything.
    #[arg(short = 'v', long = "trace", default_value_t = 0)]
    trace: u8,

    /// When to stop dispatching events.
    #[arg(long = "stop-when", value_enum, default_value_t = StopWhen::Drained)]
    stop_when: StopWhen,

    /// Give up once virtual time would pass this value.
    #[arg(long = "time-limit")]
    time_limit: Option<f64>,

    /// Sender base retransmit timeout (protocol default if unset).
    #[arg(long)]
    timeout: Option<f64>,

    /// Run a scenario file instead of the options above.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StopWhen {
    /// Stop once the last message has been handed to A.
    Originated,
    /// Keep going until no events remain.
    Drained,
}

impl From<StopWhen> for StopPolicy {
    fn from(value: StopWhen) -> Self {
        match value {
            StopWhen::Originated => StopPolicy::Originated,
            StopWhen::Drained => StopPolicy::Drained,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.trace);
    info!("rdt-lab-sim starting…");

    let mut stdout = io::stdout().lock();
    let report = execute(&args, &mut stdout)?;
    writeln!(stdout, "{report}")?;

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

impl Args {
    fn sim_config(&self) -> Result<SimConfig> {
        let config = SimConfig {
            protocol: protocol_by_name(&self.protocol)?,
            num_msgs: self.num_msgs,
            interarrival_time: self.interarrival_time,
            seqnum_limit: self.seqnum_limit,
            loss_prob: self.loss_prob,
            corrupt_prob: self.corrupt_prob,
            seed: self.seed,
            trace: self.trace,
            stop_policy: self.stop_when.into(),
            time_limit: self.time_limit,
            retransmit_timeout: self.timeout,
            ..Default::default()
        };
        config.validate().context("Invalid simulation options")?;
        Ok(config)
    }
}

fn init_logging(trace: u8) {
    let level = match trace {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the simulator from a scenario file or the flags, echo its settings to `out`, and run it.
fn execute(args: &Args, out: &mut dyn Write) -> Result<SimulationReport> {
    match &args.scenario {
        Some(path) => {
            let scenario = scenario_runner::load_scenario(path)?;
            let sim = scenario_runner::build(&scenario)?;
            writeln!(out, "{}", sim.config_echo())?;
            scenario_runner::execute(&scenario, sim)
        }
        None => {
            let mut sim = Simulator::with_protocol(args.sim_config()?);
            writeln!(out, "{}", sim.config_echo())?;
            let report = sim.run();
            if sim.timed_out() {
                tracing::warn!(
                    "stopped at the time limit with {} events pending",
                    sim.remaining_events()
                );
            }
            Ok(report)
        }
    }
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_classic_lab_settings() {
        let args = Args::parse_from(["rdt-lab-sim"]);
        let config = args.sim_config().expect("valid defaults");
        assert_eq!(config.num_msgs, 10);
        assert_eq!(config.interarrival_time, 100.0);
        assert_eq!(config.seqnum_limit, 16);
        assert_eq!(config.stop_policy, StopPolicy::Drained);
        assert!(config.seed.is_none());
    }

    #[test]
    fn short_flags_populate_the_config() {
        let args = Args::parse_from([
            "rdt-lab-sim", "-p", "abp", "-n", "5", "-d", "20", "-z", "2", "-l", "0.1", "-c", "0.2", "-s", "1",
            "-v", "2", "--stop-when", "originated",
        ]);
        let config = args.sim_config().expect("valid config");
        assert_eq!(config.protocol, rdt_lab_abstract::ProtocolKind::AlternatingBit);
        assert_eq!(config.num_msgs, 5);
        assert_eq!(config.seqnum_limit, 2);
        assert_eq!(config.seed, Some(1));
        assert_eq!(config.trace, 2);
        assert_eq!(config.stop_policy, StopPolicy::Originated);
    }

    #[test]
    fn invalid_probability_is_rejected() {
        let args = Args::parse_from(["rdt-lab-sim", "-l", "1.5"]);
        let err = args.sim_config().expect_err("loss above one");
        assert!(format!("{err:#}").contains("loss probability"));
    }

    #[test]
    fn scenario_runs_echo_their_configuration() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../scenarios/abp_clean.toml");
        let args = Args::parse_from(["rdt-lab-sim", "--scenario", path.to_str().expect("utf-8 path")]);
        let mut out = Vec::new();
        let report = execute(&args, &mut out).expect("bundled scenario passes");
        let printed = String::from_utf8(out).expect("utf-8 output");
        assert!(printed.contains("SIMULATION CONFIGURATION"), "{printed}");
        assert!(printed.contains("protocol: alternating-bit"), "{printed}");
        assert!(report.stats.delivered_by_b > 0);
    }

    #[test]
    fn flag_runs_echo_their_configuration() {
        let args = Args::parse_from(["rdt-lab-sim", "-n", "3", "-s", "9"]);
        let mut out = Vec::new();
        let report = execute(&args, &mut out).expect("clean run");
        let printed = String::from_utf8(out).expect("utf-8 output");
        assert!(printed.contains("random seed: 9"), "{printed}");
        assert_eq!(report.stats.delivered_by_b, 3);
    }

    #[test]
    fn total_loss_with_default_stop_terminates() {
        let args = Args::parse_from(["rdt-lab-sim", "-p", "abp", "-n", "2", "-l", "1", "-s", "1"]);
        let report = execute(&args, &mut io::sink()).expect("run ends");
        assert_eq!(report.stats.messages_originated, 2);
        assert_eq!(report.stats.delivered_by_b, 0);
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let args = Args::parse_from(["rdt-lab-sim", "-p", "sr"]);
        assert!(args.sim_config().is_err());
    }
}
