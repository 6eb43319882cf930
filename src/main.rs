use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;

use bully::cluster::random_events;
use bully::election::{Pid, ProbeResolution};
use bully::{run_scenario, ClusterConfig, ScenarioConfig};

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

#[derive(Parser)]
#[command(name = "bully")]
#[command(about = "Round-synchronous Bully leader election simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an election scenario and print the outcome as JSON
    Simulate {
        /// Scenario file (JSON). Without it a cluster is built from the flags below
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of peers, numbered 1..=N
        #[arg(short, long, default_value_t = 5)]
        peers: u64,

        /// Initial leader (defaults to the highest pid)
        #[arg(short, long)]
        leader: Option<u64>,

        /// Number of rounds to run
        #[arg(short, long, default_value_t = 60)]
        rounds: u64,

        /// Seed for a randomly generated fault schedule
        #[arg(long)]
        seed: Option<u64>,

        /// Only let the probe timeout resolve a liveness check
        #[arg(long, default_value_t = false)]
        timeout_only_probes: bool,
    },

    /// Print the built-in example scenario as JSON
    PrintConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::PrintConfig => {
            let scenario = ScenarioConfig::default();
            println!("{}", serde_json::to_string_pretty(&scenario)?);
        }
        Command::Simulate {
            config,
            peers,
            leader,
            rounds,
            seed,
            timeout_only_probes,
        } => {
            let mut scenario = match config {
                Some(path) => ScenarioConfig::from_file(&path)
                    .with_context(|| format!("loading scenario {}", path.display()))?,
                None => {
                    let mut cluster = ClusterConfig::with_peer_count(peers);
                    if let Some(leader) = leader {
                        cluster.initial_leader = Pid(leader);
                    }
                    ScenarioConfig {
                        cluster,
                        rounds,
                        events: Vec::new(),
                    }
                }
            };

            if timeout_only_probes {
                scenario.cluster.election.probe_resolution = ProbeResolution::TimeoutOnly;
            }
            if let Some(seed) = seed {
                scenario.events = random_events(&scenario.cluster, scenario.rounds, seed);
                info!(
                    "Generated {} events from seed {seed}",
                    scenario.events.len()
                );
            }

            info!(
                "Simulating {} peers for {} rounds",
                scenario.cluster.peers.len(),
                scenario.rounds
            );
            let outcome = run_scenario(&scenario).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}
