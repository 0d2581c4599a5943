//! # raft-sim
//!
//! why: run a scripted cluster scenario from the command line without a UI
//! relations: drives raft_sim::Simulation through its control surface only
//! what: clap arguments, subscriber setup, tick loop printing events as json

use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use raft_sim::{SimConfig, Simulation};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Headless driver: run a scripted scenario and print every event
#[derive(Parser)]
#[command(name = "raft-sim")]
#[command(about = "Tick-driven Raft cluster simulation", long_about = None)]
struct Cli {
    /// JSON config file (defaults to a five node cluster)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the jitter seed
    #[arg(long)]
    seed: Option<u64>,

    /// Number of ticks to run
    #[arg(long, default_value_t = 300)]
    ticks: u64,

    /// Client command to submit once a leader exists (repeatable)
    #[arg(long = "command")]
    commands: Vec<String>,

    /// Crash whichever node leads at this tick
    #[arg(long)]
    kill_leader_at: Option<u64>,

    /// Comma separated group A of a partition, e.g. "S1,S2"
    #[arg(long)]
    partition: Option<String>,

    /// Tick at which the partition forms
    #[arg(long, default_value_t = 0)]
    partition_at: u64,

    /// Tick at which the partition heals
    #[arg(long)]
    heal_at: Option<u64>,

    /// Print the final cluster snapshot as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }

    let mut sim = Simulation::new(config)?;
    let mut commands: VecDeque<String> = cli.commands.iter().cloned().collect();
    let group_a: Option<Vec<String>> = cli
        .partition
        .as_ref()
        .map(|groups| groups.split(',').map(|s| s.trim().to_string()).collect());
    info!("running {} ticks", cli.ticks);

    for _ in 0..cli.ticks {
        let now = sim.tick();

        if let Some(group_a) = group_a.as_ref().filter(|_| now == cli.partition_at) {
            sim.set_partition(group_a.iter().cloned())?;
        }
        if cli.heal_at == Some(now) {
            sim.heal_partition();
        }
        if cli.kill_leader_at == Some(now) {
            match sim.leader().map(|n| n.id.clone()) {
                Some(id) => sim.set_node_alive(&id, false)?,
                None => warn!("no leader to kill at tick {}", now),
            }
        }
        if sim.leader().is_some() {
            if let Some(command) = commands.pop_front() {
                sim.client_request(&command);
            }
        }

        for event in sim.step() {
            println!("{:>5} {}", sim.tick(), serde_json::to_string(&event)?);
        }
    }

    if !commands.is_empty() {
        warn!("{} commands were never submitted", commands.len());
    }

    let snapshot = sim.snapshot();
    if cli.json {
        println!("{}", snapshot.to_json()?);
    } else {
        for node in &snapshot.nodes {
            println!(
                "{} {:?} alive={} term={} log={} commit={}",
                node.id,
                node.state,
                node.alive,
                node.term,
                node.log.len(),
                node.commit_index
            );
        }
    }
    Ok(())
}
