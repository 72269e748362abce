use anyhow::{bail, Context, Result};
use clap::Args;
use simdash_core::{Simulation, SimulationDraft, SimulationId, SimulationStatus};
use simdash_sync::dispatch::save_artifact;
use simdash_sync::{ClientConfig, HttpSimulationApi, SimulationApi};
use std::path::PathBuf;
use tracing::info;

/// Form fields for a new simulation. Values are validated client-side before
/// anything is sent.
#[derive(Debug, Args)]
pub struct CreateArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    n_transmitter: String,
    #[arg(long)]
    n_receiver: String,
    #[arg(long)]
    emitters_pitch: String,
    #[arg(long)]
    receivers_pitch: String,
    #[arg(long)]
    sensor_distance: String,
    #[arg(long)]
    sensor_edge_margin: String,
    #[arg(long)]
    typical_mesh_size: String,
    #[arg(long)]
    plate_thickness: String,
    #[arg(long)]
    porosity: String,
    /// Yes or No
    #[arg(long, default_value = "No")]
    attenuation: String,
}

impl From<CreateArgs> for SimulationDraft {
    fn from(args: CreateArgs) -> Self {
        SimulationDraft {
            name: args.name,
            n_transmitter: args.n_transmitter,
            n_receiver: args.n_receiver,
            emitters_pitch: args.emitters_pitch,
            receivers_pitch: args.receivers_pitch,
            sensor_distance: args.sensor_distance,
            sensor_edge_margin: args.sensor_edge_margin,
            typical_mesh_size: args.typical_mesh_size,
            plate_thickness: args.plate_thickness,
            porosity: args.porosity,
            attenuation: args.attenuation,
        }
    }
}

fn api(config: &ClientConfig) -> Result<HttpSimulationApi> {
    HttpSimulationApi::from_config(config).context("Failed to build HTTP client")
}

fn print_row(record: &Simulation) {
    let progress = record
        .progress()
        .map(|value| format!(" {value}%"))
        .unwrap_or_default();
    println!(
        "- [{}] {} ({}{}) tx={} rx={} length={:.3}",
        record.id,
        record.name,
        record.status,
        progress,
        record.params.n_transmitter,
        record.params.n_receiver,
        record.plate_length()
    );
}

pub async fn list(config: &ClientConfig) -> Result<()> {
    let records = api(config)?
        .fetch_snapshot()
        .await
        .context("Failed to load simulations")?;
    if records.is_empty() {
        println!("No simulations found at {}", config.api_url);
        return Ok(());
    }
    println!("Found {} simulations:", records.len());
    for record in &records {
        print_row(record);
    }
    Ok(())
}

pub async fn create(config: &ClientConfig, args: CreateArgs) -> Result<()> {
    let draft = SimulationDraft::from(args)
        .validate()
        .context("Invalid simulation")?;
    let record = api(config)?
        .create(&draft)
        .await
        .context("Failed to create simulation")?;
    info!(event = "simulation_created", id = %record.id);
    println!("Created simulation {}", record.id);
    print_row(&record);
    Ok(())
}

pub async fn run(config: &ClientConfig, id: SimulationId) -> Result<()> {
    let api = api(config)?;
    let records = api
        .fetch_snapshot()
        .await
        .context("Failed to load simulations")?;
    let Some(record) = records.into_iter().find(|record| record.id == id) else {
        bail!("simulation {id} does not exist");
    };
    if record.status != SimulationStatus::NotStarted {
        bail!("simulation {id} is {}; only new simulations can be run", record.status);
    }
    let ack = api
        .execute(id, &record.params)
        .await
        .with_context(|| format!("Failed to start simulation {id}"))?;
    let status = ack
        .record
        .map(|record| record.status)
        .unwrap_or(SimulationStatus::Running);
    println!("Simulation {id}: {status}");
    Ok(())
}

pub async fn delete(config: &ClientConfig, id: SimulationId) -> Result<()> {
    api(config)?
        .delete(id)
        .await
        .with_context(|| format!("Failed to delete simulation {id}"))?;
    println!("Deleted simulation {id}");
    Ok(())
}

pub async fn delete_all(config: &ClientConfig, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("refusing to delete every simulation without --yes");
    }
    let outcome = api(config)?
        .delete_all()
        .await
        .context("Failed to delete simulations")?;
    println!("{}", outcome.message);
    Ok(())
}

pub async fn download(config: &ClientConfig, id: SimulationId, out: Option<PathBuf>) -> Result<()> {
    let api = api(config)?;
    let dir = out.unwrap_or_else(|| config.download_dir.clone());
    let path = save_artifact(&api, id, dir)
        .await
        .with_context(|| format!("Failed to download simulation {id}"))?;
    println!("Saved {}", path.display());
    Ok(())
}
