//! gsc: declarative convergence for gridscale cloud servers.
//!
//! Reads a desired server from a TOML manifest and makes the remote match
//! it: `plan` shows what would happen, `apply` does it.

mod manifest;

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gsc_reconcile::ServerApi;
use gsc_reconcile::exec;
use gsc_reconcile::gridscale::GridscaleApi;
use gsc_reconcile::plan::Plan;
use gsc_reconcile::types::{ServerId, ServerState};

#[derive(Parser)]
#[command(
    name = "gsc",
    about = "Declarative convergence for gridscale cloud servers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the operations apply would issue, without mutating anything
    Plan {
        /// Server manifest (TOML)
        #[arg(short, long)]
        file: PathBuf,
        /// Converge this existing server instead of creating a new one
        #[arg(long)]
        id: Option<String>,
    },
    /// Create the server, or converge an existing one onto the manifest
    Apply {
        /// Server manifest (TOML)
        #[arg(short, long)]
        file: PathBuf,
        /// Converge this existing server instead of creating a new one
        #[arg(long)]
        id: Option<String>,
    },
    /// Shut a server down and delete it
    Destroy { id: String },
    /// Show the observed state of a server
    Show { id: String },
    /// Manage account-wide labels
    #[command(subcommand)]
    Labels(LabelsCommand),
}

#[derive(Subcommand)]
enum LabelsCommand {
    /// List all labels on the account
    List,
    /// Create a label
    Add { label: String },
    /// Delete a label
    Rm { label: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let api = GridscaleApi::from_env()?;

    match cli.command {
        Command::Plan { file, id } => cmd_plan(&api, &file, id.as_deref()).await,
        Command::Apply { file, id } => cmd_apply(&api, &file, id.as_deref()).await,
        Command::Destroy { id } => cmd_destroy(&api, &id).await,
        Command::Show { id } => cmd_show(&api, &id).await,
        Command::Labels(cmd) => cmd_labels(&api, cmd).await,
    }
}

async fn cmd_plan(api: &GridscaleApi, file: &Path, id: Option<&str>) -> Result<()> {
    let spec = manifest::load(file)?;

    match id {
        Some(id) => {
            let observed = fetch_existing(api, id).await?;
            let plan = exec::plan_update(api, &spec, &observed).await?;
            println!("Plan for server {id} ({} operations):", plan.len());
            print_plan(&plan);
        }
        None => {
            let (payload, post) = exec::plan_create(api, &spec).await?;
            println!(
                "Would create server {:?} ({} cores, {} GB, profile {})",
                payload.name, payload.cores, payload.memory_gb, payload.hardware_profile
            );
            if post.is_empty() {
                println!("No deferred operations.");
            } else {
                println!("Deferred operations after creation:");
                print_plan(&post);
            }
        }
    }

    Ok(())
}

async fn cmd_apply(api: &GridscaleApi, file: &Path, id: Option<&str>) -> Result<()> {
    let spec = manifest::load(file)?;

    match id {
        Some(id) => {
            let observed = fetch_existing(api, id).await?;
            exec::reconcile(api, &spec, &observed).await?;
            println!("Server {id} converged.");
        }
        None => {
            let id = exec::create(api, &spec).await?;
            println!("Server created: {id}");
        }
    }

    Ok(())
}

async fn cmd_destroy(api: &GridscaleApi, id: &str) -> Result<()> {
    exec::delete(api, &ServerId(id.to_string())).await?;
    println!("Server {id} destroyed.");
    Ok(())
}

async fn cmd_show(api: &GridscaleApi, id: &str) -> Result<()> {
    let state = fetch_existing(api, id).await?;
    print_state(&state);
    Ok(())
}

async fn cmd_labels(api: &GridscaleApi, cmd: LabelsCommand) -> Result<()> {
    let client = api.client();
    match cmd {
        LabelsCommand::List => {
            let mut labels = client.list_labels().await?;
            labels.sort_by(|a, b| a.label.cmp(&b.label));
            for label in labels {
                println!("{}", label.label);
            }
        }
        LabelsCommand::Add { label } => {
            client.create_label(&label).await?;
            println!("Label {label:?} created.");
        }
        LabelsCommand::Rm { label } => {
            client.delete_label(&label).await?;
            println!("Label {label:?} deleted.");
        }
    }
    Ok(())
}

async fn fetch_existing(api: &GridscaleApi, id: &str) -> Result<ServerState> {
    let id = ServerId(id.to_string());
    match api.fetch_state(&id).await? {
        Some(state) => Ok(state),
        None => bail!("server {id} does not exist remotely; drop --id to create it"),
    }
}

fn print_plan(plan: &Plan) {
    for (i, op) in plan.operations().iter().enumerate() {
        println!("  {}. {op}", i + 1);
    }
}

fn print_state(state: &ServerState) {
    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());

    println!("Server {}", state.id);
    println!("  name:      {}", state.name);
    println!("  power:     {}", if state.power_on { "on" } else { "off" });
    println!("  cores:     {}", state.cores);
    println!("  memory:    {} GB", state.memory_gb);
    println!("  profile:   {}", state.hardware_profile);
    println!("  zone:      {}", opt(&state.availability_zone));
    println!("  price:     {:.2}", state.current_price);
    println!(
        "  labels:    {}",
        if state.labels.is_empty() {
            "-".into()
        } else {
            state.labels.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    );
    for storage in &state.storages {
        println!(
            "  storage:   {}{}",
            storage.storage.object_id,
            if storage.is_boot_device { " (boot)" } else { "" }
        );
    }
    for network in &state.networks {
        println!("  network:   {}", network.network.object_id);
    }
    println!(
        "  ipv4:      {}",
        state
            .ipv4
            .as_ref()
            .map_or("-".into(), |ip| ip.ip.object_id.clone())
    );
    println!(
        "  ipv6:      {}",
        state
            .ipv6
            .as_ref()
            .map_or("-".into(), |ip| ip.ip.object_id.clone())
    );
    println!(
        "  isoimage:  {}",
        state
            .iso_image
            .as_ref()
            .map_or("-".into(), |iso| iso.object_id.clone())
    );
}
