use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use campaign_roi_dashboard::config::{self, FilterArgs};
use campaign_roi_dashboard::input::{self, WatchCommand};
use campaign_roi_dashboard::{controller, dataset, logging, report, Controller, Dataset, FilterSpec};

#[derive(Parser)]
#[command(name = "campaign-roi-dashboard")]
#[command(about = "Filterable ROI dashboard over marketing campaign records", long_about = None)]
struct Cli {
    /// Campaign dataset CSV (falls back to ROI_DASHBOARD_CSV)
    #[arg(long, global = true)]
    csv: Option<PathBuf>,

    /// Date assigned to the first dataset row
    #[arg(long, global = true, default_value = config::DEFAULT_EPOCH)]
    epoch: NaiveDate,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a demo campaign dataset
    Seed {
        #[arg(long, default_value = "campaigns.csv")]
        out: PathBuf,
        #[arg(long, default_value_t = 120)]
        rows: usize,
    },
    /// Print KPIs and the cluster summary table
    Summary {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Generate a markdown report of every dashboard surface
    Report {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "dashboard.md")]
        out: PathBuf,
    },
    /// Export the dashboard snapshot as JSON
    Export {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "dashboard.json")]
        out: PathBuf,
    },
    /// Read filter commands from stdin and print each recomputed dashboard
    Watch {
        #[command(flatten)]
        filters: FilterArgs,
    },
}

fn load_dataset(csv: Option<PathBuf>, epoch: NaiveDate) -> anyhow::Result<Arc<Dataset>> {
    let path = config::resolve_dataset_path(csv)?;
    Ok(Arc::new(Dataset::load(&path, epoch)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose);

    match cli.command {
        Commands::Seed { out, rows } => {
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            let written = dataset::write_demo_csv(file, rows)?;
            println!("Wrote {written} demo campaigns to {}.", out.display());
        }
        Commands::Summary { filters } => {
            let dataset = load_dataset(cli.csv, cli.epoch)?;
            let spec = filters.resolve(&dataset)?;
            let snapshot = Controller::with_spec(dataset, spec).snapshot();
            print!("{}", report::build_summary(&snapshot.spec, &snapshot.view));
        }
        Commands::Report { filters, out } => {
            let dataset = load_dataset(cli.csv, cli.epoch)?;
            let spec = filters.resolve(&dataset)?;
            let snapshot = Controller::with_spec(dataset, spec).snapshot();
            let report = report::build_report(
                &snapshot.spec,
                snapshot.aggregate.row_count,
                &snapshot.view,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { filters, out } => {
            let dataset = load_dataset(cli.csv, cli.epoch)?;
            let spec = filters.resolve(&dataset)?;
            let snapshot = Controller::with_spec(dataset, spec).snapshot();
            let json = serde_json::to_string_pretty(&*snapshot)?;
            std::fs::write(&out, json)?;
            println!("Snapshot written to {}.", out.display());
        }
        Commands::Watch { filters } => {
            let dataset = load_dataset(cli.csv, cli.epoch)?;
            let spec = filters.resolve(&dataset)?;
            watch(dataset, spec).await?;
        }
    }

    Ok(())
}

async fn watch(dataset: Arc<Dataset>, spec: FilterSpec) -> anyhow::Result<()> {
    let handle = controller::spawn(Arc::clone(&dataset), spec);
    let mut outputs = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let current = handle.current();
    print!("{}", report::build_summary(&current.spec, &current.view));
    println!("{}", input::HELP);

    while let Some(line) = lines.next_line().await? {
        let command = match input::parse_command(&line, &dataset) {
            Ok(command) => command,
            Err(err) => {
                warn!(action = "parse", component = "watch", error = %err, "Rejected command");
                eprintln!("{err}");
                continue;
            }
        };

        match command {
            WatchCommand::Change(change) => {
                handle.update(change);
                let expected = handle.spec();
                loop {
                    outputs
                        .changed()
                        .await
                        .context("dashboard controller stopped")?;
                    let snapshot = Arc::clone(&outputs.borrow_and_update());
                    if snapshot.spec == expected {
                        info!(
                            action = "published",
                            component = "watch",
                            generation = snapshot.generation,
                            rows = snapshot.aggregate.row_count,
                            "Dashboard updated"
                        );
                        print!("{}", report::build_summary(&snapshot.spec, &snapshot.view));
                        break;
                    }
                }
            }
            WatchCommand::Show => {
                let current = handle.current();
                print!("{}", report::build_summary(&current.spec, &current.view));
            }
            WatchCommand::Help => println!("{}", input::HELP),
            WatchCommand::Quit => break,
        }
    }

    handle.shutdown().await;
    Ok(())
}
