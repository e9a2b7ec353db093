//! Command-line interface for the harvester.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::client::HarvestClient;
use crate::config::validate_base_url;
use crate::datestamp::parse_datestamp;
use crate::error::{HarvesterError, Result};
use crate::notify::NullNotifier;
use crate::output::OutputManager;
use crate::scheduler::HarvestScheduler;
use crate::store::{load_jobs, save_jobs};
use crate::types::{HarvestParams, RunStatus};

/// OAI Harvester - Harvest metadata records from OAI-PMH providers.
#[derive(Parser)]
#[command(name = "oai-harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a one-shot harvest against a provider.
    Harvest {
        /// Provider base URL (e.g., http://www.dlese.org/oai/provider)
        base_url: String,

        /// metadataPrefix to harvest (default: every advertised format)
        #[arg(short, long)]
        prefix: Option<String>,

        /// setSpec to restrict the harvest to
        #[arg(short, long)]
        set: Option<String>,

        /// Lower datestamp bound (YYYY-MM-DD or YYYY-MM-DDThh:mm:ssZ)
        #[arg(long)]
        from: Option<String>,

        /// Upper datestamp bound
        #[arg(long)]
        until: Option<String>,

        /// Output directory (default: harvested/)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write each record under one subdirectory per setSpec
        #[arg(long)]
        split_by_set: bool,

        /// Archive the run to a zip afterwards
        #[arg(long)]
        zip: bool,

        /// Ignore the datestamp window and harvest everything
        #[arg(long)]
        harvest_all: bool,

        /// HTTP timeout in seconds
        #[arg(long, default_value_t = 180)]
        timeout: u64,
    },

    /// Run the scheduler daemon over a YAML job file.
    Schedule {
        /// Path to the job list (created if absent)
        jobs_file: PathBuf,

        /// Seconds between scheduler ticks
        #[arg(long, default_value_t = 60)]
        tick: u64,

        /// HTTP timeout in seconds for all runs
        #[arg(long, default_value_t = 180)]
        timeout: u64,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest {
            base_url,
            prefix,
            set,
            from,
            until,
            output,
            split_by_set,
            zip,
            harvest_all,
            timeout,
        } => harvest_command(&HarvestArgs {
            base_url,
            prefix,
            set,
            from,
            until,
            output: output.unwrap_or_else(|| PathBuf::from("harvested")),
            split_by_set,
            zip,
            harvest_all,
            timeout: Duration::from_secs(timeout),
        }),
        Commands::Schedule {
            jobs_file,
            tick,
            timeout,
        } => schedule_command(
            &jobs_file,
            Duration::from_secs(tick),
            Duration::from_secs(timeout),
        ),
    }
}

struct HarvestArgs {
    base_url: String,
    prefix: Option<String>,
    set: Option<String>,
    from: Option<String>,
    until: Option<String>,
    output: PathBuf,
    split_by_set: bool,
    zip: bool,
    harvest_all: bool,
    timeout: Duration,
}

/// Execute the harvest command.
fn harvest_command(args: &HarvestArgs) -> Result<()> {
    // Validate inputs before making HTTP requests
    let base_url = validate_base_url(&args.base_url)?;
    let from = args.from.as_deref().map(parse_datestamp).transpose()?;
    let until = args.until.as_deref().map(parse_datestamp).transpose()?;

    println!(
        "{} {}",
        style("Harvesting").bold(),
        style(base_url.as_str()).cyan()
    );
    println!();

    let params = HarvestParams {
        base_url: args.base_url.clone(),
        metadata_prefix: args.prefix.clone(),
        set_spec: args.set.clone(),
        from,
        until,
        harvest_all: args.harvest_all,
        harvest_all_if_no_deleted_record: false,
        verb: crate::protocol::Verb::ListRecords,
    };

    let mut output = OutputManager::new(
        &args.output,
        &base_url,
        args.prefix.as_deref(),
        args.set.as_deref(),
        args.split_by_set,
        args.zip.then(|| args.output.join("zips")),
        Arc::new(NullNotifier),
    );

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message("Harvesting records...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let client = HarvestClient::with_timeout(args.timeout)?;
    let mut run = client.harvest(&params, &mut output);

    if run.status == RunStatus::Succeeded {
        pb.set_message("Archiving...");
        run.zip_file = output.archive_run(run.start_time)?;
    }
    pb.finish_and_clear();

    let stats = output.stats();
    println!("  Records: {}", style(run.records).green());
    println!("  Pages: {}", run.pages);
    println!(
        "  Created: {}  Updated: {}  Unchanged: {}  Deleted: {}",
        stats.created, stats.updated, stats.unchanged, stats.deleted
    );
    println!("  Output: {}", output.scope_dir().display());
    if let Some(zip_file) = &run.zip_file {
        println!("  Archive: {zip_file}");
    }
    println!();

    match run.status {
        RunStatus::Succeeded => {
            println!("{}", style("Harvest succeeded").green().bold());
            Ok(())
        }
        status => Err(HarvesterError::HarvestFailed {
            status: status.as_str(),
            message: run.error.unwrap_or_else(|| "unknown error".to_string()),
        }),
    }
}

/// Execute the schedule command: tick the scheduler forever, persisting
/// the job list after every tick.
fn schedule_command(jobs_file: &std::path::Path, tick: Duration, timeout: Duration) -> Result<()> {
    let scheduler = HarvestScheduler::builder().timeout(timeout).build();

    let jobs = load_jobs(jobs_file)?;
    println!(
        "{} {} job(s) from {}",
        style("Loaded").bold(),
        style(jobs.len()).green(),
        jobs_file.display()
    );
    for job in jobs {
        scheduler.register(job);
    }

    loop {
        let started = scheduler.tick(chrono::Utc::now());
        if started > 0 {
            tracing::info!(started, "Tick started runs");
        }
        std::thread::sleep(tick);

        let mut snapshot = scheduler.jobs();
        snapshot.sort_by_key(|job| job.uid);
        save_jobs(jobs_file, &snapshot)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_harvest() {
        let cli = Cli::parse_from(["oai-harvester", "harvest", "http://repo.example.org/oai"]);

        let Commands::Harvest {
            base_url,
            prefix,
            zip,
            timeout,
            ..
        } = cli.command
        else {
            panic!("expected harvest command");
        };
        assert_eq!(base_url, "http://repo.example.org/oai");
        assert!(prefix.is_none());
        assert!(!zip);
        assert_eq!(timeout, 180);
    }

    #[test]
    fn test_cli_parse_harvest_with_options() {
        let cli = Cli::parse_from([
            "oai-harvester",
            "harvest",
            "http://repo.example.org/oai",
            "--prefix",
            "oai_dc",
            "--set",
            "physics",
            "--from",
            "2004-01-01",
            "--split-by-set",
            "--zip",
            "--harvest-all",
        ]);

        let Commands::Harvest {
            prefix,
            set,
            from,
            split_by_set,
            zip,
            harvest_all,
            ..
        } = cli.command
        else {
            panic!("expected harvest command");
        };
        assert_eq!(prefix, Some("oai_dc".to_string()));
        assert_eq!(set, Some("physics".to_string()));
        assert_eq!(from, Some("2004-01-01".to_string()));
        assert!(split_by_set);
        assert!(zip);
        assert!(harvest_all);
    }

    #[test]
    fn test_cli_parse_schedule() {
        let cli = Cli::parse_from(["oai-harvester", "schedule", "jobs.yaml", "--tick", "10"]);

        let Commands::Schedule {
            jobs_file, tick, ..
        } = cli.command
        else {
            panic!("expected schedule command");
        };
        assert_eq!(jobs_file, PathBuf::from("jobs.yaml"));
        assert_eq!(tick, 10);
    }
}
