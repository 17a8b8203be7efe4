//! EV demand engine entry point: CLI wiring and job dispatch.

mod cli;

use std::process;

use chrono::{Local, NaiveDateTime};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ev_demand::config::EngineConfig;
use ev_demand::grid::Granularity;
use ev_demand::io::export_all;
use ev_demand::reporting::print_grid_summary;
use ev_demand::runner::{JobOutcome, JobRunner};
use ev_demand::source::{CsvRecordSource, MemorySource, RecordSource, SyntheticSource};
use ev_demand::store::{ArtifactStore, FileStore};

use cli::{CliOptions, SourceArg};

const DEMO_SEED: u64 = 42;
const DEMO_DAYS: u32 = 120;

fn load_config(cli: &CliOptions) -> EngineConfig {
    // --config takes priority, then --preset, then defaults
    let loaded = if let Some(ref path) = cli.config {
        EngineConfig::from_toml_file(path)
    } else if let Some(ref name) = cli.preset {
        EngineConfig::from_preset(name)
    } else {
        Ok(EngineConfig::default())
    };
    let mut config = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(ref dir) = cli.store {
        config.store.dir = dir.clone();
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    config
}

fn build_source(cli: &CliOptions, as_of: NaiveDateTime) -> Box<dyn RecordSource> {
    match cli.source {
        Some(SourceArg::Records(ref path)) => Box::new(CsvRecordSource::new(path)),
        Some(SourceArg::Demo) => Box::new(SyntheticSource::new(
            cli.seed.unwrap_or(DEMO_SEED),
            as_of.date(),
            cli.days.unwrap_or(DEMO_DAYS),
        )),
        None => Box::new(MemorySource::default()),
    }
}

fn export<S: ArtifactStore>(runner: &JobRunner<S>, cli: &CliOptions) -> ev_demand::error::Result<()> {
    let Some(ref dir) = cli.export else {
        return Ok(());
    };
    let store = runner.store();
    let Some(grids) = store.get_grids()? else {
        eprintln!("nothing to export: no grids have been ingested yet");
        return Ok(());
    };
    let histories = [
        store.get_forecasts(Granularity::Hourly)?,
        store.get_forecasts(Granularity::Daily)?,
    ];
    let written = export_all(dir, &grids, &histories)?;
    info!(dir = %dir.display(), files = written.len(), "exports written");
    eprintln!("Exports written to {}", dir.display());
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::parse_args().unwrap_or_else(|e| {
        eprintln!("error: {e}");
        cli::print_usage();
        process::exit(2);
    });

    let config = load_config(&cli);
    let as_of = cli.as_of.unwrap_or_else(|| Local::now().naive_local());
    let mut source = build_source(&cli, as_of);
    let store = FileStore::new(config.store.dir.clone());
    let runner = JobRunner::new(config, store);

    for kind in cli.command.jobs() {
        match runner.run(kind, source.as_mut(), as_of) {
            Ok(outcome) => {
                println!("{outcome}");
                if let JobOutcome::Ingested(_) = outcome {
                    if let Ok(Some(grids)) = runner.store().get_grids() {
                        print_grid_summary(&grids);
                    }
                }
            }
            Err(e) => {
                eprintln!("error: {kind} failed: {e}");
                process::exit(1);
            }
        }
    }

    if let Err(e) = export(&runner, &cli) {
        eprintln!("error: failed to write exports: {e}");
        process::exit(1);
    }
}
