use std::env;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use ev_demand::runner::JobKind;
use ev_demand::timegrid::parse_timestamp;

/// What to run: one job, or every job in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Job(JobKind),
    Run,
}

impl Command {
    pub fn jobs(self) -> Vec<JobKind> {
        match self {
            Self::Job(kind) => vec![kind],
            Self::Run => JobKind::ALL.to_vec(),
        }
    }

    fn needs_source(self) -> bool {
        matches!(self, Self::Run | Self::Job(JobKind::Ingest))
    }
}

/// Where raw session records come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceArg {
    Records(PathBuf),
    Demo,
}

#[derive(Debug)]
pub struct CliOptions {
    pub command: Command,
    pub config: Option<PathBuf>,
    pub preset: Option<String>,
    pub source: Option<SourceArg>,
    pub seed: Option<u64>,
    pub days: Option<u32>,
    pub store: Option<PathBuf>,
    pub export: Option<PathBuf>,
    pub as_of: Option<NaiveDateTime>,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    if args.is_empty() || (args.len() == 1 && (args[0] == "--help" || args[0] == "-h")) {
        print_usage();
        std::process::exit(if args.is_empty() { 2 } else { 0 });
    }
    parse_options(&args)
}

fn parse_command(name: &str) -> Result<Command, String> {
    if name == "run" {
        return Ok(Command::Run);
    }
    JobKind::parse(name)
        .map(Command::Job)
        .ok_or_else(|| format!("unknown command: {name}"))
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let command = parse_command(&args[0])?;
    let mut i = 1usize;
    let mut config = None;
    let mut preset = None;
    let mut records = None;
    let mut demo = false;
    let mut seed = None;
    let mut days = None;
    let mut store = None;
    let mut export = None;
    let mut as_of = None;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --config (expected a TOML file path)")?;
                if config.replace(PathBuf::from(path)).is_some() {
                    return Err("--config provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name = args.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                if preset.replace(name.to_string()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--records" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --records (expected a CSV file path)")?;
                if records.replace(PathBuf::from(path)).is_some() {
                    return Err("--records provided more than once".to_string());
                }
            }
            "--demo" => demo = true,
            "--seed" => {
                i += 1;
                let value = args.next_or_err(i, "missing value for --seed (expected a u64)")?;
                let parsed = value
                    .parse::<u64>()
                    .map_err(|_| format!("--seed value \"{value}\" is not a valid u64"))?;
                seed = Some(parsed);
            }
            "--days" => {
                i += 1;
                let value = args.next_or_err(i, "missing value for --days (expected a day count)")?;
                let parsed = value
                    .parse::<u32>()
                    .ok()
                    .filter(|d| *d > 0)
                    .ok_or_else(|| format!("--days value \"{value}\" is not a positive integer"))?;
                days = Some(parsed);
            }
            "--store" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --store (expected a directory)")?;
                store = Some(PathBuf::from(path));
            }
            "--export" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --export (expected a directory)")?;
                export = Some(PathBuf::from(path));
            }
            "--as-of" => {
                i += 1;
                let value = args.next_or_err(i, "missing value for --as-of (expected a timestamp)")?;
                let parsed = parse_timestamp(value)
                    .ok_or_else(|| format!("--as-of value \"{value}\" is not a timestamp"))?;
                as_of = Some(parsed);
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if config.is_some() && preset.is_some() {
        return Err(
            "arguments `--config` and `--preset` are mutually exclusive; choose one source".to_string(),
        );
    }

    let source = match (records, demo) {
        (Some(_), true) => {
            return Err("arguments `--records` and `--demo` are mutually exclusive".to_string());
        }
        (Some(path), false) => Some(SourceArg::Records(path)),
        (None, true) => Some(SourceArg::Demo),
        (None, false) => None,
    };
    if source.is_none() && command.needs_source() {
        return Err("ingestion needs a record source: pass --records <csv> or --demo".to_string());
    }
    if (seed.is_some() || days.is_some()) && source != Some(SourceArg::Demo) {
        return Err("`--seed` and `--days` only apply with --demo".to_string());
    }

    Ok(CliOptions {
        command,
        config,
        preset,
        source,
        seed,
        days,
        store,
        export,
        as_of,
    })
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  ev-demand <ingest|forecast-hourly|forecast-daily|revalidate|run> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>     Load engine config from a TOML file");
    eprintln!("  --preset <name>     Use a built-in preset (default, quick)");
    eprintln!("  --records <path>    Read session records from CSV");
    eprintln!("  --demo              Generate synthetic session records");
    eprintln!("  --seed <u64>        Seed for --demo (default 42)");
    eprintln!("  --days <n>          Days of --demo history (default 120)");
    eprintln!("  --store <dir>       Artifact store directory (overrides [store] dir)");
    eprintln!("  --export <dir>      Write grids and forecast histories as CSV");
    eprintln!("  --as-of <time>      Evaluation time (default: now)");
}
