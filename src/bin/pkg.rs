//! `pkg`: a thin CLI over the operations in `pkgcore::ops`, exposing the
//! §4.8 surface (add/rm/update/pin/free/develop/instantiate/resolve/gc).

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use pkgcore::context::Context;
use pkgcore::external::TracingShell;
use pkgcore::ops::{Environment, UpdateLevel};

#[derive(Parser)]
#[command(name = "pkg", about = "Resolve and instantiate package environments")]
struct Cli {
    /// Directory holding `Project.toml`; defaults to the current directory.
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add one or more `name=uuid` requirements and resolve.
    Add { specs: Vec<NameUuid> },
    /// Remove one or more named requirements and resolve.
    Rm { names: Vec<String> },
    /// Re-resolve, relaxing named targets (or everything) to `level`.
    Update {
        names: Vec<String>,
        #[arg(long, value_enum, default_value = "minor")]
        level: UpdateLevelArg,
    },
    /// Pin named dependencies to their currently-resolved version.
    Pin { names: Vec<String> },
    /// Lift a pin, allowing the named dependencies to move again.
    Free { names: Vec<String> },
    /// Ensure every manifest entry exists in the depot.
    Instantiate,
    /// Re-resolve only if the project has changed since the last resolve.
    Resolve,
    /// Collect unreferenced depot entries older than `--collect-delay-secs`.
    Gc {
        #[arg(long, default_value_t = 30 * 24 * 3600)]
        collect_delay_secs: u64,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum UpdateLevelArg {
    Fixed,
    Patch,
    Minor,
    Major,
}

impl From<UpdateLevelArg> for UpdateLevel {
    fn from(level: UpdateLevelArg) -> Self {
        match level {
            UpdateLevelArg::Fixed => UpdateLevel::Fixed,
            UpdateLevelArg::Patch => UpdateLevel::Patch,
            UpdateLevelArg::Minor => UpdateLevel::Minor,
            UpdateLevelArg::Major => UpdateLevel::Major,
        }
    }
}

#[derive(Clone)]
struct NameUuid {
    name: String,
    uuid: Uuid,
}

impl std::str::FromStr for NameUuid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, uuid) = s
            .split_once('=')
            .ok_or_else(|| format!("expected `name=uuid`, got `{s}`"))?;
        let uuid = Uuid::parse_str(uuid).map_err(|e| e.to_string())?;
        Ok(NameUuid {
            name: name.to_string(),
            uuid,
        })
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run() {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let project_dir = cli
        .project
        .unwrap_or_else(|| std::env::current_dir().expect("current directory"));
    let context = Context::from_env();
    let mut env = Environment::load(&project_dir, context)?;
    let shell = TracingShell;

    match cli.command {
        Command::Add { specs } => {
            let specs: Vec<(String, Uuid)> = specs.into_iter().map(|s| (s.name, s.uuid)).collect();
            env.add(&specs, &NoopFetcher, &shell)?;
        }
        Command::Rm { names } => {
            env.rm(&names, &NoopFetcher, &shell)?;
        }
        Command::Update { names, level } => {
            env.update(&names, level.into(), &NoopFetcher, &shell)?;
        }
        Command::Pin { names } => {
            env.set_pinned(&names, true, &NoopFetcher, &shell)?;
        }
        Command::Free { names } => {
            env.set_pinned(&names, false, &NoopFetcher, &shell)?;
        }
        Command::Instantiate => {
            env.instantiate(&NoopFetcher, &shell)?;
        }
        Command::Resolve => {
            env.resolve(&NoopFetcher, &shell)?;
        }
        Command::Gc {
            collect_delay_secs,
            dry_run,
        } => {
            let report = env.gc(Duration::from_secs(collect_delay_secs), dry_run)?;
            tracing::info!(
                removed = report.removed.len(),
                pruned_manifests = report.pruned_manifests.len(),
                "gc complete"
            );
        }
    }
    Ok(())
}

/// The CLI doesn't yet wire in a real HTTPS client; operations that need
/// one fail with a clear error rather than silently doing nothing.
struct NoopFetcher;

impl pkgcore::external::Fetcher for NoopFetcher {
    fn get(&self, url: &url::Url) -> Result<Vec<u8>, pkgcore::external::FetchError> {
        Err(pkgcore::external::FetchError::Http {
            url: url.to_string(),
            status: 0,
        })
    }
}
