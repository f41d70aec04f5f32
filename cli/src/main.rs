//! Atlas CLI - grows a theory's atlas with cooperating worker processes.
//!
//! ```text
//! atlas explore <theory>
//!   |-- atlas cartographer-work <theory> --region-size R --region-queue-size Q
//!   |       trims regions -> region.queue, merges survey.queue -> world.h5
//!   `-- atlas survey-work <theory> --step-size S
//!           region.queue -> survey -> survey.queue
//! ```
//!
//! The workers are separate processes sharing only the atlas directory. The
//! parent supervises both and exits non-zero as soon as either fails.

mod commands;
mod logging;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use atlas_config::{
    AtlasSettings, DEFAULT_MAX_SIZE, DEFAULT_REGION_QUEUE_SIZE, DEFAULT_STEP_SIZE, ExploreConfig,
};
use atlas_engine::ConfiguredEngine;
use atlas_supervisor::SupervisorError;
use atlas_types::Theory;

use crate::commands::{DEFAULT_PROFILE_RUNNER, Session};
use crate::logging::{LogTarget, env_filter, init_tracing, resolve_target};

#[derive(Parser)]
#[command(name = "atlas", version)]
#[command(about = "Grow a theory's atlas by trimming, surveying and aggregating", long_about = None)]
struct Cli {
    /// Config file (default: $ATLAS_CONFIG or ~/.atlas/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Append logs to this file instead of <atlas>/<theory>/atlas.log
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `atlas_core=trace`
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy)]
struct ExploreArgs {
    /// Size every survey grows to
    #[arg(long, default_value_t = DEFAULT_MAX_SIZE)]
    max_size: usize,
    /// Items added to each region by a survey
    #[arg(long, default_value_t = DEFAULT_STEP_SIZE)]
    step_size: usize,
    /// Regions kept queued for the surveyor
    #[arg(long, default_value_t = DEFAULT_REGION_QUEUE_SIZE)]
    region_queue_size: usize,
}

impl From<ExploreArgs> for ExploreConfig {
    fn from(args: ExploreArgs) -> Self {
        Self {
            max_size: args.max_size,
            step_size: args.step_size,
            region_queue_size: args.region_queue_size,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create the atlas and an initial world of minimum size")]
    Init { theory: Theory },
    #[command(about = "Run the atlas worker forever")]
    CartographerWork {
        theory: Theory,
        #[arg(long)]
        region_size: usize,
        #[arg(long, default_value_t = DEFAULT_REGION_QUEUE_SIZE)]
        region_queue_size: usize,
    },
    #[command(about = "Run the survey worker forever")]
    SurveyWork {
        theory: Theory,
        #[arg(long, default_value_t = DEFAULT_STEP_SIZE)]
        step_size: usize,
    },
    #[command(about = "Supervise one atlas worker and one survey worker")]
    Explore {
        theory: Theory,
        #[command(flatten)]
        sizes: ExploreArgs,
    },
    #[command(about = "Initialize if needed, then explore")]
    Make {
        theory: Theory,
        #[command(flatten)]
        sizes: ExploreArgs,
    },
    #[command(about = "Write regions of geometrically spaced sizes from the world")]
    TrimRegions {
        theory: Theory,
        #[arg(long)]
        min_size: Option<usize>,
    },
    #[command(about = "Survey one region of the world under a profiler")]
    Profile {
        theory: Theory,
        /// Region size in blocks of 512 items (size = blocks * 512 - 1)
        #[arg(long, default_value_t = 3)]
        size_blocks: usize,
        /// Items the survey adds, in blocks of 512
        #[arg(long, default_value_t = 0)]
        dsize_blocks: usize,
        /// Command prefix for the engine's survey
        #[arg(long, default_value = DEFAULT_PROFILE_RUNNER)]
        runner: String,
    },
    #[command(about = "Check basic engine operations in a scratch atlas")]
    Test { theory: Theory },
    #[command(about = "Remove all work for a theory. DANGER")]
    Clean {
        theory: Theory,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

impl Commands {
    fn theory(&self) -> &Theory {
        match self {
            Commands::Init { theory }
            | Commands::CartographerWork { theory, .. }
            | Commands::SurveyWork { theory, .. }
            | Commands::Explore { theory, .. }
            | Commands::Make { theory, .. }
            | Commands::TrimRegions { theory, .. }
            | Commands::Profile { theory, .. }
            | Commands::Test { theory }
            | Commands::Clean { theory, .. } => theory,
        }
    }

    /// Log filter used when neither the flag nor the config sets one.
    fn default_log_level(&self) -> Option<&'static str> {
        match self {
            Commands::Profile { .. } => Some("debug"),
            _ => None,
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Global options for worker processes. Paths are made absolute so the
/// workers resolve them the same way regardless of their working directory.
fn forwarded_args(cli: &Cli, log: &LogTarget) -> Vec<OsString> {
    let mut args = Vec::new();
    if let Some(config) = &cli.config {
        args.push("--config".into());
        args.push(absolute(config).into());
    }
    if let LogTarget::File(path) = log {
        args.push("--log-file".into());
        args.push(absolute(path).into());
    }
    if let Some(level) = &cli.log_level {
        args.push("--log-level".into());
        args.push(level.into());
    }
    args
}

fn run(cli: &Cli) -> Result<()> {
    let settings = AtlasSettings::load(cli.config.as_deref()).context("invalid configuration")?;

    let theory = cli.command.theory();
    let layout = settings.layout(theory);
    let target = resolve_target(
        cli.log_file.as_deref(),
        settings.log.file.as_deref(),
        Some(&layout),
    );
    let level = cli
        .log_level
        .as_deref()
        .or(settings.log.level.as_deref())
        .or(cli.command.default_log_level());
    let filter = env_filter(level).with_context(|| format!("invalid log filter {level:?}"))?;
    let target = init_tracing(filter, target);

    let session = Session {
        engine: ConfiguredEngine::from_settings(&settings.engine),
        forwarded: forwarded_args(cli, &target),
        settings,
    };

    match &cli.command {
        Commands::Init { theory } => commands::init(&session, theory),
        Commands::CartographerWork {
            theory,
            region_size,
            region_queue_size,
        } => commands::cartographer_work(&session, theory, *region_size, *region_queue_size),
        Commands::SurveyWork { theory, step_size } => {
            commands::survey_work(&session, theory, *step_size)
        }
        Commands::Explore { theory, sizes } => {
            commands::explore(&session, theory, (*sizes).into())
        }
        Commands::Make { theory, sizes } => commands::make(&session, theory, (*sizes).into()),
        Commands::TrimRegions { theory, min_size } => {
            commands::trim_regions(&session, theory, *min_size)
        }
        Commands::Profile {
            theory,
            size_blocks,
            dsize_blocks,
            runner,
        } => commands::profile(&session, theory, *size_blocks, *dsize_blocks, runner),
        Commands::Test { theory } => commands::test(&session, theory),
        Commands::Clean { theory, yes } => commands::clean(&session, theory, *yes),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

/// A worker's own non-zero exit code passes through the supervisor.
fn exit_status(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SupervisorError>())
        .and_then(SupervisorError::exit_code)
        .and_then(|code| u8::try_from(code).ok())
        .filter(|&code| code != 0)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use atlas_supervisor::SupervisorError;

    use super::exit_status;

    #[test]
    fn failed_worker_exit_codes_pass_through() {
        let failed: anyhow::Result<()> = Err(SupervisorError::ChildFailed {
            command: "atlas survey-work sk".into(),
            code: Some(3),
            status: "exit status: 3".into(),
        })
        .context("exploration stopped");
        assert_eq!(exit_status(&failed.unwrap_err()), 3);

        let killed = anyhow::Error::new(SupervisorError::ChildFailed {
            command: "atlas survey-work sk".into(),
            code: None,
            status: "signal: 9 (SIGKILL)".into(),
        });
        assert_eq!(exit_status(&killed), 1);
        assert_eq!(exit_status(&anyhow::anyhow!("bad config")), 1);
    }
}
