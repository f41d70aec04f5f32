//! One function per subcommand.

use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use atlas_config::{AtlasLayout, AtlasSettings, ConfigError, ExploreConfig};
use atlas_core::{AtlasWorker, CartographerConfig, Sleeper, SurveyWorker};
use atlas_engine::{AtlasEngine, ConfiguredEngine, WorldHandle};
use atlas_supervisor::{Orchestrator, Shutdown};
use atlas_types::{Theory, region_sizes};
use atlas_utils::{FileLock, commit_file, file_digest};
use tracing::{info, warn};

/// Everything a command needs besides its own arguments.
#[derive(Debug)]
pub struct Session {
    pub settings: AtlasSettings,
    pub engine: ConfiguredEngine,
    /// Global options, replayed on the command line of every worker process.
    pub forwarded: Vec<OsString>,
}

impl Session {
    fn layout(&self, theory: &Theory) -> AtlasLayout {
        self.settings.layout(theory)
    }

    fn sleeper(&self) -> Sleeper {
        Sleeper::new(self.settings.poll_unit)
    }
}

/// Items per block of the `profile` region sizes.
const BLOCK_SIZE: usize = 512;

pub const DEFAULT_PROFILE_RUNNER: &str = "valgrind --tool=callgrind";

fn session_lock(layout: &AtlasLayout) -> Result<FileLock> {
    let path = layout.session_lock();
    FileLock::try_acquire(&path)
        .with_context(|| format!("atlas {} is in use", layout.dir().display()))
}

/// The role lock of the atlas worker, for one-shot commands that trim the
/// world the way it does.
fn cartographer_lock(layout: &AtlasLayout) -> Result<FileLock> {
    let path = layout.cartographer_lock();
    FileLock::try_acquire(&path)
        .with_context(|| format!("a cartographer is running in {}", layout.dir().display()))
}

pub fn init(session: &Session, theory: &Theory) -> Result<()> {
    let layout = session.layout(theory);
    layout.require_uninitialized()?;
    create_atlas_dir(&layout)?;
    let _lock = session_lock(&layout)?;

    let size = session.settings.min_size(theory);
    info!(theory = %theory, "initialize to {size}");
    let scratch = layout.scratch("init");
    session.engine.init(theory, &scratch, size)?;
    {
        let mut world = session.engine.connect(theory, &scratch)?;
        world.validate().context("initial world failed validation")?;
    }
    commit_file(&scratch, layout.world())
        .with_context(|| format!("failed to write {}", layout.world().display()))?;
    Ok(())
}

/// Create the atlas directory itself exclusively, so of two racing `init`s
/// only one proceeds.
fn create_atlas_dir(layout: &AtlasLayout) -> Result<()> {
    if let Some(root) = layout.dir().parent() {
        fs::create_dir_all(root)
            .with_context(|| format!("failed to create {}", root.display()))?;
    }
    match fs::create_dir(layout.dir()) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(ConfigError::AlreadyInitialized {
                path: layout.dir().to_path_buf(),
            }
            .into());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to create {}", layout.dir().display()));
        }
    }
    Ok(())
}

pub fn cartographer_work(
    session: &Session,
    theory: &Theory,
    region_size: usize,
    region_queue_size: usize,
) -> Result<()> {
    ensure!(region_size > 0, "--region-size must be > 0");
    ensure!(region_queue_size > 0, "--region-queue-size must be > 0");
    let layout = session.layout(theory);
    layout.require_initialized()?;

    let config = CartographerConfig {
        region_size,
        region_queue_size,
    };
    let mut worker = AtlasWorker::start(
        &session.engine,
        theory.clone(),
        layout,
        config,
        session.sleeper(),
    )?;
    let Err(err) = worker.run();
    Err(err).context("cartographer stopped")
}

pub fn survey_work(session: &Session, theory: &Theory, step_size: usize) -> Result<()> {
    ensure!(step_size > 0, "--step-size must be > 0");
    let layout = session.layout(theory);
    layout.require_initialized()?;

    let mut worker = SurveyWorker::start(
        session.engine.clone(),
        theory.clone(),
        layout,
        step_size,
        session.sleeper(),
    )?;
    let Err(err) = worker.run();
    Err(err).context("surveyor stopped")
}

/// Run one cartographer and one surveyor until either fails or the user
/// interrupts.
pub fn explore(session: &Session, theory: &Theory, config: ExploreConfig) -> Result<()> {
    let plan = config.plan(session.settings.min_size(theory))?;
    let layout = session.layout(theory);
    layout.require_initialized()?;
    let _lock = session_lock(&layout)?;

    info!(
        theory = %theory,
        max_size = config.max_size,
        step_size = plan.step_size(),
        region_size = plan.region_size(),
        region_queue_size = plan.region_queue_size(),
        "Exploring"
    );

    let exe = std::env::current_exe().context("cannot locate the atlas executable")?;
    let cartographer = worker_args(
        &session.forwarded,
        "cartographer-work",
        theory,
        &[
            ("--region-size", plan.region_size()),
            ("--region-queue-size", plan.region_queue_size()),
        ],
    );
    let surveyor = worker_args(
        &session.forwarded,
        "survey-work",
        theory,
        &[("--step-size", plan.step_size())],
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the supervisor runtime")?;
    let outcome = runtime.block_on(async {
        let mut orchestrator = Orchestrator::new();
        orchestrator.launch(&exe, cartographer)?;
        orchestrator.launch(&exe, surveyor)?;
        orchestrator.wait().await
    })?;
    match outcome {
        Shutdown::Completed => info!(theory = %theory, "Workers exited"),
        Shutdown::Interrupted => info!(theory = %theory, "Exploration interrupted"),
    }
    Ok(())
}

fn worker_args(
    forwarded: &[OsString],
    command: &str,
    theory: &Theory,
    sizes: &[(&str, usize)],
) -> Vec<OsString> {
    let mut args = forwarded.to_vec();
    args.push(command.into());
    args.push(theory.as_str().into());
    for (flag, value) in sizes {
        args.push((*flag).into());
        args.push(value.to_string().into());
    }
    args
}

pub fn make(session: &Session, theory: &Theory, config: ExploreConfig) -> Result<()> {
    if !session.layout(theory).exists() {
        init(session, theory)?;
    }
    explore(session, theory, config)
}

/// Write regions of every scheduled size below the current world size.
pub fn trim_regions(session: &Session, theory: &Theory, min_size: Option<usize>) -> Result<()> {
    let layout = session.layout(theory);
    layout.require_initialized()?;
    let _role = cartographer_lock(&layout)?;
    let min_size = min_size.unwrap_or_else(|| session.settings.min_size(theory));

    let mut world = session.engine.connect(theory, &layout.world())?;
    world.validate()?;
    let world_size = world.item_count()?;
    let sizes = region_sizes(min_size, world_size);
    if sizes.is_empty() {
        warn!(min_size, world_size, "No region sizes fit below the world size");
        return Ok(());
    }

    fs::create_dir_all(layout.regions_dir())?;
    for size in sizes {
        let scratch = layout.scratch(&format!("region.{size}"));
        world.trim(size, std::slice::from_ref(&scratch))?;
        let region = layout.region(size);
        commit_file(&scratch, &region)
            .with_context(|| format!("failed to write {}", region.display()))?;
        info!(size, path = %region.display(), "Trimmed region");
    }
    Ok(())
}

/// Survey one region of `size_blocks * 512 - 1` items under `runner`.
///
/// The region is trimmed from the world only if `regions/region.{size}.h5`
/// does not exist yet, so repeated runs profile the same input.
pub fn profile(
    session: &Session,
    theory: &Theory,
    size_blocks: usize,
    dsize_blocks: usize,
    runner: &str,
) -> Result<()> {
    ensure!(size_blocks > 0, "--size-blocks must be > 0");
    let size = size_blocks * BLOCK_SIZE - 1;
    let target = size + dsize_blocks * BLOCK_SIZE;
    let min_size = session.settings.min_size(theory);
    ensure!(
        size >= min_size,
        "region size {size} is below the theory minimum {min_size}"
    );
    let layout = session.layout(theory);
    layout.require_initialized()?;

    let region = layout.region(size);
    if !region.exists() {
        let _role = cartographer_lock(&layout)?;
        fs::create_dir_all(layout.regions_dir())?;
        let scratch = layout.scratch(&format!("region.{size}"));
        session
            .engine
            .connect(theory, &layout.world())?
            .trim(size, std::slice::from_ref(&scratch))?;
        commit_file(&scratch, &region)
            .with_context(|| format!("failed to write {}", region.display()))?;
        info!(size, path = %region.display(), "Trimmed region");
    }

    let runner: Vec<String> = runner.split_whitespace().map(String::from).collect();
    let engine = match &session.engine {
        ConfiguredEngine::Command(engine) => {
            ConfiguredEngine::Command(engine.clone().with_runner(runner))
        }
        builtin @ ConfiguredEngine::Builtin(_) => {
            warn!("The builtin engine runs in process; surveying without a runner");
            builtin.clone()
        }
    };
    let output = layout.scratch("profile");
    info!(theory = %theory, size, target, "Profiling survey");
    engine.survey(theory, &region, &output, target)?;
    info!(item_count = engine.item_count(&output)?, path = %output.display(), "Profile survey done");
    Ok(())
}

/// Exercise init, copy, survey, trim and aggregate in a scratch atlas and
/// check that merging in either order gives the same world.
pub fn test(session: &Session, theory: &Theory) -> Result<()> {
    let dir = session.settings.root.join(format!("{theory}.test"));
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let layout = AtlasLayout::at(&dir);
    let lock = session_lock(&layout)?;
    clear_dir(&dir, lock.path())?;

    let min_size = session.settings.min_size(theory);
    let step = (1 + min_size).min(512);
    let sizes = [min_size, min_size + step];
    let file = |i: usize| dir.join(format!("{i}.h5"));
    let engine = &session.engine;

    info!(theory = %theory, sizes = ?sizes, "Testing engine operations");
    engine.init(theory, &file(0), sizes[0])?;
    copy(engine, theory, &file(0), &file(1))?;
    engine.survey(theory, &file(1), &file(2), sizes[1])?;
    engine
        .connect(theory, &file(2))?
        .trim(sizes[0], &[file(3)])?;
    engine.survey(theory, &file(3), &file(4), sizes[1])?;
    aggregate(engine, theory, &file(2), &file(4), &file(5))?;
    aggregate(engine, theory, &file(5), &file(0), &file(6))?;

    let digest5 = file_digest(file(5))?;
    let digest6 = file_digest(file(6))?;
    if digest5 != digest6 {
        bail!("aggregating a subsumed world changed it: {digest5} != {digest6}");
    }
    info!(theory = %theory, digest = %digest5, "Test passed");
    Ok(())
}

fn clear_dir(dir: &Path, keep: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path == keep {
            continue;
        }
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Validated copy of a snapshot.
fn copy(engine: &ConfiguredEngine, theory: &Theory, src: &Path, dest: &Path) -> Result<()> {
    let mut world = engine.connect(theory, src)?;
    world.validate()?;
    world.dump(dest)?;
    Ok(())
}

fn aggregate(
    engine: &ConfiguredEngine,
    theory: &Theory,
    base: &Path,
    other: &Path,
    dest: &Path,
) -> Result<()> {
    let mut world = engine.connect(theory, base)?;
    world.aggregate(other)?;
    world.validate()?;
    world.dump(dest)?;
    Ok(())
}

/// Delete the theory's atlas after confirmation.
pub fn clean(session: &Session, theory: &Theory, yes: bool) -> Result<()> {
    let layout = session.layout(theory);
    if !layout.exists() {
        info!(path = %layout.dir().display(), "Nothing to clean");
        return Ok(());
    }
    if !yes && !confirm(&mut io::stdin().lock(), &mut io::stdout())? {
        return Ok(());
    }
    let _lock = session_lock(&layout)?;
    fs::remove_dir_all(layout.dir())
        .with_context(|| format!("failed to remove {}", layout.dir().display()))?;
    info!(path = %layout.dir().display(), "Removed atlas");
    Ok(())
}

fn confirm(input: &mut impl BufRead, output: &mut impl Write) -> io::Result<bool> {
    write!(output, "Are you sure? [Y/n] ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim_start().to_ascii_lowercase().starts_with('y'))
}
