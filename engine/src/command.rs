//! Adapter for an external engine program.
//!
//! Every contract operation is one invocation of
//! `[runner...] <program> <operation> <args...>`:
//!
//! | operation   | arguments                          | stdout        |
//! |-------------|------------------------------------|---------------|
//! | `init`      | `THEORY OUT SIZE`                  |               |
//! | `survey`    | `THEORY REGION OUT SIZE`           |               |
//! | `count`     | `PATH`                             | item count    |
//! | `trim`      | `THEORY WORLD SIZE OUT...`         |               |
//! | `infer`     | `THEORY IN OUT PRIORITY`           | `true`/`false`|
//! | `validate`  | `THEORY PATH`                      |               |
//! | `aggregate` | `THEORY IN OTHER OUT`              |               |
//!
//! A non-zero exit is a failure; for `validate` it means the model is
//! inconsistent. The live world of a [`CommandWorld`] is a private working
//! copy next to the world file (`temp.live.<random>.h5`, unique per handle);
//! operations that change it write a successor file which is then renamed
//! over the working copy.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use atlas_types::{ITEM_EXTENSION, SCRATCH_PREFIX, Theory};
use atlas_utils::{atomic_copy, commit_file};
use tempfile::Builder;
use tracing::{debug, warn};

use crate::{AtlasEngine, EngineError, WorldHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEngine {
    program: String,
    runner: Vec<String>,
}

impl CommandEngine {
    #[must_use]
    pub fn new(program: impl Into<String>, runner: Vec<String>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Same program under a different runner prefix.
    #[must_use]
    pub fn with_runner(self, runner: Vec<String>) -> Self {
        Self { runner, ..self }
    }

    fn command(&self, operation: &str, args: &[&OsStr]) -> Command {
        let mut cmd = match self.runner.split_first() {
            Some((head, rest)) => {
                let mut cmd = Command::new(head);
                cmd.args(rest).arg(&self.program);
                cmd
            }
            None => Command::new(&self.program),
        };
        cmd.arg(operation).args(args);
        cmd
    }

    fn render(&self, operation: &str, args: &[&OsStr]) -> String {
        let mut parts: Vec<String> = self.runner.clone();
        parts.push(self.program.clone());
        parts.push(operation.to_string());
        parts.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    fn output(&self, operation: &str, args: &[&OsStr]) -> Result<(String, Output), EngineError> {
        let rendered = self.render(operation, args);
        debug!(command = %rendered, "Running engine");
        let output = self
            .command(operation, args)
            .output()
            .map_err(|source| EngineError::Spawn {
                command: rendered.clone(),
                source,
            })?;
        Ok((rendered, output))
    }

    fn run(&self, operation: &str, args: &[&OsStr]) -> Result<String, EngineError> {
        let (rendered, output) = self.output(operation, args)?;
        if !output.status.success() {
            return Err(EngineError::Command {
                command: rendered,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn parse<T: std::str::FromStr>(
        &self,
        operation: &str,
        args: &[&OsStr],
        stdout: String,
    ) -> Result<T, EngineError> {
        stdout.parse::<T>().map_err(|_err| EngineError::Protocol {
            command: self.render(operation, args),
            output: stdout,
        })
    }
}

fn size_arg(size: usize) -> OsString {
    OsString::from(size.to_string())
}

impl AtlasEngine for CommandEngine {
    type Handle = CommandWorld;

    fn init(&self, theory: &Theory, world: &Path, size: usize) -> Result<(), EngineError> {
        let size = size_arg(size);
        self.run(
            "init",
            &[OsStr::new(theory.as_str()), world.as_os_str(), size.as_os_str()],
        )?;
        Ok(())
    }

    fn connect(&self, theory: &Theory, world: &Path) -> Result<CommandWorld, EngineError> {
        let dir = match world.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let working = Builder::new()
            .prefix(&format!("{SCRATCH_PREFIX}live."))
            .suffix(&format!(".{ITEM_EXTENSION}"))
            .tempfile_in(dir)
            .map_err(|e| EngineError::io(dir, e))?
            .into_temp_path()
            .keep()
            .map_err(|e| EngineError::io(dir, e.error))?;
        let next = working.with_extension(format!("next.{ITEM_EXTENSION}"));
        if let Err(e) = atomic_copy(world, &working) {
            if let Err(cleanup) = fs::remove_file(&working) {
                warn!(path = %working.display(), "Failed to remove engine scratch file: {cleanup}");
            }
            return Err(EngineError::io(world, e));
        }
        debug!(world = %world.display(), working = %working.display(), "Connected to world");
        Ok(CommandWorld {
            engine: self.clone(),
            theory: theory.clone(),
            working,
            next,
        })
    }

    fn survey(
        &self,
        theory: &Theory,
        region: &Path,
        survey: &Path,
        target_size: usize,
    ) -> Result<(), EngineError> {
        let size = size_arg(target_size);
        self.run(
            "survey",
            &[
                OsStr::new(theory.as_str()),
                region.as_os_str(),
                survey.as_os_str(),
                size.as_os_str(),
            ],
        )?;
        Ok(())
    }

    fn item_count(&self, path: &Path) -> Result<usize, EngineError> {
        let args = [path.as_os_str()];
        let stdout = self.run("count", &args)?;
        self.parse("count", &args, stdout)
    }
}

/// Live world of a [`CommandEngine`], held as a private working copy.
#[derive(Debug)]
pub struct CommandWorld {
    engine: CommandEngine,
    theory: Theory,
    working: PathBuf,
    next: PathBuf,
}

impl CommandWorld {
    fn commit_next(&self) -> Result<(), EngineError> {
        commit_file(&self.next, &self.working).map_err(|e| EngineError::io(&self.working, e))
    }
}

impl WorldHandle for CommandWorld {
    fn trim(&mut self, size: usize, outputs: &[PathBuf]) -> Result<(), EngineError> {
        let size = size_arg(size);
        let mut args: Vec<&OsStr> = vec![
            OsStr::new(self.theory.as_str()),
            self.working.as_os_str(),
            size.as_os_str(),
        ];
        args.extend(outputs.iter().map(|p| p.as_os_str()));
        self.engine.run("trim", &args)?;
        Ok(())
    }

    fn infer(&mut self, priority: u8) -> Result<bool, EngineError> {
        let priority = OsString::from(priority.to_string());
        let args: [&OsStr; 4] = [
            OsStr::new(self.theory.as_str()),
            self.working.as_os_str(),
            self.next.as_os_str(),
            priority.as_os_str(),
        ];
        let stdout = self.engine.run("infer", &args)?;
        let progress: bool = self.engine.parse("infer", &args, stdout)?;
        if progress {
            self.commit_next()?;
        } else if self.next.exists()
            && let Err(e) = fs::remove_file(&self.next)
        {
            warn!(path = %self.next.display(), "Failed to remove engine scratch file: {e}");
        }
        Ok(progress)
    }

    fn validate(&mut self) -> Result<(), EngineError> {
        let args: [&OsStr; 2] = [OsStr::new(self.theory.as_str()), self.working.as_os_str()];
        match self.engine.run("validate", &args) {
            Ok(_) => Ok(()),
            Err(EngineError::Command { command, stderr, .. }) => {
                Err(EngineError::Invalid(format!("{command}: {stderr}")))
            }
            Err(err) => Err(err),
        }
    }

    fn dump(&mut self, path: &Path) -> Result<(), EngineError> {
        atomic_copy(&self.working, path).map_err(|e| EngineError::io(path, e))?;
        Ok(())
    }

    fn aggregate(&mut self, path: &Path) -> Result<(), EngineError> {
        let args: [&OsStr; 4] = [
            OsStr::new(self.theory.as_str()),
            self.working.as_os_str(),
            path.as_os_str(),
            self.next.as_os_str(),
        ];
        self.engine.run("aggregate", &args)?;
        self.commit_next()
    }

    fn item_count(&mut self) -> Result<usize, EngineError> {
        self.engine.item_count(&self.working)
    }
}

impl Drop for CommandWorld {
    fn drop(&mut self) {
        for path in [&self.working, &self.next] {
            if path.exists()
                && let Err(e) = fs::remove_file(path)
            {
                warn!(path = %path.display(), "Failed to remove engine scratch file: {e}");
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use atlas_types::Theory;

    use super::CommandEngine;
    use crate::{AtlasEngine, EngineError, WorldHandle};

    /// Fake engine program: snapshots are files with one line per item.
    const FAKE_ENGINE: &str = r#"#!/bin/sh
op="$1"; shift
case "$op" in
  init) seq 1 "$3" > "$2" ;;
  count) wc -l < "$1" | tr -d ' ' ;;
  survey) cp "$2" "$3"; n=$(wc -l < "$2"); while [ "$n" -lt "$4" ]; do n=$((n+1)); echo "$n" >> "$3"; done ;;
  trim) theory="$1"; world="$2"; size="$3"; shift 3; for out in "$@"; do head -n "$size" "$world" > "$out"; done ;;
  infer) cp "$2" "$3"; echo false ;;
  validate) test -s "$2" || { echo empty >&2; exit 1; } ;;
  aggregate) sort -n -u "$2" "$3" > "$4" ;;
  *) exit 64 ;;
esac
"#;

    fn fake_engine(dir: &Path) -> CommandEngine {
        let program = dir.join("fake-engine");
        fs::write(&program, FAKE_ENGINE).expect("write");
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).expect("chmod");
        CommandEngine::new(program.to_string_lossy(), Vec::new())
    }

    #[test]
    fn runs_each_operation_through_the_program() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = fake_engine(dir.path());
        let theory = Theory::new("sk").unwrap();
        let world = dir.path().join("world.h5");

        engine.init(&theory, &world, 5).expect("init");
        assert_eq!(engine.item_count(&world).expect("count"), 5);

        let survey = dir.path().join("survey.h5");
        engine.survey(&theory, &world, &survey, 8).expect("survey");
        assert_eq!(engine.item_count(&survey).expect("count"), 8);

        let mut handle = engine.connect(&theory, &world).expect("connect");
        let outputs: Vec<PathBuf> = (0..2).map(|i| dir.path().join(format!("r{i}.h5"))).collect();
        handle.trim(3, &outputs).expect("trim");
        assert_eq!(engine.item_count(&outputs[1]).expect("count"), 3);

        assert!(!handle.infer(0).expect("infer"));
        handle.aggregate(&survey).expect("aggregate");
        handle.validate().expect("validate");
        assert_eq!(handle.item_count().expect("count"), 8);

        let dumped = dir.path().join("dumped.h5");
        handle.dump(&dumped).expect("dump");
        assert_eq!(engine.item_count(&dumped).expect("count"), 8);

        drop(handle);
        assert!(live_copies(dir.path()).is_empty());
    }

    fn live_copies(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("temp.live."))
            .collect()
    }

    #[test]
    fn handles_on_one_world_do_not_share_a_working_copy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = fake_engine(dir.path());
        let theory = Theory::new("sk").unwrap();
        let world = dir.path().join("world.h5");
        engine.init(&theory, &world, 6).expect("init");

        let mut first = engine.connect(&theory, &world).expect("connect");
        {
            let mut second = engine.connect(&theory, &world).expect("connect");
            assert_eq!(live_copies(dir.path()).len(), 2);
            let out = dir.path().join("second.h5");
            second.trim(2, std::slice::from_ref(&out)).expect("trim");
            assert_eq!(engine.item_count(&out).expect("count"), 2);
        }
        assert_eq!(live_copies(dir.path()).len(), 1);

        let out = dir.path().join("first.h5");
        first.trim(4, std::slice::from_ref(&out)).expect("trim after sibling dropped");
        assert_eq!(engine.item_count(&out).expect("count"), 4);
        first.validate().expect("validate");
        assert_eq!(first.item_count().expect("count"), 6);
    }

    #[test]
    fn with_runner_replaces_the_prefix() {
        let engine = CommandEngine::new("eng", vec!["nice".into()])
            .with_runner(vec!["valgrind".into(), "--tool=callgrind".into()]);
        let rendered = engine.render("count", &[Path::new("w.h5").as_os_str()]);
        assert_eq!(rendered, "valgrind --tool=callgrind eng count w.h5");
    }

    #[test]
    fn failures_carry_the_command_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = fake_engine(dir.path());
        let theory = Theory::new("sk").unwrap();
        let world = dir.path().join("world.h5");
        fs::write(&world, b"").expect("write");

        let mut handle = engine.connect(&theory, &world).expect("connect");
        let err = handle.validate().expect_err("empty world");
        assert!(matches!(err, EngineError::Invalid(ref msg) if msg.contains("validate")));

        let missing = CommandEngine::new("/nonexistent/atlas-engine", Vec::new());
        assert!(matches!(
            missing.item_count(&world),
            Err(EngineError::Spawn { .. })
        ));
    }

    #[test]
    fn runner_prefixes_the_program() {
        let engine = CommandEngine::new("eng", vec!["nice".into(), "-n".into(), "5".into()]);
        let rendered = engine.render("count", &[Path::new("w.h5").as_os_str()]);
        assert_eq!(rendered, "nice -n 5 eng count w.h5");
    }
}
