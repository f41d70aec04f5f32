//! The `atlas` binary end to end, against the builtin engine.

use std::fs;
use std::io::Write;
use std::process::Stdio;
use std::time::{Duration, Instant};

use atlas_utils::FileLock;

use crate::common::{MIN_SIZE, TestAtlas, items, write_world};

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn init_writes_a_minimal_world_once() {
    let atlas = TestAtlas::new();
    let output = atlas.run(["init", "sk"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let world = items(&atlas.layout().world());
    assert_eq!(world.len(), MIN_SIZE);
    assert!(atlas.log().contains(&format!("initialize to {MIN_SIZE}")));

    let again = atlas.run(["init", "sk"]);
    assert!(!again.status.success());
    assert!(stderr(&again).contains("already been initialized"));
}

#[test]
fn workers_refuse_an_uninitialized_atlas() {
    let atlas = TestAtlas::new();
    let output = atlas.run(["survey-work", "sk", "--step-size", "4"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("atlas init"));
}

#[test]
fn invalid_theory_names_are_rejected() {
    let atlas = TestAtlas::new();
    let output = atlas.run(["init", "../etc"]);
    assert!(!output.status.success());
}

#[test]
fn invalid_log_filters_are_fatal() {
    let atlas = TestAtlas::new();
    let output = atlas.run(["--log-level", "atlas_core=loud", "init", "sk"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid log filter"));
    assert!(!atlas.layout().dir().exists());
}

#[test]
fn explore_validates_sizes_before_spawning() {
    let atlas = TestAtlas::new();
    assert!(atlas.run(["init", "sk"]).status.success());

    let output = atlas.run(["explore", "sk", "--max-size", "6", "--step-size", "4"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("below the theory minimum"));

    let output = atlas.run(["explore", "sk", "--step-size", "0"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("step_size"));
}

#[test]
fn trim_regions_writes_the_size_schedule() {
    let atlas = TestAtlas::new();
    let layout = atlas.layout();
    write_world(&layout, &(1..=13).collect::<Vec<_>>());

    let output = atlas.run(["trim-regions", "sk", "--min-size", "3"]);
    assert!(output.status.success(), "{}", stderr(&output));

    for size in [12, 8, 6, 4, 3] {
        assert_eq!(items(&layout.region(size)).len(), size, "region.{size}");
    }
    let count = fs::read_dir(layout.regions_dir()).expect("read_dir").count();
    assert_eq!(count, 5);
}

#[test]
fn trim_regions_waits_for_no_cartographer() {
    let atlas = TestAtlas::new();
    let layout = atlas.layout();
    write_world(&layout, &(1..=8).collect::<Vec<_>>());
    let role = FileLock::try_acquire(layout.cartographer_lock()).expect("role lock");

    let output = atlas.run(["trim-regions", "sk"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("cartographer is running"));
    assert!(!layout.regions_dir().exists());

    drop(role);
    assert!(atlas.run(["trim-regions", "sk"]).status.success());
}

#[test]
fn profile_surveys_one_region_and_reuses_it() {
    let atlas = TestAtlas::new();
    let layout = atlas.layout();
    write_world(&layout, &(1..=600).collect::<Vec<_>>());

    let args = ["profile", "sk", "--size-blocks", "1", "--dsize-blocks", "1"];
    let output = atlas.run(args);
    assert!(output.status.success(), "{}", stderr(&output));
    let region = layout.region(511);
    assert_eq!(items(&region).len(), 511);
    assert_eq!(items(&layout.scratch("profile")).len(), 1023);
    assert!(atlas.log().contains("Profiling survey"));

    // An existing region is surveyed as is, not trimmed again.
    let before = fs::read(&region).expect("read");
    write_world(&layout, &(1000..=2000).collect::<Vec<_>>());
    assert!(atlas.run(args).status.success());
    assert_eq!(fs::read(&region).expect("read"), before);

    let output = atlas.run(["profile", "sk", "--size-blocks", "0"]);
    assert!(!output.status.success());
}

#[test]
fn test_command_checks_aggregation_order() {
    let atlas = TestAtlas::new();
    let output = atlas.run(["test", "sk"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let dir = atlas.root().join("sk.test");
    let step = (MIN_SIZE + 1).min(512);
    assert_eq!(items(&dir.join("0.h5")).len(), MIN_SIZE);
    assert_eq!(items(&dir.join("6.h5")).len(), MIN_SIZE + step);
    assert_eq!(
        fs::read(dir.join("5.h5")).expect("read"),
        fs::read(dir.join("6.h5")).expect("read")
    );
}

#[test]
fn clean_asks_before_deleting() {
    let atlas = TestAtlas::new();
    assert!(atlas.run(["init", "sk"]).status.success());

    let mut child = atlas
        .command(["clean", "sk"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"n\n")
        .expect("answer");
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Are you sure? [Y/n]"));
    assert!(atlas.layout().world().exists());

    let output = atlas.run(["clean", "sk", "--yes"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(!atlas.layout().dir().exists());
}

#[cfg(target_os = "linux")]
#[test]
fn make_grows_the_world_until_stopped() {
    let atlas = TestAtlas::new();
    let mut parent = atlas
        .command([
            "make",
            "sk",
            "--max-size",
            "12",
            "--step-size",
            "4",
            "--region-queue-size",
            "2",
        ])
        .stdin(Stdio::null())
        .spawn()
        .expect("spawn");

    let world = atlas.layout().world();
    let deadline = Instant::now() + Duration::from_secs(30);
    let grown = loop {
        if let Ok(Some(status)) = parent.try_wait() {
            panic!("explore exited early with {status}: {}", atlas.log());
        }
        if world.exists() && fs::read(&world).is_ok_and(|b| !b.is_empty()) {
            let n = items(&world).len();
            if n > MIN_SIZE {
                break n;
            }
        }
        assert!(Instant::now() < deadline, "world never grew: {}", atlas.log());
        std::thread::sleep(Duration::from_millis(20));
    };
    assert!(grown > MIN_SIZE);

    // Workers die with the supervisor.
    parent.kill().expect("kill");
    parent.wait().expect("wait");
    let log = atlas.log();
    assert!(log.contains("Cartographer started"), "{log}");
    assert!(log.contains("Surveyor started"), "{log}");
}
