//! Both workers running in one process over a shared atlas directory.

use std::fs;
use std::time::Duration;

use atlas_config::AtlasLayout;
use atlas_core::{AtlasWorker, CartographerConfig, Sleeper, SurveyWorker};
use atlas_engine::{AtlasEngine, BuiltinEngine, BuiltinWorld};
use atlas_types::InferenceState;
use atlas_utils::file_digest;

use crate::common::{items, theory, write_world};

const STEP: usize = 4;

fn start(layout: &AtlasLayout) -> (AtlasWorker<BuiltinWorld>, SurveyWorker<BuiltinEngine>) {
    let cartographer = AtlasWorker::start(
        &BuiltinEngine::unsynced(),
        theory(),
        layout.clone(),
        CartographerConfig {
            region_size: 4,
            region_queue_size: 2,
        },
        Sleeper::new(Duration::from_nanos(1)),
    )
    .expect("cartographer");
    let surveyor = SurveyWorker::start(
        BuiltinEngine::unsynced(),
        theory(),
        layout.clone(),
        STEP,
        Sleeper::new(Duration::from_nanos(1)),
    )
    .expect("surveyor");
    (cartographer, surveyor)
}

#[test]
fn trim_normalize_then_aggregate_one_survey() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = AtlasLayout::at(dir.path().join("sk"));
    write_world(&layout, &[1, 2, 3]);
    let (mut cartographer, mut surveyor) = start(&layout);

    assert!(cartographer.try_trim().expect("trim"));
    assert_eq!(cartographer.regions().len().expect("len"), 2);

    while !cartographer.state().is_normal() {
        assert!(cartographer.try_normalize().expect("normalize"));
    }
    assert!(!cartographer.try_normalize().expect("normal"));
    let normal = items(&layout.normal_world());
    assert_eq!(normal, items(&layout.world()));

    assert!(surveyor.step().expect("survey"));
    let survey = &cartographer.surveys().list().expect("list")[0];
    let new_items = items(survey)
        .into_iter()
        .filter(|i| !normal.contains(i))
        .count();
    assert!(new_items > 0 && new_items <= STEP);

    assert!(cartographer.try_aggregate().expect("aggregate"));
    assert_eq!(items(&layout.world()).len(), normal.len() + new_items);
    assert_eq!(cartographer.state(), InferenceState::Fresh);
    assert_eq!(cartographer.regions().len().expect("len"), 2);
    assert!(cartographer.surveys().is_empty().expect("empty"));
}

#[test]
fn aggregating_a_subsumed_seed_keeps_the_world_hash() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = AtlasLayout::at(dir.path().join("sk"));
    write_world(&layout, &[1, 2, 3]);
    let engine = BuiltinEngine::unsynced();
    let survey = layout.scratch("grown");
    engine.survey(&theory(), &layout.world(), &survey, 7).expect("survey");
    fs::rename(&survey, layout.world()).expect("promote");

    let seed = layout.scratch("seed");
    fs::copy(layout.world(), &seed).expect("copy");
    let before = file_digest(layout.world()).expect("digest");

    let (mut cartographer, _surveyor) = start(&layout);
    cartographer.surveys().push(&seed).expect("push");
    assert!(cartographer.try_aggregate().expect("aggregate"));
    assert_eq!(file_digest(layout.world()).expect("digest"), before);
}

#[test]
fn interleaved_steps_grow_the_world() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = AtlasLayout::at(dir.path().join("sk"));
    write_world(&layout, &[1, 2, 3]);
    let (mut cartographer, mut surveyor) = start(&layout);

    for _ in 0..50 {
        cartographer.step().expect("cartographer step");
        surveyor.step().expect("surveyor step");
    }

    let engine = BuiltinEngine::unsynced();
    assert!(engine.item_count(&layout.world()).expect("count") > 3);
    for entry in fs::read_dir(layout.dir()).expect("read_dir") {
        let name = entry.expect("entry").file_name();
        let name = name.to_string_lossy();
        assert!(
            !name.starts_with("temp.old.") && name != "temp.region.queue",
            "leftover replacement dir {name}"
        );
    }
}

#[test]
fn restart_recovers_an_interrupted_rebuild() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = AtlasLayout::at(dir.path().join("sk"));
    write_world(&layout, &[1, 2, 3, 4]);
    {
        let (mut cartographer, _surveyor) = start(&layout);
        cartographer.try_trim().expect("trim");
    }

    // Crash between retiring the old queue and committing the new one.
    let staging = layout.dir().join("temp.region.queue");
    let retired = layout.dir().join("temp.old.region.queue");
    fs::create_dir(&staging).expect("mkdir");
    fs::copy(layout.region_queue().join("0.h5"), staging.join("0.h5")).expect("copy");
    fs::rename(layout.region_queue(), &retired).expect("retire");

    let (cartographer, _surveyor) = start(&layout);
    assert_eq!(cartographer.regions().len().expect("len"), 1);
    assert!(!staging.exists());
    assert!(!retired.exists());
}
