//! Dataset load sequence against in-memory fakes

mod support;

use serde_json::json;
use std::io::{Cursor, Read};

use routecheck_common::{Error, JobState};
use routecheck_harness::{DatasetLoader, LoadOutcome, LoaderSettings};
use support::*;

fn loader(world: World, root: &std::path::Path) -> (SharedWorld, DatasetLoader) {
    let (world, backend, fleet) = fakes(world);
    let settings = LoaderSettings::from_config(&config(root));
    (world, DatasetLoader::new(backend, fleet, settings))
}

#[tokio::test(start_paused = true)]
async fn test_fusio_folder_is_pushed_and_ingested() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("data/fr-idf/fusio/a.txt"), "stop_id,stop_name\n");
    let (world, mut loader) = loader(World::default(), dir.path());

    let outcome = loader.load(&dataset()).await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            dataset_types: vec!["fusio".to_string()]
        }
    );
    assert!(loader.is_loaded("fr-idf"));

    let world = world.lock();
    assert_eq!(world.pushes.len(), 1);
    let push = &world.pushes[0];
    assert_eq!(push.container, WORKER);
    assert_eq!(push.path, "/srv/ed/input/fr-idf");

    let entries = push.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "fusio.zip");
    let mut zip = zip::ZipArchive::new(Cursor::new(entries[0].1.clone())).unwrap();
    let mut content = String::new();
    zip.by_name("a.txt").unwrap().read_to_string(&mut content).unwrap();
    assert_eq!(content, "stop_id,stop_name\n");

    let commands: Vec<&str> = world.execs.iter().map(|(_, c)| c.as_str()).collect();
    assert_eq!(
        commands,
        vec!["rm -f /srv/ed/output/fr-idf.nav.lz4", "mkdir -p /srv/ed/input/fr-idf"]
    );
    assert_eq!(world.parameters.get("max_nb_transfers"), Some(&json!(10)));
}

#[tokio::test(start_paused = true)]
async fn test_second_load_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("data/fr-idf/osm/idf.osm.pbf"), "pbf");
    let (world, mut loader) = loader(World::default(), dir.path());

    loader.ensure_loaded(&[dataset()]).await.unwrap();
    let outcome = loader.load(&dataset()).await.unwrap();

    assert_eq!(outcome, LoadOutcome::AlreadyLoaded);
    assert_eq!(world.lock().pushes.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_categories_pushed_in_order() {
    let dir = tempfile::tempdir().unwrap();
    for folder in ["fusio-geopal", "osm", "fusio"] {
        let name = if folder == "osm" { "x.pbf" } else { "x.txt" };
        write_file(&dir.path().join("data/fr-idf").join(folder).join(name), "x");
    }
    let (_world, mut loader) = loader(World::default(), dir.path());

    let outcome = loader.load(&dataset()).await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            dataset_types: vec!["fusio".to_string(), "osm".to_string(), "geopal".to_string()]
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_config_mismatch_is_fatal_before_staging() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("data/fr-idf/fusio/a.txt"), "a");
    let mut world = World {
        accept_updates: false,
        ..World::default()
    };
    world.parameters.insert("max_nb_transfers".to_string(), json!(5));
    let (world, mut loader) = loader(world, dir.path());

    let err = loader.load(&dataset()).await.unwrap_err();
    match err {
        Error::ConfigMismatch { dataset, diffs } => {
            assert_eq!(dataset, "fr-idf");
            assert!(diffs.contains("max_nb_transfers"));
            assert!(diffs.contains("Missing in registry"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(world.lock().pushes.is_empty());
    assert!(!loader.is_loaded("fr-idf"));
}

#[tokio::test(start_paused = true)]
async fn test_coverage_not_running_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let world = World {
        coverage_status: "loading".to_string(),
        ..World::default()
    };
    let (_world, mut loader) = loader(world, dir.path());

    let err = loader.load(&dataset()).await.unwrap_err();
    assert!(matches!(err, Error::CoverageNotRunning { ref status, .. } if status == "loading"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_aborts_load() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("data/fr-idf/fusio/a.txt"), "a");
    let world = World {
        job_outcome: JobState::Failed,
        ..World::default()
    };
    let (_world, mut loader) = loader(world, dir.path());

    let err = loader.load(&dataset()).await.unwrap_err();
    assert!(matches!(err, Error::JobFailed { ref data_type, .. } if data_type == "fusio"));
    assert!(!loader.is_loaded("fr-idf"));
}

#[tokio::test(start_paused = true)]
async fn test_stuck_job_times_out_naming_the_type() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("data/fr-idf/fusio/a.txt"), "a");
    let world = World {
        job_outcome: JobState::Running,
        ..World::default()
    };
    let (_world, mut loader) = loader(world, dir.path());

    let err = loader.load(&dataset()).await.unwrap_err();
    match err {
        Error::Timeout { wait, last, .. } => {
            assert!(wait.contains("fusio"));
            assert!(last.is_retryable());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_worker_is_fatal_when_data_exists() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("data/fr-idf/fusio/a.txt"), "a");
    let mut world = World::default();
    world.containers.retain(|c| c.name != WORKER);
    let (_world, mut loader) = loader(world, dir.path());

    let err = loader.load(&dataset()).await.unwrap_err();
    assert!(matches!(err, Error::ContainerMissing(ref name) if name == "tyr_worker"));
}

#[tokio::test(start_paused = true)]
async fn test_skip_loading() {
    let dir = tempfile::tempdir().unwrap();
    let (world, backend, fleet) = fakes(World::default());
    let mut config = config(dir.path());
    config.skip_loading = true;
    let mut loader = DatasetLoader::new(backend, fleet, LoaderSettings::from_config(&config));

    assert_eq!(loader.load(&dataset()).await.unwrap(), LoadOutcome::Skipped);
    assert_eq!(world.lock().list_polls, 0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_engines() {
    let dir = tempfile::tempdir().unwrap();
    let (world, loader) = loader(World::default(), dir.path());

    loader
        .restart_engines(&[dataset(), routecheck_common::Dataset::new("de-bw")])
        .await
        .unwrap();
    assert_eq!(world.lock().restarts, vec![ENGINE.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_remove_engines_stops_then_removes() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("data/fr-idf/osm/idf.osm.pbf"), "pbf");
    let (world, mut loader) = loader(World::default(), dir.path());
    loader.load(&dataset()).await.unwrap();

    let removed = loader
        .remove_engines(&[dataset(), routecheck_common::Dataset::new("de-bw")])
        .await
        .unwrap();

    assert_eq!(removed, vec![ENGINE.to_string()]);
    assert!(!loader.is_loaded("fr-idf"));
    let world = world.lock();
    assert_eq!(world.teardown, vec![format!("stop {ENGINE}"), format!("rm {ENGINE}")]);
    assert!(world.containers.iter().all(|c| c.name != ENGINE));
    assert!(world.containers.iter().any(|c| c.name == WORKER));
}

#[tokio::test(start_paused = true)]
async fn test_remove_engines_times_out_on_a_stuck_container() {
    let dir = tempfile::tempdir().unwrap();
    let (world, backend, fleet) = fakes(World::default());
    let mut config = config(dir.path());
    config.waits.removal_timeout_secs = 2;
    config.waits.removal_interval_ms = 500;
    let mut loader = DatasetLoader::new(backend, fleet, LoaderSettings::from_config(&config));
    world.lock().unstoppable.push(ENGINE.to_string());

    let start = tokio::time::Instant::now();
    let err = loader.remove_engines(&[dataset()]).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(start.elapsed() <= std::time::Duration::from_millis(2500));
    assert_eq!(world.lock().teardown, vec![format!("stop {ENGINE}")]);
}
