use curator_core::command::Command;
use curator_core::config::AppConfig;
use curator_core::engine::{EngineState, TriageEngine};
use curator_core::models::Step;
use curator_core::service::{self, EngineEvent, Reply};
use curator_core::{Category, TriageError};
use std::fs;
use tempfile::tempdir;

#[tokio::test]
async fn commands_flow_through_the_owner_task() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    for name in ["A.jpg", "B.jpg", "C.jpg", "notes.txt"] {
        fs::write(src.join(name), name).unwrap();
    }
    let cfg = AppConfig::with_storage_root(temp.path().join("state"));
    let out = cfg.export_root();
    let (handle, mut events, task) = service::spawn(TriageEngine::open(cfg).unwrap());

    let reply = handle
        .execute(Command::Scan(src.to_string_lossy().into_owned()))
        .await
        .unwrap();
    match reply {
        Reply::Scanned(summary) => {
            assert_eq!(summary.total, 3);
            assert_eq!(summary.state, EngineState::Ready);
        }
        other => panic!("unexpected reply {:?}", other),
    }

    for category in [Category::Yes, Category::No, Category::NotSure] {
        handle.execute(Command::Categorize(category)).await.unwrap();
    }
    assert_eq!(handle.progress().await.unwrap(), (2, 3));
    assert_eq!(handle.selected_count().await.unwrap(), 1);
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.total(), 3);

    match handle.execute(Command::ExportAndClose).await.unwrap() {
        Reply::Exported(summary) => assert_eq!((summary.copied(), summary.failed()), (3, 0)),
        other => panic!("unexpected reply {:?}", other),
    }
    assert_eq!(handle.state().await.unwrap(), EngineState::Idle);
    assert!(handle.current_item().await.unwrap().is_none());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen[0], EngineEvent::ScanFinished { total: 3, .. }));
    let progress: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            EngineEvent::ExportProgress { done, total } => Some((*done, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!(
        seen.last(),
        Some(&EngineEvent::ExportFinished { copied: 3, failed: 0 })
    );
    assert!(out.join("NotSure").join("C.jpg").exists());

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn navigation_without_a_catalog_is_refused() {
    let temp = tempdir().unwrap();
    let cfg = AppConfig::with_storage_root(temp.path().join("state"));
    let (handle, _events, task) = service::spawn(TriageEngine::open(cfg).unwrap());

    let err = handle.execute(Command::Next).await.unwrap_err();
    assert!(matches!(err, TriageError::NoCurrentItem));
    assert!(handle.resume().await.unwrap().is_none());

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn failed_rescan_returns_to_idle() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.jpg"), "a").unwrap();
    let cfg = AppConfig::with_storage_root(temp.path().join("state"));
    let (handle, _events, task) = service::spawn(TriageEngine::open(cfg).unwrap());

    let location = src.to_string_lossy().into_owned();
    handle.execute(Command::Scan(location.clone())).await.unwrap();
    assert!(matches!(
        handle.execute(Command::Next).await.unwrap(),
        Reply::Moved(Step::NoMoreItems)
    ));
    fs::remove_dir_all(&src).unwrap();

    let err = handle.execute(Command::Scan(location)).await.unwrap_err();
    assert!(matches!(err, TriageError::SourceUnavailable { .. }));
    assert_eq!(handle.state().await.unwrap(), EngineState::Idle);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn dropped_handle_stops_the_owner() {
    let temp = tempdir().unwrap();
    let cfg = AppConfig::with_storage_root(temp.path().join("state"));
    let (handle, _events, task) = service::spawn(TriageEngine::open(cfg).unwrap());
    drop(handle);
    task.await.unwrap();
}
