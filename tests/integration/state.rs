use crate::common::http::{Route, StubServer};
use crate::common::{TestApp, build_zip, release_json};
use gh_updater::core::UpdaterError;
use gh_updater::upgrade::Operation;
use std::sync::Arc;
use std::time::Duration;

const LATEST: &str = "/repos/acme/app/releases/latest";
const ASSET: &str = "/assets/app-build-1.2.0.zip";

async fn wait_for(updater: &gh_updater::upgrade::Updater, operation: Operation) {
    for _ in 0..500 {
        if updater.get_state().current == operation {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("updater never reached {operation}");
}

#[tokio::test]
async fn test_operations_refused_while_downloading() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    server.route(LATEST, Route::Json(release_json("1.2.0", None, Some(&server.url(ASSET)))));
    server.route(
        ASSET,
        Route::Delayed(
            Duration::from_millis(500),
            Box::new(Route::Bytes(build_zip(&[("package.json", r#"{"version":"1.2.0"}"#)]))),
        ),
    );
    let updater = app.updater(app.config(&server.base()));

    let background = Arc::clone(&updater);
    let download = tokio::spawn(async move { background.download().await });
    wait_for(&updater, Operation::Downloading).await;

    let state = updater.get_state();
    assert!(state.locked);
    assert!(state.is_busy);

    let err = updater.install().await.unwrap_err();
    match &err {
        UpdaterError::Busy { requested, current } => {
            assert_eq!(*requested, "install");
            assert_eq!(*current, Operation::Downloading);
        }
        other => panic!("expected Busy, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert_eq!(err.to_string(), "Cannot install: downloading operation is in progress");

    assert!(matches!(updater.check().await, Err(UpdaterError::Busy { .. })));
    assert!(matches!(updater.rollback().await, Err(UpdaterError::Busy { .. })));
    assert!(matches!(updater.clear_downloads(), Err(UpdaterError::Busy { .. })));
    assert!(matches!(updater.clear_backups(), Err(UpdaterError::Busy { .. })));
    assert_eq!(updater.get_state().current, Operation::Downloading);

    let outcome = download.await.unwrap().unwrap();
    assert!(outcome.success);
    assert_eq!(updater.get_state().current, Operation::Idle);
    assert!(!updater.get_state().locked);
}

#[cfg(unix)]
#[tokio::test]
async fn test_abandoned_install_keeps_state_until_engine_finishes() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    server.route(LATEST, Route::Json(release_json("1.2.0", None, Some(&server.url(ASSET)))));
    server.route(
        ASSET,
        Route::Bytes(build_zip(&[
            ("package.json", r#"{"name":"app","version":"1.2.0"}"#),
            ("index.js", "new"),
        ])),
    );
    let config = app.config(&server.base()).with_dependency_install(["sleep", "1"]);
    let updater = app.updater(config.clone());
    updater.download().await.unwrap();

    let abandoned = tokio::time::timeout(Duration::from_millis(200), updater.install()).await;
    assert!(abandoned.is_err(), "install finished before the timeout");

    let state = updater.get_state();
    assert_eq!(state.current, Operation::Installing);
    assert!(state.locked);
    assert!(matches!(
        updater.clear_backups(),
        Err(UpdaterError::Busy { current: Operation::Installing, .. })
    ));
    assert!(matches!(updater.rollback().await, Err(UpdaterError::Busy { .. })));

    wait_for(&updater, Operation::Idle).await;
    assert_eq!(updater.current_version().unwrap(), "1.2.0");
    assert_eq!(app.read("index.js"), "new");
    let info = updater.get_rollback_info().unwrap().unwrap();
    assert_eq!(info.version, "1.0.0");
    assert!(config.rollback_dir().join("rollback-v1.0.0.zip").is_file());
}

#[tokio::test]
async fn test_failed_check_returns_to_idle() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    server.route(LATEST, Route::Status(500, "{}".to_string()));
    let updater = app.updater(app.config(&server.base()));

    let err = updater.check().await.unwrap_err();
    assert!(matches!(err, UpdaterError::Registry { status: 500 }), "{err:?}");
    assert_eq!(updater.get_state().current, Operation::Idle);
}

#[tokio::test]
async fn test_clear_downloads() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    server.route(LATEST, Route::Json(release_json("1.2.0", None, Some(&server.url(ASSET)))));
    server.route(ASSET, Route::Bytes(build_zip(&[("package.json", r#"{"version":"1.2.0"}"#)])));
    let updater = app.updater(app.config(&server.base()));

    let outcome = updater.clear_downloads().unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.deleted_count, 0);
    assert_eq!(outcome.message, "No downloads to clear");

    updater.download().await.unwrap();
    let outcome = updater.clear_downloads().unwrap();
    // The artifact and its record.
    assert_eq!(outcome.deleted_count, 2);
    assert_eq!(outcome.message, "Cleared 2 download(s)");
    assert!(!updater.check().await.unwrap().downloaded);
}

#[tokio::test]
async fn test_clear_backups_removes_rollback_archives() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    server.route(LATEST, Route::Json(release_json("1.2.0", None, Some(&server.url(ASSET)))));
    server.route(ASSET, Route::Bytes(build_zip(&[("package.json", r#"{"version":"1.2.0"}"#)])));
    let updater = app.updater(app.config(&server.base()));

    assert_eq!(updater.clear_backups().unwrap().message, "No backups to clear");

    updater.download().await.unwrap();
    updater.install().await.unwrap();
    assert!(updater.get_rollback_info().unwrap().is_some());

    let outcome = updater.clear_backups().unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.deleted_count, 1);
    assert_eq!(outcome.message, "Cleared 1 backup(s)");
    assert!(updater.get_rollback_info().unwrap().is_none());
}
