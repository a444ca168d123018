use crate::common::http::{Route, StubServer};
use crate::common::{TestApp, build_zip, release_json};
use gh_updater::core::UpdaterError;
use gh_updater::upgrade::download::read_download_record;
use std::fs;

const LATEST: &str = "/repos/acme/app/releases/latest";
const ASSET: &str = "/assets/app-build-1.2.0.zip";

/// Serve release 1.2.0 whose build contains `files`.
fn publish(server: &StubServer, files: &[(&str, &str)]) {
    server.route(LATEST, Route::Json(release_json("1.2.0", None, Some(&server.url(ASSET)))));
    server.route(ASSET, Route::Bytes(build_zip(files)));
}

fn new_build() -> Vec<(&'static str, &'static str)> {
    vec![
        ("package.json", r#"{"name":"app","version":"1.2.0"}"#),
        ("index.js", "require('./lib/server').start()"),
        ("lib/server.js", "exports.start = () => 'v2'"),
        ("lib/cache.js", "module.exports = new Map()"),
    ]
}

#[tokio::test]
async fn test_check_download_install_flow() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    publish(&server, &new_build());
    let config = app.config(&server.base());
    let updater = app.updater(config.clone());

    let check = updater.check().await.unwrap();
    assert_eq!(check.current_version, "1.0.0");
    assert_eq!(check.upgrade.target_version.as_deref(), Some("1.2.0"));
    assert!(check.upgrade.update_available);
    assert!(check.upgrade.is_latest_compatible);
    assert!(!check.downloaded);

    updater.download().await.unwrap();
    let check = updater.check().await.unwrap();
    assert!(check.downloaded);
    assert_eq!(check.downloaded_version.as_deref(), Some("1.2.0"));

    let outcome = updater.install().await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.message, "Update installed successfully");
    assert_eq!(outcome.old_version, "1.0.0");
    assert_eq!(outcome.new_version, "1.2.0");
    assert!(outcome.rollback_available);
    assert!(outcome.rollback_path.is_file());

    assert_eq!(updater.current_version().unwrap(), "1.2.0");
    assert_eq!(app.read("lib/server.js"), "exports.start = () => 'v2'");
    assert_eq!(app.read("lib/cache.js"), "module.exports = new Map()");
    assert_eq!(app.read(".env"), "API_KEY=secret");
    assert_eq!(app.read(".git/HEAD"), "ref: refs/heads/main");

    // The consumed download and the transient directories are gone.
    assert!(read_download_record(&config).is_none());
    assert!(!config.staging_dir().exists());
    assert!(fs::read_dir(config.backups_dir()).map_or(true, |mut d| d.next().is_none()));

    let info = updater.get_rollback_info().unwrap().unwrap();
    assert!(info.available);
    assert_eq!(info.version, "1.0.0");
    assert_eq!(info.path, outcome.rollback_path);
}

#[tokio::test]
async fn test_install_without_download() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    let updater = app.updater(app.config(&server.base()));

    let err = updater.install().await.unwrap_err();
    assert!(matches!(err, UpdaterError::NothingDownloaded), "{err:?}");
}

#[tokio::test]
async fn test_incompatible_build_leaves_tree_untouched() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    publish(
        &server,
        &[
            ("package.json", r#"{"version":"1.2.0","minimumVersionRequired":"1.1.0"}"#),
            ("index.js", "broken"),
        ],
    );
    let config = app.config(&server.base());
    let updater = app.updater(config.clone());
    updater.download().await.unwrap();
    let before = app.snapshot();

    let err = updater.install().await.unwrap_err();

    match &err {
        UpdaterError::IncompatibleInstall {
            version,
            minimum,
            current,
        } => {
            assert_eq!(version, "1.2.0");
            assert_eq!(minimum, "1.1.0");
            assert_eq!(current, "1.0.0");
        }
        other => panic!("expected IncompatibleInstall, got {other:?}"),
    }
    assert!(err.to_string().contains("Please upgrade to an intermediate version first"));
    assert_eq!(app.snapshot(), before);
    assert!(!config.staging_dir().exists());
    assert!(updater.get_rollback_info().unwrap().is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn test_failed_dependency_install_rolls_back() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    publish(&server, &new_build());
    let config = app.config(&server.base()).with_dependency_install(["false"]);
    let updater = app.updater(config.clone());
    updater.download().await.unwrap();
    let before = app.snapshot();

    let err = updater.install().await.unwrap_err();

    match &err {
        UpdaterError::RolledBack { cause, version } => {
            assert_eq!(version, "1.0.0");
            assert!(matches!(**cause, UpdaterError::DependencyInstallFailed { .. }), "{cause:?}");
        }
        other => panic!("expected RolledBack, got {other:?}"),
    }
    assert!(err.to_string().contains("Successfully rolled back to v1.0.0"));
    assert_eq!(app.snapshot(), before);
    assert_eq!(updater.current_version().unwrap(), "1.0.0");
    assert!(!config.staging_dir().exists());
}

#[tokio::test]
async fn test_rollback_restores_previous_release() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    publish(&server, &new_build());
    let updater = app.updater(app.config(&server.base()));
    let before = app.snapshot();

    updater.download().await.unwrap();
    updater.install().await.unwrap();
    assert_ne!(app.snapshot(), before);

    let outcome = updater.rollback().await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.version, "1.0.0");
    assert_eq!(outcome.message, "Successfully rolled back to version 1.0.0");

    assert_eq!(app.snapshot(), before);
    assert!(!app.root.join("lib/cache.js").exists());
    assert!(updater.get_rollback_info().unwrap().is_none());

    let err = updater.rollback().await.unwrap_err();
    assert!(matches!(err, UpdaterError::NoRollbackAvailable), "{err:?}");
}
