use crate::common::http::{Route, StubServer};
use crate::common::{TestApp, build_zip, release_json};
use gh_updater::core::UpdaterError;
use gh_updater::registry::ReleaseRecord;
use gh_updater::upgrade::Downloader;
use gh_updater::upgrade::download::read_download_record;
use std::time::Duration;

const LATEST: &str = "/repos/acme/app/releases/latest";
const ASSET: &str = "/assets/app-build-1.2.0.zip";

fn payload() -> Vec<u8> {
    build_zip(&[
        ("package.json", r#"{"name":"app","version":"1.2.0"}"#),
        ("index.js", "require('./lib/server').start()"),
    ])
}

#[tokio::test]
async fn test_download_direct_asset() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    server.route(LATEST, Route::Json(release_json("1.2.0", None, Some(&server.url(ASSET)))));
    server.route(ASSET, Route::Bytes(payload()));

    let config = app.config(&server.base()).with_token("registry-token");
    let updater = app.updater(config.clone());
    let outcome = updater.download().await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.message, "Update downloaded successfully");
    assert_eq!(outcome.target_version.as_deref(), Some("1.2.0"));
    assert_eq!(outcome.is_intermediate_version, Some(false));
    assert_eq!(outcome.size, Some(payload().len() as u64));

    let record = read_download_record(&config).unwrap();
    assert_eq!(record.version, "1.2.0");
    assert_eq!(record.tag_name, "v1.2.0");
    assert_eq!(record.file_name, "app-build-1.2.0.zip");
    assert!(record.complete);
    assert!(record.sha256.is_some());
    assert_eq!(
        std::fs::read(config.downloads_dir().join("app-build-1.2.0.zip")).unwrap(),
        payload()
    );
}

#[tokio::test]
async fn test_download_follows_trusted_redirect_without_token() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    let cdn = "/cdn/app-build-1.2.0.zip";
    server.route(LATEST, Route::Json(release_json("1.2.0", None, Some(&server.url(ASSET)))));
    server.route(ASSET, Route::Redirect(server.url(cdn)));
    server.route(cdn, Route::Bytes(payload()));

    let updater = app.updater(app.config(&server.base()).with_token("registry-token"));
    let outcome = updater.download().await.unwrap();
    assert!(outcome.success);

    let hits = server.hits();
    let asset_hit = hits.iter().find(|h| h.target == ASSET).unwrap();
    let cdn_hit = hits.iter().find(|h| h.target == cdn).unwrap();
    assert_eq!(asset_hit.authorization.as_deref(), Some("Bearer registry-token"));
    assert_eq!(cdn_hit.authorization, None);
}

#[tokio::test]
async fn test_download_refuses_untrusted_redirect() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    server.route(LATEST, Route::Json(release_json("1.2.0", None, Some(&server.url(ASSET)))));
    server.route(
        ASSET,
        Route::Redirect("http://evil.example.com/app-build-1.2.0.zip".to_string()),
    );

    let config = app.config(&server.base());
    let updater = app.updater(config.clone());
    let err = updater.download().await.unwrap_err();

    match err {
        UpdaterError::UntrustedRedirect { host } => assert_eq!(host, "evil.example.com"),
        other => panic!("expected UntrustedRedirect, got {other:?}"),
    }
    assert!(!config.downloads_dir().join("app-build-1.2.0.zip").exists());
    assert!(!config.download_record_path().exists());
    assert!(read_download_record(&config).is_none());
}

#[tokio::test]
async fn test_download_missing_asset() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    server.route(LATEST, Route::Json(release_json("1.2.0", None, None)));

    let updater = app.updater(app.config(&server.base()));
    let err = updater.download().await.unwrap_err();

    match err {
        UpdaterError::AssetNotFound { version, expected } => {
            assert_eq!(version, "1.2.0");
            assert_eq!(expected, "app-build-1.2.0.zip");
        }
        other => panic!("expected AssetNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_download_http_error_cleans_up() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    server.route(LATEST, Route::Json(release_json("1.2.0", None, Some(&server.url(ASSET)))));
    server.route(ASSET, Route::Status(404, "gone".to_string()));

    let config = app.config(&server.base());
    let updater = app.updater(config.clone());
    let err = updater.download().await.unwrap_err();

    assert!(matches!(&err, UpdaterError::DownloadFailed { reason } if reason == "HTTP 404"), "{err:?}");
    assert!(!config.download_record_path().exists());
    assert!(!config.downloads_dir().join("app-build-1.2.0.zip").exists());
}

#[tokio::test]
async fn test_download_when_up_to_date() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    server.route(LATEST, Route::Json(release_json("1.0.0", None, Some(&server.url(ASSET)))));

    let updater = app.updater(app.config(&server.base()));
    let outcome = updater.download().await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.message, "Already running latest compatible version");
    assert_eq!(outcome.latest_version, "1.0.0");
    assert_eq!(server.hit_count(ASSET), 0);
}

#[tokio::test]
async fn test_download_intermediate_release() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    let asset = "/assets/app-build-1.1.0.zip";
    server.route(LATEST, Route::Json(release_json("2.0.0", Some("1.1.0"), None)));
    server.route(
        "/repos/acme/app/releases?per_page=30",
        Route::Json(serde_json::json!([
            release_json("2.0.0", Some("1.1.0"), None),
            release_json("1.1.0", None, Some(&server.url(asset))),
            release_json("1.0.0", None, None)
        ])),
    );
    server.route(asset, Route::Bytes(payload()));

    let updater = app.updater(app.config(&server.base()));
    let outcome = updater.download().await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.target_version.as_deref(), Some("1.1.0"));
    assert_eq!(outcome.latest_version, "2.0.0");
    assert!(!outcome.is_latest_compatible);
    assert_eq!(outcome.is_intermediate_version, Some(true));
}

fn downloader_for(app: &TestApp, server: &StubServer) -> (Downloader, ReleaseRecord) {
    let config = app.config(&server.base());
    let release: ReleaseRecord =
        serde_json::from_value(release_json("1.2.0", None, Some(&server.url(ASSET)))).unwrap();
    let downloader = Downloader::new(&config)
        .unwrap()
        .with_timeouts(Duration::from_millis(300), Duration::from_millis(600));
    (downloader, release)
}

#[tokio::test]
async fn test_slow_steady_transfer_outlives_request_timeout() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    let payload = payload();
    let parts: Vec<Vec<u8>> = payload.chunks((payload.len() / 4).max(1)).map(<[u8]>::to_vec).collect();
    assert!(parts.len() >= 4);
    // Roughly 4 x 200ms in total, well past the 300ms header budget.
    server.route(ASSET, Route::Trickle(parts, Duration::from_millis(200)));

    let (downloader, release) = downloader_for(&app, &server);
    let record = downloader.download(&release, "1.2.0", "app-build-1.2.0.zip").await.unwrap();

    assert!(record.complete);
    assert_eq!(record.size, Some(payload.len() as u64));
    let config = app.config(&server.base());
    assert_eq!(std::fs::read(config.downloads_dir().join("app-build-1.2.0.zip")).unwrap(), payload);
}

#[tokio::test]
async fn test_stalled_transfer_times_out() {
    let server = StubServer::start().await;
    let app = TestApp::new();
    server.route(
        ASSET,
        Route::Trickle(vec![b"PK".to_vec(), b"rest".to_vec()], Duration::from_millis(1500)),
    );

    let (downloader, release) = downloader_for(&app, &server);
    let err = downloader
        .download(&release, "1.2.0", "app-build-1.2.0.zip")
        .await
        .unwrap_err();

    assert!(matches!(err, UpdaterError::Timeout { .. }), "{err:?}");
    assert!(err.is_retryable());
    let config = app.config(&server.base());
    assert!(!config.download_record_path().exists());
    assert!(!config.downloads_dir().join("app-build-1.2.0.zip").exists());
}
