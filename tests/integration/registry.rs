use crate::common::http::{Route, StubServer};
use crate::common::{TestApp, release_json};
use gh_updater::core::UpdaterError;
use gh_updater::registry::RegistryClient;

const LATEST: &str = "/repos/acme/app/releases/latest";

async fn client_for(server: &StubServer, token: Option<&str>) -> RegistryClient {
    let app = TestApp::new();
    let mut config = app.config(&server.base());
    if let Some(token) = token {
        config = config.with_token(token);
    }
    RegistryClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_fetch_latest_sends_token() {
    let server = StubServer::start().await;
    server.route(LATEST, Route::Json(release_json("1.2.0", None, None)));

    let client = client_for(&server, Some("secret-token")).await;
    let release = client.fetch_latest().await.unwrap();

    assert_eq!(release.version(), "1.2.0");
    assert_eq!(release.display_name(), "App 1.2.0");
    let hits = server.hits();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].authorization.as_deref(), Some("Bearer secret-token"));
}

#[tokio::test]
async fn test_fetch_releases_requests_page_size() {
    let server = StubServer::start().await;
    server.route(
        "/repos/acme/app/releases?per_page=30",
        Route::Json(serde_json::json!([
            release_json("1.1.0", None, None),
            release_json("1.0.0", None, None)
        ])),
    );

    let client = client_for(&server, None).await;
    let releases = client.fetch_releases(30).await.unwrap();
    assert_eq!(releases.len(), 2);
    assert!(server.hits()[0].authorization.is_none());
}

#[tokio::test]
async fn test_status_codes_map_to_errors() {
    let server = StubServer::start().await;
    let client = client_for(&server, None).await;

    for status in [401u16, 403, 429, 404, 502, 204] {
        server.route(LATEST, Route::Status(status, "{}".to_string()));
        let err = client.fetch_latest().await.unwrap_err();
        let mapped = match status {
            401 => matches!(err, UpdaterError::AuthenticationFailed),
            403 | 429 => matches!(err, UpdaterError::RateLimited { status: s } if s == status),
            404 => matches!(err, UpdaterError::NoReleasesFound),
            _ => matches!(err, UpdaterError::Registry { status: s } if s == status),
        };
        assert!(mapped, "status {status} mapped to {err:?}");
    }
}

#[tokio::test]
async fn test_malformed_json_is_parse_error() {
    let server = StubServer::start().await;
    server.route(LATEST, Route::Status(200, "{ not json".to_string()));

    let client = client_for(&server, None).await;
    let err = client.fetch_latest().await.unwrap_err();
    assert!(matches!(err, UpdaterError::Parse { .. }), "{err:?}");
    assert!(!err.is_retryable());
}
