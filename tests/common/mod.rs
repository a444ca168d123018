//! Common test utilities and fixtures for gh-updater integration tests
//!
//! - [`http`] - a loopback HTTP server with canned routes standing in for the
//!   registry and its asset CDN
//! - [`TestApp`] - a live application tree plus an updater pointed at it

// Not every helper is used by every test module
#![allow(dead_code)]


use gh_updater::config::{TrustedHosts, UpdaterConfig};
use gh_updater::upgrade::{Updater, UpdaterCell};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;
use zip::write::{SimpleFileOptions, ZipWriter};

static INIT_LOGGING: Once = Once::new();

/// Route `tracing` output through the test writer when `RUST_LOG` is set.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        if std::env::var("RUST_LOG").is_err() {
            return;
        }
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A JSON release payload as served by the registry.
pub fn release_json(version: &str, minimum: Option<&str>, asset_url: Option<&str>) -> serde_json::Value {
    let body = match minimum {
        Some(min) => format!(
            "## {version}\n\n<!-- UPGRADE_METADATA\n{{\"minimumVersionRequired\": \"{min}\"}}\n-->"
        ),
        None => format!("## {version}"),
    };
    let assets = match asset_url {
        Some(url) => serde_json::json!([{
            "name": format!("app-build-{version}.zip"),
            "browser_download_url": url,
            "size": 0
        }]),
        None => serde_json::json!([]),
    };
    serde_json::json!({
        "tag_name": format!("v{version}"),
        "name": format!("App {version}"),
        "published_at": "2024-05-01T10:00:00Z",
        "body": body,
        "html_url": format!("https://github.com/acme/app/releases/tag/v{version}"),
        "assets": assets
    })
}

/// Build a zip holding `files` (path, content) in memory.
pub fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in files {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A live application tree at version `1.0.0` in a temporary directory.
pub struct TestApp {
    _temp: TempDir,
    pub root: PathBuf,
}

impl TestApp {
    pub fn new() -> Self {
        init_test_logging();
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app");
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("package.json"), r#"{"name":"app","version":"1.0.0"}"#).unwrap();
        fs::write(root.join("index.js"), "require('./lib/server').start()").unwrap();
        fs::write(root.join("lib/server.js"), "exports.start = () => 'v1'").unwrap();
        fs::write(root.join(".env"), "API_KEY=secret").unwrap();
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        Self { _temp: temp, root }
    }

    /// Configuration pointing at `api_base`, trusting loopback redirects and
    /// running no dependency install.
    pub fn config(&self, api_base: &str) -> UpdaterConfig {
        UpdaterConfig::new("acme", "app")
            .with_app_root(&self.root)
            .with_api_base(api_base)
            .with_dependency_install(Vec::<String>::new())
            .with_trusted_hosts(TrustedHosts {
                domains: vec!["127.0.0.1".to_string()],
                asset_buckets: vec![],
            })
    }

    /// A fresh updater in its own cell.
    pub fn updater(&self, config: UpdaterConfig) -> Arc<Updater> {
        UpdaterCell::new().init(config).unwrap()
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root.join(relative)).unwrap()
    }

    /// Every file of the live tree (outside `.gh-updater`) with its content.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        snapshot_tree(&self.root)
    }

    pub fn updater_dir(&self) -> PathBuf {
        self.root.join(".gh-updater")
    }
}

pub fn snapshot_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".gh-updater")
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            (relative, fs::read(e.path()).unwrap())
        })
        .collect()
}
