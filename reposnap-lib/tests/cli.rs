//! Command-line workflows driven through `run`, against a mock provider.

use camino::Utf8PathBuf;
use reposnap_lib::Host;
use serde_json::json;
use std::io::Cursor;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::ZipArchive;

const REPO_URL: &str = "https://github.com/o/r";

/// Test host that captures output to in-memory buffers.
struct TestHost {
    output_buf: Vec<u8>,
    error_buf: Vec<u8>,
}

impl TestHost {
    const fn new() -> Self {
        Self {
            output_buf: Vec::new(),
            error_buf: Vec::new(),
        }
    }

    fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output_buf).into_owned()
    }

    fn error_str(&self) -> String {
        String::from_utf8_lossy(&self.error_buf).into_owned()
    }
}

impl Host for TestHost {
    fn output(&mut self) -> impl std::io::Write {
        &mut self.output_buf
    }

    fn error(&mut self) -> impl std::io::Write {
        &mut self.error_buf
    }
}

/// A mock provider plus a configuration file pointing at it.
struct Provider {
    server: MockServer,
    dir: TempDir,
}

impl Provider {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let config = format!(
            "api_base_url = \"{uri}\"\nraw_base_url = \"{uri}/raw\"\nbase_backoff = \"10ms\"\nmax_backoff = \"50ms\"\n",
            uri = server.uri()
        );
        std::fs::write(dir.path().join("reposnap.toml"), config).unwrap();

        Self { server, dir }
    }

    fn config_path(&self) -> String {
        self.path("reposnap.toml").to_string()
    }

    fn path(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().join(name)).unwrap()
    }

    async fn tree(&self, status: u16, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/repos/o/r/git/trees/HEAD"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    async fn file(&self, name: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/raw/o/r/HEAD/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }
}

#[tokio::test]
async fn test_list_prints_tree_and_summary() {
    let provider = Provider::start().await;
    provider
        .tree(
            200,
            json!({
                "tree": [
                    {"path": "docs", "type": "tree"},
                    {"path": "docs/guide.md", "type": "blob", "size": 2048},
                    {"path": "README.md", "type": "blob", "size": 100}
                ],
                "truncated": true
            }),
        )
        .await;

    let mut host = TestHost::new();
    let result = reposnap_lib::run(&mut host, ["reposnap", "list", REPO_URL, "--config", &provider.config_path()]).await;

    assert!(result.is_ok(), "list failed: {result:?}");
    let output = host.output_str();
    let lines: Vec<_> = output.lines().collect();
    assert_eq!(lines[0], "file             100  README.md");
    assert_eq!(lines[1], "directory          -  docs");
    assert_eq!(lines[2], "file            2048  docs/guide.md");
    assert!(output.contains("o/r@HEAD: 2 file(s), 1 directories, 2148 bytes"), "{output}");
    assert!(host.error_str().contains("truncated"));
}

#[tokio::test]
async fn test_list_rejects_foreign_host() {
    let provider = Provider::start().await;

    let mut host = TestHost::new();
    let result = reposnap_lib::run(
        &mut host,
        ["reposnap", "list", "https://example.com/o/r", "--config", &provider.config_path()],
    )
    .await;

    assert!(result.is_err());
    assert!(provider.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_download_writes_archive_and_reports_failures() {
    let provider = Provider::start().await;
    provider
        .tree(
            200,
            json!({
                "tree": [
                    {"path": "a.txt", "type": "blob", "size": 3},
                    {"path": "missing.txt", "type": "blob", "size": 3}
                ],
                "truncated": false
            }),
        )
        .await;
    provider.file("a.txt", "abc").await;
    let output = provider.path("snapshot.zip");

    let mut host = TestHost::new();
    let result = reposnap_lib::run(
        &mut host,
        [
            "reposnap",
            "download",
            REPO_URL,
            "--output",
            output.as_str(),
            "--config",
            &provider.config_path(),
        ],
    )
    .await;

    assert!(result.is_ok(), "download failed: {result:?}");
    assert!(host.output_str().contains("1 of 2 file(s) archived"), "{}", host.output_str());
    assert!(host.error_str().contains("missing.txt"), "{}", host.error_str());

    let archive = ZipArchive::new(Cursor::new(std::fs::read(&output).unwrap())).unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.file_names().collect::<Vec<_>>(), ["a.txt"]);
}

#[tokio::test]
async fn test_download_of_unknown_repository_writes_nothing() {
    let provider = Provider::start().await;
    provider.tree(404, json!({"message": "Not Found"})).await;
    let output = provider.path("snapshot.zip");

    let mut host = TestHost::new();
    let result = reposnap_lib::run(
        &mut host,
        [
            "reposnap",
            "download",
            REPO_URL,
            "-o",
            output.as_str(),
            "-c",
            &provider.config_path(),
        ],
    )
    .await;

    assert!(result.is_err());
    assert!(!output.exists());
}

#[tokio::test]
async fn test_init_generates_loadable_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("generated.toml")).unwrap();

    let mut host = TestHost::new();
    reposnap_lib::run(&mut host, ["reposnap", "init", path.as_str()]).await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let config: reposnap_lib::Config = toml::from_str(&text).unwrap();
    assert_eq!(config, reposnap_lib::Config::default());
    assert!(host.output_str().contains("generated.toml"));
}
