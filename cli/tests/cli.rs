//! Drive the `linkedin-ads` binary against the mock server.

use std::io::Write;
use std::sync::Arc;

use assert_cmd::Command;
use mock_server::{MockConfig, MockState, Shared, AD_ACCOUNT_BODY, IMAGE_URN, VIDEO_URN};
use predicates::str::contains;
use serde_json::Value;

const OWNER: &str = "urn:li:organization:2414183";

fn start(config: MockConfig) -> (String, Shared) {
    let state: Shared = Arc::new(tokio::sync::RwLock::new(MockState::new(config)));
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    let server_state = state.clone();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run_with(listener, server_state).await
        })
        .unwrap();
    });

    (format!("http://{addr}/rest"), state)
}

/// The binary with a clean environment pointed at `base_url`.
fn cli(base_url: &str) -> Command {
    let mut cmd = Command::cargo_bin("linkedin-ads").unwrap();
    cmd.env_remove("LINKEDIN_AD_ACCOUNT_ID")
        .env_remove("LINKEDIN_ASSET_ID")
        .env_remove("RUST_LOG")
        .env("LINKEDIN_ACCESS_TOKEN", "test-token")
        .env("LINKEDIN_BASE_URL", base_url);
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn list_works_without_a_token() {
    let mut cmd = Command::cargo_bin("linkedin-ads").unwrap();
    cmd.env_remove("LINKEDIN_ACCESS_TOKEN")
        .arg("list")
        .assert()
        .success()
        .stdout(contains("campaign-group"))
        .stdout(contains("get, upload"));
}

#[test]
fn describe_prints_the_operation() {
    cli("http://127.0.0.1:1/rest")
        .args(["describe", "creative", "search"])
        .assert()
        .success()
        .stdout(contains("GET /adAccounts/{account}/creatives"))
        .stdout(contains("query: q=criteria"));
}

#[test]
fn missing_token_is_a_failure() {
    let mut cmd = cli("http://127.0.0.1:1/rest");
    cmd.env_remove("LINKEDIN_ACCESS_TOKEN")
        .args(["ad-account", "get", "--id", "1"])
        .assert()
        .code(1)
        .stderr(contains("access token missing"));
}

#[test]
fn unknown_resource_is_a_usage_error() {
    cli("http://127.0.0.1:1/rest")
        .args(["nonsense", "get"])
        .assert()
        .code(2);
}

#[test]
fn ad_account_get_raw_prints_the_backend_body() {
    let (base_url, _state) = start(MockConfig::default());
    cli(&base_url)
        .args(["ad-account", "get", "--id", "123456", "--raw"])
        .assert()
        .success()
        .stdout(contains("HTTP 200\n"))
        .stdout(contains(AD_ACCOUNT_BODY));
}

#[test]
fn default_ad_account_fills_the_id() {
    let (base_url, _state) = start(MockConfig::default());
    let output = cli(&base_url)
        .env("LINKEDIN_AD_ACCOUNT_ID", "123456")
        .args(["ad-account", "get"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let expected: Value = serde_json::from_str(AD_ACCOUNT_BODY).unwrap();
    assert_eq!(stdout_json(&output), expected);
}

#[test]
fn api_errors_exit_one_with_the_status() {
    let (base_url, _state) = start(MockConfig::default());
    cli(&base_url)
        .args(["ad-account", "get", "--id", "999"])
        .assert()
        .code(1)
        .stderr(contains("HTTP 404"));
}

#[test]
fn created_id_is_printed() {
    let (base_url, _state) = start(MockConfig::default());
    cli(&base_url)
        .args(["campaign", "create", "--params", r#"{"account":"123456","name":"Spring"}"#])
        .assert()
        .success()
        .stdout("{\"id\":\"urn:li:sponsoredCampaign:701\"}\n");
}

#[test]
fn bad_params_json_fails_before_sending() {
    let (base_url, state) = start(MockConfig::default());
    cli(&base_url)
        .args(["campaign", "search", "--params", "{oops"])
        .assert()
        .code(1)
        .stderr(contains("--params is not valid JSON"));
    assert!(state.blocking_read().log.is_empty());
}

#[test]
fn raw_request_can_be_forced_through_the_tunnel() {
    let (base_url, _state) = start(MockConfig::default());
    let output = cli(&base_url)
        .args(["raw", "GET", "/adAnalytics", "--query", r#"{"q":"analytics"}"#])
        .args(["--tunnel", "always"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let body = stdout_json(&output);
    assert_eq!(body["tunneled"], true);
    assert_eq!(body["query"], "q=analytics");
}

#[test]
fn parameter_flags_reach_the_query() {
    let (base_url, _state) = start(MockConfig::default());
    let output = cli(&base_url)
        .args(["analytics", "query", "--pivot", "CAMPAIGN", "--time-granularity", "DAILY"])
        .args(["--date-range", r#"{"start":{"year":2024,"month":1,"day":1}}"#])
        .args(["--accounts", "urn:li:sponsoredAccount:1"])
        .args(["--accounts", "urn:li:sponsoredAccount:2"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        stdout_json(&output)["query"],
        concat!(
            "q=analytics&pivot=CAMPAIGN&timeGranularity=DAILY",
            "&dateRange=(start:(year:2024,month:1,day:1))",
            "&accounts=List(urn%3Ali%3AsponsoredAccount%3A1,urn%3Ali%3AsponsoredAccount%3A2)"
        )
    );
}

#[test]
fn image_upload_reports_the_asset() {
    let (base_url, state) = start(MockConfig::default());
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&vec![7u8; 1000]).unwrap();

    let output = cli(&base_url)
        .args(["image", "upload", "--owner", OWNER, "--file"])
        .arg(file.path())
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report = stdout_json(&output);
    assert_eq!(report["asset"], IMAGE_URN);
    assert_eq!(report["kind"], "image");
    assert_eq!(report["size"], 1000);
    assert_eq!(report["confirmed"], false);
    assert_eq!(state.blocking_read().parts.get(&0), Some(&1000));
}

#[test]
fn video_upload_poll_timeout_exits_three() {
    let (base_url, state) = start(MockConfig {
        video_statuses: vec!["PROCESSING".to_string()],
        ..MockConfig::default()
    });
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&vec![1u8; 2048]).unwrap();

    cli(&base_url)
        .args(["video", "upload", "--owner", OWNER, "--wait"])
        .args(["--poll-interval", "0", "--max-polls", "2", "--file"])
        .arg(file.path())
        .assert()
        .code(3)
        .stderr(contains(VIDEO_URN));
    assert_eq!(state.blocking_read().status_polls, 2);
}

#[test]
fn empty_file_is_rejected() {
    let file = tempfile::NamedTempFile::new().unwrap();
    cli("http://127.0.0.1:1/rest")
        .args(["image", "upload", "--owner", OWNER, "--file"])
        .arg(file.path())
        .assert()
        .code(1)
        .stderr(contains("is empty"));
}
