use mockito::{Matcher, Server};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn mchat_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("mchat");
    path
}

fn setup_test_env(inference_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    fs::write(
        data_dir.join("members.json"),
        r#"[
  {
    "member_id": 123,
    "first_name": "Ada",
    "last_name": "Lovelace",
    "email": "ada@example.com",
    "pass": "hunter2",
    "detail": {
      "occupation": "Engineer",
      "address1": "12 Analytical Way",
      "city": "London",
      "country": "UK",
      "zipcode": 10101,
      "phone_number": "555-1111",
      "user_name": "ada",
      "profile_status": "active"
    }
  },
  {
    "member_id": 456,
    "first_name": "Grace",
    "last_name": "Hopper",
    "email": "grace@example.com"
  }
]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/members.sqlite"

[inference]
url = "{url}"
retry_backoff_ms = 1

[server]
bind = "127.0.0.1:7332"

[logging]
filter = "warn"
"#,
        root = root.display(),
        url = inference_url
    );

    let config_path = config_dir.join("mchat.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_mchat(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = mchat_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run mchat binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn seeded(inference_url: &str) -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env(inference_url);
    let fixture = tmp.path().join("data/members.json");
    let (_, stderr, ok) = run_mchat(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    let (stdout, stderr, ok) = run_mchat(&config_path, &["seed", fixture.to_str().unwrap()]);
    assert!(ok, "seed failed: {}", stderr);
    assert!(stdout.contains("Seeded 2 member(s)"));
    (tmp, config_path)
}

fn generation(response: &str) -> String {
    serde_json::json!({ "model": "deepseek-r1:1.5b", "response": response, "done": true })
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:1");

    let (stdout, stderr, success) = run_mchat(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/members.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:1");

    let (_, _, success1) = run_mchat(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_mchat(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_get_never_shows_credential() {
    let (_tmp, config_path) = seeded("http://127.0.0.1:1");

    let (stdout, stderr, success) = run_mchat(&config_path, &["get", "123"]);
    assert!(success, "get failed: {}", stderr);
    assert!(stdout.contains("Ada Lovelace"));
    assert!(stdout.contains("555-1111"));
    assert!(!stdout.contains("hunter2"));
}

#[test]
fn test_get_missing_member_fails() {
    let (_tmp, config_path) = seeded("http://127.0.0.1:1");

    let (_, stderr, success) = run_mchat(&config_path, &["get", "999"]);
    assert!(!success);
    assert!(stderr.contains("member not found"));
}

#[test]
fn test_ask_member_phone() {
    let mut server = Server::new();
    let classify = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::Regex("Reply with exactly one label".into()))
        .with_status(200)
        .with_body(generation("<think>member lookup</think>DATABASE_QUERY"))
        .expect(1)
        .create();
    let sql = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::Regex("Write ONE SQL statement".into()))
        .with_status(200)
        .with_body(generation(
            "```sql\nSELECT member_detail.phon_number FROM member LEFT JOIN member_detail ON member.memberid = member_detail.memberid\n```",
        ))
        .expect(1)
        .create();

    let (_tmp, config_path) = seeded(&server.url());

    let (stdout, stderr, success) =
        run_mchat(&config_path, &["ask", "What's member 123's phone?", "--trace"]);
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.starts_with("Member ID: 123\nPhone: 555-1111"));
    assert!(!stdout.contains("Engineer"));
    assert!(stdout.contains("degraded: false"));
    assert!(stdout.contains("WHERE member.memberid = 123"));

    classify.assert();
    sql.assert();
}

#[test]
fn test_ask_general_chat_skips_classification() {
    let mut server = Server::new();
    let chat = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "prompt": "Explain quantum physics",
            "options": { "temperature": 0.7 }
        })))
        .with_status(200)
        .with_body(generation("<think>physics...</think>Quantum physics describes nature at small scales."))
        .expect(1)
        .create();

    let (_tmp, config_path) = setup_test_env(&server.url());

    let (stdout, stderr, success) = run_mchat(&config_path, &["ask", "Explain quantum physics"]);
    assert!(success, "ask failed: {}", stderr);
    assert_eq!(
        stdout.trim(),
        "Quantum physics describes nature at small scales."
    );
    chat.assert();
}

#[test]
fn test_ask_with_model_down_still_answers() {
    let (_tmp, config_path) = seeded("http://127.0.0.1:1");

    let (stdout, stderr, success) =
        run_mchat(&config_path, &["ask", "What's member 123's phone?", "--trace"]);
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.contains("degraded: true"));
    assert!(!stdout.contains("127.0.0.1:1"));
}
