//! HTTP edge tests against an in-process server.

use async_trait::async_trait;
use std::sync::Arc;

use member_chat::config::Config;
use member_chat::error::ModelError;
use member_chat::inference::{GenerateOptions, Generation, InferenceClient};
use member_chat::models::{Member, MemberDetail};
use member_chat::orchestrator::ChatOrchestrator;
use member_chat::server::run_server_with;
use member_chat::store::{InMemoryStore, WorkerPoolStore};

// ─── Helpers ────────────────────────────────────────────────────────

struct RoutingModel;

#[async_trait]
impl InferenceClient for RoutingModel {
    fn model_name(&self) -> &str {
        "routing"
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<Generation, ModelError> {
        let response = if prompt.contains("Reply with exactly one label") {
            "DATABASE_QUERY"
        } else if prompt.contains("Write ONE SQL statement") {
            "SELECT member_detail.phon_number FROM member \
             LEFT JOIN member_detail ON member.memberid = member_detail.memberid"
        } else {
            "Hello there."
        };
        Ok(Generation {
            model: "routing".into(),
            response: response.into(),
            done: true,
        })
    }
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn start_server() -> u16 {
    let port = find_free_port();
    let config = Config::from_toml(&format!(
        "[db]\npath = \"unused.sqlite\"\n\n[server]\nbind = \"127.0.0.1:{}\"\n",
        port
    ))
    .unwrap();

    let store = InMemoryStore::with_members([Member {
        member_id: 123,
        first_name: Some("Ada".into()),
        last_name: Some("Lovelace".into()),
        email: Some("ada@example.com".into()),
        detail: Some(MemberDetail {
            phone_number: Some("555-1111".into()),
            ..Default::default()
        }),
    }]);
    let orchestrator = ChatOrchestrator::new(
        &config,
        Arc::new(RoutingModel),
        Arc::new(WorkerPoolStore::new(store, 2)),
    );

    tokio::spawn(async move {
        run_server_with(&config, Arc::new(orchestrator)).await.unwrap();
    });
    wait_for_server(port).await;
    port
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let port = start_server().await;
    let body: serde_json::Value = reqwest::get(format!("http://127.0.0.1:{}/health", port))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "deepseek-r1:1.5b");
}

#[tokio::test]
async fn test_chat_returns_plain_text() {
    let port = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://127.0.0.1:{}/api/ai/chat", port))
        .body("What's member 123's phone?")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.text().await.unwrap(), "Member ID: 123\nPhone: 555-1111");

    let resp = client
        .post(format!("http://127.0.0.1:{}/api/ai/chat", port))
        .body("Explain quantum physics")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.text().await.unwrap(), "Hello there.");
}

#[tokio::test]
async fn test_trace_returns_pipeline_result() {
    let port = start_server().await;
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .post(format!("http://127.0.0.1:{}/api/ai/chat/trace", port))
        .json(&serde_json::json!({ "query": "What's member 123's phone?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["stage_reached"], "formatted");
    assert_eq!(body["degraded"], false);
    assert!(body["sql"]
        .as_str()
        .unwrap()
        .ends_with("WHERE member.memberid = 123"));
}

#[tokio::test]
async fn test_trace_rejects_malformed_body() {
    let port = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://127.0.0.1:{}/api/ai/chat/trace", port))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_empty_body_gets_prompt() {
    let port = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://127.0.0.1:{}/api/ai/chat", port))
        .body("   ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.text().await.unwrap(), "Please enter a question.");
}
