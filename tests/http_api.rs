use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

use veracity::audit::AuditLog;
use veracity::classifier::{Classification, Classifier, ClassifierError};
use veracity::job::Label;
use veracity::{Veracity, VeracityConfig};

/// Human for ordinary text, fails for text mentioning "explode".
struct FixedClassifier;

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
        if text.contains("explode") {
            return Err(ClassifierError::Api {
                status: 500,
                message: "model crashed".into(),
            });
        }
        Ok(Classification {
            label: Label::Human,
            confidence: 92.5,
            latency_seconds: 0.01,
        })
    }
}

struct TestServer {
    base_url: String,
    audit: Arc<AuditLog>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = VeracityConfig {
            workers: 2,
            queue_capacity: 16,
            ..Default::default()
        };
        let audit = Arc::new(AuditLog::open_in_memory().unwrap());
        let app = Veracity::start(&config, Arc::new(FixedClassifier), Arc::clone(&audit));
        let router = veracity::http::router(app.http_state());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
            app.shutdown().await;
        });

        Self {
            base_url,
            audit,
            handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn submit(client: &reqwest::Client, base_url: &str, text: &str) -> reqwest::Response {
    client
        .post(format!("{base_url}/analyze"))
        .json(&json!({ "text": text }))
        .send()
        .await
        .unwrap()
}

async fn poll_until_finished(client: &reqwest::Client, base_url: &str, job_id: &str) -> Value {
    for _ in 0..200 {
        let res = client
            .get(format!("{base_url}/results/{job_id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        if body["state"] != "processing" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish in time");
}

#[tokio::test]
async fn submit_returns_202_and_eventually_completes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = submit(&client, &srv.base_url, "Hello world").await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: Value = res.json().await.unwrap();
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let finished = poll_until_finished(&client, &srv.base_url, &job_id).await;
    assert_eq!(
        finished,
        json!({
            "state": "complete",
            "result": {
                "label": "Human-written",
                "confidence": 92.5,
                "processing_time_seconds": 0.01
            }
        })
    );

    let record = srv.audit.find_by_job(&job_id).unwrap().unwrap();
    assert_eq!(record.input_text, "Hello world");
    assert_eq!(record.label, Label::Human);
}

#[tokio::test]
async fn completed_result_is_byte_identical_on_repeat() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let body: Value = submit(&client, &srv.base_url, "Hello world")
        .await
        .json()
        .await
        .unwrap();
    let job_id = body["job_id"].as_str().unwrap().to_string();
    poll_until_finished(&client, &srv.base_url, &job_id).await;

    let url = format!("{}/results/{job_id}", srv.base_url);
    let first = client.get(&url).send().await.unwrap().bytes().await.unwrap();
    for _ in 0..3 {
        let again = client.get(&url).send().await.unwrap().bytes().await.unwrap();
        assert_eq!(again, first);
    }
}

#[tokio::test]
async fn empty_text_is_400_and_creates_nothing() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = submit(&client, &srv.base_url, "   ").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_input");
    assert_eq!(srv.audit.count().unwrap(), 0);
}

#[tokio::test]
async fn unknown_job_is_404() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/results/does-not-exist", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn classifier_failure_is_reported_as_failed() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let body: Value = submit(&client, &srv.base_url, "please explode")
        .await
        .json()
        .await
        .unwrap();
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let finished = poll_until_finished(&client, &srv.base_url, &job_id).await;
    assert_eq!(finished["state"], "failed");
    assert_eq!(
        finished["error"],
        "inference API error (status 500): model crashed"
    );
    assert!(srv.audit.find_by_job(&job_id).unwrap().is_none());
}

#[tokio::test]
async fn audit_endpoints_list_newest_first() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut ids = Vec::new();
    for text in ["first text", "second text", "third text"] {
        let body: Value = submit(&client, &srv.base_url, text).await.json().await.unwrap();
        let id = body["job_id"].as_str().unwrap().to_string();
        poll_until_finished(&client, &srv.base_url, &id).await;
        ids.push(id);
    }

    let records: Vec<Value> = client
        .get(format!("{}/audit?limit=2", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["job_id"], ids[2].as_str());
    assert_eq!(records[1]["job_id"], ids[1].as_str());
    assert_eq!(records[0]["label"], "Human-written");

    let summary: Value = client
        .get(format!("{}/audit/summary", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["total_queries"], 3);
    assert_eq!(summary["human_detections"], 3);
    assert_eq!(summary["ai_detections"], 0);
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_submit_bodies_are_400_invalid_input() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let url = format!("{}/analyze", srv.base_url);

    let missing_field = client.post(&url).json(&json!({})).send().await.unwrap();
    let not_json = client
        .post(&url)
        .header("content-type", "application/json")
        .body("text=hello")
        .send()
        .await
        .unwrap();
    let wrong_content_type = client
        .post(&url)
        .header("content-type", "text/plain")
        .body(r#"{"text":"hello"}"#)
        .send()
        .await
        .unwrap();

    for res in [missing_field, not_json, wrong_content_type] {
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "invalid_input");
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    }
    assert_eq!(srv.audit.count().unwrap(), 0);
}

#[tokio::test]
async fn browser_origins_are_allowed() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("{}/analyze", srv.base_url))
        .header("origin", "http://dashboard.local")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();
    assert!(preflight.status().is_success());
    assert_eq!(preflight.headers()["access-control-allow-origin"], "*");

    let res = client
        .get(format!("{}/results/does-not-exist", srv.base_url))
        .header("origin", "http://dashboard.local")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
}
