use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use printbridge::config::AppConfig;
use printbridge::context::AppContext;
use printbridge::core::transport::{SimulatedTransport, TcpTransport};
use printbridge::core::{
    InMemoryJobStore, InMemoryPrinterRegistry, JobId, JobStore, PrinterStatus, PrinterStore,
    PrinterTransport,
};
use printbridge::web::router;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Bridge {
    base: String,
    client: reqwest::Client,
    ctx: AppContext,
}

impl Bridge {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        read(response).await
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        read(response).await
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.delete(self.url(path)).send().await.unwrap();
        read(response).await
    }
}

async fn read(response: reqwest::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = response.json().await.unwrap_or(Value::Null);
    (status, body)
}

fn fast_config() -> AppConfig {
    AppConfig {
        connection_timeout_ms: 500,
        max_retries: 3,
        retry_delay_ms: 20,
        probe_timeout_ms: 200,
        ..Default::default()
    }
}

async fn spawn_bridge(config: AppConfig, transport: Arc<dyn PrinterTransport>) -> Bridge {
    let ctx = AppContext::with_parts(
        config,
        Arc::new(InMemoryPrinterRegistry::new()),
        Arc::new(InMemoryJobStore::new()),
        transport,
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(ctx.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Bridge {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        ctx,
    }
}

async fn tcp_bridge() -> Bridge {
    spawn_bridge(fast_config(), Arc::new(TcpTransport::new())).await
}

/// A raw-socket printer stand-in. Every non-empty connection's bytes are
/// forwarded on the returned channel; probes (connect then close) are ignored.
async fn fake_printer() -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                if stream.read_to_end(&mut buf).await.is_ok() && !buf.is_empty() {
                    let _ = tx.send(buf);
                }
            });
        }
    });

    (addr, rx)
}

/// A localhost port with nothing listening on it.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn badge() -> Value {
    json!({
        "firstName": "Grace",
        "lastName": "Hopper",
        "eventName": "Compiler Days",
        "registrationId": "R-1906",
        "badgeNumber": 42
    })
}

#[tokio::test]
async fn test_health() {
    let bridge = tcp_bridge().await;

    let (status, body) = bridge.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["printerCount"], 0);
    assert!(body["uptimeSeconds"].is_u64());
}

#[tokio::test]
async fn test_register_printer_defaults() {
    let bridge = tcp_bridge().await;

    let (status, body) = bridge
        .post(
            "/printers",
            json!({"name": "Lobby", "ipAddress": "192.168.1.50"}),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Lobby");
    assert_eq!(body["ipAddress"], "192.168.1.50");
    assert_eq!(body["port"], 9100);
    assert_eq!(body["status"], "unknown");
    assert!(!body["id"].as_str().unwrap().is_empty());
    assert!(body.get("lastSeen").is_none());

    let (_, health) = bridge.get("/health").await;
    assert_eq!(health["printerCount"], 1);
}

#[tokio::test]
async fn test_register_printer_rejects_bad_input() {
    let bridge = tcp_bridge().await;

    let (status, body) = bridge
        .post("/printers", json!({"name": "Lobby", "ipAddress": "not-an-ip"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");

    let (status, body) = bridge
        .post("/printers", json!({"ipAddress": "10.0.0.1"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");

    assert!(bridge.ctx.printers.is_empty());
}

#[tokio::test]
async fn test_duplicate_printer_id_conflicts() {
    let bridge = tcp_bridge().await;
    let printer = json!({"id": "lobby", "name": "Lobby", "ipAddress": "10.0.0.1"});

    let (status, _) = bridge.post("/printers", printer.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = bridge.post("/printers", printer).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_badge_print_reaches_printer() {
    let bridge = tcp_bridge().await;
    let (printer_addr, mut received) = fake_printer().await;

    let (_, printer) = bridge
        .post(
            "/printers",
            json!({
                "name": "Front desk",
                "ipAddress": printer_addr.ip().to_string(),
                "port": printer_addr.port()
            }),
        )
        .await;
    let printer_id = printer["id"].as_str().unwrap();

    let (status, body) = bridge
        .post("/print", json!({"printerId": printer_id, "badge": badge()}))
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "success");
    assert_eq!(body["retryCount"], 0);
    assert!(body["sentAt"].is_string());
    assert!(body["completedAt"].is_string());

    let payload = timeout(Duration::from_secs(2), received.recv())
        .await
        .expect("printer never received a label")
        .unwrap();
    let zpl = String::from_utf8(payload).unwrap();
    assert!(zpl.starts_with("^XA"));
    assert!(zpl.contains("HOPPER"));
    assert!(zpl.contains("R-1906"));
    assert!(zpl.trim_end().ends_with("^XZ"));

    let job_id = body["jobId"].as_str().unwrap();
    let (status, job) = bridge.get(&format!("/jobs/{job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "success");
    assert_eq!(job["printerId"], printer_id);
    assert!(job.get("errorMessage").is_none());

    let (status, printers) = bridge.get("/printers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(printers[0]["status"], "online");
    assert!(printers[0]["lastSeen"].is_string());
}

#[tokio::test]
async fn test_invalid_badge_creates_no_job() {
    let bridge = tcp_bridge().await;
    let (printer_addr, _received) = fake_printer().await;

    let mut fields = badge();
    fields["lastName"] = json!("   ");
    let (status, body) = bridge
        .post(
            "/print",
            json!({
                "printer": {"ipAddress": "127.0.0.1", "port": printer_addr.port()},
                "badge": fields
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(body["error"].as_str().unwrap().contains("lastName"));
    assert!(bridge.ctx.jobs.is_empty());
    assert!(bridge.ctx.printers.is_empty());
}

#[tokio::test]
async fn test_badge_without_last_name_rejected() {
    let bridge = tcp_bridge().await;
    let (printer_addr, _received) = fake_printer().await;

    let (status, body) = bridge
        .post(
            "/print",
            json!({
                "printer": {"ipAddress": "127.0.0.1", "port": printer_addr.port()},
                "badge": {
                    "firstName": "Grace",
                    "eventName": "Compiler Days",
                    "registrationId": "R-1906"
                }
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(body["error"].as_str().unwrap().contains("lastName"));
    assert!(bridge.ctx.jobs.is_empty());
    assert!(bridge.ctx.printers.is_empty());
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let bridge = tcp_bridge().await;

    let (status, body) = bridge.get(&format!("/jobs/{}", JobId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "INVALID_REQUEST");

    let (status, body) = bridge.get("/jobs/not-a-job-id").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_unreachable_printer_fails_job() {
    let bridge = tcp_bridge().await;
    let port = closed_port().await;
    let (_, printer) = bridge
        .post(
            "/printers",
            json!({"name": "Ghost", "ipAddress": "127.0.0.1", "port": port}),
        )
        .await;

    let (status, body) = bridge
        .post(
            "/print",
            json!({"printerId": printer["id"], "badge": badge()}),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "PRINTER_OFFLINE");
    assert!(body["details"].as_str().unwrap().contains("connection refused"));

    let job_id = body["jobId"].as_str().unwrap();
    let (status, job) = bridge.get(&format!("/jobs/{job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "failed");
    assert_eq!(job["retryCount"], 3);
    assert!(job["completedAt"].is_string());
    assert!(
        job["errorMessage"]
            .as_str()
            .unwrap()
            .starts_with("connection refused")
    );

    let printers = bridge.ctx.printers.list();
    assert_eq!(printers.len(), 1);
    assert_eq!(printers[0].name, "Ghost");
    assert_eq!(printers[0].status, PrinterStatus::Offline);
}

#[tokio::test]
async fn test_unknown_printer_id() {
    let bridge = tcp_bridge().await;

    let (status, body) = bridge
        .post("/print", json!({"printerId": "nope", "badge": badge()}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PRINTER_NOT_FOUND");

    let (status, body) = bridge.post("/print", json!({"badge": badge()})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_raw_print_validation() {
    let bridge = tcp_bridge().await;
    let (printer_addr, mut received) = fake_printer().await;
    let printer = json!({"ipAddress": "127.0.0.1", "port": printer_addr.port()});

    let (status, body) = bridge
        .post("/print-raw", json!({"printer": printer, "zpl": "hello"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ZPL");

    let (status, body) = bridge.post("/print-raw", json!({"printer": printer})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(bridge.ctx.jobs.is_empty());

    let (status, body) = bridge
        .post(
            "/print-raw",
            json!({"printer": printer, "zpl": "^XA^FO50,50^FDRAW^FS^XZ"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "success");

    let payload = timeout(Duration::from_secs(2), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, b"^XA^FO50,50^FDRAW^FS^XZ");
}

#[tokio::test]
async fn test_remove_printer() {
    let bridge = tcp_bridge().await;
    let (_, printer) = bridge
        .post(
            "/printers",
            json!({"id": "lobby", "name": "Lobby", "ipAddress": "10.0.0.1"}),
        )
        .await;
    assert_eq!(printer["id"], "lobby");

    let (status, body) = bridge.delete("/printers/lobby").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["message"].as_str().unwrap().contains("Lobby"));

    let (status, body) = bridge.delete("/printers/lobby").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PRINTER_NOT_FOUND");
}

#[tokio::test]
async fn test_test_print_creates_job() {
    let transport = SimulatedTransport::new();
    let bridge = spawn_bridge(fast_config(), Arc::new(transport.clone())).await;
    bridge
        .post(
            "/printers",
            json!({"id": "lobby", "name": "Lobby", "ipAddress": "10.0.0.1"}),
        )
        .await;

    let (status, body) = bridge.post("/printers/lobby/test", Value::Null).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    let job_id = body["jobId"].as_str().unwrap();
    let (_, job) = bridge.get(&format!("/jobs/{job_id}")).await;
    assert_eq!(job["status"], "success");

    let deliveries = transport.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert!(String::from_utf8_lossy(&deliveries[0].payload).contains("PRINT BRIDGE TEST"));

    let (status, body) = bridge.post("/printers/missing/test", Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PRINTER_NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_json_and_unknown_route() {
    let bridge = tcp_bridge().await;

    let response = bridge
        .client
        .post(bridge.url("/print"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(body["error"].is_string());

    let (status, body) = bridge.get("/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_cors_allowed_origin() {
    let config = AppConfig {
        allowed_origins: vec!["https://checkin.example.com".to_string()],
        ..fast_config()
    };
    let bridge = spawn_bridge(config, Arc::new(SimulatedTransport::new())).await;

    let preflight = bridge
        .client
        .request(Method::OPTIONS, bridge.url("/print"))
        .header("origin", "https://checkin.example.com")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();
    assert!(preflight.status().is_success());
    assert_eq!(
        preflight.headers()["access-control-allow-origin"],
        "https://checkin.example.com"
    );
    assert!(
        preflight.headers()["access-control-allow-methods"]
            .to_str()
            .unwrap()
            .contains("POST")
    );

    let foreign = bridge
        .client
        .get(bridge.url("/health"))
        .header("origin", "https://elsewhere.example")
        .send()
        .await
        .unwrap();
    assert_eq!(foreign.status(), StatusCode::OK);
    assert!(
        foreign
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}

#[tokio::test]
async fn test_swept_job_is_gone() {
    let transport = SimulatedTransport::new();
    let bridge = spawn_bridge(fast_config(), Arc::new(transport)).await;

    let (status, body) = bridge
        .post(
            "/print",
            json!({"printer": {"ipAddress": "10.0.0.9"}, "badge": badge()}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["jobId"].as_str().unwrap();

    assert_eq!(bridge.ctx.jobs.sweep(Duration::ZERO), 1);

    let (status, body) = bridge.get(&format!("/jobs/{job_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_wrong_method_returns_json_error() {
    let bridge = tcp_bridge().await;

    let (status, body) = bridge.get("/print").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(body["error"].as_str().unwrap().contains("GET"));

    let (status, body) = bridge.delete("/health").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["code"], "INVALID_REQUEST");
}
