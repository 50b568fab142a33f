//! Protocol-level tests: real TCP connections against the session
//! handler, with the neural model replaced by a stub so every path that
//! does not need trained weights is covered.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use image::{GrayImage, Luma};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use server::ServiceContext;
use server::error::PipelineError;
use server::model::{HeadClassifier, HeadOutputs, TaskPrediction};
use server::session::handle_connection;
use shared::ResponseMessage;

struct StubClassifier {
    heads: HeadOutputs,
}

impl StubClassifier {
    fn new(hemorrhage: f64, midline: f64, ventricle: f64) -> Self {
        Self {
            heads: HeadOutputs {
                hemorrhage: TaskPrediction::from_pair(1.0 - hemorrhage, hemorrhage),
                midline: TaskPrediction::from_pair(1.0 - midline, midline),
                ventricle: TaskPrediction::from_pair(1.0 - ventricle, ventricle),
            },
        }
    }
}

impl HeadClassifier for StubClassifier {
    fn device_label(&self) -> String {
        "stub:0".to_string()
    }

    fn run(&self, _image_path: &str) -> Result<HeadOutputs, PipelineError> {
        Ok(self.heads)
    }
}

async fn serve(ctx: ServiceContext) -> SocketAddr {
    let ctx = Arc::new(ctx);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handle_connection(stream, Arc::clone(&ctx)));
        }
    });
    addr
}

async fn connect(addr: SocketAddr) -> BufReader<TcpStream> {
    BufReader::new(TcpStream::connect(addr).await.unwrap())
}

async fn roundtrip(conn: &mut BufReader<TcpStream>, request: &str) -> String {
    conn.write_all(format!("{}\n", request).as_bytes())
        .await
        .unwrap();
    let mut reply = String::new();
    conn.read_line(&mut reply).await.unwrap();
    reply.trim_end().to_string()
}

fn fixture_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ct-session-{}-{}", test, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn request_for(path: &str) -> String {
    serde_json::to_string(&shared::AnalysisRequest {
        image_path: path.to_string(),
    })
    .unwrap()
}

#[tokio::test]
async fn unloaded_model_short_circuits_every_request() {
    let addr = serve(ServiceContext { classifier: None }).await;
    let mut conn = connect(addr).await;

    let raw = roundtrip(&mut conn, &request_for("anything.png")).await;
    assert_eq!(raw, r#"{"error":"Model not loaded"}"#);
    // No inference was attempted: the success schema never appears.
    assert!(!raw.contains("analysis_duration"));
}

#[tokio::test]
async fn missing_file_is_reported_without_running_inference() {
    let ctx = ServiceContext {
        classifier: Some(Box::new(StubClassifier::new(0.9, 0.1, 0.1))),
    };
    let addr = serve(ctx).await;
    let mut conn = connect(addr).await;

    let raw = roundtrip(&mut conn, &request_for("does/not/exist.png")).await;
    assert_eq!(raw, r#"{"error":"File not found: does/not/exist.png"}"#);
    assert!(!raw.contains("analysis_duration"));
}

#[tokio::test]
async fn malformed_message_keeps_connection_alive() {
    let addr = serve(ServiceContext { classifier: None }).await;
    let mut conn = connect(addr).await;

    let raw = roundtrip(&mut conn, "this is not json").await;
    match serde_json::from_str::<ResponseMessage>(&raw).unwrap() {
        ResponseMessage::Error(e) => assert!(e.error.starts_with("Malformed request:")),
        ResponseMessage::Report(_) => panic!("expected an error reply"),
    }

    // The same connection still answers the next request.
    let raw = roundtrip(&mut conn, &request_for("x.png")).await;
    assert_eq!(raw, r#"{"error":"Model not loaded"}"#);
}

#[tokio::test]
async fn successful_analysis_returns_full_report() {
    let dir = fixture_dir("report");
    let scan = dir.join("scan.png");
    GrayImage::from_pixel(64, 64, Luma([128u8]))
        .save(&scan)
        .unwrap();

    let ctx = ServiceContext {
        classifier: Some(Box::new(StubClassifier::new(0.934, 0.2, 0.1))),
    };
    let addr = serve(ctx).await;
    let mut conn = connect(addr).await;

    let raw = roundtrip(&mut conn, &request_for(scan.to_str().unwrap())).await;
    assert!(!raw.contains("\"error\""));
    let report = match serde_json::from_str::<ResponseMessage>(&raw).unwrap() {
        ResponseMessage::Report(report) => report,
        ResponseMessage::Error(e) => panic!("unexpected error reply: {}", e.error),
    };

    assert_eq!(report.prediction, "Hemorrhage");
    assert_eq!(report.confidence_level, "93.40%");
    let sum = report.hemorrhage_probability + report.no_hemorrhage_probability;
    assert!((sum - 1.0).abs() < 1e-4);
    assert!(report.analysis_duration >= 0.0);
    assert_eq!(report.device, "stub:0");
    // Midline decided "no shift": zero score, centered detail, no
    // geometric pass regardless of pixel content.
    assert!(!report.midline_shift);
    assert_eq!(report.shift_score, 0.0);
    assert_eq!(report.midline_detail, "Midline structures centered");
    assert!(!report.ventricle_issue);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn degraded_geometry_still_yields_success_schema() {
    let dir = fixture_dir("degraded");
    let scan = dir.join("corrupt.png");
    // Exists on disk, but the raw bytes cannot be decoded for the
    // classical pass; the stub stands in for the tensor path.
    std::fs::write(&scan, b"not decodable pixels").unwrap();

    let ctx = ServiceContext {
        classifier: Some(Box::new(StubClassifier::new(0.2, 0.9, 0.8))),
    };
    let addr = serve(ctx).await;
    let mut conn = connect(addr).await;

    let raw = roundtrip(&mut conn, &request_for(scan.to_str().unwrap())).await;
    let report = match serde_json::from_str::<ResponseMessage>(&raw).unwrap() {
        ResponseMessage::Report(report) => report,
        ResponseMessage::Error(e) => panic!("degradation must not become an error: {}", e.error),
    };

    assert_eq!(report.prediction, "Normal");
    assert!(report.midline_shift);
    assert_eq!(report.shift_score, 5.0);
    assert!(report.midline_detail.contains("confidence: 90.0%"));
    assert!(report.ventricle_issue);
    assert!(report.ventricle_detail.contains("confidence: 80.0%"));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn n_requests_yield_n_ordered_responses() {
    let addr = serve(ServiceContext { classifier: None }).await;
    let mut conn = connect(addr).await;

    // Pipelined: a malformed line between two valid ones, sent at once.
    let batch = format!(
        "{}\nnot json at all\n{}\n",
        request_for("first.png"),
        request_for("third.png")
    );
    conn.write_all(batch.as_bytes()).await.unwrap();

    let mut replies = Vec::new();
    for _ in 0..3 {
        let mut line = String::new();
        conn.read_line(&mut line).await.unwrap();
        replies.push(line.trim_end().to_string());
    }

    assert_eq!(replies[0], r#"{"error":"Model not loaded"}"#);
    assert!(replies[1].contains("Malformed request"));
    assert_eq!(replies[2], r#"{"error":"Model not loaded"}"#);
}

#[tokio::test]
async fn concurrent_connections_get_independent_replies() {
    let ctx = ServiceContext {
        classifier: Some(Box::new(StubClassifier::new(0.9, 0.1, 0.1))),
    };
    let addr = serve(ctx).await;

    let mut first = connect(addr).await;
    let mut second = connect(addr).await;

    // Both in flight at once; each connection must get its own answer.
    first
        .write_all(format!("{}\n", request_for("alpha.png")).as_bytes())
        .await
        .unwrap();
    second
        .write_all(format!("{}\n", request_for("beta.png")).as_bytes())
        .await
        .unwrap();

    let mut first_reply = String::new();
    let mut second_reply = String::new();
    first.read_line(&mut first_reply).await.unwrap();
    second.read_line(&mut second_reply).await.unwrap();

    assert_eq!(first_reply.trim_end(), r#"{"error":"File not found: alpha.png"}"#);
    assert_eq!(second_reply.trim_end(), r#"{"error":"File not found: beta.png"}"#);
}

#[tokio::test]
async fn peer_close_ends_only_that_connection() {
    let addr = serve(ServiceContext { classifier: None }).await;

    {
        let mut conn = connect(addr).await;
        let raw = roundtrip(&mut conn, &request_for("x.png")).await;
        assert_eq!(raw, r#"{"error":"Model not loaded"}"#);
        // Dropped here: peer close.
    }

    // The service keeps accepting and answering.
    let mut conn = connect(addr).await;
    let raw = roundtrip(&mut conn, &request_for("y.png")).await;
    assert_eq!(raw, r#"{"error":"Model not loaded"}"#);
}
