//! Per-connection message loop: newline-delimited JSON requests in,
//! exactly one ordered JSON reply per request out. A failed request is
//! answered and the loop moves on; only peer close or an I/O error ends
//! the connection, and neither affects other connections.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use shared::{AnalysisRequest, ResponseMessage};

use crate::ServiceContext;
use crate::analysis;

pub async fn handle_connection(stream: TcpStream, ctx: Arc<ServiceContext>) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!("New connection from {}", peer);

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Read failed on connection {}: {}", peer, e);
                break;
            }
        };

        let reply = respond_to(&ctx, &line).await;
        let mut payload = match serde_json::to_string(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                // Reply types always serialize; keep the 1:1 ordering anyway.
                error!("Failed to encode reply for {}: {}", peer, e);
                r#"{"error":"Internal serialization failure"}"#.to_string()
            }
        };
        payload.push('\n');
        if let Err(e) = writer.write_all(payload.as_bytes()).await {
            warn!("Write failed on connection {}: {}", peer, e);
            break;
        }
    }

    info!("Connection closed: {}", peer);
}

async fn respond_to(ctx: &Arc<ServiceContext>, line: &str) -> ResponseMessage {
    let request: AnalysisRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return ResponseMessage::error(format!("Malformed request: {}", e)),
    };
    info!("Received request for: {}", request.image_path);

    // The blocking inference hops off the runtime threads; awaiting the
    // join handle keeps replies strictly in request order.
    let task_ctx = Arc::clone(ctx);
    let path = request.image_path.clone();
    match tokio::task::spawn_blocking(move || analysis::analyze(&task_ctx, &path)).await {
        Ok(reply) => {
            match &reply {
                ResponseMessage::Report(_) => info!("Result ready for {}", request.image_path),
                ResponseMessage::Error(e) => {
                    error!("Request for {} failed: {}", request.image_path, e.error)
                }
            }
            reply
        }
        Err(e) => {
            error!("Analysis task for {} aborted: {}", request.image_path, e);
            ResponseMessage::error("Analysis task aborted")
        }
    }
}
