//! Jump server: receives keypoint frames over TCP and answers with jump reports.
//!
//! One engine per connection. Reads jump_server.toml (or the path given as the first argument).

use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::StreamExt as _;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use sync_jump::config::Config;
use sync_jump::logging;
use sync_jump::protocol::{self, ClientMessage, ServerMessage};
use sync_jump::JumpEngine;

const DEFAULT_CONFIG_PATH: &str = "jump_server.toml";

// ---------------------------------------------------------------------------
// Message handling
// ---------------------------------------------------------------------------

fn handle_message(engine: &mut JumpEngine, msg: ClientMessage) -> ServerMessage {
    match msg {
        ClientMessage::KeypointFrame {
            timestamp_us,
            people,
        } => match engine.update(protocol::timestamp_secs(timestamp_us), &people) {
            Ok(report) => ServerMessage::FrameReport(report),
            Err(e) => ServerMessage::Error {
                message: e.to_string(),
            },
        },
        ClientMessage::QueryJumpCount => ServerMessage::JumpCount {
            count: engine.group_jumps(),
        },
        ClientMessage::Reset => {
            engine.reset();
            ServerMessage::ResetAck
        }
    }
}

/// 受信バイト列を1メッセージとして処理する。壊れたメッセージにはエラーを返して接続は維持
fn handle_bytes(engine: &mut JumpEngine, bytes: &[u8]) -> ServerMessage {
    match bincode::deserialize::<ClientMessage>(bytes) {
        Ok(msg) => handle_message(engine, msg),
        Err(e) => {
            warn!("[tcp] malformed message ({} bytes): {}", bytes.len(), e);
            ServerMessage::Error {
                message: format!("malformed message: {e}"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TCP session
// ---------------------------------------------------------------------------

async fn run_session(tcp: TcpStream, addr: SocketAddr, config: Config) -> Result<()> {
    let mut engine = JumpEngine::new(config)?;
    let mut stream = protocol::message_stream(tcp);

    let mut fps_counter: u32 = 0;
    let mut fps_timer = Instant::now();

    while let Some(frame) = stream.next().await {
        let bytes = frame.with_context(|| format!("read error from {addr}"))?;
        let reply = handle_bytes(&mut engine, &bytes);

        if let ServerMessage::FrameReport(report) = &reply {
            fps_counter += 1;
            for event in &report.events {
                debug!("[{}] jump slot={} t={:.3}", addr, event.slot, event.timestamp);
            }
        }
        protocol::send_message(&mut stream, &reply).await?;

        if fps_timer.elapsed() >= Duration::from_secs(1) {
            debug!(
                "[{}] [fps] {} (group jumps {}, round {:?})",
                addr,
                fps_counter,
                engine.group_jumps(),
                engine.round().phase()
            );
            fps_counter = 0;
            fps_timer = Instant::now();
        }
    }

    info!("[{}] disconnected (group jumps {})", addr, engine.group_jumps());
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let from_file = Path::new(&config_path).exists();
    let config = if from_file {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    let log_path =
        logging::init_with_file(&config.server.log_dir, "jump_server", config.server.verbose)?;
    info!("Jump Server ({})", env!("GIT_VERSION"));
    info!("Log: {}", log_path.display());
    if from_file {
        info!("[config] loaded {}", config_path);
    } else {
        warn!("[config] {} not found, using defaults", config_path);
    }
    info!(
        "[config] jump_threshold={}, matching={:?}, sync_window={}s, jump_end_timeout={}s",
        config.detection.jump_threshold,
        config.detection.matching,
        config.sync.sync_window,
        config.sync.jump_end_timeout
    );
    info!(
        "[config] target={}..={}, seed={:?}",
        config.round.target_min, config.round.target_max, config.round.seed
    );
    if config.server.verbose {
        info!("Verbose mode: ON");
    }

    let bind_addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .context("invalid listen_addr")?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("Listening on {}", bind_addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (tcp, addr) = accepted?;
                tcp.set_nodelay(true)?;
                info!("Client connected: {}", addr);
                let config = config.clone();
                tokio::spawn(async move {
                    if let Err(e) = run_session(tcp, addr, config).await {
                        error!("[{}] session error: {:#}", addr, e);
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_jump::pose::PersonKeypoints;

    fn engine() -> JumpEngine {
        let mut config = Config::default();
        config.round.seed = Some(1);
        JumpEngine::new(config).unwrap()
    }

    fn frame(timestamp_us: u64, ys: &[f32]) -> ClientMessage {
        ClientMessage::KeypointFrame {
            timestamp_us,
            people: ys
                .iter()
                .enumerate()
                .map(|(i, &y)| PersonKeypoints::from_reference(100.0 + 300.0 * i as f32, y))
                .collect(),
        }
    }

    #[test]
    fn test_frame_gets_report() {
        let mut engine = engine();
        match handle_message(&mut engine, frame(500_000, &[300.0, 300.0])) {
            ServerMessage::FrameReport(report) => {
                assert_eq!(report.timestamp, 0.5);
                assert_eq!(report.people, 2);
            }
            other => panic!("expected FrameReport, got {other:?}"),
        }
    }

    #[test]
    fn test_query_and_reset() {
        let mut engine = engine();
        handle_message(&mut engine, frame(0, &[300.0]));
        handle_message(&mut engine, frame(100_000, &[200.0]));
        handle_message(&mut engine, frame(200_000, &[205.0]));
        assert_eq!(
            handle_message(&mut engine, ClientMessage::QueryJumpCount),
            ServerMessage::JumpCount { count: 1 }
        );
        assert_eq!(
            handle_message(&mut engine, ClientMessage::Reset),
            ServerMessage::ResetAck
        );
        assert_eq!(
            handle_message(&mut engine, ClientMessage::QueryJumpCount),
            ServerMessage::JumpCount { count: 0 }
        );
    }

    #[test]
    fn test_engine_error_is_reported() {
        let mut engine = engine();
        handle_message(&mut engine, frame(1_000_000, &[300.0]));
        assert!(matches!(
            handle_message(&mut engine, frame(500_000, &[300.0])),
            ServerMessage::Error { .. }
        ));
        // 次の正常なフレームは通る
        assert!(matches!(
            handle_message(&mut engine, frame(1_100_000, &[300.0])),
            ServerMessage::FrameReport(_)
        ));
    }

    #[test]
    fn test_malformed_bytes() {
        let mut engine = engine();
        assert!(matches!(
            handle_bytes(&mut engine, &[0xff, 0xff, 0xff, 0xff, 0x01]),
            ServerMessage::Error { .. }
        ));
    }
}
