//! RTMP relay example
//!
//! Run with: cargo run --example relay_server [BIND_ADDR] [INGEST_HOST]
//!
//! Examples:
//!   cargo run --example relay_server                          # 0.0.0.0:1935, serve everyone locally
//!   cargo run --example relay_server 127.0.0.1:1936           # custom bind address
//!   cargo run --example relay_server 0.0.0.0:1935 origin.lan  # mirror remote peers to origin.lan:1935
//!
//! ## Publishing
//!
//!   ffmpeg -re -i input.mp4 -c copy -f flv rtmp://localhost/live/test_key
//!
//! ## Playing
//!
//!   ffplay rtmp://localhost/live/test_key
//!
//! Players may start before the publisher; they wait until it arrives.

use std::net::SocketAddr;
use std::time::Duration;

use rtmp_relay::{EventKind, RelayServer, ServerConfig};

fn print_usage() {
    eprintln!("Usage: relay_server [BIND_ADDR] [INGEST_HOST]");
    eprintln!();
    eprintln!("BIND_ADDR    address to listen on (default 0.0.0.0:1935)");
    eprintln!("INGEST_HOST  upstream host remote peers are mirrored to");
}

fn parse_bind_addr(s: &str) -> Result<SocketAddr, String> {
    if s == "localhost" {
        return Ok(SocketAddr::from(([127, 0, 0, 1], 1935)));
    }
    s.parse()
        .or_else(|_| format!("{}:1935", s).parse())
        .map_err(|_| format!("invalid bind address '{}'", s))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr) => match parse_bind_addr(addr) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                print_usage();
                std::process::exit(1);
            }
        },
        None => SocketAddr::from(([0, 0, 0, 0], 1935)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtmp_relay=debug".parse()?)
                .add_directive("relay_server=info".parse()?),
        )
        .init();

    let mut config = ServerConfig::with_addr(bind_addr).pull_allow("*");
    if let Some(host) = args.get(2) {
        config = config.ingest(host.as_str());
    }

    let (server, mut events) = RelayServer::new(config);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let stream = &event.stream;
            match &event.kind {
                EventKind::Publish | EventKind::DonePublish | EventKind::Play | EventKind::DonePlay => {
                    tracing::info!(
                        session_id = stream.session_id,
                        remote = event.remote,
                        path = %stream.path,
                        user_id = %stream.user_id,
                        play_url = %stream.play_url,
                        "{:?}",
                        event.kind
                    );
                }
                EventKind::Codec(codec) => {
                    tracing::info!(
                        session_id = stream.session_id,
                        audio = %codec.audio.codec_name,
                        samplerate = codec.audio.samplerate,
                        video = %codec.video.codec_name,
                        width = codec.video.width,
                        height = codec.video.height,
                        "Codec"
                    );
                }
                EventKind::Error(e) | EventKind::SocketError(e) | EventKind::IngestError(e) => {
                    tracing::warn!(session_id = stream.session_id, error = %e, "Session error");
                }
                other => tracing::debug!(session_id = stream.session_id, event = ?other, "Event"),
            }
        }
    });

    let server = std::sync::Arc::new(server);
    let reporter = server.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(30));
        loop {
            tick.tick().await;
            let stats = reporter.stats();
            tracing::info!(
                connections = stats.active_connections,
                streams = stats.active_streams,
                bytes_in = stats.total_bytes_received,
                bytes_out = stats.total_bytes_sent,
                "Stats"
            );
        }
    });

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
