//! Edge relay for remote peers
//!
//! A remote peer is mirrored to the ingest host byte for byte. The ingest
//! host answers the peer; the local session only parses the same inbound
//! bytes so publish/play/codec events still fire here. Its outbound queue
//! is passive, so nothing the session would reply ever reaches the peer.
//!
//! ```text
//!            ┌──────────► Session (parse only)
//! peer ──────┤
//!            └── queue ─► ingest ──► peer
//! ```
//!
//! Bytes read before the ingest connection is up wait in the queue. When
//! either side closes or fails, both connections are dropped, after the
//! ingest has received whatever the peer sent before its EOF.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::events::EventKind;
use crate::server::connection::{emit, finish, read_loop, ConnectionContext};
use crate::session::{Outbound, Session, SessionShared};

/// True when `peer` should be mirrored instead of served locally
pub fn is_remote(peer: IpAddr, local: IpAddr) -> bool {
    peer.to_canonical() != local.to_canonical()
}

/// Serve a remote peer through the ingest host until either side closes
pub async fn serve_remote(
    socket: TcpStream,
    peer_addr: SocketAddr,
    ingest: (String, u16),
    ctx: ConnectionContext,
) -> Result<()> {
    let local_addr = socket.local_addr()?;
    let (mut reader, writer) = socket.into_split();

    let mut session = Session::new(
        ctx.registry.clone(),
        ctx.config.clone(),
        peer_addr,
        local_addr.port(),
        true,
        Outbound::passive(),
        ctx.events.clone(),
    );
    emit(&session, EventKind::SocketConnect { peer_addr, local_addr });

    let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
    let upstream = run_ingest(ingest, rx, writer, session.shared().clone(), ctx.clone());
    tokio::pin!(upstream);

    // Mirrored peers have no idle timeout
    let client_done = tokio::select! {
        result = read_loop(&mut session, &mut reader, &ctx, None, move |data| {
            let _ = tx.send(Bytes::copy_from_slice(data));
        }) => Some(result),
        // Ingest failures are reported as ingest events
        _ = &mut upstream => None,
    };

    let result = match client_done {
        Some(result) => {
            // The queue sender is gone; let the ingest receive what is queued
            if tokio::time::timeout(ctx.config.idle_timeout, &mut upstream).await.is_err() {
                tracing::debug!(session_id = session.id(), "Ingest drain timed out");
            }
            result
        }
        None => Ok(()),
    };
    finish(&mut session, &result);
    result
}

/// Connect to the ingest host and pump bytes both ways
async fn run_ingest(
    (host, port): (String, u16),
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    mut client: OwnedWriteHalf,
    shared: Arc<SessionShared>,
    ctx: ConnectionContext,
) -> Result<()> {
    let notify = |kind: EventKind| {
        let state = shared.lock();
        shared.emit(&state, kind);
    };

    let stream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(session_id = shared.id(), host = %host, port = port, error = %e, "Ingest connect failed");
            notify(EventKind::IngestError(e.to_string()));
            notify(EventKind::IngestClose);
            return Err(e.into());
        }
    };
    if ctx.config.tcp_nodelay {
        stream.set_nodelay(true)?;
    }
    let remote_addr = stream.peer_addr()?;
    let local_addr = stream.local_addr()?;
    tracing::info!(session_id = shared.id(), ingest = %remote_addr, "Ingest connected");
    notify(EventKind::IngestConnect { remote_addr, local_addr });

    let (mut ingest_reader, mut ingest_writer) = stream.into_split();

    let forward = async {
        while let Some(data) = rx.recv().await {
            ingest_writer.write_all(&data).await?;
        }
        ingest_writer.shutdown().await
    };

    let backward = async {
        let mut buf = BytesMut::with_capacity(ctx.config.read_buffer_size);
        loop {
            let n = ingest_reader.read_buf(&mut buf).await?;
            if n == 0 {
                return client.shutdown().await;
            }
            client.write_all(&buf[..n]).await?;
            ctx.stats.add_bytes_out(n);
            buf.clear();
        }
    };

    let result = tokio::select! {
        result = forward => result,
        result = backward => result,
    };
    if let Err(e) = &result {
        tracing::debug!(session_id = shared.id(), error = %e, "Ingest error");
        notify(EventKind::IngestError(e.to_string()));
    }
    tracing::debug!(session_id = shared.id(), "Ingest closed");
    notify(EventKind::IngestClose);
    result.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSender;
    use crate::registry::Registry;
    use crate::server::config::ServerConfig;
    use crate::stats::RelayStats;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[test]
    fn test_is_remote() {
        let local: IpAddr = "10.0.0.5".parse().unwrap();
        assert!(!is_remote("10.0.0.5".parse().unwrap(), local));
        assert!(!is_remote("::ffff:10.0.0.5".parse().unwrap(), local));
        assert!(is_remote("203.0.113.9".parse().unwrap(), local));
    }

    #[tokio::test]
    async fn test_bytes_mirrored_both_ways() {
        let ingest = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ingest_port = ingest.local_addr().unwrap().port();
        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let front_addr = front.local_addr().unwrap();

        let (events, mut event_rx) = EventSender::channel();
        let ctx = ConnectionContext {
            registry: Arc::new(Registry::new()),
            config: Arc::new(ServerConfig::default()),
            stats: Arc::new(RelayStats::new()),
            events,
        };

        let relay = tokio::spawn(async move {
            let (socket, peer) = front.accept().await.unwrap();
            serve_remote(socket, peer, ("127.0.0.1".to_string(), ingest_port), ctx).await
        });

        let mut client = TcpStream::connect(front_addr).await.unwrap();
        // Written before the ingest side is accepted; must be queued
        client.write_all(&[0x03, 1, 2, 3]).await.unwrap();

        let (mut upstream, _) = ingest.accept().await.unwrap();
        let mut got = [0u8; 4];
        upstream.read_exact(&mut got).await.unwrap();
        assert_eq!(got, [0x03, 1, 2, 3]);

        upstream.write_all(b"reply").await.unwrap();
        let mut reply = [0u8; 5];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"reply");

        drop(upstream);
        relay.await.unwrap().unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            assert!(event.remote);
            kinds.push(event.kind);
        }
        assert!(matches!(kinds.first(), Some(EventKind::SocketConnect { .. })));
        assert!(kinds.iter().any(|k| matches!(k, EventKind::IngestConnect { .. })));
        assert!(kinds.contains(&EventKind::IngestClose));
        assert_eq!(kinds.last(), Some(&EventKind::SocketClose));
    }

    fn context(config: ServerConfig) -> ConnectionContext {
        ConnectionContext {
            registry: Arc::new(Registry::new()),
            config: Arc::new(config),
            stats: Arc::new(RelayStats::new()),
            events: EventSender::disabled(),
        }
    }

    #[tokio::test]
    async fn test_silent_peer_outlives_idle_timeout() {
        let ingest = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ingest_port = ingest.local_addr().unwrap().port();
        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let front_addr = front.local_addr().unwrap();
        let ctx = context(ServerConfig::default().idle_timeout(Duration::from_millis(100)));

        let relay = tokio::spawn(async move {
            let (socket, peer) = front.accept().await.unwrap();
            serve_remote(socket, peer, ("127.0.0.1".to_string(), ingest_port), ctx).await
        });

        let mut client = TcpStream::connect(front_addr).await.unwrap();
        let (mut upstream, _) = ingest.accept().await.unwrap();

        // The peer only receives, for several idle periods
        let streamer = tokio::spawn(async move {
            for _ in 0..20 {
                upstream.write_all(&[0x55; 100]).await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });
        let mut received = vec![0u8; 2000];
        client.read_exact(&mut received).await.unwrap();
        assert!(received.iter().all(|&b| b == 0x55));
        streamer.await.unwrap();

        // Closing the ingest ends the relay cleanly
        relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_queued_bytes_reach_ingest_after_peer_eof() {
        let ingest = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ingest_port = ingest.local_addr().unwrap().port();
        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let front_addr = front.local_addr().unwrap();
        let ctx = context(ServerConfig::default());

        let relay = tokio::spawn(async move {
            let (socket, peer) = front.accept().await.unwrap();
            serve_remote(socket, peer, ("127.0.0.1".to_string(), ingest_port), ctx).await
        });

        let mut client = TcpStream::connect(front_addr).await.unwrap();
        client.write_all(&[0x03, 9, 8, 7, 6]).await.unwrap();
        client.shutdown().await.unwrap();

        // Accepted only after the peer has already finished sending
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (mut upstream, _) = ingest.accept().await.unwrap();
        let mut got = Vec::new();
        upstream.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, [0x03, 9, 8, 7, 6]);

        relay.await.unwrap().unwrap();
    }
}
