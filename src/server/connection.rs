//! Per-connection driver
//!
//! Owns one [`Session`] and the socket it talks to:
//! 1. Read loop: feeds inbound bytes to the session, sends pings and
//!    enforces the read timeout
//! 2. Writer task: drains the session's outbound queue into the socket
//! 3. Teardown: stops the session exactly once, whatever ended the loop

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::error::{Error, Result};
use crate::events::{EventKind, EventSender};
use crate::registry::Registry;
use crate::server::config::ServerConfig;
use crate::session::{Outbound, Outgoing, Session};
use crate::stats::RelayStats;

/// Everything a connection task needs from the server
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub registry: Arc<Registry>,
    pub config: Arc<ServerConfig>,
    pub stats: Arc<RelayStats>,
    pub events: EventSender,
}

/// Serve a locally handled peer until it disconnects
pub async fn serve_local(socket: TcpStream, peer_addr: SocketAddr, ctx: ConnectionContext) -> Result<()> {
    let local_addr = socket.local_addr()?;
    let (mut reader, writer) = socket.into_split();

    let (outbound, rx) = Outbound::channel();
    let mut session = Session::new(
        ctx.registry.clone(),
        ctx.config.clone(),
        peer_addr,
        local_addr.port(),
        false,
        outbound,
        ctx.events.clone(),
    );
    let session_id = session.id();
    emit(&session, EventKind::SocketConnect { peer_addr, local_addr });

    let writer = BufWriter::with_capacity(ctx.config.write_buffer_size, writer);
    let stats = ctx.stats.clone();
    tokio::spawn(async move {
        if let Err(e) = write_loop(writer, rx, &stats).await {
            tracing::debug!(session_id = session_id, error = %e, "Write failed");
        }
    });

    let result = read_loop(&mut session, &mut reader, &ctx, Some(ctx.config.idle_timeout), |_| {}).await;
    finish(&mut session, &result);
    result
}

/// Read from `reader` into `session` until EOF, error or timeout
///
/// `on_data` sees every inbound buffer before the session parses it. With
/// no `idle_timeout` the loop waits for the peer indefinitely.
pub(crate) async fn read_loop<R, F>(
    session: &mut Session,
    reader: &mut R,
    ctx: &ConnectionContext,
    idle_timeout: Option<Duration>,
    mut on_data: F,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&[u8]),
{
    let config = &ctx.config;
    let mut buf = BytesMut::with_capacity(config.read_buffer_size);
    let mut deadline = idle_timeout.map(|timeout| Instant::now() + timeout);
    let mut ping = interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            read = reader.read_buf(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                ctx.stats.add_bytes_in(n);
                deadline = idle_timeout.map(|timeout| Instant::now() + timeout);

                on_data(&buf[..n]);
                let fed = session.feed(&buf[..n]);
                buf.clear();
                fed?;
                if session.phase().is_closed() {
                    return Ok(());
                }
            }
            _ = idle(deadline) => {
                tracing::debug!(session_id = session.id(), "Read timeout");
                return Err(Error::Timeout);
            }
            _ = ping.tick() => session.send_ping(),
        }
    }
}

async fn idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Drain an outbound queue into `writer`
///
/// Everything already queued is written before each flush, so a burst of
/// fan-out writes becomes one syscall through the buffered writer. Returns
/// after a [`Outgoing::Close`] or once every sender is gone.
pub async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    stats: &RelayStats,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = rx.recv().await {
        let mut next = Some(first);
        while let Some(item) = next.take() {
            match item {
                Outgoing::Data(data) => {
                    writer.write_all(&data).await?;
                    stats.add_bytes_out(data.len());
                }
                Outgoing::Flush => writer.flush().await?,
                Outgoing::Close => {
                    writer.flush().await?;
                    writer.shutdown().await?;
                    return Ok(());
                }
            }
            next = rx.try_recv().ok();
        }
        writer.flush().await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Report how the read loop ended and stop the session
pub(crate) fn finish(session: &mut Session, result: &Result<()>) {
    match result {
        Ok(()) | Err(Error::ConnectionClosed) => {}
        Err(e) => {
            tracing::debug!(session_id = session.id(), error = %e, "Connection error");
            emit(session, EventKind::SocketError(e.to_string()));
        }
    }
    session.stop();
    emit(session, EventKind::SocketClose);
}

pub(crate) fn emit(session: &Session, kind: EventKind) {
    let shared = session.shared();
    let state = shared.lock();
    shared.emit(&state, kind);
}
