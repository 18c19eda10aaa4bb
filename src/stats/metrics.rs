//! Process-wide relay counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters shared by every connection task
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    accepted: AtomicU64,
    active: AtomicU64,
    rejected: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            accepted: AtomicU64::new(0),
            active: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Never underflow if a close is reported twice
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Connection refused by the connection limit
    pub fn connection_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_in(&self, n: usize) {
        self.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_bytes_out(&self, n: usize) {
        self.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Point-in-time copy of the counters
    ///
    /// `active_streams` comes from the registry, so the caller passes it in.
    pub fn snapshot(&self, active_streams: usize) -> ServerStats {
        ServerStats {
            total_connections: self.accepted.load(Ordering::Relaxed),
            active_connections: self.active.load(Ordering::Relaxed),
            rejected_connections: self.rejected.load(Ordering::Relaxed),
            total_bytes_received: self.bytes_in.load(Ordering::Relaxed),
            total_bytes_sent: self.bytes_out.load(Ordering::Relaxed),
            active_streams: active_streams as u64,
            uptime: self.uptime(),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Current active connections
    pub active_connections: u64,
    /// Connections refused at the limit
    pub rejected_connections: u64,
    /// Total bytes received from peers
    pub total_bytes_received: u64,
    /// Total bytes written to peers
    pub total_bytes_sent: u64,
    /// Paths with a live publisher
    pub active_streams: u64,
    pub uptime: Duration,
}

impl ServerStats {
    /// Average inbound bitrate over the uptime, in bits per second
    pub fn inbound_bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.total_bytes_received * 8) / secs
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_stats_new() {
        let stats = RelayStats::new().snapshot(0);
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_bytes_received, 0);
        assert_eq!(stats.total_bytes_sent, 0);
        assert_eq!(stats.active_streams, 0);
    }

    #[test]
    fn test_connection_counters() {
        let stats = RelayStats::new();
        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed();
        stats.connection_rejected();

        let snap = stats.snapshot(1);
        assert_eq!(snap.total_connections, 2);
        assert_eq!(snap.active_connections, 1);
        assert_eq!(snap.rejected_connections, 1);
        assert_eq!(snap.active_streams, 1);
    }

    #[test]
    fn test_close_does_not_underflow() {
        let stats = RelayStats::new();
        stats.connection_closed();
        assert_eq!(stats.snapshot(0).active_connections, 0);
    }

    #[test]
    fn test_byte_counters() {
        let stats = RelayStats::new();
        stats.add_bytes_in(1500);
        stats.add_bytes_in(500);
        stats.add_bytes_out(3073);

        let snap = stats.snapshot(0);
        assert_eq!(snap.total_bytes_received, 2000);
        assert_eq!(snap.total_bytes_sent, 3073);
    }

    #[test]
    fn test_inbound_bitrate() {
        let snap = ServerStats {
            total_bytes_received: 1_000_000,
            uptime: Duration::from_secs(10),
            ..Default::default()
        };
        // 1,000,000 bytes * 8 bits / 10 seconds
        assert_eq!(snap.inbound_bitrate(), 800_000);

        let snap = ServerStats {
            total_bytes_received: 1_000_000,
            ..Default::default()
        };
        assert_eq!(snap.inbound_bitrate(), 0);
    }
}
