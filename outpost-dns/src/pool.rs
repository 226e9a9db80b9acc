//! `ForwarderPool` and black-hole worker pool (spec §4.5 "UDP path").
//!
//! Each forwarder owns one pre-dialed upstream socket and a bounded
//! queue; the accept loop only ever enqueues, never touches a socket it
//! doesn't own (spec §5: "ForwarderPool: each socket and queue pair is
//! owned by one worker").

use std::{net::SocketAddr, sync::Arc, time::Duration};

use rand::Rng;
use tokio::{net::UdpSocket, sync::mpsc};
use tracing::warn;

use crate::wire::fabricate_blackhole_answer;

/// Queue depth for forwarder workers (spec §5).
const FORWARDER_QUEUE_DEPTH: usize = 16;
/// Queue depth for black-hole workers (spec §5).
const BLACKHOLE_QUEUE_DEPTH: usize = 4;

/// A query in flight: its bytes plus the client address to answer.
pub struct PendingQuery {
    pub bytes: Vec<u8>,
    pub from: SocketAddr,
}

/// `max(1, per_ip_limit / 10)`, the forwarder/black-hole pool size
/// heuristic (spec §4.5, §9 "Forwarder-pool sizing").
#[must_use]
pub fn pool_size(per_ip_limit: u32) -> usize {
    usize::max(1, (per_ip_limit / 10) as usize)
}

/// A pool of forwarder workers, each relaying queries to `upstream` over
/// its own pre-dialed UDP socket.
pub struct ForwarderPool {
    queues: Vec<mpsc::Sender<PendingQuery>>,
}

impl ForwarderPool {
    /// Pre-dial `size` sockets to `upstream` and spawn one worker per
    /// socket, each reading from its own bounded queue, answering via
    /// `listen_socket` (the daemon's shared listen socket, per spec:
    /// "writes the reply to the original client via the shared listen
    /// socket").
    ///
    /// # Errors
    /// Propagates a socket bind/connect failure from any of the `size`
    /// dial attempts.
    pub async fn spawn(
        size: usize,
        upstream: SocketAddr,
        listen_socket: Arc<UdpSocket>,
        io_timeout: Duration,
    ) -> std::io::Result<Self> {
        let mut queues = Vec::with_capacity(size);

        for worker_id in 0..size {
            let socket = UdpSocket::bind("0.0.0.0:0").await?;
            socket.connect(upstream).await?;

            let (tx, mut rx) = mpsc::channel::<PendingQuery>(FORWARDER_QUEUE_DEPTH);
            let listen_socket = Arc::clone(&listen_socket);

            tokio::spawn(async move {
                while let Some(query) = rx.recv().await {
                    if let Err(error) =
                        relay_one(&socket, &listen_socket, &query, io_timeout).await
                    {
                        warn!(worker_id, %error, "forwarder worker failed to relay a query");
                    }
                }
            });

            queues.push(tx);
        }

        Ok(Self { queues })
    }

    /// Enqueue `query` onto a randomly chosen worker's queue. Drops the
    /// query and returns `false` if that queue is full (spec: "Queue
    /// full -> drop").
    pub fn dispatch(&self, query: PendingQuery) -> bool {
        let idx = rand::thread_rng().gen_range(0..self.queues.len());
        self.queues[idx].try_send(query).is_ok()
    }
}

async fn relay_one(
    upstream_socket: &UdpSocket,
    listen_socket: &UdpSocket,
    query: &PendingQuery,
    io_timeout: Duration,
) -> std::io::Result<()> {
    tokio::time::timeout(io_timeout, upstream_socket.send(&query.bytes))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream send timed out"))??;

    let mut buf = vec![0u8; 9038];
    let n = tokio::time::timeout(io_timeout, upstream_socket.recv(&mut buf))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream recv timed out"))??;

    tokio::time::timeout(io_timeout, listen_socket.send_to(&buf[..n], query.from))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "client send timed out"))??;

    Ok(())
}

/// A pool of workers that answer queries with a fabricated black-hole
/// response instead of forwarding them anywhere.
pub struct BlackHolePool {
    queues: Vec<mpsc::Sender<PendingQuery>>,
}

impl BlackHolePool {
    /// Spawn `size` workers, each draining its own bounded queue and
    /// writing fabricated answers back to `listen_socket`.
    #[must_use]
    pub fn spawn(size: usize, listen_socket: Arc<UdpSocket>, io_timeout: Duration) -> Self {
        let mut queues = Vec::with_capacity(size);

        for worker_id in 0..size {
            let (tx, mut rx) = mpsc::channel::<PendingQuery>(BLACKHOLE_QUEUE_DEPTH);
            let listen_socket = Arc::clone(&listen_socket);

            tokio::spawn(async move {
                while let Some(query) = rx.recv().await {
                    let answer = fabricate_blackhole_answer(&query.bytes);
                    if let Err(error) =
                        tokio::time::timeout(io_timeout, listen_socket.send_to(&answer, query.from))
                            .await
                    {
                        warn!(worker_id, %error, "black-hole worker timed out replying");
                    }
                }
            });

            queues.push(tx);
        }

        Self { queues }
    }

    /// Enqueue `query` onto a randomly chosen worker's queue. Drops the
    /// query and returns `false` if that queue is full.
    pub fn dispatch(&self, query: PendingQuery) -> bool {
        let idx = rand::thread_rng().gen_range(0..self.queues.len());
        self.queues[idx].try_send(query).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_heuristic() {
        assert_eq!(pool_size(10), 1);
        assert_eq!(pool_size(100), 10);
        assert_eq!(pool_size(5), 1);
    }
}
