//! TCP relay path (spec §4.5 "TCP path"): length-prefixed DNS-over-TCP,
//! one task per connection.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use outpost_common::{EmergencyFlag, OutpostError};
use outpost_metrics::DnsMetrics;
use outpost_ratelimit::RateLimiter;
use outpost_supervisor::Daemon;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::broadcast,
};
use tracing::debug;

use crate::{blocklist::BlockList, policy::AllowList, wire::{extract_names, fabricate_blackhole_answer}};

/// Largest accepted frame body (spec §6: `MaxPacketSize=9038`).
const MAX_PACKET_SIZE: usize = 9038;

/// Serves DNS over TCP: one task per accepted connection, relaying
/// length-prefixed frames to `upstream` unless the query is blocklisted.
pub struct TcpDnsDaemon {
    listen_addr: String,
    upstream: SocketAddr,
    io_timeout: Duration,
    rate_limiter: Arc<RateLimiter>,
    blocklist: Arc<BlockList>,
    allow_list: Arc<AllowList>,
    emergency: EmergencyFlag,
    metrics: Arc<DnsMetrics>,
    stop_tx: broadcast::Sender<()>,
}

impl TcpDnsDaemon {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        listen_addr: String,
        upstream: SocketAddr,
        io_timeout: Duration,
        rate_limiter: Arc<RateLimiter>,
        blocklist: Arc<BlockList>,
        allow_list: Arc<AllowList>,
        emergency: EmergencyFlag,
        metrics: Arc<DnsMetrics>,
    ) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            listen_addr,
            upstream,
            io_timeout,
            rate_limiter,
            blocklist,
            allow_list,
            emergency,
            metrics,
            stop_tx,
        }
    }
}

#[async_trait]
impl Daemon for TcpDnsDaemon {
    async fn start_and_block(&self) -> Result<(), OutpostError> {
        let listener = TcpListener::bind(&self.listen_addr)
            .await
            .map_err(|e| OutpostError::ConfigInvalid(e.to_string()))?;

        let mut stop_rx = self.stop_tx.subscribe();

        loop {
            if self.emergency.is_set() {
                return Err(OutpostError::LockedDown);
            }

            tokio::select! {
                _ = stop_rx.recv() => return Ok(()),
                accepted = listener.accept() => {
                    let (stream, from) = accepted.map_err(|e| OutpostError::Transient(e.to_string()))?;

                    if !self.allow_list.allows_logged(&from.ip().to_string()) {
                        self.metrics.record_rejected_by_allow_list();
                        continue;
                    }
                    if !self.rate_limiter.add(&from.ip().to_string(), true) {
                        continue;
                    }

                    let upstream = self.upstream;
                    let io_timeout = self.io_timeout;
                    let blocklist = Arc::clone(&self.blocklist);
                    let metrics = Arc::clone(&self.metrics);

                    tokio::spawn(async move {
                        if let Err(error) = handle_connection(stream, upstream, &blocklist, &metrics, io_timeout).await {
                            debug!(%from, %error, "DNS-over-TCP connection ended");
                        }
                    });
                }
            }
        }
    }

    async fn stop(&self) {
        let _ = self.stop_tx.send(());
    }

    fn name(&self) -> &str {
        "dns-tcp"
    }
}

async fn handle_connection(
    mut client: TcpStream,
    upstream: SocketAddr,
    blocklist: &BlockList,
    metrics: &DnsMetrics,
    io_timeout: Duration,
) -> std::io::Result<()> {
    let body = read_frame(&mut client, io_timeout).await?;
    metrics.record_query();

    let names = extract_names(&body);
    let is_blocked = names.as_deref().is_some_and(|n| blocklist.matches(n));

    if is_blocked {
        metrics.record_blackhole_answer();
        let answer = fabricate_blackhole_answer(&body);
        write_frame(&mut client, &answer, io_timeout).await?;
        return Ok(());
    }
    metrics.record_forwarded();

    let mut upstream_conn = tokio::time::timeout(io_timeout, TcpStream::connect(upstream))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream connect timed out"))??;

    write_frame(&mut upstream_conn, &body, io_timeout).await?;
    let reply = read_frame(&mut upstream_conn, io_timeout).await?;
    write_frame(&mut client, &reply, io_timeout).await?;

    Ok(())
}

async fn read_frame(stream: &mut TcpStream, io_timeout: Duration) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 2];
    tokio::time::timeout(io_timeout, stream.read_exact(&mut len_buf))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "length prefix read timed out"))??;

    let len = u16::from_be_bytes(len_buf) as usize;
    if len == 0 || len > MAX_PACKET_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame length {len} out of range [1, {MAX_PACKET_SIZE}]"),
        ));
    }

    let mut body = vec![0u8; len];
    tokio::time::timeout(io_timeout, stream.read_exact(&mut body))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "frame body read timed out"))??;

    Ok(body)
}

async fn write_frame(stream: &mut TcpStream, body: &[u8], io_timeout: Duration) -> std::io::Result<()> {
    let len = u16::try_from(body.len())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "frame too large to prefix"))?;

    tokio::time::timeout(io_timeout, async {
        stream.write_all(&len.to_be_bytes()).await?;
        stream.write_all(body).await
    })
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "frame write timed out"))??;

    Ok(())
}
