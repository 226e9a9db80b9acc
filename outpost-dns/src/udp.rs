//! UDP accept loop (spec §4.5 "UDP path").

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use outpost_common::{EmergencyFlag, OutpostError};
use outpost_metrics::DnsMetrics;
use outpost_ratelimit::RateLimiter;
use outpost_supervisor::Daemon;
use tokio::{net::UdpSocket, sync::broadcast};
use tracing::{debug, warn};

use crate::{
    blocklist::BlockList,
    policy::AllowList,
    pool::{pool_size, BlackHolePool, ForwarderPool, PendingQuery},
    wire::extract_names,
};

/// Largest UDP datagram accepted (spec §6: "larger than 512 to
/// accommodate EDNS0").
const MAX_UDP_PACKET: usize = 9038;

/// Serves DNS over UDP: rate-limits and filters each datagram, then
/// dispatches it to either the forwarder pool or the black-hole pool.
pub struct UdpDnsDaemon {
    listen_addr: String,
    upstream: SocketAddr,
    per_ip_limit: u32,
    io_timeout: Duration,
    rate_limiter: Arc<RateLimiter>,
    blocklist: Arc<BlockList>,
    allow_list: Arc<AllowList>,
    emergency: EmergencyFlag,
    metrics: Arc<DnsMetrics>,
    stop_tx: broadcast::Sender<()>,
}

impl UdpDnsDaemon {
    /// Build a UDP DNS daemon. Binding and pool spawning happen in
    /// [`Daemon::start_and_block`] so a fresh listen socket is created on
    /// every supervised restart.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        listen_addr: String,
        upstream: SocketAddr,
        per_ip_limit: u32,
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
            per_ip_limit,
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
impl Daemon for UdpDnsDaemon {
    async fn start_and_block(&self) -> Result<(), OutpostError> {
        let socket = Arc::new(
            UdpSocket::bind(&self.listen_addr)
                .await
                .map_err(|e| OutpostError::ConfigInvalid(e.to_string()))?,
        );

        let size = pool_size(self.per_ip_limit);
        let forwarders = ForwarderPool::spawn(size, self.upstream, Arc::clone(&socket), self.io_timeout)
            .await
            .map_err(|e| OutpostError::Transient(e.to_string()))?;
        let black_holes = BlackHolePool::spawn(size, Arc::clone(&socket), self.io_timeout);

        let mut stop_rx = self.stop_tx.subscribe();
        let mut buf = vec![0u8; MAX_UDP_PACKET];

        loop {
            if self.emergency.is_set() {
                return Err(OutpostError::LockedDown);
            }

            tokio::select! {
                _ = stop_rx.recv() => return Ok(()),
                received = socket.recv_from(&mut buf) => {
                    let (n, from) = received.map_err(|e| OutpostError::Transient(e.to_string()))?;

                    if !self.allow_list.allows_logged(&from.ip().to_string()) {
                        self.metrics.record_rejected_by_allow_list();
                        continue;
                    }
                    if !self.rate_limiter.add(&from.ip().to_string(), true) {
                        continue;
                    }

                    self.metrics.record_query();
                    let bytes = buf[..n].to_vec();
                    let names = extract_names(&bytes);
                    let is_blocked = names.as_deref().is_some_and(|n| self.blocklist.matches(n));

                    let query = PendingQuery { bytes, from };
                    let dispatched = if is_blocked {
                        self.metrics.record_blackhole_answer();
                        black_holes.dispatch(query)
                    } else {
                        self.metrics.record_forwarded();
                        forwarders.dispatch(query)
                    };
                    if !dispatched {
                        debug!(%from, "dropping UDP query: queue full");
                    }
                }
            }
        }
    }

    async fn stop(&self) {
        let _ = self.stop_tx.send(());
    }

    fn name(&self) -> &str {
        "dns-udp"
    }
}
