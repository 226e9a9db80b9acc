//! The SMTP accept loop, wired as a supervised [`Daemon`] (spec §4.6).

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use outpost_common::{EmergencyFlag, OutpostError};
use outpost_metrics::SmtpMetrics;
use outpost_pipeline::CommandPipeline;
use outpost_ratelimit::RateLimiter;
use outpost_supervisor::Daemon;
use tokio::{net::TcpListener, sync::broadcast};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::{config::SmtpConfig, mailer::Mailer, session::Session};

/// Serves one SMTP listen socket: accepts connections, rate-limits by
/// source IP, and spawns a [`Session`] per accepted connection.
pub struct SmtpDaemon {
    config: SmtpConfig,
    pipeline: Arc<CommandPipeline>,
    forward_mailer: Arc<dyn Mailer>,
    reply_mailer: Arc<dyn Mailer>,
    tls_acceptor: Option<TlsAcceptor>,
    rate_limiter: Arc<RateLimiter>,
    emergency: EmergencyFlag,
    metrics: Arc<SmtpMetrics>,
    io_timeout: Duration,
    stop_tx: broadcast::Sender<()>,
}

impl SmtpDaemon {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SmtpConfig,
        pipeline: Arc<CommandPipeline>,
        forward_mailer: Arc<dyn Mailer>,
        reply_mailer: Arc<dyn Mailer>,
        tls_acceptor: Option<TlsAcceptor>,
        rate_limiter: Arc<RateLimiter>,
        emergency: EmergencyFlag,
        metrics: Arc<SmtpMetrics>,
    ) -> Self {
        let io_timeout = Duration::from_secs(config.io_timeout_sec);
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            config,
            pipeline,
            forward_mailer,
            reply_mailer,
            tls_acceptor,
            rate_limiter,
            emergency,
            metrics,
            io_timeout,
            stop_tx,
        }
    }
}

#[async_trait]
impl Daemon for SmtpDaemon {
    async fn start_and_block(&self) -> Result<(), OutpostError> {
        let bind_addr = format!("{}:{}", self.config.address, self.config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| OutpostError::ConfigInvalid(e.to_string()))?;

        let mut stop_rx = self.stop_tx.subscribe();
        let mut sessions = Vec::new();

        loop {
            if self.emergency.is_set() {
                futures::future::join_all(sessions).await;
                return Err(OutpostError::LockedDown);
            }

            tokio::select! {
                _ = stop_rx.recv() => {
                    futures::future::join_all(sessions).await;
                    return Ok(());
                }

                accepted = listener.accept() => {
                    let (stream, peer) = accepted.map_err(|e| OutpostError::Transient(e.to_string()))?;

                    if !self.rate_limiter.add(&peer.ip().to_string(), true) {
                        self.metrics.record_rate_limit_rejection();
                        debug!(%peer, "dropping connection: rate limit exceeded");
                        continue;
                    }
                    self.metrics.record_connection();

                    let session = Session::new(stream);
                    let config = self.config.clone();
                    let pipeline = Arc::clone(&self.pipeline);
                    let forward_mailer = Arc::clone(&self.forward_mailer);
                    let reply_mailer = Arc::clone(&self.reply_mailer);
                    let tls_acceptor = self.tls_acceptor.clone();
                    let emergency = self.emergency.clone();
                    let metrics = Arc::clone(&self.metrics);
                    let io_timeout = self.io_timeout;

                    sessions.push(tokio::spawn(async move {
                        let outcome = session
                            .run(
                                &config,
                                &pipeline,
                                forward_mailer.as_ref(),
                                reply_mailer.as_ref(),
                                tls_acceptor.as_ref(),
                                &emergency,
                                &metrics,
                                io_timeout,
                            )
                            .await;
                        if let Err(error) = outcome {
                            warn!(%peer, %error, "session ended with an I/O error");
                        }
                    }));

                    sessions.retain(|handle| !handle.is_finished());
                }
            }
        }
    }

    async fn stop(&self) {
        let _ = self.stop_tx.send(());
    }

    fn name(&self) -> &str {
        "smtp"
    }
}
