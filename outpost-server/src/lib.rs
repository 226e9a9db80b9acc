//! Daemon glue (spec §4.7 C7): turns one [`config::TopLevelConfig`] into
//! a running process — rate limiters, the command pipeline, the DNS and
//! SMTP engines, each wrapped in a supervisor, plus the ambient health
//! responder — and tears it all down on a shutdown signal, mirroring the
//! teacher's `empath::controller::Empath::run`.

pub mod config;

use std::{net::SocketAddr, sync::Arc};

use outpost_common::EmergencyFlag;
use outpost_dns::{AllowList, TcpDnsDaemon, UdpDnsDaemon};
use outpost_health::{HealthChecker, HealthServer};
use outpost_metrics::Metrics;
use outpost_pipeline::{
    AuthPrefixBridge, CombineOutputBridge, CommandPipeline, FeatureRegistry, LintTruncateBridge,
    LptOverrideBridge, SequenceTranslatorBridge,
};
use outpost_ratelimit::RateLimiter;
use outpost_smtp::{Mailer, SmtpDaemon, SmtpRelayMailer};
use outpost_supervisor::Supervisor;
use tokio::sync::broadcast;
use tracing::{info, warn};

use config::TopLevelConfig;

/// Wait for `CTRL+C` or `SIGTERM`, mirroring the teacher's
/// `controller::shutdown`.
async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler; CTRL+C is still honored");
                let _ = ctrl_c.await;
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c => info!("received CTRL+C"),
            _ = terminate.recv() => info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received CTRL+C");
    }
}

/// Run every daemon named by `config` until a shutdown signal arrives or
/// one of them exits under emergency lockdown.
///
/// # Errors
/// Returns a message describing the first fatal startup failure (an
/// invalid configuration, a listener bind failure) or the first daemon
/// that exits non-lockdown.
pub async fn run(config: TopLevelConfig) -> anyhow::Result<()> {
    outpost_common::logging::init();

    let own_public_ip = outpost_dns::public_ip::discover().await;
    config
        .validate(own_public_ip.as_deref())
        .map_err(|e| anyhow::anyhow!(e))?;

    let emergency = EmergencyFlag::new();
    let health_checker = Arc::new(HealthChecker::new(emergency.clone()));
    let metrics = Arc::new(Metrics::new());

    let blocklist = outpost_dns::blocklist::load(&config.dns.blocklist_url)
        .await
        .map_err(|e| anyhow::anyhow!("fetching initial blocklist: {e}"))?;
    outpost_dns::blocklist::spawn_refresher(Arc::clone(&blocklist), config.dns.blocklist_url.clone());

    let allow_list = Arc::new(AllowList::new(
        config.dns.allow_query_ip_prefixes.clone(),
        own_public_ip.clone(),
    ));
    let dns_rate_limiter = Arc::new(RateLimiter::new(config.dns_rate_limit));
    let dns_supervisor = Supervisor::new(config.supervisor.restart_interval_sec);

    let udp_upstream: SocketAddr = config
        .dns
        .udp_forward_to
        .parse()
        .map_err(|e| anyhow::anyhow!("dns.udp_forward_to: {e}"))?;
    let tcp_upstream: SocketAddr = config
        .dns
        .tcp_forward_to
        .parse()
        .map_err(|e| anyhow::anyhow!("dns.tcp_forward_to: {e}"))?;
    let io_timeout = std::time::Duration::from_secs(config.dns.io_timeout_sec);

    let udp_daemon = Arc::new(UdpDnsDaemon::new(
        format!("{}:{}", config.dns.udp_listen_address, config.dns.udp_listen_port),
        udp_upstream,
        config.dns.per_ip_limit,
        io_timeout,
        Arc::clone(&dns_rate_limiter),
        Arc::clone(&blocklist),
        Arc::clone(&allow_list),
        emergency.clone(),
        Arc::clone(&metrics.dns),
    ));
    let tcp_daemon = Arc::new(TcpDnsDaemon::new(
        format!("{}:{}", config.dns.tcp_listen_address, config.dns.tcp_listen_port),
        tcp_upstream,
        io_timeout,
        Arc::clone(&dns_rate_limiter),
        Arc::clone(&blocklist),
        Arc::clone(&allow_list),
        emergency.clone(),
        Arc::clone(&metrics.dns),
    ));

    let mut registry = FeatureRegistry::new();
    for violation in registry_self_test(&mut registry) {
        warn!(%violation, "feature self-test reported a problem at startup");
    }

    let pipeline = Arc::new(CommandPipeline::new(
        registry,
        vec![
            Box::new(AuthPrefixBridge::new(
                config.pipeline.auth_secret.clone(),
                config.pipeline.auth_shortcuts.clone(),
            )),
            Box::new(SequenceTranslatorBridge::new(
                config.pipeline.sequence_translations.clone(),
            )),
            Box::new(LptOverrideBridge),
        ],
        vec![
            Box::new(CombineOutputBridge),
            Box::new(LintTruncateBridge::new(config.pipeline.max_output_length)),
        ],
    ));
    for warning in pipeline.is_sane_for_internet() {
        warn!(%warning, "command pipeline failed an internet-exposure sanity check");
    }

    let forward_mailer: Arc<dyn Mailer> = Arc::new(SmtpRelayMailer::new(
        config.smtp.forward_mailer_addr.clone(),
        config.smtp.my_domains.first().cloned().unwrap_or_default(),
    ));
    let reply_mailer: Arc<dyn Mailer> = Arc::new(SmtpRelayMailer::new(
        config.smtp.reply_mailer_addr.clone(),
        config.smtp.my_domains.first().cloned().unwrap_or_default(),
    ));
    let tls_acceptor = match (&config.smtp.tls_cert_path, &config.smtp.tls_key_path) {
        (Some(cert), Some(key)) => {
            Some(outpost_smtp::tls::load_acceptor(cert, key).map_err(|e| anyhow::anyhow!(e.to_string()))?)
        }
        _ => None,
    };
    let smtp_rate_limiter = Arc::new(RateLimiter::new(config.smtp_rate_limit));
    let smtp_daemon = Arc::new(SmtpDaemon::new(
        config.smtp.clone(),
        Arc::clone(&pipeline),
        forward_mailer,
        reply_mailer,
        tls_acceptor,
        smtp_rate_limiter,
        emergency.clone(),
        Arc::clone(&metrics.smtp),
    ));
    let smtp_supervisor = Supervisor::new(config.supervisor.restart_interval_sec);

    let (health_stop_tx, health_stop_rx) = broadcast::channel(1);
    let health_server = if config.health.enabled {
        Some(HealthServer::new(&config.health, Arc::clone(&health_checker)).await?)
    } else {
        None
    };

    health_checker.set_dns_ready(true);
    health_checker.set_smtp_ready(true);

    let shutdown_emergency = emergency.clone();
    tokio::select! {
        result = dns_supervisor.run_forever(udp_daemon) => {
            if let Err(error) = result {
                warn!(%error, "UDP DNS supervisor exited");
            }
        }
        result = async {
            let tcp_supervisor = Supervisor::new(config.supervisor.restart_interval_sec);
            tcp_supervisor.run_forever(tcp_daemon).await
        } => {
            if let Err(error) = result {
                warn!(%error, "TCP DNS supervisor exited");
            }
        }
        result = smtp_supervisor.run_forever(smtp_daemon) => {
            if let Err(error) = result {
                warn!(%error, "SMTP supervisor exited");
            }
        }
        result = async {
            match health_server {
                Some(server) => server.serve(health_stop_rx).await.map_err(|e| anyhow::anyhow!(e.to_string())),
                None => std::future::pending().await,
            }
        } => {
            if let Err(error) = result {
                warn!(%error, "health server exited");
            }
        }
        () = wait_for_shutdown_signal() => {
            info!("shutdown signal received; triggering emergency lockdown");
            shutdown_emergency.trigger();
            let _ = health_stop_tx.send(());
        }
    }

    Ok(())
}

/// Run every registered feature's self-test at startup, collecting
/// failures instead of treating any single one as fatal (spec §6
/// `Feature` contract's `self_test`).
fn registry_self_test(registry: &mut FeatureRegistry) -> Vec<String> {
    registry
        .iter()
        .filter_map(|feature| feature.self_test().err())
        .collect()
}
