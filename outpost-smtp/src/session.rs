//! The SMTP session state machine over one TCP connection (spec §4.6).

use std::time::Duration;

use outpost_common::EmergencyFlag;
use outpost_metrics::SmtpMetrics;
use outpost_pipeline::CommandPipeline;
use outpost_smtp_proto::{advertised, Command, HeloVariant, SmtpState, Status};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use crate::{
    config::{SmtpConfig, MAX_BODY_BYTES, MAX_COMMANDS},
    connection::Connection,
    mailer::Mailer,
    mime,
};

/// One conversation's accumulated envelope and transcript.
pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    /// `None` only for the instant between taking the connection out to
    /// perform a `STARTTLS` upgrade and putting the upgraded one back.
    conn: Option<Connection<Stream>>,
    state: SmtpState,
    command_count: u32,
    from: Option<String>,
    to_addrs: Vec<String>,
    body: Vec<u8>,
    client_id: String,
}

/// Why a session ended, for the daemon loop's logging.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Abort,
    TlsError,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    #[must_use]
    pub fn new(stream: Stream) -> Self {
        Self {
            conn: Some(Connection::plain(stream)),
            state: SmtpState::Init,
            command_count: 0,
            from: None,
            to_addrs: Vec::new(),
            body: Vec::new(),
            client_id: String::new(),
        }
    }

    fn conn(&mut self) -> &mut Connection<Stream> {
        self.conn.as_mut().expect("connection only ever absent mid-STARTTLS")
    }

    /// Run the conversation to completion, dispatching accepted bodies
    /// through `pipeline` and `mailers` per spec §4.6's post-reception
    /// actions. Each command read and each reply write is bounded by
    /// `io_timeout` (spec §5).
    ///
    /// # Errors
    /// Returns an I/O error if the socket fails outside of a timeout
    /// (timeouts themselves end the conversation with [`Outcome::Abort`]
    /// and are not propagated as errors).
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        mut self,
        config: &SmtpConfig,
        pipeline: &CommandPipeline,
        forward_mailer: &dyn Mailer,
        reply_mailer: &dyn Mailer,
        tls_acceptor: Option<&TlsAcceptor>,
        emergency: &EmergencyFlag,
        metrics: &SmtpMetrics,
        io_timeout: Duration,
    ) -> std::io::Result<Outcome> {
        self.conn()
            .write_line(&format!(
                "{} {} ready",
                Status::ServiceReady,
                config.my_domains.join(", ")
            ))
            .await?;

        loop {
            if emergency.is_set() {
                self.state = SmtpState::Abort;
                break;
            }

            let read = tokio::time::timeout(io_timeout, self.conn().read_line()).await;
            let (n, line) = match read {
                Ok(result) => result?,
                Err(_) => {
                    warn!(client = %self.client_id, "io timeout; aborting session");
                    self.state = SmtpState::Abort;
                    break;
                }
            };
            if n == 0 {
                self.state = SmtpState::Done;
                break;
            }

            self.command_count += 1;
            if self.command_count > MAX_COMMANDS {
                self.conn()
                    .write_line(&format!("{} too many commands", Status::ActionUnavailable))
                    .await?;
                self.state = SmtpState::Abort;
                break;
            }

            let command: Command = line.as_str().into();
            if self
                .apply(command, config, tls_acceptor, io_timeout)
                .await?
            {
                break;
            }
        }

        let outcome = match self.state {
            SmtpState::Done => Outcome::Done,
            SmtpState::TlsError => Outcome::TlsError,
            _ => Outcome::Abort,
        };

        if outcome == Outcome::Done && self.from.is_some() && !self.to_addrs.is_empty() {
            metrics.record_message_received();
            self.post_reception(config, pipeline, forward_mailer, reply_mailer, emergency, metrics).await;
        }

        Ok(outcome)
    }

    /// Apply one command. Returns `true` if the conversation just ended.
    async fn apply(
        &mut self,
        command: Command,
        config: &SmtpConfig,
        tls_acceptor: Option<&TlsAcceptor>,
        io_timeout: Duration,
    ) -> std::io::Result<bool> {
        match (&self.state, command) {
            (_, Command::Quit) => {
                self.conn().write_line(&format!("{} bye", Status::GoodBye)).await?;
                self.state = SmtpState::Done;
                return Ok(true);
            }
            (_, Command::Rset) => {
                self.from = None;
                self.to_addrs.clear();
                self.body.clear();
                self.state = SmtpState::Greeted;
                self.conn().write_line(&format!("{} ok", Status::Ok)).await?;
            }
            (_, Command::StartTls) if self.state == SmtpState::Greeted => {
                let Some(acceptor) = tls_acceptor else {
                    self.conn()
                        .write_line(&format!("{} not available", Status::InvalidCommandSequence))
                        .await?;
                    return Ok(false);
                };
                self.conn().write_line(&format!("{} go ahead", Status::ServiceReady)).await?;
                let conn = self.conn.take().expect("connection present");
                match conn.upgrade(acceptor).await {
                    Ok(upgraded) => self.conn = Some(upgraded),
                    Err(error) => {
                        warn!(%error, "TLS handshake failed");
                        self.state = SmtpState::TlsError;
                        return Ok(true);
                    }
                }
            }
            (SmtpState::Init | SmtpState::Greeted, Command::Helo(variant)) => {
                let (is_ehlo, hostname) = match variant {
                    HeloVariant::Ehlo(hostname) => (true, hostname),
                    HeloVariant::Helo(hostname) => (false, hostname),
                };
                self.client_id = hostname;
                self.state = SmtpState::Greeted;

                if is_ehlo {
                    let extensions = advertised(tls_acceptor.is_some());
                    self.conn()
                        .write_line(&format!("{}-hello {}", Status::Ok, self.client_id))
                        .await?;
                    let (last, rest) = extensions.split_last().expect("at least one extension always advertised");
                    for extension in rest {
                        self.conn().write_line(&format!("{}-{extension}", Status::Ok)).await?;
                    }
                    self.conn().write_line(&format!("{} {last}", Status::Ok)).await?;
                } else {
                    self.conn()
                        .write_line(&format!("{} hello {}", Status::Ok, self.client_id))
                        .await?;
                }
            }
            (SmtpState::Greeted | SmtpState::Mail | SmtpState::Rcpt, Command::MailFrom(addr)) => {
                self.from = Some(addr.map(|a| a.to_string()).unwrap_or_default());
                self.to_addrs.clear();
                self.state = SmtpState::Mail;
                self.conn().write_line(&format!("{} ok", Status::Ok)).await?;
            }
            (SmtpState::Mail | SmtpState::Rcpt, Command::RcptTo(addr)) => {
                let candidate = addr.to_string();
                let domain = candidate.rsplit('@').next().unwrap_or_default().trim_end_matches('>');
                if !candidate.contains('@') || !config.my_domains.iter().any(|d| d == domain) {
                    self.conn().write_line(&format!("{} bad address", Status::BadAddress)).await?;
                    self.state = SmtpState::Abort;
                    return Ok(true);
                }
                self.to_addrs.push(candidate);
                self.state = SmtpState::Rcpt;
                self.conn().write_line(&format!("{} ok", Status::Ok)).await?;
            }
            (SmtpState::Rcpt, Command::Data) => {
                self.conn().write_line(&format!("{} start mail input", Status::StartMailInput)).await?;
                match self.read_body(io_timeout).await? {
                    Some(()) => {
                        self.state = SmtpState::Done;
                        self.conn().write_line(&format!("{} ok", Status::Ok)).await?;
                        return Ok(true);
                    }
                    None => {
                        self.conn().write_line(&format!("{} message too large", Status::ActionUnavailable)).await?;
                        self.state = SmtpState::Abort;
                        return Ok(true);
                    }
                }
            }
            _ => {
                self.conn()
                    .write_line(&format!("{} bad command sequence", Status::InvalidCommandSequence))
                    .await?;
            }
        }

        Ok(false)
    }

    /// Read the DATA body until a line consisting of a single `.`,
    /// enforcing the body cap (spec §4.6 "Body cap: 2 MiB"). Returns
    /// `None` if the cap was exceeded.
    async fn read_body(&mut self, io_timeout: Duration) -> std::io::Result<Option<()>> {
        loop {
            let (n, line) = tokio::time::timeout(io_timeout, self.conn().read_line())
                .await
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "DATA read timed out"))??;
            if n == 0 || line == "." {
                return Ok(Some(()));
            }

            if self.body.len() + line.len() + 2 > MAX_BODY_BYTES {
                // Drain until the terminator so the connection stays in sync.
                loop {
                    let (n, line) = self.conn().read_line().await?;
                    if n == 0 || line == "." {
                        break;
                    }
                }
                return Ok(None);
            }

            self.body.extend_from_slice(line.as_bytes());
            self.body.extend_from_slice(b"\r\n");
        }
    }

    /// Post-reception actions (spec §4.6): forward to `ForwardTo`, then
    /// walk the MIME tree looking for the first part the pipeline
    /// doesn't reject as a PIN mismatch.
    async fn post_reception(
        &self,
        config: &SmtpConfig,
        pipeline: &CommandPipeline,
        forward_mailer: &dyn Mailer,
        reply_mailer: &dyn Mailer,
        emergency: &EmergencyFlag,
        metrics: &SmtpMetrics,
    ) {
        let from = self.from.clone().unwrap_or_default();

        if !config.forward_to.is_empty() {
            forward_mailer.send(&from, &config.forward_to, &self.body).await;
        }

        let Ok(parts) = mime::walk(&self.body) else {
            warn!("post-reception MIME walk failed; skipping pipeline dispatch");
            return;
        };

        for part in parts {
            let is_text = part
                .properties
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("text/"));
            if !is_text {
                continue;
            }
            if mime::is_self_loop(&part.properties, &config.outgoing_subject_keyword) {
                continue;
            }

            let text = String::from_utf8_lossy(&part.body).to_string();
            let command = outpost_pipeline::Command::new(text, 5);
            let result = pipeline.process(command, emergency).await;

            if let Some(error) = &result.error {
                metrics.record_pipeline_error(error.kind_name());
            }
            if matches!(result.error, Some(outpost_common::OutpostError::PinMismatch)) {
                continue;
            }

            if let Some(reply_to) = part.properties.reply_address {
                reply_mailer
                    .send(&from, &[reply_to], result.combined_output.as_bytes())
                    .await;
            }
            info!("pipeline dispatch completed for one MIME part");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_pipeline::{CombineOutputBridge, FeatureRegistry, LintTruncateBridge};
    use std::collections::HashMap;
    use tokio::io::duplex;

    fn empty_pipeline() -> CommandPipeline {
        CommandPipeline::new(
            FeatureRegistry::new(),
            vec![Box::new(outpost_pipeline::AuthPrefixBridge::new(
                "verysecret",
                HashMap::new(),
            ))],
            vec![Box::new(CombineOutputBridge), Box::new(LintTruncateBridge::new(160))],
        )
    }

    fn sample_config() -> SmtpConfig {
        SmtpConfig {
            address: "0.0.0.0".to_string(),
            port: 2525,
            tls_cert_path: None,
            tls_key_path: None,
            per_ip_limit: 5,
            my_domains: vec!["example.com".to_string()],
            forward_to: vec![],
            forward_mailer_addr: "relay.example.com:25".to_string(),
            reply_mailer_addr: "relay.example.com:25".to_string(),
            io_timeout_sec: 5,
            outgoing_subject_keyword: "[outpost-reply]".to_string(),
        }
    }

    struct NullMailer;
    #[async_trait::async_trait]
    impl Mailer for NullMailer {
        async fn send(&self, _from: &str, _to: &[String], _body: &[u8]) {}
    }

    #[tokio::test]
    async fn rcpt_to_wrong_domain_aborts() {
        let (client, server) = duplex(4096);
        let session = Session::new(server);
        let config = sample_config();
        let pipeline = empty_pipeline();
        let emergency = EmergencyFlag::new();
        let metrics = SmtpMetrics::new();

        let handle = tokio::spawn(async move {
            session
                .run(&config, &pipeline, &NullMailer, &NullMailer, None, &emergency, &metrics, Duration::from_secs(2))
                .await
        });

        let mut client_conn = Connection::plain(client);
        let (_, _banner) = client_conn.read_line().await.unwrap();
        client_conn.write_line("EHLO client.example.com").await.unwrap();
        loop {
            let (_, line) = client_conn.read_line().await.unwrap();
            if !line.starts_with("250-") {
                break;
            }
        }
        client_conn.write_line("MAIL FROM:<a@example.com>").await.unwrap();
        let (_, _) = client_conn.read_line().await.unwrap();
        client_conn.write_line("RCPT TO:<x@not-my-domain>").await.unwrap();
        let (_, reply) = client_conn.read_line().await.unwrap();
        assert!(reply.starts_with("550"));

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, Outcome::Abort);
    }
}
