//! The external relay collaborator (spec §4.6: "forward ... via the
//! external Mailer", "send that answer as an email reply using the
//! external Mailer"). A minimal hand-rolled SMTP client is the concrete
//! implementation; any other delivery mechanism just needs to implement
//! [`Mailer`].

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tracing::warn;

/// Sends a raw message body to a set of recipients through whatever
/// relay this daemon has been configured with.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `body` to every address in `to`. Failures for one
    /// recipient must not prevent attempting the rest (spec: "Failures
    /// are logged but do not abort").
    async fn send(&self, from: &str, to: &[String], body: &[u8]);
}

/// Relays messages to a single upstream SMTP server using a minimal
/// client conversation (`HELO`/`MAIL FROM`/`RCPT TO`/`DATA`/`QUIT`).
pub struct SmtpRelayMailer {
    relay_addr: String,
    helo_domain: String,
}

impl SmtpRelayMailer {
    #[must_use]
    pub fn new(relay_addr: impl Into<String>, helo_domain: impl Into<String>) -> Self {
        Self {
            relay_addr: relay_addr.into(),
            helo_domain: helo_domain.into(),
        }
    }

    async fn deliver_one(&self, from: &str, to: &str, body: &[u8]) -> std::io::Result<()> {
        let stream = TcpStream::connect(&self.relay_addr).await?;
        let mut reader = BufReader::new(stream);
        let mut line = String::new();

        reader.read_line(&mut line).await?; // banner
        send_command(&mut reader, &format!("HELO {}", self.helo_domain)).await?;
        send_command(&mut reader, &format!("MAIL FROM:<{from}>")).await?;
        send_command(&mut reader, &format!("RCPT TO:<{to}>")).await?;
        send_command(&mut reader, "DATA").await?;

        let stream = reader.get_mut();
        stream.write_all(body).await?;
        if !body.ends_with(b"\r\n") {
            stream.write_all(b"\r\n").await?;
        }
        stream.write_all(b".\r\n").await?;

        let mut reply = String::new();
        reader.read_line(&mut reply).await?;
        send_command(&mut reader, "QUIT").await?;

        Ok(())
    }
}

async fn send_command(
    reader: &mut BufReader<TcpStream>,
    command: &str,
) -> std::io::Result<()> {
    reader.get_mut().write_all(format!("{command}\r\n").as_bytes()).await?;
    let mut reply = String::new();
    reader.read_line(&mut reply).await?;
    Ok(())
}

#[async_trait]
impl Mailer for SmtpRelayMailer {
    async fn send(&self, from: &str, to: &[String], body: &[u8]) {
        for recipient in to {
            if let Err(error) = self.deliver_one(from, recipient, body).await {
                warn!(%recipient, %error, "relay delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingMailer {
        sent: std::sync::Mutex<Vec<(String, Vec<String>, Vec<u8>)>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, from: &str, to: &[String], body: &[u8]) {
            self.sent
                .lock()
                .unwrap()
                .push((from.to_string(), to.to_vec(), body.to_vec()));
        }
    }

    #[tokio::test]
    async fn recording_mailer_captures_calls() {
        let mailer = RecordingMailer {
            sent: std::sync::Mutex::new(Vec::new()),
        };
        mailer.send("a@example.com", &["b@example.com".to_string()], b"hi").await;
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }
}
