//! The line-oriented transport a session speaks over — plain TCP until
//! (and if) `STARTTLS` upgrades it in place (spec §4.6).

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_rustls::{server::TlsStream, TlsAcceptor};

use outpost_common::OutpostError;

/// A transport that starts out plain and may be upgraded to TLS exactly
/// once, in place, without the caller needing to juggle two types.
pub enum Connection<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    Plain(BufReader<Stream>),
    Tls(BufReader<Box<TlsStream<Stream>>>),
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Connection<Stream> {
    #[must_use]
    pub fn plain(stream: Stream) -> Self {
        Self::Plain(BufReader::new(stream))
    }

    /// `true` once `STARTTLS` has succeeded.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Write `line` followed by CRLF.
    pub async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let framed = format!("{line}\r\n");
        match self {
            Self::Plain(stream) => stream.write_all(framed.as_bytes()).await,
            Self::Tls(stream) => stream.write_all(framed.as_bytes()).await,
        }
    }

    /// Read one CRLF- or LF-terminated line, with the terminator
    /// stripped. Returns `Ok(0)` on clean EOF.
    pub async fn read_line(&mut self) -> std::io::Result<(usize, String)> {
        let mut buf = String::new();
        let n = match self {
            Self::Plain(stream) => stream.read_line(&mut buf).await?,
            Self::Tls(stream) => stream.read_line(&mut buf).await?,
        };
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok((n, buf))
    }

    /// Perform the `STARTTLS` handshake over the socket in place (spec
    /// §4.6: "all subsequent conversation occurs on the encrypted
    /// channel").
    ///
    /// # Errors
    /// Returns `OutpostError::ConfigInvalid` (mapped by the caller to a
    /// `TLSERROR` transition) on handshake failure.
    pub async fn upgrade(self, acceptor: &TlsAcceptor) -> Result<Self, OutpostError> {
        let stream = match self {
            Self::Plain(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(OutpostError::ConfigInvalid("already upgraded".to_string())),
        };

        let tls_stream = acceptor
            .accept(stream)
            .await
            .map_err(|e| OutpostError::ConfigInvalid(format!("TLS handshake failed: {e}")))?;

        Ok(Self::Tls(BufReader::new(Box::new(tls_stream))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn write_then_read_line_round_trips() {
        let (client, server) = duplex(256);
        let mut server_conn = Connection::plain(server);
        let mut client_conn = Connection::plain(client);

        server_conn.write_line("220 ready").await.unwrap();
        let (n, line) = client_conn.read_line().await.unwrap();
        assert!(n > 0);
        assert_eq!(line, "220 ready");
    }
}
