//! STARTTLS support: loading a certificate pair into a reusable
//! `TlsAcceptor` (spec §4.6 "TLS upgrade").

use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use tokio_rustls::{
    rustls::{
        pki_types::{CertificateDer, PrivateKeyDer},
        ServerConfig,
    },
    TlsAcceptor,
};

use outpost_common::OutpostError;

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, OutpostError> {
    let file = File::open(path)
        .map_err(|e| OutpostError::ConfigInvalid(format!("opening certificate {path:?}: {e}")))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| OutpostError::ConfigInvalid(format!("parsing certificate {path:?}: {e}")))
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, OutpostError> {
    let file = File::open(path)
        .map_err(|e| OutpostError::ConfigInvalid(format!("opening key {path:?}: {e}")))?;
    let mut reader = BufReader::new(file);

    match rustls_pemfile::read_one(&mut reader)
        .map_err(|e| OutpostError::ConfigInvalid(format!("parsing key {path:?}: {e}")))?
    {
        Some(rustls_pemfile::Item::Pkcs1Key(key)) => Ok(PrivateKeyDer::Pkcs1(key)),
        Some(rustls_pemfile::Item::Pkcs8Key(key)) => Ok(PrivateKeyDer::Pkcs8(key)),
        Some(rustls_pemfile::Item::Sec1Key(key)) => Ok(PrivateKeyDer::Sec1(key)),
        _ => Err(OutpostError::ConfigInvalid(format!(
            "{path:?}: expected a PKCS1, PKCS8, or SEC1 private key"
        ))),
    }
}

/// Build a `TlsAcceptor` from a certificate/key pair, to be reused across
/// every `STARTTLS` upgrade this daemon performs.
///
/// # Errors
/// Returns `ConfigInvalid` if either file is missing or unparseable, or
/// if the certificate/key pair doesn't match.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, OutpostError> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| OutpostError::ConfigInvalid(format!("building TLS server config: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
