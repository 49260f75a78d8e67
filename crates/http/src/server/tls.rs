//! TLS transport for the listener, backed by rustls.
//!
//! The handshake runs in the connection's task before the session starts; a failed
//! handshake only drops that connection.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::pki_types::CertificateDer;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

use crate::handler::Handler;
use crate::server::listener::{Accept, ServerHandle, serve};
use crate::server::SessionOptions;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {what}: {source}")]
    Io { what: &'static str, source: io::Error },

    #[error("no certificate found in pem input")]
    NoCertificate,

    #[error("no private key found in pem input")]
    NoPrivateKey,

    #[error("invalid tls configuration: {source}")]
    Rustls {
        #[from]
        source: rustls::Error,
    },
}

/// Server side TLS settings: a certificate chain and its private key.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    server_config: Arc<ServerConfig>,
}

impl TlsConfig {
    pub fn from_server_config(server_config: Arc<ServerConfig>) -> Self {
        Self { server_config }
    }

    /// Loads a PEM certificate chain and a PEM private key from files
    pub fn from_pem_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self, TlsError> {
        let cert_pem = fs::read(cert_path).map_err(|source| TlsError::Io { what: "certificate file", source })?;
        let key_pem = fs::read(key_path).map_err(|source| TlsError::Io { what: "private key file", source })?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TlsError> {
        let certs = rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<Result<Vec<CertificateDer<'static>>, _>>()
            .map_err(|source| TlsError::Io { what: "certificate", source })?;
        if certs.is_empty() {
            return Err(TlsError::NoCertificate);
        }

        let key = rustls_pemfile::private_key(&mut &key_pem[..])
            .map_err(|source| TlsError::Io { what: "private key", source })?
            .ok_or(TlsError::NoPrivateKey)?;

        let mut server_config = ServerConfig::builder().with_no_client_auth().with_single_cert(certs, key)?;
        server_config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(Self::from_server_config(Arc::new(server_config)))
    }
}

/// Runs the TLS handshake on each accepted stream
#[derive(Clone)]
pub struct TlsAccept {
    acceptor: TlsAcceptor,
}

impl std::fmt::Debug for TlsAccept {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsAccept").finish_non_exhaustive()
    }
}

impl From<TlsConfig> for TlsAccept {
    fn from(config: TlsConfig) -> Self {
        Self { acceptor: TlsAcceptor::from(config.server_config) }
    }
}

impl Accept for TlsAccept {
    type Io = TlsStream<TcpStream>;

    async fn accept(&self, stream: TcpStream) -> io::Result<Self::Io> {
        self.acceptor.accept(stream).await
    }
}

/// Binds `addr` and serves HTTP over TLS with `handler`
pub async fn listen_and_serve_tls<A, H>(addr: A, tls_config: TlsConfig, handler: Arc<H>, options: SessionOptions) -> io::Result<ServerHandle>
where
    A: ToSocketAddrs,
    H: Handler + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve(listener, TlsAccept::from(tls_config), handler, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Response;
    use rustls::pki_types::ServerName;
    use rustls::{ClientConfig, RootCertStore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_rustls::TlsConnector;

    use crate::handler::{ServerRequest, make_handler};
    use crate::protocol::body::BoxError;

    async fn secure(_request: ServerRequest) -> Result<Response<&'static str>, BoxError> {
        Ok(Response::new("secure hello"))
    }

    #[test]
    fn reject_empty_pem() {
        assert!(matches!(TlsConfig::from_pem(b"", b""), Err(TlsError::NoCertificate)));
    }

    #[tokio::test]
    async fn serve_over_tls() {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
        let tls_config = TlsConfig::from_pem(certified.cert.pem().as_bytes(), certified.key_pair.serialize_pem().as_bytes()).unwrap();

        let server = listen_and_serve_tls("127.0.0.1:0", tls_config, Arc::new(make_handler(secure)), SessionOptions::new()).await.unwrap();

        let mut roots = RootCertStore::empty();
        roots.add(certified.cert.der().clone()).unwrap();
        let client_config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(client_config));

        let tcp = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut stream = connector.connect(ServerName::try_from("localhost").unwrap(), tcp).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await.unwrap();

        let mut response = Vec::new();
        // rustls reports the peer closing without close_notify as an error, the bytes are already read
        let _ = stream.read_to_end(&mut response).await;
        let response = String::from_utf8(response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.ends_with("secure hello"));

        server.close();
        server.closed().await;
    }
}
