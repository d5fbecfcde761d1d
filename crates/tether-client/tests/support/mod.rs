//! In-process echo server and certificate fixtures for integration
//! tests.

#![allow(dead_code)]

use std::{io::Write, net::SocketAddr, path::Path, sync::Arc};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tether_proto::{Frame, FrameHeader, FrameKind};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
};
use tokio_rustls::TlsAcceptor;

/// Requests and notifies to this route are swallowed without a reply.
pub const NO_REPLY_ROUTE: &str = "test.noreply";

/// Echo server: answers each request with a response carrying the same
/// payload, and each notify with a zero-status ack.
pub struct EchoServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl EchoServer {
    /// Start a plain-TCP echo server on an ephemeral port.
    pub async fn start_plain() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream));
            }
        });

        Self { addr, handle }
    }

    /// Start a TLS echo server presenting `identity` on an ephemeral port.
    pub async fn start_tls(identity: &ServerIdentity) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![identity.cert.clone()], identity.key.clone_key())
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    if let Ok(tls) = acceptor.accept(stream).await {
                        serve(tls).await;
                    }
                });
            }
        });

        Self { addr, handle }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve<S>(mut stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let Ok(Some(frame)) = read_frame(&mut stream).await else {
            break;
        };

        let id = frame.header.correlation_id();
        let reply = match frame.kind() {
            _ if frame.route == NO_REPLY_ROUTE => None,
            Some(FrameKind::Request) => Some(Frame::response(id, 0, frame.payload)),
            Some(FrameKind::Notify) => Some(Frame::ack(id, 0)),
            _ => None,
        };

        if let Some(reply) = reply {
            let mut buf = Vec::new();
            reply.encode(&mut buf).unwrap();
            if stream.write_all(&buf).await.is_err() {
                break;
            }
        }
    }
}

async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; FrameHeader::SIZE];
    if reader.read(&mut buf[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut buf[1..]).await?;

    let body_len = {
        let header = FrameHeader::from_bytes(&buf).map_err(std::io::Error::other)?;
        header.route_len() as usize + header.payload_size() as usize
    };

    buf.resize(FrameHeader::SIZE + body_len, 0);
    reader.read_exact(&mut buf[FrameHeader::SIZE..]).await?;

    Frame::decode(&buf).map(Some).map_err(std::io::Error::other)
}

/// Server certificate and key as handed to the TLS acceptor.
pub struct ServerIdentity {
    pub cert: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
}

/// A freshly generated certificate authority written to a PEM file,
/// able to mint server identities.
pub struct TestCa {
    ca_cert: rcgen::Certificate,
    ca_key: rcgen::KeyPair,
    ca_file: tempfile::NamedTempFile,
}

impl TestCa {
    pub fn generate() -> Self {
        let ca_key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(Vec::new()).unwrap();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let ca_cert = params.self_signed(&ca_key).unwrap();

        let mut ca_file = tempfile::NamedTempFile::new().unwrap();
        ca_file.write_all(ca_cert.pem().as_bytes()).unwrap();

        Self { ca_cert, ca_key, ca_file }
    }

    /// Path of the PEM file holding this CA's certificate.
    pub fn path(&self) -> &Path {
        self.ca_file.path()
    }

    /// Mint a server identity for the given subject names, signed by
    /// this CA.
    pub fn server_identity(&self, names: &[&str]) -> ServerIdentity {
        let key = rcgen::KeyPair::generate().unwrap();
        let params =
            rcgen::CertificateParams::new(names.iter().map(|n| (*n).to_string()).collect::<Vec<_>>())
                .unwrap();
        let cert = params.signed_by(&key, &self.ca_cert, &self.ca_key).unwrap();

        ServerIdentity {
            cert: cert.der().clone(),
            key: PrivateKeyDer::try_from(key.serialize_der()).unwrap(),
        }
    }
}
