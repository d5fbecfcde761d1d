//! TCP/TLS transport task.
//!
//! One task per connection attempt. The task dials, optionally runs the
//! TLS handshake against a trust anchor snapshot, then bridges frames
//! between the socket and the driver: outbound frames arrive on a
//! channel, inbound frames and lifecycle outcomes are reported as
//! generation-tagged [`TransportEvent`]s. Protocol logic stays in the
//! driver; this layer only moves bytes.

use std::{io, sync::Arc, time::Duration};

use rustls::{RootCertStore, pki_types::ServerName};
use tether_core::{TransportEvent, TransportKind};
use tether_proto::{Frame, FrameHeader};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc,
    time::timeout,
};
use tokio_rustls::TlsConnector;

/// Handshake failure reason published to lifecycle handlers. The
/// underlying TLS error detail goes to the log only.
pub(crate) const TLS_HANDSHAKE_ERROR: &str = "TLS Handshake Error";

/// Transport event tagged with the connection attempt that produced it.
#[derive(Debug)]
pub(crate) struct TaggedEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Everything a transport task needs to dial and secure one connection.
pub(crate) struct DialPlan {
    pub host: String,
    pub port: u16,
    pub generation: u64,
    pub kind: TransportKind,
    pub server_name: Option<String>,
    pub connect_timeout: Duration,
    pub anchors: Arc<RootCertStore>,
}

/// Handle to a running transport task.
///
/// Dropping the handle closes the outbound channel; the task then shuts
/// the write half down and reports `Closed` once the peer finishes.
pub(crate) struct TransportHandle {
    outbound: mpsc::UnboundedSender<Frame>,
    abort: tokio::task::AbortHandle,
    generation: u64,
}

impl TransportHandle {
    /// Generation of the connection attempt this task serves.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a frame for sending. A task that already exited drops the
    /// frame; the driver learns of the dead connection from its events.
    pub fn send(&self, frame: Frame) {
        if self.outbound.send(frame).is_err() {
            tracing::debug!("dropping frame for finished transport");
        }
    }

    /// Kill the task without the graceful close sequence.
    pub fn abort(&self) {
        self.abort.abort();
    }
}

/// Spawn the transport task for one connection attempt.
pub(crate) fn spawn(plan: DialPlan, events: mpsc::UnboundedSender<TaggedEvent>) -> TransportHandle {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let generation = plan.generation;
    let handle = tokio::spawn(run_transport(plan, outbound_rx, events));

    TransportHandle { outbound: outbound_tx, abort: handle.abort_handle(), generation }
}

async fn run_transport(
    plan: DialPlan,
    outbound: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<TaggedEvent>,
) {
    let generation = plan.generation;
    let emit = move |event: TransportEvent| {
        // The receiver only disappears at client shutdown.
        let _ = events.send(TaggedEvent { generation, event });
    };

    let addr = (plan.host.clone(), plan.port);
    let stream = match timeout(plan.connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::debug!(host = %plan.host, port = plan.port, error = %e, "dial failed");
            emit(TransportEvent::Error { reason: e.to_string() });
            return;
        },
        Err(_) => {
            emit(TransportEvent::Error { reason: "connect timed out".to_string() });
            return;
        },
    };

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "set_nodelay failed");
    }
    emit(TransportEvent::StreamReady);

    match plan.kind {
        TransportKind::Plain => run_stream(stream, outbound, emit).await,
        TransportKind::Tls => {
            let Some(tls) = handshake(&plan, stream, &emit).await else {
                return;
            };
            emit(TransportEvent::HandshakePassed);
            run_stream(tls, outbound, emit).await;
        },
    }
}

/// Run the TLS handshake against the plan's trust anchor snapshot.
///
/// Any failure, including having no anchors configured at all, is
/// reported with the fixed [`TLS_HANDSHAKE_ERROR`] reason; the detail
/// is logged.
async fn handshake(
    plan: &DialPlan,
    stream: TcpStream,
    emit: &impl Fn(TransportEvent),
) -> Option<tokio_rustls::client::TlsStream<TcpStream>> {
    let fail = |detail: String| {
        tracing::warn!(host = %plan.host, detail, "TLS handshake failed");
        emit(TransportEvent::HandshakeFailed { reason: TLS_HANDSHAKE_ERROR.to_string() });
    };

    // rustls rejects a config with zero roots at build time; report it
    // as the handshake failure it would have been.
    if plan.anchors.is_empty() {
        fail("no trust anchors configured".to_string());
        return None;
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(Arc::clone(&plan.anchors))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let sni = plan.server_name.clone().unwrap_or_else(|| plan.host.clone());
    let domain = match ServerName::try_from(sni) {
        Ok(domain) => domain,
        Err(e) => {
            fail(format!("invalid server name: {e}"));
            return None;
        },
    };

    match timeout(plan.connect_timeout, connector.connect(domain, stream)).await {
        Ok(Ok(tls)) => Some(tls),
        Ok(Err(e)) => {
            fail(e.to_string());
            None
        },
        Err(_) => {
            fail("handshake timed out".to_string());
            None
        },
    }
}

/// Bridge frames between the established stream and the driver.
///
/// The writer runs as its own task so a blocked write never stalls
/// inbound frame delivery. Closing the outbound channel (dropping the
/// handle) shuts the write half down; the reader then reports `Closed`
/// on the peer's EOF.
async fn run_stream<S>(
    stream: S,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    emit: impl Fn(TransportEvent),
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut read_half, mut write_half) = tokio::io::split(stream);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let mut buf = Vec::with_capacity(frame.encoded_len());
            if let Err(e) = frame.encode(&mut buf) {
                tracing::warn!(error = %e, "dropping unencodable frame");
                continue;
            }
            if let Err(e) = write_half.write_all(&buf).await {
                tracing::debug!(error = %e, "write failed");
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    loop {
        match read_frame(&mut read_half).await {
            Ok(Some(frame)) => emit(TransportEvent::Frame(frame)),
            Ok(None) => {
                emit(TransportEvent::Closed);
                break;
            },
            Err(e) => {
                emit(TransportEvent::Error { reason: e.to_string() });
                break;
            },
        }
    }

    writer.abort();
}

/// Read one complete frame. `Ok(None)` on clean EOF at a frame
/// boundary; EOF mid-frame is an error.
async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; FrameHeader::SIZE];
    if reader.read(&mut buf[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut buf[1..]).await?;

    let body_len = {
        let header = FrameHeader::from_bytes(&buf).map_err(io::Error::other)?;
        (header.route_len() as usize).saturating_add(header.payload_size() as usize)
    };

    buf.resize(FrameHeader::SIZE + body_len, 0);
    reader.read_exact(&mut buf[FrameHeader::SIZE..]).await?;

    Frame::decode(&buf).map(Some).map_err(io::Error::other)
}
