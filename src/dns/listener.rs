//! A single-transport DNS listener.

use crate::challenge::ChallengeToken;
use crate::config::{Config, IpFamily, Protocol, Transport};
use crate::dns::handlers::Handler;
use crate::dns::record::ZoneRecord;
use crate::dns::zone::Zone;
use crate::error::Error;
use socket2::{Domain, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trust_dns_proto::op::{Message, MessageType};

// Large enough for any EDNS0 query a client may send.
const MAX_UDP_MESSAGE: usize = 4096;
const TCP_BACKLOG: i32 = 1024;

/// Serves one [`Zone`] over one transport bound to one address.
#[derive(Debug)]
pub struct Listener {
    addr: SocketAddr,
    transport: Transport,
    tcp_timeout: Duration,
    handler: Handler,
    shutdown: CancellationToken,
    local_addr: OnceLock<SocketAddr>,
}

impl Listener {
    /// Build the listener and its zone. Nothing is bound until [`Listener::start`].
    pub fn new(addr: SocketAddr, transport: Transport, config: &Config) -> Self {
        Listener {
            addr,
            transport,
            tcp_timeout: config.dns_tcp_timeout,
            handler: Handler::new(Zone::new(config), ChallengeToken::default()),
            shutdown: CancellationToken::new(),
            local_addr: OnceLock::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// The bound address, once the listener is serving. Differs from [`Listener::addr`] when
    /// binding to port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn challenge(&self) -> &ChallengeToken {
        self.handler.challenge()
    }

    pub fn soa(&self) -> Option<&ZoneRecord> {
        self.handler.zone().soa()
    }

    pub(super) fn set_soa(&mut self, soa: Option<ZoneRecord>) {
        self.handler.zone_mut().set_soa(soa);
    }

    /// Ask the listener to stop. It stops accepting queries at once, finishes the replies it
    /// is writing, then releases its socket and returns from [`Listener::start`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Bind and serve until [`Listener::shutdown`].
    ///
    /// A bind failure or fatal socket error is sent on `errors` once, and the listener stops.
    /// It is never retried here.
    pub async fn start(self: Arc<Self>, errors: mpsc::Sender<Error>) {
        let result = match self.transport.protocol {
            Protocol::Udp => self.serve_udp().await,
            Protocol::Tcp => self.serve_tcp().await,
        };
        if let Err(err) = result {
            error!(
                addr = %self.addr,
                transport = %self.transport,
                "DNS listener failed: {err}"
            );
            if errors.send(err).await.is_err() {
                warn!("DNS listener error channel closed");
            }
        }
    }

    fn bind_socket(&self, ty: Type, protocol: socket2::Protocol) -> Result<Socket, Error> {
        let mismatch = match self.transport.family {
            IpFamily::Any => false,
            IpFamily::V4 => self.addr.is_ipv6(),
            IpFamily::V6 => self.addr.is_ipv4(),
        };
        if mismatch {
            return Err(Error::TransportFamilyMismatch {
                transport: self.transport,
                addr: self.addr,
            });
        }

        let socket = Socket::new(Domain::for_address(self.addr), ty, Some(protocol))?;
        if self.addr.is_ipv6() {
            socket.set_only_v6(self.transport.family == IpFamily::V6)?;
        }
        socket.set_reuse_address(true)?;
        socket.bind(&self.addr.into())?;
        socket.set_nonblocking(true)?;
        Ok(socket)
    }

    fn bound(&self, local_addr: SocketAddr) {
        let _ = self.local_addr.set(local_addr);
        info!(
            addr = %local_addr,
            transport = %self.transport,
            "DNS listening"
        );
    }

    async fn serve_udp(&self) -> Result<(), Error> {
        let socket = self.bind_socket(Type::DGRAM, socket2::Protocol::UDP)?;
        let socket = UdpSocket::from_std(socket.into())?;
        self.bound(socket.local_addr()?);

        let mut buf = vec![0u8; MAX_UDP_MESSAGE];
        loop {
            let (len, peer) = tokio::select! {
                () = self.shutdown.cancelled() => break,
                received = socket.recv_from(&mut buf) => received?,
            };
            let Some(reply) = self.reply(&buf[..len], peer).await else {
                continue;
            };
            if let Err(err) = socket.send_to(&reply, peer).await {
                warn!(%peer, "failed to send DNS reply: {err}");
            }
        }

        info!(addr = %self.addr, transport = %self.transport, "DNS listener stopped");
        Ok(())
    }

    async fn serve_tcp(self: &Arc<Self>) -> Result<(), Error> {
        let socket = self.bind_socket(Type::STREAM, socket2::Protocol::TCP)?;
        socket.listen(TCP_BACKLOG)?;
        let listener = TcpListener::from_std(socket.into())?;
        self.bound(listener.local_addr()?);

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let this = Arc::clone(self);
                        connections.spawn(async move { this.serve_connection(stream, peer).await });
                    }
                    Err(err) if is_transient(&err) => {
                        debug!("failed to accept DNS connection: {err}");
                    }
                    Err(err) => return Err(err.into()),
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(err) = finished {
                        warn!("DNS connection task failed: {err}");
                    }
                }
            }
        }

        drop(listener);
        while let Some(finished) = connections.join_next().await {
            if let Err(err) = finished {
                warn!("DNS connection task failed: {err}");
            }
        }

        info!(addr = %self.addr, transport = %self.transport, "DNS listener stopped");
        Ok(())
    }

    async fn serve_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        loop {
            let request = tokio::select! {
                () = self.shutdown.cancelled() => break,
                read = tokio::time::timeout(self.tcp_timeout, read_frame(&mut stream)) => {
                    match read {
                        Ok(Ok(Some(frame))) => frame,
                        Ok(Ok(None)) => break,
                        Ok(Err(err)) => {
                            debug!(%peer, "failed to read DNS message: {err}");
                            break;
                        }
                        Err(_) => {
                            debug!(%peer, "DNS connection timed out");
                            break;
                        }
                    }
                }
            };
            let Some(reply) = self.reply(&request, peer).await else {
                continue;
            };
            if let Err(err) = write_frame(&mut stream, &reply).await {
                debug!(%peer, "failed to send DNS reply: {err}");
                break;
            }
        }
    }

    /// Decode, resolve and encode. Messages that can't be decoded, or that are responses
    /// themselves, get no reply.
    async fn reply(&self, request: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        let request = match Message::from_vec(request) {
            Ok(message) => message,
            Err(err) => {
                debug!(%peer, "dropping undecodable DNS message: {err}");
                return None;
            }
        };
        if request.message_type() == MessageType::Response {
            debug!(%peer, id = request.id(), "dropping DNS response sent as a query");
            return None;
        }

        let response = self.handler.handle_message(&request).await;
        match response.to_vec() {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                error!(%peer, id = response.id(), "failed to encode DNS reply: {err}");
                None
            }
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Read one length-prefixed message (RFC 1035 section 4.2.2). `None` on a clean EOF.
async fn read_frame(stream: &mut TcpStream) -> io::Result<Option<Vec<u8>>> {
    let len = match stream.read_u16().await {
        Ok(len) => len,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    };
    let mut buf = vec![0u8; usize::from(len)];
    stream.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

async fn write_frame(stream: &mut TcpStream, message: &[u8]) -> io::Result<()> {
    let len = u16::try_from(message.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            "DNS message too long for TCP framing",
        )
    })?;
    stream.write_u16(len).await?;
    stream.write_all(message).await?;
    stream.flush().await
}
