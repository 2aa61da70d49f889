//! UDP/TCP connection lifecycle.
//!
//! A [`Connection`] owns exactly one socket and the resolved destination for
//! one uninterrupted session. The socket is recreated on every reconnect and
//! never reused across protocol runs. Before any socket work the radio link
//! is brought up via [`ensure_link`](super::ensure_link).

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tokio::time::timeout;

use crate::core::constants::RECV_BUFFER_SIZE;
use crate::core::{AbortSignal, ProbeTransport, Protocol, RadioLink, TransportError};

use super::link::ensure_link;

/// The socket half of a connection, one variant per protocol.
#[derive(Debug)]
enum ProbeSocket {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

/// One connection to the probe server.
///
/// Exclusively owned by the search that opened it; released before that
/// search returns, on every exit path.
pub struct Connection<L> {
    protocol: Protocol,
    host: String,
    port: u16,
    link: Arc<L>,
    abort: AbortSignal,
    socket: Option<ProbeSocket>,
    recv_buffer: Vec<u8>,
}

impl<L: RadioLink> Connection<L> {
    /// Create an unconnected connection for one protocol run.
    pub fn new(
        protocol: Protocol,
        host: impl Into<String>,
        link: Arc<L>,
        abort: AbortSignal,
    ) -> Self {
        Connection {
            protocol,
            host: host.into(),
            port: protocol.port(),
            link,
            abort,
            socket: None,
            recv_buffer: vec![0u8; RECV_BUFFER_SIZE],
        }
    }

    /// Override the fixed destination port, for tests against local servers.
    #[cfg(test)]
    fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// Resolve the destination hostname, preferring IPv4.
    async fn resolve(&self) -> Result<SocketAddr, TransportError> {
        let addrs: Vec<SocketAddr> = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|source| TransportError::Resolution {
                host: self.host.clone(),
                source,
            })?
            .collect();

        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| TransportError::Resolution {
                host: self.host.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
            })
    }
}

impl<L: RadioLink> ProbeTransport for Connection<L> {
    async fn connect(&mut self) -> Result<(), TransportError> {
        // A reconnect never reuses the old socket.
        self.socket = None;

        ensure_link(self.link.as_ref(), &self.abort).await?;
        let addr = self.resolve().await?;

        let socket = match self.protocol {
            Protocol::Udp => {
                let socket = UdpSocket::bind(("0.0.0.0", 0))
                    .await
                    .map_err(TransportError::Socket)?;
                socket.connect(addr).await.map_err(TransportError::Connect)?;
                ProbeSocket::Udp(socket)
            }
            Protocol::Tcp => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(TransportError::Connect)?;
                ProbeSocket::Tcp(stream)
            }
        };

        self.socket = Some(socket);
        Ok(())
    }

    async fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        // Any I/O failure here means the binding is suspect; the caller
        // recovers by reconnecting, so everything maps to NotConnected.
        match self.socket.as_mut() {
            Some(ProbeSocket::Udp(socket)) => {
                socket
                    .send(packet)
                    .await
                    .map_err(TransportError::NotConnected)?;
            }
            Some(ProbeSocket::Tcp(stream)) => {
                stream
                    .write_all(packet)
                    .await
                    .map_err(TransportError::NotConnected)?;
            }
            None => {
                return Err(TransportError::NotConnected(io::Error::from(
                    io::ErrorKind::NotConnected,
                )));
            }
        }
        Ok(())
    }

    async fn recv_slice(&mut self, slice: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let received = match self.socket.as_mut() {
            Some(ProbeSocket::Udp(socket)) => {
                match timeout(slice, socket.recv(&mut self.recv_buffer)).await {
                    Err(_) => return Ok(None),
                    Ok(result) => result.map_err(TransportError::NotConnected)?,
                }
            }
            Some(ProbeSocket::Tcp(stream)) => {
                match timeout(slice, stream.read(&mut self.recv_buffer)).await {
                    Err(_) => return Ok(None),
                    Ok(Ok(0)) => {
                        // Peer closed the stream.
                        return Err(TransportError::NotConnected(io::Error::from(
                            io::ErrorKind::UnexpectedEof,
                        )));
                    }
                    Ok(result) => result.map_err(TransportError::NotConnected)?,
                }
            }
            None => {
                return Err(TransportError::NotConnected(io::Error::from(
                    io::ErrorKind::NotConnected,
                )));
            }
        };

        Ok(Some(self.recv_buffer[..received].to_vec()))
    }

    fn close(&mut self) {
        self.socket = None;
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use crate::core::RegistrationStatus;

    use super::*;

    struct AttachedRadio;

    impl RadioLink for AttachedRadio {
        fn registration_status(&self) -> RegistrationStatus {
            RegistrationStatus::RegisteredHome
        }

        fn request_reattach(&self) {}
    }

    fn connection(protocol: Protocol, port: u16) -> Connection<AttachedRadio> {
        let mut conn = Connection::new(
            protocol,
            "127.0.0.1",
            Arc::new(AttachedRadio),
            AbortSignal::never(),
        );
        conn.set_port(port);
        conn
    }

    #[tokio::test]
    async fn test_udp_send_and_recv() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut conn = connection(Protocol::Udp, server.local_addr().unwrap().port());

        conn.connect().await.unwrap();
        conn.send(b"ping\0").await.unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"ping\0");

        server.send_to(b"pong\0", from).await.unwrap();
        let reply = conn.recv_slice(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.as_deref(), Some(&b"pong\0"[..]));
    }

    #[tokio::test]
    async fn test_udp_silent_slice_elapses() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut conn = connection(Protocol::Udp, server.local_addr().unwrap().port());

        conn.connect().await.unwrap();
        let reply = conn.recv_slice(Duration::from_millis(50)).await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_tcp_send_recv_and_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let len = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..len]).await.unwrap();
            // Dropping the stream closes it.
        });

        let mut conn = connection(Protocol::Tcp, port);
        conn.connect().await.unwrap();
        conn.send(b"ping\0").await.unwrap();

        let reply = conn.recv_slice(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.as_deref(), Some(&b"ping\0"[..]));

        server.await.unwrap();
        let err = conn.recv_slice(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut conn = connection(Protocol::Udp, server.local_addr().unwrap().port());

        conn.connect().await.unwrap();
        conn.close();
        conn.close();

        let err = conn.send(b"ping\0").await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_a_resolution_error() {
        let mut conn = Connection::new(
            Protocol::Udp,
            "host.invalid",
            Arc::new(AttachedRadio),
            AbortSignal::never(),
        );
        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Resolution { .. }));
    }
}
