//! Socket primitives: dialing the intake and the live connection handle

use crate::core::{EndpointConfig, TlsOptions};
use native_tls::{Certificate, TlsConnector, TlsStream};
use socket2::{SockRef, TcpKeepalive};
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// A live socket to the intake
pub enum Connection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Connection {
    fn tcp(&self) -> &TcpStream {
        match self {
            Connection::Plain(stream) => stream,
            Connection::Tls(stream) => stream.get_ref(),
        }
    }

    /// Update the write deadline applied to every following write
    pub fn set_write_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.tcp().set_write_timeout(Some(timeout))
    }

    /// Write the full buffer and push it out of any TLS buffering
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Connection::Plain(stream) => {
                stream.write_all(buf)?;
                stream.flush()
            }
            Connection::Tls(stream) => {
                stream.write_all(buf)?;
                stream.flush()
            }
        }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().peer_addr()
    }

    /// Close the connection, sending a TLS close_notify first when encrypted
    pub fn shutdown(self) -> io::Result<()> {
        match self {
            Connection::Plain(stream) => stream.shutdown(Shutdown::Both),
            Connection::Tls(mut stream) => {
                // The peer may already be gone; the TCP shutdown below is
                // what matters.
                let _ = stream.shutdown();
                stream.get_ref().shutdown(Shutdown::Both)
            }
        }
    }
}

impl TlsOptions {
    fn connector(&self) -> io::Result<TlsConnector> {
        let mut builder = TlsConnector::builder();
        if let Some(pem) = &self.root_certificate_pem {
            let root = Certificate::from_pem(pem.as_bytes()).map_err(io::Error::other)?;
            builder.add_root_certificate(root);
        }
        if self.accept_invalid_certs {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build().map_err(io::Error::other)
    }
}

fn connect_tcp(endpoint: &EndpointConfig) -> io::Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()?
        .collect();

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, endpoint.connect_timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                if let Some(idle) = endpoint.keep_alive {
                    SockRef::from(&stream)
                        .set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))?;
                }
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} resolved to no addresses", endpoint.address()),
        )
    }))
}

/// Open a connection to the endpoint
///
/// The TLS handshake runs here rather than on the first write, so a bad
/// certificate or a stalled peer shows up as a dial failure. The connect
/// timeout bounds the handshake as well.
pub fn connect(endpoint: &EndpointConfig) -> io::Result<Connection> {
    let stream = connect_tcp(endpoint)?;
    let Some(tls) = &endpoint.tls else {
        return Ok(Connection::Plain(stream));
    };

    let connector = tls.connector()?;
    stream.set_read_timeout(Some(endpoint.connect_timeout))?;
    stream.set_write_timeout(Some(endpoint.connect_timeout))?;
    let stream = connector
        .connect(&tls.server_name, stream)
        .map_err(io::Error::other)?;
    stream.get_ref().set_read_timeout(None)?;
    Ok(Connection::Tls(Box::new(stream)))
}
