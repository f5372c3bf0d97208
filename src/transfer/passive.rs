//! Passive-mode data transport
//!
//! A [`PassiveTransport`] is created by PASV: it owns a listener bound to the
//! first free port of the configured window and, once a client connects, the
//! single accepted data socket. It serves exactly one LIST/RETR/STOR and is
//! then closed. Sessions scan the window independently, so binds can collide;
//! an exhausted scan is retried after a short random delay.

use log::{debug, info, warn};
use rand::Rng;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::error::TransferError;

const RETRY_JITTER_MS: std::ops::Range<u64> = 10..60;

/// Listener plus (at most one) accepted data connection.
#[derive(Debug)]
pub struct PassiveTransport {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    conn: Option<TcpStream>,
}

impl PassiveTransport {
    /// Binds a listener on `ip`, trying each port of `ports` in ascending order.
    ///
    /// Ports already in use are skipped. If the whole window is busy the scan
    /// is repeated up to `attempts` times with a jittered pause in between.
    pub async fn open(
        ip: IpAddr,
        ports: RangeInclusive<u16>,
        attempts: u32,
    ) -> Result<Self, TransferError> {
        for attempt in 1..=attempts.max(1) {
            for port in ports.clone() {
                let addr = SocketAddr::new(ip, port);
                match TcpListener::bind(addr).await {
                    Ok(listener) => {
                        let local_addr = listener.local_addr().unwrap_or(addr);
                        debug!("Passive listener bound to {local_addr}");
                        return Ok(Self {
                            listener: Some(listener),
                            local_addr,
                            conn: None,
                        });
                    }
                    Err(e) if is_port_busy(e.kind()) => continue,
                    Err(source) => return Err(TransferError::Bind { addr, source }),
                }
            }

            if attempt < attempts {
                let pause = rand::rng().random_range(RETRY_JITTER_MS) * u64::from(attempt);
                warn!(
                    "Passive window {}-{} exhausted (attempt {attempt}/{attempts}), retrying in {pause}ms",
                    ports.start(),
                    ports.end()
                );
                tokio::time::sleep(Duration::from_millis(pause)).await;
            }
        }

        Err(TransferError::NoPortAvailable {
            low: *ports.start(),
            high: *ports.end(),
        })
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Waits for the data connection and returns it.
    ///
    /// The first accepted connection is kept, so later calls within the same
    /// transfer return it again. When `peer` is set, connections from other
    /// addresses are dropped and the listener keeps waiting.
    pub async fn accept(&mut self, peer: Option<IpAddr>) -> Result<&mut TcpStream, TransferError> {
        if self.conn.is_none() {
            let listener = self.listener.as_ref().ok_or_else(|| {
                TransferError::Accept(std::io::Error::new(
                    ErrorKind::NotConnected,
                    "passive listener already closed",
                ))
            })?;

            loop {
                let (stream, from) = listener.accept().await.map_err(TransferError::Accept)?;
                match peer {
                    Some(expected) if !same_host(expected, from.ip()) => {
                        warn!(
                            "Rejected data connection from {from} on port {}, expected {expected}",
                            self.local_addr.port()
                        );
                    }
                    _ => {
                        info!("Data connection accepted from {from} on port {}", self.local_addr.port());
                        self.conn = Some(stream);
                        break;
                    }
                }
            }
        }

        self.conn.as_mut().ok_or_else(|| {
            TransferError::Accept(std::io::Error::new(ErrorKind::NotConnected, "no data connection"))
        })
    }

    /// Releases the listener and any accepted connection. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let _ = conn.shutdown().await;
        }
        if self.listener.take().is_some() {
            debug!("Passive listener on {} closed", self.local_addr);
        }
    }
}

fn is_port_busy(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::AddrInUse | ErrorKind::PermissionDenied)
}

fn same_host(a: IpAddr, b: IpAddr) -> bool {
    a.to_canonical() == b.to_canonical()
}

/// IPv4 form of `ip`, unwrapping IPv4-mapped IPv6 addresses.
pub fn ipv4_of(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip.to_canonical() {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(_) => None,
    }
}

/// Encodes an address as the PASV `h1,h2,h3,h4,p1,p2` tuple.
pub fn pasv_tuple(ip: Ipv4Addr, port: u16) -> String {
    let [h1, h2, h3, h4] = ip.octets();
    format!("{h1},{h2},{h3},{h4},{},{}", port / 256, port % 256)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn pasv_tuple_splits_port() {
        assert_eq!(pasv_tuple(Ipv4Addr::new(10, 0, 0, 5), 2121), "10,0,0,5,8,73");
        assert_eq!(pasv_tuple(Ipv4Addr::LOCALHOST, 65535), "127,0,0,1,255,255");
    }

    #[test]
    fn mapped_addresses_unwrap_to_ipv4() {
        let mapped: IpAddr = "::ffff:192.0.2.1".parse().unwrap();
        assert_eq!(ipv4_of(mapped), Some(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(ipv4_of("::1".parse().unwrap()), None);
    }

    #[tokio::test]
    async fn open_takes_first_free_port_in_order() {
        let blocker = TcpListener::bind((LOCALHOST, 46100)).await.unwrap();
        let transport = PassiveTransport::open(LOCALHOST, 46100..=46104, 1).await.unwrap();
        assert_eq!(transport.port(), 46101);
        drop(blocker);
    }

    #[tokio::test]
    async fn open_fails_when_window_exhausted() {
        let _a = TcpListener::bind((LOCALHOST, 46110)).await.unwrap();
        let _b = TcpListener::bind((LOCALHOST, 46111)).await.unwrap();
        let err = PassiveTransport::open(LOCALHOST, 46110..=46111, 2).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::NoPortAvailable { low: 46110, high: 46111 }
        ));
    }

    #[tokio::test]
    async fn accept_is_memoized_and_close_is_idempotent() {
        let mut transport = PassiveTransport::open(LOCALHOST, 46120..=46129, 1).await.unwrap();
        let port = transport.port();

        let mut client = TcpStream::connect((LOCALHOST, port)).await.unwrap();
        let first = transport.accept(Some(LOCALHOST)).await.unwrap().local_addr().unwrap();
        let again = transport.accept(Some(LOCALHOST)).await.unwrap();
        assert_eq!(again.local_addr().unwrap(), first);
        again.write_all(b"ping").await.unwrap();

        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        transport.close().await;
        transport.close().await;
        assert!(TcpStream::connect((LOCALHOST, port)).await.is_err());
        assert!(transport.accept(None).await.is_err());
    }
}
