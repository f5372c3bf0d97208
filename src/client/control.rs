//! Control connection I/O
//!
//! Line reading and reply writing for one control connection, plus
//! [`ControlChannel::closed`], which resolves when the client hangs up and is
//! used to abandon a blocked data transfer.

use log::{debug, warn};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::protocol::Reply;

const READ_CHUNK: usize = 1024;

/// Outcome of reading one control line.
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    Command(String),
    TooLong,
    Eof,
}

pub struct ControlChannel {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    /// Bytes received but not yet returned as lines.
    pending: Vec<u8>,
    peer: SocketAddr,
    local: SocketAddr,
    max_line: usize,
}

impl ControlChannel {
    pub fn new(stream: TcpStream, max_line: usize) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        let local = stream.local_addr()?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: read_half,
            writer: write_half,
            pending: Vec::new(),
            peer,
            local,
            max_line,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Local address of the control socket; PASV listeners bind to its IP.
    pub fn local(&self) -> SocketAddr {
        self.local
    }

    /// Reads one line, terminator included. Lines longer than the limit are
    /// drained and reported as [`Line::TooLong`]. Invalid UTF-8 is replaced lossily.
    pub async fn read_line(&mut self) -> io::Result<Line> {
        let mut oversized = false;

        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                if oversized || line.len() > self.max_line {
                    return Ok(Line::TooLong);
                }
                return Ok(Line::Command(String::from_utf8_lossy(&line).into_owned()));
            }

            if self.pending.len() >= self.max_line {
                // Keep dropping the oversized line until its terminator shows up.
                oversized = true;
                self.pending.clear();
            }

            if self.fill().await? == 0 {
                if oversized {
                    return Ok(Line::TooLong);
                }
                if self.pending.is_empty() {
                    return Ok(Line::Eof);
                }
                let rest = std::mem::take(&mut self.pending);
                return Ok(Line::Command(String::from_utf8_lossy(&rest).into_owned()));
            }
        }
    }

    /// Writes one reply and flushes it.
    pub async fn send(&mut self, reply: &Reply) -> io::Result<()> {
        debug!("-> {}: {}", self.peer, reply.to_wire().trim_end());
        self.writer.write_all(reply.to_wire().as_bytes()).await?;
        self.writer.flush().await
    }

    /// Resolves once the client has closed (or broken) the control connection.
    ///
    /// Input arriving meanwhile is kept for later [`read_line`](Self::read_line)
    /// calls, up to a few lines' worth; anything beyond that is dropped.
    /// Cancel safe: no received byte is lost when the future is dropped.
    pub async fn closed(&mut self) {
        let cap = self.max_line.saturating_mul(4);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match self.reader.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => {
                    let room = cap.saturating_sub(self.pending.len());
                    if n > room {
                        warn!("Dropping {} bytes of input from {} during transfer", n - room, self.peer);
                    }
                    self.pending.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
        }
    }

    /// Shuts down the write side after the final reply.
    pub async fn shutdown(&mut self) {
        let _ = self.writer.shutdown().await;
    }

    async fn fill(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.reader.read(&mut chunk).await?;
        self.pending.extend_from_slice(&chunk[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn channel(max_line: usize) -> (ControlChannel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (ControlChannel::new(server, max_line).unwrap(), client)
    }

    #[tokio::test]
    async fn reads_lines_and_skips_oversized_ones() {
        let (mut control, mut client) = channel(16).await;
        client
            .write_all(b"USER alice\r\nSTOR aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\nPWD\r\n")
            .await
            .unwrap();

        assert_eq!(control.read_line().await.unwrap(), Line::Command("USER alice\r\n".into()));
        assert_eq!(control.read_line().await.unwrap(), Line::TooLong);
        assert_eq!(control.read_line().await.unwrap(), Line::Command("PWD\r\n".into()));

        drop(client);
        assert_eq!(control.read_line().await.unwrap(), Line::Eof);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let (mut control, mut client) = channel(64).await;
        client.write_all(b"CWD caf\xe9\r\n").await.unwrap();
        assert_eq!(
            control.read_line().await.unwrap(),
            Line::Command("CWD caf\u{fffd}\r\n".into())
        );
    }

    #[tokio::test]
    async fn closed_resolves_on_hangup_but_not_on_input() {
        let (mut control, mut client) = channel(64).await;
        client.write_all(b"NOOP\r\n").await.unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(100), control.closed()).await;
        assert!(waited.is_err());
        assert_eq!(control.read_line().await.unwrap(), Line::Command("NOOP\r\n".into()));

        drop(client);
        tokio::time::timeout(Duration::from_secs(5), control.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn hangup_after_pipelined_input_is_still_seen() {
        let (mut control, mut client) = channel(64).await;
        client.write_all(b"NOOP\r\nPWD\r\n").await.unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(100), control.closed()).await;
        assert!(waited.is_err());

        drop(client);
        tokio::time::timeout(Duration::from_secs(5), control.closed())
            .await
            .unwrap();

        assert_eq!(control.read_line().await.unwrap(), Line::Command("NOOP\r\n".into()));
        assert_eq!(control.read_line().await.unwrap(), Line::Command("PWD\r\n".into()));
        assert_eq!(control.read_line().await.unwrap(), Line::Eof);
    }

    #[tokio::test]
    async fn input_while_waiting_is_capped() {
        let (mut control, mut client) = channel(16).await;
        client.write_all(&[b'x'; 200]).await.unwrap();
        drop(client);

        tokio::time::timeout(Duration::from_secs(5), control.closed())
            .await
            .unwrap();
        assert_eq!(control.pending.len(), 64);
        assert_eq!(control.read_line().await.unwrap(), Line::TooLong);
        assert_eq!(control.read_line().await.unwrap(), Line::Eof);
    }

    #[tokio::test]
    async fn send_writes_wire_form() {
        let (mut control, mut client) = channel(64).await;
        control.send(&Reply::standard(530)).await.unwrap();
        let mut buf = [0u8; 18];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"530 Not logged in.");
    }
}
