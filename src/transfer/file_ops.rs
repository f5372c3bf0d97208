//! One-shot data exchanges
//!
//! Moves bytes between an accepted data connection and a file or an
//! in-memory listing. Bytes are copied verbatim; the TYPE setting is only a
//! client hint.

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;

use crate::error::TransferError;

/// What a data connection is used for.
#[derive(Debug)]
pub enum DataOp {
    /// RETR: file contents to the client.
    Download(File),
    /// STOR: client bytes into the file.
    Upload(File),
    /// LIST: pre-rendered listing to the client.
    Listing(Vec<u8>),
}

impl DataOp {
    pub fn describe(&self) -> &'static str {
        match self {
            DataOp::Download(_) => "download",
            DataOp::Upload(_) => "upload",
            DataOp::Listing(_) => "listing",
        }
    }

    /// Runs the exchange over `stream` and returns the number of bytes moved.
    pub async fn run(self, stream: &mut TcpStream, buffer_size: usize) -> Result<u64, TransferError> {
        match self {
            DataOp::Download(file) => {
                let mut reader = BufReader::with_capacity(buffer_size, file);
                let sent = tokio::io::copy_buf(&mut reader, stream)
                    .await
                    .map_err(TransferError::Aborted)?;
                stream.shutdown().await.map_err(TransferError::Aborted)?;
                Ok(sent)
            }
            DataOp::Upload(file) => {
                let mut writer = BufWriter::with_capacity(buffer_size, file);
                let received = tokio::io::copy(stream, &mut writer)
                    .await
                    .map_err(TransferError::Aborted)?;
                writer.flush().await.map_err(TransferError::Local)?;
                writer.into_inner().sync_all().await.map_err(TransferError::Local)?;
                Ok(received)
            }
            DataOp::Listing(bytes) => {
                stream.write_all(&bytes).await.map_err(TransferError::Aborted)?;
                stream.shutdown().await.map_err(TransferError::Aborted)?;
                Ok(bytes.len() as u64)
            }
        }
    }
}
