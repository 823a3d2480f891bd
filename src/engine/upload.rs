//! Bounded streaming upload
//!
//! Copies a request body into a sink until the declared length has been
//! received. Shared by firmware uploads and device-record uploads.

use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("upload truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    #[error("upload did not complete within {0:?}")]
    Timeout(Duration),

    #[error("upload stream failed: {0}")]
    Stream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-upload bounds applied before and while reading a body.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_bytes: u64,
    pub timeout: Duration,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: 16 * 1024 * 1024,
            timeout: Duration::from_secs(30),
        }
    }
}

impl UploadLimits {
    pub fn allows(&self, declared: u64) -> bool {
        declared <= self.max_bytes
    }
}

/// Read from `stream` into `sink` until `expected` bytes have arrived.
///
/// Bytes past `expected` are dropped. End of stream before `expected` is a
/// [`UploadError::Truncated`]; the whole copy must finish within `deadline`.
pub async fn read_bounded<S, B, E, W>(
    stream: S,
    expected: u64,
    sink: &mut W,
    deadline: Duration,
) -> Result<u64, UploadError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(deadline, copy_bounded(stream, expected, sink)).await {
        Ok(result) => result,
        Err(_) => Err(UploadError::Timeout(deadline)),
    }
}

async fn copy_bounded<S, B, E, W>(
    mut stream: S,
    expected: u64,
    sink: &mut W,
) -> Result<u64, UploadError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
    W: AsyncWrite + Unpin,
{
    let mut received: u64 = 0;

    while received < expected {
        let Some(chunk) = stream.next().await else {
            break;
        };
        let chunk = chunk.map_err(|e| UploadError::Stream(e.to_string()))?;
        let bytes = chunk.as_ref();

        let remaining = usize::try_from(expected - received).unwrap_or(usize::MAX);
        let take = bytes.len().min(remaining);
        sink.write_all(&bytes[..take]).await?;
        received += take as u64;

        debug!(received, expected, "upload progress");
    }

    sink.flush().await?;

    if received < expected {
        return Err(UploadError::Truncated { expected, received });
    }
    Ok(received)
}
