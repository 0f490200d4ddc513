//! Newline-trimmed JSON message framing, shared by the coordinator's four
//! endpoints and the scanner/reviewer worker clients. One JSON object per
//! line, capped at [`crate::protocol::MAX_MESSAGE_BYTES`].

use crate::protocol::MAX_MESSAGE_BYTES;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("connection closed")]
    Eof,
    #[error("message exceeded {0}-byte limit")]
    TooLarge(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Read one newline-delimited JSON message, enforcing the 64 KiB cap.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T, WireError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Err(WireError::Eof);
    }
    if line.len() > MAX_MESSAGE_BYTES {
        return Err(WireError::TooLarge(MAX_MESSAGE_BYTES));
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Write one JSON message followed by a newline.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TaskRequest;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn round_trips_a_message_through_a_duplex_pipe() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(client);

        write_message(&mut server, &TaskRequest::new()).await.unwrap();
        let received: TaskRequest = read_message(&mut reader).await.unwrap();
        assert!(received.is_task_pull());
    }

    #[tokio::test]
    async fn eof_on_closed_stream() {
        let (client, server) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(client);
        drop(server);
        let result: Result<TaskRequest, _> = read_message(&mut reader).await;
        assert!(matches!(result, Err(WireError::Eof)));
    }

    #[tokio::test]
    async fn oversized_message_is_rejected() {
        let (client, mut server) = tokio::io::duplex(128 * 1024);
        let mut reader = BufReader::new(client);
        let huge = "x".repeat(MAX_MESSAGE_BYTES + 10);
        server.write_all(huge.as_bytes()).await.unwrap();
        server.write_all(b"\n").await.unwrap();
        let result: Result<TaskRequest, _> = read_message(&mut reader).await;
        assert!(matches!(result, Err(WireError::TooLarge(_))));
    }
}
