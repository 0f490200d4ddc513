//! Persistent client for a DispatchEndpoint (§4.4), shared by the scanner and
//! reviewer worker binaries: one long-lived connection, one `{"request":"task"}`
//! per iteration, either a task or a shutdown message back.
//!
//! Asking for the next task is itself the acknowledgement of the previous
//! one (the coordinator's `last_task` is only replaced, never explicitly
//! ack'd) — callers must finish acting on a pulled task, including sending
//! any completion notification, *before* calling [`DispatchClient::pull`]
//! again, or the previous task loses its requeue-on-drop safety net.

use crate::protocol::{DispatchResponse, DispatchedTask, TaskRequest};
use crate::wire::{WireError, read_message, write_message};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

pub enum Pulled {
    Task(DispatchedTask),
    Shutdown,
}

pub struct DispatchClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl DispatchClient {
    pub async fn connect(host: &str, port: u16) -> Result<Self, WireError> {
        let stream = TcpStream::connect((host, port)).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    pub async fn pull(&mut self) -> Result<Pulled, WireError> {
        write_message(&mut self.writer, &TaskRequest::new()).await?;
        let response: DispatchResponse = read_message(&mut self.reader).await?;
        match response {
            DispatchResponse::Task { response } => Ok(Pulled::Task(response.task)),
            DispatchResponse::Msg { response } if response.msg == "shutdown" => Ok(Pulled::Shutdown),
            DispatchResponse::Msg { response } => Err(WireError::Malformed(
                serde::de::Error::custom(format!("unexpected dispatch message: {}", response.msg)),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn pull_decodes_a_delivered_task() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let _req: TaskRequest = read_message(&mut reader).await.unwrap();
            write_message(&mut write_half, &DispatchResponse::task("example.com", 7))
                .await
                .unwrap();
        });

        let mut client = DispatchClient::connect("127.0.0.1", addr.port()).await.unwrap();
        match client.pull().await.unwrap() {
            Pulled::Task(task) => {
                assert_eq!(task.domain, "example.com");
                assert_eq!(task.request_id, 7);
            }
            Pulled::Shutdown => panic!("expected a task"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn pull_recognizes_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let _req: TaskRequest = read_message(&mut reader).await.unwrap();
            write_message(&mut write_half, &DispatchResponse::shutdown()).await.unwrap();
        });

        let mut client = DispatchClient::connect("127.0.0.1", addr.port()).await.unwrap();
        assert!(matches!(client.pull().await.unwrap(), Pulled::Shutdown));
        server.await.unwrap();
    }
}
