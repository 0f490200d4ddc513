//! One-shot client for the coordinator's NotificationEndpoint (§4.5), shared
//! by the scanner (scan-finished) and the reviewer (review-finished): connect,
//! send a single message, disconnect. No reply is read — the endpoint is
//! documented as one-way.

use crate::protocol::Notification;
use crate::wire::{WireError, write_message};
use tokio::net::TcpStream;

/// Send `notification` to `host:port`, opening and closing a fresh connection.
/// Mirrors the reference worker's behavior of reconnecting per notification
/// rather than holding the notification socket open.
pub async fn send_notification(host: &str, port: u16, notification: &Notification) -> Result<(), WireError> {
    let mut stream = TcpStream::connect((host, port)).await?;
    write_message(&mut stream, notification).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::read_message;
    use tokio::io::BufReader;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn sends_a_scan_finished_notification() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, _write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            read_message::<_, Notification>(&mut reader).await.unwrap()
        });

        send_notification(
            "127.0.0.1",
            addr.port(),
            &Notification::scan_finished("example.com", 1),
        )
        .await
        .unwrap();

        let received = server.await.unwrap();
        match received {
            Notification::Scan { notification } => assert_eq!(notification.scan.request_id, 1),
            Notification::Review { .. } => panic!("expected scan variant"),
        }
    }
}
