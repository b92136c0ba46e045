//! Client transport link: one WebSocket to the broker.
//!
//! The socket is driven by a background task that reads continuously, so
//! keepalive pings from the broker are answered even while the session is
//! busy with slow work. The session talks to that task through two queues;
//! when the socket ends, [`Link::recv`] returns `None` and [`Link::send`]
//! fails.
//!
//! Binary frames from the broker are decoded as UTF-8 lossily, so invalid
//! bytes become U+FFFD instead of dropping the message. This is looser than
//! the broker, which answers invalid UTF-8 from a client with the malformed
//! notice.

use crate::error::ClientError;
use futures::{SinkExt, StreamExt};
use relay_wire::Frame;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long [`Link::close`] waits for the close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// An open connection to the broker.
pub struct Link {
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: mpsc::UnboundedReceiver<String>,
    driver: JoinHandle<()>,
}

impl Link {
    /// Connect to a `ws://` or `wss://` broker URL.
    pub async fn connect(broker_url: &str) -> Result<Self, ClientError> {
        let url = validate_url(broker_url)?;
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(socket, outbound_rx, inbound_tx));

        Ok(Self {
            outbound_tx,
            inbound_rx,
            driver,
        })
    }

    /// Queue a frame for sending.
    pub fn send(&self, frame: &Frame) -> Result<(), ClientError> {
        self.outbound_tx
            .send(frame.encode())
            .map_err(|_| ClientError::Disconnected)
    }

    /// Next inbound text message, or `None` once the transport is gone.
    ///
    /// Cancel-safe.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound_rx.recv().await
    }

    /// Send a close frame and wait briefly for the driver to finish.
    pub async fn close(self) {
        let Self {
            outbound_tx,
            inbound_rx,
            driver,
        } = self;
        drop(outbound_tx);
        drop(inbound_rx);
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, driver).await;
    }
}

/// Parse a broker URL, accepting only `ws://` and `wss://`.
pub fn validate_url(broker_url: &str) -> Result<url::Url, ClientError> {
    let url = url::Url::parse(broker_url)
        .map_err(|e| ClientError::InvalidUrl(format!("{broker_url}: {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ClientError::InvalidUrl(format!(
            "{broker_url}: expected ws:// or wss://"
        )));
    }
    Ok(url)
}

/// Text of a binary frame; invalid UTF-8 is replaced, never rejected.
fn decode_binary(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Socket driver: pumps frames between the WebSocket and the link queues.
async fn drive(
    socket: Socket,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    inbound_tx: mpsc::UnboundedSender<String>,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if inbound_tx.send(text).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let text = decode_binary(&bytes);
                    if inbound_tx.send(text).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Broker closed the connection");
                    break;
                }
                Some(Err(e)) => {
                    debug!("WebSocket error: {e}");
                    break;
                }
                Some(Ok(_)) => {}
            },
            outbound = outbound_rx.recv() => match outbound {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        debug!("WebSocket send failed: {e}");
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }

    outbound_rx.close();
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_websocket_scheme() {
        match Link::connect("http://127.0.0.1:8765").await {
            Err(ClientError::InvalidUrl(msg)) => assert!(msg.contains("ws://")),
            Err(other) => panic!("Expected InvalidUrl, got {other:?}"),
            Ok(_) => panic!("Expected InvalidUrl"),
        }
    }

    #[tokio::test]
    async fn test_rejects_unparsable_url() {
        assert!(matches!(
            Link::connect("not a url").await,
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("ws://127.0.0.1:8765").is_ok());
        assert!(validate_url("wss://relay.example.com/agents").is_ok());
        assert!(validate_url("tcp://127.0.0.1:8765").is_err());
    }

    #[test]
    fn test_binary_frames_decode_lossily() {
        assert_eq!(decode_binary(b"PLAN: day 1"), "PLAN: day 1");
        assert_eq!(decode_binary(&[b'o', b'k', 0xff]), "ok\u{fffd}");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = Link::connect(&format!("ws://{addr}")).await;
        assert!(matches!(result, Err(ClientError::Connect(_))));
    }
}
