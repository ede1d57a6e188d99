use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use od4_ingest_core::*;

pub const SUBPROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    pub url: String,         // e.g. "ws://127.0.0.1:8000/"
    pub subprotocol: String, // the relay only accepts "od4"
}

impl Default for WsConfig {
    fn default() -> Self {
        Self { url: "ws://127.0.0.1:8000/".into(), subprotocol: "od4".into() }
    }
}

pub struct WsSource {
    cfg: WsConfig,
}

impl WsSource {
    pub fn new(cfg: WsConfig) -> Self {
        Self { cfg }
    }
}

fn unavailable(url: &str, e: impl std::fmt::Display) -> IngestError {
    IngestError::TransportUnavailable(format!("{}: {}", url, e))
}

#[async_trait::async_trait]
impl StreamSource for WsSource {
    async fn run(&self, tx: StreamTx, mut outbound: OutboundRx) -> Result<(), IngestError> {
        let url = self.cfg.url.as_str();
        let mut request = url.into_client_request().map_err(|e| unavailable(url, e))?;
        let protocol = HeaderValue::from_str(&self.cfg.subprotocol)
            .map_err(|e| IngestError::Msg(format!("subprotocol {:?}: {}", self.cfg.subprotocol, e)))?;
        request.headers_mut().insert(SUBPROTOCOL_HEADER, protocol);

        let (socket, _response) = connect_async(request).await.map_err(|e| unavailable(url, e))?;
        let (mut sink, mut stream) = socket.split();
        let _ = tx.send(StreamEvent::Opened);

        let mut outbound_open = true;
        let result = loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    Some(Ok(Message::Binary(data))) => {
                        if tx.send(StreamEvent::Frame(Bytes::from(data))).is_err() {
                            // nobody is listening any more
                            break Ok(());
                        }
                    }
                    Some(Ok(Message::Text(_))) => log::debug!("Ignoring text frame from {}", url),
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        break Err(IngestError::Other(anyhow::Error::new(e).context("websocket receive")));
                    }
                },
                out = outbound.recv(), if outbound_open => match out {
                    Some(frame) => {
                        let len = frame.len();
                        if let Err(e) = sink.send(Message::Binary(frame)).await {
                            break Err(IngestError::Other(anyhow::Error::new(e).context("websocket send")));
                        }
                        log::debug!("Sent {} bytes to {}", len, url);
                    }
                    None => outbound_open = false,
                },
            }
        };

        let _ = tx.send(StreamEvent::Closed);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    const WAIT: Duration = Duration::from_secs(5);

    async fn relay_once(listener: TcpListener) -> Option<String> {
        let (tcp, _) = listener.accept().await.ok()?;
        let mut offered = None;
        let ws = accept_hdr_async(tcp, |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
            offered = req
                .headers()
                .get(SUBPROTOCOL_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            resp.headers_mut()
                .insert(SUBPROTOCOL_HEADER, HeaderValue::from_static("od4"));
            Ok(resp)
        })
        .await
        .ok()?;
        let (mut sink, mut stream) = ws.split();

        sink.send(Message::Binary(vec![1, 2, 3])).await.ok()?;
        sink.send(Message::Text("ignored".into())).await.ok()?;
        // echo the client's command back, then hang up
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Binary(data) = msg {
                sink.send(Message::Binary(data)).await.ok()?;
                break;
            }
        }
        sink.send(Message::Close(None)).await.ok()?;
        offered
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_duplex_lifecycle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(relay_once(listener));

        let source = WsSource::new(WsConfig { url: format!("ws://{}/", addr), ..WsConfig::default() });
        let (tx, rx) = channel();
        let (out_tx, out_rx) = outbound_channel();
        let client = tokio::spawn(async move { source.run(tx, out_rx).await });

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), StreamEvent::Opened);
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            StreamEvent::Frame(Bytes::from_static(&[1, 2, 3]))
        );

        out_tx.send(vec![9, 9]).unwrap();
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            StreamEvent::Frame(Bytes::from_static(&[9, 9]))
        );
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), StreamEvent::Closed);

        assert!(client.await.unwrap().is_ok());
        assert_eq!(server.await.unwrap().as_deref(), Some("od4"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = WsSource::new(WsConfig { url: format!("ws://{}/", addr), ..WsConfig::default() });
        let (tx, rx) = channel();
        let (_out_tx, out_rx) = outbound_channel();
        let result = source.run(tx, out_rx).await;

        assert!(matches!(result, Err(IngestError::TransportUnavailable(_))));
        assert!(rx.try_recv().is_err());
    }
}
