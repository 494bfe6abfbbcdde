//! Websocket transport.
//!
//! [`connect`] splits a `tokio-tungstenite` stream into a [`WsSink`] and a
//! [`WsSource`]. [`WsConnector`] builds on it to give the subscription
//! manager a [`Connector`]: every opened connection runs in its own task and
//! reports back through [`TransportEvent`]s.

use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::channel::Channel;
use crate::connection::{ConnectionId, Connector, Link, TransportEvent};
use crate::error::ClientError;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// What a [`WsSource`] yields. Binary frames and pongs carry nothing a
/// subscriber uses and are skipped.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Ping(Vec<u8>),
    /// The peer's close frame. Code 1005 when it carried none.
    Close { code: u16, reason: String },
}

pub struct WsSink(SplitSink<Socket, Frame>);

impl WsSink {
    pub async fn text(&mut self, text: &str) -> Result<()> {
        self.0
            .send(Frame::Text(text.to_string()))
            .await
            .context("websocket write failed")
    }

    pub async fn pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.0.send(Frame::Pong(data)).await.context("websocket pong failed")
    }

    pub async fn close(&mut self) -> Result<()> {
        self.0.send(Frame::Close(None)).await.context("websocket close failed")
    }
}

pub struct WsSource(SplitStream<Socket>);

impl WsSource {
    /// Next frame worth handling, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Result<Inbound>> {
        while let Some(frame) = self.0.next().await {
            let inbound = match frame {
                Ok(Frame::Text(text)) => Inbound::Text(text),
                Ok(Frame::Ping(data)) => Inbound::Ping(data),
                Ok(Frame::Close(frame)) => {
                    let (code, reason) = frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    Inbound::Close { code, reason }
                }
                Ok(Frame::Binary(_) | Frame::Pong(_) | Frame::Frame(_)) => continue,
                Err(e) => return Some(Err(anyhow::anyhow!("websocket read error: {e}"))),
            };
            return Some(Ok(inbound));
        }
        None
    }
}

/// Perform the websocket handshake against `url`.
pub async fn connect(url: &str) -> Result<(WsSink, WsSource)> {
    let (socket, _response) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("websocket connect to {url} failed"))?;
    let (sink, source) = socket.split();
    Ok((WsSink(sink), WsSource(source)))
}

/// Convert an HTTP(S) origin to the WS(S) scheme. WS URLs pass through.
pub fn http_to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

/// Subscription endpoint for `channel` under a server origin. The channel
/// name is one percent-encoded path segment.
pub fn channel_url(origin: &str, channel: &Channel) -> String {
    format!(
        "{}/ws/{}",
        http_to_ws_scheme(origin.trim_end_matches('/')),
        utf8_percent_encode(channel.as_str(), NON_ALPHANUMERIC)
    )
}

enum LinkCommand {
    Text(String),
    Close,
}

struct WsLink {
    tx: mpsc::UnboundedSender<LinkCommand>,
}

impl Link for WsLink {
    fn send(&mut self, payload: &str) -> Result<(), ClientError> {
        self.tx
            .send(LinkCommand::Text(payload.to_string()))
            .map_err(|_| ClientError::NotConnected)
    }

    fn close(&mut self) {
        // The task may already have exited; nothing left to close then.
        let _ = self.tx.send(LinkCommand::Close);
    }
}

/// [`Connector`] backed by real websockets.
#[derive(Debug, Clone)]
pub struct WsConnector {
    origin: String,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl WsConnector {
    pub fn new(origin: &str, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            origin: origin.to_string(),
            events,
        }
    }
}

impl Connector for WsConnector {
    fn open(&mut self, id: ConnectionId, channel: &Channel) -> Box<dyn Link> {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = channel_url(&self.origin, channel);
        tokio::spawn(drive(id, url, rx, self.events.clone()));
        Box::new(WsLink { tx })
    }
}

/// Runs one connection from handshake to close and reports exactly one
/// `Closed` at the end.
async fn drive(
    id: ConnectionId,
    url: String,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    tracing::debug!(conn = %id, %url, "connecting");
    let (mut sink, mut source) = match connect(&url).await {
        Ok(halves) => halves,
        Err(e) => {
            let _ = events.send(TransportEvent::Closed {
                id,
                reason: format!("{e:#}"),
            });
            return;
        }
    };
    let _ = events.send(TransportEvent::Opened(id));

    let mut closing = false;
    let reason = loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Inbound::Text(text))) => {
                    let _ = events.send(TransportEvent::Frame(id, text));
                }
                Some(Ok(Inbound::Ping(data))) => {
                    if let Err(e) = sink.pong(data).await {
                        break format!("{e:#}");
                    }
                }
                Some(Ok(Inbound::Close { code, reason })) => {
                    if !closing {
                        // Complete the handshake the server started.
                        let _ = sink.close().await;
                    }
                    break format!("closed by server ({code}) {reason}").trim_end().to_string();
                }
                Some(Err(e)) => break format!("{e:#}"),
                None => break "connection ended".to_string(),
            },
            cmd = commands.recv(), if !closing => match cmd {
                Some(LinkCommand::Text(text)) => {
                    if let Err(e) = sink.text(&text).await {
                        break format!("{e:#}");
                    }
                }
                // A dropped link counts as a close request.
                Some(LinkCommand::Close) | None => {
                    closing = true;
                    if let Err(e) = sink.close().await {
                        break format!("{e:#}");
                    }
                }
            },
        }
    };
    tracing::debug!(conn = %id, %reason, "connection finished");
    let _ = events.send(TransportEvent::Closed { id, reason });
}
