//! WebSocket transport built on `tokio-tungstenite`.
//!
//! [`WsConnection`] wraps an upgraded [`WebSocketStream`] and splits it into a
//! [`WsReader`] (the `SplitStream`) and a [`WsWriter`] (the `SplitSink`).  Both
//! halves share a [`CloseSignal`]; once either side closes, a pending read
//! returns [`TransportError::Closed`] and writes are refused.
//!
//! Peer pings are answered by tungstenite itself while the reader is polled,
//! so they never reach the session.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::error::{CapacityError, ProtocolError};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;

use crate::application::connection::{
    Connection, ConnectionReader, ConnectionWriter, Inbound, TransportError,
};
use crate::infrastructure::close_signal::CloseSignal;

/// An upgraded WebSocket connection, not yet split.
pub struct WsConnection<S> {
    stream: WebSocketStream<S>,
}

impl<S> WsConnection<S> {
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

/// Receiving half of a [`WsConnection`].
pub struct WsReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
    signal: CloseSignal,
}

/// Sending half of a [`WsConnection`].
pub struct WsWriter<S> {
    sink: SplitSink<WebSocketStream<S>, WsMessage>,
    signal: CloseSignal,
}

impl<S> Connection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Reader = WsReader<S>;
    type Writer = WsWriter<S>;

    fn split(self) -> (WsReader<S>, WsWriter<S>) {
        let signal = CloseSignal::new();
        let (sink, stream) = self.stream.split();
        (
            WsReader {
                stream,
                signal: signal.clone(),
            },
            WsWriter { sink, signal },
        )
    }
}

#[async_trait]
impl<S> ConnectionReader for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Result<Inbound, TransportError> {
        loop {
            if self.signal.is_closed() {
                return Err(TransportError::Closed);
            }
            let next = tokio::select! {
                _ = self.signal.closed() => return Err(TransportError::Closed),
                next = self.stream.next() => next,
            };
            match next {
                Some(Ok(WsMessage::Text(text))) => return Ok(Inbound::Message(text.into_bytes())),
                Some(Ok(WsMessage::Binary(bytes))) => return Ok(Inbound::Message(bytes)),
                Some(Ok(WsMessage::Pong(_))) => return Ok(Inbound::Pong),
                Some(Ok(WsMessage::Close(frame))) => {
                    return Err(TransportError::PeerClosed {
                        code: frame.map(|f| u16::from(f.code)),
                    })
                }
                // Pings are answered by tungstenite; raw frames are never
                // produced when reading.
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Frame(_))) => continue,
                Some(Err(e)) => return Err(map_ws_error(e)),
                None => return Err(TransportError::Closed),
            }
        }
    }

    async fn close(&mut self) {
        self.signal.close();
    }
}

#[async_trait]
impl<S> ConnectionWriter for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        // Normalized broadcasts are almost always UTF-8; anything else goes
        // out as a binary frame with the same bytes.
        let message = match String::from_utf8(frame) {
            Ok(text) => WsMessage::Text(text),
            Err(e) => WsMessage::Binary(e.into_bytes()),
        };
        self.send(message).await
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.send(WsMessage::Ping(Vec::new())).await
    }

    async fn send_close(&mut self) -> Result<(), TransportError> {
        self.send(WsMessage::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        })))
        .await
    }

    async fn close(&mut self) {
        self.signal.close();
    }
}

impl<S> WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, message: WsMessage) -> Result<(), TransportError> {
        if self.signal.is_closed() {
            return Err(TransportError::Closed);
        }
        self.sink.send(message).await.map_err(map_ws_error)
    }
}

/// Translates a tungstenite error into the transport's error vocabulary.
pub fn map_ws_error(e: WsError) -> TransportError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        WsError::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
            TransportError::MessageTooLarge {
                size,
                limit: max_size,
            }
        }
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => TransportError::Reset,
        WsError::Io(e) => TransportError::Io(e),
        other => TransportError::Protocol(other.to_string()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
