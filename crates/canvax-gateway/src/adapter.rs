//! Transport adapters.
//!
//! A client is attached either through an axum WebSocket (one JSON envelope
//! per text frame) or through a raw byte stream framed by newlines. Both are
//! split into a sink half owned by the dispatch task and a source half owned
//! by the receive loop.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::debug;

use canvax_canvas::TransportKind;
use canvax_core::error::{CanvaxError, Result};
use canvax_core::protocol::{encode_response, ClientResponse};

/// Any bidirectional byte stream the stream transport can run over.
pub trait AsyncIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncIo for T {}

pub type BoxedIo = Box<dyn AsyncIo>;

/// A byte stream framed into UTF-8 lines.
pub type LineFramed = Framed<BoxedIo, LinesCodec>;

/// Wrap `io` in line framing with a per-line size cap.
pub fn line_framed<T: AsyncIo + 'static>(io: T, max_frame_bytes: usize) -> LineFramed {
    Framed::new(Box::new(io), LinesCodec::new_with_max_length(max_frame_bytes))
}

/// One attached client's transport.
pub enum Adapter {
    Socket(WebSocket),
    Stream(LineFramed),
}

/// Result of one `receive` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Frame(String),
    /// The peer closed the transport.
    Closed,
}

impl Adapter {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Socket(_) => TransportKind::Socket,
            Self::Stream(_) => TransportKind::Stream,
        }
    }

    pub fn split(self) -> (AdapterSink, AdapterSource) {
        match self {
            Self::Socket(ws) => {
                let (tx, rx) = ws.split();
                (AdapterSink::Socket(tx), AdapterSource::Socket(rx))
            }
            Self::Stream(framed) => {
                let (tx, rx) = framed.split();
                (
                    AdapterSink::Stream(tx),
                    AdapterSource::Stream {
                        rx,
                        skipping_error: false,
                    },
                )
            }
        }
    }

    /// Send an envelope before the adapter is split.
    pub async fn send_response(&mut self, response: &ClientResponse) -> Result<()> {
        let frame = encode_response(response)?;
        match self {
            Self::Socket(ws) => ws
                .send(Message::Text(frame.into()))
                .await
                .map_err(|e| CanvaxError::Transport(e.to_string())),
            Self::Stream(framed) => framed
                .send(frame)
                .await
                .map_err(|e| CanvaxError::Transport(e.to_string())),
        }
    }

    pub async fn close(self) {
        let (mut sink, _source) = self.split();
        sink.close().await;
    }
}

/// Outbound half.
pub enum AdapterSink {
    Socket(SplitSink<WebSocket, Message>),
    Stream(SplitSink<LineFramed, String>),
}

impl AdapterSink {
    /// Write one encoded frame.
    pub async fn send(&mut self, frame: String) -> Result<()> {
        match self {
            Self::Socket(tx) => tx
                .send(Message::Text(frame.into()))
                .await
                .map_err(|e| CanvaxError::Transport(e.to_string())),
            Self::Stream(tx) => tx
                .send(frame)
                .await
                .map_err(|e| CanvaxError::Transport(e.to_string())),
        }
    }

    pub async fn send_response(&mut self, response: &ClientResponse) -> Result<()> {
        let frame = encode_response(response)?;
        self.send(frame).await
    }

    /// Flush and shut down the transport. Errors are logged, not returned.
    pub async fn close(&mut self) {
        let result = match self {
            Self::Socket(tx) => {
                let _ = tx.send(Message::Close(None)).await;
                tx.close().await.map_err(|e| e.to_string())
            }
            Self::Stream(tx) => tx.close().await.map_err(|e| e.to_string()),
        };
        if let Err(e) = result {
            debug!(%e, "Adapter close failed");
        }
    }
}

/// Inbound half.
pub enum AdapterSource {
    Socket(SplitStream<WebSocket>),
    Stream {
        rx: SplitStream<LineFramed>,
        /// The framer yields one `None` after a decode error; skip it.
        skipping_error: bool,
    },
}

impl AdapterSource {
    /// Wait for the next frame.
    ///
    /// Returns `Err(Decode)` for a frame that should be skipped and
    /// `Err(Transport)` when the connection is unusable.
    pub async fn receive(&mut self) -> Result<Inbound> {
        match self {
            Self::Socket(rx) => loop {
                match rx.next().await {
                    None => return Ok(Inbound::Closed),
                    Some(Err(e)) => return Err(CanvaxError::Transport(e.to_string())),
                    Some(Ok(Message::Text(text))) => {
                        return Ok(Inbound::Frame(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        return String::from_utf8(bytes.to_vec())
                            .map(Inbound::Frame)
                            .map_err(|e| {
                                CanvaxError::Decode(format!("binary frame is not UTF-8: {e}"))
                            });
                    }
                    Some(Ok(Message::Close(_))) => return Ok(Inbound::Closed),
                    // Axum answers pings itself
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                }
            },
            Self::Stream { rx, skipping_error } => read_line(rx, skipping_error).await,
        }
    }
}

/// Next non-blank line from a line-framed stream.
pub(crate) async fn read_line<S>(rx: &mut S, skipping_error: &mut bool) -> Result<Inbound>
where
    S: futures::Stream<Item = std::result::Result<String, LinesCodecError>> + Unpin,
{
    loop {
        match rx.next().await {
            None if *skipping_error => {
                *skipping_error = false;
                continue;
            }
            None => return Ok(Inbound::Closed),
            Some(Ok(line)) if line.trim().is_empty() => continue,
            Some(Ok(line)) => return Ok(Inbound::Frame(line)),
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                *skipping_error = true;
                return Err(CanvaxError::Decode("frame exceeds maximum length".into()));
            }
            Some(Err(LinesCodecError::Io(e))) => return Err(CanvaxError::Transport(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvax_core::protocol::{DrawEvent, History};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_stream_send_writes_one_line_per_envelope() {
        let (server, client) = tokio::io::duplex(4096);
        let adapter = Adapter::Stream(line_framed(server, 1024));
        assert_eq!(adapter.kind(), TransportKind::Stream);
        let (mut sink, _source) = adapter.split();

        sink.send_response(&ClientResponse::history(History::default()))
            .await
            .unwrap();
        sink.send_response(&ClientResponse::event(DrawEvent::of_kind("draw")))
            .await
            .unwrap();

        let mut lines = BufReader::new(client).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        assert_eq!(first, r#"{"initial_history":{"events":[]}}"#);
        let second = lines.next_line().await.unwrap().unwrap();
        assert!(second.starts_with(r#"{"draw_event":"#));
    }

    #[tokio::test]
    async fn test_stream_receive_skips_blank_lines() {
        let (server, mut client) = tokio::io::duplex(4096);
        let (_sink, mut source) = Adapter::Stream(line_framed(server, 1024)).split();

        client.write_all(b"\n\n{\"draw_event\":null}\n").await.unwrap();
        assert_eq!(
            source.receive().await.unwrap(),
            Inbound::Frame("{\"draw_event\":null}".into())
        );

        drop(client);
        assert_eq!(source.receive().await.unwrap(), Inbound::Closed);
    }

    #[tokio::test]
    async fn test_stream_oversized_frame_is_decode_error_then_recovers() {
        let (server, mut client) = tokio::io::duplex(8192);
        let (_sink, mut source) = Adapter::Stream(line_framed(server, 16)).split();

        let long = "x".repeat(64);
        client
            .write_all(format!("{long}\n{{}}\n").as_bytes())
            .await
            .unwrap();

        let err = source.receive().await.unwrap_err();
        assert!(matches!(err, CanvaxError::Decode(_)));
        assert_eq!(source.receive().await.unwrap(), Inbound::Frame("{}".into()));
    }

    #[tokio::test]
    async fn test_stream_close_shuts_down_writer() {
        let (server, client) = tokio::io::duplex(1024);
        let adapter = Adapter::Stream(line_framed(server, 1024));
        adapter.close().await;

        let mut lines = BufReader::new(client).lines();
        assert!(lines.next_line().await.unwrap().is_none());
    }
}
