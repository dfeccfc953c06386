use std::task::Poll;

use futures_util::{ready, Sink, SinkExt, Stream, StreamExt};
use snafu::prelude::*;
use tokio_tungstenite::tungstenite as websocket;

use super::{ClientMessage, ParseMessageError, ServerMessage};
use crate::ws::client::WebsocketClient;

/// Error when read/write message stream/sink
#[derive(Debug, Snafu)]
#[snafu(module(error), context(suffix(false)))]
pub enum MessageStreamSinkError {
    /// underlying websocket stream broken
    #[snafu(display("underlying websocket stream broken: {source}"))]
    Websocket {
        /// source error
        source: websocket::Error,
    },

    /// received an non-text frame
    #[snafu(display("received a non-text type frame"))]
    NotTextFrame,

    /// parse text message data failed
    #[snafu(display("parse frame to message failed: {source}"))]
    ParseMessageFailed {
        /// source error
        source: ParseMessageError,
    },

    /// encode client message failed
    #[snafu(display("encode {type_name} message failed: {source}"))]
    EncodeMessageFailed {
        /// message type name
        type_name: String,
        /// source error
        source: serde_json::Error,
    },
}

impl MessageStreamSinkError {
    /// Check if this error will make the stream/sink stop
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Websocket { .. } => true,
            Self::NotTextFrame => false,
            Self::ParseMessageFailed { .. } => false,
            Self::EncodeMessageFailed { .. } => false,
        }
    }
}

/// Item produced by [`MessageStreamSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// a parsed server message
    Message(ServerMessage),
    /// server sent a close frame
    Closed {
        /// close code, none if frame has no payload
        code: Option<u16>,
    },
}

/// Tesla streaming message stream/sink
#[derive(Debug)]
pub struct MessageStreamSink {
    ws: WebsocketClient,
}

impl MessageStreamSink {
    /// Construct a new stream with underlying websocket connection.
    pub fn new(ws: WebsocketClient) -> Self {
        Self { ws }
    }
}

impl Stream for MessageStreamSink {
    type Item = Result<Incoming, MessageStreamSinkError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        loop {
            let frame = match ready!(self.ws.poll_next_unpin(cx)) {
                Some(frame) => frame.context(error::Websocket)?,
                None => return Poll::Ready(None),
            };

            let result = match frame {
                websocket::Message::Text(text) => match ServerMessage::decode(&text) {
                    Ok(msg) => Ok(Incoming::Message(msg)),
                    Err(e) => {
                        log::trace!("Parse failed message data: {}", text);
                        Err(MessageStreamSinkError::ParseMessageFailed { source: e })
                    }
                },
                websocket::Message::Close(frame) => Ok(Incoming::Closed {
                    code: frame.map(|f| u16::from(f.code)),
                }),
                // tungstenite answers pings by itself
                websocket::Message::Ping(_) | websocket::Message::Pong(_) => continue,
                _ => Err(MessageStreamSinkError::NotTextFrame),
            };

            return Poll::Ready(Some(result));
        }
    }
}

impl Sink<ClientMessage> for MessageStreamSink {
    type Error = MessageStreamSinkError;

    fn poll_ready(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_ready_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn start_send(
        mut self: std::pin::Pin<&mut Self>,
        item: ClientMessage,
    ) -> Result<(), Self::Error> {
        let text = item
            .encode()
            .with_context(|_| error::EncodeMessageFailed {
                type_name: item.type_name(),
            })?;

        self.ws
            .start_send_unpin(websocket::Message::Text(text))
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_flush_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_close_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }
}
