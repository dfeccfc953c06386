use std::{collections::VecDeque, time::Duration};

use futures_util::{future, future::BoxFuture, SinkExt, StreamExt};
use snafu::prelude::*;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite as websocket;

use super::{
    timer::Timer, Action, ClientInner, ConnectionState, Input, CLOSE_TIMEOUT,
};
use crate::ws::{
    client::{ConnectRequest, Listeners, StreamOptions, WebsocketClient},
    message::{Incoming, MessageStreamSink},
};

/// Error when open websocket transport to streaming endpoint
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum OpenError {
    /// websocket handshake failed
    #[snafu(display("connect stream endpoint {url} failed: {source}"))]
    Connect {
        /// endpoint url
        url: String,
        /// source error
        source: websocket::tungstenite::Error,
    },

    /// websocket handshake not finished in time
    #[snafu(display("connect stream endpoint {url} timeout after {timeout:?}"))]
    HandshakeTimeout {
        /// endpoint url
        url: String,
        /// handshake timeout
        timeout: Duration,
    },
}

/// Requests from client handles to driver task.
#[derive(Debug)]
pub(crate) enum Command {
    Connect(ConnectRequest),
    Disconnect { reconnect: bool, unsubscribe: bool },
}

impl From<Command> for Input {
    fn from(command: Command) -> Self {
        match command {
            Command::Connect(request) => Input::Connect(request),
            Command::Disconnect {
                reconnect,
                unsubscribe,
            } => Input::Disconnect {
                reconnect,
                unsubscribe,
            },
        }
    }
}

async fn open(url: url::Url, timeout: Duration) -> Result<WebsocketClient, OpenError> {
    log::debug!("Connecting stream endpoint: {}", url);

    let (ws, _) = tokio::time::timeout(timeout, websocket::connect_async(&url))
        .await
        .map_err(|_| {
            error::HandshakeTimeout {
                url: url.as_str(),
                timeout,
            }
            .build()
        })?
        .with_context(|_| error::Connect { url: url.as_str() })?;

    Ok(ws)
}

/// Keep reading after peer's close frame so our queued reply gets flushed,
/// until the stream ends or [`CLOSE_TIMEOUT`] passed.
async fn finish_close(stream: &mut MessageStreamSink) {
    let drain = async { while let Some(Ok(_)) = stream.next().await {} };

    if tokio::time::timeout(CLOSE_TIMEOUT, drain).await.is_err() {
        log::debug!("Peer did not end stream after close handshake, drop it");
    }
}

enum Transport {
    None,
    Opening(BoxFuture<'static, Result<WebsocketClient, OpenError>>),
    Open(MessageStreamSink),
}

impl Transport {
    /// Wait next event of transport, never resolves when there is no transport.
    ///
    /// Cancel safe, an opening handshake or the message stream is kept when this future is dropped.
    /// If dropped while finishing a peer close, the next call reports the close without code.
    async fn next_input(&mut self) -> Input {
        match self {
            Self::None => future::pending().await,
            Self::Opening(opening) => match opening.as_mut().await {
                Ok(ws) => {
                    log::debug!("Stream endpoint connected");
                    *self = Self::Open(MessageStreamSink::new(ws));
                    Input::Opened
                }
                Err(err) => {
                    log::warn!("Open stream transport failed: {}", err);
                    *self = Self::None;
                    Input::Closed { code: None }
                }
            },
            Self::Open(stream) => match stream.next().await {
                Some(Ok(Incoming::Message(message))) => Input::Message(message),
                Some(Ok(Incoming::Closed { code })) => {
                    log::debug!("Received close frame, code {:?}", code);
                    finish_close(stream).await;
                    *self = Self::None;
                    Input::Closed { code }
                }
                Some(Err(err)) if !err.is_fatal() => Input::Malformed(err),
                Some(Err(err)) => {
                    log::warn!("Find message stream broken when receive message: {}", err);
                    *self = Self::None;
                    Input::Closed { code: None }
                }
                None => {
                    log::debug!("Message stream ended");
                    *self = Self::None;
                    Input::Closed { code: None }
                }
            },
        }
    }
}

/// Background task owning transport, timer and state machine of one stream client.
pub(crate) struct Driver {
    options: StreamOptions,
    inner: ClientInner,
    listeners: Listeners,
    transport: Transport,
    timer: Timer,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Driver {
    pub fn new(
        options: StreamOptions,
        listeners: Listeners,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            inner: ClientInner::new(&options),
            options,
            listeners,
            transport: Transport::None,
            timer: Timer::default(),
            commands,
            state_tx,
        }
    }

    pub async fn run(mut self) {
        log::debug!("Stream driver task start");

        loop {
            let input = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => command.into(),
                    None => {
                        log::debug!("All client handles dropped, stop");
                        break;
                    }
                },
                id = self.timer.fired() => Input::TimerFired(id),
                input = self.transport.next_input() => input,
            };

            self.process(input).await;
        }

        self.shutdown().await;
    }

    async fn process(&mut self, input: Input) {
        let mut inputs = VecDeque::from([input]);

        while let Some(input) = inputs.pop_front() {
            for action in self.inner.handle(input) {
                if let Some(input) = self.execute(action).await {
                    inputs.push_back(input);
                }
            }
        }

        self.state_tx.send_replace(self.inner.state());
    }

    async fn execute(&mut self, action: Action) -> Option<Input> {
        match action {
            Action::Open => {
                let opening = open(
                    self.options.endpoint.clone(),
                    self.options.handshake_timeout,
                );
                self.transport = Transport::Opening(Box::pin(opening));
                None
            }
            Action::Send(message) => {
                let Transport::Open(ref mut sink) = self.transport else {
                    log::debug!("Transport not open, drop {} message", message.type_name());
                    return None;
                };

                let type_name = message.type_name();
                match sink.send(message).await {
                    Ok(()) => {
                        log::trace!("Sent {} message", type_name);
                        None
                    }
                    Err(err) if !err.is_fatal() => Some(Input::Malformed(err)),
                    Err(err) => {
                        log::warn!("Find message stream broken when send message: {}", err);
                        self.transport = Transport::None;
                        Some(Input::Closed { code: None })
                    }
                }
            }
            Action::Close => {
                let Transport::Open(ref mut sink) = self.transport else {
                    return None;
                };

                match sink.close().await {
                    Ok(()) => {
                        log::trace!("Close frame sent");
                        None
                    }
                    Err(err) => {
                        log::debug!("Send close frame failed: {}", err);
                        self.transport = Transport::None;
                        Some(Input::Closed { code: None })
                    }
                }
            }
            Action::DropTransport => {
                self.transport = Transport::None;
                None
            }
            Action::ArmTimer { id, delay } => {
                self.timer.arm(id, delay);
                None
            }
            Action::CancelTimer => {
                self.timer.cancel();
                None
            }
            Action::Emit(event) => {
                self.listeners.dispatch(&event);
                None
            }
        }
    }

    async fn shutdown(&mut self) {
        self.timer.cancel();

        if let Transport::Open(ref mut sink) = self.transport {
            if let Err(err) = sink.close().await {
                log::debug!("Send close frame failed when shutdown: {}", err);
            }
        }
        self.transport = Transport::None;

        self.state_tx.send_replace(ConnectionState::Closed);

        log::debug!("Stream driver task stopped");
    }
}
