mod inner;
mod listener;

pub use inner::{ConnectionState, OpenError};
pub use listener::{StreamError, StreamEvent};

use std::{fmt::Debug, time::Duration};

use snafu::prelude::*;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite as websocket;

use crate::{api::TokenProvider, error, Result};
use inner::{Command, Driver};
use listener::Listeners;

pub(crate) type WebsocketClient =
    websocket::WebSocketStream<websocket::MaybeTlsStream<tokio::net::TcpStream>>;

/// Production streaming endpoint.
pub const STREAM_ENDPOINT: &str = "wss://streaming.vn.teslamotors.com/streaming/";

/// Error when send command to a stream client
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(client_error), context(suffix(false)))]
pub enum ClientError {
    /// background driver task is gone, usually because runtime is shutting down
    #[snafu(display("stream client driver task stopped"))]
    DriverStopped,
}

/// Transport and timing options of a stream client
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// streaming websocket endpoint
    pub endpoint: url::Url,
    /// max time of websocket handshake
    pub handshake_timeout: Duration,
    /// health check window after server hello received
    pub steady_health_window: Duration,
    /// delay before reconnect after transport closed
    pub reconnect_delay: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            endpoint: STREAM_ENDPOINT
                .parse()
                .unwrap_or_else(|_| unreachable!("default endpoint is a valid url")),
            handshake_timeout: Duration::from_secs(10),
            steady_health_window: Duration::from_secs(15),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// Arguments of [`StreamClient::connect`], remembered for later auto reconnects.
#[derive(Clone)]
pub struct ConnectRequest {
    /// vehicle tag, usually the vehicle id
    pub tag: String,
    /// oauth bearer token
    pub token: String,
    /// columns to stream, `None` for [`DEFAULT_COLUMNS`](crate::ws::DEFAULT_COLUMNS)
    pub columns: Option<Vec<String>>,
    /// floor in seconds of resubscribe delay when vehicle looks parked
    pub resubscribe_floor: Option<u64>,
}

impl Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("tag", &self.tag)
            .field("token", &"<redacted>")
            .field("columns", &self.columns)
            .field("resubscribe_floor", &self.resubscribe_floor)
            .finish()
    }
}

impl ConnectRequest {
    /// Create request with default columns
    pub fn new<T: Into<String>, K: Into<String>>(tag: T, token: K) -> Self {
        Self {
            tag: tag.into(),
            token: token.into(),
            columns: None,
            resubscribe_floor: None,
        }
    }

    /// Set columns to stream
    pub fn columns<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.columns
            .replace(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Set resubscribe delay floor in seconds
    pub fn resubscribe_floor(mut self, secs: u64) -> Self {
        self.resubscribe_floor.replace(secs);
        self
    }
}

/// Builder of [`StreamClient`], event listeners can only be registered here.
#[derive(Debug, Default)]
pub struct StreamClientBuilder {
    options: StreamOptions,
    listeners: Listeners,
}

impl StreamClientBuilder {
    /// Replace all options
    pub fn options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    /// Set streaming endpoint
    pub fn endpoint(mut self, endpoint: url::Url) -> Self {
        self.options.endpoint = endpoint;
        self
    }

    /// Called with fields of each data update
    pub fn on_stream_data<F>(mut self, f: F) -> Self
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        self.listeners.stream_data.push(Box::new(f));
        self
    }

    /// Called when health check keeps timeout
    pub fn on_inactive<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.inactive.push(Box::new(f));
        self
    }

    /// Called when vehicle keeps disconnecting
    pub fn on_too_many_disconnects<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.too_many_disconnects.push(Box::new(f));
        self
    }

    /// Called when vehicle is offline
    pub fn on_offline<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.offline.push(Box::new(f));
        self
    }

    /// Called on protocol errors
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.listeners.error.push(Box::new(f));
        self
    }

    #[cfg(test)]
    pub(crate) fn into_listeners(self) -> Listeners {
        self.listeners
    }

    /// Start the background driver task and return the client handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn build(self) -> StreamClient {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let driver = Driver::new(self.options, self.listeners, command_rx, state_tx);
        tokio::spawn(driver.run());

        StreamClient {
            commands: command_tx,
            state: state_rx,
        }
    }
}

/// Self-healing telemetry stream of one vehicle.
///
/// All handles cloned from one client share the same connection, the
/// connection is closed when the last handle is dropped.
#[derive(Debug, Clone)]
pub struct StreamClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl StreamClient {
    /// Create a builder
    pub fn builder() -> StreamClientBuilder {
        StreamClientBuilder::default()
    }

    /// Start streaming, no-op if a transport already exists.
    ///
    /// Later auto reconnects reuse the arguments of last call.
    pub fn connect(&self, request: ConnectRequest) -> std::result::Result<(), ClientError> {
        self.send(Command::Connect(request))
    }

    /// Start streaming using token and vehicle id from a provider.
    ///
    /// `customize` receives the request built from provider, use it to set
    /// columns or resubscribe floor:
    ///
    /// ```no_run
    /// # async fn run(client: tesla_stream::ws::StreamClient, api: tesla_stream::api::Client) {
    /// client
    ///     .connect_with(&api, |request| request.columns(["speed"]).resubscribe_floor(60))
    ///     .await
    ///     .unwrap();
    /// # }
    /// ```
    pub async fn connect_with<P, F>(&self, provider: &P, customize: F) -> Result<()>
    where
        P: TokenProvider + ?Sized,
        F: FnOnce(ConnectRequest) -> ConnectRequest,
    {
        let token = provider
            .access_token()
            .await
            .context(error::CallAPIFailed)?;
        let tag = provider.vehicle_id().await.context(error::CallAPIFailed)?;

        log::debug!("Got stream tag {} from token provider", tag);

        let request = customize(ConnectRequest::new(tag, token));

        self.connect(request).context(error::StreamClientFailed)
    }

    /// Stop streaming.
    ///
    /// When `reconnect` is true a new connection is made after the old one closed,
    /// `unsubscribe` sends an unsubscribe message before closing.
    pub fn disconnect(
        &self,
        reconnect: bool,
        unsubscribe: bool,
    ) -> std::result::Result<(), ClientError> {
        self.send(Command::Disconnect {
            reconnect,
            unsubscribe,
        })
    }

    /// Stop streaming for good, same as `disconnect(false, true)`
    pub fn close(&self) -> std::result::Result<(), ClientError> {
        self.disconnect(false, true)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Server hello received and connection not closing
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// No transport exists
    pub fn is_closed(&self) -> bool {
        !self.state().has_transport()
    }

    /// Close frame sent, waiting transport close
    pub fn is_closing(&self) -> bool {
        self.state() == ConnectionState::Closing
    }

    /// Wait until connection state matches `predicate`, returns the matched state.
    pub async fn wait_state<F>(
        &self,
        mut predicate: F,
    ) -> std::result::Result<ConnectionState, ClientError>
    where
        F: FnMut(ConnectionState) -> bool,
    {
        let mut state = self.state.clone();

        loop {
            let current = *state.borrow_and_update();
            if predicate(current) {
                return Ok(current);
            }
            state
                .changed()
                .await
                .map_err(|_| client_error::DriverStopped.build())?;
        }
    }

    fn send(&self, command: Command) -> std::result::Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| client_error::DriverStopped.build())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api;

    struct FixedProvider;

    #[async_trait::async_trait]
    impl TokenProvider for FixedProvider {
        async fn access_token(&self) -> api::Result<String> {
            Ok("tok".to_string())
        }

        async fn vehicle_id(&self) -> api::Result<String> {
            Ok("42".to_string())
        }
    }

    fn detached() -> (StreamClient, mpsc::UnboundedReceiver<Command>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (_, state) = watch::channel(ConnectionState::Idle);
        (StreamClient { commands, state }, command_rx)
    }

    #[tokio::test]
    async fn test_connect_with_customized_request() {
        let (client, mut commands) = detached();

        client
            .connect_with(&FixedProvider, |request| {
                request.columns(["speed", "shift_state"]).resubscribe_floor(60)
            })
            .await
            .unwrap();

        match commands.recv().await {
            Some(Command::Connect(request)) => {
                assert_eq!(request.tag, "42");
                assert_eq!(request.token, "tok");
                assert_eq!(
                    request.columns,
                    Some(vec!["speed".to_string(), "shift_state".to_string()])
                );
                assert_eq!(request.resubscribe_floor, Some(60));
            }
            other => panic!("expect connect command, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_with_plain_request() {
        let (client, mut commands) = detached();

        client
            .connect_with(&FixedProvider, |request| request)
            .await
            .unwrap();

        match commands.recv().await {
            Some(Command::Connect(request)) => {
                assert_eq!(request.columns, None);
                assert_eq!(request.resubscribe_floor, None);
            }
            other => panic!("expect connect command, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_commands_fail_after_driver_stopped() {
        let (client, commands) = detached();
        drop(commands);

        assert!(matches!(client.close(), Err(ClientError::DriverStopped)));
        assert!(client.connect_with(&FixedProvider, |r| r).await.is_err());
    }
}
