//! Alpaca market-data websocket: real-time minute bars.
//!
//! Protocol (all frames are JSON arrays):
//! 1. server: `[{"T":"success","msg":"connected"}]`
//! 2. client: `{"action":"auth","key":..,"secret":..}`
//! 3. server: `[{"T":"success","msg":"authenticated"}]`
//! 4. client: `{"action":"subscribe","bars":["SYM"]}`
//! 5. server: `[{"T":"subscription",..}]`, then `[{"T":"b","S":"SYM",..}]` per minute
//!
//! Most data plans allow a single connection per key, so every subscription
//! shares one socket and bars are fanned out per symbol.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use backoff::backoff::Backoff;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use crate::models::Bar;

use super::{reconnect_backoff, BarProvider, BAR_BUFFER};

const PING_INTERVAL: Duration = Duration::from_secs(15);

/// Error codes after which reconnecting cannot help.
const FATAL_CODES: [i64; 3] = [
    401, // not authenticated
    402, // auth failed
    409, // insufficient subscription
];

/// API key pair for the data stream.
#[derive(Clone)]
pub struct AlpacaCredentials {
    pub key_id: String,
    pub secret_key: String,
}

impl fmt::Debug for AlpacaCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlpacaCredentials")
            .field("key_id", &self.key_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// One monitor's interest in a symbol.
#[derive(Debug)]
struct Subscriber {
    symbol: String,
    tx: mpsc::Sender<Bar>,
}

/// Bar provider backed by the Alpaca stream. The connection task starts on
/// the first subscription and is restarted if it has exited.
#[derive(Debug)]
pub struct AlpacaStream {
    url: String,
    credentials: AlpacaCredentials,
    connection: Mutex<Option<mpsc::UnboundedSender<Subscriber>>>,
}

impl AlpacaStream {
    pub fn new(url: impl Into<String>, credentials: AlpacaCredentials) -> Self {
        Self {
            url: url.into(),
            credentials,
            connection: Mutex::new(None),
        }
    }
}

impl BarProvider for AlpacaStream {
    fn subscribe(&self, symbol: &str) -> mpsc::Receiver<Bar> {
        let (tx, rx) = mpsc::channel(BAR_BUFFER);
        let mut subscriber = Subscriber {
            symbol: symbol.to_uppercase(),
            tx,
        };

        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(requests) = connection.as_ref() {
            match requests.send(subscriber) {
                Ok(()) => return rx,
                Err(mpsc::error::SendError(returned)) => subscriber = returned,
            }
        }

        let (requests, incoming) = mpsc::unbounded_channel();
        // The receiver was just created, so this cannot fail.
        let _ = requests.send(subscriber);
        let task = Connection {
            url: self.url.clone(),
            credentials: self.credentials.clone(),
            subscribers: Subscribers::default(),
            requests: incoming,
            accepting: true,
        };
        tokio::spawn(task.run());
        *connection = Some(requests);
        rx
    }
}

// =============================================================================
// Wire types
// =============================================================================

/// Client requests.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Action<'a> {
    Auth { key: &'a str, secret: &'a str },
    Subscribe { bars: Vec<&'a str> },
    Unsubscribe { bars: Vec<&'a str> },
}

/// One element of a server frame.
#[derive(Debug, Deserialize)]
#[serde(tag = "T")]
pub(crate) enum StreamMessage {
    #[serde(rename = "success")]
    Success { msg: String },

    #[serde(rename = "error")]
    Error { code: i64, msg: String },

    #[serde(rename = "subscription")]
    Subscription {
        #[serde(default)]
        bars: Vec<String>,
    },

    #[serde(rename = "b")]
    Bar(BarMessage),

    #[serde(other)]
    Other,
}

/// Minute bar: `{"T":"b","S":"AAPL","o":..,"h":..,"l":..,"c":..,"v":..,"t":"2025-08-29T13:05:00Z"}`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BarMessage {
    #[serde(rename = "S", default)]
    pub symbol: String,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v", default)]
    pub volume: f64,
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
}

impl BarMessage {
    pub fn to_bar(&self) -> Bar {
        Bar::new(self.timestamp, self.open, self.high, self.low, self.close, self.volume)
    }

    /// Empty symbols match anything (hand-written replay files).
    pub fn is_for(&self, symbol: &str) -> bool {
        self.symbol.is_empty() || self.symbol.eq_ignore_ascii_case(symbol)
    }
}

/// Decode a frame. Alpaca sends arrays but a bare object is accepted too.
pub(crate) fn decode_frame(text: &str) -> Result<Vec<StreamMessage>, serde_json::Error> {
    match serde_json::from_str::<Vec<StreamMessage>>(text) {
        Ok(messages) => Ok(messages),
        Err(_) => serde_json::from_str::<StreamMessage>(text).map(|m| vec![m]),
    }
}

// =============================================================================
// Connection loop
// =============================================================================

#[derive(Debug, Error)]
enum StreamError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("request encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("server error {code}: {msg}")]
    Server { code: i64, msg: String },

    #[error("connection closed")]
    Closed,

    #[error("no traffic for {0:?}")]
    Stalled(Duration),
}

impl StreamError {
    fn is_fatal(&self) -> bool {
        matches!(self, StreamError::Server { code, .. } if FATAL_CODES.contains(code))
    }
}

/// Everyone currently fed by the connection.
#[derive(Debug, Default)]
struct Subscribers {
    list: Vec<Subscriber>,
}

impl Subscribers {
    fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    fn watches(&self, symbol: &str) -> bool {
        self.list.iter().any(|s| s.symbol == symbol)
    }

    /// Distinct symbols, in subscription order.
    fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for sub in &self.list {
            if !out.contains(&sub.symbol) {
                out.push(sub.symbol.clone());
            }
        }
        out
    }

    /// Register a subscriber. Returns its symbol if nobody watched it yet.
    fn add(&mut self, subscriber: Subscriber) -> Option<String> {
        let new_symbol = (!self.watches(&subscriber.symbol)).then(|| subscriber.symbol.clone());
        self.list.push(subscriber);
        new_symbol
    }

    /// Drop subscribers whose monitor has gone. Returns symbols nobody
    /// watches any more.
    fn prune(&mut self) -> Vec<String> {
        let before = self.symbols();
        self.list.retain(|s| !s.tx.is_closed());
        before.into_iter().filter(|sym| !self.watches(sym)).collect()
    }

    /// Hand a bar to every subscriber of its symbol.
    async fn dispatch(&self, bar: &BarMessage) {
        for sub in self.list.iter().filter(|s| bar.is_for(&s.symbol)) {
            // A closed receiver is pruned on the next tick.
            let _ = sub.tx.send(bar.to_bar()).await;
        }
    }

    /// Drop everyone, ending their feeds.
    fn clear(&mut self) {
        self.list.clear();
    }
}

/// The single socket shared by every subscription.
struct Connection {
    url: String,
    credentials: AlpacaCredentials,
    subscribers: Subscribers,
    requests: mpsc::UnboundedReceiver<Subscriber>,

    /// False once the owning `AlpacaStream` is gone
    accepting: bool,
}

impl Connection {
    /// Connect while anyone is subscribed; idle (disconnected) otherwise.
    async fn run(mut self) {
        let mut backoff = reconnect_backoff();

        loop {
            self.subscribers.prune();
            if self.subscribers.is_empty() {
                if !self.accepting {
                    return;
                }
                match self.requests.recv().await {
                    Some(sub) => {
                        self.subscribers.add(sub);
                    }
                    None => return,
                }
                continue;
            }

            let err = match self.session(&mut backoff).await {
                // Nobody left; go idle.
                Ok(()) => continue,
                Err(e) => e,
            };

            if err.is_fatal() {
                error!(
                    error = %err,
                    symbols = ?self.subscribers.symbols(),
                    "Alpaca stream rejected, dropping subscriptions"
                );
                self.subscribers.clear();
                continue;
            }

            let delay = backoff.next_backoff().unwrap_or(Duration::from_secs(30));
            warn!(
                error = %err,
                delay_secs = delay.as_secs(),
                "Alpaca stream disconnected, reconnecting"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One connection. `Ok` means every subscriber went away.
    async fn session<B: Backoff>(&mut self, backoff: &mut B) -> Result<(), StreamError> {
        info!(url = %self.url, symbols = ?self.subscribers.symbols(), "Connecting to Alpaca stream");

        let (ws, _response) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = ws.split();

        let mut ping = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
        let mut last_seen = Instant::now();
        let mut authenticated = false;

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    let silent = last_seen.elapsed();
                    if silent > PING_INTERVAL * 2 {
                        return Err(StreamError::Stalled(silent));
                    }

                    let gone = self.subscribers.prune();
                    if self.subscribers.is_empty() {
                        info!("No Alpaca subscribers left, disconnecting");
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                    if authenticated && !gone.is_empty() {
                        let unsubscribe = Action::Unsubscribe { bars: gone.iter().map(String::as_str).collect() };
                        write.send(Message::Text(serde_json::to_string(&unsubscribe)?)).await?;
                    }

                    write.send(Message::Ping(Vec::new())).await?;
                }

                request = self.requests.recv(), if self.accepting => match request {
                    Some(sub) => {
                        if let Some(symbol) = self.subscribers.add(sub) {
                            if authenticated {
                                let subscribe = Action::Subscribe { bars: vec![symbol.as_str()] };
                                write.send(Message::Text(serde_json::to_string(&subscribe)?)).await?;
                            }
                        }
                    }
                    None => self.accepting = false,
                },

                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Ping(data))) => {
                            last_seen = Instant::now();
                            write.send(Message::Pong(data)).await?;
                            continue;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_seen = Instant::now();
                            continue;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "Alpaca sent close frame");
                            return Err(StreamError::Closed);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(StreamError::Closed),
                    };
                    last_seen = Instant::now();

                    let messages = match decode_frame(&text) {
                        Ok(messages) => messages,
                        Err(e) => {
                            debug!(error = %e, frame = %text, "Skipping undecodable frame");
                            continue;
                        }
                    };

                    for message in messages {
                        match message {
                            StreamMessage::Success { msg } if msg == "connected" => {
                                let auth = Action::Auth {
                                    key: &self.credentials.key_id,
                                    secret: &self.credentials.secret_key,
                                };
                                write.send(Message::Text(serde_json::to_string(&auth)?)).await?;
                            }
                            StreamMessage::Success { msg } if msg == "authenticated" => {
                                backoff.reset();
                                authenticated = true;
                                let symbols = self.subscribers.symbols();
                                let subscribe = Action::Subscribe { bars: symbols.iter().map(String::as_str).collect() };
                                write.send(Message::Text(serde_json::to_string(&subscribe)?)).await?;
                            }
                            StreamMessage::Success { msg } => debug!(msg = %msg, "Alpaca status"),
                            StreamMessage::Error { code, msg } => {
                                return Err(StreamError::Server { code, msg });
                            }
                            StreamMessage::Subscription { bars } => {
                                info!(bars = ?bars, "Alpaca bar subscriptions");
                            }
                            StreamMessage::Bar(bar) => self.subscribers.dispatch(&bar).await,
                            StreamMessage::Other => {}
                        }
                    }
                }
            }
        }
    }
}
