//! Discord gateway (v10, JSON encoding).
//!
//! Only what a command bot needs: Hello, heartbeats, Identify, and the
//! `READY` / `MESSAGE_CREATE` dispatches. Every reconnect identifies from
//! scratch.

use std::time::Duration;

use backoff::backoff::Backoff;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use crate::api::reconnect_backoff;
use crate::models::ChannelId;

use super::GATEWAY_URL;

const INTENT_GUILD_MESSAGES: u64 = 1 << 9;
const INTENT_DIRECT_MESSAGES: u64 = 1 << 12;
const INTENT_MESSAGE_CONTENT: u64 = 1 << 15;

/// Close codes that mean the bot is misconfigured.
const FATAL_CLOSE_CODES: [u16; 6] = [
    4004, // authentication failed
    4010, // invalid shard
    4011, // sharding required
    4012, // invalid API version
    4013, // invalid intents
    4014, // disallowed intents
];

mod op {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// What the gateway hands to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Ready { username: String },
    Message(IncomingMessage),
}

/// A chat message from a human user.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub channel_id: ChannelId,
    pub author: String,
    pub content: String,
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Payload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
struct Ready {
    user: User,
}

#[derive(Debug, Deserialize)]
struct User {
    username: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct MessageCreate {
    channel_id: ChannelId,
    #[serde(default)]
    content: String,
    author: User,
}

/// Turn a dispatch into an application event. Bot authors are dropped.
fn decode_dispatch(event: &str, data: Value) -> Result<Option<GatewayEvent>, serde_json::Error> {
    match event {
        "READY" => {
            let ready: Ready = serde_json::from_value(data)?;
            Ok(Some(GatewayEvent::Ready {
                username: ready.user.username,
            }))
        }
        "MESSAGE_CREATE" => {
            let msg: MessageCreate = serde_json::from_value(data)?;
            if msg.author.bot {
                return Ok(None);
            }
            Ok(Some(GatewayEvent::Message(IncomingMessage {
                channel_id: msg.channel_id,
                author: msg.author.username,
                content: msg.content,
            })))
        }
        _ => Ok(None),
    }
}

// =============================================================================
// Connection loop
// =============================================================================

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("gateway closed with code {code}: {reason}")]
    Closed { code: u16, reason: String },

    #[error("connection ended")]
    Ended,

    #[error("expected Hello, got op {0}")]
    NoHello(u8),

    #[error("heartbeat not acknowledged")]
    ZombieConnection,

    #[error("server requested reconnect (op {0})")]
    Reconnect(u8),
}

impl GatewayError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Closed { code, .. } if FATAL_CLOSE_CODES.contains(code))
    }
}

/// Gateway connection for one bot token.
pub struct Gateway {
    token: String,
    url: String,
    intents: u64,
}

impl Gateway {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            url: GATEWAY_URL.to_string(),
            intents: INTENT_GUILD_MESSAGES | INTENT_DIRECT_MESSAGES | INTENT_MESSAGE_CONTENT,
        }
    }

    /// Forward events into `tx` until it closes (`Ok`) or Discord refuses the
    /// bot (`Err`). Transient failures reconnect with backoff.
    pub async fn run(self, tx: mpsc::Sender<GatewayEvent>) -> Result<(), GatewayError> {
        let mut backoff = reconnect_backoff();

        loop {
            let err = match self.session(&tx, &mut backoff).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => e,
            };

            let delay = backoff.next_backoff().unwrap_or(Duration::from_secs(30));
            warn!(error = %err, delay_secs = delay.as_secs(), "Discord gateway disconnected, reconnecting");

            tokio::select! {
                _ = tx.closed() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn identify(&self) -> Value {
        json!({
            "op": op::IDENTIFY,
            "d": {
                "token": self.token,
                "intents": self.intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "daytradebot",
                    "device": "daytradebot",
                },
            },
        })
    }

    /// One connection. `Ok` means the receiver went away.
    async fn session<B: Backoff>(
        &self,
        tx: &mpsc::Sender<GatewayEvent>,
        backoff: &mut B,
    ) -> Result<(), GatewayError> {
        info!("Connecting to Discord gateway");
        let (ws, _response) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = ws.split();

        // The first frame must be Hello.
        let hello: Hello = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let payload: Payload = serde_json::from_str(&text)?;
                    if payload.op != op::HELLO {
                        return Err(GatewayError::NoHello(payload.op));
                    }
                    break serde_json::from_value(payload.d)?;
                }
                Some(Ok(Message::Close(frame))) => return Err(close_error(frame)),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(GatewayError::Ended),
            }
        };

        let period = Duration::from_millis(hello.heartbeat_interval.max(1000));
        debug!(interval_ms = period.as_millis() as u64, "Gateway hello");

        write.send(Message::Text(self.identify().to_string())).await?;

        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut sequence: Option<u64> = None;
        let mut acked = true;

        loop {
            tokio::select! {
                _ = tx.closed() => return Ok(()),
                _ = heartbeat.tick() => {
                    if !acked {
                        return Err(GatewayError::ZombieConnection);
                    }
                    acked = false;
                    write.send(Message::Text(heartbeat_payload(sequence))).await?;
                }
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                            continue;
                        }
                        Some(Ok(Message::Close(frame))) => return Err(close_error(frame)),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(GatewayError::Ended),
                    };

                    let payload: Payload = match serde_json::from_str(&text) {
                        Ok(p) => p,
                        Err(e) => {
                            debug!(error = %e, "Skipping undecodable gateway frame");
                            continue;
                        }
                    };
                    if payload.s.is_some() {
                        sequence = payload.s;
                    }

                    match payload.op {
                        op::DISPATCH => {
                            let name = payload.t.unwrap_or_default();
                            let event = match decode_dispatch(&name, payload.d) {
                                Ok(event) => event,
                                Err(e) => {
                                    warn!(event = %name, error = %e, "Malformed dispatch");
                                    continue;
                                }
                            };
                            if let Some(event) = event {
                                if matches!(event, GatewayEvent::Ready { .. }) {
                                    backoff.reset();
                                }
                                if tx.send(event).await.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                        op::HEARTBEAT => {
                            write.send(Message::Text(heartbeat_payload(sequence))).await?;
                        }
                        op::HEARTBEAT_ACK => acked = true,
                        op::RECONNECT | op::INVALID_SESSION => {
                            return Err(GatewayError::Reconnect(payload.op));
                        }
                        other => debug!(op = other, "Ignoring gateway op"),
                    }
                }
            }
        }
    }
}

fn heartbeat_payload(sequence: Option<u64>) -> String {
    json!({ "op": op::HEARTBEAT, "d": sequence }).to_string()
}

fn close_error(frame: Option<tungstenite::protocol::CloseFrame<'_>>) -> GatewayError {
    match frame {
        Some(frame) => GatewayError::Closed {
            code: u16::from(frame.code),
            reason: frame.reason.to_string(),
        },
        None => GatewayError::Ended,
    }
}
