//! External service clients: Alpaca market data, bar replay, Discord.

mod alpaca;
pub mod discord;
mod replay;

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tokio::sync::mpsc;

use crate::models::Bar;

pub use alpaca::{AlpacaCredentials, AlpacaStream};
pub use replay::ReplayFeed;

/// Bars buffered between a feed task and its monitor.
const BAR_BUFFER: usize = 256;

/// A source of live minute bars for one symbol.
///
/// The returned receiver yields bars until the feed gives up. Dropping it
/// ends the feed task.
pub trait BarProvider: Send + Sync {
    fn subscribe(&self, symbol: &str) -> mpsc::Receiver<Bar>;
}

/// Reconnect schedule shared by the websocket clients: 1s doubling to 30s,
/// retried forever.
pub(crate) fn reconnect_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_secs(1))
        .with_multiplier(2.0)
        .with_randomization_factor(0.0)
        .with_max_interval(Duration::from_secs(30))
        .with_max_elapsed_time(None)
        .build()
}
