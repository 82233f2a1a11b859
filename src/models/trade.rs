//! Closed paper trade record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ChannelId;

/// Why a paper position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Price fell through the immediate loss cutoff
    FailSafe,
    /// Bar low touched the structural or trailing stop
    Stop,
    /// Fixed R-multiple target reached
    TakeProfit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::FailSafe => "fail_safe",
            ExitReason::Stop => "stop",
            ExitReason::TakeProfit => "take_profit",
        }
    }
}

/// A completed round trip, as written to the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: String,
    pub channel: ChannelId,
    pub symbol: String,
    pub qty: u64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub initial_stop: f64,
    pub r_multiple: f64,
    pub pnl: f64,
    pub exit_reason: ExitReason,
    /// Exchange-local calendar day the trade closed on
    pub trading_day: NaiveDate,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}
