//! Data models for bars, sessions, paper positions, and closed trades.

mod bar;
mod channel;
mod position;
mod session;
mod trade;

pub use bar::{Bar, BarSeries, Timeframe};
pub use channel::ChannelId;
pub use position::PaperPosition;
pub use session::{trading_day, Session};
pub use trade::{ClosedTrade, ExitReason};
