//! Trading configuration: risk, exits, and momentum strategy parameters.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Risk and position sizing defaults (`risk:` in config.yaml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Starting paper equity in USD
    pub equity: Decimal,

    /// Fraction of equity risked per trade when no override is given
    pub per_trade_r_pct: f64,

    /// Immediate loss cutoff below entry (0.0 to 1.0)
    pub max_intrabar_loss_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            equity: dec!(10000),
            per_trade_r_pct: 0.01,        // 1% per trade
            max_intrabar_loss_pct: 0.02,  // 2% fail-safe
        }
    }
}

/// Exit rules (`exits:` in config.yaml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitsConfig {
    /// Fixed take-profit in multiples of R. 0 disables it.
    #[serde(rename = "take_profit_R", alias = "take_profit_r")]
    pub take_profit_r: f64,
}

impl Default for ExitsConfig {
    fn default() -> Self {
        Self { take_profit_r: 0.0 }
    }
}

/// Bullish reversal candles that can arm an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPattern {
    Doji,
    Hammer,
    InvertedHammer,
    BullishEngulfing,
}

impl EntryPattern {
    pub const ALL: [EntryPattern; 4] = [
        EntryPattern::Doji,
        EntryPattern::Hammer,
        EntryPattern::InvertedHammer,
        EntryPattern::BullishEngulfing,
    ];
}

/// Bearish candles that flag a momentum exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPattern {
    ShootingStar,
    BearishEngulfing,
}

/// Momentum strategy parameters (`momentum:` in config.yaml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub cci_len: usize,

    /// Max body as a fraction of range for a doji
    pub doji_body_pct: f64,

    /// CCI must be above this to enter
    pub cci_entry: f64,

    /// CCI below this (with a MACD cross down) flags an exit
    pub cci_exit: f64,

    /// Require close above the pattern candle's high
    pub confirm_break_high: bool,

    /// Span of the EMA the trailing stop follows
    pub trail_ema: usize,

    /// Bars needed before any signal is evaluated
    pub min_bars: usize,

    pub entry_patterns: Vec<EntryPattern>,
    pub exit_patterns: Vec<ExitPattern>,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            cci_len: 14,
            doji_body_pct: 0.20,
            cci_entry: 0.0,
            cci_exit: 0.0,
            confirm_break_high: true,
            trail_ema: 20,
            min_bars: 30,
            entry_patterns: EntryPattern::ALL.to_vec(),
            exit_patterns: vec![ExitPattern::ShootingStar, ExitPattern::BearishEngulfing],
        }
    }
}
