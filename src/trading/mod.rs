//! Trading logic: indicators, candle patterns, signals, sizing, strategy.

mod config;
pub mod indicators;
pub mod patterns;
mod position_sizer;
mod signals;
mod strategy;

pub use config::{EntryPattern, ExitPattern, ExitsConfig, MomentumConfig, RiskConfig};
pub use signals::ExitFlip;
pub use strategy::{MomentumStrategy, TradeEvent, TradeParams};
