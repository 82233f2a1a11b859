//! Momentum paper-trading strategy: one long position at a time.
//!
//! This module defines the rules for:
//! - When to enter (bullish reversal candle confirmed by MACD, CCI, breakout)
//! - Where the stop goes (pattern low, capped by the per-trade risk)
//! - When to exit (fail-safe, structural stop, optional R-multiple target)
//! - How the stop trails (ratchets up along the trailing EMA)

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{Bar, ExitReason, PaperPosition};

use super::indicators::IndicatorFrame;
use super::position_sizer::{entry_stop, immediate_stop_hit, position_size, risk_stop};
use super::signals::{entry_signal, exit_flip, ExitFlip};
use super::{EntryPattern, MomentumConfig};

/// Session parameters read fresh for every bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeParams {
    /// Fraction of equity risked on the next entry
    pub risk_fraction: f64,

    /// Take-profit in R multiples, 0 = off
    pub take_profit_r: f64,

    /// Fail-safe cutoff pinned by the user; `None` means use the trade's risk
    pub fail_safe_override: Option<f64>,

    /// Paper equity used for sizing
    pub equity: f64,
}

/// Something the session should announce.
#[derive(Debug, Clone)]
pub enum TradeEvent {
    Entered {
        position: PaperPosition,
        pattern: EntryPattern,
        pattern_stop: f64,
        risk_stop: f64,
        risk_fraction: f64,
    },
    Exited {
        position: PaperPosition,
        reason: ExitReason,
        price: f64,
        at: DateTime<Utc>,
    },
    /// Advisory only; the position stays open.
    MomentumWeakening(ExitFlip),
    StopRaised {
        stop: f64,
    },
}

/// Per-symbol strategy state machine.
pub struct MomentumStrategy {
    config: MomentumConfig,
    symbol: String,
    position: Option<PaperPosition>,

    /// Bar the current position was opened on
    entry_bar: Option<DateTime<Utc>>,

    /// Bar the last position was closed on; no re-entry within it
    exit_bar: Option<DateTime<Utc>>,

    /// Bar the last weakening advisory was posted for
    warned_bar: Option<DateTime<Utc>>,
}

impl MomentumStrategy {
    pub fn new(symbol: &str, config: MomentumConfig) -> Self {
        Self {
            config,
            symbol: symbol.to_uppercase(),
            position: None,
            entry_bar: None,
            exit_bar: None,
            warned_bar: None,
        }
    }

    pub fn position(&self) -> Option<&PaperPosition> {
        self.position.as_ref()
    }

    /// Evaluate the latest state of the series.
    ///
    /// Called every time the last bar changes, including while a multi-minute
    /// bucket is still forming.
    pub fn on_bars(&mut self, bars: &[Bar], params: &TradeParams) -> Vec<TradeEvent> {
        let Some(last) = bars.last() else {
            return Vec::new();
        };
        if bars.len() < self.config.min_bars.max(2) {
            return Vec::new();
        }

        let frame = IndicatorFrame::compute(bars, &self.config);

        match self.position.take() {
            None => self.try_enter(bars, &frame, params).into_iter().collect(),
            Some(position) => self.manage(position, bars, last, &frame, params),
        }
    }

    fn try_enter(&mut self, bars: &[Bar], frame: &IndicatorFrame, params: &TradeParams) -> Option<TradeEvent> {
        let last = bars.last()?;
        if self.exit_bar == Some(last.timestamp) {
            return None;
        }

        let signal = entry_signal(bars, frame, &self.config)?;

        let entry = last.close;
        let risk_fraction = params.risk_fraction;
        let risk_cap = risk_stop(entry, risk_fraction);
        let stop = entry_stop(entry, signal.pattern_stop, risk_fraction);
        let qty = position_size(entry, stop, params.equity, risk_fraction);

        if qty == 0 || entry <= stop || !stop.is_finite() {
            debug!(symbol = %self.symbol, entry, stop, qty, "Entry signal skipped");
            return None;
        }

        let fail_safe = params.fail_safe_override.unwrap_or(risk_fraction);
        let position = PaperPosition::new(&self.symbol, entry, stop, qty, fail_safe, last.timestamp);

        self.entry_bar = Some(last.timestamp);
        self.position = Some(position.clone());

        Some(TradeEvent::Entered {
            position,
            pattern: signal.pattern,
            pattern_stop: signal.pattern_stop,
            risk_stop: risk_cap,
            risk_fraction,
        })
    }

    fn manage(
        &mut self,
        mut position: PaperPosition,
        bars: &[Bar],
        last: &Bar,
        frame: &IndicatorFrame,
        params: &TradeParams,
    ) -> Vec<TradeEvent> {
        let price = last.close;

        // A cutoff pinned with `!sl` applies to the open position too.
        if let Some(cutoff) = params.fail_safe_override {
            position.fail_safe_fraction = cutoff;
        }

        // On the entry bar the low may predate the fill, so only the close counts.
        let same_bar = self.entry_bar == Some(last.timestamp);
        let touched = if same_bar { price } else { last.low };

        if immediate_stop_hit(price, position.entry, position.fail_safe_fraction) {
            return vec![self.close(position, ExitReason::FailSafe, price, last.timestamp)];
        }

        if touched <= position.stop {
            // Gap through the stop fills at the open.
            let fill = if !same_bar && last.open < position.stop {
                last.open
            } else {
                position.stop
            };
            return vec![self.close(position, ExitReason::Stop, fill, last.timestamp)];
        }

        let mut events = Vec::new();

        if let Some(flip) = exit_flip(bars, frame, &self.config) {
            if self.warned_bar != Some(last.timestamp) {
                self.warned_bar = Some(last.timestamp);
                events.push(TradeEvent::MomentumWeakening(flip));
            }
        }

        if let Some(target) = position.take_profit_target(params.take_profit_r) {
            if price >= target {
                events.push(self.close(position, ExitReason::TakeProfit, target, last.timestamp));
                return events;
            }
        }

        if let Some(&trail) = frame.trail_ema.last() {
            if position.raise_stop(trail) {
                events.push(TradeEvent::StopRaised { stop: position.stop });
            }
        }

        self.position = Some(position);
        events
    }

    fn close(&mut self, position: PaperPosition, reason: ExitReason, price: f64, at: DateTime<Utc>) -> TradeEvent {
        self.exit_bar = Some(at);
        self.entry_bar = None;
        TradeEvent::Exited {
            position,
            reason,
            price,
            at,
        }
    }
}
