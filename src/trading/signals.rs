//! Momentum entry and exit signals evaluated on the latest bar.
//!
//! Entry: the previous candle is a bullish reversal pattern, MACD is above its
//! signal, CCI is above the entry threshold and (optionally) the latest close
//! breaks the pattern candle's high.
//!
//! Exit flip: MACD crosses down with CCI below the exit threshold, or the
//! latest candle is bearish (shooting star, bearish engulfing).

use crate::models::Bar;

use super::indicators::IndicatorFrame;
use super::patterns;
use super::{EntryPattern, ExitPattern, MomentumConfig};

/// A long entry armed on the latest bar.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySignal {
    /// Pattern found on the previous candle
    pub pattern: EntryPattern,

    /// Low of the pattern candle; the natural stop
    pub pattern_stop: f64,
}

/// Why momentum looks exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitFlip {
    MacdCrossDown,
    Pattern(ExitPattern),
}

fn entry_pattern_at(bars: &[Bar], idx: usize, config: &MomentumConfig) -> Option<EntryPattern> {
    let candle = &bars[idx];
    config.entry_patterns.iter().copied().find(|p| match p {
        EntryPattern::Doji => patterns::is_doji(candle, config.doji_body_pct),
        EntryPattern::Hammer => patterns::is_hammer(candle),
        EntryPattern::InvertedHammer => patterns::is_inverted_hammer(candle),
        EntryPattern::BullishEngulfing => {
            idx >= 1 && patterns::is_bullish_engulfing(&bars[idx - 1], candle)
        }
    })
}

/// Long entry on the last bar, if every confirmation holds.
pub fn entry_signal(bars: &[Bar], frame: &IndicatorFrame, config: &MomentumConfig) -> Option<EntrySignal> {
    if bars.len() < 2 || frame.macd.line.len() != bars.len() {
        return None;
    }
    let last = bars.len() - 1;
    let prev = &bars[last - 1];
    let cur = &bars[last];

    let pattern = entry_pattern_at(bars, last - 1, config)?;

    let macd_bullish = frame.macd.line[last] > frame.macd.signal[last];
    let cci_ok = frame.cci[last].is_some_and(|c| c > config.cci_entry);
    let breakout = !config.confirm_break_high || cur.close > prev.high;

    (macd_bullish && cci_ok && breakout).then(|| EntrySignal {
        pattern,
        pattern_stop: prev.low,
    })
}

/// Momentum exhaustion on the last bar.
pub fn exit_flip(bars: &[Bar], frame: &IndicatorFrame, config: &MomentumConfig) -> Option<ExitFlip> {
    if bars.len() < 2 || frame.macd.line.len() != bars.len() {
        return None;
    }
    let last = bars.len() - 1;
    let line = &frame.macd.line;
    let signal = &frame.macd.signal;

    let cross_down = line[last] <= signal[last] && line[last - 1] > signal[last - 1];
    let cci_weak = frame.cci[last].is_some_and(|c| c < config.cci_exit);
    if cross_down && cci_weak {
        return Some(ExitFlip::MacdCrossDown);
    }

    let prev = &bars[last - 1];
    let cur = &bars[last];
    config
        .exit_patterns
        .iter()
        .copied()
        .find(|p| match p {
            ExitPattern::ShootingStar => patterns::is_shooting_star(cur),
            ExitPattern::BearishEngulfing => patterns::is_bearish_engulfing(prev, cur),
        })
        .map(ExitFlip::Pattern)
}
