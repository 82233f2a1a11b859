//! Candlestick anatomy and single/two-candle reversal patterns.

use crate::models::Bar;

/// Default shape thresholds for hammer-family candles.
const BODY_MAX_PCT: f64 = 0.35;
const WICK_TO_BODY_MIN: f64 = 2.0;
const OPPOSITE_WICK_MAX_PCT: f64 = 0.25;
const BODY_EDGE_PCT: f64 = 0.25;
const EPS: f64 = 1e-12;

fn body(b: &Bar) -> f64 {
    (b.close - b.open).abs()
}

fn range(b: &Bar) -> f64 {
    (b.high - b.low).abs()
}

fn upper_wick(b: &Bar) -> f64 {
    b.high - b.open.max(b.close)
}

fn lower_wick(b: &Bar) -> f64 {
    b.open.min(b.close) - b.low
}

/// Body no bigger than `body_pct` of the range.
pub fn is_doji(b: &Bar, body_pct: f64) -> bool {
    let rng = range(b);
    rng > 0.0 && body(b) <= rng * body_pct
}

/// Small body near the top with a long lower wick.
pub fn is_hammer(b: &Bar) -> bool {
    let rng = range(b);
    let body = body(b);

    body <= rng * BODY_MAX_PCT
        && lower_wick(b) >= WICK_TO_BODY_MIN * (body + EPS)
        && upper_wick(b) <= rng * OPPOSITE_WICK_MAX_PCT
        && b.open.max(b.close) >= b.high - rng * BODY_EDGE_PCT
}

/// Small body near the bottom with a long upper wick.
pub fn is_inverted_hammer(b: &Bar) -> bool {
    let rng = range(b);
    let body = body(b);

    body <= rng * BODY_MAX_PCT
        && upper_wick(b) >= WICK_TO_BODY_MIN * (body + EPS)
        && lower_wick(b) <= rng * OPPOSITE_WICK_MAX_PCT
        && b.open.min(b.close) <= b.low + rng * BODY_EDGE_PCT
}

/// Same geometry as the inverted hammer; bearish when it prints after a run-up.
pub fn is_shooting_star(b: &Bar) -> bool {
    is_inverted_hammer(b)
}

/// Green candle whose body covers the previous red body.
pub fn is_bullish_engulfing(prev: &Bar, cur: &Bar) -> bool {
    cur.close > cur.open && prev.close < prev.open && cur.open <= prev.close && cur.close >= prev.open
}

/// Red candle whose body covers the previous green body.
pub fn is_bearish_engulfing(prev: &Bar, cur: &Bar) -> bool {
    cur.close < cur.open && prev.close > prev.open && cur.open >= prev.close && cur.close <= prev.open
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(Utc::now(), open, high, low, close, 0.0)
    }

    #[test]
    fn test_doji() {
        assert!(is_doji(&candle(10.0, 11.0, 9.0, 10.1), 0.2));
        assert!(!is_doji(&candle(9.0, 11.0, 9.0, 11.0), 0.2));
        // Zero range is never a doji.
        assert!(!is_doji(&candle(10.0, 10.0, 10.0, 10.0), 0.2));
    }

    #[test]
    fn test_hammer_and_inverted() {
        // Body 9.8-10.0 at the top of a 8.0-10.1 range.
        let hammer = candle(9.8, 10.1, 8.0, 10.0);
        assert!(is_hammer(&hammer));
        assert!(!is_inverted_hammer(&hammer));

        let inverted = candle(8.2, 10.1, 8.0, 8.0);
        assert!(is_inverted_hammer(&inverted));
        assert!(is_shooting_star(&inverted));
        assert!(!is_hammer(&inverted));
    }

    #[test]
    fn test_engulfing() {
        let red = candle(10.0, 10.2, 9.4, 9.5);
        let green = candle(9.4, 10.4, 9.3, 10.3);
        assert!(is_bullish_engulfing(&red, &green));
        assert!(!is_bearish_engulfing(&red, &green));

        let up = candle(9.5, 10.1, 9.4, 10.0);
        let down = candle(10.1, 10.2, 9.3, 9.4);
        assert!(is_bearish_engulfing(&up, &down));
        assert!(!is_bullish_engulfing(&up, &down));
    }
}
