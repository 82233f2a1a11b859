//! Technical indicators over bar closes: EMA, MACD, CCI.
//!
//! All series are aligned with the input bars. EMAs are seeded with the first
//! value (no warm-up gap); CCI is `None` until two full windows are available
//! because its deviation term is itself a rolling mean.

use crate::models::Bar;

use super::MomentumConfig;

/// Exponential moving average with `alpha = 2 / (span + 1)`.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return out;
    };

    let alpha = 2.0 / (span.max(1) as f64 + 1.0);
    let mut prev = first;
    out.push(prev);
    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// MACD line, signal and histogram.
#[derive(Debug, Clone, Default)]
pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal = ema(&line, signal);
    let histogram = line.iter().zip(&signal).map(|(l, s)| l - s).collect();

    Macd {
        line,
        signal,
        histogram,
    }
}

fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 {
        return out;
    }
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().all(Option::is_some) {
            let sum: f64 = slice.iter().flatten().sum();
            out[i] = Some(sum / window as f64);
        }
    }
    out
}

/// Commodity Channel Index over the typical price.
pub fn cci(bars: &[Bar], len: usize) -> Vec<Option<f64>> {
    let typical: Vec<Option<f64>> = bars.iter().map(|b| Some(b.typical_price())).collect();
    let mean = rolling_mean(&typical, len);

    let deviation: Vec<Option<f64>> = typical
        .iter()
        .zip(&mean)
        .map(|(tp, m)| Some((tp.as_ref()? - m.as_ref()?).abs()))
        .collect();
    let mean_deviation = rolling_mean(&deviation, len);

    typical
        .iter()
        .zip(mean.iter().zip(&mean_deviation))
        .map(|(tp, (m, md))| {
            let (tp, m, md) = ((*tp)?, (*m)?, (*md)?);
            let md = if md == 0.0 { 1e-12 } else { md };
            Some((tp - m) / (0.015 * md))
        })
        .collect()
}

/// Every indicator the momentum strategy reads, aligned with the bars.
#[derive(Debug, Clone, Default)]
pub struct IndicatorFrame {
    pub trail_ema: Vec<f64>,
    pub macd: Macd,
    pub cci: Vec<Option<f64>>,
}

impl IndicatorFrame {
    pub fn compute(bars: &[Bar], config: &MomentumConfig) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        Self {
            trail_ema: ema(&closes, config.trail_ema),
            macd: macd(&closes, config.macd_fast, config.macd_slow, config.macd_signal),
            cci: cci(bars, config.cci_len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn close_enough(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2025, 8, 29, 13, 30, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(t0 + Duration::minutes(i as i64), c, c + 1.0, c - 1.0, c, 1000.0))
            .collect()
    }

    #[test]
    fn test_ema_seeded_with_first_value() {
        let out = ema(&[10.0, 11.0, 12.0], 3);
        // alpha = 0.5
        assert_eq!(out, vec![10.0, 10.5, 11.25]);
        assert!(ema(&[], 5).is_empty());
    }

    #[test]
    fn test_macd_flat_series_is_zero() {
        let m = macd(&[5.0; 40], 12, 26, 9);
        assert!(m.line.iter().all(|v| close_enough(*v, 0.0)));
        assert!(m.histogram.iter().all(|v| close_enough(*v, 0.0)));
    }

    #[test]
    fn test_macd_rising_series_is_positive() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let m = macd(&closes, 12, 26, 9);
        let last = closes.len() - 1;
        assert!(m.line[last] > 0.0);
        assert!(m.line[last] > m.signal[last]);
    }

    #[test]
    fn test_cci_warmup_and_sign() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let out = cci(&bars(&closes), 3);

        // Needs 2 * len - 1 bars.
        assert!(out[3].is_none());
        assert!(out[4].is_some());
        assert!(out[9].unwrap() > 0.0);
    }

    #[test]
    fn test_cci_flat_series_is_zero() {
        let out = cci(&bars(&[50.0; 10]), 3);
        assert!(close_enough(out[9].unwrap(), 0.0));
    }

    #[test]
    fn test_cci_known_value() {
        // Linear ramp: tp - ma = 1 at every point, so md = 1.
        let closes: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let out = cci(&bars(&closes), 3);
        assert!(close_enough(out[5].unwrap(), 1.0 / 0.015));
    }
}
