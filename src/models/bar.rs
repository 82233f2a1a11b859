//! OHLCV bars and the resampled series the strategy evaluates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bucket start time (UTC)
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Typical price used by CCI.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Fold a later sub-bar of the same bucket into this one.
    fn absorb(&mut self, other: &Bar) {
        self.high = self.high.max(other.high);
        self.low = self.low.min(other.low);
        self.close = other.close;
        self.volume += other.volume;
    }
}

/// Bar aggregation period, always a whole number of minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeframe {
    minutes: u32,
}

impl Timeframe {
    pub const ONE_MINUTE: Timeframe = Timeframe { minutes: 1 };

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes > 0).then_some(Self { minutes })
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    /// Start of the bucket containing `ts`.
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let span = i64::from(self.minutes) * 60;
        let secs = ts.timestamp();
        let floored = secs - secs.rem_euclid(span);
        Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self { minutes: 5 }
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    /// Accepts `1m`, `5min`, `15m`, `1h`, `4h`, `1d`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| anyhow::anyhow!("timeframe '{}' has no unit", s))?;
        let (num, unit) = s.split_at(split);
        let n: u32 = num
            .parse()
            .map_err(|_| anyhow::anyhow!("timeframe '{}' has no amount", s))?;

        let scale = match unit {
            "m" | "min" | "t" => 1,
            "h" | "hour" => 60,
            "d" | "day" => 60 * 24,
            _ => anyhow::bail!("unknown timeframe unit '{}'", unit),
        };
        let minutes = n
            .checked_mul(scale)
            .ok_or_else(|| anyhow::anyhow!("timeframe '{}' is too long", s))?;

        Self::from_minutes(minutes).ok_or_else(|| anyhow::anyhow!("timeframe must be positive"))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minutes % (60 * 24) == 0 {
            write!(f, "{}d", self.minutes / (60 * 24))
        } else if self.minutes % 60 == 0 {
            write!(f, "{}h", self.minutes / 60)
        } else {
            write!(f, "{}m", self.minutes)
        }
    }
}

impl<'de> Deserialize<'de> for Timeframe {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for Timeframe {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Time-ordered bars resampled to a timeframe, capped at `max_len`.
///
/// Minute bars are upserted into their bucket. For the one-minute timeframe a
/// repeated timestamp replaces the stored bar; for wider timeframes sub-bars
/// are merged into the bucket's OHLCV.
#[derive(Debug, Clone)]
pub struct BarSeries {
    timeframe: Timeframe,
    max_len: usize,
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(timeframe: Timeframe, max_len: usize) -> Self {
        Self {
            timeframe,
            max_len: max_len.max(1),
            bars: Vec::new(),
        }
    }

    /// Insert a minute bar. Returns false when the bar was rejected.
    pub fn push(&mut self, bar: Bar) -> bool {
        if ![bar.open, bar.high, bar.low, bar.close].iter().all(|v| v.is_finite()) {
            return false;
        }

        let bucket = self.timeframe.bucket_start(bar.timestamp);
        let mut bucketed = bar;
        bucketed.timestamp = bucket;

        match self.bars.binary_search_by_key(&bucket, |b| b.timestamp) {
            Ok(idx) => {
                if self.timeframe == Timeframe::ONE_MINUTE {
                    self.bars[idx] = bucketed;
                } else {
                    self.bars[idx].absorb(&bucketed);
                }
            }
            Err(idx) => {
                // Older than everything we kept and the window is full.
                if idx == 0 && self.bars.len() >= self.max_len {
                    return false;
                }
                self.bars.insert(idx, bucketed);
            }
        }

        if self.bars.len() > self.max_len {
            let excess = self.bars.len() - self.max_len;
            self.bars.drain(..excess);
        }
        true
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minute(m: u32, close: f64) -> Bar {
        let ts = Utc.with_ymd_and_hms(2025, 8, 29, 13, m, 0).unwrap();
        Bar::new(ts, close - 0.5, close + 1.0, close - 1.0, close, 100.0)
    }

    #[test]
    fn test_parse_timeframe() {
        assert_eq!("5m".parse::<Timeframe>().unwrap().minutes(), 5);
        assert_eq!("15min".parse::<Timeframe>().unwrap().minutes(), 15);
        assert_eq!("1h".parse::<Timeframe>().unwrap().minutes(), 60);
        assert_eq!("1d".parse::<Timeframe>().unwrap().to_string(), "1d");
        assert!("5x".parse::<Timeframe>().is_err());
        assert!("0m".parse::<Timeframe>().is_err());
        assert!("m".parse::<Timeframe>().is_err());

        assert!("4000000d".parse::<Timeframe>().is_err());
        assert!("80000000h".parse::<Timeframe>().is_err());
        assert_eq!("2982616d".parse::<Timeframe>().unwrap().minutes(), 2982616 * 1440);
    }

    #[test]
    fn test_minute_bars_merge_into_bucket() {
        let mut series = BarSeries::new("5m".parse().unwrap(), 100);

        assert!(series.push(minute(0, 10.0)));
        assert!(series.push(minute(1, 12.0)));
        assert!(series.push(minute(4, 11.0)));
        assert_eq!(series.bars().len(), 1);

        let bar = &series.bars()[0];
        assert_eq!(bar.open, 9.5);
        assert_eq!(bar.high, 13.0);
        assert_eq!(bar.low, 9.0);
        assert_eq!(bar.close, 11.0);
        assert_eq!(bar.volume, 300.0);

        assert!(series.push(minute(5, 20.0)));
        assert_eq!(series.bars().len(), 2);
    }

    #[test]
    fn test_one_minute_replaces_and_sorts() {
        let mut series = BarSeries::new(Timeframe::ONE_MINUTE, 100);
        series.push(minute(2, 10.0));
        series.push(minute(1, 9.0));
        series.push(minute(2, 15.0));

        let closes: Vec<f64> = series.bars().iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![9.0, 15.0]);
    }

    #[test]
    fn test_series_is_capped() {
        let mut series = BarSeries::new(Timeframe::ONE_MINUTE, 3);
        for m in 0..6 {
            series.push(minute(m, m as f64 + 1.0));
        }
        assert_eq!(series.bars().len(), 3);
        assert_eq!(series.bars()[0].close, 4.0);

        // Too old to fit in the full window.
        assert!(!series.push(minute(0, 99.0)));
    }

    #[test]
    fn test_rejects_non_finite() {
        let mut series = BarSeries::new(Timeframe::ONE_MINUTE, 3);
        let mut bar = minute(0, 1.0);
        bar.close = f64::NAN;
        assert!(!series.push(bar));
        assert!(series.bars().is_empty());
    }
}
