//! Simulated long position held by a monitoring session.

use chrono::{DateTime, Utc};

/// An open paper position.
#[derive(Debug, Clone)]
pub struct PaperPosition {
    /// Unique id carried into the journal when the position closes
    pub id: String,

    pub symbol: String,

    /// Fill price (close of the signal bar)
    pub entry: f64,

    /// Current structural stop; ratchets up, never down
    pub stop: f64,

    /// Stop at entry time. Defines one R.
    pub initial_stop: f64,

    /// Shares held
    pub qty: u64,

    /// Fraction below entry that triggers the immediate fail-safe exit
    pub fail_safe_fraction: f64,

    pub opened_at: DateTime<Utc>,
}

impl PaperPosition {
    pub fn new(
        symbol: &str,
        entry: f64,
        stop: f64,
        qty: u64,
        fail_safe_fraction: f64,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            entry,
            stop,
            initial_stop: stop,
            qty,
            fail_safe_fraction,
            opened_at,
        }
    }

    /// Dollar risk per share at entry.
    pub fn risk_per_share(&self) -> f64 {
        self.entry - self.initial_stop
    }

    /// Result of exiting at `price`, in multiples of initial risk.
    pub fn r_multiple(&self, price: f64) -> f64 {
        let risk = self.risk_per_share();
        if risk <= 0.0 {
            return 0.0;
        }
        (price - self.entry) / risk
    }

    /// Dollar P&L of exiting the whole position at `price`.
    pub fn pnl(&self, price: f64) -> f64 {
        (price - self.entry) * self.qty as f64
    }

    /// Price at which `take_profit_r` multiples of risk are realised.
    /// `None` when take profit is disabled.
    pub fn take_profit_target(&self, take_profit_r: f64) -> Option<f64> {
        (take_profit_r > 0.0).then(|| self.entry + take_profit_r * self.risk_per_share())
    }

    /// Price at or below which the fail-safe fires.
    pub fn fail_safe_price(&self) -> f64 {
        self.entry * (1.0 - self.fail_safe_fraction + 1e-12)
    }

    /// Move the stop up. Returns true if it moved.
    pub fn raise_stop(&mut self, candidate: f64) -> bool {
        if candidate.is_finite() && candidate > self.stop {
            self.stop = candidate;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position() -> PaperPosition {
        PaperPosition::new("TQQQ", 100.0, 98.0, 50, 0.01, Utc::now())
    }

    #[test]
    fn test_r_multiple_uses_initial_stop() {
        let mut pos = position();
        assert_eq!(pos.r_multiple(104.0), 2.0);
        assert_eq!(pos.r_multiple(98.0), -1.0);

        assert!(pos.raise_stop(99.5));
        assert_eq!(pos.r_multiple(104.0), 2.0);
        assert_eq!(pos.pnl(104.0), 200.0);
    }

    #[test]
    fn test_stop_never_lowers() {
        let mut pos = position();
        assert!(!pos.raise_stop(97.0));
        assert!(!pos.raise_stop(f64::NAN));
        assert_eq!(pos.stop, 98.0);
    }

    #[test]
    fn test_take_profit_target() {
        let pos = position();
        assert_eq!(pos.take_profit_target(0.0), None);
        assert_eq!(pos.take_profit_target(1.5), Some(103.0));
    }
}
