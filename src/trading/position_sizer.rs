//! Fixed-fractional position sizing and stop placement.

/// Smallest per-share risk used for sizing, so a stop a hair under entry
/// cannot produce an enormous share count.
const MIN_RISK_PER_SHARE: f64 = 0.01;

/// Shares to buy so that hitting `stop` loses `equity * risk_fraction`.
pub fn position_size(entry: f64, stop: f64, equity: f64, risk_fraction: f64) -> u64 {
    let risk_per_share = (entry - stop).max(MIN_RISK_PER_SHARE);
    let risk_dollars = (equity * risk_fraction).max(0.0);
    if !risk_dollars.is_finite() || !risk_per_share.is_finite() {
        return 0;
    }
    (risk_dollars / risk_per_share).floor() as u64
}

/// Stop implied by risking `risk_fraction` of the entry price.
pub fn risk_stop(entry: f64, risk_fraction: f64) -> f64 {
    entry * (1.0 - risk_fraction)
}

/// Tighter of the pattern stop and the risk-capped stop, so a wide pattern
/// never risks more than requested.
pub fn entry_stop(entry: f64, pattern_stop: f64, risk_fraction: f64) -> f64 {
    pattern_stop.max(risk_stop(entry, risk_fraction))
}

/// True once `price` has fallen `max_loss_fraction` below `entry`.
pub fn immediate_stop_hit(price: f64, entry: f64, max_loss_fraction: f64) -> bool {
    price <= entry * (1.0 - max_loss_fraction + 1e-12)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_size() {
        // $100 risk over $2/share
        assert_eq!(position_size(100.0, 98.0, 10_000.0, 0.01), 50);
        // Floored
        assert_eq!(position_size(100.0, 97.0, 10_000.0, 0.01), 33);
    }

    #[test]
    fn test_position_size_floors_tiny_risk() {
        // Per-share risk clamps to one cent.
        assert_eq!(position_size(100.0, 99.999, 1_000.0, 0.01), 1000);
        assert_eq!(position_size(100.0, 98.0, 10_000.0, 0.0), 0);
        assert_eq!(position_size(100.0, 98.0, 10_000.0, -0.5), 0);
    }

    #[test]
    fn test_entry_stop_takes_tighter() {
        // Pattern low far away: risk cap wins.
        assert!((entry_stop(100.0, 90.0, 0.02) - 98.0).abs() < 1e-9);
        // Pattern low close: pattern wins.
        assert_eq!(entry_stop(100.0, 99.0, 0.02), 99.0);
    }

    #[test]
    fn test_immediate_stop_hit() {
        assert!(immediate_stop_hit(98.0, 100.0, 0.02));
        assert!(immediate_stop_hit(97.0, 100.0, 0.02));
        assert!(!immediate_stop_hit(98.5, 100.0, 0.02));
    }
}
