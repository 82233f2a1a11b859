//! Per-channel monitoring session state.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::America::New_York;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::trading::{ExitsConfig, RiskConfig, TradeParams};

use super::PaperPosition;

/// Exchange-local calendar day for a timestamp. `daily_R` resets on this.
pub fn trading_day(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&New_York).date_naive()
}

/// State of one channel's session. At most one symbol is monitored at a time.
#[derive(Debug, Clone)]
pub struct Session {
    /// Ticker being monitored; cleared by stop
    pub symbol: Option<String>,

    pub running: bool,

    /// Default fraction of equity risked per trade (`!risk`)
    pub risk_fraction: f64,

    /// Risk given on `!start SYMBOL RISK`; wins over `risk_fraction`
    pub start_risk_override: Option<f64>,

    /// Take-profit in R multiples (`!tp`), 0 = off
    pub take_profit_r: f64,

    /// Immediate loss cutoff below entry (`!sl`)
    pub stop_loss_fraction: f64,

    /// Set once `!sl` has been used; otherwise positions use their trade risk
    pub stop_loss_pinned: bool,

    /// Paper equity, moved by realised P&L
    pub equity: Decimal,

    /// Realised R for `trading_day`
    pub daily_r: f64,
    pub daily_pnl: Decimal,
    pub trades_today: u32,
    pub trading_day: NaiveDate,

    pub started_at: Option<DateTime<Utc>>,

    /// Snapshot of the monitor's open paper position
    pub position: Option<PaperPosition>,
}

impl Session {
    pub fn new(risk: &RiskConfig, exits: &ExitsConfig, today: NaiveDate) -> Self {
        Self {
            symbol: None,
            running: false,
            risk_fraction: risk.per_trade_r_pct,
            start_risk_override: None,
            take_profit_r: exits.take_profit_r,
            stop_loss_fraction: risk.max_intrabar_loss_pct,
            stop_loss_pinned: false,
            equity: risk.equity,
            daily_r: 0.0,
            daily_pnl: Decimal::ZERO,
            trades_today: 0,
            trading_day: today,
            started_at: None,
            position: None,
        }
    }

    /// Risk fraction the next entry will use.
    pub fn effective_risk(&self) -> f64 {
        self.start_risk_override.unwrap_or(self.risk_fraction)
    }

    /// Begin monitoring. Returns false (and changes nothing) if already running.
    pub fn start(&mut self, symbol: &str, risk_override: Option<f64>) -> bool {
        if self.running {
            return false;
        }
        self.symbol = Some(symbol.to_uppercase());
        self.start_risk_override = risk_override;
        self.running = true;
        self.started_at = Some(Utc::now());
        true
    }

    /// End monitoring. Returns whether a session was running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.running;
        self.running = false;
        self.symbol = None;
        self.started_at = None;
        self.position = None;
        was_running
    }

    pub fn set_stop_loss(&mut self, fraction: f64) {
        self.stop_loss_fraction = fraction;
        self.stop_loss_pinned = true;
    }

    /// Snapshot of what the engine needs for the next bar.
    pub fn trade_params(&self) -> TradeParams {
        TradeParams {
            risk_fraction: self.effective_risk(),
            take_profit_r: self.take_profit_r,
            fail_safe_override: self.stop_loss_pinned.then_some(self.stop_loss_fraction),
            equity: self.equity.to_f64().unwrap_or(0.0),
        }
    }

    /// Reset daily counters when the trading day changes. Replayed history
    /// can move the day backwards, which also resets.
    pub fn roll_day(&mut self, day: NaiveDate) {
        if day != self.trading_day {
            self.trading_day = day;
            self.daily_r = 0.0;
            self.daily_pnl = Decimal::ZERO;
            self.trades_today = 0;
        }
    }

    /// Account for a closed paper trade.
    pub fn record_close(&mut self, r_multiple: f64, pnl: Decimal, day: NaiveDate) {
        self.roll_day(day);
        self.equity += pnl;
        self.daily_r += r_multiple;
        self.daily_pnl += pnl;
        self.trades_today += 1;
    }

    /// Seed today's totals from the journal.
    pub fn restore_daily(&mut self, day: NaiveDate, daily_r: f64, daily_pnl: Decimal, trades: u32) {
        self.trading_day = day;
        self.daily_r = daily_r;
        self.daily_pnl = daily_pnl;
        self.trades_today = trades;
    }

    /// One-line summary for `!status`.
    pub fn status_line(&self) -> String {
        let tp = if self.take_profit_r > 0.0 {
            format!("{}R", self.take_profit_r)
        } else {
            "off".to_string()
        };
        let mut line = format!(
            "running={} symbol={} daily_R={:+.2} trades={} risk={:.2}% tp={} max_loss_cutoff={:.2}% equity=${:.2}",
            self.running,
            self.symbol.as_deref().unwrap_or("none"),
            self.daily_r,
            self.trades_today,
            self.effective_risk() * 100.0,
            tp,
            self.stop_loss_fraction * 100.0,
            self.equity,
        );
        if let Some(p) = &self.position {
            line.push_str(&format!(
                " position={}@{:.2} stop={:.2} fail_safe={:.2}",
                p.qty,
                p.entry,
                p.stop,
                p.fail_safe_price()
            ));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, d).unwrap()
    }

    fn session() -> Session {
        Session::new(&RiskConfig::default(), &ExitsConfig::default(), day(2))
    }

    #[test]
    fn test_start_status_stop() {
        let mut s = session();
        assert!(s.start("tqqq", None));
        assert!(s.status_line().starts_with("running=true symbol=TQQQ daily_R=+0.00"));

        assert!(!s.start("SPY", None));
        assert_eq!(s.symbol.as_deref(), Some("TQQQ"));

        assert!(s.stop());
        assert!(s.status_line().starts_with("running=false symbol=none"));
        assert!(!s.stop());
    }

    #[test]
    fn test_start_override_beats_default_risk() {
        let mut s = session();
        s.risk_fraction = 0.02;
        s.start("WMT", Some(0.032));
        assert_eq!(s.effective_risk(), 0.032);
        assert!(s.status_line().contains("risk=3.20%"));

        s.stop();
        s.start("WMT", None);
        assert_eq!(s.effective_risk(), 0.02);
    }

    #[test]
    fn test_fail_safe_override_only_when_pinned() {
        let mut s = session();
        assert_eq!(s.trade_params().fail_safe_override, None);
        s.set_stop_loss(0.05);
        assert_eq!(s.trade_params().fail_safe_override, Some(0.05));
    }

    #[test]
    fn test_daily_r_rolls_over() {
        let mut s = session();
        s.record_close(1.5, dec!(150), day(2));
        s.record_close(-1.0, dec!(-100), day(2));
        assert!((s.daily_r - 0.5).abs() < 1e-12);
        assert_eq!(s.trades_today, 2);
        assert_eq!(s.equity, dec!(10050));

        s.record_close(2.0, dec!(200), day(3));
        assert_eq!(s.daily_r, 2.0);
        assert_eq!(s.daily_pnl, dec!(200));
        assert_eq!(s.trades_today, 1);
        assert_eq!(s.equity, dec!(10250));

        // Replaying an older day resets too.
        s.record_close(-1.0, dec!(-100), day(1));
        assert_eq!(s.daily_r, -1.0);
        assert_eq!(s.trades_today, 1);
    }

    #[test]
    fn test_status_shows_open_position() {
        let mut s = session();
        s.start("TQQQ", None);
        let opened = Utc.with_ymd_and_hms(2025, 9, 2, 14, 0, 0).unwrap();
        s.position = Some(PaperPosition::new("TQQQ", 105.0, 104.0, 100, 0.02, opened));
        assert!(s.status_line().ends_with("position=100@105.00 stop=104.00 fail_safe=102.90"));

        s.stop();
        assert!(s.position.is_none());
    }

    #[test]
    fn test_trading_day_uses_new_york_date() {
        // 02:00 UTC is still the previous evening in New York.
        let ts = Utc.with_ymd_and_hms(2025, 9, 3, 2, 0, 0).unwrap();
        assert_eq!(trading_day(ts), day(2));
    }
}
