//! Application configuration loaded from `config.yaml`.
//!
//! Every key is optional. Secrets (Discord token, Alpaca keys) never live
//! here; they come from the environment or `.env`.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::commands::{RISK_MAX, RISK_MIN, STOP_LOSS_MAX};
use crate::models::{ChannelId, Timeframe};
use crate::trading::{ExitsConfig, MomentumConfig, RiskConfig};

/// Where bars come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Alpaca market-data websocket
    #[default]
    AlpacaWs,
    /// Recorded bars replayed from a JSON-lines file
    Replay,
}

/// Top-level configuration mapping the YAML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: Provider,

    /// Channel that receives trade alerts. 0 = reply where `!start` was issued.
    pub discord_channel_id: ChannelId,

    /// Bar size the strategy runs on
    pub timeframe: Timeframe,

    pub risk: RiskConfig,
    pub exits: ExitsConfig,
    pub momentum: MomentumConfig,
    pub alpaca: AlpacaConfig,
    pub replay: ReplayConfig,
    pub journal: JournalConfig,
}

/// Alpaca stream settings (`alpaca:`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlpacaConfig {
    /// `iex` (free) or `sip`
    pub feed: String,

    /// Overrides the stream URL derived from `feed`
    pub stream_url: Option<String>,

    /// Bars kept per symbol
    pub max_bars: usize,
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            feed: "iex".to_string(),
            stream_url: None,
            max_bars: 4000,
        }
    }
}

impl AlpacaConfig {
    pub fn url(&self) -> String {
        self.stream_url
            .clone()
            .unwrap_or_else(|| format!("wss://stream.data.alpaca.markets/v2/{}", self.feed))
    }
}

/// Replay provider settings (`replay:`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// JSON-lines file of Alpaca bar messages
    pub path: Option<PathBuf>,

    /// Delay between bars; 0 replays as fast as possible
    pub pace_ms: u64,
}

/// Trade journal settings (`journal:`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub enabled: bool,
    pub database: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: "sqlite:./daytradebot.db?mode=rwc".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        // An empty file parses as null.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let risk = self.risk.per_trade_r_pct;
        ensure!(
            (RISK_MIN..=RISK_MAX).contains(&risk),
            "risk.per_trade_r_pct must be within [{}, {}], got {}",
            RISK_MIN,
            RISK_MAX,
            risk
        );

        let cutoff = self.risk.max_intrabar_loss_pct;
        ensure!(
            (RISK_MIN..=STOP_LOSS_MAX).contains(&cutoff),
            "risk.max_intrabar_loss_pct must be within [{}, {}], got {}",
            RISK_MIN,
            STOP_LOSS_MAX,
            cutoff
        );

        ensure!(
            self.exits.take_profit_r.is_finite() && self.exits.take_profit_r >= 0.0,
            "exits.take_profit_R must be >= 0"
        );

        let m = &self.momentum;
        ensure!(
            m.macd_fast > 0 && m.macd_fast < m.macd_slow && m.macd_signal > 0,
            "momentum: need 0 < macd_fast < macd_slow and macd_signal > 0"
        );
        ensure!(m.cci_len > 0 && m.trail_ema > 0, "momentum: cci_len and trail_ema must be > 0");
        ensure!(!m.entry_patterns.is_empty(), "momentum.entry_patterns is empty");

        ensure!(
            self.alpaca.max_bars >= m.min_bars.max(2),
            "alpaca.max_bars ({}) must cover momentum.min_bars ({})",
            self.alpaca.max_bars,
            m.min_bars
        );

        if self.provider == Provider::Replay {
            ensure!(self.replay.path.is_some(), "provider is replay but replay.path is not set");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::EntryPattern;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"
provider: alpaca_ws
discord_channel_id: 123456789012345678
timeframe: 5m
risk:
  equity: 25000
  per_trade_r_pct: 0.02
  max_intrabar_loss_pct: 0.03
exits:
  take_profit_R: 2.0
momentum:
  macd_fast: 12
  macd_slow: 26
  macd_signal: 9
  cci_len: 20
  doji_body_pct: 0.1
  cci_entry: 0
  cci_exit: 0
  confirm_break_high: false
  entry_patterns: [doji, bullish_engulfing]
alpaca:
  feed: sip
"#;

    #[test]
    fn test_sample_config() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.provider, Provider::AlpacaWs);
        assert_eq!(config.discord_channel_id, ChannelId(123456789012345678));
        assert_eq!(config.timeframe.minutes(), 5);
        assert_eq!(config.risk.equity, dec!(25000));
        assert_eq!(config.exits.take_profit_r, 2.0);
        assert_eq!(config.momentum.cci_len, 20);
        assert!(!config.momentum.confirm_break_high);
        assert_eq!(
            config.momentum.entry_patterns,
            vec![EntryPattern::Doji, EntryPattern::BullishEngulfing]
        );
        assert_eq!(config.alpaca.url(), "wss://stream.data.alpaca.markets/v2/sip");
        assert_eq!(config.alpaca.max_bars, 4000);
        assert!(config.journal.enabled);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = AppConfig::from_yaml("").unwrap();
        assert!(!config.discord_channel_id.is_set());
        assert_eq!(config.risk.per_trade_r_pct, 0.01);
        assert_eq!(config.alpaca.url(), "wss://stream.data.alpaca.markets/v2/iex");
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(AppConfig::from_yaml("risk:\n  per_trade_r_pct: 0.5\n").is_err());
        assert!(AppConfig::from_yaml("exits:\n  take_profit_R: -1\n").is_err());
        assert!(AppConfig::from_yaml("momentum:\n  macd_fast: 30\n").is_err());
        assert!(AppConfig::from_yaml("provider: replay\n").is_err());
        assert!(AppConfig::from_yaml("timeframe: 7s\n").is_err());
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/daytradebot.yaml")).await.unwrap();
        assert_eq!(config.provider, Provider::AlpacaWs);
    }
}
