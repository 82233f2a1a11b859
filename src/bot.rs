//! Bot controller: chat commands, per-channel sessions, and monitor tasks.
//!
//! Handles:
//! - Parsing and dispatching `!` commands
//! - Spawning one bar-monitor task per running channel
//! - Turning strategy events into chat alerts and journal entries
//! - Restoring the day's realised R from the journal

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::discord::{Gateway, GatewayEvent};
use crate::api::BarProvider;
use crate::chat::ChatSink;
use crate::commands::{Command, HELP_TEXT};
use crate::config::AppConfig;
use crate::db::Journal;
use crate::models::{trading_day, Bar, BarSeries, ChannelId, ClosedTrade, ExitReason, PaperPosition, Session};
use crate::trading::{ExitFlip, ExitPattern, MomentumStrategy, TradeEvent, TradeParams};

/// A channel's session and the task monitoring it.
struct Slot {
    session: Arc<RwLock<Session>>,
    monitor: Option<JoinHandle<()>>,
}

/// Owns every channel's session.
pub struct Controller {
    config: Arc<AppConfig>,
    provider: Arc<dyn BarProvider>,
    sink: Arc<dyn ChatSink>,
    journal: Option<Journal>,
    slots: Mutex<HashMap<ChannelId, Slot>>,
}

impl Controller {
    pub fn new(
        config: AppConfig,
        provider: Arc<dyn BarProvider>,
        sink: Arc<dyn ChatSink>,
        journal: Option<Journal>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            sink,
            journal,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one chat line. Returns the reply, or `None` when the line is
    /// not a command.
    pub async fn handle_message(&self, channel: ChannelId, text: &str) -> Option<String> {
        let command = match Command::parse(text)? {
            Ok(command) => command,
            Err(e) => return Some(e.to_string()),
        };
        debug!(channel = %channel, command = ?command, "Command received");
        Some(self.execute(channel, command).await)
    }

    /// Handle a line and post the reply to the channel it came from.
    pub async fn on_message(&self, channel: ChannelId, text: &str) {
        if let Some(reply) = self.handle_message(channel, text).await {
            if let Err(e) = self.sink.send(channel, &reply).await {
                warn!(channel = %channel, error = %e, "Failed to send reply");
            }
        }
    }

    async fn execute(&self, channel: ChannelId, command: Command) -> String {
        let mut slots = self.slots.lock().await;
        let slot = self.slot(&mut slots, channel).await;

        // Without bars nothing else moves an idle session onto a new day.
        if matches!(command, Command::Status | Command::Start { .. }) {
            let mut session = slot.session.write().await;
            if !session.running {
                session.roll_day(trading_day(Utc::now()));
            }
        }

        match command {
            Command::Start { symbol, risk } => self.start(channel, slot, &symbol, risk).await,

            Command::Stop => {
                cancel(slot.monitor.take()).await;
                if slot.session.write().await.stop() {
                    info!(channel = %channel, "Session stopped");
                    "🛑 Stopped.".to_string()
                } else {
                    "Nothing to stop.".to_string()
                }
            }

            Command::Status => slot.session.read().await.status_line(),

            Command::Risk(fraction) => {
                let mut session = slot.session.write().await;
                session.risk_fraction = fraction;
                session.start_risk_override = None;
                format!("Risk per trade set to {:.2}%.", fraction * 100.0)
            }

            Command::TakeProfit(multiple) => {
                slot.session.write().await.take_profit_r = multiple;
                if multiple > 0.0 {
                    format!("Take-profit set to {}R.", multiple)
                } else {
                    "Take-profit disabled.".to_string()
                }
            }

            Command::StopLoss(fraction) => {
                slot.session.write().await.set_stop_loss(fraction);
                format!("Immediate loss cutoff set to {:.1}%.", fraction * 100.0)
            }

            Command::Help => HELP_TEXT.to_string(),
        }
    }

    async fn start(&self, channel: ChannelId, slot: &mut Slot, symbol: &str, risk: Option<f64>) -> String {
        let effective_risk = {
            let mut session = slot.session.write().await;
            if !session.start(symbol, risk) {
                return "Already running. Use !stop first.".to_string();
            }
            session.effective_risk()
        };

        // A monitor whose feed already ended may still be parked here.
        cancel(slot.monitor.take()).await;

        let monitor = Monitor {
            channel,
            alert: self.alert_channel(channel),
            symbol: symbol.to_string(),
            session: Arc::clone(&slot.session),
            sink: Arc::clone(&self.sink),
            journal: self.journal.clone(),
            series: BarSeries::new(self.config.timeframe, self.config.alpaca.max_bars),
            strategy: MomentumStrategy::new(symbol, self.config.momentum.clone()),
            trail_span: self.config.momentum.trail_ema,
        };
        let bars = self.provider.subscribe(symbol);
        slot.monitor = Some(tokio::spawn(monitor.run(bars)));

        info!(channel = %channel, symbol = %symbol, risk = effective_risk, "Session started");
        format!("Starting {} with per-trade risk {:.2}%.", symbol, effective_risk * 100.0)
    }

    /// The channel's slot, created (and seeded from the journal) on first use.
    async fn slot<'a>(&self, slots: &'a mut HashMap<ChannelId, Slot>, channel: ChannelId) -> &'a mut Slot {
        match slots.entry(channel) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let session = self.new_session(channel).await;
                entry.insert(Slot {
                    session: Arc::new(RwLock::new(session)),
                    monitor: None,
                })
            }
        }
    }

    async fn new_session(&self, channel: ChannelId) -> Session {
        let today = trading_day(Utc::now());
        let mut session = Session::new(&self.config.risk, &self.config.exits, today);

        if let Some(journal) = &self.journal {
            match journal.daily_summary(channel, today).await {
                Ok(day) => session.restore_daily(today, day.r_multiple, day.pnl, day.trades),
                Err(e) => warn!(channel = %channel, error = %e, "Could not restore daily totals"),
            }
            match journal.realized_pnl(channel).await {
                Ok(pnl) => session.equity += pnl,
                Err(e) => warn!(channel = %channel, error = %e, "Could not restore paper equity"),
            }
        }

        session
    }

    fn alert_channel(&self, invoking: ChannelId) -> ChannelId {
        if self.config.discord_channel_id.is_set() {
            self.config.discord_channel_id
        } else {
            invoking
        }
    }

    /// Snapshot of a channel's session, if it has one.
    pub async fn session(&self, channel: ChannelId) -> Option<Session> {
        let slots = self.slots.lock().await;
        match slots.get(&channel) {
            Some(slot) => Some(slot.session.read().await.clone()),
            None => None,
        }
    }

    /// Post the online notice to the configured alert channel.
    pub async fn announce_online(&self) {
        let channel = self.config.discord_channel_id;
        if !channel.is_set() {
            return;
        }
        let text = format!("✅ Momentum bot online (TF={}).", self.config.timeframe);
        if let Err(e) = self.sink.send(channel, &text).await {
            warn!(
                channel = %channel,
                error = %e,
                "Could not post to alert channel; alerts will fail until it is reachable"
            );
        }
    }

    /// Stop every session and its monitor.
    pub async fn stop_all(&self) {
        let mut slots = self.slots.lock().await;
        for (channel, slot) in slots.iter_mut() {
            cancel(slot.monitor.take()).await;
            if slot.session.write().await.stop() {
                info!(channel = %channel, "Session stopped on shutdown");
            }
        }
    }

    /// Wait until every monitor has finished on its own.
    pub async fn wait_for_monitors(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut slots = self.slots.lock().await;
            slots.values_mut().filter_map(|slot| slot.monitor.take()).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(error = %e, "Monitor task panicked");
                }
            }
        }
    }

    /// Serve Discord until Ctrl-C or a fatal gateway error.
    ///
    /// Messages are handled one at a time so a channel's commands apply in
    /// the order they were sent.
    pub async fn run_discord(self: Arc<Self>, gateway: Gateway) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(64);
        let mut gateway_task = tokio::spawn(gateway.run(tx));

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break Ok(());
                }
                event = rx.recv() => match event {
                    Some(GatewayEvent::Ready { username }) => {
                        info!(user = %username, "Connected to Discord");
                        self.announce_online().await;
                    }
                    Some(GatewayEvent::Message(msg)) => {
                        debug!(channel = %msg.channel_id, author = %msg.author, "Message");
                        self.on_message(msg.channel_id, &msg.content).await;
                    }
                    None => {
                        break match (&mut gateway_task).await {
                            Ok(Ok(())) => Ok(()),
                            Ok(Err(e)) => Err(anyhow::Error::new(e).context("Discord gateway failed")),
                            Err(e) => Err(e.into()),
                        };
                    }
                },
            }
        };

        gateway_task.abort();
        self.stop_all().await;
        info!("Bot shutdown complete");
        result
    }

    /// Read commands from stdin, printing replies and alerts through the sink.
    ///
    /// When input ends, running sessions are allowed to finish (a replay runs
    /// to the end of its file).
    pub async fn run_console(self: Arc<Self>) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.stop_all().await;
                    return Ok(());
                }
                line = lines.next_line() => match line? {
                    Some(line) => self.on_message(ChannelId::CONSOLE, &line).await,
                    None => break,
                },
            }
        }

        info!("Input closed, waiting for running sessions");
        tokio::select! {
            _ = &mut shutdown => info!("Shutdown signal received"),
            _ = self.wait_for_monitors() => {}
        }
        self.stop_all().await;
        Ok(())
    }
}

/// Abort a monitor and wait until it is gone.
async fn cancel(handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        handle.abort();
        let _ = handle.await;
    }
}

// =============================================================================
// Monitor task
// =============================================================================

/// Feeds one symbol's bars through the strategy for one session.
struct Monitor {
    channel: ChannelId,
    alert: ChannelId,
    symbol: String,
    session: Arc<RwLock<Session>>,
    sink: Arc<dyn ChatSink>,
    journal: Option<Journal>,
    series: BarSeries,
    strategy: MomentumStrategy,
    trail_span: usize,
}

impl Monitor {
    async fn run(mut self, mut bars: mpsc::Receiver<Bar>) {
        self.say(&format!(
            "🔎 Momentum mode for **{}** on {}.",
            self.symbol,
            self.series.timeframe()
        ))
        .await;

        while let Some(bar) = bars.recv().await {
            if !self.on_bar(bar).await {
                return;
            }
        }

        warn!(channel = %self.channel, symbol = %self.symbol, "Market data feed ended");
        if self.session.write().await.stop() {
            self.say(&format!(
                "⚠️ Market data feed for **{}** ended. Session stopped.",
                self.symbol
            ))
            .await;
        }
    }

    /// Returns false once the session is no longer running.
    async fn on_bar(&mut self, bar: Bar) -> bool {
        let day = trading_day(bar.timestamp);
        if !self.series.push(bar) {
            debug!(symbol = %self.symbol, "Bar rejected");
            return true;
        }

        let params = {
            let mut session = self.session.write().await;
            if !session.running {
                return false;
            }
            session.roll_day(day);
            session.trade_params()
        };

        let events = self.strategy.on_bars(self.series.bars(), &params);
        for event in events {
            let text = self.describe(event, &params).await;
            self.say(&text).await;
        }

        self.session.write().await.position = self.strategy.position().cloned();
        true
    }

    async fn describe(&self, event: TradeEvent, params: &TradeParams) -> String {
        match event {
            TradeEvent::Entered {
                position,
                pattern,
                pattern_stop,
                risk_stop,
                risk_fraction,
            } => {
                info!(
                    symbol = %self.symbol,
                    entry = position.entry,
                    stop = position.stop,
                    qty = position.qty,
                    pattern = ?pattern,
                    "Paper entry"
                );
                format!(
                    "✅ **ENTER** {} @ {:.2} | stop {:.2} (pattern low {:.2}, risk cap {:.2}) | qty {} | risk {:.2}%",
                    self.symbol,
                    position.entry,
                    position.stop,
                    pattern_stop,
                    risk_stop,
                    position.qty,
                    risk_fraction * 100.0
                )
            }

            TradeEvent::Exited {
                position,
                reason,
                price,
                at,
            } => self.close(position, reason, price, at, params).await,

            TradeEvent::MomentumWeakening(flip) => {
                let why = match flip {
                    ExitFlip::MacdCrossDown => "MACD↓ & CCI below threshold",
                    ExitFlip::Pattern(ExitPattern::ShootingStar) => "shooting star",
                    ExitFlip::Pattern(ExitPattern::BearishEngulfing) => "bearish engulfing",
                };
                format!("🟠 Momentum weakening ({}), **consider exit**.", why)
            }

            TradeEvent::StopRaised { stop } => {
                format!("🔧 **Raise stop** to {:.2} (EMA{} trail).", stop, self.trail_span)
            }
        }
    }

    /// Book a closed position and build its alert.
    async fn close(
        &self,
        position: PaperPosition,
        reason: ExitReason,
        price: f64,
        at: DateTime<Utc>,
        params: &TradeParams,
    ) -> String {
        let r_multiple = position.r_multiple(price);
        let pnl = position.pnl(price);
        let pnl_usd = Decimal::try_from(pnl).unwrap_or(Decimal::ZERO).round_dp(2);
        let day = trading_day(at);

        let daily_r = {
            let mut session = self.session.write().await;
            session.record_close(r_multiple, pnl_usd, day);
            session.daily_r
        };

        info!(
            symbol = %self.symbol,
            reason = reason.as_str(),
            price,
            r_multiple,
            pnl = %pnl_usd,
            daily_r,
            "Paper exit"
        );

        if let Some(journal) = &self.journal {
            let trade = ClosedTrade {
                id: position.id.clone(),
                channel: self.channel,
                symbol: self.symbol.clone(),
                qty: position.qty,
                entry_price: position.entry,
                exit_price: price,
                initial_stop: position.initial_stop,
                r_multiple,
                pnl,
                exit_reason: reason,
                trading_day: day,
                opened_at: position.opened_at,
                closed_at: at,
            };
            if let Err(e) = journal.record_trade(&trade).await {
                error!(symbol = %self.symbol, error = %e, "Failed to journal paper trade");
            }
        }

        let head = match reason {
            ExitReason::FailSafe => format!(
                "🛑 **EXIT** immediate loss {:.1}% (fail-safe) @ {:.2}",
                position.fail_safe_fraction * 100.0,
                price
            ),
            ExitReason::Stop => format!("🛑 **EXIT** at stop {:.2}", price),
            ExitReason::TakeProfit => format!("🏁 **EXIT** take-profit {:.2} ({}R)", price, params.take_profit_r),
        };
        format!("{} | {:+.2}R | P&L ${:.2} | day {:+.2}R", head, r_multiple, pnl_usd, daily_r)
    }

    async fn say(&self, text: &str) {
        if let Err(e) = self.sink.send(self.alert, text).await {
            warn!(channel = %self.alert, error = %e, "Failed to send alert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timeframe;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, TimeZone};
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        messages: StdMutex<Vec<(ChannelId, String)>>,
    }

    impl RecordingSink {
        fn messages(&self) -> Vec<(ChannelId, String)> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatSink for RecordingSink {
        async fn send(&self, channel: ChannelId, text: &str) -> Result<()> {
            self.messages.lock().unwrap().push((channel, text.to_string()));
            Ok(())
        }
    }

    /// Never sends; holds the feed open until the monitor lets go.
    struct IdleFeed;

    impl BarProvider for IdleFeed {
        fn subscribe(&self, _symbol: &str) -> mpsc::Receiver<Bar> {
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(async move { tx.closed().await });
            rx
        }
    }

    /// Sends a fixed list of bars, then ends.
    struct ScriptedFeed {
        bars: Vec<Bar>,
    }

    impl BarProvider for ScriptedFeed {
        fn subscribe(&self, _symbol: &str) -> mpsc::Receiver<Bar> {
            let (tx, rx) = mpsc::channel(self.bars.len().max(1));
            let bars = self.bars.clone();
            tokio::spawn(async move {
                for bar in bars {
                    if tx.send(bar).await.is_err() {
                        return;
                    }
                }
            });
            rx
        }
    }

    fn t(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 2, 13, 30, 0).unwrap() + Duration::minutes(i)
    }

    /// Uptrend, doji at 104.0-104.6, breakout to 105, then a bar through the 104 stop.
    fn doji_breakout_then_stop() -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..40)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.1;
                Bar::new(t(i), base, base + 0.15, base - 0.05, base + 0.1, 1000.0)
            })
            .collect();
        bars.push(Bar::new(t(40), 104.3, 104.6, 104.0, 104.32, 1000.0));
        bars.push(Bar::new(t(41), 104.4, 105.2, 104.35, 105.0, 5000.0));
        bars.push(Bar::new(t(42), 104.8, 104.9, 103.5, 104.2, 1000.0));
        bars
    }

    fn one_minute_config() -> AppConfig {
        AppConfig {
            timeframe: Timeframe::ONE_MINUTE,
            ..Default::default()
        }
    }

    fn controller(
        config: AppConfig,
        provider: impl BarProvider + 'static,
        journal: Option<Journal>,
    ) -> (Controller, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let controller = Controller::new(config, Arc::new(provider), sink.clone(), journal);
        (controller, sink)
    }

    async fn reply(controller: &Controller, channel: u64, text: &str) -> String {
        controller
            .handle_message(ChannelId(channel), text)
            .await
            .expect("expected a reply")
    }

    #[tokio::test]
    async fn test_start_status_stop() {
        let (bot, _sink) = controller(AppConfig::default(), IdleFeed, None);

        assert_eq!(reply(&bot, 1, "!start TQQQ").await, "Starting TQQQ with per-trade risk 1.00%.");
        assert!(reply(&bot, 1, "!status").await.starts_with("running=true symbol=TQQQ"));

        assert_eq!(reply(&bot, 1, "!start SPY").await, "Already running. Use !stop first.");
        assert!(reply(&bot, 1, "!status").await.starts_with("running=true symbol=TQQQ"));

        // Other channels have their own session.
        assert!(reply(&bot, 2, "!status").await.starts_with("running=false symbol=none"));

        assert_eq!(reply(&bot, 1, "!stop").await, "🛑 Stopped.");
        assert!(reply(&bot, 1, "!status").await.starts_with("running=false symbol=none"));
        assert_eq!(reply(&bot, 1, "!stop").await, "Nothing to stop.");
    }

    #[tokio::test]
    async fn test_setters_show_in_status() {
        let (bot, _sink) = controller(AppConfig::default(), IdleFeed, None);

        assert_eq!(reply(&bot, 1, "!risk 2%").await, "Risk per trade set to 2.00%.");
        assert_eq!(reply(&bot, 1, "!tp 2").await, "Take-profit set to 2R.");
        assert_eq!(reply(&bot, 1, "!sl 3").await, "Immediate loss cutoff set to 3.0%.");

        let status = reply(&bot, 1, "!status").await;
        assert!(status.contains("risk=2.00% tp=2R max_loss_cutoff=3.00%"), "{}", status);

        assert_eq!(reply(&bot, 1, "!tp 0").await, "Take-profit disabled.");
        assert!(reply(&bot, 1, "!status").await.contains("tp=off"));
    }

    #[tokio::test]
    async fn test_risk_replaces_start_override() {
        let (bot, _sink) = controller(AppConfig::default(), IdleFeed, None);

        assert_eq!(reply(&bot, 1, "!start WMT 3.2%").await, "Starting WMT with per-trade risk 3.20%.");
        assert!(reply(&bot, 1, "!status").await.contains("risk=3.20%"));

        reply(&bot, 1, "!risk 1.5").await;
        assert!(reply(&bot, 1, "!status").await.contains("risk=1.50%"));
    }

    #[tokio::test]
    async fn test_non_commands_and_usage() {
        let (bot, _sink) = controller(AppConfig::default(), IdleFeed, None);

        assert_eq!(bot.handle_message(ChannelId(1), "good morning").await, None);
        assert_eq!(bot.handle_message(ChannelId(1), "!moon").await, None);
        assert_eq!(reply(&bot, 1, "!start").await, "Usage: `!start SYMBOL [RISK]`");
        assert_eq!(reply(&bot, 1, "!help").await, HELP_TEXT);
        assert!(bot.session(ChannelId(1)).await.is_some_and(|s| !s.running));
    }

    #[tokio::test]
    async fn test_paper_trade_round_trip() {
        let journal = Journal::in_memory().await.unwrap();
        let feed = ScriptedFeed {
            bars: doji_breakout_then_stop(),
        };
        let (bot, sink) = controller(one_minute_config(), feed, Some(journal.clone()));

        reply(&bot, 42, "!start TQQQ").await;
        bot.wait_for_monitors().await;

        let messages = sink.messages();
        assert!(messages.iter().all(|(channel, _)| *channel == ChannelId(42)));
        let texts: Vec<&str> = messages.iter().map(|(_, text)| text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "🔎 Momentum mode for **TQQQ** on 1m.",
                "✅ **ENTER** TQQQ @ 105.00 | stop 104.00 (pattern low 104.00, risk cap 103.95) | qty 100 | risk 1.00%",
                "🛑 **EXIT** at stop 104.00 | -1.00R | P&L $-100.00 | day -1.00R",
                "⚠️ Market data feed for **TQQQ** ended. Session stopped.",
            ]
        );

        let session = bot.session(ChannelId(42)).await.unwrap();
        assert!(!session.running);
        assert_eq!(session.daily_r, -1.0);
        assert_eq!(session.trades_today, 1);
        assert_eq!(session.equity, dec!(9900));
        assert!(session.position.is_none());

        let day = NaiveDate::from_ymd_opt(2025, 9, 2).unwrap();
        let summary = journal.daily_summary(ChannelId(42), day).await.unwrap();
        assert_eq!(summary.trades, 1);
        assert_eq!(summary.r_multiple, -1.0);
        assert_eq!(summary.pnl, dec!(-100));
    }

    #[tokio::test]
    async fn test_idle_session_rolls_to_today() {
        let feed = ScriptedFeed {
            bars: doji_breakout_then_stop(),
        };
        let (bot, _sink) = controller(one_minute_config(), feed, None);

        reply(&bot, 42, "!start TQQQ").await;
        bot.wait_for_monitors().await;
        let session = bot.session(ChannelId(42)).await.unwrap();
        assert_eq!(session.daily_r, -1.0);
        assert_eq!(session.trading_day, NaiveDate::from_ymd_opt(2025, 9, 2).unwrap());

        // The replayed day is long gone; its loss stays in equity only.
        let status = reply(&bot, 42, "!status").await;
        assert!(status.contains("daily_R=+0.00 trades=0"), "{}", status);
        assert!(status.contains("equity=$9900.00"), "{}", status);
        assert_eq!(bot.session(ChannelId(42)).await.unwrap().trading_day, trading_day(Utc::now()));
    }

    #[tokio::test]
    async fn test_alerts_go_to_configured_channel() {
        let config = AppConfig {
            discord_channel_id: ChannelId(7),
            ..Default::default()
        };
        let (bot, sink) = controller(config, ScriptedFeed { bars: Vec::new() }, None);

        bot.announce_online().await;
        reply(&bot, 42, "!start TQQQ").await;
        bot.wait_for_monitors().await;

        let messages = sink.messages();
        assert_eq!(messages[0], (ChannelId(7), "✅ Momentum bot online (TF=5m).".to_string()));
        assert!(messages.iter().all(|(channel, _)| *channel == ChannelId(7)));
        assert!(messages.iter().any(|(_, text)| text.starts_with("🔎 Momentum mode for **TQQQ**")));
    }

    #[tokio::test]
    async fn test_daily_totals_restored_from_journal() {
        let journal = Journal::in_memory().await.unwrap();
        let now = Utc::now();
        journal
            .record_trade(&ClosedTrade {
                id: "earlier".to_string(),
                channel: ChannelId(5),
                symbol: "TQQQ".to_string(),
                qty: 100,
                entry_price: 50.0,
                exit_price: 52.0,
                initial_stop: 49.0,
                r_multiple: 2.0,
                pnl: 200.0,
                exit_reason: ExitReason::TakeProfit,
                trading_day: trading_day(now),
                opened_at: now,
                closed_at: now,
            })
            .await
            .unwrap();

        let (bot, _sink) = controller(AppConfig::default(), IdleFeed, Some(journal));
        let status = reply(&bot, 5, "!status").await;
        assert!(status.contains("daily_R=+2.00 trades=1"), "{}", status);
        assert!(status.contains("equity=$10200.00"), "{}", status);

        // Other channels start clean.
        assert!(reply(&bot, 6, "!status").await.contains("daily_R=+0.00 trades=0"));
    }

    #[tokio::test]
    async fn test_stop_all_ends_sessions() {
        let (bot, _sink) = controller(AppConfig::default(), IdleFeed, None);
        reply(&bot, 1, "!start TQQQ").await;
        reply(&bot, 2, "!start SPY").await;

        bot.stop_all().await;
        assert!(!bot.session(ChannelId(1)).await.unwrap().running);
        assert!(!bot.session(ChannelId(2)).await.unwrap().running);
    }
}
