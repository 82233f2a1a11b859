//! Replays recorded Alpaca bar frames from a JSON-lines file.
//!
//! Each line is one frame as the stream sends it (an array) or a single bar
//! object. Lines that are blank, start with `#`, or fail to decode are
//! skipped.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::Bar;

use super::alpaca::{decode_frame, StreamMessage};
use super::{BarProvider, BAR_BUFFER};

/// Bar provider reading a file instead of the network.
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    path: PathBuf,
    pace: Duration,
}

impl ReplayFeed {
    pub fn new(path: impl Into<PathBuf>, pace: Duration) -> Self {
        Self {
            path: path.into(),
            pace,
        }
    }

    async fn run(self, symbol: String, tx: mpsc::Sender<Bar>) -> Result<usize> {
        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open replay file {}", self.path.display()))?;
        pump(BufReader::new(file), &symbol, self.pace, &tx).await
    }
}

/// Send every bar for `symbol` read from `reader`. Returns the number sent.
async fn pump<R>(reader: R, symbol: &str, pace: Duration, tx: &mpsc::Sender<Bar>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sent = 0;

    while let Some(line) = lines.next_line().await? {
        for bar in parse_line(&line, symbol) {
            if tx.send(bar).await.is_err() {
                return Ok(sent);
            }
            sent += 1;
            if !pace.is_zero() {
                tokio::time::sleep(pace).await;
            }
        }
    }

    Ok(sent)
}

impl BarProvider for ReplayFeed {
    fn subscribe(&self, symbol: &str) -> mpsc::Receiver<Bar> {
        let (tx, rx) = mpsc::channel(BAR_BUFFER);
        let feed = self.clone();
        let symbol = symbol.to_uppercase();

        tokio::spawn(async move {
            let path = feed.path.clone();
            match feed.run(symbol.clone(), tx).await {
                Ok(sent) => info!(symbol = %symbol, bars = sent, path = %path.display(), "Replay finished"),
                Err(e) => warn!(symbol = %symbol, error = %e, "Replay failed"),
            }
        });
        rx
    }
}

/// Bars for `symbol` found on one line.
fn parse_line(line: &str, symbol: &str) -> Vec<Bar> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Vec::new();
    }

    match decode_frame(line) {
        Ok(messages) => messages
            .into_iter()
            .filter_map(|m| match m {
                StreamMessage::Bar(bar) if bar.is_for(symbol) => Some(bar.to_bar()),
                _ => None,
            })
            .collect(),
        Err(e) => {
            debug!(error = %e, "Skipping replay line");
            Vec::new()
        }
    }
}
