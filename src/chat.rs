//! Outbound chat: where replies and trade alerts are written.

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use crate::models::ChannelId;

/// Destination for bot messages.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send(&self, channel: ChannelId, text: &str) -> Result<()>;
}

/// Writes messages to stdout, for local runs without Discord.
pub struct ConsoleSink {
    out: Mutex<Stdout>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatSink for ConsoleSink {
    async fn send(&self, channel: ChannelId, text: &str) -> Result<()> {
        let line = if channel.is_set() {
            format!("[#{}] {}\n", channel, text)
        } else {
            format!("{}\n", text)
        };

        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}
