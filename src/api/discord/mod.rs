//! Minimal Discord bot client: gateway for incoming messages, REST for replies.

mod gateway;
mod rest;

pub use gateway::{Gateway, GatewayEvent};
pub use rest::DiscordRest;

pub(crate) const API_BASE: &str = "https://discord.com/api/v10";
pub(crate) const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
