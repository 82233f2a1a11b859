//! Chat channel identifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Discord snowflake of a text channel. `0` is used for the local console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChannelId(pub u64);

impl ChannelId {
    pub const CONSOLE: ChannelId = ChannelId(0);

    pub fn is_set(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChannelId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ChannelId)
    }
}

// Discord sends snowflakes as strings; config files usually hold bare numbers.
impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(ChannelId(n)),
            Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl Serialize for ChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_string_and_number() {
        let a: ChannelId = serde_json::from_str("\"1411064822635696188\"").unwrap();
        let b: ChannelId = serde_json::from_str("1411064822635696188").unwrap();
        assert_eq!(a, b);
        assert!(a.is_set());
        assert!(!ChannelId::CONSOLE.is_set());
    }
}
