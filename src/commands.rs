//! Chat command parsing.
//!
//! - `!start SYMBOL [RISK]` - begin monitoring
//! - `!stop` - end monitoring
//! - `!status` - session summary
//! - `!risk X` - default per-trade risk
//! - `!tp X` - take-profit in R multiples (0 = off)
//! - `!sl X` - immediate loss cutoff
//! - `!help` - command list

use thiserror::Error;

pub const PREFIX: char = '!';

/// Bounds for per-trade risk.
pub const RISK_MIN: f64 = 0.0001;
pub const RISK_MAX: f64 = 0.20;

/// Bounds for the fail-safe loss cutoff.
pub const STOP_LOSS_MAX: f64 = 0.50;

pub const HELP_TEXT: &str = "\
Commands:
`!start SYMBOL [RISK]` start monitoring (RISK as 3.2%, 3.2 or 0.032)
`!stop` stop monitoring
`!status` show session state
`!risk X` set per-trade risk
`!tp X` set take-profit in R (0 = off)
`!sl X` set immediate loss cutoff
`!help` this message";

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start {
        symbol: String,
        /// Parsed risk override; `None` when absent or unreadable
        risk: Option<f64>,
    },
    Stop,
    Status,
    Risk(f64),
    TakeProfit(f64),
    StopLoss(f64),
    Help,
}

/// A recognised command used wrongly. `Display` is the reply to the user.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("Usage: `!start SYMBOL [RISK]`")]
    MissingSymbol,

    #[error("Invalid symbol `{0}`")]
    InvalidSymbol(String),

    #[error("Usage: `!{command} X` ({hint})")]
    MissingValue { command: &'static str, hint: &'static str },

    #[error("Could not read `{value}` for !{command} ({hint})")]
    InvalidValue {
        command: &'static str,
        value: String,
        hint: &'static str,
    },
}

impl Command {
    /// Parse a chat line.
    ///
    /// `None` means the line is not addressed to the bot: no prefix, or an
    /// unknown command name.
    pub fn parse(text: &str) -> Option<Result<Self, CommandError>> {
        let body = text.trim().strip_prefix(PREFIX)?;
        let mut parts = body.split_whitespace();
        let name = parts.next()?.to_lowercase();
        let args: Vec<&str> = parts.collect();

        let parsed = match name.as_str() {
            "start" => parse_start(&args),
            "stop" => Ok(Command::Stop),
            "status" => Ok(Command::Status),
            "risk" => parse_value(&args, "risk", "e.g. 1%, 1 or 0.01", parse_risk).map(Command::Risk),
            "tp" => parse_value(&args, "tp", "R multiple, 0 = off", parse_take_profit).map(Command::TakeProfit),
            "sl" => parse_value(&args, "sl", "e.g. 2%, 2 or 0.02", parse_stop_loss).map(Command::StopLoss),
            "help" => Ok(Command::Help),
            _ => return None,
        };
        Some(parsed)
    }
}

fn parse_start(args: &[&str]) -> Result<Command, CommandError> {
    let raw = args.first().ok_or(CommandError::MissingSymbol)?;
    let symbol = raw.to_uppercase();
    let valid = symbol.len() <= 12
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '/'));
    if !valid {
        return Err(CommandError::InvalidSymbol(raw.to_string()));
    }

    Ok(Command::Start {
        symbol,
        risk: args.get(1).and_then(|r| parse_risk(r)),
    })
}

fn parse_value(
    args: &[&str],
    command: &'static str,
    hint: &'static str,
    parse: fn(&str) -> Option<f64>,
) -> Result<f64, CommandError> {
    let raw = args.first().ok_or(CommandError::MissingValue { command, hint })?;
    parse(raw).ok_or_else(|| CommandError::InvalidValue {
        command,
        value: raw.to_string(),
        hint,
    })
}

/// Read a fraction written as `3.2%`, `3.2` or `0.032`.
///
/// Values above 1 are taken as percentages.
fn parse_fraction(text: &str) -> Option<f64> {
    let cleaned = text.trim().trim_end_matches('%');
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if value > 1.0 { value / 100.0 } else { value })
}

/// Per-trade risk, clamped to [`RISK_MIN`, `RISK_MAX`].
pub fn parse_risk(text: &str) -> Option<f64> {
    parse_fraction(text).map(|v| v.clamp(RISK_MIN, RISK_MAX))
}

/// Fail-safe cutoff, clamped to [`RISK_MIN`, `STOP_LOSS_MAX`].
pub fn parse_stop_loss(text: &str) -> Option<f64> {
    parse_fraction(text).map(|v| v.clamp(RISK_MIN, STOP_LOSS_MAX))
}

/// Take-profit multiple; must be finite and non-negative.
pub fn parse_take_profit(text: &str) -> Option<f64> {
    let value: f64 = text.trim().trim_end_matches(['R', 'r']).parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Command {
        Command::parse(text)
            .expect("command should be recognised")
            .expect("command should be valid")
    }

    fn parse_err(text: &str) -> CommandError {
        Command::parse(text)
            .expect("command should be recognised")
            .expect_err("command should be rejected")
    }

    fn close_enough(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-12)
    }

    #[test]
    fn test_parse_risk_formats() {
        assert!(close_enough(parse_risk("3.2%"), 0.032));
        assert!(close_enough(parse_risk("3.2"), 0.032));
        assert!(close_enough(parse_risk("0.032"), 0.032));
        assert!(close_enough(parse_risk("1"), 1.0f64.min(RISK_MAX)));
        assert_eq!(parse_risk("50"), Some(0.20));
        assert_eq!(parse_risk("0"), Some(RISK_MIN));
        assert_eq!(parse_risk("abc"), None);
        assert_eq!(parse_risk("NaN"), None);
    }

    #[test]
    fn test_parse_start() {
        assert_eq!(
            parse("!start tqqq"),
            Command::Start {
                symbol: "TQQQ".to_string(),
                risk: None
            }
        );

        match parse("!start WMT 3.2%") {
            Command::Start { symbol, risk } => {
                assert_eq!(symbol, "WMT");
                assert!(close_enough(risk, 0.032));
            }
            other => panic!("unexpected {:?}", other),
        }

        // Unreadable risk falls back to the default.
        assert_eq!(
            parse("!start WMT lots"),
            Command::Start {
                symbol: "WMT".to_string(),
                risk: None
            }
        );

        assert_eq!(parse_err("!start"), CommandError::MissingSymbol);
        assert!(matches!(parse_err("!start <@123>"), CommandError::InvalidSymbol(_)));
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse("!stop"), Command::Stop);
        assert_eq!(parse("  !STATUS  "), Command::Status);
        assert_eq!(parse("!help"), Command::Help);
    }

    #[test]
    fn test_parse_setters() {
        assert!(matches!(parse("!risk 2%"), Command::Risk(r) if (r - 0.02).abs() < 1e-12));
        assert_eq!(parse("!tp 2.5"), Command::TakeProfit(2.5));
        assert_eq!(parse("!tp 3R"), Command::TakeProfit(3.0));
        assert_eq!(parse("!tp 0"), Command::TakeProfit(0.0));
        assert!(matches!(parse("!sl 5"), Command::StopLoss(s) if (s - 0.05).abs() < 1e-12));
        assert_eq!(parse("!sl 90%"), Command::StopLoss(STOP_LOSS_MAX));
    }

    #[test]
    fn test_setter_errors_are_user_readable() {
        let err = parse_err("!tp");
        assert_eq!(err.to_string(), "Usage: `!tp X` (R multiple, 0 = off)");

        let err = parse_err("!tp -1");
        assert!(err.to_string().contains("`-1`"));

        assert!(matches!(parse_err("!risk much"), CommandError::InvalidValue { .. }));
    }

    #[test]
    fn test_ignores_non_commands() {
        assert!(Command::parse("hello").is_none());
        assert!(Command::parse("!").is_none());
        assert!(Command::parse("!buy TQQQ").is_none());
    }
}
