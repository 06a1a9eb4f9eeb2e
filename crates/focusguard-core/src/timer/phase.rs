use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One segment of the Pomodoro cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Work,
    ShortBreak,
    LongBreak,
}

impl SessionPhase {
    pub fn is_break(self) -> bool {
        matches!(self, SessionPhase::ShortBreak | SessionPhase::LongBreak)
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionPhase::Work => "Focus",
            SessionPhase::ShortBreak => "Short Break",
            SessionPhase::LongBreak => "Long Break",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Work => "work",
            SessionPhase::ShortBreak => "short_break",
            SessionPhase::LongBreak => "long_break",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "work" | "focus" => Ok(SessionPhase::Work),
            "short_break" | "shortbreak" => Ok(SessionPhase::ShortBreak),
            "long_break" | "longbreak" => Ok(SessionPhase::LongBreak),
            other => Err(format!("unknown phase '{other}' (expected work, short_break or long_break)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_phase_names() {
        assert_eq!("work".parse::<SessionPhase>(), Ok(SessionPhase::Work));
        assert_eq!("Short-Break".parse::<SessionPhase>(), Ok(SessionPhase::ShortBreak));
        assert_eq!("long_break".parse::<SessionPhase>(), Ok(SessionPhase::LongBreak));
        assert!("lunch".parse::<SessionPhase>().is_err());
    }

    #[test]
    fn breaks_are_breaks() {
        assert!(!SessionPhase::Work.is_break());
        assert!(SessionPhase::ShortBreak.is_break());
        assert!(SessionPhase::LongBreak.is_break());
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionPhase::LongBreak).unwrap(),
            "\"long_break\""
        );
    }
}
