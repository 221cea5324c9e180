//! Verdict types for pairwise judging.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of a pairwise comparison won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Model1,
    Model2,
    Draw,
}

impl Winner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Winner::Model1 => "model1",
            Winner::Model2 => "model2",
            Winner::Draw => "draw",
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verdict with the judge's rationale (or a diagnostic when parsing failed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgement {
    pub winner: Winner,
    pub rationale: String,
}

impl Judgement {
    pub fn new(winner: Winner, rationale: impl Into<String>) -> Self {
        Self {
            winner,
            rationale: rationale.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winner_serializes_as_lowercase_tag() {
        assert_eq!(serde_json::to_string(&Winner::Model1).unwrap(), "\"model1\"");
        assert_eq!(serde_json::to_string(&Winner::Draw).unwrap(), "\"draw\"");
        let parsed: Winner = serde_json::from_str("\"model2\"").unwrap();
        assert_eq!(parsed, Winner::Model2);
        assert_eq!(Winner::Model2.to_string(), "model2");
    }
}
